/// Errors raised while parsing or validating a metric.
///
/// # Examples
///
/// ```rust
/// use harvester_common::error::MetricError;
///
/// let err = MetricError::UnknownKind("histogram".to_string());
/// assert!(err.to_string().contains("histogram"));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    /// The `type` discriminator is neither `gauge` nor `counter`.
    #[error("Metric: unknown metric kind '{0}'")]
    UnknownKind(String),

    /// The payload field selected by the kind (`delta` or `value`) is absent.
    #[error("Metric: {kind} metric '{id}' has no {field}")]
    MissingPayload {
        id: String,
        kind: &'static str,
        field: &'static str,
    },

    /// A textual value could not be parsed as the kind's numeric type.
    #[error("Metric: cannot parse '{raw}' as a {kind} value")]
    InvalidValue { kind: &'static str, raw: String },

    /// A counter increment would leave the `i64` range.
    #[error("Metric: counter '{id}' would overflow")]
    CounterOverflow { id: String },
}

/// Errors raised by the transport codec and the key handshake.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Codec: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Codec: gzip error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Codec: decompressed body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// AES-GCM sealing or opening failed (wrong key, truncated or tampered body).
    #[error("Codec: {0}")]
    Cipher(&'static str),

    /// The HMAC header was not valid hex or did not match the body.
    #[error("Codec: signature mismatch")]
    Signature,

    #[error("Codec: RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    /// PEM material was unreadable or not PKCS#1.
    #[error("Codec: invalid key material: {0}")]
    KeyMaterial(String),
}

/// Convenience `Result` alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
