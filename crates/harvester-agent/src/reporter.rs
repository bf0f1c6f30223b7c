use crate::delivery::{deliver, BackoffSchedule, Retryable};
use anyhow::{Context, Result};
use harvester_common::codec::{Codec, EncodedBody, SIGNATURE_HEADER};
use harvester_common::error::CodecError;
use harvester_common::handshake::KEY_ENDPOINT;
use harvester_common::Metric;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;

pub const BATCH_ENDPOINT: &str = "/updates/";

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl Retryable for SendError {
    fn is_retryable(&self) -> bool {
        matches!(self, SendError::Transport(_))
    }
}

/// HTTP client for the server's batch and key endpoints.
pub struct Reporter {
    client: reqwest::Client,
    base_url: String,
    codec: Codec,
}

impl Reporter {
    pub fn new(base_url: impl Into<String>, codec: Codec, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            codec,
        })
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// One POST of an already encoded body.
    pub async fn post(
        &self,
        path: &str,
        body: &EncodedBody,
        gzipped: bool,
    ) -> Result<(), SendError> {
        let mut request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .body(body.body.clone());
        if gzipped {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .header(CONTENT_ENCODING, "gzip")
                .header(ACCEPT_ENCODING, "gzip");
        } else {
            request = request.header(CONTENT_TYPE, "application/octet-stream");
        }
        if let Some(signature) = &body.signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SendError::Status(status))
        }
    }

    /// Encodes the batch once and delivers it to `/updates/`.
    pub async fn report(&self, metrics: &[Metric], schedule: &BackoffSchedule) -> bool {
        let body = match self.codec.encode(metrics) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode metric batch");
                return false;
            }
        };
        let delivered = deliver("metric batch", schedule, || {
            self.post(BATCH_ENDPOINT, &body, true)
        })
        .await;
        if delivered {
            tracing::debug!(count = metrics.len(), bytes = body.body.len(), "Metrics reported");
        }
        delivered
    }

    /// Posts the RSA-sealed symmetric key to `/key/`, signed when a signing
    /// key is configured.
    pub async fn share_key(&self, sealed: Vec<u8>, schedule: &BackoffSchedule) -> bool {
        let body = match self.codec.sign(sealed) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to sign key exchange");
                return false;
            }
        };
        let delivered = deliver("key exchange", schedule, || {
            self.post(KEY_ENDPOINT, &body, false)
        })
        .await;
        if delivered {
            tracing::info!("Symmetric key shared with server");
        }
        delivered
    }
}
