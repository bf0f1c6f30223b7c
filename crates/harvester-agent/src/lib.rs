//! Harvester agent: polls host and process statistics and reports them to
//! the harvester server.

pub mod config;
pub mod delivery;
pub mod reporter;
pub mod workers;

use anyhow::{Context, Result};
use config::AgentConfig;
use harvester_common::codec::{Codec, SigningKey, SymmetricKey};
use harvester_common::handshake::{load_public_key, seal_symmetric_key};
use tracing_subscriber::EnvFilter;

/// Transport settings derived from the configuration, plus the sealed
/// symmetric key to post once when encryption is on.
pub struct Transport {
    pub codec: Codec,
    pub sealed_key: Option<Vec<u8>>,
}

/// Loads key material and builds the codec. Unreadable or malformed keys
/// abort start-up.
pub fn prepare_transport(config: &AgentConfig) -> Result<Transport> {
    let signer = config.key.as_deref().map(SigningKey::new);
    let (cipher, sealed_key) = match &config.crypto_key {
        Some(path) => {
            let public_key = load_public_key(path)
                .with_context(|| format!("loading public key {}", path.display()))?;
            let key = SymmetricKey::generate()?;
            let sealed = seal_symmetric_key(&public_key, &key)?;
            (Some(key), Some(sealed))
        }
        None => (None, None),
    };
    Ok(Transport {
        codec: Codec::new(cipher, signer),
        sealed_key,
    })
}

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{level}'"))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
