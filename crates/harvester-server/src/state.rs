use crate::config::ServerConfig;
use harvester_common::codec::{SigningKey, SymmetricKey};
use harvester_common::handshake::RsaPrivateKey;
use harvester_storage::StorageEngine;
use std::sync::{Arc, OnceLock};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageEngine>,
    pub signer: Option<SigningKey>,
    pub private_key: Option<Arc<RsaPrivateKey>>,
    /// Set once by the key exchange, read by every later request.
    pub symmetric_key: Arc<OnceLock<SymmetricKey>>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn StorageEngine>,
        config: ServerConfig,
        private_key: Option<RsaPrivateKey>,
    ) -> Self {
        Self {
            storage,
            signer: config.key.as_deref().map(SigningKey::new),
            private_key: private_key.map(Arc::new),
            symmetric_key: Arc::new(OnceLock::new()),
            config: Arc::new(config),
        }
    }
}
