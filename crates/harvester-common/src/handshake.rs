//! Hybrid-encryption bootstrap.
//!
//! The agent generates a [`SymmetricKey`], seals it for the server's RSA
//! public key with OAEP/SHA-256 and posts it once to `/key/`. The server
//! opens it with its private key and uses it for every later payload.
//! Keys are exchanged as PKCS#1 PEM (`RSA PUBLIC KEY` / `RSA PRIVATE KEY`).

use crate::codec::SymmetricKey;
use crate::error::{CodecError, Result};
use rand::rngs::OsRng;
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding,
};
use rsa::Oaep;
use sha2::Sha256;
use std::path::Path;

pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// Modulus size used by the key generator.
pub const RSA_KEY_BITS: usize = 2048;

/// Path on the server that receives the sealed symmetric key.
pub const KEY_ENDPOINT: &str = "/key/";

fn read_pem(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| CodecError::KeyMaterial(format!("{}: {e}", path.display())))
}

pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| CodecError::KeyMaterial(e.to_string()))
}

pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| CodecError::KeyMaterial(e.to_string()))
}

/// Loads an `RSA PUBLIC KEY` PEM file.
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey> {
    public_key_from_pem(&read_pem(path)?)
}

/// Loads an `RSA PRIVATE KEY` PEM file.
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey> {
    private_key_from_pem(&read_pem(path)?)
}

/// Encrypts the symmetric key for the holder of `public_key`.
pub fn seal_symmetric_key(public_key: &RsaPublicKey, key: &SymmetricKey) -> Result<Vec<u8>> {
    Ok(public_key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())?)
}

/// Recovers the symmetric key posted by an agent.
pub fn open_symmetric_key(private_key: &RsaPrivateKey, sealed: &[u8]) -> Result<SymmetricKey> {
    let raw = private_key.decrypt(Oaep::new::<Sha256>(), sealed)?;
    SymmetricKey::from_bytes(&raw)
}

/// A freshly generated key pair rendered as PKCS#1 PEM.
pub struct KeyPairPem {
    pub private_pem: String,
    pub public_pem: String,
}

pub fn generate_key_pair(bits: usize) -> Result<KeyPairPem> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)?;
    let public_key = RsaPublicKey::from(&private_key);
    let private_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| CodecError::KeyMaterial(e.to_string()))?
        .to_string();
    let public_pem = public_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| CodecError::KeyMaterial(e.to_string()))?;
    Ok(KeyPairPem {
        private_pem,
        public_pem,
    })
}
