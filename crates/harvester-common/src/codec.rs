//! Layered body codec.
//!
//! Outgoing payloads are serialized to JSON, optionally sealed with
//! AES-256-GCM (random 12-byte nonce prepended), gzip-compressed, and
//! optionally signed: the hex HMAC-SHA256 of the compressed bytes travels in
//! the [`SIGNATURE_HEADER`] header. Decoding undoes each applied stage in
//! reverse order.

use crate::error::{CodecError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use std::fmt;
use std::io::{Read, Write};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of a body.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Largest body [`gunzip`] will produce.
pub const MAX_DECODED_BYTES: usize = 16 * 1024 * 1024;

/// Length in bytes of the AES-256-GCM key negotiated by the handshake.
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// AES-256-GCM key shared between agent and server.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_LEN]);

impl SymmetricKey {
    /// Generates a fresh random key.
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; SYMMETRIC_KEY_LEN];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| CodecError::Cipher("failed to generate symmetric key"))?;
        Ok(Self(key))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; SYMMETRIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            CodecError::KeyMaterial(format!(
                "symmetric key must be {SYMMETRIC_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn aead_key(&self) -> Result<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.0)
            .map_err(|_| CodecError::Cipher("invalid encryption key"))?;
        Ok(LessSafeKey::new(unbound))
    }

    /// Encrypts `plaintext`, returning nonce + ciphertext + tag.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.aead_key()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| CodecError::Cipher("failed to generate nonce"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CodecError::Cipher("encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    /// Decrypts the output of [`SymmetricKey::seal`].
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN + aead::AES_256_GCM.tag_len() {
            return Err(CodecError::Cipher("encrypted body too short"));
        }
        let key = self.aead_key()?;

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CodecError::Cipher("invalid nonce"))?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CodecError::Cipher("decryption failed"))?;
        Ok(plaintext.to_vec())
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// HMAC-SHA256 key used to sign bodies.
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self(key.into())
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.0).map_err(|_| CodecError::Signature)
    }

    /// Returns the lowercase hex HMAC-SHA256 of `body`.
    pub fn sign(&self, body: &[u8]) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Checks `signature` (hex) against `body` in constant time.
    pub fn verify(&self, body: &[u8], signature: &str) -> Result<()> {
        let expected = hex::decode(signature.trim()).map_err(|_| CodecError::Signature)?;
        let mut mac = self.mac()?;
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| CodecError::Signature)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompresses `data`, refusing output larger than [`MAX_DECODED_BYTES`].
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    gunzip_limited(data, MAX_DECODED_BYTES)
}

fn gunzip_limited(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data).take(limit as u64 + 1);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(CodecError::TooLarge { limit });
    }
    Ok(out)
}

/// A body ready to be put on the wire, with its signature when signing is
/// enabled.
#[derive(Debug, Clone)]
pub struct EncodedBody {
    pub body: Vec<u8>,
    pub signature: Option<String>,
}

/// The transport stages configured for one side of the exchange.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    cipher: Option<SymmetricKey>,
    signer: Option<SigningKey>,
}

impl Codec {
    pub fn new(cipher: Option<SymmetricKey>, signer: Option<SigningKey>) -> Self {
        Self { cipher, signer }
    }

    pub fn cipher(&self) -> Option<&SymmetricKey> {
        self.cipher.as_ref()
    }

    pub fn signer(&self) -> Option<&SigningKey> {
        self.signer.as_ref()
    }

    /// Signs `body` as-is when a signing key is configured.
    pub fn sign(&self, body: Vec<u8>) -> Result<EncodedBody> {
        let signature = match &self.signer {
            Some(signer) => Some(signer.sign(&body)?),
            None => None,
        };
        Ok(EncodedBody { body, signature })
    }

    /// JSON → optional AES-GCM → gzip → optional HMAC.
    pub fn encode<T: Serialize + ?Sized>(&self, payload: &T) -> Result<EncodedBody> {
        let mut body = serde_json::to_vec(payload)?;
        if let Some(key) = &self.cipher {
            body = key.seal(&body)?;
        }
        self.sign(gzip(&body)?)
    }

    /// Verifies, decompresses and decrypts `body`, returning the plaintext.
    ///
    /// Signature checking happens only when both a signing key and a
    /// `signature` are present; decompression only when `compressed` is set.
    pub fn unwrap_body(
        &self,
        body: &[u8],
        signature: Option<&str>,
        compressed: bool,
    ) -> Result<Vec<u8>> {
        if let (Some(signer), Some(signature)) = (&self.signer, signature) {
            signer.verify(body, signature)?;
        }
        let mut plain = if compressed {
            gunzip(body)?
        } else {
            body.to_vec()
        };
        if let Some(key) = &self.cipher {
            if !plain.is_empty() {
                plain = key.open(&plain)?;
            }
        }
        Ok(plain)
    }

    /// Reverses [`Codec::encode`].
    pub fn decode<T: DeserializeOwned>(
        &self,
        body: &[u8],
        signature: Option<&str>,
        compressed: bool,
    ) -> Result<T> {
        let plain = self.unwrap_body(body, signature, compressed)?;
        Ok(serde_json::from_slice(&plain)?)
    }
}
