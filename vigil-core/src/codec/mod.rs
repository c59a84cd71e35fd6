//! Envelope encryption for records leaving the process.
//!
//! Every step result written to the journal passes through a
//! [`PayloadCodec`]. The AES-256-GCM codec seals the serialized bytes into an
//! [`Envelope`] tagged with `encoding = binary/encrypted` and the key version;
//! decoding opens it with the matching key from the [`Keyring`]. Envelopes
//! without the marker are treated as plain records and returned unchanged, so
//! journals written before encryption was enabled stay readable.

mod envelope;
mod keyring;

use std::fmt;
use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, OsRng, Payload},
};
use thiserror::Error;

pub use envelope::{
    ENCODING_KEY, ENCRYPTED_ENCODING, Envelope, KEY_ID_KEY, PLAIN_ENCODING,
};
pub use keyring::{EncryptionKey, KEY_LEN, Keyring};

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Integrity verification failed: tampered ciphertext or the wrong key.
    #[error("Authentication failure: payload integrity could not be verified")]
    AuthenticationFailure,

    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Unknown encryption key version: {0}")]
    UnknownKeyVersion(String),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    EncryptionFailed,
}

/// Seals `payload` with `key`. The key id doubles as associated data, so an
/// envelope relabelled with another version fails authentication.
pub fn encode(
    payload: &[u8],
    key: &EncryptionKey,
) -> Result<Envelope, CodecError> {
    let cipher = key.cipher();
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: payload,
                aad: key.id().as_bytes(),
            },
        )
        .map_err(|_| CodecError::EncryptionFailed)?;

    let mut data = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    data.extend_from_slice(nonce.as_slice());
    data.extend_from_slice(&ciphertext);
    Ok(Envelope::sealed(key.id(), data))
}

/// Opens an envelope. Unmarked envelopes pass through; marked ones either
/// decrypt fully or fail without yielding any plaintext.
pub fn decode(
    envelope: &Envelope,
    keyring: &Keyring,
) -> Result<Vec<u8>, CodecError> {
    if !envelope.is_encrypted() {
        return Ok(envelope.data.clone());
    }

    let key_id = envelope.key_id().ok_or_else(|| {
        CodecError::Malformed("encrypted envelope without key id".to_string())
    })?;
    let key = keyring
        .get(key_id)
        .ok_or_else(|| CodecError::UnknownKeyVersion(key_id.to_string()))?;

    if envelope.data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CodecError::Malformed(format!(
            "ciphertext too short ({} bytes)",
            envelope.data.len()
        )));
    }
    let (nonce_bytes, ciphertext) = envelope.data.split_at(NONCE_SIZE);

    key.cipher()
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: key_id.as_bytes(),
            },
        )
        .map_err(|_| CodecError::AuthenticationFailure)
}

/// Boundary transform applied to every persisted step result.
pub trait PayloadCodec: Send + Sync + fmt::Debug {
    fn encode(&self, payload: &[u8]) -> Result<Envelope, CodecError>;

    fn decode(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError>;
}

#[derive(Debug, Clone)]
pub struct AesGcmCodec {
    keyring: Arc<Keyring>,
}

impl AesGcmCodec {
    pub fn new(keyring: Keyring) -> Self {
        Self {
            keyring: Arc::new(keyring),
        }
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }
}

impl PayloadCodec for AesGcmCodec {
    fn encode(&self, payload: &[u8]) -> Result<Envelope, CodecError> {
        encode(payload, self.keyring.primary())
    }

    fn decode(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
        decode(envelope, &self.keyring)
    }
}

/// Writes unmarked envelopes. Suitable only where the journal never leaves
/// the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl PayloadCodec for PlainCodec {
    fn encode(&self, payload: &[u8]) -> Result<Envelope, CodecError> {
        Ok(Envelope::plain(payload.to_vec()))
    }

    fn decode(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
        if envelope.is_encrypted() {
            return Err(CodecError::UnknownKeyVersion(
                envelope.key_id().unwrap_or_default().to_string(),
            ));
        }
        Ok(envelope.data.clone())
    }
}
