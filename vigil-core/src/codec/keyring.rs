use std::collections::HashMap;
use std::fmt;

use aes_gcm::{Aes256Gcm, Key, KeyInit};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use zeroize::Zeroizing;

use super::CodecError;

pub const KEY_LEN: usize = 32;

/// One versioned AES-256 key. Material is wiped on drop.
#[derive(Clone)]
pub struct EncryptionKey {
    id: String,
    material: Zeroizing<[u8; KEY_LEN]>,
}

impl EncryptionKey {
    pub fn new(
        id: impl Into<String>,
        material: [u8; KEY_LEN],
    ) -> Result<Self, CodecError> {
        let id = id.into();
        if id.trim().is_empty() || id.contains([':', ',']) {
            return Err(CodecError::InvalidKey(format!(
                "key id '{id}' must be non-empty and free of ':' and ','"
            )));
        }
        Ok(Self {
            id,
            material: Zeroizing::new(material),
        })
    }

    pub fn from_base64(
        id: impl Into<String>,
        encoded: &str,
    ) -> Result<Self, CodecError> {
        let decoded = Zeroizing::new(
            BASE64
                .decode(encoded.trim().as_bytes())
                .map_err(|err| CodecError::InvalidKey(err.to_string()))?,
        );
        let material: [u8; KEY_LEN] =
            decoded.as_slice().try_into().map_err(|_| {
                CodecError::InvalidKey(format!(
                    "expected {KEY_LEN} key bytes, got {}",
                    decoded.len()
                ))
            })?;
        Self::new(id, material)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn cipher(&self) -> Aes256Gcm {
        let key = Key::<Aes256Gcm>::from_slice(self.material.as_slice());
        Aes256Gcm::new(key)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("id", &self.id)
            .field("material", &"<redacted>")
            .finish()
    }
}

/// Keys by version id. New payloads are sealed with the primary key; the
/// rest stay around so payloads written before a rotation still open.
#[derive(Debug, Clone)]
pub struct Keyring {
    primary: EncryptionKey,
    previous: HashMap<String, EncryptionKey>,
}

impl Keyring {
    pub fn new(primary: EncryptionKey) -> Self {
        Self {
            primary,
            previous: HashMap::new(),
        }
    }

    /// Registers a retired key for decryption only.
    pub fn with_previous(
        mut self,
        key: EncryptionKey,
    ) -> Result<Self, CodecError> {
        if self.get(key.id()).is_some() {
            return Err(CodecError::InvalidKey(format!(
                "duplicate key id '{}'",
                key.id()
            )));
        }
        self.previous.insert(key.id().to_string(), key);
        Ok(self)
    }

    pub fn primary(&self) -> &EncryptionKey {
        &self.primary
    }

    pub fn get(&self, id: &str) -> Option<&EncryptionKey> {
        if self.primary.id() == id {
            Some(&self.primary)
        } else {
            self.previous.get(id)
        }
    }

    pub fn key_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .previous
            .keys()
            .map(String::as_str)
            .chain(std::iter::once(self.primary.id()))
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_keys_must_be_32_bytes() {
        let short = BASE64.encode([7u8; 16]);
        assert!(matches!(
            EncryptionKey::from_base64("v1", &short),
            Err(CodecError::InvalidKey(_))
        ));
        let ok = BASE64.encode([7u8; KEY_LEN]);
        assert_eq!(EncryptionKey::from_base64("v1", &ok).unwrap().id(), "v1");
    }

    #[test]
    fn debug_output_hides_material() {
        let key = EncryptionKey::new("v1", [42u8; KEY_LEN]).unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("42"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let ring = Keyring::new(EncryptionKey::new("v2", [1; KEY_LEN]).unwrap());
        let dup = EncryptionKey::new("v2", [2; KEY_LEN]).unwrap();
        assert!(ring.with_previous(dup).is_err());
    }

    #[test]
    fn keyring_lists_all_versions() {
        let ring = Keyring::new(EncryptionKey::new("v2", [1; KEY_LEN]).unwrap())
            .with_previous(EncryptionKey::new("v1", [2; KEY_LEN]).unwrap())
            .unwrap();
        assert_eq!(ring.primary().id(), "v2");
        assert_eq!(ring.key_ids(), vec!["v1", "v2"]);
    }
}
