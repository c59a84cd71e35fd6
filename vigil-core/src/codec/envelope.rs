use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::CodecError;

/// Metadata key carrying the payload encoding.
pub const ENCODING_KEY: &str = "encoding";
/// Metadata key carrying the version of the key that sealed the payload.
pub const KEY_ID_KEY: &str = "encryption-key-id";

pub const ENCRYPTED_ENCODING: &str = "binary/encrypted";
pub const PLAIN_ENCODING: &str = "json/plain";

/// Self-describing container for one serialized record.
///
/// Envelopes whose `encoding` is anything other than
/// [`ENCRYPTED_ENCODING`] are plain records and pass through decoding
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn plain(data: Vec<u8>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(ENCODING_KEY.to_string(), PLAIN_ENCODING.to_string());
        Self { metadata, data }
    }

    pub(crate) fn sealed(key_id: &str, data: Vec<u8>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata
            .insert(ENCODING_KEY.to_string(), ENCRYPTED_ENCODING.to_string());
        metadata.insert(KEY_ID_KEY.to_string(), key_id.to_string());
        Self { metadata, data }
    }

    pub fn is_encrypted(&self) -> bool {
        self.metadata.get(ENCODING_KEY).map(String::as_str)
            == Some(ENCRYPTED_ENCODING)
    }

    pub fn key_id(&self) -> Option<&str> {
        self.metadata.get(KEY_ID_KEY).map(String::as_str)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self)
            .map_err(|err| CodecError::Malformed(err.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes)
            .map_err(|err| CodecError::Malformed(err.to_string()))
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}
