use anyhow::{Context, anyhow, bail};
use vigil_core::{EncryptionKey, Keyring};

use crate::util::{EnvLookup, non_blank, parse_bool, parse_csv};

pub const KEY_VAR: &str = "VIGIL_ENCRYPTION_KEY";
pub const KEY_ID_VAR: &str = "VIGIL_ENCRYPTION_KEY_ID";
pub const PREVIOUS_KEYS_VAR: &str = "VIGIL_ENCRYPTION_PREVIOUS_KEYS";
pub const DEV_MODE_VAR: &str = "VIGIL_DEV_MODE";

pub const DEFAULT_KEY_ID: &str = "v1";
pub const DEV_KEY_ID: &str = "dev";

/// Fixed key used only when dev mode is on and no key is configured.
const DEV_KEY_MATERIAL: [u8; 32] = *b"vigil-development-key-not-secret";

/// Where the primary encryption key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    Development,
}

/// Builds the journal keyring from the environment.
///
/// `VIGIL_ENCRYPTION_KEY` holds the base64 primary key and
/// `VIGIL_ENCRYPTION_KEY_ID` its version (default `v1`).
/// `VIGIL_ENCRYPTION_PREVIOUS_KEYS` lists retired keys as `id:base64` pairs
/// separated by commas; they only decrypt. Without a primary key this fails
/// unless `VIGIL_DEV_MODE` is truthy.
pub fn load_keyring(lookup: &EnvLookup) -> anyhow::Result<(Keyring, KeySource)> {
    let (primary, source) = match non_blank(lookup, KEY_VAR) {
        Some(encoded) => {
            let id = non_blank(lookup, KEY_ID_VAR)
                .map(|id| id.trim().to_string())
                .unwrap_or_else(|| DEFAULT_KEY_ID.to_string());
            let key = EncryptionKey::from_base64(id, &encoded)
                .with_context(|| format!("invalid {KEY_VAR}"))?;
            (key, KeySource::Environment)
        }
        None => {
            let dev_mode = match lookup(DEV_MODE_VAR) {
                Some(raw) => parse_bool(&raw).ok_or_else(|| {
                    anyhow!("{DEV_MODE_VAR} must be a boolean, got '{raw}'")
                })?,
                None => false,
            };
            if !dev_mode {
                bail!(
                    "{KEY_VAR} is not set; provide a base64 encoded 32 byte key \
                     or set {DEV_MODE_VAR}=true for local development"
                );
            }
            tracing::warn!(
                key_id = DEV_KEY_ID,
                "no encryption key configured; journal payloads use the \
                 built-in development key"
            );
            let key = EncryptionKey::new(DEV_KEY_ID, DEV_KEY_MATERIAL)
                .context("development key rejected")?;
            (key, KeySource::Development)
        }
    };

    let mut keyring = Keyring::new(primary);
    if let Some(raw) = lookup(PREVIOUS_KEYS_VAR) {
        for entry in parse_csv(&raw) {
            let (id, encoded) = entry.split_once(':').ok_or_else(|| {
                anyhow!("{PREVIOUS_KEYS_VAR} entries must look like id:base64")
            })?;
            let key = EncryptionKey::from_base64(id.trim(), encoded)
                .with_context(|| {
                    format!("invalid previous key '{}'", id.trim())
                })?;
            keyring = keyring.with_previous(key).with_context(|| {
                format!("invalid {PREVIOUS_KEYS_VAR}")
            })?;
        }
    }

    tracing::debug!(
        primary = keyring.primary().id(),
        known = ?keyring.key_ids(),
        "encryption keyring assembled"
    );
    Ok((keyring, source))
}
