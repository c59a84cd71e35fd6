use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ModelError, Result};

const MAX_CREDENTIAL_LEN: usize = 1024;

/// API credential used by the fetch and check collaborators.
///
/// Deliberately not serializable: the credential never leaves the process
/// through a record, a journal entry or a log line. The backing buffer is
/// wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    secret: String,
}

impl Credential {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(ModelError::InvalidCredential("credential is empty"));
        }
        if raw.len() > MAX_CREDENTIAL_LEN {
            return Err(ModelError::InvalidCredential(
                "credential is implausibly long",
            ));
        }
        if raw.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
            return Err(ModelError::InvalidCredential(
                "credential contains whitespace or control characters",
            ));
        }
        Ok(Self {
            secret: raw.to_string(),
        })
    }

    /// Raw secret, for collaborators building request headers.
    pub fn expose(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
