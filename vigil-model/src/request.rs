use std::sync::Arc;

use crate::credential::Credential;
use crate::error::Result;
use crate::ids::{ExecutionId, TargetGroupId};

/// Validated input of one scan execution.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    target_group: TargetGroupId,
    credential: Option<Arc<Credential>>,
}

impl ScanRequest {
    /// Validate raw caller input. Both failures are terminal: retrying the
    /// same input can never succeed.
    pub fn new(target_group: &str, credential: Option<&str>) -> Result<Self> {
        let target_group = TargetGroupId::parse(target_group)?;
        let credential = credential
            .map(Credential::parse)
            .transpose()?
            .map(Arc::new);
        Ok(Self {
            target_group,
            credential,
        })
    }

    pub fn target_group(&self) -> &TargetGroupId {
        &self.target_group
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_deref()
    }

    /// Shared handle to the credential for concurrently running checks.
    pub fn shared_credential(&self) -> Option<Arc<Credential>> {
        self.credential.clone()
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.target_group.execution_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;

    #[test]
    fn validates_group_and_credential() {
        let request = ScanRequest::new("acme", Some("ghp_token")).unwrap();
        assert_eq!(request.target_group().as_str(), "acme");
        assert_eq!(request.credential().map(Credential::expose), Some("ghp_token"));

        assert!(matches!(
            ScanRequest::new("bad org", None),
            Err(ModelError::InvalidTargetGroup(_))
        ));
        assert!(matches!(
            ScanRequest::new("acme", Some("two words")),
            Err(ModelError::InvalidCredential(_))
        ));
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let request = ScanRequest::new("acme", Some("ghp_topsecret")).unwrap();
        assert!(!format!("{request:?}").contains("topsecret"));
    }
}
