use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use vigil_core::{
    AesGcmCodec, Keyring, PayloadCodec, ScanEngine, StepJournal, TargetChecker,
    TargetFetcher,
};

use crate::models::audit::{AuditConfig, AuditConfigSource};
use crate::models::encryption::{KeySource, load_keyring};
use crate::util::{EnvLookup, process_env};

/// Everything needed to stand up a [`ScanEngine`].
#[derive(Debug, Clone)]
pub struct AuditSetup {
    pub config: AuditConfig,
    pub source: AuditConfigSource,
    pub keyring: Keyring,
    pub key_source: KeySource,
}

impl AuditSetup {
    /// Reads configuration and keys from the process environment, searching
    /// the working directory for config files.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::load(&process_env, Path::new("."))
    }

    pub fn load(lookup: &EnvLookup, search_root: &Path) -> anyhow::Result<Self> {
        let (config, source) = AuditConfig::load(lookup, search_root)?;
        let (keyring, key_source) = load_keyring(lookup)?;

        match &source {
            AuditConfigSource::Default => {
                tracing::info!("audit config: built-in defaults")
            }
            AuditConfigSource::EnvInline => {
                tracing::info!("audit config loaded from inline environment json")
            }
            AuditConfigSource::EnvPath(path) | AuditConfigSource::File(path) => {
                tracing::info!(path = %path.display(), "audit config loaded from file")
            }
        }

        Ok(Self {
            config,
            source,
            keyring,
            key_source,
        })
    }

    pub fn codec(&self) -> Arc<dyn PayloadCodec> {
        Arc::new(AesGcmCodec::new(self.keyring.clone()))
    }

    pub fn engine(
        &self,
        fetcher: Arc<dyn TargetFetcher>,
        checker: Arc<dyn TargetChecker>,
        journal: Arc<dyn StepJournal>,
    ) -> anyhow::Result<ScanEngine> {
        ScanEngine::new(
            self.config.orchestrator.clone(),
            fetcher,
            checker,
            journal,
            self.codec(),
        )
        .context("failed to build scan engine")
    }
}
