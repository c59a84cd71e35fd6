use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use vigil_core::OrchestratorConfig;

use crate::util::{EnvLookup, non_blank};

pub const CONFIG_PATH_VAR: &str = "VIGIL_CONFIG_PATH";
pub const CONFIG_JSON_VAR: &str = "VIGIL_CONFIG_JSON";

/// Source that produced the audit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuditConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Top-level audit settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Batch sizing, execution ceiling and per-operation timeouts and retry
    /// policy. Larger batches finish sooner but put more concurrent load on
    /// the remote service.
    pub orchestrator: OrchestratorConfig,
}

impl AuditConfig {
    /// Loads configuration overrides. Evaluation order:
    /// 1) `$VIGIL_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$VIGIL_CONFIG_JSON` (inline JSON),
    /// 3) `vigil.toml`, `vigil.json` or the same under `config/`, relative
    ///    to `search_root`,
    /// 4) defaults if none of the above is present.
    ///
    /// The result is validated before it is returned.
    pub fn load(
        lookup: &EnvLookup,
        search_root: &Path,
    ) -> anyhow::Result<(Self, AuditConfigSource)> {
        let (config, source) = Self::resolve(lookup, search_root)?;
        config
            .orchestrator
            .validate()
            .with_context(|| format!("rejected audit config from {source:?}"))?;
        Ok((config, source))
    }

    fn resolve(
        lookup: &EnvLookup,
        search_root: &Path,
    ) -> anyhow::Result<(Self, AuditConfigSource)> {
        if let Some(path_str) = non_blank(lookup, CONFIG_PATH_VAR) {
            let path = PathBuf::from(path_str.trim());
            let config = Self::load_from_file(&path)?;
            return Ok((config, AuditConfigSource::EnvPath(path)));
        }

        if let Some(raw) = non_blank(lookup, CONFIG_JSON_VAR) {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_VAR}"))?;
            return Ok((parsed, AuditConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file(search_root) {
            let config = Self::load_from_file(&path)?;
            return Ok((config, AuditConfigSource::File(path)));
        }

        Ok((Self::default(), AuditConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read audit config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid audit config {}", path.display())
            }),
            Some("toml") => toml::from_str(&contents).map_err(|err| {
                anyhow!("invalid audit config {}: {}", path.display(), err)
            }),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse audit config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid audit config json: {err}"))
    }

    fn find_default_file(search_root: &Path) -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "vigil.toml",
            "vigil.json",
            "config/vigil.toml",
            "config/vigil.json",
        ];

        CANDIDATES
            .iter()
            .map(|candidate| search_root.join(candidate))
            .find(|path| path.exists())
    }
}
