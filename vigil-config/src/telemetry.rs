use anyhow::Context;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_DIRECTIVES: &str = "info,vigil_core::batch=warn";

/// Installs a global subscriber: `RUST_LOG` when set, otherwise
/// `default_directives`, formatted to stdout. Fails if a subscriber is
/// already installed.
pub fn try_init_tracing(default_directives: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives))
        .with_context(|| format!("invalid log directives '{default_directives}'"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .context("a global tracing subscriber is already installed")
}
