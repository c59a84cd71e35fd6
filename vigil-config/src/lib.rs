//! Shared configuration library for Vigil.
//!
//! Loads orchestrator tuning from a file, inline JSON or defaults, assembles
//! the encryption keyring from the environment and offers an optional
//! tracing bootstrap. Environment access goes through an [`EnvLookup`] so
//! callers (and tests) decide where values come from.

pub mod loader;
pub mod models;
pub mod telemetry;
pub mod util;

pub use loader::AuditSetup;
pub use models::audit::{AuditConfig, AuditConfigSource};
pub use models::encryption::{KeySource, load_keyring};
pub use util::{EnvLookup, process_env};
