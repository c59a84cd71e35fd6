//! # Vigil Core
//!
//! Batched compliance scanning over a group of remote targets.
//!
//! ## Overview
//!
//! An execution fetches the targets of one group, checks them in bounded
//! concurrent batches and aggregates the findings into a [`Report`]:
//!
//! - **Orchestration**: [`ScanEngine`] runs one workflow task per execution,
//!   keyed by the group, and serves progress queries and signals (cancel,
//!   pause, batch-size updates) while collaborator calls are in flight.
//! - **Retry policy**: every collaborator error is classified as terminal
//!   or transient; transient ones are retried with capped exponential
//!   backoff, and a fetch that stops heartbeating counts as stalled.
//! - **Step journal**: completed steps are recorded through an encrypting
//!   [`PayloadCodec`], so a recovered execution replays them instead of
//!   calling the remote service again.
//! - **Codec**: AES-256-GCM envelopes with key versions and plain-text
//!   pass-through.
//!
//! Collaborators are supplied by the caller through [`TargetFetcher`] and
//! [`TargetChecker`].
//!
//! [`Report`]: vigil_model::Report

pub mod batch;
pub mod codec;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod journal;
pub mod orchestrator;
pub mod report;
pub mod retry;

pub use codec::{AesGcmCodec, EncryptionKey, Envelope, Keyring, PayloadCodec, PlainCodec};
pub use collaborator::{CollaboratorError, TargetChecker, TargetFetcher};
pub use config::OrchestratorConfig;
pub use error::{Result, ScanError};
pub use heartbeat::Heartbeat;
pub use journal::{InMemoryJournal, StepJournal, StepKey, StepRecorder};
pub use orchestrator::{ScanEngine, ScanHandle, ScanOutcome};
pub use retry::{ErrorClass, OperationConfig, RetryPolicy};
pub use vigil_model;
