//! Scripted collaborators for driving the engine without a network.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Notify, Semaphore, mpsc};
use vigil_core::orchestrator::ScanHandle;
use vigil_core::{
    AesGcmCodec, CollaboratorError, EncryptionKey, Heartbeat, InMemoryJournal,
    Keyring, OrchestratorConfig, PayloadCodec, ScanEngine, TargetChecker,
    TargetFetcher,
};
use vigil_model::{
    ControlStatus, Credential, FindingRecord, SecurityControl, TargetGroupId,
    TargetRecord,
};

use super::constants::REAL_TIME_GUARD;

pub fn checked_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn targets(count: usize) -> Vec<TargetRecord> {
    (0..count)
        .map(|i| TargetRecord::new(format!("repo-{i:02}"), format!("Repo {i}")))
        .collect()
}

pub fn compliant(target: &TargetRecord) -> FindingRecord {
    SecurityControl::ALL
        .iter()
        .fold(FindingRecord::new(target.id.clone(), checked_at()), |f, c| {
            f.with_status(*c, ControlStatus::Enabled)
        })
}

pub fn codec(byte: u8) -> Arc<dyn PayloadCodec> {
    Arc::new(AesGcmCodec::new(Keyring::new(
        EncryptionKey::new("v1", [byte; 32]).unwrap(),
    )))
}

pub fn engine(
    config: OrchestratorConfig,
    fetcher: Arc<dyn TargetFetcher>,
    checker: Arc<dyn TargetChecker>,
    journal: Arc<InMemoryJournal>,
) -> ScanEngine {
    ScanEngine::new(config, fetcher, checker, journal, codec(7)).unwrap()
}

/// Fetcher that returns a fixed list, optionally failing first.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    targets: Vec<TargetRecord>,
    failures: Mutex<Vec<CollaboratorError>>,
    stall_first_attempt: bool,
    calls: AtomicUsize,
    seen_credentials: Mutex<Vec<Option<String>>>,
}

impl ScriptedFetcher {
    pub fn new(targets: Vec<TargetRecord>) -> Self {
        Self {
            targets,
            ..Self::default()
        }
    }

    /// Errors returned, in order, before the list is served.
    pub fn failing_with(mut self, failures: Vec<CollaboratorError>) -> Self {
        self.failures = Mutex::new(failures.into_iter().rev().collect());
        self
    }

    /// First attempt beats once and then goes silent for ten minutes.
    pub fn stalling_once(mut self) -> Self {
        self.stall_first_attempt = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_credentials(&self) -> Vec<Option<String>> {
        self.seen_credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl TargetFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        _target_group: &TargetGroupId,
        credential: Option<&Credential>,
        heartbeat: &Heartbeat,
    ) -> Result<Vec<TargetRecord>, CollaboratorError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen_credentials
            .lock()
            .unwrap()
            .push(credential.map(|c| c.expose().to_string()));

        if self.stall_first_attempt && attempt == 1 {
            heartbeat.beat();
            tokio::time::sleep(Duration::from_secs(600)).await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop() {
            return Err(err);
        }
        // Paginated listing: one beat per page of five.
        for _ in self.targets.chunks(5) {
            heartbeat.beat();
        }
        Ok(self.targets.clone())
    }
}

type Verdict =
    dyn Fn(&TargetRecord) -> Result<FindingRecord, CollaboratorError> + Send + Sync;

/// Checker whose verdict is a function of the target. Optionally gated:
/// each check announces itself, then waits for a permit.
pub struct ScriptedChecker {
    verdict: Box<Verdict>,
    delays: HashMap<String, Duration>,
    gate: Option<Arc<Semaphore>>,
    started: Option<mpsc::UnboundedSender<String>>,
    calls: AtomicUsize,
    per_target: Mutex<HashMap<String, usize>>,
}

impl std::fmt::Debug for ScriptedChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedChecker")
            .field("calls", &self.calls)
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

impl ScriptedChecker {
    pub fn new<F>(verdict: F) -> Self
    where
        F: Fn(&TargetRecord) -> Result<FindingRecord, CollaboratorError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            verdict: Box::new(verdict),
            delays: HashMap::new(),
            gate: None,
            started: None,
            calls: AtomicUsize::new(0),
            per_target: Mutex::new(HashMap::new()),
        }
    }

    pub fn all_compliant() -> Self {
        Self::new(|target| Ok(compliant(target)))
    }

    pub fn delayed(mut self, target: &str, delay: Duration) -> Self {
        self.delays.insert(target.to_string(), delay);
        self
    }

    pub fn gated(mut self) -> (Self, CheckGate) {
        let gate = Arc::new(Semaphore::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        self.gate = Some(Arc::clone(&gate));
        self.started = Some(tx);
        (self, CheckGate { gate, started: rx })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, target: &str) -> usize {
        self.per_target
            .lock()
            .unwrap()
            .get(target)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl TargetChecker for ScriptedChecker {
    async fn check(
        &self,
        _target_group: &TargetGroupId,
        target: &TargetRecord,
        _credential: Option<&Credential>,
    ) -> Result<FindingRecord, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_target
            .lock()
            .unwrap()
            .entry(target.id.to_string())
            .or_default() += 1;

        if let Some(started) = &self.started {
            let _ = started.send(target.id.to_string());
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = self.delays.get(target.id.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        (self.verdict)(target)
    }
}

/// Test-side controls of a gated checker.
pub struct CheckGate {
    gate: Arc<Semaphore>,
    started: mpsc::UnboundedReceiver<String>,
}

impl CheckGate {
    /// Waits until `count` more checks have started.
    pub async fn started(&mut self, count: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = tokio::time::timeout(REAL_TIME_GUARD, self.started.recv())
                .await
                .expect("checks did not start in time")
                .expect("checker dropped");
            ids.push(id);
        }
        ids
    }

    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }
}

/// Fetcher that, once released, signals the execution through its own
/// handle right before returning.
#[derive(Default)]
pub struct SignallingFetcher {
    targets: Vec<TargetRecord>,
    handle: Mutex<Option<ScanHandle>>,
    release: Notify,
}

impl SignallingFetcher {
    pub fn new(targets: Vec<TargetRecord>) -> Self {
        Self {
            targets,
            ..Self::default()
        }
    }

    pub fn arm(&self, handle: ScanHandle) {
        *self.handle.lock().unwrap() = Some(handle);
        self.release.notify_one();
    }
}

#[async_trait]
impl TargetFetcher for SignallingFetcher {
    async fn fetch(
        &self,
        _target_group: &TargetGroupId,
        _credential: Option<&Credential>,
        heartbeat: &Heartbeat,
    ) -> Result<Vec<TargetRecord>, CollaboratorError> {
        heartbeat.beat();
        self.release.notified().await;
        let handle = self.handle.lock().unwrap().clone();
        if let Some(handle) = handle {
            handle.cancel("cancelled while fetch was returning").unwrap();
        }
        Ok(self.targets.clone())
    }
}

/// Polls `condition` on the real clock until it holds.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(REAL_TIME_GUARD, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}
