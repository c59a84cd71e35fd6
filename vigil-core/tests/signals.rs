mod support;

use std::sync::Arc;
use std::time::Duration;

use support::constants::REAL_TIME_GUARD;
use support::fakes::{
    ScriptedChecker, ScriptedFetcher, SignallingFetcher, engine, eventually,
    targets,
};
use vigil_core::orchestrator::ScanOutcome;
use vigil_core::{InMemoryJournal, OrchestratorConfig, ScanError, ScanHandle};
use vigil_model::{ModelError, ScanStatus};

async fn settle(handle: &ScanHandle) -> ScanOutcome {
    tokio::time::timeout(REAL_TIME_GUARD, handle.wait())
        .await
        .expect("execution did not settle in time")
        .expect("execution produced no outcome")
}

#[tokio::test]
async fn cancel_during_second_batch_stops_at_the_boundary() {
    let (checker, mut gate) = ScriptedChecker::all_compliant().gated();
    let checker = Arc::new(checker);
    let engine = engine(
        OrchestratorConfig::default(),
        Arc::new(ScriptedFetcher::new(targets(25))),
        checker.clone(),
        Arc::new(InMemoryJournal::new()),
    );
    let id = engine.start("acme", None).await.unwrap();
    let handle = engine.handle(&id).await.unwrap();

    gate.started(10).await;
    gate.release(10);
    gate.started(10).await;

    engine.cancel(&id, "change freeze").await.unwrap();
    engine.cancel(&id, "second reason").await.unwrap();
    eventually(|| handle.is_cancel_requested()).await;

    // In-flight work is never interrupted mid-batch.
    let live = handle.progress();
    assert_eq!(live.status, ScanStatus::Scanning);
    assert_eq!(live.scanned, 10);

    gate.release(10);
    let outcome = settle(&handle).await;

    assert_eq!(outcome.status, ScanStatus::Cancelled);
    assert_eq!(outcome.progress.scanned, 20);
    assert_eq!(outcome.results.len(), 20);
    assert_eq!(checker.calls(), 20);

    let report = outcome.report.unwrap();
    assert_eq!(report.total, 20);
    let cancellation = report.cancellation.unwrap();
    assert_eq!(cancellation.reason, "change freeze");
    assert_eq!(cancellation.scanned_before_cancel, 20);
}

#[tokio::test]
async fn cancel_sent_while_the_last_step_returns_is_applied() {
    let fetcher = Arc::new(SignallingFetcher::new(Vec::new()));
    let engine = engine(
        OrchestratorConfig::default(),
        fetcher.clone(),
        Arc::new(ScriptedChecker::all_compliant()),
        Arc::new(InMemoryJournal::new()),
    );
    let id = engine.start("acme", None).await.unwrap();
    let handle = engine.handle(&id).await.unwrap();
    fetcher.arm(handle.clone());

    let outcome = settle(&handle).await;
    assert_eq!(outcome.status, ScanStatus::Cancelled);
    let cancellation = outcome.report.unwrap().cancellation.unwrap();
    assert_eq!(cancellation.reason, "cancelled while fetch was returning");
    assert_eq!(cancellation.scanned_before_cancel, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn accepted_cancellation_is_never_lost_at_finalization() {
    for round in 0..40 {
        let engine = engine(
            OrchestratorConfig::default(),
            Arc::new(ScriptedFetcher::new(targets(1))),
            Arc::new(ScriptedChecker::all_compliant()),
            Arc::new(InMemoryJournal::new()),
        );
        let id = engine.start("acme", None).await.unwrap();
        let handle = engine.handle(&id).await.unwrap();

        let signaller = handle.clone();
        let sent = tokio::spawn(async move {
            for _ in 0..round {
                tokio::task::yield_now().await;
            }
            signaller.cancel("racing finalization")
        });
        let accepted = sent.await.unwrap();
        let outcome = settle(&handle).await;

        match accepted {
            Ok(()) => assert_eq!(outcome.status, ScanStatus::Cancelled, "round {round}"),
            Err(ScanError::SignalRejected(_)) => {
                assert_eq!(outcome.status, ScanStatus::Completed, "round {round}")
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}

#[tokio::test]
async fn batch_size_update_applies_from_the_next_batch() {
    let (checker, mut gate) = ScriptedChecker::all_compliant().gated();
    let journal = Arc::new(InMemoryJournal::new());
    let engine = engine(
        OrchestratorConfig::default(),
        Arc::new(ScriptedFetcher::new(targets(12))),
        Arc::new(checker),
        journal.clone(),
    );
    let id = engine.start("acme", None).await.unwrap();
    gate.started(10).await;

    let zero = engine.update_batch_size(&id, 0).await.unwrap_err();
    assert!(matches!(
        zero,
        ScanError::Validation(ModelError::InvalidBatchSize { requested: 0, max: 50 })
    ));
    assert!(engine.update_batch_size(&id, 51).await.is_err());
    assert_eq!(engine.current_batch_size(&id).await.unwrap(), 10);

    let reply = engine.update_batch_size(&id, 1).await.unwrap();
    assert_eq!(reply, "batch size updated: 10 -> 1");
    assert_eq!(engine.current_batch_size(&id).await.unwrap(), 1);

    gate.release(10);
    gate.started(1).await;
    gate.release(1);
    gate.started(1).await;
    gate.release(1);

    let outcome = settle(&engine.handle(&id).await.unwrap()).await;
    assert_eq!(outcome.status, ScanStatus::Completed);
    assert_eq!(outcome.progress.scanned, 12);
    assert_eq!(outcome.progress.batch_size, 1);

    let steps: Vec<String> = journal
        .entries(&id)
        .await
        .into_iter()
        .map(|(step, _)| step.to_string())
        .collect();
    for expected in ["batch/0+10", "batch/10+1", "batch/11+1"] {
        assert!(steps.iter().any(|step| step == expected), "missing {expected}");
    }
}

#[tokio::test]
async fn cancellation_cuts_a_pause_short() {
    let (checker, mut gate) = ScriptedChecker::all_compliant().gated();
    let checker = Arc::new(checker);
    let engine = engine(
        OrchestratorConfig::default(),
        Arc::new(ScriptedFetcher::new(targets(20))),
        checker.clone(),
        Arc::new(InMemoryJournal::new()),
    );
    let id = engine.start("acme", None).await.unwrap();
    let handle = engine.handle(&id).await.unwrap();

    gate.started(10).await;
    engine
        .pause(&id, Duration::from_secs(3_600))
        .await
        .unwrap();
    gate.release(10);
    eventually(|| handle.progress().paused).await;
    assert_eq!(handle.progress().scanned, 10);

    handle.cancel("operator abort").unwrap();
    let outcome = settle(&handle).await;

    assert_eq!(outcome.status, ScanStatus::Cancelled);
    assert!(!outcome.progress.paused);
    assert_eq!(outcome.progress.scanned, 10);
    assert_eq!(checker.calls(), 10);
}

#[tokio::test(start_paused = true)]
async fn pause_holds_the_next_batch_for_its_duration() {
    let engine = engine(
        OrchestratorConfig::default(),
        Arc::new(ScriptedFetcher::new(targets(25))),
        Arc::new(ScriptedChecker::all_compliant()),
        Arc::new(InMemoryJournal::new()),
    );
    let started = tokio::time::Instant::now();
    let id = engine.start("acme", None).await.unwrap();
    engine.pause(&id, Duration::from_secs(45)).await.unwrap();

    let outcome = engine.wait(&id).await.unwrap();

    assert_eq!(outcome.status, ScanStatus::Completed);
    assert_eq!(outcome.progress.scanned, 25);
    assert!(!outcome.progress.paused);
    assert!(started.elapsed() >= Duration::from_secs(45));
}
