use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::{
    init_tracing, test_config, wait_for_size, RecordingStore, ScriptedSource,
};
use anyhow::{Context, Result};
use comixsync::{PipelineState, Repository, Runner};
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_with_scripted_source() -> Result<()> {
    init_tracing();
    let source = Arc::new(ScriptedSource::new(6).failing([5]));
    let store = Arc::new(RecordingStore::new([1, 2, 4]));

    let mut runner = Runner::new(&test_config(2, 2)?, Arc::clone(&source), Arc::clone(&store));
    let report = runner.run().await?;

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(store.ids().await, vec![1, 2, 3, 4, 6]);
    assert_eq!(source.fetches(), 3);
    assert_eq!(report.persisted, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_keeps_flushed_batches_exactly_once() -> Result<()> {
    init_tracing();
    let source = Arc::new(ScriptedSource::new(400).with_delay(Duration::from_millis(5)));
    let store = Arc::new(RecordingStore::new([]));

    let mut runner = Runner::new(&test_config(4, 3)?, Arc::clone(&source), Arc::clone(&store));
    let token = runner.cancellation_token();
    let mut state = runner.state();

    let handle = tokio::spawn(async move { runner.run().await });
    wait_for_size(store.as_ref(), 9, Duration::from_secs(5)).await?;
    token.cancel();

    let report = timeout(Duration::from_secs(5), handle)
        .await
        .context("run should stop promptly after cancellation")??
        .context("cancelled run must not fail")?;

    assert_eq!(report.state, PipelineState::Cancelled);
    assert!(report.persisted < 400, "cancellation should stop early");
    assert_eq!(report.persisted, store.size() as u64);
    assert_eq!(report.fetched, report.persisted, "every fetched item is persisted");

    let inserts = store.inserts();
    let mut seen = HashSet::new();
    for id in inserts.iter().flatten() {
        assert!(seen.insert(*id), "item {id} persisted twice");
    }
    assert_eq!(seen.len(), store.size());

    state.changed().await.ok();
    assert_eq!(*state.borrow(), PipelineState::Cancelled);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bulk_insert_failure_aborts_the_run() -> Result<()> {
    init_tracing();
    let source = Arc::new(ScriptedSource::new(50).with_delay(Duration::from_millis(2)));
    let store = Arc::new(RecordingStore::new([]).fail_after_inserts(1));

    let mut runner = Runner::new(&test_config(2, 4)?, Arc::clone(&source), Arc::clone(&store));
    let outcome = timeout(Duration::from_secs(5), runner.run())
        .await
        .context("runner should stop after a failed insert")?;

    let err = outcome.expect_err("insert failure should abort the run");
    let message = format!("{err:#}");
    assert!(message.contains("mirror run aborted"), "got {message}");
    assert!(message.contains("disk full"), "got {message}");
    assert_eq!(runner.mirror().current_state(), PipelineState::Failed);

    assert_eq!(store.inserts().len(), 1, "no writes after the failure");
    assert_eq!(store.size(), 4);
    assert!(source.fetches() < 50, "workers stop once the sink is gone");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn enumeration_failure_aborts_before_fetching() -> Result<()> {
    init_tracing();
    let source = Arc::new(ScriptedSource::new(10));
    let store = Arc::new(RecordingStore::new([1, 2]).fail_enumeration());

    let mut runner = Runner::new(&test_config(2, 2)?, Arc::clone(&source), Arc::clone(&store));
    let err = runner.run().await.expect_err("enumeration failure is fatal");

    let message = format!("{err:#}");
    assert!(message.contains("failed to enumerate stored items"), "got {message}");
    assert_eq!(source.fetches(), 0);
    assert!(store.inserts().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bound_failure_leaves_store_untouched() -> Result<()> {
    init_tracing();
    let source = Arc::new(ScriptedSource::new(10).with_failing_bound());
    let store = Arc::new(RecordingStore::new([1]));

    let mut runner = Runner::new(&test_config(1, 1)?, Arc::clone(&source), Arc::clone(&store));
    let err = runner.run().await.expect_err("bound failure is fatal");

    assert!(format!("{err:#}").contains("latest comic unavailable"));
    assert_eq!(store.ids().await, vec![1]);
    assert_eq!(source.fetches(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_can_run_again_after_cancellation() -> Result<()> {
    init_tracing();
    let source = Arc::new(ScriptedSource::new(30));
    let store = Arc::new(RecordingStore::new([]));

    let mut runner = Runner::new(&test_config(3, 4)?, Arc::clone(&source), Arc::clone(&store));
    runner.cancellation_token().cancel();
    let cancelled = runner.run().await?;
    assert_eq!(cancelled.state, PipelineState::Cancelled);
    assert_eq!(store.size(), 0);

    assert!(!runner.cancellation_token().is_cancelled());
    let report = runner.run().await?;
    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(store.ids().await, (1..=30).collect::<Vec<_>>());
    Ok(())
}
