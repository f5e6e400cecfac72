use std::sync::Arc;

use crate::support::{
    helpers::{comic, ids_of, init_tracing},
    mock_http::{MockArchive, MockArchiveServer},
};
use anyhow::Result;
use comixsync::{
    Comic, FailureCause, JsonFileStore, Mirror, MirrorConfig, PipelineState, Repository,
    SourceError, XkcdClient,
};
use hyper::StatusCode;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn http_config(url: &str, dir: &TempDir, workers: usize, batch_size: usize) -> Result<MirrorConfig> {
    MirrorConfig::builder()
        .store_path(dir.path().join("comics.json"))
        .source_url(url)
        .worker_count(workers)
        .batch_size(batch_size)
        .build()
}

async fn open_mirror(
    config: &MirrorConfig,
) -> Result<Mirror<XkcdClient, JsonFileStore<Comic>>> {
    let store = JsonFileStore::open(config.store_path()).await?;
    let client = XkcdClient::from_config(config)?;
    Ok(Mirror::new(config, Arc::new(client), Arc::new(store)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fills_gaps_and_skips_failing_comic() -> Result<()> {
    init_tracing();
    let archive = MockArchive::new(6);
    archive.fail_comic(5);
    let server = MockArchiveServer::start(archive.clone()).await?;
    let dir = TempDir::new()?;
    let config = http_config(server.url(), &dir, 2, 2)?;

    {
        let seed = JsonFileStore::<Comic>::open(config.store_path()).await?;
        seed.bulk_insert(vec![comic(1), comic(2), comic(4)]).await?;
    }

    let mut mirror = open_mirror(&config).await?;
    let report = mirror.run(&CancellationToken::new()).await?;

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.upper_bound, Some(6));
    assert_eq!(report.missing, 3);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.skipped_by_cause.get(FailureCause::ServerError), 1);
    assert_eq!(archive.comic_requests(), 3, "only missing comics are requested");

    let reopened = JsonFileStore::<Comic>::open(config.store_path()).await?;
    assert_eq!(ids_of(&reopened.get_all().await?), vec![1, 2, 3, 4, 6]);
    let fetched = reopened.get_by_id(3).await?;
    assert_eq!(fetched.title, "Comic 3");
    assert_eq!(fetched.published.as_deref(), Some("2010-03-04"));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn skipped_comics_are_reported_by_cause() -> Result<()> {
    init_tracing();
    let archive = MockArchive::new(8);
    archive.remove_comic(4);
    archive.fail_comic(6);
    archive.fail_comic(7);
    let server = MockArchiveServer::start(archive.clone()).await?;
    let dir = TempDir::new()?;
    let config = http_config(server.url(), &dir, 2, 3)?;

    let mut mirror = open_mirror(&config).await?;
    let report = mirror.run(&CancellationToken::new()).await?;

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.skipped, 3);
    assert_eq!(report.skipped_by_cause.get(FailureCause::NotFound), 1);
    assert_eq!(report.skipped_by_cause.get(FailureCause::ServerError), 2);
    assert_eq!(report.skipped_by_cause.total(), report.skipped);
    assert_eq!(report.skipped_by_cause.to_string(), "not_found=1 server_error=2");
    assert_eq!(
        ids_of(&mirror.repository().get_all().await?),
        vec![1, 2, 3, 5, 8]
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_store_mirrors_entire_archive() -> Result<()> {
    init_tracing();
    let archive = MockArchive::new(23);
    let server = MockArchiveServer::start(archive.clone()).await?;
    let dir = TempDir::new()?;
    let config = http_config(server.url(), &dir, 4, 5)?;

    let mut mirror = open_mirror(&config).await?;
    let report = mirror.run(&CancellationToken::new()).await?;

    assert!(report.is_complete());
    assert_eq!(report.persisted, 23);
    assert_eq!(
        ids_of(&mirror.repository().get_all().await?),
        (1..=23).collect::<Vec<_>>()
    );
    assert!(mirror.repository().exists());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_run_fetches_nothing_new() -> Result<()> {
    init_tracing();
    let archive = MockArchive::new(10);
    let server = MockArchiveServer::start(archive.clone()).await?;
    let dir = TempDir::new()?;
    let config = http_config(server.url(), &dir, 3, 4)?;

    let mut mirror = open_mirror(&config).await?;
    let first = mirror.run(&CancellationToken::new()).await?;
    assert_eq!(first.persisted, 10);
    let requests_after_first = archive.comic_requests();

    let second = mirror.run(&CancellationToken::new()).await?;
    assert_eq!(second.state, PipelineState::Done);
    assert_eq!(second.missing, 0);
    assert_eq!(archive.comic_requests(), requests_after_first);
    assert_eq!(archive.latest_requests(), 2);
    assert_eq!(mirror.repository().size(), 10);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_comics_are_retried_on_the_next_run() -> Result<()> {
    init_tracing();
    let archive = MockArchive::new(12);
    for num in [3, 7, 11] {
        archive.fail_comic(num);
    }
    let server = MockArchiveServer::start(archive.clone()).await?;
    let dir = TempDir::new()?;
    let config = http_config(server.url(), &dir, 3, 2)?;

    let mut mirror = open_mirror(&config).await?;
    let report = mirror.run(&CancellationToken::new()).await?;
    assert_eq!(report.skipped, 3);
    assert_eq!(
        ids_of(&mirror.repository().get_all().await?),
        vec![1, 2, 4, 5, 6, 8, 9, 10, 12]
    );

    archive.clear_failures();
    let retry = mirror.run(&CancellationToken::new()).await?;
    assert_eq!(retry.missing, 3);
    assert_eq!(retry.fetched, 3);
    assert_eq!(mirror.repository().size(), 12);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unavailable_index_fails_the_run() -> Result<()> {
    init_tracing();
    let archive = MockArchive::new(4);
    archive.fail_latest(StatusCode::SERVICE_UNAVAILABLE);
    let server = MockArchiveServer::start(archive.clone()).await?;
    let dir = TempDir::new()?;
    let config = http_config(server.url(), &dir, 2, 2)?;

    let mut mirror = open_mirror(&config).await?;
    let err = mirror
        .run(&CancellationToken::new())
        .await
        .expect_err("bound failure must abort the run");

    let message = format!("{err:#}");
    assert!(message.contains("mirror run aborted"), "got {message}");
    assert!(message.contains("failed to fetch upper bound"), "got {message}");
    let cause = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<SourceError>());
    assert!(
        matches!(
            cause,
            Some(SourceError::Status {
                method: "latest_comic",
                status: 503
            })
        ),
        "unexpected cause {cause:?}"
    );
    assert_eq!(mirror.current_state(), PipelineState::Failed);
    assert_eq!(archive.comic_requests(), 0);
    assert!(!mirror.repository().exists(), "no file is written on failure");

    server.shutdown().await;
    Ok(())
}
