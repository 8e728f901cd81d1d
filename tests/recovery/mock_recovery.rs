use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{base_config, init_tracing, wait_until, GateStage, RecordingStage},
    mock_registry::{MockRegistry, MockRegistryServer},
};
use anyhow::{Context, Result};
use claimkeeper::{QueryError, RegistryErrorKind, Runner, Stage, WorkloadType};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn recovers_only_own_claimed_workloads() -> Result<()> {
    init_tracing();
    let registry = MockRegistry::new();
    registry.add_claimed("dp-test", 5);
    registry.add_workload("foreign", "dp-other", "claimed");
    registry.add_workload("running", "dp-test", "running");
    let server = MockRegistryServer::start(registry.clone()).await?;

    let stage = Arc::new(RecordingStage::default());
    let runner = Runner::new(
        base_config(server.url()).build()?,
        vec![stage.clone() as Arc<dyn Stage>],
    )?;

    let summary = runner.recover_once().await?;

    assert_eq!(summary.submitted, 5);
    assert_eq!(summary.succeeded, 5);
    assert_eq!(
        stage.seen(),
        vec!["wl-0", "wl-1", "wl-2", "wl-3", "wl-4"]
    );
    assert_eq!(runner.progress().discovered(), 5);
    assert_eq!(runner.progress().resumed(), 5);
    assert_eq!(runner.telemetry().claims_resumed(WorkloadType::Sync), 5);

    let requests = registry.list_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0],
        json!({"dataplane": ["dp-test"], "status": ["claimed"]})
    );

    runner.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_registry_leaves_counters_at_zero() -> Result<()> {
    init_tracing();
    let registry = MockRegistry::new();
    let server = MockRegistryServer::start(registry.clone()).await?;

    let stage = Arc::new(RecordingStage::default());
    let runner = Runner::new(
        base_config(server.url()).build()?,
        vec![stage.clone() as Arc<dyn Stage>],
    )?;

    let summary = runner.recover_once().await?;

    assert_eq!(summary.submitted, 0);
    assert!(stage.seen().is_empty());
    assert_eq!(runner.progress().discovered(), 0);
    assert_eq!(runner.progress().resumed(), 0);
    timeout(Duration::from_secs(1), runner.progress().wait_until_resumed())
        .await
        .context("empty cycle should count as caught up")?;

    runner.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_server_errors_are_retried() -> Result<()> {
    init_tracing();
    let registry = MockRegistry::new();
    registry.add_claimed("dp-test", 2);
    registry.fail_next_lists(&[503, 502]);
    let server = MockRegistryServer::start(registry.clone()).await?;

    let stage = Arc::new(RecordingStage::default());
    let runner = Runner::new(
        base_config(server.url()).build()?,
        vec![stage.clone() as Arc<dyn Stage>],
    )?;

    let summary = timeout(Duration::from_secs(5), runner.recover_once())
        .await
        .context("recovery should finish once the registry recovers")??;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(registry.list_calls(), 3);
    assert_eq!(runner.telemetry().registry_retries(), 2);

    runner.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn client_error_fails_cycle_without_retry() -> Result<()> {
    init_tracing();
    let registry = MockRegistry::new();
    registry.add_claimed("dp-test", 3);
    registry.fail_next_lists(&[400]);
    let server = MockRegistryServer::start(registry.clone()).await?;

    let stage = Arc::new(RecordingStage::default());
    let runner = Runner::new(
        base_config(server.url()).build()?,
        vec![stage.clone() as Arc<dyn Stage>],
    )?;

    let err = runner
        .recover_once()
        .await
        .expect_err("4xx should fail the cycle");

    let query_err = err
        .downcast_ref::<QueryError>()
        .context("query error should be in the chain")?;
    assert_eq!(query_err.kind(), RegistryErrorKind::ServerPermanent);
    assert_eq!(query_err.attempts(), 1);
    assert_eq!(registry.list_calls(), 1);
    assert_eq!(runner.telemetry().registry_retries(), 0);
    assert!(stage.seen().is_empty());

    runner.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refused_connections_keep_retrying() -> Result<()> {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let runner = Runner::new(
        base_config(&format!("http://{addr}")).build()?,
        vec![Arc::new(RecordingStage::default()) as Arc<dyn Stage>],
    )?;

    let outcome = timeout(Duration::from_millis(300), runner.recover_once()).await;

    assert!(outcome.is_err(), "connection refusal must not abort the query");
    assert!(runner.telemetry().registry_retries() >= 2);

    runner.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stage_failures_are_reported_and_isolated() -> Result<()> {
    init_tracing();
    let registry = MockRegistry::new();
    registry.add_claimed("dp-test", 4);
    let server = MockRegistryServer::start(registry.clone()).await?;

    let stage = Arc::new(RecordingStage::failing(&["wl-1"]));
    let runner = Runner::new(
        base_config(server.url()).build()?,
        vec![stage.clone() as Arc<dyn Stage>],
    )?;

    let summary = runner.recover_once().await?;

    assert_eq!(summary.submitted, 4);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(runner.progress().resumed(), 4);

    let reports = registry.failure_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["workloadId"], "wl-1");
    assert_eq!(reports[0]["source"], "workload-launcher");
    let reason = reports[0]["reason"].as_str().unwrap_or_default();
    assert!(
        reason.contains("compute plane rejected wl-1"),
        "unexpected failure reason {reason}"
    );

    runner.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_never_exceed_parallelism() -> Result<()> {
    init_tracing();
    let registry = MockRegistry::new();
    registry.add_claimed("dp-test", 10);
    let server = MockRegistryServer::start(registry.clone()).await?;

    let gate = Arc::new(GateStage::new());
    let runner = Arc::new(Runner::new(
        base_config(server.url()).parallelism(3).build()?,
        vec![gate.clone() as Arc<dyn Stage>],
    )?);

    let recovery = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.recover_once().await })
    };

    wait_until(|| gate.entered() == 3, Duration::from_secs(5), "three runs").await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gate.entered(), 3, "queued inputs must wait for a free slot");
    assert_eq!(gate.active(), 3);
    assert_eq!(runner.progress().resumed(), 0);

    gate.release(10);
    let summary = timeout(Duration::from_secs(5), recovery)
        .await
        .context("batch should finish once released")???;

    assert_eq!(summary.succeeded, 10);
    assert_eq!(gate.entered(), 10);
    assert!(gate.peak() <= 3, "peak concurrency {} exceeded 3", gate.peak());
    assert_eq!(runner.progress().resumed(), 10);

    runner.shutdown().await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bearer_token_is_sent_to_registry() -> Result<()> {
    init_tracing();
    let registry = MockRegistry::new();
    let server = MockRegistryServer::start(registry.clone()).await?;

    let runner = Runner::new(
        base_config(server.url())
            .registry_auth_token("s3cret")
            .build()?,
        vec![Arc::new(RecordingStage::default()) as Arc<dyn Stage>],
    )?;

    runner.recover_once().await?;

    assert_eq!(
        registry.auth_headers(),
        vec![Some("Bearer s3cret".to_string())]
    );

    runner.shutdown().await;
    server.shutdown().await;
    Ok(())
}
