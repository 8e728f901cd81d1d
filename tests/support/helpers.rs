use std::{
    collections::HashSet,
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Result};
use claimkeeper::{
    LauncherConfig, LauncherConfigBuilder, RegistryError, Stage, StageFuture, StageIO,
    WorkloadApi, WorkloadFailureRequest, WorkloadListRequest, WorkloadListResponse,
};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub fn base_config(url: &str) -> LauncherConfigBuilder {
    LauncherConfig::builder()
        .registry_url(url)
        .data_plane_id("dp-test")
        .parallelism(2)
        .retry_initial_backoff(Duration::from_millis(5))
        .retry_max_backoff(Duration::from_millis(20))
        .request_timeout(Duration::from_secs(2))
}

/// Records every workload id it sees and fails the ones listed in `fail_ids`.
#[derive(Default)]
pub struct RecordingStage {
    seen: Mutex<Vec<String>>,
    fail_ids: HashSet<String>,
}

impl RecordingStage {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            fail_ids: ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    pub fn seen(&self) -> Vec<String> {
        let mut seen = self.seen.lock().expect("recording stage poisoned").clone();
        seen.sort();
        seen
    }
}

impl Stage for RecordingStage {
    fn name(&self) -> &'static str {
        "record"
    }

    fn execute<'a>(&'a self, io: &'a mut StageIO) -> StageFuture<'a> {
        Box::pin(async move {
            let id = io.workload_id().to_string();
            self.seen
                .lock()
                .expect("recording stage poisoned")
                .push(id.clone());
            if self.fail_ids.contains(&id) {
                io.fail(anyhow!("compute plane rejected {id}"));
            }
            Ok(())
        })
    }
}

/// Blocks every run until a permit is released, tracking how many runs are
/// inside the stage at once.
pub struct GateStage {
    gate: Semaphore,
    active: AtomicUsize,
    peak: AtomicUsize,
    entered: AtomicUsize,
}

impl GateStage {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            entered: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

impl Stage for GateStage {
    fn name(&self) -> &'static str {
        "gate"
    }

    fn execute<'a>(&'a self, _io: &'a mut StageIO) -> StageFuture<'a> {
        Box::pin(async move {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let permit = self.gate.acquire().await?;
            permit.forget();

            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Serves `healthy_lists` empty list results, then fails every list call as
/// if the OS had refused the socket.
pub struct DeniedAfterApi {
    healthy_lists: usize,
    calls: AtomicUsize,
}

impl DeniedAfterApi {
    pub fn new(healthy_lists: usize) -> Self {
        Self {
            healthy_lists,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WorkloadApi for DeniedAfterApi {
    fn list_workloads<'a>(
        &'a self,
        _request: &'a WorkloadListRequest,
    ) -> BoxFuture<'a, Result<WorkloadListResponse, RegistryError>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let healthy = call < self.healthy_lists;
        Box::pin(async move {
            if healthy {
                return Ok(WorkloadListResponse {
                    workloads: Vec::new(),
                });
            }
            let denied = io::Error::new(io::ErrorKind::PermissionDenied, "operation not permitted");
            Err(RegistryError::from_io("workload_list", denied))
        })
    }

    fn report_failure<'a>(
        &'a self,
        _request: &'a WorkloadFailureRequest,
    ) -> BoxFuture<'a, Result<(), RegistryError>> {
        Box::pin(async { Ok(()) })
    }
}

pub async fn wait_until<F>(mut condition: F, timeout: Duration, what: &str) -> Result<()>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!("timed out waiting for {what}");
        }
        sleep(Duration::from_millis(5)).await;
    }
}
