use crate::registry::model::WorkloadType;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

const WORKLOAD_TYPES: usize = 4;

fn type_slot(workload_type: WorkloadType) -> usize {
    match workload_type {
        WorkloadType::Sync => 0,
        WorkloadType::Check => 1,
        WorkloadType::Discover => 2,
        WorkloadType::Spec => 3,
    }
}

/// In-process counters for claim recovery. Nothing is exported; callers read
/// them through [`Telemetry::snapshot`].
#[derive(Default, Debug)]
pub struct Telemetry {
    claims_resumed: [AtomicU64; WORKLOAD_TYPES],
    registry_retries: AtomicU64,
    launch_successes: AtomicU64,
    launch_failures: AtomicU64,
    launch_panics: AtomicU64,
    recovery_cycles: AtomicU64,
}

impl Telemetry {
    pub fn record_claim_resumed(&self, workload_type: WorkloadType) {
        self.claims_resumed[type_slot(workload_type)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_registry_retry(&self) {
        self.registry_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_launch_success(&self) {
        self.launch_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_launch_failure(&self) {
        self.launch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A panic is also a failure, so both counters move.
    pub fn record_launch_panic(&self) {
        self.launch_panics.fetch_add(1, Ordering::Relaxed);
        self.launch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery_cycle(&self) {
        self.recovery_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn claims_resumed(&self, workload_type: WorkloadType) -> u64 {
        self.claims_resumed[type_slot(workload_type)].load(Ordering::Relaxed)
    }

    pub fn registry_retries(&self) -> u64 {
        self.registry_retries.load(Ordering::Relaxed)
    }

    pub fn launch_successes(&self) -> u64 {
        self.launch_successes.load(Ordering::Relaxed)
    }

    pub fn launch_failures(&self) -> u64 {
        self.launch_failures.load(Ordering::Relaxed)
    }

    pub fn launch_panics(&self) -> u64 {
        self.launch_panics.load(Ordering::Relaxed)
    }

    pub fn recovery_cycles(&self) -> u64 {
        self.recovery_cycles.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            resumed_sync: self.claims_resumed(WorkloadType::Sync),
            resumed_check: self.claims_resumed(WorkloadType::Check),
            resumed_discover: self.claims_resumed(WorkloadType::Discover),
            resumed_spec: self.claims_resumed(WorkloadType::Spec),
            registry_retries: self.registry_retries(),
            launch_successes: self.launch_successes(),
            launch_failures: self.launch_failures(),
            launch_panics: self.launch_panics(),
            recovery_cycles: self.recovery_cycles(),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub resumed_sync: u64,
    pub resumed_check: u64,
    pub resumed_discover: u64,
    pub resumed_spec: u64,
    pub registry_retries: u64,
    pub launch_successes: u64,
    pub launch_failures: u64,
    pub launch_panics: u64,
    pub recovery_cycles: u64,
}

impl TelemetrySnapshot {
    pub fn resumed_total(&self) -> u64 {
        self.resumed_sync + self.resumed_check + self.resumed_discover + self.resumed_spec
    }
}
