pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod runtime;

pub use pipeline::hooks::{HookFuture, LaunchHooks, NoopHooks, RegistryFailureReporter};
pub use pipeline::input::LauncherInput;
pub use pipeline::io::{StageIO, StageOutcome, StageStatus, Terminal};
pub use pipeline::launch::LaunchPipeline;
pub use pipeline::stage::{Stage, StageError, StageErrorKind, StageFuture};
pub use processor::backoff::{retry_with_backoff, RetryAbort, RetryBackoff, RetryDisposition};
pub use processor::dispatcher::{BatchSummary, BoundedDispatcher};
pub use processor::scanner::ClaimRecoveryScanner;
pub use registry::model::{
    Workload, WorkloadFailureRequest, WorkloadLabel, WorkloadListRequest, WorkloadListResponse,
    WorkloadStatus, WorkloadType,
};
pub use registry::{
    classify_registry_error, HttpWorkloadApi, QueryError, RegistryClientOptions, RegistryError,
    RegistryErrorKind, RetryingRegistryClient, WorkloadApi,
};
pub use runtime::config::{LauncherConfig, LauncherConfigBuilder, LauncherConfigParams};
pub use runtime::fatal::FatalErrorHandler;
pub use runtime::progress::{ProgressSnapshot, ProgressTracker};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
