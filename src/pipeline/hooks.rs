use crate::pipeline::io::StageIO;
use crate::registry::client::WorkloadApi;
use crate::registry::model::WorkloadFailureRequest;
use core::future::Future;
use core::pin::Pin;
use std::sync::Arc;

pub type HookFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Source tag attached to failure reports sent to the registry.
pub const FAILURE_SOURCE: &str = "workload-launcher";

/// Callbacks invoked once a pipeline run has become terminal.
pub trait LaunchHooks: Send + Sync + 'static {
    fn on_success<'a>(&'a self, _io: &'a StageIO) -> HookFuture<'a> {
        Box::pin(async {})
    }

    fn on_failure<'a>(&'a self, _io: &'a StageIO) -> HookFuture<'a> {
        Box::pin(async {})
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl LaunchHooks for NoopHooks {}

/// Reports terminal failures to the registry failure endpoint. Reporting is
/// best effort: errors are logged and swallowed.
pub struct RegistryFailureReporter<A: WorkloadApi> {
    api: Arc<A>,
}

impl<A: WorkloadApi> RegistryFailureReporter<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }
}

impl<A: WorkloadApi + 'static> LaunchHooks for RegistryFailureReporter<A> {
    fn on_failure<'a>(&'a self, io: &'a StageIO) -> HookFuture<'a> {
        Box::pin(async move {
            let Some(failure) = io.failure() else {
                return;
            };

            let request = WorkloadFailureRequest {
                workload_id: io.workload_id().to_string(),
                source: FAILURE_SOURCE.to_string(),
                reason: format!("{:#}", failure.cause()),
            };

            match self.api.report_failure(&request).await {
                Ok(()) => tracing::debug!(
                    workload_id = %request.workload_id,
                    stage = failure.stage(),
                    "reported launch failure to registry"
                ),
                Err(err) => tracing::warn!(
                    workload_id = %request.workload_id,
                    stage = failure.stage(),
                    error = %err,
                    "failed to report launch failure to registry"
                ),
            }
        })
    }
}
