use crate::pipeline::input::LauncherInput;
use crate::processor::dispatcher::{BatchSummary, BoundedDispatcher};
use crate::registry::client::WorkloadApi;
use crate::registry::model::{WorkloadListRequest, WorkloadStatus};
use crate::registry::query::RetryingRegistryClient;
use crate::runtime::progress::ProgressTracker;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Re-discovers the workloads this data plane claimed but never drove to a
/// terminal state, and re-runs each one through the launch pipeline.
pub struct ClaimRecoveryScanner<A: WorkloadApi> {
    client: RetryingRegistryClient<A>,
    dispatcher: Arc<BoundedDispatcher>,
    progress: Arc<ProgressTracker>,
    telemetry: Arc<Telemetry>,
    data_plane_id: String,
}

impl<A: WorkloadApi> ClaimRecoveryScanner<A> {
    pub fn new(
        client: RetryingRegistryClient<A>,
        dispatcher: Arc<BoundedDispatcher>,
        progress: Arc<ProgressTracker>,
        telemetry: Arc<Telemetry>,
        data_plane_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            dispatcher,
            progress,
            telemetry,
            data_plane_id: data_plane_id.into(),
        }
    }

    pub fn data_plane_id(&self) -> &str {
        &self.data_plane_id
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// Runs one recovery cycle. A registry failure that the retry policy gives
    /// up on fails the whole cycle before anything is dispatched; pipeline
    /// failures are isolated per workload and only show up in the summary.
    #[tracing::instrument(name = "claim_recovery", skip(self), fields(data_plane_id = %self.data_plane_id))]
    pub async fn recover(&self) -> Result<BatchSummary> {
        self.progress.reset();
        self.telemetry.record_recovery_cycle();

        let request = WorkloadListRequest::claimed_by(self.data_plane_id.clone());
        let response = self
            .client
            .query(&request)
            .await
            .with_context(|| format!("failed to list claimed workloads for {}", self.data_plane_id))?;

        let discovered = response.workloads.len();
        self.progress.track_discovered(discovered);
        tracing::info!(discovered, "re-hydrating claimed workloads");

        let inputs: Vec<LauncherInput> = response
            .workloads
            .into_iter()
            .map(|workload| {
                if workload.status != WorkloadStatus::Claimed {
                    tracing::warn!(
                        workload_id = %workload.id,
                        status = %workload.status,
                        "registry returned a non-claimed workload for recovery"
                    );
                }
                LauncherInput::from(workload)
            })
            .collect();

        let summary = self.dispatcher.run_batch(inputs).await;

        tracing::info!(
            discovered,
            resumed = self.progress.resumed(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            "claim recovery cycle finished"
        );

        Ok(summary)
    }
}
