use crate::pipeline::hooks::RegistryFailureReporter;
use crate::pipeline::launch::LaunchPipeline;
use crate::pipeline::stage::Stage;
use crate::processor::dispatcher::{BatchSummary, BoundedDispatcher};
use crate::processor::scanner::ClaimRecoveryScanner;
use crate::registry::client::{HttpWorkloadApi, WorkloadApi};
use crate::registry::query::{QueryError, RetryingRegistryClient};
use crate::runtime::config::LauncherConfig;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::progress::ProgressTracker;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Error as AnyError, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Wires configuration, the registry client, the dispatcher and the launch
/// pipeline together and drives recovery cycles until shutdown.
pub struct Runner<A: WorkloadApi + 'static = HttpWorkloadApi> {
    config: LauncherConfig,
    scanner: ClaimRecoveryScanner<A>,
    dispatcher: Arc<BoundedDispatcher>,
    progress: Arc<ProgressTracker>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    fatal_handler: FatalErrorHandler,
}

impl Runner<HttpWorkloadApi> {
    /// Builds a runner talking to the registry configured in `config`. Must be
    /// called from within a tokio runtime.
    pub fn new(config: LauncherConfig, stages: Vec<Arc<dyn Stage>>) -> Result<Self> {
        let api = Arc::new(HttpWorkloadApi::from_config(&config)?);
        Ok(Self::with_api(config, api, stages))
    }
}

impl<A: WorkloadApi + 'static> Runner<A> {
    pub fn with_api(config: LauncherConfig, api: Arc<A>, stages: Vec<Arc<dyn Stage>>) -> Self {
        let telemetry = Arc::new(Telemetry::default());
        let progress = Arc::new(ProgressTracker::new());

        let pipeline = LaunchPipeline::new(stages)
            .with_hooks(Arc::new(RegistryFailureReporter::new(api.clone())));
        let dispatcher = Arc::new(BoundedDispatcher::new(
            config.parallelism(),
            Arc::new(pipeline),
            progress.clone(),
            telemetry.clone(),
        ));
        let client = RetryingRegistryClient::new(api, config.retry_backoff(), telemetry.clone());
        let scanner = ClaimRecoveryScanner::new(
            client,
            dispatcher.clone(),
            progress.clone(),
            telemetry.clone(),
            config.data_plane_id(),
        );

        let shutdown = CancellationToken::new();
        let fatal_handler = FatalErrorHandler::new(shutdown.clone());

        Self {
            config,
            scanner,
            dispatcher,
            progress,
            telemetry,
            shutdown,
            fatal_handler,
        }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        self.progress.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Error that stopped the runner, if any.
    pub fn fatal_error(&self) -> Option<AnyError> {
        self.fatal_handler.error()
    }

    /// Runs exactly one recovery cycle.
    pub async fn recover_once(&self) -> Result<BatchSummary> {
        self.scanner.recover().await
    }

    /// Runs a startup cycle, then one cycle per `recovery_interval` (if set) until the
    /// shutdown token is cancelled. A failed startup cycle is returned as is. Later
    /// cycles log permanent failures and try again on the next tick, except socket
    /// rejections, which stop the runner and are returned.
    ///
    /// A cycle already in flight is never interrupted; cancellation is observed
    /// between cycles.
    pub async fn run_until_cancelled(&self) -> Result<()> {
        let result = self.run_cycles().await;
        self.shutdown().await;
        result
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        let signal_task = tokio::spawn(async move {
            tokio::select! {
                result = signal::ctrl_c() => {
                    match result {
                        Ok(()) => tracing::info!("Ctrl-C received; shutting down runner"),
                        Err(err) => tracing::warn!(error = %err, "failed to listen for Ctrl-C"),
                    }
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        });

        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");
        let result = self.run_until_cancelled().await;

        self.shutdown.cancel();
        if let Err(err) = signal_task.await {
            tracing::warn!(error = %err, "signal listener task failed to join");
        }
        result
    }

    /// Closes the dispatcher queue and waits for in-flight pipelines to finish.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }

    async fn run_cycles(&self) -> Result<()> {
        if let Err(err) = self.recover_once().await {
            if is_socket_rejection(&err) {
                return Err(self.fatal_handler.trigger("startup recovery cycle", err));
            }
            return Err(err);
        }

        let Some(interval) = self.config.recovery_interval() else {
            self.shutdown.cancelled().await;
            return Ok(());
        };

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(interval) => {}
            }

            if let Err(err) = self.recover_once().await {
                if is_socket_rejection(&err) {
                    self.fatal_handler.trigger("periodic recovery cycle", err);
                    break;
                }
                tracing::error!(
                    data_plane_id = self.config.data_plane_id(),
                    error = %format!("{err:#}"),
                    "recovery cycle failed; retrying on next tick"
                );
            }
        }

        match self.fatal_handler.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn is_socket_rejection(err: &AnyError) -> bool {
    err.downcast_ref::<QueryError>()
        .is_some_and(QueryError::is_fatal)
}
