//! Bounded worker pool that drives launch pipelines.
//!
//! A fixed set of tokio tasks pulls inputs off one unbounded queue, so at most
//! `parallelism` pipelines run at any instant while any number of inputs can be
//! enqueued. Every input yields exactly one `track_resumed` call, whatever the
//! pipeline outcome.

use crate::pipeline::input::LauncherInput;
use crate::pipeline::launch::LaunchPipeline;
use crate::pipeline::stage::StageErrorKind;
use crate::runtime::fatal::panic_message;
use crate::runtime::progress::ProgressTracker;
use crate::runtime::telemetry::Telemetry;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

/// Aggregate outcome of one [`BoundedDispatcher::run_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Succeeded,
    Failed,
}

struct Job {
    input: LauncherInput,
    done: oneshot::Sender<JobOutcome>,
}

type JobReceiver = Arc<AsyncMutex<mpsc::UnboundedReceiver<Job>>>;

struct DispatcherShared {
    pipeline: Arc<LaunchPipeline>,
    progress: Arc<ProgressTracker>,
    telemetry: Arc<Telemetry>,
}

pub struct BoundedDispatcher {
    parallelism: usize,
    shared: Arc<DispatcherShared>,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BoundedDispatcher {
    /// Spawns `parallelism` workers (clamped to at least one). Must be called
    /// from within a tokio runtime.
    pub fn new(
        parallelism: usize,
        pipeline: Arc<LaunchPipeline>,
        progress: Arc<ProgressTracker>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let parallelism = parallelism.max(1);
        let shared = Arc::new(DispatcherShared {
            pipeline,
            progress,
            telemetry,
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let rx: JobReceiver = Arc::new(AsyncMutex::new(rx));

        let workers = (0..parallelism)
            .map(|worker_id| {
                let shared = shared.clone();
                let rx = rx.clone();
                tokio::spawn(async move { worker_loop(worker_id, shared, rx).await })
            })
            .collect();

        tracing::debug!(parallelism, "launch dispatcher started");

        Self {
            parallelism,
            shared,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Enqueues every input and waits until each one reached a terminal
    /// outcome. An empty batch returns immediately.
    pub async fn run_batch(&self, inputs: Vec<LauncherInput>) -> BatchSummary {
        let submitted = inputs.len();
        if submitted == 0 {
            return BatchSummary::default();
        }

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut pending = Vec::with_capacity(submitted);
        let mut rejected = 0usize;

        for input in inputs {
            let Some(sender) = sender.as_ref() else {
                self.reject(&input, "dispatcher is shut down");
                rejected += 1;
                continue;
            };

            let (done_tx, done_rx) = oneshot::channel();
            if let Err(err) = sender.send(Job {
                input,
                done: done_tx,
            }) {
                self.reject(&err.0.input, "dispatcher queue is closed");
                rejected += 1;
                continue;
            }
            pending.push(done_rx);
        }

        let mut summary = BatchSummary {
            submitted,
            succeeded: 0,
            failed: rejected,
        };

        for outcome in join_all(pending).await {
            match outcome {
                Ok(JobOutcome::Succeeded) => summary.succeeded += 1,
                Ok(JobOutcome::Failed) => summary.failed += 1,
                // Worker dropped the reply after recording progress.
                Err(_) => summary.failed += 1,
            }
        }

        tracing::info!(
            submitted = summary.submitted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "launch batch finished"
        );

        summary
    }

    /// Closes the queue and waits for workers to drain what was already
    /// enqueued. Later `run_batch` calls count every input as failed.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for handle in workers {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "launch worker task failed to join");
            }
        }
    }

    fn reject(&self, input: &LauncherInput, reason: &'static str) {
        tracing::error!(
            workload_id = %input.workload_id,
            reason,
            "claim could not be dispatched"
        );
        self.shared.telemetry.record_launch_failure();
        self.shared.telemetry.record_claim_resumed(input.workload_type);
        self.shared.progress.track_resumed();
    }
}

async fn worker_loop(worker_id: usize, shared: Arc<DispatcherShared>, rx: JobReceiver) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        let Some(Job { input, done }) = job else {
            tracing::debug!(worker = worker_id, "launch worker exiting");
            return;
        };

        let workload_id = input.workload_id.clone();
        let workload_type = input.workload_type;

        let result = AssertUnwindSafe(shared.pipeline.run(input))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(io) if io.is_success() => {
                shared.telemetry.record_launch_success();
                JobOutcome::Succeeded
            }
            Ok(io) => {
                let panicked = io
                    .failure()
                    .is_some_and(|failure| failure.kind() == StageErrorKind::Panicked);
                if panicked {
                    shared.telemetry.record_launch_panic();
                } else {
                    shared.telemetry.record_launch_failure();
                }
                JobOutcome::Failed
            }
            Err(panic_payload) => {
                let panic_msg = panic_message(panic_payload.as_ref());
                tracing::error!(
                    worker = worker_id,
                    workload_id = %workload_id,
                    panic = %panic_msg,
                    "launch pipeline panicked"
                );
                shared.telemetry.record_launch_panic();
                JobOutcome::Failed
            }
        };

        shared.telemetry.record_claim_resumed(workload_type);
        shared.progress.track_resumed();
        let _ = done.send(outcome);
    }
}
