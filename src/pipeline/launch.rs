use crate::pipeline::hooks::{LaunchHooks, NoopHooks};
use crate::pipeline::input::LauncherInput;
use crate::pipeline::io::StageIO;
use crate::pipeline::stage::{Stage, StageError, StageErrorKind};
use crate::runtime::fatal::panic_message;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Ordered list of stages run against one [`StageIO`] per workload.
///
/// Stages run strictly in order. The first stage that makes the context
/// terminal stops the run; a pipeline whose stages all continue ends in
/// success. Stage errors and panics become terminal failures carrying the
/// original cause, so `run` always returns a terminal context.
pub struct LaunchPipeline {
    stages: Vec<Arc<dyn Stage>>,
    hooks: Arc<dyn LaunchHooks>,
}

impl LaunchPipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages,
            hooks: Arc::new(NoopHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn LaunchHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub async fn run(&self, input: LauncherInput) -> StageIO {
        let mut io = StageIO::new(input);

        for stage in &self.stages {
            if io.is_terminal() {
                break;
            }

            let name = stage.name();
            io.enter_stage(name);
            let started = Instant::now();

            let result = AssertUnwindSafe(stage.execute(&mut io))
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    io.fail_with(StageError::new(name, StageErrorKind::Raised, err));
                }
                Err(panic_payload) => {
                    let panic_msg = panic_message(panic_payload.as_ref());
                    io.fail_with(StageError::new(
                        name,
                        StageErrorKind::Panicked,
                        anyhow::anyhow!(panic_msg),
                    ));
                }
            }

            io.record_outcome(name, started.elapsed());
            tracing::debug!(
                workload_id = %io.workload_id(),
                stage = name,
                terminal = io.is_terminal(),
                "launch stage finished"
            );
        }

        io.succeed();

        if let Some(failure) = io.failure() {
            tracing::warn!(
                workload_id = %io.workload_id(),
                stage = failure.stage(),
                error = %failure,
                "workload launch failed"
            );
            self.hooks.on_failure(&io).await;
        } else {
            tracing::debug!(workload_id = %io.workload_id(), "workload launch succeeded");
            self.hooks.on_success(&io).await;
        }

        io
    }
}
