//! Mutable per-run context threaded through every stage.

use crate::pipeline::input::LauncherInput;
use crate::pipeline::stage::{StageError, StageErrorKind};
use anyhow::Error as AnyError;
use std::time::Duration;

const UNKNOWN_STAGE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage finished and left the run open for the next stage.
    Continued,
    /// Stage finished the run successfully.
    Succeeded,
    /// Stage finished the run with a failure.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: &'static str,
    pub status: StageStatus,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum Terminal {
    Success,
    Failure(StageError),
}

/// Owned by exactly one pipeline run. Once terminal, it stays terminal: the
/// first `succeed`/`fail` wins and no later stage executes.
#[derive(Debug)]
pub struct StageIO {
    input: LauncherInput,
    outcomes: Vec<StageOutcome>,
    terminal: Option<Terminal>,
    current_stage: Option<&'static str>,
}

impl StageIO {
    pub fn new(input: LauncherInput) -> Self {
        Self {
            input,
            outcomes: Vec::new(),
            terminal: None,
            current_stage: None,
        }
    }

    pub fn input(&self) -> &LauncherInput {
        &self.input
    }

    pub fn workload_id(&self) -> &str {
        &self.input.workload_id
    }

    /// Outcomes of the stages that ran, in execution order.
    pub fn outcomes(&self) -> &[StageOutcome] {
        &self.outcomes
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.terminal, Some(Terminal::Success))
    }

    pub fn failure(&self) -> Option<&StageError> {
        match &self.terminal {
            Some(Terminal::Failure(err)) => Some(err),
            _ => None,
        }
    }

    /// Ends the run successfully. Ignored if the run is already terminal.
    pub fn succeed(&mut self) {
        if self.terminal.is_none() {
            self.terminal = Some(Terminal::Success);
        }
    }

    /// Ends the run with `cause`, attributed to the stage currently executing.
    /// Ignored if the run is already terminal.
    pub fn fail(&mut self, cause: AnyError) {
        let stage = self.current_stage.unwrap_or(UNKNOWN_STAGE);
        self.fail_with(StageError::new(stage, StageErrorKind::Reported, cause));
    }

    pub(crate) fn fail_with(&mut self, error: StageError) {
        if self.terminal.is_none() {
            self.terminal = Some(Terminal::Failure(error));
        }
    }

    pub(crate) fn enter_stage(&mut self, stage: &'static str) {
        self.current_stage = Some(stage);
    }

    pub(crate) fn record_outcome(&mut self, stage: &'static str, elapsed: Duration) {
        let status = match &self.terminal {
            None => StageStatus::Continued,
            Some(Terminal::Success) => StageStatus::Succeeded,
            Some(Terminal::Failure(_)) => StageStatus::Failed,
        };
        self.outcomes.push(StageOutcome {
            stage,
            status,
            elapsed,
        });
        self.current_stage = None;
    }
}
