use crate::pipeline::io::StageIO;
use anyhow::Error as AnyError;
use core::future::Future;
use core::pin::Pin;

pub type StageFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AnyError>> + Send + 'a>>;

/// One step of the launch pipeline.
///
/// A stage mutates the shared [`StageIO`] and either:
/// - returns `Ok(())` leaving the context non-terminal, so the next stage runs;
/// - calls [`StageIO::succeed`] to finish the run early with success;
/// - calls [`StageIO::fail`] (or returns `Err`) to finish the run with failure.
///
/// Stages must be idempotent: after a crash the same workload is recovered and
/// re-run from the first stage, so a stage has to detect work it already did
/// (e.g. an existing submission) instead of repeating it.
pub trait Stage: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn execute<'a>(&'a self, io: &'a mut StageIO) -> StageFuture<'a>;
}

/// How a stage ended up failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageErrorKind {
    /// The stage marked the context failed itself.
    Reported,
    /// The stage returned an error.
    Raised,
    /// The stage panicked.
    Panicked,
}

/// Failure cause attached to a terminal [`StageIO`].
#[derive(Debug)]
pub struct StageError {
    stage: &'static str,
    kind: StageErrorKind,
    source: AnyError,
}

impl StageError {
    pub fn new(stage: &'static str, kind: StageErrorKind, source: AnyError) -> Self {
        Self {
            stage,
            kind,
            source,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> StageErrorKind {
        self.kind
    }

    pub fn cause(&self) -> &AnyError {
        &self.source
    }

    pub fn into_source(self) -> AnyError {
        self.source
    }
}

impl core::fmt::Display for StageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            StageErrorKind::Reported => write!(f, "stage {} failed: {}", self.stage, self.source),
            StageErrorKind::Raised => {
                write!(f, "stage {} raised an error: {}", self.stage, self.source)
            }
            StageErrorKind::Panicked => write!(f, "stage {} panicked: {}", self.stage, self.source),
        }
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
