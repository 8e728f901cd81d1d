//! Retrying wrapper around the registry list query.
//!
//! The policy is "keep retrying while the registry is plausibly recovering":
//! connection failures, timeouts, and 5xx responses back off and loop with no
//! attempt ceiling, while 4xx responses, decode failures, and socket-level
//! rejections abort on the spot.

use crate::processor::backoff::{retry_with_backoff, RetryAbort, RetryBackoff, RetryDisposition};
use crate::registry::client::WorkloadApi;
use crate::registry::error::{RegistryError, RegistryErrorKind};
use crate::registry::model::{WorkloadListRequest, WorkloadListResponse};
use crate::registry::retry::{RetryContext, LIST_CLAIMED_RETRY};
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use thiserror::Error;

/// Failure surfaced by [`RetryingRegistryClient::query`] once the backoff
/// loop gives up.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Permanent registry failure (4xx, undecodable body, unknown error).
    #[error("registry query aborted after {attempts} attempt(s)")]
    Aborted {
        attempts: usize,
        #[source]
        source: RegistryError,
    },

    /// The socket layer refused the call. Retrying cannot help.
    #[error("registry query rejected by the socket layer after {attempts} attempt(s)")]
    Fatal {
        attempts: usize,
        #[source]
        source: RegistryError,
    },
}

impl QueryError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, QueryError::Fatal { .. })
    }

    pub fn attempts(&self) -> usize {
        match self {
            QueryError::Aborted { attempts, .. } | QueryError::Fatal { attempts, .. } => *attempts,
        }
    }

    pub fn registry_error(&self) -> &RegistryError {
        match self {
            QueryError::Aborted { source, .. } | QueryError::Fatal { source, .. } => source,
        }
    }

    pub fn kind(&self) -> RegistryErrorKind {
        self.registry_error().kind()
    }
}

/// Maps a single failed registry attempt onto the retry taxonomy.
pub fn classify_registry_error(err: &RegistryError) -> RetryDisposition {
    match err.kind() {
        RegistryErrorKind::ServerPermanent => RetryDisposition::Abort,
        RegistryErrorKind::SocketRejected => RetryDisposition::Fatal,
        RegistryErrorKind::Connect
        | RegistryErrorKind::Timeout
        | RegistryErrorKind::ServerTransient => RetryDisposition::Retry,
        RegistryErrorKind::Decode | RegistryErrorKind::Other => RetryDisposition::Abort,
    }
}

/// Stateless apart from its policy, so one instance can serve concurrent
/// callers.
pub struct RetryingRegistryClient<A: WorkloadApi> {
    api: Arc<A>,
    backoff: RetryBackoff,
    telemetry: Arc<Telemetry>,
}

impl<A: WorkloadApi> Clone for RetryingRegistryClient<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            backoff: self.backoff,
            telemetry: self.telemetry.clone(),
        }
    }
}

impl<A: WorkloadApi> RetryingRegistryClient<A> {
    pub fn new(api: Arc<A>, backoff: RetryBackoff, telemetry: Arc<Telemetry>) -> Self {
        Self {
            api,
            backoff,
            telemetry,
        }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn backoff(&self) -> RetryBackoff {
        self.backoff
    }

    pub async fn query(
        &self,
        request: &WorkloadListRequest,
    ) -> Result<WorkloadListResponse, QueryError> {
        let owner_id = request.owner_ids.join(",");
        let context = RetryContext::new(&LIST_CLAIMED_RETRY, &owner_id);

        let mut retries = 0usize;

        let result = retry_with_backoff(
            self.backoff,
            |_| self.api.list_workloads(request),
            |attempt, backoff, err: &RegistryError| {
                retries += 1;
                self.telemetry.record_registry_retry();
                context.log_retry(attempt, backoff, err);
            },
            |_, err| classify_registry_error(err),
        )
        .await;

        match result {
            Ok(response) => {
                context.log_recovered(retries + 1);
                tracing::debug!(
                    data_plane_id = %owner_id,
                    workloads = response.workloads.len(),
                    "registry list query completed"
                );
                Ok(response)
            }
            Err(RetryAbort {
                error,
                disposition: RetryDisposition::Fatal,
                attempts,
            }) => {
                context.log_fatal(attempts, &error);
                Err(QueryError::Fatal {
                    attempts,
                    source: error,
                })
            }
            Err(RetryAbort {
                error, attempts, ..
            }) => {
                context.log_aborted(attempts, &error);
                Err(QueryError::Aborted {
                    attempts,
                    source: error,
                })
            }
        }
    }
}
