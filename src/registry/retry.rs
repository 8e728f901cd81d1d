//! Shared retry context, logging helpers, and canned message templates used by
//! the registry client to keep instrumentation consistent across operations.

use crate::registry::error::{RegistryError, RegistryErrorKind};
use std::time::Duration;

/// Logging labels that describe how a particular registry operation reports
/// retries, aborts, and fatal socket rejections.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) connect_retry: &'static str,
    pub(crate) server_retry: &'static str,
    pub(crate) aborted: &'static str,
    pub(crate) fatal: &'static str,
    pub(crate) recovered: &'static str,
}

/// Context passed into the backoff loop so every log line carries the owner
/// (data plane) the query runs on behalf of.
#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    owner_id: &'a str,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn new(messages: &'a RetryMessages, owner_id: &'a str) -> Self {
        Self { owner_id, messages }
    }

    pub(crate) fn log_retry(&self, attempt: usize, backoff: Duration, err: &RegistryError) {
        let backoff_ms = duration_to_millis(backoff);
        let message = match err.kind() {
            RegistryErrorKind::ServerTransient => self.messages.server_retry,
            _ => self.messages.connect_retry,
        };
        tracing::warn!(
            data_plane_id = self.owner_id,
            method = err.method(),
            attempt,
            backoff_ms,
            error = %err,
            "{}",
            message
        );
    }

    pub(crate) fn log_aborted(&self, attempt: usize, err: &RegistryError) {
        tracing::error!(
            data_plane_id = self.owner_id,
            method = err.method(),
            status = err.status(),
            attempt,
            error = %err,
            "{}",
            self.messages.aborted
        );
    }

    pub(crate) fn log_fatal(&self, attempt: usize, err: &RegistryError) {
        tracing::error!(
            data_plane_id = self.owner_id,
            method = err.method(),
            attempt,
            error = %err,
            "{}",
            self.messages.fatal
        );
    }

    pub(crate) fn log_recovered(&self, attempt: usize) {
        if attempt > 1 {
            tracing::info!(
                data_plane_id = self.owner_id,
                attempt,
                "{}",
                self.messages.recovered
            );
        }
    }
}

fn duration_to_millis(backoff: Duration) -> u64 {
    backoff.as_millis().min(u128::from(u64::MAX)) as u64
}

pub(crate) const LIST_CLAIMED_RETRY: RetryMessages = RetryMessages {
    connect_retry: "failed to reach workload registry fetching claimed workloads; retrying",
    server_retry: "workload registry returned a server error fetching claimed workloads; retrying",
    aborted: "fetching claimed workloads failed with a non-retryable error",
    fatal: "socket operation not permitted fetching claimed workloads; check network policy",
    recovered: "fetched claimed workloads after retrying",
};
