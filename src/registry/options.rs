//! Per-request knobs for the registry transport. Backoff between attempts is
//! configured on `RetryBackoff`, not here.

use anyhow::{bail, Result};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct RegistryClientOptions {
    pub request_timeout: Duration,
    pub auth_token: Option<String>,
}

impl Default for RegistryClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            auth_token: None,
        }
    }
}

impl RegistryClientOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        Ok(())
    }
}
