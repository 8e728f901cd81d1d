use crate::processor::backoff::RetryBackoff;
use crate::registry::options::RegistryClientOptions;
use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PARALLELISM: usize = 10;
const DEFAULT_RETRY_INITIAL_BACKOFF_SECS: u64 = 20;
const DEFAULT_RETRY_MAX_BACKOFF_SECS: u64 = 10 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_REGISTRY_URL: &str = "CLAIMKEEPER_REGISTRY_URL";
pub const ENV_REGISTRY_TOKEN: &str = "CLAIMKEEPER_REGISTRY_TOKEN";
pub const ENV_DATA_PLANE_ID: &str = "CLAIMKEEPER_DATA_PLANE_ID";
pub const ENV_PARALLELISM: &str = "CLAIMKEEPER_PARALLELISM";
pub const ENV_RETRY_INITIAL_BACKOFF_MS: &str = "CLAIMKEEPER_RETRY_INITIAL_BACKOFF_MS";
pub const ENV_RETRY_MAX_BACKOFF_MS: &str = "CLAIMKEEPER_RETRY_MAX_BACKOFF_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "CLAIMKEEPER_REQUEST_TIMEOUT_MS";
pub const ENV_RECOVERY_INTERVAL_MS: &str = "CLAIMKEEPER_RECOVERY_INTERVAL_MS";

/// Runtime configuration for claim recovery.
///
/// All instances must be constructed via [`LauncherConfig::builder`], [`LauncherConfig::new`]
/// or [`LauncherConfig::from_env`] so invariants are validated before any consumer observes
/// the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    registry_url: String,
    registry_auth_token: Option<String>,
    data_plane_id: String,
    parallelism: usize,
    retry_initial_backoff: Duration,
    retry_max_backoff: Duration,
    request_timeout: Duration,
    recovery_interval: Option<Duration>,
}

pub struct LauncherConfigParams {
    pub registry_url: String,
    pub registry_auth_token: Option<String>,
    pub data_plane_id: String,
    pub parallelism: usize,
    pub retry_initial_backoff: Duration,
    pub retry_max_backoff: Duration,
    pub request_timeout: Duration,
    pub recovery_interval: Option<Duration>,
}

impl LauncherConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> LauncherConfigBuilder {
        LauncherConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`LauncherConfig::builder`] when most values use defaults.
    pub fn new(params: LauncherConfigParams) -> Result<Self> {
        let LauncherConfigParams {
            registry_url,
            registry_auth_token,
            data_plane_id,
            parallelism,
            retry_initial_backoff,
            retry_max_backoff,
            request_timeout,
            recovery_interval,
        } = params;

        let config = Self {
            registry_url: trimmed_string(registry_url),
            registry_auth_token: registry_auth_token
                .map(trimmed_string)
                .filter(|token| !token.is_empty()),
            data_plane_id: trimmed_string(data_plane_id),
            parallelism,
            retry_initial_backoff,
            retry_max_backoff,
            request_timeout,
            recovery_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from `CLAIMKEEPER_*` environment variables.
    ///
    /// `CLAIMKEEPER_REGISTRY_URL` and `CLAIMKEEPER_DATA_PLANE_ID` are required; every other
    /// variable falls back to its default when unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key))
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let registry_url = read_required(&lookup, ENV_REGISTRY_URL)?;
        let data_plane_id = read_required(&lookup, ENV_DATA_PLANE_ID)?;
        let registry_auth_token = read_optional(&lookup, ENV_REGISTRY_TOKEN)?;
        let parallelism = parse_with_default(&lookup, ENV_PARALLELISM, DEFAULT_PARALLELISM)?;
        let retry_initial_backoff = parse_millis_with_default(
            &lookup,
            ENV_RETRY_INITIAL_BACKOFF_MS,
            Duration::from_secs(DEFAULT_RETRY_INITIAL_BACKOFF_SECS),
        )?;
        let retry_max_backoff = parse_millis_with_default(
            &lookup,
            ENV_RETRY_MAX_BACKOFF_MS,
            Duration::from_secs(DEFAULT_RETRY_MAX_BACKOFF_SECS),
        )?;
        let request_timeout = parse_millis_with_default(
            &lookup,
            ENV_REQUEST_TIMEOUT_MS,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        )?;
        let recovery_interval = read_optional(&lookup, ENV_RECOVERY_INTERVAL_MS)?
            .map(|value| parse_value::<u64>(ENV_RECOVERY_INTERVAL_MS, &value))
            .transpose()?
            .map(Duration::from_millis);

        Self::new(LauncherConfigParams {
            registry_url,
            registry_auth_token,
            data_plane_id,
            parallelism,
            retry_initial_backoff,
            retry_max_backoff,
            request_timeout,
            recovery_interval,
        })
    }

    /// Base URL of the workload registry (scheme included).
    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    pub fn registry_auth_token(&self) -> Option<&str> {
        self.registry_auth_token.as_deref()
    }

    /// Owner id whose CLAIMED workloads are recovered.
    pub fn data_plane_id(&self) -> &str {
        &self.data_plane_id
    }

    /// Upper bound on concurrently running launch pipelines.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn retry_initial_backoff(&self) -> Duration {
        self.retry_initial_backoff
    }

    pub fn retry_max_backoff(&self) -> Duration {
        self.retry_max_backoff
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Period between recovery cycles after startup. `None` means startup only.
    pub fn recovery_interval(&self) -> Option<Duration> {
        self.recovery_interval
    }

    pub fn retry_backoff(&self) -> RetryBackoff {
        RetryBackoff::new(self.retry_initial_backoff, self.retry_max_backoff)
    }

    pub fn registry_options(&self) -> RegistryClientOptions {
        RegistryClientOptions {
            request_timeout: self.request_timeout,
            auth_token: self.registry_auth_token.clone(),
        }
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.registry_url)?;
        ensure_not_empty(&self.data_plane_id, "data_plane_id")?;

        if self.parallelism == 0 {
            bail!("parallelism must be greater than 0");
        }

        if self.retry_initial_backoff.is_zero() {
            bail!("retry_initial_backoff must be greater than 0");
        }

        if self.retry_max_backoff.is_zero() {
            bail!("retry_max_backoff must be greater than 0");
        }

        if self.retry_initial_backoff > self.retry_max_backoff {
            bail!(
                "retry_initial_backoff ({:?}) must not exceed retry_max_backoff ({:?})",
                self.retry_initial_backoff,
                self.retry_max_backoff,
            );
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if matches!(self.recovery_interval, Some(interval) if interval.is_zero()) {
            bail!("recovery_interval must be greater than 0 when set");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct LauncherConfigBuilder {
    registry_url: Option<String>,
    registry_auth_token: Option<String>,
    data_plane_id: Option<String>,
    parallelism: Option<usize>,
    retry_initial_backoff: Option<Duration>,
    retry_max_backoff: Option<Duration>,
    request_timeout: Option<Duration>,
    recovery_interval: Option<Duration>,
}

impl LauncherConfigBuilder {
    pub fn registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = Some(url.into());
        self
    }

    pub fn registry_auth_token(mut self, token: impl Into<String>) -> Self {
        self.registry_auth_token = Some(token.into());
        self
    }

    pub fn data_plane_id(mut self, id: impl Into<String>) -> Self {
        self.data_plane_id = Some(id.into());
        self
    }

    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn retry_initial_backoff(mut self, backoff: Duration) -> Self {
        self.retry_initial_backoff = Some(backoff);
        self
    }

    pub fn retry_max_backoff(mut self, backoff: Duration) -> Self {
        self.retry_max_backoff = Some(backoff);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn recovery_interval(mut self, interval: Duration) -> Self {
        self.recovery_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<LauncherConfig> {
        let params = LauncherConfigParams {
            registry_url: self.registry_url.context("registry_url is required")?,
            registry_auth_token: self.registry_auth_token,
            data_plane_id: self.data_plane_id.context("data_plane_id is required")?,
            parallelism: self.parallelism.unwrap_or(DEFAULT_PARALLELISM),
            retry_initial_backoff: self
                .retry_initial_backoff
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RETRY_INITIAL_BACKOFF_SECS)),
            retry_max_backoff: self
                .retry_max_backoff
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RETRY_MAX_BACKOFF_SECS)),
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            recovery_interval: self.recovery_interval,
        };

        LauncherConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("registry_url must start with http:// or https://");
    }
    Ok(())
}

fn read_optional<F>(lookup: &F, key: &str) -> Result<Option<String>>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    match lookup(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}

fn read_required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    read_optional(lookup, key)?.with_context(|| format!("{key} must be set"))
}

fn parse_with_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match read_optional(lookup, key)? {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn parse_millis_with_default<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_with_default(lookup, key, default_ms).map(Duration::from_millis)
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("failed to parse {key}='{value}'"))
}
