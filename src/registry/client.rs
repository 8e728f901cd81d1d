//! Registry transport. Houses the `WorkloadApi` trait consumed by the recovery
//! scanner and failure reporter, plus the reqwest-backed `HttpWorkloadApi`.

use crate::registry::error::{io_error_kind, RegistryError};
use crate::registry::model::{
    WorkloadFailureRequest, WorkloadListRequest, WorkloadListResponse,
};
use crate::registry::options::RegistryClientOptions;
use crate::runtime::config::LauncherConfig;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

const LIST_PATH: &str = "/api/v1/workload/list";
const FAILURE_PATH: &str = "/api/v1/workload/failure";
const MAX_ERROR_BODY_CHARS: usize = 512;

pub(crate) const LIST_METHOD: &str = "workload_list";
pub(crate) const FAILURE_METHOD: &str = "workload_failure";

/// Remote calls the launcher needs from the workload registry. Each call is a
/// single attempt; retry policy lives in `RetryingRegistryClient`.
pub trait WorkloadApi: Send + Sync {
    fn list_workloads<'a>(
        &'a self,
        request: &'a WorkloadListRequest,
    ) -> BoxFuture<'a, Result<WorkloadListResponse, RegistryError>>;

    fn report_failure<'a>(
        &'a self,
        request: &'a WorkloadFailureRequest,
    ) -> BoxFuture<'a, Result<(), RegistryError>>;
}

impl<T: WorkloadApi + ?Sized> WorkloadApi for Arc<T> {
    fn list_workloads<'a>(
        &'a self,
        request: &'a WorkloadListRequest,
    ) -> BoxFuture<'a, Result<WorkloadListResponse, RegistryError>> {
        (**self).list_workloads(request)
    }

    fn report_failure<'a>(
        &'a self,
        request: &'a WorkloadFailureRequest,
    ) -> BoxFuture<'a, Result<(), RegistryError>> {
        (**self).report_failure(request)
    }
}

#[derive(Debug, Clone)]
pub struct HttpWorkloadApi {
    base_url: Arc<String>,
    client: reqwest::Client,
    options: RegistryClientOptions,
}

impl WorkloadApi for HttpWorkloadApi {
    fn list_workloads<'a>(
        &'a self,
        request: &'a WorkloadListRequest,
    ) -> BoxFuture<'a, Result<WorkloadListResponse, RegistryError>> {
        Box::pin(self.post_json(LIST_METHOD, LIST_PATH, request))
    }

    fn report_failure<'a>(
        &'a self,
        request: &'a WorkloadFailureRequest,
    ) -> BoxFuture<'a, Result<(), RegistryError>> {
        Box::pin(async move {
            self.send(FAILURE_METHOD, FAILURE_PATH, request).await?;
            Ok(())
        })
    }
}

impl HttpWorkloadApi {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, RegistryClientOptions::default())
    }

    pub fn with_options(url: impl Into<String>, options: RegistryClientOptions) -> Result<Self> {
        options.validate()?;

        let mut headers = HeaderMap::new();
        if let Some(token) = options.auth_token.as_deref() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("registry auth token contains invalid header characters")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .connect_timeout(options.request_timeout)
            .build()
            .context("failed to build registry HTTP client")?;

        let base_url = url.into().trim().trim_end_matches('/').to_owned();

        Ok(Self {
            base_url: Arc::new(base_url),
            client,
            options,
        })
    }

    pub fn from_config(config: &LauncherConfig) -> Result<Self> {
        config.validate()?;
        Self::with_options(config.registry_url().to_owned(), config.registry_options())
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &RegistryClientOptions {
        &self.options
    }

    async fn post_json<B, R>(
        &self,
        method: &'static str,
        path: &str,
        body: &B,
    ) -> Result<R, RegistryError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.send(method, path, body).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| map_transport_error(method, err))?;
        serde_json::from_slice(&bytes).map_err(|err| RegistryError::Decode {
            method,
            source: Box::new(err),
        })
    }

    async fn send<B>(
        &self,
        method: &'static str,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, RegistryError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        tracing::trace!(method, url = %url, "sending registry request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| map_transport_error(method, err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.chars().count() > MAX_ERROR_BODY_CHARS {
            body = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        }
        Err(RegistryError::Server {
            method,
            status: status.as_u16(),
            body,
        })
    }
}

fn map_transport_error(method: &'static str, err: reqwest::Error) -> RegistryError {
    if err.is_timeout() {
        return RegistryError::Timeout { method };
    }

    if let Some(kind) = io_error_kind(&err) {
        return RegistryError::from_io_kind(method, kind, Box::new(err));
    }

    if err.is_connect() {
        RegistryError::Connect {
            method,
            source: Box::new(err),
        }
    } else if err.is_decode() {
        RegistryError::Decode {
            method,
            source: Box::new(err),
        }
    } else {
        RegistryError::Other {
            method,
            source: Box::new(err),
        }
    }
}
