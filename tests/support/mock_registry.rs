use std::{
    collections::VecDeque,
    convert::Infallible,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const LIST_PATH: &str = "/api/v1/workload/list";
const FAILURE_PATH: &str = "/api/v1/workload/failure";

/// In-memory stand-in for the workload registry.
#[derive(Clone, Default)]
pub struct MockRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

#[derive(Default)]
struct RegistryState {
    workloads: Vec<Value>,
    scripted_list_statuses: VecDeque<u16>,
    list_requests: Vec<Value>,
    list_statuses: Vec<u16>,
    failure_reports: Vec<Value>,
    auth_headers: Vec<Option<String>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_workload(&self, id: &str, data_plane_id: &str, status: &str) {
        let workload = json!({
            "id": id,
            "dataplaneId": data_plane_id,
            "status": status,
            "type": "sync",
            "workloadInput": "{\"connectionId\":\"c-1\"}",
            "logPath": format!("/workspace/{id}/logs.log"),
            "mutexKey": format!("connection-{id}"),
            "labels": [{"key": "workload_id", "value": id}],
        });
        self.state().workloads.push(workload);
    }

    pub fn add_claimed(&self, data_plane_id: &str, count: usize) {
        for i in 0..count {
            self.add_workload(&format!("wl-{i}"), data_plane_id, "claimed");
        }
    }

    /// The next list calls answer with these HTTP statuses, in order, before
    /// the registry serves real results again.
    pub fn fail_next_lists(&self, statuses: &[u16]) {
        self.state()
            .scripted_list_statuses
            .extend(statuses.iter().copied());
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_requests.len()
    }

    pub fn list_requests(&self) -> Vec<Value> {
        self.state().list_requests.clone()
    }

    /// HTTP status answered to each list call, in call order.
    pub fn list_statuses(&self) -> Vec<u16> {
        self.state().list_statuses.clone()
    }

    pub fn failure_reports(&self) -> Vec<Value> {
        self.state().failure_reports.clone()
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.state().auth_headers.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.inner.lock().expect("mock registry poisoned")
    }

    fn handle_list(&self, payload: &Value) -> (StatusCode, Value) {
        let mut state = self.state();
        state.list_requests.push(payload.clone());

        if let Some(status) = state.scripted_list_statuses.pop_front() {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            state.list_statuses.push(status.as_u16());
            return (status, json!({"message": "scripted failure"}));
        }

        let owners = string_set(payload.get("dataplane"));
        let statuses = string_set(payload.get("status"));
        let workloads: Vec<Value> = state
            .workloads
            .iter()
            .filter(|workload| {
                let owner = workload.get("dataplaneId").and_then(Value::as_str);
                let status = workload.get("status").and_then(Value::as_str);
                owner.is_some_and(|owner| owners.iter().any(|o| o == owner))
                    && status.is_some_and(|status| statuses.iter().any(|s| s == status))
            })
            .cloned()
            .collect();

        state.list_statuses.push(StatusCode::OK.as_u16());
        (StatusCode::OK, json!({ "workloads": workloads }))
    }

    fn handle_failure(&self, payload: &Value) -> (StatusCode, Value) {
        self.state().failure_reports.push(payload.clone());
        (StatusCode::OK, json!({}))
    }
}

fn string_set(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub struct MockRegistryServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockRegistryServer {
    pub async fn start(registry: MockRegistry) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock registry listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let registry = registry.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(registry.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock registry server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    registry: MockRegistry,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        return Ok(reply(StatusCode::METHOD_NOT_ALLOWED, json!({"message": "unsupported method"})));
    }

    let path = req.uri().path().to_string();
    let auth = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    registry.state().auth_headers.push(auth);

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return Ok(reply(
                StatusCode::BAD_REQUEST,
                json!({"message": format!("failed to read body: {err}")}),
            ))
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            return Ok(reply(
                StatusCode::BAD_REQUEST,
                json!({"message": format!("invalid JSON payload: {err}")}),
            ))
        }
    };

    let (status, body) = match path.as_str() {
        LIST_PATH => registry.handle_list(&payload),
        FAILURE_PATH => registry.handle_failure(&payload),
        _ => (StatusCode::NOT_FOUND, json!({"message": format!("unknown path {path}")})),
    };

    Ok(reply(status, body))
}

fn reply(status: StatusCode, body: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}
