//! HTTP rendezvous server.
//!
//! The server can start listening before the allocation plan exists.
//! Requests that arrive early wait, up to the configured bound, for
//! [`init`](RendezvousEndpoint::init) to install the plan; once installed the
//! plan never changes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::protocol::{endpoints, ErrorResponse, HealthResponse};
use super::RendezvousEndpoint;
use crate::config::{EndpointConfig, WorkerSettings};
use crate::env::WorkerEnv;
use crate::error::{Result, RendezvousError};
use crate::plan::{AllocationEntry, AllocationPlan};

type SharedPlan = Option<Arc<AllocationPlan>>;

/// Rendezvous endpoint serving allocation entries over HTTP.
pub struct HttpRendezvousServer {
    config: EndpointConfig,
    settings: WorkerSettings,
    plan_tx: watch::Sender<SharedPlan>,
    port: Option<u16>,
    running: Option<RunningServer>,
    shutdown_grace: Duration,
}

struct RunningServer {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl HttpRendezvousServer {
    pub fn new(config: EndpointConfig, settings: WorkerSettings) -> Self {
        let (plan_tx, _) = watch::channel(None);
        Self {
            config,
            settings,
            plan_tx,
            port: None,
            running: None,
            shutdown_grace: Duration::from_secs(2),
        }
    }

    /// Bound on how long [`stop`](RendezvousEndpoint::stop) waits for
    /// in-flight requests.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.plan_tx.borrow().is_some()
    }

    fn bind_address(&self) -> String {
        format!("{}:{}", self.config.bind_address, self.config.port)
    }
}

#[async_trait]
impl RendezvousEndpoint for HttpRendezvousServer {
    async fn start(&mut self) -> Result<u16> {
        if let Some(port) = self.port {
            return Err(RendezvousError::AlreadyStarted { port });
        }

        let addr = self.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RendezvousError::endpoint_start(addr.clone(), e))?;
        let port = listener
            .local_addr()
            .map_err(|e| RendezvousError::endpoint_start(addr.clone(), e))?
            .port();

        let state = EndpointState {
            plan_rx: self.plan_tx.subscribe(),
            init_wait: self.config.init_wait(),
            advertise_address: self.config.advertise_address.clone(),
            port,
            settings: self.settings.clone(),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state);
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Rendezvous server terminated with error");
            }
        });

        self.port = Some(port);
        self.running = Some(RunningServer {
            shutdown: shutdown_tx,
            task,
        });

        tracing::info!(address = %addr, port, "Rendezvous server listening");
        Ok(port)
    }

    fn init(&self, plan: AllocationPlan) -> Result<()> {
        if self.port.is_none() {
            return Err(RendezvousError::NotStarted);
        }

        let entries = plan.len();
        let plan = Arc::new(plan);
        let installed = self.plan_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(plan);
            true
        });

        if !installed {
            return Err(RendezvousError::AlreadyInitialized);
        }

        tracing::info!(entries, "Rendezvous plan initialized");
        Ok(())
    }

    fn port(&self) -> Option<u16> {
        self.port
    }

    async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown.send(());
        let mut task = running.task;
        if tokio::time::timeout(self.shutdown_grace, &mut task).await.is_err() {
            tracing::warn!(
                grace_ms = self.shutdown_grace.as_millis() as u64,
                "Rendezvous server did not drain in time, aborting"
            );
            task.abort();
        }
        tracing::info!(port = ?self.port, "Rendezvous server stopped");
    }
}

#[derive(Clone)]
struct EndpointState {
    plan_rx: watch::Receiver<SharedPlan>,
    init_wait: Duration,
    advertise_address: String,
    port: u16,
    settings: WorkerSettings,
}

impl EndpointState {
    /// Wait for the plan, bounded by `init_wait`.
    async fn plan(&self) -> std::result::Result<Arc<AllocationPlan>, ApiError> {
        let mut rx = self.plan_rx.clone();
        // The watch guard borrows `rx`; clone the plan out before it drops.
        let waited: SharedPlan =
            match tokio::time::timeout(self.init_wait, rx.wait_for(Option::is_some)).await {
                Ok(Ok(plan)) => (*plan).clone(),
                Ok(Err(_)) => {
                    return Err(ApiError::Unavailable(
                        "rendezvous service is shutting down".to_string(),
                    ))
                }
                Err(_) => {
                    return Err(ApiError::Unavailable(format!(
                        "plan was not initialized within {} ms",
                        self.init_wait.as_millis()
                    )))
                }
            };
        waited.ok_or_else(|| ApiError::Unavailable("plan is not initialized".to_string()))
    }

    async fn slot(
        &self,
        hostname: &str,
        local_rank: usize,
    ) -> std::result::Result<AllocationEntry, ApiError> {
        let plan = self.plan().await?;
        plan.find(hostname, local_rank).cloned().ok_or_else(|| {
            ApiError::NotFound(
                format!("no slot for host '{}' local rank {}", hostname, local_rank),
                format!("known hosts: {}", plan.hostnames().join(",")),
            )
        })
    }
}

fn router(state: EndpointState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(health))
        .route(
            &format!("{}/:hostname/:local_rank", endpoints::ASSIGNMENT),
            get(assignment),
        )
        .route(&format!("{}/:rank", endpoints::RANK), get(by_rank))
        .route(endpoints::PLAN, get(plan))
        .route(
            &format!("{}/:hostname/:local_rank", endpoints::ENV),
            get(worker_env),
        )
        .with_state(state)
}

async fn health(State(state): State<EndpointState>) -> Json<HealthResponse> {
    let initialized = state.plan_rx.borrow().is_some();
    Json(HealthResponse {
        status: "ok".to_string(),
        initialized,
    })
}

async fn assignment(
    State(state): State<EndpointState>,
    Path((hostname, local_rank)): Path<(String, usize)>,
) -> std::result::Result<Json<AllocationEntry>, ApiError> {
    let entry = state.slot(&hostname, local_rank).await?;
    tracing::debug!(hostname = %hostname, local_rank, rank = entry.rank, "Served assignment");
    Ok(Json(entry))
}

async fn by_rank(
    State(state): State<EndpointState>,
    Path(rank): Path<usize>,
) -> std::result::Result<Json<AllocationEntry>, ApiError> {
    let plan = state.plan().await?;
    plan.by_rank(rank).cloned().map(Json).ok_or_else(|| {
        ApiError::NotFound(
            format!("no slot with rank {}", rank),
            format!("job size is {}", plan.len()),
        )
    })
}

async fn plan(
    State(state): State<EndpointState>,
) -> std::result::Result<Json<AllocationPlan>, ApiError> {
    let plan = state.plan().await?;
    Ok(Json(plan.as_ref().clone()))
}

async fn worker_env(
    State(state): State<EndpointState>,
    Path((hostname, local_rank)): Path<(String, usize)>,
) -> std::result::Result<Json<WorkerEnv>, ApiError> {
    let entry = state.slot(&hostname, local_rank).await?;
    Ok(Json(WorkerEnv::for_entry(
        &entry,
        &state.advertise_address,
        state.port,
        &state.settings,
    )))
}

/// Handler failures.
#[derive(Debug)]
enum ApiError {
    NotFound(String, String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(error, details) => {
                tracing::warn!(error = %error, "Unmatched rendezvous request");
                (StatusCode::NOT_FOUND, ErrorResponse::with_details(error, details))
            }
            ApiError::Unavailable(error) => {
                tracing::warn!(error = %error, "Rendezvous request could not be served");
                (StatusCode::SERVICE_UNAVAILABLE, ErrorResponse::new(error))
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::RendezvousClient;
    use crate::hosts::parse_hosts;
    use crate::plan::get_host_assignments;

    fn test_config(init_wait_ms: u64) -> EndpointConfig {
        EndpointConfig {
            bind_address: "127.0.0.1".to_string(),
            advertise_address: "127.0.0.1".to_string(),
            port: 0,
            init_wait_ms,
        }
    }

    fn sample_plan() -> AllocationPlan {
        let hosts = parse_hosts("hostA:2,hostB:1").unwrap();
        get_host_assignments(&hosts, 3).unwrap()
    }

    async fn started_server(init_wait_ms: u64) -> (HttpRendezvousServer, RendezvousClient) {
        let mut server = HttpRendezvousServer::new(test_config(init_wait_ms), WorkerSettings::default());
        let port = server.start().await.unwrap();
        let client = RendezvousClient::new("127.0.0.1", port, Duration::from_secs(10)).unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn test_start_returns_bound_port() {
        let (mut server, client) = started_server(1000).await;
        let port = server.port().unwrap();
        assert_ne!(port, 0);

        let health = client.health().await.unwrap();
        assert_eq!(health.status, "ok");
        assert!(!health.initialized);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (mut server, _client) = started_server(1000).await;
        let port = server.port().unwrap();

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, RendezvousError::AlreadyStarted { port: p } if p == port));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_start_on_taken_port_fails() {
        let (mut server, _client) = started_server(1000).await;

        let mut config = test_config(1000);
        config.port = server.port().unwrap();
        let mut second = HttpRendezvousServer::new(config, WorkerSettings::default());
        let err = second.start().await.unwrap_err();
        assert!(matches!(err, RendezvousError::EndpointStart { .. }));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_init_before_start_fails() {
        let server = HttpRendezvousServer::new(test_config(1000), WorkerSettings::default());
        assert!(matches!(
            server.init(sample_plan()),
            Err(RendezvousError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_init_twice_fails() {
        let (mut server, _client) = started_server(1000).await;

        server.init(sample_plan()).unwrap();
        assert!(server.is_initialized());
        assert!(matches!(
            server.init(sample_plan()),
            Err(RendezvousError::AlreadyInitialized)
        ));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_serves_assignment_after_init() {
        let (mut server, client) = started_server(1000).await;
        let plan = sample_plan();
        server.init(plan.clone()).unwrap();

        assert_eq!(&client.assignment("hostA", 1).await.unwrap(), plan.find("hostA", 1).unwrap());
        assert_eq!(&client.rank(2).await.unwrap(), plan.by_rank(2).unwrap());
        assert_eq!(client.plan().await.unwrap(), plan);
        assert!(client.health().await.unwrap().initialized);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_request_before_init_waits_for_plan() {
        let (mut server, client) = started_server(5000).await;

        let pending = tokio::spawn(async move { client.assignment("hostB", 0).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pending.is_finished());

        server.init(sample_plan()).unwrap();
        let entry = pending.await.unwrap().unwrap();
        assert_eq!(entry.rank, 2);
        assert_eq!(entry.cross_rank, 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_request_before_init_times_out() {
        let (mut server, client) = started_server(100).await;

        let err = client.assignment("hostA", 0).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("503"), "{}", message);
        assert!(message.contains("not initialized"), "{}", message);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_unmatched_identity_is_not_found() {
        let (mut server, client) = started_server(1000).await;
        server.init(sample_plan()).unwrap();

        let err = client.assignment("hostC", 0).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("404"), "{}", message);
        assert!(message.contains("hostC"), "{}", message);

        let err = client.assignment("hostB", 1).await.unwrap_err();
        assert!(err.to_string().contains("404"));

        let err = client.rank(3).await.unwrap_err();
        assert!(err.to_string().contains("404"));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_workers_get_distinct_entries() {
        let (mut server, client) = started_server(5000).await;
        let plan = sample_plan();

        let mut handles = Vec::new();
        for entry in plan.iter() {
            let client = client.clone();
            let hostname = entry.hostname.clone();
            let local_rank = entry.local_rank;
            handles.push(tokio::spawn(async move {
                client.assignment(&hostname, local_rank).await
            }));
        }

        server.init(plan.clone()).unwrap();

        let mut served = Vec::new();
        for handle in handles {
            served.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(served, plan.entries());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_serves_worker_env() {
        let (mut server, client) = started_server(1000).await;
        let port = server.port().unwrap();
        server.init(sample_plan()).unwrap();

        let env = client.worker_env("hostA", 1).await.unwrap();
        assert_eq!(env.get(crate::env::RANK), Some("1"));
        assert_eq!(env.get(crate::env::RENDEZVOUS_ADDR), Some("127.0.0.1"));
        assert_eq!(env.get(crate::env::RENDEZVOUS_PORT), Some(port.to_string().as_str()));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (mut server, client) = started_server(1000).await;

        server.stop().await;
        server.stop().await;

        assert!(client.health().await.is_err());
        // a stopped server cannot be restarted
        assert!(server.start().await.is_err());
    }
}
