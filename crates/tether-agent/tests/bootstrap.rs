//! Bootstrap integration tests
//!
//! Runs the full enrollment pipeline against an in-process HTTP service and
//! a mock tunnel transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use tether_agent::agent::Stage;
use tether_agent::api::{ApiClient, RetryPolicy};
use tether_agent::tunnel::{ReverseListener, TunnelStream, TunnelTransport};
use tether_agent::Agent;
use tether_core::config::{AgentConfig, BackoffConfig};
use tether_core::error::{ApiError, TunnelError};
use tether_core::types::ServiceDescriptor;

/// What the fake service observed
#[derive(Default)]
struct ServiceState {
    info_hits: AtomicUsize,
    auth_hits: AtomicUsize,
    auth_body: Mutex<Option<Value>>,
    reject_auth: AtomicUsize,
}

async fn info_handler(State(state): State<Arc<ServiceState>>) -> Json<Value> {
    state.info_hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "version": "v0.4.2",
        "endpoints": { "api": "cloud.example.com:8080", "ssh": "cloud.example.com:2222" }
    }))
}

async fn auth_handler(
    State(state): State<Arc<ServiceState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.auth_hits.fetch_add(1, Ordering::SeqCst);
    *state.auth_body.lock().unwrap() = Some(body);

    if state.reject_auth.load(Ordering::SeqCst) != 0 {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(Json(json!({
        "uid": "d-1",
        "token": "tok-123",
        "name": "edge-1",
        "namespace": "acme"
    })))
}

async fn start_service(state: Arc<ServiceState>) -> ServiceDescriptor {
    let app = Router::new()
        .route("/info", get(info_handler))
        .route("/api/devices/auth", post(auth_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    ServiceDescriptor {
        scheme: "http".to_string(),
        host: "127.0.0.1".to_string(),
        port: addr.port(),
    }
}

/// Tunnel transport that records the token it was opened with
#[derive(Default)]
struct MockTransport {
    opened_with: Mutex<Option<String>>,
}

struct IdleListener;

#[async_trait]
impl ReverseListener for IdleListener {
    async fn accept(&mut self) -> Result<Box<dyn TunnelStream>, TunnelError> {
        std::future::pending().await
    }
}

#[async_trait]
impl TunnelTransport for MockTransport {
    async fn open(
        &self,
        _service: &ServiceDescriptor,
        token: &str,
    ) -> Result<Box<dyn ReverseListener>, TunnelError> {
        *self.opened_with.lock().unwrap() = Some(token.to_string());
        Ok(Box::new(IdleListener))
    }
}

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial: Duration::from_millis(1),
        max: Duration::from_millis(4),
        multiplier: 2.0,
        jitter: 0.0,
    }
}

fn test_config(service: &ServiceDescriptor, key_path: std::path::PathBuf) -> AgentConfig {
    AgentConfig {
        server_address: service.base_url(),
        tenant_id: "tenant-1".to_string(),
        preferred_identity: Some("aa:bb:cc:dd:ee:ff".to_string()),
        preferred_hostname: Some("edge-1".to_string()),
        private_key_path: key_path,
        backoff: fast_backoff(),
        connect_timeout: Duration::from_secs(5),
    }
}

fn build_agent(
    config: AgentConfig,
    service: ServiceDescriptor,
    transport: Arc<MockTransport>,
) -> Agent {
    let client = ApiClient::new(
        &service,
        RetryPolicy::limited(3, fast_backoff()),
        Duration::from_secs(5),
        CancellationToken::new(),
    )
    .unwrap();

    Agent::new(config, service, client, transport)
}

#[tokio::test]
async fn test_bootstrap_reaches_tunnel_established() {
    let state = Arc::new(ServiceState::default());
    let service = start_service(Arc::clone(&state)).await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&service, dir.path().join("agent_key.pem"));

    let transport = Arc::new(MockTransport::default());
    let agent = build_agent(config, service, Arc::clone(&transport));

    let established = agent.bootstrap().await.unwrap();

    assert_eq!(established.auth.token, "tok-123");
    assert_eq!(established.auth.namespace, "acme");
    assert_eq!(state.info_hits.load(Ordering::SeqCst), 1);
    assert_eq!(state.auth_hits.load(Ordering::SeqCst), 1);

    // The tunnel was requested with the bearer token from authorization
    assert_eq!(
        transport.opened_with.lock().unwrap().as_deref(),
        Some("tok-123")
    );
}

#[tokio::test]
async fn test_authorization_request_carries_identity_and_key() {
    let state = Arc::new(ServiceState::default());
    let service = start_service(Arc::clone(&state)).await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&service, dir.path().join("agent_key.pem"));
    let agent = build_agent(config, service, Arc::new(MockTransport::default()));

    agent.bootstrap().await.unwrap();

    let body = state.auth_body.lock().unwrap().take().unwrap();
    assert_eq!(body["identity"]["mac"], "aa:bb:cc:dd:ee:ff");
    assert_eq!(body["tenant_id"], "tenant-1");
    assert_eq!(body["hostname"], "edge-1");
    assert!(body["public_key"]
        .as_str()
        .unwrap()
        .starts_with("-----BEGIN PUBLIC KEY-----"));
    assert_eq!(body["info"]["platform"], "native");
}

#[tokio::test]
async fn test_key_failure_halts_before_service_contact() {
    let state = Arc::new(ServiceState::default());
    let service = start_service(Arc::clone(&state)).await;

    // A regular file where the key's parent directory should be makes
    // generation fail with an I/O error.
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();

    let config = test_config(&service, blocker.join("agent_key.pem"));
    let agent = build_agent(config, service, Arc::new(MockTransport::default()));

    let err = agent.bootstrap().await.unwrap_err();
    assert_eq!(err.stage, Stage::EnsureKeys);

    // The sequence halted before any service contact
    assert_eq!(state.info_hits.load(Ordering::SeqCst), 0);
    assert_eq!(state.auth_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rejected_authorization_is_not_retried() {
    let state = Arc::new(ServiceState::default());
    state.reject_auth.store(1, Ordering::SeqCst);
    let service = start_service(Arc::clone(&state)).await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&service, dir.path().join("agent_key.pem"));
    let agent = build_agent(config, service, Arc::new(MockTransport::default()));

    let err = agent.bootstrap().await.unwrap_err();
    assert_eq!(err.stage, Stage::Authorize);
    assert!(matches!(
        err.source,
        tether_agent::agent::AgentError::Api(ApiError::Rejected { status: 401 })
    ));

    // Fatal refusals are surfaced immediately, not retried
    assert_eq!(state.auth_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_service_exhausts_bounded_retries() {
    // Nothing listens on this port; a bounded policy surfaces Unreachable
    // after its budget instead of hanging the test.
    let service = ServiceDescriptor {
        scheme: "http".to_string(),
        host: "127.0.0.1".to_string(),
        port: 1,
    };

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&service, dir.path().join("agent_key.pem"));
    let agent = build_agent(config, service, Arc::new(MockTransport::default()));

    let err = agent.bootstrap().await.unwrap_err();
    assert_eq!(err.stage, Stage::ProbeService);
    assert!(matches!(
        err.source,
        tether_agent::agent::AgentError::Api(ApiError::Unreachable(_))
    ));
}
