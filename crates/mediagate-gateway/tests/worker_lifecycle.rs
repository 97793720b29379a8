#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::panic)] // Integration tests use unwrap for brevity

//! Control endpoint and supervision behaviour seen through the gateway.

use std::time::{Duration, Instant};

use axum::Json;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use mediagate_core::WorkerConfig;
use mediagate_gateway::proxy::{WorkerClient, WorkerClientConfig};
use mediagate_gateway::routes::{AppState, build_router};
use mediagate_gateway::supervisor::{
    LaunchOutcome, SupervisionMode, WorkerCommand, WorkerStatus, WorkerSupervisor,
};

const WORKER_PORT_VAR: &str = "MEDIAGATE_TEST_WORKER_PORT";

fn sleeping_worker() -> WorkerSupervisor {
    let config = WorkerConfig {
        program: "sleep".into(),
        args: vec!["30".into()],
        restart_delay_secs: 60,
        terminate_timeout_secs: 2,
        ..WorkerConfig::default()
    };
    WorkerSupervisor::from_config(&config)
}

fn gateway(supervisor: &WorkerSupervisor) -> axum::Router {
    gateway_for(supervisor, "http://127.0.0.1:5000")
}

fn gateway_for(supervisor: &WorkerSupervisor, worker_url: &str) -> axum::Router {
    let client = WorkerClient::new(&WorkerClientConfig::new(worker_url)).unwrap();
    build_router(AppState::new(supervisor.clone(), client))
}

async fn wait_for<F>(supervisor: &WorkerSupervisor, timeout: Duration, pred: F) -> WorkerStatus
where
    F: Fn(&WorkerStatus) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let status = supervisor.status();
        if pred(&status) {
            return status;
        }
        assert!(
            Instant::now() < deadline,
            "condition not reached within {timeout:?}; last status: {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll `GET /api/health` through the gateway until the worker answers.
async fn wait_for_health(app: &axum::Router, timeout: Duration) -> Value {
    let deadline = Instant::now() + timeout;
    loop {
        let (status, body) = call(app.clone(), Method::GET, "/api/health").await;
        if status == StatusCode::OK {
            return body;
        }
        assert!(
            Instant::now() < deadline,
            "worker did not answer within {timeout:?}; last response: {status} {body}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Runs as the supervised worker when this test binary is launched with
/// `WORKER_PORT_VAR` set; a plain `--ignored` run returns at once.
#[tokio::test]
#[ignore = "entry point for the HTTP worker process"]
async fn http_worker_process() {
    let Ok(port) = std::env::var(WORKER_PORT_VAR) else {
        return;
    };
    let app = axum::Router::new().route(
        "/api/health",
        axum::routing::get(|| async {
            Json(json!({"status": "ok", "pid": std::process::id()}))
        }),
    );
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port.parse::<u16>().unwrap()))
        .await
        .unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn call(app: axum::Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn restart_endpoint_replaces_running_worker() {
    let supervisor = sleeping_worker();
    assert_eq!(supervisor.mode(), SupervisionMode::Managed);
    let LaunchOutcome::Spawned { pid: Some(first) } = supervisor.launch() else {
        panic!("expected a spawned worker");
    };

    let (status, body) = call(gateway(&supervisor), Method::POST, "/restart-worker").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "restarting"}));

    let after = wait_for(&supervisor, Duration::from_secs(5), |s| {
        s.running && s.pid.is_some_and(|pid| pid != first)
    })
    .await;
    assert_eq!(after.launches, 2);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn restart_endpoint_starts_worker_when_none_is_running() {
    let supervisor = sleeping_worker();
    let (status, _) = call(gateway(&supervisor), Method::POST, "/restart-worker").await;
    assert_eq!(status, StatusCode::OK);
    let after = wait_for(&supervisor, Duration::from_secs(5), |s| s.running).await;
    assert_eq!(after.launches, 1);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn restart_endpoint_answers_before_old_worker_exits() {
    // Ignores SIGTERM, so stopping it takes the full grace period.
    let config = WorkerConfig {
        program: "sh".into(),
        args: vec!["-c".into(), "trap '' TERM; sleep 30".into()],
        restart_delay_secs: 60,
        terminate_timeout_secs: 2,
        ..WorkerConfig::default()
    };
    let supervisor = WorkerSupervisor::from_config(&config);
    let LaunchOutcome::Spawned { pid: Some(first) } = supervisor.launch() else {
        panic!("expected a spawned worker");
    };

    let started = Instant::now();
    let (status, body) = call(gateway(&supervisor), Method::POST, "/restart-worker").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "restarting"}));
    assert!(started.elapsed() < Duration::from_secs(1));

    let after = wait_for(&supervisor, Duration::from_secs(6), |s| {
        s.running && s.pid.is_some_and(|pid| pid != first)
    })
    .await;
    assert_eq!(after.launches, 2);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn proxying_recovers_after_worker_is_killed() {
    let port = free_port().await;
    let command = WorkerCommand::new(std::env::current_exe().unwrap().to_string_lossy())
        .args(["http_worker_process", "--exact", "--ignored", "--nocapture"])
        .env(WORKER_PORT_VAR, port.to_string());
    let supervisor = WorkerSupervisor::with_options(
        command,
        SupervisionMode::Managed,
        Duration::from_millis(200),
        Duration::from_secs(2),
    );
    let app = gateway_for(&supervisor, &format!("http://127.0.0.1:{port}"));

    let LaunchOutcome::Spawned { pid: Some(first) } = supervisor.launch() else {
        panic!("expected a spawned worker");
    };
    let body = wait_for_health(&app, Duration::from_secs(10)).await;
    assert_eq!(body["pid"], first);

    let killed = tokio::process::Command::new("kill")
        .args(["-9", &first.to_string()])
        .status()
        .await
        .unwrap();
    assert!(killed.success());

    let relaunched = wait_for(&supervisor, Duration::from_secs(5), |s| {
        s.running && s.pid.is_some_and(|pid| pid != first)
    })
    .await;
    assert_eq!(relaunched.launches, 2);

    let body = wait_for_health(&app, Duration::from_secs(10)).await;
    assert_eq!(body["pid"], json!(relaunched.pid));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn root_reports_live_worker() {
    let supervisor = sleeping_worker();
    supervisor.launch();

    let (status, body) = call(gateway(&supervisor), Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["worker"]["mode"], "managed");
    assert_eq!(body["worker"]["running"], true);
    assert_eq!(body["worker"]["pid"], json!(supervisor.status().pid));

    supervisor.shutdown().await;
    let (_, body) = call(gateway(&supervisor), Method::GET, "/").await;
    assert_eq!(body["worker"]["running"], false);
}

#[tokio::test]
async fn shutdown_stops_worker_and_cancels_restarts() {
    let supervisor = sleeping_worker();
    supervisor.launch();
    supervisor.shutdown().await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = supervisor.status();
    assert!(!status.running);
    assert!(!status.restart_pending);
    assert_eq!(status.launches, 1);

    let (status, _) = call(gateway(&supervisor), Method::POST, "/restart-worker").await;
    assert_eq!(status, StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = supervisor.status();
    assert!(!status.running);
    assert_eq!(status.launches, 1);
}
