//! `MediaGate` Gateway
//!
//! Supervises the worker process and forwards `/api/*` traffic to it.

use std::future::IntoFuture;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use mediagate_core::Config;
use mediagate_gateway::proxy::{WorkerClient, WorkerClientConfig};
use mediagate_gateway::routes::{AppState, build_router};
use mediagate_gateway::supervisor::{LaunchOutcome, WorkerSupervisor};

#[derive(Parser, Debug)]
#[command(name = "mediagate")]
#[command(version, about = "MediaGate - worker supervisor and API gateway")]
struct Args {
    /// JSON settings file (defaults to ~/.config/mediagate/settings.json if present)
    #[arg(long, env = "MEDIAGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind the gateway on
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the gateway on
    #[arg(long)]
    port: Option<u16>,

    /// Worker API base URL (e.g. "http://localhost:5000")
    #[arg(long)]
    worker_url: Option<String>,

    /// Treat the worker as an independent service: never spawn or kill it.
    #[arg(long)]
    external_worker: bool,

    /// Log level filter for the gateway (e.g. "info", "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "MEDIAGATE_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.gateway.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.gateway.port = port;
        }
        if let Some(url) = &self.worker_url {
            config.worker.endpoint.clone_from(url);
        }
        if self.external_worker {
            config.worker.externally_managed = true;
        }
        if let Some(level) = &self.log_level {
            config.gateway.log_level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = mediagate_core::config::load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    mediagate_core::tracing_init::init_tracing(&config.gateway.log_level, args.log_json)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.gateway.listen_addr(),
        worker_api = %config.worker.endpoint,
        externally_managed = config.worker.externally_managed,
        "Starting mediagate"
    );

    let supervisor = WorkerSupervisor::from_config(&config.worker);
    let client = WorkerClient::new(&WorkerClientConfig::from_config(&config))?;
    let app = build_router(AppState::new(supervisor.clone(), client));

    let listener = tokio::net::TcpListener::bind(config.gateway.listen_addr()).await?;
    info!(addr = %listener.local_addr()?, "Gateway listening");

    match supervisor.launch() {
        LaunchOutcome::Skipped => info!("Worker is externally managed; not spawning it"),
        outcome => info!(?outcome, "Worker launch requested"),
    }

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    supervisor.shutdown().await;
    info!("Gateway stopped");
    Ok(())
}
