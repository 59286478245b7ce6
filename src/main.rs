//! DBaaS engine
//!
//! Reads one operation request, drives it to a terminal event and prints the
//! result. Progress is logged as it arrives.
//!
//! Usage: dbaas-engine <request.yaml> [settings.yaml]

use std::sync::Arc;

use anyhow::Context as _;
use kube::Client;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dbaas_engine::{
    adapters::{KubeObjectStore, OperationRequest},
    builders::VersionRegistry,
    controllers::Lifecycle,
    metrics,
    reconcilers::OutputMsg,
    settings::EngineSettings,
};

/// Default metrics port
const METRICS_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let request_path = args
        .next()
        .context("usage: dbaas-engine <request.yaml> [settings.yaml]")?;
    let settings = match args.next() {
        Some(path) => EngineSettings::from_yaml_file(&path)
            .with_context(|| format!("reading settings from {}", path))?
            .with_overrides(|key| std::env::var(key).ok())?,
        None => EngineSettings::from_env()?,
    };
    let request = OperationRequest::from_yaml_file(&request_path)
        .with_context(|| format!("reading request from {}", request_path))?;

    info!(
        operation = %request.operation,
        engine = %request.engine,
        cluster = %request.name,
        "Starting DBaaS engine"
    );

    let client = Client::try_default().await?;
    info!(namespace = %settings.namespace, "Connected to Kubernetes API server");

    let store = Arc::new(KubeObjectStore::new(client, settings.namespace.clone()));
    let registry = Arc::new(VersionRegistry::builtin()?);
    let lifecycle = Lifecycle::new(store, registry, settings);

    tokio::spawn(async {
        if let Err(e) = metrics::serve(METRICS_PORT).await {
            error!(error = %e, "Metrics server exited");
        }
    });

    let handle = lifecycle.launch(&request)?;
    let result = tokio::select! {
        result = handle.wait(report_progress) => result,
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, cancelling operation");
            Err(dbaas_engine::Error::Cancelled)
        }
    };

    match result {
        Ok(outcome) => {
            info!(cluster = %outcome.cluster, state = %outcome.state, "Operation succeeded");
            println!("{}", outcome);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Operation failed");
            Err(e.into())
        }
    }
}

fn report_progress(msg: OutputMsg) {
    match msg {
        OutputMsg::Debug(text) => debug!(progress = %text),
        OutputMsg::Error(text) => warn!(progress = %text),
    }
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
