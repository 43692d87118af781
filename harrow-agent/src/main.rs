//! Harrow Agent
//!
//! Runs test jobs in Docker containers on a single host and serves their logs.
//!
//! Architecture:
//! - Container runtime: Docker CLI behind the `ContainerRuntime` trait
//! - Registry: in-memory job table shared by every component
//! - Lifecycle: submit, execute, stop and delete job containers
//! - Reconciler: periodic garbage collection and registry correction
//! - Hooks: notified when a job's container stops
//! - API: HTTP endpoints plus a WebSocket log tail
//!
//! Job state lives only in memory; a restart forgets every job.

mod api;
mod config;
mod container;
mod hooks;
mod lifecycle;
mod reconcile;
mod registry;
mod tail;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::Config;
use crate::container::{ContainerRuntime, DockerCli, check_docker_available};
use crate::hooks::{CallbackHook, FnHook, StopHookDispatcher};
use crate::lifecycle::LifecycleManager;
use crate::reconcile::Reconciler;
use crate::registry::JobRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harrow_agent=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Harrow Agent");

    let config = Arc::new(load_config()?);
    info!(
        "Loaded configuration: bind_addr={}, server_ip={}, log_host_dir={}",
        config.bind_addr,
        config.server_ip.as_deref().unwrap_or("<unset>"),
        config.log_host_dir.display()
    );

    check_docker_available(&config.docker_bin)?;
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(config.docker_bin.clone()));

    let mut dispatcher = StopHookDispatcher::new();
    dispatcher.register(Arc::new(FnHook::new(
        "job-log",
        |job_id: &str, state: &harrow_core::domain::job::JobState| {
            info!(
                "Container of job {} stopped with status {} (container {})",
                job_id,
                state.status,
                state.container_id.as_deref().unwrap_or("-")
            );
            Ok(())
        },
    )));
    let callback = CallbackHook::new(config.server_ip.clone(), config.callback_timeout)
        .context("Failed to build the callback HTTP client")?;
    dispatcher.register(Arc::new(callback));
    let hooks = Arc::new(dispatcher);
    info!("{} stop hook(s) registered", hooks.len());

    let registry = JobRegistry::new();
    let lifecycle = LifecycleManager::new(
        runtime.clone(),
        registry.clone(),
        hooks.clone(),
        config.clone(),
    );

    let reconciler = Reconciler::new(
        runtime,
        registry.clone(),
        hooks,
        config.reconcile_interval,
        config.container_retention,
    )
    .spawn();

    let app = api::create_router(AppState::new(lifecycle));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    reconciler.abort();
    let dropped = registry.drain();
    info!(
        "Agent stopped, {} job(s) dropped from the registry (containers left running)",
        dropped.len()
    );

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            warn!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
}
