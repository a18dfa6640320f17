mod api;
mod config;
mod discovery;
mod error;
mod provider;
mod reconcile;
mod timer;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use config::{Cli, Settings, Trigger};
use discovery::TraceClient;
use provider::cloudflare::CloudflareProvider;
use reconcile::{ReconcileRequest, Reconciler};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (before logger init)
    let settings = Settings::load(cli)?;

    // Initialize logger with config log level (env var takes precedence)
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&settings.log_level)
    ).init();

    info!("Loaded configuration: {:?}", settings);

    let source = TraceClient::new(&settings.trace_url, settings.timeout)?;
    let provider = CloudflareProvider::new(&settings.api_url, &settings.api_token, settings.timeout)
        .context("Failed to create Cloudflare client")?;

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(source),
        Arc::new(provider),
        ReconcileRequest {
            zone_name: settings.zone_name.clone(),
            record_comment: settings.record_comment.clone(),
        },
        settings.timeout,
    ));

    match &settings.trigger {
        Trigger::Timer { interval } => {
            info!("Updating every {} minute(s)", interval.as_secs() / 60);
            timer::run(reconciler, *interval, shutdown_signal()).await
        }
        Trigger::Server { bind, endpoint } => {
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("Failed to bind {}", bind))?;

            info!("Server listening on http://{}", bind);
            info!("DDNS endpoint: ANY {}", endpoint);

            api::serve(listener, api::create_router(reconciler, endpoint), shutdown_signal()).await
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
