// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use acmedns::{
    acme::{AcmeAccount, AcmeOrchestrator, CertificateIssuer},
    config::{CloudPlatform, Config},
    constants::{METRICS_SERVER_PATH, TOKIO_WORKER_THREADS},
    dns::{
        cloud_dns::CloudDnsResponder, observer::DnsRecordObserver, route53::Route53Responder,
        DnsResponder,
    },
    keypair::KubeCredentialStore,
    metrics,
    reconcilers::{KubeSecretStore, KubeServiceLister, NamespaceScheduler},
};
use anyhow::{Context, Result};
use axum::{http::StatusCode, routing::get, Router};
use clap::Parser;
use kube::Client;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("acmedns-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_tracing();

    info!("Starting ACME DNS certificate controller");

    // reqwest, kube and instant-acme all build rustls clients; pin the process-wide provider.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let config = Config::parse();
    debug!(config = ?config, "Configuration loaded");

    let platform = config.resolve_cloud_platform().await?;

    debug!("Initializing Kubernetes client");
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let account = AcmeAccount::load_or_register(
        &config.acme_url,
        Arc::new(KubeCredentialStore::new(client.clone())),
    )
    .await
    .context("Failed to load ACME account")?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("acmedns/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let responder: Arc<dyn DnsResponder> = match platform {
        CloudPlatform::Gcp => Arc::new(CloudDnsResponder::new(http).await?),
        CloudPlatform::Aws => Arc::new(Route53Responder::from_env().await),
    };
    let observer = Arc::new(DnsRecordObserver::new(config.propagation_timeout()));

    let issuer: Arc<dyn CertificateIssuer> = Arc::new(AcmeOrchestrator::new(
        &config.acme_url,
        Arc::new(account),
        responder,
        observer,
        config.secret_filenames(),
    ));
    info!(acme_url = %config.acme_url, platform = %platform, "Certificate issuer ready");

    let scheduler = NamespaceScheduler::new(
        Arc::new(KubeServiceLister::new(client.clone())),
        Arc::new(KubeSecretStore::new(client.clone())),
        issuer,
    );

    let metrics_address = config.metrics_bind_address.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_address).await {
            error!(error = %e, "Metrics server stopped");
        }
    });

    tokio::select! {
        result = scheduler.run(client) => {
            error!("CRITICAL: namespace scheduler exited: {:?}", result);
            result?;
            anyhow::bail!("Namespace scheduler exited unexpectedly without error")
        }
        signal = shutdown_signal() => {
            signal?;
            info!("Shutting down");
            Ok(())
        }
    }
}

/// Initialize logging.
///
/// Respects `RUST_LOG` (default `info`) and `RUST_LOG_FORMAT` (`json` or `text`).
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

/// Wait for SIGTERM (pod termination) or SIGINT.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received SIGINT");
    }
    Ok(())
}

/// Serve Prometheus metrics.
async fn run_metrics_server(address: &str) -> Result<()> {
    let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind metrics server to {address}"))?;
    info!(address = %address, path = METRICS_SERVER_PATH, "Metrics server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> (StatusCode, String) {
    match metrics::gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod main_tests;
