/*
 * ClusterGate - Cluster Readiness Operator
 * Copyright (C) 2025 ClusterGate Authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Gate Controller Service
//!
//! Runs the ClusterReadiness reconciliation engine and serves the
//! `/readyz`, `/metrics`, and `/healthz` HTTP endpoints.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clustergate::checks::dynamic::DynamicExecutor;
use clustergate::checks::{controlplane, dns, CheckRegistry};
use clustergate::gates::{run_gate_controllers, Context};
use clustergate::metrics::GateMetrics;
use clustergate::server::{build_router, AppState, ReadinessState};
use clustergate::ControllerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,clustergate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ClusterGate v{}", env!("CARGO_PKG_VERSION"));

    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let config = Arc::new(load_controller_config());
    config.validate()?;

    // Register built-in checks now that we have a client. New built-ins are
    // added here.
    let registry = Arc::new(CheckRegistry::new());
    registry.register(Arc::new(dns::DnsCheck::new(client.clone())));
    registry.register(Arc::new(controlplane::ApiServerCheck::new(client.clone())));
    registry.register(Arc::new(controlplane::EtcdCheck::new(client.clone())));
    registry.register(Arc::new(controlplane::SchedulerCheck::new(client.clone())));
    registry.register(Arc::new(controlplane::ControllerManagerCheck::new(
        client.clone(),
    )));
    if config.enable_cloud_controller_manager {
        registry.register(Arc::new(controlplane::CloudControllerManagerCheck::new(
            client.clone(),
        )));
    }
    info!(checks = ?registry.list(), "registered built-in checks");

    let metrics = Arc::new(GateMetrics::new()?);
    let readiness = Arc::new(ReadinessState::new());
    let executor = Arc::new(DynamicExecutor::new(client.clone(), &config.namespace));

    let ctx = Arc::new(Context {
        client: client.clone(),
        config: config.clone(),
        registry,
        executor,
        metrics: metrics.clone(),
        readiness: readiness.clone(),
    });

    // Run the controllers in the background.
    let controller_handle = tokio::spawn(async move {
        if let Err(e) = run_gate_controllers(ctx).await {
            error!("Controller error: {e}");
        }
    });

    let app = build_router(AppState {
        readiness,
        metrics,
    })
    .layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(Duration::from_secs(60))),
    );

    let listener = tokio::net::TcpListener::bind(&config.http_bind_address).await?;
    info!("HTTP server listening on {}", config.http_bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller_handle.abort();
    info!("ClusterGate stopped");

    Ok(())
}

fn load_controller_config() -> ControllerConfig {
    let override_path = std::env::var("CLUSTERGATE_CONFIG_PATH").ok();
    let config_path = override_path
        .as_deref()
        .filter(|path| Path::new(path).exists())
        .unwrap_or("/config/config.yaml");

    match ControllerConfig::from_mounted_file(config_path) {
        Ok(config) => {
            info!("Loaded configuration from {config_path}");
            config
        }
        Err(e) => {
            warn!("Failed to load configuration from {config_path}: {e}. Using defaults.");
            ControllerConfig::default()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
