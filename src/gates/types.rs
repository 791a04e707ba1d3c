//! Shared types for the gate controllers

use std::sync::Arc;

use kube::Client;
use thiserror::Error;

use crate::checks::dynamic::DynamicExecutor;
use crate::checks::CheckRegistry;
use crate::config::ControllerConfig;
use crate::metrics::GateMetrics;
use crate::server::ReadinessState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Shared state for all gate reconcilers.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub config: Arc<ControllerConfig>,
    pub registry: Arc<CheckRegistry>,
    pub executor: Arc<DynamicExecutor>,
    pub metrics: Arc<GateMetrics>,
    pub readiness: Arc<ReadinessState>,
}
