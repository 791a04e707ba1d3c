//! Control-plane built-in checks
//!
//! `kube-apiserver` and `etcd` probe the API server's health endpoints
//! through the authenticated client; the scheduler, controller-manager and
//! cloud-controller-manager checks inspect their leader-election Leases for
//! staleness.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::coordination::v1::Lease;
use kube::{Api, Client};
use serde::Deserialize;

use super::{CheckOutcome, Checker};
use crate::crds::Severity;

pub const APISERVER_CHECK_NAME: &str = "kube-apiserver";
pub const ETCD_CHECK_NAME: &str = "etcd";
pub const SCHEDULER_CHECK_NAME: &str = "kube-scheduler";
pub const CONTROLLER_MANAGER_CHECK_NAME: &str = "kube-controller-manager";
pub const CLOUD_CONTROLLER_MANAGER_CHECK_NAME: &str = "cloud-controller-manager";

const DEFAULT_HEALTHZ_ENDPOINT: &str = "/healthz";
const DEFAULT_ETCD_HEALTHZ_ENDPOINT: &str = "/healthz/etcd";
const DEFAULT_LEASE_NAMESPACE: &str = "kube-system";
const DEFAULT_STALENESS_THRESHOLD_SECS: i64 = 60;

/// Configuration for the healthz-endpoint checks.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HealthzConfig {
    /// API server path to probe
    pub endpoint: Option<String>,
}

/// Configuration for the lease-backed checks.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LeaseConfig {
    pub namespace: Option<String>,
    pub lease_name: Option<String>,
    pub staleness_threshold_seconds: Option<i64>,
}

/// Performs an authenticated GET against an API server health path.
async fn healthz_request(client: &Client, path: &str, check_name: &str) -> CheckOutcome {
    let request = match http::Request::builder().uri(path).body(Vec::new()) {
        Ok(req) => req,
        Err(e) => {
            return CheckOutcome::failing(format!("{check_name}: failed to build request: {e}"))
                .with_detail("endpoint", path);
        }
    };

    match client.request_text(request).await {
        Ok(body) => CheckOutcome::passing(format!("{check_name}: healthy ({})", body.trim()))
            .with_detail("endpoint", path)
            .with_detail("body", body.trim()),
        Err(e) => CheckOutcome::failing(format!("{check_name}: health request failed: {e}"))
            .with_detail("endpoint", path),
    }
}

/// Fetches a coordination.k8s.io Lease and verifies its renew time is within
/// the staleness threshold.
async fn check_lease(
    client: &Client,
    config: Option<&serde_json::Value>,
    default_lease_name: &str,
    check_name: &str,
) -> anyhow::Result<CheckOutcome> {
    let cfg: LeaseConfig = match config {
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| anyhow::anyhow!("parsing {check_name} check config: {e}"))?,
        None => LeaseConfig::default(),
    };

    let namespace = cfg
        .namespace
        .unwrap_or_else(|| DEFAULT_LEASE_NAMESPACE.to_string());
    let lease_name = cfg
        .lease_name
        .unwrap_or_else(|| default_lease_name.to_string());
    let threshold_secs = cfg
        .staleness_threshold_seconds
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_STALENESS_THRESHOLD_SECS);

    let leases: Api<Lease> = Api::namespaced(client.clone(), &namespace);
    let lease = match leases.get_opt(&lease_name).await {
        Ok(Some(lease)) => lease,
        Ok(None) => {
            return Ok(CheckOutcome::failing(format!(
                "{check_name}: lease {namespace}/{lease_name} not found"
            ))
            .with_detail("namespace", &namespace)
            .with_detail("leaseName", &lease_name));
        }
        Err(e) => {
            return Ok(CheckOutcome::failing(format!(
                "{check_name}: failed to fetch lease: {e}"
            ))
            .with_detail("namespace", &namespace)
            .with_detail("leaseName", &lease_name));
        }
    };

    let Some(renew_time) = lease.spec.as_ref().and_then(|s| s.renew_time.as_ref()) else {
        return Ok(
            CheckOutcome::failing(format!("{check_name}: lease has no renewTime"))
                .with_detail("namespace", &namespace)
                .with_detail("leaseName", &lease_name),
        );
    };

    let age = Utc::now().signed_duration_since(renew_time.0);
    let age_secs = age.num_seconds();

    if age_secs > threshold_secs {
        return Ok(CheckOutcome::failing(format!(
            "{check_name}: lease is stale (renewed {age_secs}s ago, threshold {threshold_secs}s)"
        ))
        .with_detail("namespace", &namespace)
        .with_detail("leaseName", &lease_name)
        .with_detail("renewTime", renew_time.0.to_rfc3339())
        .with_detail("ageSeconds", age_secs.to_string()));
    }

    Ok(CheckOutcome::passing(format!(
        "{check_name}: healthy (lease renewed {age_secs}s ago)"
    ))
    .with_detail("namespace", &namespace)
    .with_detail("leaseName", &lease_name)
    .with_detail("ageSeconds", age_secs.to_string()))
}

fn healthz_endpoint(config: Option<&serde_json::Value>, default: &str) -> anyhow::Result<String> {
    let cfg: HealthzConfig = match config {
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| anyhow::anyhow!("parsing healthz check config: {e}"))?,
        None => HealthzConfig::default(),
    };
    Ok(cfg
        .endpoint
        .filter(|endpoint| !endpoint.is_empty())
        .unwrap_or_else(|| default.to_string()))
}

/// Verifies the API server is healthy via its /healthz endpoint.
pub struct ApiServerCheck {
    client: Client,
}

impl ApiServerCheck {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Checker for ApiServerCheck {
    fn name(&self) -> &'static str {
        APISERVER_CHECK_NAME
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn default_category(&self) -> &'static str {
        "control-plane"
    }

    async fn run(&self, config: Option<&serde_json::Value>) -> anyhow::Result<CheckOutcome> {
        let endpoint = healthz_endpoint(config, DEFAULT_HEALTHZ_ENDPOINT)?;
        Ok(healthz_request(&self.client, &endpoint, APISERVER_CHECK_NAME).await)
    }
}

/// Verifies etcd health via the API server's proxied /healthz/etcd endpoint.
pub struct EtcdCheck {
    client: Client,
}

impl EtcdCheck {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Checker for EtcdCheck {
    fn name(&self) -> &'static str {
        ETCD_CHECK_NAME
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn default_category(&self) -> &'static str {
        "control-plane"
    }

    async fn run(&self, config: Option<&serde_json::Value>) -> anyhow::Result<CheckOutcome> {
        let endpoint = healthz_endpoint(config, DEFAULT_ETCD_HEALTHZ_ENDPOINT)?;
        Ok(healthz_request(&self.client, &endpoint, ETCD_CHECK_NAME).await)
    }
}

/// Verifies kube-scheduler health by inspecting its leader-election Lease.
pub struct SchedulerCheck {
    client: Client,
}

impl SchedulerCheck {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Checker for SchedulerCheck {
    fn name(&self) -> &'static str {
        SCHEDULER_CHECK_NAME
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn default_category(&self) -> &'static str {
        "control-plane"
    }

    async fn run(&self, config: Option<&serde_json::Value>) -> anyhow::Result<CheckOutcome> {
        check_lease(&self.client, config, "kube-scheduler", SCHEDULER_CHECK_NAME).await
    }
}

/// Verifies kube-controller-manager health by inspecting its leader-election Lease.
pub struct ControllerManagerCheck {
    client: Client,
}

impl ControllerManagerCheck {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Checker for ControllerManagerCheck {
    fn name(&self) -> &'static str {
        CONTROLLER_MANAGER_CHECK_NAME
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn default_category(&self) -> &'static str {
        "control-plane"
    }

    async fn run(&self, config: Option<&serde_json::Value>) -> anyhow::Result<CheckOutcome> {
        check_lease(
            &self.client,
            config,
            "kube-controller-manager",
            CONTROLLER_MANAGER_CHECK_NAME,
        )
        .await
    }
}

/// Verifies cloud-controller-manager health by inspecting its leader-election
/// Lease. Only registered when enabled in configuration.
pub struct CloudControllerManagerCheck {
    client: Client,
}

impl CloudControllerManagerCheck {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Checker for CloudControllerManagerCheck {
    fn name(&self) -> &'static str {
        CLOUD_CONTROLLER_MANAGER_CHECK_NAME
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn default_category(&self) -> &'static str {
        "control-plane"
    }

    async fn run(&self, config: Option<&serde_json::Value>) -> anyhow::Result<CheckOutcome> {
        check_lease(
            &self.client,
            config,
            "cloud-controller-manager",
            CLOUD_CONTROLLER_MANAGER_CHECK_NAME,
        )
        .await
    }
}
