//! Cluster DNS readiness check
//!
//! Verifies that CoreDNS pods are running in kube-system and that a test
//! domain actually resolves.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};
use serde::Deserialize;

use super::{CheckOutcome, Checker};
use crate::crds::Severity;

pub const CHECK_NAME: &str = "dns";

const DEFAULT_TEST_DOMAIN: &str = "kubernetes.default.svc.cluster.local";
const DNS_POD_SELECTOR: &str = "k8s-app=kube-dns";

/// DNS check-specific configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DnsConfig {
    /// Domain to resolve for validation
    pub test_domain: Option<String>,
}

pub struct DnsCheck {
    client: Client,
}

impl DnsCheck {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Checker for DnsCheck {
    fn name(&self) -> &'static str {
        CHECK_NAME
    }

    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn default_category(&self) -> &'static str {
        "networking"
    }

    async fn run(&self, config: Option<&serde_json::Value>) -> anyhow::Result<CheckOutcome> {
        let cfg: DnsConfig = match config {
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| anyhow::anyhow!("parsing dns check config: {e}"))?,
            None => DnsConfig::default(),
        };
        let test_domain = cfg
            .test_domain
            .unwrap_or_else(|| DEFAULT_TEST_DOMAIN.to_string());

        // Step 1: verify CoreDNS pods are running.
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), "kube-system");
        let pod_list = match pods
            .list(&ListParams::default().labels(DNS_POD_SELECTOR))
            .await
        {
            Ok(list) => list,
            Err(e) => {
                return Ok(CheckOutcome::failing(format!(
                    "failed to list DNS pods: {e}"
                )));
            }
        };

        let running = pod_list
            .items
            .iter()
            .filter(|pod| {
                pod.status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .is_some_and(|phase| phase == "Running")
            })
            .count();

        if running == 0 {
            return Ok(CheckOutcome::failing(
                "no DNS pods found in Running state in kube-system",
            )
            .with_detail("dnsPodsRunning", "0"));
        }

        // Step 2: attempt DNS resolution.
        match tokio::net::lookup_host(format!("{test_domain}:53")).await {
            Ok(addrs) => {
                let resolved: Vec<String> = addrs.map(|a| a.ip().to_string()).collect();
                Ok(CheckOutcome::passing(format!(
                    "DNS operational: {running} pods running, {test_domain} resolves to {resolved:?}"
                ))
                .with_detail("dnsPodsRunning", running.to_string())
                .with_detail("resolvedAddresses", format!("{resolved:?}")))
            }
            Err(e) => Ok(CheckOutcome::failing(format!(
                "DNS resolution failed for {test_domain}: {e}"
            ))
            .with_detail("dnsPodsRunning", running.to_string())
            .with_detail("resolveError", e.to_string())),
        }
    }
}
