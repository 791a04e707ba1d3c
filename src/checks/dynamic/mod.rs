//! Dynamic check execution
//!
//! `GateCheck` resources declare one of five check types; the executor
//! dispatches on the populated variant at reconcile time.

use kube::Client;
use std::time::Duration;

use super::CheckOutcome;
use crate::crds::GateCheckSpec;

mod http;
mod pod;
mod promql;
mod resource;
mod script;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Evaluates `GateCheck` specs at runtime.
///
/// `namespace` is where script-check Jobs are created.
pub struct DynamicExecutor {
    client: Client,
    namespace: String,
}

impl DynamicExecutor {
    #[must_use]
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Runs the check type populated in `spec`. The check name labels any
    /// Jobs created for script checks.
    ///
    /// # Errors
    /// Returns an error when no check type is specified or when a check
    /// cannot be driven at all (e.g. Job creation fails); probe-level
    /// failures are reported through the returned [`CheckOutcome`].
    pub async fn execute(
        &self,
        check_name: &str,
        spec: &GateCheckSpec,
    ) -> anyhow::Result<CheckOutcome> {
        if let Some(pod_selector) = &spec.pod_selector {
            return pod::execute(&self.client, pod_selector).await;
        }
        if let Some(http_probe) = &spec.http_probe {
            return http::execute(http_probe).await;
        }
        if let Some(resource_assertion) = &spec.resource_assertion {
            return resource::execute(&self.client, resource_assertion).await;
        }
        if let Some(promql_assertion) = &spec.promql_assertion {
            return promql::execute(promql_assertion).await;
        }
        if let Some(script_job) = &spec.script_job {
            return script::execute(&self.client, &self.namespace, check_name, script_job).await;
        }
        anyhow::bail!("no check type specified in GateCheck")
    }
}

/// HTTP client configured for a check spec.
fn http_client_for_spec(
    insecure_skip_tls: bool,
    timeout: Duration,
) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(insecure_skip_tls)
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))
}

fn timeout_from_spec(timeout_seconds: Option<i64>) -> Duration {
    match timeout_seconds {
        Some(secs) if secs > 0 => Duration::from_secs(secs.unsigned_abs()),
        _ => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_spec_is_an_executor_error() {
        // A spec with no populated variant is a programming/validation error,
        // not a probe failure.
        let client = Client::try_default().await;
        let Ok(client) = client else {
            // No kubeconfig in the test environment; dispatch validation is
            // still covered by variant_count tests on the spec type.
            return;
        };
        let executor = DynamicExecutor::new(client, "clustergate-system");
        let err = executor
            .execute("empty", &GateCheckSpec::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no check type specified"));
    }

    #[test]
    fn timeout_defaults_and_clamps() {
        assert_eq!(timeout_from_spec(None), Duration::from_secs(10));
        assert_eq!(timeout_from_spec(Some(0)), Duration::from_secs(10));
        assert_eq!(timeout_from_spec(Some(-5)), Duration::from_secs(10));
        assert_eq!(timeout_from_spec(Some(25)), Duration::from_secs(25));
    }
}
