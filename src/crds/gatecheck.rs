//! `GateCheck` Custom Resource Definition
//!
//! A cluster-scoped check declared at runtime. Exactly one of the five check
//! type fields must be populated; the GateCheck reconciler surfaces a `Valid`
//! condition when that rule is broken.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::clusterreadiness::Severity;

fn default_min_ready() -> i32 {
    1
}

fn default_http_method() -> String {
    "GET".to_string()
}

/// `GateCheck` CRD: a single dynamically-declared readiness check
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(group = "clustergate.io", version = "v1alpha1", kind = "GateCheck")]
#[kube(status = "GateCheckStatus", shortname = "gchk")]
#[kube(printcolumn = r#"{"name":"Severity","type":"string","jsonPath":".spec.severity"}"#)]
#[kube(printcolumn = r#"{"name":"Category","type":"string","jsonPath":".spec.category"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
pub struct GateCheckSpec {
    /// Human-readable description of what this check validates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Default severity when no reference overrides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Default category when no reference overrides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Verifies that pods matching a label selector are running and ready
    #[serde(default, rename = "podSelector", skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<PodSelectorSpec>,

    /// Performs an HTTP request and validates the response status code
    #[serde(default, rename = "httpProbe", skip_serializing_if = "Option::is_none")]
    pub http_probe: Option<HttpProbeSpec>,

    /// Asserts conditions on any Kubernetes resource
    #[serde(default, rename = "resourceAssertion", skip_serializing_if = "Option::is_none")]
    pub resource_assertion: Option<ResourceAssertionSpec>,

    /// Queries a Prometheus endpoint and evaluates the result
    #[serde(default, rename = "promqlAssertion", skip_serializing_if = "Option::is_none")]
    pub promql_assertion: Option<PromqlAssertionSpec>,

    /// Runs a custom script as a Kubernetes Job
    #[serde(default, rename = "scriptJob", skip_serializing_if = "Option::is_none")]
    pub script_job: Option<ScriptJobSpec>,
}

impl GateCheckSpec {
    /// Number of populated check type fields. Valid specs have exactly one.
    #[must_use]
    pub fn variant_count(&self) -> usize {
        [
            self.pod_selector.is_some(),
            self.http_probe.is_some(),
            self.resource_assertion.is_some(),
            self.promql_assertion.is_some(),
            self.script_job.is_some(),
        ]
        .iter()
        .filter(|populated| **populated)
        .count()
    }
}

/// Status of a `GateCheck`
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct GateCheckStatus {
    /// Latest observations of the GateCheck's state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<super::clusterreadiness::Condition>,
}

/// Pod readiness check against a label selector
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct PodSelectorSpec {
    /// Namespace to search for pods
    pub namespace: String,

    /// Label selector for the pods to check (empty selects everything)
    #[serde(default, rename = "matchLabels")]
    pub match_labels: BTreeMap<String, String>,

    /// Minimum number of ready pods for the check to pass
    #[serde(default = "default_min_ready", rename = "minReady")]
    pub min_ready: i32,
}

/// HTTP probe check
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct HttpProbeSpec {
    /// HTTP endpoint to probe
    pub url: String,

    /// HTTP method to use
    #[serde(default = "default_http_method")]
    pub method: String,

    /// Acceptable HTTP status codes (defaults to [200])
    #[serde(default, rename = "expectedStatusCodes")]
    pub expected_status_codes: Vec<u16>,

    /// Request timeout
    #[serde(default, rename = "timeoutSeconds", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,

    /// Disables TLS certificate verification
    #[serde(default, rename = "insecureSkipTLSVerify")]
    pub insecure_skip_tls_verify: bool,

    /// Headers to include in the request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Condition assertion on an arbitrary Kubernetes resource
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct ResourceAssertionSpec {
    /// API version of the resource (e.g. "apps/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Kind of the resource (e.g. "Deployment")
    pub kind: String,

    /// Namespace of the resource. Empty for cluster-scoped resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name of the resource. Mutually exclusive with matchLabels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Label selector for the resources to check. Mutually exclusive with name.
    #[serde(default, rename = "matchLabels")]
    pub match_labels: BTreeMap<String, String>,

    /// Conditions to assert on each selected resource
    pub conditions: Vec<ResourceConditionCheck>,
}

/// Expected condition entry on a resource's status
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct ResourceConditionCheck {
    /// Condition type to check
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Expected condition status (e.g. "True", "False")
    pub status: String,
}

/// PromQL instant query check
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct PromqlAssertionSpec {
    /// Prometheus server URL
    pub endpoint: String,

    /// PromQL expression to evaluate
    pub query: String,

    /// How to evaluate the query result
    pub condition: PromqlCondition,

    /// Query timeout
    #[serde(default, rename = "timeoutSeconds", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
}

/// Evaluation rule for a PromQL query result
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct PromqlCondition {
    /// Either "resultCount" or "value"
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Comparison operator: gte, lte, eq, gt, lt
    pub operator: String,

    /// Value to compare against
    pub threshold: f64,
}

/// Script check executed as a Kubernetes Job
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct ScriptJobSpec {
    /// Container image to run
    pub image: String,

    /// Entrypoint for the container
    #[serde(default)]
    pub command: Vec<String>,

    /// Arguments to the entrypoint
    #[serde(default)]
    pub args: Vec<String>,

    /// Maximum time the job may run
    #[serde(default, rename = "timeoutSeconds", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,

    /// ServiceAccount for the job pod
    #[serde(default, rename = "serviceAccountName", skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Environment variables for the container
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// Environment variable for a script job container
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Reference to a built-in or dynamic check within a `GateProfile`
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct ProfileCheckRef {
    /// Identifier of a built-in check (e.g. "dns"). Mutually exclusive with gateCheckRef.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Name of a GateCheck resource. Mutually exclusive with name.
    #[serde(default, rename = "gateCheckRef", skip_serializing_if = "Option::is_none")]
    pub gate_check_ref: Option<String>,

    /// Overrides the check's default severity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Overrides the check's default category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Overrides the default interval for this check
    #[serde(default, rename = "intervalSeconds", skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<i64>,

    /// Whether this check is active (defaults to true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Check-specific configuration as arbitrary JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl ProfileCheckRef {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Unique key for this reference. A dynamic ref wins if both fields are
    /// populated.
    #[must_use]
    pub fn identifier(&self) -> String {
        if let Some(gate_check) = &self.gate_check_ref {
            return format!("dynamic:{gate_check}");
        }
        self.name.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_count_counts_populated_types() {
        let empty = GateCheckSpec::default();
        assert_eq!(empty.variant_count(), 0);

        let single = GateCheckSpec {
            http_probe: Some(HttpProbeSpec {
                url: "https://example.com/healthz".into(),
                method: default_http_method(),
                expected_status_codes: vec![],
                timeout_seconds: None,
                insecure_skip_tls_verify: false,
                headers: BTreeMap::new(),
            }),
            ..GateCheckSpec::default()
        };
        assert_eq!(single.variant_count(), 1);

        let double = GateCheckSpec {
            pod_selector: Some(PodSelectorSpec {
                namespace: "default".into(),
                match_labels: BTreeMap::new(),
                min_ready: 1,
            }),
            ..single
        };
        assert_eq!(double.variant_count(), 2);
    }

    #[test]
    fn profile_check_ref_identifier() {
        let dynamic = ProfileCheckRef {
            gate_check_ref: Some("vault-ready".into()),
            ..ProfileCheckRef::default()
        };
        assert_eq!(dynamic.identifier(), "dynamic:vault-ready");

        let builtin = ProfileCheckRef {
            name: Some("etcd".into()),
            ..ProfileCheckRef::default()
        };
        assert_eq!(builtin.identifier(), "etcd");
    }

    #[test]
    fn spec_deserializes_camel_case_fields() {
        let yaml = r#"
severity: warning
category: networking
httpProbe:
  url: http://gateway.example.com/status
  expectedStatusCodes: [200, 204]
  timeoutSeconds: 5
  insecureSkipTLSVerify: true
"#;
        let spec: GateCheckSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.severity, Some(Severity::Warning));
        let probe = spec.http_probe.unwrap();
        assert_eq!(probe.expected_status_codes, vec![200, 204]);
        assert_eq!(probe.timeout_seconds, Some(5));
        assert!(probe.insecure_skip_tls_verify);
        assert_eq!(probe.method, "GET");
    }
}
