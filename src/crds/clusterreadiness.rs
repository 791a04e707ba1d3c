//! `ClusterReadiness` Custom Resource Definition
//!
//! The top-level entity: a catalogue of readiness checks (profile references
//! plus inline checks) together with the aggregated observed state the
//! reconciler writes back.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity decides how a failing check affects the cluster verdict.
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A failing check forces the cluster Unhealthy.
    Critical,
    /// A failing check marks the cluster Degraded.
    Warning,
    /// Counted in totals only.
    Info,
}

impl Severity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall health derived from aggregate counters.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "Healthy",
            HealthState::Degraded => "Degraded",
            HealthState::Unhealthy => "Unhealthy",
        }
    }

    /// All three states, in declaration order. Used to zero out the inactive
    /// labels on the health-state gauge.
    pub const ALL: [HealthState; 3] = [
        HealthState::Healthy,
        HealthState::Degraded,
        HealthState::Unhealthy,
    ];
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a single check is passing.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum CheckVerdict {
    Passing,
    Failing,
}

impl CheckVerdict {
    #[must_use]
    pub fn is_passing(&self) -> bool {
        matches!(self, CheckVerdict::Passing)
    }
}

/// Reference to a `GateProfile` by name.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct ProfileRef {
    /// Name of the GateProfile
    pub name: String,

    /// Check identifiers to skip when expanding this profile
    #[serde(default, rename = "excludeChecks")]
    pub exclude_checks: Vec<String>,
}

/// A single readiness check declaration. Inline checks override profile
/// entries with the same identifier.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct CheckSpec {
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

    /// Check-specific configuration as arbitrary JSON (built-in checks only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl CheckSpec {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Unique key for this declaration. A dynamic ref wins if both fields
    /// are populated.
    #[must_use]
    pub fn identifier(&self) -> String {
        if let Some(gate_check) = &self.gate_check_ref {
            return format!("dynamic:{gate_check}");
        }
        self.name.clone().unwrap_or_default()
    }
}

/// `ClusterReadiness` CRD: the desired set of readiness checks for a cluster
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(group = "clustergate.io", version = "v1alpha1", kind = "ClusterReadiness")]
#[kube(status = "ClusterReadinessStatus")]
#[kube(printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#)]
#[kube(printcolumn = r#"{"name":"Passing","type":"integer","jsonPath":".status.summary.passing"}"#)]
#[kube(printcolumn = r#"{"name":"Failing","type":"integer","jsonPath":".status.summary.failing"}"#)]
#[kube(printcolumn = r#"{"name":"Last Checked","type":"date","jsonPath":".status.lastChecked"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
pub struct ClusterReadinessSpec {
    /// Default interval for checks that don't specify their own
    #[serde(default, rename = "intervalSeconds", skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<i64>,

    /// GateProfiles to include in this readiness evaluation
    #[serde(default)]
    pub profiles: Vec<ProfileRef>,

    /// Inline readiness checks. These override profile checks with the same identifier.
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

/// Observed state of a `ClusterReadiness`
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterReadinessStatus {
    /// Aggregate health of the cluster
    pub state: HealthState,

    /// Aggregated counters across all checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReadinessSummary>,

    /// Per-category rollups with nested per-check rows, sorted by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryStatus>,

    /// When any check was last evaluated (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<String>,

    /// Latest observations of the resource's state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Default for ClusterReadinessStatus {
    fn default() -> Self {
        Self {
            state: HealthState::Unhealthy,
            summary: None,
            categories: Vec::new(),
            last_checked: None,
            conditions: Vec::new(),
        }
    }
}

/// Aggregated counters across the whole entity
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessSummary {
    pub total: u32,
    pub passing: u32,
    pub failing: u32,
    pub critical_total: u32,
    pub critical_passing: u32,
    pub warning_total: u32,
    pub warning_failing: u32,
}

/// Rollup for a single category
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStatus {
    pub category: String,

    /// Unhealthy if any critical check is failing, Degraded if any warning
    /// check is failing, Healthy otherwise.
    pub state: HealthState,

    /// Per-check rows, sorted by name
    #[serde(default)]
    pub checks: Vec<CheckStatus>,

    pub total: u32,
    pub passing: u32,
    pub failing: u32,
}

/// Result of a single readiness check
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckStatus {
    /// Check identifier (built-in name or "dynamic:<name>")
    pub name: String,

    /// Provenance: "inline" or "profile:<name>"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    pub status: CheckVerdict,

    pub severity: Severity,

    /// Human-readable description of the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When this check was last evaluated (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<String>,
}

/// Condition entry for status reporting
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g. "Ready", "Degraded", "ProfilesResolved")
    #[serde(rename = "type")]
    pub condition_type: String,

    /// "True" or "False"
    pub status: String,

    /// Last time the condition transitioned (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Upserts `condition` into `conditions`, keyed by type. The transition time
/// is preserved when the status is unchanged.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        if existing.status == condition.status {
            condition.last_transition_time = existing.last_transition_time.clone();
        }
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}
