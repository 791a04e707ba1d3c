//! `GateProfile` Custom Resource Definition
//!
//! A reusable, ordered bundle of check references.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::clusterreadiness::Condition;
use super::gatecheck::ProfileCheckRef;

/// `GateProfile` CRD: a named, ordered sequence of check references
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(group = "clustergate.io", version = "v1alpha1", kind = "GateProfile")]
#[kube(status = "GateProfileStatus", shortname = "gp")]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
pub struct GateProfileSpec {
    /// Human-readable description of this profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Check references included in this profile, in declaration order
    #[serde(default)]
    pub checks: Vec<ProfileCheckRef>,
}

/// Status of a `GateProfile`
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct GateProfileStatus {
    /// Latest observations of the GateProfile's state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
