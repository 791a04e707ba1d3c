//! Custom Resource Definitions for the ClusterGate operator

pub mod clusterreadiness;
pub mod gatecheck;
pub mod gateprofile;

pub use clusterreadiness::{
    set_condition, CategoryStatus, CheckSpec, CheckStatus, CheckVerdict, ClusterReadiness,
    ClusterReadinessSpec, ClusterReadinessStatus, Condition, HealthState, ProfileRef,
    ReadinessSummary, Severity,
};
pub use gatecheck::{
    EnvVar, GateCheck, GateCheckSpec, GateCheckStatus, HttpProbeSpec, PodSelectorSpec,
    ProfileCheckRef, PromqlAssertionSpec, PromqlCondition, ResourceAssertionSpec,
    ResourceConditionCheck, ScriptJobSpec,
};
pub use gateprofile::{GateProfile, GateProfileSpec, GateProfileStatus};
