//! Check resolution
//!
//! Flattens profile references plus inline checks into a deduplicated set of
//! [`ResolvedCheck`]s with deterministic override precedence: check default
//! → profile ref → later profile ref → inline. An explicitly disabled ref
//! removes any earlier entry for the same identifier; an inline ref merges
//! field-by-field over a profile entry it shadows.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use kube::{Api, Client};
use thiserror::Error;

use crate::crds::{CheckSpec, ClusterReadinessSpec, GateProfile, ProfileCheckRef, Severity};

/// Dispatch target of a resolved check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckTarget {
    /// Compiled-in check, dispatched through the registry
    Builtin(String),
    /// GateCheck resource, dispatched through the dynamic executor
    Dynamic(String),
}

/// Fully-merged, flat representation of a single scheduled execution.
#[derive(Debug, Clone)]
pub struct ResolvedCheck {
    /// Unique key: the builtin's name, or "dynamic:<name>" for dynamic refs
    pub identifier: String,

    pub target: CheckTarget,

    /// Resolved severity; `None` falls back to the check's own default
    pub severity: Option<Severity>,

    /// Resolved category; `None` falls back to the check's own default
    pub category: Option<String>,

    pub interval: Duration,

    /// Opaque check-specific configuration
    pub config: Option<serde_json::Value>,

    /// Provenance: "inline" or "profile:<name>"
    pub source: String,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("GateProfile not found: {0}")]
    ProfileNotFound(String),

    #[error("failed to fetch GateProfile {name}: {source}")]
    ProfileFetch {
        name: String,
        #[source]
        source: kube::Error,
    },
}

/// Source of live `GateProfile`s. The reconciler reads from the API server;
/// tests provide an in-memory map.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn profile(&self, name: &str) -> Result<Option<GateProfile>, kube::Error>;
}

/// API-server backed profile source.
pub struct ClusterProfiles {
    api: Api<GateProfile>,
}

impl ClusterProfiles {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl ProfileSource for ClusterProfiles {
    async fn profile(&self, name: &str) -> Result<Option<GateProfile>, kube::Error> {
        self.api.get_opt(name).await
    }
}

/// Working entry keyed by identifier. Option fields distinguish "not set"
/// from a value, so inline merge can inherit from a shadowed profile entry.
#[derive(Debug, Clone)]
struct WorkingCheck {
    identifier: String,
    target: CheckTarget,
    severity: Option<Severity>,
    category: Option<String>,
    interval: Option<Duration>,
    config: Option<serde_json::Value>,
    source: String,
}

impl WorkingCheck {
    fn from_profile_ref(check_ref: &ProfileCheckRef, profile_name: &str) -> Option<Self> {
        let identifier = check_ref.identifier();
        if identifier.is_empty() {
            return None;
        }
        Some(Self {
            target: target_for(check_ref.gate_check_ref.as_deref(), check_ref.name.as_deref()),
            identifier,
            severity: check_ref.severity,
            category: check_ref.category.clone(),
            interval: interval_from(check_ref.interval_seconds),
            config: check_ref.config.clone(),
            source: format!("profile:{profile_name}"),
        })
    }

    fn from_inline(check: &CheckSpec) -> Option<Self> {
        let identifier = check.identifier();
        if identifier.is_empty() {
            return None;
        }
        Some(Self {
            target: target_for(check.gate_check_ref.as_deref(), check.name.as_deref()),
            identifier,
            severity: check.severity,
            category: check.category.clone(),
            interval: interval_from(check.interval_seconds),
            config: check.config.clone(),
            source: "inline".to_string(),
        })
    }

    /// Inline-over-profile merge: the override wins on every field it sets,
    /// unset fields inherit from the base.
    fn merged_over(self, base: &WorkingCheck) -> Self {
        Self {
            identifier: self.identifier,
            target: self.target,
            severity: self.severity.or(base.severity),
            category: self.category.or_else(|| base.category.clone()),
            interval: self.interval.or(base.interval),
            config: self.config.or_else(|| base.config.clone()),
            source: self.source,
        }
    }

    fn into_resolved(self, default_interval: Duration) -> ResolvedCheck {
        ResolvedCheck {
            identifier: self.identifier,
            target: self.target,
            severity: self.severity,
            category: self.category,
            interval: self.interval.unwrap_or(default_interval),
            config: self.config,
            source: self.source,
        }
    }
}

fn target_for(gate_check_ref: Option<&str>, name: Option<&str>) -> CheckTarget {
    // A dynamic ref wins when both fields are populated; identifier() made
    // the same choice.
    if let Some(gate_check) = gate_check_ref {
        CheckTarget::Dynamic(gate_check.to_string())
    } else {
        CheckTarget::Builtin(name.unwrap_or_default().to_string())
    }
}

fn interval_from(seconds: Option<i64>) -> Option<Duration> {
    seconds
        .filter(|secs| *secs > 0)
        .map(|secs| Duration::from_secs(secs.unsigned_abs()))
}

/// Resolves profiles and inline checks into a flat list of checks to execute.
///
/// A referenced profile that cannot be fetched is fatal for the cycle; the
/// caller records a `ProfilesResolved=False` condition and requeues.
pub async fn resolve_checks(
    profiles: &dyn ProfileSource,
    spec: &ClusterReadinessSpec,
    default_interval: Duration,
) -> Result<Vec<ResolvedCheck>, ResolveError> {
    let mut resolved: HashMap<String, WorkingCheck> = HashMap::new();

    // Profiles in declaration order; later profiles override earlier ones.
    for profile_ref in &spec.profiles {
        let profile = match profiles.profile(&profile_ref.name).await {
            Ok(Some(profile)) => profile,
            Ok(None) => return Err(ResolveError::ProfileNotFound(profile_ref.name.clone())),
            Err(source) => {
                return Err(ResolveError::ProfileFetch {
                    name: profile_ref.name.clone(),
                    source,
                })
            }
        };

        for check_ref in &profile.spec.checks {
            let identifier = check_ref.identifier();
            if profile_ref.exclude_checks.contains(&identifier) {
                continue;
            }
            if !check_ref.is_enabled() {
                // Explicit disable defeats earlier adds.
                resolved.remove(&identifier);
                continue;
            }
            if let Some(entry) = WorkingCheck::from_profile_ref(check_ref, &profile_ref.name) {
                resolved.insert(entry.identifier.clone(), entry);
            }
        }
    }

    // Inline checks override profile entries with the same identifier.
    for check in &spec.checks {
        let identifier = check.identifier();
        if !check.is_enabled() {
            resolved.remove(&identifier);
            continue;
        }
        let Some(entry) = WorkingCheck::from_inline(check) else {
            continue;
        };
        let entry = match resolved.get(&identifier) {
            Some(existing) => entry.merged_over(existing),
            None => entry,
        };
        resolved.insert(identifier, entry);
    }

    Ok(resolved
        .into_values()
        .map(|entry| entry.into_resolved(default_interval))
        .collect())
}
