//! Readiness check contract and built-in check implementations
//!
//! Built-in checks are compiled in and dispatched through the
//! [`registry::CheckRegistry`]; dynamic checks are declared via `GateCheck`
//! resources and executed by [`dynamic::DynamicExecutor`].

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::crds::Severity;

pub mod controlplane;
pub mod dns;
pub mod dynamic;
pub mod registry;

pub use registry::CheckRegistry;

/// Outcome of a single readiness check execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckOutcome {
    /// Whether the check is passing
    pub ready: bool,

    /// Human-readable summary of the result
    pub message: String,

    /// Additional key-value diagnostic information
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl CheckOutcome {
    /// A passing outcome with the given message.
    #[must_use]
    pub fn passing(message: impl Into<String>) -> Self {
        Self {
            ready: true,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// A failing outcome with the given message.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            ready: false,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Attaches a diagnostic detail.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Contract every built-in readiness check implements.
///
/// `config` is the check-specific opaque JSON from the declaring spec; checks
/// apply their own defaults when it is absent. A returned `Err` is surfaced
/// by the engine as a `Failing` status row, never propagated.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Unique identifier for this check (e.g. "dns", "etcd")
    fn name(&self) -> &'static str;

    /// Severity used when no declaration overrides it
    fn default_severity(&self) -> Severity;

    /// Category used when no declaration overrides it
    fn default_category(&self) -> &'static str;

    /// Executes the check.
    async fn run(&self, config: Option<&serde_json::Value>) -> anyhow::Result<CheckOutcome>;
}
