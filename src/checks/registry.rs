//! Registry of built-in readiness checks
//!
//! A pure dispatch table keyed by check name. Registration happens once at
//! process bootstrap; lookups are concurrent and lock-free after that apart
//! from the brief read guard.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::Checker;

/// Process-wide mapping from built-in check name to its handle.
///
/// Held behind an `Arc` and passed into the reconciler context rather than
/// living as a true global, so tests can build isolated instances.
#[derive(Default)]
pub struct CheckRegistry {
    checks: RwLock<HashMap<String, Arc<dyn Checker>>>,
}

impl CheckRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a checker to the registry.
    ///
    /// # Panics
    /// Panics if a check with the same name is already registered. Double
    /// registration is a programming error and must fail loudly at bootstrap.
    pub fn register(&self, checker: Arc<dyn Checker>) {
        let name = checker.name().to_string();
        let mut checks = self.checks.write().expect("check registry lock poisoned");
        if checks.contains_key(&name) {
            panic!("check already registered: {name}");
        }
        checks.insert(name, checker);
    }

    /// Retrieves a checker by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Checker>> {
        self.checks
            .read()
            .expect("check registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Names of all registered checks, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .checks
            .read()
            .expect("check registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
