//! Result aggregation
//!
//! Folds per-check rows (freshly executed plus carried forward) into the
//! three-level verdict: per-check status rows, per-category rollups, and the
//! cluster-wide health state. Categories and the checks within them are
//! sorted by name; the ordering is part of the observable contract.

use std::collections::BTreeMap;

use crate::crds::{CategoryStatus, CheckStatus, HealthState, ReadinessSummary, Severity};

/// A check result row paired with the category it rolls up under.
#[derive(Debug, Clone)]
pub struct CheckRow {
    pub status: CheckStatus,
    pub category: String,
}

/// Aggregated view of one reconciliation.
#[derive(Debug)]
pub struct Rollup {
    pub state: HealthState,
    pub summary: ReadinessSummary,
    pub categories: Vec<CategoryStatus>,
}

impl Rollup {
    /// Readiness as the metrics and conditions report it: every critical
    /// check is passing.
    #[must_use]
    pub fn all_critical_passing(&self) -> bool {
        self.summary.critical_passing == self.summary.critical_total
    }
}

struct CategoryAgg {
    checks: Vec<CheckStatus>,
    total: u32,
    passing: u32,
    failing: u32,
    has_critical_failing: bool,
    has_warning_failing: bool,
}

/// Walks all rows and derives the summary counters, category rollups, and
/// cluster state.
#[must_use]
pub fn aggregate(rows: Vec<CheckRow>) -> Rollup {
    let mut summary = ReadinessSummary::default();
    let mut categories: BTreeMap<String, CategoryAgg> = BTreeMap::new();

    for row in rows {
        let passing = row.status.status.is_passing();

        summary.total += 1;
        if passing {
            summary.passing += 1;
        } else {
            summary.failing += 1;
        }
        match row.status.severity {
            Severity::Critical => {
                summary.critical_total += 1;
                if passing {
                    summary.critical_passing += 1;
                }
            }
            Severity::Warning => {
                summary.warning_total += 1;
                if !passing {
                    summary.warning_failing += 1;
                }
            }
            Severity::Info => {}
        }

        let agg = categories.entry(row.category).or_insert_with(|| CategoryAgg {
            checks: Vec::new(),
            total: 0,
            passing: 0,
            failing: 0,
            has_critical_failing: false,
            has_warning_failing: false,
        });
        agg.total += 1;
        if passing {
            agg.passing += 1;
        } else {
            agg.failing += 1;
            match row.status.severity {
                Severity::Critical => agg.has_critical_failing = true,
                Severity::Warning => agg.has_warning_failing = true,
                Severity::Info => {}
            }
        }
        agg.checks.push(row.status);
    }

    let categories = categories
        .into_iter()
        .map(|(category, mut agg)| {
            agg.checks.sort_by(|a, b| a.name.cmp(&b.name));
            let state = if agg.has_critical_failing {
                HealthState::Unhealthy
            } else if agg.has_warning_failing {
                HealthState::Degraded
            } else {
                HealthState::Healthy
            };
            CategoryStatus {
                category,
                state,
                checks: agg.checks,
                total: agg.total,
                passing: agg.passing,
                failing: agg.failing,
            }
        })
        .collect();

    let state = if summary.critical_passing < summary.critical_total {
        HealthState::Unhealthy
    } else if summary.warning_failing > 0 {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    };

    Rollup {
        state,
        summary,
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::CheckVerdict;

    fn row(name: &str, category: &str, severity: Severity, passing: bool) -> CheckRow {
        CheckRow {
            status: CheckStatus {
                name: name.to_string(),
                source: Some("inline".to_string()),
                status: if passing {
                    CheckVerdict::Passing
                } else {
                    CheckVerdict::Failing
                },
                severity,
                message: None,
                last_checked: Some("2025-01-01T12:00:00Z".to_string()),
            },
            category: category.to_string(),
        }
    }

    #[test]
    fn all_passing_is_healthy() {
        let rollup = aggregate(vec![
            row("dns", "networking", Severity::Critical, true),
            row("etcd", "control-plane", Severity::Critical, true),
        ]);
        assert_eq!(rollup.state, HealthState::Healthy);
        assert!(rollup.all_critical_passing());
        assert_eq!(rollup.summary.total, 2);
        assert_eq!(rollup.summary.critical_total, 2);
        assert_eq!(rollup.summary.critical_passing, 2);
    }

    #[test]
    fn critical_failure_is_unhealthy() {
        let rollup = aggregate(vec![
            row("a", "general", Severity::Critical, true),
            row("b", "general", Severity::Critical, false),
        ]);
        assert_eq!(rollup.state, HealthState::Unhealthy);
        assert!(!rollup.all_critical_passing());
        assert_eq!(rollup.summary.critical_passing, 1);
        assert_eq!(rollup.summary.critical_total, 2);
    }

    #[test]
    fn warning_failure_is_degraded() {
        let rollup = aggregate(vec![
            row("a", "general", Severity::Critical, true),
            row("b", "general", Severity::Warning, false),
        ]);
        assert_eq!(rollup.state, HealthState::Degraded);
        assert!(rollup.all_critical_passing());
        assert_eq!(rollup.summary.warning_failing, 1);
    }

    #[test]
    fn info_failures_only_count_in_totals() {
        let rollup = aggregate(vec![
            row("a", "general", Severity::Critical, true),
            row("b", "general", Severity::Info, false),
        ]);
        assert_eq!(rollup.state, HealthState::Healthy);
        assert_eq!(rollup.summary.total, 2);
        assert_eq!(rollup.summary.failing, 1);
        // The category stays healthy too.
        assert_eq!(rollup.categories[0].state, HealthState::Healthy);
    }

    #[test]
    fn category_state_rules() {
        let rollup = aggregate(vec![
            row("ingress", "networking", Severity::Critical, false),
            row("latency", "networking", Severity::Warning, true),
            row("backup", "storage", Severity::Warning, false),
            row("volumes", "storage", Severity::Critical, true),
            row("certs", "security", Severity::Critical, true),
        ]);

        let by_name: std::collections::HashMap<&str, &CategoryStatus> = rollup
            .categories
            .iter()
            .map(|c| (c.category.as_str(), c))
            .collect();
        assert_eq!(by_name["networking"].state, HealthState::Unhealthy);
        assert_eq!(by_name["storage"].state, HealthState::Degraded);
        assert_eq!(by_name["security"].state, HealthState::Healthy);
        assert_eq!(rollup.state, HealthState::Unhealthy);
    }

    #[test]
    fn categories_and_checks_are_sorted_by_name() {
        let rollup = aggregate(vec![
            row("zeta", "storage", Severity::Critical, true),
            row("alpha", "storage", Severity::Critical, true),
            row("dns", "networking", Severity::Critical, true),
        ]);

        let names: Vec<&str> = rollup
            .categories
            .iter()
            .map(|c| c.category.as_str())
            .collect();
        assert_eq!(names, vec!["networking", "storage"]);

        let storage_checks: Vec<&str> = rollup.categories[1]
            .checks
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(storage_checks, vec!["alpha", "zeta"]);
    }

    #[test]
    fn per_category_counters() {
        let rollup = aggregate(vec![
            row("a", "general", Severity::Critical, true),
            row("b", "general", Severity::Warning, false),
            row("c", "general", Severity::Info, false),
        ]);
        let general = &rollup.categories[0];
        assert_eq!(general.total, 3);
        assert_eq!(general.passing, 1);
        assert_eq!(general.failing, 2);
    }

    #[test]
    fn empty_input_is_healthy_and_empty() {
        let rollup = aggregate(Vec::new());
        assert_eq!(rollup.state, HealthState::Healthy);
        assert!(rollup.categories.is_empty());
        assert_eq!(rollup.summary, ReadinessSummary::default());
        assert!(rollup.all_critical_passing());
    }
}
