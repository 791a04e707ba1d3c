//! Check scheduling
//!
//! Partitions the resolved checks into those that are due now and those
//! whose prior result is still fresh, and computes the delay until the next
//! reconciliation is needed. A check with no usable prior timestamp is due;
//! at exactly `elapsed == interval` the check runs.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::resolver::ResolvedCheck;
use crate::crds::CheckStatus;

/// A prior status row together with the category it was reported under.
#[derive(Debug, Clone)]
pub struct PriorCheck {
    pub status: CheckStatus,
    pub category: String,
}

/// Outcome of one scheduling pass.
#[derive(Debug)]
pub struct Schedule {
    /// Checks that must execute this cycle
    pub due: Vec<ResolvedCheck>,

    /// Prior rows reused verbatim because the check is not yet due
    pub carried: Vec<PriorCheck>,

    /// Delay until the next check becomes stale; `None` when the entity has
    /// no checks at all.
    pub next_requeue: Option<Duration>,
}

/// Decides run-now vs carry-forward for every resolved check.
#[must_use]
pub fn plan(
    resolved: Vec<ResolvedCheck>,
    prior: &HashMap<String, PriorCheck>,
    now: DateTime<Utc>,
) -> Schedule {
    let mut due = Vec::new();
    let mut carried = Vec::new();
    let mut min_remaining: Option<Duration> = None;

    let shortest_interval = resolved.iter().map(|rc| rc.interval).min();

    for rc in resolved {
        let last_checked = prior
            .get(&rc.identifier)
            .and_then(|p| p.status.last_checked.as_deref())
            .and_then(parse_rfc3339);

        let Some(last_checked) = last_checked else {
            due.push(rc);
            continue;
        };

        // Clock skew can put lastChecked in the future; treat it as fresh
        // for at most one full interval.
        let elapsed = now
            .signed_duration_since(last_checked)
            .to_std()
            .unwrap_or(Duration::ZERO);

        if elapsed >= rc.interval {
            due.push(rc);
            continue;
        }

        let remaining = rc.interval - elapsed;
        min_remaining = Some(match min_remaining {
            Some(current) => current.min(remaining),
            None => remaining,
        });
        carried.push(prior[&rc.identifier].clone());
    }

    // All due (nothing carried): come back once the shortest interval lapses.
    let next_requeue = min_remaining.or(shortest_interval);

    Schedule {
        due,
        carried,
        next_requeue,
    }
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{CheckVerdict, Severity};
    use crate::gates::resolver::CheckTarget;

    fn resolved(identifier: &str, interval: Duration) -> ResolvedCheck {
        ResolvedCheck {
            identifier: identifier.to_string(),
            target: CheckTarget::Builtin(identifier.to_string()),
            severity: None,
            category: None,
            interval,
            config: None,
            source: "inline".to_string(),
        }
    }

    fn prior_at(identifier: &str, last_checked: Option<DateTime<Utc>>) -> (String, PriorCheck) {
        (
            identifier.to_string(),
            PriorCheck {
                status: CheckStatus {
                    name: identifier.to_string(),
                    source: Some("inline".to_string()),
                    status: CheckVerdict::Passing,
                    severity: Severity::Critical,
                    message: None,
                    last_checked: last_checked.map(|dt| dt.to_rfc3339()),
                },
                category: "general".to_string(),
            },
        )
    }

    fn test_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn no_prior_status_means_all_due() {
        let now = test_now();
        let schedule = plan(
            vec![resolved("dns", MINUTE), resolved("dynamic:ingress", MINUTE)],
            &HashMap::new(),
            now,
        );
        assert_eq!(schedule.due.len(), 2);
        assert!(schedule.carried.is_empty());
        assert_eq!(schedule.next_requeue, Some(MINUTE));
    }

    #[test]
    fn stale_checks_are_due() {
        let now = test_now();
        let prior = HashMap::from([
            prior_at("dns", Some(now - chrono::Duration::minutes(2))),
            prior_at("dynamic:ingress", Some(now - chrono::Duration::minutes(5))),
        ]);
        let schedule = plan(
            vec![resolved("dns", MINUTE), resolved("dynamic:ingress", MINUTE)],
            &prior,
            now,
        );
        assert_eq!(schedule.due.len(), 2);
        assert!(schedule.carried.is_empty());
        assert_eq!(schedule.next_requeue, Some(MINUTE));
    }

    #[test]
    fn fresh_checks_carry_with_min_remaining() {
        let now = test_now();
        let prior = HashMap::from([
            prior_at("dns", Some(now - chrono::Duration::seconds(30))),
            prior_at("dynamic:ingress", Some(now - chrono::Duration::seconds(30))),
        ]);
        let schedule = plan(
            vec![
                resolved("dns", MINUTE),
                resolved("dynamic:ingress", 2 * MINUTE),
            ],
            &prior,
            now,
        );
        assert!(schedule.due.is_empty());
        assert_eq!(schedule.carried.len(), 2);
        // dns has 30s remaining
        assert_eq!(schedule.next_requeue, Some(Duration::from_secs(30)));
    }

    #[test]
    fn mixed_freshness_partitions_by_identifier() {
        let now = test_now();
        let prior = HashMap::from([
            prior_at("a", Some(now - chrono::Duration::minutes(2))),
            prior_at("b", Some(now - chrono::Duration::seconds(30))),
        ]);
        let schedule = plan(
            vec![resolved("a", MINUTE), resolved("b", 5 * MINUTE)],
            &prior,
            now,
        );
        assert_eq!(schedule.due.len(), 1);
        assert_eq!(schedule.due[0].identifier, "a");
        assert_eq!(schedule.carried.len(), 1);
        assert_eq!(schedule.carried[0].status.name, "b");
        // b has 4m30s remaining
        assert_eq!(schedule.next_requeue, Some(Duration::from_secs(270)));
    }

    #[test]
    fn empty_resolved_list_does_not_requeue() {
        let schedule = plan(Vec::new(), &HashMap::new(), test_now());
        assert!(schedule.due.is_empty());
        assert!(schedule.carried.is_empty());
        assert_eq!(schedule.next_requeue, None);
    }

    #[test]
    fn interval_boundary_is_inclusive() {
        let now = test_now();
        let prior = HashMap::from([prior_at("dns", Some(now - chrono::Duration::seconds(60)))]);
        let schedule = plan(vec![resolved("dns", MINUTE)], &prior, now);
        assert_eq!(schedule.due.len(), 1);
        assert!(schedule.carried.is_empty());
    }

    #[test]
    fn missing_last_checked_is_due() {
        let now = test_now();
        let prior = HashMap::from([prior_at("dns", None)]);
        let schedule = plan(vec![resolved("dns", MINUTE)], &prior, now);
        assert_eq!(schedule.due.len(), 1);
    }

    #[test]
    fn every_check_is_due_xor_carried() {
        let now = test_now();
        let prior = HashMap::from([
            prior_at("a", Some(now - chrono::Duration::seconds(10))),
            prior_at("b", Some(now - chrono::Duration::minutes(10))),
            prior_at("c", None),
        ]);
        let resolved_list = vec![
            resolved("a", MINUTE),
            resolved("b", MINUTE),
            resolved("c", MINUTE),
            resolved("d", MINUTE),
        ];
        let total = resolved_list.len();
        let schedule = plan(resolved_list, &prior, now);
        assert_eq!(schedule.due.len() + schedule.carried.len(), total);

        let due: Vec<&str> = schedule.due.iter().map(|rc| rc.identifier.as_str()).collect();
        let carried: Vec<&str> = schedule
            .carried
            .iter()
            .map(|p| p.status.name.as_str())
            .collect();
        for identifier in &due {
            assert!(!carried.contains(identifier));
        }
    }

    #[test]
    fn requeue_never_exceeds_shortest_interval() {
        let now = test_now();
        // lastChecked in the future (clock skew): elapsed clamps to zero and
        // the remaining time is capped at the interval itself.
        let prior = HashMap::from([prior_at("dns", Some(now + chrono::Duration::minutes(10)))]);
        let schedule = plan(vec![resolved("dns", MINUTE)], &prior, now);
        assert!(schedule.due.is_empty());
        assert_eq!(schedule.next_requeue, Some(MINUTE));
    }
}
