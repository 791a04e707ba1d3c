//! `ClusterReadiness` reconciliation driver
//!
//! One cycle: fetch the entity, resolve its declared checks, decide which
//! are due, run those in parallel, merge with carried-over results, roll up,
//! and publish to the metric collectors, the readiness snapshot store, and
//! the status subresource — in that order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use super::resolver::{self, CheckTarget, ClusterProfiles, ResolvedCheck};
use super::rollup::{self, CheckRow};
use super::scheduler::{self, PriorCheck};
use super::types::{Context, Error, Result};
use crate::crds::{
    set_condition, CheckStatus, CheckVerdict, ClusterReadiness, ClusterReadinessStatus, Condition,
    GateCheck, Severity,
};
use crate::server::{CategorySummaryView, CheckSnapshot, ClusterSnapshot};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

const CONDITION_READY: &str = "Ready";
const CONDITION_DEGRADED: &str = "Degraded";
const CONDITION_PROFILES_RESOLVED: &str = "ProfilesResolved";

#[instrument(skip(cr, ctx), fields(cluster_readiness = %cr.name_any()))]
pub async fn reconcile_cluster_readiness(
    cr: Arc<ClusterReadiness>,
    ctx: Arc<Context>,
) -> Result<Action> {
    let name = cr.name_any();
    let api: Api<ClusterReadiness> = Api::all(ctx.client.clone());

    // Re-fetch so the cycle works on the live object; a miss means the
    // entity was deleted and its snapshot record must go too.
    let Some(cr) = api.get_opt(&name).await? else {
        info!("ClusterReadiness deleted, purging readiness state");
        ctx.readiness.remove(&name).await;
        return Ok(Action::await_change());
    };

    let default_interval = cr
        .spec
        .interval_seconds
        .filter(|secs| *secs > 0)
        .map(|secs| Duration::from_secs(secs.unsigned_abs()))
        .unwrap_or(DEFAULT_INTERVAL);

    let mut conditions = cr
        .status
        .as_ref()
        .map(|status| status.conditions.clone())
        .unwrap_or_default();
    let now = Utc::now();
    let now_str = now.to_rfc3339();

    // Resolve profiles + inline checks into a flat list.
    let profiles = ClusterProfiles::new(ctx.client.clone());
    let resolved = match resolver::resolve_checks(&profiles, &cr.spec, default_interval).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(error = %e, "failed to resolve checks");
            set_condition(
                &mut conditions,
                Condition {
                    condition_type: CONDITION_PROFILES_RESOLVED.to_string(),
                    status: "False".to_string(),
                    last_transition_time: Some(now_str.clone()),
                    reason: Some("ResolutionFailed".to_string()),
                    message: Some(format!("failed to resolve profiles: {e}")),
                },
            );
            // Prior check status stays untouched; only the condition changes.
            let patch = json!({"status": {"conditions": conditions}});
            if let Err(patch_err) = api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                error!(error = %patch_err, "failed to update status after resolution failure");
            }
            return Ok(Action::requeue(default_interval));
        }
    };

    if !cr.spec.profiles.is_empty() {
        set_condition(
            &mut conditions,
            Condition {
                condition_type: CONDITION_PROFILES_RESOLVED.to_string(),
                status: "True".to_string(),
                last_transition_time: Some(now_str.clone()),
                reason: Some("AllProfilesResolved".to_string()),
                message: Some(format!(
                    "resolved {} checks from {} profiles",
                    resolved.len(),
                    cr.spec.profiles.len()
                )),
            },
        );
    }

    // Partition into due vs carried based on per-check intervals.
    let prior = flatten_prior(cr.status.as_ref());
    let schedule = scheduler::plan(resolved, &prior, now);

    info!(
        due = schedule.due.len(),
        carried = schedule.carried.len(),
        next_requeue = ?schedule.next_requeue,
        "check scheduling"
    );

    // Run due checks in parallel; every task materialises its own failures.
    let mut tasks = Vec::with_capacity(schedule.due.len());
    for rc in schedule.due {
        let task_ctx = ctx.clone();
        let fallback = (rc.identifier.clone(), rc.source.clone(), rc.severity, rc.category.clone());
        tasks.push((fallback, tokio::spawn(run_check(rc, task_ctx))));
    }

    let mut executed = Vec::with_capacity(tasks.len());
    for ((identifier, source, severity, category), task) in tasks {
        match task.await {
            Ok(result) => executed.push(result),
            Err(join_err) => {
                // A panicked task still becomes a failing row.
                error!(check = %identifier, error = %join_err, "check task failed");
                executed.push(ExecutedCheck {
                    identifier,
                    source,
                    severity: severity.unwrap_or(Severity::Critical),
                    category: category.unwrap_or_else(|| "general".to_string()),
                    ready: false,
                    message: format!("check task failed: {join_err}"),
                    duration: Duration::ZERO,
                });
            }
        }
    }

    // Merge fresh results with carried rows.
    let mut rows = Vec::with_capacity(executed.len() + schedule.carried.len());
    for result in executed {
        ctx.metrics.record_check(
            &result.identifier,
            &name,
            result.severity.as_str(),
            &result.category,
            result.ready,
            result.duration,
        );
        rows.push(CheckRow {
            status: CheckStatus {
                name: result.identifier,
                source: Some(result.source),
                status: if result.ready {
                    CheckVerdict::Passing
                } else {
                    CheckVerdict::Failing
                },
                severity: result.severity,
                message: Some(result.message),
                last_checked: Some(now_str.clone()),
            },
            category: result.category,
        });
    }
    for carried in schedule.carried {
        rows.push(CheckRow {
            status: carried.status,
            category: carried.category,
        });
    }

    let rollup = rollup::aggregate(rows);
    let all_critical_passing = rollup.all_critical_passing();

    // Publish: metrics first, then the snapshot store, then the status patch.
    ctx.metrics
        .set_cluster_state(&name, all_critical_passing, rollup.state);
    for category in &rollup.categories {
        ctx.metrics.set_category_ready(
            &category.category,
            &name,
            category.state != crate::crds::HealthState::Unhealthy,
        );
    }

    ctx.readiness.update(&name, build_snapshot(&rollup)).await;

    set_condition(
        &mut conditions,
        ready_condition(&rollup, all_critical_passing, &now_str),
    );
    set_condition(&mut conditions, degraded_condition(&rollup, &now_str));

    let status = ClusterReadinessStatus {
        state: rollup.state,
        summary: Some(rollup.summary.clone()),
        categories: rollup.categories,
        last_checked: Some(now_str),
        conditions,
    };
    let patch = json!({"status": serde_json::to_value(&status).map_err(Error::Serialization)?});
    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    info!(
        state = %rollup.state,
        total = rollup.summary.total,
        critical_passing = rollup.summary.critical_passing,
        critical_total = rollup.summary.critical_total,
        warning_failing = rollup.summary.warning_failing,
        "reconciliation complete"
    );

    Ok(match schedule.next_requeue {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    })
}

/// Outcome of one executed check task.
struct ExecutedCheck {
    identifier: String,
    source: String,
    severity: Severity,
    category: String,
    ready: bool,
    message: String,
    duration: Duration,
}

/// Runs a single due check. Severity and category fall back from the
/// resolved override to the check's own defaults.
async fn run_check(rc: ResolvedCheck, ctx: Arc<Context>) -> ExecutedCheck {
    match &rc.target {
        CheckTarget::Builtin(builtin_name) => run_builtin(&rc, builtin_name, &ctx).await,
        CheckTarget::Dynamic(gate_check_name) => run_dynamic(&rc, gate_check_name, &ctx).await,
    }
}

async fn run_builtin(rc: &ResolvedCheck, builtin_name: &str, ctx: &Context) -> ExecutedCheck {
    let Some(checker) = ctx.registry.get(builtin_name) else {
        return ExecutedCheck {
            identifier: rc.identifier.clone(),
            source: rc.source.clone(),
            severity: rc.severity.unwrap_or(Severity::Critical),
            category: rc.category.clone().unwrap_or_else(|| "general".to_string()),
            ready: false,
            message: format!("unknown check: {builtin_name}"),
            duration: Duration::ZERO,
        };
    };

    let severity = rc.severity.unwrap_or_else(|| checker.default_severity());
    let category = rc
        .category
        .clone()
        .unwrap_or_else(|| checker.default_category().to_string());

    let start = Instant::now();
    let outcome = checker.run(rc.config.as_ref()).await;
    let duration = start.elapsed();

    let (ready, message) = match outcome {
        Ok(outcome) => (outcome.ready, outcome.message),
        Err(e) => (false, format!("check error: {e}")),
    };

    ExecutedCheck {
        identifier: rc.identifier.clone(),
        source: rc.source.clone(),
        severity,
        category,
        ready,
        message,
        duration,
    }
}

async fn run_dynamic(rc: &ResolvedCheck, gate_check_name: &str, ctx: &Context) -> ExecutedCheck {
    let gatechecks: Api<GateCheck> = Api::all(ctx.client.clone());

    let gate_check = match gatechecks.get_opt(gate_check_name).await {
        Ok(Some(gate_check)) => gate_check,
        Ok(None) => {
            return ExecutedCheck {
                identifier: rc.identifier.clone(),
                source: rc.source.clone(),
                severity: rc.severity.unwrap_or(Severity::Critical),
                category: rc.category.clone().unwrap_or_else(|| "custom".to_string()),
                ready: false,
                message: format!("GateCheck CR not found: {gate_check_name}"),
                duration: Duration::ZERO,
            };
        }
        Err(e) => {
            return ExecutedCheck {
                identifier: rc.identifier.clone(),
                source: rc.source.clone(),
                severity: rc.severity.unwrap_or(Severity::Critical),
                category: rc.category.clone().unwrap_or_else(|| "custom".to_string()),
                ready: false,
                message: format!("failed to fetch GateCheck {gate_check_name}: {e}"),
                duration: Duration::ZERO,
            };
        }
    };

    let severity = rc
        .severity
        .or(gate_check.spec.severity)
        .unwrap_or(Severity::Critical);
    let category = rc
        .category
        .clone()
        .or_else(|| gate_check.spec.category.clone())
        .unwrap_or_else(|| "custom".to_string());

    let start = Instant::now();
    let outcome = ctx.executor.execute(gate_check_name, &gate_check.spec).await;
    let duration = start.elapsed();

    let (ready, message) = match outcome {
        Ok(outcome) => (outcome.ready, outcome.message),
        Err(e) => (false, format!("check error: {e}")),
    };

    ExecutedCheck {
        identifier: rc.identifier.clone(),
        source: rc.source.clone(),
        severity,
        category,
        ready,
        message,
        duration,
    }
}

/// Flattens prior `status.categories[].checks[]` into a per-identifier map
/// for carry-over lookup.
fn flatten_prior(status: Option<&ClusterReadinessStatus>) -> HashMap<String, PriorCheck> {
    let mut prior = HashMap::new();
    let Some(status) = status else {
        return prior;
    };
    for category in &status.categories {
        for check in &category.checks {
            prior.insert(
                check.name.clone(),
                PriorCheck {
                    status: check.clone(),
                    category: category.category.clone(),
                },
            );
        }
    }
    prior
}

fn ready_condition(rollup: &rollup::Rollup, all_critical_passing: bool, now: &str) -> Condition {
    if all_critical_passing {
        Condition {
            condition_type: CONDITION_READY.to_string(),
            status: "True".to_string(),
            last_transition_time: Some(now.to_string()),
            reason: Some("AllCriticalChecksPassing".to_string()),
            message: Some(format!(
                "All {} critical checks are passing",
                rollup.summary.critical_total
            )),
        }
    } else {
        let failing = rollup.summary.critical_total - rollup.summary.critical_passing;
        Condition {
            condition_type: CONDITION_READY.to_string(),
            status: "False".to_string(),
            last_transition_time: Some(now.to_string()),
            reason: Some("CriticalChecksFailing".to_string()),
            message: Some(format!(
                "{failing} of {} critical checks failing",
                rollup.summary.critical_total
            )),
        }
    }
}

fn degraded_condition(rollup: &rollup::Rollup, now: &str) -> Condition {
    if rollup.summary.warning_failing > 0 {
        Condition {
            condition_type: CONDITION_DEGRADED.to_string(),
            status: "True".to_string(),
            last_transition_time: Some(now.to_string()),
            reason: Some("WarningChecksFailing".to_string()),
            message: Some(format!(
                "{} warning checks failing",
                rollup.summary.warning_failing
            )),
        }
    } else {
        Condition {
            condition_type: CONDITION_DEGRADED.to_string(),
            status: "False".to_string(),
            last_transition_time: Some(now.to_string()),
            reason: Some("NoWarnings".to_string()),
            message: Some("All warning checks passing".to_string()),
        }
    }
}

fn build_snapshot(rollup: &rollup::Rollup) -> ClusterSnapshot {
    let mut checks = std::collections::BTreeMap::new();
    for category in &rollup.categories {
        for check in &category.checks {
            checks.insert(
                check.name.clone(),
                CheckSnapshot {
                    status: check.status,
                    message: check.message.clone(),
                    severity: check.severity,
                    category: category.category.clone(),
                },
            );
        }
    }

    ClusterSnapshot {
        state: rollup.state,
        summary: Some(rollup.summary.clone()),
        category_summaries: rollup
            .categories
            .iter()
            .map(|category| CategorySummaryView {
                category: category.category.clone(),
                state: category.state,
                total: category.total,
                passing: category.passing,
                failing: category.failing,
            })
            .collect(),
        checks,
    }
}
