//! Script dynamic check: runs a container image as a Kubernetes Job, waits
//! for a terminal condition, reads the pod logs, and interprets the result.
//!
//! The launched Job is always deleted, whether the check passed, failed,
//! timed out, or the reconcile was cancelled mid-flight.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodTemplateSpec};
use k8s_openapi::api::core::v1::EnvVar as K8sEnvVar;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, ListParams, LogParams, PostParams};
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::checks::CheckOutcome;
use crate::crds::ScriptJobSpec;

const DEFAULT_SCRIPT_TIMEOUT_SECS: i64 = 30;
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
const LABEL_MANAGED_BY_VALUE: &str = "clustergate";
const LABEL_CHECK_NAME: &str = "clustergate.io/check";
const LOG_TRUNCATE_LEN: usize = 500;

/// Deletes the Job when dropped, covering early returns and task
/// cancellation. The delete runs on a spawned task because `Drop` cannot
/// await.
struct JobCleanup {
    jobs: Api<Job>,
    name: String,
}

impl Drop for JobCleanup {
    fn drop(&mut self) {
        let jobs = self.jobs.clone();
        let name = std::mem::take(&mut self.name);
        tokio::spawn(async move {
            if let Err(e) = jobs.delete(&name, &DeleteParams::background()).await {
                warn!(job = %name, error = %e, "failed to delete script check job");
            }
        });
    }
}

pub(super) async fn execute(
    client: &Client,
    namespace: &str,
    check_name: &str,
    spec: &ScriptJobSpec,
) -> anyhow::Result<CheckOutcome> {
    let timeout_secs = spec
        .timeout_seconds
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_SCRIPT_TIMEOUT_SECS);

    let jobs: Api<Job> = Api::namespaced(client.clone(), namespace);
    let job = build_job(check_name, spec, timeout_secs);

    let created = jobs
        .create(&PostParams::default(), &job)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create script check job: {e}"))?;
    let job_name = created.name_any();

    let _cleanup = JobCleanup {
        jobs: jobs.clone(),
        name: job_name.clone(),
    };

    let terminal = poll_job_completion(
        &jobs,
        &job_name,
        Duration::from_secs(timeout_secs.unsigned_abs()),
    )
    .await?;

    let logs = match job_pod_logs(client, namespace, &job_name).await {
        Ok(logs) => logs,
        Err(e) => format!("(failed to read logs: {e})"),
    };

    match terminal {
        JobTerminalState::Completed => Ok(CheckOutcome::passing(format!(
            "script completed successfully: {}",
            truncate_log(&logs)
        ))),
        JobTerminalState::Failed(reason) => Ok(CheckOutcome::failing(format!(
            "script failed (reason: {reason}): {}",
            truncate_log(&logs)
        ))),
        JobTerminalState::TimedOut => Ok(CheckOutcome::failing(format!(
            "script timed out after {timeout_secs}s: {}",
            truncate_log(&logs)
        ))),
    }
}

fn build_job(check_name: &str, spec: &ScriptJobSpec, timeout_secs: i64) -> Job {
    let labels: BTreeMap<String, String> = [
        (LABEL_MANAGED_BY.to_string(), LABEL_MANAGED_BY_VALUE.to_string()),
        (LABEL_CHECK_NAME.to_string(), check_name.to_string()),
    ]
    .into();

    let env: Vec<K8sEnvVar> = spec
        .env
        .iter()
        .map(|var| K8sEnvVar {
            name: var.name.clone(),
            value: Some(var.value.clone()),
            ..K8sEnvVar::default()
        })
        .collect();

    Job {
        metadata: ObjectMeta {
            generate_name: Some(format!("clustergate-{check_name}-")),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            active_deadline_seconds: Some(timeout_secs),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    service_account_name: spec.service_account_name.clone(),
                    containers: vec![Container {
                        name: "script".to_string(),
                        image: Some(spec.image.clone()),
                        command: if spec.command.is_empty() {
                            None
                        } else {
                            Some(spec.command.clone())
                        },
                        args: if spec.args.is_empty() {
                            None
                        } else {
                            Some(spec.args.clone())
                        },
                        env: if env.is_empty() { None } else { Some(env) },
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..JobSpec::default()
        }),
        ..Job::default()
    }
}

enum JobTerminalState {
    Completed,
    Failed(String),
    TimedOut,
}

async fn poll_job_completion(
    jobs: &Api<Job>,
    job_name: &str,
    timeout: Duration,
) -> anyhow::Result<JobTerminalState> {
    let deadline = Instant::now() + timeout;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    // First tick fires immediately; skip it so the job has a chance to start.
    ticker.tick().await;

    loop {
        if Instant::now() >= deadline {
            return Ok(JobTerminalState::TimedOut);
        }
        ticker.tick().await;

        let job = jobs
            .get(job_name)
            .await
            .map_err(|e| anyhow::anyhow!("failed to get job {job_name}: {e}"))?;

        if let Some(state) = job_terminal_state(&job) {
            return Ok(state);
        }
    }
}

fn job_terminal_state(job: &Job) -> Option<JobTerminalState> {
    let status = job.status.as_ref()?;

    if let Some(conditions) = &status.conditions {
        for condition in conditions {
            if condition.type_ == "Complete" && condition.status == "True" {
                return Some(JobTerminalState::Completed);
            }
            if condition.type_ == "Failed" && condition.status == "True" {
                return Some(JobTerminalState::Failed(
                    condition.reason.clone().unwrap_or_default(),
                ));
            }
        }
    }

    if status.succeeded.unwrap_or(0) > 0 {
        return Some(JobTerminalState::Completed);
    }
    if status.failed.unwrap_or(0) > 0 {
        return Some(JobTerminalState::Failed("BackoffLimitExceeded".to_string()));
    }

    None
}

async fn job_pod_logs(client: &Client, namespace: &str, job_name: &str) -> anyhow::Result<String> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pod_list = pods
        .list(&ListParams::default().labels(&format!("job-name={job_name}")))
        .await
        .map_err(|e| anyhow::anyhow!("failed to list pods for job {job_name}: {e}"))?;

    let Some(pod) = pod_list.items.first() else {
        anyhow::bail!("no pods found for job {job_name}");
    };

    pods.logs(&pod.name_any(), &LogParams::default())
        .await
        .map_err(|e| anyhow::anyhow!("failed to get logs for pod {}: {e}", pod.name_any()))
}

fn truncate_log(log: &str) -> String {
    let trimmed = log.trim();
    if trimmed.len() <= LOG_TRUNCATE_LEN {
        return trimmed.to_string();
    }
    let mut cut = LOG_TRUNCATE_LEN;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...(truncated)", &trimmed[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};

    #[test]
    fn build_job_carries_labels_and_deadline() {
        let spec = ScriptJobSpec {
            image: "busybox:1.36".into(),
            command: vec!["sh".into(), "-c".into()],
            args: vec!["exit 0".into()],
            timeout_seconds: Some(45),
            service_account_name: Some("checker".into()),
            env: vec![crate::crds::EnvVar {
                name: "TARGET".into(),
                value: "cluster".into(),
            }],
        };

        let job = build_job("smoke", &spec, 45);
        let metadata = &job.metadata;
        assert_eq!(metadata.generate_name.as_deref(), Some("clustergate-smoke-"));
        let labels = metadata.labels.as_ref().unwrap();
        assert_eq!(
            labels.get(LABEL_MANAGED_BY).map(String::as_str),
            Some("clustergate")
        );
        assert_eq!(labels.get(LABEL_CHECK_NAME).map(String::as_str), Some("smoke"));

        let job_spec = job.spec.as_ref().unwrap();
        assert_eq!(job_spec.backoff_limit, Some(0));
        assert_eq!(job_spec.active_deadline_seconds, Some(45));

        let pod_spec = job_spec.template.spec.as_ref().unwrap();
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod_spec.service_account_name.as_deref(), Some("checker"));
        assert_eq!(pod_spec.containers[0].env.as_ref().unwrap()[0].name, "TARGET");
    }

    fn job_with_condition(type_: &str, status: &str, reason: Option<&str>) -> Job {
        Job {
            status: Some(JobStatus {
                conditions: Some(vec![JobCondition {
                    type_: type_.to_string(),
                    status: status.to_string(),
                    reason: reason.map(String::from),
                    ..JobCondition::default()
                }]),
                ..JobStatus::default()
            }),
            ..Job::default()
        }
    }

    #[test]
    fn terminal_state_from_conditions() {
        assert!(matches!(
            job_terminal_state(&job_with_condition("Complete", "True", None)),
            Some(JobTerminalState::Completed)
        ));
        match job_terminal_state(&job_with_condition("Failed", "True", Some("DeadlineExceeded"))) {
            Some(JobTerminalState::Failed(reason)) => assert_eq!(reason, "DeadlineExceeded"),
            _ => panic!("expected failed state"),
        }
        assert!(job_terminal_state(&job_with_condition("Complete", "False", None)).is_none());
        assert!(job_terminal_state(&Job::default()).is_none());
    }

    #[test]
    fn terminal_state_from_counters() {
        let succeeded = Job {
            status: Some(JobStatus {
                succeeded: Some(1),
                ..JobStatus::default()
            }),
            ..Job::default()
        };
        assert!(matches!(
            job_terminal_state(&succeeded),
            Some(JobTerminalState::Completed)
        ));
    }

    #[test]
    fn truncate_log_limits_length() {
        let short = "exit 0";
        assert_eq!(truncate_log(short), "exit 0");

        let long = "x".repeat(600);
        let truncated = truncate_log(&long);
        assert!(truncated.ends_with("...(truncated)"));
        assert!(truncated.len() < long.len());
    }
}
