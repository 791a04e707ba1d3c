//! Pod-selector dynamic check: counts running+ready pods against a minimum.

use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};

use crate::checks::CheckOutcome;
use crate::crds::PodSelectorSpec;

pub(super) async fn execute(
    client: &Client,
    spec: &PodSelectorSpec,
) -> anyhow::Result<CheckOutcome> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), &spec.namespace);

    let mut params = ListParams::default();
    if !spec.match_labels.is_empty() {
        let selector = spec
            .match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        params = params.labels(&selector);
    }

    let pod_list = match pods.list(&params).await {
        Ok(list) => list,
        Err(e) => {
            return Ok(CheckOutcome::failing(format!("failed to list pods: {e}")));
        }
    };

    let total = pod_list.items.len();
    let ready = pod_list.items.iter().filter(|pod| is_pod_ready(pod)).count() as i32;

    let outcome = if ready >= spec.min_ready {
        CheckOutcome::passing(format!(
            "{ready}/{total} pods ready (minimum {})",
            spec.min_ready
        ))
    } else {
        CheckOutcome::failing(format!(
            "only {ready}/{total} pods ready, need at least {}",
            spec.min_ready
        ))
    };

    Ok(outcome
        .with_detail("namespace", &spec.namespace)
        .with_detail("totalPods", total.to_string())
        .with_detail("readyPods", ready.to_string())
        .with_detail("minReady", spec.min_ready.to_string()))
}

fn is_pod_ready(pod: &Pod) -> bool {
    let Some(status) = &pod.status else {
        return false;
    };
    if status.phase.as_deref() != Some("Running") {
        return false;
    }
    status
        .conditions
        .as_ref()
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}
