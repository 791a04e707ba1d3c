//! Resource-condition dynamic check: asserts `status.conditions` entries on
//! arbitrary Kubernetes resources addressed by group/version/kind.

use kube::api::{Api, DynamicObject, ListParams};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::Client;

use crate::checks::CheckOutcome;
use crate::crds::{ResourceAssertionSpec, ResourceConditionCheck};

pub(super) async fn execute(
    client: &Client,
    spec: &ResourceAssertionSpec,
) -> anyhow::Result<CheckOutcome> {
    let gvk = match parse_gvk(&spec.api_version, &spec.kind) {
        Ok(gvk) => gvk,
        Err(message) => return Ok(CheckOutcome::failing(message)),
    };
    let api_resource = ApiResource::from_gvk(&gvk);

    let api: Api<DynamicObject> = match &spec.namespace {
        Some(namespace) if !namespace.is_empty() => {
            Api::namespaced_with(client.clone(), namespace, &api_resource)
        }
        _ => Api::all_with(client.clone(), &api_resource),
    };

    let resources: Vec<DynamicObject> = if let Some(name) = &spec.name {
        match api.get_opt(name).await {
            Ok(Some(obj)) => vec![obj],
            Ok(None) => {
                return Ok(CheckOutcome::failing(format!(
                    "resource {}/{name} not found",
                    spec.kind
                ))
                .with_detail("apiVersion", &spec.api_version)
                .with_detail("kind", &spec.kind)
                .with_detail("name", name));
            }
            Err(e) => {
                return Ok(CheckOutcome::failing(format!(
                    "failed to fetch {}/{name}: {e}",
                    spec.kind
                )));
            }
        }
    } else if !spec.match_labels.is_empty() {
        let selector = spec
            .match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        match api.list(&ListParams::default().labels(&selector)).await {
            Ok(list) => list.items,
            Err(e) => {
                return Ok(CheckOutcome::failing(format!(
                    "failed to list {} resources: {e}",
                    spec.kind
                )));
            }
        }
    } else {
        return Ok(CheckOutcome::failing(
            "either name or matchLabels must be specified",
        ));
    };

    if resources.is_empty() {
        return Ok(
            CheckOutcome::failing(format!("no {} resources found", spec.kind))
                .with_detail("apiVersion", &spec.api_version)
                .with_detail("kind", &spec.kind),
        );
    }

    let mut failures = Vec::new();
    for obj in &resources {
        let obj_name = obj.metadata.name.clone().unwrap_or_default();
        failures.extend(assert_conditions(&obj_name, &obj.data, &spec.conditions));
    }

    let details_count = resources.len();
    let outcome = if failures.is_empty() {
        CheckOutcome::passing(format!(
            "all {details_count} {} resources have expected conditions",
            spec.kind
        ))
    } else {
        CheckOutcome::failing(format!("condition check failed: {}", failures.join("; ")))
    };

    Ok(outcome
        .with_detail("apiVersion", &spec.api_version)
        .with_detail("kind", &spec.kind)
        .with_detail("resourceCount", details_count.to_string()))
}

fn parse_gvk(api_version: &str, kind: &str) -> Result<GroupVersionKind, String> {
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    if version.is_empty() {
        return Err(format!("invalid apiVersion {api_version:?}"));
    }
    Ok(GroupVersionKind::gvk(group, version, kind))
}

/// Returns one failure message per unmatched expected condition.
fn assert_conditions(
    name: &str,
    data: &serde_json::Value,
    expected: &[ResourceConditionCheck],
) -> Vec<String> {
    let Some(conditions) = data
        .get("status")
        .and_then(|status| status.get("conditions"))
        .and_then(|conditions| conditions.as_array())
    else {
        return vec![format!("{name}: no conditions found")];
    };

    expected
        .iter()
        .filter_map(|want| {
            let matched = conditions.iter().any(|cond| {
                cond.get("type").and_then(|t| t.as_str()) == Some(want.condition_type.as_str())
                    && cond.get("status").and_then(|s| s.as_str()) == Some(want.status.as_str())
            });
            if matched {
                None
            } else {
                Some(format!(
                    "{name}: condition {} != {}",
                    want.condition_type, want.status
                ))
            }
        })
        .collect()
}
