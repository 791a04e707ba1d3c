//! `GateProfile` validation reconciler
//!
//! Surfaces a `Valid` condition: every check reference must carry exactly
//! one of `name` or `gateCheckRef`.

use std::sync::Arc;

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use serde_json::json;
use tracing::{debug, instrument};

use super::types::{Context, Result};
use crate::crds::{set_condition, Condition, GateProfile, ProfileCheckRef};

#[instrument(skip(profile, ctx), fields(gate_profile = %profile.name_any()))]
pub async fn reconcile_gate_profile(
    profile: Arc<GateProfile>,
    ctx: Arc<Context>,
) -> Result<Action> {
    let name = profile.name_any();
    let api: Api<GateProfile> = Api::all(ctx.client.clone());

    let Some(profile) = api.get_opt(&name).await? else {
        return Ok(Action::await_change());
    };

    debug!("validating GateProfile");

    let condition = match profile
        .spec
        .checks
        .iter()
        .enumerate()
        .find_map(|(index, check)| validate_ref(index, check))
    {
        Some((reason, message)) => Condition {
            condition_type: "Valid".to_string(),
            status: "False".to_string(),
            last_transition_time: Some(Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message: Some(message),
        },
        None => Condition {
            condition_type: "Valid".to_string(),
            status: "True".to_string(),
            last_transition_time: Some(Utc::now().to_rfc3339()),
            reason: Some("SpecValid".to_string()),
            message: Some("GateProfile spec is valid".to_string()),
        },
    };

    let mut conditions = profile
        .status
        .as_ref()
        .map(|status| status.conditions.clone())
        .unwrap_or_default();
    set_condition(&mut conditions, condition);

    let patch = json!({"status": {"conditions": conditions}});
    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    Ok(Action::await_change())
}

fn validate_ref(index: usize, check: &ProfileCheckRef) -> Option<(&'static str, String)> {
    match (check.name.as_deref(), check.gate_check_ref.as_deref()) {
        (None, None) => Some((
            "InvalidCheckRef",
            format!("check at index {index} must specify either name or gateCheckRef"),
        )),
        (Some(_), Some(_)) => Some((
            "AmbiguousCheckRef",
            format!("check at index {index} must specify only one of name or gateCheckRef"),
        )),
        _ => None,
    }
}
