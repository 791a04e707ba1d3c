//! `GateCheck` validation reconciler
//!
//! Surfaces a `Valid` condition: exactly one check type must be populated.

use std::sync::Arc;

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use serde_json::json;
use tracing::{debug, instrument};

use super::types::{Context, Result};
use crate::crds::{set_condition, Condition, GateCheck};

#[instrument(skip(gate_check, ctx), fields(gate_check = %gate_check.name_any()))]
pub async fn reconcile_gate_check(gate_check: Arc<GateCheck>, ctx: Arc<Context>) -> Result<Action> {
    let name = gate_check.name_any();
    let api: Api<GateCheck> = Api::all(ctx.client.clone());

    let Some(gate_check) = api.get_opt(&name).await? else {
        return Ok(Action::await_change());
    };

    debug!("validating GateCheck");

    let variant_count = gate_check.spec.variant_count();
    let condition = match variant_count {
        1 => Condition {
            condition_type: "Valid".to_string(),
            status: "True".to_string(),
            last_transition_time: Some(Utc::now().to_rfc3339()),
            reason: Some("SpecValid".to_string()),
            message: Some("GateCheck spec is valid".to_string()),
        },
        0 => Condition {
            condition_type: "Valid".to_string(),
            status: "False".to_string(),
            last_transition_time: Some(Utc::now().to_rfc3339()),
            reason: Some("NoCheckType".to_string()),
            message: Some("Exactly one check type must be specified".to_string()),
        },
        _ => Condition {
            condition_type: "Valid".to_string(),
            status: "False".to_string(),
            last_transition_time: Some(Utc::now().to_rfc3339()),
            reason: Some("MultipleCheckTypes".to_string()),
            message: Some(format!(
                "Exactly one check type must be specified, found {variant_count}"
            )),
        },
    };

    let mut conditions = gate_check
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
