//! Gate controllers
//!
//! Wires up the `ClusterReadiness` reconciliation engine plus the two
//! validation reconcilers. Any `GateProfile` or `GateCheck` change re-enqueues
//! every known `ClusterReadiness`, since profiles and dynamic checks feed the
//! resolved check set.

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

pub mod check;
pub mod profile;
pub mod readiness;
pub mod resolver;
pub mod rollup;
pub mod scheduler;
pub mod types;

pub use check::reconcile_gate_check;
pub use profile::reconcile_gate_profile;
pub use readiness::reconcile_cluster_readiness;
pub use types::{Context, Error, Result};

use crate::crds::{ClusterReadiness, GateCheck, GateProfile};

const ERROR_REQUEUE: Duration = Duration::from_secs(10);

/// Main entry point: runs all gate controllers until shutdown.
#[instrument(skip(ctx))]
pub async fn run_gate_controllers(ctx: Arc<Context>) -> Result<()> {
    info!(
        checks = ?ctx.registry.list(),
        "starting gate controllers"
    );

    let readiness_handle = tokio::spawn({
        let ctx = ctx.clone();
        async move { run_readiness_controller(ctx).await }
    });
    let profile_handle = tokio::spawn({
        let ctx = ctx.clone();
        async move { run_profile_controller(ctx).await }
    });
    let check_handle = tokio::spawn({
        let ctx = ctx.clone();
        async move { run_check_controller(ctx).await }
    });

    match tokio::try_join!(readiness_handle, profile_handle, check_handle) {
        Ok(_) => {}
        Err(e) => {
            error!("controller task join error: {e:?}");
        }
    }

    info!("gate controllers shutting down");
    Ok(())
}

/// Runs the ClusterReadiness controller. Watches GateProfile and GateCheck
/// too: any change to either re-enqueues every ClusterReadiness held in the
/// controller's reflector store.
async fn run_readiness_controller(ctx: Arc<Context>) {
    let readiness_api: Api<ClusterReadiness> = Api::all(ctx.client.clone());
    let profile_api: Api<GateProfile> = Api::all(ctx.client.clone());
    let gate_check_api: Api<GateCheck> = Api::all(ctx.client.clone());
    let watcher_config = WatcherConfig::default().any_semantic();

    let controller = Controller::new(readiness_api, watcher_config.clone());
    let store = controller.store();

    controller
        .watches(profile_api, watcher_config.clone(), {
            let store = store.clone();
            move |profile: GateProfile| {
                debug!(profile = %profile.name_any(), "GateProfile changed, enqueueing all ClusterReadiness");
                store
                    .state()
                    .into_iter()
                    .map(|cr| ObjectRef::from_obj(cr.as_ref()))
                    .collect::<Vec<_>>()
            }
        })
        .watches(gate_check_api, watcher_config, {
            let store = store.clone();
            move |gate_check: GateCheck| {
                debug!(gate_check = %gate_check.name_any(), "GateCheck changed, enqueueing all ClusterReadiness");
                store
                    .state()
                    .into_iter()
                    .map(|cr| ObjectRef::from_obj(cr.as_ref()))
                    .collect::<Vec<_>>()
            }
        })
        .run(reconcile_cluster_readiness, error_policy_readiness, ctx)
        .for_each(|result| async move {
            match result {
                Ok(obj) => debug!(resource = ?obj, "ClusterReadiness reconciliation successful"),
                Err(e) => error!(error = ?e, "ClusterReadiness reconciliation error"),
            }
        })
        .await;

    info!("ClusterReadiness controller shutting down");
}

async fn run_profile_controller(ctx: Arc<Context>) {
    let profile_api: Api<GateProfile> = Api::all(ctx.client.clone());
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(profile_api, watcher_config)
        .run(reconcile_gate_profile, error_policy_profile, ctx)
        .for_each(|result| async move {
            match result {
                Ok(obj) => debug!(resource = ?obj, "GateProfile reconciliation successful"),
                Err(e) => error!(error = ?e, "GateProfile reconciliation error"),
            }
        })
        .await;

    info!("GateProfile controller shutting down");
}

async fn run_check_controller(ctx: Arc<Context>) {
    let gate_check_api: Api<GateCheck> = Api::all(ctx.client.clone());
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(gate_check_api, watcher_config)
        .run(reconcile_gate_check, error_policy_check, ctx)
        .for_each(|result| async move {
            match result {
                Ok(obj) => debug!(resource = ?obj, "GateCheck reconciliation successful"),
                Err(e) => error!(error = ?e, "GateCheck reconciliation error"),
            }
        })
        .await;

    info!("GateCheck controller shutting down");
}

/// Only the status patch surfaces reconcile errors; retry with a short delay.
fn error_policy_readiness(cr: Arc<ClusterReadiness>, err: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        error = ?err,
        cluster_readiness = %cr.name_any(),
        "ClusterReadiness reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}

fn error_policy_profile(profile: Arc<GateProfile>, err: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        error = ?err,
        gate_profile = %profile.name_any(),
        "GateProfile reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}

fn error_policy_check(gate_check: Arc<GateCheck>, err: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        error = ?err,
        gate_check = %gate_check.name_any(),
        "GateCheck reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}
