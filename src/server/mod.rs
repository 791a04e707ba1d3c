//! Readiness snapshot store and HTTP surface
//!
//! The reconciler mirrors its aggregated result into [`ReadinessState`] at
//! the end of every cycle; the `/readyz` endpoint serves that mirror with
//! optional category/severity filters, recomputing per-entity state when a
//! filter is applied.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::crds::{CheckVerdict, HealthState, ReadinessSummary, Severity};
use crate::metrics::GateMetrics;

/// Aggregated state for one `ClusterReadiness` entity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub state: HealthState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReadinessSummary>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub category_summaries: Vec<CategorySummaryView>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub checks: BTreeMap<String, CheckSnapshot>,
}

/// Per-category counts for the HTTP response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummaryView {
    pub category: String,
    pub state: HealthState,
    pub total: u32,
    pub passing: u32,
    pub failing: u32,
}

/// Latest result of a single check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSnapshot {
    pub status: CheckVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub severity: Severity,
    pub category: String,
}

/// Thread-safe in-memory mirror of the aggregated state, keyed by
/// `ClusterReadiness` name. Each entity's record is replaced wholesale on
/// update, so readers observe atomic version changes.
#[derive(Default)]
pub struct ReadinessState {
    clusters: RwLock<HashMap<String, Arc<ClusterSnapshot>>>,
}

impl ReadinessState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the record for `name`.
    pub async fn update(&self, name: &str, snapshot: ClusterSnapshot) {
        self.clusters
            .write()
            .await
            .insert(name.to_string(), Arc::new(snapshot));
    }

    /// Drops the record for `name` (entity deleted).
    pub async fn remove(&self, name: &str) {
        self.clusters.write().await.remove(name);
    }

    /// Shallow copy of the per-entity map.
    pub async fn snapshot(&self) -> HashMap<String, Arc<ClusterSnapshot>> {
        self.clusters.read().await.clone()
    }

    /// Aggregate readiness rule: ready iff the store is non-empty and no
    /// entity is Unhealthy. An empty store is explicitly not ready, so
    /// "haven't reconciled yet" never looks like "everything is fine".
    pub async fn is_ready(&self) -> bool {
        let clusters = self.clusters.read().await;
        !clusters.is_empty()
            && clusters
                .values()
                .all(|snapshot| snapshot.state != HealthState::Unhealthy)
    }
}

/// Shared state for the HTTP router.
#[derive(Clone)]
pub struct AppState {
    pub readiness: Arc<ReadinessState>,
    pub metrics: Arc<GateMetrics>,
}

/// Builds the operator's HTTP router: readiness probe, Prometheus metrics,
/// and liveness.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/readyz", get(readyz_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadyzParams {
    pub category: Option<String>,
    pub severity: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    state: HealthState,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    clusters: HashMap<String, Arc<ClusterSnapshot>>,
}

async fn readyz_handler(
    State(state): State<AppState>,
    Query(params): Query<ReadyzParams>,
) -> impl IntoResponse {
    let mut snapshot = state.readiness.snapshot().await;

    if params.category.is_some() || params.severity.is_some() {
        snapshot = filter_snapshot(
            &snapshot,
            params.category.as_deref(),
            params.severity.as_deref(),
        );
    }

    let ready = !snapshot.is_empty()
        && snapshot
            .values()
            .all(|cs| cs.state != HealthState::Unhealthy);

    let overall = if !ready {
        HealthState::Unhealthy
    } else if snapshot
        .values()
        .any(|cs| cs.state == HealthState::Degraded)
    {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            state: overall,
            clusters: snapshot,
        }),
    )
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn healthz_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "clustergate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Applies category/severity filters and recomputes each entity's state from
/// the filtered subset. A filtered subset with zero checks is Unhealthy:
/// no evidence is not evidence of health.
fn filter_snapshot(
    snapshot: &HashMap<String, Arc<ClusterSnapshot>>,
    category: Option<&str>,
    severity: Option<&str>,
) -> HashMap<String, Arc<ClusterSnapshot>> {
    snapshot
        .iter()
        .map(|(name, cs)| {
            let checks: BTreeMap<String, CheckSnapshot> = cs
                .checks
                .iter()
                .filter(|(_, check)| {
                    category.is_none_or(|want| check.category == want)
                        && severity.is_none_or(|want| check.severity.as_str() == want)
                })
                .map(|(check_name, check)| (check_name.clone(), check.clone()))
                .collect();

            let mut state = HealthState::Healthy;
            for check in checks.values() {
                if check.status == CheckVerdict::Failing {
                    match check.severity {
                        Severity::Critical => {
                            state = HealthState::Unhealthy;
                            break;
                        }
                        Severity::Warning => state = HealthState::Degraded,
                        Severity::Info => {}
                    }
                }
            }
            if checks.is_empty() {
                state = HealthState::Unhealthy;
            }

            (
                name.clone(),
                Arc::new(ClusterSnapshot {
                    state,
                    summary: None,
                    category_summaries: Vec::new(),
                    checks,
                }),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn check(severity: Severity, category: &str, passing: bool) -> CheckSnapshot {
        CheckSnapshot {
            status: if passing {
                CheckVerdict::Passing
            } else {
                CheckVerdict::Failing
            },
            message: None,
            severity,
            category: category.to_string(),
        }
    }

    fn snapshot(state: HealthState, checks: Vec<(&str, CheckSnapshot)>) -> ClusterSnapshot {
        ClusterSnapshot {
            state,
            summary: None,
            category_summaries: Vec::new(),
            checks: checks
                .into_iter()
                .map(|(name, cs)| (name.to_string(), cs))
                .collect(),
        }
    }

    #[tokio::test]
    async fn empty_state_is_not_ready() {
        let state = ReadinessState::new();
        assert!(!state.is_ready().await);
    }

    #[tokio::test]
    async fn healthy_and_degraded_clusters_are_ready() {
        let state = ReadinessState::new();
        state
            .update("prod", snapshot(HealthState::Healthy, vec![]))
            .await;
        state
            .update("staging", snapshot(HealthState::Degraded, vec![]))
            .await;
        assert!(state.is_ready().await);
    }

    #[tokio::test]
    async fn any_unhealthy_cluster_is_not_ready() {
        let state = ReadinessState::new();
        state
            .update("prod", snapshot(HealthState::Healthy, vec![]))
            .await;
        state
            .update("staging", snapshot(HealthState::Unhealthy, vec![]))
            .await;
        assert!(!state.is_ready().await);

        state.remove("staging").await;
        assert!(state.is_ready().await);
    }

    #[tokio::test]
    async fn update_replaces_record_wholesale() {
        let state = ReadinessState::new();
        state
            .update(
                "prod",
                snapshot(
                    HealthState::Unhealthy,
                    vec![("dns", check(Severity::Critical, "networking", false))],
                ),
            )
            .await;
        state
            .update("prod", snapshot(HealthState::Healthy, vec![]))
            .await;

        let snap = state.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap["prod"].state, HealthState::Healthy);
        assert!(snap["prod"].checks.is_empty());
    }

    fn filter_one(
        cs: ClusterSnapshot,
        category: Option<&str>,
        severity: Option<&str>,
    ) -> Arc<ClusterSnapshot> {
        let mut map = HashMap::new();
        map.insert("prod".to_string(), Arc::new(cs));
        filter_snapshot(&map, category, severity)
            .remove("prod")
            .unwrap()
    }

    #[test]
    fn category_filter_recomputes_state() {
        // ingress critical failing in networking; vault critical passing in
        // security. The security slice alone is healthy.
        let cs = snapshot(
            HealthState::Unhealthy,
            vec![
                ("ingress", check(Severity::Critical, "networking", false)),
                ("vault", check(Severity::Critical, "security", true)),
            ],
        );
        let filtered = filter_one(cs, Some("security"), None);
        assert_eq!(filtered.state, HealthState::Healthy);
        assert_eq!(filtered.checks.len(), 1);
        assert!(filtered.checks.contains_key("vault"));
    }

    #[test]
    fn severity_filter_recomputes_state() {
        let cs = snapshot(
            HealthState::Unhealthy,
            vec![
                ("ingress", check(Severity::Critical, "networking", false)),
                ("latency", check(Severity::Warning, "networking", false)),
            ],
        );
        let filtered = filter_one(cs, None, Some("warning"));
        assert_eq!(filtered.state, HealthState::Degraded);
    }

    #[test]
    fn empty_filter_result_is_unhealthy() {
        let cs = snapshot(
            HealthState::Healthy,
            vec![("dns", check(Severity::Critical, "networking", true))],
        );
        let filtered = filter_one(cs, Some("storage"), None);
        assert_eq!(filtered.state, HealthState::Unhealthy);
        assert!(filtered.checks.is_empty());
    }

    async fn request(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn app(state: Arc<ReadinessState>) -> Router {
        build_router(AppState {
            readiness: state,
            metrics: Arc::new(GateMetrics::new().unwrap()),
        })
    }

    #[tokio::test]
    async fn readyz_returns_503_when_empty() {
        let readiness = Arc::new(ReadinessState::new());
        let (status, body) = request(app(readiness), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["state"], "Unhealthy");
    }

    #[tokio::test]
    async fn readyz_returns_200_for_degraded() {
        let readiness = Arc::new(ReadinessState::new());
        readiness
            .update(
                "prod",
                snapshot(
                    HealthState::Degraded,
                    vec![("latency", check(Severity::Warning, "networking", false))],
                ),
            )
            .await;

        let (status, body) = request(app(readiness), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "Degraded");
        assert_eq!(body["clusters"]["prod"]["state"], "Degraded");
    }

    #[tokio::test]
    async fn readyz_returns_503_for_unhealthy() {
        let readiness = Arc::new(ReadinessState::new());
        readiness
            .update(
                "prod",
                snapshot(
                    HealthState::Unhealthy,
                    vec![("etcd", check(Severity::Critical, "control-plane", false))],
                ),
            )
            .await;

        let (status, _) = request(app(readiness), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn readyz_filter_narrows_entity_state() {
        let readiness = Arc::new(ReadinessState::new());
        readiness
            .update(
                "prod",
                snapshot(
                    HealthState::Unhealthy,
                    vec![
                        ("ingress", check(Severity::Critical, "networking", false)),
                        ("vault", check(Severity::Critical, "security", true)),
                    ],
                ),
            )
            .await;

        let (status, body) =
            request(app(readiness.clone()), "/readyz?category=security").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["clusters"]["prod"]["state"], "Healthy");

        // Without the filter the same entity reports Unhealthy.
        let (status, _) = request(app(readiness), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text_format() {
        let readiness = Arc::new(ReadinessState::new());
        let metrics = Arc::new(GateMetrics::new().unwrap());
        metrics.set_cluster_state("prod", true, HealthState::Healthy);
        let router = build_router(AppState {
            readiness,
            metrics,
        });

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("clustergate_cluster_ready"));
    }
}
