//! Prometheus metric surface
//!
//! All collectors live behind a [`GateMetrics`] handle that owns its own
//! `Registry`, so tests and multiple engine instances stay isolated.

use prometheus::{Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::time::Duration;

use crate::crds::HealthState;

const NAMESPACE: &str = "clustergate";

pub struct GateMetrics {
    registry: Registry,

    /// Whether a readiness check is passing (1) or failing (0).
    check_ready: GaugeVec,

    /// Duration of readiness check execution in seconds.
    check_duration: HistogramVec,

    /// Whether the cluster is fully ready (all critical checks passing).
    cluster_ready: GaugeVec,

    /// Cluster health state; the active state label carries 1, the others 0.
    cluster_health_state: GaugeVec,

    /// Whether a category is free of failing critical checks.
    category_ready: GaugeVec,
}

impl GateMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let check_ready = GaugeVec::new(
            Opts::new(
                "check_ready",
                "Whether a readiness check is passing (1) or failing (0).",
            )
            .namespace(NAMESPACE),
            &["check", "cluster_readiness", "severity", "category"],
        )?;
        let check_duration = HistogramVec::new(
            HistogramOpts::new(
                "check_duration_seconds",
                "Duration of readiness check execution in seconds.",
            )
            .namespace(NAMESPACE),
            &["check", "severity", "category"],
        )?;
        let cluster_ready = GaugeVec::new(
            Opts::new(
                "cluster_ready",
                "Whether the cluster is fully ready (all critical checks passing).",
            )
            .namespace(NAMESPACE),
            &["cluster_readiness"],
        )?;
        let cluster_health_state = GaugeVec::new(
            Opts::new(
                "cluster_health_state",
                "Cluster health state: Healthy, Degraded, or Unhealthy. Active state=1.",
            )
            .namespace(NAMESPACE),
            &["cluster_readiness", "state"],
        )?;
        let category_ready = GaugeVec::new(
            Opts::new(
                "category_ready",
                "Whether all critical checks in a category are passing.",
            )
            .namespace(NAMESPACE),
            &["category", "cluster_readiness"],
        )?;

        registry.register(Box::new(check_ready.clone()))?;
        registry.register(Box::new(check_duration.clone()))?;
        registry.register(Box::new(cluster_ready.clone()))?;
        registry.register(Box::new(cluster_health_state.clone()))?;
        registry.register(Box::new(category_ready.clone()))?;

        Ok(Self {
            registry,
            check_ready,
            check_duration,
            cluster_ready,
            cluster_health_state,
            category_ready,
        })
    }

    /// Records one fresh check execution.
    pub fn record_check(
        &self,
        check: &str,
        cluster_readiness: &str,
        severity: &str,
        category: &str,
        ready: bool,
        duration: Duration,
    ) {
        self.check_ready
            .with_label_values(&[check, cluster_readiness, severity, category])
            .set(f64::from(u8::from(ready)));
        self.check_duration
            .with_label_values(&[check, severity, category])
            .observe(duration.as_secs_f64());
    }

    /// Publishes the cluster-wide gauges: readiness (critical-all-passing
    /// semantics) and the health-state gauge with the active state at 1.
    pub fn set_cluster_state(&self, cluster_readiness: &str, ready: bool, state: HealthState) {
        self.cluster_ready
            .with_label_values(&[cluster_readiness])
            .set(f64::from(u8::from(ready)));

        for candidate in HealthState::ALL {
            self.cluster_health_state
                .with_label_values(&[cluster_readiness, candidate.as_str()])
                .set(f64::from(u8::from(candidate == state)));
        }
    }

    pub fn set_category_ready(&self, category: &str, cluster_readiness: &str, ready: bool) {
        self.category_ready
            .with_label_values(&[category, cluster_readiness])
            .set(f64::from(u8::from(ready)));
    }

    /// Renders the registry in the Prometheus text exposition format.
    #[must_use]
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge_value(metrics: &GateMetrics, family: &str, labels: &[(&str, &str)]) -> Option<f64> {
        metrics
            .registry
            .gather()
            .into_iter()
            .find(|mf| mf.get_name() == family)?
            .get_metric()
            .iter()
            .find(|m| {
                labels.iter().all(|(key, value)| {
                    m.get_label()
                        .iter()
                        .any(|l| l.get_name() == *key && l.get_value() == *value)
                })
            })
            .map(|m| m.get_gauge().get_value())
    }

    #[test]
    fn record_check_sets_gauge_and_histogram() {
        let metrics = GateMetrics::new().unwrap();
        metrics.record_check(
            "dns",
            "prod",
            "critical",
            "networking",
            true,
            Duration::from_millis(150),
        );

        assert_eq!(
            gauge_value(
                &metrics,
                "clustergate_check_ready",
                &[("check", "dns"), ("cluster_readiness", "prod")]
            ),
            Some(1.0)
        );

        let families = metrics.registry.gather();
        let histogram = families
            .iter()
            .find(|mf| mf.get_name() == "clustergate_check_duration_seconds")
            .unwrap();
        assert_eq!(histogram.get_metric()[0].get_histogram().get_sample_count(), 1);
    }

    #[test]
    fn cluster_health_state_sets_exactly_one_active_label() {
        let metrics = GateMetrics::new().unwrap();
        metrics.set_cluster_state("prod", true, HealthState::Degraded);

        assert_eq!(
            gauge_value(
                &metrics,
                "clustergate_cluster_health_state",
                &[("state", "Degraded")]
            ),
            Some(1.0)
        );
        assert_eq!(
            gauge_value(
                &metrics,
                "clustergate_cluster_health_state",
                &[("state", "Healthy")]
            ),
            Some(0.0)
        );
        assert_eq!(
            gauge_value(
                &metrics,
                "clustergate_cluster_health_state",
                &[("state", "Unhealthy")]
            ),
            Some(0.0)
        );
        assert_eq!(
            gauge_value(&metrics, "clustergate_cluster_ready", &[("cluster_readiness", "prod")]),
            Some(1.0)
        );
    }

    #[test]
    fn render_emits_text_format() {
        let metrics = GateMetrics::new().unwrap();
        metrics.set_category_ready("networking", "prod", false);
        let rendered = metrics.render();
        assert!(rendered.contains("clustergate_category_ready"));
        assert!(rendered.contains("category=\"networking\""));
    }
}
