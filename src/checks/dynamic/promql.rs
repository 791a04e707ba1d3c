//! PromQL dynamic check: runs an instant query and evaluates the result
//! against a count or value condition.

use serde::Deserialize;

use crate::checks::CheckOutcome;
use crate::crds::{PromqlAssertionSpec, PromqlCondition};

use super::{http_client_for_spec, timeout_from_spec};

/// Prometheus HTTP API response for instant queries.
#[derive(Debug, Deserialize)]
struct PromqlResponse {
    status: String,
    #[serde(default)]
    data: PromqlData,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PromqlData {
    #[serde(default, rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<PromqlSample>,
}

/// A single vector sample: `value` is `[timestamp, "value_string"]`.
#[derive(Debug, Deserialize)]
struct PromqlSample {
    #[serde(default)]
    value: Option<(f64, String)>,
}

pub(super) async fn execute(spec: &PromqlAssertionSpec) -> anyhow::Result<CheckOutcome> {
    let client = http_client_for_spec(false, timeout_from_spec(spec.timeout_seconds))?;

    let query_url = format!("{}/api/v1/query", spec.endpoint.trim_end_matches('/'));
    let response = match client
        .get(&query_url)
        .query(&[("query", spec.query.as_str())])
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            return Ok(
                CheckOutcome::failing(format!("Prometheus query failed: {e}"))
                    .with_detail("endpoint", &spec.endpoint)
                    .with_detail("query", &spec.query),
            );
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Ok(CheckOutcome::failing(format!(
            "Prometheus returned HTTP {status}: {body}"
        ))
        .with_detail("endpoint", &spec.endpoint)
        .with_detail("query", &spec.query)
        .with_detail("statusCode", status.as_u16().to_string()));
    }

    let parsed: PromqlResponse = match response.json().await {
        Ok(parsed) => parsed,
        Err(e) => {
            return Ok(CheckOutcome::failing(format!(
                "failed to parse Prometheus response: {e}"
            )));
        }
    };

    if parsed.status != "success" {
        return Ok(CheckOutcome::failing(format!(
            "Prometheus query error: {} ({})",
            parsed.error.unwrap_or_default(),
            parsed.error_type.unwrap_or_default()
        ))
        .with_detail("endpoint", &spec.endpoint)
        .with_detail("query", &spec.query));
    }

    let outcome = evaluate_condition(&spec.condition, &parsed.data);
    Ok(outcome
        .with_detail("endpoint", &spec.endpoint)
        .with_detail("query", &spec.query)
        .with_detail("resultType", &parsed.data.result_type)
        .with_detail("resultCount", parsed.data.result.len().to_string()))
}

fn evaluate_condition(condition: &PromqlCondition, data: &PromqlData) -> CheckOutcome {
    let result_count = data.result.len();

    match condition.condition_type.as_str() {
        "resultCount" => {
            let pass = compare(result_count as f64, &condition.operator, condition.threshold);
            if pass {
                CheckOutcome::passing(format!(
                    "query returned {result_count} results (resultCount {} {})",
                    condition.operator, condition.threshold
                ))
            } else {
                CheckOutcome::failing(format!(
                    "query returned {result_count} results, expected {} {}",
                    condition.operator, condition.threshold
                ))
            }
        }
        "value" => {
            if result_count == 0 {
                return CheckOutcome::failing("query returned no results to evaluate");
            }

            let mut failed = 0usize;
            for sample in &data.result {
                let Some((_, value_str)) = &sample.value else {
                    continue;
                };
                let Ok(value) = value_str.parse::<f64>() else {
                    continue;
                };
                if !compare(value, &condition.operator, condition.threshold) {
                    failed += 1;
                }
            }

            if failed == 0 {
                CheckOutcome::passing(format!(
                    "all {result_count} sample values satisfy {} {}",
                    condition.operator, condition.threshold
                ))
            } else {
                CheckOutcome::failing(format!(
                    "{failed} values failed condition {} {}",
                    condition.operator, condition.threshold
                ))
            }
        }
        other => CheckOutcome::failing(format!("unknown condition type: {other}")),
    }
}

fn compare(actual: f64, operator: &str, threshold: f64) -> bool {
    match operator {
        "gte" => actual >= threshold,
        "lte" => actual <= threshold,
        "eq" => (actual - threshold).abs() < f64::EPSILON,
        "gt" => actual > threshold,
        "lt" => actual < threshold,
        _ => false,
    }
}
