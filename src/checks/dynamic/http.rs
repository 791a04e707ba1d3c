//! HTTP probe dynamic check.

use std::time::Instant;

use crate::checks::CheckOutcome;
use crate::crds::HttpProbeSpec;

use super::{http_client_for_spec, timeout_from_spec};

pub(super) async fn execute(spec: &HttpProbeSpec) -> anyhow::Result<CheckOutcome> {
    let method = match reqwest::Method::from_bytes(spec.method.as_bytes()) {
        Ok(method) => method,
        Err(_) => {
            return Ok(CheckOutcome::failing(format!(
                "invalid HTTP method: {}",
                spec.method
            )));
        }
    };

    let expected_codes: Vec<u16> = if spec.expected_status_codes.is_empty() {
        vec![200]
    } else {
        spec.expected_status_codes.clone()
    };

    let client = http_client_for_spec(
        spec.insecure_skip_tls_verify,
        timeout_from_spec(spec.timeout_seconds),
    )?;

    let mut request = client.request(method.clone(), &spec.url);
    for (key, value) in &spec.headers {
        request = request.header(key, value);
    }

    let start = Instant::now();
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            return Ok(CheckOutcome::failing(format!("HTTP request failed: {e}"))
                .with_detail("url", &spec.url)
                .with_detail("method", method.as_str())
                .with_detail("responseTime", format!("{:?}", start.elapsed())));
        }
    };
    let elapsed = start.elapsed();

    let status = response.status().as_u16();
    // Drain the body so the connection can be reused.
    let _ = response.bytes().await;

    let outcome = if expected_codes.contains(&status) {
        CheckOutcome::passing(format!("{method} {} returned {status}", spec.url))
    } else {
        CheckOutcome::failing(format!(
            "{method} {} returned {status}, expected one of {expected_codes:?}",
            spec.url
        ))
    };

    Ok(outcome
        .with_detail("url", &spec.url)
        .with_detail("method", method.as_str())
        .with_detail("statusCode", status.to_string())
        .with_detail("responseTime", format!("{elapsed:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::collections::BTreeMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn probe(url: String) -> HttpProbeSpec {
        HttpProbeSpec {
            url,
            method: "GET".into(),
            expected_status_codes: vec![],
            timeout_seconds: Some(2),
            insecure_skip_tls_verify: false,
            headers: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn passes_on_expected_status() {
        let base = serve(Router::new().route("/healthz", get(|| async { "ok" }))).await;
        let outcome = execute(&probe(format!("{base}/healthz"))).await.unwrap();
        assert!(outcome.ready, "unexpected outcome: {}", outcome.message);
        assert_eq!(
            outcome.details.get("statusCode").map(String::as_str),
            Some("200")
        );
    }

    #[tokio::test]
    async fn fails_on_unexpected_status() {
        let base = serve(Router::new().route(
            "/healthz",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        ))
        .await;
        let outcome = execute(&probe(format!("{base}/healthz"))).await.unwrap();
        assert!(!outcome.ready);
        assert!(outcome.message.contains("503"));
    }

    #[tokio::test]
    async fn accepts_custom_expected_codes() {
        let base = serve(Router::new().route(
            "/teapot",
            get(|| async { (axum::http::StatusCode::IM_A_TEAPOT, "short and stout") }),
        ))
        .await;
        let mut spec = probe(format!("{base}/teapot"));
        spec.expected_status_codes = vec![418];
        let outcome = execute(&spec).await.unwrap();
        assert!(outcome.ready);
    }

    #[tokio::test]
    async fn connection_failure_is_a_failing_outcome() {
        // Port 9 (discard) is almost certainly closed.
        let outcome = execute(&probe("http://127.0.0.1:9/healthz".into()))
            .await
            .unwrap();
        assert!(!outcome.ready);
        assert!(outcome.message.contains("HTTP request failed"));
    }

    #[tokio::test]
    async fn invalid_method_is_a_failing_outcome() {
        let mut spec = probe("http://127.0.0.1:9/".into());
        spec.method = "GE T".into();
        let outcome = execute(&spec).await.unwrap();
        assert!(!outcome.ready);
        assert!(outcome.message.contains("invalid HTTP method"));
    }
}
