//! The per-request forwarding pipeline.

use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::metrics::MetricsRegistry;
use crate::ratelimit::{Decision, ThrottleKey};

use super::routes::{RouteEntry, RouteTable};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct GatewayState {
    /// Compiled route table
    pub table: Arc<RouteTable>,
    /// Outbound HTTP client, shared across requests
    pub client: reqwest::Client,
    /// Metrics registry, present iff metrics are enabled
    pub metrics: Option<MetricsRegistry>,
}

/// Forward one request through its route's admission gate.
///
/// Each request runs this pipeline on its own task: resolve, count,
/// admit or reject, proxy, relay. Exactly one metric event is recorded
/// per completed request, and exactly one backend call is made iff the
/// request was admitted.
pub async fn forward(State(state): State<GatewayState>, req: Request) -> Response {
    let start = Instant::now();
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    let Some(entry) = state.table.resolve(&path) else {
        // Only registered paths reach this handler; a miss means the
        // router and the table disagree.
        error!(path = %path, "no route entry for registered path");
        return StatusCode::NOT_FOUND.into_response();
    };

    entry.recorder.inc_requests();

    let key = ThrottleKey::path(&path);
    let decision = entry.limiter.check(&key);
    if !decision.allowed {
        debug!(
            route = %path,
            retry_after = ?decision.retry_after,
            "request over budget"
        );
        entry
            .recorder
            .observe(method.as_str(), &path, StatusCode::TOO_MANY_REQUESTS.as_u16(), start.elapsed());
        return rate_limited(&decision);
    }

    relay(&state, entry, req, start, path).await
}

/// Serve the Prometheus text exposition format.
pub async fn scrape(State(state): State<GatewayState>) -> Response {
    match state.metrics.as_ref().map(MetricsRegistry::render) {
        Some(Ok(body)) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Some(Err(err)) => {
            error!(error = %err, "metrics render failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Proxy an admitted request to its backend and stream the response back.
async fn relay(
    state: &GatewayState,
    entry: Arc<RouteEntry>,
    req: Request,
    start: Instant,
    path: String,
) -> Response {
    let method = req.method().clone();
    let headers = outbound_headers(req.headers().clone());
    let body = reqwest::Body::wrap_stream(req.into_body().into_data_stream());

    let sent = state
        .client
        .request(method.clone(), &entry.route.backend)
        .headers(headers)
        .body(body)
        .send()
        .await;

    let upstream = match sent {
        Ok(upstream) => upstream,
        Err(err) => {
            warn!(route = %path, backend = %entry.route.backend, error = %err, "backend request failed");
            let status = StatusCode::BAD_GATEWAY;
            entry
                .recorder
                .observe(method.as_str(), &path, status.as_u16(), start.elapsed());
            return (status, err.to_string()).into_response();
        }
    };

    let status = upstream.status();
    let response_headers = upstream.headers().clone();
    let mut upstream_body = upstream.bytes_stream();

    // The metric event is emitted when the relayed stream terminates, so
    // elapsed time covers the full body and partial failures still record
    // exactly once.
    let recorder = entry.recorder.clone();
    let method_label = method.as_str().to_string();
    let observed = stream! {
        while let Some(chunk) = upstream_body.next().await {
            match chunk {
                Ok(bytes) => yield Ok(bytes),
                Err(err) => {
                    warn!(route = %path, error = %err, "response stream failed midway");
                    recorder.observe(&method_label, &path, status.as_u16(), start.elapsed());
                    yield Err(err);
                    return;
                }
            }
        }
        recorder.observe(&method_label, &path, status.as_u16(), start.elapsed());
    };

    let mut response = Response::new(Body::from_stream(observed));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}

/// Build the rejection response carrying the retry metadata.
fn rate_limited(decision: &Decision) -> Response {
    let retry_secs = decision.retry_after.as_secs_f64().ceil() as u64;
    let reset_secs = decision.reset_after.as_secs_f64().ceil() as u64;

    let body = json!({
        "error": "rate limit exceeded",
        "retryAfterSecs": retry_secs,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, body.to_string()).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_secs));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset_secs));
    response
}

/// Headers forwarded to the backend: everything except `Host`, which
/// derives from the backend URL.
fn outbound_headers(mut headers: HeaderMap) -> HeaderMap {
    headers.remove(header::HOST);
    headers
}
