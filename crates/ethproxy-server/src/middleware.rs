//! Request observability middleware.
//!
//! Wraps every route except `/metrics`. Purely observational: the response
//! bytes and status code pass through untouched. Per request it records the
//! method, path, status code and elapsed microseconds, both as a log line
//! (warn for status >= 400) and as Prometheus series. At debug level the
//! response body is buffered and logged as well.

use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use tracing::{debug, warn};

pub async fn observe(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed_micros = start.elapsed().as_micros() as u64;
    let status = response.status().as_u16();

    counter!(
        "ethproxy_http_requests_total",
        "method" => method.to_string(),
        "path" => path.clone(),
        "status" => status.to_string(),
    )
    .increment(1);
    histogram!(
        "ethproxy_http_request_duration_microseconds",
        "path" => path.clone(),
    )
    .record(elapsed_micros as f64);

    let (response, body) = if tracing::enabled!(tracing::Level::DEBUG) {
        capture_body(response).await
    } else {
        (response, None)
    };

    if status >= 400 {
        warn!(
            http_method = %method,
            http_code = status,
            elapsed_microseconds = elapsed_micros,
            response = body.as_deref().unwrap_or_default(),
            "{path}"
        );
    } else {
        debug!(
            http_method = %method,
            http_code = status,
            elapsed_microseconds = elapsed_micros,
            response = body.as_deref().unwrap_or_default(),
            "{path}"
        );
    }

    response
}

/// Buffers the response body so it can be logged, then re-emits the exact
/// same bytes to the client.
async fn capture_body(response: Response) -> (Response, Option<String>) {
    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            (
                Response::from_parts(parts, Body::from(bytes)),
                Some(text),
            )
        }
        Err(err) => {
            warn!(error = %err, "failed to buffer response body");
            (Response::from_parts(parts, Body::empty()), None)
        }
    }
}
