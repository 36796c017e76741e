use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::metrics::Metrics;

/// Per-request deadline bounding slow scrape clients. Socket-level read and
/// idle timeouts are not exposed by `axum::serve`; the request timeout is the
/// enforceable equivalent for a pull endpoint.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve the metrics registry over HTTP until shutdown is signalled.
///
/// The liveness gauge goes to 1 immediately before binding. A bind failure is
/// logged and reflected in the gauge but deliberately not propagated: a
/// broken scrape endpoint must not take down a still-running ingestion
/// pipeline. Any serve termination other than the expected shutdown also
/// zeroes the gauge.
pub async fn serve(
    metrics: Arc<Metrics>,
    listen_address: &str,
    metrics_path: &str,
    mut shutdown: broadcast::Receiver<()>,
) {
    metrics.set_serving(true);

    let addr = bind_address(listen_address);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(address = %addr, error = %err, "metrics server failed to bind");
            metrics.set_serving(false);
            return;
        }
    };

    info!(address = %addr, path = metrics_path, "metrics server starting");

    let app = build_router(metrics.clone(), metrics_path);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await;

    match result {
        Ok(()) => info!("metrics server shut down"),
        Err(err) => {
            error!(error = %err, "metrics server terminated unexpectedly");
            metrics.set_serving(false);
        }
    }
}

/// Router serving the registry at `metrics_path`; every other path falls
/// through to axum's default 404.
pub fn build_router(metrics: Arc<Metrics>, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(render_metrics))
        .with_state(metrics)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

async fn render_metrics(State(metrics): State<Arc<Metrics>>) -> Response {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

/// Normalize a `:port` listen address to `0.0.0.0:port`; `TcpListener::bind`
/// needs an explicit host part.
fn bind_address(listen_address: &str) -> String {
    if listen_address.starts_with(':') {
        format!("0.0.0.0{listen_address}")
    } else {
        listen_address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn test_bind_address_normalizes_bare_port() {
        assert_eq!(bind_address(":9876"), "0.0.0.0:9876");
        assert_eq!(bind_address("127.0.0.1:9876"), "127.0.0.1:9876");
        assert_eq!(bind_address("[::1]:80"), "[::1]:80");
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_registry() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.set_serving(true);
        metrics.record_query("bench-1", "site1.local", "ToDo", "save", "SELECT", "success", 0.01);

        let app = build_router(metrics, "/metrics");
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("frapp8s_up 1"));
        assert!(body.contains("frappe_sql_queries_total"));
    }

    #[tokio::test]
    async fn test_other_paths_are_not_found() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let app = build_router(metrics, "/metrics");

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let app = build_router(metrics, "/internal/metrics");

        let found = app
            .clone()
            .oneshot(Request::get("/internal/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);

        let missing = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_failure_is_non_fatal_and_zeroes_gauge() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let (_tx, rx) = broadcast::channel(1);

        // Occupy a port so the bind is guaranteed to fail; serve must return
        // rather than panic or propagate.
        let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = occupied.local_addr().unwrap().to_string();
        serve(metrics.clone(), &addr, "/metrics", rx).await;

        assert!(metrics.render().unwrap().contains("frapp8s_up 0"));
    }

    #[tokio::test]
    async fn test_graceful_shutdown_leaves_serve_cleanly() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(serve(metrics.clone(), "127.0.0.1:0", "/metrics", rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not shut down")
            .unwrap();
        assert!(metrics.render().unwrap().contains("frapp8s_up 1"));
    }
}
