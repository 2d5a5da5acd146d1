use crate::report::{summarize, TenantSummary};
use axum::extract::State;
use axum::{response::IntoResponse, routing, Json, Router};
use blocklist::List;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    list: Arc<List>,
    registry: Registry,
}

/// Create the HTTP router with the metrics and tenant summary endpoints
pub fn create_router(list: Arc<List>, registry: Registry) -> Router {
    Router::new()
        .route("/metrics", routing::get(metrics_handler))
        .route("/tenants", routing::get(tenants_handler))
        .with_state(AppState { list, registry })
}

/// Handler for GET /metrics
/// Returns Prometheus metrics in text format
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    let metric_families = state.registry.gather();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        buffer,
    )
        .into_response()
}

/// Handler for GET /tenants
async fn tenants_handler(State(state): State<AppState>) -> Json<Vec<TenantSummary>> {
    Json(summarize(&state.list))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use blocklist::BlocklistMetrics;
    use storage::BlockMeta;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn get(uri: &str) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let registry = Registry::new();
        BlocklistMetrics::new(&registry).unwrap().inc_poll_errors();
        let router = create_router(Arc::new(List::new()), registry);

        let response = router.oneshot(get("/metrics")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; version=0.0.4"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("tempodb_blocklist_poll_errors_total 1"));
    }

    #[tokio::test]
    async fn test_tenants_endpoint() {
        let list = Arc::new(List::new());
        list.update(
            "single-tenant",
            &[Arc::new(BlockMeta::new("single-tenant", Uuid::from_u128(1)))],
            &[],
            &[],
            &[],
        );
        let router = create_router(list, Registry::new());

        let response = router.oneshot(get("/tenants")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"tenant": "single-tenant", "blocks": 1, "compacted_blocks": 0}
            ])
        );
    }
}
