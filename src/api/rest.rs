// =============================================================================
// REST API Endpoints: Axum 0.7
// =============================================================================
//
//   GET /api/history     full in-memory candle history, oldest first
//   GET /api/v1/health   liveness summary
//   GET /ws              WebSocket push stream (see `api::ws`)
//
// CORS is fully permissive so a browser chart served from anywhere can read
// the history and open the stream.
// =============================================================================

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use crate::app_state::AppState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/history", get(history))
        .route("/api/v1/health", get(health))
        .route("/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// History
// =============================================================================

/// Snapshot of the candle series. Never touches the broadcast hub.
async fn history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let candles = state.series.snapshot();
    debug!(count = candles.len(), "history requested");
    Json(candles)
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::RandomWalkGenerator;
    use crate::runtime_config::RuntimeConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::NaiveDate;
    use tower::ServiceExt;

    fn state_with(seed: usize, max: usize) -> Arc<AppState> {
        let config = RuntimeConfig {
            max_candles: max,
            ..RuntimeConfig::default()
        };
        let state = Arc::new(AppState::new(&config));
        if seed > 0 {
            let anchor = NaiveDate::from_ymd_opt(2025, 6, 30)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap();
            let generator = RandomWalkGenerator::with_seed(21).anchored_at(anchor);
            state.series.seed(&generator, seed).unwrap();
        }
        state
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn history_returns_snapshot_in_wire_format() {
        let state = state_with(400, 500);
        let (status, body) = get_json(router(state.clone()), "/api/history").await;

        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 400);
        assert_eq!(items.last().unwrap()["time"], "2025-06-30 12:00:00");
        assert_eq!(items[0]["time"], "2025-06-30 05:21:00");
        for key in ["open", "high", "low", "close", "volume"] {
            assert!(items[0][key].is_number(), "{key} should be numeric");
        }

        let expected = serde_json::to_value(state.series.snapshot()).unwrap();
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn history_has_no_side_effects() {
        let state = state_with(10, 500);
        let _listener = state.hub.register();
        get_json(router(state.clone()), "/api/history").await;
        get_json(router(state.clone()), "/api/history").await;

        assert_eq!(state.series.len(), 10);
        assert_eq!(state.hub.messages_published(), 0);
    }

    #[tokio::test]
    async fn history_of_unseeded_series_is_empty_array() {
        let state = state_with(0, 500);
        let (status, body) = get_json(router(state), "/api/history").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let state = state_with(5, 8);
        let _a = state.hub.register();
        let _b = state.hub.register();

        let (status, body) = get_json(router(state), "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["candles"], 5);
        assert_eq!(body["max_candles"], 8);
        assert_eq!(body["listeners"], 2);
    }

    #[tokio::test]
    async fn cors_headers_present() {
        let state = state_with(1, 500);
        let resp = router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/history")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let state = state_with(1, 500);
        let resp = router(state)
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
