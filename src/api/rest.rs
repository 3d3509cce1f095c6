use axum::{
    Router,
    middleware,
    routing::{get, post},
    extract::{Path, State, Json},
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use crate::api::auth::admin_auth_middleware;
use crate::api::websocket::websocket_handler;
use crate::api::ApiState;
use crate::core::state_machine::RouterPhase;
use crate::distribution::snapshot::HealthSnapshot;
use crate::observability::metrics;
use crate::types::symbol::Symbol;
use crate::types::tick::PriceTick;

pub fn create_router(state: Arc<ApiState>) -> Router {
    let admin = Router::new()
        .route("/admin/failover", post(force_failover))
        .route("/admin/reconnect-primary", post(force_reconnect_primary))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/metrics", get(render_metrics))
        .route("/ticks/:symbol", get(last_tick))
        .route("/ws/ticks", get(websocket_handler))
        .merge(admin)
        .with_state(state)
}

/// 200 while some source is being served.
async fn health_check(State(state): State<Arc<ApiState>>) -> (StatusCode, &'static str) {
    if state.relay.phase().is_serving() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
    }
}

async fn status(State(state): State<Arc<ApiState>>) -> Json<HealthSnapshot> {
    Json(state.relay.health_snapshot())
}

async fn render_metrics() -> Result<String, StatusCode> {
    metrics::render().map_err(|e| {
        error!(error = %e, "Failed to render metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn last_tick(
    State(state): State<Arc<ApiState>>,
    Path(symbol): Path<String>,
) -> Result<Json<PriceTick>, StatusCode> {
    let symbol = Symbol::new(&symbol).map_err(|_| StatusCode::BAD_REQUEST)?;
    state.relay
        .last_tick(&symbol)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OverrideResponse {
    phase: RouterPhase,
}

async fn force_failover(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<OverrideResponse>, StatusCode> {
    info!("Manual failover requested over HTTP");
    let phase = state.relay.force_failover().await.map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(OverrideResponse { phase }))
}

async fn force_reconnect_primary(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<OverrideResponse>, StatusCode> {
    info!("Primary reconnect requested over HTTP");
    let phase = state.relay.force_reconnect_primary().await.map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(OverrideResponse { phase }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;
    use crate::api::auth::JwtAuth;
    use crate::relay::test_support::{secondary_only_relay, test_config, wait_for_phase};

    async fn serving_state(admin_secret: Option<&str>) -> Arc<ApiState> {
        let relay = Arc::new(secondary_only_relay(test_config()).await);
        wait_for_phase(&relay, RouterPhase::FallbackActive).await;
        Arc::new(ApiState::new(relay, admin_secret))
    }

    async fn call(state: &Arc<ApiState>, request: Request<Body>) -> (StatusCode, String) {
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_unavailable_during_startup() {
        let mut config = test_config();
        config.failover.startup_grace_ms = 60_000;
        let relay = Arc::new(secondary_only_relay(config).await);
        let state = Arc::new(ApiState::new(relay.clone(), None));

        let (status, body) = call(&state, get_request("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "UNAVAILABLE");
        relay.shutdown().await;
    }

    #[tokio::test]
    async fn serves_health_status_and_ticks() {
        let state = serving_state(None).await;

        let (status, body) = call(&state, get_request("/health")).await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

        let (status, body) = call(&state, get_request("/status")).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(snapshot["phase"], "FALLBACK_ACTIVE");

        let (status, body) = call(&state, get_request("/ticks/aapl")).await;
        assert_eq!(status, StatusCode::OK);
        let tick: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(tick["symbol"], "AAPL");
        assert_eq!(tick["isRealTime"], false);

        assert_eq!(call(&state, get_request("/ticks/MSFT")).await.0, StatusCode::NOT_FOUND);
        assert_eq!(call(&state, get_request("/ticks/%20")).await.0, StatusCode::BAD_REQUEST);

        state.relay.shutdown().await;
    }

    #[tokio::test]
    async fn metrics_are_exposed() {
        metrics::register_metrics().unwrap();
        let state = serving_state(None).await;

        let (status, body) = call(&state, get_request("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("ticks_forwarded_total"));
        state.relay.shutdown().await;
    }

    #[tokio::test]
    async fn admin_routes_open_without_secret() {
        let state = serving_state(None).await;
        let (status, body) = call(&state, post_request("/admin/failover", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"phase":"FALLBACK_ACTIVE"}"#);
        state.relay.shutdown().await;
    }

    #[tokio::test]
    async fn admin_routes_require_operator_token() {
        let state = serving_state(Some("s3cret")).await;
        let issuer = JwtAuth::new("s3cret");

        assert_eq!(call(&state, post_request("/admin/failover", None)).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            call(&state, post_request("/admin/failover", Some("not-a-jwt"))).await.0,
            StatusCode::UNAUTHORIZED
        );

        let viewer = issuer.generate_token("dashboard", "viewer", 60).unwrap();
        assert_eq!(call(&state, post_request("/admin/failover", Some(&viewer))).await.0, StatusCode::FORBIDDEN);

        let operator = issuer.generate_token("oncall", "operator", 60).unwrap();
        let (status, body) = call(&state, post_request("/admin/reconnect-primary", Some(&operator))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("FALLBACK_ACTIVE"));

        // Reads stay public.
        assert_eq!(call(&state, get_request("/health")).await.0, StatusCode::OK);
        state.relay.shutdown().await;
    }
}
