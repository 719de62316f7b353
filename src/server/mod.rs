//! HTTP server — Axum router, admin middleware, and serving.
//!
//! CORS enabled for connector clients. The admin-token check is a
//! middleware layer applied only to the rule-trigger route.

pub mod routes;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use secrecy::ExposeSecret;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use routes::{ApiError, AppState};

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let admin = Router::new()
        .route("/rules/:rule_id/trigger", post(routes::trigger_rule))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(routes::health))
        .route("/sse/", get(routes::sse_stream))
        .route("/mcp/search", post(routes::mcp_search))
        .route("/mcp/fetch", post(routes::mcp_fetch))
        .route("/remote/amount", post(routes::remote_amount))
        .merge(admin)
        .layer(cors)
        .with_state(state)
}

/// Serve the facade until shutdown signal.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Facade server listening on http://localhost:{port}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind server port")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received.");
}

/// Admin guard for write endpoints. Requires `x-admin: Bearer {token}`
/// matching the env-resolved admin token: missing or malformed header is
/// 401, mismatch is 403.
async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get("x-admin")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let supplied = header_value
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    let expected = state
        .admin_token
        .as_ref()
        .ok_or(ApiError::MissingConfig("admin token"))?;

    if supplied != expected.expose_secret() {
        warn!("Admin token mismatch on protected route");
        return Err(ApiError::Forbidden("bad admin token".to_string()));
    }

    Ok(next.run(request).await)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SweepConfig;
    use crate::provider::{Account, AccountProvider, ProviderError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use routes::FacadeState;
    use secrecy::SecretString;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct EmptyProvider;

    #[async_trait]
    impl AccountProvider for EmptyProvider {
        async fn fetch_accounts(&self) -> Result<Vec<Account>, ProviderError> {
            Ok(Vec::new())
        }

        async fn trigger_rule(
            &self,
            rule_id: &str,
            _secret: &str,
        ) -> Result<serde_json::Value, ProviderError> {
            Ok(serde_json::json!({ "triggered": rule_id }))
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    fn test_state() -> AppState {
        Arc::new(FacadeState {
            provider: Arc::new(EmptyProvider),
            sweep: SweepConfig {
                default_buffer_cents: 1_000,
                default_percent: 30.0,
                default_daily_cap_cents: 30_000,
            },
            admin_token: Some(SecretString::new("admin-token".to_string())),
            rule_secrets: HashMap::from([(
                "ru_12345".to_string(),
                SecretString::new("shh".to_string()),
            )]),
        })
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn test_remote_amount_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(post_json(
                "/remote/amount",
                r#"{"checkingBalanceCents": 11000}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["amountInCents"], 3_000);
    }

    #[tokio::test]
    async fn test_trigger_without_header_is_unauthorized() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(post_json("/rules/ru_12345/trigger", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_trigger_with_bad_token_is_forbidden() {
        let app = build_router(test_state());
        let req = Request::builder()
            .method("POST")
            .uri("/rules/ru_12345/trigger")
            .header("x-admin", "Bearer wrong-token")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_trigger_with_good_token_succeeds() {
        let app = build_router(test_state());
        let req = Request::builder()
            .method("POST")
            .uri("/rules/ru_12345/trigger")
            .header("x-admin", "Bearer admin-token")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_middleware_not_applied_to_reads() {
        // /mcp/search must work with no x-admin header at all.
        let app = build_router(test_state());
        let resp = app.oneshot(post_json("/mcp/search", "{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sse_endpoint_responds() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/sse/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("text/event-stream"));
    }
}
