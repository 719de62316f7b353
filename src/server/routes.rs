//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<FacadeState>` and
//! is immutable after startup, so handlers need no locking.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::Stream;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{Secrets, SweepConfig};
use crate::provider::{Account, AccountProvider, ProviderError};
use crate::sweep::{self, SweepError, SweepParams};

/// Base URL of the provider's web app, used for result links.
const APP_URL_BASE: &str = "https://app.getsequence.io";

/// Maximum results returned by `/mcp/search`.
const MAX_SEARCH_RESULTS: usize = 10;

/// Interval between SSE heartbeat events.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct FacadeState {
    pub provider: Arc<dyn AccountProvider>,
    pub sweep: SweepConfig,
    pub admin_token: Option<SecretString>,
    pub rule_secrets: HashMap<String, SecretString>,
}

impl FacadeState {
    pub fn new(provider: Arc<dyn AccountProvider>, sweep: SweepConfig, secrets: Secrets) -> Self {
        Self {
            provider,
            sweep,
            admin_token: secrets.admin_token,
            rule_secrets: secrets.rule_secrets,
        }
    }
}

pub type AppState = Arc<FacadeState>;

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Errors surfaced to HTTP callers, serialized as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    /// Provider failure, forwarded without transformation.
    #[error("upstream provider error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MissingConfig(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::MissingToken => ApiError::MissingConfig("provider access token"),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<SweepError> for ApiError {
    fn from(err: SweepError) -> Self {
        match err {
            SweepError::InvalidInput(msg) => ApiError::InvalidInput(msg),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchRequest {
    #[serde(default)]
    pub id: Option<String>,
}

/// One `/mcp/search` hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// One `/mcp/fetch` document: the full record as a JSON string in `text`.
#[derive(Debug, Clone, Serialize)]
pub struct FetchDocument {
    pub id: String,
    pub title: String,
    pub text: String,
    pub url: String,
}

/// MCP tool responses are a list of content items; this facade always
/// returns a single text item whose body is JSON.
#[derive(Debug, Serialize)]
pub struct ToolContent {
    pub content: Vec<ContentItem>,
}

#[derive(Debug, Serialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ToolContent {
    fn text(payload: serde_json::Value) -> Self {
        Self {
            content: vec![ContentItem {
                kind: "text".to_string(),
                text: payload.to_string(),
            }],
        }
    }
}

/// `/remote/amount` request. All amounts are cents; unset fields fall back
/// to the configured sweep defaults (already-swept defaults to zero).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRequest {
    #[serde(default)]
    pub checking_balance_cents: i64,
    #[serde(default)]
    pub buffer_cents: Option<i64>,
    #[serde(default)]
    pub sweep_percent: Option<f64>,
    #[serde(default)]
    pub daily_cap_cents: Option<i64>,
    #[serde(default)]
    pub already_swept_today_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub amount_in_cents: i64,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

/// GET /sse/
///
/// Minimal event stream used by MCP connectors to validate the server:
/// one `ready` event, then a heartbeat with a unix timestamp every 15
/// seconds until the client disconnects.
pub async fn sse_stream() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let ready = futures::stream::once(async {
        Ok::<_, Infallible>(Event::default().event("ready").data("ok"))
    });
    let heartbeats = futures::stream::unfold((), |()| async {
        tokio::time::sleep(HEARTBEAT_INTERVAL).await;
        let event = Event::default()
            .event("heartbeat")
            .data(chrono::Utc::now().timestamp().to_string());
        Some((Ok::<_, Infallible>(event), ()))
    });
    Sse::new(ready.chain(heartbeats))
}

/// POST /mcp/search
///
/// Matches the query case-insensitively against account names and ids.
/// An empty query, or the literal queries "balances"/"accounts", matches
/// every account. At most 10 results.
pub async fn mcp_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<ToolContent>, ApiError> {
    let query = request.query.unwrap_or_default().trim().to_lowercase();
    let accounts = state.provider.fetch_accounts().await?;

    let results: Vec<SearchResult> = accounts
        .iter()
        .filter(|account| matches_query(account, &query))
        .take(MAX_SEARCH_RESULTS)
        .map(search_result)
        .collect();

    Ok(Json(ToolContent::text(
        serde_json::json!({ "results": results }),
    )))
}

/// POST /mcp/fetch
///
/// Returns the full record for an account id, a static descriptor for
/// rule ids (`ru_` prefix), or 404.
pub async fn mcp_fetch(
    State(state): State<AppState>,
    Json(request): Json<FetchRequest>,
) -> Result<Json<ToolContent>, ApiError> {
    let id = request.id.unwrap_or_default().trim().to_string();
    let accounts = state.provider.fetch_accounts().await?;

    if let Some(account) = accounts.iter().find(|a| a.id == id) {
        let doc = FetchDocument {
            id: account.id.clone(),
            title: account.name.clone(),
            text: serde_json::to_string(account)?,
            url: account_url(&account.id),
        };
        return Ok(Json(ToolContent::text(serde_json::to_value(&doc)?)));
    }

    if id.starts_with("ru_") {
        let doc = FetchDocument {
            id: id.clone(),
            title: format!("Sequence Rule {id}"),
            text: "Rule descriptor. Use POST /rules/{id}/trigger with x-admin header to invoke."
                .to_string(),
            url: format!("{APP_URL_BASE}/rules/{id}"),
        };
        return Ok(Json(ToolContent::text(serde_json::to_value(&doc)?)));
    }

    Err(ApiError::NotFound)
}

/// POST /remote/amount
///
/// Merges the configured sweep defaults into any fields the request left
/// unset, then runs the sweep calculator. Invalid numeric input is a 400.
pub async fn remote_amount(
    State(state): State<AppState>,
    Json(request): Json<SweepRequest>,
) -> Result<Json<SweepResponse>, ApiError> {
    let defaults = &state.sweep;
    let params = SweepParams {
        checking_balance_cents: request.checking_balance_cents,
        buffer_cents: request.buffer_cents.unwrap_or(defaults.default_buffer_cents),
        sweep_percent: request.sweep_percent.unwrap_or(defaults.default_percent),
        daily_cap_cents: request
            .daily_cap_cents
            .unwrap_or(defaults.default_daily_cap_cents),
        already_swept_today_cents: request.already_swept_today_cents.unwrap_or(0),
    };

    let amount = sweep::compute_sweep(&params)?;
    Ok(Json(SweepResponse {
        amount_in_cents: amount.amount_cents,
    }))
}

/// POST /rules/:rule_id/trigger
///
/// Admin-only (enforced by middleware). The rule must be whitelisted in
/// the rule-secrets map; the provider's response is returned as-is.
pub async fn trigger_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let secret = state
        .rule_secrets
        .get(&rule_id)
        .ok_or_else(|| ApiError::Forbidden("rule not whitelisted".to_string()))?;

    let body = state
        .provider
        .trigger_rule(&rule_id, secret.expose_secret())
        .await?;
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn matches_query(account: &Account, query: &str) -> bool {
    query.is_empty()
        || query == "balances"
        || query == "accounts"
        || account.name.to_lowercase().contains(query)
        || account.id.to_lowercase().contains(query)
}

fn search_result(account: &Account) -> SearchResult {
    // Balance may be absent when the provider had trouble reading it.
    let title = match account.balance.as_ref().and_then(|b| b.amount_in_dollars) {
        Some(amount) => format!("{} — ${amount}", account.name),
        None => account.name.clone(),
    };
    SearchResult {
        id: account.id.clone(),
        title,
        url: account_url(&account.id),
    }
}

fn account_url(id: &str) -> String {
    format!("{APP_URL_BASE}/accounts/{id}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
