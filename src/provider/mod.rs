//! Provider integration.
//!
//! Defines the `AccountProvider` trait over the third-party account
//! service and the account data model, plus the Sequence implementation.

pub mod sequence;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures talking to the provider. Upstream errors carry the provider's
/// status and body untransformed so callers can forward them.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider access token not configured")]
    MissingToken,

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("failed to parse provider response: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Account model
// ---------------------------------------------------------------------------

/// A financial account as reported by the provider.
///
/// Only the fields the facade reads are typed; everything else is retained
/// in `extra` so `/mcp/fetch` can return the full record verbatim. Balances
/// may be absent when the provider had trouble reading the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(deserialize_with = "id_string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub balance: Option<AccountBalance>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    #[serde(default)]
    pub amount_in_dollars: Option<f64>,
    #[serde(default)]
    pub amount_in_cents: Option<i64>,
}

/// The provider reports some account ids as strings and some as numbers.
fn id_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "account id must be a string or number, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over the third-party account service.
///
/// The HTTP handlers depend on this trait so tests can substitute a
/// deterministic in-memory implementation.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    /// Fetch all accounts visible to the configured access token.
    async fn fetch_accounts(&self) -> Result<Vec<Account>, ProviderError>;

    /// Trigger a provider-side rule using its per-rule API secret.
    /// Returns the provider's JSON response as-is.
    async fn trigger_rule(
        &self,
        rule_id: &str,
        secret: &str,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Provider name for logging and identification.
    fn name(&self) -> &str;
}
