//! Sequence API integration.
//!
//! Calls the Sequence remote API for account data and rule triggers.
//! Auth: `x-sequence-access-token: Bearer {token}` for account reads,
//! `x-sequence-signature: Bearer {secret}` for rule triggers (one secret
//! per rule).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::{Account, AccountProvider, ProviderError};
use crate::config::ProviderConfig;

const PROVIDER_NAME: &str = "sequence";

// ---------------------------------------------------------------------------
// API response types (Sequence JSON -> Rust)
// ---------------------------------------------------------------------------

/// Sequence wraps account lists in a `data` envelope. Errors sometimes
/// arrive with the envelope missing or partial, so every layer defaults.
#[derive(Debug, Deserialize)]
struct AccountsEnvelope {
    #[serde(default)]
    data: Option<AccountsData>,
}

#[derive(Debug, Default, Deserialize)]
struct AccountsData {
    #[serde(default)]
    accounts: Vec<Account>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Sequence API client.
pub struct SequenceClient {
    http: Client,
    base_url: String,
    /// Access token for account reads. `None` means unconfigured; account
    /// calls fail per-request rather than preventing startup.
    access_token: Option<SecretString>,
}

impl SequenceClient {
    /// Create a new Sequence client from config plus the resolved token.
    pub fn new(config: &ProviderConfig, access_token: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent("sweepd/0.1.0 (account-facade)")
            .build()
            .context("Failed to build HTTP client for Sequence")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ProviderError::Upstream {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl AccountProvider for SequenceClient {
    /// Fetch all accounts visible to the access token.
    ///
    /// `POST /accounts` with an empty JSON body. A missing `data` or
    /// `accounts` field in the response is treated as an empty list.
    async fn fetch_accounts(&self) -> Result<Vec<Account>, ProviderError> {
        let token = self.access_token.as_ref().ok_or(ProviderError::MissingToken)?;

        let url = format!("{}/accounts", self.base_url);
        debug!(url = %url, "Fetching Sequence accounts");

        let resp = self
            .http
            .post(&url)
            .header(
                "x-sequence-access-token",
                format!("Bearer {}", token.expose_secret()),
            )
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let resp = Self::error_for_status(resp).await?;

        let envelope: AccountsEnvelope = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let accounts = envelope.data.map(|d| d.accounts).unwrap_or_default();
        info!(count = accounts.len(), "Sequence accounts fetched");
        Ok(accounts)
    }

    /// Trigger a rule via `POST /remote-api/rules/{id}/trigger`, signed
    /// with the rule's own API secret. The provider's JSON response is
    /// returned untransformed.
    async fn trigger_rule(
        &self,
        rule_id: &str,
        secret: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        let url = format!("{}/remote-api/rules/{rule_id}/trigger", self.base_url);
        debug!(url = %url, rule_id = %rule_id, "Triggering Sequence rule");

        let resp = self
            .http
            .post(&url)
            .header("x-sequence-signature", format!("Bearer {secret}"))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let resp = Self::error_for_status(resp).await?;

        let body = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        info!(rule_id = %rule_id, "Sequence rule triggered");
        Ok(body)
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> ProviderConfig {
        ProviderConfig {
            base_url: base_url.to_string(),
            access_token_env: "SEQUENCE_ACCESS_TOKEN".to_string(),
            timeout_secs: 20,
        }
    }

    #[test]
    fn test_new_client_without_token() {
        let client =
            SequenceClient::new(&test_config("https://api.getsequence.io"), None).unwrap();
        assert!(client.access_token.is_none());
        assert_eq!(client.name(), "sequence");
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client =
            SequenceClient::new(&test_config("https://api.getsequence.io/"), None).unwrap();
        assert_eq!(client.base_url, "https://api.getsequence.io");
    }

    #[tokio::test]
    async fn test_fetch_accounts_without_token_is_missing_token() {
        let client =
            SequenceClient::new(&test_config("https://api.getsequence.io"), None).unwrap();
        let err = client.fetch_accounts().await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingToken));
    }

    #[test]
    fn test_envelope_full() {
        let envelope: AccountsEnvelope = serde_json::from_str(
            r#"{"data": {"accounts": [{"id": "acc_1", "name": "Checking"}]}}"#,
        )
        .unwrap();
        let accounts = envelope.data.map(|d| d.accounts).unwrap_or_default();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, "acc_1");
    }

    #[test]
    fn test_envelope_missing_accounts() {
        let envelope: AccountsEnvelope = serde_json::from_str(r#"{"data": {}}"#).unwrap();
        assert!(envelope.data.map(|d| d.accounts).unwrap_or_default().is_empty());
    }

    #[test]
    fn test_envelope_missing_data() {
        let envelope: AccountsEnvelope =
            serde_json::from_str(r#"{"errors": ["upstream boom"]}"#).unwrap();
        assert!(envelope.data.map(|d| d.accounts).unwrap_or_default().is_empty());
    }
}
