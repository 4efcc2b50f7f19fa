//! Calls to the auth server's renewal and invalidation routes.
//!
//! These calls never pass through the retry gate.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::SessionError;
use crate::session::CredentialPair;

/// Server side of session renewal.
#[async_trait]
pub trait RenewalClient: Send + Sync {
    /// Exchange a refresh token for a new credential pair. A response without
    /// a refresh token means the old one stays valid.
    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, SessionError>;

    /// Best-effort server-side invalidation of an access token.
    async fn invalidate(&self, _access_token: &str) -> Result<(), SessionError> {
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenewalRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenewalResponse {
    #[serde(alias = "access_token")]
    access_token: String,
    #[serde(default, alias = "refresh_token")]
    refresh_token: Option<String>,
}

/// [`RenewalClient`] over HTTP.
pub struct HttpRenewalClient {
    renewal_endpoint: Url,
    logout_endpoint: Option<Url>,
    http: reqwest::Client,
}

impl HttpRenewalClient {
    pub fn new(
        renewal_endpoint: &str,
        logout_endpoint: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, SessionError> {
        let renewal_endpoint = parse_endpoint(renewal_endpoint)?;
        let logout_endpoint = logout_endpoint.map(parse_endpoint).transpose()?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            renewal_endpoint,
            logout_endpoint,
            http,
        })
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, SessionError> {
    Url::parse(raw).map_err(|e| SessionError::Internal(format!("Invalid endpoint '{raw}': {e}")))
}

#[async_trait]
impl RenewalClient for HttpRenewalClient {
    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, SessionError> {
        let resp = self
            .http
            .post(self.renewal_endpoint.clone())
            .json(&RenewalRequest { refresh_token })
            .send()
            .await
            .map_err(|e| SessionError::RenewalNetworkFailure(format!("Renewal request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    SessionError::RenewalRejected(format!("{status}: {body}"))
                }
                _ => SessionError::RenewalNetworkFailure(format!("{status}: {body}")),
            });
        }

        let renewed: RenewalResponse = resp.json().await.map_err(|e| {
            SessionError::RenewalNetworkFailure(format!("Failed to parse renewal response: {e}"))
        })?;

        Ok(CredentialPair::new(
            renewed.access_token,
            renewed.refresh_token.filter(|r| !r.is_empty()),
        ))
    }

    async fn invalidate(&self, access_token: &str) -> Result<(), SessionError> {
        let Some(endpoint) = &self.logout_endpoint else {
            return Ok(());
        };

        let resp = self
            .http
            .post(endpoint.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SessionError::Transport(format!(
                "Logout endpoint returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
