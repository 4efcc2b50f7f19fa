use serde::{Deserialize, Serialize};

use crate::store::TierSet;
use crate::token;

/// Access token plus optional refresh token, as handed out by the auth server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

/// A persisted session: credentials, their expiry, and where they live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub credentials: CredentialPair,
    /// Epoch seconds, decoded from the access token. `0` if it does not decode.
    pub expires_at: i64,
    pub tiers: TierSet,
}

impl SessionRecord {
    pub fn new(credentials: CredentialPair, tiers: TierSet) -> Self {
        let expires_at = token::expires_at(&credentials.access_token);
        Self {
            credentials,
            expires_at,
            tiers,
        }
    }

    /// Same tiers, new credentials. Expiry is re-derived from the new token.
    pub fn renewed(&self, credentials: CredentialPair) -> Self {
        Self::new(credentials, self.tiers.clone())
    }

    pub fn access_token(&self) -> &str {
        &self.credentials.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.credentials.refresh_token.as_deref()
    }

    pub fn subject(&self) -> Option<String> {
        token::decode(self.access_token()).ok().and_then(|c| c.sub)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}
