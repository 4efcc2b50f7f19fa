use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::session::CredentialPair;
use crate::token::{self, Claims};

/// Credential pushed in by the host after its own native login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCredential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
}

impl ExternalCredential {
    /// Check the payload's shape and return the decoded claims.
    ///
    /// An expired access token is accepted only when a refresh token comes
    /// with it, since it can then be renewed right away.
    pub fn validate(&self) -> Result<Claims, SessionError> {
        if self.access_token.trim().is_empty() {
            return Err(SessionError::InvalidCredential("access token is empty".into()));
        }

        let claims = token::decode(&self.access_token)
            .map_err(|e| SessionError::InvalidCredential(e.to_string()))?;

        if let (Some(expected), Some(actual)) = (&self.subject_id, &claims.sub) {
            if expected != actual {
                return Err(SessionError::InvalidCredential(format!(
                    "subject mismatch: payload says {expected}, token says {actual}"
                )));
            }
        }

        let has_refresh = self.refresh_token.as_deref().is_some_and(|r| !r.is_empty());
        if token::is_expired(&claims, Utc::now().timestamp()) && !has_refresh {
            return Err(SessionError::InvalidCredential(
                "access token expired and no refresh token given".into(),
            ));
        }

        Ok(claims)
    }

    pub fn into_credentials(self) -> CredentialPair {
        let refresh = self.refresh_token.filter(|r| !r.is_empty());
        CredentialPair::new(self.access_token, refresh)
    }
}
