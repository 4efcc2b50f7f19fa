use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Claims carried in the payload segment of a compact bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identifier), if the issuer includes one.
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry, epoch seconds.
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Decode a token's claims without checking its signature.
pub fn decode(token: &str) -> Result<Claims, SessionError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(SessionError::MalformedToken("expected three segments".into()));
    }

    // Some issuers keep the padding on the payload segment.
    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|_| SessionError::MalformedToken("invalid base64 in payload".into()))?;

    serde_json::from_slice(&payload_bytes)
        .map_err(|e| SessionError::MalformedToken(format!("invalid payload: {e}")))
}

/// A token is expired once `now` reaches its `exp`.
pub fn is_expired(claims: &Claims, now: i64) -> bool {
    claims.exp <= now
}

/// Expiry of `token` in epoch seconds, or `0` if it cannot be decoded.
pub fn expires_at(token: &str) -> i64 {
    match decode(token) {
        Ok(claims) => claims.exp,
        Err(e) => {
            tracing::debug!("Treating undecodable token as expired: {e}");
            0
        }
    }
}
