use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::session::SessionPolicy;

/// Configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Local API ───────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,

    // ── Renewal ─────────────────────────────────────────────────────────
    /// How long before expiry to renew proactively.
    pub safety_margin: Duration,
    /// Response statuses that trigger a reactive renewal.
    pub auth_failure_status_codes: Vec<u16>,
    pub renewal_endpoint: String,
    /// Remote invalidation on logout; skipped when unset.
    pub logout_endpoint: Option<String>,
    /// Bound on renewal and invalidation calls.
    pub renewal_timeout: Duration,

    // ── Storage ─────────────────────────────────────────────────────────
    pub session_dir: PathBuf,
    pub cookie_path: String,
    /// Write the cookie-visible tier regardless of the keep-session choice.
    pub cookie_always: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8421,
            safety_margin: Duration::from_secs(300),
            auth_failure_status_codes: vec![401],
            renewal_endpoint: "http://localhost:8080/api/auth/refresh".into(),
            logout_endpoint: Some("http://localhost:8080/api/auth/logout".into()),
            renewal_timeout: Duration::from_secs(10),
            session_dir: default_session_dir(),
            cookie_path: "/".into(),
            cookie_always: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        Ok(Config {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8421".into())
                .parse()
                .context("Invalid PORT")?,

            safety_margin: Duration::from_secs(
                std::env::var("SAFETY_MARGIN")
                    .unwrap_or_else(|_| "300".into())
                    .parse()
                    .context("Invalid SAFETY_MARGIN (seconds)")?,
            ),
            auth_failure_status_codes: match std::env::var("AUTH_FAILURE_STATUS_CODES") {
                Ok(raw) => parse_status_codes(&raw)?,
                Err(_) => defaults.auth_failure_status_codes,
            },
            renewal_endpoint: match std::env::var("RENEWAL_ENDPOINT") {
                Ok(raw) => {
                    Url::parse(&raw).context("Invalid RENEWAL_ENDPOINT")?;
                    raw
                }
                Err(_) => defaults.renewal_endpoint,
            },
            logout_endpoint: match std::env::var("LOGOUT_ENDPOINT") {
                Ok(raw) if raw.is_empty() => None,
                Ok(raw) => {
                    Url::parse(&raw).context("Invalid LOGOUT_ENDPOINT")?;
                    Some(raw)
                }
                Err(_) => defaults.logout_endpoint,
            },
            renewal_timeout: Duration::from_secs(
                std::env::var("RENEWAL_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".into())
                    .parse()
                    .context("Invalid RENEWAL_TIMEOUT_SECS")?,
            ),

            session_dir: std::env::var("SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_dir),
            cookie_path: std::env::var("COOKIE_PATH").unwrap_or(defaults.cookie_path),
            cookie_always: match std::env::var("COOKIE_ALWAYS") {
                Ok(raw) => parse_bool(&raw).context("Invalid COOKIE_ALWAYS")?,
                Err(_) => defaults.cookie_always,
            },
        })
    }

    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            cookie_always: self.cookie_always,
        }
    }

    pub fn is_auth_failure(&self, status: u16) -> bool {
        self.auth_failure_status_codes.contains(&status)
    }
}

fn default_session_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".storefront-session")
}

/// Parse a comma-separated status list such as `"401, 419"`.
pub fn parse_status_codes(raw: &str) -> Result<Vec<u16>> {
    let codes = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u16>()
                .ok()
                .filter(|code| (100..=599).contains(code))
                .with_context(|| format!("Invalid status code '{s}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    if codes.is_empty() {
        anyhow::bail!("AUTH_FAILURE_STATUS_CODES must list at least one status");
    }
    Ok(codes)
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{other}'"),
    }
}
