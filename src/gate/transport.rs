use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::SessionError;
use crate::store::CookieJar;

/// A request that can be sent more than once.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    bearer: Option<String>,
    retried: bool,
    bypass: bool,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            bearer: None,
            retried: false,
            bypass: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, url).json(body)
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send as-is: no bearer token, no renewal on failure.
    pub fn bypass_gate(mut self) -> Self {
        self.bypass = true;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub fn bypasses_gate(&self) -> bool {
        self.bypass
    }

    pub(crate) fn set_bearer(&mut self, bearer: Option<String>) {
        self.bearer = bearer;
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }
}

#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub body: String,
}

impl OutboundResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SessionError> {
        serde_json::from_str(&self.body)
            .map_err(|e| SessionError::Transport(format!("Invalid JSON response: {e}")))
    }
}

/// The wire underneath the retry gate.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &OutboundRequest) -> Result<OutboundResponse, SessionError>;
}

/// [`Transport`] over reqwest. Sends the cookie-visible tier with every
/// request when a jar is attached.
pub struct HttpTransport {
    http: reqwest::Client,
    cookie_jar: Option<Arc<CookieJar>>,
}

impl HttpTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            cookie_jar: None,
        }
    }

    pub fn with_cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &OutboundRequest) -> Result<OutboundResponse, SessionError> {
        let mut builder = self.http.request(request.method().clone(), request.url());

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = request.bearer() {
            builder = builder.bearer_auth(token);
        }
        if let Some(cookies) = self.cookie_jar.as_ref().and_then(|jar| jar.cookie_header()) {
            builder = builder.header(reqwest::header::COOKIE, cookies);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok(OutboundResponse { status, body })
    }
}
