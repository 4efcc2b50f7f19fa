//! Retry gate. Wraps the outgoing transport and recovers from the first
//! authentication failure of a request by renewing the session once and
//! replaying the request.

mod transport;

pub use transport::{HttpTransport, OutboundRequest, OutboundResponse, Transport};

use tracing::debug;

use crate::error::SessionError;
use crate::session::SessionManager;

pub struct RetryGate<T> {
    transport: T,
    session: SessionManager,
}

impl<T: Transport> RetryGate<T> {
    pub fn new(transport: T, session: SessionManager) -> Self {
        Self { transport, session }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `request` with the current bearer token.
    ///
    /// On an authentication failure the request is replayed exactly once with
    /// renewed credentials. Concurrent failures share one renewal. If renewal
    /// fails, the terminal renewal error is returned and the session is gone.
    pub async fn send(&self, mut request: OutboundRequest) -> Result<OutboundResponse, SessionError> {
        if request.bypasses_gate() {
            return self.transport.execute(&request).await;
        }

        let sent_with = self.session.bearer_token();
        request.set_bearer(sent_with.clone());
        let response = self.transport.execute(&request).await?;

        if request.is_retried() || !self.session.config().is_auth_failure(response.status.as_u16()) {
            return Ok(response);
        }
        request.mark_retried();

        let token = match self.session.bearer_token() {
            // Renewed while this request was in flight.
            Some(current) if sent_with.as_ref() != Some(&current) => current,
            // Anonymous request; nothing to renew.
            None if sent_with.is_none() => return Ok(response),
            _ => {
                debug!("{} on {}, renewing session", response.status, request.url());
                self.session.renew().await?.credentials.access_token
            }
        };

        request.set_bearer(Some(token));
        self.transport.execute(&request).await
    }
}
