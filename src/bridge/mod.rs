//! Host bridge: session lifecycle notifications for in-process observers and
//! for an embedding native shell.
//!
//! In-process events are always dispatched. The host channel, when present,
//! additionally receives the serialized credentials.

mod channel;
mod events;
mod external;

use std::sync::Arc;

use tracing::warn;

pub use channel::{HostMessage, MpscChannel, OutboundChannel, StdoutChannel};
pub use events::{EventBus, LogoutReason, SessionEvent, Subscription};
pub use external::ExternalCredential;

use crate::session::SessionRecord;

#[derive(Clone, Default)]
pub struct HostBridge {
    channel: Option<Arc<dyn OutboundChannel>>,
    events: EventBus,
}

impl HostBridge {
    pub fn new(channel: Option<Arc<dyn OutboundChannel>>) -> Self {
        Self {
            channel,
            events: EventBus::new(),
        }
    }

    /// Whether an embedding host is attached.
    pub fn is_host_context(&self) -> bool {
        self.channel.is_some()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// `post_to_host` is false when the host itself supplied the credential.
    pub fn notify_login(&self, record: &SessionRecord, post_to_host: bool) {
        if post_to_host {
            self.post(HostMessage::Login {
                credentials: record.credentials.clone(),
            });
        }
        self.events.emit(&SessionEvent::LoggedIn {
            subject: record.subject(),
        });
    }

    pub fn notify_refreshed(&self, record: &SessionRecord) {
        self.post(HostMessage::Refreshed {
            credentials: record.credentials.clone(),
        });
        self.events.emit(&SessionEvent::Refreshed {
            expires_at: record.expires_at,
        });
    }

    pub fn notify_logout(&self, reason: LogoutReason) {
        self.post(HostMessage::Logout { reason });
        self.events.emit(&SessionEvent::LoggedOut { reason });
    }

    fn post(&self, message: HostMessage) {
        if let Some(channel) = &self.channel {
            if let Err(e) = channel.send(&message) {
                warn!("Failed to notify host: {e}");
            }
        }
    }
}
