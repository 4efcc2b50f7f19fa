//! Outbound channel to an embedding native shell.

use std::io::Write;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::LogoutReason;
use crate::session::CredentialPair;

/// Message posted to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Login { credentials: CredentialPair },
    Refreshed { credentials: CredentialPair },
    Logout { reason: LogoutReason },
}

pub trait OutboundChannel: Send + Sync {
    fn send(&self, message: &HostMessage) -> Result<()>;
}

/// Forwards messages to an in-process receiver.
pub struct MpscChannel {
    tx: mpsc::UnboundedSender<HostMessage>,
}

impl MpscChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutboundChannel for MpscChannel {
    fn send(&self, message: &HostMessage) -> Result<()> {
        self.tx
            .send(message.clone())
            .map_err(|_| anyhow::anyhow!("host receiver closed"))
    }
}

/// Writes one JSON message per line to stdout, for a parent shell reading
/// this process's output.
pub struct StdoutChannel;

impl OutboundChannel for StdoutChannel {
    fn send(&self, message: &HostMessage) -> Result<()> {
        let line = serde_json::to_string(message)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}").context("Failed to write host message")?;
        stdout.flush()?;
        Ok(())
    }
}
