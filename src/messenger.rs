//! One agent's view of both delivery channels.

use std::path::PathBuf;

use crate::error::Result;
use crate::protocol::{DrainReport, Envelope, Mailbox, RelayMessage};
use crate::relay::{ConnectionState, RelayClient};

/// Binds a [`Mailbox`] and a [`RelayClient`] to one agent name.
///
/// Every method targets exactly one channel. Nothing here falls back from
/// the relay to the mailbox or the other way round: durable delivery goes
/// through [`Messenger::send`], live delivery through
/// [`Messenger::send_relay`].
#[derive(Debug)]
pub struct Messenger {
    agent: String,
    mailbox: Mailbox,
    relay: RelayClient,
}

impl Messenger {
    /// Create a messenger for `agent` storing mail under `root`.
    pub fn new(agent: impl Into<String>, root: impl Into<PathBuf>) -> Result<Self> {
        let agent = agent.into();
        let mailbox = Mailbox::new(root);
        mailbox.inbox_dir(&agent)?;

        Ok(Self {
            relay: RelayClient::new(agent.clone()),
            agent,
            mailbox,
        })
    }

    pub fn agent_name(&self) -> &str {
        &self.agent
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn relay(&self) -> &RelayClient {
        &self.relay
    }

    pub fn ensure_directories(&self) -> Result<()> {
        self.mailbox.ensure_directories(&self.agent)
    }

    /// Deposit a message in `to`'s inbox. Returns the envelope id.
    pub fn send(&self, to: &str, message: &str) -> Result<String> {
        let envelope = Envelope::new(self.agent.as_str(), to, message);
        self.mailbox.deposit(to, &envelope)
    }

    /// Read this agent's pending mail.
    pub fn check_inbox(&self, delete_after_read: bool) -> Result<DrainReport> {
        self.mailbox.drain(&self.agent, delete_after_read)
    }

    pub async fn connect_relay(&self, endpoint: &str) -> Result<()> {
        self.relay.connect(endpoint).await
    }

    pub fn on_relay_message<F>(&self, handler: F)
    where
        F: Fn(RelayMessage) + Send + Sync + 'static,
    {
        self.relay.on_message(handler);
    }

    /// Push a message over the relay. Fails if not connected.
    pub async fn send_relay(&self, to: &str, message: &str) -> Result<()> {
        self.relay.send(to, message).await
    }

    pub async fn close_relay(&self) {
        self.relay.close().await;
    }

    pub fn relay_state(&self) -> ConnectionState {
        self.relay.state()
    }
}
