//! CLI commands for agent-msg using clap.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{load_settings, resolve_home_dir, HOME_ENV};
use crate::messenger::Messenger;

/// agent-msg - mailboxes and live relay messaging between agents.
#[derive(Parser)]
#[command(name = "agent-msg")]
#[command(version)]
#[command(about = "Exchange messages between agents through mailboxes or a relay", long_about = None)]
pub struct Commands {
    /// Mailbox root directory
    #[arg(long, global = true, env = HOME_ENV)]
    pub home: Option<PathBuf>,

    /// Print library debug output on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deposit a message in another agent's inbox
    Send {
        /// Sending agent
        from: String,
        /// Receiving agent
        to: String,
        /// Message text
        message: String,
    },

    /// Read an agent's inbox
    Inbox {
        /// Agent whose inbox to read
        agent: String,

        /// Leave messages in the inbox after reading
        #[arg(long)]
        keep: bool,
    },

    /// Connect to a relay and print pushed messages until interrupted
    Listen {
        /// Agent to connect as
        agent: String,

        /// Relay URL (ws://host:port)
        #[arg(long)]
        url: Option<String>,
    },

    /// Push one message over a relay
    Push {
        /// Sending agent
        from: String,
        /// Receiving agent
        to: String,
        /// Message text
        message: String,

        /// Relay URL (ws://host:port)
        #[arg(long)]
        url: Option<String>,
    },
}

impl Commands {
    /// Mailbox root chosen by `--home`, `AGENT_MSG_HOME` or the default.
    pub fn home_dir(&self) -> Result<PathBuf> {
        Ok(resolve_home_dir(self.home.clone())?)
    }

    pub async fn run(self) -> Result<()> {
        let root = self.home_dir()?;
        let settings = load_settings(&root)?;

        match self.command {
            Command::Send { from, to, message } => {
                let messenger = Messenger::new(from, &root)?;
                let id = messenger
                    .send(&to, &message)
                    .with_context(|| format!("Failed to send message to {}", to))?;
                println!("Message sent to {} ({})", to, id);
            }

            Command::Inbox { agent, keep } => {
                let messenger = Messenger::new(agent, &root)?;
                let delete = settings.delete_after_read && !keep;
                let report = messenger.check_inbox(delete).with_context(|| {
                    format!("Failed to read inbox of {}", messenger.agent_name())
                })?;

                if report.is_empty() {
                    println!("No messages for {}", messenger.agent_name());
                }
                for envelope in &report.envelopes {
                    println!("[{}] {}: {}", envelope.timestamp, envelope.from, envelope.message);
                }
                for error in &report.errors {
                    eprintln!("Warning: {}", error);
                }
            }

            Command::Listen { agent, url } => {
                let url = settings.relay_url_or(url)?;
                let messenger = Messenger::new(agent, &root)?;
                messenger.on_relay_message(|msg| {
                    println!("[{}]: {}", msg.from, msg.message);
                });
                messenger.connect_relay(&url).await?;
                println!("Listening as {} on {} (Ctrl-C to stop)", messenger.agent_name(), url);

                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        messenger.close_relay().await;
                    }
                    _ = messenger.relay().closed() => {
                        println!("Relay closed the connection");
                    }
                }
            }

            Command::Push { from, to, message, url } => {
                let url = settings.relay_url_or(url)?;
                let messenger = Messenger::new(from, &root)?;
                messenger.connect_relay(&url).await?;
                messenger
                    .send_relay(&to, &message)
                    .await
                    .with_context(|| format!("Failed to push message to {}", to))?;
                messenger.close_relay().await;
                println!("Message pushed to {}", to);
            }
        }

        Ok(())
    }
}
