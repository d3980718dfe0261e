//! Error types for agent-msg.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{op} failed for agent '{agent}' at {}: {source}", .path.display())]
    Filesystem {
        op: &'static str,
        agent: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed envelope {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Relay connection to {endpoint} failed: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("Agent '{agent}' is not connected to a relay")]
    NotConnected { agent: String },

    #[error("Invalid agent name: {0:?}")]
    InvalidAgentName(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn filesystem(
        op: &'static str,
        agent: &str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Filesystem {
            op,
            agent: agent.to_string(),
            path: path.into(),
            source,
        }
    }

    /// Whether this error describes a missing relay connection.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected { .. })
    }
}
