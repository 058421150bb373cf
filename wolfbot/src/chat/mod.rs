//! Chat transport: command patterns, dispatch, event stream and the Slack
//! Socket Mode connector.
//!
//! A [`MessageSource`] turns raw chat traffic into [`InboundMessage`]s. The
//! [`Bot`] matches each message against the registered command patterns and
//! runs the matching handler on its own task, handing it a
//! [`ResponseWriter`] bound to the originating conversation.

pub mod bot;
pub mod command;
pub mod events;
pub mod slack;

pub use bot::Bot;
pub use command::{CommandDefinition, CommandHandler, CommandPattern, CommandRequest};
pub use events::{spawn_event_logger, CommandEvent, EventBus, EventLogStats};
pub use slack::{SlackConfig, SlackSocketMode};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid command pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Transport request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API error: {0}")]
    Api(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Where a message came from. Opaque to the pipeline, kept for replies and logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub channel_id: String,
    pub user_id: Option<String>,
    pub ts: Option<String>,
    pub thread_ts: Option<String>,
    /// Provider event payload as received
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Reply channel for a single inbound message.
#[async_trait]
pub trait ResponseWriter: Send + Sync {
    async fn reply(&self, text: &str) -> Result<(), TransportError>;
}

pub struct InboundMessage {
    pub text: String,
    pub event: EventMetadata,
    pub writer: Arc<dyn ResponseWriter>,
}

/// Long-lived connection producing inbound messages until cancelled or broken.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn run(
        &self,
        inbound: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError>;
}
