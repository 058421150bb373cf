//! Command event stream for observability.
//!
//! Events travel over a bounded `tokio::sync::broadcast` queue. Publishing
//! never waits: when a subscriber falls more than `capacity` events behind,
//! the oldest events are overwritten and the subscriber is told how many it
//! missed. Reply delivery is therefore never slowed by a stalled logger.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::EventMetadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEvent {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub parameters: HashMap<String, String>,
    pub event: EventMetadata,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CommandEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Fire and forget. Having no subscriber is not an error.
    pub fn publish(&self, event: CommandEvent) {
        if self.sender.send(event).is_err() {
            debug!("[Events] No subscriber for command event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommandEvent> {
        self.sender.subscribe()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventLogStats {
    pub logged: u64,
    pub dropped: u64,
}

/// Drain `events` into the log until cancelled or the bus is gone.
pub fn spawn_event_logger(
    mut events: broadcast::Receiver<CommandEvent>,
    cancel: CancellationToken,
) -> JoinHandle<EventLogStats> {
    tokio::spawn(async move {
        let mut stats = EventLogStats::default();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        stats.logged += 1;
                        info!(
                            timestamp = %event.timestamp,
                            command = %event.command,
                            parameters = ?event.parameters,
                            channel = %event.event.channel_id,
                            user = ?event.event.user_id,
                            "[Events] Command event"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        stats.dropped += missed;
                        warn!("[Events] Logger fell behind, dropped {} oldest events", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!(
            "[Events] Logger stopped ({} logged, {} dropped)",
            stats.logged, stats.dropped
        );
        stats
    })
}
