use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::command::{CommandDefinition, CommandPattern, CommandRequest};
use super::events::{CommandEvent, EventBus};
use super::{InboundMessage, MessageSource, TransportError};

const INBOUND_QUEUE: usize = 64;
const HELP_COMMAND: &str = "help";

struct RegisteredCommand {
    pattern: CommandPattern,
    definition: CommandDefinition,
}

/// Command registry and dispatcher.
///
/// Commands are tried in registration order and the first match wins. Every
/// matched invocation runs on its own task; handlers share nothing beyond
/// what they captured at registration.
pub struct Bot {
    commands: Vec<RegisteredCommand>,
    events: EventBus,
}

impl Bot {
    pub fn new(event_buffer: usize) -> Self {
        Self {
            commands: Vec::new(),
            events: EventBus::new(event_buffer),
        }
    }

    pub fn command(
        &mut self,
        pattern: &str,
        definition: CommandDefinition,
    ) -> Result<(), TransportError> {
        let pattern = CommandPattern::parse(pattern)?;
        info!("[Bot] Registered command '{}'", pattern.as_str());
        self.commands.push(RegisteredCommand {
            pattern,
            definition,
        });
        Ok(())
    }

    /// Subscribe to the stream of matched command invocations.
    pub fn command_events(&self) -> broadcast::Receiver<CommandEvent> {
        self.events.subscribe()
    }

    pub fn help_text(&self) -> String {
        let mut text = String::from("*Commands*");
        for command in &self.commands {
            text.push_str(&format!(
                "\n• `{}` - {}",
                command.pattern.as_str(),
                command.definition.description
            ));
            if !command.definition.example.is_empty() {
                text.push_str(&format!("\n  _Example:_ {}", command.definition.example));
            }
        }
        text
    }

    /// Route one inbound message. Returns the spawned task when something
    /// matched, `None` when the message was ignored.
    pub fn dispatch(
        &self,
        message: InboundMessage,
        cancel: &CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let InboundMessage {
            text,
            event,
            writer,
        } = message;

        if text.trim().eq_ignore_ascii_case(HELP_COMMAND) {
            let help = self.help_text();
            return Some(tokio::spawn(async move {
                if let Err(e) = writer.reply(&help).await {
                    error!("[Bot] Failed to send help: {}", e);
                }
            }));
        }

        let Some((command, params)) = self
            .commands
            .iter()
            .find_map(|c| c.pattern.matches(&text).map(|params| (c, params)))
        else {
            debug!("[Bot] No command matched in channel {}", event.channel_id);
            return None;
        };

        let request = CommandRequest {
            command: command.pattern.as_str().to_string(),
            params,
            timestamp: Utc::now(),
            event,
        };
        self.events.publish(CommandEvent {
            timestamp: request.timestamp,
            command: request.command.clone(),
            parameters: request.params.clone(),
            event: request.event.clone(),
        });

        let handler = command.definition.handler.clone();
        let cancel = cancel.clone();
        let command_name = request.command.clone();
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("[Bot] Dropped in-flight '{}' on shutdown", command_name);
                }
                _ = handler.handle(request, writer) => {}
            }
        }))
    }

    /// Pump messages from `source` into handlers until the source ends or
    /// `cancel` fires. A source error is returned to the caller.
    pub async fn listen(
        &self,
        source: Arc<dyn MessageSource>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        let (tx, mut rx) = mpsc::channel(INBOUND_QUEUE);
        let source_cancel = cancel.clone();
        let source_task = tokio::spawn(async move { source.run(tx, source_cancel).await });

        info!("[Bot] Listening with {} commands", self.commands.len());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Bot] Shutdown requested, no longer accepting commands");
                    break;
                }
                message = rx.recv() => match message {
                    Some(message) => {
                        self.dispatch(message, &cancel);
                    }
                    None => break,
                },
            }
        }

        // Wakes a source parked on a full intake queue.
        drop(rx);
        match source_task.await {
            Ok(result) => result,
            Err(e) => Err(TransportError::Connection(format!(
                "message source task failed: {}",
                e
            ))),
        }
    }
}
