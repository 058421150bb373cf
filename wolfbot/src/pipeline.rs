//! Per-request pipeline: extract -> query -> format -> reply.
//!
//! Two commands share the pipeline and differ only in the knowledge query
//! mode. The full-report command sends an interim acknowledgement first.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::chat::{Bot, CommandDefinition, CommandHandler, CommandRequest, ResponseWriter, TransportError};
use crate::error::PipelineResult;
use crate::format::{format_answer, Reply};
use crate::knowledge::{KnowledgeQueryEngine, QueryMode};
use crate::nlu::EntityExtractor;

pub const SPOKEN_COMMAND: &str = "query for bot - <message>";
pub const FULL_COMMAND: &str = "full query for bot - <message>";
pub const MESSAGE_PARAM: &str = "message";
pub const THINKING_REPLY: &str = "Thinking...";

/// Collaborator handles built once at startup and shared read-only.
pub struct QueryPipeline {
    extractor: EntityExtractor,
    engine: KnowledgeQueryEngine,
}

impl QueryPipeline {
    pub fn new(extractor: EntityExtractor, engine: KnowledgeQueryEngine) -> Self {
        Self { extractor, engine }
    }

    pub async fn run(&self, mode: QueryMode, message: &str) -> PipelineResult<Reply> {
        let refined = self.extractor.extract(message).await?;
        info!(
            "[Pipeline] {:?} query '{}' (from entity: {})",
            mode,
            refined,
            refined.from_entity()
        );
        let answer = self.engine.query(mode, refined.as_str()).await?;
        Ok(format_answer(&answer))
    }
}

/// Handler for one of the two query commands.
pub struct QueryHandler {
    pipeline: Arc<QueryPipeline>,
    mode: QueryMode,
}

impl QueryHandler {
    pub fn new(pipeline: Arc<QueryPipeline>, mode: QueryMode) -> Self {
        Self { pipeline, mode }
    }
}

#[async_trait]
impl CommandHandler for QueryHandler {
    async fn handle(&self, request: CommandRequest, response: Arc<dyn ResponseWriter>) {
        let message = request.param(MESSAGE_PARAM);

        if self.mode == QueryMode::Full {
            if let Err(e) = response.reply(THINKING_REPLY).await {
                warn!("[Pipeline] Failed to send interim reply: {}", e);
            }
        }

        let reply = match self.pipeline.run(self.mode, message).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[Pipeline] {:?} query failed: {}", self.mode, e);
                Reply::new(e.user_message(self.mode))
            }
        };

        if let Err(e) = response.reply(reply.as_str()).await {
            error!("[Pipeline] Failed to deliver reply: {}", e);
        }
    }
}

/// Register the spoken and full query commands on `bot`.
pub fn register_commands(bot: &mut Bot, pipeline: Arc<QueryPipeline>) -> Result<(), TransportError> {
    bot.command(
        SPOKEN_COMMAND,
        CommandDefinition {
            description: "send any question to wolfram".to_string(),
            example: "who is the president of india".to_string(),
            handler: Arc::new(QueryHandler::new(pipeline.clone(), QueryMode::Spoken)),
        },
    )?;
    bot.command(
        FULL_COMMAND,
        CommandDefinition {
            description: "send any question to wolfram for a full report".to_string(),
            example: "weather in new york".to_string(),
            handler: Arc::new(QueryHandler::new(pipeline, QueryMode::Full)),
        },
    )?;
    Ok(())
}
