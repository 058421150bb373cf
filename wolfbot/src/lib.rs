//! wolfbot - answers chat questions with a computational knowledge engine.
//!
//! A question arrives as a chat command, is refined by an NLU provider,
//! sent to the knowledge engine in spoken or full-report mode, and the
//! result is rendered back into a single chat reply.

pub mod chat;
pub mod config;
pub mod error;
pub mod format;
pub mod knowledge;
pub mod nlu;
pub mod pipeline;

pub use error::{PipelineError, PipelineResult};
pub use format::Reply;
pub use pipeline::{register_commands, QueryHandler, QueryPipeline};
