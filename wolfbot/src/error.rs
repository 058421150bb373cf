//! Request-scoped failure taxonomy for the question pipeline.
//!
//! Collaborator-level errors (`NluError`, `KnowledgeError`, `TransportError`)
//! live next to their adapters. They collapse into [`PipelineError`] at the
//! pipeline seam, and every variant maps to a fixed user-facing reply.

use thiserror::Error;

use crate::knowledge::QueryMode;

pub const NLU_UNAVAILABLE_REPLY: &str = "Sorry, I'm having trouble understanding right now.";
pub const SPOKEN_UNAVAILABLE_REPLY: &str = "Sorry, I couldn't get an answer from Wolfram Alpha.";
pub const FULL_UNAVAILABLE_REPLY: &str = "Sorry, I couldn't get a full report from Wolfram Alpha.";
pub const NO_ANSWER_REPLY: &str = "Sorry, Wolfram Alpha couldn't find an answer for that.";

/// Failure of a single request. None of these are fatal to the process.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The NLU call, or serialization of its result, failed.
    #[error("NLU unavailable: {0}")]
    NluUnavailable(String),

    /// The knowledge engine could not be reached or answered with garbage.
    #[error("Knowledge engine unavailable: {0}")]
    KnowledgeUnavailable(String),

    /// The knowledge engine answered, but with nothing we can render.
    #[error("Knowledge engine found no answer")]
    KnowledgeNoAnswer,
}

impl PipelineError {
    /// Fixed reply text shown to the user for this failure.
    pub fn user_message(&self, mode: QueryMode) -> &'static str {
        match (self, mode) {
            (PipelineError::NluUnavailable(_), _) => NLU_UNAVAILABLE_REPLY,
            (PipelineError::KnowledgeUnavailable(_), QueryMode::Spoken) => SPOKEN_UNAVAILABLE_REPLY,
            (PipelineError::KnowledgeUnavailable(_), QueryMode::Full) => FULL_UNAVAILABLE_REPLY,
            (PipelineError::KnowledgeNoAnswer, _) => NO_ANSWER_REPLY,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message_depends_on_mode() {
        let err = PipelineError::KnowledgeUnavailable("timeout".to_string());
        assert_eq!(err.user_message(QueryMode::Spoken), SPOKEN_UNAVAILABLE_REPLY);
        assert_eq!(err.user_message(QueryMode::Full), FULL_UNAVAILABLE_REPLY);
    }

    #[test]
    fn test_every_failure_kind_has_distinct_text() {
        let nlu = PipelineError::NluUnavailable("down".to_string());
        let none = PipelineError::KnowledgeNoAnswer;
        assert_ne!(nlu.user_message(QueryMode::Full), none.user_message(QueryMode::Full));
        assert_ne!(
            none.user_message(QueryMode::Full),
            FULL_UNAVAILABLE_REPLY
        );
    }
}
