//! Natural-language understanding collaborator.
//!
//! The pipeline only needs one thing from NLU: a refined search string. The
//! provider returns a full intent/entity graph ([`NluResult`]); the
//! [`EntityExtractor`] picks the refined query out of it by path.

pub mod extract;
pub mod wit;

pub use extract::{lookup_path, EntityExtractor, RefinedQuery};
pub use wit::{WitClient, WitConfig};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where Wit.ai puts the built-in "wolfram search query" entity.
pub const DEFAULT_ENTITY_PATH: &str =
    "entities.wit$wolfram_search_query:wolfram_search_query.0.value";

#[derive(Debug, Error)]
pub enum NluError {
    #[error("NLU request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("NLU provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("NLU result could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One candidate value for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMatch {
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Provider-specific fields (`id`, `role`, `start`, `end`, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Parsed utterance. Ordered maps keep serialization deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NluResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub intents: Vec<Intent>,
    /// Entity path -> candidates, best first
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<EntityMatch>>,
    #[serde(default)]
    pub traits: BTreeMap<String, serde_json::Value>,
}

#[async_trait]
pub trait NluProvider: Send + Sync {
    async fn parse(&self, text: &str) -> Result<NluResult, NluError>;
}
