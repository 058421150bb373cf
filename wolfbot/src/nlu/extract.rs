//! Entity extraction with fallback to the user's own words.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{NluError, NluProvider};
use crate::error::{PipelineError, PipelineResult};

/// The string actually sent to the knowledge engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinedQuery {
    text: String,
    from_entity: bool,
}

impl RefinedQuery {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// True when the text came from the NLU entity rather than the fallback.
    pub fn from_entity(&self) -> bool {
        self.from_entity
    }
}

impl fmt::Display for RefinedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub struct EntityExtractor {
    provider: Arc<dyn NluProvider>,
    entity_path: String,
}

impl EntityExtractor {
    pub fn new(provider: Arc<dyn NluProvider>, entity_path: impl Into<String>) -> Self {
        Self {
            provider,
            entity_path: entity_path.into(),
        }
    }

    /// Turn the raw user query into the search string for the knowledge engine.
    ///
    /// Fails only when the NLU call itself fails. When the expected entity is
    /// missing (or empty) the original query is returned unchanged.
    pub async fn extract(&self, user_query: &str) -> PipelineResult<RefinedQuery> {
        let parsed = self.provider.parse(user_query).await.map_err(|e| {
            warn!("[Extractor] NLU call failed: {}", e);
            PipelineError::NluUnavailable(e.to_string())
        })?;

        let document = serde_json::to_value(&parsed)
            .map_err(NluError::from)
            .map_err(|e| {
                warn!("[Extractor] Failed to serialize NLU result: {}", e);
                PipelineError::NluUnavailable(e.to_string())
            })?;

        match lookup_path(&document, &self.entity_path).and_then(string_form) {
            Some(value) => {
                debug!("[Extractor] Refined '{}' -> '{}'", user_query, value);
                Ok(RefinedQuery {
                    text: value,
                    from_entity: true,
                })
            }
            None => {
                debug!(
                    "[Extractor] No entity at '{}', using original query",
                    self.entity_path
                );
                Ok(RefinedQuery {
                    text: user_query.to_string(),
                    from_entity: false,
                })
            }
        }
    }
}

/// Resolve a dot-separated path against a JSON document.
///
/// Segments index objects by exact, case-sensitive key and arrays by
/// decimal position. No wildcards, no escaping.
pub fn lookup_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// String form of an entity value. Null and empty strings count as absent.
fn string_form(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
