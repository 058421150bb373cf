use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;

use super::{EventMetadata, ResponseWriter, TransportError};

/// Text command such as `query for bot - <message>`.
///
/// Literal words match case-insensitively with any run of whitespace between
/// them. `<name>` captures one word, except the last capture which takes the
/// rest of the line. The whole message must match.
#[derive(Debug, Clone)]
pub struct CommandPattern {
    source: String,
    regex: Regex,
    params: Vec<String>,
}

impl CommandPattern {
    pub fn parse(pattern: &str) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let tokens: Vec<&str> = pattern.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let last_param = tokens.iter().rposition(|t| t.starts_with('<'));
        let mut params = Vec::new();
        let mut seen = HashSet::new();
        let mut parts = Vec::with_capacity(tokens.len());

        for (i, token) in tokens.iter().enumerate() {
            if let Some(inner) = token.strip_prefix('<') {
                let name = inner
                    .strip_suffix('>')
                    .ok_or_else(|| invalid("unterminated parameter"))?;
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(invalid("parameter names must be alphanumeric"));
                }
                if !seen.insert(name.to_string()) {
                    return Err(invalid("duplicate parameter name"));
                }
                if Some(i) == last_param {
                    parts.push(format!(r"(?P<{}>\S.*?)", name));
                } else {
                    parts.push(format!(r"(?P<{}>\S+)", name));
                }
                params.push(name.to_string());
            } else {
                parts.push(regex::escape(token));
            }
        }

        let regex = Regex::new(&format!(r"(?is)^\s*{}\s*$", parts.join(r"\s+")))
            .map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            params,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Captured parameters when `text` matches the whole pattern.
    pub fn matches(&self, text: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(text)?;
        Some(
            self.params
                .iter()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|m| (name.clone(), m.as_str().trim().to_string()))
                })
                .collect(),
        )
    }
}

/// One matched command invocation. Read-only to handlers.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Pattern that matched
    pub command: String,
    pub params: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub event: EventMetadata,
}

impl CommandRequest {
    /// Captured parameter, or `""` when the pattern has no such capture.
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).map(String::as_str).unwrap_or("")
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, request: CommandRequest, response: Arc<dyn ResponseWriter>);
}

#[derive(Clone)]
pub struct CommandDefinition {
    pub description: String,
    pub example: String,
    pub handler: Arc<dyn CommandHandler>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_parameter_takes_rest_of_line() {
        let pattern = CommandPattern::parse("query for bot - <message>").unwrap();
        let params = pattern.matches("query for bot - capital of france").unwrap();
        assert_eq!(params["message"], "capital of france");

        let params = pattern.matches("  Query  for bot -   who is the president of india  ").unwrap();
        assert_eq!(params["message"], "who is the president of india");
    }

    #[test]
    fn test_match_is_anchored() {
        let spoken = CommandPattern::parse("query for bot - <message>").unwrap();
        let full = CommandPattern::parse("full query for bot - <message>").unwrap();

        assert!(spoken.matches("full query for bot - weather in new york").is_none());
        let params = full.matches("full query for bot - weather in new york").unwrap();
        assert_eq!(params["message"], "weather in new york");

        assert!(spoken.matches("query for bot - ").is_none());
        assert!(spoken.matches("query for bot").is_none());
    }

    #[test]
    fn test_trailing_parameter_needs_visible_text() {
        let pattern = CommandPattern::parse("query for bot - <message>").unwrap();
        assert!(pattern.matches("query for bot -    ").is_none());
        assert!(pattern.matches("query for bot - \t\n ").is_none());

        let params = pattern.matches("query for bot -  \n pi").unwrap();
        assert_eq!(params["message"], "pi");
    }

    #[test]
    fn test_inner_parameter_takes_one_word() {
        let pattern = CommandPattern::parse("convert <unit> <value>").unwrap();
        let params = pattern.matches("convert celsius 21 degrees").unwrap();
        assert_eq!(params["unit"], "celsius");
        assert_eq!(params["value"], "21 degrees");
    }

    #[test]
    fn test_literals_are_escaped() {
        let pattern = CommandPattern::parse("what is 2+2 <rest>").unwrap();
        assert!(pattern.matches("what is 2+2 really").is_some());
        assert!(pattern.matches("what is 22 really").is_none());
    }

    #[test]
    fn test_invalid_patterns() {
        for bad in ["", "   ", "ask <msg", "ask <>", "ask <a b>", "ask <x> <x>"] {
            assert!(CommandPattern::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_missing_param_is_empty() {
        let request = CommandRequest {
            command: "ping".to_string(),
            params: HashMap::new(),
            timestamp: Utc::now(),
            event: EventMetadata::default(),
        };
        assert_eq!(request.param("message"), "");
    }
}
