//! Rendering of knowledge answers into the single reply string sent back
//! to the chat transport. Output uses Slack mrkdwn.

use std::fmt;

use crate::knowledge::{KnowledgeAnswer, UsableReport};

/// Final text for one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply(String);

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn format_answer(answer: &KnowledgeAnswer) -> Reply {
    match answer {
        KnowledgeAnswer::Spoken(text) => format_spoken(text),
        KnowledgeAnswer::Report(report) => format_full(report),
    }
}

pub fn format_spoken(answer: &str) -> Reply {
    Reply::new(answer)
}

/// Bold title of the primary section followed by its first body block as a
/// preformatted block. Later bodies and other sections are not rendered.
pub fn format_full(report: &UsableReport) -> Reply {
    let section = report.primary_section();
    let body = section.bodies.first().map(String::as_str).unwrap_or("");
    Reply::new(format!("*{}*\n```{}```", section.title, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Section, StructuredReport};
    use pretty_assertions::assert_eq;

    fn usable(sections: Vec<Section>) -> UsableReport {
        UsableReport::validate(
            StructuredReport {
                success: true,
                sections,
            },
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_spoken_is_pass_through() {
        assert_eq!(format_spoken("Paris").as_str(), "Paris");
        assert_eq!(
            format_answer(&KnowledgeAnswer::Spoken("  spaced  ".to_string())).as_str(),
            "  spaced  "
        );
    }

    #[test]
    fn test_full_renders_only_second_section_first_body() {
        let report = usable(vec![
            Section {
                title: "Input".to_string(),
                bodies: vec!["weather in new york".to_string()],
            },
            Section {
                title: "Weather".to_string(),
                bodies: vec!["72°F".to_string(), "humidity 40%".to_string()],
            },
            Section {
                title: "Forecast".to_string(),
                bodies: vec!["rain tomorrow".to_string()],
            },
        ]);

        let reply = format_full(&report);
        assert_eq!(reply.as_str(), "*Weather*\n```72°F```");
        assert!(!reply.as_str().contains("Input"));
        assert!(!reply.as_str().contains("humidity"));
        assert!(!reply.as_str().contains("Forecast"));
    }

    #[test]
    fn test_full_with_empty_section_renders_empty_block() {
        let report = usable(vec![
            Section {
                title: "Input".to_string(),
                bodies: vec![],
            },
            Section {
                title: "Plot".to_string(),
                bodies: vec![],
            },
        ]);
        assert_eq!(format_full(&report).as_str(), "*Plot*\n``````");
    }
}
