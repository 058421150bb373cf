//! Computational knowledge engine collaborator.
//!
//! Two query modes exist: a terse spoken answer and a full structured report
//! made of titled sections ("pods" in Wolfram|Alpha terms).

pub mod engine;
pub mod wolfram;

pub use engine::KnowledgeQueryEngine;
pub use wolfram::{WolframClient, WolframConfig};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Knowledge request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Knowledge provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Knowledge provider response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Knowledge provider reported an error: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    Spoken,
    Full,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UnitSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "imperial" | "nonmetric" => Ok(UnitSystem::Imperial),
            other => Err(format!("unknown unit system: {}", other)),
        }
    }
}

/// Options for a full report request. `None` leaves the provider default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportOptions {
    pub units: Option<UnitSystem>,
}

/// One labeled unit of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub bodies: Vec<String>,
}

/// Raw full-mode result, not yet checked for usability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    pub success: bool,
    pub sections: Vec<Section>,
}

/// A report that succeeded and has a primary section to render.
///
/// The only way to build one is [`UsableReport::validate`], so anything
/// holding a `UsableReport` can index its primary section safely.
#[derive(Debug, Clone, PartialEq)]
pub struct UsableReport {
    report: StructuredReport,
    primary: usize,
}

impl UsableReport {
    /// Section 0 is the input interpretation echo, so a report always needs
    /// at least two sections, and enough of them to reach `primary`.
    pub fn validate(report: StructuredReport, primary: usize) -> Option<Self> {
        let needed = primary.max(1) + 1;
        if report.success && report.sections.len() >= needed {
            Some(Self { report, primary })
        } else {
            None
        }
    }

    pub fn primary_section(&self) -> &Section {
        &self.report.sections[self.primary]
    }
}

/// Result of a knowledge query, shaped by the query mode.
#[derive(Debug, Clone, PartialEq)]
pub enum KnowledgeAnswer {
    Spoken(String),
    Report(UsableReport),
}

#[async_trait]
pub trait KnowledgeProvider: Send + Sync {
    async fn spoken_answer(
        &self,
        text: &str,
        units: UnitSystem,
        max_chars: usize,
    ) -> Result<String, KnowledgeError>;

    async fn full_report(
        &self,
        text: &str,
        options: &ReportOptions,
    ) -> Result<StructuredReport, KnowledgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(title: &str) -> Section {
        Section {
            title: title.to_string(),
            bodies: vec![format!("{} body", title)],
        }
    }

    #[test]
    fn test_usable_report_requires_success_and_two_sections() {
        let ok = StructuredReport {
            success: true,
            sections: vec![section("Input"), section("Result")],
        };
        let report = UsableReport::validate(ok, 1).unwrap();
        assert_eq!(report.primary_section().title, "Result");

        let failed = StructuredReport {
            success: false,
            sections: vec![section("Input"), section("Result")],
        };
        assert!(UsableReport::validate(failed, 1).is_none());

        let short = StructuredReport {
            success: true,
            sections: vec![section("Input")],
        };
        assert!(UsableReport::validate(short, 1).is_none());
    }

    #[test]
    fn test_usable_report_needs_configured_primary_section() {
        let report = StructuredReport {
            success: true,
            sections: vec![section("Input"), section("Result")],
        };
        assert!(UsableReport::validate(report.clone(), 2).is_none());
        // Section 0 is never accepted as the primary with fewer than two sections
        let single = StructuredReport {
            success: true,
            sections: vec![section("Input")],
        };
        assert!(UsableReport::validate(single, 0).is_none());
        assert!(UsableReport::validate(report, 0).is_some());
    }

    #[test]
    fn test_unit_system_parse() {
        assert_eq!("Metric".parse::<UnitSystem>().unwrap(), UnitSystem::Metric);
        assert_eq!("nonmetric".parse::<UnitSystem>().unwrap(), UnitSystem::Imperial);
        assert!("kelvin".parse::<UnitSystem>().is_err());
    }
}
