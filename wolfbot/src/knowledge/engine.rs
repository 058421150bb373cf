use std::sync::Arc;

use tracing::{info, warn};

use super::{KnowledgeAnswer, KnowledgeProvider, QueryMode, ReportOptions, UnitSystem, UsableReport};
use crate::error::{PipelineError, PipelineResult};

/// Issues spoken or full queries and normalizes the provider's outcome into
/// the pipeline's failure taxonomy. One round trip per query, never retried.
pub struct KnowledgeQueryEngine {
    provider: Arc<dyn KnowledgeProvider>,
    units: UnitSystem,
    spoken_max_chars: usize,
    report_options: ReportOptions,
    primary_section: usize,
}

impl KnowledgeQueryEngine {
    pub fn new(provider: Arc<dyn KnowledgeProvider>) -> Self {
        Self {
            provider,
            units: UnitSystem::Metric,
            spoken_max_chars: 1000,
            report_options: ReportOptions::default(),
            primary_section: 1,
        }
    }

    pub fn with_units(mut self, units: UnitSystem) -> Self {
        self.units = units;
        self
    }

    pub fn with_spoken_max_chars(mut self, max_chars: usize) -> Self {
        self.spoken_max_chars = max_chars;
        self
    }

    pub fn with_report_options(mut self, options: ReportOptions) -> Self {
        self.report_options = options;
        self
    }

    pub fn with_primary_section(mut self, index: usize) -> Self {
        self.primary_section = index;
        self
    }

    pub async fn query(&self, mode: QueryMode, query: &str) -> PipelineResult<KnowledgeAnswer> {
        match mode {
            QueryMode::Spoken => self.query_spoken(query).await.map(KnowledgeAnswer::Spoken),
            QueryMode::Full => self.query_full(query).await.map(KnowledgeAnswer::Report),
        }
    }

    pub async fn query_spoken(&self, query: &str) -> PipelineResult<String> {
        self.provider
            .spoken_answer(query, self.units, self.spoken_max_chars)
            .await
            .map_err(|e| {
                warn!("[Knowledge] Spoken query failed: {}", e);
                PipelineError::KnowledgeUnavailable(e.to_string())
            })
    }

    /// Full report, checked for a usable primary section.
    pub async fn query_full(&self, query: &str) -> PipelineResult<UsableReport> {
        let report = self
            .provider
            .full_report(query, &self.report_options)
            .await
            .map_err(|e| {
                warn!("[Knowledge] Full query failed: {}", e);
                PipelineError::KnowledgeUnavailable(e.to_string())
            })?;

        let success = report.success;
        let section_count = report.sections.len();
        UsableReport::validate(report, self.primary_section).ok_or_else(|| {
            info!(
                "[Knowledge] No usable report (success={}, sections={})",
                success, section_count
            );
            PipelineError::KnowledgeNoAnswer
        })
    }
}
