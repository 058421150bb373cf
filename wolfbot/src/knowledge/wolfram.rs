//! Wolfram|Alpha HTTP client: Spoken Results API (`/v1/spoken`) and the
//! Full Results API (`/v2/query`, JSON output, plaintext pods).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::{KnowledgeError, KnowledgeProvider, ReportOptions, Section, StructuredReport, UnitSystem};

pub const WOLFRAM_BASE_URL: &str = "https://api.wolframalpha.com";

#[derive(Debug, Clone)]
pub struct WolframConfig {
    pub app_id: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

pub struct WolframClient {
    config: WolframConfig,
    client: Client,
}

impl WolframClient {
    pub fn new(config: WolframConfig) -> Result<Self, KnowledgeError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn url(&self, endpoint: &str) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(WOLFRAM_BASE_URL)
            .trim_end_matches('/');
        format!("{}/{}", base, endpoint)
    }

    async fn get_text(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String, KnowledgeError> {
        let response = self
            .client
            .get(self.url(endpoint))
            .query(&[("appid", self.config.app_id.as_str())])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(KnowledgeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl KnowledgeProvider for WolframClient {
    async fn spoken_answer(
        &self,
        text: &str,
        units: UnitSystem,
        max_chars: usize,
    ) -> Result<String, KnowledgeError> {
        debug!("[Wolfram] Spoken query ({} units)", units);
        let params = [("i", text.to_string()), ("units", units.as_str().to_string())];
        let answer = self.get_text("v1/spoken", &params).await?;
        Ok(truncate_chars(answer.trim(), max_chars))
    }

    async fn full_report(
        &self,
        text: &str,
        options: &ReportOptions,
    ) -> Result<StructuredReport, KnowledgeError> {
        debug!("[Wolfram] Full query");
        let params = report_params(text, options);
        let body = self.get_text("v2/query", &params).await?;
        decode_report(&body)
    }
}

fn report_params(text: &str, options: &ReportOptions) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("input", text.to_string()),
        ("output", "json".to_string()),
        ("format", "plaintext".to_string()),
    ];
    if let Some(units) = options.units {
        params.push(("units", report_units(units).to_string()));
    }
    params
}

/// The Full Results API spells imperial as `nonmetric`.
fn report_units(units: UnitSystem) -> &'static str {
    match units {
        UnitSystem::Metric => "metric",
        UnitSystem::Imperial => "nonmetric",
    }
}

/// Cut `text` to at most `max_chars` characters, never splitting a character.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    queryresult: QueryResult,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(deserialize_with = "flag")]
    success: bool,
    #[serde(default)]
    error: ErrorField,
    #[serde(default)]
    pods: Vec<Pod>,
}

/// `error` is `false` on success and `{code, msg}` (or `true`) on failure.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    #[default]
    Absent,
    Flag(bool),
    Text(String),
    Detail { code: serde_json::Value, msg: String },
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    title: String,
    #[serde(default)]
    subpods: Vec<SubPod>,
}

#[derive(Debug, Deserialize)]
struct SubPod {
    #[serde(default)]
    plaintext: Option<String>,
}

/// Accept both JSON booleans and the `"true"`/`"false"` strings older
/// responses carry.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.eq_ignore_ascii_case("true"),
    })
}

fn decode_report(body: &str) -> Result<StructuredReport, KnowledgeError> {
    let envelope: QueryEnvelope = serde_json::from_str(body)?;
    let result = envelope.queryresult;

    match result.error {
        ErrorField::Detail { code, msg } => {
            return Err(KnowledgeError::Provider(format!("{} (code {})", msg, code)));
        }
        ErrorField::Flag(true) => {
            return Err(KnowledgeError::Provider("query failed".to_string()));
        }
        ErrorField::Text(text) if text.eq_ignore_ascii_case("true") => {
            return Err(KnowledgeError::Provider("query failed".to_string()));
        }
        ErrorField::Flag(false) | ErrorField::Text(_) | ErrorField::Absent => {}
    }

    let sections = result
        .pods
        .into_iter()
        .map(|pod| Section {
            title: pod.title,
            bodies: pod
                .subpods
                .into_iter()
                .map(|sub| sub.plaintext.unwrap_or_default())
                .collect(),
        })
        .collect();

    Ok(StructuredReport {
        success: result.success,
        sections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_weather_report() {
        let body = r#"{"queryresult": {
            "success": true, "error": false, "numpods": 2,
            "pods": [
                {"title": "Input interpretation", "id": "Input",
                 "subpods": [{"title": "", "plaintext": "weather | New York"}]},
                {"title": "Weather", "id": "InstantaneousWeather:WeatherData",
                 "subpods": [{"title": "", "plaintext": "72°F"}, {"title": "", "plaintext": "clear"}]}
            ]}}"#;
        let report = decode_report(body).unwrap();
        assert!(report.success);
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.sections[1].title, "Weather");
        assert_eq!(report.sections[1].bodies, vec!["72°F".to_string(), "clear".to_string()]);
    }

    #[test]
    fn test_decode_unsuccessful_report_without_pods() {
        let body = r#"{"queryresult": {"success": "false", "error": "false", "numpods": 0}}"#;
        let report = decode_report(body).unwrap();
        assert!(!report.success);

        let body = r#"{"queryresult": {"success": false, "error": false, "numpods": 0}}"#;
        let report = decode_report(body).unwrap();
        assert!(!report.success);
        assert!(report.sections.is_empty());
    }

    #[test]
    fn test_decode_provider_error() {
        let body = r#"{"queryresult": {"success": false,
            "error": {"code": "1", "msg": "Invalid appid"}}}"#;
        let err = decode_report(body).unwrap_err();
        assert!(matches!(err, KnowledgeError::Provider(msg) if msg.contains("Invalid appid")));
    }

    #[test]
    fn test_missing_plaintext_keeps_body_position() {
        let body = r#"{"queryresult": {"success": true, "error": false, "pods": [
            {"title": "Input", "subpods": [{"plaintext": "x"}]},
            {"title": "Plot", "subpods": [{"img": {}}]}]}}"#;
        let report = decode_report(body).unwrap();
        assert_eq!(report.sections[1].bodies, vec![String::new()]);
    }

    #[test]
    fn test_report_params_use_full_results_unit_names() {
        let imperial = ReportOptions {
            units: Some(UnitSystem::Imperial),
        };
        let params = report_params("weather in new york", &imperial);
        assert_eq!(
            params,
            vec![
                ("input", "weather in new york".to_string()),
                ("output", "json".to_string()),
                ("format", "plaintext".to_string()),
                ("units", "nonmetric".to_string()),
            ]
        );

        let metric = ReportOptions {
            units: Some(UnitSystem::Metric),
        };
        assert_eq!(report_params("pi", &metric)[3], ("units", "metric".to_string()));
        assert_eq!(report_params("pi", &ReportOptions::default()).len(), 3);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("72°F today", 3), "72°");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 5), "");
    }
}
