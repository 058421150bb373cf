//! Wit.ai `/message` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{NluError, NluProvider, NluResult};

pub const WIT_BASE_URL: &str = "https://api.wit.ai";

#[derive(Debug, Clone)]
pub struct WitConfig {
    pub access_token: String,
    pub api_version: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

pub struct WitClient {
    config: WitConfig,
    client: Client,
}

impl WitClient {
    pub fn new(config: WitConfig) -> Result<Self, NluError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn message_url(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(WIT_BASE_URL)
            .trim_end_matches('/');
        format!("{}/message", base)
    }
}

#[async_trait]
impl NluProvider for WitClient {
    async fn parse(&self, text: &str) -> Result<NluResult, NluError> {
        debug!("[Wit] Parsing {} chars", text.len());
        let response = self
            .client
            .get(self.message_url())
            .bearer_auth(&self.config.access_token)
            .query(&[("v", self.config.api_version.as_str()), ("q", text)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NluError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<NluResult>().await?)
    }
}
