//! Knowledge lookup — topic summaries from the Wikipedia REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{GuardianError, Result};

/// Fails soft: any error or empty result is `None`.
#[async_trait]
pub trait KnowledgeLookup: Send + Sync {
    async fn lookup(&self, topic: &str) -> Option<String>;
}

pub struct WikipediaLookup {
    client: reqwest::Client,
    base_url: String,
}

impl WikipediaLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Guardian/0.1 (knowledge lookup)")
            .timeout(timeout)
            .build()
            .map_err(|e| GuardianError::LookupFailure(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.lookup_base_url,
            Duration::from_secs(config.lookup_timeout_seconds),
        )
    }

    /// `<base>/page/summary/<Topic_With_Underscores>`, percent-encoded.
    fn summary_url(&self, topic: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GuardianError::LookupFailure(format!("bad base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| GuardianError::LookupFailure("base URL cannot take a path".into()))?
            .pop_if_empty()
            .push("page")
            .push("summary")
            .push(&topic.trim().replace(' ', "_"));
        Ok(url)
    }

    async fn fetch(&self, topic: &str) -> Result<Option<String>> {
        let url = self.summary_url(topic)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GuardianError::LookupFailure(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GuardianError::LookupFailure(format!("HTTP {}", status)));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GuardianError::LookupFailure(e.to_string()))?;
        Ok(extract_summary(&body))
    }
}

#[async_trait]
impl KnowledgeLookup for WikipediaLookup {
    async fn lookup(&self, topic: &str) -> Option<String> {
        match self.fetch(topic).await {
            Ok(Some(text)) => {
                info!("Looked up '{}' ({} chars)", topic, text.len());
                Some(text)
            }
            Ok(None) => {
                info!("No summary for '{}'", topic);
                None
            }
            Err(e) => {
                warn!("Lookup for '{}' failed: {}", topic, e);
                None
            }
        }
    }
}

fn extract_summary(body: &serde_json::Value) -> Option<String> {
    body.get("extract")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
