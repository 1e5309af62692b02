//! Alation Connector - Pages raw column records out of the catalog REST API

use crate::config::CatalogConfig;
use crate::error::DictionaryError;
use crate::ingestion::connector::{CatalogConnector, Checkpoint, ConnectorResult};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

const NEXT_PAGE_HEADER: &str = "X-Next-Page";

pub struct AlationConnector {
    client: reqwest::Client,
    config: CatalogConfig,
    base: Url,
    source_uri: String,
}

impl AlationConnector {
    pub fn new(config: CatalogConfig) -> crate::error::Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            DictionaryError::InvalidUri(format!("{}: {}", config.base_url, e))
        })?;
        let source_uri = base
            .join(&config.endpoint)
            .map_err(|e| DictionaryError::InvalidUri(format!("{}: {}", config.endpoint, e)))?
            .to_string();

        Ok(Self {
            client: reqwest::Client::new(),
            config,
            base,
            source_uri,
        })
    }

    /// URL of the page starting at record offset `skip`
    pub fn page_url(&self, skip: u64) -> Result<Url> {
        let mut url = self.base.join(&self.config.endpoint)?;
        url.query_pairs_mut()
            .append_pair("limit", &self.config.page_size.to_string())
            .append_pair("skip", &skip.to_string());
        Ok(url)
    }

    /// Where the next page lives: the server's `X-Next-Page` link if present, otherwise the
    /// next offset when this page was full.
    fn next_page(
        &self,
        next_link: Option<&str>,
        page_len: usize,
        records_fetched: u64,
    ) -> Result<Option<Url>> {
        if let Some(link) = next_link.filter(|link| !link.trim().is_empty()) {
            return Ok(Some(self.base.join(link)?));
        }

        if page_len > 0 && page_len >= self.config.page_size {
            return Ok(Some(self.page_url(records_fetched)?));
        }

        Ok(None)
    }
}

#[async_trait]
impl CatalogConnector for AlationConnector {
    fn source_id(&self) -> &str {
        &self.config.endpoint
    }

    fn source_type(&self) -> &str {
        "alation"
    }

    fn source_uri(&self) -> Option<&str> {
        Some(&self.source_uri)
    }

    async fn fetch(&mut self, checkpoint: Option<Checkpoint>) -> Result<ConnectorResult> {
        let (url, already_fetched) = match checkpoint {
            Some(checkpoint) => (Url::parse(&checkpoint.cursor)?, checkpoint.records_fetched),
            None => (self.page_url(0)?, 0),
        };

        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .header("TOKEN", &self.config.api_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| DictionaryError::Catalog(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DictionaryError::Catalog(format!(
                "{} returned {}: {}",
                url,
                status,
                body.trim()
            ))
            .into());
        }

        let next_link = response
            .headers()
            .get(NEXT_PAGE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body: Value = response.json().await.map_err(|e| {
            DictionaryError::Catalog(format!("Failed to parse response from {}: {}", url, e))
        })?;

        let payloads = match body {
            Value::Array(items) => items,
            other => {
                return Err(DictionaryError::Catalog(format!(
                    "{} returned {} instead of a list of records",
                    url,
                    if other.is_object() { "an object" } else { "a scalar" }
                ))
                .into())
            }
        };

        let records_fetched = already_fetched + payloads.len() as u64;
        let next = self.next_page(next_link.as_deref(), payloads.len(), records_fetched)?;

        let (checkpoint, has_more) = match next {
            Some(next) => (Checkpoint::new(next.to_string(), records_fetched), true),
            None => (Checkpoint::done(records_fetched), false),
        };

        Ok(ConnectorResult {
            payloads,
            checkpoint,
            has_more,
        })
    }
}
