//! Catalog Connector Trait - Abstract interface for raw record sources

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Checkpoint for resumable paging
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Source-specific cursor (next page URL, offset, ...)
    pub cursor: String,

    /// When the page that produced this checkpoint was fetched
    pub fetched_at: DateTime<Utc>,

    /// Number of records fetched so far
    pub records_fetched: u64,
}

impl Checkpoint {
    pub fn new(cursor: String, records_fetched: u64) -> Self {
        Self {
            cursor,
            fetched_at: Utc::now(),
            records_fetched,
        }
    }

    pub fn done(records_fetched: u64) -> Self {
        Self::new("done".to_string(), records_fetched)
    }
}

/// Result from connector fetch
#[derive(Clone, Debug)]
pub struct ConnectorResult {
    /// Raw catalog payloads, one per record
    pub payloads: Vec<Value>,

    /// Updated checkpoint (for next fetch)
    pub checkpoint: Checkpoint,

    /// Has more data (false if this was the last page)
    pub has_more: bool,
}

/// Catalog Connector Trait
///
/// Implementations:
/// - AlationConnector: pages the catalog REST API
/// - JsonConnector: payloads already in memory or in a JSON file
#[async_trait]
pub trait CatalogConnector: Send {
    /// Fetch next page of raw payloads
    async fn fetch(&mut self, checkpoint: Option<Checkpoint>) -> Result<ConnectorResult>;

    /// Get source ID (unique identifier)
    fn source_id(&self) -> &str;

    /// Get source type (e.g., "alation", "json")
    fn source_type(&self) -> &str;

    /// Get source URI/endpoint (if applicable)
    fn source_uri(&self) -> Option<&str> {
        None
    }
}
