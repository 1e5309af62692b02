//! JSON Connector - Serves raw payloads from memory or from a JSON file

use crate::error::{DictionaryError, Result as DictionaryResult};
use crate::ingestion::connector::{CatalogConnector, Checkpoint, ConnectorResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

/// JSON Connector - Wraps provided JSON payloads
pub struct JsonConnector {
    source_id: String,
    source_uri: Option<String>,
    payloads: Vec<Value>,
    page_size: usize,
    position: usize,
}

impl JsonConnector {
    pub fn new(source_id: String, payloads: Vec<Value>) -> Self {
        Self {
            source_id,
            source_uri: None,
            page_size: payloads.len().max(1),
            payloads,
            position: 0,
        }
    }

    /// Load payloads from a file holding either an array of records or `{"data": [...]}`
    pub fn from_file(path: impl AsRef<Path>) -> DictionaryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;

        let payloads = match value {
            Value::Array(items) => items,
            Value::Object(mut fields) => match fields.remove("data") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(DictionaryError::Catalog(format!(
                        "{} has no `data` array",
                        path.display()
                    )))
                }
            },
            _ => {
                return Err(DictionaryError::Catalog(format!(
                    "{} does not contain a list of records",
                    path.display()
                )))
            }
        };

        let mut connector = Self::new(path.display().to_string(), payloads);
        connector.source_uri = Some(path.display().to_string());
        Ok(connector)
    }

    /// Serve payloads in pages of at most `page_size`
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl CatalogConnector for JsonConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn source_type(&self) -> &str {
        "json"
    }

    fn source_uri(&self) -> Option<&str> {
        self.source_uri.as_deref()
    }

    async fn fetch(&mut self, _checkpoint: Option<Checkpoint>) -> Result<ConnectorResult> {
        let end = (self.position + self.page_size).min(self.payloads.len());
        let payloads = self.payloads[self.position..end].to_vec();
        self.position = end;

        let has_more = self.position < self.payloads.len();
        let checkpoint = if has_more {
            Checkpoint::new(self.position.to_string(), self.position as u64)
        } else {
            Checkpoint::done(self.position as u64)
        };

        Ok(ConnectorResult {
            payloads,
            checkpoint,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_pages_through_payloads() {
        let payloads = (0..5).map(|i| json!({ "id": i })).collect();
        let mut connector = JsonConnector::new("test".to_string(), payloads).with_page_size(2);

        let mut sizes = Vec::new();
        loop {
            let page = connector.fetch(None).await.unwrap();
            sizes.push(page.payloads.len());
            if !page.has_more {
                assert_eq!(page.checkpoint.records_fetched, 5);
                break;
            }
        }

        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_empty_source_yields_one_empty_page() {
        let mut connector = JsonConnector::new("empty".to_string(), Vec::new());
        let page = connector.fetch(None).await.unwrap();

        assert!(page.payloads.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_from_file_accepts_array_or_data_object() {
        let temp_dir = TempDir::new().unwrap();

        let array = temp_dir.path().join("array.json");
        std::fs::write(&array, r#"[{"id": 1}, {"id": 2}]"#).unwrap();
        assert_eq!(JsonConnector::from_file(&array).unwrap().payloads.len(), 2);

        let wrapped = temp_dir.path().join("wrapped.json");
        std::fs::write(&wrapped, r#"{"data": [{"id": 1}]}"#).unwrap();
        let connector = JsonConnector::from_file(&wrapped).unwrap();
        assert_eq!(connector.payloads.len(), 1);
        assert_eq!(connector.source_type(), "json");
        assert!(connector.source_uri().unwrap().ends_with("wrapped.json"));

        let scalar = temp_dir.path().join("scalar.json");
        std::fs::write(&scalar, "42").unwrap();
        assert!(matches!(
            JsonConnector::from_file(&scalar),
            Err(DictionaryError::Catalog(_))
        ));
    }
}
