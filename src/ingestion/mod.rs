//! Ingestion Module
//!
//! Pulls raw record payloads out of a catalog source and feeds them through
//! `Dictionary::add`:
//! - Connectors page through a source (REST API, JSON file)
//! - The orchestrator drains a connector, tallies outcomes and saves

pub mod alation_connector;
pub mod connector;
pub mod json_connector;
pub mod orchestrator;

pub use alation_connector::AlationConnector;
pub use connector::{CatalogConnector, Checkpoint, ConnectorResult};
pub use json_connector::JsonConnector;
pub use orchestrator::{IngestionOptions, IngestionOrchestrator};

use serde::{Deserialize, Serialize};

/// Ingestion result
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionSummary {
    /// Ingestion run ID
    pub run_id: String,

    pub source_id: String,

    /// Pages fetched from the connector
    pub pages: usize,

    /// Payloads added (including unchanged ones)
    pub records_seen: usize,

    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,

    /// Whether the dictionary file was rewritten
    pub saved: bool,
}

impl IngestionSummary {
    pub fn new(run_id: String, source_id: String) -> Self {
        Self {
            run_id,
            source_id,
            ..Self::default()
        }
    }
}
