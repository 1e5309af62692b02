//! Ingestion Orchestrator - Drains a catalog connector into the dictionary

use crate::dictionary::Dictionary;
use crate::ingestion::{CatalogConnector, IngestionSummary};
use anyhow::{Context, Result};
use tracing::{debug, info};
use uuid::Uuid;

/// Options controlling an ingestion run
#[derive(Clone, Debug)]
pub struct IngestionOptions {
    /// Call `Dictionary::save` once every page has been added
    pub save_dictionary: bool,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            save_dictionary: true,
        }
    }
}

#[derive(Default)]
pub struct IngestionOrchestrator {
    options: IngestionOptions,
}

impl IngestionOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: IngestionOptions) -> Self {
        Self { options }
    }

    /// Add every payload the connector yields, page by page.
    ///
    /// The first malformed payload aborts the run; records added before it stay in memory
    /// but nothing is saved.
    pub async fn ingest(
        &self,
        dictionary: &mut Dictionary,
        connector: &mut dyn CatalogConnector,
    ) -> Result<IngestionSummary> {
        let run_id = Uuid::new_v4().to_string();
        let source_id = connector.source_id().to_string();

        info!(
            "Ingestion run {} from {} source '{}'{}",
            run_id,
            connector.source_type(),
            source_id,
            connector
                .source_uri()
                .map(|uri| format!(" ({})", uri))
                .unwrap_or_default()
        );

        let new_before = dictionary.new_record_count();
        let updated_before = dictionary.updated_record_count();

        let mut summary = IngestionSummary::new(run_id, source_id);
        let mut checkpoint = None;
        let mut has_more = true;

        while has_more {
            let page_number = summary.pages + 1;
            let page = connector
                .fetch(checkpoint)
                .await
                .with_context(|| format!("Failed to fetch page {} from connector", page_number))?;

            debug!("Page {} carried {} records", page_number, page.payloads.len());

            for raw in &page.payloads {
                dictionary.add(raw).with_context(|| {
                    format!(
                        "Failed to add record #{} from '{}'",
                        summary.records_seen + 1,
                        summary.source_id
                    )
                })?;
                summary.records_seen += 1;
            }

            summary.pages += 1;
            checkpoint = Some(page.checkpoint);
            has_more = page.has_more;
        }

        summary.new = dictionary.new_record_count() - new_before;
        summary.updated = dictionary.updated_record_count() - updated_before;
        summary.unchanged = summary.records_seen - summary.new - summary.updated;

        if self.options.save_dictionary {
            summary.saved = dictionary
                .save()
                .with_context(|| format!("Failed to save {}", dictionary.path().display()))?;
        }

        info!(
            "Ingestion run {} finished: {} records over {} pages ({} new, {} updated, {} unchanged)",
            summary.run_id,
            summary.records_seen,
            summary.pages,
            summary.new,
            summary.updated,
            summary.unchanged
        );

        Ok(summary)
    }
}
