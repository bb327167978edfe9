//! Full-run orchestration across entity kinds
//!
//! Resolves relationships once per run, then drives one controller pass per
//! kind in dependency order. A fatal pass error is recorded and the run
//! moves on to the next kind; one broken extraction never blocks the rest.

use anyhow::{Context, Result};

use crate::config::SyncConfig;
use crate::index::IndexStore;
use crate::source::{fetch_all, RecordSource};

use super::controller::{BatchSyncController, PassReport, MAX_BATCH_SIZE};
use super::error::PassError;
use super::kind::EntityKind;
use super::mapper::mapper_for;
use super::relations::{self, RelationContext};

/// Everything one run produced: completed pass reports plus the fatal
/// errors of passes that never completed
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<PassReport>,
    pub errors: Vec<PassError>,
}

impl RunSummary {
    /// True when every pass completed with zero document failures and a
    /// clean reconciliation
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self
                .reports
                .iter()
                .all(|r| r.failed == 0 && r.reconciliation.map_or(true, |rec| rec.is_clean()))
    }
}

pub struct SyncOrchestrator<'a> {
    source: &'a dyn RecordSource,
    store: &'a dyn IndexStore,
    config: &'a SyncConfig,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        source: &'a dyn RecordSource,
        store: &'a dyn IndexStore,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// Resolve all derived relationships from freshly extracted rowsets.
    /// Called once per run so every pass sees one consistent snapshot.
    pub async fn build_relations(&self) -> Result<RelationContext> {
        let page = self.config.batch_size.clamp(1, MAX_BATCH_SIZE) as u32;

        let history = self
            .source
            .status_history()
            .await
            .context("Extracting status history")?;
        let ticket_labels = self
            .source
            .ticket_labels()
            .await
            .context("Extracting ticket label joins")?;
        let statuses = fetch_all(self.source, EntityKind::Status, page)
            .await
            .context("Extracting statuses")?;
        let labels = fetch_all(self.source, EntityKind::Label, page)
            .await
            .context("Extracting labels")?;
        let data_sources = fetch_all(self.source, EntityKind::DataSource, page)
            .await
            .context("Extracting data sources")?;
        let modules = fetch_all(self.source, EntityKind::Module, page)
            .await
            .context("Extracting modules")?;

        Ok(RelationContext {
            status_by_ticket: relations::latest_status_per_ticket(&history),
            labels_by_ticket: relations::labels_per_ticket(&ticket_labels),
            statuses_by_module: relations::children_per_module(&statuses),
            labels_by_module: relations::children_per_module(&labels),
            data_sources_by_module: relations::children_per_module(&data_sources),
            module_names: relations::module_names(&modules),
        })
    }

    /// Run one pass per kind, in the order given
    pub async fn run(&self, kinds: &[EntityKind]) -> Result<RunSummary> {
        let relations = self.build_relations().await?;
        let controller = BatchSyncController::new(self.source, self.store, self.config);
        let mut summary = RunSummary::default();

        for &kind in kinds {
            let mapper = mapper_for(kind);
            match controller.run_pass(mapper.as_ref(), &relations).await {
                Ok(report) => {
                    log::info!(
                        "Pass complete for {}: {}/{} indexed, {} failed",
                        kind,
                        report.succeeded,
                        report.total_rows,
                        report.failed
                    );
                    summary.reports.push(report);
                }
                Err(err) => {
                    log::error!("Pass for {} aborted: {}", kind, err);
                    summary.errors.push(err);
                }
            }
        }

        Ok(summary)
    }

    /// Run all kinds in dependency order
    pub async fn run_all(&self) -> Result<RunSummary> {
        self.run(&EntityKind::pass_order()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceRecord, SourceValue};
    use crate::sync::testing::{MemoryIndex, MemorySource};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn guid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn ticket_row(id: Uuid, number: i64, module: Uuid) -> SourceRecord {
        SourceRecord::from_iter([
            ("ticket_id".to_string(), SourceValue::Guid(id)),
            ("ticket_number".to_string(), SourceValue::Int(number)),
            ("ticket_data".to_string(), SourceValue::Null),
            (
                "ticket_createdAt".to_string(),
                SourceValue::Timestamp(Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap()),
            ),
            ("module_id".to_string(), SourceValue::Guid(module)),
            ("module_name".to_string(), SourceValue::Text("Support".into())),
        ])
    }

    fn history_row(ticket: Uuid, status: Uuid, name: &str, day: u32) -> SourceRecord {
        SourceRecord::from_iter([
            ("ticketId".to_string(), SourceValue::Guid(ticket)),
            ("statusId".to_string(), SourceValue::Guid(status)),
            ("status_name".to_string(), SourceValue::Text(name.into())),
            ("isFinalStatus".to_string(), SourceValue::Bool(name == "Closed")),
            (
                "createdAt".to_string(),
                SourceValue::Timestamp(Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()),
            ),
        ])
    }

    fn label_join_row(ticket: Uuid, label: Uuid, name: &str, color: &str) -> SourceRecord {
        SourceRecord::from_iter([
            ("ticketId".to_string(), SourceValue::Guid(ticket)),
            ("label_id".to_string(), SourceValue::Guid(label)),
            ("label_name".to_string(), SourceValue::Text(name.into())),
            ("color".to_string(), SourceValue::Text(color.into())),
        ])
    }

    #[tokio::test]
    async fn test_full_run_denormalizes_tickets() {
        // Ticket A carries labels and a resolved current status; ticket B
        // has neither and must come out with status nulls and an empty list.
        let module = guid(100);
        let ticket_a = guid(1);
        let ticket_b = guid(2);
        let open = guid(10);
        let closed = guid(11);

        let source = MemorySource::new()
            .with_rows(
                EntityKind::Ticket,
                vec![
                    ticket_row(ticket_a, 1, module),
                    ticket_row(ticket_b, 2, module),
                ],
            )
            .with_status_history(vec![
                history_row(ticket_a, open, "Open", 1),
                history_row(ticket_a, closed, "Closed", 5),
            ])
            .with_ticket_labels(vec![
                label_join_row(ticket_a, guid(20), "urgent", "#ff0000"),
                label_join_row(ticket_a, guid(21), "hardware", "#00ff00"),
            ]);
        let store = MemoryIndex::new();
        let config = SyncConfig::default();
        let orchestrator = SyncOrchestrator::new(&source, &store, &config);

        let summary = orchestrator.run(&[EntityKind::Ticket]).await.unwrap();
        assert!(summary.is_clean());

        let docs = store.documents("data_lake_denormalized_tickets");
        assert_eq!(docs.len(), 2);

        let doc_a = &docs
            .iter()
            .find(|(id, _)| *id == ticket_a.to_string())
            .unwrap()
            .1;
        assert_eq!(doc_a["status_name"], json!("Closed"));
        assert_eq!(doc_a["status_isFinalStatus"], json!(true));
        assert_eq!(
            doc_a["labels"],
            json!([
                {"id": guid(20).to_string(), "name": "urgent", "color": "#ff0000"},
                {"id": guid(21).to_string(), "name": "hardware", "color": "#00ff00"},
            ])
        );

        let doc_b = &docs
            .iter()
            .find(|(id, _)| *id == ticket_b.to_string())
            .unwrap()
            .1;
        assert_eq!(doc_b["status_id"], json!(null));
        assert_eq!(doc_b["status_name"], json!(null));
        assert_eq!(doc_b["labels"], json!([]));
    }

    #[tokio::test]
    async fn test_failed_pass_does_not_block_later_kinds() {
        let source = MemorySource::new()
            .with_users(3)
            .failing_extraction(EntityKind::Ticket);
        let store = MemoryIndex::new();
        let config = SyncConfig::default();
        let orchestrator = SyncOrchestrator::new(&source, &store, &config);

        let summary = orchestrator
            .run(&[EntityKind::Ticket, EntityKind::User])
            .await
            .unwrap();

        assert_eq!(summary.errors.len(), 1);
        assert!(matches!(
            summary.errors[0],
            PassError::Extraction { kind: EntityKind::Ticket, .. }
        ));
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].succeeded, 3);
        assert_eq!(store.document_count("data_lake_users"), 3);
        assert!(!summary.is_clean());
    }

    #[tokio::test]
    async fn test_run_all_covers_every_kind_in_order() {
        let source = MemorySource::new().with_users(2);
        let store = MemoryIndex::new();
        let config = SyncConfig::default();
        let orchestrator = SyncOrchestrator::new(&source, &store, &config);

        let summary = orchestrator.run_all().await.unwrap();

        // Kinds with no rows short-circuit but still report
        assert_eq!(summary.reports.len(), EntityKind::pass_order().len());
        assert!(summary.errors.is_empty());
        let kinds: Vec<EntityKind> = summary.reports.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, EntityKind::pass_order().to_vec());
    }
}
