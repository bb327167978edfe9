//! Batch Sync Controller
//!
//! One generic controller runs a full sync pass for any entity kind:
//! paginated extraction, mapping, sanitization, batched bulk upserts with
//! per-document failure bookkeeping, and post-pass count reconciliation.
//! The per-kind differences live entirely in the [`DocumentMapper`]
//! implementations and index mapping specs.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::config::{IdentityStrategy, SyncConfig};
use crate::index::{mapping, BulkOutcome, IndexAction, IndexStore};
use crate::source::RecordSource;

use super::error::{DocumentFailure, PassError, Reconciliation};
use super::kind::EntityKind;
use super::mapper::{apply_identity, Document, DocumentMapper};
use super::relations::RelationContext;

/// Hard cap on rows per bulk request, bounding index-side memory and
/// request size regardless of the configured batch size
pub const MAX_BATCH_SIZE: usize = 50;

/// Interim document-count probe cadence, in batches
const COUNT_PROBE_EVERY: u64 = 5;

/// Pass progression; `Failed` is absorbing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Extracting,
    MappingBatch,
    Upserting,
    Reconciling,
    Done,
    Failed,
}

/// Outcome of one full pass for one entity kind
#[derive(Debug)]
pub struct PassReport {
    pub kind: EntityKind,
    pub index_name: String,
    /// Live source rows at the start of the pass
    pub total_rows: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub failures: Vec<DocumentFailure>,
    pub reconciliation: Option<Reconciliation>,
    pub state: PassState,
}

impl PassReport {
    fn new(kind: EntityKind, index_name: String) -> Self {
        Self {
            kind,
            index_name,
            total_rows: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            reconciliation: None,
            state: PassState::Idle,
        }
    }

    fn advance(&mut self, state: PassState) {
        if self.state != state {
            log::debug!("{} pass: {:?} -> {:?}", self.kind, self.state, state);
            self.state = state;
        }
    }

    fn record_failure(&mut self, id: Option<String>, reason: impl Into<String>) {
        let failure = DocumentFailure {
            id,
            reason: reason.into(),
        };
        log::error!("Document failure ({}): {}", self.kind, failure);
        self.failed += 1;
        self.failures.push(failure);
    }
}

/// Orchestrates one entity kind's pass against the two collaborators
pub struct BatchSyncController<'a> {
    source: &'a dyn RecordSource,
    store: &'a dyn IndexStore,
    config: &'a SyncConfig,
}

impl<'a> BatchSyncController<'a> {
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

    /// Rows per bulk request: configured value, capped
    fn batch_size(&self) -> usize {
        self.config.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    /// Ensure the target index exists with the correct mapping before any
    /// document is written. Under the stable-key strategy the index is
    /// destroyed and recreated (clean-slate mapping guarantee); under
    /// historical append it is created only when missing, preserving prior
    /// passes' documents.
    async fn ensure_index(&self, kind: EntityKind, name: &str) -> Result<()> {
        let exists = self.store.index_exists(name).await?;

        match self.config.identity {
            IdentityStrategy::StableKey => {
                if exists {
                    self.store.delete_index(name).await?;
                }
                self.store
                    .create_index(name, &mapping::mapping_for(kind, self.config))
                    .await
            }
            IdentityStrategy::HistoricalAppend => {
                if exists {
                    return Ok(());
                }
                self.store
                    .create_index(name, &mapping::mapping_for(kind, self.config))
                    .await
            }
        }
    }

    /// Run one full pass for the mapper's entity kind
    pub async fn run_pass(
        &self,
        mapper: &dyn DocumentMapper,
        relations: &RelationContext,
    ) -> Result<PassReport, PassError> {
        let kind = mapper.kind();
        let index_name = self.config.index_name(kind);
        let mut report = PassReport::new(kind, index_name.clone());

        report.advance(PassState::Extracting);
        let total = match self.source.count(kind).await {
            Ok(total) => total,
            Err(source) => {
                report.advance(PassState::Failed);
                return Err(PassError::Extraction { kind, source });
            }
        };
        report.total_rows = total;

        if total == 0 {
            log::warn!("No {} available to sync", kind);
            report.advance(PassState::Done);
            return Ok(report);
        }

        if let Err(source) = self.ensure_index(kind, &index_name).await {
            report.advance(PassState::Failed);
            return Err(PassError::IndexLifecycle { kind, source });
        }

        // Appending passes reconcile against the count delta, not the
        // absolute count, so documents from earlier passes never mask rows
        // lost in this one. A fresh stable-key index starts at zero.
        let baseline = match self.config.identity {
            IdentityStrategy::StableKey => Some(0),
            IdentityStrategy::HistoricalAppend => match self.store.count(&index_name).await {
                Ok(count) => Some(count),
                Err(err) => {
                    log::warn!("Baseline count for '{}' failed: {:#}", index_name, err);
                    None
                }
            },
        };

        let batch_size = self.batch_size();
        log::info!(
            "Syncing {} {} into '{}' in batches of {}",
            total,
            kind,
            index_name,
            batch_size
        );

        // One timestamp per pass: all appended documents of a pass share it
        let indexed_at = Utc::now().to_rfc3339();

        let mut offset = 0u64;
        let mut batch_number = 0u64;

        loop {
            report.advance(PassState::MappingBatch);
            let page = match self.source.fetch_page(kind, offset, batch_size as u32).await {
                Ok(page) => page,
                Err(source) => {
                    report.advance(PassState::Failed);
                    return Err(PassError::Extraction { kind, source });
                }
            };

            if page.is_empty() {
                break;
            }

            let fetched = page.len() as u64;
            offset += fetched;
            batch_number += 1;
            let is_last = fetched < batch_size as u64 || offset >= total;

            let mut actions = Vec::with_capacity(page.len());
            for record in &page {
                let mut doc = match mapper.map(record, relations) {
                    Ok(doc) => doc,
                    Err(err) => {
                        report.record_failure(None, err.to_string());
                        continue;
                    }
                };

                let id = match apply_identity(&mut doc, kind, self.config.identity, &indexed_at) {
                    Ok(id) => id,
                    Err(err) => {
                        report.record_failure(None, err.to_string());
                        continue;
                    }
                };

                match encode_document(doc) {
                    Ok(document) => actions.push(IndexAction { id, document }),
                    Err(reason) => report.record_failure(Some(id), reason),
                }
            }

            report.advance(PassState::Upserting);
            // Refresh only after the final batch; per-batch refreshes are
            // too expensive on large syncs
            self.dispatch_batch(&index_name, &actions, is_last, &mut report)
                .await;

            log::info!(
                "Progress ({}): {} indexed successfully, {} failed",
                kind,
                report.succeeded,
                report.failed
            );

            if batch_number % COUNT_PROBE_EVERY == 0 && !is_last {
                match self.store.count(&index_name).await {
                    Ok(count) => log::info!("Current document count in '{}': {}", index_name, count),
                    Err(err) => log::warn!("Count probe for '{}' failed: {:#}", index_name, err),
                }
            }

            if is_last {
                break;
            }
        }

        report.advance(PassState::Reconciling);
        match baseline {
            Some(baseline) => self.reconcile(&mut report, baseline).await,
            None => log::warn!(
                "Skipping reconciliation for '{}': no baseline count",
                index_name
            ),
        }

        report.advance(PassState::Done);
        Ok(report)
    }

    /// Dispatch one batch as a single bulk request. Partial rejections are
    /// counted per document; a transport-level failure falls back to
    /// indexing each document individually before giving up on it.
    async fn dispatch_batch(
        &self,
        index_name: &str,
        actions: &[IndexAction],
        refresh: bool,
        report: &mut PassReport,
    ) {
        if actions.is_empty() {
            return;
        }

        match self.store.bulk_upsert(index_name, actions, refresh).await {
            Ok(outcome) => self.absorb_outcome(outcome, report),
            Err(err) => {
                log::error!(
                    "Bulk upsert of {} documents to '{}' failed, retrying individually: {:#}",
                    actions.len(),
                    index_name,
                    err
                );
                for action in actions {
                    match self
                        .store
                        .bulk_upsert(index_name, std::slice::from_ref(action), refresh)
                        .await
                    {
                        Ok(outcome) => self.absorb_outcome(outcome, report),
                        Err(err) => {
                            report.record_failure(Some(action.id.clone()), format!("{:#}", err));
                        }
                    }
                }
            }
        }
    }

    fn absorb_outcome(&self, outcome: BulkOutcome, report: &mut PassReport) {
        report.succeeded += outcome.success_count;
        for failure in outcome.failures {
            log::error!("Bulk indexing error for '{}': {}", failure.id, failure.reason);
            report.failed += 1;
            report.failures.push(DocumentFailure {
                id: Some(failure.id),
                reason: failure.reason,
            });
        }
    }

    /// Compare the documents this pass put into the index (count above the
    /// pre-pass baseline) with the rows processed. A divergence is advisory:
    /// logged, never retried here.
    async fn reconcile(&self, report: &mut PassReport, baseline: u64) {
        let count = match self.store.count(&report.index_name).await {
            Ok(count) => count,
            Err(err) => {
                log::warn!(
                    "Reconciliation count for '{}' failed: {:#}",
                    report.index_name,
                    err
                );
                return;
            }
        };

        let outcome = Reconciliation::assess(count.saturating_sub(baseline), report.total_rows);
        match outcome {
            Reconciliation::Match { count } => {
                log::info!(
                    "All documents indexed into '{}' ({} present)",
                    report.index_name,
                    count
                );
            }
            Reconciliation::Mismatch { indexed, expected } => {
                log::warn!(
                    "Only {} of {} documents were indexed into '{}' ({} failed); check the pass log",
                    indexed,
                    expected,
                    report.index_name,
                    report.failed
                );
            }
            Reconciliation::Empty { expected } => {
                log::error!(
                    "No documents were indexed into '{}' despite {} source rows; \
                     possible serialization, connectivity, or mapping problems",
                    report.index_name,
                    expected
                );
            }
        }
        report.reconciliation = Some(outcome);
    }

    /// Narrow trigger: sync a single entity by natural id. Never
    /// recreates the index destructively; it is created only when missing.
    pub async fn sync_one(
        &self,
        mapper: &dyn DocumentMapper,
        relations: &RelationContext,
        id: Uuid,
    ) -> Result<String> {
        let kind = mapper.kind();
        let index_name = self.config.index_name(kind);

        let record = self
            .source
            .fetch_by_id(kind, id)
            .await?
            .with_context(|| format!("No live {} row with id {}", kind, id))?;

        if !self.store.index_exists(&index_name).await? {
            self.store
                .create_index(&index_name, &mapping::mapping_for(kind, self.config))
                .await?;
        }

        let mut doc = mapper
            .map(&record, relations)
            .map_err(|e| anyhow::anyhow!("Mapping {} {} failed: {}", kind, id, e))?;
        let indexed_at = Utc::now().to_rfc3339();
        let key = apply_identity(&mut doc, kind, self.config.identity, &indexed_at)
            .map_err(|e| anyhow::anyhow!("Identity for {} {} failed: {}", kind, id, e))?;

        let document =
            encode_document(doc).map_err(|reason| anyhow::anyhow!("{}", reason))?;
        let action = IndexAction {
            id: key.clone(),
            document,
        };

        let outcome = self
            .store
            .bulk_upsert(&index_name, std::slice::from_ref(&action), true)
            .await?;
        if let Some(failure) = outcome.failures.first() {
            anyhow::bail!("Index rejected document {}: {}", failure.id, failure.reason);
        }

        log::info!("Synced {} {} as '{}'", kind, id, key);
        Ok(key)
    }
}

/// Verify the document serializes to the index wire format. On a hard
/// failure, one permissive fallback pass stringifies the unencodable
/// fields before the document is given up on.
///
/// A plain JSON tree always encodes, so for today's mappers the failure
/// branches are inert; they define the contract for document payloads whose
/// `Serialize` impl is fallible.
fn encode_document(doc: Document) -> Result<JsonValue, String> {
    let value = JsonValue::Object(doc);
    match serde_json::to_string(&value) {
        Ok(_) => Ok(value),
        Err(first_err) => {
            let fallback = stringify_unencodable(&value);
            match serde_json::to_string(&fallback) {
                Ok(_) => {
                    log::warn!(
                        "Document required default-to-string fallback encoding: {}",
                        first_err
                    );
                    Ok(fallback)
                }
                Err(second_err) => Err(format!(
                    "Document not serializable even with fallback: {} / {}",
                    first_err, second_err
                )),
            }
        }
    }
}

/// Permissive coercion: any field that cannot encode on its own is
/// replaced by its rendered string form
fn stringify_unencodable(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), stringify_unencodable(v)))
                .collect(),
        ),
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(stringify_unencodable).collect())
        }
        other => {
            if serde_json::to_string(other).is_ok() {
                other.clone()
            } else {
                JsonValue::String(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::mapper::mapper_for;
    use crate::sync::testing::{MemoryIndex, MemorySource};
    use serde_json::json;

    fn config_with_batch(batch_size: usize) -> SyncConfig {
        SyncConfig {
            batch_size,
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn test_empty_source_short_circuits() {
        let source = MemorySource::new();
        let store = MemoryIndex::new();
        let config = SyncConfig::default();
        let controller = BatchSyncController::new(&source, &store, &config);

        let report = controller
            .run_pass(mapper_for(EntityKind::User).as_ref(), &RelationContext::default())
            .await
            .unwrap();

        assert_eq!(report.total_rows, 0);
        assert_eq!(report.state, PassState::Done);
        assert!(store.created_indices().is_empty());
    }

    #[tokio::test]
    async fn test_pass_upserts_all_rows_across_batches() {
        let source = MemorySource::new().with_users(120);
        let store = MemoryIndex::new();
        let config = config_with_batch(1000); // capped to MAX_BATCH_SIZE
        let controller = BatchSyncController::new(&source, &store, &config);

        let report = controller
            .run_pass(mapper_for(EntityKind::User).as_ref(), &RelationContext::default())
            .await
            .unwrap();

        assert_eq!(report.total_rows, 120);
        assert_eq!(report.succeeded, 120);
        assert_eq!(report.failed, 0);
        assert_eq!(
            report.reconciliation,
            Some(Reconciliation::Match { count: 120 })
        );
        assert_eq!(store.document_count("data_lake_users"), 120);
        // 120 rows at the 50-row cap: refresh requested only on the final batch
        assert_eq!(store.refresh_flags(), vec![false, false, true]);
    }

    #[tokio::test]
    async fn test_partial_batch_resilience() {
        // Ten documents, the fifth is rejected by the index even after the
        // fallback path; the other nine must land.
        let source = MemorySource::new().with_users(10);
        let rejected = source.user_id(4).to_string();
        let store = MemoryIndex::new().rejecting(&rejected);
        let config = config_with_batch(50);
        let controller = BatchSyncController::new(&source, &store, &config);

        let report = controller
            .run_pass(mapper_for(EntityKind::User).as_ref(), &RelationContext::default())
            .await
            .unwrap();

        assert_eq!(report.succeeded, 9);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].id.as_deref(), Some(rejected.as_str()));
        assert_eq!(store.document_count("data_lake_users"), 9);
        assert_eq!(
            report.reconciliation,
            Some(Reconciliation::Mismatch {
                indexed: 9,
                expected: 10
            })
        );
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back_per_document() {
        // Bulk requests with more than one action fail at transport level;
        // the controller re-sends each document individually.
        let source = MemorySource::new().with_users(10);
        let store = MemoryIndex::new().failing_multi_action_bulks();
        let config = config_with_batch(50);
        let controller = BatchSyncController::new(&source, &store, &config);

        let report = controller
            .run_pass(mapper_for(EntityKind::User).as_ref(), &RelationContext::default())
            .await
            .unwrap();

        assert_eq!(report.succeeded, 10);
        assert_eq!(report.failed, 0);
        assert_eq!(store.document_count("data_lake_users"), 10);
    }

    #[tokio::test]
    async fn test_reconciliation_mismatch_is_advisory() {
        // 100 rows, three rejected: pass completes with a mismatch note
        let source = MemorySource::new().with_users(100);
        let store = MemoryIndex::new()
            .rejecting(&source.user_id(7).to_string())
            .rejecting(&source.user_id(42).to_string())
            .rejecting(&source.user_id(99).to_string());
        let config = config_with_batch(50);
        let controller = BatchSyncController::new(&source, &store, &config);

        let report = controller
            .run_pass(mapper_for(EntityKind::User).as_ref(), &RelationContext::default())
            .await
            .unwrap();

        assert_eq!(report.state, PassState::Done);
        assert_eq!(report.succeeded, 97);
        assert_eq!(report.failed, 3);
        assert_eq!(
            report.reconciliation,
            Some(Reconciliation::Mismatch {
                indexed: 97,
                expected: 100
            })
        );
    }

    #[tokio::test]
    async fn test_stable_strategy_recreates_existing_index() {
        let source = MemorySource::new().with_users(1);
        let store = MemoryIndex::new().with_existing_index("data_lake_users");
        let config = SyncConfig::default();
        let controller = BatchSyncController::new(&source, &store, &config);

        controller
            .run_pass(mapper_for(EntityKind::User).as_ref(), &RelationContext::default())
            .await
            .unwrap();

        assert_eq!(store.deleted_indices(), vec!["data_lake_users".to_string()]);
        assert_eq!(store.created_indices(), vec!["data_lake_users".to_string()]);
    }

    #[tokio::test]
    async fn test_append_strategy_preserves_existing_index() {
        let source = MemorySource::new().with_users(1);
        let store = MemoryIndex::new().with_existing_index("data_lake_users");
        let config = SyncConfig {
            identity: IdentityStrategy::HistoricalAppend,
            ..SyncConfig::default()
        };
        let controller = BatchSyncController::new(&source, &store, &config);

        controller
            .run_pass(mapper_for(EntityKind::User).as_ref(), &RelationContext::default())
            .await
            .unwrap();

        assert!(store.deleted_indices().is_empty());
        assert!(store.created_indices().is_empty());
    }

    #[tokio::test]
    async fn test_append_strategy_stamps_identity_fields() {
        let source = MemorySource::new().with_users(1);
        let store = MemoryIndex::new();
        let config = SyncConfig {
            identity: IdentityStrategy::HistoricalAppend,
            ..SyncConfig::default()
        };
        let controller = BatchSyncController::new(&source, &store, &config);

        controller
            .run_pass(mapper_for(EntityKind::User).as_ref(), &RelationContext::default())
            .await
            .unwrap();

        let docs = store.documents("data_lake_users");
        assert_eq!(docs.len(), 1);
        let (key, doc) = &docs[0];
        let natural = source.user_id(0).to_string();
        assert!(key.starts_with(&format!("{}_", natural)));
        assert_eq!(doc["document_id"], json!(key));
        assert!(doc["indexed_at"].is_string());
    }

    #[tokio::test]
    async fn test_append_reconciliation_uses_count_delta() {
        use crate::source::{SourceRecord, SourceValue};
        use uuid::Uuid;

        // Documents appended by an earlier pass must not mask rows lost in
        // this one: reconciliation compares against the pre-pass count.
        let store = MemoryIndex::new();
        let config = SyncConfig {
            identity: IdentityStrategy::HistoricalAppend,
            ..SyncConfig::default()
        };

        let first = MemorySource::new().with_users(100);
        let controller = BatchSyncController::new(&first, &store, &config);
        let report = controller
            .run_pass(mapper_for(EntityKind::User).as_ref(), &RelationContext::default())
            .await
            .unwrap();
        assert_eq!(
            report.reconciliation,
            Some(Reconciliation::Match { count: 100 })
        );

        // Second pass over 100 fresh rows, three of them without an id
        let rows: Vec<SourceRecord> = (0u128..100)
            .map(|i| {
                if [7, 42, 99].contains(&i) {
                    SourceRecord::from_iter([(
                        "name".to_string(),
                        SourceValue::Text(format!("User {}", i)),
                    )])
                } else {
                    SourceRecord::from_iter([
                        ("id".to_string(), SourceValue::Guid(Uuid::from_u128(i + 1000))),
                        ("name".to_string(), SourceValue::Text(format!("User {}", i))),
                    ])
                }
            })
            .collect();
        let second = MemorySource::new().with_rows(EntityKind::User, rows);
        let controller = BatchSyncController::new(&second, &store, &config);
        let report = controller
            .run_pass(mapper_for(EntityKind::User).as_ref(), &RelationContext::default())
            .await
            .unwrap();

        assert_eq!(report.succeeded, 97);
        assert_eq!(report.failed, 3);
        assert_eq!(store.document_count("data_lake_users"), 197);
        assert_eq!(
            report.reconciliation,
            Some(Reconciliation::Mismatch {
                indexed: 97,
                expected: 100
            })
        );
    }

    #[tokio::test]
    async fn test_index_lifecycle_failure_is_fatal_to_pass() {
        let source = MemorySource::new().with_users(5);
        let store = MemoryIndex::new().failing_index_creation();
        let config = SyncConfig::default();
        let controller = BatchSyncController::new(&source, &store, &config);

        let err = controller
            .run_pass(mapper_for(EntityKind::User).as_ref(), &RelationContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PassError::IndexLifecycle { .. }));
        assert_eq!(store.document_count("data_lake_users"), 0);
    }

    #[tokio::test]
    async fn test_sync_one_upserts_a_single_document() {
        let source = MemorySource::new().with_users(3);
        let store = MemoryIndex::new();
        let config = SyncConfig::default();
        let controller = BatchSyncController::new(&source, &store, &config);
        let id = source.user_id(1);

        let key = controller
            .sync_one(
                mapper_for(EntityKind::User).as_ref(),
                &RelationContext::default(),
                id,
            )
            .await
            .unwrap();

        assert_eq!(key, id.to_string());
        assert_eq!(store.document_count("data_lake_users"), 1);
        // Single-entity sync must not wipe the index
        assert!(store.deleted_indices().is_empty());
    }

    #[test]
    fn test_encode_document_passes_plain_json() {
        let mut doc = Document::new();
        doc.insert("a".to_string(), json!(1));
        let encoded = encode_document(doc).unwrap();
        assert_eq!(encoded, json!({"a": 1}));
    }

    #[test]
    fn test_fallback_coercion_preserves_encodable_trees() {
        // Fields that encode on their own pass through untouched, at any depth
        let value = json!({
            "nested": {"list": [1, "two", null, {"deep": true}]},
            "plain": 3.5
        });
        assert_eq!(stringify_unencodable(&value), value);
    }
}
