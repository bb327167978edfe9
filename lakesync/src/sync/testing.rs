//! In-memory fakes for the two collaborator traits, with programmable
//! failure modes for resilience tests.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::index::{BulkFailure, BulkOutcome, IndexAction, IndexStore};
use crate::source::{RecordSource, SourceRecord, SourceValue};
use crate::sync::EntityKind;

/// Programmable in-memory [`RecordSource`]
#[derive(Default)]
pub struct MemorySource {
    rows: HashMap<EntityKind, Vec<SourceRecord>>,
    status_history: Vec<SourceRecord>,
    ticket_labels: Vec<SourceRecord>,
    failing_kinds: HashSet<EntityKind>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic id for the nth generated user row
    pub fn user_id(&self, n: u128) -> Uuid {
        Uuid::from_u128(n + 1)
    }

    /// Seed `n` generated user rows
    pub fn with_users(mut self, n: u128) -> Self {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let users = (0..n)
            .map(|i| {
                SourceRecord::from_iter([
                    ("id".to_string(), SourceValue::Guid(Uuid::from_u128(i + 1))),
                    ("name".to_string(), SourceValue::Text(format!("User {}", i))),
                    (
                        "username".to_string(),
                        SourceValue::Text(format!("user{}", i)),
                    ),
                    (
                        "email".to_string(),
                        SourceValue::Text(format!("user{}@example.com", i)),
                    ),
                    ("preferences".to_string(), SourceValue::Null),
                    ("createdAt".to_string(), SourceValue::Timestamp(created)),
                    ("updatedAt".to_string(), SourceValue::Null),
                ])
            })
            .collect();
        self.rows.insert(EntityKind::User, users);
        self
    }

    pub fn with_rows(mut self, kind: EntityKind, rows: Vec<SourceRecord>) -> Self {
        self.rows.insert(kind, rows);
        self
    }

    pub fn with_status_history(mut self, rows: Vec<SourceRecord>) -> Self {
        self.status_history = rows;
        self
    }

    pub fn with_ticket_labels(mut self, rows: Vec<SourceRecord>) -> Self {
        self.ticket_labels = rows;
        self
    }

    /// Make every extraction call for a kind fail
    pub fn failing_extraction(mut self, kind: EntityKind) -> Self {
        self.failing_kinds.insert(kind);
        self
    }

    fn check(&self, kind: EntityKind) -> Result<()> {
        if self.failing_kinds.contains(&kind) {
            bail!("simulated extraction failure for {}", kind);
        }
        Ok(())
    }

    fn kind_rows(&self, kind: EntityKind) -> &[SourceRecord] {
        self.rows.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn verify_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn count(&self, kind: EntityKind) -> Result<u64> {
        self.check(kind)?;
        Ok(self.kind_rows(kind).len() as u64)
    }

    async fn fetch_page(
        &self,
        kind: EntityKind,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<SourceRecord>> {
        self.check(kind)?;
        Ok(self
            .kind_rows(kind)
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn fetch_by_id(&self, kind: EntityKind, id: Uuid) -> Result<Option<SourceRecord>> {
        self.check(kind)?;
        Ok(self
            .kind_rows(kind)
            .iter()
            .find(|r| {
                // Raw table rows carry "id"; ticket join rows carry the alias
                let wanted = id.to_string();
                r.id_string("id").as_deref() == Some(wanted.as_str())
                    || r.id_string(kind.id_field()).as_deref() == Some(wanted.as_str())
            })
            .cloned())
    }

    async fn status_history(&self) -> Result<Vec<SourceRecord>> {
        Ok(self.status_history.clone())
    }

    async fn ticket_labels(&self) -> Result<Vec<SourceRecord>> {
        Ok(self.ticket_labels.clone())
    }
}

#[derive(Default)]
struct MemoryIndexState {
    /// index name -> (document key, document) in upsert order, keyed upserts
    /// replacing earlier documents with the same key
    documents: HashMap<String, Vec<(String, JsonValue)>>,
    existing: HashSet<String>,
    created: Vec<String>,
    deleted: Vec<String>,
    refresh_flags: Vec<bool>,
}

/// Programmable in-memory [`IndexStore`]
#[derive(Default)]
pub struct MemoryIndex {
    state: Mutex<MemoryIndexState>,
    rejected_ids: HashSet<String>,
    fail_multi_action_bulks: bool,
    fail_index_creation: bool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-existing index, as left behind by an earlier run
    pub fn with_existing_index(self, name: &str) -> Self {
        self.state.lock().unwrap().existing.insert(name.to_string());
        self
    }

    /// Reject every document with this key at the bulk-item level
    pub fn rejecting(mut self, id: &str) -> Self {
        self.rejected_ids.insert(id.to_string());
        self
    }

    /// Fail bulk requests carrying more than one action at the transport
    /// level, leaving the single-action fallback path working
    pub fn failing_multi_action_bulks(mut self) -> Self {
        self.fail_multi_action_bulks = true;
        self
    }

    pub fn failing_index_creation(mut self) -> Self {
        self.fail_index_creation = true;
        self
    }

    pub fn created_indices(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted_indices(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn refresh_flags(&self) -> Vec<bool> {
        self.state.lock().unwrap().refresh_flags.clone()
    }

    pub fn document_count(&self, name: &str) -> u64 {
        self.documents(name).len() as u64
    }

    pub fn documents(&self, name: &str) -> Vec<(String, JsonValue)> {
        self.state
            .lock()
            .unwrap()
            .documents
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl IndexStore for MemoryIndex {
    async fn index_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().existing.contains(name))
    }

    async fn create_index(&self, name: &str, _mapping: &JsonValue) -> Result<()> {
        if self.fail_index_creation {
            bail!("simulated index creation failure for '{}'", name);
        }
        let mut state = self.state.lock().unwrap();
        state.existing.insert(name.to_string());
        state.created.push(name.to_string());
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.existing.remove(name);
        state.documents.remove(name);
        state.deleted.push(name.to_string());
        Ok(())
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        actions: &[IndexAction],
        refresh: bool,
    ) -> Result<BulkOutcome> {
        if self.fail_multi_action_bulks && actions.len() > 1 {
            bail!("simulated transport failure for {}-action bulk", actions.len());
        }

        let mut state = self.state.lock().unwrap();
        state.refresh_flags.push(refresh);
        let docs = state.documents.entry(index.to_string()).or_default();

        let mut outcome = BulkOutcome::default();
        for action in actions {
            if self.rejected_ids.contains(&action.id) {
                outcome.failures.push(BulkFailure {
                    id: action.id.clone(),
                    reason: "simulated mapper_parsing_exception".to_string(),
                });
                continue;
            }
            match docs.iter_mut().find(|(key, _)| *key == action.id) {
                Some(slot) => slot.1 = action.document.clone(),
                None => docs.push((action.id.clone(), action.document.clone())),
            }
            outcome.success_count += 1;
        }
        Ok(outcome)
    }

    async fn count(&self, name: &str) -> Result<u64> {
        Ok(self.document_count(name))
    }

    async fn search(&self, index_pattern: &str, _query: &JsonValue) -> Result<JsonValue> {
        let hits: Vec<JsonValue> = self
            .documents(index_pattern)
            .into_iter()
            .map(|(id, doc)| serde_json::json!({"_id": id, "_source": doc}))
            .collect();
        Ok(serde_json::json!({
            "hits": {
                "total": {"value": hits.len()},
                "hits": hits,
            }
        }))
    }
}
