//! Document index store collaborator

pub mod client;
pub mod mapping;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

pub use client::SearchIndexClient;

/// One create-or-replace document operation in a bulk request
#[derive(Debug, Clone)]
pub struct IndexAction {
    /// Index key for the document
    pub id: String,
    /// JSON-safe document body
    pub document: JsonValue,
}

/// Per-document rejection from a bulk request
#[derive(Debug, Clone)]
pub struct BulkFailure {
    pub id: String,
    pub reason: String,
}

/// Result of one bulk upsert: partial rejections are data, not errors
#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    pub success_count: u64,
    pub failures: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn all_succeeded(count: u64) -> Self {
        Self {
            success_count: count,
            failures: Vec::new(),
        }
    }
}

/// Write/read access to the document index store. An `Err` from
/// `bulk_upsert` is a transport-level failure for the whole request;
/// per-document rejections come back inside the [`BulkOutcome`].
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn index_exists(&self, name: &str) -> Result<bool>;

    async fn create_index(&self, name: &str, mapping: &JsonValue) -> Result<()>;

    async fn delete_index(&self, name: &str) -> Result<()>;

    async fn bulk_upsert(
        &self,
        index: &str,
        actions: &[IndexAction],
        refresh: bool,
    ) -> Result<BulkOutcome>;

    /// Number of documents currently in an index
    async fn count(&self, name: &str) -> Result<u64>;

    /// Raw search passthrough against an index name or pattern
    async fn search(&self, index_pattern: &str, query: &JsonValue) -> Result<JsonValue>;
}
