//! Relational source collaborator
//!
//! Read-only extraction of ticketing-domain rowsets, soft-deleted rows
//! excluded. The production implementation is [`PgSource`]; the sync engine
//! only sees the [`RecordSource`] trait.

pub mod postgres;
pub mod row;
pub mod value;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::sync::EntityKind;

pub use postgres::PgSource;
pub use value::{SourceRecord, SourceValue};

/// Read-only access to the relational source of truth
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Defensive schema introspection before a sync run. Logs missing
    /// tables; only unreachable-database conditions are errors.
    async fn verify_schema(&self) -> Result<()>;

    /// Number of live (non-soft-deleted) rows for a kind
    async fn count(&self, kind: EntityKind) -> Result<u64>;

    /// One page of rows for a kind, ordered by a stable key. Ticket pages
    /// are the denormalized join rows (module, data source, user inline).
    async fn fetch_page(&self, kind: EntityKind, offset: u64, limit: u32)
        -> Result<Vec<SourceRecord>>;

    /// Single row by natural id, for the narrow sync-one trigger
    async fn fetch_by_id(&self, kind: EntityKind, id: Uuid) -> Result<Option<SourceRecord>>;

    /// Full TicketStatus history joined with Status (latest-status input)
    async fn status_history(&self) -> Result<Vec<SourceRecord>>;

    /// TicketLabel join rows with label name and color (labels-per-ticket input)
    async fn ticket_labels(&self) -> Result<Vec<SourceRecord>>;
}

/// Drain every page of a kind into one rowset
pub async fn fetch_all(
    source: &dyn RecordSource,
    kind: EntityKind,
    page_size: u32,
) -> Result<Vec<SourceRecord>> {
    let mut rows = Vec::new();
    let mut offset = 0u64;

    loop {
        let page = source.fetch_page(kind, offset, page_size).await?;
        let fetched = page.len();
        rows.extend(page);
        if fetched < page_size as usize {
            break;
        }
        offset += fetched as u64;
    }

    Ok(rows)
}
