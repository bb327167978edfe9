//! Postgres implementation of the RecordSource trait

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::sync::EntityKind;

use super::row::decode_row;
use super::value::SourceRecord;
use super::RecordSource;

/// Tables the sync engine reads from
const SYNC_TABLES: [&str; 8] = [
    "Ticket",
    "TicketStatus",
    "TicketLabel",
    "Status",
    "Label",
    "Module",
    "User",
    "DataSource",
];

/// Relational source backed by a Postgres connection pool
pub struct PgSource {
    pool: PgPool,
    schema: String,
}

impl PgSource {
    /// Connect and resolve the working schema. The configured schema is
    /// preferred; when it does not exist the default `public` schema is
    /// used instead, with a warning.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        log::info!(
            "Connecting to database at {}:{}/{}",
            config.host,
            config.port,
            config.database
        );

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.connection_url())
            .await
            .context("Failed to connect to database")?;

        let schema = resolve_schema(&pool, &config.schema).await?;

        Ok(Self { pool, schema })
    }

    fn qualified(&self, table: &str) -> String {
        format!(r#""{}"."{}""#, self.schema, table)
    }

    /// Denormalized ticket projection: module, data source and user joined
    /// inline. Status and labels are attached later from resolver rowsets.
    fn ticket_select(&self) -> String {
        format!(
            r#"
            SELECT
                t.id AS ticket_id,
                t."number" AS ticket_number,
                t."scheduleDate" AS "ticket_scheduleDate",
                t."scheduleDateEnd" AS "ticket_scheduleDateEnd",
                t."data" AS ticket_data,
                t."createdAt" AS "ticket_createdAt",
                t."updatedAt" AS "ticket_updatedAt",
                m.id AS module_id,
                m."name" AS module_name,
                ds.id AS datasource_id,
                ds."name" AS datasource_name,
                u.id AS user_id,
                u."name" AS user_name,
                u.email AS user_email
            FROM {ticket} t
            LEFT JOIN {module} m ON t."moduleId" = m.id
            LEFT JOIN {datasource} ds ON t."dataSourceId" = ds.id
            LEFT JOIN {user} u ON t."userId" = u.id
            WHERE t."deletedAt" IS NULL
            "#,
            ticket = self.qualified("Ticket"),
            module = self.qualified("Module"),
            datasource = self.qualified("DataSource"),
            user = self.qualified("User"),
        )
    }
}

async fn resolve_schema(pool: &PgPool, preferred: &str) -> Result<String> {
    let exists: Option<(String,)> =
        sqlx::query_as("SELECT schema_name FROM information_schema.schemata WHERE schema_name = $1")
            .bind(preferred)
            .fetch_optional(pool)
            .await
            .context("Failed to inspect database schemas")?;

    match exists {
        Some(_) => Ok(preferred.to_string()),
        None => {
            log::warn!(
                "Schema '{}' not found, falling back to 'public'",
                preferred
            );
            Ok("public".to_string())
        }
    }
}

#[async_trait]
impl RecordSource for PgSource {
    async fn verify_schema(&self) -> Result<()> {
        log::info!("Verifying source schema '{}'", self.schema);

        let rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = $1",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list source tables")?;

        let present: Vec<String> = rows
            .iter()
            .filter_map(|r| r.try_get::<String, _>("table_name").ok())
            .collect();

        for table in SYNC_TABLES {
            if !present.iter().any(|t| t == table) {
                log::warn!("Expected table '{}' missing in schema '{}'", table, self.schema);
            }
        }

        Ok(())
    }

    async fn count(&self, kind: EntityKind) -> Result<u64> {
        let query = format!(
            r#"SELECT COUNT(*) FROM {} WHERE "deletedAt" IS NULL"#,
            self.qualified(kind.table())
        );

        let (count,): (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", kind))?;

        Ok(count as u64)
    }

    async fn fetch_page(
        &self,
        kind: EntityKind,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<SourceRecord>> {
        let query = match kind {
            EntityKind::Ticket => format!(
                r#"{} ORDER BY t."number" LIMIT $1 OFFSET $2"#,
                self.ticket_select()
            ),
            other => format!(
                r#"SELECT * FROM {} WHERE "deletedAt" IS NULL ORDER BY id LIMIT $1 OFFSET $2"#,
                self.qualified(other.table())
            ),
        };

        let rows = sqlx::query(&query)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch {} page at offset {}", kind, offset))?;

        Ok(rows.iter().map(decode_row).collect())
    }

    async fn fetch_by_id(&self, kind: EntityKind, id: Uuid) -> Result<Option<SourceRecord>> {
        let query = match kind {
            EntityKind::Ticket => format!("{} AND t.id = $1", self.ticket_select()),
            other => format!(
                r#"SELECT * FROM {} WHERE id = $1 AND "deletedAt" IS NULL"#,
                self.qualified(other.table())
            ),
        };

        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch {} {}", kind, id))?;

        Ok(row.as_ref().map(decode_row))
    }

    async fn status_history(&self) -> Result<Vec<SourceRecord>> {
        let query = format!(
            r#"
            SELECT
                ts."ticketId",
                ts."statusId",
                s."name" AS status_name,
                s."isFinalStatus",
                ts."createdAt"
            FROM {ticket_status} ts
            JOIN {status} s ON ts."statusId" = s.id
            WHERE ts."deletedAt" IS NULL
            "#,
            ticket_status = self.qualified("TicketStatus"),
            status = self.qualified("Status"),
        );

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch status history")?;

        Ok(rows.iter().map(decode_row).collect())
    }

    async fn ticket_labels(&self) -> Result<Vec<SourceRecord>> {
        let query = format!(
            r#"
            SELECT
                tl."ticketId",
                l.id AS label_id,
                l."name" AS label_name,
                l.color
            FROM {ticket_label} tl
            JOIN {label} l ON tl."labelId" = l.id
            WHERE tl."deletedAt" IS NULL
            "#,
            ticket_label = self.qualified("TicketLabel"),
            label = self.qualified("Label"),
        );

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch ticket labels")?;

        Ok(rows.iter().map(decode_row).collect())
    }
}
