//! Entity Mapper
//!
//! One `DocumentMapper` per entity kind turns a raw extracted row into the
//! canonical document shape via a fixed field-rename table, attaching the
//! resolved relationships. Document identity (index key, and the
//! `indexed_at`/`document_id` fields under the historical-append strategy)
//! is applied after mapping, once per pass timestamp.

use serde_json::Value as JsonValue;

use crate::config::IdentityStrategy;
use crate::sanitize::{parse_embedded_json, sanitize_record, sanitize_value};
use crate::source::SourceRecord;

use super::kind::EntityKind;
use super::relations::RelationContext;

/// Flat JSON document bound for the index
pub type Document = serde_json::Map<String, JsonValue>;

/// A single row failed to map; the document is skipped and counted,
/// the rest of the batch proceeds.
#[derive(Debug, Clone)]
pub struct MapError {
    pub message: String,
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MapError {}

impl MapError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Maps raw rows of one entity kind into canonical documents
pub trait DocumentMapper: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn map(&self, record: &SourceRecord, relations: &RelationContext)
        -> Result<Document, MapError>;
}

/// Mapper lookup for the generic controller
pub fn mapper_for(kind: EntityKind) -> Box<dyn DocumentMapper> {
    match kind {
        EntityKind::Ticket => Box::new(TicketMapper),
        EntityKind::Status => Box::new(StatusMapper),
        EntityKind::Label => Box::new(LabelMapper),
        EntityKind::Module => Box::new(ModuleMapper),
        EntityKind::DataSource => Box::new(DataSourceMapper),
        EntityKind::User => Box::new(UserMapper),
    }
}

/// Derive the index key for a mapped document and, under historical
/// append, stamp the identity tracking fields onto it.
pub fn apply_identity(
    doc: &mut Document,
    kind: EntityKind,
    strategy: IdentityStrategy,
    indexed_at: &str,
) -> Result<String, MapError> {
    let natural_id = doc
        .get(kind.id_field())
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| MapError::new(format!("Document is missing '{}'", kind.id_field())))?;

    match strategy {
        IdentityStrategy::StableKey => Ok(natural_id),
        IdentityStrategy::HistoricalAppend => {
            let document_id = format!("{}_{}", natural_id, indexed_at);
            doc.insert("indexed_at".to_string(), JsonValue::String(indexed_at.to_string()));
            doc.insert("document_id".to_string(), JsonValue::String(document_id.clone()));
            Ok(document_id)
        }
    }
}

/// Copy `source` column into `target` document field, sanitized. Absent
/// columns become explicit nulls so the document shape stays fixed.
fn rename_fields(record: &SourceRecord, table: &[(&str, &str)]) -> Document {
    let mut doc = Document::new();
    for (source, target) in table {
        let value = record
            .get(source)
            .map(sanitize_value)
            .unwrap_or(JsonValue::Null);
        doc.insert((*target).to_string(), value);
    }
    doc
}

/// Warn when a column that should carry embedded JSON holds an unparseable
/// string. The string itself is kept (sanitization already did so).
fn warn_unparsed_json(record: &SourceRecord, column: &str, kind: EntityKind, id: &str) {
    if let Some(s) = record.get(column).and_then(|v| v.as_str()) {
        let looks_structured = s.trim_start().starts_with('{') || s.trim_start().starts_with('[');
        if looks_structured && parse_embedded_json(s).is_none() {
            log::warn!("Column '{}' is not valid JSON for {} {}", column, kind, id);
        }
    }
}

struct TicketMapper;

impl DocumentMapper for TicketMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::Ticket
    }

    fn map(
        &self,
        record: &SourceRecord,
        relations: &RelationContext,
    ) -> Result<Document, MapError> {
        let ticket_id = record
            .id_string("ticket_id")
            .ok_or_else(|| MapError::new("Ticket row has no id"))?;

        // The denormalized join row already carries canonical field names;
        // every column passes through sanitized.
        let mut doc = sanitize_record(record);
        warn_unparsed_json(record, "ticket_data", self.kind(), &ticket_id);

        // Current status from the resolver; absent history means explicit nulls
        let status = relations.status_by_ticket.get(&ticket_id);
        doc.insert(
            "status_id".to_string(),
            status
                .map(|s| JsonValue::String(s.status_id.clone()))
                .unwrap_or(JsonValue::Null),
        );
        doc.insert(
            "status_name".to_string(),
            status
                .and_then(|s| s.name.clone())
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        );
        doc.insert(
            "status_isFinalStatus".to_string(),
            status
                .and_then(|s| s.is_final)
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
        );

        // Labels are always a list, empty when the ticket has none
        let labels = relations
            .labels_by_ticket
            .get(&ticket_id)
            .cloned()
            .unwrap_or_default();
        let labels = serde_json::to_value(labels)
            .map_err(|e| MapError::new(format!("Label list for ticket {}: {}", ticket_id, e)))?;
        doc.insert("labels".to_string(), labels);

        Ok(doc)
    }
}

struct StatusMapper;

const STATUS_FIELDS: &[(&str, &str)] = &[
    ("id", "status_id"),
    ("name", "status_name"),
    ("isFinalStatus", "status_isFinalStatus"),
    ("description", "status_description"),
    ("moduleId", "status_moduleId"),
    ("isVisible", "status_isVisible"),
    ("createdAt", "status_createdAt"),
    ("updatedAt", "status_updatedAt"),
];

impl DocumentMapper for StatusMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::Status
    }

    fn map(&self, record: &SourceRecord, _: &RelationContext) -> Result<Document, MapError> {
        record
            .id_string("id")
            .ok_or_else(|| MapError::new("Status row has no id"))?;
        Ok(rename_fields(record, STATUS_FIELDS))
    }
}

struct LabelMapper;

const LABEL_FIELDS: &[(&str, &str)] = &[
    ("id", "label_id"),
    ("name", "label_name"),
    ("description", "label_description"),
    ("moduleId", "label_moduleId"),
    ("color", "label_color"),
    ("icon", "label_icon"),
    ("type", "label_type"),
    ("isVisible", "label_isVisible"),
    ("createdAt", "label_createdAt"),
    ("updatedAt", "label_updatedAt"),
];

impl DocumentMapper for LabelMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::Label
    }

    fn map(&self, record: &SourceRecord, _: &RelationContext) -> Result<Document, MapError> {
        record
            .id_string("id")
            .ok_or_else(|| MapError::new("Label row has no id"))?;
        Ok(rename_fields(record, LABEL_FIELDS))
    }
}

struct ModuleMapper;

const MODULE_FIELDS: &[(&str, &str)] = &[
    ("id", "module_id"),
    ("name", "module_name"),
    ("description", "module_description"),
    ("type", "module_type"),
    ("icon", "module_icon"),
    ("logo", "module_logo"),
    ("createdAt", "module_createdAt"),
    ("updatedAt", "module_updatedAt"),
];

impl DocumentMapper for ModuleMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::Module
    }

    fn map(
        &self,
        record: &SourceRecord,
        relations: &RelationContext,
    ) -> Result<Document, MapError> {
        let module_id = record
            .id_string("id")
            .ok_or_else(|| MapError::new("Module row has no id"))?;

        let mut doc = rename_fields(record, MODULE_FIELDS);

        // Child collections default to empty, never absent
        for (field, grouped) in [
            ("statuses", &relations.statuses_by_module),
            ("labels", &relations.labels_by_module),
            ("data_sources", &relations.data_sources_by_module),
        ] {
            let children = grouped.get(&module_id).cloned().unwrap_or_default();
            doc.insert(field.to_string(), JsonValue::Array(children));
        }

        if let Some(parent_id) = record.id_string("parentId") {
            if let Some(parent_name) = relations.module_names.get(&parent_id) {
                doc.insert(
                    "parent_module_id".to_string(),
                    JsonValue::String(parent_id),
                );
                doc.insert(
                    "parent_module_name".to_string(),
                    JsonValue::String(parent_name.clone()),
                );
            }
        }

        Ok(doc)
    }
}

struct DataSourceMapper;

const DATA_SOURCE_FIELDS: &[(&str, &str)] = &[
    ("id", "data_source_id"),
    ("name", "data_source_name"),
    ("description", "data_source_description"),
    ("dataMap", "data_source_dataMap"),
    ("entityName", "data_source_entityName"),
    ("coverVisibleData", "data_source_coverVisibleData"),
    ("gatewayType", "data_source_gatewayType"),
    ("gatewayId", "data_source_gatewayId"),
    ("moduleId", "data_source_moduleId"),
    ("statusId", "data_source_statusId"),
    ("voidStatusId", "data_source_voidStatusId"),
    ("dailyLimit", "data_source_dailyLimit"),
    ("wipEnabled", "data_source_wipEnabled"),
    ("wipValue", "data_source_wipValue"),
    ("createdAt", "data_source_createdAt"),
    ("updatedAt", "data_source_updatedAt"),
];

impl DocumentMapper for DataSourceMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::DataSource
    }

    fn map(&self, record: &SourceRecord, _: &RelationContext) -> Result<Document, MapError> {
        let id = record
            .id_string("id")
            .ok_or_else(|| MapError::new("DataSource row has no id"))?;
        warn_unparsed_json(record, "dataMap", self.kind(), &id);
        Ok(rename_fields(record, DATA_SOURCE_FIELDS))
    }
}

struct UserMapper;

const USER_FIELDS: &[(&str, &str)] = &[
    ("id", "user_id"),
    ("name", "user_name"),
    ("username", "user_username"),
    ("email", "user_email"),
    ("preferences", "user_preferences"),
    ("createdAt", "user_createdAt"),
    ("updatedAt", "user_updatedAt"),
];

impl DocumentMapper for UserMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::User
    }

    fn map(&self, record: &SourceRecord, _: &RelationContext) -> Result<Document, MapError> {
        let id = record
            .id_string("id")
            .ok_or_else(|| MapError::new("User row has no id"))?;
        warn_unparsed_json(record, "preferences", self.kind(), &id);
        Ok(rename_fields(record, USER_FIELDS))
    }
}
