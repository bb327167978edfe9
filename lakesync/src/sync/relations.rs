//! Relationship Resolver
//!
//! Derived relationships that are not direct foreign keys on the extracted
//! rows: current status per ticket, label lists per ticket, and child
//! rowsets per module. All resolvers are pure functions over freshly
//! extracted rowsets; an owner with no matches gets an empty collection,
//! never an error.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::sanitize::sanitize_value;
use crate::source::{SourceRecord, SourceValue};

/// Authoritative status for one ticket (latest status-history row)
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentStatus {
    pub status_id: String,
    pub name: Option<String>,
    pub is_final: Option<bool>,
}

/// One label attached to a ticket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelRef {
    pub id: String,
    pub name: Option<String>,
    pub color: Option<String>,
}

/// Resolved relationships handed to the entity mappers for one pass
#[derive(Debug, Clone, Default)]
pub struct RelationContext {
    pub status_by_ticket: HashMap<String, CurrentStatus>,
    pub labels_by_ticket: HashMap<String, Vec<LabelRef>>,
    pub statuses_by_module: HashMap<String, Vec<JsonValue>>,
    pub labels_by_module: HashMap<String, Vec<JsonValue>>,
    pub data_sources_by_module: HashMap<String, Vec<JsonValue>>,
    pub module_names: HashMap<String, String>,
}

/// Select the latest status-history row per ticket.
///
/// Ties on `createdAt` break by status id (lexicographic max), so the
/// result is deterministic regardless of input ordering.
pub fn latest_status_per_ticket(rows: &[SourceRecord]) -> HashMap<String, CurrentStatus> {
    // (createdAt, statusId) is a total order over history rows
    let mut best: HashMap<String, (DateTime<Utc>, String, CurrentStatus)> = HashMap::new();

    for row in rows {
        let Some(ticket_id) = row.id_string("ticketId") else {
            continue;
        };
        let Some(status_id) = row.id_string("statusId") else {
            continue;
        };
        let created = row
            .get_present("createdAt")
            .and_then(|v| v.as_timestamp())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let candidate = CurrentStatus {
            status_id: status_id.clone(),
            name: row.id_string("status_name"),
            is_final: row.get_present("isFinalStatus").and_then(|v| v.as_bool()),
        };

        match best.get(&ticket_id) {
            Some((best_created, best_status, _))
                if (*best_created, best_status.as_str()) >= (created, status_id.as_str()) => {}
            _ => {
                best.insert(ticket_id, (created, status_id, candidate));
            }
        }
    }

    best.into_iter().map(|(k, (_, _, v))| (k, v)).collect()
}

/// Group label join rows per ticket, preserving input order
pub fn labels_per_ticket(rows: &[SourceRecord]) -> HashMap<String, Vec<LabelRef>> {
    let mut grouped: HashMap<String, Vec<LabelRef>> = HashMap::new();

    for row in rows {
        let Some(ticket_id) = row.id_string("ticketId") else {
            continue;
        };
        let Some(label_id) = row.id_string("label_id") else {
            continue;
        };

        grouped.entry(ticket_id).or_default().push(LabelRef {
            id: label_id,
            name: row.id_string("label_name"),
            color: row.id_string("color"),
        });
    }

    grouped
}

/// Group child rows (statuses, labels, data sources) by their owning module.
/// Each child becomes a sanitized sub-document carrying the whole row.
pub fn children_per_module(rows: &[SourceRecord]) -> HashMap<String, Vec<JsonValue>> {
    let mut grouped: HashMap<String, Vec<JsonValue>> = HashMap::new();

    for row in rows {
        let Some(module_id) = row.id_string("moduleId") else {
            continue;
        };
        let fields: BTreeMap<String, SourceValue> =
            row.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        grouped
            .entry(module_id)
            .or_default()
            .push(sanitize_value(&SourceValue::Record(fields)));
    }

    grouped
}

/// Module id → display name, used to resolve a parent module's name
pub fn module_names(rows: &[SourceRecord]) -> HashMap<String, String> {
    rows.iter()
        .filter_map(|row| {
            let id = row.id_string("id")?;
            let name = row.id_string("name")?;
            Some((id, name))
        })
        .collect()
}
