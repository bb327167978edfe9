//! Per-kind field-type mappings for index creation

use serde_json::{json, Value as JsonValue};

use crate::config::SyncConfig;
use crate::sync::EntityKind;

/// Full index body (mappings + settings) for one entity kind
pub fn mapping_for(kind: EntityKind, config: &SyncConfig) -> JsonValue {
    json!({
        "mappings": { "properties": properties_for(kind) },
        "settings": { "refresh_interval": config.refresh_interval }
    })
}

fn properties_for(kind: EntityKind) -> JsonValue {
    let mut properties = match kind {
        EntityKind::Ticket => json!({
            "ticket_id": {"type": "keyword"},
            "ticket_number": {"type": "long"},
            "ticket_scheduleDate": {"type": "date"},
            "ticket_scheduleDateEnd": {"type": "date"},
            "ticket_data": {"type": "object"},
            "ticket_createdAt": {"type": "date"},
            "ticket_updatedAt": {"type": "date"},
            "status_id": {"type": "keyword"},
            "status_name": {"type": "keyword"},
            "status_isFinalStatus": {"type": "boolean"},
            "labels": {
                "type": "nested",
                "properties": {
                    "id": {"type": "keyword"},
                    "name": {"type": "keyword"},
                    "color": {"type": "keyword"}
                }
            },
            "module_id": {"type": "keyword"},
            "module_name": {"type": "keyword"},
            "datasource_id": {"type": "keyword"},
            "datasource_name": {"type": "keyword"},
            "user_id": {"type": "keyword"},
            "user_name": {"type": "keyword"},
            "user_email": {"type": "keyword"}
        }),
        EntityKind::Status => json!({
            "status_id": {"type": "keyword"},
            "status_name": {"type": "keyword"},
            "status_isFinalStatus": {"type": "boolean"},
            "status_description": {"type": "text"},
            "status_moduleId": {"type": "keyword"},
            "status_isVisible": {"type": "boolean"},
            "status_createdAt": {"type": "date"},
            "status_updatedAt": {"type": "date"}
        }),
        EntityKind::Label => json!({
            "label_id": {"type": "keyword"},
            "label_name": {"type": "keyword"},
            "label_description": {"type": "text"},
            "label_moduleId": {"type": "keyword"},
            "label_color": {"type": "keyword"},
            "label_icon": {"type": "keyword"},
            "label_type": {"type": "keyword"},
            "label_isVisible": {"type": "boolean"},
            "label_createdAt": {"type": "date"},
            "label_updatedAt": {"type": "date"}
        }),
        EntityKind::Module => json!({
            "module_id": {"type": "keyword"},
            "module_name": {"type": "keyword"},
            "module_description": {"type": "text"},
            "module_type": {"type": "keyword"},
            "module_icon": {"type": "keyword"},
            "module_logo": {"type": "keyword"},
            "module_createdAt": {"type": "date"},
            "module_updatedAt": {"type": "date"},
            "parent_module_id": {"type": "keyword"},
            "parent_module_name": {"type": "keyword"},
            "statuses": {
                "type": "nested",
                "properties": {
                    "id": {"type": "keyword"},
                    "name": {"type": "keyword"},
                    "description": {"type": "text"},
                    "isFinalStatus": {"type": "boolean"},
                    "isVisible": {"type": "boolean"},
                    "createdAt": {"type": "date"},
                    "updatedAt": {"type": "date"}
                }
            },
            "labels": {
                "type": "nested",
                "properties": {
                    "id": {"type": "keyword"},
                    "name": {"type": "keyword"},
                    "description": {"type": "text"},
                    "color": {"type": "keyword"},
                    "icon": {"type": "keyword"},
                    "type": {"type": "keyword"},
                    "isVisible": {"type": "boolean"},
                    "createdAt": {"type": "date"},
                    "updatedAt": {"type": "date"}
                }
            },
            "data_sources": {
                "type": "nested",
                "properties": {
                    "id": {"type": "keyword"},
                    "name": {"type": "keyword"},
                    "description": {"type": "text"},
                    "entityName": {"type": "keyword"},
                    "gatewayType": {"type": "keyword"},
                    "gatewayId": {"type": "keyword"},
                    "dailyLimit": {"type": "integer"},
                    "wipEnabled": {"type": "boolean"},
                    "wipValue": {"type": "integer"},
                    "createdAt": {"type": "date"},
                    "updatedAt": {"type": "date"}
                }
            }
        }),
        EntityKind::DataSource => json!({
            "data_source_id": {"type": "keyword"},
            "data_source_name": {"type": "keyword"},
            "data_source_description": {"type": "text"},
            "data_source_dataMap": {"type": "object"},
            "data_source_entityName": {"type": "keyword"},
            "data_source_coverVisibleData": {"type": "text"},
            "data_source_gatewayType": {"type": "keyword"},
            "data_source_gatewayId": {"type": "keyword"},
            "data_source_moduleId": {"type": "keyword"},
            "data_source_statusId": {"type": "keyword"},
            "data_source_voidStatusId": {"type": "keyword"},
            "data_source_dailyLimit": {"type": "integer"},
            "data_source_wipEnabled": {"type": "boolean"},
            "data_source_wipValue": {"type": "integer"},
            "data_source_createdAt": {"type": "date"},
            "data_source_updatedAt": {"type": "date"}
        }),
        EntityKind::User => json!({
            "user_id": {"type": "keyword"},
            "user_name": {"type": "keyword"},
            "user_username": {"type": "keyword"},
            "user_email": {"type": "keyword"},
            "user_preferences": {"type": "object"},
            "user_createdAt": {"type": "date"},
            "user_updatedAt": {"type": "date"}
        }),
    };

    // Identity tracking fields are present in every index so a run can
    // switch strategies without a mapping conflict
    if let Some(map) = properties.as_object_mut() {
        map.insert("document_id".to_string(), json!({"type": "keyword"}));
        map.insert("indexed_at".to_string(), json!({"type": "date"}));
    }

    properties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_settings_and_identity_fields() {
        let config = SyncConfig::default();
        for kind in EntityKind::pass_order() {
            let mapping = mapping_for(kind, &config);
            assert_eq!(
                mapping["settings"]["refresh_interval"],
                serde_json::json!("1s")
            );
            let properties = &mapping["mappings"]["properties"];
            assert_eq!(properties["document_id"]["type"], "keyword");
            assert_eq!(properties["indexed_at"]["type"], "date");
            assert!(properties[kind.id_field()].is_object());
        }
    }

    #[test]
    fn test_ticket_mapping_has_nested_labels() {
        let mapping = mapping_for(EntityKind::Ticket, &SyncConfig::default());
        assert_eq!(
            mapping["mappings"]["properties"]["labels"]["type"],
            serde_json::json!("nested")
        );
    }
}
