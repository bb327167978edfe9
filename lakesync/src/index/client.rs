//! HTTP client for the document index store REST API

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};

use crate::config::IndexConfig;

use super::{BulkFailure, BulkOutcome, IndexAction, IndexStore};

/// Index store client speaking the Elasticsearch-compatible REST API
pub struct SearchIndexClient {
    http: reqwest::Client,
    base_url: String,
}

impl SearchIndexClient {
    pub fn new(config: &IndexConfig) -> Self {
        log::info!("Using index store at {}", config.base_url());
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Render actions as NDJSON for the `_bulk` endpoint: one action line
    /// followed by one source line per document.
    fn bulk_body(index: &str, actions: &[IndexAction]) -> Result<String> {
        let mut body = String::new();
        for action in actions {
            let header = json!({"index": {"_index": index, "_id": action.id}});
            body.push_str(&serde_json::to_string(&header)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&action.document)?);
            body.push('\n');
        }
        Ok(body)
    }

    /// Extract per-document rejections from a bulk response body
    fn parse_bulk_response(response: &JsonValue, total: u64) -> BulkOutcome {
        let Some(items) = response.get("items").and_then(|v| v.as_array()) else {
            return BulkOutcome::all_succeeded(total);
        };

        let mut failures = Vec::new();
        for item in items {
            let Some(entry) = item.get("index") else {
                continue;
            };
            if let Some(error) = entry.get("error") {
                failures.push(BulkFailure {
                    id: entry
                        .get("_id")
                        .and_then(|v| v.as_str())
                        .unwrap_or("(unknown)")
                        .to_string(),
                    reason: error.to_string(),
                });
            }
        }

        BulkOutcome {
            success_count: total - failures.len() as u64,
            failures,
        }
    }
}

#[async_trait]
impl IndexStore for SearchIndexClient {
    async fn index_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .http
            .head(self.url(name))
            .send()
            .await
            .with_context(|| format!("Failed to check index '{}'", name))?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => anyhow::bail!("Unexpected status {} checking index '{}'", status, name),
        }
    }

    async fn create_index(&self, name: &str, mapping: &JsonValue) -> Result<()> {
        log::info!("Creating index '{}'", name);
        let response = self
            .http
            .put(self.url(name))
            .json(mapping)
            .send()
            .await
            .with_context(|| format!("Failed to create index '{}'", name))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Index creation for '{}' failed ({}): {}", name, status, body);
        }
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        log::info!("Deleting index '{}'", name);
        let response = self
            .http
            .delete(self.url(name))
            .send()
            .await
            .with_context(|| format!("Failed to delete index '{}'", name))?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            anyhow::bail!(
                "Index deletion for '{}' failed with status {}",
                name,
                response.status()
            );
        }
        Ok(())
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        actions: &[IndexAction],
        refresh: bool,
    ) -> Result<BulkOutcome> {
        if actions.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let body = Self::bulk_body(index, actions)?;
        let refresh_param = if refresh { "true" } else { "false" };

        let response = self
            .http
            .post(self.url(&format!("_bulk?refresh={}", refresh_param)))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .context("Bulk upsert request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Bulk upsert failed with status {}", response.status());
        }

        let parsed: JsonValue = response
            .json()
            .await
            .context("Failed to parse bulk response")?;

        let outcome = Self::parse_bulk_response(&parsed, actions.len() as u64);
        if !outcome.failures.is_empty() {
            log::warn!(
                "Bulk upsert to '{}' completed with {} rejections",
                index,
                outcome.failures.len()
            );
        }
        Ok(outcome)
    }

    async fn count(&self, name: &str) -> Result<u64> {
        let response: JsonValue = self
            .http
            .get(self.url(&format!("{}/_count", name)))
            .send()
            .await
            .with_context(|| format!("Failed to count documents in '{}'", name))?
            .json()
            .await
            .context("Failed to parse count response")?;

        Ok(response.get("count").and_then(|v| v.as_u64()).unwrap_or(0))
    }

    async fn search(&self, index_pattern: &str, query: &JsonValue) -> Result<JsonValue> {
        let response = self
            .http
            .post(self.url(&format!("{}/_search", index_pattern)))
            .json(query)
            .send()
            .await
            .with_context(|| format!("Search against '{}' failed", index_pattern))?;

        if !response.status().is_success() {
            anyhow::bail!("Search failed with status {}", response.status());
        }

        response.json().await.context("Failed to parse search response")
    }
}
