//! Process configuration
//!
//! All settings come from the environment (optionally via a `.env` file
//! loaded in main). Each component receives an explicit config value at
//! construction; nothing reads the environment after startup.

use anyhow::{Context, Result};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Relational source connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Schema holding the replicated ticketing tables; falls back to
    /// `public` at connect time when absent
    pub schema: String,
}

impl DatabaseConfig {
    /// Read `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER`, `DB_PASSWORD`,
    /// `DB_SCHEMA` from the environment.
    pub fn from_env() -> Result<Self> {
        let port = env_or("DB_PORT", "5432")
            .parse::<u16>()
            .context("DB_PORT is not a valid port number")?;

        Ok(Self {
            host: env_or("DB_HOST", "localhost"),
            port,
            database: env_or("DB_NAME", "tickets"),
            user: env_or("DB_USER", "postgres"),
            password: env_or("DB_PASSWORD", "postgres"),
            schema: env_or("DB_SCHEMA", "copy"),
        })
    }

    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Document index store connection settings
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl IndexConfig {
    /// Read `ES_SCHEME`, `ES_HOST`, `ES_PORT` from the environment.
    pub fn from_env() -> Result<Self> {
        let port = env_or("ES_PORT", "9200")
            .parse::<u16>()
            .context("ES_PORT is not a valid port number")?;

        Ok(Self {
            scheme: env_or("ES_SCHEME", "http"),
            host: env_or("ES_HOST", "localhost"),
            port,
        })
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Document identity strategy for one sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStrategy {
    /// Natural id as index key: re-syncs overwrite in place and the index
    /// is destroyed and recreated at the start of each pass
    StableKey,
    /// Natural id suffixed with the pass timestamp: every pass appends new
    /// documents and the index is only created when missing
    HistoricalAppend,
}

/// Sync engine settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Rows per bulk request (capped by the controller)
    pub batch_size: usize,
    /// Namespacing prefix for every index name
    pub index_prefix: String,
    /// Index near-real-time search latency setting
    pub refresh_interval: String,
    pub identity: IdentityStrategy,
}

impl SyncConfig {
    /// Read `SYNC_BATCH_SIZE`, `SYNC_INDEX_PREFIX`, `SYNC_REFRESH_INTERVAL`,
    /// `SYNC_IDENTITY` (`stable` | `append`) from the environment.
    pub fn from_env() -> Result<Self> {
        let batch_size = env_or("SYNC_BATCH_SIZE", "1000")
            .parse::<usize>()
            .context("SYNC_BATCH_SIZE is not a valid number")?;

        let identity = match env_or("SYNC_IDENTITY", "stable").as_str() {
            "stable" => IdentityStrategy::StableKey,
            "append" => IdentityStrategy::HistoricalAppend,
            other => anyhow::bail!("SYNC_IDENTITY must be 'stable' or 'append', got '{}'", other),
        };

        Ok(Self {
            batch_size,
            index_prefix: env_or("SYNC_INDEX_PREFIX", "data_lake_"),
            refresh_interval: env_or("SYNC_REFRESH_INTERVAL", "1s"),
            identity,
        })
    }

    /// Full index name for an entity kind
    pub fn index_name(&self, kind: crate::sync::EntityKind) -> String {
        format!("{}{}", self.index_prefix, kind.index_suffix())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            index_prefix: "data_lake_".to_string(),
            refresh_interval: "1s".to_string(),
            identity: IdentityStrategy::StableKey,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::EntityKind;

    #[test]
    fn test_index_name_uses_prefix_and_suffix() {
        let config = SyncConfig::default();
        assert_eq!(
            config.index_name(EntityKind::Ticket),
            "data_lake_denormalized_tickets"
        );
        assert_eq!(config.index_name(EntityKind::DataSource), "data_lake_data_sources");
    }
}
