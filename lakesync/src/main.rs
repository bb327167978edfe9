mod config;
mod index;
mod sanitize;
mod source;
mod sync;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use config::{DatabaseConfig, IndexConfig, SyncConfig};
use index::{IndexStore, SearchIndexClient};
use source::{PgSource, RecordSource};
use sync::{BatchSyncController, EntityKind, SyncOrchestrator};

#[derive(Parser)]
#[command(name = "lakesync")]
#[command(about = "Sync ticketing-domain records into a document search index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full sync, or a single kind's pass with --kind
    Sync {
        /// Restrict the run to one entity kind
        #[arg(long, value_enum)]
        kind: Option<EntityKind>,
    },
    /// Sync a single entity by id
    SyncOne {
        #[arg(long, value_enum)]
        kind: EntityKind,
        /// Natural id of the source row
        #[arg(long)]
        id: Uuid,
    },
    /// Run a raw search against a kind's index and print the response
    Search {
        #[arg(long, value_enum)]
        kind: EntityKind,
        /// Query body as JSON; defaults to match_all
        #[arg(long)]
        query: Option<String>,
    },
    /// Check that the expected source tables exist
    VerifySchema,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let db_config = DatabaseConfig::from_env()?;
    let index_config = IndexConfig::from_env()?;
    let sync_config = SyncConfig::from_env()?;

    match cli.command {
        Commands::Sync { kind } => {
            let source = PgSource::connect(&db_config).await?;
            let store = SearchIndexClient::new(&index_config);
            source.verify_schema().await?;

            let orchestrator = SyncOrchestrator::new(&source, &store, &sync_config);
            let summary = match kind {
                Some(kind) => orchestrator.run(&[kind]).await?,
                None => orchestrator.run_all().await?,
            };

            for report in &summary.reports {
                log::info!(
                    "{} -> '{}': {}/{} indexed, {} failed",
                    report.kind,
                    report.index_name,
                    report.succeeded,
                    report.total_rows,
                    report.failed
                );
            }
            if !summary.is_clean() {
                log::warn!("Sync finished with failures; see the log above");
            }
            if !summary.errors.is_empty() {
                let kinds: Vec<String> = summary
                    .errors
                    .iter()
                    .map(|e| e.kind().to_string())
                    .collect();
                anyhow::bail!("Passes failed for: {}", kinds.join(", "));
            }
        }
        Commands::SyncOne { kind, id } => {
            let source = PgSource::connect(&db_config).await?;
            let store = SearchIndexClient::new(&index_config);

            let orchestrator = SyncOrchestrator::new(&source, &store, &sync_config);
            let relations = orchestrator.build_relations().await?;
            let controller = BatchSyncController::new(&source, &store, &sync_config);
            let key = controller
                .sync_one(sync::mapper_for(kind).as_ref(), &relations, id)
                .await?;
            println!("{}", key);
        }
        Commands::Search { kind, query } => {
            let store = SearchIndexClient::new(&index_config);
            let body = match query {
                Some(raw) => serde_json::from_str(&raw).context("Query is not valid JSON")?,
                None => serde_json::json!({ "query": { "match_all": {} } }),
            };
            let response = store.search(&sync_config.index_name(kind), &body).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::VerifySchema => {
            let source = PgSource::connect(&db_config).await?;
            source.verify_schema().await?;
        }
    }

    Ok(())
}
