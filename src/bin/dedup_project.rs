//! Runs duplicate detection or auto-merge for one project from the command line.

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use rust_people_merge_api::config::{Config, DEFAULT_LOG_FILTER};
use rust_people_merge_api::db::Database;
use rust_people_merge_api::models::ProjectScope;
use rust_people_merge_api::services;
use rust_people_merge_api::store::PgPeopleStore;

#[derive(Parser, Debug)]
#[command(name = "dedup_project")]
#[command(about = "Find or merge duplicate people in a project", long_about = None)]
struct Args {
    /// Account that owns the project
    #[arg(long, env = "DEDUP_ACCOUNT_ID")]
    account: Uuid,

    /// Project to scan
    #[arg(long, env = "DEDUP_PROJECT_ID")]
    project: Uuid,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List duplicate groups without changing anything
    Find,
    /// Merge every duplicate group into its most complete member
    AutoMerge {
        /// Apply the merge. Without this flag the run is a dry run.
        #[arg(long)]
        execute: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let db = Database::new(&config.database_url, config.db_max_connections.min(5)).await?;
    let store = PgPeopleStore::new(db.pool.clone());
    let scope = ProjectScope::new(args.account, args.project);

    let output = match args.command.unwrap_or(Command::Find) {
        Command::Find => {
            let result = services::find_duplicates(&store, &scope).await;
            tracing::info!(
                "Found {} duplicate groups in project {}",
                result.duplicate_groups.len(),
                scope.project_id
            );
            serde_json::to_string_pretty(&result)?
        }
        Command::AutoMerge { execute } => {
            if !execute {
                tracing::info!("Dry run; pass --execute to apply the merge");
            }
            let result =
                services::auto_merge_duplicates(&store, &scope, !execute, &config.merge_options())
                    .await;
            tracing::info!(
                "Processed {} groups, merged {} people",
                result.groups_processed,
                result.people_merged
            );
            serde_json::to_string_pretty(&result)?
        }
    };

    println!("{}", output);
    Ok(())
}
