mod ingest;
mod query;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kpidb")]
#[command(about = "Period-based KPI reconciliation for marketing sheets")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// List configured datasets
    Datasets,
    /// Fetch sheets and reconcile them into period records
    Ingest {
        /// Only ingest this dataset (defaults to all configured datasets)
        #[arg(long)]
        dataset: Option<String>,
        /// Read `<sheet>.csv` files from this directory
        #[arg(long, conflicts_with = "gsheet_id", required_unless_present = "gsheet_id")]
        file: Option<PathBuf>,
        /// Export sheets from this Google spreadsheet
        #[arg(long)]
        gsheet_id: Option<String>,
        /// Reference date for open/closed classification (defaults to today, UTC)
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Run against an in-memory store and print the summary without touching the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Show recent ingestion runs
    Runs {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Show stored period records for a dataset
    Periods {
        #[arg(long)]
        dataset: String,
        #[arg(long)]
        brand: Option<String>,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Show the write history of one period
    History {
        #[arg(long)]
        dataset: String,
        #[arg(long)]
        brand: String,
        /// Period key, e.g. 2025-W07 or 2025-02
        #[arg(long)]
        period: String,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = kpidb_core::load_app_config()?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(Commands::Db { command }) => {
            let pool = connect(&config).await?;
            match command {
                DbCommands::Ping => {
                    kpidb_db::ping(&pool).await?;
                    println!("database ok");
                }
                DbCommands::Migrate => {
                    let applied = kpidb_db::run_migrations(&pool).await?;
                    println!("migrations applied: {applied}");
                }
            }
        }
        Some(Commands::Datasets) => query::run_datasets(&config)?,
        Some(Commands::Ingest {
            dataset,
            file,
            gsheet_id,
            as_of,
            dry_run,
        }) => {
            let source = ingest::sheet_source(file, gsheet_id)?;
            let as_of = as_of.unwrap_or_else(|| chrono::Utc::now().date_naive());
            let options = ingest::IngestOptions {
                dataset: dataset.as_deref(),
                source: &source,
                as_of,
            };
            if dry_run {
                ingest::run_ingest_dry(&config, &options).await?;
            } else {
                let pool = connect(&config).await?;
                ingest::run_ingest(&pool, &config, &options).await?;
            }
        }
        Some(Commands::Runs { limit }) => {
            let pool = connect(&config).await?;
            query::run_runs(&pool, limit).await?;
        }
        Some(Commands::Periods {
            dataset,
            brand,
            limit,
        }) => {
            let pool = connect(&config).await?;
            query::run_periods(&pool, &dataset, brand.as_deref(), limit).await?;
        }
        Some(Commands::History {
            dataset,
            brand,
            period,
        }) => {
            let pool = connect(&config).await?;
            query::run_history(&pool, &dataset, &brand, &period).await?;
        }
        None => println!("kpidb ready; see --help for commands"),
    }

    Ok(())
}

async fn connect(config: &kpidb_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool = kpidb_db::connect_pool(
        config.require_database_url()?,
        kpidb_db::PoolConfig::from_app_config(config),
    )
    .await?;
    Ok(pool)
}

/// Mark an ingestion run as failed, logging rather than propagating if that
/// update itself fails.
pub(crate) async fn fail_run_best_effort(
    pool: &sqlx::PgPool,
    run_id: i64,
    message: &str,
    details: Option<&serde_json::Value>,
) {
    if let Err(mark_err) = kpidb_db::fail_ingestion_run(pool, run_id, message, details).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark ingestion run as failed"
        );
    }
}
