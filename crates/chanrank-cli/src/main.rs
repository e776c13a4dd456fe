mod collect;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "chanrank-cli")]
#[command(about = "Channel ranking collection and maintenance")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a channel collection over the planned passes
    Collect {
        /// Restrict collection to one region code (e.g. KR)
        #[arg(long)]
        region: Option<String>,

        /// Restrict collection to one category id (e.g. music)
        #[arg(long)]
        category: Option<String>,

        /// Query upstream and report what would be written, without writing
        #[arg(long)]
        dry_run: bool,

        /// Re-fetch channels even if they were refreshed recently
        #[arg(long)]
        force: bool,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Collection plan tools
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database answers
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[derive(Debug, Subcommand)]
enum PlanCommands {
    /// Parse and validate a collection plan file
    Validate {
        #[arg(
            long,
            env = "CHANRANK_PLAN_PATH",
            default_value = "config/collection_plan.yaml"
        )]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Collect {
            region,
            category,
            dry_run,
            force,
        }) => {
            let config = chanrank_core::load_app_config()?;
            let pool = connect(&config).await?;
            collect::run_collect(
                &pool,
                &config,
                &collect::CollectArgs {
                    region: region.as_deref(),
                    category: category.as_deref(),
                    dry_run,
                    force,
                },
            )
            .await?;
        }
        Some(Commands::Db { command }) => {
            let config = chanrank_core::load_app_config()?;
            let pool = connect(&config).await?;
            match command {
                DbCommands::Ping => {
                    chanrank_db::ping(&pool).await?;
                    println!("database ok");
                }
                DbCommands::Migrate => {
                    let applied = chanrank_db::run_migrations(&pool).await?;
                    println!("migrations applied: {applied}");
                }
            }
        }
        Some(Commands::Plan {
            command: PlanCommands::Validate { path },
        }) => {
            let plan = chanrank_core::load_plan(&path)?;
            let passes = plan.passes();
            println!(
                "{}: {} regions, {} categories, {} passes",
                path.display(),
                plan.regions.len(),
                plan.categories.len(),
                passes.len()
            );
        }
        None => println!("chanrank-cli: see --help for commands"),
    }

    Ok(())
}

async fn connect(config: &chanrank_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool = chanrank_db::connect_pool(
        &config.database_url,
        chanrank_db::PoolConfig::from_app_config(config),
    )
    .await?;
    Ok(pool)
}
