use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use rentwell_rentals::config::{DatabaseConfig, StorageBackend};
use rentwell_rentals::domain::{
    QuoteRequest, RentalLifecycle, RentalLifecycleEngine, SystemClock,
};
use rentwell_rentals::simulation::{self, Scenario};
use rentwell_rentals::storage::{InMemoryRentalRepository, RentalRepository, SqlRentalRepository};
use rentwell_rentals::RentalsConfig;
use sqlx::postgres::PgPoolOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rentwell-rentals", about = "Rentwell rental lifecycle and pricing engine", version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the default configuration as TOML
    GenConfig,
    /// Price a quote request read from a JSON file
    Quote {
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Replay a scenario file against the in-memory backend
    Simulate {
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Apply database migrations to the configured Postgres database
    Migrate,
    /// Mark every past-due active rental overdue
    SweepOverdue,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

async fn connect(database: &DatabaseConfig) -> Result<SqlRentalRepository> {
    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .acquire_timeout(database.connect_timeout())
        .connect(&database.url)
        .await
        .context("failed to connect to database")?;
    Ok(SqlRentalRepository::new(pool))
}

async fn repository(database: &DatabaseConfig) -> Result<Arc<dyn RentalRepository>> {
    match database.backend {
        StorageBackend::Memory => {
            warn!("Using the in-memory backend; nothing will be persisted");
            Ok(Arc::new(InMemoryRentalRepository::new()))
        }
        StorageBackend::Postgres => Ok(Arc::new(connect(database).await?)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!("{}=info", env!("CARGO_BIN_NAME").replace('-', "_"));
    rentwell_common::logging::init_logging(&args.verbosity, &log_filter)?;

    if let Command::GenConfig = args.command {
        println!("{}", RentalsConfig::generate_example()?);
        return Ok(());
    }

    let config = RentalsConfig::load(args.config.as_deref())?;
    info!(
        service = %config.service.name,
        environment = %config.service.environment,
        "Configuration loaded"
    );

    match args.command {
        Command::GenConfig => {}
        Command::Quote { file } => {
            let request: QuoteRequest = read_json(&file)?;
            let quote = rentwell_rentals::domain::pricing::quote(&request, &config.policy)?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
        }
        Command::Simulate { file } => {
            let scenario: Scenario = read_json(&file)?;
            let outcomes = simulation::run(&scenario, config.policy).await?;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        Command::Migrate => {
            if config.database.backend != StorageBackend::Postgres {
                bail!("migrations require the postgres backend");
            }
            let repository = connect(&config.database).await?;
            info!("Running database migrations");
            repository.run_migrations().await?;
            info!("Migrations completed successfully");
        }
        Command::SweepOverdue => {
            let engine = RentalLifecycleEngine::new(
                config.policy,
                repository(&config.database).await?,
                Arc::new(SystemClock),
            );
            let marked = engine.sweep_overdue().await?;
            println!("{}", serde_json::to_string_pretty(&marked)?);
        }
    }

    Ok(())
}
