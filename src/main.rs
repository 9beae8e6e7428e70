use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use lci_import::config::Config;
use lci_import::constants::DEFAULT_CONFIG_PATH;
use lci_import::migrations::MigrationRegistry;
use lci_import::pipeline::{ImportSession, RunSummary, Strategy};
use lci_import::storage::{FsUnlinkedStore, UnlinkedDataStore};
use lci_import::strategies::{self, BUILTIN_STRATEGIES};
use lci_import::{logging, metrics, Importer, JsonImporter};

#[derive(Parser)]
#[command(name = "lci_import")]
#[command(about = "Fail-soft strategy pipeline for inventory dataset imports")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print collected metrics in Prometheus text format before exiting
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run strategies over a JSON batch
    Apply {
        /// Batch file (JSON array of datasets)
        input: PathBuf,
        /// Strategies to run (comma-separated); the default list when omitted
        #[arg(long)]
        strategies: Option<String>,
        /// Dataset migration to run after the strategies (repeatable)
        #[arg(long = "migrate-datasets")]
        migrate_datasets: Vec<String>,
        /// Exchange migration to run after the strategies (repeatable)
        #[arg(long = "migrate-exchanges")]
        migrate_exchanges: Vec<String>,
        /// Save the result to the unlinked-data store under this name
        #[arg(long)]
        write_unlinked: Option<String>,
        /// Write the resulting batch to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the unique unlinked exchanges of a batch
    Unlinked {
        input: PathBuf,
        /// Run the default strategies before collecting
        #[arg(long)]
        apply_defaults: bool,
    },
    /// Print dataset, exchange and unlinked counts of a batch
    Stats { input: PathBuf },
    /// Continue a batch saved in the unlinked-data store
    Resume {
        /// Slot name, e.g. "ecoinvent JsonImporter"
        slot: String,
        /// Save the result again under this name
        #[arg(long)]
        write_unlinked: Option<String>,
    },
    /// List the migrations found in the migrations directory
    Migrations,
}

fn parse_strategies(list: &str, database: &str) -> anyhow::Result<Vec<Strategy>> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| -> anyhow::Result<Strategy> {
            match strategies::by_name(name, database) {
                Some(strategy) => Ok(strategy?),
                None => bail!(
                    "Unknown strategy '{}'. Available: {}",
                    name,
                    BUILTIN_STRATEGIES.join(", ")
                ),
            }
        })
        .collect()
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Strategy run:");
    println!("   Steps: {}", summary.steps);
    println!("   Applied: {}", summary.applied);
    println!("   Refused: {}", summary.refused);
    println!("   Elapsed: {:.2}s", summary.elapsed.as_secs_f64());
}

fn print_statistics(session: &ImportSession) {
    let stats = session.statistics();
    println!("   Datasets: {}", stats.datasets);
    println!("   Exchanges: {}", stats.exchanges);
    println!("   Unlinked exchanges: {}", stats.unlinked);
}

fn save(
    session: &ImportSession,
    store: &dyn UnlinkedDataStore,
    name: Option<&str>,
) -> anyhow::Result<()> {
    if let Some(name) = name {
        let slot = session.write_unlinked(store, name)?;
        println!("💾 Saved unlinked data: {}", slot);
    }
    Ok(())
}

fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let database = config.database_name.as_str();

    match cli.command {
        Commands::Apply {
            input,
            strategies,
            migrate_datasets,
            migrate_exchanges,
            write_unlinked,
            output,
        } => {
            let mut session = JsonImporter::from_path(&input, database)?.into_session()?;

            // Migration rules are written against normalized values (units
            // like "kilowatt hour"), so they run after the strategies
            let summary = match strategies {
                Some(list) => {
                    let list = parse_strategies(&list, database)?;
                    session.apply_strategies(Some(&list[..]))?
                }
                None => session.apply_strategies(None)?,
            };
            print_summary(&summary);

            if !migrate_datasets.is_empty() || !migrate_exchanges.is_empty() {
                let registry = MigrationRegistry::load_from_directory(&config.migrations_dir)?;
                for name in &migrate_datasets {
                    print_summary(&session.migrate_datasets(&registry, name)?);
                }
                for name in &migrate_exchanges {
                    print_summary(&session.migrate_exchanges(&registry, name)?);
                }
            }
            print_statistics(&session);

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(session.data())?;
                fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("📝 Wrote batch to {}", path.display());
            }

            let store = FsUnlinkedStore::open(&config.data_dir)?;
            save(&session, &store, write_unlinked.as_deref())?;
        }
        Commands::Unlinked {
            input,
            apply_defaults,
        } => {
            let mut session = JsonImporter::from_path(&input, database)?.into_session()?;
            if apply_defaults {
                session.apply_strategies(None)?;
            }
            for exchange in session.unlinked() {
                println!("{}", serde_json::to_string(exchange)?);
            }
        }
        Commands::Stats { input } => {
            let session = JsonImporter::from_path(&input, database)?.into_session()?;
            println!("📊 {}", input.display());
            print_statistics(&session);
        }
        Commands::Resume {
            slot,
            write_unlinked,
        } => {
            let store = FsUnlinkedStore::open(&config.data_dir)?;
            let mut session = ImportSession::resume(&store, &slot, JsonImporter::KIND)?
                .with_default_strategies(strategies::default_strategies(database)?);
            let summary = session.apply_pending_strategies(None)?;
            print_summary(&summary);
            print_statistics(&session);
            save(&session, &store, write_unlinked.as_deref())?;
        }
        Commands::Migrations => {
            let registry = MigrationRegistry::load_from_directory(&config.migrations_dir)?;
            if registry.is_empty() {
                println!("No migrations in {}", config.migrations_dir.display());
            }
            for name in registry.names() {
                let description = registry
                    .get(name)
                    .map(|rules| rules.description.as_str())
                    .unwrap_or_default();
                println!("{}\t{}", name, description);
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    let _guard = logging::init_logging(&config.log_dir);
    metrics::init_metrics();
    info!(config = ?config, "Starting lci_import");

    let print_metrics = cli.print_metrics;
    let result = run(cli, config);
    if let Err(e) = &result {
        error!("Run failed: {:#}", e);
    }

    if print_metrics {
        if let Some(text) = metrics::render() {
            println!("{}", text);
        }
    }
    result
}
