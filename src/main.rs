use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use fleetwatch::config::{self, AppConfig, database};
use fleetwatch::core::report::{budget_by_corps, fleet_counts, format_eur, summarize};
use fleetwatch::core::surcharge::SurchargeLedger;
use fleetwatch::core::workbook::{budget_export, full_export, read_first_sheet, write_workbook};
use fleetwatch::errors::{Error, Result};
use fleetwatch::storage::SqliteArea;
use fleetwatch::store::DataStore;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Fleetwatch - fire-fleet equipment and budget tracking
#[derive(Parser, Debug)]
#[command(name = "fleetwatch", version)]
#[command(about = "Import, analyse and export fire-fleet equipment data")]
struct Cli {
    /// Configuration file (built-in defaults when absent)
    #[arg(long, env = "FLEETWATCH_CONFIG", default_value = config::settings::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import an equipment sheet, replacing the stored fleet
    Import {
        /// CSV sheet to import
        file: PathBuf,
        /// Label recorded as the data source
        #[arg(long, default_value = "import")]
        source: String,
    },
    /// Export equipment and budget analysis sheets
    Export {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Export detailed budget data and indicators
    BudgetExport {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Print budget and fleet figures
    Summary,
    /// Remove all stored equipment and budget data
    Clear,
    /// Record a manual out-of-contract price
    Surcharge {
        /// Vehicle type
        vehicle_type: String,
        /// Price in euros
        price: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal: env vars can be set externally
    dotenv().ok();
    let cli = Cli::parse();

    // 3. Load the application configuration
    let app_config = load_configuration(&cli.config)
        .inspect_err(|e| error!("Critical error loading application configuration: {e}"))?;

    // 4. Open the persistent storage area
    let database_url = database::get_database_url();
    if database_url == database::DEFAULT_DATABASE_URL {
        tokio::fs::create_dir_all("data").await?;
    }
    let area = SqliteArea::open(&database_url, app_config.store.event_capacity)
        .await
        .inspect(|_| info!("Storage opened at {database_url}"))
        .inspect_err(|e| error!("Failed to open storage: {e}"))?;

    let ledger = SurchargeLedger::new(area.clone(), app_config.store.surcharge_key.clone());
    let store = DataStore::from_config(area, &app_config);

    // 5. Run the requested command
    match run(cli.command, &store, &ledger).await {
        Err(Error::NothingToExport { collection }) => {
            println!("Aucune donnée à exporter ({collection}). Importez d'abord un fichier.");
            Ok(())
        }
        other => other,
    }
}

fn load_configuration(path: &Path) -> Result<AppConfig> {
    if path.as_os_str() == config::settings::DEFAULT_CONFIG_PATH {
        config::load_default_config()
    } else {
        config::load_config(path)
    }
}

async fn run(
    command: Command,
    store: &DataStore<SqliteArea>,
    ledger: &SurchargeLedger<SqliteArea>,
) -> Result<()> {
    match command {
        Command::Import { file, source } => {
            let rows = read_first_sheet(&file).await?;
            let records = store.import_rows(&rows, &source).await?;
            println!("{} équipements importés depuis {}", records.len(), file.display());
        }
        Command::Export { dir } => {
            let today = chrono::Local::now().date_naive();
            let workbook = full_export(&store.get().await, &store.get_budget().await, today)?;
            for path in write_workbook(&dir, &workbook).await? {
                println!("{}", path.display());
            }
        }
        Command::BudgetExport { dir } => {
            store.ensure_budget("budget").await?;
            let today = chrono::Local::now().date_naive();
            let workbook = budget_export(&store.get_budget().await, today)?;
            for path in write_workbook(&dir, &workbook).await? {
                println!("{}", path.display());
            }
        }
        Command::Summary => print_summary(store).await,
        Command::Clear => {
            store.clear().await?;
            println!("Toutes les données ont été effacées");
        }
        Command::Surcharge {
            vehicle_type,
            price,
        } => match ledger.add(&vehicle_type, &price).await? {
            Some(entry) => println!(
                "Hors forfait ajouté : {} - {}",
                entry.vehicle_type,
                format_eur(entry.price)
            ),
            None => println!("Saisie ignorée : type ou prix invalide"),
        },
    }
    Ok(())
}

async fn print_summary(store: &DataStore<SqliteArea>) {
    let records = store.get().await;
    let budget = store.get_budget().await;

    if let Some(meta) = store.meta().await {
        println!(
            "Dernière mise à jour : {} ({})",
            meta.timestamp.format("%d/%m/%Y %H:%M"),
            meta.source
        );
    }

    let counts = fleet_counts(&records);
    println!("Armée de l'air : {}", counts.air);
    println!("Marine nationale : {}", counts.navy);
    println!("Armée de terre : {}", counts.army);

    let summary = summarize(&budget);
    println!("Budget total : {}", format_eur(summary.total as f64));
    println!("Coût moyen : {}", format_eur(summary.average));
    println!("Équipements : {}", summary.count);
    for (corps, total) in budget_by_corps(&budget) {
        println!("  {corps} : {}", format_eur(total as f64));
    }
}
