//! Stress Alert Agent CLI
//!
//! Batch ingestion of stress observations with a high-stress alert table.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use stress_alert_agent::{
    config::{Config, DATABASE_ENV},
    handler::{handle_get_alerts, handle_run_event},
    ledger::RunLedger,
    pipeline::{Agent, IdentityStrategy, Outcome},
    store::{AlertOrder, AlertReader, SqliteStore},
    VERSION,
};

#[derive(Parser)]
#[command(name = "stress-agent")]
#[command(version = VERSION)]
#[command(about = "Flag high-stress observations and serve them as alerts", long_about = None)]
struct Cli {
    /// SQLite database to use instead of the configured one
    #[arg(long, global = true, env = DATABASE_ENV)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent over one batch file
    Run {
        /// CSV batch with `timestamp` and `stress_level` columns
        path: PathBuf,

        /// How flagged rows get a user id (positional or subject_column).
        /// subject_column reuses the batch's subject_ref, so rows for the same
        /// subject share one user id.
        #[arg(long)]
        identity: Option<IdentityStrategy>,
    },

    /// Invoke a function handler with a JSON event and print its response
    Invoke {
        /// Function to invoke
        #[arg(value_enum)]
        function: FunctionName,

        /// JSON event, e.g. '{"filepath": "batch.csv"}'
        #[arg(long, default_value = "{}")]
        event: String,
    },

    /// Print stored alerts as JSON, newest first
    Alerts {
        /// Keep the order rows were stored in
        #[arg(long)]
        storage_order: bool,
    },

    /// Serve alerts and on-demand runs over HTTP
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create the alert table if it does not exist
    InitDb,

    /// Show cumulative run statistics
    Status,

    /// Show configuration
    Config {
        /// Persist a new default identity strategy (positional or
        /// subject_column; subject_column gives rows for the same subject one
        /// shared user id)
        #[arg(long)]
        set_identity: Option<IdentityStrategy>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FunctionName {
    RunAgent,
    GetAlerts,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.database);

    let result = match cli.command {
        Commands::Run { path, identity } => cmd_run(&config, path, identity),
        Commands::Invoke { function, event } => cmd_invoke(&config, function, &event),
        Commands::Alerts { storage_order } => cmd_alerts(&config, storage_order),
        #[cfg(feature = "server")]
        Commands::Serve { port } => cmd_serve(&config, port),
        Commands::InitDb => cmd_init_db(&config),
        Commands::Status => {
            cmd_status(&config);
            Ok(())
        }
        Commands::Config { set_identity } => cmd_config(config, set_identity),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(database: Option<PathBuf>) -> Config {
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    config.apply_env_override(database);
    config
}

fn store_for(config: &Config) -> SqliteStore {
    SqliteStore::new(&config.database_path, config.busy_timeout)
}

fn cmd_run(
    config: &Config,
    path: PathBuf,
    identity: Option<IdentityStrategy>,
) -> anyhow::Result<()> {
    let store = store_for(config);
    let ledger = RunLedger::with_persistence(config.ledger_path());

    let result = Agent::new(&store)
        .with_identity(identity.unwrap_or(config.identity))
        .run(&path);

    ledger.record_run(&result);
    if let Err(e) = ledger.save() {
        eprintln!("Warning: Could not save run ledger: {e}");
    }

    match result {
        Ok(report) => {
            match report.outcome {
                Outcome::NoAlerts => println!(
                    "No high stress subjects in {} ({} rows read, {} malformed)",
                    path.display(),
                    report.rows_read,
                    report.malformed
                ),
                Outcome::Persisted { count } => println!(
                    "Stored {} alerts from {} ({} rows read, {} malformed)",
                    count,
                    path.display(),
                    report.rows_read,
                    report.malformed
                ),
            }
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Agent run over {} failed", path.display())),
    }
}

fn cmd_invoke(config: &Config, function: FunctionName, event: &str) -> anyhow::Result<()> {
    let store = store_for(config);

    let response = match function {
        FunctionName::RunAgent => {
            let event: serde_json::Value =
                serde_json::from_str(event).context("Event is not valid JSON")?;
            let ledger = RunLedger::with_persistence(config.ledger_path());
            let response = handle_run_event(&event, &store, config.identity, Some(&ledger));
            if let Err(e) = ledger.save() {
                eprintln!("Warning: Could not save run ledger: {e}");
            }
            response
        }
        FunctionName::GetAlerts => handle_get_alerts(&store),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_alerts(config: &Config, storage_order: bool) -> anyhow::Result<()> {
    let store = store_for(config);
    let order = if storage_order {
        AlertOrder::Storage
    } else {
        AlertOrder::NewestFirst
    };

    let alerts = AlertReader::new(&store)
        .fetch(order)
        .with_context(|| format!("Could not read alerts from {:?}", config.database_path))?;

    println!("{}", serde_json::to_string_pretty(&alerts)?);
    Ok(())
}

#[cfg(feature = "server")]
fn cmd_serve(config: &Config, port: Option<u16>) -> anyhow::Result<()> {
    use std::sync::Arc;
    use stress_alert_agent::ledger::create_shared_ledger_with_persistence;
    use stress_alert_agent::server::{self, ServerConfig};

    config
        .ensure_directories()
        .context("Could not create data directories")?;

    let store = Arc::new(store_for(config));
    store
        .init_schema()
        .with_context(|| format!("Could not prepare {:?}", config.database_path))?;

    let server_config = ServerConfig::new(port.unwrap_or(config.server_port), store)
        .with_identity(config.identity)
        .with_ledger(create_shared_ledger_with_persistence(config.ledger_path()));

    let runtime = tokio::runtime::Runtime::new().context("Could not start async runtime")?;
    runtime.block_on(async move {
        let (addr, shutdown) = server::run(server_config).await?;
        println!("Stress Alert Agent v{VERSION}");
        println!("Listening on http://{addr}");
        println!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c()
            .await
            .context("Could not listen for Ctrl+C")?;
        let _ = shutdown.send(());
        println!();
        println!("Stopping server...");
        Ok(())
    })
}

fn cmd_init_db(config: &Config) -> anyhow::Result<()> {
    let store = store_for(config);
    store
        .init_schema()
        .with_context(|| format!("Could not initialise {:?}", config.database_path))?;
    println!("Alert table ready in {:?}", config.database_path);
    Ok(())
}

fn cmd_status(config: &Config) {
    println!("Stress Alert Agent Status");
    println!("=========================");
    println!();
    println!("Database: {:?}", config.database_path);
    println!("Identity strategy: {:?}", config.identity);
    println!();

    if config.ledger_path().exists() {
        let ledger = RunLedger::with_persistence(config.ledger_path());
        println!("{}", ledger.summary());
    } else {
        println!("No previous runs recorded.");
    }
}

fn cmd_config(mut config: Config, set_identity: Option<IdentityStrategy>) -> anyhow::Result<()> {
    if let Some(identity) = set_identity {
        // Re-read the file so env and --database overrides are not persisted.
        let mut stored = Config::load_from(&Config::config_path())
            .context("Could not read existing config")?;
        stored.identity = identity;
        stored.save().context("Could not save config")?;
        config.identity = identity;
        println!("Identity strategy set to {:?}", identity);
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
    Ok(())
}
