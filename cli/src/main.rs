mod commands;
mod config;
mod remote;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    MealArgs, cmd_log_exercise, cmd_log_meal, cmd_log_weight, cmd_login, cmd_logout, cmd_status,
    cmd_sync, cmd_today,
};
use crate::config::Config;
use crate::remote::HttpGateway;
use coach_core::store::SnapshotStore;
use coach_core::{Session, SessionOptions};

#[derive(Parser)]
#[command(
    name = "coach",
    version,
    about = "Log meals, exercise and weight; works offline and syncs when it can"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a meal, exercise session or weigh-in
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Upload pending and failed entries
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show today's totals from the server, falling back to the last saved copy
    Today {
        /// Do not contact the server
        #[arg(long)]
        cached: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List local entries and their sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save the API token used to authenticate with the server
    Login {
        /// Bearer token
        token: String,
    },
    /// Remove the token and all local data
    Logout {
        /// Discard entries that have not been synced yet
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// Log a single food item as a meal
    Meal {
        /// Food name
        name: String,
        /// Calories
        #[arg(long)]
        kcal: u32,
        /// Protein in grams
        #[arg(short, long)]
        protein: Option<f64>,
        /// Carbohydrates in grams
        #[arg(short, long)]
        carbs: Option<f64>,
        /// Fat in grams
        #[arg(short, long)]
        fat: Option<f64>,
        /// Quantity eaten
        #[arg(long, default_value_t = 1.0)]
        qty: f64,
        /// Unit of the quantity (e.g. "g", "cup", "serving")
        #[arg(long, default_value = "serving")]
        unit: String,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
        /// Save locally without trying to upload
        #[arg(long)]
        no_sync: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log an exercise session
    Exercise {
        /// Activity, e.g. "running" or "brisk walk"
        activity: String,
        /// Duration in minutes
        duration: f64,
        /// Intensity: low, moderate, high
        #[arg(short, long)]
        intensity: Option<String>,
        /// Calories burned; estimated from the activity when omitted
        #[arg(long)]
        kcal: Option<u32>,
        /// Save locally without trying to upload
        #[arg(long)]
        no_sync: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log body weight
    Weight {
        /// Weight value
        value: f64,
        /// Unit: kg or lbs
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// How it was measured: scale, manual, healthkit
        #[arg(long, default_value = "manual")]
        method: String,
        /// Save locally without trying to upload
        #[arg(long)]
        no_sync: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("COACH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn open_session(config: &Config, opportunistic_sync: bool) -> Result<Session> {
    let token = config.load_token()?;
    debug!(
        api_url = %config.api_url,
        db = %config.db_path.display(),
        authenticated = token.is_some(),
        "opening session"
    );
    let gateway = HttpGateway::new(&config.api_url, token, config.timeout)?;
    let store = SnapshotStore::open(&config.db_path)?;
    Session::open(
        store,
        Arc::new(gateway),
        SessionOptions { opportunistic_sync },
    )
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Log { command } => match command {
            LogCommands::Meal {
                name,
                kcal,
                protein,
                carbs,
                fat,
                qty,
                unit,
                notes,
                no_sync,
                json,
            } => {
                let session = open_session(&config, !no_sync)?;
                let args = MealArgs {
                    name,
                    kcal,
                    protein,
                    carbs,
                    fat,
                    qty,
                    unit,
                    notes,
                };
                cmd_log_meal(&session, args, json).await
            }
            LogCommands::Exercise {
                activity,
                duration,
                intensity,
                kcal,
                no_sync,
                json,
            } => {
                let session = open_session(&config, !no_sync)?;
                cmd_log_exercise(
                    &session,
                    &activity,
                    duration,
                    intensity.as_deref(),
                    kcal,
                    json,
                )
                .await
            }
            LogCommands::Weight {
                value,
                unit,
                method,
                no_sync,
                json,
            } => {
                let session = open_session(&config, !no_sync)?;
                cmd_log_weight(&session, value, &unit, &method, json).await
            }
        },
        Commands::Sync { json } => cmd_sync(&open_session(&config, false)?, json).await,
        Commands::Today { cached, json } => {
            cmd_today(&open_session(&config, false)?, cached, json).await
        }
        Commands::Status { json } => cmd_status(&open_session(&config, false)?, json),
        Commands::Login { token } => cmd_login(&config, &token),
        Commands::Logout { force } => cmd_logout(&config, open_session(&config, false)?, force),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_log_weight() {
        let cli = Cli::try_parse_from(["coach", "log", "weight", "180", "-u", "lbs", "--no-sync"])
            .unwrap();
        let Commands::Log {
            command:
                LogCommands::Weight {
                    value,
                    unit,
                    method,
                    no_sync,
                    json,
                },
        } = cli.command
        else {
            panic!("expected log weight");
        };
        assert_eq!(value, 180.0);
        assert_eq!(unit, "lbs");
        assert_eq!(method, "manual");
        assert!(no_sync);
        assert!(!json);
    }
}
