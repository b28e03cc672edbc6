//! Pannier CLI - Command-line interface for the offline-first inventory
//!
//! Every command works with or without connectivity; offline changes are
//! cached locally and reconciled with the service on the next sync.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod error;

use commands::edit::EditFields;
use error::CliError;

#[derive(Parser)]
#[command(name = "pannier")]
#[command(about = "Offline-first inventory manager for bike shops")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the local cache database
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new item
    #[command(alias = "new")]
    Add {
        /// Item name
        name: String,
        /// Condition, e.g. "new" or "used"
        #[arg(long, default_value = "new")]
        condition: String,
        /// Asking price
        #[arg(long)]
        price: f64,
        /// The item still carries a warranty
        #[arg(long)]
        warranty: bool,
        /// Latitude of the item's location
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        /// Longitude of the item's location
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },
    /// List items
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing item
    Edit {
        /// Item identifier
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New condition
        #[arg(long)]
        condition: Option<String>,
        /// New price
        #[arg(long)]
        price: Option<f64>,
        /// New warranty flag
        #[arg(long, value_name = "BOOL")]
        warranty: Option<bool>,
        /// New latitude
        #[arg(long)]
        lat: Option<f64>,
        /// New longitude
        #[arg(long)]
        lng: Option<f64>,
    },
    /// Delete an item
    Delete {
        /// Item identifier
        id: String,
    },
    /// Show connectivity and sync state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reconcile offline changes with the service
    Sync,
    /// Follow live updates from the service
    Watch,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pannier_core=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.db_path)?;

    match cli.command {
        Commands::Add {
            name,
            condition,
            price,
            warranty,
            lat,
            lng,
        } => commands::add::run_add(name, condition, price, warranty, lat, lng, &config).await,
        Commands::List { json } => commands::list::run_list(json, &config).await,
        Commands::Edit {
            id,
            name,
            condition,
            price,
            warranty,
            lat,
            lng,
        } => {
            let fields = EditFields {
                name,
                condition,
                price,
                warranty,
                lat,
                lng,
            };
            commands::edit::run_edit(&id, fields, &config).await
        }
        Commands::Delete { id } => commands::delete::run_delete(&id, &config).await,
        Commands::Status { json } => commands::status::run_status(json, &config).await,
        Commands::Sync => commands::sync::run_sync(&config).await,
        Commands::Watch => commands::watch::run_watch(&config).await,
    }
}
