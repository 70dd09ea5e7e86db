//! Price Tracker - retail price history server
//!
//! Serves the price API, ingests snapshot archives locally or pushes them to a
//! running server.

use clap::{Parser, Subcommand};
use price_tracker::web::{self, Credentials, WebConfig};
use price_tracker::{SqliteStore, Tracker};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Retail price tracker - ingests scraper snapshots into SQLite and serves them
#[derive(Parser, Debug)]
#[command(name = "price_tracker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, global = true, default_value_t = default_db_path())]
    database: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,

        /// Basic auth user for snapshot upload
        #[arg(long, env = "AUTH_USER")]
        auth_user: Option<String>,

        /// Basic auth password for snapshot upload
        #[arg(long, env = "AUTH_PASS", hide_env_values = true)]
        auth_pass: Option<String>,

        /// Comma separated list of allowed CORS origins
        #[arg(
            long,
            env = "CORS_ORIGINS",
            value_delimiter = ',',
            default_value = "http://localhost:5173"
        )]
        cors_origins: Vec<String>,
    },

    /// Ingest a snapshot archive into the local database
    Ingest {
        /// Snapshot ZIP archive
        file: PathBuf,
    },

    /// Upload a snapshot archive to a running server
    Push {
        /// Snapshot ZIP archive
        file: PathBuf,

        /// Server base URL, e.g. http://localhost:8080
        #[arg(long)]
        server: String,

        #[arg(long, env = "AUTH_USER")]
        auth_user: String,

        #[arg(long, env = "AUTH_PASS", hide_env_values = true)]
        auth_pass: String,
    },

    /// Print the price history and stats of one product
    Stats {
        product_id: String,
    },
}

/// Returns the default database path: ~/.local/share/price_tracker/prices.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("price_tracker")
        .join("prices.db")
        .to_string_lossy()
        .to_string()
}

/// Open the database, creating its directory if needed. Exits on failure.
fn open_tracker(db_path: &Path) -> Arc<Tracker<SqliteStore>> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    match SqliteStore::open(db_path) {
        Ok(store) => Arc::new(Tracker::new(Arc::new(store))),
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Failed to serialize output: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    match args.command {
        Command::Serve {
            port,
            auth_user,
            auth_pass,
            cors_origins,
        } => {
            log::info!("Starting price_tracker...");
            log::info!("Database path: {}", db_path.display());
            let tracker = open_tracker(&db_path);

            let credentials = match (auth_user, auth_pass) {
                (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                    Some(Credentials { user, pass })
                }
                _ => None,
            };
            let config = WebConfig {
                credentials,
                cors_origins,
            };

            if let Err(e) = web::serve(tracker, config, port).await {
                log::error!("Web server error: {}", e);
                std::process::exit(1);
            }
        }

        Command::Ingest { file } => {
            let bytes = match std::fs::read(&file) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::error!("Failed to read {}: {}", file.display(), e);
                    std::process::exit(1);
                }
            };
            let tracker = open_tracker(&db_path);
            match tracker.ingest_bytes(bytes) {
                Ok(report) => print_json(&report),
                Err(e) => {
                    log::error!("Failed to ingest {}: {}", file.display(), e);
                    std::process::exit(1);
                }
            }
        }

        Command::Push {
            file,
            server,
            auth_user,
            auth_pass,
        } => match price_tracker::client::push_file(&server, &file, &auth_user, &auth_pass).await
        {
            Ok(report) => print_json(&report),
            Err(e) => {
                log::error!("Upload failed: {}", e);
                std::process::exit(1);
            }
        },

        Command::Stats { product_id } => {
            let tracker = open_tracker(&db_path);
            match tracker.product_detail(&product_id) {
                Ok(Some(detail)) => print_json(&*detail),
                Ok(None) => {
                    log::error!("Product {} not found", product_id);
                    std::process::exit(1);
                }
                Err(e) => {
                    log::error!("Failed to load product {}: {}", product_id, e);
                    std::process::exit(1);
                }
            }
        }
    }
}
