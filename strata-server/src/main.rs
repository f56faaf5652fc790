mod config;
use clap::{Parser, Subcommand};
use config::Config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod server;
use server::run_server;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Channel hub with cache and long-term storage tiers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hub
    Server {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Create the data directories and the metadata index
    Init {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata=info,strata_core=info,strata_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config } => {
            tracing::info!("Starting strata with config: {}", config);

            let cfg = load_config(&config);
            if let Err(e) = run_server(cfg).await {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Init { config } => {
            tracing::info!("Initializing strata with config: {}", config);

            let cfg = load_config(&config);
            let hub_config = match cfg.to_hub_config() {
                Ok(hub_config) => hub_config,
                Err(e) => {
                    tracing::error!("Invalid config: {}", e);
                    std::process::exit(1);
                }
            };

            for dir in [hub_config.data_dir.clone(), hub_config.cache_path()] {
                match std::fs::create_dir_all(&dir) {
                    Ok(_) => tracing::info!("Created directory: {:?}", dir),
                    Err(e) => {
                        tracing::error!("Failed to create directory {:?}: {}", dir, e);
                        std::process::exit(1);
                    }
                }
            }

            if let Err(e) = strata_core::MetadataStore::new(hub_config.metadata_path()) {
                tracing::error!("Failed to create metadata index: {}", e);
                std::process::exit(1);
            }

            tracing::info!(
                "Initialized data directory {}",
                hub_config.data_dir.display()
            );
        }
    }
}

fn load_config(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}
