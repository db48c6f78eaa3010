//! labelnet
//!
//! Dataset labeling and neural-network building backend.

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use labelnet::commands;
use labelnet::workflow::TrainOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Dataset labeling and neural-network building backend
#[derive(Parser)]
#[command(name = "labelnet")]
#[command(about = "Label datasets and build, train and evaluate image classifiers")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run database migrations
    Migrate,

    /// Train a built model on a dataset
    Train {
        /// Model id
        #[arg(short, long)]
        model: i64,

        /// Dataset id
        #[arg(short, long)]
        dataset: i64,

        /// Number of training epochs
        #[arg(short, long, default_value_t = TrainOptions::DEFAULT_EPOCHS)]
        epochs: usize,

        /// Batch size for training
        #[arg(short, long, default_value_t = TrainOptions::DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Fraction of the samples held out for validation
        #[arg(long, default_value_t = TrainOptions::DEFAULT_VALIDATION_SPLIT)]
        validation_split: f64,

        /// Learning rate (the optimizer's default if not specified)
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Seed for the split and the shuffling
        #[arg(long, default_value_t = TrainOptions::DEFAULT_SEED)]
        seed: u64,
    },

    /// Evaluate a trained model on a dataset
    Evaluate {
        /// Model id
        #[arg(short, long)]
        model: i64,

        /// Dataset id
        #[arg(short, long)]
        dataset: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    database::initialize_pool(&config.database_url, config.database_max_connections).await?;

    match cli.command {
        Commands::Serve { port } => {
            commands::serve::run(&config, port.unwrap_or(config.port)).await?;
        }
        Commands::Migrate => {
            database::run_migrations().await?;
            info!("Migrations completed successfully");
        }
        Commands::Train {
            model,
            dataset,
            epochs,
            batch_size,
            validation_split,
            learning_rate,
            seed,
        } => {
            let options = TrainOptions {
                epochs,
                batch_size,
                validation_split,
                learning_rate,
                seed,
            };
            commands::train::run(&config, model, dataset, &options).await?;
        }
        Commands::Evaluate { model, dataset } => {
            commands::evaluate::run(model, dataset).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_defaults_match_api() {
        let cli = Cli::try_parse_from(["labelnet", "train", "-m", "1", "-d", "2"]).unwrap();
        let Commands::Train {
            epochs,
            batch_size,
            validation_split,
            learning_rate,
            seed,
            ..
        } = cli.command
        else {
            panic!("expected the train command");
        };

        let defaults = TrainOptions::default();
        assert_eq!(epochs, defaults.epochs);
        assert_eq!(batch_size, defaults.batch_size);
        assert!((validation_split - defaults.validation_split).abs() < f64::EPSILON);
        assert_eq!(learning_rate, None);
        assert_eq!(seed, defaults.seed);
    }
}
