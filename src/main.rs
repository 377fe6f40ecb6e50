// Modelog - model service with durable train/predict event logs
// Main entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use modelog::config::{constants::DEFAULT_SERVICE_URL, load_config, Config};
use modelog::logging::{
    summarize, EventKind, EventLogStore, PredictEvent, PredictPayload, TrainEvent, TrainPayload,
};
use modelog::server::{self, AppState};

#[derive(Parser)]
#[command(name = "modelog")]
#[command(about = "Train/predict model service with month-partitioned event logs")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the train/predict HTTP API
    Serve {
        /// Bind address, overrides the config file
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Check that a running service completes a test-mode train action
    Smoke {
        #[arg(short, long, default_value = DEFAULT_SERVICE_URL)]
        url: String,
    },

    /// Write one test train event and one test predict event
    SelfTest,

    /// Summarize the monthly partitions of one event kind
    Summary {
        #[arg(short, long, default_value = "train")]
        kind: EventKind,

        /// Also count the test partition
        #[arg(long)]
        include_test: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            let store = open_store(&config)?;
            server::serve(Arc::new(AppState::new(config, store))).await?;
        }
        Commands::Smoke { url } => {
            modelog::smoke::run_smoke(&url).await?;
            println!("true");
        }
        Commands::SelfTest => {
            let store = open_store(&config)?;
            run_self_test(&store, &config)?;
        }
        Commands::Summary { kind, include_test } => {
            let store = open_store(&config)?;
            let summary = match kind {
                EventKind::Train => summarize::<TrainEvent>(store.log_dir(), include_test)?,
                EventKind::Predict => summarize::<PredictEvent>(store.log_dir(), include_test)?,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<EventLogStore> {
    EventLogStore::open(config.store_config()).with_context(|| {
        format!(
            "Failed to prepare log directory {}",
            config.log_dir.display()
        )
    })
}

/// Record one event of each kind into the test partitions
fn run_self_test(store: &EventLogStore, config: &Config) -> Result<()> {
    info!("Updating train log");
    let train = store.record_train(
        &TrainPayload {
            tag: "test_country".to_string(),
            period: "(100,10)".to_string(),
            rmse: "{'rmse':0.5}".to_string(),
            runtime: "00:00:01".to_string(),
            model_version: config.model_version.clone(),
            model_version_note: config.model_version_note.clone(),
        },
        true,
    )?;

    info!("Updating predict log");
    let predict = store.record_predict(
        &PredictPayload {
            country: "test_country".to_string(),
            y_pred: "[0.6, 0.4]".to_string(),
            y_proba: None,
            target_date: "2018/02/12".to_string(),
            runtime: "00:00:01".to_string(),
            model_version: config.model_version.clone(),
        },
        true,
    )?;

    info!(
        train_id = %train.unique_id,
        predict_id = %predict.unique_id,
        log_dir = %store.log_dir().display(),
        "Self-test events written"
    );
    Ok(())
}
