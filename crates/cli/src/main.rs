//! Soil irrigation predictor CLI
//!
//! A command-line tool for training the irrigation classifiers from sensor
//! readings, serving single predictions, and inspecting stored models.

mod commands;
mod output;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use commands::{predict, report, train, Context};
use irrigation_lib::{ArtifactKind, ClassifierKind, PipelineConfig, PipelineError};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Soil irrigation predictor CLI
#[derive(Parser)]
#[command(name = "irrigate")]
#[command(author, version, about = "CLI for the soil irrigation predictor", long_about = None)]
pub struct Cli {
    /// Configuration file (values can also be set via IRRIGATION_* env vars)
    #[arg(long, short, env = "IRRIGATION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the model bundle (overrides configuration)
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train both classifiers from a JSON-lines file of sensor readings
    Train {
        /// File with one reading per line: measurement_id, timestamp, sensor_name, value
        #[arg(long, short)]
        readings: PathBuf,
    },

    /// Predict whether irrigation is needed
    Predict {
        /// Phosphorus presence (0 or 1)
        #[arg(long)]
        phosphorus: f64,

        /// Potassium presence (0 or 1)
        #[arg(long)]
        potassium: f64,

        /// Soil pH
        #[arg(long)]
        ph: f64,

        /// Soil humidity in percent
        #[arg(long)]
        humidity: f64,

        /// Classifier to use (tree_ensemble or linear)
        #[arg(long, short, default_value = "tree_ensemble")]
        model: ClassifierKind,
    },

    /// Show tree-ensemble feature importances
    Importance,

    /// Summarize model availability and importances
    Report,

    /// Show one stored artifact (tree_ensemble, linear, normalizer)
    Inspect {
        artifact: ArtifactKind,
    },
}

fn init_tracing(json: bool, verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(model_dir) = cli.model_dir {
        config.model_dir = model_dir;
    }
    let ctx = Context {
        config,
        format: cli.format,
    };

    match cli.command {
        Commands::Train { readings } => train::run(&ctx, &readings).await,
        Commands::Predict {
            phosphorus,
            potassium,
            ph,
            humidity,
            model,
        } => predict::predict(&ctx, phosphorus, potassium, ph, humidity, model).await,
        Commands::Importance => predict::importance(&ctx).await,
        Commands::Report => report::report(&ctx).await,
        Commands::Inspect { artifact } => report::inspect(&ctx, artifact).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.verbose);

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        if e
            .downcast_ref::<PipelineError>()
            .map(PipelineError::needs_training)
            .unwrap_or(false)
        {
            output::print_info("No trained models found, run `irrigate train --readings <file>` first");
        }
        std::process::exit(1);
    }
}
