//! Prediction and feature-importance commands

use anyhow::Result;
use colored::Colorize;
use irrigation_lib::{ClassifierKind, SensorReadings};
use tabled::Tabled;

use super::Context;
use crate::output::{color_confidence, format_percent, print_json, print_table, print_warning, OutputFormat};

/// Row for the feature-importance table
#[derive(Tabled)]
struct ImportanceRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Importance")]
    weight: String,
}

/// Predict irrigation need for one set of sensor values
pub async fn predict(
    ctx: &Context,
    phosphorus: f64,
    potassium: f64,
    ph: f64,
    humidity: f64,
    model: ClassifierKind,
) -> Result<()> {
    let pipeline = ctx.serving_pipeline();
    pipeline.warm_up().await?;

    let readings = SensorReadings {
        phosphorus_present: phosphorus,
        potassium_present: potassium,
        ph,
        humidity_pct: humidity,
    };
    let result = pipeline.predict(&readings, model)?;

    match ctx.format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let verdict = if result.irrigation_needed {
                "IRRIGATE".green().bold()
            } else {
                "DO NOT IRRIGATE".blue().bold()
            };
            println!("{}", verdict);
            println!("  Model:          {} (generation {})", result.model_used, result.model_generation);
            println!("  P(irrigate):    {}", format_percent(result.p_irrigate));
            println!("  P(no irrigate): {}", format_percent(result.p_no_irrigate));
            println!("  Confidence:     {}", color_confidence(result.confidence));
            if result.low_confidence {
                print_warning("Low confidence prediction, consider checking the sensors");
            }
        }
    }
    Ok(())
}

/// Show tree-ensemble feature importances, highest first
pub async fn importance(ctx: &Context) -> Result<()> {
    let pipeline = ctx.serving_pipeline();
    pipeline.warm_up().await?;
    let importances = pipeline.feature_importance()?;

    match ctx.format {
        OutputFormat::Json => print_json(&importances)?,
        OutputFormat::Table => {
            let rows: Vec<ImportanceRow> = importances
                .iter()
                .enumerate()
                .map(|(i, imp)| ImportanceRow {
                    rank: i + 1,
                    feature: imp.feature.clone(),
                    weight: format!("{:.4}", imp.weight),
                })
                .collect();
            print_table(&rows);
        }
    }
    Ok(())
}
