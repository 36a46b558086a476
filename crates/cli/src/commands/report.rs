//! Model report and artifact inspection commands

use anyhow::Result;
use irrigation_lib::store::ArtifactPayload;
use irrigation_lib::{ArtifactKind, ModelStore, FEATURE_NAMES};
use tabled::Tabled;

use super::Context;
use crate::output::{format_bytes, print_info, print_json, print_table, print_warning, OutputFormat};

/// Row for per-feature parameter tables
#[derive(Tabled)]
struct ParameterRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Extra")]
    extra: String,
}

/// Summarize model availability, generation and importances
pub async fn report(ctx: &Context) -> Result<()> {
    let report = ctx.serving_pipeline().report();

    match ctx.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("Report generated at {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("  tree_ensemble available: {}", report.models_available.tree_ensemble);
            println!("  linear available:        {}", report.models_available.linear);
            match &report.model_generation {
                Some(generation) => println!("  model generation:        {}", generation),
                None => print_warning("No trained models in the store"),
            }
            if let Some(importances) = &report.feature_importance {
                print_info("Feature importance (tree ensemble)");
                let rows: Vec<ParameterRow> = importances
                    .iter()
                    .map(|imp| ParameterRow {
                        feature: imp.feature.clone(),
                        value: format!("{:.4}", imp.weight),
                        extra: String::new(),
                    })
                    .collect();
                print_table(&rows);
            }
        }
    }
    Ok(())
}

/// Show one stored artifact
pub async fn inspect(ctx: &Context, artifact: ArtifactKind) -> Result<()> {
    let store = ModelStore::new(ctx.config.store());
    let manifest = store.manifest()?;
    let payload = store.inspect(artifact)?;

    match ctx.format {
        OutputFormat::Json => print_json(&payload)?,
        OutputFormat::Table => {
            if let Some(entry) = manifest.artifact(artifact) {
                print_info(&format!(
                    "{} from generation {} ({}, sha256 {})",
                    artifact,
                    manifest.generation,
                    format_bytes(entry.size_bytes),
                    entry.checksum
                ));
            }
            match payload {
                ArtifactPayload::TreeEnsemble(forest) => {
                    println!("  trees:             {}", forest.n_trees());
                    println!("  average depth:     {:.2}", forest.avg_depth());
                    let leaves: usize = forest.trees().iter().map(|t| t.n_leaves()).sum();
                    println!("  total leaves:      {}", leaves);
                }
                ArtifactPayload::Linear(model) => {
                    println!("  intercept:         {:.6}", model.intercept());
                    println!("  iterations:        {} (converged: {})", model.n_iter(), model.converged());
                    let rows: Vec<ParameterRow> = FEATURE_NAMES
                        .iter()
                        .zip(model.coefficients())
                        .map(|(name, coef)| ParameterRow {
                            feature: name.to_string(),
                            value: format!("{:.6}", coef),
                            extra: String::new(),
                        })
                        .collect();
                    print_table(&rows);
                }
                ArtifactPayload::Normalizer(scaler) => {
                    println!("  samples seen:      {}", scaler.n_samples_seen());
                    let rows: Vec<ParameterRow> = FEATURE_NAMES
                        .iter()
                        .zip(scaler.mean().iter().zip(scaler.scale()))
                        .map(|(name, (mean, scale))| ParameterRow {
                            feature: name.to_string(),
                            value: format!("mean {:.4}", mean),
                            extra: format!("scale {:.4}", scale),
                        })
                        .collect();
                    print_table(&rows);
                }
            }
        }
    }
    Ok(())
}
