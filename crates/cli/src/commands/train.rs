//! Training command

use anyhow::{Context as _, Result};
use irrigation_lib::source::JsonLinesSource;
use irrigation_lib::training::ModelMetrics;
use irrigation_lib::{ClassifierKind, IrrigationPipeline, TrainingReport};
use std::path::Path;
use std::sync::Arc;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::Context;
use crate::output::{format_percent, print_info, print_json, print_success, print_table, print_warning, OutputFormat};

/// Row for the evaluation table
#[derive(Tabled)]
struct MetricsRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "Precision")]
    precision: String,
    #[tabled(rename = "Recall")]
    recall: String,
    #[tabled(rename = "F1")]
    f1: String,
    #[tabled(rename = "Confusion [[TN FP] [FN TP]]")]
    confusion: String,
}

impl MetricsRow {
    fn new(kind: ClassifierKind, metrics: &ModelMetrics) -> Self {
        let avg = &metrics.per_class_report.weighted_avg;
        let [[tn, fp], [fn_, tp]] = metrics.confusion_matrix;
        Self {
            model: kind.to_string(),
            accuracy: format_percent(metrics.accuracy),
            precision: format!("{:.3}", avg.precision),
            recall: format!("{:.3}", avg.recall),
            f1: format!("{:.3}", avg.f1),
            confusion: format!("[[{} {}] [{} {}]]", tn, fp, fn_, tp),
        }
    }
}

/// Train from a JSON-lines readings file; Ctrl-C aborts before the next fit
pub async fn run(ctx: &Context, readings: &Path) -> Result<()> {
    if !readings.is_file() {
        anyhow::bail!("readings file {} does not exist", readings.display());
    }

    let pipeline = IrrigationPipeline::new(Arc::new(JsonLinesSource::new(readings)), &ctx.config);

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling training");
                cancel.cancel();
            }
        })
    };
    let result = pipeline.train(&cancel).await;
    watcher.abort();

    let report = result.with_context(|| format!("Training from {} failed", readings.display()))?;
    print_report(&report, ctx.format)
}

fn print_report(report: &TrainingReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(report)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Trained model generation {} on {} batches",
                report.manifest.generation, report.batches_used
            ));
            print_info(&format!(
                "Split: {} train / {} eval, class balance {} idle / {} irrigating",
                report.metrics.train_samples,
                report.metrics.eval_samples,
                report.metrics.class_distribution[0],
                report.metrics.class_distribution[1]
            ));
            if report.dropped_incomplete > 0 {
                print_warning(&format!(
                    "{} incomplete measurement(s) dropped",
                    report.dropped_incomplete
                ));
            }
            if report.unrecognized_readings > 0 {
                print_warning(&format!(
                    "{} reading(s) from unknown sensors ignored",
                    report.unrecognized_readings
                ));
            }

            let rows: Vec<MetricsRow> = ClassifierKind::ALL
                .iter()
                .map(|&kind| MetricsRow::new(kind, report.metrics.for_kind(kind)))
                .collect();
            print_table(&rows);
        }
    }
    Ok(())
}
