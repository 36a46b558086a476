//! End-to-end tests for the pipeline
//!
//! These tests verify:
//! - Training from raw readings through to served predictions
//! - Persistence across sessions and retrain invalidation
//! - Error paths: empty store, cancellation, source timeout

use super::*;
use crate::models::RawReading;
use crate::source::{async_trait, InMemorySource};
use crate::test_support::{raw_batch, raw_readings, synthetic_batch};
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        model_dir: dir.path().to_path_buf(),
        n_trees: 15,
        ..Default::default()
    }
}

fn pipeline_with(readings: Vec<RawReading>, dir: &TempDir) -> IrrigationPipeline {
    IrrigationPipeline::new(Arc::new(InMemorySource::new(readings)), &test_config(dir))
}

fn request() -> SensorReadings {
    SensorReadings {
        phosphorus_present: 1.0,
        potassium_present: 1.0,
        ph: 7.0,
        humidity_pct: 40.0,
    }
}

mod training_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_twenty_batches_train_and_serve() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with(raw_readings(8, 12), &dir);

        let report = pipeline.train(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.batches_used, 20);
        assert_eq!(report.readings_fetched, 100);
        assert_eq!(report.metrics.class_distribution, [8, 12]);
        assert_eq!(report.metrics.eval_samples, 4);
        for kind in ClassifierKind::ALL {
            let accuracy = report.metrics.for_kind(kind).accuracy;
            assert!((0.0..=1.0).contains(&accuracy));
        }

        let result = pipeline.predict(&request(), ClassifierKind::TreeEnsemble).unwrap();
        assert!((result.p_no_irrigate + result.p_irrigate - 1.0).abs() < 1e-6);
        assert_eq!(result.model_generation, report.manifest.generation);
        assert_eq!(result.irrigation_needed, result.p_irrigate > result.p_no_irrigate);
    }

    #[tokio::test]
    async fn test_incomplete_batches_are_dropped() {
        let dir = TempDir::new().unwrap();
        let mut readings = raw_readings(8, 12);
        let (partial, _) = synthetic_batch(3);
        let mut broken = raw_batch(500, &partial, true);
        broken.pop();
        readings.extend(broken);

        let report = pipeline_with(readings, &dir)
            .train(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.batches_used, 20);
        assert_eq!(report.dropped_incomplete, 1);
    }

    #[tokio::test]
    async fn test_too_few_batches() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with(raw_readings(2, 3), &dir);

        let err = pipeline.train(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(_)));
        assert!(!pipeline.store().exists());
        assert!(pipeline.last_metrics().is_none());
    }

    #[tokio::test]
    async fn test_rejected_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut readings = raw_readings(8, 12);
        readings.push(readings[0].clone());
        let config = PipelineConfig {
            duplicate_policy: crate::source::DuplicatePolicy::Reject,
            ..test_config(&dir)
        };
        let pipeline = IrrigationPipeline::new(Arc::new(InMemorySource::new(readings)), &config);

        let err = pipeline.train(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::DataQuality(_)));
    }

    #[tokio::test]
    async fn test_cancelled_training_keeps_store_empty() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with(raw_readings(8, 12), &dir);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pipeline.train(&cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::TrainingAborted(_)));
        assert!(!pipeline.store().exists());
    }

    #[tokio::test]
    async fn test_same_data_same_metrics() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let a = pipeline_with(raw_readings(10, 15), &dir_a)
            .train(&CancellationToken::new())
            .await
            .unwrap();
        let b = pipeline_with(raw_readings(10, 15), &dir_b)
            .train(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.manifest.generation, b.manifest.generation);
    }
}

mod serving_tests {
    use super::*;

    #[tokio::test]
    async fn test_predict_before_training_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with(Vec::new(), &dir);

        for kind in ClassifierKind::ALL {
            assert!(matches!(
                pipeline.predict(&request(), kind),
                Err(PipelineError::ModelUnavailable(_))
            ));
        }
        assert!(matches!(
            pipeline.feature_importance(),
            Err(PipelineError::ModelUnavailable(_))
        ));
        assert!(matches!(
            pipeline.warm_up().await,
            Err(PipelineError::ModelUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_fresh_session_reproduces_predictions() {
        let dir = TempDir::new().unwrap();
        let trained = pipeline_with(raw_readings(8, 12), &dir);
        trained.train(&CancellationToken::new()).await.unwrap();

        let restarted = pipeline_with(Vec::new(), &dir);
        let manifest = restarted.warm_up().await.unwrap();
        assert_eq!(Some(manifest.generation), trained.session().loaded_generation());

        for kind in ClassifierKind::ALL {
            let before = trained.predict(&request(), kind).unwrap();
            let after = restarted.predict(&request(), kind).unwrap();
            assert_eq!(before, after);
        }
    }

    #[tokio::test]
    async fn test_retrain_replaces_session_models() {
        let dir = TempDir::new().unwrap();
        let session = Arc::new(PredictionSession::new(ModelStore::in_dir(dir.path())));

        let first = IrrigationPipeline::with_session(
            Arc::new(InMemorySource::new(raw_readings(8, 12))),
            Arc::clone(&session),
            &test_config(&dir),
        );
        let first_report = first.train(&CancellationToken::new()).await.unwrap();

        let second = IrrigationPipeline::with_session(
            Arc::new(InMemorySource::new(raw_readings(14, 21))),
            Arc::clone(&session),
            &test_config(&dir),
        );
        let second_report = second.train(&CancellationToken::new()).await.unwrap();

        assert_ne!(first_report.manifest.generation, second_report.manifest.generation);
        assert_eq!(session.loaded_generation(), Some(second_report.manifest.generation.clone()));
        let result = first.predict(&request(), ClassifierKind::Linear).unwrap();
        assert_eq!(result.model_generation, second_report.manifest.generation);
    }

    #[tokio::test]
    async fn test_report_before_and_after_training() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with(raw_readings(8, 12), &dir);

        let empty = pipeline.report();
        assert!(!empty.models_available.tree_ensemble);
        assert!(!empty.models_available.linear);
        assert!(empty.model_generation.is_none());
        assert!(empty.metrics.is_none());
        assert!(empty.feature_importance.is_none());

        let trained = pipeline.train(&CancellationToken::new()).await.unwrap();
        let report = pipeline.report();
        assert!(report.models_available.tree_ensemble && report.models_available.linear);
        assert_eq!(report.model_generation, Some(trained.manifest.generation));
        assert_eq!(report.metrics, Some(trained.metrics));
        let importance = report.feature_importance.unwrap();
        assert!(importance.windows(2).all(|w| w[0].weight >= w[1].weight));
    }
}

mod storage_tests {
    use super::*;

    struct StalledSource;

    #[async_trait]
    impl RowSource for StalledSource {
        async fn fetch_readings(&self) -> PipelineResult<Vec<RawReading>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_source_timeout_is_storage_unavailable() {
        let dir = TempDir::new().unwrap();
        let pipeline = IrrigationPipeline::new(Arc::new(StalledSource), &test_config(&dir)).with_timeouts(
            PipelineTimeouts {
                source: Duration::from_millis(50),
                storage: Duration::from_secs(5),
            },
        );

        let err = pipeline.train(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_save_past_deadline_never_lands() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_with(raw_readings(8, 12), &dir).with_timeouts(PipelineTimeouts {
            source: Duration::from_secs(5),
            storage: Duration::ZERO,
        });

        let result = pipeline.train(&CancellationToken::new()).await;
        // Give an abandoned writer time to reach its commit point
        tokio::time::sleep(Duration::from_millis(500)).await;

        match result {
            Err(PipelineError::StorageUnavailable(_)) => {
                assert!(!pipeline.store().exists());
                assert!(!pipeline.store().bundle_path().with_extension("tmp").exists());
                assert!(!pipeline.session().is_loaded());
                assert!(pipeline.last_metrics().is_none());
            }
            Ok(report) => {
                let stored = pipeline.store().manifest().unwrap();
                assert_eq!(stored.generation, report.manifest.generation);
            }
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_corrupt_bundle_is_unavailable_for_serving() {
        let dir = TempDir::new().unwrap();
        let trained = pipeline_with(raw_readings(8, 12), &dir);
        trained.train(&CancellationToken::new()).await.unwrap();
        std::fs::write(trained.store().bundle_path(), b"{\"manifest\":").unwrap();

        let restarted = pipeline_with(Vec::new(), &dir);
        assert!(matches!(
            restarted.predict(&request(), ClassifierKind::TreeEnsemble),
            Err(PipelineError::ModelUnavailable(_))
        ));
        assert!(matches!(
            restarted.store().load(),
            Err(PipelineError::ModelNotFound(_))
        ));
    }
}
