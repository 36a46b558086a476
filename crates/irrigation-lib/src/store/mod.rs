//! Persistence for trained model sets
//!
//! The store keeps exactly one model set: a single bundle file that is
//! replaced atomically on every save. Readers see either the previous set or
//! the new one, never a mix. There is no locking; concurrent writers race
//! and the last rename wins.

mod bundle;

pub use bundle::{compute_checksum, ArtifactEntry, ArtifactKind, ArtifactPayload, ModelManifest, FORMAT_VERSION};

use crate::classifier::TrainedModels;
use crate::error::{PipelineError, PipelineResult};
use bundle::ModelBundle;
use chrono::Utc;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default bundle file name inside the model directory
pub const DEFAULT_BUNDLE_FILE: &str = "irrigation_models.json";

/// Configuration for the model store
#[derive(Debug, Clone, PartialEq)]
pub struct ModelStoreConfig {
    /// Directory holding the bundle
    pub model_dir: PathBuf,
    pub bundle_file: String,
}

impl Default for ModelStoreConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            bundle_file: DEFAULT_BUNDLE_FILE.to_string(),
        }
    }
}

const GATE_OPEN: u8 = 0;
const GATE_COMMITTED: u8 = 1;
const GATE_CLOSED: u8 = 2;

/// One-shot decision on whether a pending save may replace the bundle
///
/// The writer claims the gate right before the final rename; a caller that
/// gives up waiting closes it. Exactly one of the two succeeds.
#[derive(Debug, Clone, Default)]
pub struct CommitGate {
    state: Arc<AtomicU8>,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate; `false` if the save already claimed its commit
    pub fn close(&self) -> bool {
        self.state
            .compare_exchange(GATE_OPEN, GATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn try_commit(&self) -> bool {
        self.state
            .compare_exchange(GATE_OPEN, GATE_COMMITTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A verified model set and its manifest
#[derive(Debug, Clone)]
pub struct LoadedModels {
    pub manifest: ModelManifest,
    pub models: TrainedModels,
}

/// File-backed store for the current model generation
#[derive(Debug, Clone)]
pub struct ModelStore {
    config: ModelStoreConfig,
}

impl ModelStore {
    pub fn new(config: ModelStoreConfig) -> Self {
        Self { config }
    }

    /// Store rooted at `model_dir` with the default bundle name
    pub fn in_dir(model_dir: impl Into<PathBuf>) -> Self {
        Self::new(ModelStoreConfig {
            model_dir: model_dir.into(),
            ..Default::default()
        })
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.config.model_dir.join(&self.config.bundle_file)
    }

    pub fn exists(&self) -> bool {
        self.bundle_path().is_file()
    }

    /// Persist a model set, replacing whatever was stored before
    pub fn save(&self, models: &TrainedModels) -> PipelineResult<ModelManifest> {
        self.save_gated(models, &CommitGate::new())
    }

    /// Like [`save`](Self::save), but the bundle is only replaced if `gate`
    /// is still open when the write is ready to commit
    pub fn save_gated(&self, models: &TrainedModels, gate: &CommitGate) -> PipelineResult<ModelManifest> {
        models.validate().map_err(PipelineError::Serialization)?;

        let bundle = ModelBundle::encode(models, Utc::now())
            .map_err(|e| PipelineError::Serialization(format!("{:#}", e)))?;
        let bytes = serde_json::to_vec(&bundle)
            .map_err(|e| PipelineError::Serialization(format!("Failed to encode bundle: {}", e)))?;

        fs::create_dir_all(&self.config.model_dir).map_err(|e| {
            PipelineError::StorageUnavailable(format!(
                "Failed to create model directory {}: {}",
                self.config.model_dir.display(),
                e
            ))
        })?;

        let path = self.bundle_path();
        let committed = write_atomically(&path, &bytes, || gate.try_commit()).map_err(|e| {
            PipelineError::StorageUnavailable(format!("Failed to write {}: {}", path.display(), e))
        })?;
        if !committed {
            warn!(
                generation = %bundle.manifest.generation,
                path = %path.display(),
                "Model bundle discarded before commit"
            );
            return Err(PipelineError::StorageUnavailable(format!(
                "save of generation {} was abandoned before commit",
                bundle.manifest.generation
            )));
        }

        info!(
            generation = %bundle.manifest.generation,
            path = %path.display(),
            size = bytes.len(),
            "Model bundle saved"
        );
        Ok(bundle.manifest)
    }

    /// Restore and verify the full model set
    pub fn load(&self) -> PipelineResult<LoadedModels> {
        let bundle = self.read_bundle()?;
        bundle.verify().map_err(|e| self.corrupt(e))?;
        let models = bundle.decode().map_err(|e| self.corrupt(e))?;

        debug!(generation = %bundle.manifest.generation, "Model bundle loaded");
        Ok(LoadedModels {
            manifest: bundle.manifest,
            models,
        })
    }

    /// Read the manifest without decoding any model
    pub fn manifest(&self) -> PipelineResult<ModelManifest> {
        Ok(self.read_bundle()?.manifest)
    }

    /// Restore one artifact for inspection
    pub fn inspect(&self, kind: ArtifactKind) -> PipelineResult<ArtifactPayload> {
        let bundle = self.read_bundle()?;
        bundle.verify().map_err(|e| self.corrupt(e))?;
        bundle.decode_one(kind).map_err(|e| self.corrupt(e))
    }

    fn read_bundle(&self) -> PipelineResult<ModelBundle> {
        let path = self.bundle_path();
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                PipelineError::ModelNotFound(format!("no model bundle at {}", path.display()))
            }
            _ => PipelineError::StorageUnavailable(format!("Failed to read {}: {}", path.display(), e)),
        })?;

        serde_json::from_slice(&bytes).map_err(|e| self.corrupt(anyhow::Error::new(e)))
    }

    fn corrupt(&self, err: anyhow::Error) -> PipelineError {
        let path = self.bundle_path();
        warn!(path = %path.display(), error = %format!("{:#}", err), "Model bundle rejected");
        PipelineError::ModelNotFound(format!("{}: {:#}", path.display(), err))
    }
}

/// Write to a sibling temp file, sync, then rename over `path` if `commit`
/// still allows it. Returns whether the rename happened.
fn write_atomically(path: &Path, bytes: &[u8], commit: impl FnOnce() -> bool) -> io::Result<bool> {
    let temp_path = path.with_extension("tmp");
    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        if !commit() {
            return Ok(false);
        }
        fs::rename(&temp_path, path)?;
        Ok(true)
    })();

    if !matches!(result, Ok(true)) {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
