//! On-disk bundle format
//!
//! A bundle holds the three artifacts of one training run, each serialized
//! on its own and checksummed, plus a manifest. The generation id is derived
//! from the three checksums, so identical models always share a generation.

use crate::classifier::{LogisticRegression, RandomForest, StandardScaler, TrainedModels};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Bumped whenever the bundle layout or an artifact encoding changes
pub const FORMAT_VERSION: u32 = 1;

/// Hex characters of the combined digest used as generation id
const GENERATION_LEN: usize = 16;

/// The artifacts persisted for one training run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    TreeEnsemble,
    Linear,
    Normalizer,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::TreeEnsemble, ArtifactKind::Linear, ArtifactKind::Normalizer];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::TreeEnsemble => "tree_ensemble",
            ArtifactKind::Linear => "linear",
            ArtifactKind::Normalizer => "normalizer",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "tree_ensemble" | "random_forest" => Ok(ArtifactKind::TreeEnsemble),
            "linear" | "logistic_regression" => Ok(ArtifactKind::Linear),
            "normalizer" | "scaler" => Ok(ArtifactKind::Normalizer),
            other => Err(format!(
                "unknown artifact '{}', expected tree_ensemble, linear or normalizer",
                other
            )),
        }
    }
}

/// Checksum and size of one stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub kind: ArtifactKind,
    pub checksum: String,
    pub size_bytes: usize,
}

/// Describes the persisted model set without holding the models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub generation: String,
    pub created_at: DateTime<Utc>,
    pub format_version: u32,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ModelManifest {
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }
}

/// A single artifact restored from the bundle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "artifact", rename_all = "snake_case")]
pub enum ArtifactPayload {
    TreeEnsemble(RandomForest),
    Linear(LogisticRegression),
    Normalizer(StandardScaler),
}

/// The file contents: manifest plus independently encoded artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ModelBundle {
    pub manifest: ModelManifest,
    pub artifacts: BTreeMap<ArtifactKind, String>,
}

impl ModelBundle {
    pub fn encode(models: &TrainedModels, created_at: DateTime<Utc>) -> Result<Self> {
        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            ArtifactKind::TreeEnsemble,
            serde_json::to_string(&models.tree_ensemble).context("Failed to encode tree ensemble")?,
        );
        artifacts.insert(
            ArtifactKind::Linear,
            serde_json::to_string(&models.linear).context("Failed to encode linear classifier")?,
        );
        artifacts.insert(
            ArtifactKind::Normalizer,
            serde_json::to_string(&models.normalizer).context("Failed to encode normalizer")?,
        );

        Ok(Self::seal(artifacts, created_at))
    }

    /// Build the manifest for already encoded artifacts
    pub fn seal(artifacts: BTreeMap<ArtifactKind, String>, created_at: DateTime<Utc>) -> Self {
        let entries: Vec<ArtifactEntry> = artifacts
            .iter()
            .map(|(&kind, payload)| ArtifactEntry {
                kind,
                checksum: compute_checksum(payload.as_bytes()),
                size_bytes: payload.len(),
            })
            .collect();

        let manifest = ModelManifest {
            generation: generation_id(&entries),
            created_at,
            format_version: FORMAT_VERSION,
            artifacts: entries,
        };

        Self { manifest, artifacts }
    }

    /// Check version, presence, sizes and checksums of every artifact
    pub fn verify(&self) -> Result<()> {
        if self.manifest.format_version != FORMAT_VERSION {
            bail!(
                "bundle format version {} is not supported (expected {})",
                self.manifest.format_version,
                FORMAT_VERSION
            );
        }

        for kind in ArtifactKind::ALL {
            let entry = self
                .manifest
                .artifact(kind)
                .with_context(|| format!("manifest has no entry for {}", kind))?;
            let payload = self.payload(kind)?;
            if payload.len() != entry.size_bytes {
                bail!(
                    "{} is {} bytes, manifest says {}",
                    kind,
                    payload.len(),
                    entry.size_bytes
                );
            }
            let actual = compute_checksum(payload.as_bytes());
            if actual != entry.checksum {
                bail!(
                    "checksum mismatch for {}: expected {}, got {}",
                    kind,
                    entry.checksum,
                    actual
                );
            }
        }

        let expected = generation_id(&self.manifest.artifacts);
        if expected != self.manifest.generation {
            bail!(
                "generation {} does not match artifact checksums ({})",
                self.manifest.generation,
                expected
            );
        }
        Ok(())
    }

    pub fn decode(&self) -> Result<TrainedModels> {
        let models = TrainedModels {
            tree_ensemble: serde_json::from_str(self.payload(ArtifactKind::TreeEnsemble)?)
                .context("Failed to decode tree ensemble")?,
            linear: serde_json::from_str(self.payload(ArtifactKind::Linear)?)
                .context("Failed to decode linear classifier")?,
            normalizer: serde_json::from_str(self.payload(ArtifactKind::Normalizer)?)
                .context("Failed to decode normalizer")?,
        };
        models.validate().map_err(anyhow::Error::msg)?;
        Ok(models)
    }

    pub fn decode_one(&self, kind: ArtifactKind) -> Result<ArtifactPayload> {
        let payload = self.payload(kind)?;
        let decoded = match kind {
            ArtifactKind::TreeEnsemble => {
                let forest: RandomForest = serde_json::from_str(payload).context("Failed to decode tree ensemble")?;
                forest.validate().map_err(anyhow::Error::msg)?;
                ArtifactPayload::TreeEnsemble(forest)
            }
            ArtifactKind::Linear => ArtifactPayload::Linear(serde_json::from_str(payload)?),
            ArtifactKind::Normalizer => ArtifactPayload::Normalizer(serde_json::from_str(payload)?),
        };
        Ok(decoded)
    }

    fn payload(&self, kind: ArtifactKind) -> Result<&str> {
        self.artifacts
            .get(&kind)
            .map(String::as_str)
            .with_context(|| format!("bundle has no {} artifact", kind))
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn generation_id(entries: &[ArtifactEntry]) -> String {
    let mut hasher = Sha256::new();
    for kind in ArtifactKind::ALL {
        if let Some(entry) = entries.iter().find(|e| e.kind == kind) {
            hasher.update(entry.checksum.as_bytes());
        }
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(GENERATION_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"hello world");
        assert_eq!(checksum.len(), 64);
        assert_eq!(
            checksum,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_artifact_kind_parsing() {
        assert_eq!("normalizer".parse::<ArtifactKind>().unwrap(), ArtifactKind::Normalizer);
        assert_eq!("random-forest".parse::<ArtifactKind>().unwrap(), ArtifactKind::TreeEnsemble);
        assert!("onnx".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn test_generation_depends_on_checksums() {
        let entries = |c: &str| {
            ArtifactKind::ALL
                .iter()
                .map(|&kind| ArtifactEntry {
                    kind,
                    checksum: format!("{}-{}", c, kind),
                    size_bytes: 1,
                })
                .collect::<Vec<_>>()
        };
        let a = generation_id(&entries("a"));
        assert_eq!(a.len(), GENERATION_LEN);
        assert_eq!(a, generation_id(&entries("a")));
        assert_ne!(a, generation_id(&entries("b")));
    }
}
