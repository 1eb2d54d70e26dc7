// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// Persists the state of every registered model and optimizer
// of an experiment in one file.
//
// On-disk layout (JSON envelope):
//   {
//     "source":         "easytorch",
//     "format_version": 1,
//     "models":         { "<name>": "<base64>" },
//     "optimizers":     { "<name>": "<base64>" }
//   }
// Each state blob is whatever the experiment exported (for the
// bundled classifier, burn's BinBytesRecorder output), stored
// as standard base64.
//
// Loading dispatches on the envelope itself:
//   - JSON object whose source is "easytorch" → Tagged
//   - anything else → Raw, the file is one model's state
// A tagged file with an unknown format_version is an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::Path};

use crate::domain::error::TrainerError;

pub const CHECKPOINT_SOURCE: &str = "easytorch";
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source:         String,
    pub format_version: u32,
    #[serde(default, with = "base64_blobs")]
    pub models:         BTreeMap<String, Vec<u8>>,
    #[serde(default, with = "base64_blobs")]
    pub optimizers:     BTreeMap<String, Vec<u8>>,
}

mod base64_blobs {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        blobs: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&str, String> = blobs
            .iter()
            .map(|(name, bytes)| (name.as_str(), STANDARD.encode(bytes)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        BTreeMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(name, text)| {
                STANDARD
                    .decode(text)
                    .map(|bytes| (name.clone(), bytes))
                    .map_err(|e| D::Error::custom(format!("state '{name}': {e}")))
            })
            .collect()
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            source:         CHECKPOINT_SOURCE.to_string(),
            format_version: CHECKPOINT_FORMAT_VERSION,
            models:         BTreeMap::new(),
            optimizers:     BTreeMap::new(),
        }
    }
}

/// What a checkpoint file turned out to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedCheckpoint {
    Tagged(Checkpoint),
    /// Legacy: the whole file is the state of a single model.
    Raw(Vec<u8>),
}

// Only the tag is read first, so a raw file never has to parse as
// a full envelope.
#[derive(Deserialize)]
struct EnvelopeTag {
    source: Option<String>,
}

impl Checkpoint {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        tracing::debug!(
            "Saved checkpoint '{}' ({} model(s), {} optimizer(s))",
            path.display(),
            self.models.len(),
            self.optimizers.len()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<LoadedCheckpoint> {
        let bytes = fs::read(path).with_context(|| {
            format!("Cannot load checkpoint '{}'. Has the model been trained?", path.display())
        })?;
        Self::from_bytes(bytes, path)
    }

    pub fn from_bytes(bytes: Vec<u8>, path: &Path) -> Result<LoadedCheckpoint> {
        let tagged = serde_json::from_slice::<EnvelopeTag>(&bytes)
            .ok()
            .and_then(|tag| tag.source)
            .is_some_and(|source| source.eq_ignore_ascii_case(CHECKPOINT_SOURCE));

        if !tagged {
            tracing::debug!("'{}' has no easytorch tag; treating it as a raw model state", path.display());
            return Ok(LoadedCheckpoint::Raw(bytes));
        }

        let checkpoint: Checkpoint =
            serde_json::from_slice(&bytes).map_err(|e| TrainerError::InvalidCheckpoint {
                path:   path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if checkpoint.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(TrainerError::InvalidCheckpoint {
                path:   path.to_path_buf(),
                reason: format!(
                    "unsupported format_version {} (expected {})",
                    checkpoint.format_version, CHECKPOINT_FORMAT_VERSION
                ),
            }
            .into());
        }
        Ok(LoadedCheckpoint::Tagged(checkpoint))
    }
}
