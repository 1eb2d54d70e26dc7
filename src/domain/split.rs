// ============================================================
// Layer 3 — Fold Split
// ============================================================
// One fold = one JSON file in a dataset's split_dir:
//   {"train": [...], "validation": [...], "test": [...]}
// The file stem doubles as the experiment id of that fold.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

/// Which list of a split a dataset is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKey {
    Train,
    Validation,
    Test,
}

impl SplitKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train      => "train",
            Self::Validation => "validation",
            Self::Test       => "test",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    #[serde(default)]
    pub train: Vec<String>,
    #[serde(default)]
    pub validation: Vec<String>,
    #[serde(default)]
    pub test: Vec<String>,
}

impl Split {
    pub fn files(&self, key: SplitKey) -> &[String] {
        match key {
            SplitKey::Train      => &self.train,
            SplitKey::Validation => &self.validation,
            SplitKey::Test       => &self.test,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read split file '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed split file '{}'", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Cannot write split file '{}'", path.display()))?;
        tracing::debug!("Wrote split file '{}'", path.display());
        Ok(())
    }
}

/// A split file paired with the experiment id derived from its name.
#[derive(Debug, Clone)]
pub struct FoldFile {
    pub path:          PathBuf,
    pub experiment_id: String,
}

impl FoldFile {
    pub fn from_path(path: PathBuf) -> Self {
        // "drive_0.json" → "drive_0"; everything after the first dot is dropped
        let experiment_id = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.split('.').next().unwrap_or(n).to_string())
            .unwrap_or_default();
        Self { path, experiment_id }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Every fold file in `split_dir`, sorted by name so runs are reproducible.
pub fn list_fold_files(split_dir: &Path) -> Result<Vec<FoldFile>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(split_dir)
        .with_context(|| format!("Cannot read split directory '{}'", split_dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths.into_iter().map(FoldFile::from_path).collect())
}
