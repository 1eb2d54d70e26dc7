// ============================================================
// Layer 3 — Dataset Spec
// ============================================================
// Describes one dataset: a name, where its fold files live,
// and any number of free-form entries. Entries whose key ends
// in "dir" are paths, resolved against the configured dataset
// root when the orchestrator is built.
//
//   {"name": "drive", "data_dir": "images", "split_dir": "splits"}
//        + dataset_dir "/data"
//   → data_dir = "/data/images", split_dir = "/data/splits"

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::error::TrainerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSpec {
    pub name: String,

    /// Directory holding one JSON file per fold. `None` until splits
    /// are created under the run's log directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_dir: Option<PathBuf>,

    #[serde(flatten)]
    pub entries: BTreeMap<String, String>,
}

impl DataSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:      name.into(),
            split_dir: None,
            entries:   BTreeMap::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn with_split_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.split_dir = Some(dir.into());
        self
    }

    /// Parse `name=drive,data_dir=images,split_dir=splits`.
    pub fn parse_pairs(s: &str) -> Result<Self, TrainerError> {
        let mut name      = None;
        let mut split_dir = None;
        let mut entries   = BTreeMap::new();

        for pair in s.split(',').filter(|p| !p.trim().is_empty()) {
            let (k, v) = pair.split_once('=').ok_or_else(|| {
                TrainerError::DataSpec(format!("expected key=value, got '{pair}'"))
            })?;
            let (k, v) = (k.trim(), v.trim());
            match k {
                "name"      => name = Some(v.to_string()),
                "split_dir" => split_dir = Some(PathBuf::from(v)),
                _           => {
                    entries.insert(k.to_string(), v.to_string());
                }
            }
        }

        let name = name
            .ok_or_else(|| TrainerError::DataSpec(format!("'{s}' has no name")))?;
        Ok(Self { name, split_dir, entries })
    }

    /// Join every `*dir` entry (split_dir included) onto `root`.
    pub fn qualified(mut self, root: &Path) -> Self {
        if let Some(split_dir) = self.split_dir.take() {
            self.split_dir = Some(root.join(split_dir));
        }
        for (key, value) in self.entries.iter_mut() {
            if key.ends_with("dir") {
                *value = root.join(value.as_str()).to_string_lossy().into_owned();
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// A `*dir` entry as a path.
    pub fn dir(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    /// Directory the splitter lists files from.
    pub fn data_dir(&self) -> Result<PathBuf, TrainerError> {
        self.dir("data_dir").ok_or_else(|| {
            TrainerError::DataSpec(format!("dataset '{}' has no data_dir", self.name))
        })
    }
}
