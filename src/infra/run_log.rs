// ============================================================
// Layer 6 — Run Log
// ============================================================
// After training a fold, everything needed to understand the
// run is dumped into <log_dir>/<experiment_id>_log.json:
//
//   config      → the frozen RunConfig
//   cache       → best score/epoch, logs, monitor settings
//   dataspecs   → the dataset spec(s) trained on
//   models      → registered model names and parameter counts
//   optimizers  → registered optimizer names
//
// The file's existence is also what check_previous_logs
// looks for before a train-phase run overwrites a fold.

use anyhow::{Context, Result};
use serde::Serialize;
use std::{fs, path::{Path, PathBuf}};

use crate::application::config::RunConfig;
use crate::domain::cache::RunCache;
use crate::domain::dataspec::DataSpec;

#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub name:       String,
    pub parameters: usize,
}

#[derive(Debug, Serialize)]
pub struct RunLog<'a> {
    pub config:     &'a RunConfig,
    pub cache:      &'a RunCache,
    pub dataspecs:  &'a [DataSpec],
    pub models:     Vec<ModelSummary>,
    pub optimizers: Vec<String>,
}

/// `<log_dir>/<id>_log.json`
pub fn run_log_path(log_dir: &Path, experiment_id: &str) -> PathBuf {
    log_dir.join(format!("{experiment_id}_log.json"))
}

impl RunLog<'_> {
    pub fn save(&self) -> Result<PathBuf> {
        let path = run_log_path(&self.cache.log_dir, &self.cache.experiment_id);
        fs::create_dir_all(&self.cache.log_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write run log '{}'", path.display()))?;
        tracing::debug!("Saved run log to '{}'", path.display());
        Ok(path)
    }
}
