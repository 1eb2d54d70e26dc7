// ============================================================
// Layer 3 — Run Cache
// ============================================================
// Mutable, run-scoped bookkeeping owned by one Trainer.
// Reset once per dataset spec and again at the start of each
// fold. Serialised verbatim into the <experiment>_log.json dump.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_LOG_HEADER: &str = "Loss,Precision,Recall,F1,Accuracy";
pub const DEFAULT_MONITOR_METRIC: &str = "f1";

/// Whether a larger or a smaller monitor value is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricDirection {
    Maximize,
    Minimize,
}

impl MetricDirection {
    /// Starting "best" value for a fresh fold.
    pub fn initial_best(self) -> f64 {
        match self {
            Self::Maximize => 0.0,
            Self::Minimize => 1e11,
        }
    }

    /// Inclusive: a tie counts as an improvement.
    pub fn improves(self, candidate: f64, best: f64) -> bool {
        match self {
            Self::Maximize => candidate >= best,
            Self::Minimize => candidate <= best,
        }
    }
}

/// One labelled row of the global score file (`SPLIT,<header>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub label:  String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCache {
    pub log_dir:           PathBuf,
    pub experiment_id:     String,
    /// File name (inside `log_dir`) of the best checkpoint.
    pub checkpoint:        String,
    pub best_score:        f64,
    pub best_epoch:        usize,
    pub monitor_metric:    String,
    pub metric_direction:  MetricDirection,
    pub log_header:        String,
    pub training_log:      Vec<Vec<f64>>,
    pub validation_log:    Vec<Vec<f64>>,
    pub test_score:        Vec<Vec<f64>>,
    pub global_test_score: Vec<ScoreRow>,
}

impl Default for RunCache {
    fn default() -> Self {
        Self {
            log_dir:           PathBuf::new(),
            experiment_id:     String::new(),
            checkpoint:        String::new(),
            best_score:        MetricDirection::Maximize.initial_best(),
            best_epoch:        0,
            monitor_metric:    DEFAULT_MONITOR_METRIC.to_string(),
            metric_direction:  MetricDirection::Maximize,
            log_header:        DEFAULT_LOG_HEADER.to_string(),
            training_log:      Vec::new(),
            validation_log:    Vec::new(),
            test_score:        Vec::new(),
            global_test_score: Vec::new(),
        }
    }
}

impl RunCache {
    /// Fresh cache for one dataset spec.
    pub fn for_dataset(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }

    /// Point the cache at a new fold: experiment id, checkpoint name,
    /// and a best score matching the (already chosen) direction.
    pub fn start_fold(&mut self, experiment_id: &str) {
        self.experiment_id = experiment_id.to_string();
        self.checkpoint    = format!("{experiment_id}.pt");
        self.best_epoch    = 0;
        self.best_score    = self.metric_direction.initial_best();
    }

    pub fn clear_fold_logs(&mut self) {
        self.training_log.clear();
        self.validation_log.clear();
        self.test_score.clear();
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.log_dir.join(&self.checkpoint)
    }
}
