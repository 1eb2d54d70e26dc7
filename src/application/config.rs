// ============================================================
// Layer 2 — Run Configuration
// ============================================================
// Every setting of a run, in one flat serialisable struct.
//
// Precedence, last write wins:
//   1. RunConfig::default()
//   2. a base mapping (e.g. a JSON file passed with --config)
//   3. explicit named overrides (ConfigOverrides, CLI flags)
//   4. keyword overrides (--set key=value); known keys replace
//      fields, unknown keys pass through untouched in `extra`
//
// After resolve() the config is frozen and only ever shared
// by reference.

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::error::TrainerError;
use crate::domain::placement::DeviceInventory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Train, validate and test every fold
    Train,
    /// Only test, with the best saved model or `pretrained_path`
    Test,
}

// ─── RunConfig ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub phase:           Option<Phase>,
    pub batch_size:      usize,
    pub epochs:          usize,
    pub learning_rate:   f64,
    /// Requested accelerator indices.
    pub gpus:            Vec<usize>,
    pub pin_memory:      bool,
    pub num_workers:     usize,
    pub dataset_dir:     PathBuf,
    /// Upper bound on items per dataset (and on sparse test datasets).
    pub load_limit:      usize,
    pub log_dir:         PathBuf,
    pub pretrained_path: Option<PathBuf>,
    pub verbose:         bool,
    pub seed:            u64,
    /// Overwrite previous logs without asking.
    pub force:           bool,
    /// Early stopping patience in epochs.
    pub patience:        usize,
    pub load_sparse:     bool,
    pub num_folds:       Option<usize>,
    pub split_ratio:     Vec<f64>,

    // distributed training
    pub node_rank:       usize,
    pub num_nodes:       usize,
    pub world_size:      Option<usize>,
    pub dist_url:        String,
    pub dist_backend:    String,

    // derived by resolve()
    pub use_ddp:         bool,
    pub num_gpus:        usize,

    /// Keys no field claims, kept for experiments to read.
    #[serde(flatten)]
    pub extra:           BTreeMap<String, Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            phase:           None,
            batch_size:      32,
            epochs:          51,
            learning_rate:   0.001,
            gpus:            vec![0],
            pin_memory:      true,
            num_workers:     4,
            dataset_dir:     PathBuf::new(),
            load_limit:      usize::MAX,
            log_dir:         PathBuf::from("net_logs"),
            pretrained_path: None,
            verbose:         true,
            seed:            rand::thread_rng().gen_range(0..100_000_000_000u64),
            force:           false,
            patience:        31,
            load_sparse:     false,
            num_folds:       None,
            split_ratio:     vec![0.6, 0.2, 0.2],
            node_rank:       0,
            num_nodes:       1,
            world_size:      None,
            dist_url:        "tcp://224.66.41.62:23456".to_string(),
            dist_backend:    "nccl".to_string(),
            use_ddp:         false,
            num_gpus:        0,
            extra:           BTreeMap::new(),
        }
    }
}

// ─── ConfigOverrides ──────────────────────────────────────────────────────────
/// Explicitly named settings; `None` leaves the base value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub phase:           Option<Phase>,
    pub batch_size:      Option<usize>,
    pub epochs:          Option<usize>,
    pub learning_rate:   Option<f64>,
    pub gpus:            Option<Vec<usize>>,
    pub pin_memory:      Option<bool>,
    pub num_workers:     Option<usize>,
    pub dataset_dir:     Option<PathBuf>,
    pub load_limit:      Option<usize>,
    pub log_dir:         Option<PathBuf>,
    pub pretrained_path: Option<PathBuf>,
    pub verbose:         Option<bool>,
    pub seed:            Option<u64>,
    pub force:           Option<bool>,
    pub patience:        Option<usize>,
    pub load_sparse:     Option<bool>,
    pub num_folds:       Option<usize>,
    pub split_ratio:     Option<Vec<f64>>,
    pub node_rank:       Option<usize>,
    pub num_nodes:       Option<usize>,
    pub world_size:      Option<usize>,
    pub dist_url:        Option<String>,
    pub dist_backend:    Option<String>,
    /// Applied last; may name fields or arbitrary pass-through keys.
    pub keywords:        BTreeMap<String, Value>,
}

macro_rules! override_fields {
    ($cfg:expr, $ov:expr, [$($field:ident),* $(,)?]) => {
        $( if let Some(v) = $ov.$field { $cfg.$field = v; } )*
    };
}

impl RunConfig {
    /// Read a base mapping from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config '{}'", path.display()))
    }

    /// Layer `overrides` onto `self` (see module header for order).
    pub fn merged(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if overrides.phase.is_some() {
            self.phase = overrides.phase;
        }
        if overrides.pretrained_path.is_some() {
            self.pretrained_path = overrides.pretrained_path;
        }
        if overrides.num_folds.is_some() {
            self.num_folds = overrides.num_folds;
        }
        if overrides.world_size.is_some() {
            self.world_size = overrides.world_size;
        }
        override_fields!(self, overrides, [
            batch_size, epochs, learning_rate, gpus, pin_memory, num_workers,
            dataset_dir, load_limit, log_dir, verbose, seed, force, patience,
            load_sparse, split_ratio, node_rank, num_nodes, dist_url, dist_backend,
        ]);
        self.with_keywords(overrides.keywords)
    }

    /// Apply free-form keys through serde so known names land in
    /// their typed field and the rest end up in `extra`.
    pub fn with_keywords(self, keywords: BTreeMap<String, Value>) -> Result<Self> {
        if keywords.is_empty() {
            return Ok(self);
        }
        let mut value = serde_json::to_value(&self)?;
        if let Value::Object(map) = &mut value {
            map.extend(keywords);
        }
        serde_json::from_value(value).context("Invalid keyword override")
    }

    /// Validate the phase, clamp devices to what exists and decide
    /// whether distributed mode applies.
    pub fn resolve(mut self, inventory: DeviceInventory) -> Result<Self, TrainerError> {
        if self.phase.is_none() {
            return Err(TrainerError::MissingPhase);
        }

        if self.gpus.len() > inventory.device_count {
            tracing::warn!(
                "Number of GPUs provided: {}, but only {} available.",
                self.gpus.len(),
                inventory.device_count
            );
            self.gpus = (0..inventory.device_count).collect();
        }

        if !self.gpus.is_empty() && !inventory.accelerator_available {
            tracing::warn!(
                "gpus {:?} requested but no accelerator is available. Using CPU (slow).",
                self.gpus
            );
        }

        self.use_ddp = inventory.accelerator_available
            && inventory.device_count > 1
            && self.gpus.len() > 1;
        self.num_gpus = if self.use_ddp { self.gpus.len() } else { 0 };
        Ok(self)
    }

    pub fn phase(&self) -> Phase {
        self.phase.unwrap_or(Phase::Test)
    }

    pub fn is_train(&self) -> bool {
        self.phase == Some(Phase::Train)
    }

    /// Total distributed workers: explicit `world_size`, else
    /// `num_gpus * num_nodes`.
    pub fn effective_world_size(&self) -> usize {
        self.world_size.unwrap_or(self.num_gpus * self.num_nodes)
    }

    /// Typed read of a pass-through key.
    pub fn extra_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
