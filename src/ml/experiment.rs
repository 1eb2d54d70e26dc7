// ============================================================
// Layer 5 — Experiment Contract
// ============================================================
// An Experiment is everything the Trainer cannot know in
// advance: which models exist, how a batch is built, how one
// batch is run, and how parameter state is exported.
//
// Required methods cover model/optimizer setup, batching,
// the per-batch iteration and state export/import.
// Every other method is a hook with a working default, so
// a minimal experiment implements only the required ones.
//
// The Trainer drives the calls in this order per fold:
//
//   build_models → init_optimizers → init_weights | load
//   → place → (batcher → iteration → step)* per epoch
//   → on_epoch_end → early_stopping
//
// Batches come out of Burn's DataLoader, so items, batches and
// the batcher must be 'static and thread-safe.

use anyhow::Result;
use burn::data::dataloader::batcher::Batcher;
use std::fmt::Debug;

use crate::application::config::RunConfig;
use crate::data::dataset::{FileDataset, Mode};
use crate::domain::cache::RunCache;
use crate::domain::metrics::{Averages, Metrics};
use crate::domain::placement::DevicePlacement;
use crate::infra::metrics::save_progress;

// ─── Iteration ────────────────────────────────────────────────────────────────
/// What one batch produced.
///
/// `loss` is required in training mode; the trainer takes it
/// out to run the optimizer step, so it is `None` afterwards.
#[derive(Debug, Clone)]
pub struct Iteration<M, L, O> {
    pub metrics:     M,
    pub averages:    Averages,
    pub loss:        Option<L>,
    pub output:      Option<O>,
    pub predictions: Option<Vec<i64>>,
}

impl<M, L, O> Iteration<M, L, O> {
    pub fn new(metrics: M, averages: Averages) -> Self {
        Self { metrics, averages, loss: None, output: None, predictions: None }
    }

    pub fn with_loss(mut self, loss: L) -> Self {
        self.loss = Some(loss);
        self
    }

    pub fn with_output(mut self, output: O) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_predictions(mut self, predictions: Vec<i64>) -> Self {
        self.predictions = Some(predictions);
        self
    }
}

pub type IterationOf<E> = Iteration<
    <E as Experiment>::Metrics,
    <E as Experiment>::Loss,
    <E as Experiment>::Output,
>;

/// Summary of one finished epoch, passed to the epoch hooks.
#[derive(Debug, Clone)]
pub struct EpochReport<M> {
    pub epoch:         usize,
    pub train_loss:    Averages,
    pub train_metrics: M,
    pub val_loss:      Averages,
    pub val_metrics:   M,
}

// ─── Experiment Trait ─────────────────────────────────────────────────────────
pub trait Experiment: Sized {
    /// One dataset item.
    type Item: Send + Sync + Clone + Debug + 'static;
    /// Dataset type built from fold file lists.
    type Dataset: FileDataset<Self::Item> + 'static;
    /// What the batcher builds from a list of items.
    type Batch: Send + Clone + Debug + 'static;
    type Batcher: Batcher<Self::Item, Self::Batch> + 'static;
    /// Differentiable loss handed to `step`.
    type Loss;
    /// Optional per-batch model output kept for `save_predictions`.
    type Output;
    type Metrics: Metrics + Default;

    // ── Required ──────────────────────────────────────────────────────────────

    /// Construct every model. Must register at least one.
    fn build_models(&mut self, config: &RunConfig) -> Result<()>;

    /// Registered model names; the first one is the primary model.
    fn model_names(&self) -> Vec<String>;

    /// Registered optimizer names; the first one is the primary optimizer.
    fn optimizer_names(&self) -> Vec<String>;

    fn init_optimizers(&mut self, config: &RunConfig) -> Result<()>;

    /// Seeded random initialisation of every model.
    fn init_weights(&mut self, seed: u64) -> Result<()>;

    /// A fresh batcher for one data loader.
    fn batcher(&self) -> Self::Batcher;

    /// Forward pass, loss and metrics for one batch. In `Mode::Eval`
    /// no gradients may be tracked.
    fn iteration(&mut self, batch: Self::Batch, mode: Mode) -> Result<IterationOf<Self>>;

    /// Backward pass and a step of the primary optimizer.
    fn step(&mut self, loss: Self::Loss) -> Result<()>;

    fn model_state(&self, name: &str) -> Result<Vec<u8>>;
    fn load_model_state(&mut self, name: &str, state: Vec<u8>) -> Result<()>;
    fn optimizer_state(&self, name: &str) -> Result<Vec<u8>>;
    fn load_optimizer_state(&mut self, name: &str, state: Vec<u8>) -> Result<()>;

    // ── Hooks ─────────────────────────────────────────────────────────────────

    /// Trainable parameter count per model, logged when verbose.
    fn parameter_counts(&self) -> Vec<(String, usize)> {
        Vec::new()
    }

    /// Move models to the assigned device.
    fn place(&mut self, placement: &DevicePlacement) -> Result<()> {
        tracing::debug!("Models placed on {placement}");
        Ok(())
    }

    fn new_metrics(&self) -> Self::Metrics {
        Default::default()
    }

    fn new_averages(&self) -> Averages {
        Averages::new(1)
    }

    /// Receives every iteration of one evaluated dataset (one test
    /// file at a time when loading sparse).
    fn save_predictions(
        &mut self,
        _dataset: &Self::Dataset,
        _its:     Vec<IterationOf<Self>>,
        _cache:   &RunCache,
    ) -> Result<()> {
        Ok(())
    }

    /// Per dataset spec: change the monitor metric, its direction,
    /// the log header or the log dir.
    fn reset_dataset_cache(&mut self, _cache: &mut RunCache) {}

    /// Per fold, after the fold logs are cleared.
    fn reset_fold_cache(&mut self, _cache: &mut RunCache) {}

    fn on_iteration_end(&mut self, _i: usize, _epoch: usize, _it: &IterationOf<Self>) {}

    /// Default: rewrite the training/validation progress CSVs.
    fn on_epoch_end(&mut self, _report: &EpochReport<Self::Metrics>, cache: &RunCache) -> Result<()> {
        save_progress(cache)
    }

    /// Default: stop once `patience` epochs passed without a new best.
    fn early_stopping(
        &self,
        report: &EpochReport<Self::Metrics>,
        cache:  &RunCache,
        config: &RunConfig,
    ) -> bool {
        report.epoch.saturating_sub(cache.best_epoch) >= config.patience
    }
}
