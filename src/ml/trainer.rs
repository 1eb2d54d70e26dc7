// ============================================================
// Layer 5 — Trainer
// ============================================================
// Drives one Experiment through a fold:
//
//   init_nn → train (epochs) → load_best_model → evaluation
//
// The trainer owns the mutable RunCache; the RunConfig is
// shared and never changes once a run starts.
//
// Per epoch:
//   1. shuffled training batches → training_iteration
//      (a running window is logged and reset every
//       i % (ln(i+1)+1) == 0 iterations when verbose)
//   2. evaluation on the validation dataset
//   3. save_if_better on the monitor metric
//   4. on_epoch_end hook, then early_stopping hook

use anyhow::Result;
use burn::data::dataset::Dataset;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::config::RunConfig;
use crate::data::dataset::Mode;
use crate::data::loader::{eval_loader, num_batches, train_loader};
use crate::domain::cache::RunCache;
use crate::domain::error::TrainerError;
use crate::domain::metrics::{Accumulate, Averages, Metrics};
use crate::domain::placement::DevicePlacement;
use crate::domain::split::SplitKey;
use crate::domain::traits::Confirm;
use crate::infra::checkpoint::{Checkpoint, LoadedCheckpoint};
use crate::infra::metrics::test_score_path;
use crate::infra::run_log::run_log_path;
use crate::ml::experiment::{EpochReport, Experiment, IterationOf};

/// How a call to `train` ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOutcome {
    pub epochs_run:    usize,
    pub best_epoch:    usize,
    pub best_score:    f64,
    pub stopped_early: bool,
}

// int(ln(i + 1) + 1): log often at first, then less and less
fn log_interval(i: usize) -> usize {
    ((i as f64 + 1.0).ln() + 1.0) as usize
}

/// Averages followed by metric values, in log-header order.
pub(crate) fn log_row<M: Accumulate>(averages: &Averages, metrics: &M) -> Vec<f64> {
    let mut row = averages.get();
    row.extend(metrics.get());
    row
}

pub struct Trainer<E: Experiment> {
    pub experiment: E,
    pub cache:      RunCache,
    config:         Arc<RunConfig>,
    placement:      DevicePlacement,
    confirm:        Arc<dyn Confirm>,
}

impl<E: Experiment> Trainer<E> {
    pub fn new(
        experiment: E,
        config:     Arc<RunConfig>,
        placement:  DevicePlacement,
        confirm:    Arc<dyn Confirm>,
    ) -> Self {
        Self {
            experiment,
            cache: RunCache::default(),
            config,
            placement,
            confirm,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn placement(&self) -> &DevicePlacement {
        &self.placement
    }

    // ─── Setup ────────────────────────────────────────────────────────────────

    /// Build models and optimizers, initialise or load weights, place
    /// everything on the assigned device.
    pub fn init_nn(&mut self) -> Result<()> {
        self.experiment.build_models(&self.config)?;
        if self.experiment.model_names().is_empty() {
            return Err(TrainerError::NoModels.into());
        }

        if self.config.verbose {
            for (name, count) in self.experiment.parameter_counts() {
                tracing::info!(" ### Total params in {name}: {count}");
            }
        }

        self.experiment.init_optimizers(&self.config)?;
        self.init_weights()?;
        self.experiment.place(&self.placement)
    }

    fn init_weights(&mut self) -> Result<()> {
        if let Some(path) = self.config.pretrained_path.clone() {
            tracing::info!("Loading pretrained weights from '{}'", path.display());
            self.load_checkpoint(&path)
        } else if self.config.is_train() {
            self.experiment.init_weights(self.config.seed)
        } else {
            Ok(())
        }
    }

    /// Refuse to clobber an earlier run unless forced or confirmed.
    pub fn check_previous_logs(&self) -> Result<()> {
        if self.config.force {
            return Ok(());
        }
        let path = if self.config.is_train() {
            run_log_path(&self.cache.log_dir, &self.cache.experiment_id)
        } else {
            test_score_path(&self.cache.log_dir, &self.cache.experiment_id)
        };
        if !path.exists() || !self.placement.is_primary() {
            return Ok(());
        }

        let question = format!("*** {} *** \n Exists. OVERRIDE", path.display());
        if self.confirm.confirm(&question)? {
            Ok(())
        } else {
            Err(TrainerError::LogExists(path).into())
        }
    }

    // ─── Checkpoints ──────────────────────────────────────────────────────────

    /// Save every model and optimizer state as `<log_dir>/<file_name>`.
    pub fn save_checkpoint(&self, file_name: &str) -> Result<PathBuf> {
        let mut checkpoint = Checkpoint::default();
        for name in self.experiment.model_names() {
            let state = self.experiment.model_state(&name)?;
            checkpoint.models.insert(name, state);
        }
        for name in self.experiment.optimizer_names() {
            let state = self.experiment.optimizer_state(&name)?;
            checkpoint.optimizers.insert(name, state);
        }

        let path = self.cache.log_dir.join(file_name);
        checkpoint.save(&path)?;
        Ok(path)
    }

    pub fn load_checkpoint(&mut self, path: &Path) -> Result<()> {
        match Checkpoint::load(path)? {
            LoadedCheckpoint::Tagged(checkpoint) => {
                let models     = self.experiment.model_names();
                let optimizers = self.experiment.optimizer_names();

                for (name, state) in checkpoint.models {
                    if !models.contains(&name) {
                        return Err(TrainerError::UnknownState { kind: "model", name }.into());
                    }
                    self.experiment.load_model_state(&name, state)?;
                }
                for (name, state) in checkpoint.optimizers {
                    if !optimizers.contains(&name) {
                        return Err(TrainerError::UnknownState { kind: "optimizer", name }.into());
                    }
                    self.experiment.load_optimizer_state(&name, state)?;
                }
            }
            LoadedCheckpoint::Raw(state) => {
                let first = self
                    .experiment
                    .model_names()
                    .into_iter()
                    .next()
                    .ok_or(TrainerError::NoModels)?;
                self.experiment.load_model_state(&first, state)?;
            }
        }
        tracing::debug!("Loaded checkpoint '{}'", path.display());
        Ok(())
    }

    /// Reload the best checkpoint of the current fold.
    pub fn load_best_model(&mut self) -> Result<()> {
        let path = self.cache.checkpoint_path();
        self.load_checkpoint(&path)
    }

    /// Checkpoint when `metrics` beats (or ties) the best monitor score.
    pub fn save_if_better(&mut self, epoch: usize, metrics: &E::Metrics) -> Result<bool> {
        let score = metrics
            .metric(&self.cache.monitor_metric)
            .ok_or_else(|| TrainerError::UnknownMetric(self.cache.monitor_metric.clone()))?;

        if self.cache.metric_direction.improves(score, self.cache.best_score) {
            let file_name = self.cache.checkpoint.clone();
            self.save_checkpoint(&file_name)?;
            self.cache.best_score = score;
            self.cache.best_epoch = epoch;
            if self.config.verbose {
                tracing::info!("##### BEST! Model *** Saved *** : {score}");
            }
            Ok(true)
        } else {
            if self.config.verbose {
                tracing::info!(
                    "##### Not best: {score}, {} in ep: {}",
                    self.cache.best_score,
                    self.cache.best_epoch
                );
            }
            Ok(false)
        }
    }

    // ─── Training ─────────────────────────────────────────────────────────────

    /// One optimisation step on `batch`. The returned iteration no
    /// longer carries its loss.
    pub fn training_iteration(&mut self, batch: E::Batch) -> Result<IterationOf<E>> {
        let mut it = self.experiment.iteration(batch, Mode::Train)?;
        let loss = it.loss.take().ok_or(TrainerError::MissingLoss)?;
        self.experiment.step(loss)?;
        Ok(it)
    }

    pub fn train(
        &mut self,
        dataset:     Arc<E::Dataset>,
        val_dataset: Arc<E::Dataset>,
    ) -> Result<TrainOutcome> {
        let epochs  = self.config.epochs;
        let verbose = self.config.verbose;
        let batches = num_batches(Dataset::<E::Item>::len(&*dataset), self.config.batch_size);
        let loader  = train_loader::<E::Item, E::Batch, _, _>(
            self.experiment.batcher(),
            dataset,
            self.config.batch_size,
            self.config.seed,
            self.config.num_workers,
        );
        let mut outcome = TrainOutcome {
            epochs_run:    0,
            best_epoch:    self.cache.best_epoch,
            best_score:    self.cache.best_score,
            stopped_early: false,
        };

        for epoch in 1..=epochs {
            let mut running_metrics = self.experiment.new_metrics();
            let mut running_loss    = self.experiment.new_averages();
            let mut ep_metrics      = self.experiment.new_metrics();
            let mut ep_loss         = self.experiment.new_averages();

            for (i, batch) in loader.iter().enumerate() {
                let i = i + 1;
                let it = self.training_iteration(batch)?;

                ep_loss.accumulate(&it.averages);
                ep_metrics.accumulate(&it.metrics);
                running_loss.accumulate(&it.averages);
                running_metrics.accumulate(&it.metrics);

                if verbose && i % log_interval(i) == 0 {
                    tracing::info!(
                        "Ep:{epoch}/{epochs},Itr:{i}/{batches},{:?},{:?}",
                        running_loss.get(),
                        running_metrics.get()
                    );
                    self.cache.training_log.push(log_row(&running_loss, &running_metrics));
                    running_metrics.reset();
                    running_loss.reset();
                }

                self.experiment.on_iteration_end(i, epoch, &it);
            }

            self.cache.training_log.push(log_row(&ep_loss, &ep_metrics));
            let (val_loss, val_metrics) =
                self.evaluation(SplitKey::Validation, false, std::slice::from_ref(&val_dataset))?;
            self.save_if_better(epoch, &val_metrics)?;
            self.cache.validation_log.push(log_row(&val_loss, &val_metrics));

            let report = EpochReport {
                epoch,
                train_loss:    ep_loss,
                train_metrics: ep_metrics,
                val_loss,
                val_metrics,
            };
            self.experiment.on_epoch_end(&report, &self.cache)?;

            outcome.epochs_run = epoch;
            if self.experiment.early_stopping(&report, &self.cache, &self.config) {
                outcome.stopped_early = epoch < epochs;
                if verbose && outcome.stopped_early {
                    tracing::info!(
                        "Early stopping at epoch {epoch}: no improvement since epoch {}",
                        self.cache.best_epoch
                    );
                }
                break;
            }
        }

        outcome.best_epoch = self.cache.best_epoch;
        outcome.best_score = self.cache.best_score;
        Ok(outcome)
    }

    // ─── Evaluation ───────────────────────────────────────────────────────────

    /// Run every dataset in order without gradient tracking. Returns
    /// the averages and metrics accumulated over all of them.
    ///
    /// When predictions are saved the batches must follow dataset
    /// order, so those loaders run without worker threads.
    pub fn evaluation(
        &mut self,
        split_key: SplitKey,
        save_pred: bool,
        datasets:  &[Arc<E::Dataset>],
    ) -> Result<(Averages, E::Metrics)> {
        let verbose = self.config.verbose;
        let split   = split_key.as_str();
        if verbose {
            tracing::info!("--- Running {split} ---");
        }

        let mut eval_loss    = self.experiment.new_averages();
        let mut eval_metrics = self.experiment.new_metrics();

        for dataset in datasets {
            let workers = if save_pred { 0 } else { self.config.num_workers };
            let batches = num_batches(Dataset::<E::Item>::len(&**dataset), self.config.batch_size);
            let loader  = eval_loader::<E::Item, E::Batch, _, _>(
                self.experiment.batcher(),
                Arc::clone(dataset),
                self.config.batch_size,
                workers,
            );
            let mut metrics = self.experiment.new_metrics();
            let mut loss    = self.experiment.new_averages();
            let mut its     = Vec::new();

            for (i, batch) in loader.iter().enumerate() {
                let it = self.experiment.iteration(batch, Mode::Eval)?;

                metrics.accumulate(&it.metrics);
                loss.accumulate(&it.averages);
                if verbose && datasets.len() <= 1 && i % log_interval(i) == 0 {
                    tracing::info!(
                        "Itr:{i}/{batches},{:?},{:?}",
                        it.averages.get(),
                        it.metrics.get()
                    );
                }
                if save_pred {
                    its.push(it);
                }
            }

            eval_metrics.accumulate(&metrics);
            eval_loss.accumulate(&loss);
            if verbose && datasets.len() > 1 {
                tracing::info!("{split}, {:?}, {:?}", loss.get(), metrics.get());
            }
            if save_pred {
                self.experiment.save_predictions(dataset, its, &self.cache)?;
            }
        }

        if verbose {
            tracing::info!(
                "{} {split} metrics: {:?}",
                self.cache.experiment_id,
                eval_metrics.get()
            );
        }
        Ok((eval_loss, eval_metrics))
    }
}
