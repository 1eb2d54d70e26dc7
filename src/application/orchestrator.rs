// ============================================================
// Layer 2 — Orchestrator
// ============================================================
// Runs an Experiment over every dataset spec, fold by fold:
//
//   Step 1: Ensure fold files exist    (Layer 4 - data)
//   Step 2: Per-dataset RunCache       (Layer 3 - domain)
//   Step 3: Per fold: logs check, init_nn, train, save run log
//   Step 4: Load the best checkpoint and evaluate the test split
//   Step 5: Test scores per fold, then a "Global" row per dataset
//
// With more than one usable device the whole per-dataset run is
// executed once per worker (see distributed.rs). Ranks other
// than 0 write into a rank_<r> subdirectory.
//
// `run_pooled` trains one model on the union of every dataset's
// fold files instead.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::config::{ConfigOverrides, RunConfig};
use crate::application::distributed::spawn_workers;
use crate::data::dataset::{build_dataset, build_pooled, build_test_datasets, Mode};
use crate::data::splitter::{needs_splits, FoldSplitter};
use crate::domain::cache::{RunCache, ScoreRow};
use crate::domain::dataspec::DataSpec;
use crate::domain::metrics::Accumulate;
use crate::domain::placement::{DeviceInventory, DevicePlacement};
use crate::domain::split::{list_fold_files, Split, SplitKey};
use crate::domain::traits::Confirm;
use crate::infra::metrics::{save_global_scores, save_test_scores};
use crate::infra::prompt::StdinConfirm;
use crate::infra::run_log::{ModelSummary, RunLog};
use crate::ml::experiment::Experiment;
use crate::ml::trainer::{log_row, Trainer};

pub const GLOBAL_ROW_LABEL: &str = "Global";
pub const POOLED_EXPERIMENT_ID: &str = "pooled";

/// What one dataset run left behind.
#[derive(Debug, Clone)]
pub struct DatasetReport {
    pub name:    String,
    pub log_dir: PathBuf,
    pub header:  String,
    /// One row per fold, then the "Global" row.
    pub scores:  Vec<ScoreRow>,
}

impl DatasetReport {
    fn from_cache(name: &str, cache: &RunCache) -> Self {
        Self {
            name:    name.to_string(),
            log_dir: cache.log_dir.clone(),
            header:  cache.log_header.clone(),
            scores:  cache.global_test_score.clone(),
        }
    }

    pub fn global(&self) -> Option<&ScoreRow> {
        self.scores.iter().find(|r| r.label == GLOBAL_ROW_LABEL)
    }
}

// ─── Orchestrator ─────────────────────────────────────────────────────────────
pub struct Orchestrator {
    config:    Arc<RunConfig>,
    dataspecs: Vec<DataSpec>,
    inventory: DeviceInventory,
    confirm:   Arc<dyn Confirm>,
}

impl Orchestrator {
    /// Merge `overrides` over `base`, resolve devices and qualify
    /// every dataspec directory against `dataset_dir`.
    pub fn new(
        dataspecs: Vec<DataSpec>,
        base:      RunConfig,
        overrides: ConfigOverrides,
        inventory: DeviceInventory,
    ) -> Result<Self> {
        let config = base.merged(overrides)?.resolve(inventory)?;
        let dataspecs = dataspecs
            .into_iter()
            .map(|spec| spec.qualified(&config.dataset_dir))
            .collect();

        Ok(Self {
            config: Arc::new(config),
            dataspecs,
            inventory,
            confirm: Arc::new(StdinConfirm),
        })
    }

    /// Replace the interactive overwrite prompt.
    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn dataspecs(&self) -> &[DataSpec] {
        &self.dataspecs
    }

    /// Placement for a run that uses one worker.
    fn single_placement(&self) -> DevicePlacement {
        match self.config.gpus.first() {
            Some(&device) if self.inventory.accelerator_available => {
                DevicePlacement::Accelerator(device)
            }
            _ => DevicePlacement::Cpu,
        }
    }

    // ─── Per-Dataset Runs ─────────────────────────────────────────────────────

    /// k-fold run for each dataspec in turn. `factory` builds a fresh
    /// experiment per dataset (and per worker in distributed mode).
    pub fn run<E, F>(&self, factory: F, splitter: &dyn FoldSplitter) -> Result<Vec<DatasetReport>>
    where
        E: Experiment,
        F: Fn(&RunConfig) -> E + Sync,
    {
        let mut reports = Vec::with_capacity(self.dataspecs.len());
        for spec in &self.dataspecs {
            // ── Step 1: Fold files, created once before any worker starts ───
            let spec = self.prepare_splits(spec, splitter)?;

            let report = if self.config.use_ddp {
                spawn_workers(&self.config, |placement| {
                    self.run_dataset(&spec, &factory, placement)
                })?
            } else {
                self.run_dataset(&spec, &factory, self.single_placement())?
            };
            reports.push(report);
        }
        Ok(reports)
    }

    /// Point the spec at its fold files, creating them under
    /// `<log_dir>/<name>/splits` when the split dir is missing or empty.
    fn prepare_splits(&self, spec: &DataSpec, splitter: &dyn FoldSplitter) -> Result<DataSpec> {
        let mut spec = spec.clone();
        if needs_splits(spec.split_dir.as_deref()) {
            let split_dir = default_split_dir(&self.config.log_dir, &spec.name);
            tracing::info!("Creating splits for '{}' in '{}'", spec.name, split_dir.display());
            splitter.create_splits(&spec, &self.config, &split_dir)?;
            spec.split_dir = Some(split_dir);
        }
        Ok(spec)
    }

    fn new_trainer<E, F>(
        &self,
        factory:   &F,
        log_dir:   PathBuf,
        spec:      Option<&DataSpec>,
        placement: DevicePlacement,
    ) -> Result<Trainer<E>>
    where
        E: Experiment,
        F: Fn(&RunConfig) -> E,
    {
        let mut trainer = Trainer::new(
            factory(&self.config),
            self.config.clone(),
            placement,
            self.confirm.clone(),
        );
        trainer.cache = RunCache::for_dataset(log_dir);
        if let Some(header) = spec.and_then(|s| s.get("log_header")) {
            trainer.cache.log_header = header.to_string();
        }
        trainer.experiment.reset_dataset_cache(&mut trainer.cache);

        fs::create_dir_all(&trainer.cache.log_dir).with_context(|| {
            format!("Cannot create log directory '{}'", trainer.cache.log_dir.display())
        })?;
        Ok(trainer)
    }

    /// Everything before the test evaluation of one fold.
    fn prepare_fold<E: Experiment>(
        &self,
        trainer:       &mut Trainer<E>,
        experiment_id: &str,
    ) -> Result<()> {
        trainer.cache.start_fold(experiment_id);
        trainer.check_previous_logs()?;
        trainer.init_nn()?;
        trainer.cache.clear_fold_logs();
        trainer.experiment.reset_fold_cache(&mut trainer.cache);
        Ok(())
    }

    fn save_run_log<E: Experiment>(&self, trainer: &Trainer<E>, dataspecs: &[DataSpec]) -> Result<()> {
        let counts = trainer.experiment.parameter_counts();
        let models = trainer
            .experiment
            .model_names()
            .into_iter()
            .map(|name| {
                let parameters = counts
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, c)| *c)
                    .unwrap_or(0);
                ModelSummary { name, parameters }
            })
            .collect();

        RunLog {
            config:     &self.config,
            cache:      &trainer.cache,
            dataspecs,
            models,
            optimizers: trainer.experiment.optimizer_names(),
        }
        .save()?;
        Ok(())
    }

    /// Skip reloading only when testing a pretrained model.
    fn reload_best<E: Experiment>(&self, trainer: &mut Trainer<E>) -> Result<()> {
        if self.config.is_train() || self.config.pretrained_path.is_none() {
            trainer.load_best_model()?;
        }
        Ok(())
    }

    fn run_dataset<E, F>(
        &self,
        spec:      &DataSpec,
        factory:   &F,
        placement: DevicePlacement,
    ) -> Result<DatasetReport>
    where
        E: Experiment,
        F: Fn(&RunConfig) -> E,
    {
        let cfg = &self.config;

        // ── Step 2: RunCache rooted at <log_dir>/<name>[/rank_<r>] ──────────
        let mut log_dir = cfg.log_dir.join(&spec.name);
        let rank = placement.world_rank();
        if rank > 0 {
            log_dir = log_dir.join(format!("rank_{rank}"));
        }
        let mut trainer = self.new_trainer(factory, log_dir, Some(spec), placement)?;

        let split_dir = spec
            .split_dir
            .as_deref()
            .with_context(|| format!("dataset '{}' has no split directory", spec.name))?;
        let folds = list_fold_files(split_dir)?;
        if folds.is_empty() {
            tracing::warn!("No fold files in '{}'", split_dir.display());
        }

        let mut global_metrics = trainer.experiment.new_metrics();
        let mut global_loss    = trainer.experiment.new_averages();

        for fold in &folds {
            // ── Step 3: Fold setup and training ─────────────────────────────
            let split = Split::load(&fold.path)?;
            self.prepare_fold(&mut trainer, &fold.experiment_id)?;

            if cfg.is_train() {
                let train = build_dataset::<E::Item, E::Dataset>(
                    spec, &split, SplitKey::Train, Mode::Train, cfg.load_limit, cfg.verbose,
                )?;
                let validation = build_dataset::<E::Item, E::Dataset>(
                    spec, &split, SplitKey::Validation, Mode::Eval, cfg.load_limit, cfg.verbose,
                )?;
                let outcome = trainer.train(Arc::new(train), Arc::new(validation))?;
                tracing::info!(
                    "{}: {} epoch(s), best {} at epoch {}",
                    fold.experiment_id,
                    outcome.epochs_run,
                    outcome.best_score,
                    outcome.best_epoch
                );
                self.save_run_log(&trainer, std::slice::from_ref(spec))?;
            }

            // ── Step 4: Best checkpoint on the test split ───────────────────
            self.reload_best(&mut trainer)?;
            let test: Vec<_> = build_test_datasets::<E::Item, E::Dataset>(
                spec, &split, cfg.load_sparse, cfg.load_limit, cfg.verbose,
            )?
            .into_iter()
            .map(Arc::new)
            .collect();
            let (loss, metrics) = trainer.evaluation(SplitKey::Test, true, &test)?;

            // ── Step 5: Per-fold scores ─────────────────────────────────────
            global_loss.accumulate(&loss);
            global_metrics.accumulate(&metrics);

            let row = log_row(&loss, &metrics);
            trainer.cache.test_score.push(row.clone());
            trainer.cache.global_test_score.push(ScoreRow {
                label:  fold.file_name(),
                values: row,
            });
            save_test_scores(&trainer.cache)?;
        }

        trainer.cache.global_test_score.push(ScoreRow {
            label:  GLOBAL_ROW_LABEL.to_string(),
            values: log_row(&global_loss, &global_metrics),
        });
        let path = save_global_scores(&trainer.cache)?;
        tracing::info!("'{}' global scores written to '{}'", spec.name, path.display());

        Ok(DatasetReport::from_cache(&spec.name, &trainer.cache))
    }

    // ─── Pooled Run ───────────────────────────────────────────────────────────

    /// One model trained on every dataspec's fold files at once.
    /// Always a single worker.
    pub fn run_pooled<E, F>(&self, factory: F, splitter: &dyn FoldSplitter) -> Result<DatasetReport>
    where
        E: Experiment,
        F: Fn(&RunConfig) -> E,
    {
        let cfg = &self.config;
        if cfg.use_ddp {
            tracing::warn!("Pooled runs use a single worker; distributed mode is ignored.");
        }

        let specs = self
            .dataspecs
            .iter()
            .map(|spec| self.prepare_splits(spec, splitter))
            .collect::<Result<Vec<_>>>()?;

        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        let name    = format!("pooled_{}", names.join("_"));
        let log_dir = cfg.log_dir.join(&name);
        let mut trainer = self.new_trainer(&factory, log_dir, None, self.single_placement())?;

        self.prepare_fold(&mut trainer, POOLED_EXPERIMENT_ID)?;

        if cfg.is_train() {
            let train = first_pooled::<E>(build_pooled::<E::Item, E::Dataset>(
                &specs, SplitKey::Train, Mode::Train, false, cfg.load_limit, cfg.verbose,
            )?)?;
            let validation = first_pooled::<E>(build_pooled::<E::Item, E::Dataset>(
                &specs, SplitKey::Validation, Mode::Eval, false, cfg.load_limit, cfg.verbose,
            )?)?;
            trainer.train(Arc::new(train), Arc::new(validation))?;
            self.save_run_log(&trainer, &specs)?;
        }

        self.reload_best(&mut trainer)?;
        let test: Vec<_> = build_pooled::<E::Item, E::Dataset>(
            &specs, SplitKey::Test, Mode::Eval, cfg.load_sparse, cfg.load_limit, cfg.verbose,
        )?
        .into_iter()
        .map(Arc::new)
        .collect();
        let (loss, metrics) = trainer.evaluation(SplitKey::Test, true, &test)?;

        let row = log_row(&loss, &metrics);
        trainer.cache.test_score.push(row.clone());
        trainer.cache.global_test_score.push(ScoreRow {
            label:  GLOBAL_ROW_LABEL.to_string(),
            values: row,
        });
        let path = save_test_scores(&trainer.cache)?;
        tracing::info!("Pooled scores written to '{}'", path.display());

        Ok(DatasetReport::from_cache(&name, &trainer.cache))
    }
}

/// `<log_dir>/<name>/splits`
pub fn default_split_dir(log_dir: &Path, name: &str) -> PathBuf {
    log_dir.join(name).join("splits")
}

fn first_pooled<E: Experiment>(datasets: Vec<E::Dataset>) -> Result<E::Dataset> {
    datasets
        .into_iter()
        .next()
        .context("pooled loading produced no dataset")
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::Phase;
    use crate::data::splitter::KFoldSplitter;
    use crate::domain::error::TrainerError;
    use crate::infra::metrics::GLOBAL_SCORE_FILE;
    use crate::infra::prompt::AutoConfirm;
    use crate::ml::testing::Scripted;

    fn write_files(dir: &Path, n: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..n {
            fs::write(dir.join(format!("f{i}.csv")), "").unwrap();
        }
    }

    fn base(root: &Path) -> RunConfig {
        RunConfig {
            dataset_dir: root.to_path_buf(),
            log_dir:     root.join("logs"),
            seed:        3,
            verbose:     false,
            batch_size:  2,
            epochs:      2,
            num_folds:   Some(3),
            num_workers: 0,
            ..RunConfig::default()
        }
    }

    fn train() -> ConfigOverrides {
        ConfigOverrides { phase: Some(Phase::Train), ..ConfigOverrides::default() }
    }

    fn orchestrator(specs: Vec<DataSpec>, cfg: RunConfig, inventory: DeviceInventory) -> Orchestrator {
        Orchestrator::new(specs, cfg, train(), inventory)
            .unwrap()
            .with_confirm(Arc::new(AutoConfirm(true)))
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_dataspec_dirs_qualified_against_dataset_dir() {
        let spec = DataSpec::new("toy").with_entry("data_dir", "images");
        let o = orchestrator(vec![spec], base(Path::new("/data")), DeviceInventory::cpu_only());
        assert_eq!(o.dataspecs()[0].dir("data_dir"), Some(PathBuf::from("/data/images")));
    }

    #[test]
    fn test_missing_phase_is_rejected() {
        let err = Orchestrator::new(
            vec![],
            RunConfig::default(),
            ConfigOverrides::default(),
            DeviceInventory::cpu_only(),
        )
        .err()
        .unwrap();
        assert!(matches!(err.downcast_ref::<TrainerError>(), Some(TrainerError::MissingPhase)));
    }

    #[test]
    fn test_kfold_run_writes_fold_and_global_scores() {
        let root = tempfile::tempdir().unwrap();
        write_files(&root.path().join("toy"), 6);
        let spec = DataSpec::new("toy").with_entry("data_dir", "toy");
        let o = orchestrator(vec![spec], base(root.path()), DeviceInventory::cpu_only());

        let reports = o.run(|_| Scripted::default(), &KFoldSplitter).unwrap();
        let dir = root.path().join("logs/toy");

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].log_dir, dir);
        let labels: Vec<&str> = reports[0].scores.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["toy_0.json", "toy_1.json", "toy_2.json", "Global"]);
        assert!(reports[0].global().is_some());

        for i in 0..3 {
            assert!(dir.join(format!("splits/toy_{i}.json")).exists());
            assert!(dir.join(format!("toy_{i}_log.json")).exists());
            assert!(dir.join(format!("toy_{i}_test_score.csv")).exists());
            assert!(dir.join(format!("toy_{i}.pt")).exists());
        }
        let global = lines(&dir.join(GLOBAL_SCORE_FILE));
        assert_eq!(global.len(), 5);
        assert!(global[4].starts_with("Global,"));
    }

    #[test]
    fn test_existing_split_dir_is_used_as_is() {
        let root = tempfile::tempdir().unwrap();
        let splits = root.path().join("my_splits");
        fs::create_dir_all(&splits).unwrap();
        Split {
            train:      vec!["a".into(), "b".into()],
            validation: vec!["c".into()],
            test:       vec!["d".into()],
        }
        .save(&splits.join("custom.json"))
        .unwrap();

        let spec = DataSpec::new("toy").with_split_dir("my_splits");
        let o = orchestrator(vec![spec], base(root.path()), DeviceInventory::cpu_only());
        o.run(|_| Scripted::default(), &KFoldSplitter).unwrap();

        let dir = root.path().join("logs/toy");
        assert!(dir.join("custom_test_score.csv").exists());
        assert!(!dir.join("splits").exists());
    }

    #[test]
    fn test_refused_overwrite_stops_the_run() {
        let root = tempfile::tempdir().unwrap();
        write_files(&root.path().join("toy"), 6);
        let spec = DataSpec::new("toy").with_entry("data_dir", "toy");

        let o = orchestrator(vec![spec.clone()], base(root.path()), DeviceInventory::cpu_only());
        o.run(|_| Scripted::default(), &KFoldSplitter).unwrap();

        let refusing = orchestrator(vec![spec], base(root.path()), DeviceInventory::cpu_only())
            .with_confirm(Arc::new(AutoConfirm(false)));
        let err = refusing.run(|_| Scripted::default(), &KFoldSplitter).unwrap_err();
        assert!(matches!(err.downcast_ref::<TrainerError>(), Some(TrainerError::LogExists(_))));
    }

    #[test]
    fn test_pooled_run_uses_one_log_dir() {
        let root = tempfile::tempdir().unwrap();
        write_files(&root.path().join("a"), 4);
        write_files(&root.path().join("b"), 4);
        let specs = vec![
            DataSpec::new("a").with_entry("data_dir", "a"),
            DataSpec::new("b").with_entry("data_dir", "b"),
        ];
        let mut cfg = base(root.path());
        cfg.num_folds = Some(2);
        let o = orchestrator(specs, cfg, DeviceInventory::cpu_only());

        let report = o.run_pooled(|_| Scripted::default(), &KFoldSplitter).unwrap();
        let dir = root.path().join("logs/pooled_a_b");

        assert_eq!(report.name, "pooled_a_b");
        assert_eq!(report.scores.len(), 1);
        assert!(dir.join("pooled_log.json").exists());
        assert_eq!(lines(&dir.join("pooled_test_score.csv")).len(), 2);
        assert!(root.path().join("logs/a/splits/a_0.json").exists());
    }

    #[test]
    fn test_distributed_run_writes_rank_dirs() {
        let root = tempfile::tempdir().unwrap();
        write_files(&root.path().join("toy"), 6);
        let spec = DataSpec::new("toy").with_entry("data_dir", "toy");
        let mut cfg = base(root.path());
        cfg.gpus = vec![0, 1];
        let o = orchestrator(vec![spec], cfg, DeviceInventory::accelerators(2));
        assert!(o.config().use_ddp);

        let reports = o.run(|_| Scripted::default(), &KFoldSplitter).unwrap();
        let dir = root.path().join("logs/toy");

        assert_eq!(reports[0].log_dir, dir);
        assert!(dir.join(GLOBAL_SCORE_FILE).exists());
        assert!(dir.join("rank_1").join(GLOBAL_SCORE_FILE).exists());
        assert!(dir.join("rank_1/toy_0_log.json").exists());
    }

    #[test]
    fn test_single_placement() {
        let root = tempfile::tempdir().unwrap();
        let cpu = orchestrator(vec![], base(root.path()), DeviceInventory::cpu_only());
        assert_eq!(cpu.single_placement(), DevicePlacement::Cpu);

        let one = orchestrator(vec![], base(root.path()), DeviceInventory::accelerators(1));
        assert!(!one.config().use_ddp);
        assert_eq!(one.single_placement(), DevicePlacement::Accelerator(0));
    }
}
