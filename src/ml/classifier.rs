// ============================================================
// Layer 5 — Bundled Classifier Experiment
// ============================================================
// A complete Experiment over CSV feature rows: a small MLP
// binary classifier trained with Adam and cross-entropy,
// scored with Prf1a.
//
// Key Burn insight:
//   - Training runs on TrainBackend (Autodiff<NdArray>)
//   - model.valid() returns the model on EvalBackend (NdArray),
//     so evaluation never records gradients
//   - Batches are built on EvalBackend and lifted with
//     Tensor::from_inner for training
//   - argmax(1) returns [batch, 1] so we flatten to [batch]
//
// Settings read from the run config's pass-through keys:
//   num_features (required), hidden_size (default 32)

use anyhow::{anyhow, bail, Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, Autodiff, NdArray},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::activation::softmax,
};
use std::fmt::Write as _;
use std::{fs, path::Path};

use crate::application::config::RunConfig;
use crate::data::batcher::{FeatureBatch, FeatureBatcher};
use crate::data::dataset::{CsvDataset, CsvRow, FileDataset, Mode};
use crate::domain::cache::RunCache;
use crate::domain::error::TrainerError;
use crate::domain::metrics::{Averages, Prf1a};
use crate::domain::placement::{DeviceInventory, DevicePlacement};
use crate::ml::experiment::{Experiment, Iteration, IterationOf};
use crate::ml::model::{Classifier, ClassifierConfig, ClassifierRecord};

pub type TrainBackend = Autodiff<NdArray>;
pub type EvalBackend  = NdArray;
pub type ClassifierOptimizer = OptimizerAdaptor<Adam, Classifier<TrainBackend>, TrainBackend>;
type OptimizerRecord = <ClassifierOptimizer as Optimizer<Classifier<TrainBackend>, TrainBackend>>::Record;

pub const MODEL_NAME: &str     = "model";
pub const OPTIMIZER_NAME: &str = "adam";

/// Devices the bundled backend can use. NdArray only runs on the CPU.
pub fn device_inventory() -> DeviceInventory {
    DeviceInventory::cpu_only()
}

/// Confusion counts of 0/1 predictions against 0/1 labels.
pub fn confusion<B: Backend>(predictions: Tensor<B, 1, Int>, labels: Tensor<B, 1, Int>) -> Prf1a {
    let total = predictions.dims()[0] as u64;
    let count = |t: Tensor<B, 1, Int>| t.sum().into_scalar().elem::<i64>() as u64;

    let pred_pos  = predictions.equal_elem(0).bool_not().int();
    let truth_pos = labels.equal_elem(0).bool_not().int();

    let tp  = count(pred_pos.clone() * truth_pos.clone());
    let fp  = count(pred_pos) - tp;
    let fn_ = count(truth_pos) - tp;
    Prf1a::from_counts(tp, fp, total - tp - fp - fn_, fn_)
}

pub struct ClassifierExperiment {
    device:        NdArrayDevice,
    batcher:       FeatureBatcher<EvalBackend>,
    model_config:  Option<ClassifierConfig>,
    model:         Option<Classifier<TrainBackend>>,
    /// Cached `model.valid()`, dropped whenever the weights change.
    eval_model:    Option<Classifier<EvalBackend>>,
    optimizer:     Option<ClassifierOptimizer>,
    learning_rate: f64,
    num_features:  usize,
    sparse:        bool,
}

impl Default for ClassifierExperiment {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassifierExperiment {
    pub fn new() -> Self {
        let device = NdArrayDevice::default();
        Self {
            batcher:       FeatureBatcher::new(device),
            device,
            model_config:  None,
            model:         None,
            eval_model:    None,
            optimizer:     None,
            learning_rate: 0.0,
            num_features:  0,
            sparse:        false,
        }
    }

    pub fn model(&self) -> Option<&Classifier<TrainBackend>> {
        self.model.as_ref()
    }

    fn model_ref(&self) -> Result<&Classifier<TrainBackend>> {
        self.model.as_ref().context("Models are not built; call init_nn first")
    }

    /// Feature width must match the model input before any forward pass.
    fn check_width(&self, batch: &FeatureBatch<EvalBackend>) -> Result<()> {
        let [_, width] = batch.features.dims();
        if width == self.num_features {
            Ok(())
        } else {
            bail!(
                "Batch rows have {width} feature(s), the model expects num_features={}",
                self.num_features
            )
        }
    }

    fn check_name(kind: &'static str, expected: &str, name: &str) -> Result<()> {
        if name == expected {
            Ok(())
        } else {
            Err(TrainerError::UnknownState { kind, name: name.to_string() }.into())
        }
    }

    fn train_iteration(&self, batch: FeatureBatch<EvalBackend>) -> Result<IterationOf<Self>> {
        let model    = self.model_ref()?;
        let n        = batch.len();
        let features = Tensor::<TrainBackend, 2>::from_inner(batch.features);
        let labels   = Tensor::<TrainBackend, 1, Int>::from_inner(batch.labels);

        let logits = model.forward(features);
        let loss   = CrossEntropyLossConfig::new()
            .init(&self.device)
            .forward(logits.clone(), labels.clone());
        let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();

        let predictions = logits.argmax(1).flatten::<1>(0, 1);
        let metrics     = confusion(predictions, labels);

        let mut averages = Averages::new(1);
        averages.add(loss_value, n as u64, 0);
        Ok(Iteration::new(metrics, averages).with_loss(loss))
    }

    fn eval_iteration(&mut self, batch: FeatureBatch<EvalBackend>) -> Result<IterationOf<Self>> {
        if self.eval_model.is_none() {
            self.eval_model = Some(self.model_ref()?.valid());
        }
        let model = self.eval_model.as_ref().context("Evaluation model missing")?;
        let n     = batch.len();

        let logits = model.forward(batch.features);
        let loss_value: f64 = CrossEntropyLossConfig::new()
            .init(&self.device)
            .forward(logits.clone(), batch.labels.clone())
            .into_scalar()
            .elem::<f64>();

        let predictions = logits.clone().argmax(1).flatten::<1>(0, 1);
        let metrics     = confusion(predictions.clone(), batch.labels);

        let probabilities = softmax(logits, 1)
            .slice([0..n, 1..2])
            .flatten::<1>(0, 1)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read probabilities: {e:?}"))?;
        let predicted = predictions
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| anyhow!("Cannot read predictions: {e:?}"))?;

        let mut averages = Averages::new(1);
        averages.add(loss_value, n as u64, 0);
        Ok(Iteration::new(metrics, averages)
            .with_output(probabilities)
            .with_predictions(predicted))
    }
}

impl Experiment for ClassifierExperiment {
    type Item    = CsvRow;
    type Dataset = CsvDataset;
    type Batch   = FeatureBatch<EvalBackend>;
    type Batcher = FeatureBatcher<EvalBackend>;
    type Loss    = Tensor<TrainBackend, 1>;
    /// Positive-class probability per row.
    type Output  = Vec<f32>;
    type Metrics = Prf1a;

    fn build_models(&mut self, config: &RunConfig) -> Result<()> {
        let num_features = config.extra_as::<usize>("num_features").context(
            "The classifier needs 'num_features' (e.g. --set num_features=8)",
        )?;
        let hidden_size = config.extra_as::<usize>("hidden_size").unwrap_or(32);

        let model_config = ClassifierConfig::new(num_features).with_hidden_size(hidden_size);
        self.model        = Some(model_config.init(&self.device));
        self.model_config = Some(model_config);
        self.eval_model   = None;
        self.num_features = num_features;
        self.sparse       = config.load_sparse;
        Ok(())
    }

    fn model_names(&self) -> Vec<String> {
        if self.model.is_some() { vec![MODEL_NAME.to_string()] } else { Vec::new() }
    }

    fn optimizer_names(&self) -> Vec<String> {
        if self.optimizer.is_some() { vec![OPTIMIZER_NAME.to_string()] } else { Vec::new() }
    }

    fn parameter_counts(&self) -> Vec<(String, usize)> {
        self.model
            .iter()
            .map(|m| (MODEL_NAME.to_string(), m.num_params()))
            .collect()
    }

    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    fn init_optimizers(&mut self, config: &RunConfig) -> Result<()> {
        self.learning_rate = config.learning_rate;
        self.optimizer = Some(
            AdamConfig::new()
                .with_epsilon(1e-8)
                .init::<TrainBackend, Classifier<TrainBackend>>(),
        );
        Ok(())
    }

    fn init_weights(&mut self, seed: u64) -> Result<()> {
        let model_config = self
            .model_config
            .as_ref()
            .context("Models are not built; call build_models first")?;
        TrainBackend::seed(seed);
        self.model      = Some(model_config.init(&self.device));
        self.eval_model = None;
        Ok(())
    }

    fn place(&mut self, placement: &DevicePlacement) -> Result<()> {
        if *placement != DevicePlacement::Cpu {
            tracing::warn!("{placement} requested, but the ndarray backend runs on the CPU");
        }
        Ok(())
    }

    fn batcher(&self) -> FeatureBatcher<EvalBackend> {
        self.batcher.clone()
    }

    fn iteration(&mut self, batch: Self::Batch, mode: Mode) -> Result<IterationOf<Self>> {
        self.check_width(&batch)?;
        match mode {
            Mode::Train => self.train_iteration(batch),
            Mode::Eval  => self.eval_iteration(batch),
        }
    }

    fn step(&mut self, loss: Tensor<TrainBackend, 1>) -> Result<()> {
        let optimizer = self.optimizer.as_mut().context("Optimizer is not initialised")?;
        let model     = self.model.take().context("Models are not built")?;

        // Backward pass + Adam update
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        self.model      = Some(optimizer.step(self.learning_rate, model, grads));
        self.eval_model = None;
        Ok(())
    }

    fn model_state(&self, name: &str) -> Result<Vec<u8>> {
        Self::check_name("model", MODEL_NAME, name)?;
        BinBytesRecorder::<FullPrecisionSettings>::new()
            .record(self.model_ref()?.clone().into_record(), ())
            .map_err(|e| anyhow!("Cannot record model state: {e}"))
    }

    fn load_model_state(&mut self, name: &str, state: Vec<u8>) -> Result<()> {
        Self::check_name("model", MODEL_NAME, name)?;
        let record: ClassifierRecord<TrainBackend> = BinBytesRecorder::<FullPrecisionSettings>::new()
            .load(state, &self.device)
            .map_err(|e| anyhow!("Cannot load model state: {e}"))?;
        let model = self.model.take().context("Models are not built")?;
        self.model      = Some(model.load_record(record));
        self.eval_model = None;
        Ok(())
    }

    fn optimizer_state(&self, name: &str) -> Result<Vec<u8>> {
        Self::check_name("optimizer", OPTIMIZER_NAME, name)?;
        let optimizer = self.optimizer.as_ref().context("Optimizer is not initialised")?;
        BinBytesRecorder::<FullPrecisionSettings>::new()
            .record(optimizer.to_record(), ())
            .map_err(|e| anyhow!("Cannot record optimizer state: {e}"))
    }

    fn load_optimizer_state(&mut self, name: &str, state: Vec<u8>) -> Result<()> {
        Self::check_name("optimizer", OPTIMIZER_NAME, name)?;
        let record: OptimizerRecord = BinBytesRecorder::<FullPrecisionSettings>::new()
            .load(state, &self.device)
            .map_err(|e| anyhow!("Cannot load optimizer state: {e}"))?;
        let optimizer = self.optimizer.take().context("Optimizer is not initialised")?;
        self.optimizer = Some(optimizer.load_record(record));
        Ok(())
    }

    /// With sparse loading every dataset is one test file, written
    /// to `<log_dir>/<file stem>_predictions.csv`.
    fn save_predictions(
        &mut self,
        dataset: &CsvDataset,
        its:     Vec<IterationOf<Self>>,
        cache:   &RunCache,
    ) -> Result<()> {
        use burn::data::dataset::Dataset;

        let [file] = dataset.files() else {
            return Ok(());
        };
        if !self.sparse {
            return Ok(());
        }

        let stem = Path::new(file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.clone());
        let path = cache.log_dir.join(format!("{stem}_predictions.csv"));

        let mut out = String::from("index,label,prediction,probability\n");
        let mut index = 0;
        for it in &its {
            let predictions = it.predictions.as_deref().unwrap_or_default();
            let output      = it.output.as_deref().unwrap_or_default();
            for (p, prob) in predictions.iter().zip(output) {
                let label = dataset.get(index).map(|r| r.label).unwrap_or_default();
                writeln!(out, "{index},{label},{p},{prob}")?;
                index += 1;
            }
        }
        fs::create_dir_all(&cache.log_dir)?;
        fs::write(&path, out)
            .with_context(|| format!("Cannot write predictions '{}'", path.display()))?;
        tracing::debug!("Saved {index} prediction(s) to '{}'", path.display());
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::Phase;
    use burn::data::dataloader::batcher::Batcher;
    use serde_json::json;

    fn config() -> RunConfig {
        let mut cfg = RunConfig {
            phase: Some(Phase::Train),
            seed: 42,
            learning_rate: 0.05,
            ..RunConfig::default()
        };
        cfg.extra.insert("num_features".into(), json!(2));
        cfg.extra.insert("hidden_size".into(), json!(8));
        cfg
    }

    fn rows() -> Vec<CsvRow> {
        vec![
            CsvRow { features: vec![1.0, 1.0], label: 1 },
            CsvRow { features: vec![0.9, 1.1], label: 1 },
            CsvRow { features: vec![-1.0, -1.0], label: 0 },
            CsvRow { features: vec![-1.1, -0.9], label: 0 },
        ]
    }

    fn ready() -> ClassifierExperiment {
        let _guard = crate::ml::rng_guard();
        let cfg = config();
        let mut e = ClassifierExperiment::new();
        e.build_models(&cfg).unwrap();
        e.init_optimizers(&cfg).unwrap();
        e.init_weights(cfg.seed).unwrap();
        e
    }

    #[test]
    fn test_confusion_counts() {
        let device = Default::default();
        let pred  = Tensor::<EvalBackend, 1, Int>::from_ints([1, 1, 0, 0, 1], &device);
        let truth = Tensor::<EvalBackend, 1, Int>::from_ints([1, 0, 0, 1, 1], &device);
        assert_eq!(confusion(pred, truth), Prf1a::from_counts(2, 1, 1, 1));
    }

    #[test]
    fn test_missing_num_features_is_an_error() {
        let mut e = ClassifierExperiment::new();
        assert!(e.build_models(&RunConfig::default()).is_err());
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = ready();
        let b = ready();
        assert_eq!(a.model_state(MODEL_NAME).unwrap(), b.model_state(MODEL_NAME).unwrap());
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut e = ready();
        let first = {
            let it = e.iteration(e.batcher().batch(rows()), Mode::Eval).unwrap();
            it.averages.average(0)
        };
        for _ in 0..30 {
            let mut it = e.iteration(e.batcher().batch(rows()), Mode::Train).unwrap();
            e.step(it.loss.take().unwrap()).unwrap();
        }
        let it = e.iteration(e.batcher().batch(rows()), Mode::Eval).unwrap();
        assert!(it.averages.average(0) < first);
        assert_eq!(it.predictions.as_ref().map(Vec::len), Some(4));
        assert_eq!(it.output.as_ref().map(Vec::len), Some(4));
    }

    #[test]
    fn test_feature_width_mismatch_is_an_error() {
        let mut e = ready();
        let wide = vec![CsvRow { features: vec![1.0, 2.0, 3.0], label: 1 }];
        for mode in [Mode::Train, Mode::Eval] {
            let err = e.iteration(e.batcher().batch(wide.clone()), mode).unwrap_err();
            assert!(err.to_string().contains("num_features=2"));
        }
    }

    #[test]
    fn test_state_round_trip() {
        let mut a = ready();
        let mut it = a.iteration(a.batcher().batch(rows()), Mode::Train).unwrap();
        a.step(it.loss.take().unwrap()).unwrap();

        let model = a.model_state(MODEL_NAME).unwrap();
        let optim = a.optimizer_state(OPTIMIZER_NAME).unwrap();

        let _guard = crate::ml::rng_guard();
        let mut b = ClassifierExperiment::new();
        let cfg = RunConfig { seed: 7, ..config() };
        b.build_models(&cfg).unwrap();
        b.init_optimizers(&cfg).unwrap();
        b.init_weights(cfg.seed).unwrap();
        b.load_model_state(MODEL_NAME, model.clone()).unwrap();
        b.load_optimizer_state(OPTIMIZER_NAME, optim).unwrap();

        assert_eq!(b.model_state(MODEL_NAME).unwrap(), model);
        assert!(b.model_state("encoder").is_err());
    }
}
