// Test doubles shared by the trainer and orchestrator tests.

use anyhow::Result;

use crate::application::config::RunConfig;
use crate::data::dataset::{FileDataset, Mode};
use crate::domain::cache::RunCache;
use crate::domain::dataspec::DataSpec;
use crate::domain::metrics::{Accumulate, Averages, Metrics};
use crate::domain::placement::DevicePlacement;
use crate::ml::experiment::{Experiment, Iteration, IterationOf};
use burn::data::{dataloader::batcher::Batcher, dataset::Dataset};

/// A single scripted score exposed as "f1".
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Score(pub(crate) f64);

impl Accumulate for Score {
    fn accumulate(&mut self, other: &Self) -> &mut Self {
        self.0 += other.0;
        self
    }
    fn reset(&mut self) {
        self.0 = 0.0;
    }
    fn get(&self) -> Vec<f64> {
        vec![self.0]
    }
}

impl Metrics for Score {
    fn metric(&self, name: &str) -> Option<f64> {
        name.eq_ignore_ascii_case("f1").then_some(self.0)
    }
}

pub(crate) struct Numbers {
    pub(crate) items: Vec<u32>,
    pub(crate) files: Vec<String>,
}

impl Dataset<u32> for Numbers {
    fn get(&self, index: usize) -> Option<u32> {
        self.items.get(index).copied()
    }
    fn len(&self) -> usize {
        self.items.len()
    }
}

impl FileDataset<u32> for Numbers {
    fn new(_mode: Mode, _limit: usize) -> Self {
        Self { items: Vec::new(), files: Vec::new() }
    }
    fn add(&mut self, files: &[String], _spec: &DataSpec, _verbose: bool) -> Result<()> {
        for f in files {
            self.items.push(f.len() as u32);
            self.files.push(f.clone());
        }
        Ok(())
    }
    fn files(&self) -> &[String] {
        &self.files
    }
}

pub(crate) fn numbers(n: usize) -> Numbers {
    Numbers { items: (0..n as u32).collect(), files: Vec::new() }
}

/// Batches are the raw item lists.
#[derive(Clone)]
pub(crate) struct Collect;

impl Batcher<u32, Vec<u32>> for Collect {
    fn batch(&self, items: Vec<u32>) -> Vec<u32> {
        items
    }
}

/// Weights are a Vec<f32>, the optimizer state is a step counter.
#[derive(Default)]
pub(crate) struct Scripted {
    pub(crate) weights:       Vec<f32>,
    pub(crate) steps:         u64,
    pub(crate) val_scores:    Vec<f64>,
    pub(crate) eval_calls:    usize,
    pub(crate) drop_loss:     bool,
    pub(crate) predictions:   Vec<usize>,
    pub(crate) placed:        Vec<DevicePlacement>,
}

impl Experiment for Scripted {
    type Item    = u32;
    type Dataset = Numbers;
    type Batch   = Vec<u32>;
    type Batcher = Collect;
    type Loss    = f64;
    type Output  = ();
    type Metrics = Score;

    fn build_models(&mut self, _config: &RunConfig) -> Result<()> {
        self.weights = vec![0.0; 3];
        Ok(())
    }
    fn model_names(&self) -> Vec<String> {
        vec!["m".into()]
    }
    fn optimizer_names(&self) -> Vec<String> {
        vec!["adam".into()]
    }
    fn init_optimizers(&mut self, _config: &RunConfig) -> Result<()> {
        self.steps = 0;
        Ok(())
    }
    fn init_weights(&mut self, seed: u64) -> Result<()> {
        self.weights = vec![seed as f32; 3];
        Ok(())
    }
    fn batcher(&self) -> Collect {
        Collect
    }
    fn iteration(&mut self, batch: Vec<u32>, mode: Mode) -> Result<IterationOf<Self>> {
        let mut averages = Averages::new(1);
        averages.add(1.0, batch.len() as u64, 0);
        let score = match mode {
            Mode::Train => 0.0,
            Mode::Eval => {
                let s = self.val_scores.get(self.eval_calls).copied().unwrap_or(0.0);
                self.eval_calls += 1;
                s
            }
        };
        let it = Iteration::new(Score(score), averages);
        Ok(if self.drop_loss { it } else { it.with_loss(batch.len() as f64) })
    }
    fn step(&mut self, _loss: f64) -> Result<()> {
        self.steps += 1;
        self.weights[0] += 1.0;
        Ok(())
    }
    fn model_state(&self, _name: &str) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.weights)?)
    }
    fn load_model_state(&mut self, _name: &str, state: Vec<u8>) -> Result<()> {
        self.weights = serde_json::from_slice(&state)?;
        Ok(())
    }
    fn optimizer_state(&self, _name: &str) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.steps)?)
    }
    fn load_optimizer_state(&mut self, _name: &str, state: Vec<u8>) -> Result<()> {
        self.steps = serde_json::from_slice(&state)?;
        Ok(())
    }
    fn place(&mut self, placement: &DevicePlacement) -> Result<()> {
        self.placed.push(placement.clone());
        Ok(())
    }
    fn save_predictions(
        &mut self,
        _dataset: &Numbers,
        its:      Vec<IterationOf<Self>>,
        _cache:   &RunCache,
    ) -> Result<()> {
        self.predictions.push(its.len());
        Ok(())
    }
}
