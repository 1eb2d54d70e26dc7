// ============================================================
// Layer 4 — Feature Batcher
// ============================================================
// Implements Burn's Batcher trait to stack CsvRows into one
// feature matrix and one label vector.
//
//   Input:  Vec of N CsvRows, each with F features
//   Output: FeatureBatch { features: [N, F], labels: [N] }
//
// Rows must share one width; CsvDataset rejects files that
// break this before any batch is built.
//
// Batches are built on the evaluation backend. The training
// path lifts them onto the autodiff backend with from_inner,
// since inputs never need gradients.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::CsvRow;

// ─── FeatureBatch ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct FeatureBatch<B: Backend> {
    /// shape: [batch_size, num_features]
    pub features: Tensor<B, 2>,
    /// shape: [batch_size]
    pub labels:   Tensor<B, 1, Int>,
}

impl<B: Backend> FeatureBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── FeatureBatcher ───────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct FeatureBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> FeatureBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<CsvRow, FeatureBatch<B>> for FeatureBatcher<B> {
    fn batch(&self, items: Vec<CsvRow>) -> FeatureBatch<B> {
        let batch_size   = items.len();
        let num_features = items.first().map(|r| r.features.len()).unwrap_or(0);

        let flat: Vec<f32> = items
            .iter()
            .flat_map(|r| r.features.iter().copied())
            .collect();
        let labels: Vec<i64> = items.iter().map(|r| r.label).collect();

        let features = Tensor::<B, 2>::from_data(
            TensorData::new(flat, [batch_size, num_features]),
            &self.device,
        );
        let labels = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels, [batch_size]),
            &self.device,
        );

        FeatureBatch { features, labels }
    }
}
