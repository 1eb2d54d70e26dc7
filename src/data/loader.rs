// ============================================================
// Layer 4 — Data Loaders
// ============================================================
// Wraps Burn's DataLoaderBuilder for the two ways a dataset
// is walked:
//
//   train loader → shuffled; Burn reshuffles on every iter()
//                  from the seeded rng, so each epoch sees a
//                  new but reproducible order
//   eval loader  → dataset order, never shuffled
//
// num_workers > 0 switches Burn to its multi-threaded loader,
// which splits the dataset between threads and yields batches
// as they finish. Evaluation that saves predictions must keep
// dataset order, so the caller passes 0 workers there.

use burn::data::{
    dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    dataset::Dataset,
};
use std::fmt::Debug;
use std::sync::Arc;

/// Batches per pass over `len` items (the last one may be short).
pub fn num_batches(len: usize, batch_size: usize) -> usize {
    len.div_ceil(batch_size.max(1))
}

pub fn train_loader<I, O, B, D>(
    batcher:     B,
    dataset:     Arc<D>,
    batch_size:  usize,
    seed:        u64,
    num_workers: usize,
) -> Arc<dyn DataLoader<O>>
where
    I: Send + Sync + Clone + Debug + 'static,
    O: Send + Clone + Debug + 'static,
    B: Batcher<I, O> + 'static,
    D: Dataset<I> + 'static,
{
    let builder = DataLoaderBuilder::new(batcher)
        .batch_size(batch_size.max(1))
        .shuffle(seed);
    let builder = if num_workers > 0 { builder.num_workers(num_workers) } else { builder };
    builder.build(dataset)
}

pub fn eval_loader<I, O, B, D>(
    batcher:     B,
    dataset:     Arc<D>,
    batch_size:  usize,
    num_workers: usize,
) -> Arc<dyn DataLoader<O>>
where
    I: Send + Sync + Clone + Debug + 'static,
    O: Send + Clone + Debug + 'static,
    B: Batcher<I, O> + 'static,
    D: Dataset<I> + 'static,
{
    let builder = DataLoaderBuilder::new(batcher).batch_size(batch_size.max(1));
    let builder = if num_workers > 0 { builder.num_workers(num_workers) } else { builder };
    builder.build(dataset)
}
