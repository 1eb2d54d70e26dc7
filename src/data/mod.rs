// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between files on disk and tensor batches:
//
//   data_dir files
//       │
//       ▼
//   KFoldSplitter     → writes one JSON fold file per split
//       │
//       ▼
//   FileDataset       → burn Dataset filled from a fold's file ids
//       │
//       ▼
//   loader            → burn DataLoaderBuilder, shuffled per
//       │               epoch for training, in order otherwise
//       ▼
//   FeatureBatcher    → burn Batcher, rows → tensors
//
// Each module is responsible for exactly one step.

/// Fold creation (k-fold or ratio split)
pub mod splitter;

/// FileDataset trait, CsvDataset and the dataset builders
pub mod dataset;

/// Train and eval loaders built with burn's DataLoaderBuilder
pub mod loader;

/// Implements Burn's Batcher trait for CSV feature rows
pub mod batcher;
