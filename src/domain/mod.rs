// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain structs, enums and small traits that describe a run:
// accumulators, run cache, dataset specs, fold files, device
// placement and the fatal error cases.
//
// Rules for this layer:
//   - NO Burn framework types
//   - File I/O only for the small JSON fold files

/// Metric and average accumulators
pub mod metrics;

/// Mutable per-run bookkeeping
pub mod cache;

/// Dataset specs and `*dir` qualification
pub mod dataspec;

/// Fold split files
pub mod split;

/// Device inventory, placement, distributed launch message
pub mod placement;

/// Typed fatal errors
pub mod error;

/// Collaborator traits
pub mod traits;
