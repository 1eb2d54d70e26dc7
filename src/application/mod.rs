// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: resolve the run configuration,
// make sure fold files exist, then drive a Trainer over every
// dataset and fold.
//
// Rules for this layer:
//   - No model or tensor code here (that's Layer 5)
//   - No argument parsing or printing (that's Layer 1)
//   - File formats belong to Layer 6 (infra)

/// Run configuration and the override merge
pub mod config;

/// Per-dataset and pooled k-fold runs
pub mod orchestrator;

/// One worker per local device
pub mod distributed;
