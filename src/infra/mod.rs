// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting file I/O that does not belong to any single
// business layer:
//
//   checkpoint.rs — tagged checkpoint envelope, save/load and
//                   the raw-state dispatch for legacy files
//
//   metrics.rs    — test score, global score and progress CSVs
//
//   run_log.rs    — the <experiment>_log.json dump written
//                   after each trained fold
//
//   prompt.rs     — stdin / fixed-answer Confirm implementations
//                   used before overwriting earlier logs

/// Checkpoint envelope persistence
pub mod checkpoint;

/// Score and progress CSV writers
pub mod metrics;

/// JSON run log
pub mod run_log;

/// Overwrite confirmation
pub mod prompt;
