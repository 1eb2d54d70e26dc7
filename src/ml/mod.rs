// ============================================================
// Layer 5 — ML / Training Layer
// ============================================================
// The training core and the bundled burn experiment.
//
//   experiment.rs — the Experiment trait: what a user supplies
//                   (models, batching, one iteration, state
//                   export) plus overridable hooks
//
//   trainer.rs    — generic Trainer<E: Experiment>: init_nn,
//                   train / evaluation loops, checkpoints,
//                   best-model tracking and early stopping
//
//   model.rs      — burn MLP classifier (Linear → relu → Linear)
//
//   classifier.rs — ClassifierExperiment: the MLP on CSV rows
//                   with Adam, cross-entropy and Prf1a
//
// Only model.rs and classifier.rs touch burn's autodiff and
// optimizer APIs; the trainer works on any Experiment.

/// Experiment trait and iteration results
pub mod experiment;

/// Generic fold trainer
pub mod trainer;

/// Burn MLP architecture
pub mod model;

/// Bundled binary classifier experiment
pub mod classifier;

#[cfg(test)]
pub(crate) mod testing;

/// Serialises tests that seed or draw from the backend's global RNG.
#[cfg(test)]
pub(crate) fn rng_guard() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
