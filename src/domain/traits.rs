// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Collaborator interfaces that live outside any one layer.
// The experiment / dataset / splitter contracts sit next to the
// code that drives them (ml::experiment, data::dataset,
// data::splitter); this file keeps the small ones.

use anyhow::Result;

// ─── Confirm ──────────────────────────────────────────────────────────────────
/// Anything that can answer a yes/no question before a run
/// overwrites earlier logs.
///
/// Implementations:
///   - StdinConfirm → asks on the terminal
///   - AutoConfirm  → fixed answer (tests, non-interactive runs)
pub trait Confirm: Send + Sync {
    /// Ask `question`; `Ok(false)` means the user refused.
    fn confirm(&self, question: &str) -> Result<bool>;
}
