// ============================================================
// Layer 6 — Overwrite Confirmation
// ============================================================
// Implementations of the Confirm trait. Only an explicit "n"
// counts as a refusal; any other answer (including an empty
// line) lets the run continue.

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

use crate::domain::traits::Confirm;

/// Asks on stdin/stdout and blocks until a line is read.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str) -> Result<bool> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{question} [y/n]: ")?;
        stdout.flush()?;

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read confirmation from stdin")?;
        Ok(!is_refusal(&answer))
    }
}

/// Always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm(&self, question: &str) -> Result<bool> {
        tracing::debug!("{question} → answered {}", if self.0 { "y" } else { "n" });
        Ok(self.0)
    }
}

pub(crate) fn is_refusal(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("n")
}
