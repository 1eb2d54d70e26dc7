// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// The fatal conditions a run can hit. Everything else travels
// as anyhow::Error with context attached at the call site;
// these variants exist so callers (and tests) can downcast and
// tell a refused overwrite apart from an I/O failure.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error(
        "argument *** phase *** is required and must be one of [train, test]\n\
         \t- train (runs all train, validation, and test steps)\n\
         \t- test (only runs the test step, either with the best saved model \
         or with the weights given in pretrained_path)"
    )]
    MissingPhase,

    #[error("##### {0} already exists and overwriting it was refused #####")]
    LogExists(PathBuf),

    #[error("iteration returned no loss; a loss is required during training")]
    MissingLoss,

    #[error("monitor metric '{0}' is not provided by the metrics object")]
    UnknownMetric(String),

    #[error("no models registered; build_models must register at least one model")]
    NoModels,

    #[error("checkpoint '{path}' is invalid: {reason}")]
    InvalidCheckpoint { path: PathBuf, reason: String },

    #[error("unknown {kind} '{name}' in checkpoint")]
    UnknownState { kind: &'static str, name: String },

    #[error("dataset spec error: {0}")]
    DataSpec(String),

    #[error("split error: {0}")]
    Split(String),
}
