// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Two subcommands: `run` and `split`.
//
// Every run setting is an optional flag; a flag that is not
// given leaves the value from --config (or the default) alone.
//
//   easy-trainer run --phase train --spec name=drive,data_dir=csv \
//       --num-folds 5 --set num_features=8

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use crate::application::config::{ConfigOverrides, Phase, RunConfig};
use crate::domain::dataspec::DataSpec;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train and/or test every fold of every dataset
    Run(RunArgs),

    /// Only write the fold files
    Split(SplitArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    #[command(flatten)]
    pub settings: SettingArgs,

    /// Train one model on all datasets together
    #[arg(long)]
    pub pooled: bool,
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    #[command(flatten)]
    pub settings: SettingArgs,
}

// ─── Inputs ───────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct InputArgs {
    /// JSON file with base settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Dataset spec as key=value pairs, e.g. name=drive,data_dir=csv
    #[arg(long = "spec", value_parser = parse_spec)]
    pub specs: Vec<DataSpec>,

    /// JSON file holding a list of dataset specs
    #[arg(long)]
    pub spec_file: Option<PathBuf>,
}

impl InputArgs {
    /// Base config and every dataset spec, in the order given.
    pub fn load(&self) -> Result<(RunConfig, Vec<DataSpec>)> {
        let base = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };

        let mut specs = Vec::new();
        if let Some(path) = &self.spec_file {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read spec file '{}'", path.display()))?;
            let from_file: Vec<DataSpec> = serde_json::from_str(&json)
                .with_context(|| format!("Invalid spec file '{}'", path.display()))?;
            specs.extend(from_file);
        }
        specs.extend(self.specs.iter().cloned());

        if specs.is_empty() {
            bail!("No dataset given. Use --spec name=...,data_dir=... or --spec-file");
        }
        Ok((base, specs))
    }
}

// ─── Settings ─────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct SettingArgs {
    #[arg(short = 'p', long, value_enum)]
    pub phase: Option<Phase>,

    #[arg(short = 'b', long)]
    pub batch_size: Option<usize>,

    #[arg(short = 'e', long)]
    pub epochs: Option<usize>,

    #[arg(long = "lr")]
    pub learning_rate: Option<f64>,

    /// Comma separated device indices
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub gpus: Option<Vec<usize>>,

    #[arg(long)]
    pub pin_memory: Option<bool>,

    #[arg(long)]
    pub num_workers: Option<usize>,

    /// Root that every `*dir` entry of a spec is joined onto
    #[arg(long)]
    pub dataset_dir: Option<PathBuf>,

    /// Cap on items per dataset (and on sparse test datasets)
    #[arg(long)]
    pub load_limit: Option<usize>,

    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Checkpoint to start from instead of random weights
    #[arg(long)]
    pub pretrained_path: Option<PathBuf>,

    #[arg(long)]
    pub verbose: Option<bool>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Overwrite existing logs without asking
    #[arg(long)]
    pub force: bool,

    /// Epochs without improvement before stopping
    #[arg(long)]
    pub patience: Option<usize>,

    /// Evaluate each test file as its own dataset
    #[arg(long)]
    pub load_sparse: Option<bool>,

    #[arg(long)]
    pub num_folds: Option<usize>,

    /// Used when --num-folds is not given, e.g. 0.7,0.15,0.15
    #[arg(long, value_delimiter = ',')]
    pub split_ratio: Option<Vec<f64>>,

    #[arg(long)]
    pub node_rank: Option<usize>,

    #[arg(long)]
    pub num_nodes: Option<usize>,

    #[arg(long)]
    pub world_size: Option<usize>,

    #[arg(long)]
    pub dist_url: Option<String>,

    #[arg(long)]
    pub dist_backend: Option<String>,

    /// Extra key=value setting; the value is read as JSON when it parses
    #[arg(long = "set", value_parser = parse_keyword)]
    pub keywords: Vec<(String, Value)>,
}

/// The application layer never sees clap types.
impl From<SettingArgs> for ConfigOverrides {
    fn from(a: SettingArgs) -> Self {
        ConfigOverrides {
            phase:           a.phase,
            batch_size:      a.batch_size,
            epochs:          a.epochs,
            learning_rate:   a.learning_rate,
            gpus:            a.gpus,
            pin_memory:      a.pin_memory,
            num_workers:     a.num_workers,
            dataset_dir:     a.dataset_dir,
            load_limit:      a.load_limit,
            log_dir:         a.log_dir,
            pretrained_path: a.pretrained_path,
            verbose:         a.verbose,
            seed:            a.seed,
            force:           a.force.then_some(true),
            patience:        a.patience,
            load_sparse:     a.load_sparse,
            num_folds:       a.num_folds,
            split_ratio:     a.split_ratio,
            node_rank:       a.node_rank,
            num_nodes:       a.num_nodes,
            world_size:      a.world_size,
            dist_url:        a.dist_url,
            dist_backend:    a.dist_backend,
            keywords:        a.keywords.into_iter().collect(),
        }
    }
}

fn parse_spec(s: &str) -> Result<DataSpec, String> {
    DataSpec::parse_pairs(s).map_err(|e| e.to_string())
}

fn parse_keyword(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.trim().to_string(), value))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use serde_json::json;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["easy-trainer", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_keyword_values_parse_as_json() {
        assert_eq!(parse_keyword("num_features=8").unwrap(), ("num_features".into(), json!(8)));
        assert_eq!(parse_keyword("tag=drive").unwrap(), ("tag".into(), json!("drive")));
        assert_eq!(parse_keyword("flag=true").unwrap().1, json!(true));
        assert!(parse_keyword("nothing").is_err());
    }

    #[test]
    fn test_flags_become_overrides() {
        let args = run_args(&[
            "--spec", "name=toy,data_dir=csv",
            "--phase", "train",
            "--gpus", "0,1",
            "--split-ratio", "0.7,0.3",
            "--force",
            "--set", "num_features=4",
        ]);
        assert_eq!(args.inputs.specs[0].name, "toy");
        assert!(!args.pooled);

        let ov: ConfigOverrides = args.settings.into();
        assert_eq!(ov.phase, Some(Phase::Train));
        assert_eq!(ov.gpus, Some(vec![0, 1]));
        assert_eq!(ov.split_ratio, Some(vec![0.7, 0.3]));
        assert_eq!(ov.force, Some(true));
        assert_eq!(ov.epochs, None);
        assert_eq!(ov.keywords.get("num_features"), Some(&json!(4)));
    }

    #[test]
    fn test_unset_force_leaves_base_alone() {
        let ov: ConfigOverrides = run_args(&["--spec", "name=toy"]).settings.into();
        assert_eq!(ov.force, None);
    }

    #[test]
    fn test_inputs_need_a_spec() {
        let args = run_args(&[]);
        assert!(args.inputs.load().is_err());
    }

    #[test]
    fn test_spec_file_comes_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("specs.json");
        std::fs::write(&path, r#"[{"name": "a", "data_dir": "a"}]"#).unwrap();

        let p = path.to_string_lossy().into_owned();
        let args = run_args(&["--spec-file", &p, "--spec", "name=b"]);
        let (_, specs) = args.inputs.load().unwrap();
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
