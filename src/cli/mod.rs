// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and hands everything else to
// Layer 2 (application).
//
// Two commands are supported:
//   1. `run`   — k-fold (or pooled) train/test with the bundled
//                CSV classifier
//   2. `split` — only write the fold files of each dataset

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, RunArgs, SplitArgs};

use crate::application::config::RunConfig;
use crate::application::orchestrator::{default_split_dir, DatasetReport, Orchestrator};
use crate::data::splitter::{FoldSplitter, KFoldSplitter};
use crate::ml::classifier::{device_inventory, ClassifierExperiment};

#[derive(Parser, Debug)]
#[command(
    name = "easy-trainer",
    version,
    about = "k-fold train / validate / test runs with checkpoints and score logs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch only; no computation happens here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args)   => run_experiment(args),
            Commands::Split(args) => run_split(args),
        }
    }
}

fn run_experiment(args: RunArgs) -> Result<()> {
    let (base, specs) = args.inputs.load()?;
    let orchestrator = Orchestrator::new(specs, base, args.settings.into(), device_inventory())?;

    let factory = |_: &RunConfig| ClassifierExperiment::new();
    let reports = if args.pooled {
        vec![orchestrator.run_pooled(factory, &KFoldSplitter)?]
    } else {
        orchestrator.run(factory, &KFoldSplitter)?
    };

    for report in &reports {
        print_report(report);
    }
    Ok(())
}

fn print_report(report: &DatasetReport) {
    println!("\n{} → {}", report.name, report.log_dir.display());
    if let Some(global) = report.global() {
        println!("  {}", report.header);
        let values: Vec<String> = global.values.iter().map(|v| format!("{v:.4}")).collect();
        println!("  Global: {}", values.join(", "));
    }
}

fn run_split(args: SplitArgs) -> Result<()> {
    let (base, specs) = args.inputs.load()?;
    let config = base.merged(args.settings.into())?;

    for spec in specs {
        let spec = spec.qualified(&config.dataset_dir);
        let dir = spec
            .split_dir
            .clone()
            .unwrap_or_else(|| default_split_dir(&config.log_dir, &spec.name));
        KFoldSplitter.create_splits(&spec, &config, &dir)?;
        println!("Splits for '{}' written to {}", spec.name, dir.display());
    }
    Ok(())
}
