// ============================================================
// Layer 4 — Fold Splitter
// ============================================================
// Writes the fold files a dataset is trained from.
//
// Files are listed from the spec's data_dir (sorted, optional
// `extension` filter) and shuffled with the run seed, so the
// same seed always produces the same folds.
//
// With num_folds = k, file i of k ("<name>_<i>.json") uses
//   test       = chunk i
//   validation = chunk (i + 1) mod k
//   train      = every other chunk
// so each file lands in exactly one test fold.
//
// Without num_folds a single "<name>.json" ratio split is
// written: two ratios → train/test, three → train/validation/test.

use anyhow::{Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::{fs, path::Path};

use crate::application::config::RunConfig;
use crate::domain::dataspec::DataSpec;
use crate::domain::error::TrainerError;
use crate::domain::split::Split;

// ─── FoldSplitter Trait ───────────────────────────────────────────────────────
/// Creates the fold files for one dataset inside `split_dir`.
pub trait FoldSplitter: Sync {
    fn create_splits(&self, spec: &DataSpec, config: &RunConfig, split_dir: &Path) -> Result<()>;
}

/// Default splitter: k folds, or one ratio split.
#[derive(Debug, Clone, Copy, Default)]
pub struct KFoldSplitter;

impl FoldSplitter for KFoldSplitter {
    fn create_splits(&self, spec: &DataSpec, config: &RunConfig, split_dir: &Path) -> Result<()> {
        let mut files = list_data_files(spec)?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        files.shuffle(&mut rng);

        fs::create_dir_all(split_dir)
            .with_context(|| format!("Cannot create split directory '{}'", split_dir.display()))?;

        match config.num_folds {
            Some(k) => {
                for (i, split) in k_folds(&files, k)?.into_iter().enumerate() {
                    split.save(&split_dir.join(format!("{}_{i}.json", spec.name)))?;
                }
                tracing::info!("{} folds created for '{}' ({} files)", k, spec.name, files.len());
            }
            None => {
                let split = ratio_split(&files, &config.split_ratio)?;
                split.save(&split_dir.join(format!("{}.json", spec.name)))?;
                tracing::info!(
                    "Ratio split {:?} created for '{}': {}/{}/{}",
                    config.split_ratio,
                    spec.name,
                    split.train.len(),
                    split.validation.len(),
                    split.test.len()
                );
            }
        }
        Ok(())
    }
}

/// True when `split_dir` is missing or holds no files.
pub fn needs_splits(split_dir: Option<&Path>) -> bool {
    match split_dir {
        None => true,
        Some(dir) => fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true),
    }
}

fn list_data_files(spec: &DataSpec) -> Result<Vec<String>> {
    let data_dir  = spec.data_dir()?;
    let extension = spec.get("extension").map(|e| e.trim_start_matches('.'));

    let mut files = Vec::new();
    for entry in fs::read_dir(&data_dir)
        .with_context(|| format!("Cannot read data directory '{}'", data_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(ext) = extension {
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            files.push(name.to_string());
        }
    }
    files.sort();
    Ok(files)
}

// Chunk boundaries: the first `len % k` chunks get one extra file.
fn chunks(files: &[String], k: usize) -> Vec<Vec<String>> {
    let base  = files.len() / k;
    let extra = files.len() % k;
    let mut out   = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let size = base + usize::from(i < extra);
        out.push(files[start..start + size].to_vec());
        start += size;
    }
    out
}

pub fn k_folds(files: &[String], k: usize) -> Result<Vec<Split>, TrainerError> {
    if k < 2 {
        return Err(TrainerError::Split(format!("num_folds must be at least 2, got {k}")));
    }
    let parts = chunks(files, k);

    Ok((0..k)
        .map(|i| {
            let val = (i + 1) % k;
            let train = parts
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i && j != val)
                .flat_map(|(_, p)| p.iter().cloned())
                .collect();
            Split {
                train,
                validation: parts[val].clone(),
                test:       parts[i].clone(),
            }
        })
        .collect())
}

pub fn ratio_split(files: &[String], ratio: &[f64]) -> Result<Split, TrainerError> {
    if !(ratio.len() == 2 || ratio.len() == 3) || ratio.iter().any(|r| *r < 0.0) {
        return Err(TrainerError::Split(format!(
            "split_ratio must hold 2 or 3 non-negative values, got {ratio:?}"
        )));
    }
    let total: f64 = ratio.iter().sum();
    if total <= 0.0 {
        return Err(TrainerError::Split("split_ratio sums to zero".to_string()));
    }

    let n        = files.len();
    let n_train  = ((ratio[0] / total) * n as f64).round() as usize;
    let n_train  = n_train.min(n);
    let (n_val, n_test) = if ratio.len() == 3 {
        let n_val = (((ratio[1] / total) * n as f64).round() as usize).min(n - n_train);
        (n_val, n - n_train - n_val)
    } else {
        (0, n - n_train)
    };
    debug_assert_eq!(n_train + n_val + n_test, n);

    Ok(Split {
        train:      files[..n_train].to_vec(),
        validation: files[n_train..n_train + n_val].to_vec(),
        test:       files[n_train + n_val..].to_vec(),
    })
}
