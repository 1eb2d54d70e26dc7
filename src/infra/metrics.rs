// ============================================================
// Layer 6 — Score and Progress Logs
// ============================================================
// Writes the CSV files a run leaves behind in its log dir.
// Every file is rewritten from the cache in full, so a crash
// between epochs never leaves a half-written row behind.
//
//   <id>_test_score.csv       header = log_header
//                             one row per test evaluation
//   global_test_score.csv     header = SPLIT,<log_header>
//                             one row per fold + "Global"
//   <id>_training_log.csv     running windows + epoch rows
//   <id>_validation_log.csv   one row per epoch
//
// Example:
//   SPLIT,Loss,Precision,Recall,F1,Accuracy
//   toy_0.json,0.41,0.8,0.75,0.77419,0.8
//   Global,0.43,0.79,0.76,0.77468,0.79

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::{fs, path::{Path, PathBuf}};

use crate::domain::cache::{RunCache, ScoreRow};

pub const GLOBAL_SCORE_FILE: &str = "global_test_score.csv";

/// `<log_dir>/<id>_test_score.csv`
pub fn test_score_path(log_dir: &Path, experiment_id: &str) -> PathBuf {
    log_dir.join(format!("{experiment_id}_test_score.csv"))
}

fn format_row(values: &[f64]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

fn write_csv(path: &Path, header: &str, rows: impl IntoIterator<Item = String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = String::new();
    writeln!(out, "{header}")?;
    for row in rows {
        writeln!(out, "{row}")?;
    }
    fs::write(path, out).with_context(|| format!("Cannot write '{}'", path.display()))?;
    tracing::debug!("Wrote '{}'", path.display());
    Ok(())
}

/// Per-experiment test scores.
pub fn save_test_scores(cache: &RunCache) -> Result<PathBuf> {
    let path = test_score_path(&cache.log_dir, &cache.experiment_id);
    write_csv(&path, &cache.log_header, cache.test_score.iter().map(|r| format_row(r)))?;
    Ok(path)
}

/// One row per fold plus the "Global" row.
pub fn save_global_scores(cache: &RunCache) -> Result<PathBuf> {
    let path = cache.log_dir.join(GLOBAL_SCORE_FILE);
    let rows = cache
        .global_test_score
        .iter()
        .map(|ScoreRow { label, values }| {
            if values.is_empty() {
                label.clone()
            } else {
                format!("{label},{}", format_row(values))
            }
        });
    write_csv(&path, &format!("SPLIT,{}", cache.log_header), rows)?;
    Ok(path)
}

/// Training and validation progress of the current experiment.
pub fn save_progress(cache: &RunCache) -> Result<()> {
    for (key, rows) in [
        ("training_log", &cache.training_log),
        ("validation_log", &cache.validation_log),
    ] {
        let path = cache.log_dir.join(format!("{}_{key}.csv", cache.experiment_id));
        write_csv(&path, &cache.log_header, rows.iter().map(|r| format_row(r)))?;
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn cache(dir: &Path) -> RunCache {
        let mut cache = RunCache::for_dataset(dir);
        cache.experiment_id = "toy_0".into();
        cache
    }

    #[test]
    fn test_global_score_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache(dir.path());
        cache.global_test_score = vec![
            ScoreRow { label: "toy_0.json".into(), values: vec![0.5, 1.0, 0.0, 0.0, 0.25] },
            ScoreRow { label: "Global".into(),     values: vec![0.5, 1.0, 0.0, 0.0, 0.25] },
        ];

        let path = save_global_scores(&cache).unwrap();
        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "SPLIT,Loss,Precision,Recall,F1,Accuracy");
        assert_eq!(lines[1], "toy_0.json,0.5,1,0,0,0.25");
        assert_eq!(lines.last().copied(), Some("Global,0.5,1,0,0,0.25"));
    }

    #[test]
    fn test_test_score_file_name_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache(dir.path());
        cache.test_score.push(vec![0.1, 0.2]);

        let path = save_test_scores(&cache).unwrap();
        assert_eq!(path, dir.path().join("toy_0_test_score.csv"));
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "Loss,Precision,Recall,F1,Accuracy\n0.1,0.2\n"
        );
    }

    #[test]
    fn test_progress_writes_both_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = cache(dir.path());
        cache.training_log.push(vec![1.0]);
        cache.validation_log.push(vec![2.0]);

        save_progress(&cache).unwrap();
        assert!(dir.path().join("toy_0_training_log.csv").exists());
        assert!(dir.path().join("toy_0_validation_log.csv").exists());
    }
}
