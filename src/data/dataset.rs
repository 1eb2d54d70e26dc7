// ============================================================
// Layer 4 — File-backed Datasets
// ============================================================
// A FileDataset is a burn Dataset that is filled from the file
// ids listed in one key of a fold split. The orchestrator only
// ever builds datasets through the helpers at the bottom of
// this file:
//
//   build_dataset        → one dataset for a split key
//   build_sparse         → one dataset per file (test phase)
//   build_pooled         → every spec and every fold merged
//
// CsvDataset is the concrete dataset used by the bundled
// classifier: each file is a headerless CSV whose rows are
// `feature_1,...,feature_n,label`. Labels are 0 or 1 and every
// row of a dataset has the same number of features.

use anyhow::{bail, Context, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::domain::dataspec::DataSpec;
use crate::domain::split::{list_fold_files, Split, SplitKey};

/// Whether items are loaded for learning or for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Eval,
}

// ─── FileDataset Trait ────────────────────────────────────────────────────────
/// A burn `Dataset` that is built from file ids.
pub trait FileDataset<I>: Dataset<I> + Sized {
    /// Empty dataset holding at most `limit` items.
    fn new(mode: Mode, limit: usize) -> Self;

    /// Load `files` (ids relative to the spec's `data_dir`).
    fn add(&mut self, files: &[String], spec: &DataSpec, verbose: bool) -> Result<()>;

    /// File ids loaded so far, in load order.
    fn files(&self) -> &[String];
}

// ─── CsvRow / CsvDataset ──────────────────────────────────────────────────────
/// One labelled feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvRow {
    pub features: Vec<f32>,
    pub label:    i64,
}

#[derive(Debug, Clone)]
pub struct CsvDataset {
    mode:  Mode,
    limit: usize,
    rows:  Vec<CsvRow>,
    files: Vec<String>,
}

impl CsvDataset {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of features per row, taken from the first row.
    pub fn num_features(&self) -> Option<usize> {
        self.rows.first().map(|r| r.features.len())
    }

    fn parse_line(line: &str, file: &str, line_no: usize) -> Result<CsvRow> {
        let mut values: Vec<&str> = line.split(',').map(str::trim).collect();
        let label = values
            .pop()
            .filter(|_| !values.is_empty())
            .with_context(|| format!("{file}:{line_no}: expected features followed by a label"))?;

        let label = match label.parse::<f64>() {
            Ok(v) if v == 0.0 => 0,
            Ok(v) if v == 1.0 => 1,
            _ => bail!("{file}:{line_no}: label must be 0 or 1, got '{label}'"),
        };

        let features = values
            .iter()
            .map(|v| v.parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("{file}:{line_no}: bad feature value"))?;

        Ok(CsvRow { features, label })
    }
}

impl Dataset<CsvRow> for CsvDataset {
    fn get(&self, index: usize) -> Option<CsvRow> {
        self.rows.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

impl FileDataset<CsvRow> for CsvDataset {
    fn new(mode: Mode, limit: usize) -> Self {
        Self { mode, limit, rows: Vec::new(), files: Vec::new() }
    }

    fn add(&mut self, files: &[String], spec: &DataSpec, verbose: bool) -> Result<()> {
        let data_dir = spec.data_dir()?;

        for file in files {
            if self.rows.len() >= self.limit {
                break;
            }
            let path = data_dir.join(file);
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Cannot read data file '{}'", path.display()))?;

            for (i, line) in text.lines().enumerate() {
                if self.rows.len() >= self.limit {
                    break;
                }
                if line.trim().is_empty() {
                    continue;
                }
                let row = Self::parse_line(line, file, i + 1)?;
                if let Some(width) = self.num_features() {
                    if row.features.len() != width {
                        bail!(
                            "{file}:{}: {} feature(s), earlier rows have {width}",
                            i + 1,
                            row.features.len()
                        );
                    }
                }
                self.rows.push(row);
            }
            self.files.push(file.clone());
        }

        if verbose {
            tracing::info!(
                "{} {:?} items loaded from {} file(s) of '{}'",
                self.rows.len(),
                self.mode,
                self.files.len(),
                spec.name
            );
        }
        Ok(())
    }

    fn files(&self) -> &[String] {
        &self.files
    }
}

// ─── Builders ─────────────────────────────────────────────────────────────────

/// One dataset from the `key` list of `split`.
pub fn build_dataset<I, D: FileDataset<I>>(
    spec:    &DataSpec,
    split:   &Split,
    key:     SplitKey,
    mode:    Mode,
    limit:   usize,
    verbose: bool,
) -> Result<D> {
    let mut dataset = D::new(mode, limit);
    dataset.add(split.files(key), spec, verbose)?;
    Ok(dataset)
}

/// One evaluation dataset per file, at most `max_datasets` of them,
/// each holding at most `row_limit` items.
pub fn build_sparse<I, D: FileDataset<I>>(
    spec:         &DataSpec,
    split:        &Split,
    key:          SplitKey,
    max_datasets: usize,
    row_limit:    usize,
    verbose:      bool,
) -> Result<Vec<D>> {
    let mut datasets = Vec::new();
    for file in split.files(key).iter().take(max_datasets) {
        let mut dataset = D::new(Mode::Eval, row_limit);
        dataset.add(std::slice::from_ref(file), spec, false)?;
        datasets.push(dataset);
    }
    if verbose {
        tracing::info!("{} sparse dataset(s) loaded.", datasets.len());
    }
    Ok(datasets)
}

/// The test datasets of one fold: sparse or a single dataset.
pub fn build_test_datasets<I, D: FileDataset<I>>(
    spec:    &DataSpec,
    split:   &Split,
    sparse:  bool,
    limit:   usize,
    verbose: bool,
) -> Result<Vec<D>> {
    if sparse {
        build_sparse(spec, split, SplitKey::Test, limit, limit, verbose)
    } else {
        Ok(vec![build_dataset(spec, split, SplitKey::Test, Mode::Eval, limit, verbose)?])
    }
}

/// Every fold file of every spec merged under `key`. With `sparse`,
/// one dataset per file instead (capped at `limit` overall).
pub fn build_pooled<I, D: FileDataset<I>>(
    specs:   &[DataSpec],
    key:     SplitKey,
    mode:    Mode,
    sparse:  bool,
    limit:   usize,
    verbose: bool,
) -> Result<Vec<D>> {
    let mut pooled   = D::new(mode, limit);
    let mut datasets = Vec::new();

    for spec in specs {
        let split_dir = spec.split_dir.as_deref().with_context(|| {
            format!("dataset '{}' has no split directory to pool from", spec.name)
        })?;
        for fold in list_fold_files(split_dir)? {
            let split = Split::load(&fold.path)?;
            if sparse {
                let remaining = limit.saturating_sub(datasets.len());
                datasets.extend(build_sparse::<I, D>(spec, &split, key, remaining, limit, false)?);
            } else {
                pooled.add(split.files(key), spec, verbose)?;
            }
        }
    }

    if sparse {
        if verbose {
            tracing::info!("{} pooled sparse dataset(s) loaded.", datasets.len());
        }
        Ok(datasets)
    } else {
        Ok(vec![pooled])
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_files(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), "0.1,0.2,1\n0.3,0.4,0\n").unwrap();
        }
    }

    fn spec(dir: &Path) -> DataSpec {
        DataSpec::new("toy").with_entry("data_dir", dir.to_string_lossy())
    }

    #[test]
    fn test_rows_are_parsed_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), &["a.csv", "b.csv"]);

        let mut ds = CsvDataset::new(Mode::Train, 3);
        ds.add(&["a.csv".into(), "b.csv".into()], &spec(dir.path()), false).unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.num_features(), Some(2));
        assert_eq!(ds.get(0).unwrap().label, 1);
        assert_eq!(ds.get(1).unwrap().features, vec![0.3, 0.4]);
    }

    #[test]
    fn test_label_only_line_is_rejected() {
        assert!(CsvDataset::parse_line("1", "x.csv", 1).is_err());
        assert!(CsvDataset::parse_line("0.5,abc,1", "x.csv", 1).is_err());
    }

    #[test]
    fn test_labels_outside_zero_one_are_rejected() {
        assert_eq!(CsvDataset::parse_line("0.5,1.0", "x.csv", 1).unwrap().label, 1);
        assert_eq!(CsvDataset::parse_line("0.5,0", "x.csv", 1).unwrap().label, 0);
        for bad in ["0.5,2", "0.5,-1", "0.5,0.5", "0.5,nan"] {
            assert!(CsvDataset::parse_line(bad, "x.csv", 1).is_err(), "{bad}");
        }

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "0.1,0.2,1\n0.3,0.4,2\n").unwrap();
        let mut ds = CsvDataset::new(Mode::Train, usize::MAX);
        let err = ds.add(&["a.csv".into()], &spec(dir.path()), false).unwrap_err();
        assert!(err.to_string().contains("a.csv:2"));
    }

    #[test]
    fn test_rows_must_share_one_width() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ragged.csv"), "0.1,0.2,1\n0.3,0\n").unwrap();
        fs::write(dir.path().join("wide.csv"), "0.1,0.2,0.3,1\n").unwrap();
        write_files(dir.path(), &["a.csv"]);

        let mut ds = CsvDataset::new(Mode::Train, usize::MAX);
        assert!(ds.add(&["ragged.csv".into()], &spec(dir.path()), false).is_err());

        // the width of the first file binds every later file
        let mut ds = CsvDataset::new(Mode::Train, usize::MAX);
        let files = ["a.csv".to_string(), "wide.csv".to_string()];
        let err = ds.add(&files, &spec(dir.path()), false).unwrap_err();
        assert!(err.to_string().contains("wide.csv:1"));
    }

    #[test]
    fn test_sparse_loading_makes_one_dataset_per_file() {
        let dir   = tempfile::tempdir().unwrap();
        let names = ["1.csv", "2.csv", "3.csv", "4.csv", "5.csv"];
        write_files(dir.path(), &names);
        let split = Split {
            test: names.iter().map(|s| s.to_string()).collect(),
            ..Split::default()
        };

        let all: Vec<CsvDataset> =
            build_test_datasets(&spec(dir.path()), &split, true, usize::MAX, false).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[2].files(), &["3.csv".to_string()]);

        let capped: Vec<CsvDataset> =
            build_test_datasets(&spec(dir.path()), &split, true, 3, false).unwrap();
        assert_eq!(capped.len(), 3);
    }

    #[test]
    fn test_dense_test_set_is_one_dataset() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), &["1.csv", "2.csv"]);
        let split = Split {
            test: vec!["1.csv".into(), "2.csv".into()],
            ..Split::default()
        };
        let all: Vec<CsvDataset> =
            build_test_datasets(&spec(dir.path()), &split, false, usize::MAX, false).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].len(), 4);
    }

    #[test]
    fn test_pooled_merges_every_fold_of_every_spec() {
        let root = tempfile::tempdir().unwrap();
        let mut specs = Vec::new();
        for name in ["a", "b"] {
            let data = root.path().join(name);
            let splits = data.join("splits");
            fs::create_dir_all(&splits).unwrap();
            write_files(&data, &["x.csv", "y.csv"]);
            Split { train: vec!["x.csv".into()], ..Split::default() }
                .save(&splits.join(format!("{name}_0.json")))
                .unwrap();
            Split { train: vec!["y.csv".into()], ..Split::default() }
                .save(&splits.join(format!("{name}_1.json")))
                .unwrap();
            specs.push(
                DataSpec::new(name)
                    .with_entry("data_dir", data.to_string_lossy())
                    .with_split_dir(splits),
            );
        }

        let pooled: Vec<CsvDataset> =
            build_pooled(&specs, SplitKey::Train, Mode::Train, false, usize::MAX, false).unwrap();
        assert_eq!(pooled.len(), 1);
        assert_eq!(pooled[0].len(), 8);
        assert_eq!(pooled[0].files().len(), 4);
    }

    #[test]
    fn test_pooled_sparse_caps_datasets_not_rows() {
        let root = tempfile::tempdir().unwrap();
        let mut specs = Vec::new();
        for name in ["a", "b"] {
            let data = root.path().join(name);
            let splits = data.join("splits");
            fs::create_dir_all(&splits).unwrap();
            for file in ["x.csv", "y.csv"] {
                fs::write(data.join(file), "0.1,1\n0.2,0\n0.3,1\n").unwrap();
            }
            Split { test: vec!["x.csv".into(), "y.csv".into()], ..Split::default() }
                .save(&splits.join(format!("{name}_0.json")))
                .unwrap();
            specs.push(
                DataSpec::new(name)
                    .with_entry("data_dir", data.to_string_lossy())
                    .with_split_dir(splits),
            );
        }

        let sparse: Vec<CsvDataset> =
            build_pooled(&specs, SplitKey::Test, Mode::Eval, true, 3, false).unwrap();
        let lens: Vec<usize> = sparse.iter().map(|d| d.len()).collect();
        assert_eq!(lens, [3, 3, 3]);
        assert_eq!(sparse[2].files(), &["x.csv".to_string()]);
    }
}
