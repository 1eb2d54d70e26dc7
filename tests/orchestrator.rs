// End-to-end: CSV files on disk → folds → train → test → score files.

use std::fs;
use std::path::Path;

use easy_trainer::application::config::{ConfigOverrides, Phase, RunConfig};
use easy_trainer::application::orchestrator::Orchestrator;
use easy_trainer::data::splitter::KFoldSplitter;
use easy_trainer::domain::dataspec::DataSpec;
use easy_trainer::ml::classifier::{device_inventory, ClassifierExperiment};
use serde_json::json;

// Two features; label is 1 when the first one is positive.
fn write_csvs(dir: &Path, files: usize) {
    fs::create_dir_all(dir).unwrap();
    for f in 0..files {
        let mut text = String::new();
        for r in 0..4 {
            let x = if (f + r) % 2 == 0 { 1.0 } else { -1.0 };
            let label = i32::from(x > 0.0);
            text.push_str(&format!("{x},{},{label}\n", r as f32 * 0.1));
        }
        fs::write(dir.join(format!("part{f}.csv")), text).unwrap();
    }
}

fn overrides(root: &Path, phase: Phase, sparse: bool) -> ConfigOverrides {
    let mut ov = ConfigOverrides {
        phase:       Some(phase),
        dataset_dir: Some(root.to_path_buf()),
        log_dir:     Some(root.join("net_logs")),
        epochs:      Some(2),
        batch_size:  Some(4),
        num_folds:   Some(3),
        seed:        Some(11),
        verbose:     Some(false),
        force:       Some(true),
        load_sparse: Some(sparse),
        ..ConfigOverrides::default()
    };
    ov.keywords.insert("num_features".into(), json!(2));
    ov.keywords.insert("hidden_size".into(), json!(8));
    ov
}

fn orchestrator(root: &Path, phase: Phase, sparse: bool) -> Orchestrator {
    let spec = DataSpec::new("toy").with_entry("data_dir", "csv");
    Orchestrator::new(vec![spec], RunConfig::default(), overrides(root, phase, sparse), device_inventory())
        .unwrap()
}

#[test]
fn test_kfold_train_then_test_phase() {
    let root = tempfile::tempdir().unwrap();
    write_csvs(&root.path().join("csv"), 6);
    let logs = root.path().join("net_logs/toy");

    // ── Train ──
    let train = orchestrator(root.path(), Phase::Train, false);
    let reports = train.run(|_: &RunConfig| ClassifierExperiment::new(), &KFoldSplitter).unwrap();

    assert_eq!(reports.len(), 1);
    let global = reports[0].global().unwrap();
    // loss + precision, recall, f1, accuracy
    assert_eq!(global.values.len(), 5);
    assert!(global.values.iter().all(|v| v.is_finite()));

    let score_file = fs::read_to_string(logs.join("global_test_score.csv")).unwrap();
    let lines: Vec<&str> = score_file.lines().collect();
    assert_eq!(lines[0], "SPLIT,Loss,Precision,Recall,F1,Accuracy");
    assert_eq!(lines.len(), 5);
    assert!(lines[4].starts_with("Global,"));

    for i in 0..3 {
        assert!(logs.join(format!("splits/toy_{i}.json")).exists());
        assert!(logs.join(format!("toy_{i}.pt")).exists());
        assert!(logs.join(format!("toy_{i}_log.json")).exists());
        assert!(logs.join(format!("toy_{i}_training_log.csv")).exists());
        assert!(logs.join(format!("toy_{i}_validation_log.csv")).exists());
    }

    // ── Test only, sparse: reuses the folds and the best checkpoints ──
    let test = orchestrator(root.path(), Phase::Test, true);
    let reports = test.run(|_: &RunConfig| ClassifierExperiment::new(), &KFoldSplitter).unwrap();
    assert_eq!(reports[0].scores.len(), 4);

    let predictions = fs::read_dir(&logs)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with("_predictions.csv"))
        .count();
    // every file is in exactly one test fold
    assert_eq!(predictions, 6);
}
