// ============================================================
// Layer 3 — Metric Accumulators
// ============================================================
// Plain counters, no tensors. An iteration produces a fresh
// accumulator per batch; the trainer folds them together into
// running, per-epoch, per-dataset and per-fold totals.
//
//   Prf1a     — binary confusion counts (TP / FP / TN / FN)
//   Averages  — N weighted running means (e.g. loss)
//
// Every derived value is guarded by METRICS_EPS so an empty
// accumulator reports 0.0 rather than NaN.

use serde::{Deserialize, Serialize};

/// Added to every denominator.
pub const METRICS_EPS: f64 = 10e-5;

/// Decimal places kept by `get()`.
pub const METRICS_NUM_PRECISION: i32 = 5;

pub(crate) fn round_to_precision(value: f64) -> f64 {
    let scale = 10f64.powi(METRICS_NUM_PRECISION);
    (value * scale).round() / scale
}

// ─── Accumulate ───────────────────────────────────────────────────────────────
/// Shared behaviour of everything that can be merged across batches.
pub trait Accumulate {
    /// Merge `other` into `self` and return `self` for chaining.
    fn accumulate(&mut self, other: &Self) -> &mut Self;

    /// Zero every counter in place.
    fn reset(&mut self);

    /// Derived values in a fixed order, ready for a log row.
    fn get(&self) -> Vec<f64>;
}

/// A metrics object the trainer can monitor for "best" checkpoints.
pub trait Metrics: Accumulate + Clone {
    /// Look up one derived value by name (case-insensitive).
    fn metric(&self, name: &str) -> Option<f64>;
}

// ─── Prf1a ────────────────────────────────────────────────────────────────────
/// Precision / Recall / F1 / Accuracy (and overlap) for a binary problem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prf1a {
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    pub fn_: u64,
}

impl Prf1a {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(tp: u64, fp: u64, tn: u64, fn_: u64) -> Self {
        Self { tp, fp, tn, fn_ }
    }

    /// Count (prediction, truth) pairs; any non-zero value is positive.
    pub fn add<P, T>(&mut self, predictions: &[P], truths: &[T])
    where
        P: Copy + Into<i64>,
        T: Copy + Into<i64>,
    {
        for (&p, &t) in predictions.iter().zip(truths) {
            match (p.into() != 0, t.into() != 0) {
                (true, true) => self.tp += 1,
                (true, false) => self.fp += 1,
                (false, false) => self.tn += 1,
                (false, true) => self.fn_ += 1,
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn precision(&self) -> f64 {
        self.guarded(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        self.guarded(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        2.0 * p * r / (p + r + METRICS_EPS)
    }

    pub fn accuracy(&self) -> f64 {
        self.guarded(self.tp + self.tn, self.total())
    }

    /// Intersection over union of the positive class.
    pub fn overlap(&self) -> f64 {
        self.guarded(self.tp, self.tp + self.fp + self.fn_)
    }

    fn guarded(&self, numerator: u64, denominator: u64) -> f64 {
        numerator as f64 / (denominator as f64 + METRICS_EPS)
    }
}

impl Accumulate for Prf1a {
    fn accumulate(&mut self, other: &Self) -> &mut Self {
        self.tp += other.tp;
        self.fp += other.fp;
        self.tn += other.tn;
        self.fn_ += other.fn_;
        self
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    /// [precision, recall, f1, accuracy]
    fn get(&self) -> Vec<f64> {
        [self.precision(), self.recall(), self.f1(), self.accuracy()]
            .into_iter()
            .map(round_to_precision)
            .collect()
    }
}

impl Metrics for Prf1a {
    fn metric(&self, name: &str) -> Option<f64> {
        match name.to_ascii_lowercase().as_str() {
            "precision" => Some(self.precision()),
            "recall" => Some(self.recall()),
            "f1" => Some(self.f1()),
            "accuracy" => Some(self.accuracy()),
            "overlap" => Some(self.overlap()),
            _ => None,
        }
    }
}

// ─── Averages ─────────────────────────────────────────────────────────────────
/// Several weighted running means tracked side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    sums:   Vec<f64>,
    counts: Vec<u64>,
}

impl Default for Averages {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Averages {
    /// `num_averages` independent slots, all zero.
    pub fn new(num_averages: usize) -> Self {
        Self {
            sums:   vec![0.0; num_averages],
            counts: vec![0; num_averages],
        }
    }

    pub fn num_averages(&self) -> usize {
        self.sums.len()
    }

    /// Record `value` observed over `count` samples in `slot`.
    ///
    /// # Panics
    /// Panics if `slot` is out of range.
    pub fn add(&mut self, value: f64, count: u64, slot: usize) {
        self.sums[slot] += value * count as f64;
        self.counts[slot] += count;
    }

    /// Unrounded mean of one slot; 0.0 when nothing was recorded.
    pub fn average(&self, slot: usize) -> f64 {
        match self.counts.get(slot) {
            Some(&count) if count > 0 => self.sums[slot] / count as f64,
            _ => 0.0,
        }
    }
}

impl Accumulate for Averages {
    /// # Panics
    /// Panics if the two sides track a different number of slots.
    fn accumulate(&mut self, other: &Self) -> &mut Self {
        assert_eq!(
            self.num_averages(),
            other.num_averages(),
            "cannot accumulate averages with different slot counts"
        );
        for (sum, other_sum) in self.sums.iter_mut().zip(&other.sums) {
            *sum += other_sum;
        }
        for (count, other_count) in self.counts.iter_mut().zip(&other.counts) {
            *count += other_count;
        }
        self
    }

    fn reset(&mut self) {
        self.sums.iter_mut().for_each(|s| *s = 0.0);
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    fn get(&self) -> Vec<f64> {
        (0..self.num_averages())
            .map(|slot| round_to_precision(self.average(slot)))
            .collect()
    }
}
