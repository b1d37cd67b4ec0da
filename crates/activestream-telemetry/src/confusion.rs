//! Live classifier quality from evaluation rounds

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running true/false positive/negative counts.
///
/// Only the annotation loop records outcomes; everyone else reads.
#[derive(Debug, Default)]
pub struct ConfusionCounters {
    true_positive: AtomicU64,
    false_positive: AtomicU64,
    true_negative: AtomicU64,
    false_negative: AtomicU64,
}

impl ConfusionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one evaluated record. Increments exactly one counter.
    pub fn record(&self, truth: bool, guess: bool) {
        let counter = match (truth, guess) {
            (true, true) => &self.true_positive,
            (false, true) => &self.false_positive,
            (false, false) => &self.true_negative,
            (true, false) => &self.false_negative,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConfusionSnapshot {
        ConfusionSnapshot {
            true_positive: self.true_positive.load(Ordering::Relaxed),
            false_positive: self.false_positive.load(Ordering::Relaxed),
            true_negative: self.true_negative.load(Ordering::Relaxed),
            false_negative: self.false_negative.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionSnapshot {
    pub true_positive: u64,
    pub false_positive: u64,
    pub true_negative: u64,
    pub false_negative: u64,
}

impl ConfusionSnapshot {
    pub fn total(&self) -> u64 {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    /// `None` until the model has predicted at least one positive
    pub fn precision(&self) -> Option<f64> {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    /// `None` until at least one relevant record was evaluated
    pub fn recall(&self) -> Option<f64> {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> Option<f64> {
        let (p, r) = (self.precision()?, self.recall()?);
        if p + r == 0.0 {
            Some(0.0)
        } else {
            Some(2.0 * p * r / (p + r))
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}
