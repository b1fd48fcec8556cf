//! Step metric maps, accuracy computation, and running averages.

use std::collections::BTreeMap;

use burn::prelude::*;
use burn::tensor::activation::softmax;

/// Metric name to scalar value, produced fresh by every step.
pub type StepMetrics = BTreeMap<String, f64>;

/// Fraction of examples whose argmax class matches the label.
///
/// Logits are turned into a probability distribution first; the result is a
/// plain scalar detached from any gradient graph.
pub fn accuracy<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> f64 {
    let [n, _] = logits.dims();
    let probs = softmax(logits.detach(), 1);
    let predicted = probs.argmax(1).squeeze::<1>(1);
    let correct: i64 = predicted.equal(labels).int().sum().into_scalar().elem();
    correct as f64 / n as f64
}

/// Prefix every metric key with a phase marker (`train_` / `validation_`).
pub fn prefixed(prefix: &str, metrics: StepMetrics) -> StepMetrics {
    metrics
        .into_iter()
        .map(|(k, v)| (format!("{prefix}{k}"), v))
        .collect()
}

/// Running average accumulator over step metric maps for interval logging.
#[derive(Debug, Default)]
pub struct MetricAverage {
    sums: BTreeMap<String, f64>,
    count: usize,
}

impl MetricAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, metrics: &StepMetrics) {
        for (key, value) in metrics {
            *self.sums.entry(key.clone()).or_insert(0.0) += value;
        }
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Averaged metrics, or `None` before the first update.
    pub fn averages(&self) -> Option<StepMetrics> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(self.sums.iter().map(|(k, v)| (k.clone(), v / n)).collect())
    }

    pub fn display(&self) -> String {
        match self.averages() {
            None => "no data".to_string(),
            Some(avg) => avg
                .iter()
                .map(|(k, v)| format!("{k}={v:.4}"))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
