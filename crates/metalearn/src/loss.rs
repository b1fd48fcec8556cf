//! Episode loss contract and the default cross-entropy implementation.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;

/// Loss over episode logits and labels, returning a scalar loss tensor.
///
/// Algorithms take the loss by trait object so experiments can swap in
/// alternative objectives without touching the adaptation machinery.
pub trait EpisodeLoss<B: Backend>: Send {
    fn forward(&self, logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1>;
}

/// Standard classification loss: cross entropy over class logits.
#[derive(Clone, Debug, Default)]
pub struct ClassificationLoss;

impl ClassificationLoss {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> EpisodeLoss<B> for ClassificationLoss {
    fn forward(&self, logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let device = logits.device();
        CrossEntropyLossConfig::new()
            .init(&device)
            .forward(logits, labels)
    }
}
