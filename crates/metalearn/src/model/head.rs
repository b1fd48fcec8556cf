//! Growing classification head: per-class linear layers behind a shared ReLU.
//!
//! The head owns `capacity` independent one-output linear transforms. Logits
//! computation respects an `active` head count so the class-incremental
//! variants can introduce classes mid-episode without reshaping parameters;
//! growth within an episode is append-only (the active count only rises).

use burn::nn::{Initializer, Linear, LinearConfig, Relu};
use burn::prelude::*;

/// Configuration for [`GrowingHead`].
#[derive(Config, Debug)]
pub struct GrowingHeadConfig {
    /// Input embedding dimension.
    pub embedding_dim: usize,
    /// Maximum number of classes (`n_way`).
    pub capacity: usize,
}

/// Indexable, appendable collection of per-class linear heads.
#[derive(Module, Debug)]
pub struct GrowingHead<B: Backend> {
    pub(crate) heads: Vec<Linear<B>>,
    activation: Relu,
}

impl GrowingHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GrowingHead<B> {
        let heads = (0..self.capacity)
            .map(|_| {
                LinearConfig::new(self.embedding_dim, 1)
                    .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                    .init(device)
            })
            .collect();
        GrowingHead { heads, activation: Relu::new() }
    }
}

impl<B: Backend> GrowingHead<B> {
    /// Logits over classes `0..active` for a batch of embeddings.
    ///
    /// `active` outside `1..=capacity` is a programming error: the algorithms
    /// derive it from class batches of an episode sampled within `n_way`.
    pub fn forward(&self, features: Tensor<B, 2>, active: usize) -> Tensor<B, 2> {
        assert!(
            active >= 1 && active <= self.heads.len(),
            "active head count {active} outside 1..={}",
            self.heads.len()
        );
        let features = self.activation.forward(features);
        let logits: Vec<Tensor<B, 2>> = self.heads[..active]
            .iter()
            .map(|head| head.forward(features.clone()))
            .collect();
        Tensor::cat(logits, 1)
    }

    /// Maximum number of classes this head can represent.
    pub fn capacity(&self) -> usize {
        self.heads.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_logit_width_tracks_active_count() {
        let device = Default::default();
        let head = GrowingHeadConfig::new(8, 5).init::<TestBackend>(&device);
        let features = Tensor::<TestBackend, 2>::random(
            [3, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        for active in 1..=5 {
            assert_eq!(head.forward(features.clone(), active).dims(), [3, active]);
        }
    }

    #[test]
    fn test_growth_preserves_earlier_logits() {
        // Introducing new heads must not change the logits of classes already
        // present; each head is an independent transform.
        let device = Default::default();
        let head = GrowingHeadConfig::new(8, 4).init::<TestBackend>(&device);
        let features = Tensor::<TestBackend, 2>::random(
            [2, 8],
            Distribution::Normal(0.0, 1.0),
            &device,
        );

        let narrow: Vec<f32> = head
            .forward(features.clone(), 2)
            .into_data()
            .to_vec()
            .unwrap();
        let wide: Vec<f32> = head
            .forward(features, 4)
            .into_data()
            .to_vec()
            .unwrap();

        // wide rows are [l0, l1, l2, l3]; first two entries match narrow rows.
        for row in 0..2 {
            assert_eq!(narrow[row * 2], wide[row * 4]);
            assert_eq!(narrow[row * 2 + 1], wide[row * 4 + 1]);
        }
    }

    #[test]
    #[should_panic(expected = "active head count")]
    fn test_active_above_capacity_panics() {
        let device = Default::default();
        let head = GrowingHeadConfig::new(4, 2).init::<TestBackend>(&device);
        let features = Tensor::<TestBackend, 2>::zeros([1, 4], &device);
        head.forward(features, 3);
    }
}
