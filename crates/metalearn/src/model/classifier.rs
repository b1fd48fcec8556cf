//! Reference spoken-word classifier: CNN encoder + growing head.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::model::encoder::{CnnEncoder, CnnEncoderConfig};
use crate::model::head::{GrowingHead, GrowingHeadConfig};
use crate::model::EpisodicModel;

/// Configuration for [`WordClassifier`].
#[derive(Config, Debug)]
pub struct WordClassifierConfig {
    /// Feature channels per frame.
    pub input_channels: usize,
    /// Maximum number of classes per episode (`n_way`).
    pub n_way: usize,
    /// Embedding dimension between encoder and head.
    #[config(default = 128)]
    pub embedding_dim: usize,
    /// Encoder convolution width.
    #[config(default = 64)]
    pub hidden_dim: usize,
}

#[derive(Module, Debug)]
pub struct WordClassifier<B: Backend> {
    pub(crate) encoder: CnnEncoder<B>,
    pub(crate) head: GrowingHead<B>,
}

impl WordClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> WordClassifier<B> {
        WordClassifier {
            encoder: CnnEncoderConfig::new(self.input_channels, self.embedding_dim)
                .with_hidden_dim(self.hidden_dim)
                .init(device),
            head: GrowingHeadConfig::new(self.embedding_dim, self.n_way).init(device),
        }
    }
}

impl<B: AutodiffBackend> EpisodicModel<B> for WordClassifier<B> {
    fn forward(
        &self,
        inputs: Tensor<B, 3>,
        active_classes: usize,
        inner_loop: bool,
    ) -> Tensor<B, 2> {
        let features = self.encoder.forward(inputs);
        // Inner-loop adaptation treats the representation as fixed: only the
        // class heads see gradients.
        let features = if inner_loop { features.detach() } else { features };
        self.head.forward(features, active_classes)
    }

    fn max_classes(&self) -> usize {
        self.head.capacity()
    }
}
