//! Minimal 1D-CNN encoder for spoken-word feature frames.
//!
//! Two convolutions over the frame axis, adaptive average pooling to a fixed
//! width, then a linear projection to the embedding dimension. Deliberately
//! small: encoder architecture is a pluggable collaborator, and this one
//! exists so the system runs end to end (and so tests have a real model).

use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::pool::{AdaptiveAvgPool1d, AdaptiveAvgPool1dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig1d, Relu};
use burn::prelude::*;

/// Configuration for [`CnnEncoder`].
#[derive(Config, Debug)]
pub struct CnnEncoderConfig {
    /// Feature channels per frame (e.g. mel bins).
    pub input_channels: usize,
    /// Output embedding dimension.
    pub embedding_dim: usize,
    /// Convolution channel width.
    #[config(default = 64)]
    pub hidden_dim: usize,
    /// Convolution kernel size along the frame axis.
    #[config(default = 5)]
    pub kernel_size: usize,
}

/// `[batch, channels, frames]` → `[batch, embedding_dim]`.
#[derive(Module, Debug)]
pub struct CnnEncoder<B: Backend> {
    conv1: Conv1d<B>,
    conv2: Conv1d<B>,
    pool: AdaptiveAvgPool1d,
    pub(crate) project: Linear<B>,
    activation: Relu,
}

impl CnnEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CnnEncoder<B> {
        CnnEncoder {
            conv1: Conv1dConfig::new(self.input_channels, self.hidden_dim, self.kernel_size)
                .with_padding(PaddingConfig1d::Same)
                .init(device),
            conv2: Conv1dConfig::new(self.hidden_dim, self.hidden_dim, self.kernel_size)
                .with_padding(PaddingConfig1d::Same)
                .init(device),
            pool: AdaptiveAvgPool1dConfig::new(1).init(),
            project: LinearConfig::new(self.hidden_dim, self.embedding_dim).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> CnnEncoder<B> {
    pub fn forward(&self, inputs: Tensor<B, 3>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.conv1.forward(inputs));
        let x = self.activation.forward(self.conv2.forward(x));
        let x = self.pool.forward(x).squeeze::<2>(2);
        self.project.forward(x)
    }
}
