//! Model contract and reference implementation: a 1D-CNN word encoder with a
//! growing per-class classification head, plus the parameter snapshot used by
//! Reptile's interpolation/restore.

pub mod classifier;
pub mod encoder;
pub mod head;
pub mod snapshot;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

pub use classifier::{WordClassifier, WordClassifierConfig};
pub use encoder::{CnnEncoder, CnnEncoderConfig};
pub use head::{GrowingHead, GrowingHeadConfig};
pub use snapshot::ParamSnapshot;

/// The differentiable model contract consumed by every algorithm variant.
///
/// `clone()` (from burn's module Clone) produces an independently adaptable
/// copy sharing `ParamId`s with the original, which is what lets first-order
/// meta-gradients computed on the adapted copy drive an outer optimizer step
/// on the original parameters.
pub trait EpisodicModel<B: AutodiffBackend>: AutodiffModule<B> + Clone + core::fmt::Debug {
    /// Compute class logits.
    ///
    /// `active_classes` bounds the classification head: logits cover classes
    /// `0..active_classes`. With `inner_loop` set, encoder features do not
    /// receive gradients, so fast adaptation only touches the output heads
    /// (the OML split of slow representation and fast heads).
    fn forward(&self, inputs: Tensor<B, 3>, active_classes: usize, inner_loop: bool)
        -> Tensor<B, 2>;

    /// Maximum number of classes the head can represent (`n_way`).
    fn max_classes(&self) -> usize;
}
