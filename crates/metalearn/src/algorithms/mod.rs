//! Meta-learning algorithm variants and the shared step contract.
//!
//! [`MetaLearner`] is the base contract: `training_step` / `validation_step`
//! are provided methods that drive the required `meta_learn` and (for
//! training) the variant's outer update. The variants differ in how the
//! inner adaptation is isolated (clone vs snapshot), how classes are
//! introduced (single task vs class-incremental curriculum), and whether the
//! outer update is a gradient step or a weight interpolation.

pub mod base;
pub mod fscl;
pub mod maml;
pub mod oml;
pub mod reptile;

use std::path::Path;

use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;

use crate::batch::EpisodeBatch;
use crate::metrics::{prefixed, StepMetrics};

pub use base::OptimConfig;
pub use fscl::{Fscl, FsclConfig};
pub use maml::{VanillaMaml, VanillaMamlConfig};
pub use oml::{Oml, OmlConfig};
pub use reptile::{Reptile, ReptileConfig};

/// Whether a step runs in training or validation mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Train,
    Validation,
}

impl Phase {
    pub fn is_train(self) -> bool {
        matches!(self, Phase::Train)
    }
}

/// Result of one `meta_learn` invocation.
///
/// `grads` carries the meta-objective gradients (w.r.t. the adapted fast
/// weights, keyed by shared `ParamId`) when the variant delegates its outer
/// update to the base contract; Reptile manages its own outer update and
/// returns `None`.
#[derive(Debug, Default)]
pub struct EpisodeOutput {
    pub metrics: StepMetrics,
    pub grads: Option<GradientsParams>,
}

/// Base contract shared by every algorithm variant.
///
/// Per-episode mutable state (cloned models, buffers) lives and dies inside
/// `meta_learn`; the only state that survives a call is the optimizer's
/// moment estimates and, for Reptile, the outer-step counter. Persistent
/// parameters are only touched after the full per-episode computation has
/// succeeded, so an abandoned step leaves no partially-applied outer update.
pub trait MetaLearner<B: AutodiffBackend> {
    /// Run one episode: inner adaptation plus query evaluation.
    fn meta_learn(&mut self, batch: &EpisodeBatch<B>, phase: Phase) -> anyhow::Result<EpisodeOutput>;

    /// Apply the outer update from meta-objective gradients.
    fn apply_outer(&mut self, grads: GradientsParams) -> anyhow::Result<()>;

    /// Persist the model (and algorithm metadata) under `dir`.
    fn save_checkpoint(&self, dir: &Path) -> anyhow::Result<()>;

    /// Training step: meta-learn, outer update, metrics prefixed `train_`.
    fn training_step(&mut self, batch: &EpisodeBatch<B>) -> anyhow::Result<StepMetrics> {
        let output = self.meta_learn(batch, Phase::Train)?;
        if let Some(grads) = output.grads {
            self.apply_outer(grads)?;
        }
        let metrics = prefixed("train_", output.metrics);
        for (key, value) in &metrics {
            tracing::debug!(metric = %key, value, "training step");
        }
        Ok(metrics)
    }

    /// Validation step: meta-learn only, metrics prefixed `validation_`.
    ///
    /// Gradient tracking stays enabled, since the continual variants run a
    /// differentiable few-shot adaptation phase even at evaluation time,
    /// but no outer update is applied and any returned gradients are
    /// dropped.
    fn validation_step(&mut self, batch: &EpisodeBatch<B>) -> anyhow::Result<StepMetrics> {
        let output = self.meta_learn(batch, Phase::Validation)?;
        let metrics = prefixed("validation_", output.metrics);
        for (key, value) in &metrics {
            tracing::debug!(metric = %key, value, "validation step");
        }
        Ok(metrics)
    }
}
