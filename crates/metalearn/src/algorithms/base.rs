//! Shared optimizer construction, learning-rate schedules, and the
//! single-step fast-adaptation primitive used by the MAML-family variants.

use std::path::Path;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Optimizer and schedule configuration shared by all variants.
#[derive(Config, Debug)]
pub struct OptimConfig {
    /// Learning rate for inner (fast-adaptation) steps.
    pub inner_learning_rate: f64,
    /// Learning rate for the outer (meta) update.
    pub outer_learning_rate: f64,
    /// Enable step-decay scheduling of the outer learning rate.
    #[config(default = false)]
    pub scheduler: bool,
    /// Outer steps between decay applications.
    #[config(default = 1000)]
    pub scheduler_step: usize,
    /// Multiplicative decay factor per schedule step.
    #[config(default = 0.5)]
    pub scheduler_decay: f64,
    /// Gradient norm clipping for the outer optimizer.
    #[config(default = 1.0)]
    pub gradient_clip_val: f32,
}

impl OptimConfig {
    /// Fail fast on configurations no episode could run under.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inner_learning_rate <= 0.0 || self.outer_learning_rate <= 0.0 {
            anyhow::bail!("learning rates must be positive");
        }
        if self.scheduler && self.scheduler_step == 0 {
            anyhow::bail!("scheduler_step must be at least 1 when the scheduler is enabled");
        }
        Ok(())
    }
}

/// Outer Adam with gradient norm clipping, over the trainable parameters.
pub(crate) fn build_outer_optimizer<B, M>(config: &OptimConfig) -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    AdamConfig::new()
        .with_grad_clipping(Some(GradientClippingConfig::Norm(config.gradient_clip_val)))
        .init()
}

/// Inner Adam for Reptile's self-managed fast steps (no clipping; the inner
/// loop mirrors plain supervised training).
pub(crate) fn build_inner_optimizer<B, M>() -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    AdamConfig::new().init()
}

/// Outer learning rate at `step` under the optional step-decay schedule.
pub fn outer_lr(config: &OptimConfig, step: usize) -> f64 {
    if config.scheduler {
        let applications = (step / config.scheduler_step) as i32;
        config.outer_learning_rate * config.scheduler_decay.powi(applications)
    } else {
        config.outer_learning_rate
    }
}

/// Sidecar metadata written next to each model checkpoint.
#[derive(Debug, serde::Serialize)]
pub struct CheckpointMeta {
    pub algorithm: &'static str,
    pub outer_steps: usize,
}

impl CheckpointMeta {
    /// Write `meta.json` into the checkpoint directory.
    pub fn write(&self, dir: &Path) -> anyhow::Result<()> {
        serde_json::to_writer(std::fs::File::create(dir.join("meta.json"))?, self)?;
        Ok(())
    }
}

/// One in-place fast-adaptation step: plain SGD on the given loss.
///
/// The returned module owns fresh leaf parameters with the same `ParamId`s,
/// so gradients of a later query loss on the adapted module line up with the
/// original model for the outer update. Gradients do not flow through the
/// step itself; adaptation is first-order.
pub(crate) fn sgd_adapt<B, M>(module: M, loss: Tensor<B, 1>, lr: f64) -> M
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let grads = GradientsParams::from_grads(loss.backward(), &module);
    let mut sgd = SgdConfig::new().init::<B, M>();
    sgd.step(lr, module, grads)
}
