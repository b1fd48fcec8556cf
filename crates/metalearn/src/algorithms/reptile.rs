//! Reptile: adapt the live model, then interpolate back toward the snapshot.

use std::path::Path;

use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;

use crate::algorithms::base::{build_inner_optimizer, CheckpointMeta, OptimConfig};
use crate::algorithms::{EpisodeOutput, MetaLearner, Phase};
use crate::batch::{label_tensor, split_support_query, EpisodeBatch};
use crate::loss::EpisodeLoss;
use crate::metrics::{accuracy, StepMetrics};
use crate::model::ParamSnapshot;

/// Configuration for [`Reptile`].
#[derive(Config, Debug)]
pub struct ReptileConfig {
    /// Inner adaptation steps per training episode.
    pub train_update_steps: usize,
    /// Inner adaptation steps per validation episode. Validation has its own
    /// count, independent of `train_update_steps`, so evaluation can adapt
    /// for more (or fewer) steps than training does.
    pub test_update_steps: usize,
    /// Total planned outer steps; the interpolation rate decays linearly to
    /// zero over this horizon.
    pub total_steps: usize,
}

/// Reptile meta-learner with a persistent inner Adam optimizer.
///
/// Training episodes move the model directly and then pull the pre-episode
/// snapshot toward the adapted weights. Validation episodes restore the
/// snapshot bit for bit, leaving the model untouched.
pub struct Reptile<B, M, O>
where
    B: AutodiffBackend,
{
    model: M,
    config: ReptileConfig,
    optim: OptimConfig,
    inner: O,
    outer_steps: usize,
    loss: Box<dyn EpisodeLoss<B>>,
}

impl ReptileConfig {
    pub fn init<B, M>(
        &self,
        model: M,
        optim: OptimConfig,
        loss: Box<dyn EpisodeLoss<B>>,
    ) -> anyhow::Result<Reptile<B, M, impl Optimizer<M, B>>>
    where
        B: AutodiffBackend,
        M: crate::model::EpisodicModel<B>,
    {
        optim.validate()?;
        anyhow::ensure!(self.total_steps > 0, "total_steps must be positive");
        Ok(Reptile {
            model,
            config: self.clone(),
            inner: build_inner_optimizer(),
            optim,
            outer_steps: 0,
            loss,
        })
    }
}

impl<B, M, O> Reptile<B, M, O>
where
    B: AutodiffBackend,
    M: crate::model::EpisodicModel<B>,
    O: Optimizer<M, B>,
{
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Linearly decayed interpolation rate for the current outer step.
    fn interpolation_rate(&self) -> f64 {
        let remaining = 1.0 - self.outer_steps as f64 / self.config.total_steps as f64;
        (self.optim.outer_learning_rate * remaining).max(0.0)
    }
}

impl<B, M, O> MetaLearner<B> for Reptile<B, M, O>
where
    B: AutodiffBackend,
    M: crate::model::EpisodicModel<B>,
    O: Optimizer<M, B>,
{
    fn meta_learn(&mut self, batch: &EpisodeBatch<B>, phase: Phase) -> anyhow::Result<EpisodeOutput> {
        let device = batch.inputs.device();
        let (support, support_labels, query, query_labels) =
            split_support_query(&batch.inputs, &batch.labels)?;
        let support_label_tensor = label_tensor::<B>(&support_labels, &device);

        let snapshot = ParamSnapshot::capture(&self.model);
        let steps = if phase.is_train() {
            self.config.train_update_steps
        } else {
            self.config.test_update_steps
        };

        for _ in 0..steps {
            let logits = self
                .model
                .forward(support.clone(), self.model.max_classes(), false);
            let support_error = self.loss.forward(logits, support_label_tensor.clone());
            let grads = GradientsParams::from_grads(support_error.backward(), &self.model);
            self.model = self.inner.step(
                self.optim.inner_learning_rate,
                self.model.clone(),
                grads,
            );
        }

        let query_label_tensor = label_tensor::<B>(&query_labels, &device);
        let logits = self
            .model
            .forward(query, self.model.max_classes(), false);
        let query_error = self.loss.forward(logits.clone(), query_label_tensor.clone());

        let mut metrics = StepMetrics::new();
        let error: f64 = query_error.into_scalar().elem();
        metrics.insert("query_error".into(), error);
        metrics.insert("query_accuracy".into(), accuracy(logits, query_label_tensor));

        match phase {
            Phase::Train => {
                let rate = self.interpolation_rate();
                self.model = snapshot.interpolate(self.model.clone(), rate);
                self.outer_steps += 1;
                metrics.insert("learning_rate".into(), rate);
            }
            Phase::Validation => {
                self.model = snapshot.restore(self.model.clone());
            }
        }

        Ok(EpisodeOutput { metrics, grads: None })
    }

    fn apply_outer(&mut self, _grads: GradientsParams) -> anyhow::Result<()> {
        // The outer update happens inside `meta_learn` via interpolation.
        Ok(())
    }

    fn save_checkpoint(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(dir.join("model"), &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save model checkpoint: {e}"))?;
        CheckpointMeta { algorithm: "reptile", outer_steps: self.outer_steps }.write(dir)
    }
}
