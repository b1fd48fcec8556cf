//! Single-task-batch MAML: clone, adapt on support, evaluate on query.

use std::path::Path;

use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;

use crate::algorithms::base::{build_outer_optimizer, outer_lr, sgd_adapt, CheckpointMeta, OptimConfig};
use crate::algorithms::{EpisodeOutput, MetaLearner, Phase};
use crate::batch::{label_tensor, split_support_query, EpisodeBatch};
use crate::loss::EpisodeLoss;
use crate::metrics::{accuracy, StepMetrics};

/// Optional input transform applied to support examples in training mode.
pub type Augmentation<B> = Box<dyn Fn(Tensor<B, 3>) -> Tensor<B, 3> + Send>;

/// Configuration for [`VanillaMaml`].
#[derive(Config, Debug)]
pub struct VanillaMamlConfig {
    /// Inner adaptation steps per training episode.
    pub train_update_steps: usize,
    /// Inner adaptation steps per validation episode. Validation has its own
    /// count, independent of `train_update_steps`, so evaluation can adapt
    /// for more (or fewer) steps than training does.
    pub test_update_steps: usize,
    /// Whether inner-loop gradients are excluded from the outer step.
    ///
    /// Adaptation here is always first-order (optimizer steps do not build a
    /// higher-order graph); requesting second order logs a warning at setup.
    #[config(default = true)]
    pub first_order: bool,
}

/// MAML with a cloned fast learner per episode and an Adam outer update.
pub struct VanillaMaml<B, M, O>
where
    B: AutodiffBackend,
{
    model: M,
    config: VanillaMamlConfig,
    optim: OptimConfig,
    outer: O,
    outer_steps: usize,
    loss: Box<dyn EpisodeLoss<B>>,
    augmentation: Option<Augmentation<B>>,
}

impl VanillaMamlConfig {
    /// Build the algorithm around `model`.
    pub fn init<B, M>(
        &self,
        model: M,
        optim: OptimConfig,
        loss: Box<dyn EpisodeLoss<B>>,
        augmentation: Option<Augmentation<B>>,
    ) -> anyhow::Result<VanillaMaml<B, M, impl Optimizer<M, B>>>
    where
        B: AutodiffBackend,
        M: crate::model::EpisodicModel<B>,
    {
        optim.validate()?;
        if !self.first_order {
            tracing::warn!(
                "second-order MAML is not supported by the optimizer-step adaptation; \
                 falling back to the first-order approximation"
            );
        }
        Ok(VanillaMaml {
            model,
            config: self.clone(),
            outer: build_outer_optimizer(&optim),
            optim,
            outer_steps: 0,
            loss,
            augmentation,
        })
    }
}

impl<B, M, O> VanillaMaml<B, M, O>
where
    B: AutodiffBackend,
    M: crate::model::EpisodicModel<B>,
    O: Optimizer<M, B>,
{
    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<B, M, O> MetaLearner<B> for VanillaMaml<B, M, O>
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

        let mut learner = self.model.clone();
        let steps = if phase.is_train() {
            self.config.train_update_steps
        } else {
            self.config.test_update_steps
        };

        for _ in 0..steps {
            let inputs = match (&self.augmentation, phase) {
                (Some(augment), Phase::Train) => augment(support.clone()),
                _ => support.clone(),
            };
            let logits = learner.forward(inputs, learner.max_classes(), false);
            let support_error = self
                .loss
                .forward(logits, support_label_tensor.clone());
            learner = sgd_adapt(learner, support_error, self.optim.inner_learning_rate);
        }

        let query_label_tensor = label_tensor::<B>(&query_labels, &device);
        let logits = learner.forward(query, learner.max_classes(), false);
        let query_error = self.loss.forward(logits.clone(), query_label_tensor.clone());

        let mut metrics = StepMetrics::new();
        let error: f64 = query_error.clone().into_scalar().elem();
        metrics.insert("query_error".into(), error);
        metrics.insert("query_accuracy".into(), accuracy(logits, query_label_tensor));

        let grads = phase
            .is_train()
            .then(|| GradientsParams::from_grads(query_error.backward(), &learner));
        Ok(EpisodeOutput { metrics, grads })
    }

    fn apply_outer(&mut self, grads: GradientsParams) -> anyhow::Result<()> {
        let lr = outer_lr(&self.optim, self.outer_steps);
        self.model = self.outer.step(lr, self.model.clone(), grads);
        self.outer_steps += 1;
        Ok(())
    }

    fn save_checkpoint(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(dir.join("model"), &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save model checkpoint: {e}"))?;
        CheckpointMeta { algorithm: "vanilla_maml", outer_steps: self.outer_steps }.write(dir)
    }
}
