//! Online meta-learning: the FSCL curriculum with a frozen encoder in the
//! inner loop, so only the per-class heads adapt quickly.

use std::path::Path;

use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;

use episodes::{class_batches, interleaved_indexes, randomize_labels, unique_labels};

use crate::algorithms::base::{build_outer_optimizer, outer_lr, sgd_adapt, CheckpointMeta, OptimConfig};
use crate::algorithms::fscl::{cap_per_class, QUERY_CAP_PER_CLASS};
use crate::algorithms::{EpisodeOutput, MetaLearner, Phase};
use crate::batch::{gather_rows, label_tensor, split_support_query, EpisodeBatch};
use crate::loss::EpisodeLoss;
use crate::metrics::{accuracy, StepMetrics};

/// Configuration for [`Oml`].
#[derive(Config, Debug)]
pub struct OmlConfig {
    /// Classes introduced in the first curriculum stage.
    pub n_classes_start: usize,
    /// Classes added per subsequent stage.
    pub n_class_additions: usize,
    /// Inner steps per curriculum stage.
    pub training_steps: usize,
    /// Support examples per class.
    pub k_shot: usize,
}

impl OmlConfig {
    pub fn init<B, M>(
        &self,
        model: M,
        optim: OptimConfig,
        loss: Box<dyn EpisodeLoss<B>>,
        rng: StdRng,
    ) -> anyhow::Result<Oml<B, M, impl Optimizer<M, B>>>
    where
        B: AutodiffBackend,
        M: crate::model::EpisodicModel<B>,
    {
        anyhow::ensure!(self.n_classes_start > 0, "n_classes_start must be positive");
        anyhow::ensure!(self.k_shot > 0, "k_shot must be positive");
        optim.validate()?;
        Ok(Oml {
            model,
            config: self.clone(),
            outer: build_outer_optimizer(&optim),
            optim,
            outer_steps: 0,
            loss,
            rng,
        })
    }
}

/// OML meta-learner. Inner steps run with the representation detached
/// (`inner_loop = true` in the model forward); only the final query pass and
/// the outer step see encoder gradients.
pub struct Oml<B, M, O>
where
    B: AutodiffBackend,
{
    model: M,
    config: OmlConfig,
    optim: OptimConfig,
    outer: O,
    outer_steps: usize,
    loss: Box<dyn EpisodeLoss<B>>,
    rng: StdRng,
}

impl<B, M, O> Oml<B, M, O>
where
    B: AutodiffBackend,
    M: crate::model::EpisodicModel<B>,
    O: Optimizer<M, B>,
{
    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<B, M, O> MetaLearner<B> for Oml<B, M, O>
where
    B: AutodiffBackend,
    M: crate::model::EpisodicModel<B>,
    O: Optimizer<M, B>,
{
    fn meta_learn(&mut self, batch: &EpisodeBatch<B>, phase: Phase) -> anyhow::Result<EpisodeOutput> {
        let device = batch.inputs.device();
        let mut labels = batch.labels.clone();
        randomize_labels(&mut labels, &mut self.rng);

        let classes = unique_labels(&labels);
        anyhow::ensure!(
            classes.len() <= self.model.max_classes(),
            "episode has {} classes but the head capacity is {}",
            classes.len(),
            self.model.max_classes()
        );
        let stages = class_batches(&classes, self.config.n_classes_start, self.config.n_class_additions)?;

        let mut learner = self.model.clone();
        let mut metrics = StepMetrics::new();
        let mut query_parts: Vec<Tensor<B, 3>> = Vec::new();
        let mut query_labels: Vec<i64> = Vec::new();
        let mut active = 0;

        for (stage, stage_classes) in stages.iter().enumerate() {
            active += stage_classes.len();
            let indexes = interleaved_indexes(&labels, stage_classes)?;
            let (stage_inputs, stage_labels) = gather_rows(&batch.inputs, &labels, &indexes);
            let (support, support_labels, query, stage_query_labels) =
                split_support_query(&stage_inputs, &stage_labels)?;
            query_parts.push(query);
            query_labels.extend(stage_query_labels);

            let support_label_tensor = label_tensor::<B>(&support_labels, &device);
            for _ in 0..self.config.training_steps {
                let logits = learner.forward(support.clone(), active, true);
                let support_error = self.loss.forward(logits, support_label_tensor.clone());
                learner = sgd_adapt(learner, support_error, self.optim.inner_learning_rate);
            }
            let logits = learner.forward(support.clone(), active, true);
            metrics.insert(
                format!("step_{stage}_inner_accuracy"),
                accuracy(logits, support_label_tensor),
            );
        }

        let all_query = Tensor::cat(query_parts, 0);
        let capped = cap_per_class(&query_labels, QUERY_CAP_PER_CLASS);
        let (final_inputs, final_labels) = gather_rows(&all_query, &query_labels, &capped);
        let final_label_tensor = label_tensor::<B>(&final_labels, &device);
        let logits = learner.forward(final_inputs, active, false);
        let query_error = self.loss.forward(logits.clone(), final_label_tensor.clone());

        let error: f64 = query_error.clone().into_scalar().elem();
        metrics.insert("query_error".into(), error);
        metrics.insert("query_accuracy".into(), accuracy(logits, final_label_tensor));

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
        CheckpointMeta { algorithm: "oml", outer_steps: self.outer_steps }.write(dir)
    }
}
