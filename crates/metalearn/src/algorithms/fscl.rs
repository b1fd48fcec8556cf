//! Few-shot continual learning: a class-incremental curriculum inside each
//! episode, with an optional one-shot rehearsal pass before evaluation.

use std::path::Path;

use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;

use episodes::{class_batches, interleaved_indexes, randomize_labels, unique_labels};

use crate::algorithms::base::{build_outer_optimizer, outer_lr, sgd_adapt, CheckpointMeta, OptimConfig};
use crate::algorithms::{EpisodeOutput, MetaLearner, Phase};
use crate::batch::{gather_rows, label_tensor, split_support_query, EpisodeBatch};
use crate::loss::EpisodeLoss;
use crate::metrics::{accuracy, StepMetrics};

/// Maximum query examples per class in the final evaluation.
pub(crate) const QUERY_CAP_PER_CLASS: usize = 5;

/// Configuration for [`Fscl`].
#[derive(Config, Debug)]
pub struct FsclConfig {
    /// Classes introduced in the first curriculum stage.
    pub n_classes_start: usize,
    /// Classes added per subsequent stage.
    pub n_class_additions: usize,
    /// Inner steps for the first stage.
    pub initial_training_steps: usize,
    /// Inner steps for every later stage.
    pub training_steps: usize,
    /// Support examples per class; also the stride used to pick one
    /// rehearsal example per class out of each stage's support set.
    pub k_shot: usize,
    /// Run one extra adaptation step over the rehearsal buffer before the
    /// final evaluation.
    #[config(default = true)]
    pub quick_adapt: bool,
}

impl FsclConfig {
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.n_classes_start > 0, "n_classes_start must be positive");
        anyhow::ensure!(self.k_shot > 0, "k_shot must be positive");
        Ok(())
    }

    pub fn init<B, M>(
        &self,
        model: M,
        optim: OptimConfig,
        loss: Box<dyn EpisodeLoss<B>>,
        rng: StdRng,
    ) -> anyhow::Result<Fscl<B, M, impl Optimizer<M, B>>>
    where
        B: AutodiffBackend,
        M: crate::model::EpisodicModel<B>,
    {
        self.validate()?;
        optim.validate()?;
        Ok(Fscl {
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

/// FSCL meta-learner. Each episode randomizes labels, walks a growing-head
/// class curriculum, optionally rehearses one stored example per class, and
/// scores a query set capped at [`QUERY_CAP_PER_CLASS`] examples per class.
pub struct Fscl<B, M, O>
where
    B: AutodiffBackend,
{
    model: M,
    config: FsclConfig,
    optim: OptimConfig,
    outer: O,
    outer_steps: usize,
    loss: Box<dyn EpisodeLoss<B>>,
    rng: StdRng,
}

/// Positions of the first `cap` occurrences of every distinct label.
pub(crate) fn cap_per_class(labels: &[i64], cap: usize) -> Vec<usize> {
    let mut picked = Vec::new();
    for class in unique_labels(labels) {
        picked.extend(
            labels
                .iter()
                .enumerate()
                .filter(|(_, &l)| l == class)
                .map(|(i, _)| i)
                .take(cap),
        );
    }
    picked
}

impl<B, M, O> Fscl<B, M, O>
where
    B: AutodiffBackend,
    M: crate::model::EpisodicModel<B>,
    O: Optimizer<M, B>,
{
    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<B, M, O> MetaLearner<B> for Fscl<B, M, O>
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
        let mut rehearsal_parts: Vec<Tensor<B, 3>> = Vec::new();
        let mut rehearsal_labels: Vec<i64> = Vec::new();
        let mut active = 0;

        for (stage, stage_classes) in stages.iter().enumerate() {
            let indexes = interleaved_indexes(&labels, stage_classes)?;
            let (stage_inputs, stage_labels) = gather_rows(&batch.inputs, &labels, &indexes);
            let (support, support_labels, query, stage_query_labels) =
                split_support_query(&stage_inputs, &stage_labels)?;
            query_parts.push(query);
            query_labels.extend(stage_query_labels);

            // One example per class: support runs are k_shot long per class.
            let stride: Vec<usize> = (0..support_labels.len())
                .step_by(self.config.k_shot)
                .collect();
            let (kept, kept_labels) = gather_rows(&support, &support_labels, &stride);
            rehearsal_parts.push(kept);
            rehearsal_labels.extend(kept_labels);

            active += stage_classes.len();
            let steps = if stage == 0 {
                self.config.initial_training_steps
            } else {
                self.config.training_steps
            };
            let support_label_tensor = label_tensor::<B>(&support_labels, &device);
            for _ in 0..steps {
                let logits = learner.forward(support.clone(), active, false);
                let support_error = self.loss.forward(logits, support_label_tensor.clone());
                learner = sgd_adapt(learner, support_error, self.optim.inner_learning_rate);
            }
            let logits = learner.forward(support.clone(), active, false);
            metrics.insert(
                format!("step_{stage}_inner_accuracy"),
                accuracy(logits, support_label_tensor),
            );
        }

        if self.config.quick_adapt {
            let rehearsal = Tensor::cat(rehearsal_parts, 0);
            let rehearsal_label_tensor = label_tensor::<B>(&rehearsal_labels, &device);
            let logits = learner.forward(rehearsal, active, false);
            metrics.insert(
                "quick_update_inner_accuracy".into(),
                accuracy(logits.clone(), rehearsal_label_tensor.clone()),
            );
            let rehearsal_error = self.loss.forward(logits, rehearsal_label_tensor);
            learner = sgd_adapt(learner, rehearsal_error, self.optim.inner_learning_rate);
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
        CheckpointMeta { algorithm: "fscl", outer_steps: self.outer_steps }.write(dir)
    }
}
