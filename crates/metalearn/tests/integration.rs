//! End-to-end episode scenarios driving the public algorithm API.

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::prelude::*;
use burn::tensor::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;

use metalearn::algorithms::{
    FsclConfig, MetaLearner, OmlConfig, OptimConfig, Phase, ReptileConfig, VanillaMamlConfig,
};
use metalearn::batch::EpisodeBatch;
use metalearn::loss::ClassificationLoss;
use metalearn::model::{EpisodicModel, WordClassifier, WordClassifierConfig};
use metalearn::trainer::{self, EpisodeSource, TrainLoopConfig};

type B = Autodiff<NdArray<f32>>;

const CHANNELS: usize = 2;
const FRAMES: usize = 4;

fn small_model(n_way: usize) -> WordClassifier<B> {
    let device = Default::default();
    WordClassifierConfig::new(CHANNELS, n_way)
        .with_embedding_dim(8)
        .with_hidden_dim(4)
        .init(&device)
}

fn optim() -> OptimConfig {
    OptimConfig::new(0.05, 0.01)
}

/// Support-first episode: each midpoint half holds `k_shot` contiguous rows
/// per class, the layout the episode sampler produces.
fn episode(n_way: usize, k_shot: usize) -> EpisodeBatch<B> {
    let device = Default::default();
    let mut labels = Vec::new();
    let mut offsets = Vec::new();
    for _half in 0..2 {
        for class in 0..n_way {
            for _ in 0..k_shot {
                labels.push(class as i64);
                offsets.push(class as f32 * 2.0);
            }
        }
    }
    let n = labels.len();
    let offset = Tensor::<B, 3>::from_data(
        burn::tensor::TensorData::new(offsets, [n, 1, 1]),
        &device,
    );
    let noise = Tensor::<B, 3>::random(
        [n, CHANNELS, FRAMES],
        Distribution::Normal(0.0, 0.1),
        &device,
    );
    EpisodeBatch::new(noise + offset, labels).unwrap()
}

fn fixed_probe() -> Tensor<B, 3> {
    let device = Default::default();
    Tensor::ones([2, CHANNELS, FRAMES], &device)
}

#[test]
fn fscl_curriculum_produces_per_stage_metrics() {
    // Four classes, two examples each: curriculum {0,1}, {2}, {3} with head
    // sizes 2, 3, 4, then a query evaluation over all four classes.
    let mut learner = FsclConfig::new(2, 1, 2, 1, 1)
        .init(
            small_model(4),
            optim(),
            Box::new(ClassificationLoss::new()),
            StdRng::seed_from_u64(7),
        )
        .unwrap();

    let batch = episode(4, 1);
    let output = learner.meta_learn(&batch, Phase::Train).unwrap();

    for key in [
        "step_0_inner_accuracy",
        "step_1_inner_accuracy",
        "step_2_inner_accuracy",
        "quick_update_inner_accuracy",
        "query_error",
        "query_accuracy",
    ] {
        assert!(output.metrics.contains_key(key), "missing metric {key}");
    }
    assert!(!output.metrics.contains_key("step_3_inner_accuracy"));
    assert!(output.grads.is_some(), "training episodes must yield meta-gradients");

    let error = output.metrics["query_error"];
    assert!(error.is_finite() && error > 0.0);
}

#[test]
fn fscl_validation_returns_no_gradients() {
    let mut learner = FsclConfig::new(2, 1, 2, 1, 1)
        .init(
            small_model(4),
            optim(),
            Box::new(ClassificationLoss::new()),
            StdRng::seed_from_u64(3),
        )
        .unwrap();

    let output = learner.meta_learn(&episode(4, 1), Phase::Validation).unwrap();
    assert!(output.grads.is_none());
    assert!(output.metrics.contains_key("query_accuracy"));
}

#[test]
fn fscl_rejects_more_classes_than_head_capacity() {
    let mut learner = FsclConfig::new(2, 1, 2, 1, 1)
        .init(
            small_model(3),
            optim(),
            Box::new(ClassificationLoss::new()),
            StdRng::seed_from_u64(0),
        )
        .unwrap();

    let err = learner.meta_learn(&episode(4, 1), Phase::Train).unwrap_err();
    assert!(err.to_string().contains("head capacity"), "got: {err}");
}

#[test]
fn quick_adapt_toggle_controls_rehearsal_metric() {
    let mut learner = FsclConfig::new(2, 1, 1, 1, 1)
        .with_quick_adapt(false)
        .init(
            small_model(4),
            optim(),
            Box::new(ClassificationLoss::new()),
            StdRng::seed_from_u64(1),
        )
        .unwrap();

    let output = learner.meta_learn(&episode(4, 1), Phase::Train).unwrap();
    assert!(!output.metrics.contains_key("quick_update_inner_accuracy"));
}

#[test]
fn maml_training_step_applies_outer_update() {
    let mut learner = VanillaMamlConfig::new(2, 3)
        .init::<B, _>(
            small_model(3),
            optim(),
            Box::new(ClassificationLoss::new()),
            None,
        )
        .unwrap();

    let before = learner
        .model()
        .forward(fixed_probe(), 3, false)
        .into_data();

    let metrics = learner.training_step(&episode(3, 2)).unwrap();
    assert!(metrics.contains_key("train_query_error"));
    assert!(metrics.contains_key("train_query_accuracy"));

    let after = learner
        .model()
        .forward(fixed_probe(), 3, false)
        .into_data();
    assert_ne!(
        before.to_vec::<f32>().unwrap(),
        after.to_vec::<f32>().unwrap(),
        "outer Adam step must move the meta-parameters"
    );
}

#[test]
fn maml_validation_leaves_model_untouched() {
    let mut learner = VanillaMamlConfig::new(1, 4)
        .init::<B, _>(
            small_model(3),
            optim(),
            Box::new(ClassificationLoss::new()),
            None,
        )
        .unwrap();

    let before = learner.model().forward(fixed_probe(), 3, false).into_data();
    let metrics = learner.validation_step(&episode(3, 2)).unwrap();
    assert!(metrics.contains_key("validation_query_error"));

    let after = learner.model().forward(fixed_probe(), 3, false).into_data();
    assert_eq!(
        before.to_vec::<f32>().unwrap(),
        after.to_vec::<f32>().unwrap(),
        "validation adapts a clone, never the meta-parameters"
    );
}

#[test]
fn reptile_training_interpolates_and_logs_rate() {
    let mut learner = ReptileConfig::new(2, 2, 100)
        .init::<B, _>(small_model(3), optim(), Box::new(ClassificationLoss::new()))
        .unwrap();

    let before = learner.model().forward(fixed_probe(), 3, false).into_data();
    let metrics = learner.training_step(&episode(3, 2)).unwrap();

    // First step uses the undecayed rate.
    assert!((metrics["train_learning_rate"] - 0.01).abs() < 1e-12);

    let after = learner.model().forward(fixed_probe(), 3, false).into_data();
    assert_ne!(
        before.to_vec::<f32>().unwrap(),
        after.to_vec::<f32>().unwrap(),
        "interpolation must pull the weights toward the adapted state"
    );

    // The rate decays linearly with the outer-step count.
    let mut later = metrics;
    for _ in 0..4 {
        later = learner.training_step(&episode(3, 2)).unwrap();
    }
    let expected = 0.01 * (1.0 - 4.0 / 100.0);
    assert!((later["train_learning_rate"] - expected).abs() < 1e-12);
}

#[test]
fn reptile_validation_restores_weights_bit_identically() {
    let mut learner = ReptileConfig::new(2, 3, 100)
        .init::<B, _>(small_model(3), optim(), Box::new(ClassificationLoss::new()))
        .unwrap();

    let before = learner.model().forward(fixed_probe(), 3, false).into_data();
    learner.validation_step(&episode(3, 2)).unwrap();
    let after = learner.model().forward(fixed_probe(), 3, false).into_data();

    assert_eq!(
        before.to_vec::<f32>().unwrap(),
        after.to_vec::<f32>().unwrap(),
        "eval-mode adaptation must not leak into the trained weights"
    );
}

#[test]
fn oml_runs_uniform_curriculum() {
    let mut learner = OmlConfig::new(2, 1, 2, 1)
        .init(
            small_model(4),
            optim(),
            Box::new(ClassificationLoss::new()),
            StdRng::seed_from_u64(8),
        )
        .unwrap();

    let output = learner.meta_learn(&episode(4, 1), Phase::Train).unwrap();
    for key in ["step_0_inner_accuracy", "step_1_inner_accuracy", "step_2_inner_accuracy"] {
        assert!(output.metrics.contains_key(key), "missing metric {key}");
    }
    assert!(!output.metrics.contains_key("quick_update_inner_accuracy"));
    assert!(output.grads.is_some());
}

struct RandomEpisodes {
    n_way: usize,
    k_shot: usize,
}

impl EpisodeSource<B> for RandomEpisodes {
    fn next_episode(&mut self) -> anyhow::Result<EpisodeBatch<B>> {
        Ok(episode(self.n_way, self.k_shot))
    }
}

#[test]
fn training_loop_checkpoints_fscl() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainLoopConfig::new()
        .with_total_episodes(4)
        .with_log_interval(2)
        .with_val_interval(2)
        .with_val_episodes(1)
        .with_checkpoint_interval(0)
        .with_checkpoint_dir(dir.path().to_string_lossy().into_owned());

    let learner = FsclConfig::new(2, 1, 1, 1, 1)
        .init(
            small_model(4),
            optim(),
            Box::new(ClassificationLoss::new()),
            StdRng::seed_from_u64(2),
        )
        .unwrap();

    let mut source = RandomEpisodes { n_way: 4, k_shot: 1 };
    let mut val_source = RandomEpisodes { n_way: 4, k_shot: 1 };

    let (_, report) =
        trainer::train(&config, learner, &mut source, Some(&mut val_source)).unwrap();
    assert_eq!(report.episodes, 4);
    assert!(report.best_validation_error.is_some());
    assert!(dir.path().join("best").join("meta.json").is_file());

    let meta: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("final").join("meta.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(meta["algorithm"], "fscl");
    assert_eq!(meta["outer_steps"], 4);
}
