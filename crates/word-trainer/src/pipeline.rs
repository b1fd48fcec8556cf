//! Wires config, model, episode sources, and the algorithm variants into
//! the training loop.

use std::path::PathBuf;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::tensor::{backend::Backend, Distribution, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

use metalearn::algorithms::maml::Augmentation;
use metalearn::algorithms::{
    FsclConfig, MetaLearner, OmlConfig, ReptileConfig, VanillaMamlConfig,
};
use metalearn::loss::ClassificationLoss;
use metalearn::model::WordClassifierConfig;
use metalearn::trainer::{self, TrainReport};

use crate::config::{self, AlgorithmKind, Overrides, TrainToml};
use crate::dataset::{FeatureDataset, WordEpisodeSource};

type TrainBackend = Autodiff<NdArray<f32>>;

/// Arguments for the `train` subcommand.
pub struct TrainArgs {
    pub config: PathBuf,
    pub dataset: Option<PathBuf>,
    pub val_dataset: Option<PathBuf>,
    pub synthetic_classes: Option<usize>,
    pub synthetic_frames: usize,
    pub total_episodes: Option<usize>,
    pub checkpoint_dir: Option<String>,
    pub seed: Option<u64>,
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let mut toml = config::load_train_toml(&args.config)?;
    config::apply_overrides(
        &mut toml,
        &Overrides {
            total_episodes: args.total_episodes,
            checkpoint_dir: args.checkpoint_dir.clone(),
            seed: args.seed,
        },
    );

    let kind: AlgorithmKind = toml.task.algorithm.parse()?;
    let device = <TrainBackend as Backend>::Device::default();

    let mut source = build_source(&args, &toml, toml.task.seed, false)?;
    let mut val_source = match (&args.dataset, &args.val_dataset, args.synthetic_classes) {
        (_, Some(_), _) | (None, None, Some(_)) => {
            Some(build_source(&args, &toml, toml.task.seed.wrapping_add(1), true)?)
        }
        _ => None,
    };

    let model = WordClassifierConfig::new(toml.model.input_channels, toml.task.n_way)
        .with_embedding_dim(toml.model.embedding_dim)
        .with_hidden_dim(toml.model.hidden_dim)
        .init::<TrainBackend>(&device);
    let optim = toml.optim.to_optim_config();
    let loop_config = toml.train_loop.to_loop_config();
    let algo = &toml.algorithm;
    let algo_rng = StdRng::seed_from_u64(toml.task.seed.wrapping_add(2));

    tracing::info!(
        algorithm = %toml.task.algorithm,
        n_way = toml.task.n_way,
        k_shot = toml.task.k_shot,
        total_episodes = loop_config.total_episodes,
        "Starting training"
    );

    let report = match kind {
        AlgorithmKind::VanillaMaml => {
            let augmentation = algo.augment_noise_std.map(noise_augmentation);
            let learner = VanillaMamlConfig::new(algo.train_update_steps, algo.test_update_steps)
                .with_first_order(algo.first_order)
                .init(model, optim, Box::new(ClassificationLoss::new()), augmentation)?;
            run(loop_config, learner, &mut source, val_source.as_mut())?
        }
        AlgorithmKind::Reptile => {
            let total_steps = algo.total_steps.unwrap_or(loop_config.total_episodes);
            let learner = ReptileConfig::new(
                algo.train_update_steps,
                algo.test_update_steps,
                total_steps,
            )
            .init(model, optim, Box::new(ClassificationLoss::new()))?;
            run(loop_config, learner, &mut source, val_source.as_mut())?
        }
        AlgorithmKind::Fscl => {
            let learner = FsclConfig::new(
                algo.n_classes_start,
                algo.n_class_additions,
                algo.initial_training_steps,
                algo.training_steps,
                toml.task.k_shot,
            )
            .with_quick_adapt(algo.quick_adapt)
            .init(model, optim, Box::new(ClassificationLoss::new()), algo_rng)?;
            run(loop_config, learner, &mut source, val_source.as_mut())?
        }
        AlgorithmKind::Oml => {
            let learner = OmlConfig::new(
                algo.n_classes_start,
                algo.n_class_additions,
                algo.training_steps,
                toml.task.k_shot,
            )
            .init(model, optim, Box::new(ClassificationLoss::new()), algo_rng)?;
            run(loop_config, learner, &mut source, val_source.as_mut())?
        }
    };

    tracing::info!(
        episodes = report.episodes,
        best_validation_error = report.best_validation_error,
        "Training run complete"
    );
    Ok(())
}

fn run<L>(
    config: metalearn::trainer::TrainLoopConfig,
    learner: L,
    source: &mut WordEpisodeSource<TrainBackend>,
    val_source: Option<&mut WordEpisodeSource<TrainBackend>>,
) -> anyhow::Result<TrainReport>
where
    L: MetaLearner<TrainBackend>,
{
    let (_, report) = trainer::train(&config, learner, source, val_source)?;
    Ok(report)
}

fn noise_augmentation(std: f64) -> Augmentation<TrainBackend> {
    Box::new(move |inputs: Tensor<TrainBackend, 3>| {
        let noise = inputs.random_like(Distribution::Normal(0.0, std));
        inputs + noise
    })
}

/// Build an episode source from a dataset path or the synthetic pool.
fn build_source(
    args: &TrainArgs,
    toml: &TrainToml,
    seed: u64,
    validation: bool,
) -> anyhow::Result<WordEpisodeSource<TrainBackend>> {
    let device = <TrainBackend as Backend>::Device::default();
    let rng = StdRng::seed_from_u64(seed);

    let path = if validation {
        args.val_dataset.as_ref().or(args.dataset.as_ref())
    } else {
        args.dataset.as_ref()
    };

    match (path, args.synthetic_classes) {
        (Some(path), _) => {
            let dataset = FeatureDataset::load(path)?;
            anyhow::ensure!(
                dataset.channels() == toml.model.input_channels,
                "dataset {} has {} channels but the model expects {}",
                path.display(),
                dataset.channels(),
                toml.model.input_channels
            );
            WordEpisodeSource::sampled(dataset, toml.task.n_way, toml.task.k_shot, rng, device)
        }
        (None, Some(n_classes)) => WordEpisodeSource::synthetic(
            n_classes,
            toml.task.n_way,
            toml.task.k_shot,
            toml.model.input_channels,
            args.synthetic_frames,
            rng,
            device,
        ),
        (None, None) => anyhow::bail!("either --dataset or --synthetic-classes is required"),
    }
}
