//! Episode-driven training loop.
//!
//! Ties an episode source and a [`MetaLearner`] together: serialized
//! training steps, periodic validation sweeps, interval logging via running
//! averages, and checkpointing with best-model tracking on
//! `validation_query_error`.

use std::path::Path;
use std::time::Instant;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::algorithms::MetaLearner;
use crate::batch::EpisodeBatch;
use crate::metrics::MetricAverage;

/// Blocking episode provider. Prefetching or worker pools live behind this
/// boundary; the loop itself never blocks on anything else.
pub trait EpisodeSource<B: AutodiffBackend> {
    fn next_episode(&mut self) -> anyhow::Result<EpisodeBatch<B>>;
}

/// Configuration for the training loop.
#[derive(Config, Debug)]
pub struct TrainLoopConfig {
    /// Total training episodes.
    #[config(default = 10_000)]
    pub total_episodes: usize,
    /// Episodes between metric logging.
    #[config(default = 100)]
    pub log_interval: usize,
    /// Episodes between validation sweeps.
    #[config(default = 500)]
    pub val_interval: usize,
    /// Validation episodes per sweep.
    #[config(default = 20)]
    pub val_episodes: usize,
    /// Episodes between checkpoint saves.
    #[config(default = 1_000)]
    pub checkpoint_interval: usize,
    /// Directory for saving checkpoints.
    #[config(default = "String::from(\"checkpoints\")")]
    pub checkpoint_dir: String,
}

/// Aggregate outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub episodes: usize,
    pub best_validation_error: Option<f64>,
    pub best_episode: Option<usize>,
}

fn run_validation<B, L, S>(
    learner: &mut L,
    source: &mut S,
    episodes: usize,
) -> anyhow::Result<MetricAverage>
where
    B: AutodiffBackend,
    L: MetaLearner<B>,
    S: EpisodeSource<B>,
{
    let mut average = MetricAverage::new();
    for _ in 0..episodes {
        let batch = source.next_episode()?;
        average.update(&learner.validation_step(&batch)?);
    }
    Ok(average)
}

/// Run the training loop to completion.
///
/// Validation sweeps draw from `val_source` when given and never apply an
/// outer update. The checkpoint layout is one directory per save:
/// `episode_{n}/`, `best/`, and `final/`, each holding the model record and
/// a small metadata file written by the algorithm.
pub fn train<B, L, S>(
    config: &TrainLoopConfig,
    mut learner: L,
    source: &mut S,
    mut val_source: Option<&mut S>,
) -> anyhow::Result<(L, TrainReport)>
where
    B: AutodiffBackend,
    L: MetaLearner<B>,
    S: EpisodeSource<B>,
{
    std::fs::create_dir_all(&config.checkpoint_dir)?;
    let checkpoint_dir = Path::new(&config.checkpoint_dir);

    let train_start = Instant::now();
    let mut running = MetricAverage::new();
    let mut best_validation_error: Option<f64> = None;
    let mut best_episode: Option<usize> = None;

    for episode in 0..config.total_episodes {
        let batch = source.next_episode()?;
        running.update(&learner.training_step(&batch)?);

        if config.log_interval > 0 && episode % config.log_interval == 0 {
            let elapsed = train_start.elapsed().as_secs_f64();
            let remaining = if episode > 0 {
                elapsed * (config.total_episodes - episode) as f64 / episode as f64
            } else {
                0.0
            };
            let eta = if remaining < 60.0 {
                format!("{remaining:.0}s")
            } else if remaining < 3600.0 {
                format!("{:.0}m", remaining / 60.0)
            } else {
                format!("{:.1}h", remaining / 3600.0)
            };
            tracing::info!(episode, eta, "avg({}) {}", running.count(), running.display());
            running.reset();
        }

        if let Some(val) = val_source.as_deref_mut() {
            if config.val_interval > 0 && episode > 0 && episode % config.val_interval == 0 {
                let sweep = run_validation(&mut learner, val, config.val_episodes)?;
                tracing::info!(episode, "validation({}) {}", sweep.count(), sweep.display());

                let error = sweep
                    .averages()
                    .and_then(|avg| avg.get("validation_query_error").copied());
                if let Some(error) = error {
                    let improved = best_validation_error.map_or(true, |best| error < best);
                    if improved {
                        best_validation_error = Some(error);
                        best_episode = Some(episode);
                        learner.save_checkpoint(&checkpoint_dir.join("best"))?;
                        tracing::info!(
                            episode,
                            validation_query_error = error,
                            "New best model saved"
                        );
                    }
                }
            }
        }

        if config.checkpoint_interval > 0 && episode > 0 && episode % config.checkpoint_interval == 0
        {
            learner.save_checkpoint(&checkpoint_dir.join(format!("episode_{episode}")))?;
            tracing::info!(episode, "Checkpoint saved");
        }
    }

    learner.save_checkpoint(&checkpoint_dir.join("final"))?;
    let total_time = train_start.elapsed();
    tracing::info!(
        episodes = config.total_episodes,
        best_validation_error,
        best_episode,
        elapsed_secs = format!("{:.1}", total_time.as_secs_f64()),
        "Training loop finished"
    );

    Ok((
        learner,
        TrainReport {
            episodes: config.total_episodes,
            best_validation_error,
            best_episode,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;

    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::optim::GradientsParams;
    use burn::tensor::TensorData;

    use crate::algorithms::{EpisodeOutput, Phase};
    use crate::metrics::StepMetrics;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    /// Learner stub that records how it was driven.
    struct Recorder {
        train_calls: usize,
        validation_calls: usize,
        validation_errors: Vec<f64>,
    }

    impl MetaLearner<TestAutodiffBackend> for Recorder {
        fn meta_learn(
            &mut self,
            _batch: &EpisodeBatch<TestAutodiffBackend>,
            phase: Phase,
        ) -> anyhow::Result<EpisodeOutput> {
            let mut metrics = StepMetrics::new();
            if phase.is_train() {
                self.train_calls += 1;
                metrics.insert("query_error".into(), 1.0);
            } else {
                let error = self.validation_errors[self.validation_calls % self.validation_errors.len()];
                self.validation_calls += 1;
                metrics.insert("query_error".into(), error);
            }
            Ok(EpisodeOutput { metrics, grads: None })
        }

        fn apply_outer(&mut self, _grads: GradientsParams) -> anyhow::Result<()> {
            Ok(())
        }

        fn save_checkpoint(&self, dir: &Path) -> anyhow::Result<()> {
            std::fs::create_dir_all(dir)?;
            Ok(())
        }
    }

    struct ConstantSource;

    impl EpisodeSource<TestAutodiffBackend> for ConstantSource {
        fn next_episode(&mut self) -> anyhow::Result<EpisodeBatch<TestAutodiffBackend>> {
            let device = Default::default();
            let inputs = Tensor::from_data(
                TensorData::new(vec![0.0_f32; 4], [4, 1, 1]),
                &device,
            );
            EpisodeBatch::new(inputs, vec![0, 1, 0, 1])
        }
    }

    #[test]
    fn test_loop_runs_all_episodes_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainLoopConfig::new()
            .with_total_episodes(10)
            .with_log_interval(0)
            .with_val_interval(4)
            .with_val_episodes(2)
            .with_checkpoint_interval(0)
            .with_checkpoint_dir(dir.path().to_string_lossy().into_owned());

        let learner = Recorder {
            train_calls: 0,
            validation_calls: 0,
            validation_errors: vec![0.5, 0.4, 0.3, 0.6],
        };
        let mut source = ConstantSource;
        let mut val_source = ConstantSource;

        let (learner, report) =
            train(&config, learner, &mut source, Some(&mut val_source)).unwrap();
        assert_eq!(learner.train_calls, 10);
        // Sweeps at episodes 4 and 8, two episodes each.
        assert_eq!(learner.validation_calls, 4);
        assert_eq!(report.episodes, 10);
        // First sweep averages (0.5 + 0.4) / 2, second (0.3 + 0.6) / 2.
        assert_eq!(report.best_validation_error, Some(0.45));
        assert_eq!(report.best_episode, Some(4));
        assert!(dir.path().join("best").is_dir());
        assert!(dir.path().join("final").is_dir());
    }

    #[test]
    fn test_checkpoint_intervals() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainLoopConfig::new()
            .with_total_episodes(6)
            .with_log_interval(0)
            .with_val_interval(0)
            .with_checkpoint_interval(2)
            .with_checkpoint_dir(dir.path().to_string_lossy().into_owned());

        let learner = Recorder {
            train_calls: 0,
            validation_calls: 0,
            validation_errors: vec![1.0],
        };
        let mut source = ConstantSource;

        let (_, report) = train(&config, learner, &mut source, None).unwrap();
        assert_eq!(report.best_validation_error, None);
        assert!(dir.path().join("episode_2").is_dir());
        assert!(dir.path().join("episode_4").is_dir());
        assert!(dir.path().join("final").is_dir());
    }

    #[test]
    fn test_metric_average_keys() {
        let mut avg = MetricAverage::new();
        let mut m = BTreeMap::new();
        m.insert("validation_query_error".to_string(), 0.25);
        avg.update(&m);
        let out = avg.averages().unwrap();
        assert_eq!(out.get("validation_query_error"), Some(&0.25));
    }
}
