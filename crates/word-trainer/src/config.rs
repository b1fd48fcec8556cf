//! TOML config loading for the training CLI.
//!
//! Deserializes a config file with `[task]`, `[model]`, `[algorithm]`,
//! `[optim]`, and `[loop]` sections, then merges with CLI overrides.

use std::path::Path;
use std::str::FromStr;

use metalearn::algorithms::OptimConfig;
use metalearn::trainer::TrainLoopConfig;
use serde::Deserialize;

/// Which algorithm variant to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    VanillaMaml,
    Reptile,
    Fscl,
    Oml,
}

impl FromStr for AlgorithmKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "vanilla_maml" | "maml" => Ok(Self::VanillaMaml),
            "reptile" => Ok(Self::Reptile),
            "fscl" => Ok(Self::Fscl),
            "oml" => Ok(Self::Oml),
            other => anyhow::bail!(
                "unsupported algorithm {other:?}; expected vanilla_maml, reptile, fscl, or oml"
            ),
        }
    }
}

/// Top-level structure matching the training TOML file.
#[derive(Debug, Deserialize)]
pub struct TrainToml {
    /// Task shape: algorithm, episode layout, seeding.
    pub task: TaskSection,
    /// Model architecture parameters.
    pub model: ModelSection,
    /// Per-algorithm step counts and switches.
    #[serde(default)]
    pub algorithm: AlgorithmSection,
    /// Inner/outer optimizer parameters.
    pub optim: OptimSection,
    /// Training loop schedule.
    #[serde(default, rename = "loop")]
    pub train_loop: LoopSection,
}

#[derive(Debug, Deserialize)]
pub struct TaskSection {
    /// Algorithm name: vanilla_maml, reptile, fscl, or oml.
    pub algorithm: String,
    /// Classes per episode.
    pub n_way: usize,
    /// Support examples per class per episode.
    pub k_shot: usize,
    /// RNG seed for episode sampling and label randomization.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Deserialize)]
pub struct ModelSection {
    /// Feature channels per frame (e.g. mel filterbank bins).
    pub input_channels: usize,
    /// Embedding dimension between encoder and head.
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    /// Encoder convolution width.
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,
}

fn default_embedding_dim() -> usize {
    128
}

fn default_hidden_dim() -> usize {
    64
}

/// Algorithm hyperparameters. Each variant reads the subset it understands.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AlgorithmSection {
    /// Inner steps per training episode (MAML, Reptile).
    pub train_update_steps: usize,
    /// Inner steps per validation episode (MAML, Reptile).
    pub test_update_steps: usize,
    /// First-order approximation switch (MAML).
    pub first_order: bool,
    /// Inner steps for the first curriculum stage (FSCL).
    pub initial_training_steps: usize,
    /// Inner steps per curriculum stage (FSCL after the first, OML).
    pub training_steps: usize,
    /// Classes in the first curriculum stage (FSCL, OML).
    pub n_classes_start: usize,
    /// Classes added per stage (FSCL, OML).
    pub n_class_additions: usize,
    /// One rehearsal step over the stored examples (FSCL).
    pub quick_adapt: bool,
    /// Reptile interpolation horizon; defaults to `loop.total_episodes`.
    pub total_steps: Option<usize>,
    /// Gaussian noise added to support inputs during training (MAML).
    pub augment_noise_std: Option<f64>,
}

impl Default for AlgorithmSection {
    fn default() -> Self {
        Self {
            train_update_steps: 5,
            test_update_steps: 10,
            first_order: true,
            initial_training_steps: 5,
            training_steps: 3,
            n_classes_start: 2,
            n_class_additions: 1,
            quick_adapt: true,
            total_steps: None,
            augment_noise_std: None,
        }
    }
}

/// The learning rates are required; deserialization fails without them.
#[derive(Debug, Deserialize)]
pub struct OptimSection {
    pub inner_learning_rate: f64,
    pub outer_learning_rate: f64,
    #[serde(default)]
    pub scheduler: bool,
    #[serde(default = "default_scheduler_step")]
    pub scheduler_step: usize,
    #[serde(default = "default_scheduler_decay")]
    pub scheduler_decay: f64,
    #[serde(default = "default_gradient_clip_val")]
    pub gradient_clip_val: f32,
}

fn default_scheduler_step() -> usize {
    1000
}

fn default_scheduler_decay() -> f64 {
    0.5
}

fn default_gradient_clip_val() -> f32 {
    1.0
}

impl OptimSection {
    pub fn to_optim_config(&self) -> OptimConfig {
        OptimConfig::new(self.inner_learning_rate, self.outer_learning_rate)
            .with_scheduler(self.scheduler)
            .with_scheduler_step(self.scheduler_step)
            .with_scheduler_decay(self.scheduler_decay)
            .with_gradient_clip_val(self.gradient_clip_val)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoopSection {
    pub total_episodes: usize,
    pub log_interval: usize,
    pub val_interval: usize,
    pub val_episodes: usize,
    pub checkpoint_interval: usize,
    pub checkpoint_dir: String,
}

impl Default for LoopSection {
    fn default() -> Self {
        Self {
            total_episodes: 10_000,
            log_interval: 100,
            val_interval: 500,
            val_episodes: 20,
            checkpoint_interval: 1_000,
            checkpoint_dir: "checkpoints".to_string(),
        }
    }
}

impl LoopSection {
    pub fn to_loop_config(&self) -> TrainLoopConfig {
        TrainLoopConfig::new()
            .with_total_episodes(self.total_episodes)
            .with_log_interval(self.log_interval)
            .with_val_interval(self.val_interval)
            .with_val_episodes(self.val_episodes)
            .with_checkpoint_interval(self.checkpoint_interval)
            .with_checkpoint_dir(self.checkpoint_dir.clone())
    }
}

/// Load and deserialize a `TrainToml` from a TOML file.
pub fn load_train_toml(path: &Path) -> anyhow::Result<TrainToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let config: TrainToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded training config");
    Ok(config)
}

/// CLI overrides applied on top of the TOML values.
#[derive(Debug, Default)]
pub struct Overrides {
    pub total_episodes: Option<usize>,
    pub checkpoint_dir: Option<String>,
    pub seed: Option<u64>,
}

pub fn apply_overrides(config: &mut TrainToml, overrides: &Overrides) {
    if let Some(n) = overrides.total_episodes {
        config.train_loop.total_episodes = n;
    }
    if let Some(dir) = &overrides.checkpoint_dir {
        config.train_loop.checkpoint_dir = dir.clone();
    }
    if let Some(seed) = overrides.seed {
        config.task.seed = seed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_toml() {
        let toml_str = r#"
[task]
algorithm = "fscl"
n_way = 10
k_shot = 5
seed = 7

[model]
input_channels = 40
embedding_dim = 256
hidden_dim = 128

[algorithm]
initial_training_steps = 8
training_steps = 4
n_classes_start = 3
n_class_additions = 2
quick_adapt = false

[optim]
inner_learning_rate = 0.05
outer_learning_rate = 0.002
scheduler = true
scheduler_step = 2000
scheduler_decay = 0.7
gradient_clip_val = 0.5

[loop]
total_episodes = 5000
log_interval = 50
val_interval = 250
val_episodes = 10
checkpoint_interval = 500
checkpoint_dir = "out/run1"
"#;
        let config: TrainToml = toml::from_str(toml_str).unwrap();
        assert_eq!(config.task.algorithm, "fscl");
        assert_eq!(config.task.n_way, 10);
        assert_eq!(config.task.seed, 7);
        assert_eq!(config.model.embedding_dim, 256);
        assert_eq!(config.algorithm.initial_training_steps, 8);
        assert!(!config.algorithm.quick_adapt);
        assert!(config.optim.scheduler);
        assert!((config.optim.scheduler_decay - 0.7).abs() < 1e-9);
        assert_eq!(config.train_loop.total_episodes, 5000);
        assert_eq!(config.train_loop.checkpoint_dir, "out/run1");
    }

    #[test]
    fn test_optional_sections_use_defaults() {
        let toml_str = r#"
[task]
algorithm = "reptile"
n_way = 5
k_shot = 2

[model]
input_channels = 40

[optim]
inner_learning_rate = 0.01
outer_learning_rate = 0.001
"#;
        let config: TrainToml = toml::from_str(toml_str).unwrap();
        assert_eq!(config.task.seed, 42);
        assert_eq!(config.model.embedding_dim, 128);
        assert_eq!(config.algorithm.train_update_steps, 5);
        assert_eq!(config.train_loop.total_episodes, 10_000);
    }

    #[test]
    fn test_overrides_take_priority() {
        let toml_str = r#"
[task]
algorithm = "oml"
n_way = 4
k_shot = 2

[model]
input_channels = 40

[optim]
inner_learning_rate = 0.01
outer_learning_rate = 0.001
"#;
        let mut config: TrainToml = toml::from_str(toml_str).unwrap();
        apply_overrides(
            &mut config,
            &Overrides {
                total_episodes: Some(100),
                checkpoint_dir: Some("elsewhere".to_string()),
                seed: Some(9),
            },
        );
        assert_eq!(config.train_loop.total_episodes, 100);
        assert_eq!(config.train_loop.checkpoint_dir, "elsewhere");
        assert_eq!(config.task.seed, 9);
    }

    #[test]
    fn test_missing_learning_rates_rejected() {
        let toml_str = r#"
[task]
algorithm = "fscl"
n_way = 4
k_shot = 2

[model]
input_channels = 40

[optim]
scheduler = false
"#;
        assert!(toml::from_str::<TrainToml>(toml_str).is_err());
    }

    #[test]
    fn test_algorithm_kind_parse() {
        assert_eq!("maml".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::VanillaMaml);
        assert_eq!("fscl".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::Fscl);
        assert!("protonet".parse::<AlgorithmKind>().is_err());
    }
}
