//! Feature datasets and episode sources.
//!
//! Real data comes in as a JSON array of labeled feature matrices (one per
//! utterance, shape `[channels][frames]`, e.g. precomputed mel filterbanks).
//! A synthetic source generating Gaussian class blobs is also provided for
//! smoke runs without data on disk.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Distribution, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use episodes::EpisodeSampler;
use metalearn::batch::EpisodeBatch;
use metalearn::trainer::EpisodeSource;

/// One labeled utterance: integer class id plus a `[channels][frames]`
/// feature matrix.
#[derive(Debug, serde::Deserialize)]
pub struct FeatureRecord {
    pub label: i64,
    pub features: Vec<Vec<f32>>,
}

/// In-memory feature dataset with a uniform `[channels, frames]` shape.
pub struct FeatureDataset {
    records: Vec<FeatureRecord>,
    channels: usize,
    frames: usize,
}

impl FeatureDataset {
    /// Load a dataset from a JSON file and validate its shape.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", path.display()))?;
        let records: Vec<FeatureRecord> = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
        Self::from_records(records).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))
    }

    pub fn from_records(records: Vec<FeatureRecord>) -> anyhow::Result<Self> {
        let first = records
            .first()
            .ok_or_else(|| anyhow::anyhow!("dataset is empty"))?;
        let channels = first.features.len();
        anyhow::ensure!(channels > 0, "record 0 has no feature channels");
        let frames = first.features[0].len();
        anyhow::ensure!(frames > 0, "record 0 has no frames");

        for (i, record) in records.iter().enumerate() {
            anyhow::ensure!(
                record.features.len() == channels
                    && record.features.iter().all(|row| row.len() == frames),
                "record {i} has shape [{}, {:?}] but the dataset shape is [{channels}, {frames}]",
                record.features.len(),
                record.features.first().map(|r| r.len()),
            );
        }

        tracing::info!(
            examples = records.len(),
            channels,
            frames,
            "feature dataset loaded"
        );
        Ok(Self { records, channels, frames })
    }

    pub fn labels(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.label).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Materialize the rows at `indexes` as a `[n, channels, frames]` tensor.
    pub fn tensor<B: Backend>(&self, indexes: &[usize], device: &B::Device) -> Tensor<B, 3> {
        let mut flat = Vec::with_capacity(indexes.len() * self.channels * self.frames);
        for &i in indexes {
            for row in &self.records[i].features {
                flat.extend_from_slice(row);
            }
        }
        Tensor::from_data(
            TensorData::new(flat, [indexes.len(), self.channels, self.frames]),
            device,
        )
    }
}

/// Episode source over either a real dataset or synthetic class blobs.
pub enum WordEpisodeSource<B: AutodiffBackend> {
    Sampled {
        dataset: FeatureDataset,
        sampler: EpisodeSampler,
        rng: StdRng,
        device: B::Device,
    },
    Synthetic(SyntheticSource<B>),
}

impl<B: AutodiffBackend> WordEpisodeSource<B> {
    pub fn sampled(
        dataset: FeatureDataset,
        n_way: usize,
        k_shot: usize,
        rng: StdRng,
        device: B::Device,
    ) -> anyhow::Result<Self> {
        let sampler = EpisodeSampler::new(&dataset.labels(), n_way, k_shot)?;
        Ok(Self::Sampled { dataset, sampler, rng, device })
    }

    pub fn synthetic(
        n_classes: usize,
        n_way: usize,
        k_shot: usize,
        channels: usize,
        frames: usize,
        rng: StdRng,
        device: B::Device,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            n_classes >= n_way,
            "synthetic pool has {n_classes} classes but n_way is {n_way}"
        );
        Ok(Self::Synthetic(SyntheticSource {
            n_classes,
            n_way,
            k_shot,
            channels,
            frames,
            rng,
            device,
        }))
    }
}

impl<B: AutodiffBackend> EpisodeSource<B> for WordEpisodeSource<B> {
    fn next_episode(&mut self) -> anyhow::Result<EpisodeBatch<B>> {
        match self {
            Self::Sampled { dataset, sampler, rng, device } => {
                let plan = sampler.sample(rng);
                let inputs = dataset.tensor::<B>(&plan.indexes, device);
                EpisodeBatch::new(inputs, plan.labels)
            }
            Self::Synthetic(source) => source.next_episode(),
        }
    }
}

/// Gaussian class blobs in feature space: class `c` is centered at a
/// per-class offset, so a working learner separates the classes within a
/// few inner steps.
pub struct SyntheticSource<B: AutodiffBackend> {
    n_classes: usize,
    n_way: usize,
    k_shot: usize,
    channels: usize,
    frames: usize,
    rng: StdRng,
    device: B::Device,
}

impl<B: AutodiffBackend> SyntheticSource<B> {
    fn next_episode(&mut self) -> anyhow::Result<EpisodeBatch<B>> {
        let mut pool: Vec<usize> = (0..self.n_classes).collect();
        pool.shuffle(&mut self.rng);
        pool.truncate(self.n_way);

        // Support-first layout: each half holds k_shot contiguous rows per
        // class, matching what the dataset sampler produces.
        let mut labels = Vec::with_capacity(2 * self.n_way * self.k_shot);
        let mut offsets = Vec::with_capacity(2 * self.n_way * self.k_shot);
        for _half in 0..2 {
            for (local, &class) in pool.iter().enumerate() {
                for _ in 0..self.k_shot {
                    labels.push(local as i64);
                    offsets.push(class as f32);
                }
            }
        }

        let n = labels.len();
        let offset_tensor = Tensor::<B, 3>::from_data(
            TensorData::new(offsets, [n, 1, 1]),
            &self.device,
        );
        let noise = Tensor::<B, 3>::random(
            [n, self.channels, self.frames],
            Distribution::Normal(0.0, 0.5),
            &self.device,
        );
        EpisodeBatch::new(noise + offset_tensor, labels)
    }
}
