//! N-way K-shot episode sampling over a labeled dataset.
//!
//! The sampler works purely on dataset label arrays: it yields index plans
//! that the caller materializes into tensors. Each episode draws `n_way`
//! classes and `2 * k_shot` examples per class (support + query), then
//! interleaves the episode support-first: a midpoint split downstream lands
//! `k_shot` examples of every class in each half. Labels are episode-local
//! ids `0..n_way`.

use rand::seq::SliceRandom;
use rand::Rng;

/// One sampled episode: dataset row indices plus episode-local labels.
///
/// Rows are ordered support-first: the first half holds `k_shot` rows per
/// class (contiguous per class), the second half the remaining `k_shot`.
#[derive(Clone, Debug)]
pub struct EpisodePlan {
    /// Indices into the dataset.
    pub indexes: Vec<usize>,
    /// Episode-local label per index, values in `0..n_way`.
    pub labels: Vec<i64>,
}

/// Samples N-way K-shot episodes from a labeled dataset.
#[derive(Debug)]
pub struct EpisodeSampler {
    /// Example indices grouped by dataset class, only classes with enough
    /// examples to fill an episode slot.
    by_class: Vec<Vec<usize>>,
    n_way: usize,
    k_shot: usize,
}

impl EpisodeSampler {
    /// Build a sampler over `dataset_labels`, keeping only classes with at
    /// least `2 * k_shot` examples.
    ///
    /// # Errors
    /// Fewer than `n_way` eligible classes, or zero-valued `n_way`/`k_shot`.
    pub fn new(dataset_labels: &[i64], n_way: usize, k_shot: usize) -> anyhow::Result<Self> {
        if n_way == 0 || k_shot == 0 {
            anyhow::bail!("n_way and k_shot must both be at least 1");
        }

        let unique = crate::curriculum::unique_labels(dataset_labels);
        let mut by_class = Vec::new();
        let mut skipped = 0usize;
        for class in unique {
            let members: Vec<usize> = dataset_labels
                .iter()
                .enumerate()
                .filter(|(_, &l)| l == class)
                .map(|(i, _)| i)
                .collect();
            if members.len() >= 2 * k_shot {
                by_class.push(members);
            } else {
                skipped += 1;
            }
        }

        if by_class.len() < n_way {
            anyhow::bail!(
                "dataset has {} classes with at least {} examples, but n_way is {n_way}",
                by_class.len(),
                2 * k_shot
            );
        }

        tracing::info!(
            eligible = by_class.len(),
            skipped,
            n_way,
            k_shot,
            "episode sampler initialized"
        );
        Ok(Self { by_class, n_way, k_shot })
    }

    /// Sample one episode plan.
    pub fn sample(&self, rng: &mut impl Rng) -> EpisodePlan {
        let mut class_ids: Vec<usize> = (0..self.by_class.len()).collect();
        class_ids.shuffle(rng);
        class_ids.truncate(self.n_way);

        let per_class = 2 * self.k_shot;
        let mut indexes = Vec::with_capacity(self.n_way * per_class);
        let mut labels = Vec::with_capacity(self.n_way * per_class);
        for (local, &class_id) in class_ids.iter().enumerate() {
            let chosen: Vec<usize> = self.by_class[class_id]
                .choose_multiple(rng, per_class)
                .copied()
                .collect();
            indexes.extend(chosen);
            labels.extend(std::iter::repeat(local as i64).take(per_class));
        }

        // Interleave support-first, the `[::2] + [1::2]` reorder: with 2*k
        // contiguous rows per class, each half of the episode ends up holding
        // k rows of every class.
        let order: Vec<usize> = (0..indexes.len())
            .step_by(2)
            .chain((1..indexes.len()).step_by(2))
            .collect();
        let indexes = order.iter().map(|&i| indexes[i]).collect();
        let labels = order.iter().map(|&i| labels[i]).collect();

        EpisodePlan { indexes, labels }
    }

    /// Number of classes eligible for sampling.
    pub fn eligible_classes(&self) -> usize {
        self.by_class.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn toy_labels(classes: usize, per_class: usize) -> Vec<i64> {
        (0..classes)
            .flat_map(|c| std::iter::repeat(c as i64).take(per_class))
            .collect()
    }

    #[test]
    fn test_sampler_shape_and_local_labels() {
        let labels = toy_labels(6, 8);
        let sampler = EpisodeSampler::new(&labels, 4, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        let plan = sampler.sample(&mut rng);
        assert_eq!(plan.indexes.len(), 4 * 4);
        assert_eq!(plan.labels.len(), 4 * 4);
        for local in 0..4i64 {
            let count = plan.labels.iter().filter(|&&l| l == local).count();
            assert_eq!(count, 4, "class {local} must contribute 2*k_shot examples");
        }
        // Support-first: each midpoint half holds k_shot rows of every class.
        let (support, query) = plan.labels.split_at(plan.labels.len() / 2);
        for local in 0..4i64 {
            assert_eq!(support.iter().filter(|&&l| l == local).count(), 2);
            assert_eq!(query.iter().filter(|&&l| l == local).count(), 2);
        }
        // And per-class rows stay contiguous inside each half.
        for half in [support, query] {
            for (i, chunk) in half.chunks(2).enumerate() {
                assert!(chunk.iter().all(|&l| l == i as i64), "half layout: {half:?}");
            }
        }
    }

    #[test]
    fn test_sampler_indexes_unique_and_label_consistent() {
        let labels = toy_labels(5, 6);
        let sampler = EpisodeSampler::new(&labels, 3, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let plan = sampler.sample(&mut rng);
        let mut seen = std::collections::HashSet::new();
        for &i in &plan.indexes {
            assert!(seen.insert(i), "dataset row {i} sampled twice in one episode");
        }
        // All rows mapped to one local label come from one dataset class.
        for local in 0..3i64 {
            let dataset_classes: std::collections::HashSet<i64> = plan
                .indexes
                .iter()
                .zip(&plan.labels)
                .filter(|(_, &l)| l == local)
                .map(|(&i, _)| labels[i])
                .collect();
            assert_eq!(dataset_classes.len(), 1);
        }
    }

    #[test]
    fn test_sampler_skips_small_classes() {
        // Class 2 has only 2 examples, below 2 * k_shot = 4.
        let mut labels = toy_labels(3, 6);
        labels.truncate(2 * 6 + 2);
        let sampler = EpisodeSampler::new(&labels, 2, 2).unwrap();
        assert_eq!(sampler.eligible_classes(), 2);
    }

    #[test]
    fn test_sampler_too_few_classes_errors() {
        let labels = toy_labels(2, 8);
        let err = EpisodeSampler::new(&labels, 4, 2).unwrap_err();
        assert!(err.to_string().contains("n_way"), "got: {err}");
    }
}
