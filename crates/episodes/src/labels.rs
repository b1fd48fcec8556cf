//! Label randomization and interleaved support/query indexing.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::curriculum::unique_labels;

/// Remap each distinct label value to a randomly chosen distinct value drawn
/// from the same label set, in place.
///
/// The remap is a bijection: all examples of one original class still share
/// one new class id, and the set of values is unchanged. Used by the
/// continual variants so that the absolute id of a class (and therefore its
/// position in the curriculum) carries no information.
pub fn randomize_labels(labels: &mut [i64], rng: &mut impl Rng) {
    let unique = unique_labels(labels);
    let mut shuffled = unique.clone();
    shuffled.shuffle(rng);

    let converter: HashMap<i64, i64> = unique.into_iter().zip(shuffled).collect();
    for label in labels.iter_mut() {
        *label = converter[label];
    }
}

/// Collect the positions whose label belongs to each class in `classes`
/// (per-class contiguous runs, in class order), then interleave: positions at
/// even offsets across the concatenation followed by positions at odd
/// offsets.
///
/// When every class contributes an even number of examples each run starts at
/// an even offset, so a downstream midpoint split yields exactly half of
/// every class's examples in each part. A class with an odd example count
/// would silently skew that split, so it is an error. Classes absent from
/// `labels` contribute empty runs.
pub fn interleaved_indexes(labels: &[i64], classes: &[i64]) -> anyhow::Result<Vec<usize>> {
    let mut concatenated = Vec::new();
    for &class in classes {
        let run: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect();
        if run.len() % 2 != 0 {
            anyhow::bail!(
                "class {class} has {} examples; interleaved support/query indexing \
                 requires an even count per class",
                run.len()
            );
        }
        concatenated.extend(run);
    }

    let evens = concatenated.iter().copied().step_by(2);
    let odds = concatenated.iter().copied().skip(1).step_by(2);
    Ok(evens.chain(odds).collect())
}
