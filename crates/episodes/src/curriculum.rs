//! Class-incremental curriculum: partition an episode's classes into the
//! ordered groups in which they are introduced.

/// Distinct label values in ascending order.
pub fn unique_labels(labels: &[i64]) -> Vec<i64> {
    let mut unique: Vec<i64> = labels.to_vec();
    unique.sort_unstable();
    unique.dedup();
    unique
}

/// Partition `classes` (ordered) into curriculum groups: the first group has
/// `n_classes_start` classes, each later group `n_class_additions`. Classes
/// left over after the last full group are appended to the last group rather
/// than dropped, so the final group can be larger than the others for some
/// configurations; this keeps every class in exactly one group.
///
/// If fewer classes exist than `n_classes_start`, a single group holds all
/// of them.
///
/// # Errors
/// `n_classes_start == 0`, or `n_class_additions == 0` while classes remain
/// after the first group.
pub fn class_batches(
    classes: &[i64],
    n_classes_start: usize,
    n_class_additions: usize,
) -> anyhow::Result<Vec<Vec<i64>>> {
    if n_classes_start == 0 {
        anyhow::bail!("n_classes_start must be at least 1");
    }

    let first_len = n_classes_start.min(classes.len());
    let mut batches = vec![classes[..first_len].to_vec()];
    let mut remaining = &classes[first_len..];

    if !remaining.is_empty() && n_class_additions == 0 {
        anyhow::bail!(
            "n_class_additions must be at least 1 when more than n_classes_start \
             classes are present ({} remaining)",
            remaining.len()
        );
    }

    while remaining.len() >= n_class_additions && !remaining.is_empty() {
        let (batch, rest) = remaining.split_at(n_class_additions);
        batches.push(batch.to_vec());
        remaining = rest;
    }

    // Remainder smaller than a full addition joins the last group.
    if !remaining.is_empty() {
        batches
            .last_mut()
            .expect("batches always holds the initial group")
            .extend_from_slice(remaining);
    }

    Ok(batches)
}
