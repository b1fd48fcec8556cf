//! Episode batch type and support/query splitting.

use burn::prelude::*;
use burn::tensor::TensorData;

/// One episode's worth of examples: feature tensors plus integer labels.
///
/// Shape contract: `inputs` is `[n, channels, frames]`, `labels` has length
/// `n`, and `n` is even (support + query). For the class-incremental
/// variants labels are episode-local class ids.
#[derive(Clone, Debug)]
pub struct EpisodeBatch<B: Backend> {
    pub inputs: Tensor<B, 3>,
    pub labels: Vec<i64>,
}

impl<B: Backend> EpisodeBatch<B> {
    /// Build a batch, checking the shape contract.
    pub fn new(inputs: Tensor<B, 3>, labels: Vec<i64>) -> anyhow::Result<Self> {
        let [n, _, _] = inputs.dims();
        if n != labels.len() {
            anyhow::bail!(
                "inputs have {n} rows but {} labels were provided",
                labels.len()
            );
        }
        if n % 2 != 0 {
            anyhow::bail!("episode length {n} is odd; episodes must split evenly into support and query");
        }
        Ok(Self { inputs, labels })
    }
}

/// Split inputs and labels at the midpoint into (support, query) halves.
///
/// No reordering happens here; the caller must have ordered examples
/// support-first (the interleaved indexer does exactly that).
pub fn split_support_query<B: Backend>(
    inputs: &Tensor<B, 3>,
    labels: &[i64],
) -> anyhow::Result<(Tensor<B, 3>, Vec<i64>, Tensor<B, 3>, Vec<i64>)> {
    let [n, _, _] = inputs.dims();
    if n != labels.len() {
        anyhow::bail!("inputs have {n} rows but {} labels were provided", labels.len());
    }
    if n % 2 != 0 {
        anyhow::bail!("cannot split {n} examples into equal support and query halves");
    }

    let half = n / 2;
    let support = inputs.clone().slice([0..half]);
    let query = inputs.clone().slice([half..n]);
    let (support_labels, query_labels) = labels.split_at(half);
    Ok((support, support_labels.to_vec(), query, query_labels.to_vec()))
}

/// Gather rows of `inputs` (and entries of `labels`) at `indexes`.
pub fn gather_rows<B: Backend>(
    inputs: &Tensor<B, 3>,
    labels: &[i64],
    indexes: &[usize],
) -> (Tensor<B, 3>, Vec<i64>) {
    let device = inputs.device();
    let picked: Vec<i64> = indexes.iter().map(|&i| i as i64).collect();
    let index_tensor = Tensor::<B, 1, Int>::from_data(
        TensorData::new(picked, [indexes.len()]),
        &device,
    );
    let gathered = inputs.clone().select(0, index_tensor);
    let gathered_labels = indexes.iter().map(|&i| labels[i]).collect();
    (gathered, gathered_labels)
}

/// Integer label tensor on the batch's device.
pub fn label_tensor<B: Backend>(labels: &[i64], device: &B::Device) -> Tensor<B, 1, Int> {
    Tensor::from_data(TensorData::new(labels.to_vec(), [labels.len()]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn rows<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 3> {
        // One channel, one frame per row: row i holds values[i].
        Tensor::from_data(TensorData::new(values.to_vec(), [values.len(), 1, 1]), device)
    }

    #[test]
    fn test_split_midpoint_no_reorder() {
        let device = Default::default();
        let inputs = rows::<TestBackend>(&[0.0, 1.0, 2.0, 3.0], &device);
        let labels = vec![0, 1, 0, 1];

        let (s, sl, q, ql) = split_support_query(&inputs, &labels).unwrap();
        assert_eq!(s.dims(), [2, 1, 1]);
        assert_eq!(q.dims(), [2, 1, 1]);
        assert_eq!(sl, vec![0, 1]);
        assert_eq!(ql, vec![0, 1]);

        let s_data: Vec<f32> = s.into_data().to_vec().unwrap();
        let q_data: Vec<f32> = q.into_data().to_vec().unwrap();
        assert_eq!(s_data, vec![0.0, 1.0]);
        assert_eq!(q_data, vec![2.0, 3.0]);
    }

    #[test]
    fn test_split_odd_length_errors() {
        let device = Default::default();
        let inputs = rows::<TestBackend>(&[0.0, 1.0, 2.0], &device);
        assert!(split_support_query(&inputs, &[0, 1, 0]).is_err());
    }

    #[test]
    fn test_gather_rows() {
        let device = Default::default();
        let inputs = rows::<TestBackend>(&[10.0, 11.0, 12.0, 13.0], &device);
        let labels = vec![5, 6, 7, 8];

        let (picked, picked_labels) = gather_rows(&inputs, &labels, &[3, 1]);
        let data: Vec<f32> = picked.into_data().to_vec().unwrap();
        assert_eq!(data, vec![13.0, 11.0]);
        assert_eq!(picked_labels, vec![8, 6]);
    }

    #[test]
    fn test_batch_new_validates() {
        let device = Default::default();
        let inputs = rows::<TestBackend>(&[0.0, 1.0], &device);
        assert!(EpisodeBatch::new(inputs.clone(), vec![0]).is_err());
        assert!(EpisodeBatch::new(inputs, vec![0, 1]).is_ok());
    }
}
