//! Minibatch Generation
//!
//! Each epoch the dataset is shuffled once and cut into contiguous chunks:
//!
//! ```text
//! Examples:     0 1 2 3 4 5 6 7 8 9
//! Permutation:  7 2 9 0 5 1 8 3 6 4      (seeded)
//! Batch size:   4
//!
//! Batch 0: [7, 2, 9, 0]
//! Batch 1: [5, 1, 8, 3]
//! Batch 2: [6, 4]                        (short final batch)
//! ```
//!
//! Inputs and targets share the same permutation. The permutation depends only
//! on the seed and the dataset size, so the same seed reproduces the same
//! partition.
//!
//! ## Example
//!
//! ```rust
//! # use hybridnet::{minibatch::generate_minibatches, Matrix, Tensor3D, VariantTensor};
//! let x = VariantTensor::from(Tensor3D::zeros(10, 3, 2));
//! let y = Matrix::zeros(10, 1);
//!
//! let batches = generate_minibatches(&x, &y, 4, 42)?;
//! assert_eq!(batches.len(), 3);
//! assert_eq!(batches[2].len(), 2);
//! # Ok::<(), hybridnet::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::tensor::{Matrix, VariantTensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// One training step's worth of examples
#[derive(Clone, Debug, PartialEq)]
pub struct Minibatch {
    pub x: VariantTensor,
    pub y: Matrix,
    /// Dataset positions of the examples, in batch order
    pub indices: Vec<usize>,
}

impl Minibatch {
    /// Number of examples in this batch
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Seeded permutation of `0..n`
pub fn shuffled_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    indices
}

/// Shuffle a dataset and partition it into minibatches
///
/// # Arguments
///
/// * `x` - Inputs, one example per leading index
/// * `y` - Targets `[examples, n_out]`
/// * `batch_size` - Examples per batch; the last batch may be smaller
/// * `seed` - Permutation seed
///
/// # Errors
///
/// `EmptyDataset` if there are no examples, `ShapeMismatch` if `x` and `y`
/// disagree on the example count, `InvalidConfig` for a zero batch size.
pub fn generate_minibatches(
    x: &VariantTensor,
    y: &Matrix,
    batch_size: usize,
    seed: u64,
) -> Result<Vec<Minibatch>> {
    let examples = x.batch_size();
    if examples == 0 {
        return Err(Error::EmptyDataset);
    }
    if y.rows != examples {
        return Err(Error::shape("minibatch targets", &[examples, y.cols], &y.shape()));
    }
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be nonzero".into()));
    }

    let permutation = shuffled_indices(examples, seed);
    let batches = permutation
        .chunks(batch_size)
        .map(|chunk| Minibatch {
            x: x.select_rows(chunk),
            y: y.select_rows(chunk),
            indices: chunk.to_vec(),
        })
        .collect();
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor3D;

    fn dataset(n: usize) -> (VariantTensor, Matrix) {
        let x = Tensor3D::new((0..n * 2 * 2).map(|v| v as f64).collect(), n, 2, 2);
        let y = Matrix::new((0..n).map(|v| v as f64).collect(), n, 1);
        (x.into(), y)
    }

    #[test]
    fn test_partition_covers_every_example_once() {
        for &(n, batch_size) in &[(10, 4), (12, 4), (7, 1), (5, 8), (9, 9)] {
            let (x, y) = dataset(n);
            let batches = generate_minibatches(&x, &y, batch_size, 3).unwrap();

            assert_eq!(batches.len(), (n + batch_size - 1) / batch_size);
            for b in &batches[..batches.len() - 1] {
                assert_eq!(b.len(), batch_size);
            }

            let mut seen: Vec<usize> = batches.iter().flat_map(|b| b.indices.clone()).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_inputs_and_targets_share_permutation() {
        let (x, y) = dataset(6);
        let batches = generate_minibatches(&x, &y, 4, 11).unwrap();
        for b in &batches {
            let seq = match &b.x {
                VariantTensor::Sequence(s) => s,
                VariantTensor::Matrix(_) => panic!("expected a sequence batch"),
            };
            for (row, &idx) in b.indices.iter().enumerate() {
                assert_eq!(b.y.get(row, 0), idx as f64);
                // First feature of the first timestep encodes the example index
                assert_eq!(seq.get(row, 0, 0), (idx * 4) as f64);
            }
        }
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let (x, y) = dataset(20);
        let a = generate_minibatches(&x, &y, 6, 99).unwrap();
        let b = generate_minibatches(&x, &y, 6, 99).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_shuffle_differently() {
        assert_ne!(shuffled_indices(50, 1), shuffled_indices(50, 2));
    }

    #[test]
    fn test_empty_dataset_fails() {
        let x = VariantTensor::from(Tensor3D::zeros(0, 3, 2));
        let y = Matrix::zeros(0, 1);
        assert!(matches!(
            generate_minibatches(&x, &y, 4, 0),
            Err(Error::EmptyDataset)
        ));
    }

    #[test]
    fn test_target_count_mismatch_fails() {
        let (x, _) = dataset(4);
        let y = Matrix::zeros(3, 1);
        assert!(matches!(
            generate_minibatches(&x, &y, 2, 0),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
