//! Mean Squared Error
//!
//! ```text
//! MSE = Σ (pred - target)² / (2N)        N = element count
//! ∂MSE/∂pred, seeded per example = (pred - target) / batch_size
//! ```
//!
//! For a single-column head, `N` equals the batch size and the seed gradient
//! is the exact derivative of the loss.
//!
//! ## Orientation
//!
//! Predictions and targets are batch-major `[batch, features]`. An argument
//! that arrives as a single row with `batch_size` columns is transposed before
//! reduction, so `[1, B]` and `[B, 1]` average identically.

use crate::error::{Error, Result};
use crate::tensor::Matrix;

/// Transpose a `[1, batch_size]` row into a `[batch_size, 1]` column
pub fn to_batch_major(m: &Matrix, batch_size: usize) -> Matrix {
    if m.rows == 1 && m.cols == batch_size && batch_size > 1 {
        m.transpose()
    } else {
        m.clone()
    }
}

/// Halved mean squared error over every element
///
/// # Errors
///
/// `ShapeMismatch` if prediction and target hold a different number of
/// elements, `EmptyDataset` if both are empty.
pub fn mse(prediction: &Matrix, target: &Matrix, batch_size: usize) -> Result<f64> {
    let prediction = to_batch_major(prediction, batch_size);
    let target = to_batch_major(target, batch_size);

    if prediction.data.len() != target.data.len() {
        return Err(Error::shape("loss", &target.shape(), &prediction.shape()));
    }
    if prediction.data.is_empty() {
        return Err(Error::EmptyDataset);
    }

    let sum: f64 = prediction
        .data
        .iter()
        .zip(&target.data)
        .map(|(p, t)| (p - t).powi(2))
        .sum();
    Ok(sum / (2.0 * prediction.data.len() as f64))
}

/// Gradient seed for the backward pass: `(pred - target) / batch_size`
///
/// `prediction` is the network output, already batch-major. The target is
/// oriented the same way as in [`mse`].
pub fn mse_gradient(prediction: &Matrix, target: &Matrix) -> Result<Matrix> {
    let batch_size = prediction.rows;
    let target = to_batch_major(target, batch_size);
    if prediction.shape() != target.shape() {
        return Err(Error::shape("loss gradient", &prediction.shape(), &target.shape()));
    }
    Ok(prediction.sub(&target).scale(1.0 / batch_size as f64))
}

/// Running loss for one epoch
///
/// Minibatch losses are summed as they arrive; [`LossAccumulator::average`]
/// divides that sum by the dataset's example count, not the number of
/// minibatches. Reset once per epoch.
#[derive(Clone, Debug, Default)]
pub struct LossAccumulator {
    total: f64,
    batches: usize,
}

impl LossAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one minibatch's loss
    pub fn add(&mut self, loss: f64) {
        self.total += loss;
        self.batches += 1;
    }

    /// Clear the running total at the start of an epoch
    pub fn reset(&mut self) {
        self.total = 0.0;
        self.batches = 0;
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Minibatches added since the last reset
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Accumulated loss divided by the dataset's example count
    pub fn average(&self, example_count: usize) -> f64 {
        if example_count == 0 {
            return 0.0;
        }
        self.total / example_count as f64
    }
}
