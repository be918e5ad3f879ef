//! Neural Network Layers
//!
//! Per-layer math for the hybrid network. Each layer type provides both the
//! forward and backward passes.
//!
//! ## Layers
//!
//! - **activation**: ReLU, identity, sigmoid and tanh with their derivatives
//! - **dense**: Fully connected layer with a ReLU or identity activation
//! - **lstm**: Gated recurrent layer run over a full timestep sequence
//!
//! ## Design Pattern
//!
//! Each trainable layer follows a consistent pattern:
//!
//! ```rust,ignore
//! pub struct TrainableLayer {
//!     // Parameters (weights, biases, etc.)
//! }
//!
//! impl TrainableLayer {
//!     pub fn new(..., rng: &mut StdRng) -> Self { }
//!     pub fn forward(&self, x: &Input) -> Result<Cache> { }
//!     pub fn backward(&self, grad: &Output, cache: &Cache) -> Gradients { }
//!     pub fn parameters(&self) -> Vec<&Matrix> { }
//! }
//! ```
//!
//! `parameters()` and the gradients' `parameter_grads()` list matrices in the
//! same order, which is what lets the optimizer pair them up without names.

pub mod activation;
pub mod dense;
pub mod lstm;

pub use activation::Activation;
pub use dense::{DenseCache, DenseGradients, DenseLayer, DENSE_PARAM_NAMES};
pub use lstm::{LstmCache, LstmGradients, LstmLayer, LstmStepCache, LSTM_PARAM_NAMES};

use crate::tensor::Matrix;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

/// Matrix of `N(0, 1) * scale` samples
pub(crate) fn random_normal(rows: usize, cols: usize, scale: f64, rng: &mut StdRng) -> Matrix {
    let data = (0..rows * cols)
        .map(|_| rng.sample::<f64, _>(StandardNormal) * scale)
        .collect();
    Matrix::new(data, rows, cols)
}
