//! Dense Layer (Fully Connected)
//!
//! Affine transform followed by an element-wise activation, on batch-major
//! inputs.
//!
//! ## Forward Pass
//!
//! ```text
//! Input:  X [batch, in]
//! Weight: W [out, in]
//! Bias:   b [1, out]
//! Z = X @ Wᵀ + b      [batch, out]
//! A = g(Z)            [batch, out]
//! ```
//!
//! ## Backward Pass
//!
//! ```text
//! dZ = dA ⊙ g'(Z)
//! dW = dZᵀ @ X        [out, in]
//! db = sum(dZ, rows)  [1, out]
//! dX = dZ @ W         [batch, in]
//! ```
//!
//! The upstream gradient already carries the `1 / batch` factor from the loss,
//! so no further averaging happens here.

use super::activation::Activation;
use super::random_normal;
use crate::error::{Error, Result};
use crate::tensor::Matrix;
use rand::rngs::StdRng;

/// Parameter names, in the order of [`DenseLayer::parameters`]
pub const DENSE_PARAM_NAMES: [&str; 2] = ["W", "b"];

/// Fully connected layer
#[derive(Clone, Debug)]
pub struct DenseLayer {
    /// `[out, in]`
    pub w: Matrix,
    /// `[1, out]`
    pub b: Matrix,
    pub activation: Activation,
}

impl DenseLayer {
    /// Create a dense layer with normal-initialized weights and zero bias
    ///
    /// Uses He scaling `√(2/in)` ahead of a ReLU and `√(1/in)` ahead of the
    /// identity.
    pub fn new(in_features: usize, out_features: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let gain = match activation {
            Activation::Relu => 2.0,
            Activation::Linear => 1.0,
        };
        let scale = (gain / in_features as f64).sqrt();
        Self {
            w: random_normal(out_features, in_features, scale, rng),
            b: Matrix::zeros(1, out_features),
            activation,
        }
    }

    pub fn in_features(&self) -> usize {
        self.w.cols
    }

    pub fn out_features(&self) -> usize {
        self.w.rows
    }

    /// Forward pass: `A = g(X @ Wᵀ + b)`
    ///
    /// Returns `ShapeMismatch` if `x` is not `[batch, in]`.
    pub fn forward(&self, x: &Matrix) -> Result<(Matrix, DenseCache)> {
        if x.cols != self.in_features() {
            return Err(Error::shape(
                "dense input",
                &[x.rows, self.in_features()],
                &x.shape(),
            ));
        }
        let z = x.matmul(&self.w.transpose()).add(&self.b);
        let a = self.activation.forward(&z);
        let cache = DenseCache {
            x: x.clone(),
            z,
            a: a.clone(),
        };
        Ok((a, cache))
    }

    /// Backward pass from the gradient with respect to this layer's output
    pub fn backward(&self, grad_out: &Matrix, cache: &DenseCache) -> DenseGradients {
        let dz = self.activation.backward(grad_out, &cache.z);
        DenseGradients {
            dw: dz.transpose().matmul(&cache.x),
            db: dz.sum_rows(),
            dx: dz.matmul(&self.w),
        }
    }

    pub fn parameters(&self) -> Vec<&Matrix> {
        vec![&self.w, &self.b]
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        vec![&mut self.w, &mut self.b]
    }
}

/// Values saved by the forward pass
#[derive(Clone, Debug)]
pub struct DenseCache {
    /// Layer input
    pub x: Matrix,
    /// Pre-activation
    pub z: Matrix,
    /// Post-activation (layer output)
    pub a: Matrix,
}

/// Gradients for a dense layer
#[derive(Clone, Debug)]
pub struct DenseGradients {
    pub dw: Matrix,
    pub db: Matrix,
    /// Gradient to pass to the previous layer
    pub dx: Matrix,
}

impl DenseGradients {
    /// Parameter gradients, aligned with [`DenseLayer::parameters`]
    pub fn parameter_grads(&self) -> Vec<&Matrix> {
        vec![&self.dw, &self.db]
    }

    pub fn parameter_grads_mut(&mut self) -> Vec<&mut Matrix> {
        vec![&mut self.dw, &mut self.db]
    }
}
