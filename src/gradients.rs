//! Gradient Utilities
//!
//! Global gradient norm and norm-based clipping over every layer's parameter
//! gradients.
//!
//! ## Why Clip?
//!
//! Backpropagation through time multiplies many per-step Jacobians together,
//! and an occasional minibatch produces a gradient far larger than the rest.
//! Clipping rescales such a gradient before the optimizer sees it.
//!
//! ## Algorithm
//!
//! ```text
//! norm = √(Σ g²)                 over every parameter gradient of every layer
//! if norm > max_norm:
//!     g *= max_norm / norm       same factor everywhere
//! ```
//!
//! Input gradients (`dx`, `da0`) are intermediate values of the backward pass
//! and are left alone.
//!
//! ## Example
//!
//! ```rust
//! use hybridnet::cache::{LayerGradients, UnifiedGradients};
//! use hybridnet::gradients::{clip_gradients, compute_grad_norm};
//! use hybridnet::layers::DenseGradients;
//! use hybridnet::Matrix;
//!
//! let mut grads = UnifiedGradients::new();
//! grads.record(0, LayerGradients::Dense(DenseGradients {
//!     dw: Matrix::new(vec![3.0, 4.0], 1, 2),
//!     db: Matrix::zeros(1, 1),
//!     dx: Matrix::zeros(1, 2),
//! }));
//!
//! assert_eq!(compute_grad_norm(&grads), 5.0);
//! clip_gradients(&mut grads, 1.0);
//! assert!((compute_grad_norm(&grads) - 1.0).abs() < 1e-12);
//! ```

use crate::cache::UnifiedGradients;
use rayon::prelude::*;

/// L2 norm over all parameter gradients: `√(Σ g²)`
pub fn compute_grad_norm(grads: &UnifiedGradients) -> f64 {
    let sum_sq: f64 = grads
        .iter()
        .flat_map(|layer| layer.parameter_grads())
        .map(|g| g.sum_squares())
        .sum();
    sum_sq.sqrt()
}

/// Scale all parameter gradients so their global norm is at most `max_norm`
///
/// Returns the norm measured before clipping.
pub fn clip_gradients(grads: &mut UnifiedGradients, max_norm: f64) -> f64 {
    let norm = compute_grad_norm(grads);

    if norm > max_norm {
        let scale = max_norm / norm;
        for layer in grads.iter_mut() {
            for g in layer.parameter_grads_mut() {
                g.data.par_iter_mut().for_each(|v| *v *= scale);
            }
        }
    }

    norm
}
