//! Adam Optimizer Implementation
//!
//! Adaptive moment estimation over every trainable matrix of the network.
//!
//! ## Algorithm
//!
//! For each parameter θ with gradient g:
//!
//! ```text
//! v = β₁ * v + (1 - β₁) * g        # First moment (momentum)
//! v_hat = v / (1 - β₁^t)           # Bias correction
//! s = β₂ * s + (1 - β₂) * g²       # Second moment (variance)
//! s_hat = s / (1 - β₂^t)           # Bias correction
//! θ = θ - α * v_hat / (√s_hat + ε) # Parameter update
//! ```
//!
//! where:
//! - α = learning rate (default 3e-4)
//! - β₁ = 0.9, β₂ = 0.999
//! - ε = 1e-8
//! - t = optimizer step, shared by every parameter within one call
//!
//! ## Bias Correction
//!
//! `v` and `s` start at zero, so early estimates are biased toward zero. The
//! `(1 - β^t)` denominators undo that and tend to 1 as `t` grows. The step
//! counter is incremented before it is used, so the first update runs with
//! `t = 1` and the denominators are never zero.
//!
//! ## State Layout
//!
//! Moments are stored per layer, one matrix per parameter in the order of
//! [`Layer::parameters`](crate::network::Layer::parameters). State is created
//! from the network itself, so every parameter has a moment from the start.
//!
//! ## Example
//!
//! ```rust
//! use hybridnet::cache::{UnifiedCache, UnifiedGradients};
//! use hybridnet::optimizer::AdamOptimizer;
//! use hybridnet::{HybridNetwork, Matrix, ModelConfig, Tensor3D, TrainingConfig, VariantTensor};
//!
//! let mut net = HybridNetwork::new(&ModelConfig::tiny(2), 10)?;
//! let training = TrainingConfig::default();
//! let mut adam = AdamOptimizer::new(&net, &training);
//!
//! let x = VariantTensor::from(Tensor3D::zeros(4, 3, 2));
//! let y = Matrix::zeros(4, 1);
//! let mut cache = UnifiedCache::new();
//! let mut grads = UnifiedGradients::new();
//! net.forward(&x, &mut cache)?;
//! net.backward(&y, &cache, &mut grads, training.boundary_gradient)?;
//!
//! adam.step(&mut net, &grads)?;
//! assert_eq!(adam.t, 1);
//! # Ok::<(), hybridnet::Error>(())
//! ```
//!
//! ## References
//!
//! - Kingma & Ba (2014): "Adam: A Method for Stochastic Optimization"
//!   https://arxiv.org/abs/1412.6980

use crate::cache::UnifiedGradients;
use crate::config::TrainingConfig;
use crate::error::{Error, Result};
use crate::network::HybridNetwork;
use crate::tensor::Matrix;
use rayon::prelude::*;

/// Adam optimizer state
///
/// # Fields
///
/// - **v**: First moment per layer, per parameter
/// - **s**: Second moment per layer, per parameter
/// - **t**: Completed optimizer steps
pub struct AdamOptimizer {
    pub v: Vec<Vec<Matrix>>,
    pub s: Vec<Vec<Matrix>>,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub t: usize,
}

impl AdamOptimizer {
    /// Zero-initialized moments shaped like every parameter of `network`
    pub fn new(network: &HybridNetwork, config: &TrainingConfig) -> Self {
        let zeros = || -> Vec<Vec<Matrix>> {
            network
                .layers()
                .iter()
                .map(|layer| {
                    layer
                        .parameters()
                        .iter()
                        .map(|p| Matrix::zeros(p.rows, p.cols))
                        .collect()
                })
                .collect()
        };

        Self {
            v: zeros(),
            s: zeros(),
            learning_rate: config.learning_rate,
            beta1: config.beta1,
            beta2: config.beta2,
            epsilon: config.epsilon,
            t: 0,
        }
    }

    /// `(1 - β₁^t, 1 - β₂^t)` for step `t`
    pub fn bias_corrections(&self, t: usize) -> (f64, f64) {
        let t = t as f64;
        (1.0 - self.beta1.powf(t), 1.0 - self.beta2.powf(t))
    }

    /// Apply one Adam update to every parameter of `network`
    ///
    /// Gradients are checked against the network before anything is mutated,
    /// so a failed call leaves parameters, moments and `t` unchanged.
    ///
    /// # Errors
    ///
    /// `MissingGradients` if a layer has no gradient entry, `ShapeMismatch` if
    /// a gradient does not match its parameter.
    pub fn step(&mut self, network: &mut HybridNetwork, grads: &UnifiedGradients) -> Result<()> {
        for (k, layer) in network.layers().iter().enumerate() {
            let layer_grads = grads.get(k)?.parameter_grads();
            let params = layer.parameters();
            if layer_grads.len() != params.len() {
                return Err(Error::MissingGradients { layer: k });
            }
            for (p, g) in params.iter().zip(&layer_grads) {
                if p.shape() != g.shape() {
                    return Err(Error::shape("parameter gradient", &p.shape(), &g.shape()));
                }
            }
        }

        self.t += 1;
        let (bias_correction1, bias_correction2) = self.bias_corrections(self.t);
        let hyper = Hyper {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            bias_correction1,
            bias_correction2,
        };

        for (k, layer) in network.layers_mut().iter_mut().enumerate() {
            let layer_grads = grads.get(k)?.parameter_grads();
            let moments = self.v[k].iter_mut().zip(self.s[k].iter_mut());
            for ((param, grad), (v, s)) in layer.parameters_mut().into_iter().zip(layer_grads).zip(moments) {
                adam_update_param(param, grad, v, s, &hyper);
            }
        }

        Ok(())
    }
}

struct Hyper {
    lr: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    bias_correction1: f64,
    bias_correction2: f64,
}

#[inline(always)]
fn adam_scalar(param: &mut f64, g: f64, v: &mut f64, s: &mut f64, h: &Hyper) {
    *v = h.beta1 * *v + (1.0 - h.beta1) * g;
    let v_hat = *v / h.bias_correction1;
    *s = h.beta2 * *s + (1.0 - h.beta2) * g * g;
    let s_hat = *s / h.bias_correction2;
    *param -= h.lr * v_hat / (s_hat.sqrt() + h.epsilon);
}

/// Update one parameter matrix in place
///
/// Parallel for large tensors (>1000 elements), sequential for small ones.
fn adam_update_param(param: &mut Matrix, grad: &Matrix, v: &mut Matrix, s: &mut Matrix, h: &Hyper) {
    if param.data.len() > 1000 {
        param
            .data
            .par_iter_mut()
            .zip(grad.data.par_iter())
            .zip(v.data.par_iter_mut().zip(s.data.par_iter_mut()))
            .for_each(|((p, &g), (v, s))| adam_scalar(p, g, v, s, h));
    } else {
        for i in 0..param.data.len() {
            adam_scalar(&mut param.data[i], grad.data[i], &mut v.data[i], &mut s.data[i], h);
        }
    }
}
