//! Activation Functions
//!
//! Element-wise nonlinearities and their derivatives for backpropagation.
//!
//! ## Functions
//!
//! ```text
//! relu(z)     = max(0, z)            relu'(z)    = 1 if z > 0 else 0
//! linear(z)   = z                    linear'(z)  = 1
//! sigmoid(z)  = 1 / (1 + e^-z)       sigmoid'    = s * (1 - s)
//! tanh(z)                            tanh'       = 1 - t²
//! ```
//!
//! Sigmoid and tanh derivatives are written in terms of the *output*, which is
//! what the recurrent cell caches.

use crate::config::LayerKind;
use crate::tensor::Matrix;
use rayon::prelude::*;

/// Activation applied after a feed-forward layer's affine transform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Linear,
}

impl Activation {
    /// Activation for a feed-forward layer kind (`None` for recurrent layers)
    pub fn for_kind(kind: LayerKind) -> Option<Self> {
        match kind {
            LayerKind::Relu => Some(Activation::Relu),
            LayerKind::Linear => Some(Activation::Linear),
            LayerKind::Recurrent => None,
        }
    }

    pub fn forward(self, z: &Matrix) -> Matrix {
        match self {
            Activation::Relu => relu(z),
            Activation::Linear => z.clone(),
        }
    }

    /// `grad_out ⊙ g'(z)` where `z` is the pre-activation
    pub fn backward(self, grad_out: &Matrix, z: &Matrix) -> Matrix {
        match self {
            Activation::Relu => relu_backward(grad_out, z),
            Activation::Linear => grad_out.clone(),
        }
    }
}

pub fn relu(z: &Matrix) -> Matrix {
    z.map(|v| v.max(0.0))
}

pub fn relu_backward(grad_out: &Matrix, z: &Matrix) -> Matrix {
    assert_eq!(grad_out.shape(), z.shape(), "Gradient shape must match input");
    let data = grad_out
        .data
        .par_iter()
        .zip(&z.data)
        .map(|(&g, &v)| if v > 0.0 { g } else { 0.0 })
        .collect();
    Matrix::new(data, z.rows, z.cols)
}

#[inline]
fn sigmoid_scalar(v: f64) -> f64 {
    // Split on sign so exp never overflows
    if v >= 0.0 {
        1.0 / (1.0 + (-v).exp())
    } else {
        let e = v.exp();
        e / (1.0 + e)
    }
}

pub fn sigmoid(z: &Matrix) -> Matrix {
    z.map(sigmoid_scalar)
}

pub fn tanh(z: &Matrix) -> Matrix {
    z.map(f64::tanh)
}

/// `s * (1 - s)` for sigmoid outputs `s`
pub fn sigmoid_derivative_from_output(s: &Matrix) -> Matrix {
    s.map(|v| v * (1.0 - v))
}

/// `1 - t²` for tanh outputs `t`
pub fn tanh_derivative_from_output(t: &Matrix) -> Matrix {
    t.map(|v| 1.0 - v * v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_relu_forward_backward() {
        let z = Matrix::new(vec![-1.0, 0.0, 2.0, -3.0], 2, 2);
        assert_eq!(relu(&z).data, vec![0.0, 0.0, 2.0, 0.0]);

        let grad = Matrix::filled(2, 2, 5.0);
        assert_eq!(relu_backward(&grad, &z).data, vec![0.0, 0.0, 5.0, 0.0]);
    }

    #[test]
    fn test_linear_is_identity() {
        let z = Matrix::new(vec![-1.5, 2.5], 1, 2);
        assert_eq!(Activation::Linear.forward(&z), z);
        let grad = Matrix::new(vec![0.3, -0.7], 1, 2);
        assert_eq!(Activation::Linear.backward(&grad, &z), grad);
    }

    #[test]
    fn test_sigmoid_is_stable_at_extremes() {
        let z = Matrix::new(vec![-1000.0, 0.0, 1000.0], 1, 3);
        let s = sigmoid(&z);
        assert_abs_diff_eq!(s.data[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.data[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s.data[2], 1.0, epsilon = 1e-12);
        assert!(s.data.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_output_derivatives_match_finite_differences() {
        let h = 1e-6;
        for &v in &[-2.0, -0.3, 0.0, 0.8, 3.0] {
            let z = Matrix::new(vec![v], 1, 1);
            let zp = Matrix::new(vec![v + h], 1, 1);
            let zm = Matrix::new(vec![v - h], 1, 1);

            let numeric = (sigmoid(&zp).data[0] - sigmoid(&zm).data[0]) / (2.0 * h);
            let analytic = sigmoid_derivative_from_output(&sigmoid(&z)).data[0];
            assert_abs_diff_eq!(numeric, analytic, epsilon = 1e-8);

            let numeric = (tanh(&zp).data[0] - tanh(&zm).data[0]) / (2.0 * h);
            let analytic = tanh_derivative_from_output(&tanh(&z)).data[0];
            assert_abs_diff_eq!(numeric, analytic, epsilon = 1e-8);
        }
    }
}
