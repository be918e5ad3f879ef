//! Shape Reconciliation Between 2D and 3D Tensors
//!
//! Recurrent layers produce `[batch, timesteps, hidden]` tensors while
//! feed-forward layers consume `[batch, features]`. Two conversions connect
//! them:
//!
//! ```text
//! 3D -> 2D  (forward)   keep each example's final timestep
//!   [B, T, F]  ->  [B, F]
//!
//! 2D -> 3D  (backward)  repeat each example's row across T timesteps
//!   [B, F]  ->  [B, T, F]
//! ```
//!
//! The 2D -> 3D direction is not an inverse of the first. Broadcasting copies
//! the final-timestep gradient onto every timestep, an approximate upsampling
//! used to route gradients back into a recurrent layer. [`route_to_sequence`]
//! also offers the exact alternative, which places the gradient on the last
//! timestep only (see [`BoundaryGradient`]).

use crate::config::BoundaryGradient;
use crate::error::{Error, Result};
use crate::tensor::{Matrix, Tensor3D};

/// 3D -> 2D: take the final timestep of every example
///
/// Fails with [`Error::EmptySequence`] when there are no timesteps.
///
/// ```rust
/// # use hybridnet::{reshape::last_timestep, Tensor3D};
/// let h = Tensor3D::from_nested(vec![vec![vec![1.0], vec![2.0], vec![3.0]]]).unwrap();
/// assert_eq!(last_timestep(&h).unwrap().data, vec![3.0]);
/// ```
pub fn last_timestep(hidden: &Tensor3D) -> Result<Matrix> {
    if hidden.timesteps == 0 {
        return Err(Error::EmptySequence);
    }
    Ok(hidden.timestep(hidden.timesteps - 1))
}

/// 2D -> 3D: repeat each example's row identically across `timesteps`
pub fn repeat_timesteps(values: &Matrix, timesteps: usize) -> Tensor3D {
    let mut data = Vec::with_capacity(values.rows * timesteps * values.cols);
    for b in 0..values.rows {
        let row = values.row(b);
        for _ in 0..timesteps {
            data.extend_from_slice(row);
        }
    }
    Tensor3D::new(data, values.rows, timesteps, values.cols)
}

/// 2D -> 3D: place each example's row on the final timestep, zeros elsewhere
pub fn place_last_timestep(values: &Matrix, timesteps: usize) -> Tensor3D {
    let mut out = Tensor3D::zeros(values.rows, timesteps, values.cols);
    if timesteps > 0 {
        out.set_timestep(timesteps - 1, values);
    }
    out
}

/// Route a `[batch, hidden]` gradient onto a recurrent layer's sequence
pub fn route_to_sequence(grad: &Matrix, timesteps: usize, mode: BoundaryGradient) -> Tensor3D {
    match mode {
        BoundaryGradient::Broadcast => repeat_timesteps(grad, timesteps),
        BoundaryGradient::LastStep => place_last_timestep(grad, timesteps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(batch: usize, timesteps: usize, features: usize) -> Tensor3D {
        let n = batch * timesteps * features;
        Tensor3D::new((0..n).map(|v| v as f64 * 0.5 - 1.0).collect(), batch, timesteps, features)
    }

    #[test]
    fn test_last_timestep_extracts_final_row_per_example() {
        let x = sample(2, 3, 2);
        let last = last_timestep(&x).unwrap();
        assert_eq!(last.shape(), [2, 2]);
        assert_eq!(last.row(0), &[x.get(0, 2, 0), x.get(0, 2, 1)]);
        assert_eq!(last.row(1), &[x.get(1, 2, 0), x.get(1, 2, 1)]);
    }

    #[test]
    fn test_last_timestep_empty_sequence_fails() {
        let x = Tensor3D::zeros(2, 0, 3);
        assert!(matches!(last_timestep(&x), Err(Error::EmptySequence)));
    }

    #[test]
    fn test_broadcast_of_last_timestep_repeats_final_vector() {
        for &(batch, timesteps) in &[(1, 1), (2, 3), (4, 5), (3, 1)] {
            let x = sample(batch, timesteps, 3);
            let last = last_timestep(&x).unwrap();
            let up = repeat_timesteps(&last, timesteps);

            assert_eq!(up.shape(), [batch, timesteps, 3]);
            for t in 0..timesteps {
                assert_eq!(up.timestep(t), last);
            }
            // Only a single-timestep tensor survives the round trip
            assert_eq!(up == x, timesteps == 1);
        }
    }

    #[test]
    fn test_route_last_step_zeroes_earlier_timesteps() {
        let g = Matrix::new(vec![1.0, 2.0], 2, 1);
        let routed = route_to_sequence(&g, 3, BoundaryGradient::LastStep);
        assert_eq!(routed.timestep(2), g);
        assert_eq!(routed.timestep(0), Matrix::zeros(2, 1));
        assert_eq!(routed.timestep(1), Matrix::zeros(2, 1));
    }
}
