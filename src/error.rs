//! Error Types
//!
//! Every fallible stage of a training step (forward, loss, backward, optimize)
//! returns [`Result`]. Errors are fatal to the current step: nothing is retried
//! and the caller decides whether to continue with the next minibatch or epoch.
//!
//! Arithmetic primitives in [`crate::tensor`] still assert on misuse, the same
//! way a slice index panics. The variants here cover the failures a caller can
//! trigger with data or configuration.

use thiserror::Error;

/// Errors raised by the training engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Two tensors that must line up do not.
    #[error("Shape mismatch in {context}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// A recurrent tensor has no timesteps to take the last one from.
    #[error("Sequence has no timesteps")]
    EmptySequence,

    /// Minibatch generation was asked to partition nothing.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Layer ordering the engine cannot propagate through.
    #[error("Unsupported architecture: {0}")]
    InvalidArchitecture(String),

    /// Out-of-range hyperparameter or dimension.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backward pass asked for a layer cache the forward pass never wrote.
    #[error("No forward cache recorded for layer {layer}")]
    MissingCache { layer: usize },

    /// Optimizer step asked for gradients the backward pass never wrote.
    #[error("No gradients recorded for layer {layer}")]
    MissingGradients { layer: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn shape(context: &'static str, expected: &[usize], got: &[usize]) -> Self {
        Error::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }
}
