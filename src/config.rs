//! Model and Training Configuration
//!
//! Two configuration structs describe a run:
//!
//! - [`ModelConfig`]: the layer stack (types, widths, recurrent hidden width)
//! - [`TrainingConfig`]: batch size, learning rate, Adam hyperparameters,
//!   epochs and seed
//!
//! Both are plain serde structs and can be loaded from JSON:
//!
//! ```json
//! {
//!   "layers": ["LSTM", "LSTM", "Relu", "Linear"],
//!   "layer_dims": [8, 16, 16, 1],
//!   "hidden_units": 16,
//!   "input_features": 8
//! }
//! ```
//!
//! ## Supported Architectures
//!
//! All recurrent layers come first, then all feed-forward layers, and the last
//! layer is a feed-forward prediction head:
//!
//! ```text
//! LSTM -> LSTM -> Relu -> Linear     supported
//! Relu -> Linear                     supported (2D input)
//! LSTM -> Relu -> LSTM -> Linear     rejected
//! Relu -> LSTM -> Linear             rejected
//! ```
//!
//! [`ModelConfig::validate`] rejects everything else up front, since the
//! backward pass has no way to route gradients through an interleaving.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Layer type tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    /// Gated memory-cell recurrent layer
    #[serde(rename = "LSTM", alias = "Recurrent", alias = "lstm")]
    Recurrent,
    /// Feed-forward layer with ReLU activation
    #[serde(alias = "relu")]
    Relu,
    /// Feed-forward layer with identity activation
    #[serde(alias = "linear")]
    Linear,
}

impl LayerKind {
    pub fn is_recurrent(self) -> bool {
        matches!(self, LayerKind::Recurrent)
    }

    pub fn is_feed_forward(self) -> bool {
        !self.is_recurrent()
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Recurrent => "LSTM",
            LayerKind::Relu => "Relu",
            LayerKind::Linear => "Linear",
        };
        f.write_str(name)
    }
}

impl FromStr for LayerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lstm" | "recurrent" => Ok(LayerKind::Recurrent),
            "relu" => Ok(LayerKind::Relu),
            "linear" => Ok(LayerKind::Linear),
            other => Err(Error::InvalidConfig(format!("unknown layer type '{}'", other))),
        }
    }
}

/// How a `[batch, hidden]` gradient is spread over a recurrent layer's
/// timesteps during backpropagation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryGradient {
    /// Copy the gradient onto every timestep
    #[default]
    Broadcast,
    /// Put the gradient on the final timestep only
    LastStep,
}

/// Layer stack description
///
/// `layers[k]` and `layer_dims[k]` describe layer `k` (zero-based). For a
/// feed-forward layer `layer_dims[k]` is its output width. For a recurrent
/// layer it is the width of the projected sequence handed to the next
/// recurrent layer; the hidden state itself is `hidden_units` wide.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub layers: Vec<LayerKind>,
    pub layer_dims: Vec<usize>,
    /// Hidden-state width shared by all recurrent layers
    pub hidden_units: usize,
    /// Raw feature width of the network input
    pub input_features: usize,
}

impl ModelConfig {
    /// Two stacked recurrent layers followed by a ReLU MLP and a linear head
    ///
    /// # Arguments
    ///
    /// * `input_features` - Raw feature width per timestep
    pub fn stacked(input_features: usize) -> Self {
        Self {
            layers: vec![
                LayerKind::Recurrent,
                LayerKind::Recurrent,
                LayerKind::Relu,
                LayerKind::Relu,
                LayerKind::Linear,
            ],
            layer_dims: vec![input_features, 64, 64, 32, 1],
            hidden_units: 64,
            input_features,
        }
    }

    /// One recurrent layer and a linear head, for quick experiments
    pub fn tiny(input_features: usize) -> Self {
        Self {
            layers: vec![LayerKind::Recurrent, LayerKind::Linear],
            layer_dims: vec![4, 1],
            hidden_units: 4,
            input_features,
        }
    }

    /// Number of layers
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Width of the prediction head
    pub fn output_width(&self) -> usize {
        self.layer_dims.last().copied().unwrap_or(0)
    }

    /// Input width seen by layer `position`
    ///
    /// ```text
    /// recurrent, position 0            input_features
    /// recurrent, after recurrent       previous layer's projected width
    /// feed-forward, after recurrent    hidden_units (last-timestep hidden state)
    /// feed-forward, position 0         input_features
    /// feed-forward, after feed-forward previous layer's width
    /// ```
    pub fn layer_input_width(&self, position: usize) -> usize {
        if position == 0 {
            return self.input_features;
        }
        match (self.layers[position - 1], self.layers[position]) {
            (LayerKind::Recurrent, kind) if kind.is_feed_forward() => self.hidden_units,
            _ => self.layer_dims[position - 1],
        }
    }

    /// Check the layer stack can be trained
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for empty stacks, mismatched lengths or zero widths
    /// - `InvalidArchitecture` when a recurrent layer follows a feed-forward
    ///   layer, or the last layer is recurrent
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig("at least one layer is required".into()));
        }
        if self.layers.len() != self.layer_dims.len() {
            return Err(Error::InvalidConfig(format!(
                "{} layer types but {} layer dims",
                self.layers.len(),
                self.layer_dims.len()
            )));
        }
        if self.input_features == 0 {
            return Err(Error::InvalidConfig("input_features must be nonzero".into()));
        }
        if let Some(k) = self.layer_dims.iter().position(|&d| d == 0) {
            return Err(Error::InvalidConfig(format!("layer {} has zero width", k)));
        }
        if self.layers.iter().any(|k| k.is_recurrent()) && self.hidden_units == 0 {
            return Err(Error::InvalidConfig("hidden_units must be nonzero".into()));
        }

        if let Some(first_ff) = self.layers.iter().position(|k| k.is_feed_forward()) {
            if let Some(offset) = self.layers[first_ff..].iter().position(|k| k.is_recurrent()) {
                return Err(Error::InvalidArchitecture(format!(
                    "recurrent layer {} follows feed-forward layer {}; recurrent layers must all come first",
                    first_ff + offset,
                    first_ff
                )));
            }
        }

        if let Some(LayerKind::Recurrent) = self.layers.last() {
            return Err(Error::InvalidArchitecture(
                "the last layer must be a feed-forward prediction head".into(),
            ));
        }

        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_json(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Training hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Examples per minibatch (the last minibatch may be smaller)
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Passes over the training set
    pub epochs: usize,
    /// Seed for weight initialization and per-epoch shuffling
    pub seed: u64,
    /// First-moment decay
    pub beta1: f64,
    /// Second-moment decay
    pub beta2: f64,
    /// Denominator floor
    pub epsilon: f64,
    /// Global gradient-norm ceiling, if any
    pub grad_clip: Option<f64>,
    pub boundary_gradient: BoundaryGradient,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            learning_rate: 3e-4,
            epochs: 1,
            seed: 10,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            grad_clip: None,
            boundary_gradient: BoundaryGradient::Broadcast,
        }
    }
}

impl TrainingConfig {
    /// Small batches and a higher learning rate for smoke runs
    pub fn tiny() -> Self {
        Self {
            batch_size: 8,
            learning_rate: 1e-2,
            epochs: 20,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// `InvalidConfig` for a zero batch size, a non-positive learning rate or
    /// epsilon, decay rates outside `[0, 1)`, or a non-positive clip norm.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be nonzero".into()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be in [0, 1), got {}",
                    name, beta
                )));
            }
        }
        if !(self.epsilon > 0.0) {
            return Err(Error::InvalidConfig("epsilon must be positive".into()));
        }
        if let Some(clip) = self.grad_clip {
            if !(clip > 0.0) {
                return Err(Error::InvalidConfig("grad_clip must be positive".into()));
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_json(path)?;
        config.validate()?;
        Ok(config)
    }
}

fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
