//! Hybridnet: Recurrent + Feed-Forward Training Engine
//!
//! A small neural-network engine for sequence regression: a stack of LSTM
//! layers feeding a stack of dense layers, trained end to end with
//! hand-written backpropagation through time and Adam.
//!
//! # Modules
//!
//! - [`tensor`] - 2D matrices, 3D sequences and the variant over both
//! - [`reshape`] - Conversions between sequence and per-example tensors
//! - [`config`] - Layer stack and training hyperparameters
//! - [`layers`] - Dense and LSTM layer math
//! - [`network`] - Parameter store, forward engine, backward engine
//! - [`cache`] - Per-layer cache and gradient bookkeeping
//! - [`loss`] - Mean squared error and the running epoch loss
//! - [`minibatch`] - Seeded shuffle-and-partition
//! - [`optimizer`] - Adam
//! - [`gradients`] - Global gradient norm and clipping
//! - [`train`] - The training context tying it all together
//! - [`training_logger`] - CSV metrics and train/validation split
//!
//! # Example
//!
//! ```rust
//! use hybridnet::{Matrix, ModelConfig, Tensor3D, Trainer, TrainingConfig, VariantTensor};
//!
//! // 4 examples, 3 timesteps, 2 features
//! let x = VariantTensor::from(Tensor3D::zeros(4, 3, 2));
//! let y = Matrix::zeros(4, 1);
//!
//! // [LSTM(4), Linear(1)]
//! let mut trainer = Trainer::new(ModelConfig::tiny(2), TrainingConfig::default())?;
//! let losses = trainer.fit(&x, &y, None, None)?;
//! assert_eq!(losses.len(), 1);
//! # Ok::<(), hybridnet::Error>(())
//! ```
//!
//! Logging goes through `tracing`; install a subscriber to see it.

pub mod cache;
pub mod config;
pub mod error;
pub mod gradients;
pub mod layers;
pub mod loss;
pub mod minibatch;
pub mod network;
pub mod optimizer;
pub mod reshape;
pub mod tensor;
pub mod train;
pub mod training_logger;

// Re-export main types for convenience
pub use config::{BoundaryGradient, LayerKind, ModelConfig, TrainingConfig};
pub use error::{Error, Result};
pub use minibatch::{generate_minibatches, Minibatch};
pub use network::HybridNetwork;
pub use tensor::{Matrix, Tensor3D, VariantTensor};
pub use train::Trainer;
pub use training_logger::{train_val_split, TrainingLogger};
