//! Training Context
//!
//! [`Trainer`] owns everything one training run mutates: the network
//! parameters, the per-layer cache and gradients, the Adam state and the
//! epoch's running loss. Stages take `&mut self`, so only one
//! forward/backward/optimize cycle can be in flight at a time, and separate
//! trainers never share state.
//!
//! ## One Step
//!
//! ```text
//! Minibatch ─→ forward ─→ compute_loss ─→ backward ─→ optimize
//!              (cache)    (accumulator)   (gradients)  (parameters, moments)
//! ```
//!
//! ## One Epoch
//!
//! ```text
//! reset accumulator
//! shuffle with seed + epoch + 1, cut into minibatches
//! train_step on each minibatch
//! sum of batch losses / example count
//! ```
//!
//! ## Example
//!
//! ```rust
//! use hybridnet::{Matrix, ModelConfig, Tensor3D, Trainer, TrainingConfig, VariantTensor};
//!
//! let x = VariantTensor::from(Tensor3D::zeros(16, 5, 1));
//! let y = Matrix::zeros(16, 1);
//!
//! let mut trainer = Trainer::new(ModelConfig::tiny(1), TrainingConfig::tiny())?;
//! let loss = trainer.train_epoch(&x, &y, 0)?;
//! assert!(loss >= 0.0);
//! # Ok::<(), hybridnet::Error>(())
//! ```

use crate::cache::{UnifiedCache, UnifiedGradients};
use crate::config::{ModelConfig, TrainingConfig};
use crate::error::{Error, Result};
use crate::gradients::clip_gradients;
use crate::loss::{mse, LossAccumulator};
use crate::minibatch::{generate_minibatches, Minibatch};
use crate::network::HybridNetwork;
use crate::optimizer::AdamOptimizer;
use crate::tensor::{Matrix, VariantTensor};
use crate::training_logger::{Dataset, TrainingLogger};
use tracing::{debug, info, warn};

/// Explicit training context
pub struct Trainer {
    network: HybridNetwork,
    optimizer: AdamOptimizer,
    cache: UnifiedCache,
    gradients: UnifiedGradients,
    loss: LossAccumulator,
    prediction: Option<Matrix>,
    config: TrainingConfig,
}

impl Trainer {
    /// Validate both configs, build a seeded network and zeroed Adam state
    pub fn new(model_config: ModelConfig, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let network = HybridNetwork::new(&model_config, config.seed)?;
        let optimizer = AdamOptimizer::new(&network, &config);
        info!(
            layers = network.depth(),
            parameters = network.num_parameters(),
            "initialized network"
        );

        Ok(Self {
            network,
            optimizer,
            cache: UnifiedCache::new(),
            gradients: UnifiedGradients::new(),
            loss: LossAccumulator::new(),
            prediction: None,
            config,
        })
    }

    pub fn network(&self) -> &HybridNetwork {
        &self.network
    }

    pub fn optimizer(&self) -> &AdamOptimizer {
        &self.optimizer
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn cache(&self) -> &UnifiedCache {
        &self.cache
    }

    pub fn gradients(&self) -> &UnifiedGradients {
        &self.gradients
    }

    pub fn loss_accumulator(&self) -> &LossAccumulator {
        &self.loss
    }

    /// Prediction from the most recent forward pass
    pub fn prediction(&self) -> Option<&Matrix> {
        self.prediction.as_ref()
    }

    /// Run the forward engine, overwriting the cache
    ///
    /// The previous prediction is dropped first, so a failed pass leaves
    /// nothing for [`Trainer::compute_loss`] to score.
    pub fn forward(&mut self, x: &VariantTensor) -> Result<&Matrix> {
        self.prediction = None;
        let prediction = self.network.forward(x, &mut self.cache)?;
        Ok(self.prediction.insert(prediction))
    }

    /// MSE of the last prediction against `y`, added to the epoch total
    pub fn compute_loss(&mut self, y: &Matrix) -> Result<f64> {
        let prediction = self.prediction.as_ref().ok_or(Error::MissingCache {
            layer: self.network.depth() - 1,
        })?;
        let loss = mse(prediction, y, prediction.rows)?;
        self.loss.add(loss);
        Ok(loss)
    }

    /// Run the backward engine, overwriting the gradients
    pub fn backward(&mut self, y: &Matrix) -> Result<()> {
        self.network.backward(
            y,
            &self.cache,
            &mut self.gradients,
            self.config.boundary_gradient,
        )
    }

    /// Clip if configured, then apply one Adam update
    pub fn optimize(&mut self) -> Result<()> {
        if let Some(max_norm) = self.config.grad_clip {
            let norm = clip_gradients(&mut self.gradients, max_norm);
            if norm > max_norm {
                warn!(norm, max_norm, step = self.optimizer.t + 1, "clipped gradients");
            }
        }
        self.optimizer.step(&mut self.network, &self.gradients)
    }

    /// Forward, loss, backward and optimize on one minibatch
    pub fn train_step(&mut self, batch: &Minibatch) -> Result<f64> {
        self.forward(&batch.x)?;
        let loss = self.compute_loss(&batch.y)?;
        self.backward(&batch.y)?;
        self.optimize()?;
        debug!(step = self.optimizer.t, examples = batch.len(), loss, "train step");
        Ok(loss)
    }

    /// One pass over the dataset
    ///
    /// `epoch` is zero-based. Returns the sum of minibatch losses divided by
    /// the example count.
    pub fn train_epoch(&mut self, x: &VariantTensor, y: &Matrix, epoch: usize) -> Result<f64> {
        self.loss.reset();
        let seed = self.config.seed.wrapping_add(epoch as u64 + 1);
        let batches = generate_minibatches(x, y, self.config.batch_size, seed)?;

        for batch in &batches {
            self.train_step(batch)?;
        }

        Ok(self.loss.average(x.batch_size()))
    }

    /// MSE on a dataset without touching the cache, gradients, accumulator
    /// or optimizer
    pub fn evaluate(&self, x: &VariantTensor, y: &Matrix) -> Result<f64> {
        let mut scratch = UnifiedCache::new();
        let prediction = self.network.forward(x, &mut scratch)?;
        mse(&prediction, y, prediction.rows)
    }

    /// Train for `config.epochs` epochs
    ///
    /// Returns the average training loss of every epoch. With a validation
    /// set, each epoch is followed by [`Trainer::evaluate`] on it. With a
    /// logger, each epoch appends one CSV row.
    pub fn fit(
        &mut self,
        x: &VariantTensor,
        y: &Matrix,
        validation: Option<&Dataset>,
        mut logger: Option<&mut TrainingLogger>,
    ) -> Result<Vec<f64>> {
        let mut history = Vec::with_capacity(self.config.epochs);

        for epoch in 0..self.config.epochs {
            let train_loss = self.train_epoch(x, y, epoch)?;
            let val_loss = match validation {
                Some((vx, vy)) if vx.batch_size() > 0 => Some(self.evaluate(vx, vy)?),
                _ => None,
            };

            info!(
                epoch = epoch + 1,
                epochs = self.config.epochs,
                train_loss,
                val_loss = val_loss.unwrap_or(f64::NAN),
                "epoch complete"
            );
            if let Some(logger) = logger.as_deref_mut() {
                logger.log(epoch + 1, self.config.learning_rate, train_loss, val_loss)?;
            }
            history.push(train_loss);
        }

        Ok(history)
    }
}
