//! Hybrid Recurrent / Feed-Forward Network
//!
//! A stack of LSTM layers followed by dense layers, trained end to end. This
//! module owns the parameter store and drives the forward and backward
//! engines over it.
//!
//! ## Architecture
//!
//! ```text
//! Input [B, T, n_x]
//!   → LSTM 0        (a0 = 0)              A, Y [B, T, ·]
//!   → LSTM 1        (input Y₀, a0 = A₀[T-1])
//!   → ...
//!   → last timestep of A                  [B, hidden_units]
//!   → Dense (ReLU) → ... → Dense (Linear) [B, n_out]
//! ```
//!
//! All recurrent layers come first; [`ModelConfig::validate`] rejects any
//! other ordering before a network is built.
//!
//! ## Backward Engine
//!
//! The walk runs from the head down to layer 0. What flows between layers
//! depends on the layer that produced it:
//!
//! ```text
//! dense k      → layer k-1:  dX [B, in]
//! recurrent k  → layer k-1:  dX [B, T, n_x] (onto k-1's Y) and da0 [B, n_a] (onto k-1's A)
//! ```
//!
//! A 2D gradient entering a recurrent layer is routed onto its hidden-state
//! sequence with the configured [`BoundaryGradient`].
//!
//! ## Layer Addressing
//!
//! Layers, cache entries and gradient entries are all indexed by the same
//! zero-based position. Parameter names carry that position as a suffix
//! (`Wf0`, `W2`, ...).

use crate::cache::{LayerCache, LayerGradients, UnifiedCache, UnifiedGradients};
use crate::config::{BoundaryGradient, ModelConfig};
use crate::error::{Error, Result};
use crate::layers::{
    Activation, DenseLayer, LstmLayer, DENSE_PARAM_NAMES, LSTM_PARAM_NAMES,
};
use crate::loss::mse_gradient;
use crate::reshape::{last_timestep, route_to_sequence};
use crate::tensor::{Matrix, Tensor3D, VariantTensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

/// One layer of the network
#[derive(Clone, Debug)]
pub enum Layer {
    Recurrent(LstmLayer),
    Dense(DenseLayer),
}

impl Layer {
    pub fn is_recurrent(&self) -> bool {
        matches!(self, Layer::Recurrent(_))
    }

    /// Base parameter names, in `parameters()` order
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            Layer::Recurrent(_) => &LSTM_PARAM_NAMES,
            Layer::Dense(_) => &DENSE_PARAM_NAMES,
        }
    }

    pub fn parameters(&self) -> Vec<&Matrix> {
        match self {
            Layer::Recurrent(l) => l.parameters(),
            Layer::Dense(l) => l.parameters(),
        }
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        match self {
            Layer::Recurrent(l) => l.parameters_mut(),
            Layer::Dense(l) => l.parameters_mut(),
        }
    }
}

/// Gradient handed from layer `k` down to layer `k-1`
enum Upstream {
    /// From a dense layer: gradient on its 2D input
    Dense(Matrix),
    /// From a recurrent layer: gradient on its input sequence and on its
    /// initial hidden state
    Recurrent { dx: Tensor3D, da0: Matrix },
}

/// Parameter store plus forward and backward engines
#[derive(Clone, Debug)]
pub struct HybridNetwork {
    config: ModelConfig,
    layers: Vec<Layer>,
}

impl HybridNetwork {
    /// Build a network from a validated layer description
    ///
    /// Weights are drawn from a `StdRng` seeded with `seed`, so two networks
    /// built from the same config and seed are identical.
    pub fn new(config: &ModelConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);

        let layers = config
            .layers
            .iter()
            .enumerate()
            .map(|(k, &kind)| {
                let in_width = config.layer_input_width(k);
                let out_width = config.layer_dims[k];
                match Activation::for_kind(kind) {
                    Some(activation) => {
                        Layer::Dense(DenseLayer::new(in_width, out_width, activation, &mut rng))
                    }
                    None => Layer::Recurrent(LstmLayer::new(
                        in_width,
                        config.hidden_units,
                        out_width,
                        &mut rng,
                    )),
                }
            })
            .collect();

        Ok(Self {
            config: config.clone(),
            layers,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Layer at zero-based `position`
    ///
    /// # Panics
    ///
    /// If `position >= depth()`.
    pub fn layer(&self, position: usize) -> &Layer {
        &self.layers[position]
    }

    pub fn layer_mut(&mut self, position: usize) -> &mut Layer {
        &mut self.layers[position]
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    /// Every parameter with its position-suffixed name, e.g. `("Wf0", ..)`
    pub fn named_parameters(&self) -> Vec<(String, &Matrix)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(k, layer)| {
                layer
                    .parameter_names()
                    .iter()
                    .zip(layer.parameters())
                    .map(move |(name, param)| (format!("{}{}", name, k), param))
            })
            .collect()
    }

    /// Total number of scalar parameters
    pub fn num_parameters(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|l| l.parameters())
            .map(|p| p.data.len())
            .sum()
    }

    /// Forward engine
    ///
    /// Runs every layer in order, recording one cache entry per layer, and
    /// returns the prediction `[batch, n_out]`.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if the input rank or width does not fit the first
    /// layer, `EmptySequence` if a recurrent input has no timesteps.
    pub fn forward(&self, input: &VariantTensor, cache: &mut UnifiedCache) -> Result<Matrix> {
        let batch = input.batch_size();
        let mut flow = input.clone();
        let mut initial_hidden: Option<Matrix> = None;

        for (k, layer) in self.layers.iter().enumerate() {
            match layer {
                Layer::Recurrent(lstm) => {
                    let x = match &flow {
                        VariantTensor::Sequence(x) => x,
                        VariantTensor::Matrix(m) => {
                            return Err(Error::shape("recurrent layer input rank", &[3], &[m.shape().len()]));
                        }
                    };
                    let a0 = initial_hidden
                        .take()
                        .unwrap_or_else(|| Matrix::zeros(batch, lstm.hidden_width()));

                    let lstm_cache = lstm.forward(x, &a0)?;
                    let a_last = last_timestep(&lstm_cache.a)?;
                    debug!(
                        layer = k,
                        kind = "recurrent",
                        input = ?x.shape(),
                        hidden = ?lstm_cache.a.shape(),
                        "forward"
                    );

                    flow = match self.layers.get(k + 1) {
                        Some(Layer::Recurrent(_)) => {
                            initial_hidden = Some(a_last);
                            VariantTensor::Sequence(lstm_cache.y.clone())
                        }
                        _ => VariantTensor::Matrix(a_last),
                    };
                    cache.record(k, LayerCache::Recurrent(lstm_cache));
                }
                Layer::Dense(dense) => {
                    let x = match &flow {
                        VariantTensor::Matrix(x) => x,
                        VariantTensor::Sequence(s) => {
                            return Err(Error::shape("dense layer input rank", &[2], &[s.shape().len()]));
                        }
                    };
                    let (a, dense_cache) = dense.forward(x)?;
                    debug!(
                        layer = k,
                        kind = %self.config.layers[k],
                        input = ?x.shape(),
                        output = ?a.shape(),
                        "forward"
                    );
                    flow = VariantTensor::Matrix(a);
                    cache.record(k, LayerCache::Dense(dense_cache));
                }
            }
        }

        match flow {
            VariantTensor::Matrix(prediction) => Ok(prediction),
            VariantTensor::Sequence(_) => Err(Error::InvalidArchitecture(
                "the last layer must be a feed-forward prediction head".into(),
            )),
        }
    }

    /// Backward engine
    ///
    /// Seeds the gradient from the head's cached output and `target`, then
    /// walks layers from the head down to layer 0, recording one gradient
    /// entry per layer.
    ///
    /// # Errors
    ///
    /// `MissingCache` if the forward pass has not reached every layer,
    /// `ShapeMismatch` if `target` does not match the prediction.
    pub fn backward(
        &self,
        target: &Matrix,
        cache: &UnifiedCache,
        grads: &mut UnifiedGradients,
        boundary: BoundaryGradient,
    ) -> Result<()> {
        let head = self.depth() - 1;
        let mut upstream = match cache.get(head)? {
            LayerCache::Dense(c) => Upstream::Dense(mse_gradient(&c.a, target)?),
            LayerCache::Recurrent(_) => {
                return Err(Error::InvalidArchitecture(
                    "the last layer must be a feed-forward prediction head".into(),
                ))
            }
        };

        for k in (0..self.depth()).rev() {
            upstream = match (&self.layers[k], cache.get(k)?, upstream) {
                (Layer::Dense(dense), LayerCache::Dense(c), Upstream::Dense(grad_out)) => {
                    let g = dense.backward(&grad_out, c);
                    debug!(layer = k, kind = %self.config.layers[k], grad = ?g.dx.shape(), "backward");
                    let next = Upstream::Dense(g.dx.clone());
                    grads.record(k, LayerGradients::Dense(g));
                    next
                }
                (Layer::Recurrent(lstm), LayerCache::Recurrent(c), from_above) => {
                    let timesteps = c.x.timesteps;
                    // Dense above: gradient on the last-timestep hidden state.
                    // Recurrent above: dX lands on our Y, da0 on our final hidden state.
                    let (da, dy) = match from_above {
                        Upstream::Dense(g) => (route_to_sequence(&g, timesteps, boundary), None),
                        Upstream::Recurrent { dx, da0 } => {
                            (route_to_sequence(&da0, timesteps, boundary), Some(dx))
                        }
                    };
                    let g = lstm.backward(Some(&da), dy.as_ref(), c)?;
                    debug!(layer = k, kind = "recurrent", grad = ?g.dx.shape(), "backward");
                    let next = Upstream::Recurrent {
                        dx: g.dx.clone(),
                        da0: g.da0.clone(),
                    };
                    grads.record(k, LayerGradients::Recurrent(g));
                    next
                }
                _ => {
                    return Err(Error::InvalidArchitecture(format!(
                        "layer {} does not line up with the gradient flowing into it",
                        k
                    )))
                }
            };
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerKind::{Linear, Recurrent, Relu};
    use crate::loss::mse;
    use approx::assert_abs_diff_eq;

    fn sequence(batch: usize, timesteps: usize, features: usize) -> Tensor3D {
        let n = batch * timesteps * features;
        Tensor3D::new(
            (0..n).map(|i| ((i as f64) * 0.7).sin()).collect(),
            batch,
            timesteps,
            features,
        )
    }

    fn small_config() -> ModelConfig {
        ModelConfig {
            layers: vec![Recurrent, Recurrent, Relu, Linear],
            layer_dims: vec![3, 2, 3, 1],
            hidden_units: 3,
            input_features: 2,
        }
    }

    #[test]
    fn test_parameter_shapes_follow_config() {
        let net = HybridNetwork::new(&ModelConfig::stacked(5), 10).unwrap();
        assert_eq!(net.depth(), 5);

        match net.layer(0) {
            Layer::Recurrent(l) => {
                assert_eq!(l.wf.shape(), [64, 64 + 5]);
                assert_eq!(l.wy.shape(), [5, 64]);
            }
            Layer::Dense(_) => panic!("layer 0 should be recurrent"),
        }
        match net.layer(1) {
            Layer::Recurrent(l) => assert_eq!(l.input_width(), 5),
            Layer::Dense(_) => panic!("layer 1 should be recurrent"),
        }
        match net.layer(2) {
            Layer::Dense(d) => assert_eq!(d.w.shape(), [64, 64]),
            Layer::Recurrent(_) => panic!("layer 2 should be dense"),
        }
        match net.layer(4) {
            Layer::Dense(d) => {
                assert_eq!(d.w.shape(), [1, 32]);
                assert_eq!(d.activation, Activation::Linear);
            }
            Layer::Recurrent(_) => panic!("layer 4 should be dense"),
        }
    }

    #[test]
    fn test_named_parameters() {
        let net = HybridNetwork::new(&ModelConfig::tiny(2), 1).unwrap();
        let names: Vec<String> = net.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names.len(), 12);
        assert_eq!(names[0], "Wf0");
        assert_eq!(names[9], "by0");
        assert_eq!(names[10], "W1");
        assert_eq!(names[11], "b1");
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = HybridNetwork::new(&small_config(), 3).unwrap();
        let b = HybridNetwork::new(&small_config(), 3).unwrap();
        let c = HybridNetwork::new(&small_config(), 4).unwrap();
        let flat = |n: &HybridNetwork| -> Vec<f64> {
            n.named_parameters().into_iter().flat_map(|(_, p)| p.data.clone()).collect()
        };
        assert_eq!(flat(&a), flat(&b));
        assert_ne!(flat(&a), flat(&c));
    }

    #[test]
    fn test_forward_shapes_and_cache_replacement() {
        let net = HybridNetwork::new(&small_config(), 5).unwrap();
        let input = VariantTensor::from(sequence(4, 3, 2));
        let mut cache = UnifiedCache::new();

        let pred = net.forward(&input, &mut cache).unwrap();
        assert_eq!(pred.shape(), [4, 1]);
        assert_eq!(cache.len(), 4);

        let again = net.forward(&input, &mut cache).unwrap();
        assert_eq!(cache.len(), 4);
        assert_eq!(pred, again);
    }

    #[test]
    fn test_second_recurrent_starts_from_first_final_hidden_state() {
        let net = HybridNetwork::new(&small_config(), 6).unwrap();
        let mut cache = UnifiedCache::new();
        net.forward(&VariantTensor::from(sequence(2, 4, 2)), &mut cache).unwrap();

        let (first, second) = match (cache.get(0).unwrap(), cache.get(1).unwrap()) {
            (LayerCache::Recurrent(a), LayerCache::Recurrent(b)) => (a, b),
            _ => panic!("expected two recurrent caches"),
        };
        assert_eq!(second.x, first.y);
        assert_eq!(second.steps[0].a_prev, last_timestep(&first.a).unwrap());
    }

    #[test]
    fn test_backward_fills_fresh_gradients_in_layer_order() {
        let net = HybridNetwork::new(&small_config(), 8).unwrap();
        let mut cache = UnifiedCache::new();
        let mut grads = UnifiedGradients::new();
        net.forward(&VariantTensor::from(sequence(3, 4, 2)), &mut cache).unwrap();
        let target = Matrix::filled(3, 1, 0.5);
        net.backward(&target, &cache, &mut grads, BoundaryGradient::Broadcast)
            .unwrap();

        assert_eq!(grads.len(), net.depth());
        for k in 0..net.depth() {
            let layer = net.layer(k);
            let g = grads.get(k).unwrap();
            assert_eq!(layer.is_recurrent(), matches!(g, LayerGradients::Recurrent(_)));
            let shapes: Vec<_> = g.parameter_grads().iter().map(|m| m.shape()).collect();
            let expected: Vec<_> = layer.parameters().iter().map(|m| m.shape()).collect();
            assert_eq!(shapes, expected, "layer {}", k);
        }

        // Second pass overwrites in place
        net.backward(&target, &cache, &mut grads, BoundaryGradient::Broadcast)
            .unwrap();
        assert_eq!(grads.len(), net.depth());
    }

    #[test]
    fn test_forward_rejects_wrong_rank() {
        let net = HybridNetwork::new(&ModelConfig::tiny(2), 1).unwrap();
        let mut cache = UnifiedCache::new();
        let flat = VariantTensor::from(Matrix::zeros(4, 2));
        assert!(matches!(
            net.forward(&flat, &mut cache),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_feed_forward_only_network() {
        let config = ModelConfig {
            layers: vec![Relu, Linear],
            layer_dims: vec![4, 1],
            hidden_units: 0,
            input_features: 3,
        };
        let net = HybridNetwork::new(&config, 2).unwrap();
        let mut cache = UnifiedCache::new();
        let mut grads = UnifiedGradients::new();
        let x = VariantTensor::from(Matrix::new((0..6).map(|v| v as f64 * 0.1).collect(), 2, 3));
        let pred = net.forward(&x, &mut cache).unwrap();
        assert_eq!(pred.shape(), [2, 1]);

        net.backward(&Matrix::zeros(2, 1), &cache, &mut grads, BoundaryGradient::Broadcast)
            .unwrap();
        assert_eq!(grads.len(), 2);
    }

    #[test]
    fn test_backward_without_forward_is_missing_cache() {
        let net = HybridNetwork::new(&ModelConfig::tiny(2), 1).unwrap();
        let cache = UnifiedCache::new();
        let mut grads = UnifiedGradients::new();
        let result = net.backward(&Matrix::zeros(4, 1), &cache, &mut grads, BoundaryGradient::Broadcast);
        assert!(matches!(result, Err(Error::MissingCache { layer: 1 })));
    }

    #[test]
    fn test_last_step_gradients_match_finite_differences() {
        let config = small_config();
        let net = HybridNetwork::new(&config, 11).unwrap();
        let x = VariantTensor::from(sequence(3, 3, 2));
        let target = Matrix::new(vec![0.2, -0.4, 0.9], 3, 1);

        let loss = |n: &HybridNetwork| -> f64 {
            let mut cache = UnifiedCache::new();
            let pred = n.forward(&x, &mut cache).unwrap();
            mse(&pred, &target, 3).unwrap()
        };

        let mut cache = UnifiedCache::new();
        let mut grads = UnifiedGradients::new();
        net.forward(&x, &mut cache).unwrap();
        net.backward(&target, &cache, &mut grads, BoundaryGradient::LastStep)
            .unwrap();
        assert_eq!(grads.len(), net.depth());

        let h = 1e-6;
        for k in 0..net.depth() {
            let analytic = grads.get(k).unwrap().parameter_grads();
            for p in 0..analytic.len() {
                for i in 0..analytic[p].data.len() {
                    let mut plus = net.clone();
                    let mut minus = net.clone();
                    plus.layer_mut(k).parameters_mut()[p].data[i] += h;
                    minus.layer_mut(k).parameters_mut()[p].data[i] -= h;
                    let numeric = (loss(&plus) - loss(&minus)) / (2.0 * h);
                    assert_abs_diff_eq!(analytic[p].data[i], numeric, epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_broadcast_mode_differs_from_last_step() {
        let net = HybridNetwork::new(&ModelConfig::tiny(2), 7).unwrap();
        let x = VariantTensor::from(sequence(2, 4, 2));
        let target = Matrix::new(vec![1.0, -1.0], 2, 1);
        let mut cache = UnifiedCache::new();
        net.forward(&x, &mut cache).unwrap();

        let mut broadcast = UnifiedGradients::new();
        let mut last = UnifiedGradients::new();
        net.backward(&target, &cache, &mut broadcast, BoundaryGradient::Broadcast)
            .unwrap();
        net.backward(&target, &cache, &mut last, BoundaryGradient::LastStep)
            .unwrap();

        // The head sees the same seed either way
        assert_eq!(
            broadcast.get(1).unwrap().parameter_grads()[0],
            last.get(1).unwrap().parameter_grads()[0]
        );
        assert_ne!(
            broadcast.get(0).unwrap().parameter_grads()[0],
            last.get(0).unwrap().parameter_grads()[0]
        );
    }
}
