//! Full training-step scenarios through the public API.

use approx::assert_abs_diff_eq;
use hybridnet::cache::{LayerCache, LayerGradients, UnifiedCache, UnifiedGradients};
use hybridnet::loss::mse;
use hybridnet::network::Layer;
use hybridnet::{
    generate_minibatches, BoundaryGradient, Error, HybridNetwork, LayerKind, Matrix, ModelConfig,
    Tensor3D, Trainer, TrainingConfig, VariantTensor,
};

/// 4 examples, 3 timesteps, 2 raw features, one target each
fn small_dataset() -> (VariantTensor, Matrix) {
    let x = Tensor3D::from_nested(vec![
        vec![vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6]],
        vec![vec![-0.1, 0.0], vec![0.2, -0.3], vec![0.4, 0.1]],
        vec![vec![0.9, -0.5], vec![0.7, -0.2], vec![0.6, 0.0]],
        vec![vec![0.0, 0.0], vec![-0.4, 0.8], vec![0.2, 0.2]],
    ])
    .unwrap();
    let y = Matrix::from_rows(vec![vec![0.5], vec![-0.2], vec![0.8], vec![0.1]]).unwrap();
    (x.into(), y)
}

fn recurrent_then_linear() -> ModelConfig {
    ModelConfig {
        layers: vec![LayerKind::Recurrent, LayerKind::Linear],
        layer_dims: vec![4, 1],
        hidden_units: 4,
        input_features: 2,
    }
}

fn parameter_shapes(trainer: &Trainer) -> Vec<(String, [usize; 2])> {
    trainer
        .network()
        .named_parameters()
        .into_iter()
        .map(|(name, p)| (name, p.shape()))
        .collect()
}

#[test]
fn single_step_recurrent_then_linear() {
    let (x, y) = small_dataset();
    let config = TrainingConfig {
        batch_size: 4,
        ..TrainingConfig::default()
    };
    let mut trainer = Trainer::new(recurrent_then_linear(), config).unwrap();
    let shapes_before = parameter_shapes(&trainer);

    let batches = generate_minibatches(&x, &y, 4, 1).unwrap();
    assert_eq!(batches.len(), 1);
    let loss = trainer.train_step(&batches[0]).unwrap();

    assert_eq!(trainer.prediction().unwrap().shape(), [4, 1]);
    assert!(loss >= 0.0);
    assert!(loss.is_finite());
    assert_eq!(parameter_shapes(&trainer), shapes_before);

    // One cache and one gradient entry per layer
    assert_eq!(trainer.cache().len(), 2);
    assert_eq!(trainer.gradients().len(), 2);
    assert!(matches!(trainer.cache().get(0).unwrap(), LayerCache::Recurrent(_)));
    assert!(matches!(trainer.cache().get(1).unwrap(), LayerCache::Dense(_)));
    assert!(matches!(trainer.gradients().get(0).unwrap(), LayerGradients::Recurrent(_)));
    assert!(matches!(trainer.gradients().get(1).unwrap(), LayerGradients::Dense(_)));
}

#[test]
fn repeated_steps_replace_entries_in_place() {
    let (x, y) = small_dataset();
    let config = TrainingConfig {
        batch_size: 2,
        ..TrainingConfig::default()
    };
    let mut trainer = Trainer::new(ModelConfig::stacked(2), config).unwrap();

    for epoch in 0..3 {
        trainer.train_epoch(&x, &y, epoch).unwrap();
        assert_eq!(trainer.cache().len(), 5);
        assert_eq!(trainer.gradients().len(), 5);
    }
    assert_eq!(trainer.optimizer().t, 6);
}

#[test]
fn stacked_network_gradients_match_finite_differences() {
    let (x, y) = small_dataset();
    let config = ModelConfig {
        layers: vec![
            LayerKind::Recurrent,
            LayerKind::Recurrent,
            LayerKind::Relu,
            LayerKind::Linear,
        ],
        layer_dims: vec![3, 3, 4, 1],
        hidden_units: 3,
        input_features: 2,
    };
    let net = HybridNetwork::new(&config, 21).unwrap();

    let mut cache = UnifiedCache::new();
    let mut grads = UnifiedGradients::new();
    net.forward(&x, &mut cache).unwrap();
    net.backward(&y, &cache, &mut grads, BoundaryGradient::LastStep)
        .unwrap();

    let loss = |n: &HybridNetwork| {
        let mut scratch = UnifiedCache::new();
        let pred = n.forward(&x, &mut scratch).unwrap();
        mse(&pred, &y, 4).unwrap()
    };

    // Spot-check the first recurrent layer, which sees gradient only through
    // the second recurrent layer's input and initial state.
    let h = 1e-6;
    let analytic = grads.get(0).unwrap().parameter_grads();
    for p in 0..analytic.len() {
        for i in (0..analytic[p].data.len()).step_by(3) {
            let mut plus = net.clone();
            let mut minus = net.clone();
            plus.layer_mut(0).parameters_mut()[p].data[i] += h;
            minus.layer_mut(0).parameters_mut()[p].data[i] -= h;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * h);
            assert_abs_diff_eq!(analytic[p].data[i], numeric, epsilon = 1e-6);
        }
    }
}

#[test]
fn last_recurrent_projection_is_unused_before_dense() {
    let (x, y) = small_dataset();
    let net = HybridNetwork::new(&recurrent_then_linear(), 2).unwrap();
    let mut cache = UnifiedCache::new();
    let mut grads = UnifiedGradients::new();
    net.forward(&x, &mut cache).unwrap();
    net.backward(&y, &cache, &mut grads, BoundaryGradient::Broadcast)
        .unwrap();

    assert!(matches!(net.layer(0), Layer::Recurrent(_)));
    let g = grads.get(0).unwrap().parameter_grads();
    // Wy and by are the last two recurrent parameters
    assert!(g[8].data.iter().all(|&v| v == 0.0));
    assert!(g[9].data.iter().all(|&v| v == 0.0));
}

#[test]
fn interleaved_architecture_is_rejected() {
    let config = ModelConfig {
        layers: vec![LayerKind::Recurrent, LayerKind::Relu, LayerKind::Recurrent, LayerKind::Linear],
        layer_dims: vec![4, 4, 4, 1],
        hidden_units: 4,
        input_features: 2,
    };
    assert!(matches!(
        Trainer::new(config, TrainingConfig::default()),
        Err(Error::InvalidArchitecture(_))
    ));
}

#[test]
fn configs_load_from_json() {
    let model = ModelConfig::from_json_str(
        r#"{
            "layers": ["LSTM", "LSTM", "Relu", "Relu", "Linear"],
            "layer_dims": [2, 64, 64, 32, 1],
            "hidden_units": 64,
            "input_features": 2
        }"#,
    )
    .unwrap();
    assert_eq!(model, ModelConfig::stacked(2));

    let training = TrainingConfig::from_json_str(r#"{ "batch_size": 16, "boundary_gradient": "last_step" }"#)
        .unwrap();
    assert_eq!(training.batch_size, 16);
    assert_eq!(training.learning_rate, 3e-4);
    assert_eq!(training.boundary_gradient, BoundaryGradient::LastStep);
}

#[test]
fn validation_split_feeds_fit() {
    let n = 20;
    let x = Tensor3D::new((0..n * 4).map(|v| (v as f64 * 0.2).sin()).collect(), n, 4, 1);
    let y = Matrix::new((0..n).map(|v| (v as f64 * 0.2).cos()).collect(), n, 1);
    let (train, val) = hybridnet::train_val_split(&x.into(), &y, 0.25).unwrap();

    let config = TrainingConfig {
        epochs: 2,
        ..TrainingConfig::tiny()
    };
    let mut trainer = Trainer::new(ModelConfig::tiny(1), config).unwrap();
    let history = trainer.fit(&train.0, &train.1, Some(&val), None).unwrap();
    assert_eq!(history.len(), 2);
    assert!(trainer.evaluate(&val.0, &val.1).unwrap().is_finite());
}
