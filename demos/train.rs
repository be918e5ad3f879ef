//! Train a Hybrid Network on a Synthetic Sine Wave
//!
//! Each example is a window of `timesteps` consecutive samples of a sine wave
//! (plus a little noise) and the target is the next sample.
//!
//! ## Usage
//!
//! ```bash
//! # Default two-LSTM, three-dense stack
//! cargo run --release --example train
//!
//! # Small and fast
//! cargo run --release --example train -- --tiny --epochs 50
//!
//! # Configs from JSON, metrics to CSV
//! cargo run --release --example train -- \
//!     --model-config model.json --training-config training.json --log training_log.csv
//!
//! # Per-layer shapes
//! RUST_LOG=hybridnet=debug cargo run --example train -- --tiny --epochs 1
//! ```

use clap::Parser;
use hybridnet::{
    train_val_split, BoundaryGradient, Matrix, ModelConfig, Tensor3D, Trainer, TrainingConfig,
    TrainingLogger, VariantTensor,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "train", about = "Train an LSTM + dense network on a sine wave")]
struct Args {
    /// Use the one-LSTM, one-dense preset
    #[arg(long)]
    tiny: bool,

    /// Model config JSON (overrides --tiny)
    #[arg(long)]
    model_config: Option<String>,

    /// Training config JSON (flags below override it)
    #[arg(long)]
    training_config: Option<String>,

    /// Number of windows in the dataset
    #[arg(long, default_value = "512")]
    examples: usize,

    /// Window length
    #[arg(long, default_value = "12")]
    timesteps: usize,

    /// Fraction held out for validation
    #[arg(long, default_value = "0.2")]
    val_fraction: f64,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Gradient clipping max norm
    #[arg(long)]
    grad_clip: Option<f64>,

    /// Route gradients into recurrent layers on the last timestep only
    #[arg(long)]
    last_step: bool,

    /// CSV file for per-epoch metrics
    #[arg(long)]
    log: Option<String>,
}

/// Sliding windows over `sin(0.1 t) + noise`
fn sine_windows(examples: usize, timesteps: usize, seed: u64) -> (VariantTensor, Matrix) {
    let mut rng = StdRng::seed_from_u64(seed);
    let series: Vec<f64> = (0..examples + timesteps)
        .map(|t| (t as f64 * 0.1).sin() + rng.gen_range(-0.05..0.05))
        .collect();

    let mut x = Vec::with_capacity(examples * timesteps);
    let mut y = Vec::with_capacity(examples);
    for start in 0..examples {
        x.extend_from_slice(&series[start..start + timesteps]);
        y.push(series[start + timesteps]);
    }
    (
        Tensor3D::new(x, examples, timesteps, 1).into(),
        Matrix::new(y, examples, 1),
    )
}

fn main() -> hybridnet::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let model_config = match &args.model_config {
        Some(path) => ModelConfig::from_json_file(path)?,
        None if args.tiny => ModelConfig::tiny(1),
        None => ModelConfig::stacked(1),
    };

    let mut training = match &args.training_config {
        Some(path) => TrainingConfig::from_json_file(path)?,
        None if args.tiny => TrainingConfig::tiny(),
        None => TrainingConfig {
            epochs: 20,
            ..TrainingConfig::default()
        },
    };
    if let Some(epochs) = args.epochs {
        training.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        training.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        training.learning_rate = lr;
    }
    if let Some(seed) = args.seed {
        training.seed = seed;
    }
    if args.grad_clip.is_some() {
        training.grad_clip = args.grad_clip;
    }
    if args.last_step {
        training.boundary_gradient = BoundaryGradient::LastStep;
    }

    let (x, y) = sine_windows(args.examples, args.timesteps, training.seed);
    let ((x_train, y_train), validation) = train_val_split(&x, &y, args.val_fraction)?;
    info!(
        train = x_train.batch_size(),
        validation = validation.0.batch_size(),
        timesteps = args.timesteps,
        "built sine dataset"
    );

    let mut logger = args.log.as_ref().map(TrainingLogger::new).transpose()?;
    let mut trainer = Trainer::new(model_config, training)?;
    let history = trainer.fit(&x_train, &y_train, Some(&validation), logger.as_mut())?;

    if let Some(last) = history.last() {
        info!(final_train_loss = *last, "training finished");
    }
    if validation.0.batch_size() > 0 {
        let val_loss = trainer.evaluate(&validation.0, &validation.1)?;
        info!(val_loss, "final validation loss");
    }

    Ok(())
}
