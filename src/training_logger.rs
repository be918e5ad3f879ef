//! Training Logger and Utilities
//!
//! Per-epoch metric logging to CSV and a temporal train/validation split.
//!
//! ## Components
//!
//! - **TrainingLogger**: Appends one CSV row per epoch, with elapsed time
//! - **train_val_split**: Holds out the tail of a dataset for validation
//!
//! ## Example
//!
//! ```rust,no_run
//! use hybridnet::TrainingLogger;
//!
//! let mut logger = TrainingLogger::new("training_log.csv")?;
//! logger.log(1, 3e-4, 0.052, Some(0.061))?;
//! # Ok::<(), hybridnet::Error>(())
//! ```
//!
//! ## CSV Format
//!
//! - `epoch`: Epoch number, starting at 1
//! - `elapsed_seconds`: Time since the logger was created
//! - `learning_rate`: Learning rate used for the epoch
//! - `train_loss`: Average training loss per example
//! - `val_loss`: Validation MSE, empty when there is no validation set

use crate::error::{Error, Result};
use crate::tensor::{Matrix, VariantTensor};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Inputs and targets of one dataset
pub type Dataset = (VariantTensor, Matrix);

/// CSV logger for per-epoch training metrics
///
/// # Fields
///
/// - `log_file`: Output CSV file
/// - `start_time`: When training started (for elapsed time calculation)
/// - `last_log_time`: Last log timestamp (for epoch timing)
pub struct TrainingLogger {
    log_file: BufWriter<File>,
    start_time: Instant,
    last_log_time: Instant,
}

impl TrainingLogger {
    /// Create the CSV file and write its header
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let mut log_file = BufWriter::new(File::create(log_path)?);
        writeln!(log_file, "epoch,elapsed_seconds,learning_rate,train_loss,val_loss")?;
        log_file.flush()?;

        let now = Instant::now();
        Ok(Self {
            log_file,
            start_time: now,
            last_log_time: now,
        })
    }

    /// Append one epoch's metrics
    ///
    /// The row is flushed immediately so a crashed run keeps its history.
    pub fn log(
        &mut self,
        epoch: usize,
        learning_rate: f64,
        train_loss: f64,
        val_loss: Option<f64>,
    ) -> Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let val = val_loss.map(|v| format!("{:.6}", v)).unwrap_or_default();

        writeln!(
            self.log_file,
            "{},{:.2},{:.6},{:.6},{}",
            epoch, elapsed, learning_rate, train_loss, val
        )?;
        self.log_file.flush()?;

        let epoch_time = self.last_log_time.elapsed().as_secs_f64();
        info!(
            epoch,
            elapsed_seconds = elapsed,
            epoch_seconds = epoch_time,
            "logged epoch metrics"
        );

        self.last_log_time = Instant::now();
        Ok(())
    }
}

/// Split a dataset into training and validation sets
///
/// The validation set is the last `val_fraction` of the examples, so
/// sequential data keeps its temporal order on both sides of the split.
///
/// # Errors
///
/// `InvalidConfig` if `val_fraction` is outside `[0, 1)`, `ShapeMismatch` if
/// inputs and targets disagree on the example count.
///
/// # Example
///
/// ```rust
/// # use hybridnet::{train_val_split, Matrix, Tensor3D, VariantTensor};
/// let x = VariantTensor::from(Tensor3D::zeros(10, 4, 1));
/// let y = Matrix::zeros(10, 1);
/// let ((x_train, y_train), (x_val, y_val)) = train_val_split(&x, &y, 0.2)?;
/// assert_eq!(x_train.batch_size(), 8); // 80% for training
/// assert_eq!(y_val.rows, 2);           // 20% for validation
/// # Ok::<(), hybridnet::Error>(())
/// ```
pub fn train_val_split(
    x: &VariantTensor,
    y: &Matrix,
    val_fraction: f64,
) -> Result<(Dataset, Dataset)> {
    if !(0.0..1.0).contains(&val_fraction) {
        return Err(Error::InvalidConfig(format!(
            "val_fraction must be in [0, 1), got {}",
            val_fraction
        )));
    }
    let examples = x.batch_size();
    if y.rows != examples {
        return Err(Error::shape("split targets", &[examples, y.cols], &y.shape()));
    }

    let split_idx = ((examples as f64) * (1.0 - val_fraction)) as usize;
    let train: Vec<usize> = (0..split_idx).collect();
    let val: Vec<usize> = (split_idx..examples).collect();

    Ok((
        (x.select_rows(&train), y.select_rows(&train)),
        (x.select_rows(&val), y.select_rows(&val)),
    ))
}
