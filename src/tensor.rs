//! Tensor Types for Sequence Training
//!
//! This module provides the two tensor shapes the engine moves between:
//!
//! - **Matrix**: 2D, batch-major activations `[batch, features]` or weights
//!   `[features_out, features_in]`
//! - **Tensor3D**: 3D recurrent activations `[batch, timesteps, features]`
//! - **VariantTensor**: either of the two, for inputs whose shape depends on
//!   whether the first layer is recurrent
//!
//! ## Memory Layout
//!
//! Both types keep a flat `Vec<f64>` in row-major order:
//!
//! ```text
//! Matrix [2, 3]:        [r0c0, r0c1, r0c2, r1c0, r1c1, r1c2]
//! Tensor3D [B, T, F]:   index(b, t, f) = (b * T + t) * F + f
//! ```
//!
//! ## Example
//!
//! ```rust
//! use hybridnet::Matrix;
//!
//! let a = Matrix::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
//! let b = Matrix::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], 3, 2);
//! let c = a.matmul(&b);
//! assert_eq!(c.shape(), [2, 2]);
//! ```
//!
//! ## Performance
//!
//! Matrix multiplication and element-wise operations use Rayon. Matrix
//! multiplication falls back to a sequential loop below a small work threshold
//! where thread overhead would dominate.

use crate::error::{Error, Result};
use rayon::prelude::*;

/// A dense row-major 2D matrix of `f64`.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    /// Flat storage, `rows * cols` elements
    pub data: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

impl Matrix {
    /// Create a matrix from flat row-major data
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`
    pub fn new(data: Vec<f64>, rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "Data length ({}) doesn't match shape [{}, {}]",
            data.len(),
            rows,
            cols
        );
        Self { data, rows, cols }
    }

    /// Create a matrix filled with zeros
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(vec![0.0; rows * cols], rows, cols)
    }

    /// Create a matrix filled with a constant
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self::new(vec![value; rows * cols], rows, cols)
    }

    /// Build a matrix from nested rows
    ///
    /// Returns `ShapeMismatch` if the rows are ragged.
    ///
    /// ```rust
    /// # use hybridnet::Matrix;
    /// let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
    /// assert_eq!(m.get(1, 0), 3.0);
    /// ```
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            if row.len() != n_cols {
                return Err(Error::shape("matrix row", &[n_cols], &[row.len()]));
            }
            data.extend(row);
        }
        Ok(Self::new(data, n_rows, n_cols))
    }

    /// `[rows, cols]`
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Borrow one row as a slice
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    #[inline(always)]
    fn matmul_inner(a_val: f64, b: &[f64], result: &mut [f64]) {
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a_val * b_val;
        }
    }

    /// Matrix multiplication `[m, k] @ [k, n] -> [m, n]`
    ///
    /// # Panics
    ///
    /// Panics if the inner dimensions differ
    pub fn matmul(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, other.rows,
            "Matrix dimensions incompatible: [{}, {}] @ [{}, {}]",
            self.rows, self.cols, other.rows, other.cols
        );

        let m = self.rows;
        let n = other.cols;
        let k = self.cols;

        if m == 0 || n == 0 {
            return Matrix::zeros(m, n);
        }

        if m * n * k >= 1_000 {
            return self.matmul_parallel_blocked(other, m, n, k);
        }

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for l in 0..k {
                let a_val = self.data[i * k + l];
                Self::matmul_inner(
                    a_val,
                    &other.data[l * n..(l + 1) * n],
                    &mut result[i * n..(i + 1) * n],
                );
            }
        }
        Matrix::new(result, m, n)
    }

    /// Cache-blocked matmul, parallel over blocks of output rows
    fn matmul_parallel_blocked(&self, other: &Matrix, m: usize, n: usize, k: usize) -> Matrix {
        const BLOCK_SIZE: usize = 8;

        let mut result = vec![0.0; m * n];

        result
            .par_chunks_mut(BLOCK_SIZE * n)
            .enumerate()
            .for_each(|(block_i, result_block)| {
                let i_start = block_i * BLOCK_SIZE;
                let i_end = (i_start + BLOCK_SIZE).min(m);

                for j_start in (0..n).step_by(BLOCK_SIZE) {
                    let j_end = (j_start + BLOCK_SIZE).min(n);

                    for k_start in (0..k).step_by(BLOCK_SIZE) {
                        let k_end = (k_start + BLOCK_SIZE).min(k);

                        for i in i_start..i_end {
                            let row_offset = (i - i_start) * n;
                            for k_idx in k_start..k_end {
                                let a_val = self.data[i * k + k_idx];
                                Self::matmul_inner(
                                    a_val,
                                    &other.data[k_idx * n + j_start..k_idx * n + j_end],
                                    &mut result_block[row_offset + j_start..row_offset + j_end],
                                );
                            }
                        }
                    }
                }
            });

        Matrix::new(result, m, n)
    }

    /// Swap rows and columns
    pub fn transpose(&self) -> Matrix {
        let mut result = vec![0.0; self.data.len()];
        for i in 0..self.rows {
            for j in 0..self.cols {
                result[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        Matrix::new(result, self.cols, self.rows)
    }

    /// Element-wise addition
    ///
    /// Supports an exact shape match or a `[1, cols]` row broadcast over every
    /// row (bias addition).
    pub fn add(&self, other: &Matrix) -> Matrix {
        if self.shape() == other.shape() {
            let result = self
                .data
                .par_iter()
                .zip(&other.data)
                .map(|(a, b)| a + b)
                .collect();
            return Matrix::new(result, self.rows, self.cols);
        }

        if other.rows == 1 && other.cols == self.cols {
            let cols = self.cols;
            let result = self
                .data
                .par_iter()
                .enumerate()
                .map(|(i, a)| a + other.data[i % cols])
                .collect();
            return Matrix::new(result, self.rows, self.cols);
        }

        panic!(
            "Unsupported broadcast for add: {:?} + {:?}",
            self.shape(),
            other.shape()
        );
    }

    /// In-place element-wise accumulation (shapes must match)
    pub fn add_assign(&mut self, other: &Matrix) {
        assert_eq!(self.shape(), other.shape(), "Shapes must match for add_assign");
        self.data
            .par_iter_mut()
            .zip(&other.data)
            .for_each(|(a, b)| *a += b);
    }

    /// Element-wise subtraction
    pub fn sub(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.shape(), other.shape(), "Shapes must match for subtraction");
        let result = self
            .data
            .par_iter()
            .zip(&other.data)
            .map(|(a, b)| a - b)
            .collect();
        Matrix::new(result, self.rows, self.cols)
    }

    /// Element-wise (Hadamard) product
    pub fn hadamard(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.shape(), other.shape(), "Shapes must match for hadamard");
        let result = self
            .data
            .par_iter()
            .zip(&other.data)
            .map(|(a, b)| a * b)
            .collect();
        Matrix::new(result, self.rows, self.cols)
    }

    /// Multiply all elements by a scalar
    pub fn scale(&self, scalar: f64) -> Matrix {
        self.map(|x| x * scalar)
    }

    /// Apply a function to every element
    pub fn map<F>(&self, f: F) -> Matrix
    where
        F: Fn(f64) -> f64 + Sync + Send,
    {
        let result = self.data.par_iter().map(|&x| f(x)).collect();
        Matrix::new(result, self.rows, self.cols)
    }

    /// Sum over the batch dimension: `[rows, cols] -> [1, cols]`
    pub fn sum_rows(&self) -> Matrix {
        let mut result = vec![0.0; self.cols];
        for r in 0..self.rows {
            for (acc, &val) in result.iter_mut().zip(self.row(r)) {
                *acc += val;
            }
        }
        Matrix::new(result, 1, self.cols)
    }

    /// Sum of squared elements
    pub fn sum_squares(&self) -> f64 {
        self.data.par_iter().map(|&x| x * x).sum()
    }

    /// Concatenate along columns: `[r, a] | [r, b] -> [r, a + b]`
    pub fn hstack(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.rows, other.rows, "Row counts must match for hstack");
        let cols = self.cols + other.cols;
        let mut data = Vec::with_capacity(self.rows * cols);
        for r in 0..self.rows {
            data.extend_from_slice(self.row(r));
            data.extend_from_slice(other.row(r));
        }
        Matrix::new(data, self.rows, cols)
    }

    /// Split columns at `at`: `[r, c] -> ([r, at], [r, c - at])`
    pub fn split_cols(&self, at: usize) -> (Matrix, Matrix) {
        assert!(at <= self.cols, "Split point {} beyond {} columns", at, self.cols);
        let mut left = Vec::with_capacity(self.rows * at);
        let mut right = Vec::with_capacity(self.rows * (self.cols - at));
        for r in 0..self.rows {
            let row = self.row(r);
            left.extend_from_slice(&row[..at]);
            right.extend_from_slice(&row[at..]);
        }
        (
            Matrix::new(left, self.rows, at),
            Matrix::new(right, self.rows, self.cols - at),
        )
    }

    /// Gather rows by index, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Matrix::new(data, indices.len(), self.cols)
    }
}

/// A dense `[batch, timesteps, features]` tensor of `f64`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor3D {
    pub data: Vec<f64>,
    pub batch: usize,
    pub timesteps: usize,
    pub features: usize,
}

impl Tensor3D {
    /// # Panics
    ///
    /// Panics if `data.len() != batch * timesteps * features`
    pub fn new(data: Vec<f64>, batch: usize, timesteps: usize, features: usize) -> Self {
        assert_eq!(
            data.len(),
            batch * timesteps * features,
            "Data length ({}) doesn't match shape [{}, {}, {}]",
            data.len(),
            batch,
            timesteps,
            features
        );
        Self {
            data,
            batch,
            timesteps,
            features,
        }
    }

    pub fn zeros(batch: usize, timesteps: usize, features: usize) -> Self {
        Self::new(vec![0.0; batch * timesteps * features], batch, timesteps, features)
    }

    /// Build from `[batch][timestep][feature]` nesting
    ///
    /// Returns `ShapeMismatch` if examples disagree on timestep count or
    /// timesteps disagree on feature count.
    pub fn from_nested(values: Vec<Vec<Vec<f64>>>) -> Result<Self> {
        let batch = values.len();
        let timesteps = values.first().map_or(0, Vec::len);
        let features = values
            .first()
            .and_then(|example| example.first())
            .map_or(0, Vec::len);

        let mut data = Vec::with_capacity(batch * timesteps * features);
        for example in values {
            if example.len() != timesteps {
                return Err(Error::shape("tensor timesteps", &[timesteps], &[example.len()]));
            }
            for step in example {
                if step.len() != features {
                    return Err(Error::shape("tensor features", &[features], &[step.len()]));
                }
                data.extend(step);
            }
        }
        Ok(Self::new(data, batch, timesteps, features))
    }

    /// `[batch, timesteps, features]`
    pub fn shape(&self) -> [usize; 3] {
        [self.batch, self.timesteps, self.features]
    }

    #[inline]
    fn index(&self, b: usize, t: usize, f: usize) -> usize {
        (b * self.timesteps + t) * self.features + f
    }

    pub fn get(&self, b: usize, t: usize, f: usize) -> f64 {
        self.data[self.index(b, t, f)]
    }

    /// Slice out one timestep across the batch: `[batch, features]`
    pub fn timestep(&self, t: usize) -> Matrix {
        assert!(t < self.timesteps, "Timestep {} out of range {}", t, self.timesteps);
        let mut data = Vec::with_capacity(self.batch * self.features);
        for b in 0..self.batch {
            let start = self.index(b, t, 0);
            data.extend_from_slice(&self.data[start..start + self.features]);
        }
        Matrix::new(data, self.batch, self.features)
    }

    /// Overwrite one timestep with a `[batch, features]` matrix
    pub fn set_timestep(&mut self, t: usize, values: &Matrix) {
        assert_eq!(
            values.shape(),
            [self.batch, self.features],
            "Timestep slice shape mismatch"
        );
        for b in 0..self.batch {
            let start = self.index(b, t, 0);
            self.data[start..start + self.features].copy_from_slice(values.row(b));
        }
    }

    /// Element-wise accumulation (shapes must match)
    pub fn add_assign(&mut self, other: &Tensor3D) {
        assert_eq!(self.shape(), other.shape(), "Shapes must match for add_assign");
        self.data
            .par_iter_mut()
            .zip(&other.data)
            .for_each(|(a, b)| *a += b);
    }

    /// Gather whole examples by batch index, in the given order
    pub fn select_examples(&self, indices: &[usize]) -> Tensor3D {
        let stride = self.timesteps * self.features;
        let mut data = Vec::with_capacity(indices.len() * stride);
        for &i in indices {
            data.extend_from_slice(&self.data[i * stride..(i + 1) * stride]);
        }
        Tensor3D::new(data, indices.len(), self.timesteps, self.features)
    }
}

/// Network input that is 2D for feed-forward-first models and 3D for
/// recurrent-first models.
#[derive(Clone, Debug, PartialEq)]
pub enum VariantTensor {
    Matrix(Matrix),
    Sequence(Tensor3D),
}

impl VariantTensor {
    /// Number of examples (leading dimension)
    pub fn batch_size(&self) -> usize {
        match self {
            VariantTensor::Matrix(m) => m.rows,
            VariantTensor::Sequence(t) => t.batch,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            VariantTensor::Matrix(m) => m.shape().to_vec(),
            VariantTensor::Sequence(t) => t.shape().to_vec(),
        }
    }

    /// Gather examples by index along the batch dimension
    pub fn select_rows(&self, indices: &[usize]) -> VariantTensor {
        match self {
            VariantTensor::Matrix(m) => VariantTensor::Matrix(m.select_rows(indices)),
            VariantTensor::Sequence(t) => VariantTensor::Sequence(t.select_examples(indices)),
        }
    }
}

impl From<Matrix> for VariantTensor {
    fn from(m: Matrix) -> Self {
        VariantTensor::Matrix(m)
    }
}

impl From<Tensor3D> for VariantTensor {
    fn from(t: Tensor3D) -> Self {
        VariantTensor::Sequence(t)
    }
}
