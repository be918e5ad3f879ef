//! Gated Recurrent Layer (LSTM)
//!
//! A memory-cell recurrent layer run over a whole `[batch, timesteps, features]`
//! sequence, with backpropagation through time.
//!
//! ## Cell Step
//!
//! With `concat = [a_prev | x_t]` of shape `[batch, n_a + n_x]`:
//!
//! ```text
//! f  = σ(concat @ Wfᵀ + bf)        forget gate
//! i  = σ(concat @ Wiᵀ + bi)        update gate
//! c̃  = tanh(concat @ Wcᵀ + bc)     candidate cell
//! o  = σ(concat @ Woᵀ + bo)        output gate
//! c  = f ⊙ c_prev + i ⊙ c̃
//! a  = o ⊙ tanh(c)
//! y  = a @ Wyᵀ + by                projected output
//! ```
//!
//! Gate weights are `[n_a, n_a + n_x]`, gate biases `[1, n_a]`, the output
//! projection `Wy` is `[n_y, n_a]` and `by` is `[1, n_y]`. The hidden width is
//! therefore `Wy`'s column count.
//!
//! ## Sequence Outputs
//!
//! The forward pass yields hidden states `A [B, T, n_a]` and projected outputs
//! `Y [B, T, n_y]`. A following recurrent layer consumes `Y` as its input
//! sequence; a following feed-forward layer consumes the last timestep of `A`.
//!
//! ## Backward Through Time
//!
//! Gradients may arrive on the hidden states (`dA`), on the projected outputs
//! (`dY`), or both. Walking `t = T-1 .. 0`, the hidden-state gradient at each
//! step is `dA[t] + dY[t] @ Wy + da_prev(t+1)`, and the cell-state gradient
//! carries across steps through the forget gate. The walk ends with the
//! gradient for the initial hidden state, `da0`.

use super::activation::{
    sigmoid, sigmoid_derivative_from_output, tanh, tanh_derivative_from_output,
};
use super::random_normal;
use crate::error::{Error, Result};
use crate::tensor::{Matrix, Tensor3D};
use rand::rngs::StdRng;

/// Parameter names, in the order of [`LstmLayer::parameters`]
pub const LSTM_PARAM_NAMES: [&str; 10] = [
    "Wf", "bf", "Wi", "bi", "Wc", "bc", "Wo", "bo", "Wy", "by",
];

/// LSTM layer parameters
#[derive(Clone, Debug)]
pub struct LstmLayer {
    pub wf: Matrix,
    pub bf: Matrix,
    pub wi: Matrix,
    pub bi: Matrix,
    pub wc: Matrix,
    pub bc: Matrix,
    pub wo: Matrix,
    pub bo: Matrix,
    pub wy: Matrix,
    pub by: Matrix,
}

impl LstmLayer {
    /// Create an LSTM layer
    ///
    /// # Arguments
    ///
    /// * `n_x` - Input features per timestep
    /// * `n_a` - Hidden units
    /// * `n_y` - Projected output width
    /// * `rng` - Seeded generator for weight initialization
    ///
    /// # Initialization
    ///
    /// Gate weights are normal with scale `√(1/(n_a+n_x))`, the projection
    /// with `√(1/n_a)`. Biases are zero except the forget gate, which starts
    /// at 1.0 so early training keeps the cell state.
    pub fn new(n_x: usize, n_a: usize, n_y: usize, rng: &mut StdRng) -> Self {
        let concat = n_a + n_x;
        let gate_scale = (1.0 / concat as f64).sqrt();
        let proj_scale = (1.0 / n_a as f64).sqrt();
        Self {
            wf: random_normal(n_a, concat, gate_scale, rng),
            bf: Matrix::filled(1, n_a, 1.0),
            wi: random_normal(n_a, concat, gate_scale, rng),
            bi: Matrix::zeros(1, n_a),
            wc: random_normal(n_a, concat, gate_scale, rng),
            bc: Matrix::zeros(1, n_a),
            wo: random_normal(n_a, concat, gate_scale, rng),
            bo: Matrix::zeros(1, n_a),
            wy: random_normal(n_y, n_a, proj_scale, rng),
            by: Matrix::zeros(1, n_y),
        }
    }

    /// Hidden units, read from the output projection's column count
    pub fn hidden_width(&self) -> usize {
        self.wy.cols
    }

    pub fn input_width(&self) -> usize {
        self.wf.cols - self.hidden_width()
    }

    pub fn output_width(&self) -> usize {
        self.wy.rows
    }

    /// Single timestep
    ///
    /// Returns `(a_next, c_next, y_t, step_cache)`.
    pub fn cell_forward(
        &self,
        xt: &Matrix,
        a_prev: &Matrix,
        c_prev: &Matrix,
    ) -> (Matrix, Matrix, Matrix, LstmStepCache) {
        let concat = a_prev.hstack(xt);

        let ft = sigmoid(&concat.matmul(&self.wf.transpose()).add(&self.bf));
        let it = sigmoid(&concat.matmul(&self.wi.transpose()).add(&self.bi));
        let cct = tanh(&concat.matmul(&self.wc.transpose()).add(&self.bc));
        let ot = sigmoid(&concat.matmul(&self.wo.transpose()).add(&self.bo));

        let c_next = ft.hadamard(c_prev).add(&it.hadamard(&cct));
        let a_next = ot.hadamard(&tanh(&c_next));
        let yt = a_next.matmul(&self.wy.transpose()).add(&self.by);

        let cache = LstmStepCache {
            a_next: a_next.clone(),
            c_next: c_next.clone(),
            a_prev: a_prev.clone(),
            c_prev: c_prev.clone(),
            ft,
            it,
            cct,
            ot,
            xt: xt.clone(),
        };
        (a_next, c_next, yt, cache)
    }

    /// Run the layer over the full sequence
    ///
    /// # Arguments
    ///
    /// * `x` - Input sequence `[batch, T, n_x]`
    /// * `a0` - Initial hidden state `[batch, n_a]`; the cell state starts at zero
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `x` or `a0` have the wrong widths, `EmptySequence`
    /// if `x` has no timesteps.
    pub fn forward(&self, x: &Tensor3D, a0: &Matrix) -> Result<LstmCache> {
        let [batch, timesteps, n_x] = x.shape();
        let n_a = self.hidden_width();
        let n_y = self.output_width();

        if n_x != self.input_width() {
            return Err(Error::shape(
                "recurrent input",
                &[batch, timesteps, self.input_width()],
                &x.shape(),
            ));
        }
        if a0.shape() != [batch, n_a] {
            return Err(Error::shape("initial hidden state", &[batch, n_a], &a0.shape()));
        }
        if timesteps == 0 {
            return Err(Error::EmptySequence);
        }

        let mut a = Tensor3D::zeros(batch, timesteps, n_a);
        let mut c = Tensor3D::zeros(batch, timesteps, n_a);
        let mut y = Tensor3D::zeros(batch, timesteps, n_y);
        let mut steps = Vec::with_capacity(timesteps);

        let mut a_prev = a0.clone();
        let mut c_prev = Matrix::zeros(batch, n_a);

        for t in 0..timesteps {
            let xt = x.timestep(t);
            let (a_next, c_next, yt, step) = self.cell_forward(&xt, &a_prev, &c_prev);
            a.set_timestep(t, &a_next);
            c.set_timestep(t, &c_next);
            y.set_timestep(t, &yt);
            steps.push(step);
            a_prev = a_next;
            c_prev = c_next;
        }

        Ok(LstmCache {
            a,
            y,
            c,
            steps,
            x: x.clone(),
        })
    }

    /// Backward through one timestep
    ///
    /// Accumulates gate parameter gradients into `grads` and returns
    /// `(da_prev, dc_prev, dx_t)`.
    pub fn cell_backward(
        &self,
        da_next: &Matrix,
        dc_next: &Matrix,
        step: &LstmStepCache,
        grads: &mut LstmGradients,
    ) -> (Matrix, Matrix, Matrix) {
        let n_a = self.hidden_width();
        let tanh_c = tanh(&step.c_next);

        let dot = da_next
            .hadamard(&tanh_c)
            .hadamard(&sigmoid_derivative_from_output(&step.ot));
        let dc = dc_next.add(
            &da_next
                .hadamard(&step.ot)
                .hadamard(&tanh_derivative_from_output(&tanh_c)),
        );
        let dcct = dc
            .hadamard(&step.it)
            .hadamard(&tanh_derivative_from_output(&step.cct));
        let dit = dc
            .hadamard(&step.cct)
            .hadamard(&sigmoid_derivative_from_output(&step.it));
        let dft = dc
            .hadamard(&step.c_prev)
            .hadamard(&sigmoid_derivative_from_output(&step.ft));

        let concat = step.a_prev.hstack(&step.xt);
        for (dgate, dw, db) in [
            (&dft, &mut grads.dwf, &mut grads.dbf),
            (&dit, &mut grads.dwi, &mut grads.dbi),
            (&dcct, &mut grads.dwc, &mut grads.dbc),
            (&dot, &mut grads.dwo, &mut grads.dbo),
        ] {
            dw.add_assign(&dgate.transpose().matmul(&concat));
            db.add_assign(&dgate.sum_rows());
        }

        let mut dconcat = dft.matmul(&self.wf);
        dconcat.add_assign(&dit.matmul(&self.wi));
        dconcat.add_assign(&dcct.matmul(&self.wc));
        dconcat.add_assign(&dot.matmul(&self.wo));

        let (da_prev, dxt) = dconcat.split_cols(n_a);
        let dc_prev = dc.hadamard(&step.ft);
        (da_prev, dc_prev, dxt)
    }

    /// Backpropagation through time over the cached sequence
    ///
    /// # Arguments
    ///
    /// * `da` - Gradient on hidden states `[batch, T, n_a]`, if any
    /// * `dy` - Gradient on projected outputs `[batch, T, n_y]`, if any
    /// * `cache` - Cache from [`LstmLayer::forward`]
    ///
    /// # Returns
    ///
    /// Parameter gradients, `dx [batch, T, n_x]` and `da0 [batch, n_a]`.
    pub fn backward(
        &self,
        da: Option<&Tensor3D>,
        dy: Option<&Tensor3D>,
        cache: &LstmCache,
    ) -> Result<LstmGradients> {
        let [batch, timesteps, n_x] = cache.x.shape();
        let n_a = self.hidden_width();
        let n_y = self.output_width();

        if let Some(da) = da {
            if da.shape() != [batch, timesteps, n_a] {
                return Err(Error::shape(
                    "hidden-state gradient",
                    &[batch, timesteps, n_a],
                    &da.shape(),
                ));
            }
        }
        if let Some(dy) = dy {
            if dy.shape() != [batch, timesteps, n_y] {
                return Err(Error::shape(
                    "projected-output gradient",
                    &[batch, timesteps, n_y],
                    &dy.shape(),
                ));
            }
        }

        let mut grads = LstmGradients::zeros(self, batch, timesteps, n_x);
        let mut da_next = Matrix::zeros(batch, n_a);
        let mut dc_next = Matrix::zeros(batch, n_a);

        for t in (0..timesteps).rev() {
            let step = &cache.steps[t];
            let mut da_t = da_next;
            if let Some(da) = da {
                da_t.add_assign(&da.timestep(t));
            }
            if let Some(dy) = dy {
                let dyt = dy.timestep(t);
                grads.dwy.add_assign(&dyt.transpose().matmul(&step.a_next));
                grads.dby.add_assign(&dyt.sum_rows());
                da_t.add_assign(&dyt.matmul(&self.wy));
            }

            let (da_prev, dc_prev, dxt) = self.cell_backward(&da_t, &dc_next, step, &mut grads);
            grads.dx.set_timestep(t, &dxt);
            da_next = da_prev;
            dc_next = dc_prev;
        }

        grads.da0 = da_next;
        Ok(grads)
    }

    pub fn parameters(&self) -> Vec<&Matrix> {
        vec![
            &self.wf, &self.bf, &self.wi, &self.bi, &self.wc, &self.bc, &self.wo, &self.bo,
            &self.wy, &self.by,
        ]
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Matrix> {
        vec![
            &mut self.wf,
            &mut self.bf,
            &mut self.wi,
            &mut self.bi,
            &mut self.wc,
            &mut self.bc,
            &mut self.wo,
            &mut self.bo,
            &mut self.wy,
            &mut self.by,
        ]
    }
}

/// Values saved by one cell step
#[derive(Clone, Debug)]
pub struct LstmStepCache {
    pub a_next: Matrix,
    pub c_next: Matrix,
    pub a_prev: Matrix,
    pub c_prev: Matrix,
    pub ft: Matrix,
    pub it: Matrix,
    pub cct: Matrix,
    pub ot: Matrix,
    pub xt: Matrix,
}

/// Values saved by a full-sequence forward pass
#[derive(Clone, Debug)]
pub struct LstmCache {
    /// Hidden states `[B, T, n_a]`
    pub a: Tensor3D,
    /// Projected outputs `[B, T, n_y]`, the next recurrent layer's input
    pub y: Tensor3D,
    /// Cell states `[B, T, n_a]`
    pub c: Tensor3D,
    pub steps: Vec<LstmStepCache>,
    /// Layer input `[B, T, n_x]`
    pub x: Tensor3D,
}

/// Gradients for an LSTM layer
#[derive(Clone, Debug)]
pub struct LstmGradients {
    pub dwf: Matrix,
    pub dbf: Matrix,
    pub dwi: Matrix,
    pub dbi: Matrix,
    pub dwc: Matrix,
    pub dbc: Matrix,
    pub dwo: Matrix,
    pub dbo: Matrix,
    pub dwy: Matrix,
    pub dby: Matrix,
    /// Gradient on the input sequence `[B, T, n_x]`
    pub dx: Tensor3D,
    /// Gradient on the initial hidden state `[B, n_a]`
    pub da0: Matrix,
}

impl LstmGradients {
    fn zeros(layer: &LstmLayer, batch: usize, timesteps: usize, n_x: usize) -> Self {
        let z = |m: &Matrix| Matrix::zeros(m.rows, m.cols);
        Self {
            dwf: z(&layer.wf),
            dbf: z(&layer.bf),
            dwi: z(&layer.wi),
            dbi: z(&layer.bi),
            dwc: z(&layer.wc),
            dbc: z(&layer.bc),
            dwo: z(&layer.wo),
            dbo: z(&layer.bo),
            dwy: z(&layer.wy),
            dby: z(&layer.by),
            dx: Tensor3D::zeros(batch, timesteps, n_x),
            da0: Matrix::zeros(batch, layer.hidden_width()),
        }
    }

    /// Parameter gradients, aligned with [`LstmLayer::parameters`]
    pub fn parameter_grads(&self) -> Vec<&Matrix> {
        vec![
            &self.dwf, &self.dbf, &self.dwi, &self.dbi, &self.dwc, &self.dbc, &self.dwo,
            &self.dbo, &self.dwy, &self.dby,
        ]
    }

    pub fn parameter_grads_mut(&mut self) -> Vec<&mut Matrix> {
        vec![
            &mut self.dwf,
            &mut self.dbf,
            &mut self.dwi,
            &mut self.dbi,
            &mut self.dwc,
            &mut self.dbc,
            &mut self.dwo,
            &mut self.dbo,
            &mut self.dwy,
            &mut self.dby,
        ]
    }
}
