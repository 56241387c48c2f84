use candle_core::Tensor;
use candle_nn::VarBuilder;
use candle_nn::rnn::{LSTM, LSTMConfig, LSTMState, RNN};

use crate::backend::HiddenState;
use crate::error::{CaptionError, Result};
use crate::tensor::constant::{NUM_LAYERS, SEQ_DIM, STATE_BATCH_DIM};
use crate::tensor::shape::expect_dims;

/// A single-layer, batch-first LSTM over [`candle_nn::rnn::LSTM`].
///
/// candle keeps the recurrent state as `(batch, hidden_size)`; this wrapper
/// exposes it as `(num_layers, batch, hidden_size)` and checks batch sizes
/// before every step. Parameters use the PyTorch names `weight_ih_l0`,
/// `weight_hh_l0`, `bias_ih_l0` and `bias_hh_l0`.
#[derive(Debug)]
pub struct Lstm {
    inner: LSTM,
    input_size: usize,
    hidden_size: usize,
}

/// Creates an LSTM whose parameters come from `vb`.
pub fn lstm(input_size: usize, hidden_size: usize, vb: VarBuilder) -> Result<Lstm> {
    let inner = candle_nn::rnn::lstm(input_size, hidden_size, LSTMConfig::default(), vb)?;
    Ok(Lstm {
        inner,
        input_size,
        hidden_size,
    })
}

impl Lstm {
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// A zero state for `batch_size` sequences, on the weights' device.
    pub fn zero_state(&self, batch_size: usize) -> Result<HiddenState<Tensor>> {
        from_lstm_state(&self.inner.zero_state(batch_size)?)
    }

    /// Advances every sequence by one step.
    ///
    /// `input` is `(batch, input_size)`; the batch must match the state's.
    pub fn step(&self, input: &Tensor, state: &HiddenState<Tensor>) -> Result<HiddenState<Tensor>> {
        let batch = self.check_state(state)?;
        expect_dims("lstm.step", input.dims(), &[Some(batch), Some(self.input_size)])?;
        let next = self.inner.step(input, &to_lstm_state(state)?)?;
        from_lstm_state(&next)
    }

    /// Runs the whole sequence from `state`.
    ///
    /// `input` is `(batch, seq_len, input_size)` with `seq_len >= 1`. Returns
    /// the hidden vector of every step as `(batch, seq_len, hidden_size)` and
    /// the state after every step, in order.
    pub fn seq(
        &self,
        input: &Tensor,
        state: HiddenState<Tensor>,
    ) -> Result<(Tensor, Vec<HiddenState<Tensor>>)> {
        let batch = self.check_state(&state)?;
        expect_dims("lstm.seq", input.dims(), &[Some(batch), None, Some(self.input_size)])?;
        let seq_len = input.dim(SEQ_DIM)?;
        if seq_len == 0 {
            return Err(CaptionError::ShapeMismatch {
                op: "lstm.seq",
                expected: format!("({batch}, seq_len >= 1, {})", self.input_size),
                actual: input.dims().to_vec(),
            });
        }

        let mut current = to_lstm_state(&state)?;
        let mut states = Vec::with_capacity(seq_len);
        let mut outputs = Vec::with_capacity(seq_len);
        for t in 0..seq_len {
            let step_input = input.narrow(SEQ_DIM, t, 1)?.squeeze(SEQ_DIM)?.contiguous()?;
            current = self.inner.step(&step_input, &current)?;
            outputs.push(current.h().clone());
            states.push(from_lstm_state(&current)?);
        }
        let output = Tensor::stack(&outputs, SEQ_DIM)?;
        Ok((output, states))
    }

    fn check_state(&self, state: &HiddenState<Tensor>) -> Result<usize> {
        let batch = state.hidden.dims().get(STATE_BATCH_DIM).copied().unwrap_or(0);
        let layout = [Some(NUM_LAYERS), Some(batch), Some(self.hidden_size)];
        expect_dims("lstm.hidden", state.hidden.dims(), &layout)?;
        expect_dims("lstm.cell", state.cell.dims(), &layout)?;
        Ok(batch)
    }
}

// candle keeps LSTM state without the layer axis
fn to_lstm_state(state: &HiddenState<Tensor>) -> Result<LSTMState> {
    Ok(LSTMState::new(state.hidden.squeeze(0)?, state.cell.squeeze(0)?))
}

fn from_lstm_state(state: &LSTMState) -> Result<HiddenState<Tensor>> {
    Ok(HiddenState::new(state.h().unsqueeze(0)?, state.c().unsqueeze(0)?))
}
