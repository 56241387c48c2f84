/// Paired recurrent state of the decoder LSTM.
///
/// Both tensors are laid out `(num_layers, batch, hidden_size)`. A fresh,
/// zero-filled state is built for every independent sequence (one training
/// pass or one sampling call) and is never carried across calls.
#[derive(Debug, Clone)]
pub struct HiddenState<T> {
    /// Hidden state, also the LSTM output for the last step
    pub hidden: T,

    /// Cell state (the LSTM's long-term memory)
    pub cell: T,
}

impl<T> HiddenState<T> {
    pub fn new(hidden: T, cell: T) -> Self {
        Self { hidden, cell }
    }

    pub fn hidden(&self) -> &T {
        &self.hidden
    }

    pub fn cell(&self) -> &T {
        &self.cell
    }
}
