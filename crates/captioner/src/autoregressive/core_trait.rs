use crate::error::Result;

/// # StepDecoder
///
/// A recurrent decoder driven one time step at a time.
///
/// This trait is the seam between the greedy decode loop and a concrete model.
/// The loop in [`greedy_decode`](super::greedy_decode) owns the control flow
/// (state threading, termination, the step bound); implementations only provide
/// the tensor work for a single step.
///
/// ## Input/Output Dimensions
///
/// - `Features` is `(batch, embed_size)`: the encoder output
/// - `Input` is `(batch, 1, embed_size)`: one time step per batch row
/// - `Logits` is `(batch, vocab_size)`: scores for the next token of each row
/// - `State` holds hidden and cell tensors of `(num_layers, batch, hidden_size)`
///
/// ## Implementation Notes
///
/// When implementing this trait:
/// - `zero_state` must size the state to the batch it is given; the loop calls
///   it once per decode call and never reuses a state across calls
/// - `step` must reject an input whose batch differs from the state's batch
/// - `embed_tokens` must reject ids outside the vocabulary
pub trait StepDecoder {
    /// Image features handed to [`seed`](StepDecoder::seed)
    type Features;

    /// One time step of decoder input
    type Input;

    /// Next-token scores for every batch row
    type Logits;

    /// Recurrent state threaded between steps
    type State;

    /// Normalizes image features into a first-step input.
    ///
    /// Turns `(batch, embed_size)` features into the `(batch, 1, embed_size)`
    /// input of the first step, returned together with its batch size.
    fn seed(&self, features: &Self::Features) -> Result<(Self::Input, usize)>;

    /// A zero hidden/cell state for `batch_size` rows.
    fn zero_state(&self, batch_size: usize) -> Result<Self::State>;

    /// Advances the recurrent cell by one step.
    ///
    /// # Returns
    ///
    /// The vocabulary logits for this step and the updated state.
    fn step(&self, input: &Self::Input, state: &Self::State) -> Result<(Self::Logits, Self::State)>;

    /// The arg-max vocabulary id of each batch row, in batch order.
    fn greedy_tokens(&self, logits: &Self::Logits) -> Result<Vec<u32>>;

    /// Embeds one token per batch row into the next step's input.
    fn embed_tokens(&self, token_ids: &[u32]) -> Result<Self::Input>;
}
