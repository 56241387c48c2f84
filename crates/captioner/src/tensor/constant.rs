/// # Constants with reserved meanings in the captioner

/// In a given tensor shape, the `0th` dimension is the batch dimension
pub const BATCH_DIM: usize = 0;

/// In a given tensor shape, the `1st` dimension is the sequence (time step) dimension
pub const SEQ_DIM: usize = 1;

/// Hidden and cell states are laid out `(layer, batch, hidden)`, so batch sits at `1`
pub const STATE_BATCH_DIM: usize = 1;

/// The decoder runs a single recurrent layer
pub const NUM_LAYERS: usize = 1;

/// Vocabulary id of the `<end>` marker in the reference vocabulary
pub const DEFAULT_END_TOKEN_ID: u32 = 1;

/// Upper bound on greedy decode steps when none is configured
pub const DEFAULT_MAX_STEPS: usize = 20;
