//! Error kinds surfaced by the encoder, the decoder and the generation loop.

use thiserror::Error;

/// Errors produced while encoding images or generating captions.
#[derive(Debug, Error)]
pub enum CaptionError {
    /// A tensor did not have the rank or dimensions an operation requires.
    #[error("shape mismatch in {op}: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: String,
        actual: Vec<usize>,
    },

    /// A caption or generated token referenced an id outside the vocabulary.
    #[error("token id {id} is out of range for a vocabulary of {vocab_size} entries")]
    InvalidTokenId { id: i64, vocab_size: usize },

    /// Greedy decoding hit its step bound before emitting the end token.
    ///
    /// `partial` holds the tokens produced so far, one vector per batch row.
    #[error("no end token ({end_token_id}) after {max_steps} decode steps")]
    NonTerminatingGeneration {
        max_steps: usize,
        end_token_id: u32,
        partial: Vec<Vec<u32>>,
    },

    /// Single-image sampling was handed a batch.
    #[error("sample expects a single image embedding, got a batch of {0}")]
    UnsupportedBatchSize(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[cfg(feature = "candle")]
    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CaptionError>;
