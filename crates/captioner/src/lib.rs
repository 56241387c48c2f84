//! # Captioner
//!
//! An image captioning model: a frozen convolutional encoder followed by an
//! LSTM decoder that generates a caption one token at a time.
//!
//! ## Overview
//!
//! Images are encoded by a pretrained backbone (ResNet-50 in the candle
//! backend) whose pooled features are projected to the word-embedding size.
//! The decoder treats that embedding as its first time step and then predicts
//! vocabulary tokens until it emits the end token.
//!
//! Key components include:
//!
//! - An image encoder with a frozen backbone and a trainable projection
//! - A word-level LSTM decoder for training and for greedy generation
//! - A backend-agnostic greedy decode loop with a hard step bound
//! - Serializable model configuration
//!
//! ## Architecture
//!
//! ### Assumptions
//! Regardless of backend used, the crate reserves two dimensions with special meanings:
//!  - The `0th` dimension is reserved as the batch dimension
//!  - The `1st` dimension is reserved as the sequence dimension
//!  - Recurrent state is laid out `(num_layers, batch, hidden_size)`
//!
//! ### Decoding
//!
//! The [`StepDecoder`](autoregressive::StepDecoder) trait describes one step
//! of a recurrent decoder. [`greedy_decode`](autoregressive::greedy_decode)
//! drives any implementation until the end token or the step bound, so the
//! termination rules live in one place for every backend.
//!
//! ## Features
//!
//! - **candle** - Enables the candle backend (default)
//! - **burn** - Enables the burn backend
//!
//! ## Implementation Details
//!
//! Token ids are `u32` and index the caller's vocabulary directly. The crate
//! does not tokenize text; mapping words to ids is left to the caller.

mod error;
mod tensor;

pub mod autoregressive;
pub mod backend;
pub mod config;

pub use error::{CaptionError, Result};

/// Constants for client reference
pub use tensor::constant;
