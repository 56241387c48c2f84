//! # Autoregressive Decoding
//!
//! Greedy caption generation on top of any recurrent decoder.
//!
//! ## Overview
//!
//! A caption is produced one token at a time. The image embedding is fed to
//! the decoder as its first input; every later input is the embedding of the
//! token predicted on the previous step. The loop keeps a single hidden/cell
//! state, freshly zeroed for each call, and stops when the end token appears
//! or when the configured step bound is reached.
//!
//! ## Key Components
//!
//! * [`StepDecoder`] - A trait for decoders that can be advanced one step at a time
//! * [`greedy_decode`] - Arg-max decoding for a single image embedding
//! * [`greedy_decode_batch`] - Arg-max decoding for a batch, rows finish independently
//!
//! ## Termination
//!
//! The step bound comes from [`GenerationConfig`](crate::config::GenerationConfig).
//! When it is reached before the end token, the
//! [`LimitPolicy`](crate::config::LimitPolicy) decides whether the partial
//! caption is returned or reported as
//! [`CaptionError::NonTerminatingGeneration`](crate::CaptionError::NonTerminatingGeneration).

mod core_trait;
mod greedy;

pub use core_trait::*;
pub use greedy::{greedy_decode, greedy_decode_batch};
