//! # Candle backend
//!
//! The captioning model on [`candle_core`] tensors: a frozen ResNet-50 (or
//! any [`candle_nn::Module`]) feeding a trainable projection, and a
//! single-layer LSTM decoder that implements
//! [`StepDecoder`](crate::autoregressive::StepDecoder).
//!
//! Parameters are split by [`ParamPartition`]: layers built from
//! [`ParamPartition::trainable`] become `Var`s, the backbone reads constant
//! tensors from [`ParamPartition::frozen`].

mod decoder;
mod encoder;
mod lstm;
mod model;
mod params;

pub use decoder::CaptionDecoder;
pub use encoder::{FrozenBackbone, ImageEncoder, RESNET50_FEATURE_DIM};
pub use lstm::{Lstm, lstm};
pub use model::{ImageCaptioner, caption_loss};
pub use params::ParamPartition;
