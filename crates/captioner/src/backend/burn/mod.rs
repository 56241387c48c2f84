//! The burn implementation of the captioning model.
//!
//! Every type is generic over a burn [`Backend`](burn::tensor::backend::Backend),
//! with the device passed explicitly to constructors. The trainable layers are
//! grouped in [`CaptionHead`]; the [`Backbone`] stays outside of it, is marked
//! `no_grad` and has its output detached.

mod decoder;
mod encoder;
mod model;

pub use decoder::CaptionDecoder;
pub use encoder::{Backbone, ImageProjection};
pub use model::{CaptionHead, ImageCaptioner, caption_loss};
