//! # Model Backends
//!
//! The encoder and decoder implemented on concrete tensor libraries. Both
//! backends share the decode loop in [`crate::autoregressive`] and the
//! configuration in [`crate::config`]; they differ only in how tensors and
//! parameters are stored.
//!
//! ## Feature Flags
//!
//! - `candle`: Enables the Candle implementation (default)
//! - `burn`: Enables the Burn implementation
//!
//! ## Frozen and trainable parameters
//!
//! The backbone is pretrained and must not be updated. Each backend makes the
//! split explicit in its own terms:
//!
//! 1. Candle keeps trainable `Var`s in a `VarMap` and reads the backbone from
//!    a separate, constant `VarBuilder`
//! 2. Burn marks the backbone `no_grad` and detaches its output, while the
//!    trainable layers form their own `Module`

mod state;

#[cfg_attr(docsrs, doc(cfg(feature = "candle")))]
#[cfg(feature = "candle")]
/// Candle implementation.
///
/// This module is only available when the `candle` feature flag is enabled.
pub mod candle;

#[cfg_attr(docsrs, doc(cfg(feature = "burn")))]
#[cfg(feature = "burn")]
/// Burn implementation.
///
/// This module is only available when the `burn` feature flag is enabled.
/// The model is generic over the burn backend, so it runs on any device burn
/// supports.
pub mod burn;

pub use state::HiddenState;

#[cfg(test)]
/// Scripted decoder over shape-only tensors, for exercising the decode loop.
pub(crate) mod mock_decoder;
