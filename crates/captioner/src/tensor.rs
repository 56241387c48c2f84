//! Shared tensor conventions used by every backend.

pub mod constant;
pub(crate) mod shape;
