use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use crate::error::Result;
use crate::tensor::shape::expect_dims;

/// A pretrained feature extractor.
///
/// Implementations map `(batch, channels, height, width)` images to
/// `(batch, feature_dim)` features. The captioner calls
/// [`Module::no_grad`] on the backbone and detaches its output, so backbone
/// parameters are never trained.
pub trait Backbone<B: Backend>: Module<B> {
    /// Width of one feature vector
    fn feature_dim(&self) -> usize;

    fn features(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

/// Trainable projection from backbone features to the word-embedding size.
#[derive(Module, Debug)]
pub struct ImageProjection<B: Backend> {
    pub(crate) embed: Linear<B>,
    feature_dim: usize,
    embed_size: usize,
}

impl<B: Backend> ImageProjection<B> {
    pub fn new(feature_dim: usize, embed_size: usize, device: &B::Device) -> Self {
        Self {
            embed: LinearConfig::new(feature_dim, embed_size).init(device),
            feature_dim,
            embed_size,
        }
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn embed_size(&self) -> usize {
        self.embed_size
    }

    /// `(batch, feature_dim)` to `(batch, embed_size)`.
    pub fn forward(&self, features: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        expect_dims("encode.backbone", &features.dims(), &[None, Some(self.feature_dim)])?;
        Ok(self.embed.forward(features))
    }
}
