use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::resnet;
use tracing::debug;

use crate::error::Result;
use crate::tensor::constant::BATCH_DIM;
use crate::tensor::shape::expect_dims;

/// Width of the pooled ResNet-50 feature vector.
pub const RESNET50_FEATURE_DIM: usize = 2048;

/// A pretrained image classifier with its classification head removed.
///
/// The backbone's weights come from the frozen side of a
/// [`ParamPartition`](super::ParamPartition): they are plain tensors, never
/// `Var`s, so no gradient ever reaches them.
pub struct FrozenBackbone {
    module: Box<dyn Module + Send + Sync>,
    feature_dim: usize,
}

impl FrozenBackbone {
    /// Wraps any feature extractor producing `feature_dim` values per image
    /// once flattened.
    pub fn new<M>(module: M, feature_dim: usize) -> Self
    where
        M: Module + Send + Sync + 'static,
    {
        Self {
            module: Box::new(module),
            feature_dim,
        }
    }

    /// ResNet-50 without its final fully connected layer.
    ///
    /// `vb` must point at torchvision-named weights (`conv1.weight`,
    /// `layer1.0.bn1.running_mean`, ...).
    pub fn resnet50(vb: VarBuilder<'static>) -> Result<Self> {
        let module = resnet::resnet50_no_final_layer(vb)?;
        debug!(feature_dim = RESNET50_FEATURE_DIM, "loaded resnet50 backbone");
        Ok(Self::new(module, RESNET50_FEATURE_DIM))
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Runs the backbone and flattens its output to `(batch, feature_dim)`.
    pub fn features(&self, images: &Tensor) -> Result<Tensor> {
        expect_dims("encode.images", images.dims(), &[None, None, None, None])?;
        let batch = images.dim(BATCH_DIM)?;
        let features = self.module.forward(images)?.flatten_from(1)?;
        expect_dims("encode.backbone", features.dims(), &[Some(batch), Some(self.feature_dim)])?;
        Ok(features)
    }
}

impl std::fmt::Debug for FrozenBackbone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrozenBackbone")
            .field("feature_dim", &self.feature_dim)
            .finish_non_exhaustive()
    }
}

/// Image encoder: frozen backbone followed by a trainable projection to the
/// word-embedding size.
#[derive(Debug)]
pub struct ImageEncoder {
    backbone: FrozenBackbone,
    embed: Linear,
    embed_size: usize,
}

impl ImageEncoder {
    /// Builds the projection `feature_dim -> embed_size` from `vb` under `embed`.
    pub fn new(backbone: FrozenBackbone, embed_size: usize, vb: VarBuilder) -> Result<Self> {
        let embed = candle_nn::linear(backbone.feature_dim(), embed_size, vb.pp("embed"))?;
        Ok(Self {
            backbone,
            embed,
            embed_size,
        })
    }

    pub fn embed_size(&self) -> usize {
        self.embed_size
    }

    pub fn backbone(&self) -> &FrozenBackbone {
        &self.backbone
    }

    /// Encodes `(batch, channels, height, width)` images to `(batch, embed_size)`.
    pub fn forward(&self, images: &Tensor) -> Result<Tensor> {
        let features = self.backbone.features(images)?;
        Ok(self.embed.forward(&features)?)
    }
}
