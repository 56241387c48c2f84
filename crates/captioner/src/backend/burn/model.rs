use burn::module::Module;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use tracing::debug;

use super::decoder::CaptionDecoder;
use super::encoder::{Backbone, ImageProjection};
use crate::config::{CaptionConfig, GenerationConfig};
use crate::error::{CaptionError, Result};
use crate::tensor::shape::expect_dims;

/// Every trainable layer of the captioner: the image projection and the
/// decoder. Hand this module to a burn optimizer.
#[derive(Module, Debug)]
pub struct CaptionHead<B: Backend> {
    pub(crate) projection: ImageProjection<B>,
    pub(crate) decoder: CaptionDecoder<B>,
}

impl<B: Backend> CaptionHead<B> {
    pub fn new(config: &CaptionConfig, feature_dim: usize, device: &B::Device) -> Result<Self> {
        Ok(Self {
            projection: ImageProjection::new(feature_dim, config.embed_size, device),
            decoder: CaptionDecoder::new(config, device)?,
        })
    }

    pub fn projection(&self) -> &ImageProjection<B> {
        &self.projection
    }

    pub fn decoder(&self) -> &CaptionDecoder<B> {
        &self.decoder
    }
}

/// A frozen backbone in front of a trainable [`CaptionHead`].
#[derive(Debug)]
pub struct ImageCaptioner<B: Backend, F> {
    backbone: F,
    head: CaptionHead<B>,
    config: CaptionConfig,
}

impl<B, F> ImageCaptioner<B, F>
where
    B: Backend,
    F: Backbone<B>,
{
    /// Freezes `backbone` and builds a randomly initialized head on `device`.
    pub fn new(config: CaptionConfig, backbone: F, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let head = CaptionHead::new(&config, backbone.feature_dim(), device)?;
        Self::with_head(config, backbone, head)
    }

    /// Pairs a backbone with an already trained head.
    pub fn with_head(config: CaptionConfig, backbone: F, head: CaptionHead<B>) -> Result<Self> {
        config.validate()?;
        if head.projection.feature_dim() != backbone.feature_dim() {
            return Err(CaptionError::InvalidConfig(format!(
                "head expects {} backbone features, backbone yields {}",
                head.projection.feature_dim(),
                backbone.feature_dim()
            )));
        }
        let decoder = &head.decoder;
        if head.projection.embed_size() != config.embed_size
            || decoder.embed_size() != config.embed_size
            || decoder.hidden_size() != config.hidden_size
            || decoder.vocab_size() != config.vocab_size
        {
            return Err(CaptionError::InvalidConfig(
                "head sizes do not match the configuration".to_string(),
            ));
        }

        debug!(
            feature_dim = backbone.feature_dim(),
            trainable = head.num_params(),
            "image captioner ready"
        );
        Ok(Self {
            backbone: backbone.no_grad(),
            head,
            config,
        })
    }

    pub fn config(&self) -> &CaptionConfig {
        &self.config
    }

    pub fn backbone(&self) -> &F {
        &self.backbone
    }

    pub fn head(&self) -> &CaptionHead<B> {
        &self.head
    }

    /// Splits the captioner, e.g. to run an optimizer step on the head.
    pub fn into_parts(self) -> (F, CaptionHead<B>) {
        (self.backbone, self.head)
    }

    /// `(batch, C, H, W)` images to `(batch, embed_size)` embeddings.
    pub fn encode(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let [batch, ..] = images.dims();
        let features = self.backbone.features(images).detach();
        expect_dims(
            "encode.backbone",
            &features.dims(),
            &[Some(batch), Some(self.backbone.feature_dim())],
        )?;
        self.head.projection.forward(features)
    }

    pub fn train_forward(&self, features: Tensor<B, 2>, captions: Tensor<B, 2, Int>) -> Result<Tensor<B, 3>> {
        self.head.decoder.forward(features, captions)
    }

    pub fn sample(&self, features: Tensor<B, 2>) -> Result<Vec<u32>> {
        self.head.decoder.sample(features, &self.config.generation)
    }

    pub fn sample_batch(&self, features: Tensor<B, 2>) -> Result<Vec<Vec<u32>>> {
        self.head.decoder.sample_batch(features, &self.config.generation)
    }

    /// Encodes `images` and greedily decodes one caption per image.
    pub fn caption(&self, images: Tensor<B, 4>) -> Result<Vec<Vec<u32>>> {
        self.caption_with(images, &self.config.generation)
    }

    pub fn caption_with(&self, images: Tensor<B, 4>, generation: &GenerationConfig) -> Result<Vec<Vec<u32>>> {
        let features = self.encode(images)?;
        self.head.decoder.sample_batch(features, generation)
    }

    pub fn loss(&self, images: Tensor<B, 4>, captions: Tensor<B, 2, Int>) -> Result<Tensor<B, 1>> {
        let features = self.encode(images)?;
        let logits = self.train_forward(features, captions.clone())?;
        caption_loss(logits, captions)
    }
}

/// Mean cross-entropy of `(batch, L, vocab)` logits against `(batch, L)`
/// captions, where step `t` is scored against token `t`.
pub fn caption_loss<B: Backend>(logits: Tensor<B, 3>, captions: Tensor<B, 2, Int>) -> Result<Tensor<B, 1>> {
    let [batch, steps, vocab] = logits.dims();
    expect_dims("loss.captions", &captions.dims(), &[Some(batch), Some(steps)])?;
    let loss = CrossEntropyLossConfig::new().init(&logits.device());
    Ok(loss.forward(logits.reshape([batch * steps, vocab]), captions.reshape([batch * steps])))
}
