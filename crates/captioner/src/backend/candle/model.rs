use candle_core::{DType, Tensor};
use tracing::debug;

use super::decoder::CaptionDecoder;
use super::encoder::{FrozenBackbone, ImageEncoder};
use super::params::ParamPartition;
use crate::config::{CaptionConfig, GenerationConfig};
use crate::error::Result;
use crate::tensor::shape::expect_dims;

/// Encoder and decoder wired together over one [`ParamPartition`].
///
/// Trainable parameters are registered under `encoder.embed.*` and
/// `decoder.*`; the backbone only ever reads from the frozen side.
#[derive(Debug)]
pub struct ImageCaptioner {
    encoder: ImageEncoder,
    decoder: CaptionDecoder,
    params: ParamPartition,
    config: CaptionConfig,
}

impl ImageCaptioner {
    /// Builds the trainable layers around an existing backbone.
    pub fn new(config: CaptionConfig, backbone: FrozenBackbone, params: ParamPartition) -> Result<Self> {
        config.validate()?;
        let trainable = params.trainable();
        let encoder = ImageEncoder::new(backbone, config.embed_size, trainable.pp("encoder"))?;
        let decoder = CaptionDecoder::new(&config, trainable.pp("decoder"))?;
        debug!(
            trainable = params.trainable_vars().len(),
            feature_dim = encoder.backbone().feature_dim(),
            "image captioner ready"
        );
        Ok(Self {
            encoder,
            decoder,
            params,
            config,
        })
    }

    /// ResNet-50 backbone read from the frozen weights of `params`.
    pub fn resnet50(config: CaptionConfig, params: ParamPartition) -> Result<Self> {
        let backbone = FrozenBackbone::resnet50(params.frozen())?;
        Self::new(config, backbone, params)
    }

    pub fn config(&self) -> &CaptionConfig {
        &self.config
    }

    pub fn encoder(&self) -> &ImageEncoder {
        &self.encoder
    }

    pub fn decoder(&self) -> &CaptionDecoder {
        &self.decoder
    }

    pub fn params(&self) -> &ParamPartition {
        &self.params
    }

    /// Mutable access for [`ParamPartition::load_trainable`]. Loading updates
    /// the vars in place, so the layers see the new values.
    pub fn params_mut(&mut self) -> &mut ParamPartition {
        &mut self.params
    }

    /// `(batch, C, H, W)` images to `(batch, embed_size)` embeddings.
    pub fn encode(&self, images: &Tensor) -> Result<Tensor> {
        self.encoder.forward(images)
    }

    /// `(batch, L)` captions to `(batch, L, vocab_size)` logits.
    pub fn train_forward(&self, features: &Tensor, captions: &Tensor) -> Result<Tensor> {
        self.decoder.forward(features, captions)
    }

    /// Greedy caption for a single image embedding, bounded by the
    /// configured [`GenerationConfig`].
    pub fn sample(&self, features: &Tensor) -> Result<Vec<u32>> {
        self.decoder.sample(features, &self.config.generation)
    }

    pub fn sample_batch(&self, features: &Tensor) -> Result<Vec<Vec<u32>>> {
        self.decoder.sample_batch(features, &self.config.generation)
    }

    /// Encodes `images` and greedily decodes one caption per image.
    pub fn caption(&self, images: &Tensor) -> Result<Vec<Vec<u32>>> {
        self.caption_with(images, &self.config.generation)
    }

    pub fn caption_with(&self, images: &Tensor, generation: &GenerationConfig) -> Result<Vec<Vec<u32>>> {
        let features = self.encode(images)?;
        self.decoder.sample_batch(&features, generation)
    }

    /// Training loss for a batch: encode, run the decoder, score against the captions.
    pub fn loss(&self, images: &Tensor, captions: &Tensor) -> Result<Tensor> {
        let features = self.encode(images)?;
        let logits = self.train_forward(&features, captions)?;
        caption_loss(&logits, captions)
    }
}

/// Mean cross-entropy of `(batch, L, vocab)` logits against `(batch, L)`
/// captions, where step `t` is scored against token `t`.
pub fn caption_loss(logits: &Tensor, captions: &Tensor) -> Result<Tensor> {
    let (batch, steps, vocab) = logits.dims3()?;
    expect_dims("loss.captions", captions.dims(), &[Some(batch), Some(steps)])?;
    let logits = logits.reshape((batch * steps, vocab))?;
    let targets = captions.to_dtype(DType::U32)?.flatten_all()?;
    Ok(candle_nn::loss::cross_entropy(&logits, &targets)?)
}
