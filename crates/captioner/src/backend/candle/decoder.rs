use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Embedding, Linear, Module, VarBuilder};
use tracing::debug;

use super::lstm::{Lstm, lstm};
use crate::autoregressive::{StepDecoder, greedy_decode, greedy_decode_batch};
use crate::backend::HiddenState;
use crate::config::{CaptionConfig, GenerationConfig};
use crate::error::{CaptionError, Result};
use crate::tensor::constant::{BATCH_DIM, SEQ_DIM};
use crate::tensor::shape::{check_token_ids, expect_dims};

/// Word-level LSTM decoder.
///
/// Holds a word embedding table `(vocab_size, embed_size)`, a single-layer
/// LSTM `embed_size -> hidden_size` and a linear head `hidden_size -> vocab_size`.
/// Parameter names are `word_embeddings.weight`, `lstm.*_l0` and
/// `hidden2vocab.{weight,bias}` under whatever prefix `vb` carries.
#[derive(Debug)]
pub struct CaptionDecoder {
    word_embeddings: Embedding,
    lstm: Lstm,
    hidden2vocab: Linear,
    embed_size: usize,
    hidden_size: usize,
    vocab_size: usize,
    device: Device,
}

impl CaptionDecoder {
    pub fn new(config: &CaptionConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let word_embeddings = candle_nn::embedding(
            config.vocab_size,
            config.embed_size,
            vb.pp("word_embeddings"),
        )?;
        let lstm = lstm(config.embed_size, config.hidden_size, vb.pp("lstm"))?;
        let hidden2vocab =
            candle_nn::linear(config.hidden_size, config.vocab_size, vb.pp("hidden2vocab"))?;
        Self::from_parts(word_embeddings, lstm, hidden2vocab)
    }

    /// Assembles a decoder from already built layers, checking that their
    /// sizes agree.
    pub fn from_parts(word_embeddings: Embedding, lstm: Lstm, hidden2vocab: Linear) -> Result<Self> {
        let (vocab_size, embed_size) = word_embeddings.embeddings().dims2()?;
        let (head_vocab, head_hidden) = hidden2vocab.weight().dims2()?;

        if lstm.input_size() != embed_size {
            return Err(CaptionError::InvalidConfig(format!(
                "lstm input size {} does not match embedding size {embed_size}",
                lstm.input_size()
            )));
        }
        if head_hidden != lstm.hidden_size() || head_vocab != vocab_size {
            return Err(CaptionError::InvalidConfig(format!(
                "output head ({head_vocab}, {head_hidden}) does not match vocabulary \
                 {vocab_size} and hidden size {}",
                lstm.hidden_size()
            )));
        }

        debug!(embed_size, hidden_size = lstm.hidden_size(), vocab_size, "caption decoder ready");
        Ok(Self {
            device: word_embeddings.embeddings().device().clone(),
            hidden_size: lstm.hidden_size(),
            word_embeddings,
            lstm,
            hidden2vocab,
            embed_size,
            vocab_size,
        })
    }

    pub fn embed_size(&self) -> usize {
        self.embed_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Training forward pass over ground-truth captions.
    ///
    /// # Parameters
    ///
    /// * `features` - Image embeddings of shape `(batch, embed_size)`
    /// * `captions` - Ground-truth token ids of shape `(batch, L)`, start and
    ///   end markers included
    ///
    /// # Returns
    ///
    /// Logits of shape `(batch, L, vocab_size)`. Step `0` is predicted from the
    /// image embedding alone, step `t` from the image and tokens `0..t`.
    ///
    /// # Implementation Notes
    ///
    /// 1. The final caption token is dropped, it is never an input
    /// 2. The remaining `L - 1` tokens are embedded
    /// 3. The image embedding is prepended as the first step
    /// 4. One LSTM pass runs from a zero state over all `L` steps
    /// 5. Every hidden vector is projected onto the vocabulary
    pub fn forward(&self, features: &Tensor, captions: &Tensor) -> Result<Tensor> {
        let (logits, _) = self.training_pass(features, captions)?;
        Ok(logits)
    }

    // Logits plus the recurrent state after every step
    fn training_pass(
        &self,
        features: &Tensor,
        captions: &Tensor,
    ) -> Result<(Tensor, Vec<HiddenState<Tensor>>)> {
        expect_dims("train_forward.features", features.dims(), &[None, Some(self.embed_size)])?;
        let batch = features.dim(BATCH_DIM)?;
        expect_dims("train_forward.captions", captions.dims(), &[Some(batch), None])?;
        let caption_len = captions.dim(SEQ_DIM)?;
        if caption_len == 0 {
            return Err(CaptionError::ShapeMismatch {
                op: "train_forward.captions",
                expected: format!("({batch}, L >= 1)"),
                actual: captions.dims().to_vec(),
            });
        }

        let token_ids = captions.to_dtype(DType::I64)?;
        check_token_ids(token_ids.flatten_all()?.to_vec1::<i64>()?, self.vocab_size)?;

        let image_step = features.unsqueeze(SEQ_DIM)?;
        let inputs = if caption_len > 1 {
            let tokens = token_ids.narrow(SEQ_DIM, 0, caption_len - 1)?;
            let embedded = self.word_embeddings.forward(&tokens)?;
            Tensor::cat(&[&image_step, &embedded], SEQ_DIM)?
        } else {
            image_step
        };

        let state = self.lstm.zero_state(batch)?;
        let (lstm_out, states) = self.lstm.seq(&inputs, state)?;
        Ok((self.hidden2vocab.forward(&lstm_out)?, states))
    }

    /// Greedy caption for one image embedding, see [`greedy_decode`].
    pub fn sample(&self, features: &Tensor, config: &GenerationConfig) -> Result<Vec<u32>> {
        greedy_decode(self, features, config)
    }

    /// Greedy captions for a batch of image embeddings, see [`greedy_decode_batch`].
    pub fn sample_batch(
        &self,
        features: &Tensor,
        config: &GenerationConfig,
    ) -> Result<Vec<Vec<u32>>> {
        greedy_decode_batch(self, features, config)
    }
}

impl StepDecoder for CaptionDecoder {
    type Features = Tensor;
    type Input = Tensor;
    type Logits = Tensor;
    type State = HiddenState<Tensor>;

    fn seed(&self, features: &Tensor) -> Result<(Tensor, usize)> {
        // Accept the (batch, 1, embed) layout as well as plain (batch, embed)
        let input = match features.rank() {
            3 => features.clone(),
            _ => {
                expect_dims("sample.features", features.dims(), &[None, Some(self.embed_size)])?;
                features.unsqueeze(SEQ_DIM)?
            }
        };
        expect_dims("sample.features", input.dims(), &[None, Some(1), Some(self.embed_size)])?;
        let batch = input.dim(BATCH_DIM)?;
        Ok((input, batch))
    }

    fn zero_state(&self, batch_size: usize) -> Result<Self::State> {
        self.lstm.zero_state(batch_size)
    }

    fn step(&self, input: &Tensor, state: &Self::State) -> Result<(Tensor, Self::State)> {
        expect_dims("decode.step", input.dims(), &[None, Some(1), Some(self.embed_size)])?;
        let state = self.lstm.step(&input.squeeze(SEQ_DIM)?, state)?;
        let logits = self.hidden2vocab.forward(&state.hidden.squeeze(0)?)?;
        Ok((logits, state))
    }

    fn greedy_tokens(&self, logits: &Tensor) -> Result<Vec<u32>> {
        Ok(logits.argmax(D::Minus1)?.to_vec1::<u32>()?)
    }

    fn embed_tokens(&self, token_ids: &[u32]) -> Result<Tensor> {
        check_token_ids(token_ids.iter().map(|id| *id as i64), self.vocab_size)?;
        let ids = Tensor::new(token_ids, &self.device)?;
        Ok(self.word_embeddings.forward(&ids)?.unsqueeze(SEQ_DIM)?)
    }
}
