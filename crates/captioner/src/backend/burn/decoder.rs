use burn::module::Module;
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig, Lstm, LstmConfig, LstmState};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use tracing::debug;

use crate::autoregressive::{StepDecoder, greedy_decode, greedy_decode_batch};
use crate::backend::HiddenState;
use crate::config::{CaptionConfig, GenerationConfig};
use crate::error::{CaptionError, Result};
use crate::tensor::constant::{NUM_LAYERS, SEQ_DIM, STATE_BATCH_DIM};
use crate::tensor::shape::{check_token_ids, expect_dims};

/// Word-level LSTM decoder on a burn backend.
///
/// Same layout as the candle decoder: embedding table, one LSTM layer and a
/// linear head onto the vocabulary.
#[derive(Module, Debug)]
pub struct CaptionDecoder<B: Backend> {
    pub(crate) word_embeddings: Embedding<B>,
    pub(crate) lstm: Lstm<B>,
    pub(crate) hidden2vocab: Linear<B>,
    embed_size: usize,
    hidden_size: usize,
    vocab_size: usize,
}

impl<B: Backend> CaptionDecoder<B> {
    /// Randomly initialized decoder on `device`.
    pub fn new(config: &CaptionConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let decoder = Self {
            word_embeddings: EmbeddingConfig::new(config.vocab_size, config.embed_size).init(device),
            lstm: LstmConfig::new(config.embed_size, config.hidden_size, true).init(device),
            hidden2vocab: LinearConfig::new(config.hidden_size, config.vocab_size).init(device),
            embed_size: config.embed_size,
            hidden_size: config.hidden_size,
            vocab_size: config.vocab_size,
        };
        debug!(
            embed_size = decoder.embed_size,
            hidden_size = decoder.hidden_size,
            vocab_size = decoder.vocab_size,
            "caption decoder ready"
        );
        Ok(decoder)
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

    fn device(&self) -> B::Device {
        self.word_embeddings.weight.val().device()
    }

    /// Training forward pass: `(batch, embed)` features and `(batch, L)`
    /// captions to `(batch, L, vocab)` logits.
    ///
    /// The image embedding is step `0`; caption tokens `0..L-1` follow it.
    /// The final token is never an input.
    pub fn forward(&self, features: Tensor<B, 2>, captions: Tensor<B, 2, Int>) -> Result<Tensor<B, 3>> {
        let inputs = self.training_inputs(features, captions)?;
        let [batch, _, _] = inputs.dims();
        let state = self.zero_state(batch)?;
        let (lstm_out, _) = self.lstm.forward(inputs, Some(to_lstm_state(state)));
        Ok(self.hidden2vocab.forward(lstm_out))
    }

    // (batch, L, embed): image embedding followed by caption tokens 0..L-1
    fn training_inputs(&self, features: Tensor<B, 2>, captions: Tensor<B, 2, Int>) -> Result<Tensor<B, 3>> {
        expect_dims("train_forward.features", &features.dims(), &[None, Some(self.embed_size)])?;
        let [batch, _] = features.dims();
        expect_dims("train_forward.captions", &captions.dims(), &[Some(batch), None])?;
        let [_, caption_len] = captions.dims();
        if caption_len == 0 {
            return Err(CaptionError::ShapeMismatch {
                op: "train_forward.captions",
                expected: format!("({batch}, L >= 1)"),
                actual: captions.dims().to_vec(),
            });
        }
        check_token_ids(captions.to_data().iter::<i64>(), self.vocab_size)?;

        let image_step = features.unsqueeze_dim::<3>(SEQ_DIM);
        if caption_len == 1 {
            return Ok(image_step);
        }
        let tokens = captions.slice([0..batch, 0..caption_len - 1]);
        let embedded = self.word_embeddings.forward(tokens);
        Ok(Tensor::cat(vec![image_step, embedded], SEQ_DIM))
    }

    /// Greedy caption for one image embedding.
    pub fn sample(&self, features: Tensor<B, 2>, config: &GenerationConfig) -> Result<Vec<u32>> {
        greedy_decode(self, &features, config)
    }

    /// Greedy captions for a batch of image embeddings.
    pub fn sample_batch(&self, features: Tensor<B, 2>, config: &GenerationConfig) -> Result<Vec<Vec<u32>>> {
        greedy_decode_batch(self, &features, config)
    }

    fn check_state(&self, state: &HiddenState<Tensor<B, 3>>) -> Result<usize> {
        let batch = state.hidden.dims()[STATE_BATCH_DIM];
        let layout = [Some(NUM_LAYERS), Some(batch), Some(self.hidden_size)];
        expect_dims("lstm.hidden", &state.hidden.dims(), &layout)?;
        expect_dims("lstm.cell", &state.cell.dims(), &layout)?;
        Ok(batch)
    }
}

// burn keeps LSTM state without the layer axis
fn to_lstm_state<B: Backend>(state: HiddenState<Tensor<B, 3>>) -> LstmState<B, 2> {
    LstmState::new(state.cell.squeeze::<2>(0), state.hidden.squeeze::<2>(0))
}

fn from_lstm_state<B: Backend>(state: LstmState<B, 2>) -> HiddenState<Tensor<B, 3>> {
    HiddenState::new(state.hidden.unsqueeze_dim::<3>(0), state.cell.unsqueeze_dim::<3>(0))
}

impl<B: Backend> StepDecoder for CaptionDecoder<B> {
    type Features = Tensor<B, 2>;
    type Input = Tensor<B, 3>;
    type Logits = Tensor<B, 2>;
    type State = HiddenState<Tensor<B, 3>>;

    fn seed(&self, features: &Tensor<B, 2>) -> Result<(Tensor<B, 3>, usize)> {
        expect_dims("sample.features", &features.dims(), &[None, Some(self.embed_size)])?;
        let [batch, _] = features.dims();
        Ok((features.clone().unsqueeze_dim::<3>(SEQ_DIM), batch))
    }

    fn zero_state(&self, batch_size: usize) -> Result<Self::State> {
        let zeros = Tensor::zeros([NUM_LAYERS, batch_size, self.hidden_size], &self.device());
        Ok(HiddenState::new(zeros.clone(), zeros))
    }

    fn step(&self, input: &Tensor<B, 3>, state: &Self::State) -> Result<(Tensor<B, 2>, Self::State)> {
        let batch = self.check_state(state)?;
        expect_dims("decode.step", &input.dims(), &[Some(batch), Some(1), Some(self.embed_size)])?;

        let (output, next) = self.lstm.forward(input.clone(), Some(to_lstm_state(state.clone())));
        let logits = self.hidden2vocab.forward(output.squeeze::<2>(SEQ_DIM));
        Ok((logits, from_lstm_state(next)))
    }

    fn greedy_tokens(&self, logits: &Tensor<B, 2>) -> Result<Vec<u32>> {
        let ids = logits.clone().argmax(1).to_data();
        Ok(ids.iter::<i64>().map(|id| id as u32).collect())
    }

    fn embed_tokens(&self, token_ids: &[u32]) -> Result<Tensor<B, 3>> {
        check_token_ids(token_ids.iter().map(|id| *id as i64), self.vocab_size)?;
        let ids: Vec<i64> = token_ids.iter().map(|id| *id as i64).collect();
        let ids = Tensor::<B, 2, Int>::from_data(TensorData::new(ids, [token_ids.len(), 1]), &self.device());
        Ok(self.word_embeddings.forward(ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitPolicy;
    use burn::backend::NdArray;
    use burn::module::Param;

    type TestBackend = NdArray;

    const EMBED: usize = 10;
    const HIDDEN: usize = 20;
    const VOCAB: usize = 5;
    const END: u32 = 1;

    fn decoder() -> CaptionDecoder<TestBackend> {
        CaptionDecoder::new(&CaptionConfig::new(EMBED, HIDDEN, VOCAB), &Default::default()).unwrap()
    }

    // The head ignores the hidden state and always favours `token`
    fn forced_decoder(token: usize) -> CaptionDecoder<TestBackend> {
        let device = Default::default();
        let mut decoder = decoder();
        let mut bias = [0f32; VOCAB];
        bias[token] = 10.;
        decoder.hidden2vocab.weight = Param::from_tensor(Tensor::zeros([HIDDEN, VOCAB], &device));
        decoder.hidden2vocab.bias = Some(Param::from_tensor(Tensor::from_floats(bias, &device)));
        decoder
    }

    fn features(batch: usize) -> Tensor<TestBackend, 2> {
        Tensor::ones([batch, EMBED], &Default::default())
    }

    #[test]
    fn test_forward_keeps_every_step() {
        let device = Default::default();
        let decoder = decoder();
        let captions = Tensor::<TestBackend, 2, Int>::from_ints([[0, 3, 2, 1], [0, 4, 4, 1]], &device);

        let logits = decoder.forward(features(2), captions).unwrap();
        assert_eq!(logits.dims(), [2, 4, VOCAB]);
    }

    #[test]
    fn test_state_shape_through_training_pass() {
        let device = Default::default();
        let decoder = decoder();
        let captions = Tensor::<TestBackend, 2, Int>::from_ints([[0, 3, 2, 1], [0, 4, 4, 1]], &device);

        let inputs = decoder.training_inputs(features(2), captions).unwrap();
        assert_eq!(inputs.dims(), [2, 4, EMBED]);
        let (lstm_out, last) = decoder
            .lstm
            .forward(inputs.clone(), Some(to_lstm_state(decoder.zero_state(2).unwrap())));
        assert_eq!(lstm_out.dims(), [2, 4, HIDDEN]);

        // Replaying the sequence one step at a time visits every intermediate state
        let mut state = decoder.zero_state(2).unwrap();
        for t in 0..4 {
            let step_input = inputs.clone().slice([0..2, t..t + 1, 0..EMBED]);
            let (output, next) = decoder.lstm.forward(step_input, Some(to_lstm_state(state)));
            state = from_lstm_state(next);
            assert_eq!(state.hidden().dims(), [NUM_LAYERS, 2, HIDDEN]);
            assert_eq!(state.cell().dims(), [NUM_LAYERS, 2, HIDDEN]);
            output
                .into_data()
                .assert_approx_eq(&lstm_out.clone().slice([0..2, t..t + 1, 0..HIDDEN]).into_data(), 4);
        }

        let last = from_lstm_state(last);
        assert_eq!(last.hidden().dims(), [NUM_LAYERS, 2, HIDDEN]);
        last.cell().clone().into_data().assert_approx_eq(&state.cell().clone().into_data(), 4);
    }

    #[test]
    fn test_forward_single_token_caption() {
        let device = Default::default();
        let decoder = decoder();
        let captions = Tensor::<TestBackend, 2, Int>::from_ints([[0], [0], [0]], &device);

        let logits = decoder.forward(features(3), captions).unwrap();
        assert_eq!(logits.dims(), [3, 1, VOCAB]);
    }

    #[test]
    fn test_forward_rejects_unknown_token() {
        let device = Default::default();
        let decoder = decoder();
        let captions = Tensor::<TestBackend, 2, Int>::from_ints([[0, 7]], &device);

        let err = decoder.forward(features(1), captions).unwrap_err();
        assert!(matches!(err, CaptionError::InvalidTokenId { id: 7, vocab_size: VOCAB }));
    }

    #[test]
    fn test_forward_is_deterministic() {
        let device = Default::default();
        let decoder = decoder();
        let captions = Tensor::<TestBackend, 2, Int>::from_ints([[0, 3, 2, 1]], &device);

        let first = decoder.forward(features(1), captions.clone()).unwrap();
        let second = decoder.forward(features(1), captions).unwrap();
        first.into_data().assert_eq(&second.into_data(), true);
    }

    #[test]
    fn test_forced_end_token_returns_single_token() {
        let decoder = forced_decoder(END as usize);

        let caption = decoder.sample(features(1), &GenerationConfig::default()).unwrap();
        assert_eq!(caption, vec![END]);
    }

    #[test]
    fn test_sample_is_bounded() {
        let decoder = forced_decoder(3);
        let config = GenerationConfig::default().with_max_steps(5);

        let err = decoder.sample(features(1), &config).unwrap_err();
        assert!(matches!(err, CaptionError::NonTerminatingGeneration { max_steps: 5, .. }));

        let caption = decoder
            .sample(features(1), &config.with_on_limit(LimitPolicy::Truncate))
            .unwrap();
        assert_eq!(caption, vec![3; 5]);
    }

    #[test]
    fn test_sample_batch_per_row() {
        let decoder = forced_decoder(END as usize);

        let captions = decoder.sample_batch(features(2), &GenerationConfig::default()).unwrap();
        assert_eq!(captions, vec![vec![END], vec![END]]);

        let err = decoder.sample(features(2), &GenerationConfig::default()).unwrap_err();
        assert!(matches!(err, CaptionError::UnsupportedBatchSize(2)));
    }

    #[test]
    fn test_state_shape_through_steps() {
        let decoder = decoder();
        let (mut input, batch) = decoder.seed(&features(3)).unwrap();
        let mut state = decoder.zero_state(batch).unwrap();

        for _ in 0..4 {
            let (logits, next) = decoder.step(&input, &state).unwrap();
            assert_eq!(logits.dims(), [3, VOCAB]);
            assert_eq!(next.hidden().dims(), [NUM_LAYERS, 3, HIDDEN]);
            assert_eq!(next.cell().dims(), [NUM_LAYERS, 3, HIDDEN]);
            let tokens = decoder.greedy_tokens(&logits).unwrap();
            input = decoder.embed_tokens(&tokens).unwrap();
            assert_eq!(input.dims(), [3, 1, EMBED]);
            state = next;
        }
    }
}
