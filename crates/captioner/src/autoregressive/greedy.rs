use tracing::{debug, trace, warn};

use super::StepDecoder;
use crate::config::{GenerationConfig, LimitPolicy};
use crate::error::{CaptionError, Result};

/// Greedily decodes a caption for a single image embedding.
///
/// # Parameters
///
/// * `decoder` - The recurrent decoder to drive
/// * `features` - Image embedding of shape `(1, embed_size)`
/// * `config` - Step bound, end token and limit policy
///
/// # Returns
///
/// The predicted token ids in order, ending with the end token unless the
/// step bound was hit under [`LimitPolicy::Truncate`].
///
/// # Errors
///
/// [`CaptionError::UnsupportedBatchSize`] if `features` holds more than one
/// image; use [`greedy_decode_batch`] for batches.
pub fn greedy_decode<D>(
    decoder: &D,
    features: &D::Features,
    config: &GenerationConfig,
) -> Result<Vec<u32>>
where
    D: StepDecoder + ?Sized,
{
    let (input, batch_size) = decoder.seed(features)?;
    if batch_size != 1 {
        return Err(CaptionError::UnsupportedBatchSize(batch_size));
    }

    let mut captions = decode_rows(decoder, input, batch_size, config)?;
    Ok(captions.pop().unwrap_or_default())
}

/// Greedily decodes one caption per row of a batch of image embeddings.
///
/// Every row runs in lock step through the same recurrent state. A row is
/// finished once it emits the end token; later predictions for that row are
/// discarded. The loop stops when every row has finished or after
/// `config.max_steps` steps.
///
/// # Parameters
///
/// * `decoder` - The recurrent decoder to drive
/// * `features` - Image embeddings of shape `(batch, embed_size)`
/// * `config` - Step bound, end token and limit policy
///
/// # Returns
///
/// One token vector per batch row, in batch order.
pub fn greedy_decode_batch<D>(
    decoder: &D,
    features: &D::Features,
    config: &GenerationConfig,
) -> Result<Vec<Vec<u32>>>
where
    D: StepDecoder + ?Sized,
{
    let (input, batch_size) = decoder.seed(features)?;
    decode_rows(decoder, input, batch_size, config)
}

fn decode_rows<D>(
    decoder: &D,
    mut input: D::Input,
    batch_size: usize,
    config: &GenerationConfig,
) -> Result<Vec<Vec<u32>>>
where
    D: StepDecoder + ?Sized,
{
    config.validate()?;
    let end = config.end_token_id;
    let mut state = decoder.zero_state(batch_size)?;
    let mut captions: Vec<Vec<u32>> = vec![Vec::new(); batch_size];
    let mut finished = vec![false; batch_size];

    for step in 0..config.max_steps {
        let (logits, next_state) = decoder.step(&input, &state)?;
        state = next_state;

        let tokens = decoder.greedy_tokens(&logits)?;
        if tokens.len() != batch_size {
            return Err(CaptionError::ShapeMismatch {
                op: "greedy_tokens",
                expected: format!("({batch_size})"),
                actual: vec![tokens.len()],
            });
        }
        trace!(step, ?tokens, "decode step");

        for ((caption, done), &token) in captions.iter_mut().zip(finished.iter_mut()).zip(&tokens) {
            if *done {
                continue;
            }
            caption.push(token);
            *done = token == end;
        }

        if finished.iter().all(|done| *done) {
            debug!(steps = step + 1, batch_size, "all captions reached the end token");
            return Ok(captions);
        }

        input = decoder.embed_tokens(&tokens)?;
    }

    let unfinished = finished.iter().filter(|done| !**done).count();
    warn!(max_steps = config.max_steps, unfinished, "decode step bound reached");

    match config.on_limit {
        LimitPolicy::Truncate => Ok(captions),
        LimitPolicy::Error => Err(CaptionError::NonTerminatingGeneration {
            max_steps: config.max_steps,
            end_token_id: end,
            partial: captions,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock_decoder::{MockTensor, ScriptedDecoder};

    const END: u32 = 1;

    fn config(max_steps: usize) -> GenerationConfig {
        GenerationConfig::default()
            .with_max_steps(max_steps)
            .with_end_token_id(END)
    }

    #[test]
    fn test_terminates_on_end_token() {
        // Emits 4, 3, then the end token
        let decoder = ScriptedDecoder::new(vec![vec![4, 3, END]]);
        let features = MockTensor::new(vec![1, 10], 0);

        let caption = greedy_decode(&decoder, &features, &config(20)).unwrap();

        assert_eq!(caption, vec![4, 3, END]);
        assert_eq!(decoder.steps_taken(), 3);
    }

    #[test]
    fn test_end_token_on_first_step() {
        let decoder = ScriptedDecoder::new(vec![vec![END]]);
        let features = MockTensor::new(vec![1, 10], 0);

        let caption = greedy_decode(&decoder, &features, &config(20)).unwrap();

        assert_eq!(caption, vec![END]);
    }

    #[test]
    fn test_end_token_only_in_last_position() {
        for delay in 0..8 {
            let mut script = vec![2; delay];
            script.push(END);
            let decoder = ScriptedDecoder::new(vec![script]);
            let features = MockTensor::new(vec![1, 10], 0);

            let caption = greedy_decode(&decoder, &features, &config(20)).unwrap();

            assert!(!caption.is_empty());
            assert_eq!(caption.last(), Some(&END));
            assert!(!caption[..caption.len() - 1].contains(&END));
        }
    }

    #[test]
    fn test_step_bound_errors_by_default() {
        // Never predicts the end token
        let decoder = ScriptedDecoder::new(vec![vec![3]]);
        let features = MockTensor::new(vec![1, 10], 0);

        let err = greedy_decode(&decoder, &features, &config(5)).unwrap_err();

        match err {
            CaptionError::NonTerminatingGeneration { max_steps, end_token_id, partial } => {
                assert_eq!(max_steps, 5);
                assert_eq!(end_token_id, END);
                assert_eq!(partial, vec![vec![3; 5]]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(decoder.steps_taken(), 5);
    }

    #[test]
    fn test_zero_step_bound_is_rejected() {
        let decoder = ScriptedDecoder::new(vec![vec![3], vec![3]]);
        let config = config(0).with_on_limit(LimitPolicy::Truncate);

        let single = MockTensor::new(vec![1, 10], 0);
        let err = greedy_decode(&decoder, &single, &config).unwrap_err();
        assert!(matches!(err, CaptionError::InvalidConfig(_)));

        let batch = MockTensor::new(vec![2, 10], 0);
        let err = greedy_decode_batch(&decoder, &batch, &config).unwrap_err();
        assert!(matches!(err, CaptionError::InvalidConfig(_)));
        assert_eq!(decoder.steps_taken(), 0);
    }

    #[test]
    fn test_step_bound_truncates_when_asked() {
        let decoder = ScriptedDecoder::new(vec![vec![3]]);
        let features = MockTensor::new(vec![1, 10], 0);
        let config = config(4).with_on_limit(LimitPolicy::Truncate);

        let caption = greedy_decode(&decoder, &features, &config).unwrap();

        assert_eq!(caption, vec![3; 4]);
    }

    #[test]
    fn test_single_sample_rejects_batches() {
        let decoder = ScriptedDecoder::new(vec![vec![END], vec![END]]);
        let features = MockTensor::new(vec![2, 10], 0);

        let err = greedy_decode(&decoder, &features, &config(20)).unwrap_err();

        assert!(matches!(err, CaptionError::UnsupportedBatchSize(2)));
        assert_eq!(decoder.steps_taken(), 0);
    }

    #[test]
    fn test_batch_rows_finish_independently() {
        let decoder = ScriptedDecoder::new(vec![
            vec![2, END],
            vec![4, 4, 4, END],
            vec![END],
        ]);
        let features = MockTensor::new(vec![3, 10], 0);

        let captions = greedy_decode_batch(&decoder, &features, &config(20)).unwrap();

        assert_eq!(captions, vec![vec![2, END], vec![4, 4, 4, END], vec![END]]);
        assert_eq!(decoder.steps_taken(), 4);
    }

    #[test]
    fn test_state_shape_is_constant_across_steps() {
        let decoder = ScriptedDecoder::new(vec![vec![2, 3, 4, END], vec![END]]);
        let features = MockTensor::new(vec![2, 10], 0);

        greedy_decode_batch(&decoder, &features, &config(20)).unwrap();

        let shapes = decoder.state_shapes();
        assert_eq!(shapes.len(), 4);
        for shape in shapes {
            assert_eq!(shape, vec![1, 2, decoder.hidden_size()]);
        }
    }

    #[test]
    fn test_fed_back_tokens_match_predictions() {
        let decoder = ScriptedDecoder::new(vec![vec![2, 3, END]]);
        let features = MockTensor::new(vec![1, 10], 0);

        greedy_decode(&decoder, &features, &config(20)).unwrap();

        // The end token is never embedded, decoding stops first
        assert_eq!(decoder.embedded_tokens(), vec![vec![2], vec![3]]);
    }
}
