use std::cell::{Cell, RefCell};

use crate::autoregressive::StepDecoder;
use crate::backend::HiddenState;
use crate::error::{CaptionError, Result};
use crate::tensor::constant::{BATCH_DIM, NUM_LAYERS, STATE_BATCH_DIM};
use crate::tensor::shape::{check_token_ids, expect_dims};

const EMBED_SIZE: usize = 10;
const HIDDEN_SIZE: usize = 20;
const VOCAB_SIZE: usize = 10;

// Stands in for features, embeddings and states: only the shape is real.
// `value` carries the scripted step counter through the state.
#[derive(Clone, Debug)]
pub struct MockTensor {
    pub(crate) shape: Vec<usize>,
    pub(crate) value: i32,
}

impl MockTensor {
    pub fn new(shape: Vec<usize>, value: i32) -> Self {
        Self { shape, value }
    }
}

/// A decoder whose arg-max predictions follow a fixed script per batch row.
///
/// Step `n` of row `r` predicts `scripts[r][n]`; once a script runs out its last
/// token repeats. The step counter lives in the state's `value`, so a fresh
/// zero state always restarts the script.
pub struct ScriptedDecoder {
    scripts: Vec<Vec<u32>>,
    steps: Cell<usize>,
    state_shapes: RefCell<Vec<Vec<usize>>>,
    embedded: RefCell<Vec<Vec<u32>>>,
}

impl ScriptedDecoder {
    pub fn new(scripts: Vec<Vec<u32>>) -> Self {
        Self {
            scripts,
            steps: Cell::new(0),
            state_shapes: RefCell::new(Vec::new()),
            embedded: RefCell::new(Vec::new()),
        }
    }

    pub fn hidden_size(&self) -> usize {
        HIDDEN_SIZE
    }

    pub fn steps_taken(&self) -> usize {
        self.steps.get()
    }

    /// Shapes of the hidden state produced by each step
    pub fn state_shapes(&self) -> Vec<Vec<usize>> {
        self.state_shapes.borrow().clone()
    }

    pub fn embedded_tokens(&self) -> Vec<Vec<u32>> {
        self.embedded.borrow().clone()
    }

    fn scripted_token(&self, row: usize, step: usize) -> u32 {
        let script = &self.scripts[row % self.scripts.len()];
        script.get(step).or(script.last()).copied().unwrap_or(0)
    }
}

impl StepDecoder for ScriptedDecoder {
    type Features = MockTensor;
    type Input = MockTensor;
    type Logits = Vec<u32>;
    type State = HiddenState<MockTensor>;

    fn seed(&self, features: &MockTensor) -> Result<(MockTensor, usize)> {
        expect_dims("seed", &features.shape, &[None, Some(EMBED_SIZE)])?;
        let batch = features.shape[BATCH_DIM];
        Ok((MockTensor::new(vec![batch, 1, EMBED_SIZE], features.value), batch))
    }

    fn zero_state(&self, batch_size: usize) -> Result<Self::State> {
        let zeros = MockTensor::new(vec![NUM_LAYERS, batch_size, HIDDEN_SIZE], 0);
        Ok(HiddenState::new(zeros.clone(), zeros))
    }

    fn step(&self, input: &MockTensor, state: &Self::State) -> Result<(Vec<u32>, Self::State)> {
        let batch = state.hidden.shape[STATE_BATCH_DIM];
        if input.shape[BATCH_DIM] != batch {
            return Err(CaptionError::ShapeMismatch {
                op: "step",
                expected: format!("({batch}, 1, {EMBED_SIZE})"),
                actual: input.shape.clone(),
            });
        }

        let step = state.hidden.value as usize;
        let tokens = (0..batch).map(|row| self.scripted_token(row, step)).collect();

        let advanced = MockTensor::new(state.hidden.shape.clone(), state.hidden.value + 1);
        self.state_shapes.borrow_mut().push(advanced.shape.clone());
        self.steps.set(self.steps.get() + 1);

        Ok((tokens, HiddenState::new(advanced.clone(), advanced)))
    }

    fn greedy_tokens(&self, logits: &Vec<u32>) -> Result<Vec<u32>> {
        Ok(logits.clone())
    }

    fn embed_tokens(&self, token_ids: &[u32]) -> Result<MockTensor> {
        check_token_ids(token_ids.iter().map(|id| *id as i64), VOCAB_SIZE)?;
        self.embedded.borrow_mut().push(token_ids.to_vec());
        Ok(MockTensor::new(vec![token_ids.len(), 1, EMBED_SIZE], 0))
    }
}
