//! # Model configuration
//!
//! Sizes for the encoder projection and the decoder, plus the knobs that bound
//! greedy generation. Configurations are plain serde structs so they can be
//! stored next to a checkpoint as JSON and rebuilt before inference.
//!
//! ```json
//! {
//!   "embed_size": 256,
//!   "hidden_size": 512,
//!   "vocab_size": 8856,
//!   "generation": { "max_steps": 20, "end_token_id": 1, "on_limit": "truncate" }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CaptionError, Result};
use crate::tensor::constant::{DEFAULT_END_TOKEN_ID, DEFAULT_MAX_STEPS, NUM_LAYERS};

/// What greedy decoding does when `max_steps` runs out before the end token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitPolicy {
    /// Fail with [`CaptionError::NonTerminatingGeneration`].
    #[default]
    Error,
    /// Return the tokens generated so far.
    Truncate,
}

/// Bounds and markers for the greedy decode loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Hard cap on decode steps per call
    pub max_steps: usize,

    /// Vocabulary id that ends a caption
    pub end_token_id: u32,

    pub on_limit: LimitPolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            end_token_id: DEFAULT_END_TOKEN_ID,
            on_limit: LimitPolicy::default(),
        }
    }
}

impl GenerationConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_end_token_id(mut self, end_token_id: u32) -> Self {
        self.end_token_id = end_token_id;
        self
    }

    pub fn with_on_limit(mut self, on_limit: LimitPolicy) -> Self {
        self.on_limit = on_limit;
        self
    }

    /// Rejects a zero step bound, which could never produce a token.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(CaptionError::InvalidConfig(
                "generation.max_steps must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_num_layers() -> usize {
    NUM_LAYERS
}

/// Sizes of the captioning model.
///
/// The image feature projection and the word embeddings share `embed_size`,
/// since the image embedding is fed to the decoder as its first time step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionConfig {
    pub embed_size: usize,
    pub hidden_size: usize,
    pub vocab_size: usize,

    /// Recurrent layers in the decoder. Only a single layer is supported.
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,

    #[serde(default)]
    pub generation: GenerationConfig,
}

impl CaptionConfig {
    pub fn new(embed_size: usize, hidden_size: usize, vocab_size: usize) -> Self {
        Self {
            embed_size,
            hidden_size,
            vocab_size,
            num_layers: NUM_LAYERS,
            generation: GenerationConfig::default(),
        }
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Reads and validates a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let raw = serde_json::to_vec_pretty(self)?;
        std::fs::write(path.as_ref(), raw)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("embed_size", self.embed_size),
            ("hidden_size", self.hidden_size),
            ("vocab_size", self.vocab_size),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(CaptionError::InvalidConfig(format!("{name} must be non-zero")));
        }
        if self.num_layers != NUM_LAYERS {
            return Err(CaptionError::InvalidConfig(format!(
                "num_layers must be {NUM_LAYERS}, got {}",
                self.num_layers
            )));
        }
        self.generation.validate()?;
        if self.generation.end_token_id as usize >= self.vocab_size {
            return Err(CaptionError::InvalidConfig(format!(
                "end token {} is outside a vocabulary of {}",
                self.generation.end_token_id, self.vocab_size
            )));
        }
        Ok(())
    }
}
