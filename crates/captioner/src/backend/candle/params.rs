use std::path::Path;

use candle_core::{DType, Device, Var};
use candle_nn::{VarBuilder, VarMap};
use tracing::{debug, info};

use crate::error::Result;

/// The two parameter groups of a captioning model.
///
/// `trainable` is a [`VarMap`]: every tensor created through
/// [`ParamPartition::trainable`] is a `Var` recorded there, and only those
/// vars are handed to an optimizer or written by
/// [`save_trainable`](ParamPartition::save_trainable).
///
/// `frozen` is a plain [`VarBuilder`] over pretrained weights. Tensors read
/// from it are constants, so the backbone cannot receive gradient updates.
pub struct ParamPartition {
    trainable: VarMap,
    frozen: VarBuilder<'static>,
    dtype: DType,
    device: Device,
}

impl ParamPartition {
    /// A partition with an empty trainable group over the given frozen weights.
    pub fn new(frozen: VarBuilder<'static>) -> Self {
        let dtype = frozen.dtype();
        let device = frozen.device().clone();
        Self {
            trainable: VarMap::new(),
            frozen,
            dtype,
            device,
        }
    }

    /// Frozen weights memory-mapped from safetensors files.
    pub fn from_safetensors<P: AsRef<Path>>(paths: &[P], dtype: DType, device: &Device) -> Result<Self> {
        // SAFETY: the files must not be modified while they are mapped
        let frozen = unsafe { VarBuilder::from_mmaped_safetensors(paths, dtype, device)? };
        info!(files = paths.len(), "mapped frozen weights");
        Ok(Self::new(frozen))
    }

    /// Frozen weights that read as zeros, for models that are built to be
    /// trained or loaded later.
    pub fn untrained(dtype: DType, device: &Device) -> Self {
        Self::new(VarBuilder::zeros(dtype, device))
    }

    /// A builder whose tensors are registered as trainable vars.
    pub fn trainable(&self) -> VarBuilder<'static> {
        VarBuilder::from_varmap(&self.trainable, self.dtype, &self.device)
    }

    pub fn frozen(&self) -> VarBuilder<'static> {
        self.frozen.clone()
    }

    /// Every trainable var, for an optimizer such as `candle_nn::AdamW`.
    pub fn trainable_vars(&self) -> Vec<Var> {
        self.trainable.all_vars()
    }

    /// Names of the trainable vars, sorted.
    pub fn trainable_names(&self) -> Vec<String> {
        let data = self
            .trainable
            .data()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = data.keys().cloned().collect();
        names.sort();
        names
    }

    /// Writes the trainable group to a safetensors file.
    pub fn save_trainable<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.trainable.save(path.as_ref())?;
        debug!(path = %path.as_ref().display(), vars = self.trainable.all_vars().len(), "saved trainable parameters");
        Ok(())
    }

    /// Overwrites the trainable vars with values from a safetensors file.
    ///
    /// The vars must already exist, so build the model before loading.
    pub fn load_trainable<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.trainable.load(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "loaded trainable parameters");
        Ok(())
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl std::fmt::Debug for ParamPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamPartition")
            .field("trainable", &self.trainable_names())
            .field("dtype", &self.dtype)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
