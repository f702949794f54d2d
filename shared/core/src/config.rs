use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// How the model is split across the process group.
///
/// Defaults to [`ParallelismMode::Tensor`] per the reference configuration,
/// settable via [`RunConfig`]/CLI rather than a process-wide mutable static.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelismMode {
    Data,
    Pipeline,
    Tensor,
}

impl Default for ParallelismMode {
    fn default() -> Self {
        Self::Tensor
    }
}

/// Whether the Sync Dispatcher runs its steps inline or on the background queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainMode {
    Sync,
    Async,
}

impl Default for TrainMode {
    fn default() -> Self {
        Self::Sync
    }
}

/// The bootstrap-time agreement every peer loads identically: layer shape,
/// epoch/batch/step counts, learning rate, parallelism mode, train mode, and
/// the data directory. Mirrors the teacher's `state.toml` convention — parsed
/// with `toml`/`serde`, individual fields overridable from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub layer_shape: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    #[serde(default = "default_log_step")]
    pub log_step: usize,
    #[serde(default)]
    pub parallelism_mode: ParallelismMode,
    #[serde(default)]
    pub train_mode: TrainMode,
    pub data_dir: PathBuf,
}

fn default_log_step() -> usize {
    1
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, CoreError> {
        let config: RunConfig = toml::from_str(text).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate(1)?;
        Ok(config)
    }

    /// `size` is the process group size, known only once the transport is up;
    /// validated separately from parsing so the pipeline-gate check has it.
    pub fn validate(&self, size: i32) -> Result<(), CoreError> {
        if self.layer_shape.is_empty() {
            return Err(CoreError::Config("layer_shape must name at least one layer".into()));
        }
        if self.batch_size == 0 {
            return Err(CoreError::Config("batch_size must be nonzero".into()));
        }
        // `layer_shape` holds `L + 1` widths (`[w0, ..., wL]`), so the
        // trainable-layer count the pipeline gate checks is `len() - 1`.
        let trainable_layers = self.layer_shape.len() as i32 - 1;
        if self.parallelism_mode == ParallelismMode::Pipeline && trainable_layers < size {
            return Err(CoreError::Config(format!(
                "pipeline mode requires at least as many layers as peers: L={trainable_layers}, size={size}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_minimal_toml() {
        let toml = r#"
            layer_shape = [4, 8, 3]
            epochs = 10
            batch_size = 32
            learning_rate = 0.01
            data_dir = "data"
        "#;
        let config = RunConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.layer_shape, vec![4, 8, 3]);
        assert_eq!(config.parallelism_mode, ParallelismMode::Tensor);
        assert_eq!(config.train_mode, TrainMode::Sync);
        assert_eq!(config.log_step, 1);
    }

    #[test]
    fn rejects_pipeline_with_too_few_layers() {
        // 3 widths -> L = 2 trainable layers.
        let config = RunConfig {
            layer_shape: vec![4, 8, 3],
            epochs: 1,
            batch_size: 1,
            learning_rate: 0.1,
            log_step: 1,
            parallelism_mode: ParallelismMode::Pipeline,
            train_mode: TrainMode::Sync,
            data_dir: "data".into(),
        };
        assert!(config.validate(4).is_err());
        assert!(config.validate(2).is_ok());
    }
}
