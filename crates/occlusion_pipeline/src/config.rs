use std::path::Path;

use occlusion::{OcclusionConfig, OcclusionConfigError};
use render_thread::{RenderThreadConfig, RenderThreadConfigError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub render_thread: RenderThreadConfig,
    /// Used for views added without their own config.
    pub occlusion: OcclusionConfig,
}

#[derive(Debug, Error)]
pub enum PipelineConfigError {
    #[error("failed to read pipeline config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid pipeline config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    RenderThread(#[from] RenderThreadConfigError),
    #[error(transparent)]
    Occlusion(#[from] OcclusionConfigError),
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, PipelineConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), PipelineConfigError> {
        self.render_thread.validate()?;
        self.occlusion.validate()?;
        Ok(())
    }
}
