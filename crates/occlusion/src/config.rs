use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    /// Seconds a primitive stays probably-visible after its last definite
    /// visible result. Also the history eviction grace period.
    pub primitive_probably_visible_time: f64,
    /// Screen fraction at which visible primitives are re-queried least often.
    pub max_occlusion_pixels_fraction: f32,
    pub grouped_batch_size: usize,
    pub individual_batch_size: usize,
    pub random_seed: u64,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            primitive_probably_visible_time: 8.0,
            max_occlusion_pixels_fraction: 0.1,
            grouped_batch_size: 8,
            individual_batch_size: 1,
            random_seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OcclusionConfigError {
    #[error("probably-visible time must be finite and non-negative")]
    ProbablyVisibleTimeInvalid,
    #[error("max occlusion pixels fraction must be in (0, 1]")]
    MaxPixelsFractionInvalid,
    #[error("query batch sizes must be greater than zero")]
    BatchSizeZero,
}

impl OcclusionConfig {
    pub fn validate(&self) -> Result<(), OcclusionConfigError> {
        if !self.primitive_probably_visible_time.is_finite()
            || self.primitive_probably_visible_time < 0.0
        {
            return Err(OcclusionConfigError::ProbablyVisibleTimeInvalid);
        }
        let fraction = self.max_occlusion_pixels_fraction;
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(OcclusionConfigError::MaxPixelsFractionInvalid);
        }
        if self.grouped_batch_size == 0 || self.individual_batch_size == 0 {
            return Err(OcclusionConfigError::BatchSizeZero);
        }
        Ok(())
    }
}
