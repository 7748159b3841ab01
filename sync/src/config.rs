use fogwarden_core::SampleMode;
use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::Result;

pub const MIN_BRUSH_SIZE: f32 = 50.0;
pub const MAX_BRUSH_SIZE: f32 = 500.0;

/// Host brush settings, sizes are radii in world units.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfig {
    pub size: f32,
}

impl BrushConfig {
    pub fn new(size: f32) -> Self {
        let mut brush = Self::default();
        brush.set_size(size);
        brush
    }

    pub fn set_size(&mut self, size: f32) {
        if size.is_finite() {
            self.size = size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
        }
    }

    /// Radius for a stroke, falling back to the brush size when the stroke has none.
    pub fn radius_for(&self, radius: Option<f32>) -> f32 {
        match radius {
            Some(radius) if radius > 0.0 => radius,
            _ => self.size,
        }
    }
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self { size: 150.0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    /// Quiet period after the last edit before the grid is written out
    pub debounce_ms: u64,
    /// Upper bound for a single store request
    pub store_timeout_ms: u64,
    pub brush: BrushConfig,
    pub sample_mode: SampleMode,
    pub explored_opacity: f32,
}

impl FogConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(source)?;
        // re-clamp, deserialization bypasses the setter
        let size = config.brush.size;
        config.brush.set_size(size);
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            store_timeout_ms: 5000,
            brush: BrushConfig::default(),
            sample_mode: SampleMode::default(),
            explored_opacity: 0.3,
        }
    }
}
