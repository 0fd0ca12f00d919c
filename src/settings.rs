//! Persisted settings schema, as read back through `load`/`update`.

use serde::{Deserialize, Serialize};

use crate::provider::ProviderKind;

/// User-adjustable settings for one filter instance.
///
/// Every field has a default so a partial (or empty) settings document from
/// the host deserializes into a working configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Which provider to run; `Automatic` resolves through the registry's
    /// priority list.
    pub provider: ProviderKind,
    /// Chroma-key backend settings.
    pub chroma: ChromaSettings,
    /// ONNX matting backend settings.
    pub matting: MattingSettings,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Automatic,
            chroma: ChromaSettings::default(),
            matting: MattingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaSettings {
    /// Key color as RGB bytes.
    pub key_color: [u8; 3],
    /// Distance to the key color below which a pixel is fully background,
    /// in normalized YUV chroma space.
    pub similarity: f32,
    /// Width of the ramp from background to foreground above `similarity`.
    pub smoothness: f32,
}

impl Default for ChromaSettings {
    fn default() -> Self {
        Self {
            key_color: [0, 255, 0],
            similarity: 0.4,
            smoothness: 0.08,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MattingSettings {
    /// Quality/performance trade-off; selects the inference resolution.
    pub mode: MattingMode,
}

impl Default for MattingSettings {
    fn default() -> Self {
        Self {
            mode: MattingMode::Quality,
        }
    }
}

/// Inference mode for the matting backend, persisted as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum MattingMode {
    Performance,
    Quality,
}

impl From<i64> for MattingMode {
    fn from(value: i64) -> Self {
        match value {
            0 => MattingMode::Performance,
            _ => MattingMode::Quality,
        }
    }
}

impl From<MattingMode> for i64 {
    fn from(mode: MattingMode) -> Self {
        match mode {
            MattingMode::Performance => 0,
            MattingMode::Quality => 1,
        }
    }
}
