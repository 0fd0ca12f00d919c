//! Chroma-key provider. Pure CPU, no external dependencies, so it always
//! probes available and serves as the fallback backend.

use std::sync::Arc;

use anyhow::Result;

use crate::error::{ProcessError, ProviderInitError, ProviderLoadError};
use crate::gs::{GsDevice, GsTexture, GsTextureRef, Pixels, TextureFormat};
use crate::properties::{Property, PropertyKind};
use crate::provider::{ProcessOutput, Provider, ProviderBackend, ProviderKind};
use crate::settings::{ChromaSettings, FilterSettings};

pub struct ChromaKeyBackend;

impl ChromaKeyBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChromaKeyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderBackend for ChromaKeyBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ChromaKey
    }

    fn probe(&self) -> Result<(), ProviderInitError> {
        Ok(())
    }

    fn load(&self, device: &Arc<dyn GsDevice>) -> Result<Box<dyn Provider>, ProviderLoadError> {
        Ok(Box::new(ChromaKeyProvider::new(Arc::clone(device))))
    }

    fn describe_properties(&self) -> Property {
        Property {
            id: "chroma",
            label: "Chroma Key",
            kind: PropertyKind::Group {
                children: vec![
                    Property {
                        id: "key_color",
                        label: "Key Color",
                        kind: PropertyKind::Color,
                    },
                    Property {
                        id: "similarity",
                        label: "Similarity",
                        kind: PropertyKind::Slider {
                            min: 0.0,
                            max: 1.0,
                            step: 0.01,
                        },
                    },
                    Property {
                        id: "smoothness",
                        label: "Smoothness",
                        kind: PropertyKind::Slider {
                            min: 0.0,
                            max: 1.0,
                            step: 0.01,
                        },
                    },
                ],
            },
        }
    }
}

/// Keys out pixels near the key color in YUV chroma space. The color plane
/// passes through untouched; only the matte is computed.
pub struct ChromaKeyProvider {
    device: Arc<dyn GsDevice>,
    settings: ChromaSettings,
    key_uv: (f32, f32),
}

impl ChromaKeyProvider {
    fn new(device: Arc<dyn GsDevice>) -> Self {
        let settings = ChromaSettings::default();
        let key_uv = chroma_uv(settings.key_color);
        Self {
            device,
            settings,
            key_uv,
        }
    }

    fn matte_value(&self, rgb: [u8; 3]) -> u8 {
        let (u, v) = chroma_uv(rgb);
        let (ku, kv) = self.key_uv;
        let dist = ((u - ku).powi(2) + (v - kv).powi(2)).sqrt();
        let alpha = if self.settings.smoothness <= f32::EPSILON {
            if dist > self.settings.similarity {
                1.0
            } else {
                0.0
            }
        } else {
            ((dist - self.settings.similarity) / self.settings.smoothness).clamp(0.0, 1.0)
        };
        (alpha * 255.0).round() as u8
    }
}

impl Provider for ChromaKeyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ChromaKey
    }

    fn process(&mut self, input: &GsTextureRef) -> Result<ProcessOutput, ProcessError> {
        let frame = input
            .download()
            .map_err(|e| ProcessError::Backend(anyhow::Error::new(e)))?;
        if frame.is_empty() {
            return Err(ProcessError::EmptyInput {
                width: frame.width,
                height: frame.height,
            });
        }

        let mut matte = Vec::with_capacity((frame.width * frame.height) as usize);
        for px in frame.data.chunks_exact(4) {
            matte.push(self.matte_value([px[0], px[1], px[2]]));
        }

        let alpha_pixels = Pixels::new(frame.width, frame.height, TextureFormat::R8, matte)
            .map_err(|e| ProcessError::Backend(anyhow::Error::new(e)))?;
        let alpha = self
            .device
            .upload(alpha_pixels)
            .map_err(|e| ProcessError::Backend(anyhow::Error::new(e)))?;

        Ok(ProcessOutput {
            color: Arc::clone(input),
            alpha,
        })
    }

    fn configure(&mut self, settings: &FilterSettings) -> Result<()> {
        self.settings = settings.chroma.clone();
        self.key_uv = chroma_uv(self.settings.key_color);
        Ok(())
    }
}

/// BT.601 chroma coordinates, each in `[-0.5, 0.5]`.
fn chroma_uv(rgb: [u8; 3]) -> (f32, f32) {
    let r = rgb[0] as f32 / 255.0;
    let g = rgb[1] as f32 / 255.0;
    let b = rgb[2] as f32 / 255.0;
    let u = -0.169 * r - 0.331 * g + 0.5 * b;
    let v = 0.5 * r - 0.419 * g - 0.081 * b;
    (u, v)
}
