//! Graphics boundary between the filter and its host.
//!
//! The host owns the real device; the filter only talks to these traits.
//! Capture targets, provider outputs and the composite pass all move through
//! [`GsTextureRef`] handles so cached frames stay valid while new ones are
//! produced. [`software`] is a CPU implementation of the whole boundary,
//! used by the demo host and by tests.

pub mod frame_buffer;
pub mod software;

use std::fmt;
use std::sync::Arc;

use crate::error::GsError;

/// Texel layouts the filter works with. Color planes are RGBA, matte planes
/// are single-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    R8,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::R8 => 1,
        }
    }
}

/// CPU-side image, tightly packed rows. This is what crosses the boundary
/// when a provider needs texels rather than a handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Pixels {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
}

impl Pixels {
    pub fn new(
        width: u32,
        height: u32,
        format: TextureFormat,
        data: Vec<u8>,
    ) -> Result<Self, GsError> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(GsError::Backend(format!(
                "pixel buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn blank(width: u32, height: u32, format: TextureFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: vec![0; len],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Immutable texture handle. Handles returned from a completed pass never
/// change contents afterwards, so they are safe to hold across frames.
pub trait GsTexture: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> TextureFormat;

    /// Full synchronous readback. GPU hosts implement this with a staging
    /// copy; the software device just clones.
    fn download(&self) -> Result<Pixels, GsError>;
}

pub type GsTextureRef = Arc<dyn GsTexture>;

/// Resource factory side of the host device.
pub trait GsDevice: Send + Sync {
    fn upload(&self, pixels: Pixels) -> Result<GsTextureRef, GsError>;

    fn create_render_target(
        &self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Box<dyn GsRenderTarget>, GsError>;

    /// Look up a named effect. Missing effects fail here, once, rather than
    /// per frame.
    fn load_effect(&self, name: &str) -> Result<Arc<dyn GsEffect>, GsError>;
}

/// An offscreen target the filter renders into. Passes are scoped: drawing
/// happens through the returned [`DrawPass`], and [`GsRenderTarget::texture`]
/// snapshots whatever the last completed pass produced.
pub trait GsRenderTarget: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn begin_pass(&mut self) -> Result<Box<dyn DrawPass + '_>, GsError>;

    fn texture(&self) -> GsTextureRef;
}

/// Draw operations valid inside one pass. Coordinates are normalized, the
/// whole target is the viewport.
pub trait DrawPass {
    fn clear(&mut self, color: [f32; 4]);

    fn set_blend_enabled(&mut self, enabled: bool);

    /// Stretch `texture` over the full target.
    fn draw_texture(&mut self, texture: &GsTextureRef) -> Result<(), GsError>;

    /// Run one technique of `effect` over the full target with the given
    /// parameter bindings.
    fn draw_effect(
        &mut self,
        effect: &dyn GsEffect,
        technique: &str,
        params: &[(&str, EffectParam)],
    ) -> Result<(), GsError>;
}

/// Values bindable to effect parameters.
#[derive(Clone)]
pub enum EffectParam {
    Float(f32),
    Texture(GsTextureRef),
}

impl fmt::Debug for EffectParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectParam::Float(v) => write!(f, "Float({v})"),
            EffectParam::Texture(t) => write!(f, "Texture({}x{})", t.width(), t.height()),
        }
    }
}

/// Handle to a loaded effect. The host resolves the name to whatever shader
/// or kernel it uses internally.
pub trait GsEffect: Send + Sync {
    fn name(&self) -> &str;
    fn has_technique(&self, technique: &str) -> bool;
}

/// Effect and parameter names for the threshold composite, shared between
/// the filter and host implementations of the boundary.
pub const ALPHA_THRESHOLD_EFFECT: &str = "alpha_threshold";
pub const TECHNIQUE_DRAW_ALPHA_THRESHOLD: &str = "DrawAlphaThreshold";
pub const PARAM_INPUT_A: &str = "InputA";
pub const PARAM_INPUT_B: &str = "InputB";
pub const PARAM_THRESHOLD: &str = "Threshold";
pub const PARAM_THRESHOLD_RANGE: &str = "ThresholdRange";
