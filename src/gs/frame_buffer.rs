//! Capture buffer and cached composite inputs.

use std::sync::Arc;

use crate::error::GsError;
use crate::gs::{DrawPass, GsDevice, GsRenderTarget, GsTextureRef, TextureFormat};

/// Offscreen buffer the upstream source is captured into, kept on the device
/// between frames. Reallocated only when the frame size actually changes.
pub struct FrameBuffer {
    target: Box<dyn GsRenderTarget>,
    format: TextureFormat,
}

impl FrameBuffer {
    /// Preallocates at minimum size so allocation failures surface at
    /// construction rather than mid-stream.
    pub fn new(device: &Arc<dyn GsDevice>, format: TextureFormat) -> Result<Self, GsError> {
        Ok(Self {
            target: device.create_render_target(1, 1, format)?,
            format,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.target.width(), self.target.height())
    }

    /// Capture one frame: size the buffer (dimensions clamped to at least
    /// one texel), clear it, hand a blend-disabled pass to `draw`, and
    /// return the frozen result.
    pub fn capture(
        &mut self,
        device: &Arc<dyn GsDevice>,
        width: u32,
        height: u32,
        draw: &mut dyn FnMut(&mut dyn DrawPass) -> Result<(), GsError>,
    ) -> Result<GsTextureRef, GsError> {
        let width = width.max(1);
        let height = height.max(1);
        if (self.target.width(), self.target.height()) != (width, height) {
            self.target = device.create_render_target(width, height, self.format)?;
        }
        {
            let mut pass = self.target.begin_pass()?;
            pass.set_blend_enabled(false);
            pass.clear([0.0, 0.0, 0.0, 0.0]);
            draw(pass.as_mut())?;
        }
        Ok(self.target.texture())
    }
}

/// Composite inputs from the most recent successful provider pass. Replaced
/// wholesale on success; never partially overwritten.
#[derive(Clone)]
pub struct CachedFrame {
    pub color: GsTextureRef,
    pub alpha: GsTextureRef,
}
