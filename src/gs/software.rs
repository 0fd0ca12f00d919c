//! Software implementation of the graphics boundary.
//!
//! Runs every pass on the CPU with nearest-neighbor sampling. The demo host
//! composites through this device, and the filter tests use it to observe
//! exactly what reached the target.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::GsError;
use crate::gs::{
    DrawPass, EffectParam, GsDevice, GsEffect, GsRenderTarget, GsTexture, GsTextureRef, Pixels,
    TextureFormat, ALPHA_THRESHOLD_EFFECT, PARAM_INPUT_A, PARAM_INPUT_B, PARAM_THRESHOLD,
    PARAM_THRESHOLD_RANGE, TECHNIQUE_DRAW_ALPHA_THRESHOLD,
};

pub struct SoftwareDevice {
    render_target_allocations: AtomicUsize,
    fail_effects: bool,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self {
            render_target_allocations: AtomicUsize::new(0),
            fail_effects: false,
        }
    }

    /// A device whose effect lookups always fail, for exercising the
    /// missing-effect path.
    pub fn without_effects() -> Self {
        Self {
            render_target_allocations: AtomicUsize::new(0),
            fail_effects: true,
        }
    }

    /// How many render targets this device has allocated so far.
    pub fn render_target_allocations(&self) -> usize {
        self.render_target_allocations.load(Ordering::Relaxed)
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GsDevice for SoftwareDevice {
    fn upload(&self, pixels: Pixels) -> Result<GsTextureRef, GsError> {
        Ok(Arc::new(SoftwareTexture { pixels }))
    }

    fn create_render_target(
        &self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Box<dyn GsRenderTarget>, GsError> {
        if width == 0 || height == 0 {
            return Err(GsError::Backend(format!(
                "cannot allocate {width}x{height} render target"
            )));
        }
        self.render_target_allocations.fetch_add(1, Ordering::Relaxed);
        let blank = Pixels::blank(width, height, format);
        Ok(Box::new(SoftwareRenderTarget {
            snapshot: Arc::new(SoftwareTexture {
                pixels: blank.clone(),
            }),
            scratch: blank,
        }))
    }

    fn load_effect(&self, name: &str) -> Result<Arc<dyn GsEffect>, GsError> {
        if self.fail_effects || name != ALPHA_THRESHOLD_EFFECT {
            return Err(GsError::EffectMissing(name.to_string()));
        }
        Ok(Arc::new(SoftwareEffect {
            name: name.to_string(),
            techniques: &[TECHNIQUE_DRAW_ALPHA_THRESHOLD],
        }))
    }
}

pub struct SoftwareTexture {
    pixels: Pixels,
}

impl GsTexture for SoftwareTexture {
    fn width(&self) -> u32 {
        self.pixels.width
    }

    fn height(&self) -> u32 {
        self.pixels.height
    }

    fn format(&self) -> TextureFormat {
        self.pixels.format
    }

    fn download(&self) -> Result<Pixels, GsError> {
        Ok(self.pixels.clone())
    }
}

pub struct SoftwareEffect {
    name: String,
    techniques: &'static [&'static str],
}

impl GsEffect for SoftwareEffect {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_technique(&self, technique: &str) -> bool {
        self.techniques.contains(&technique)
    }
}

pub struct SoftwareRenderTarget {
    scratch: Pixels,
    snapshot: GsTextureRef,
}

impl GsRenderTarget for SoftwareRenderTarget {
    fn width(&self) -> u32 {
        self.scratch.width
    }

    fn height(&self) -> u32 {
        self.scratch.height
    }

    fn begin_pass(&mut self) -> Result<Box<dyn DrawPass + '_>, GsError> {
        Ok(Box::new(SoftwarePass {
            target: self,
            blend: true,
        }))
    }

    fn texture(&self) -> GsTextureRef {
        Arc::clone(&self.snapshot)
    }
}

struct SoftwarePass<'a> {
    target: &'a mut SoftwareRenderTarget,
    blend: bool,
}

/// Completing a pass freezes the scratch buffer into a fresh snapshot, so
/// texture handles taken earlier keep their old contents.
impl Drop for SoftwarePass<'_> {
    fn drop(&mut self) {
        self.target.snapshot = Arc::new(SoftwareTexture {
            pixels: self.target.scratch.clone(),
        });
    }
}

impl DrawPass for SoftwarePass<'_> {
    fn clear(&mut self, color: [f32; 4]) {
        let rgba = [
            to_u8(color[0]),
            to_u8(color[1]),
            to_u8(color[2]),
            to_u8(color[3]),
        ];
        let scratch = &mut self.target.scratch;
        for y in 0..scratch.height {
            for x in 0..scratch.width {
                put_pixel(scratch, x, y, rgba, false);
            }
        }
    }

    fn set_blend_enabled(&mut self, enabled: bool) {
        self.blend = enabled;
    }

    fn draw_texture(&mut self, texture: &GsTextureRef) -> Result<(), GsError> {
        let src = texture.download()?;
        let (w, h) = (self.target.scratch.width, self.target.scratch.height);
        for y in 0..h {
            for x in 0..w {
                let rgba = sample_rgba(&src, x, y, w, h);
                put_pixel(&mut self.target.scratch, x, y, rgba, self.blend);
            }
        }
        Ok(())
    }

    fn draw_effect(
        &mut self,
        effect: &dyn GsEffect,
        technique: &str,
        params: &[(&str, EffectParam)],
    ) -> Result<(), GsError> {
        if !effect.has_technique(technique) {
            return Err(GsError::Backend(format!(
                "effect '{}' has no technique '{technique}'",
                effect.name()
            )));
        }
        if effect.name() != ALPHA_THRESHOLD_EFFECT {
            return Err(GsError::Backend(format!(
                "unknown effect '{}'",
                effect.name()
            )));
        }

        let color = texture_param(params, PARAM_INPUT_A)?.download()?;
        let matte = texture_param(params, PARAM_INPUT_B)?.download()?;
        let threshold = float_param(params, PARAM_THRESHOLD)?;
        let range = float_param(params, PARAM_THRESHOLD_RANGE)?;

        let (w, h) = (self.target.scratch.width, self.target.scratch.height);
        for y in 0..h {
            for x in 0..w {
                let mut rgba = sample_rgba(&color, x, y, w, h);
                let m = sample_rgba(&matte, x, y, w, h)[0] as f32 / 255.0;
                let a = rgba[3] as f32 / 255.0 * ramp(m, threshold, range);
                rgba[3] = to_u8(a);
                put_pixel(&mut self.target.scratch, x, y, rgba, self.blend);
            }
        }
        Ok(())
    }
}

/// Piecewise-linear threshold: fully transparent at `threshold - range`,
/// fully opaque at `threshold`.
fn ramp(matte: f32, threshold: f32, range: f32) -> f32 {
    if range <= f32::EPSILON {
        return if matte >= threshold { 1.0 } else { 0.0 };
    }
    ((matte - (threshold - range)) / range).clamp(0.0, 1.0)
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Nearest-neighbor sample of `src` at target coordinate `(x, y)` of a
/// `dst_w` x `dst_h` target, widened to RGBA.
fn sample_rgba(src: &Pixels, x: u32, y: u32, dst_w: u32, dst_h: u32) -> [u8; 4] {
    if src.is_empty() {
        return [0, 0, 0, 0];
    }
    let sx = (x as u64 * src.width as u64 / dst_w.max(1) as u64).min(src.width as u64 - 1) as usize;
    let sy =
        (y as u64 * src.height as u64 / dst_h.max(1) as u64).min(src.height as u64 - 1) as usize;
    let bpp = src.format.bytes_per_pixel();
    let at = (sy * src.width as usize + sx) * bpp;
    match src.format {
        TextureFormat::Rgba8 => [
            src.data[at],
            src.data[at + 1],
            src.data[at + 2],
            src.data[at + 3],
        ],
        TextureFormat::R8 => {
            let v = src.data[at];
            [v, v, v, 255]
        }
    }
}

fn put_pixel(dst: &mut Pixels, x: u32, y: u32, rgba: [u8; 4], blend: bool) {
    let bpp = dst.format.bytes_per_pixel();
    let at = (y as usize * dst.width as usize + x as usize) * bpp;
    match dst.format {
        TextureFormat::Rgba8 => {
            let out = if blend {
                src_over(rgba, [
                    dst.data[at],
                    dst.data[at + 1],
                    dst.data[at + 2],
                    dst.data[at + 3],
                ])
            } else {
                rgba
            };
            dst.data[at..at + 4].copy_from_slice(&out);
        }
        TextureFormat::R8 => {
            dst.data[at] = rgba[0];
        }
    }
}

fn src_over(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let sa = src[3] as f32 / 255.0;
    let mut out = [0u8; 4];
    for c in 0..3 {
        out[c] = to_u8((src[c] as f32 / 255.0) * sa + (dst[c] as f32 / 255.0) * (1.0 - sa));
    }
    out[3] = to_u8(sa + (dst[3] as f32 / 255.0) * (1.0 - sa));
    out
}

fn texture_param<'a>(
    params: &'a [(&str, EffectParam)],
    name: &str,
) -> Result<&'a GsTextureRef, GsError> {
    match params.iter().find(|(n, _)| *n == name) {
        Some((_, EffectParam::Texture(t))) => Ok(t),
        _ => Err(GsError::Backend(format!(
            "effect parameter '{name}' is not bound to a texture"
        ))),
    }
}

fn float_param(params: &[(&str, EffectParam)], name: &str) -> Result<f32, GsError> {
    match params.iter().find(|(n, _)| *n == name) {
        Some((_, EffectParam::Float(v))) => Ok(*v),
        _ => Err(GsError::Backend(format!(
            "effect parameter '{name}' is not bound to a float"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(device: &SoftwareDevice, width: u32, height: u32, px: [u8; 4]) -> GsTextureRef {
        let data = px.repeat(width as usize * height as usize);
        device
            .upload(Pixels::new(width, height, TextureFormat::Rgba8, data).unwrap())
            .unwrap()
    }

    fn matte(device: &SoftwareDevice, width: u32, height: u32, value: u8) -> GsTextureRef {
        let data = vec![value; (width * height) as usize];
        device
            .upload(Pixels::new(width, height, TextureFormat::R8, data).unwrap())
            .unwrap()
    }

    #[test]
    fn upload_download_round_trip() {
        let device = SoftwareDevice::new();
        let pixels = Pixels::new(2, 1, TextureFormat::Rgba8, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let tex = device.upload(pixels.clone()).unwrap();
        assert_eq!(tex.download().unwrap(), pixels);
    }

    #[test]
    fn completed_pass_freezes_snapshot() {
        let device = SoftwareDevice::new();
        let mut target = device
            .create_render_target(1, 1, TextureFormat::Rgba8)
            .unwrap();
        let red = rgba(&device, 1, 1, [255, 0, 0, 255]);
        let blue = rgba(&device, 1, 1, [0, 0, 255, 255]);

        {
            let mut pass = target.begin_pass().unwrap();
            pass.set_blend_enabled(false);
            pass.draw_texture(&red).unwrap();
        }
        let first = target.texture();

        {
            let mut pass = target.begin_pass().unwrap();
            pass.set_blend_enabled(false);
            pass.draw_texture(&blue).unwrap();
        }

        assert_eq!(first.download().unwrap().data, vec![255, 0, 0, 255]);
        assert_eq!(target.texture().download().unwrap().data, vec![0, 0, 255, 255]);
    }

    #[test]
    fn alpha_threshold_ramps_alpha() {
        let device = SoftwareDevice::new();
        let effect = device.load_effect(ALPHA_THRESHOLD_EFFECT).unwrap();
        let color = rgba(&device, 3, 1, [10, 20, 30, 255]);
        let mut target = device
            .create_render_target(3, 1, TextureFormat::Rgba8)
            .unwrap();

        for (value, expect) in [(0u8, 0u8), (255, 255)] {
            let m = matte(&device, 3, 1, value);
            let mut pass = target.begin_pass().unwrap();
            pass.set_blend_enabled(false);
            pass.draw_effect(
                effect.as_ref(),
                TECHNIQUE_DRAW_ALPHA_THRESHOLD,
                &[
                    (PARAM_INPUT_A, EffectParam::Texture(color.clone())),
                    (PARAM_INPUT_B, EffectParam::Texture(m)),
                    (PARAM_THRESHOLD, EffectParam::Float(0.666_667)),
                    (PARAM_THRESHOLD_RANGE, EffectParam::Float(0.333_333)),
                ],
            )
            .unwrap();
            drop(pass);
            assert_eq!(target.texture().download().unwrap().data[3], expect);
        }

        // Midpoint of the ramp lands near half opacity.
        let m = matte(&device, 3, 1, 128);
        let mut pass = target.begin_pass().unwrap();
        pass.set_blend_enabled(false);
        pass.draw_effect(
            effect.as_ref(),
            TECHNIQUE_DRAW_ALPHA_THRESHOLD,
            &[
                (PARAM_INPUT_A, EffectParam::Texture(color)),
                (PARAM_INPUT_B, EffectParam::Texture(m)),
                (PARAM_THRESHOLD, EffectParam::Float(0.666_667)),
                (PARAM_THRESHOLD_RANGE, EffectParam::Float(0.333_333)),
            ],
        )
        .unwrap();
        drop(pass);
        let a = target.texture().download().unwrap().data[3] as i32;
        assert!((a - 128).abs() <= 3, "alpha {a} not near ramp midpoint");
    }

    #[test]
    fn missing_parameter_is_an_error() {
        let device = SoftwareDevice::new();
        let effect = device.load_effect(ALPHA_THRESHOLD_EFFECT).unwrap();
        let mut target = device
            .create_render_target(1, 1, TextureFormat::Rgba8)
            .unwrap();
        let mut pass = target.begin_pass().unwrap();
        let err = pass
            .draw_effect(effect.as_ref(), TECHNIQUE_DRAW_ALPHA_THRESHOLD, &[])
            .unwrap_err();
        assert!(matches!(err, GsError::Backend(_)));
    }

    #[test]
    fn unknown_effect_fails_to_load() {
        let device = SoftwareDevice::new();
        assert!(matches!(
            device.load_effect("bloom"),
            Err(GsError::EffectMissing(_))
        ));
        assert!(matches!(
            SoftwareDevice::without_effects().load_effect(ALPHA_THRESHOLD_EFFECT),
            Err(GsError::EffectMissing(_))
        ));
    }

    #[test]
    fn allocation_counter_tracks_render_targets() {
        let device = SoftwareDevice::new();
        assert_eq!(device.render_target_allocations(), 0);
        let _a = device
            .create_render_target(4, 4, TextureFormat::Rgba8)
            .unwrap();
        let _b = device
            .create_render_target(8, 8, TextureFormat::Rgba8)
            .unwrap();
        assert_eq!(device.render_target_allocations(), 2);
        assert!(device.create_render_target(0, 4, TextureFormat::Rgba8).is_err());
    }
}
