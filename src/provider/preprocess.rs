//! Conversions between boundary pixels and model tensors.

use anyhow::{anyhow, Result};
use image::{imageops, GrayImage, RgbaImage};
use ndarray::Array4;

use crate::gs::{Pixels, TextureFormat};

/// Converts captured frames to normalized NCHW tensors at the model's input
/// resolution, and model outputs back to full-resolution pixels.
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// RGBA frame to a normalized NCHW tensor, shape `[1, 3, height, width]`.
    /// Alpha is dropped; values are scaled to `[0, 1]`.
    pub fn preprocess(&self, frame: &Pixels) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        let image = rgba_image(frame)?;
        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                &image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Lanczos3,
            )
        } else {
            image
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        for y in 0..height {
            for x in 0..width {
                let pixel = resized.get_pixel(x, y);
                tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
                tensor[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
                tensor[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
            }
        }
        Ok(tensor)
    }

    /// Flattened matte at model resolution to single-channel pixels at the
    /// target frame size.
    pub fn matte_to_pixels(
        matte: &[f32],
        matte_width: u32,
        matte_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Pixels> {
        let _span = tracing::debug_span!("postprocess_matte").entered();

        if matte.len() != (matte_width * matte_height) as usize {
            return Err(anyhow!(
                "matte has {} values, expected {}x{}",
                matte.len(),
                matte_width,
                matte_height
            ));
        }

        let gray = GrayImage::from_fn(matte_width, matte_height, |x, y| {
            let idx = (y * matte_width + x) as usize;
            image::Luma([(matte[idx] * 255.0).clamp(0.0, 255.0) as u8])
        });
        let resized = if (matte_width, matte_height) != (target_width, target_height) {
            imageops::resize(
                &gray,
                target_width,
                target_height,
                imageops::FilterType::Lanczos3,
            )
        } else {
            gray
        };
        Pixels::new(
            target_width,
            target_height,
            TextureFormat::R8,
            resized.into_raw(),
        )
        .map_err(|e| anyhow!(e))
    }

    /// Flattened NCHW color planes at model resolution to opaque RGBA pixels
    /// at the target frame size.
    pub fn color_to_pixels(
        planes: &[f32],
        color_width: u32,
        color_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Pixels> {
        let _span = tracing::debug_span!("postprocess_color").entered();

        let plane = (color_width * color_height) as usize;
        if planes.len() != plane * 3 {
            return Err(anyhow!(
                "color output has {} values, expected 3x{}x{}",
                planes.len(),
                color_width,
                color_height
            ));
        }

        let to_channel = |v: f32| (v * 255.0).clamp(0.0, 255.0) as u8;
        let image = RgbaImage::from_fn(color_width, color_height, |x, y| {
            let idx = (y * color_width + x) as usize;
            image::Rgba([
                to_channel(planes[idx]),
                to_channel(planes[plane + idx]),
                to_channel(planes[2 * plane + idx]),
                255,
            ])
        });
        let resized = if (color_width, color_height) != (target_width, target_height) {
            imageops::resize(
                &image,
                target_width,
                target_height,
                imageops::FilterType::Lanczos3,
            )
        } else {
            image
        };
        Pixels::new(
            target_width,
            target_height,
            TextureFormat::Rgba8,
            resized.into_raw(),
        )
        .map_err(|e| anyhow!(e))
    }
}

fn rgba_image(frame: &Pixels) -> Result<RgbaImage> {
    if frame.format != TextureFormat::Rgba8 {
        return Err(anyhow!("expected RGBA input, got {:?}", frame.format));
    }
    RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| anyhow!("frame buffer too small for {}x{}", frame.width, frame.height))
}
