//! Demo host.
//!
//! A minimal host that drives one filter instance end to end: frames come
//! from a webcam (or a synthetic pattern), go through the filter on the
//! software device, and land in a v4l2loopback sink. Real hosts replace all
//! of this; the filter itself never depends on it.

pub mod capture;
pub mod output;

pub use capture::{TestPatternSource, WebcamCapture};
pub use output::V4L2Output;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::gs::{Pixels, TextureFormat};

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Get the resolution frames were requested at
    fn resolution(&self) -> (u32, u32);
}

/// Trait for frame sinks
pub trait OutputSink {
    /// Write a single frame
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Get the sink's output resolution
    fn resolution(&self) -> (u32, u32);
}

/// Widen a captured RGB frame to the RGBA layout the device boundary uses.
pub fn rgb_image_to_pixels(image: &RgbImage) -> Pixels {
    let (width, height) = image.dimensions();
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for px in image.as_raw().chunks_exact(3) {
        data.extend_from_slice(&[px[0], px[1], px[2], 255]);
    }
    Pixels {
        width,
        height,
        format: TextureFormat::Rgba8,
        data,
    }
}

/// Drop the alpha channel of a composited frame for the RGB sink.
pub fn pixels_to_rgb_image(pixels: &Pixels) -> Result<RgbImage> {
    if pixels.format != TextureFormat::Rgba8 {
        return Err(anyhow!("expected RGBA pixels, got {:?}", pixels.format));
    }
    let mut data = Vec::with_capacity((pixels.width * pixels.height * 3) as usize);
    for px in pixels.data.chunks_exact(4) {
        data.extend_from_slice(&px[..3]);
    }
    RgbImage::from_raw(pixels.width, pixels.height, data)
        .ok_or_else(|| anyhow!("frame buffer too small for {}x{}", pixels.width, pixels.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_round_trips_through_the_boundary_layout() {
        let image = RgbImage::from_fn(2, 2, |x, y| image::Rgb([x as u8, y as u8, 7]));
        let pixels = rgb_image_to_pixels(&image);
        assert_eq!(pixels.format, TextureFormat::Rgba8);
        assert_eq!(pixels.data.len(), 16);
        assert_eq!(&pixels.data[..4], &[0, 0, 7, 255]);

        let back = pixels_to_rgb_image(&pixels).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn non_rgba_pixels_are_rejected() {
        let pixels = Pixels::blank(2, 2, TextureFormat::R8);
        assert!(pixels_to_rgb_image(&pixels).is_err());
    }
}
