//! Capture sources for the demo host.

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

use super::CaptureSource;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    /// Open the device and negotiate the closest available format to the
    /// requested size. Captured frames are scaled to exactly
    /// `width`x`height`, so downstream stages see a stable frame size no
    /// matter what the hardware agreed to.
    pub fn new(device_index: u32, width: u32, height: u32) -> Result<Self> {
        let index = CameraIndex::Index(device_index);
        let format = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, 30);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;
        camera
            .open_stream()
            .context("Failed to start camera stream")?;

        let negotiated = camera.resolution();
        tracing::info!(
            "Webcam {} ready: negotiated {}x{} for a requested {}x{}",
            device_index,
            negotiated.width(),
            negotiated.height(),
            width,
            height
        );

        Ok(Self {
            camera,
            width,
            height,
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let frame = self.camera.frame().context("Failed to capture frame")?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;
        if decoded.dimensions() == (self.width, self.height) {
            return Ok(decoded);
        }
        Ok(imageops::resize(
            &decoded,
            self.width,
            self.height,
            FilterType::Triangle,
        ))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Synthetic source for running the pipeline without a camera: a wandering
/// warm-toned block standing in for the subject, over a flat green field.
/// Useful for checking the whole chain against the chroma-key provider.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame: u64,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame: 0,
        }
    }
}

impl CaptureSource for TestPatternSource {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let width = self.width;
        let band = (width / 4).max(1);
        let offset = ((self.frame * 3) % width as u64) as u32;
        self.frame += 1;

        Ok(RgbImage::from_fn(width, self.height, |x, y| {
            let in_band = (x + width - offset) % width < band;
            let in_rows = y > self.height / 4;
            if in_band && in_rows {
                image::Rgb([219, 178, 156])
            } else {
                image::Rgb([0, 200, 0])
            }
        }))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
