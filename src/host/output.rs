//! v4l2loopback sink for the demo host.
//!
//! The loopback device is opened twice: once through the v4l API to
//! negotiate a YUYV output format, and once as a plain file that frames
//! are streamed to. The v4l handle stays open so the negotiated format
//! outlives individual writes.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

use super::OutputSink;

pub struct V4L2Output {
    // Held open so the loopback keeps the negotiated format.
    _device: Device,
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;
        let format = device
            .set_format(&Format::new(width, height, FourCC::new(b"YUYV")))
            .context("Failed to set YUYV format on the loopback device")?;
        tracing::info!(
            "Loopback format negotiated: {}x{} {}",
            format.width,
            format.height,
            format.fourcc
        );

        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;

        Ok(Self {
            _device: device,
            file,
            width,
            height,
        })
    }
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let scaled;
        let frame = if frame.dimensions() == (self.width, self.height) {
            frame
        } else {
            scaled = image::imageops::resize(
                frame,
                self.width,
                self.height,
                image::imageops::FilterType::Lanczos3,
            );
            &scaled
        };

        self.file
            .write_all(&pack_yuyv(frame))
            .context("Failed to write frame to v4l2loopback device")?;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Pack an RGB frame as YUV 4:2:2 (YUYV). Each horizontal pixel pair
/// shares one chroma sample, averaged over the pair.
fn pack_yuyv(frame: &RgbImage) -> Vec<u8> {
    let (width, height) = frame.dimensions();
    let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let left = yuv(*frame.get_pixel(x, y));
            let right = if x + 1 < width {
                yuv(*frame.get_pixel(x + 1, y))
            } else {
                left
            };

            yuyv.push(left.0);
            yuyv.push(((left.1 as u16 + right.1 as u16) / 2) as u8);
            yuyv.push(right.0);
            yuyv.push(((left.2 as u16 + right.2 as u16) / 2) as u8);
        }
    }

    yuyv
}

fn yuv(Rgb([r, g, b]): Rgb<u8>) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);

    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.147 * r - 0.289 * g + 0.436 * b + 128.0;
    let v = 0.615 * r - 0.515 * g - 0.100 * b + 128.0;

    (
        y.clamp(0.0, 255.0) as u8,
        u.clamp(0.0, 255.0) as u8,
        v.clamp(0.0, 255.0) as u8,
    )
}
