use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use greenroom::filter::{RenderOutcome, VirtualGreenscreen};
use greenroom::gs::software::SoftwareDevice;
use greenroom::gs::{DrawPass, GsDevice, GsRenderTarget, GsTexture, TextureFormat};
use greenroom::host::{
    pixels_to_rgb_image, rgb_image_to_pixels, CaptureSource, OutputSink, TestPatternSource,
    V4L2Output, WebcamCapture,
};
use greenroom::provider::chroma::ChromaKeyBackend;
use greenroom::provider::matting::OnnxMattingBackend;
use greenroom::provider::registry::ProviderRegistry;
use greenroom::provider::{ProviderBackend, ProviderKind};
use greenroom::settings::FilterSettings;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Render a synthetic test pattern instead of opening a camera
    #[arg(long)]
    test_pattern: bool,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Frame width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Frame height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to the RVM ONNX model; when the file is missing the matting
    /// provider is left out and Automatic falls back to chroma key
    #[arg(long, default_value = "rvm_mobilenetv3_fp32.onnx")]
    model: String,

    /// Provider to use: auto, chroma or onnx (overrides the settings file)
    #[arg(long)]
    provider: Option<String>,

    /// Optional JSON settings file with provider and keying parameters
    #[arg(long)]
    settings: Option<String>,

    /// Background color behind the keyed subject, as hex RGB
    #[arg(long, default_value = "003000")]
    background: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("greenroom starting");
    tracing::info!("Frames: {}x{} at {} fps", args.width, args.height, args.fps);

    let device: Arc<dyn GsDevice> = Arc::new(SoftwareDevice::new());
    let backends: Vec<Arc<dyn ProviderBackend>> = vec![
        Arc::new(OnnxMattingBackend::new(args.model.as_str())),
        Arc::new(ChromaKeyBackend::new()),
    ];
    let registry = Arc::new(
        ProviderRegistry::new(Arc::clone(&device), backends)
            .context("No virtual greenscreen provider is available")?,
    );

    let mut settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => FilterSettings::default(),
    };
    if let Some(name) = &args.provider {
        settings.provider = parse_provider(name)?;
    }
    let filter = VirtualGreenscreen::new(Arc::clone(&registry), settings)
        .context("Failed to create the greenscreen filter")?;

    let background = parse_background(&args.background)?;
    let mut output = V4L2Output::new(&args.output_device, args.width, args.height)
        .context("Failed to initialize v4l2loopback output")?;

    if args.test_pattern {
        let mut capture = TestPatternSource::new(args.width, args.height);
        run_pipeline(&mut capture, &mut output, &device, filter, args.fps, background)
    } else {
        let mut capture = WebcamCapture::new(args.input_device, args.width, args.height)
            .context("Failed to initialize webcam capture")?;
        run_pipeline(&mut capture, &mut output, &device, filter, args.fps, background)
    }
}

fn run_pipeline<C, O>(
    capture: &mut C,
    output: &mut O,
    device: &Arc<dyn GsDevice>,
    mut filter: VirtualGreenscreen,
    target_fps: u32,
    background: [f32; 4],
) -> Result<()>
where
    C: CaptureSource,
    O: OutputSink,
{
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let (width, height) = capture.resolution();
    let mut target = device
        .create_render_target(width.max(1), height.max(1), TextureFormat::Rgba8)
        .map_err(anyhow::Error::new)?;

    let mut frame_count = 0u64;
    let mut composited = 0u64;
    let mut passed_through = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_render_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    tracing::info!("Starting main pipeline loop");
    tracing::info!("Press Ctrl+C to stop");

    loop {
        let loop_start = Instant::now();

        let capture_start = Instant::now();
        let frame = capture.capture_frame().context("Failed to capture frame")?;
        total_capture_time += capture_start.elapsed();

        let (frame_width, frame_height) = frame.dimensions();
        filter.video_tick(frame_width, frame_height);

        let render_start = Instant::now();
        let frame_tex = device
            .upload(rgb_image_to_pixels(&frame))
            .map_err(anyhow::Error::new)?;
        if (target.width(), target.height()) != (frame_width, frame_height) {
            target = device
                .create_render_target(frame_width, frame_height, TextureFormat::Rgba8)
                .map_err(anyhow::Error::new)?;
        }
        let outcome = {
            let mut pass = target.begin_pass().map_err(anyhow::Error::new)?;
            pass.clear(background);
            let mut draw_source = |p: &mut dyn DrawPass| p.draw_texture(&frame_tex);
            filter.video_render(&mut draw_source, pass.as_mut())
        };
        match outcome {
            RenderOutcome::Composited => composited += 1,
            RenderOutcome::PassThrough(reason) => {
                passed_through += 1;
                tracing::debug!("Pass-through frame: {:?}", reason);
            }
        }
        let frame_pixels = target.texture().download().map_err(anyhow::Error::new)?;
        total_render_time += render_start.elapsed();

        let output_start = Instant::now();
        let rgb = pixels_to_rgb_image(&frame_pixels)?;
        output.write_frame(&rgb).context("Failed to write frame")?;
        total_output_time += output_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_render_ms = total_render_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_capture_ms + avg_render_ms + avg_output_ms;

            tracing::info!(
                "Frame {}: provider={} ready={} composited={} passthrough={} capture={:.1}ms render={:.1}ms output={:.1}ms fps={:.1}",
                frame_count,
                filter.active_provider(),
                filter.is_ready(),
                composited,
                passed_through,
                avg_capture_ms,
                avg_render_ms,
                avg_output_ms,
                1000.0 / total_ms
            );
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }
}

fn load_settings(path: &str) -> Result<FilterSettings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse settings file {}", path))
}

fn parse_provider(name: &str) -> Result<ProviderKind> {
    match name {
        "auto" => Ok(ProviderKind::Automatic),
        "chroma" => Ok(ProviderKind::ChromaKey),
        "onnx" => Ok(ProviderKind::OnnxMatting),
        other => Err(anyhow!(
            "unknown provider '{}', expected auto, chroma or onnx",
            other
        )),
    }
}

fn parse_background(hex: &str) -> Result<[f32; 4]> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        bail!("background must be 6 hex digits, got '{}'", hex);
    }
    let channel = |range: std::ops::Range<usize>| -> Result<f32> {
        let byte = u8::from_str_radix(&hex[range], 16)
            .with_context(|| format!("invalid hex color '{}'", hex))?;
        Ok(byte as f32 / 255.0)
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?, 1.0])
}
