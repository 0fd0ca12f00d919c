//! ONNX matting provider built on RobustVideoMatting.
//!
//! RVM is recurrent: hidden states (r1-r4) carry temporal consistency
//! between frames, so mattes stay stable on video. States are reset whenever
//! the frame size or inference mode changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::{Array4, IxDyn};
use ort::{GraphOptimizationLevel, Session};

use crate::error::{ProcessError, ProviderInitError, ProviderLoadError};
use crate::gs::{GsDevice, GsTexture, GsTextureRef};
use crate::properties::{Property, PropertyKind};
use crate::provider::preprocess::Preprocessor;
use crate::provider::{ProcessOutput, Provider, ProviderBackend, ProviderKind};
use crate::settings::{FilterSettings, MattingMode};

pub struct OnnxMattingBackend {
    model_path: PathBuf,
}

impl OnnxMattingBackend {
    pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
        Self {
            model_path: model_path.into(),
        }
    }
}

impl ProviderBackend for OnnxMattingBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OnnxMatting
    }

    fn probe(&self) -> Result<(), ProviderInitError> {
        if self.model_path.is_file() {
            Ok(())
        } else {
            Err(ProviderInitError::Unavailable {
                kind: self.kind(),
                reason: format!("model file {} not found", self.model_path.display()),
            })
        }
    }

    fn load(&self, device: &Arc<dyn GsDevice>) -> Result<Box<dyn Provider>, ProviderLoadError> {
        let provider = OnnxMattingProvider::new(&self.model_path, Arc::clone(device)).map_err(
            |source| ProviderLoadError::Backend {
                kind: self.kind(),
                source,
            },
        )?;
        Ok(Box::new(provider))
    }

    fn describe_properties(&self) -> Property {
        Property {
            id: "matting",
            label: "ONNX Matting",
            kind: PropertyKind::Group {
                children: vec![Property {
                    id: "mode",
                    label: "Mode",
                    kind: PropertyKind::Select {
                        options: vec![
                            ("Performance".to_string(), i64::from(MattingMode::Performance)),
                            ("Quality".to_string(), i64::from(MattingMode::Quality)),
                        ],
                    },
                }],
            },
        }
    }
}

/// Inference resolution per mode. RVM keeps hidden states at a quarter of
/// this, so both planes shrink together in performance mode.
fn inference_size(mode: MattingMode) -> (u32, u32) {
    match mode {
        MattingMode::Performance => (256, 256),
        MattingMode::Quality => (512, 512),
    }
}

pub struct OnnxMattingProvider {
    device: Arc<dyn GsDevice>,
    session: Session,
    mode: MattingMode,
    frame_width: u32,
    frame_height: u32,

    // Recurrent hidden states, fed back into the next inference.
    r1: Option<Array4<f32>>,
    r2: Option<Array4<f32>>,
    r3: Option<Array4<f32>>,
    r4: Option<Array4<f32>>,
}

impl OnnxMattingProvider {
    fn new(model_path: &Path, device: Arc<dyn GsDevice>) -> Result<Self> {
        tracing::info!("Loading RVM model from {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load model from {}", model_path.display()))?;

        tracing::info!("RVM model loaded");

        Ok(Self {
            device,
            session,
            mode: MattingMode::Quality,
            frame_width: 1,
            frame_height: 1,
            r1: None,
            r2: None,
            r3: None,
            r4: None,
        })
    }

    fn init_hidden_states(&mut self) {
        let (width, height) = inference_size(self.mode);
        let h = (height as f32 * 0.25) as usize;
        let w = (width as f32 * 0.25) as usize;

        tracing::debug!("Initializing hidden states to {}x{}", w, h);

        self.r1 = Some(Array4::zeros((1, 16, h, w)));
        self.r2 = Some(Array4::zeros((1, 20, h / 2, w / 2)));
        self.r3 = Some(Array4::zeros((1, 24, h / 4, w / 4)));
        self.r4 = Some(Array4::zeros((1, 28, h / 8, w / 8)));
    }

    fn reset_hidden_states(&mut self) {
        self.r1 = None;
        self.r2 = None;
        self.r3 = None;
        self.r4 = None;
    }

    fn infer(&mut self, input: &GsTextureRef) -> Result<ProcessOutput> {
        let _span = tracing::debug_span!("rvm_process").entered();

        let frame = input.download()?;

        if self.r1.is_none() {
            self.init_hidden_states();
        }

        let (iw, ih) = inference_size(self.mode);
        let src = Preprocessor::new(iw, ih).preprocess(&frame)?;

        let r1 = self.r1.as_ref().context("hidden state missing")?;
        let r2 = self.r2.as_ref().context("hidden state missing")?;
        let r3 = self.r3.as_ref().context("hidden state missing")?;
        let r4 = self.r4.as_ref().context("hidden state missing")?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![
                src.view(),
                r1.view(),
                r2.view(),
                r3.view(),
                r4.view()
            ]?)
            .context("Failed to run inference")?;
        drop(_infer_span);

        // Outputs: fgr (foreground color), pha (matte), then the four
        // updated hidden states.
        let fgr = outputs[0]
            .try_extract_tensor::<f32>()?
            .view()
            .to_owned()
            .into_dimensionality::<IxDyn>()?;
        let pha = outputs[1]
            .try_extract_tensor::<f32>()?
            .view()
            .to_owned()
            .into_dimensionality::<IxDyn>()?;

        self.r1 = Some(
            outputs[2]
                .try_extract_tensor::<f32>()?
                .view()
                .to_owned()
                .into_dimensionality()?,
        );
        self.r2 = Some(
            outputs[3]
                .try_extract_tensor::<f32>()?
                .view()
                .to_owned()
                .into_dimensionality()?,
        );
        self.r3 = Some(
            outputs[4]
                .try_extract_tensor::<f32>()?
                .view()
                .to_owned()
                .into_dimensionality()?,
        );
        self.r4 = Some(
            outputs[5]
                .try_extract_tensor::<f32>()?
                .view()
                .to_owned()
                .into_dimensionality()?,
        );

        let pha_shape = pha.shape();
        let (matte_height, matte_width) = (pha_shape[2], pha_shape[3]);
        let matte_flat: Vec<f32> = pha.iter().copied().collect();

        let fgr_shape = fgr.shape();
        let (color_height, color_width) = (fgr_shape[2], fgr_shape[3]);
        let color_flat: Vec<f32> = fgr.iter().copied().collect();

        let alpha_pixels = Preprocessor::matte_to_pixels(
            &matte_flat,
            matte_width as u32,
            matte_height as u32,
            frame.width,
            frame.height,
        )?;
        let color_pixels = Preprocessor::color_to_pixels(
            &color_flat,
            color_width as u32,
            color_height as u32,
            frame.width,
            frame.height,
        )?;

        Ok(ProcessOutput {
            color: self.device.upload(color_pixels)?,
            alpha: self.device.upload(alpha_pixels)?,
        })
    }
}

impl Provider for OnnxMattingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OnnxMatting
    }

    fn resize(&mut self, width: u32, height: u32) {
        if (self.frame_width, self.frame_height) == (width, height) {
            return;
        }
        self.frame_width = width;
        self.frame_height = height;
        // Temporal context from the old geometry would bleed into the new
        // one, so start fresh.
        self.reset_hidden_states();
    }

    fn process(&mut self, input: &GsTextureRef) -> Result<ProcessOutput, ProcessError> {
        let frame_size = (input.width(), input.height());
        if frame_size.0 == 0 || frame_size.1 == 0 {
            return Err(ProcessError::EmptyInput {
                width: frame_size.0,
                height: frame_size.1,
            });
        }
        self.infer(input).map_err(ProcessError::from)
    }

    fn configure(&mut self, settings: &FilterSettings) -> Result<()> {
        if settings.matting.mode != self.mode {
            tracing::debug!(mode = ?settings.matting.mode, "switching inference mode");
            self.mode = settings.matting.mode;
            self.reset_hidden_states();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_fails_without_model_file() {
        let backend = OnnxMattingBackend::new("/nonexistent/rvm.onnx");
        let err = backend.probe().unwrap_err();
        assert!(matches!(err, ProviderInitError::Unavailable { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn performance_mode_halves_the_inference_size() {
        assert_eq!(inference_size(MattingMode::Quality), (512, 512));
        assert_eq!(inference_size(MattingMode::Performance), (256, 256));
    }

    #[test]
    fn properties_expose_the_mode_select() {
        let backend = OnnxMattingBackend::new("rvm.onnx");
        let group = backend.describe_properties();
        assert_eq!(group.id, "matting");
        let PropertyKind::Group { children } = group.kind else {
            panic!("matting properties must be a group");
        };
        assert!(matches!(
            children[0].kind,
            PropertyKind::Select { .. }
        ));
    }
}
