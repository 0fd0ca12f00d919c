//! Mock backend for exercising the registry, switch worker and render path
//! without real models. Behavior (availability, load failures, process
//! failures, load latency) is adjustable from the test while instances are
//! live, and every lifecycle event lands in a shared log.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;

use crate::error::{ProcessError, ProviderInitError, ProviderLoadError};
use crate::gs::{GsDevice, GsTexture, GsTextureRef, Pixels, TextureFormat};
use crate::properties::{Property, PropertyKind};
use crate::provider::{ProcessOutput, Provider, ProviderBackend, ProviderKind};
use crate::settings::FilterSettings;

/// Chronological record of backend activity, shared across clones.
#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

pub(crate) struct MockBackend {
    kind: ProviderKind,
    log: EventLog,
    available: bool,
    fail_load: AtomicBool,
    fail_configure: Arc<AtomicBool>,
    fail_process: Arc<AtomicBool>,
    load_delay: Mutex<Duration>,
    loads: AtomicUsize,
    configured: Arc<Mutex<Vec<f32>>>,
    matte_value: u8,
}

impl MockBackend {
    pub fn new(kind: ProviderKind, log: EventLog) -> Self {
        Self {
            kind,
            log,
            available: true,
            fail_load: AtomicBool::new(false),
            fail_configure: Arc::new(AtomicBool::new(false)),
            fail_process: Arc::new(AtomicBool::new(false)),
            load_delay: Mutex::new(Duration::ZERO),
            loads: AtomicUsize::new(0),
            configured: Arc::new(Mutex::new(Vec::new())),
            matte_value: 255,
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_matte(mut self, value: u8) -> Self {
        self.matte_value = value;
        self
    }

    pub fn set_load_failing(&self, failing: bool) {
        self.fail_load.store(failing, Ordering::SeqCst);
    }

    pub fn set_configure_failing(&self, failing: bool) {
        self.fail_configure.store(failing, Ordering::SeqCst);
    }

    pub fn set_process_failing(&self, failing: bool) {
        self.fail_process.store(failing, Ordering::SeqCst);
    }

    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock() = delay;
    }

    /// Completed (successful) loads so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Chroma similarity carried by the most recent successful configure,
    /// across every instance this backend produced.
    pub fn last_similarity(&self) -> Option<f32> {
        self.configured.lock().last().copied()
    }
}

impl ProviderBackend for MockBackend {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn probe(&self) -> Result<(), ProviderInitError> {
        if self.available {
            Ok(())
        } else {
            Err(ProviderInitError::Unavailable {
                kind: self.kind,
                reason: "mock backend disabled".to_string(),
            })
        }
    }

    fn load(&self, device: &Arc<dyn GsDevice>) -> Result<Box<dyn Provider>, ProviderLoadError> {
        self.log.record(format!("load {}", self.kind));
        let delay = *self.load_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(ProviderLoadError::Backend {
                kind: self.kind,
                source: anyhow::anyhow!("mock load failure"),
            });
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockProvider {
            kind: self.kind,
            device: Arc::clone(device),
            log: self.log.clone(),
            fail_configure: Arc::clone(&self.fail_configure),
            fail_process: Arc::clone(&self.fail_process),
            configured: Arc::clone(&self.configured),
            matte_value: self.matte_value,
        }))
    }

    fn describe_properties(&self) -> Property {
        Property {
            id: "mock",
            label: "Mock",
            kind: PropertyKind::Group { children: vec![] },
        }
    }
}

pub(crate) struct MockProvider {
    kind: ProviderKind,
    device: Arc<dyn GsDevice>,
    log: EventLog,
    fail_configure: Arc<AtomicBool>,
    fail_process: Arc<AtomicBool>,
    configured: Arc<Mutex<Vec<f32>>>,
    matte_value: u8,
}

impl Provider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.log.record(format!("resize {} {width}x{height}", self.kind));
    }

    fn process(&mut self, input: &GsTextureRef) -> Result<ProcessOutput, ProcessError> {
        if self.fail_process.load(Ordering::SeqCst) {
            self.log.record(format!("process {} failed", self.kind));
            return Err(ProcessError::Backend(anyhow::anyhow!(
                "mock process failure"
            )));
        }
        let (width, height) = (input.width(), input.height());
        if width == 0 || height == 0 {
            return Err(ProcessError::EmptyInput { width, height });
        }
        self.log.record(format!("process {}", self.kind));
        let matte = vec![self.matte_value; (width * height) as usize];
        let alpha = self
            .device
            .upload(Pixels::new(width, height, TextureFormat::R8, matte).map_err(to_process)?)
            .map_err(to_process)?;
        Ok(ProcessOutput {
            color: Arc::clone(input),
            alpha,
        })
    }

    fn configure(&mut self, settings: &FilterSettings) -> Result<()> {
        if self.fail_configure.load(Ordering::SeqCst) {
            self.log.record(format!("configure {} failed", self.kind));
            return Err(anyhow::anyhow!("mock configure failure"));
        }
        self.log.record(format!("configure {}", self.kind));
        self.configured.lock().push(settings.chroma.similarity);
        Ok(())
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.log.record(format!("unload {}", self.kind));
    }
}

fn to_process(err: crate::error::GsError) -> ProcessError {
    ProcessError::Backend(anyhow::Error::new(err))
}
