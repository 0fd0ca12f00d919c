//! The background-removal filter stage.
//!
//! The host drives one [`VirtualGreenscreen`] per stream: `update` when
//! settings change, `video_tick` once per simulation tick, `video_render`
//! once per output frame. Rendering never blocks on provider work; whenever
//! the provider is missing, busy or failing, the frame degrades to drawing
//! the un-filtered source.

mod switch;

use std::sync::Arc;

use crate::error::GsError;
use crate::gs::frame_buffer::{CachedFrame, FrameBuffer};
use crate::gs::{
    DrawPass, EffectParam, GsDevice, GsEffect, TextureFormat, ALPHA_THRESHOLD_EFFECT,
    PARAM_INPUT_A, PARAM_INPUT_B, PARAM_THRESHOLD, PARAM_THRESHOLD_RANGE,
    TECHNIQUE_DRAW_ALPHA_THRESHOLD,
};
use crate::properties::PropertyList;
use crate::provider::registry::ProviderRegistry;
use crate::provider::ProviderKind;
use crate::settings::FilterSettings;

use self::switch::{ProviderCell, SwitchWorker};

/// Matte level at which a pixel becomes fully opaque.
const ALPHA_THRESHOLD: f32 = 0.666_667;
/// Width of the transparency ramp below the threshold.
const ALPHA_THRESHOLD_RANGE: f32 = 0.333_333;

/// What a render call actually drew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Provider output was composited over the target.
    Composited,
    /// The un-filtered source was drawn instead.
    PassThrough(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No configured provider right now (loading, unloaded, or failed).
    NotReady,
    /// A transition holds the instance guard this frame.
    Contended,
    /// The tracked frame size is zero in at least one dimension.
    ZeroSize,
    /// The composite effect failed to load at construction.
    EffectMissing,
    CaptureFailed,
    ProcessFailed,
    EffectFailed,
}

pub struct VirtualGreenscreen {
    // Declaration order doubles as teardown order: the worker must join
    // before the cell tears the provider down.
    switch_worker: SwitchWorker,
    cell: Arc<ProviderCell>,
    registry: Arc<ProviderRegistry>,
    device: Arc<dyn GsDevice>,
    effect: Option<Arc<dyn GsEffect>>,
    frame_buffer: FrameBuffer,
    cache: Option<CachedFrame>,
    dirty: bool,
    size: (u32, u32),
    settings: FilterSettings,
    target_kind: ProviderKind,
}

impl VirtualGreenscreen {
    /// Build one filter instance and start switching to the provider the
    /// settings ask for. Failed buffer allocation surfaces here; a missing
    /// composite effect is logged and leaves the instance rendering
    /// pass-through. Provider loading happens asynchronously afterwards.
    pub fn new(registry: Arc<ProviderRegistry>, settings: FilterSettings) -> Result<Self, GsError> {
        tracing::debug!("Initializing virtual greenscreen instance");

        let device = Arc::clone(registry.device());
        let effect = match device.load_effect(ALPHA_THRESHOLD_EFFECT) {
            Ok(effect) => Some(effect),
            Err(err) => {
                tracing::error!("Failed to load '{}': {}", ALPHA_THRESHOLD_EFFECT, err);
                None
            }
        };
        let frame_buffer = FrameBuffer::new(&device, TextureFormat::Rgba8)?;
        let cell = Arc::new(ProviderCell::new());
        let switch_worker = SwitchWorker::spawn(Arc::clone(&registry), Arc::clone(&cell));

        let mut filter = Self {
            switch_worker,
            cell,
            registry,
            device,
            effect,
            frame_buffer,
            cache: None,
            dirty: true,
            size: (1, 1),
            settings: FilterSettings::default(),
            target_kind: ProviderKind::Invalid,
        };
        filter.update(settings);
        Ok(filter)
    }

    /// Apply a new settings snapshot.
    ///
    /// A provider change queues an asynchronous switch and immediately
    /// revokes readiness. With a live provider, other changes are pushed
    /// into it in place; while a switch is still in flight they are requeued
    /// so the provider that lands is configured with the latest snapshot.
    pub fn update(&mut self, settings: FilterSettings) {
        self.settings = settings;
        let resolved = self.registry.resolve(self.settings.provider);
        if resolved != self.target_kind {
            tracing::debug!(
                "Provider change requested: {} -> {}",
                self.target_kind,
                resolved
            );
            self.target_kind = resolved;
            self.switch_worker
                .request(resolved, self.settings.clone());
        } else if self.cell.is_ready() {
            // Settings callbacks may block on the guard; only the render
            // path is deadline-bound.
            let mut slot = self.cell.lock();
            if let Some(provider) = slot.provider.as_mut() {
                if let Err(err) = provider.configure(&self.settings) {
                    tracing::error!(
                        "Failed to apply settings to {}: {:#}",
                        self.target_kind,
                        err
                    );
                }
            }
        } else {
            // Same target but no readiness: a switch to it is still in
            // flight, or its last load failed. Requeue with the fresh
            // snapshot so the transition that lands was configured with the
            // latest settings, not the ones captured when it started.
            self.switch_worker
                .request(resolved, self.settings.clone());
        }
    }

    /// Once per simulation tick: track the source size and mark the cached
    /// frame stale.
    pub fn video_tick(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        if self.cell.is_ready() {
            if let Some(mut slot) = self.cell.try_lock() {
                if let Some(provider) = slot.provider.as_mut() {
                    provider.resize(width.max(1), height.max(1));
                }
            }
        }
        self.dirty = true;
    }

    /// Once per output frame. `source` draws the upstream frame into
    /// whatever pass it is given; `output` is the host's target for this
    /// filter. Every failure path degrades to pass-through.
    pub fn video_render(
        &mut self,
        source: &mut dyn FnMut(&mut dyn DrawPass) -> Result<(), GsError>,
        output: &mut dyn DrawPass,
    ) -> RenderOutcome {
        let _span = tracing::debug_span!("video_render").entered();

        let (width, height) = self.size;
        if width == 0 || height == 0 {
            return pass_through(source, output, SkipReason::ZeroSize);
        }
        let Some(effect) = self.effect.as_ref() else {
            return pass_through(source, output, SkipReason::EffectMissing);
        };
        if !self.cell.is_ready() {
            return pass_through(source, output, SkipReason::NotReady);
        }

        if self.dirty {
            let Some(mut slot) = self.cell.try_lock() else {
                return pass_through(source, output, SkipReason::Contended);
            };
            let Some(provider) = slot.provider.as_mut() else {
                return pass_through(source, output, SkipReason::NotReady);
            };

            let captured = match self.frame_buffer.capture(&self.device, width, height, source) {
                Ok(texture) => texture,
                Err(err) => {
                    tracing::warn!("Frame capture failed: {}", err);
                    return pass_through(source, output, SkipReason::CaptureFailed);
                }
            };
            match provider.process(&captured) {
                Ok(processed) => {
                    self.cache = Some(processed.into());
                    self.dirty = false;
                }
                Err(err) => {
                    tracing::warn!("Provider {} skipped a frame: {:#}", provider.kind(), err);
                    return pass_through(source, output, SkipReason::ProcessFailed);
                }
            }
        }

        let Some(cache) = self.cache.as_ref() else {
            return pass_through(source, output, SkipReason::NotReady);
        };
        let drawn = output.draw_effect(
            effect.as_ref(),
            TECHNIQUE_DRAW_ALPHA_THRESHOLD,
            &[
                (PARAM_INPUT_A, EffectParam::Texture(cache.color.clone())),
                (PARAM_INPUT_B, EffectParam::Texture(cache.alpha.clone())),
                (PARAM_THRESHOLD, EffectParam::Float(ALPHA_THRESHOLD)),
                (
                    PARAM_THRESHOLD_RANGE,
                    EffectParam::Float(ALPHA_THRESHOLD_RANGE),
                ),
            ],
        );
        if let Err(err) = drawn {
            tracing::error!("Composite failed: {}", err);
            return pass_through(source, output, SkipReason::EffectFailed);
        }
        RenderOutcome::Composited
    }

    /// Provider selector plus the selected backend's settings group. This
    /// follows the UI selection, so the incoming provider's group shows
    /// while a switch is still pending.
    pub fn describe_properties(&self) -> PropertyList {
        let mut list = PropertyList::new();
        list.push(PropertyList::provider_selector(&self.registry.available()));
        if let Some(group) = self.registry.backend_properties(self.target_kind) {
            list.push(group);
        }
        list
    }

    /// Tracked frame width, clamped for allocation like the original size.
    pub fn width(&self) -> u32 {
        self.size.0.max(1)
    }

    pub fn height(&self) -> u32 {
        self.size.1.max(1)
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// The provider this instance is on (or moving to).
    pub fn active_provider(&self) -> ProviderKind {
        self.target_kind
    }

    /// True when a configured provider is resident and accepting frames.
    pub fn is_ready(&self) -> bool {
        self.cell.is_ready()
    }
}

impl Drop for VirtualGreenscreen {
    // Field order does the actual teardown: the worker joins (discarding
    // queued switches) before the cell drops the provider.
    fn drop(&mut self) {
        tracing::debug!("Finalizing virtual greenscreen instance");
    }
}

fn pass_through(
    source: &mut dyn FnMut(&mut dyn DrawPass) -> Result<(), GsError>,
    output: &mut dyn DrawPass,
    reason: SkipReason,
) -> RenderOutcome {
    if let Err(err) = source(output) {
        tracing::debug!("Pass-through draw failed: {}", err);
    }
    RenderOutcome::PassThrough(reason)
}
