//! Asynchronous provider switching.
//!
//! Loading a backend can take seconds, so it never happens on the render
//! thread. A dedicated worker owns all transitions: it takes the instance
//! guard, drops the old provider, loads and configures the new one, and
//! only then marks the instance ready. Requests are coalesced, so a burst
//! of switches settles directly on the newest target instead of loading
//! every intermediate backend.
//!
//! The render and tick paths use [`ProviderCell::try_lock`]; while a
//! transition holds the guard they treat the provider as absent and render
//! falls back to pass-through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};

use crate::provider::registry::ProviderRegistry;
use crate::provider::{Provider, ProviderKind};
use crate::settings::FilterSettings;

/// The loaded provider and the kind it was loaded for (or last targeted).
pub(crate) struct ProviderSlot {
    pub kind: ProviderKind,
    pub provider: Option<Box<dyn Provider>>,
}

/// Shared instance state. The ready flag lives outside the slot mutex so
/// the update path can revoke readiness without waiting for an in-flight
/// transition that holds the guard. Every request opens a new epoch; a
/// transition may only publish readiness for the epoch it was requested
/// under, so a transition overtaken mid-load stays unpublished.
pub(crate) struct ProviderCell {
    slot: Mutex<ProviderSlot>,
    ready: AtomicBool,
    epoch: Mutex<u64>,
}

impl ProviderCell {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(ProviderSlot {
                kind: ProviderKind::Invalid,
                provider: None,
            }),
            ready: AtomicBool::new(false),
            epoch: Mutex::new(0),
        }
    }

    /// True only between a fully completed transition and the next request.
    /// Implies the slot holds a configured provider.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Open a new epoch and revoke readiness. Bumping and revoking happen
    /// under the epoch lock, so interleaving with [`Self::publish_ready`]
    /// cannot leave a stale transition marked ready.
    fn revoke(&self) -> u64 {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        self.ready.store(false, Ordering::Release);
        *epoch
    }

    /// Mark the instance ready, unless a newer request already revoked the
    /// epoch this transition was started under.
    fn publish_ready(&self, epoch: u64) -> bool {
        let current = self.epoch.lock();
        if *current == epoch {
            self.ready.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    fn clear_ready(&self) {
        self.ready.store(false, Ordering::Release);
    }

    /// Non-blocking guard for the render and tick paths. `None` means a
    /// transition is in flight and the caller should skip this frame.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, ProviderSlot>> {
        self.slot.try_lock()
    }

    /// Blocking guard, for the switch worker and the settings path. Never
    /// called from the render thread.
    pub fn lock(&self) -> MutexGuard<'_, ProviderSlot> {
        self.slot.lock()
    }
}

/// One switch request, carrying the settings snapshot taken when the user
/// made the change and the epoch it opened. The kind is already resolved;
/// `Automatic` never crosses this boundary.
struct SwitchRequest {
    kind: ProviderKind,
    settings: FilterSettings,
    epoch: u64,
}

/// Worker thread that owns every provider transition.
pub(crate) struct SwitchWorker {
    cell: Arc<ProviderCell>,
    tx: Option<Sender<SwitchRequest>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SwitchWorker {
    pub fn spawn(registry: Arc<ProviderRegistry>, cell: Arc<ProviderCell>) -> Self {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let worker_cell = Arc::clone(&cell);
        let handle = thread::spawn(move || run(registry, worker_cell, rx, stop_flag));
        Self {
            cell,
            tx: Some(tx),
            stop,
            handle: Some(handle),
        }
    }

    /// Queue a transition. Readiness is revoked here, before the request is
    /// even enqueued, so the render path stops compositing with the
    /// outgoing provider right away and a transition already in flight can
    /// no longer publish.
    pub fn request(&self, kind: ProviderKind, settings: FilterSettings) {
        let epoch = self.cell.revoke();
        if let Some(tx) = &self.tx {
            let request = SwitchRequest {
                kind,
                settings,
                epoch,
            };
            if tx.send(request).is_err() {
                tracing::warn!("Switch worker is gone; provider request dropped");
            }
        }
    }
}

/// Stopping discards queued requests, waits for the in-flight transition to
/// finish, and leaves the cell for the owner to tear down.
impl Drop for SwitchWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Closing the channel wakes the worker out of recv.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    registry: Arc<ProviderRegistry>,
    cell: Arc<ProviderCell>,
    rx: Receiver<SwitchRequest>,
    stop: Arc<AtomicBool>,
) {
    while let Ok(mut request) = rx.recv() {
        // Collapse any burst down to the newest target.
        while let Ok(newer) = rx.try_recv() {
            request = newer;
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }
        apply_switch(&registry, &cell, request);
    }
    tracing::debug!("Switch worker stopped");
}

/// One full transition, with the guard held throughout so the render path
/// never observes a half-switched instance.
fn apply_switch(registry: &ProviderRegistry, cell: &ProviderCell, request: SwitchRequest) {
    let _span = tracing::debug_span!("provider_switch").entered();

    let mut slot = cell.lock();
    cell.clear_ready();
    let previous = slot.kind;

    // Same target with a live provider: only the settings snapshot changed,
    // so push it into the instance instead of paying for a reload.
    if slot.kind == request.kind && slot.provider.is_some() {
        if let Some(provider) = slot.provider.as_mut() {
            if let Err(err) = provider.configure(&request.settings) {
                tracing::error!("Failed to configure provider {}: {:#}", request.kind, err);
                slot.provider = None;
                return;
            }
        }
        if cell.publish_ready(request.epoch) {
            tracing::debug!("Reconfigured provider {}", request.kind);
        }
        return;
    }

    // Unload first; two providers are never resident at once.
    slot.provider = None;
    slot.kind = request.kind;

    if !request.kind.is_concrete() {
        tracing::info!("Provider unloaded (was {})", previous);
        return;
    }

    let mut provider = match registry.load(request.kind) {
        Ok(provider) => provider,
        Err(err) => {
            let err = anyhow::Error::new(err);
            tracing::error!("Failed to load provider {}: {:#}", request.kind, err);
            return;
        }
    };
    if let Err(err) = provider.configure(&request.settings) {
        tracing::error!("Failed to configure provider {}: {:#}", request.kind, err);
        return;
    }

    slot.provider = Some(provider);
    if cell.publish_ready(request.epoch) {
        tracing::info!("Switched provider from {} to {}", previous, request.kind);
    } else {
        tracing::debug!(
            "Transition to {} was superseded before it finished",
            request.kind
        );
    }
}
