//! Segmentation/matting providers and the interface the filter drives them
//! through.
//!
//! A provider turns a captured frame into a color plane plus an alpha matte.
//! Backends are registered with [`registry::ProviderRegistry`] and loaded on
//! the switch worker; the render path only ever talks to an already-loaded
//! [`Provider`].

pub mod chroma;
pub mod matting;
pub mod preprocess;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, ProviderInitError, ProviderLoadError};
use crate::gs::frame_buffer::CachedFrame;
use crate::gs::{GsDevice, GsTextureRef};
use crate::properties::Property;
use crate::settings::FilterSettings;

/// Provider selection, persisted as an integer.
///
/// `Automatic` defers the choice to the registry's priority order. `Invalid`
/// is what unknown persisted values decode to; it never loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ProviderKind {
    Invalid,
    Automatic,
    ChromaKey,
    OnnxMatting,
}

impl ProviderKind {
    /// True for kinds that name an actual backend, as opposed to the
    /// `Automatic`/`Invalid` placeholders.
    pub fn is_concrete(self) -> bool {
        matches!(self, ProviderKind::ChromaKey | ProviderKind::OnnxMatting)
    }
}

impl From<i64> for ProviderKind {
    fn from(value: i64) -> Self {
        match value {
            0 => ProviderKind::Automatic,
            1 => ProviderKind::ChromaKey,
            2 => ProviderKind::OnnxMatting,
            _ => ProviderKind::Invalid,
        }
    }
}

impl From<ProviderKind> for i64 {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Invalid => -1,
            ProviderKind::Automatic => 0,
            ProviderKind::ChromaKey => 1,
            ProviderKind::OnnxMatting => 2,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Invalid => "N/A",
            ProviderKind::Automatic => "Automatic",
            ProviderKind::ChromaKey => "Chroma Key",
            ProviderKind::OnnxMatting => "ONNX Matting",
        };
        f.write_str(name)
    }
}

/// One processed frame: the color plane and its alpha matte, both resident
/// on the device.
pub struct ProcessOutput {
    pub color: GsTextureRef,
    pub alpha: GsTextureRef,
}

impl From<ProcessOutput> for CachedFrame {
    fn from(output: ProcessOutput) -> Self {
        CachedFrame {
            color: output.color,
            alpha: output.alpha,
        }
    }
}

/// A loaded matting backend.
///
/// Instances are built on the switch worker and dropped there too; dropping
/// releases whatever the backend holds. Everything else runs under the
/// instance guard, so implementations need `Send` but not `Sync`.
pub trait Provider: Send {
    fn kind(&self) -> ProviderKind;

    /// Target frame size changed. Default: no-op for size-agnostic backends.
    fn resize(&mut self, _width: u32, _height: u32) {}

    /// Process one captured frame into color + matte.
    ///
    /// A failure here skips the frame; the previous output stays cached.
    fn process(&mut self, input: &GsTextureRef) -> Result<ProcessOutput, ProcessError>;

    /// Apply a fresh settings snapshot.
    fn configure(&mut self, settings: &FilterSettings) -> Result<()>;
}

/// Factory side of a backend: probed once at startup, loaded per switch.
pub trait ProviderBackend: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// One-time availability check at registry construction. Backends that
    /// fail here are left out of the registry entirely.
    fn probe(&self) -> Result<(), ProviderInitError>;

    /// Build a fresh instance. Potentially slow; always runs off the render
    /// thread.
    fn load(&self, device: &Arc<dyn GsDevice>) -> Result<Box<dyn Provider>, ProviderLoadError>;

    /// The settings this backend exposes, as one property group.
    fn describe_properties(&self) -> Property;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_integers() {
        for kind in [
            ProviderKind::Invalid,
            ProviderKind::Automatic,
            ProviderKind::ChromaKey,
            ProviderKind::OnnxMatting,
        ] {
            assert_eq!(ProviderKind::from(i64::from(kind)), kind);
        }
        assert_eq!(ProviderKind::from(42), ProviderKind::Invalid);
    }

    #[test]
    fn only_backend_kinds_are_concrete() {
        assert!(!ProviderKind::Invalid.is_concrete());
        assert!(!ProviderKind::Automatic.is_concrete());
        assert!(ProviderKind::ChromaKey.is_concrete());
        assert!(ProviderKind::OnnxMatting.is_concrete());
    }

    #[test]
    fn invalid_kind_displays_as_placeholder() {
        assert_eq!(ProviderKind::Invalid.to_string(), "N/A");
        assert_eq!(ProviderKind::Automatic.to_string(), "Automatic");
    }
}
