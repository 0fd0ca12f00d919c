//! Real-time background removal as a host-driven filter stage.
//!
//! The host owns the render loop and the graphics device; this crate owns
//! everything between the captured frame and the composited output:
//!
//! - [`filter::VirtualGreenscreen`] is one filter instance, driven through
//!   `update` / `video_tick` / `video_render`.
//! - [`provider`] holds the swappable matting backends (chroma key on the
//!   CPU, RobustVideoMatting through ONNX Runtime) and the registry that
//!   probes and loads them.
//! - [`gs`] is the graphics boundary the host implements, with a complete
//!   software fallback.
//!
//! Provider loading is slow and happens on a dedicated worker thread; the
//! render path never waits for it and falls back to drawing the raw source
//! until a provider is ready.

pub mod error;
pub mod filter;
pub mod gs;
pub mod host;
pub mod properties;
pub mod provider;
pub mod settings;

pub use filter::{RenderOutcome, SkipReason, VirtualGreenscreen};
pub use provider::registry::ProviderRegistry;
pub use provider::ProviderKind;
pub use settings::FilterSettings;
