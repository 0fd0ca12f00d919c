//! Error taxonomy for the filter stage.
//!
//! Provider and graphics failures are caught at the nearest orchestration
//! boundary (switch worker, render tick) and turned into a logged message
//! plus a safe fallback state; none of these escalate to the host as a
//! panic.

use thiserror::Error;

use crate::provider::ProviderKind;

/// Backend availability failures, recorded once at registry construction.
#[derive(Debug, Error)]
pub enum ProviderInitError {
    /// The backend probed at startup and reported it cannot run here.
    #[error("{kind} backend failed to initialize: {reason}")]
    Unavailable { kind: ProviderKind, reason: String },

    /// Every registered backend failed its probe; filter registration is
    /// withheld entirely.
    #[error("all virtual greenscreen providers failed to initialize")]
    NoneAvailable,
}

/// Switch-time load failures. These leave the instance not-ready but stable.
#[derive(Debug, Error)]
pub enum ProviderLoadError {
    #[error("provider {0} is not available on this system")]
    NotAvailable(ProviderKind),

    #[error("no backend registered for provider {0}")]
    Unknown(ProviderKind),

    #[error("provider {kind} failed to load")]
    Backend {
        kind: ProviderKind,
        #[source]
        source: anyhow::Error,
    },
}

/// Per-frame provider failures. The frame is skipped and the previous cached
/// output stays valid.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("input image is empty ({width}x{height})")]
    EmptyInput { width: u32, height: u32 },

    #[error("provider failed to process frame")]
    Backend(#[from] anyhow::Error),
}

/// Graphics-boundary failures, including the missing-resource cases that
/// degrade the composite to pass-through.
#[derive(Debug, Error)]
pub enum GsError {
    #[error("effect '{0}' could not be loaded")]
    EffectMissing(String),

    #[error("upstream source is unavailable")]
    SourceUnavailable,

    #[error("graphics backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_carries_kind() {
        let err = ProviderLoadError::NotAvailable(ProviderKind::OnnxMatting);
        assert!(err.to_string().contains("not available"));
    }

    #[test]
    fn backend_error_chains_source() {
        let err = ProviderLoadError::Backend {
            kind: ProviderKind::ChromaKey,
            source: anyhow::anyhow!("out of memory"),
        };
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "out of memory");
    }

    #[test]
    fn process_error_from_anyhow() {
        let err: ProcessError = anyhow::anyhow!("inference failed").into();
        assert!(matches!(err, ProcessError::Backend(_)));
    }
}
