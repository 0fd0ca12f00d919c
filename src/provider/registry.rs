//! Backend registry.
//!
//! Candidates are probed exactly once, at construction; backends that fail
//! never appear in the UI or the `Automatic` resolution. Registration order
//! doubles as the `Automatic` priority order.

use std::sync::Arc;

use crate::error::{ProviderInitError, ProviderLoadError};
use crate::gs::GsDevice;
use crate::properties::Property;
use crate::provider::{Provider, ProviderBackend, ProviderKind};

pub struct ProviderRegistry {
    device: Arc<dyn GsDevice>,
    backends: Vec<Arc<dyn ProviderBackend>>,
    unavailable: Vec<ProviderKind>,
}

impl ProviderRegistry {
    /// Probe every candidate and keep the ones that pass.
    ///
    /// Fails with [`ProviderInitError::NoneAvailable`] when nothing probes
    /// OK; callers are expected to withhold the filter entirely in that
    /// case rather than register a filter that can never become ready.
    pub fn new(
        device: Arc<dyn GsDevice>,
        candidates: Vec<Arc<dyn ProviderBackend>>,
    ) -> Result<Self, ProviderInitError> {
        let mut backends = Vec::new();
        let mut unavailable = Vec::new();
        for backend in candidates {
            match backend.probe() {
                Ok(()) => {
                    tracing::info!("Provider {} is available", backend.kind());
                    backends.push(backend);
                }
                Err(err) => {
                    tracing::warn!("Provider {} is unavailable: {}", backend.kind(), err);
                    unavailable.push(backend.kind());
                }
            }
        }
        if backends.is_empty() {
            return Err(ProviderInitError::NoneAvailable);
        }
        Ok(Self {
            device,
            backends,
            unavailable,
        })
    }

    pub fn device(&self) -> &Arc<dyn GsDevice> {
        &self.device
    }

    pub fn available(&self) -> Vec<ProviderKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    pub fn is_available(&self, kind: ProviderKind) -> bool {
        self.backends.iter().any(|b| b.kind() == kind)
    }

    /// Resolve `Automatic` to the highest-priority available backend, or
    /// leave it as `Automatic` when nothing can serve it. Concrete kinds
    /// pass through unchanged even when unavailable; the subsequent load
    /// reports that properly.
    pub fn resolve(&self, requested: ProviderKind) -> ProviderKind {
        match requested {
            ProviderKind::Automatic => self
                .backends
                .first()
                .map(|b| b.kind())
                .unwrap_or(ProviderKind::Automatic),
            other => other,
        }
    }

    pub fn load(&self, kind: ProviderKind) -> Result<Box<dyn Provider>, ProviderLoadError> {
        match self.backends.iter().find(|b| b.kind() == kind) {
            Some(backend) => backend.load(&self.device),
            None if self.unavailable.contains(&kind) => {
                Err(ProviderLoadError::NotAvailable(kind))
            }
            None => Err(ProviderLoadError::Unknown(kind)),
        }
    }

    /// Property group of one available backend, or `None` for kinds that
    /// are unavailable or not concrete.
    pub fn backend_properties(&self, kind: ProviderKind) -> Option<Property> {
        self.backends
            .iter()
            .find(|b| b.kind() == kind)
            .map(|b| b.describe_properties())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gs::software::SoftwareDevice;
    use crate::provider::testing::{EventLog, MockBackend};

    fn device() -> Arc<dyn GsDevice> {
        Arc::new(SoftwareDevice::new())
    }

    #[test]
    fn probe_filters_unavailable_backends() {
        let log = EventLog::new();
        let registry = ProviderRegistry::new(
            device(),
            vec![
                Arc::new(MockBackend::new(ProviderKind::OnnxMatting, log.clone()).unavailable()),
                Arc::new(MockBackend::new(ProviderKind::ChromaKey, log.clone())),
            ],
        )
        .unwrap();

        assert_eq!(registry.available(), vec![ProviderKind::ChromaKey]);
        assert!(!registry.is_available(ProviderKind::OnnxMatting));
        assert!(matches!(
            registry.load(ProviderKind::OnnxMatting),
            Err(ProviderLoadError::NotAvailable(ProviderKind::OnnxMatting))
        ));
        assert!(matches!(
            registry.load(ProviderKind::Invalid),
            Err(ProviderLoadError::Unknown(ProviderKind::Invalid))
        ));
    }

    #[test]
    fn no_available_backend_is_a_construction_error() {
        let log = EventLog::new();
        let Err(err) = ProviderRegistry::new(
            device(),
            vec![Arc::new(
                MockBackend::new(ProviderKind::ChromaKey, log.clone()).unavailable(),
            )],
        ) else {
            panic!("construction must fail with no usable backend");
        };
        assert!(matches!(err, ProviderInitError::NoneAvailable));
    }

    #[test]
    fn automatic_resolves_in_registration_order() {
        let log = EventLog::new();
        let registry = ProviderRegistry::new(
            device(),
            vec![
                Arc::new(MockBackend::new(ProviderKind::OnnxMatting, log.clone())),
                Arc::new(MockBackend::new(ProviderKind::ChromaKey, log.clone())),
            ],
        )
        .unwrap();
        assert_eq!(
            registry.resolve(ProviderKind::Automatic),
            ProviderKind::OnnxMatting
        );

        let fallback = ProviderRegistry::new(
            device(),
            vec![
                Arc::new(MockBackend::new(ProviderKind::OnnxMatting, log.clone()).unavailable()),
                Arc::new(MockBackend::new(ProviderKind::ChromaKey, log.clone())),
            ],
        )
        .unwrap();
        assert_eq!(
            fallback.resolve(ProviderKind::Automatic),
            ProviderKind::ChromaKey
        );
    }

    #[test]
    fn concrete_kinds_pass_through_resolution() {
        let log = EventLog::new();
        let registry = ProviderRegistry::new(
            device(),
            vec![Arc::new(MockBackend::new(ProviderKind::ChromaKey, log.clone()))],
        )
        .unwrap();
        assert_eq!(
            registry.resolve(ProviderKind::OnnxMatting),
            ProviderKind::OnnxMatting
        );
        assert_eq!(registry.resolve(ProviderKind::Invalid), ProviderKind::Invalid);
    }

    #[test]
    fn load_builds_a_provider_of_the_requested_kind() {
        let log = EventLog::new();
        let registry = ProviderRegistry::new(
            device(),
            vec![Arc::new(MockBackend::new(ProviderKind::ChromaKey, log.clone()))],
        )
        .unwrap();
        let provider = registry.load(ProviderKind::ChromaKey).unwrap();
        assert_eq!(provider.kind(), ProviderKind::ChromaKey);
        assert_eq!(log.events(), vec!["load Chroma Key"]);
    }

    #[test]
    fn backend_properties_cover_available_kinds_only() {
        let log = EventLog::new();
        let registry = ProviderRegistry::new(
            device(),
            vec![
                Arc::new(MockBackend::new(ProviderKind::OnnxMatting, log.clone()).unavailable()),
                Arc::new(MockBackend::new(ProviderKind::ChromaKey, log.clone())),
            ],
        )
        .unwrap();
        assert!(registry.backend_properties(ProviderKind::ChromaKey).is_some());
        assert!(registry.backend_properties(ProviderKind::OnnxMatting).is_none());
        assert!(registry.backend_properties(ProviderKind::Automatic).is_none());
    }
}
