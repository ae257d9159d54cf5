//! The backend registry — id → implementation, plus the canonical
//! fallback ordering and the configured default.
//!
//! The registry is built once at startup and shared immutably by
//! reference. Unavailable backends (missing credentials) are kept in
//! the registry so that attempt traces can record them as skipped; they
//! are excluded from actual calls by the executor.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::backend::{Backend, BackendId};

/// Immutable registry of all constructed backends.
pub struct BackendRegistry {
    backends: HashMap<BackendId, Arc<dyn Backend>>,
    fallback_order: Vec<BackendId>,
    default_backend: BackendId,
}

impl BackendRegistry {
    /// Build a registry from constructed backends.
    ///
    /// `fallback_order` is the canonical priority ordering used by the
    /// executor; `default_backend` is what the classifier falls back to
    /// when no signal fires. Missing credentials are logged once here
    /// and are never fatal — the backend simply stays unavailable.
    #[must_use]
    pub fn new(
        backends: Vec<Arc<dyn Backend>>,
        fallback_order: Vec<BackendId>,
        default_backend: BackendId,
    ) -> Self {
        for backend in &backends {
            if !backend.is_available() {
                warn!(backend = %backend.id(), "backend has no credentials, marked unavailable");
            }
        }
        let backends = backends
            .into_iter()
            .map(|b| (b.id().clone(), b))
            .collect();
        Self {
            backends,
            fallback_order,
            default_backend,
        }
    }

    /// Look up a backend by id.
    #[must_use]
    pub fn get(&self, id: &BackendId) -> Option<&Arc<dyn Backend>> {
        self.backends.get(id)
    }

    /// Whether `id` names a registered backend.
    #[must_use]
    pub fn contains(&self, id: &BackendId) -> bool {
        self.backends.contains_key(id)
    }

    /// The canonical fallback ordering.
    #[must_use]
    pub fn fallback_order(&self) -> &[BackendId] {
        &self.fallback_order
    }

    /// The configured default backend.
    #[must_use]
    pub fn default_backend(&self) -> &BackendId {
        &self.default_backend
    }

    /// Ids of backends whose credentials are present.
    #[must_use]
    pub fn available_ids(&self) -> Vec<BackendId> {
        let mut ids: Vec<BackendId> = self
            .backends
            .values()
            .filter(|b| b.is_available())
            .map(|b| b.id().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered backends (available or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
