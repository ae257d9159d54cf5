//! The [`Backend`] trait — the single seam between routing policy and
//! text-generation providers.
//!
//! Routing, fallback execution, and the semantic topic detector in the
//! conversation-memory layer all depend on this trait, never on a
//! concrete provider. That keeps the dependency graph acyclic and makes
//! every consumer testable with scripted fakes.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::types::{CompletionRequest, CompletionResponse};

/// Identifier of a backend in the registry ("gpt", "gemini", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    /// Create an id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BackendId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A text-generation provider exposed via a uniform completion interface.
///
/// Implementations are constructed once at startup from configuration and
/// are immutable thereafter. Availability is a configuration property —
/// a backend without credentials reports `is_available() == false` for
/// its whole lifetime and is never invoked.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Registry identifier of this backend.
    fn id(&self) -> &BackendId;

    /// Concrete model name requests are sent to (e.g. `"gpt-4-turbo"`).
    fn model(&self) -> &str;

    /// Whether this backend's credentials were present at startup.
    fn is_available(&self) -> bool;

    /// Perform one completion call.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] on network failure, timeout, non-success
    /// status, unparseable body, or empty generated content. Callers
    /// advance the fallback chain on any error; they never retry the
    /// same backend.
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, BackendError>;
}
