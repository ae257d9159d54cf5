//! The fallback executor — turns one chosen backend into a resilient
//! multi-attempt call.
//!
//! Execution is a small state machine:
//!
//! ```text
//! Pending(requested) ──call ok──────────────▶ Success
//!        │
//!        ├─unavailable / call failed─▶ Pending(next in canonical order
//!        │                             not yet attempted)
//!        └─no candidates left─────────▶ Exhausted
//! ```
//!
//! Attempts are strictly sequential — never concurrent — so cost is
//! bounded and the attempt trace is deterministic. No backend appears
//! twice in one execution: the requested backend is tried exactly once
//! first, then the canonical ordering minus anything already attempted.
//! Exhaustion is a structured result carrying the full trace, never an
//! error the caller has to catch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::BackendId;
use crate::registry::BackendRegistry;
use crate::types::{CompletionRequest, CompletionResponse};

/// Outcome of one attempt within an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptStatus {
    /// The backend had no credentials configured; it was not called.
    Unavailable,
    /// The call failed (network, timeout, bad status, empty content).
    Error {
        /// Human-readable failure detail.
        detail: String,
    },
    /// The call succeeded.
    Success,
}

/// One entry in the attempt trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Which backend was attempted.
    pub backend: BackendId,
    /// What happened.
    #[serde(flatten)]
    pub status: AttemptStatus,
}

/// Terminal state of an execution.
#[derive(Debug)]
pub enum ExecutionResult {
    /// Some backend produced a completion.
    Completed(CompletionResponse),
    /// Every candidate failed or was unavailable.
    Exhausted,
}

/// Result of [`FallbackExecutor::execute`].
#[derive(Debug)]
pub struct FallbackOutcome {
    /// Terminal state, with the completion on success.
    pub result: ExecutionResult,
    /// The backend that produced the completion, if any.
    pub model_used: Option<BackendId>,
    /// The backend originally requested.
    pub original_model: BackendId,
    /// Whether the completion came from a backend other than the
    /// requested one.
    pub used_fallback: bool,
    /// Ordered record of every backend tried, with per-attempt outcome.
    pub attempts: Vec<AttemptRecord>,
}

impl FallbackOutcome {
    /// Whether execution ended in `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.result, ExecutionResult::Completed(_))
    }

    /// The completion, if execution succeeded.
    #[must_use]
    pub fn response(&self) -> Option<&CompletionResponse> {
        match &self.result {
            ExecutionResult::Completed(response) => Some(response),
            ExecutionResult::Exhausted => None,
        }
    }
}

/// Executes completion calls against a registry with fallback.
pub struct FallbackExecutor {
    registry: Arc<BackendRegistry>,
}

impl FallbackExecutor {
    /// Create an executor over `registry`.
    #[must_use]
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    /// Run the state machine starting at `requested`.
    ///
    /// The requested backend may sit outside the canonical ordering; it
    /// is still tried exactly once, first. Candidates already present in
    /// the attempt trace are never re-selected.
    pub async fn execute(
        &self,
        requested: &BackendId,
        request: &CompletionRequest,
    ) -> FallbackOutcome {
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        let mut pending = Some(requested.clone());
        while let Some(candidate) = pending.take() {
            match self.attempt(&candidate, request).await {
                Ok(response) => {
                    info!(
                        backend = %candidate,
                        fallback = candidate != *requested,
                        attempts = attempts.len() + 1,
                        "completion succeeded"
                    );
                    attempts.push(AttemptRecord {
                        backend: candidate.clone(),
                        status: AttemptStatus::Success,
                    });
                    let used_fallback = candidate != *requested;
                    return FallbackOutcome {
                        result: ExecutionResult::Completed(response),
                        model_used: Some(candidate),
                        original_model: requested.clone(),
                        used_fallback,
                        attempts,
                    };
                }
                Err(status) => {
                    attempts.push(AttemptRecord {
                        backend: candidate,
                        status,
                    });
                }
            }
            pending = self.next_candidate(&attempts);
        }

        warn!(
            requested = %requested,
            attempts = attempts.len(),
            "all backends exhausted"
        );
        FallbackOutcome {
            result: ExecutionResult::Exhausted,
            model_used: None,
            original_model: requested.clone(),
            used_fallback: true,
            attempts,
        }
    }

    /// One attempt: skip unavailable backends without calling them.
    async fn attempt(
        &self,
        candidate: &BackendId,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, AttemptStatus> {
        let Some(backend) = self.registry.get(candidate) else {
            debug!(backend = %candidate, "candidate not registered, skipping");
            return Err(AttemptStatus::Unavailable);
        };
        if !backend.is_available() {
            debug!(backend = %candidate, "candidate unavailable, skipping");
            return Err(AttemptStatus::Unavailable);
        }

        backend.complete(request).await.map_err(|e| {
            warn!(backend = %candidate, error = %e, "attempt failed, advancing");
            AttemptStatus::Error {
                detail: e.to_string(),
            }
        })
    }

    /// First backend in the canonical ordering not yet in the trace.
    fn next_candidate(&self, attempts: &[AttemptRecord]) -> Option<BackendId> {
        self.registry
            .fallback_order()
            .iter()
            .find(|id| attempts.iter().all(|a| a.backend != **id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::backend::Backend;
    use crate::error::BackendError;

    /// A scripted backend with a fixed success/failure behavior.
    struct ScriptedBackend {
        id: BackendId,
        available: bool,
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn ok(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: BackendId::new(id),
                available: true,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: BackendId::new(id),
                available: true,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn unavailable(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: BackendId::new(id),
                available: false,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        fn id(&self) -> &BackendId {
            &self.id
        }

        fn model(&self) -> &str {
            self.id.as_str()
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BackendError::RequestFailed("scripted failure".into()))
            } else {
                Ok(CompletionResponse {
                    text: format!("reply from {}", self.id),
                    model: self.id.to_string(),
                    tokens: None,
                    latency_ms: 1,
                })
            }
        }
    }

    fn registry(backends: Vec<Arc<ScriptedBackend>>) -> Arc<BackendRegistry> {
        let order: Vec<BackendId> = backends.iter().map(|b| b.id.clone()).collect();
        let default = order[0].clone();
        let dyns: Vec<Arc<dyn Backend>> = backends
            .into_iter()
            .map(|b| b as Arc<dyn Backend>)
            .collect();
        Arc::new(BackendRegistry::new(dyns, order, default))
    }

    #[tokio::test]
    async fn deterministic_fallback_trace() {
        let a = ScriptedBackend::failing("a");
        let b = ScriptedBackend::failing("b");
        let c = ScriptedBackend::ok("c");
        let executor = FallbackExecutor::new(registry(vec![a.clone(), b.clone(), c.clone()]));

        let outcome = executor
            .execute(&BackendId::new("a"), &CompletionRequest::new("hi"))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.model_used, Some(BackendId::new("c")));
        assert!(outcome.used_fallback);
        let trace: Vec<(&str, bool)> = outcome
            .attempts
            .iter()
            .map(|a| (a.backend.as_str(), matches!(a.status, AttemptStatus::Success)))
            .collect();
        assert_eq!(trace, vec![("a", false), ("b", false), ("c", true)]);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1, "a tried exactly once");
        assert_eq!(b.calls.load(Ordering::SeqCst), 1, "b tried exactly once");
    }

    #[tokio::test]
    async fn exhaustion_is_structured_not_a_panic() {
        let a = ScriptedBackend::failing("a");
        let b = ScriptedBackend::failing("b");
        let c = ScriptedBackend::failing("c");
        let executor = FallbackExecutor::new(registry(vec![a, b, c]));

        let outcome = executor
            .execute(&BackendId::new("a"), &CompletionRequest::new("hi"))
            .await;

        assert!(!outcome.is_success());
        assert!(matches!(outcome.result, ExecutionResult::Exhausted));
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.model_used.is_none());
    }

    #[tokio::test]
    async fn unavailable_backend_is_recorded_without_a_call() {
        let a = ScriptedBackend::unavailable("a");
        let b = ScriptedBackend::ok("b");
        let executor = FallbackExecutor::new(registry(vec![a.clone(), b]));

        let outcome = executor
            .execute(&BackendId::new("a"), &CompletionRequest::new("hi"))
            .await;

        assert!(outcome.is_success());
        assert!(matches!(
            outcome.attempts[0].status,
            AttemptStatus::Unavailable
        ));
        assert_eq!(a.calls.load(Ordering::SeqCst), 0, "never actually called");
    }

    #[tokio::test]
    async fn requested_outside_canonical_order_is_tried_once_first() {
        let extra = ScriptedBackend::failing("extra");
        let a = ScriptedBackend::ok("a");
        // Canonical order only contains "a"; "extra" is registered but
        // not part of the ordering.
        let order = vec![BackendId::new("a")];
        let default = BackendId::new("a");
        let dyns: Vec<Arc<dyn Backend>> = vec![extra.clone(), a.clone()];
        let registry = Arc::new(BackendRegistry::new(dyns, order, default));
        let executor = FallbackExecutor::new(registry);

        let outcome = executor
            .execute(&BackendId::new("extra"), &CompletionRequest::new("hi"))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts[0].backend.as_str(), "extra");
        assert_eq!(outcome.attempts[1].backend.as_str(), "a");
        assert_eq!(extra.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_fallback_flag_when_requested_succeeds() {
        let a = ScriptedBackend::ok("a");
        let b = ScriptedBackend::ok("b");
        let executor = FallbackExecutor::new(registry(vec![a, b]));

        let outcome = executor
            .execute(&BackendId::new("a"), &CompletionRequest::new("hi"))
            .await;

        assert!(outcome.is_success());
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.attempts.len(), 1);
    }
}
