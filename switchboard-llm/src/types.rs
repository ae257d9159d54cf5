//! Core types for completion requests and responses.

use serde::{Deserialize, Serialize};

/// A request to a text-generation backend.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// The user prompt (context already prepended by the router).
    pub prompt: String,
    /// Optional system prompt (persona, output-format instructions).
    pub system: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl CompletionRequest {
    /// Create a request with the default generation parameters.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: 1024,
            temperature: 0.7,
            timeout_ms: 30_000,
        }
    }

    /// Set the system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum number of generated tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A successful response from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated text. Never empty — providers map empty output to
    /// [`crate::BackendError::EmptyCompletion`].
    pub text: String,
    /// Which concrete model produced the text.
    pub model: String,
    /// Token accounting, when the provider reports it.
    pub tokens: Option<TokenUsage>,
    /// Wall-clock latency of the call in milliseconds.
    pub latency_ms: u64,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt: u32,
    /// Tokens generated in the completion.
    pub completion: u32,
    /// Total tokens billed.
    pub total: u32,
}
