//! # switchboard-llm — Backend Abstraction Layer for Switchboard
//!
//! Provides a uniform completion interface over several interchangeable
//! text-generation providers:
//!   - **OpenAI-wire-compatible APIs** (GPT, Mistral, DeepSeek — they all
//!     speak `/v1/chat/completions`)
//!   - **Gemini** (`generateContent` wire format)
//!
//! All generation calls in Switchboard go through this crate, ensuring:
//!   - One typed [`Backend`] trait instead of string-keyed dispatch
//!   - Timeout management per call
//!   - Resilient multi-attempt execution via [`FallbackExecutor`]
//!   - Graceful degradation — exhaustion is a structured result, never a panic
//!
//! A backend whose credentials are absent at startup is constructed
//! *unavailable*: it stays in the registry, is recorded as skipped in
//! attempt traces, and is never actually called.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod error;
pub mod executor;
pub mod providers;
pub mod registry;
pub mod types;

pub use backend::{Backend, BackendId};
pub use error::BackendError;
pub use executor::{
    AttemptRecord, AttemptStatus, ExecutionResult, FallbackExecutor, FallbackOutcome,
};
pub use registry::BackendRegistry;
pub use types::{CompletionRequest, CompletionResponse, TokenUsage};
