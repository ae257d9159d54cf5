//! HTTP provider implementations of the [`Backend`] trait.
//!
//! Two wire formats cover every configured provider:
//!   - [`ChatCompletionsBackend`] — the OpenAI `/v1/chat/completions`
//!     shape, spoken verbatim by GPT, Mistral, and DeepSeek.
//!   - [`GeminiBackend`] — Google's `generateContent` shape.
//!
//! Providers make exactly one HTTP call per `complete()` invocation.
//! Resilience lives one layer up, in the fallback executor: a failed
//! call advances the chain to the next backend instead of being retried.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendId};
use crate::error::BackendError;
use crate::types::{CompletionRequest, CompletionResponse, TokenUsage};

/// Truncation limit for error bodies carried into attempt traces.
const ERROR_BODY_LIMIT: usize = 256;

fn truncate_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        body.to_string()
    } else {
        let mut end = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}

// ---------------------------------------------------------------------------
// OpenAI-wire-compatible providers (GPT, Mistral, DeepSeek)
// ---------------------------------------------------------------------------

/// A backend speaking the OpenAI `/v1/chat/completions` wire format.
pub struct ChatCompletionsBackend {
    id: BackendId,
    model: String,
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl ChatCompletionsBackend {
    /// Construct a chat-completions backend.
    ///
    /// `api_key == None` yields a permanently unavailable backend that
    /// is listed in traces but never called.
    #[must_use]
    pub fn new(
        id: impl Into<BackendId>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            base_url: base_url.into(),
            api_key,
            http: Client::new(),
        }
    }
}

#[async_trait]
impl Backend for ChatCompletionsBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, BackendError> {
        let Some(api_key) = &self.api_key else {
            return Err(BackendError::NotConfigured(self.id.to_string()));
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        debug!(backend = %self.id, model = %self.model, "chat-completions call");
        let start = Instant::now();
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .timeout(Duration::from_millis(request.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(request.timeout_ms)
                } else {
                    e.into()
                }
            })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(backend = %self.id, status = status.as_u16(), "chat-completions error");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if text.trim().is_empty() {
            return Err(BackendError::EmptyCompletion);
        }

        let tokens = json.get("usage").map(|usage| TokenUsage {
            prompt: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total: usage["total_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(CompletionResponse {
            text,
            model: self.model.clone(),
            tokens,
            latency_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

/// A backend speaking Google's `generateContent` wire format.
pub struct GeminiBackend {
    id: BackendId,
    model: String,
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl GeminiBackend {
    /// Construct a Gemini backend. `api_key == None` yields a
    /// permanently unavailable backend.
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            id: BackendId::new("gemini"),
            model: model.into(),
            base_url: base_url.into(),
            api_key,
            http: Client::new(),
        }
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, BackendError> {
        let Some(api_key) = &self.api_key else {
            return Err(BackendError::NotConfigured(self.id.to_string()));
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );

        // Gemini has no first-class system role on this endpoint; the
        // system prompt is folded into the user turn.
        let text = match &request.system {
            Some(system) => format!("{system}\n\n{}", request.prompt),
            None => request.prompt.clone(),
        };
        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "temperature": request.temperature,
            }
        });

        debug!(backend = %self.id, model = %self.model, "generateContent call");
        let start = Instant::now();
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .timeout(Duration::from_millis(request.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(request.timeout_ms)
                } else {
                    e.into()
                }
            })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(backend = %self.id, status = status.as_u16(), "generateContent error");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;

        let text = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if text.trim().is_empty() {
            return Err(BackendError::EmptyCompletion);
        }

        let tokens = json.get("usageMetadata").map(|usage| TokenUsage {
            prompt: usage["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            completion: usage["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
            total: usage["totalTokenCount"].as_u64().unwrap_or(0) as u32,
        });

        Ok(CompletionResponse {
            text,
            model: self.model.clone(),
            tokens,
            latency_ms,
        })
    }
}
