//! The router — per-request orchestration of cache, memory, classifier
//! and fallback execution.
//!
//! Sequence for one request:
//!
//! 1. drop redelivered webhook messages (bounded id set)
//! 2. cache lookup (when enabled) — a hit still appends both sides of
//!    the exchange to memory so conversational context stays continuous
//! 3. append the inbound message to memory
//! 4. build the conversation context and prepend it to the prompt
//! 5. resolve the target backend — explicit override beats the classifier
//! 6. fallback execution
//! 7. append the outbound message, tagged with the backend actually used
//! 8. cache the response (successful completions only)
//!
//! Cache and memory store failures are absorbed here: logged, then the
//! request proceeds without that feature. Only full fallback exhaustion
//! is surfaced to the caller, as a structured failure carrying the
//! attempt trace. If the caller cancels mid-flight the future is simply
//! dropped — the cache-store step never runs, so no partial result is
//! persisted.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use switchboard_llm::providers::{ChatCompletionsBackend, GeminiBackend};
use switchboard_llm::{
    AttemptRecord, Backend, BackendId, BackendRegistry, CompletionRequest, ExecutionResult,
    FallbackExecutor,
};

use crate::cache::ResponseCache;
use crate::classifier::{Classifier, Indicators};
use crate::config::{GatewayConfig, GenerationConfig};
use crate::dedup::DeliveryDedup;
use crate::memory::ConversationMemory;
use crate::store::RecordStore;
use crate::types::Role;

/// One inbound routing request.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// The natural-language prompt.
    pub prompt: String,
    /// Conversation key; memory is skipped when absent.
    pub sender_id: Option<String>,
    /// Explicit backend choice; beats the classifier when present.
    pub backend_override: Option<BackendId>,
    /// Whether the cache participates for this request.
    pub use_cache: bool,
    /// Webhook delivery id for deduplication, when the boundary has one.
    pub message_id: Option<String>,
}

impl RouteRequest {
    /// A plain request with caching on and no conversation.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            sender_id: None,
            backend_override: None,
            use_cache: true,
            message_id: None,
        }
    }

    /// Attach a conversation key.
    #[must_use]
    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    /// Force a specific backend.
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<BackendId>) -> Self {
        self.backend_override = Some(backend.into());
        self
    }

    /// Opt out of the cache for this request.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Attach a webhook delivery id.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

/// The routed result handed back to the boundary layer.
#[derive(Debug, Clone, Serialize)]
pub struct RouteResponse {
    /// Generated (or cached) text; empty on failure.
    pub text: String,
    /// Backend id that produced the text, or `"error"` on failure.
    pub model: String,
    /// Whether a response was produced at all.
    pub success: bool,
    /// Classifier confidence; absent on override and cache hits.
    pub confidence: Option<f32>,
    /// Classifier per-backend scores; absent on override and cache hits.
    pub model_scores: Option<BTreeMap<BackendId, f32>>,
    /// Classifier indicators; absent on override and cache hits.
    pub indicators: Option<Indicators>,
    /// Whether a backend other than the requested one answered.
    pub used_fallback: bool,
    /// Full attempt trace when fallback execution ran.
    pub fallback_trace: Option<Vec<AttemptRecord>>,
    /// Whether the text came from the response cache.
    pub from_cache: bool,
}

impl RouteResponse {
    fn failure(trace: Vec<AttemptRecord>) -> Self {
        Self {
            text: String::new(),
            model: "error".to_string(),
            success: false,
            confidence: None,
            model_scores: None,
            indicators: None,
            used_fallback: true,
            fallback_trace: Some(trace),
            from_cache: false,
        }
    }

    fn duplicate() -> Self {
        Self {
            text: String::new(),
            model: "error".to_string(),
            success: false,
            confidence: None,
            model_scores: None,
            indicators: None,
            used_fallback: false,
            fallback_trace: None,
            from_cache: false,
        }
    }
}

/// The orchestrator.
pub struct Router {
    registry: Arc<BackendRegistry>,
    executor: FallbackExecutor,
    classifier: Classifier,
    cache: ResponseCache,
    memory: ConversationMemory,
    dedup: DeliveryDedup,
    generation: GenerationConfig,
}

impl Router {
    /// Assemble a router from pre-built components.
    #[must_use]
    pub fn new(
        registry: Arc<BackendRegistry>,
        classifier: Classifier,
        cache: ResponseCache,
        memory: ConversationMemory,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            executor: FallbackExecutor::new(Arc::clone(&registry)),
            registry,
            classifier,
            cache,
            memory,
            dedup: DeliveryDedup::default(),
            generation,
        }
    }

    /// Build the full component stack from configuration.
    ///
    /// Providers without credentials become unavailable backends. The
    /// semantic topic detector is wired to the default backend when it
    /// is available, otherwise memory falls back to heuristics only.
    #[must_use]
    pub fn from_config(config: &GatewayConfig, store: Arc<RecordStore>) -> Self {
        let b = &config.backends;
        let backends: Vec<Arc<dyn Backend>> = vec![
            Arc::new(ChatCompletionsBackend::new(
                "gpt",
                &b.gpt.model,
                &b.gpt.base_url,
                b.gpt.api_key.clone(),
            )),
            Arc::new(GeminiBackend::new(
                &b.gemini.model,
                &b.gemini.base_url,
                b.gemini.api_key.clone(),
            )),
            Arc::new(ChatCompletionsBackend::new(
                "mistral",
                &b.mistral.model,
                &b.mistral.base_url,
                b.mistral.api_key.clone(),
            )),
            Arc::new(ChatCompletionsBackend::new(
                "deepseek",
                &b.deepseek.model,
                &b.deepseek.base_url,
                b.deepseek.api_key.clone(),
            )),
        ];
        let order: Vec<BackendId> = b.fallback_order.iter().map(BackendId::new).collect();
        let default = BackendId::new(&b.default_backend);
        let registry = Arc::new(BackendRegistry::new(backends, order.clone(), default.clone()));

        let classifier = Classifier::new(registry.available_ids(), order, default.clone());
        let cache = ResponseCache::new(Arc::clone(&store), config.cache.clone());
        let semantic_backend = registry
            .get(&default)
            .filter(|backend| backend.is_available())
            .cloned();
        let memory = ConversationMemory::new(store, config.memory.clone(), semantic_backend);

        Self::new(registry, classifier, cache, memory, config.generation.clone())
    }

    /// Route one request end to end.
    pub async fn route(&self, request: RouteRequest) -> RouteResponse {
        let request_id = Uuid::new_v4();
        info!(%request_id, sender = request.sender_id.as_deref().unwrap_or("-"), "routing request");

        if let Some(message_id) = &request.message_id {
            if !self.dedup.first_seen(message_id) {
                info!(%request_id, message_id, "duplicate delivery dropped");
                return RouteResponse::duplicate();
            }
        }

        let caching = request.use_cache && self.cache.enabled();
        if caching {
            match self.cache.lookup(&request.prompt) {
                Ok(Some(hit)) => {
                    info!(%request_id, model = %hit.model, hits = hit.hit_count, "served from cache");
                    // Cache hits still feed memory: the exchange happened
                    // from the sender's point of view.
                    self.remember(&request, Role::User, &request.prompt, None).await;
                    self.remember(&request, Role::Assistant, &hit.response, Some(hit.model.as_str()))
                        .await;
                    return RouteResponse {
                        text: hit.response,
                        model: hit.model,
                        success: true,
                        confidence: None,
                        model_scores: None,
                        indicators: None,
                        used_fallback: false,
                        fallback_trace: None,
                        from_cache: true,
                    };
                }
                Ok(None) => {}
                Err(e) => warn!(%request_id, error = %e, "cache lookup failed, proceeding"),
            }
        }

        self.remember(&request, Role::User, &request.prompt, None).await;
        let context = self.build_context(&request);

        let (target, classification) = match &request.backend_override {
            Some(backend) => (backend.clone(), None),
            None => {
                let classification = self.classifier.classify(&request.prompt);
                info!(
                    %request_id,
                    recommended = %classification.recommended,
                    confidence = classification.confidence,
                    "prompt classified"
                );
                (classification.recommended.clone(), Some(classification))
            }
        };

        let full_prompt = if context.is_empty() {
            request.prompt.clone()
        } else {
            format!("{context}\n\n{}", request.prompt)
        };
        let completion = CompletionRequest::new(full_prompt)
            .with_max_tokens(self.generation.max_tokens)
            .with_timeout(self.generation.timeout_ms);

        let outcome = self.executor.execute(&target, &completion).await;

        match outcome.result {
            ExecutionResult::Completed(response) => {
                let model = outcome
                    .model_used
                    .as_ref()
                    .map_or_else(|| target.to_string(), ToString::to_string);
                self.remember(&request, Role::Assistant, &response.text, Some(model.as_str()))
                    .await;
                if caching {
                    if let Err(e) = self.cache.store(&request.prompt, &response.text, &model) {
                        warn!(%request_id, error = %e, "cache store failed, response not cached");
                    }
                }
                RouteResponse {
                    text: response.text,
                    model,
                    success: true,
                    confidence: classification.as_ref().map(|c| c.confidence),
                    model_scores: classification.as_ref().map(|c| c.model_scores.clone()),
                    indicators: classification.as_ref().map(|c| c.indicators),
                    used_fallback: outcome.used_fallback,
                    fallback_trace: Some(outcome.attempts),
                    from_cache: false,
                }
            }
            ExecutionResult::Exhausted => {
                warn!(%request_id, attempts = outcome.attempts.len(), "all backends exhausted");
                RouteResponse::failure(outcome.attempts)
            }
        }
    }

    /// Purge expired cache entries and long-idle conversations.
    pub fn run_maintenance(&self) {
        if let Err(e) = self.cache.cleanup_expired() {
            warn!(error = %e, "cache sweep failed");
        }
        if let Err(e) = self.memory.cleanup_inactive() {
            warn!(error = %e, "conversation sweep failed");
        }
    }

    /// The backend registry this router executes against.
    #[must_use]
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// The conversation-memory component (for boundary-layer admin calls).
    #[must_use]
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Memory append with graceful degradation.
    async fn remember(&self, request: &RouteRequest, role: Role, content: &str, model: Option<&str>) {
        let Some(sender_id) = &request.sender_id else {
            return;
        };
        if let Err(e) = self.memory.append(sender_id, role, content, model).await {
            warn!(sender_id, error = %e, "memory append failed, proceeding without it");
        }
    }

    /// Context build with graceful degradation.
    fn build_context(&self, request: &RouteRequest) -> String {
        let Some(sender_id) = &request.sender_id else {
            return String::new();
        };
        match self.memory.build_context(sender_id) {
            Ok(context) => context,
            Err(e) => {
                warn!(sender_id, error = %e, "context build failed, proceeding without it");
                String::new()
            }
        }
    }
}
