//! Configuration for the Switchboard gateway.
//!
//! Maps directly to `switchboard.toml`. Credentials are plain values
//! here; loading them from the environment is the boundary layer's job.
//! A provider section without an `api_key` produces an *unavailable*
//! backend — registered, excluded from actual calls, never fatal.

use serde::{Deserialize, Serialize};

/// Top-level gateway configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Backend providers, default selection and fallback ordering.
    #[serde(default)]
    pub backends: BackendsConfig,
    /// Generation parameters applied to every completion call.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Response-cache behavior.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Conversation memory and topic segmentation.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Record-store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `GatewayError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::GatewayError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// One provider's connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Concrete model name sent on the wire.
    pub model: String,
    /// API base URL (no trailing slash).
    pub base_url: String,
    /// Credential. `None` marks the backend unavailable for its lifetime.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ProviderConfig {
    fn new(model: &str, base_url: &str) -> Self {
        Self {
            model: model.to_string(),
            base_url: base_url.to_string(),
            api_key: None,
        }
    }
}

/// Backend selection and fallback ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    /// Backend returned by the classifier when no signal fires, and the
    /// tie-break winner among equal scores.
    #[serde(default = "default_backend")]
    pub default_backend: String,
    /// Canonical priority ordering for fallback execution and tie breaks.
    #[serde(default = "default_fallback_order")]
    pub fallback_order: Vec<String>,
    /// GPT (OpenAI wire format). Reserved mostly for the hardest prompts.
    #[serde(default = "default_gpt")]
    pub gpt: ProviderConfig,
    /// Gemini (generateContent wire format).
    #[serde(default = "default_gemini")]
    pub gemini: ProviderConfig,
    /// Mistral (OpenAI wire format).
    #[serde(default = "default_mistral")]
    pub mistral: ProviderConfig,
    /// DeepSeek (OpenAI wire format).
    #[serde(default = "default_deepseek")]
    pub deepseek: ProviderConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            default_backend: default_backend(),
            fallback_order: default_fallback_order(),
            gpt: default_gpt(),
            gemini: default_gemini(),
            mistral: default_mistral(),
            deepseek: default_deepseek(),
        }
    }
}

/// Generation parameters for completion calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum tokens per completion.
    #[serde(default = "default_1024")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_0_7")]
    pub temperature: f32,
    /// Hard timeout per backend call in milliseconds. A timeout is
    /// treated like any other failure and advances the fallback chain.
    #[serde(default = "default_30000")]
    pub timeout_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            timeout_ms: 30_000,
        }
    }
}

/// Response-cache behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether the cache participates in routing at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Time-to-live for stored entries, in hours.
    #[serde(default = "default_24")]
    pub ttl_hours: u32,
    /// Minimum Jaccard word-overlap ratio for the similarity fallback.
    #[serde(default = "default_0_8")]
    pub similarity_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: 24,
            similarity_threshold: 0.8,
        }
    }
}

/// Conversation memory and topic segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Hard cap on stored messages per sender (oldest trimmed first).
    #[serde(default = "default_100")]
    pub max_messages: usize,
    /// Word budget for the assembled context (trimmed from the front).
    #[serde(default = "default_4000")]
    pub context_word_budget: usize,
    /// A conversation idle longer than this is reset to an empty log on
    /// next access (lazy expiry, distinct from explicit `clear`).
    #[serde(default = "default_180")]
    pub reset_after_minutes: i64,
    /// `cleanup_inactive` deletes records idle longer than this.
    #[serde(default = "default_30")]
    pub sweep_after_days: i64,
    /// On a topic change, the working window keeps this many messages.
    #[serde(default = "default_10")]
    pub topic_window: usize,
    /// How many trailing messages the semantic detector is shown.
    #[serde(default = "default_6")]
    pub semantic_tail: usize,
    /// Cap on question/answer pairs in the prior-segment summary.
    #[serde(default = "default_3")]
    pub summary_max_pairs: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: 100,
            context_word_budget: 4000,
            reset_after_minutes: 180,
            sweep_after_days: 30,
            topic_window: 10,
            semantic_tail: 6,
            summary_max_pairs: 3,
        }
    }
}

/// Record-store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Use WAL mode for concurrent readers.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { wal_mode: true }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_backend() -> String {
    "gemini".to_string()
}

fn default_fallback_order() -> Vec<String> {
    vec![
        "gemini".to_string(),
        "mistral".to_string(),
        "deepseek".to_string(),
        "gpt".to_string(),
    ]
}

fn default_gpt() -> ProviderConfig {
    ProviderConfig::new("gpt-4-turbo-preview", "https://api.openai.com")
}

fn default_gemini() -> ProviderConfig {
    ProviderConfig::new("gemini-1.5-pro", "https://generativelanguage.googleapis.com")
}

fn default_mistral() -> ProviderConfig {
    ProviderConfig::new("mistral-large-latest", "https://api.mistral.ai")
}

fn default_deepseek() -> ProviderConfig {
    ProviderConfig::new("deepseek-chat", "https://api.deepseek.com")
}

fn default_true() -> bool { true }
fn default_0_7() -> f32 { 0.7 }
fn default_0_8() -> f64 { 0.8 }
fn default_3() -> usize { 3 }
fn default_6() -> usize { 6 }
fn default_10() -> usize { 10 }
fn default_24() -> u32 { 24 }
fn default_30() -> i64 { 30 }
fn default_100() -> usize { 100 }
fn default_180() -> i64 { 180 }
fn default_1024() -> u32 { 1024 }
fn default_4000() -> usize { 4000 }
fn default_30000() -> u64 { 30_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = GatewayConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let parsed = GatewayConfig::from_toml(&toml_str).expect("parse");
        assert_eq!(parsed.cache.ttl_hours, 24);
        assert_eq!(parsed.memory.max_messages, 100);
        assert_eq!(parsed.backends.default_backend, "gemini");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = GatewayConfig::from_toml(
            r#"
            [cache]
            ttl_hours = 2

            [backends.gpt]
            model = "gpt-4o"
            base_url = "https://api.openai.com"
            api_key = "sk-test"
            "#,
        )
        .expect("parse");
        assert_eq!(config.cache.ttl_hours, 2);
        assert!(config.cache.enabled);
        assert_eq!(config.backends.gpt.api_key.as_deref(), Some("sk-test"));
        assert!(config.backends.gemini.api_key.is_none());
        assert!((config.cache.similarity_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = GatewayConfig::from_toml("backends = 3").expect_err("must fail");
        assert!(matches!(err, crate::GatewayError::Config(_)));
    }
}
