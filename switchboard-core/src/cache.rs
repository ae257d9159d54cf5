//! Response cache keyed by a hash of the normalized prompt, with a
//! Jaccard-similarity fallback for near-identical phrasings.
//!
//! Normalization lowercases, folds diacritics, strips punctuation, and
//! collapses whitespace, so "Qual é a capital do Brasil?" and
//! "qual e a capital do brasil" share one entry. When the exact hash
//! misses, a linear scan over live entries compares normalized word
//! sets and serves the best match at or above the configured threshold.
//!
//! A hit has observable side effects: `hit_count` is incremented and
//! `last_accessed` refreshed. `store` is an atomic per-key upsert that
//! refreshes the TTL and resets the hit count; `created_at` survives
//! updates. Failed generation results are never written — the router
//! only stores successful completions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::store::RecordStore;
use crate::types::CacheEntry;

/// The response cache component.
pub struct ResponseCache {
    store: Arc<RecordStore>,
    config: CacheConfig,
}

impl ResponseCache {
    /// Create a cache over `store`.
    #[must_use]
    pub fn new(store: Arc<RecordStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// Whether caching participates in routing.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Look up a prompt: exact hash first, then similarity fallback.
    ///
    /// Returns the entry with its hit bookkeeping already applied.
    /// Expired entries are never returned.
    ///
    /// # Errors
    /// Returns a store error; the router degrades to a backend call.
    pub fn lookup(&self, prompt: &str) -> Result<Option<CacheEntry>> {
        let now = Utc::now();
        let normalized = normalize_prompt(prompt);
        let hash = prompt_hash(&normalized);

        if let Some(entry) = self.store.cache_get(&hash)? {
            if !entry.is_expired(now) {
                debug!(prompt_hash = %hash, hit_count = entry.hit_count + 1, "exact cache hit");
                return self.serve(entry);
            }
        }

        // Exact miss: linear scan comparing normalized word sets.
        let words = word_set(&normalized);
        if words.is_empty() {
            return Ok(None);
        }
        let mut best: Option<(f64, CacheEntry)> = None;
        for candidate in self.store.cache_scan_live(now)? {
            let score = jaccard(&words, &word_set(&candidate.prompt));
            if score >= self.config.similarity_threshold
                && best.as_ref().is_none_or(|(top, _)| score > *top)
            {
                best = Some((score, candidate));
            }
        }
        match best {
            Some((score, entry)) => {
                debug!(prompt_hash = %entry.prompt_hash, score, "similarity cache hit");
                self.serve(entry)
            }
            None => Ok(None),
        }
    }

    /// Apply hit bookkeeping and return the served entry.
    fn serve(&self, mut entry: CacheEntry) -> Result<Option<CacheEntry>> {
        let now = Utc::now();
        self.store.cache_touch(&entry.prompt_hash, now)?;
        entry.hit_count += 1;
        entry.last_accessed = now;
        Ok(Some(entry))
    }

    /// Upsert a successful response with the configured default TTL.
    ///
    /// # Errors
    /// Returns a store error; the router logs it and moves on.
    pub fn store(&self, prompt: &str, response: &str, model: &str) -> Result<()> {
        self.store_with_ttl(
            prompt,
            response,
            model,
            Duration::hours(i64::from(self.config.ttl_hours)),
        )
    }

    /// Upsert a successful response under the prompt's normalized hash.
    ///
    /// Updating an existing entry refreshes its TTL and resets the hit
    /// count; `created_at` survives the update.
    ///
    /// # Errors
    /// Returns a store error; the router logs it and moves on.
    pub fn store_with_ttl(
        &self,
        prompt: &str,
        response: &str,
        model: &str,
        ttl: Duration,
    ) -> Result<()> {
        let now = Utc::now();
        let normalized = normalize_prompt(prompt);
        let hash = prompt_hash(&normalized);
        let entry = CacheEntry {
            prompt_hash: hash.clone(),
            prompt: normalized,
            response: response.to_string(),
            model: model.to_string(),
            created_at: now,
            expires_at: now + ttl,
            last_accessed: now,
            hit_count: 0,
        };
        self.store.cache_upsert(&entry)?;
        debug!(prompt_hash = %hash, model, "response cached");
        Ok(())
    }

    /// Remove expired entries; returns how many were purged.
    ///
    /// # Errors
    /// Returns a store error.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let removed = self.store.cache_sweep_expired(Utc::now())?;
        if removed > 0 {
            info!(removed, "expired cache entries purged");
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Normalization helpers
// ---------------------------------------------------------------------------

/// Lowercase, fold diacritics, strip punctuation, collapse whitespace.
#[must_use]
pub fn normalize_prompt(prompt: &str) -> String {
    let mut out = String::with_capacity(prompt.len());
    let mut last_was_space = true;
    for ch in prompt.chars().flat_map(|c| c.to_lowercase()) {
        let ch = fold_diacritic(ch);
        if ch.is_alphanumeric() {
            out.push(ch);
            last_was_space = false;
        } else if ch.is_whitespace() || ch.is_ascii_punctuation() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
        // Other symbols (emoji etc.) are dropped entirely.
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Fold the Latin-1 diacritics that dominate the gateway's traffic.
fn fold_diacritic(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// SHA-256 hex digest of the normalized prompt.
#[must_use]
pub fn prompt_hash(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

fn word_set(normalized: &str) -> HashSet<&str> {
    normalized.split_whitespace().collect()
}

/// Jaccard word-overlap ratio of two normalized prompts.
fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CacheEntry;

    fn cache() -> (Arc<RecordStore>, ResponseCache) {
        let store = Arc::new(RecordStore::open_in_memory().expect("open"));
        let cache = ResponseCache::new(Arc::clone(&store), CacheConfig::default());
        (store, cache)
    }

    #[test]
    fn normalization_folds_case_punctuation_and_accents() {
        assert_eq!(
            normalize_prompt("Qual é a capital do Brasil?"),
            "qual e a capital do brasil"
        );
        assert_eq!(normalize_prompt("  Muito\t bem!!  "), "muito bem");
    }

    #[test]
    fn round_trip_store_then_lookup() {
        let (_store, cache) = cache();
        cache
            .store("Qual é a capital do Brasil?", "Brasília.", "gemini")
            .expect("store");

        let hit = cache
            .lookup("Qual é a capital do Brasil?")
            .expect("lookup")
            .expect("hit");
        assert_eq!(hit.response, "Brasília.");
        assert_eq!(hit.model, "gemini");
        assert_eq!(hit.hit_count, 1);
    }

    #[test]
    fn case_and_punctuation_variants_share_one_entry() {
        let (_store, cache) = cache();
        cache
            .store("Qual é a capital do Brasil?", "Brasília.", "gemini")
            .expect("store");

        let hit = cache
            .lookup("qual e a capital do brasil")
            .expect("lookup")
            .expect("hit");
        assert_eq!(hit.response, "Brasília.");
    }

    #[test]
    fn similar_phrasing_hits_above_threshold() {
        let store = Arc::new(RecordStore::open_in_memory().expect("open"));
        let cache = ResponseCache::new(
            Arc::clone(&store),
            CacheConfig {
                similarity_threshold: 0.5,
                ..CacheConfig::default()
            },
        );
        cache
            .store("qual é a capital do brasil", "Brasília.", "gemini")
            .expect("store");

        let hit = cache
            .lookup("me diga qual é a capital do brasil")
            .expect("lookup")
            .expect("similarity hit");
        assert_eq!(hit.response, "Brasília.");
    }

    #[test]
    fn unrelated_prompt_misses() {
        let (_store, cache) = cache();
        cache
            .store("qual é a capital do brasil", "Brasília.", "gemini")
            .expect("store");
        assert!(cache
            .lookup("me fale sobre linguagens de programação")
            .expect("lookup")
            .is_none());
    }

    #[test]
    fn expired_entries_are_never_served() {
        let (store, cache) = cache();
        let now = Utc::now();
        let normalized = normalize_prompt("pergunta antiga");
        store
            .cache_upsert(&CacheEntry {
                prompt_hash: prompt_hash(&normalized),
                prompt: normalized,
                response: "velho".to_string(),
                model: "gemini".to_string(),
                created_at: now - Duration::hours(48),
                expires_at: now - Duration::hours(24),
                last_accessed: now - Duration::hours(48),
                hit_count: 7,
            })
            .expect("upsert");

        assert!(cache.lookup("pergunta antiga").expect("lookup").is_none());
        assert_eq!(cache.cleanup_expired().expect("sweep"), 1);
    }

    #[test]
    fn hit_count_accumulates_across_hits() {
        let (_store, cache) = cache();
        cache.store("oi tudo bem", "Olá!", "mistral").expect("store");

        for expected in 1..=3 {
            let hit = cache.lookup("oi tudo bem").expect("lookup").expect("hit");
            assert_eq!(hit.hit_count, expected);
        }
    }

    #[test]
    fn jaccard_is_symmetric_and_bounded() {
        let a = word_set("qual e a capital do brasil");
        let b = word_set("qual e a populacao do brasil");
        let ab = jaccard(&a, &b);
        assert!((0.0..=1.0).contains(&ab));
        assert!((ab - jaccard(&b, &a)).abs() < f64::EPSILON);
        assert!((jaccard(&a, &a) - 1.0).abs() < f64::EPSILON);
    }
}
