//! Topic-shift detection for conversation memory.
//!
//! Detection is hybrid. The deterministic path is always available and
//! needs no I/O: it matches explicit subject-change phrases, plus a
//! second class of "conditional" triggers ("vamos falar sobre …") that
//! only count when a qualifying substantive token follows. The semantic
//! path, preferred when a backend is injected, asks the backend for a
//! structured verdict over the conversation tail; any call failure or
//! malformed output falls back to the deterministic path.
//!
//! The backend here is the same [`Backend`] trait the router executes
//! against — injected, never a concrete provider, so memory does not
//! depend on routing.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use switchboard_llm::{Backend, CompletionRequest};

use crate::types::Message;

/// Phrases that announce a subject change on their own.
const EXPLICIT_PHRASES: &[&str] = &[
    "mudando de assunto",
    "mudar de assunto",
    "outro assunto",
    "outra pergunta",
    "deixando isso de lado",
    "esquece isso",
    "agora me fale de outra coisa",
];

/// Triggers that only count as a change when followed by a substantive
/// subject ("vamos falar sobre X").
const CONDITIONAL_TRIGGERS: &[&str] = &[
    "vamos falar sobre",
    "me fale sobre",
    "fale sobre",
    "me conte sobre",
    "o que você sabe sobre",
    "quero saber sobre",
];

/// Question words that disqualify a token from being a subject.
const QUESTION_WORDS: &[&str] = &[
    "que", "quê", "qual", "quais", "quem", "onde", "quando", "como", "por",
];

/// Outcome of a detection pass.
#[derive(Debug, Clone)]
pub struct TopicDecision {
    /// Whether the incoming message starts a new topic.
    pub is_topic_change: bool,
    /// The new topic, when one was identified.
    pub new_topic: Option<String>,
    /// The topic that was active before, when one existed.
    pub previous_topic: Option<String>,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f32,
}

impl TopicDecision {
    fn unchanged() -> Self {
        Self {
            is_topic_change: false,
            new_topic: None,
            previous_topic: None,
            confidence: 1.0,
        }
    }
}

/// Shape the semantic path asks the backend to return.
#[derive(Debug, Deserialize)]
struct SemanticVerdict {
    is_topic_change: bool,
    #[serde(default)]
    new_topic: Option<String>,
    #[serde(default)]
    previous_topic: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

const SEMANTIC_SYSTEM_PROMPT: &str = "You judge whether a conversation's subject has changed. \
Answer with strict JSON only: \
{\"is_topic_change\": <bool>, \"new_topic\": <string or null>, \
\"previous_topic\": <string or null>, \"confidence\": <float 0.0-1.0>}. \
No prose, no code fences.";

/// Hybrid topic-shift detector.
pub struct TopicDetector {
    backend: Option<Arc<dyn Backend>>,
    semantic_tail: usize,
}

impl TopicDetector {
    /// Create a detector. With `backend == None` only the deterministic
    /// path runs.
    #[must_use]
    pub fn new(backend: Option<Arc<dyn Backend>>, semantic_tail: usize) -> Self {
        Self {
            backend,
            semantic_tail,
        }
    }

    /// Decide whether `incoming` starts a new topic.
    ///
    /// `recent` is the stored message log; only the configured tail is
    /// shown to the semantic judge.
    pub async fn detect(
        &self,
        current_topic: Option<&str>,
        recent: &[Message],
        incoming: &str,
    ) -> TopicDecision {
        if let Some(backend) = &self.backend {
            if backend.is_available() {
                match self.detect_semantic(backend, current_topic, recent, incoming).await {
                    Ok(decision) => return decision,
                    Err(reason) => {
                        warn!(reason, "semantic topic detection failed, using heuristics");
                    }
                }
            }
        }
        detect_heuristic(current_topic, incoming)
    }

    async fn detect_semantic(
        &self,
        backend: &Arc<dyn Backend>,
        current_topic: Option<&str>,
        recent: &[Message],
        incoming: &str,
    ) -> Result<TopicDecision, &'static str> {
        let tail_start = recent.len().saturating_sub(self.semantic_tail);
        let mut transcript = String::new();
        for message in &recent[tail_start..] {
            transcript.push_str(&format!("{}: {}\n", message.role, message.content));
        }
        let prompt = format!(
            "Current topic: {}\nConversation so far:\n{}\nNew message: {incoming}",
            current_topic.unwrap_or("(none)"),
            transcript
        );

        let request = CompletionRequest::new(prompt)
            .with_system(SEMANTIC_SYSTEM_PROMPT)
            .with_max_tokens(200)
            .with_timeout(10_000);

        let response = backend
            .complete(&request)
            .await
            .map_err(|_| "backend call failed")?;

        let verdict: SemanticVerdict =
            serde_json::from_str(extract_json(&response.text)).map_err(|_| "malformed verdict")?;

        debug!(
            is_change = verdict.is_topic_change,
            new_topic = verdict.new_topic.as_deref().unwrap_or(""),
            "semantic topic verdict"
        );
        Ok(TopicDecision {
            is_topic_change: verdict.is_topic_change,
            new_topic: verdict.new_topic,
            previous_topic: verdict
                .previous_topic
                .or_else(|| current_topic.map(String::from)),
            confidence: verdict.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        })
    }
}

/// Slice out the outermost JSON object; judges sometimes wrap it in prose.
fn extract_json(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

// ---------------------------------------------------------------------------
// Deterministic path
// ---------------------------------------------------------------------------

/// Phrase-based detection; no I/O, always available.
#[must_use]
pub fn detect_heuristic(current_topic: Option<&str>, incoming: &str) -> TopicDecision {
    let lower = incoming.to_lowercase();

    for phrase in EXPLICIT_PHRASES {
        if let Some(position) = lower.find(phrase) {
            let after = lower[position + phrase.len()..].trim();
            let new_topic = if after.is_empty() {
                None
            } else {
                Some(clean_topic(after))
            };
            return TopicDecision {
                is_topic_change: true,
                new_topic,
                previous_topic: current_topic.map(String::from),
                confidence: 0.9,
            };
        }
    }

    for trigger in CONDITIONAL_TRIGGERS {
        if let Some(position) = lower.find(trigger) {
            let after = lower[position + trigger.len()..].trim();
            if has_substantive_subject(after) {
                return TopicDecision {
                    is_topic_change: true,
                    new_topic: Some(clean_topic(after)),
                    previous_topic: current_topic.map(String::from),
                    confidence: 0.7,
                };
            }
        }
    }

    TopicDecision::unchanged()
}

/// A qualifying subject has at least one token longer than four
/// characters that is not itself a question word.
fn has_substantive_subject(after: &str) -> bool {
    after
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .any(|token| token.chars().count() > 4 && !QUESTION_WORDS.contains(&token))
}

fn clean_topic(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_request_with_substance_is_a_change() {
        let decision = detect_heuristic(
            Some("capital do Brasil"),
            "Me fale sobre as linguagens de programação mais populares.",
        );
        assert!(decision.is_topic_change);
        assert_eq!(
            decision.new_topic.as_deref(),
            Some("as linguagens de programação mais populares")
        );
        assert_eq!(decision.previous_topic.as_deref(), Some("capital do Brasil"));
    }

    #[test]
    fn followup_question_is_not_a_change() {
        let decision =
            detect_heuristic(Some("capital do Brasil"), "E qual é a população de Brasília?");
        assert!(!decision.is_topic_change);
        assert!(decision.new_topic.is_none());
    }

    #[test]
    fn explicit_phrase_always_changes() {
        let decision = detect_heuristic(None, "Mudando de assunto: futebol brasileiro");
        assert!(decision.is_topic_change);
        assert_eq!(decision.new_topic.as_deref(), Some("futebol brasileiro"));
        assert!((decision.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn conditional_trigger_without_substance_is_ignored() {
        // Only short or question tokens after the trigger.
        let decision = detect_heuristic(Some("viagem"), "Vamos falar sobre o quê?");
        assert!(!decision.is_topic_change);
    }

    #[test]
    fn json_is_extracted_from_wrapping_prose() {
        let wrapped = "Sure! Here is the verdict: {\"is_topic_change\": true} Hope it helps.";
        assert_eq!(extract_json(wrapped), "{\"is_topic_change\": true}");
        assert_eq!(extract_json("no json here"), "no json here");
    }
}
