//! Per-sender conversation memory with topic segmentation.
//!
//! Each sender gets one [`ConversationRecord`]: a bounded FIFO message
//! log plus topic metadata. Appending a user message runs topic
//! detection; a detected shift appends a [`TopicChange`] marking where
//! the new topic starts and replaces the active topic (there is at most
//! one at any time).
//!
//! Context building balances retention against prompt size: messages
//! before the most recent topic change are condensed into a short
//! question/answer summary, the live window after it is included
//! verbatim (capped at the configured window size), and the whole
//! context is trimmed to a word budget from the front.
//!
//! A conversation idle past the inactivity threshold is reset to an
//! empty log on next access — lazy expiry, distinct from an explicit
//! `clear`. Disabled conversations ignore appends entirely.

pub mod topic;

pub use topic::{TopicDecision, TopicDetector};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use switchboard_llm::Backend;

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::store::RecordStore;
use crate::types::{ConversationRecord, Message, Role, TopicChange};

/// The conversation-memory component.
pub struct ConversationMemory {
    store: Arc<RecordStore>,
    config: MemoryConfig,
    detector: TopicDetector,
}

impl ConversationMemory {
    /// Create the component. `semantic_backend` powers the semantic
    /// topic detector; `None` leaves only the deterministic path.
    #[must_use]
    pub fn new(
        store: Arc<RecordStore>,
        config: MemoryConfig,
        semantic_backend: Option<Arc<dyn Backend>>,
    ) -> Self {
        let detector = TopicDetector::new(semantic_backend, config.semantic_tail);
        Self {
            store,
            config,
            detector,
        }
    }

    /// Append one message to a sender's log.
    ///
    /// No-op while the conversation is disabled. User messages run
    /// topic detection first, so a shift is recorded at the index the
    /// message will occupy.
    ///
    /// # Errors
    /// Returns a store error; the router logs it and proceeds without
    /// memory for the request.
    pub async fn append(
        &self,
        sender_id: &str,
        role: Role,
        content: &str,
        model_used: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut record = self.load_or_create(sender_id, now)?;
        if !record.is_active {
            debug!(sender_id, "conversation disabled, append ignored");
            return Ok(());
        }

        if role == Role::User && !record.messages.is_empty() {
            let decision = self
                .detector
                .detect(record.current_topic.as_deref(), &record.messages, content)
                .await;
            if decision.is_topic_change {
                let new_topic = decision
                    .new_topic
                    .unwrap_or_else(|| content.trim().to_string());
                info!(sender_id, topic = %new_topic, "topic change detected");
                record.topic_changes.push(TopicChange {
                    timestamp: now,
                    message_index: record.messages.len(),
                    previous_topic: record.current_topic.take(),
                    new_topic: new_topic.clone(),
                    confidence: decision.confidence,
                });
                record.current_topic = Some(new_topic);
            }
        }

        record.messages.push(Message {
            role,
            content: content.to_string(),
            timestamp: now,
            model_used: model_used.map(String::from),
        });

        // FIFO bound: trim oldest, shifting topic-change indices with it.
        if record.messages.len() > self.config.max_messages {
            let overflow = record.messages.len() - self.config.max_messages;
            record.messages.drain(..overflow);
            for change in &mut record.topic_changes {
                change.message_index = change.message_index.saturating_sub(overflow);
            }
        }

        record.last_update = now;
        self.store.conversation_upsert(&record)?;
        debug!(sender_id, messages = record.messages.len(), "memory updated");
        Ok(())
    }

    /// Assemble the context string sent ahead of the prompt.
    ///
    /// Empty when the sender has no (live) history.
    ///
    /// # Errors
    /// Returns a store error; the router degrades to a context-free call.
    pub fn build_context(&self, sender_id: &str) -> Result<String> {
        let now = Utc::now();
        let record = self.load_or_create(sender_id, now)?;
        if record.messages.is_empty() {
            return Ok(String::new());
        }

        let live_start = record
            .live_window_start()
            .max(record.messages.len().saturating_sub(self.config.topic_window));

        let mut lines: Vec<String> = Vec::new();
        let summary = summarize_segment(
            &record.messages[..record.live_window_start()],
            self.config.summary_max_pairs,
        );
        if !summary.is_empty() {
            lines.push("Earlier in this conversation:".to_string());
            lines.extend(summary);
            lines.push(String::new());
        }
        for message in &record.messages[live_start..] {
            let speaker = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            lines.push(format!("{speaker}: {}", message.content));
        }

        let context = lines.join("\n");
        Ok(trim_to_word_budget(&context, self.config.context_word_budget))
    }

    /// Enable or disable a conversation.
    ///
    /// Disabling makes subsequent appends no-ops; re-enabling clears
    /// the stored history and starts fresh.
    ///
    /// # Errors
    /// Returns a store error.
    pub fn toggle(&self, sender_id: &str, active: bool) -> Result<()> {
        let now = Utc::now();
        let mut record = self.load_or_create(sender_id, now)?;
        if active {
            reset_content(&mut record);
        }
        record.is_active = active;
        record.last_update = now;
        self.store.conversation_upsert(&record)?;
        info!(sender_id, active, "conversation toggled");
        Ok(())
    }

    /// Explicitly reset a sender's history (keeps the record active).
    ///
    /// # Errors
    /// Returns a store error.
    pub fn clear(&self, sender_id: &str) -> Result<()> {
        let now = Utc::now();
        let mut record = self.load_or_create(sender_id, now)?;
        reset_content(&mut record);
        record.last_update = now;
        self.store.conversation_upsert(&record)?;
        info!(sender_id, "conversation cleared");
        Ok(())
    }

    /// Delete records idle longer than the configured sweep threshold.
    ///
    /// # Errors
    /// Returns a store error.
    pub fn cleanup_inactive(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.config.sweep_after_days);
        let removed = self.store.conversation_sweep_inactive(cutoff)?;
        if removed > 0 {
            info!(removed, "inactive conversations removed");
        }
        Ok(removed)
    }

    /// Read a page of a sender's stored message log.
    ///
    /// # Errors
    /// Returns a store error.
    pub fn history(&self, sender_id: &str, limit: usize, offset: usize) -> Result<Vec<Message>> {
        let record = self.load_or_create(sender_id, Utc::now())?;
        Ok(record
            .messages
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    /// Load a record, applying lazy inactivity expiry; create if absent.
    fn load_or_create(&self, sender_id: &str, now: DateTime<Utc>) -> Result<ConversationRecord> {
        match self.store.conversation_get(sender_id)? {
            Some(mut record) => {
                let idle = now - record.last_update;
                if !record.messages.is_empty()
                    && idle > Duration::minutes(self.config.reset_after_minutes)
                {
                    info!(sender_id, idle_minutes = idle.num_minutes(), "idle conversation reset");
                    reset_content(&mut record);
                    record.last_update = now;
                    self.store.conversation_upsert(&record)?;
                }
                Ok(record)
            }
            None => Ok(ConversationRecord::new(sender_id, now)),
        }
    }
}

/// Empty the message log and the topic state; activity flag untouched.
fn reset_content(record: &mut ConversationRecord) {
    record.messages.clear();
    record.current_topic = None;
    record.topic_changes.clear();
}

/// Condense a closed segment into capped question/answer pairs.
fn summarize_segment(segment: &[Message], max_pairs: usize) -> Vec<String> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut index = 0;
    while index < segment.len() {
        let message = &segment[index];
        if message.role == Role::User && message.content.trim_end().ends_with('?') {
            if let Some(answer) = segment[index + 1..]
                .iter()
                .find(|m| m.role == Role::Assistant)
            {
                pairs.push((
                    condense(&message.content),
                    condense(&answer.content),
                ));
            }
        }
        index += 1;
    }
    // Keep the most recent pairs.
    let keep = pairs.len().saturating_sub(max_pairs);
    pairs
        .into_iter()
        .skip(keep)
        .flat_map(|(question, answer)| {
            [format!("Q: {question}"), format!("A: {answer}")]
        })
        .collect()
}

/// Single-line, length-capped rendering for summaries.
fn condense(content: &str) -> String {
    let one_line = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if one_line.chars().count() <= 160 {
        return one_line;
    }
    let truncated: String = one_line.chars().take(160).collect();
    format!("{truncated}…")
}

/// Keep only the trailing `budget` words.
fn trim_to_word_budget(context: &str, budget: usize) -> String {
    let words: Vec<&str> = context.split_whitespace().collect();
    if words.len() <= budget {
        return context.to_string();
    }
    words[words.len() - budget..].join(" ")
}
