//! Persisted record shapes for the gateway.
//!
//! These are the logical shapes stored in the record store; they are not
//! tied to the storage engine. `ConversationRecord` is serialized as a
//! single JSON aggregate per sender, `CacheEntry` maps to one row per
//! prompt hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Conversation records
// ---------------------------------------------------------------------------

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human sender.
    User,
    /// The gateway's generated reply.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One exchanged message. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
    /// The backend that produced an assistant message, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

/// A detected topic shift. Append-only, never mutated or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicChange {
    /// When the shift was detected.
    pub timestamp: DateTime<Utc>,
    /// Index into the message log at which the shift occurred.
    pub message_index: usize,
    /// The topic that was active before the shift, if any.
    pub previous_topic: Option<String>,
    /// The newly active topic.
    pub new_topic: String,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Durable per-sender log of exchanged messages plus topic metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Unique conversation key (sender id).
    pub sender_id: String,
    /// Ordered message log, bounded FIFO.
    pub messages: Vec<Message>,
    /// The single currently active topic, if one has been detected.
    pub current_topic: Option<String>,
    /// Append-only log of detected topic shifts.
    pub topic_changes: Vec<TopicChange>,
    /// Whether appends are currently accepted for this conversation.
    pub is_active: bool,
    /// Last time this record was written.
    pub last_update: DateTime<Utc>,
}

impl ConversationRecord {
    /// A fresh, empty, active record for `sender_id`.
    #[must_use]
    pub fn new(sender_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            sender_id: sender_id.into(),
            messages: Vec::new(),
            current_topic: None,
            topic_changes: Vec::new(),
            is_active: true,
            last_update: now,
        }
    }

    /// Index of the first message of the live (post-topic-change) window.
    ///
    /// Zero when no topic change has ever been detected.
    #[must_use]
    pub fn live_window_start(&self) -> usize {
        self.topic_changes
            .last()
            .map_or(0, |change| change.message_index.min(self.messages.len()))
    }
}

// ---------------------------------------------------------------------------
// Cache entries
// ---------------------------------------------------------------------------

/// One cached response, keyed by the hash of the normalized prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SHA-256 hex digest of the normalized prompt.
    pub prompt_hash: String,
    /// The normalized prompt text (kept for similarity scans).
    pub prompt: String,
    /// The cached response payload.
    pub response: String,
    /// Backend that generated the response.
    pub model: String,
    /// When the entry was first stored.
    pub created_at: DateTime<Utc>,
    /// When the entry stops being served.
    pub expires_at: DateTime<Utc>,
    /// Last time the entry was served as a hit.
    pub last_accessed: DateTime<Utc>,
    /// How many times the entry has been served.
    pub hit_count: u32,
}

impl CacheEntry {
    /// Whether the entry must no longer be served at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
