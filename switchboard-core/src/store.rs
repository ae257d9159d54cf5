//! SQLite record store for the gateway.
//!
//! Both persisted aggregates live in one database. The schema is
//! intentionally simple:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS response_cache (
//!     prompt_hash   TEXT PRIMARY KEY,
//!     prompt        TEXT NOT NULL,
//!     response      TEXT NOT NULL,
//!     model         TEXT NOT NULL,
//!     created_at    TEXT NOT NULL,
//!     expires_at    TEXT NOT NULL,
//!     last_accessed TEXT NOT NULL,
//!     hit_count     INTEGER NOT NULL
//! );
//! CREATE TABLE IF NOT EXISTS conversation_memory (
//!     sender_id   TEXT PRIMARY KEY,
//!     record      BLOB NOT NULL,
//!     last_update TEXT NOT NULL
//! );
//! ```
//!
//! - WAL mode for concurrent reads while a request writes.
//! - The conversation aggregate is JSON inside a BLOB column, which
//!   keeps the schema stable as the record shape evolves.
//! - Every write is an atomic per-key upsert; concurrent requests for
//!   the same key are last-writer-wins by design.
//!
//! Timestamps are RFC 3339 UTC strings, so lexicographic comparison in
//! SQL predicates matches chronological order.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{GatewayError, Result};
use crate::types::{CacheEntry, ConversationRecord};

/// Handle to the open SQLite database behind cache and memory.
pub struct RecordStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

/// Raw `response_cache` row before timestamp parsing.
type RawCacheRow = (String, String, String, String, String, String, String, u32);

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GatewayError::Serialization(format!("bad timestamp '{raw}': {e}")))
}

impl RecordStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;
        Self::init(conn, config, db_path)
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, &StoreConfig { wal_mode: false }, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, config: &StoreConfig, db_path: PathBuf) -> Result<Self> {
        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS response_cache (
                prompt_hash   TEXT PRIMARY KEY,
                prompt        TEXT NOT NULL,
                response      TEXT NOT NULL,
                model         TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                expires_at    TEXT NOT NULL,
                last_accessed TEXT NOT NULL,
                hit_count     INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS conversation_memory (
                sender_id   TEXT PRIMARY KEY,
                record      BLOB NOT NULL,
                last_update TEXT NOT NULL
            );",
        )?;

        info!(path = %db_path.display(), wal = config.wal_mode, "record store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    // -----------------------------------------------------------------------
    // response_cache
    // -----------------------------------------------------------------------

    /// Select one cache entry by hash.
    ///
    /// # Errors
    /// Returns [`GatewayError::Store`] on SQLite failures.
    pub fn cache_get(&self, prompt_hash: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT prompt_hash, prompt, response, model,
                        created_at, expires_at, last_accessed, hit_count
                 FROM response_cache WHERE prompt_hash = ?1",
                params![prompt_hash],
                Self::cache_row,
            )
            .optional()?;
        row.map(Self::cache_entry_from_raw).transpose()
    }

    /// Upsert a cache entry keyed by its hash.
    ///
    /// # Errors
    /// Returns [`GatewayError::Store`] on SQLite failures.
    pub fn cache_upsert(&self, entry: &CacheEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO response_cache
                (prompt_hash, prompt, response, model,
                 created_at, expires_at, last_accessed, hit_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(prompt_hash) DO UPDATE SET
                prompt = excluded.prompt,
                response = excluded.response,
                model = excluded.model,
                expires_at = excluded.expires_at,
                last_accessed = excluded.last_accessed,
                hit_count = excluded.hit_count",
            params![
                entry.prompt_hash,
                entry.prompt,
                entry.response,
                entry.model,
                entry.created_at.to_rfc3339(),
                entry.expires_at.to_rfc3339(),
                entry.last_accessed.to_rfc3339(),
                entry.hit_count,
            ],
        )?;
        Ok(())
    }

    /// Record a cache hit: bump `hit_count`, refresh `last_accessed`.
    ///
    /// # Errors
    /// Returns [`GatewayError::Store`] on SQLite failures.
    pub fn cache_touch(&self, prompt_hash: &str, accessed_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE response_cache
             SET hit_count = hit_count + 1, last_accessed = ?2
             WHERE prompt_hash = ?1",
            params![prompt_hash, accessed_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Select every entry that is still live at `now` (similarity scan).
    ///
    /// # Errors
    /// Returns [`GatewayError::Store`] on SQLite failures.
    pub fn cache_scan_live(&self, now: DateTime<Utc>) -> Result<Vec<CacheEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT prompt_hash, prompt, response, model,
                    created_at, expires_at, last_accessed, hit_count
             FROM response_cache WHERE expires_at > ?1",
        )?;
        let rows = stmt.query_map(params![now.to_rfc3339()], Self::cache_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(Self::cache_entry_from_raw(row?)?);
        }
        Ok(entries)
    }

    /// Delete every entry expired at `now`; returns how many were removed.
    ///
    /// # Errors
    /// Returns [`GatewayError::Store`] on SQLite failures.
    pub fn cache_sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM response_cache WHERE expires_at <= ?1",
            params![now.to_rfc3339()],
        )?;
        debug!(removed, "cache sweep");
        Ok(removed)
    }

    fn cache_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCacheRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn cache_entry_from_raw(raw: RawCacheRow) -> Result<CacheEntry> {
        let (prompt_hash, prompt, response, model, created_at, expires_at, last_accessed, hit_count) =
            raw;
        Ok(CacheEntry {
            prompt_hash,
            prompt,
            response,
            model,
            created_at: parse_ts(&created_at)?,
            expires_at: parse_ts(&expires_at)?,
            last_accessed: parse_ts(&last_accessed)?,
            hit_count,
        })
    }

    // -----------------------------------------------------------------------
    // conversation_memory
    // -----------------------------------------------------------------------

    /// Select one conversation record by sender id.
    ///
    /// # Errors
    /// Returns [`GatewayError::Store`] on SQLite failures and
    /// [`GatewayError::Serialization`] if the stored JSON is corrupt.
    pub fn conversation_get(&self, sender_id: &str) -> Result<Option<ConversationRecord>> {
        let conn = self.conn.lock();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT record FROM conversation_memory WHERE sender_id = ?1",
                params![sender_id],
                |row| row.get(0),
            )
            .optional()?;
        blob.map(|bytes| {
            serde_json::from_slice(&bytes)
                .map_err(|e| GatewayError::Serialization(format!("conversation record: {e}")))
        })
        .transpose()
    }

    /// Upsert a conversation record keyed by sender id.
    ///
    /// # Errors
    /// Returns [`GatewayError::Store`] on SQLite failures and
    /// [`GatewayError::Serialization`] if the record cannot be encoded.
    pub fn conversation_upsert(&self, record: &ConversationRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| GatewayError::Serialization(format!("conversation record: {e}")))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversation_memory (sender_id, record, last_update)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(sender_id) DO UPDATE SET
                record = excluded.record,
                last_update = excluded.last_update",
            params![record.sender_id, bytes, record.last_update.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete one conversation record; returns whether it existed.
    ///
    /// # Errors
    /// Returns [`GatewayError::Store`] on SQLite failures.
    pub fn conversation_delete(&self, sender_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM conversation_memory WHERE sender_id = ?1",
            params![sender_id],
        )?;
        Ok(removed > 0)
    }

    /// Delete records idle since before `cutoff`; returns how many.
    ///
    /// # Errors
    /// Returns [`GatewayError::Store`] on SQLite failures.
    pub fn conversation_sweep_inactive(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM conversation_memory WHERE last_update < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        debug!(removed, "conversation sweep");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::types::{Message, Role};

    fn entry(hash: &str, expires_in: Duration) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            prompt_hash: hash.to_string(),
            prompt: "qual e a capital do brasil".to_string(),
            response: "Brasília.".to_string(),
            model: "gemini".to_string(),
            created_at: now,
            expires_at: now + expires_in,
            last_accessed: now,
            hit_count: 0,
        }
    }

    #[test]
    fn cache_upsert_and_get_round_trip() {
        let store = RecordStore::open_in_memory().expect("open");
        store.cache_upsert(&entry("h1", Duration::hours(1))).expect("upsert");

        let loaded = store.cache_get("h1").expect("get").expect("present");
        assert_eq!(loaded.response, "Brasília.");
        assert_eq!(loaded.hit_count, 0);
        assert!(store.cache_get("h2").expect("get").is_none());
    }

    #[test]
    fn cache_touch_bumps_hit_count() {
        let store = RecordStore::open_in_memory().expect("open");
        store.cache_upsert(&entry("h1", Duration::hours(1))).expect("upsert");

        store.cache_touch("h1", Utc::now()).expect("touch");
        store.cache_touch("h1", Utc::now()).expect("touch");
        let loaded = store.cache_get("h1").expect("get").expect("present");
        assert_eq!(loaded.hit_count, 2);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let store = RecordStore::open_in_memory().expect("open");
        store.cache_upsert(&entry("live", Duration::hours(1))).expect("upsert");
        store.cache_upsert(&entry("dead", Duration::hours(-1))).expect("upsert");

        let removed = store.cache_sweep_expired(Utc::now()).expect("sweep");
        assert_eq!(removed, 1);
        assert!(store.cache_get("live").expect("get").is_some());
        assert!(store.cache_get("dead").expect("get").is_none());
    }

    #[test]
    fn conversation_round_trip_and_sweep() {
        let store = RecordStore::open_in_memory().expect("open");
        let mut record = ConversationRecord::new("5511999", Utc::now());
        record.messages.push(Message {
            role: Role::User,
            content: "Oi".to_string(),
            timestamp: Utc::now(),
            model_used: None,
        });
        store.conversation_upsert(&record).expect("upsert");

        let loaded = store
            .conversation_get("5511999")
            .expect("get")
            .expect("present");
        assert_eq!(loaded.messages.len(), 1);
        assert!(loaded.is_active);

        // Sweep with a cutoff in the future removes the idle record.
        let removed = store
            .conversation_sweep_inactive(Utc::now() + Duration::hours(1))
            .expect("sweep");
        assert_eq!(removed, 1);
        assert!(store.conversation_get("5511999").expect("get").is_none());
    }

    #[test]
    fn conversation_delete_reports_existence() {
        let store = RecordStore::open_in_memory().expect("open");
        let record = ConversationRecord::new("a", Utc::now());
        store.conversation_upsert(&record).expect("upsert");
        assert!(store.conversation_delete("a").expect("delete"));
        assert!(!store.conversation_delete("a").expect("delete"));
    }
}
