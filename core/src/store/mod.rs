//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine calls store methods. The pure subsystems never see a store.
//!
//! The record-store contract is split into one trait per record family
//! (`CampaignStore`, `PollingStore`, ...). `RecordStore` is all of them plus
//! an audit sink; the engine only ever holds a `dyn RecordStore`.
//!
//! Timestamps are stored as epoch milliseconds, list-valued fields as JSON.

use crate::{
    error::SimResult,
    event::{AuditSink, EventLogEntry},
    types::Instant,
};
use chrono::{TimeZone, Utc};
use rusqlite::{params, types::Type, Connection};

mod campaign;
mod endorsement;
mod opposition;
mod polling;
mod scandal;

pub use campaign::CampaignStore;
pub use endorsement::EndorsementStore;
pub use opposition::OppositionStore;
pub use polling::PollingStore;
pub use scandal::ScandalStore;

/// Append-only audit log.
pub trait AuditLog {
    fn insert_run(&self, run_id: &str, started_at: Instant, version: &str) -> SimResult<()>;
    fn append_event(&self, entry: &EventLogEntry) -> SimResult<()>;
    fn events_for_player(&self, run_id: &str, player_id: &str) -> SimResult<Vec<EventLogEntry>>;
}

/// Everything the engine needs from persistence.
pub trait RecordStore:
    AuditLog + AuditSink + CampaignStore + PollingStore + EndorsementStore + ScandalStore + OppositionStore
{
}

impl<T> RecordStore for T where
    T: AuditLog + AuditSink + CampaignStore + PollingStore + EndorsementStore + ScandalStore + OppositionStore
{
}

pub struct SimStore {
    conn: Connection,
}

impl SimStore {
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_campaign.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_polling.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_endorsements.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/005_scandals.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/006_opposition.sql"))?;
        Ok(())
    }

    /// In-memory store with the schema applied.
    pub fn in_memory_migrated() -> SimResult<Self> {
        let store = Self::in_memory()?;
        store.migrate()?;
        Ok(store)
    }
}

impl AuditLog for SimStore {
    fn insert_run(&self, run_id: &str, started_at: Instant, version: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO run (run_id, started_at, version) VALUES (?1, ?2, ?3)",
            params![run_id, to_ms(started_at), version],
        )?;
        Ok(())
    }

    fn append_event(&self, entry: &EventLogEntry) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, player_id, occurred_at, subsystem, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.run_id,
                entry.player_id,
                to_ms(entry.occurred_at),
                entry.subsystem,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    fn events_for_player(&self, run_id: &str, player_id: &str) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, player_id, occurred_at, subsystem, event_type, payload
             FROM event_log WHERE run_id = ?1 AND player_id = ?2
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id, player_id], |row| {
                Ok(EventLogEntry {
                    id:          Some(row.get(0)?),
                    run_id:      row.get(1)?,
                    player_id:   row.get(2)?,
                    occurred_at: from_ms(3, row.get(3)?)?,
                    subsystem:   row.get(4)?,
                    event_type:  row.get(5)?,
                    payload:     row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

impl AuditSink for SimStore {
    fn emit(&self, entry: &EventLogEntry) {
        if let Err(e) = self.append_event(entry) {
            log::warn!("audit: dropped {} event: {e}", entry.event_type);
        }
    }
}

// ── Column helpers ───────────────────────────────────────────────────────────

pub(crate) fn to_ms(at: Instant) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_ms(idx: usize, ms: i64) -> rusqlite::Result<Instant> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {ms} out of range").into(),
        )
    })
}

pub(crate) fn opt_from_ms(idx: usize, ms: Option<i64>) -> rusqlite::Result<Option<Instant>> {
    ms.map(|v| from_ms(idx, v)).transpose()
}

/// Lift a domain parse error (bad enum tag) into a column conversion error.
pub(crate) fn parse_col<T>(idx: usize, parsed: SimResult<T>) -> rusqlite::Result<T> {
    parsed.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn json_col<T: serde::de::DeserializeOwned>(idx: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
