//! Store methods for polling snapshots.

use crate::{error::SimResult, polling_subsystem::PollingSnapshot, types::Instant};
use rusqlite::{params, OptionalExtension, Row};

use super::{from_ms, to_ms, SimStore};

pub trait PollingStore {
    fn insert_polling_snapshot(&self, snapshot: &PollingSnapshot) -> SimResult<()>;
    fn latest_polling_snapshot(&self, player_id: &str) -> SimResult<Option<PollingSnapshot>>;
    /// Snapshots captured in `[from, to]`, oldest first.
    fn polling_snapshots_between(
        &self,
        player_id: &str,
        from: Instant,
        to: Instant,
    ) -> SimResult<Vec<PollingSnapshot>>;
    /// Every player's most recent snapshot.
    fn latest_polling_all(&self) -> SimResult<Vec<PollingSnapshot>>;
}

const COLUMNS: &str = "player_id, captured_at, sample_size, base_support, volatility_delta,
     smoothing_delta, final_support, margin_of_error, reputation, seed";

fn map_snapshot(row: &Row<'_>) -> rusqlite::Result<PollingSnapshot> {
    Ok(PollingSnapshot {
        player_id:        row.get(0)?,
        captured_at:      from_ms(1, row.get(1)?)?,
        sample_size:      row.get(2)?,
        base_support:     row.get(3)?,
        volatility_delta: row.get(4)?,
        smoothing_delta:  row.get(5)?,
        final_support:    row.get(6)?,
        margin_of_error:  row.get(7)?,
        reputation:       row.get(8)?,
        seed:             row.get(9)?,
    })
}

impl PollingStore for SimStore {
    fn insert_polling_snapshot(&self, s: &PollingSnapshot) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO polling_snapshot (
                player_id, captured_at, sample_size, base_support, volatility_delta,
                smoothing_delta, final_support, margin_of_error, reputation, seed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &s.player_id,
                to_ms(s.captured_at),
                s.sample_size,
                s.base_support,
                s.volatility_delta,
                s.smoothing_delta,
                s.final_support,
                s.margin_of_error,
                s.reputation,
                &s.seed,
            ],
        )?;
        Ok(())
    }

    fn latest_polling_snapshot(&self, player_id: &str) -> SimResult<Option<PollingSnapshot>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM polling_snapshot WHERE player_id = ?1
             ORDER BY captured_at DESC, id DESC LIMIT 1"
        );
        let snapshot = self
            .conn
            .query_row(&sql, params![player_id], map_snapshot)
            .optional()?;
        Ok(snapshot)
    }

    fn polling_snapshots_between(
        &self,
        player_id: &str,
        from: Instant,
        to: Instant,
    ) -> SimResult<Vec<PollingSnapshot>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM polling_snapshot
             WHERE player_id = ?1 AND captured_at BETWEEN ?2 AND ?3
             ORDER BY captured_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let snapshots = stmt
            .query_map(params![player_id, to_ms(from), to_ms(to)], map_snapshot)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    fn latest_polling_all(&self) -> SimResult<Vec<PollingSnapshot>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM polling_snapshot p
             WHERE p.id = (SELECT id FROM polling_snapshot
                           WHERE player_id = p.player_id
                           ORDER BY captured_at DESC, id DESC LIMIT 1)
             ORDER BY p.player_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let snapshots = stmt
            .query_map([], map_snapshot)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }
}
