//! Store methods for scandals.

use crate::{
    error::{SimError, SimResult},
    scandal_subsystem::{ScandalCategory, ScandalRecord, ScandalStatus},
};
use rusqlite::{params, OptionalExtension, Row};

use super::{from_ms, json_col, opt_from_ms, parse_col, to_ms, SimStore};

pub trait ScandalStore {
    fn insert_scandal(&self, record: &ScandalRecord) -> SimResult<()>;
    /// Overwrite the mutable columns (status, timestamps, rate, mitigations).
    fn update_scandal(&self, record: &ScandalRecord) -> SimResult<()>;
    fn scandal(&self, scandal_id: &str) -> SimResult<Option<ScandalRecord>>;
    /// Every scandal for the player, oldest first.
    fn scandals_for(&self, player_id: &str) -> SimResult<Vec<ScandalRecord>>;
}

const COLUMNS: &str = "scandal_id, player_id, category, severity, status, discovered_at,
     contained_at, resolved_at, reputation_hit, recovery_rate_per_hour, mitigations_json";

fn map_scandal(row: &Row<'_>) -> rusqlite::Result<ScandalRecord> {
    let category: String = row.get(2)?;
    let status: String = row.get(4)?;
    let mitigations: String = row.get(10)?;
    Ok(ScandalRecord {
        scandal_id:             row.get(0)?,
        player_id:              row.get(1)?,
        category:               parse_col(2, ScandalCategory::parse(&category))?,
        severity:               row.get(3)?,
        status:                 parse_col(4, ScandalStatus::parse(&status))?,
        discovered_at:          from_ms(5, row.get(5)?)?,
        contained_at:           opt_from_ms(6, row.get(6)?)?,
        resolved_at:            opt_from_ms(7, row.get(7)?)?,
        reputation_hit:         row.get(8)?,
        recovery_rate_per_hour: row.get(9)?,
        mitigations:            json_col(10, &mitigations)?,
    })
}

impl ScandalStore for SimStore {
    fn insert_scandal(&self, r: &ScandalRecord) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO scandal (
                scandal_id, player_id, category, severity, status, discovered_at,
                contained_at, resolved_at, reputation_hit, recovery_rate_per_hour, mitigations_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &r.scandal_id,
                &r.player_id,
                r.category.as_str(),
                r.severity,
                r.status.as_str(),
                to_ms(r.discovered_at),
                r.contained_at.map(to_ms),
                r.resolved_at.map(to_ms),
                r.reputation_hit,
                r.recovery_rate_per_hour,
                serde_json::to_string(&r.mitigations)?,
            ],
        )?;
        Ok(())
    }

    fn update_scandal(&self, r: &ScandalRecord) -> SimResult<()> {
        let changed = self.conn.execute(
            "UPDATE scandal SET
                status = ?2, contained_at = ?3, resolved_at = ?4,
                recovery_rate_per_hour = ?5, mitigations_json = ?6
             WHERE scandal_id = ?1",
            params![
                &r.scandal_id,
                r.status.as_str(),
                r.contained_at.map(to_ms),
                r.resolved_at.map(to_ms),
                r.recovery_rate_per_hour,
                serde_json::to_string(&r.mitigations)?,
            ],
        )?;
        if changed == 0 {
            return Err(SimError::not_found("scandal", &r.scandal_id));
        }
        Ok(())
    }

    fn scandal(&self, scandal_id: &str) -> SimResult<Option<ScandalRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM scandal WHERE scandal_id = ?1");
        let record = self
            .conn
            .query_row(&sql, params![scandal_id], map_scandal)
            .optional()?;
        Ok(record)
    }

    fn scandals_for(&self, player_id: &str) -> SimResult<Vec<ScandalRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM scandal WHERE player_id = ?1
             ORDER BY discovered_at ASC, rowid ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![player_id], map_scandal)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
