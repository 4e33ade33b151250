//! Store methods for endorsements.

use crate::{
    endorsement_subsystem::{EndorsementCategory, EndorsementRecord, EndorsementTier},
    error::SimResult,
    types::RecordId,
};
use rusqlite::{params, OptionalExtension, Row};

use super::{from_ms, opt_from_ms, parse_col, to_ms, SimStore};

pub trait EndorsementStore {
    /// Insert the record and bump the cumulative category tally.
    fn insert_endorsement(&self, record: &EndorsementRecord) -> SimResult<()>;
    /// Every stored record, active or expired, oldest first.
    fn endorsements_for(&self, player_id: &str) -> SimResult<Vec<EndorsementRecord>>;
    /// Lifetime same-category acquisitions, including swept records.
    fn endorsement_tally(&self, player_id: &str, category: EndorsementCategory) -> SimResult<usize>;
    /// Overwrite the lifetime tally, e.g. when restoring a snapshot.
    fn set_endorsement_tally(&self, player_id: &str, category: EndorsementCategory, acquired: usize) -> SimResult<()>;
    fn delete_endorsements(&self, ids: &[RecordId]) -> SimResult<usize>;
}

fn map_endorsement(row: &Row<'_>) -> rusqlite::Result<EndorsementRecord> {
    let category: String = row.get(2)?;
    let tier: String = row.get(3)?;
    Ok(EndorsementRecord {
        endorsement_id:     row.get(0)?,
        player_id:          row.get(1)?,
        category:           parse_col(2, EndorsementCategory::parse(&category))?,
        tier:               parse_col(3, EndorsementTier::parse(&tier))?,
        acquired_at:        from_ms(4, row.get(4)?)?,
        expires_at:         opt_from_ms(5, row.get(5)?)?,
        diminishing_factor: row.get(6)?,
        influence_bonus:    row.get(7)?,
        fundraising_bonus:  row.get(8)?,
    })
}

impl EndorsementStore for SimStore {
    fn insert_endorsement(&self, r: &EndorsementRecord) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO endorsement (
                endorsement_id, player_id, category, tier, acquired_at, expires_at,
                diminishing_factor, influence_bonus, fundraising_bonus
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &r.endorsement_id,
                &r.player_id,
                r.category.as_str(),
                r.tier.as_str(),
                to_ms(r.acquired_at),
                r.expires_at.map(to_ms),
                r.diminishing_factor,
                r.influence_bonus,
                r.fundraising_bonus,
            ],
        )?;
        self.conn.execute(
            "INSERT INTO endorsement_tally (player_id, category, acquired) VALUES (?1, ?2, 1)
             ON CONFLICT (player_id, category) DO UPDATE SET acquired = acquired + 1",
            params![&r.player_id, r.category.as_str()],
        )?;
        Ok(())
    }

    fn endorsements_for(&self, player_id: &str) -> SimResult<Vec<EndorsementRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT endorsement_id, player_id, category, tier, acquired_at, expires_at,
                    diminishing_factor, influence_bonus, fundraising_bonus
             FROM endorsement WHERE player_id = ?1
             ORDER BY acquired_at ASC, rowid ASC",
        )?;
        let records = stmt
            .query_map(params![player_id], map_endorsement)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn endorsement_tally(&self, player_id: &str, category: EndorsementCategory) -> SimResult<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT acquired FROM endorsement_tally WHERE player_id = ?1 AND category = ?2",
                params![player_id, category.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        Ok(count.max(0) as usize)
    }

    fn set_endorsement_tally(&self, player_id: &str, category: EndorsementCategory, acquired: usize) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO endorsement_tally (player_id, category, acquired) VALUES (?1, ?2, ?3)
             ON CONFLICT (player_id, category) DO UPDATE SET acquired = excluded.acquired",
            params![player_id, category.as_str(), acquired as i64],
        )?;
        Ok(())
    }

    fn delete_endorsements(&self, ids: &[RecordId]) -> SimResult<usize> {
        let mut stmt = self
            .conn
            .prepare("DELETE FROM endorsement WHERE endorsement_id = ?1")?;
        let mut removed = 0;
        for id in ids {
            removed += stmt.execute(params![id])?;
        }
        Ok(removed)
    }
}
