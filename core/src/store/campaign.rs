//! Store methods for campaign cycles.

use crate::{
    error::{SimError, SimResult},
    phase_subsystem::{CampaignPhase, CampaignPhaseState, DifficultyIndices},
    types::PlayerId,
};
use rusqlite::{params, OptionalExtension, Row};

use super::{from_ms, json_col, parse_col, to_ms, SimStore};

pub trait CampaignStore {
    fn insert_campaign_state(&self, state: &CampaignPhaseState) -> SimResult<()>;
    /// Write `state` if the stored version still equals `state.version`.
    /// Returns the state carrying its new version.
    fn update_campaign_state(&self, state: &CampaignPhaseState) -> SimResult<CampaignPhaseState>;
    /// The player's newest cycle.
    fn latest_campaign_state(&self, player_id: &str) -> SimResult<Option<CampaignPhaseState>>;
    /// Players whose newest cycle is still running or paused.
    fn live_players(&self) -> SimResult<Vec<PlayerId>>;
}

const COLUMNS: &str = "player_id, cycle, active_phase, phase_started_at, phase_ends_at,
     spend_pressure, volatility_modifier, engagement_saturation,
     funds_raised, funds_spent, endorsements_acquired, active_scandals,
     reputation, debate_submitted, seed, machine_json, version, support_shift";

fn map_state(row: &Row<'_>) -> rusqlite::Result<CampaignPhaseState> {
    let phase: String = row.get(2)?;
    let machine_json: String = row.get(15)?;
    Ok(CampaignPhaseState {
        player_id:             row.get(0)?,
        cycle:                 row.get(1)?,
        active_phase:          parse_col(2, CampaignPhase::parse(&phase))?,
        phase_started_at:      from_ms(3, row.get(3)?)?,
        phase_ends_at:         from_ms(4, row.get(4)?)?,
        difficulty: DifficultyIndices {
            spend_pressure:        row.get(5)?,
            volatility_modifier:   row.get(6)?,
            engagement_saturation: row.get(7)?,
        },
        funds_raised:          row.get(8)?,
        funds_spent:           row.get(9)?,
        endorsements_acquired: row.get(10)?,
        active_scandals:       row.get(11)?,
        reputation:            row.get(12)?,
        support_shift:         row.get(17)?,
        debate_submitted:      row.get(13)?,
        seed:                  row.get(14)?,
        machine:               json_col(15, &machine_json)?,
        version:               row.get(16)?,
    })
}

impl CampaignStore for SimStore {
    fn insert_campaign_state(&self, s: &CampaignPhaseState) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO campaign_state (
                player_id, cycle, active_phase, phase_started_at, phase_ends_at,
                spend_pressure, volatility_modifier, engagement_saturation,
                funds_raised, funds_spent, endorsements_acquired, active_scandals,
                reputation, debate_submitted, seed, status, machine_json, version,
                support_shift
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                &s.player_id,
                s.cycle,
                s.active_phase.as_str(),
                to_ms(s.phase_started_at),
                to_ms(s.phase_ends_at),
                s.difficulty.spend_pressure,
                s.difficulty.volatility_modifier,
                s.difficulty.engagement_saturation,
                s.funds_raised,
                s.funds_spent,
                s.endorsements_acquired,
                s.active_scandals,
                s.reputation,
                s.debate_submitted,
                &s.seed,
                s.machine.status.as_str(),
                serde_json::to_string(&s.machine)?,
                s.version,
                s.support_shift,
            ],
        )?;
        Ok(())
    }

    fn update_campaign_state(&self, s: &CampaignPhaseState) -> SimResult<CampaignPhaseState> {
        let changed = self.conn.execute(
            "UPDATE campaign_state SET
                active_phase = ?3, phase_started_at = ?4, phase_ends_at = ?5,
                funds_raised = ?6, funds_spent = ?7, endorsements_acquired = ?8,
                active_scandals = ?9, reputation = ?10, debate_submitted = ?11,
                status = ?12, machine_json = ?13, support_shift = ?15, version = version + 1
             WHERE player_id = ?1 AND cycle = ?2 AND version = ?14",
            params![
                &s.player_id,
                s.cycle,
                s.active_phase.as_str(),
                to_ms(s.phase_started_at),
                to_ms(s.phase_ends_at),
                s.funds_raised,
                s.funds_spent,
                s.endorsements_acquired,
                s.active_scandals,
                s.reputation,
                s.debate_submitted,
                s.machine.status.as_str(),
                serde_json::to_string(&s.machine)?,
                s.version,
                s.support_shift,
            ],
        )?;
        if changed == 0 {
            return Err(SimError::VersionConflict {
                player_id: s.player_id.clone(),
                expected:  s.version,
            });
        }
        Ok(CampaignPhaseState {
            version: s.version + 1,
            ..s.clone()
        })
    }

    fn latest_campaign_state(&self, player_id: &str) -> SimResult<Option<CampaignPhaseState>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM campaign_state WHERE player_id = ?1 ORDER BY cycle DESC LIMIT 1"
        );
        let state = self
            .conn
            .query_row(&sql, params![player_id], map_state)
            .optional()?;
        Ok(state)
    }

    fn live_players(&self) -> SimResult<Vec<PlayerId>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.player_id FROM campaign_state c
             WHERE c.cycle = (SELECT MAX(cycle) FROM campaign_state WHERE player_id = c.player_id)
               AND c.status IN ('running', 'paused')
             ORDER BY c.player_id ASC",
        )?;
        let players = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(players)
    }
}
