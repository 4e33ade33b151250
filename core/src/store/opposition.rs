//! Store methods for opposition research, negative ads, counter ads and
//! influence history.

use crate::{
    error::{SimError, SimResult},
    fairness_subsystem::InfluenceSnapshot,
    negative_ad_subsystem::{CounterAd, NegativeAd},
    opposition_subsystem::{OppositionResearch, ResearchStatus, ResearchType},
    spend::SpendTier,
    types::Instant,
};
use rusqlite::{params, OptionalExtension, Row};

use super::{from_ms, json_col, opt_from_ms, parse_col, to_ms, SimStore};

pub trait OppositionStore {
    // ── Research ──────────────────────────────────
    fn insert_research(&self, research: &OppositionResearch) -> SimResult<()>;
    fn update_research(&self, research: &OppositionResearch) -> SimResult<()>;
    fn research(&self, research_id: &str) -> SimResult<Option<OppositionResearch>>;
    fn research_for(&self, player_id: &str) -> SimResult<Vec<OppositionResearch>>;
    /// In-progress jobs whose completion time has passed.
    fn research_due(&self, now: Instant) -> SimResult<Vec<OppositionResearch>>;

    // ── Negative ads ──────────────────────────────
    fn insert_negative_ad(&self, ad: &NegativeAd) -> SimResult<()>;
    fn negative_ad(&self, ad_id: &str) -> SimResult<Option<NegativeAd>>;
    fn negative_ads_by(&self, player_id: &str) -> SimResult<Vec<NegativeAd>>;
    fn negative_ads_against(&self, target_id: &str) -> SimResult<Vec<NegativeAd>>;
    fn insert_counter_ad(&self, counter: &CounterAd) -> SimResult<()>;
    fn counters_for(&self, ad_id: &str) -> SimResult<Vec<CounterAd>>;

    // ── Influence ─────────────────────────────────
    fn insert_influence_snapshot(&self, snapshot: &InfluenceSnapshot) -> SimResult<()>;
    fn latest_influence_snapshot(&self, player_id: &str) -> SimResult<Option<InfluenceSnapshot>>;
}

const RESEARCH_COLUMNS: &str = "research_id, player_id, target_id, research_type, spend_tier,
     amount_spent, prior_attempts, started_at, completes_at, completed_at, status,
     discovery_json, seed";

fn map_research(row: &Row<'_>) -> rusqlite::Result<OppositionResearch> {
    let research_type: String = row.get(3)?;
    let tier: String = row.get(4)?;
    let status: String = row.get(10)?;
    let discovery: Option<String> = row.get(11)?;
    Ok(OppositionResearch {
        research_id:    row.get(0)?,
        player_id:      row.get(1)?,
        target_id:      row.get(2)?,
        research_type:  parse_col(3, ResearchType::parse(&research_type))?,
        spend_tier:     parse_col(4, SpendTier::parse(&tier))?,
        amount_spent:   row.get(5)?,
        prior_attempts: row.get(6)?,
        started_at:     from_ms(7, row.get(7)?)?,
        completes_at:   from_ms(8, row.get(8)?)?,
        completed_at:   opt_from_ms(9, row.get(9)?)?,
        status:         parse_col(10, ResearchStatus::parse(&status))?,
        discovery:      discovery.map(|d| json_col(11, &d)).transpose()?,
        seed:           row.get(12)?,
    })
}

fn map_ad(row: &Row<'_>) -> rusqlite::Result<NegativeAd> {
    let json: String = row.get(0)?;
    json_col(0, &json)
}

fn map_counter(row: &Row<'_>) -> rusqlite::Result<CounterAd> {
    Ok(CounterAd {
        counter_id:   row.get(0)?,
        ad_id:        row.get(1)?,
        player_id:    row.get(2)?,
        amount_spent: row.get(3)?,
        reduction:    row.get(4)?,
        countered_at: from_ms(5, row.get(5)?)?,
    })
}

impl SimStore {
    fn query_research(&self, sql: &str, args: impl rusqlite::Params) -> SimResult<Vec<OppositionResearch>> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(args, map_research)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn query_ads(&self, sql: &str, args: impl rusqlite::Params) -> SimResult<Vec<NegativeAd>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ads = stmt
            .query_map(args, map_ad)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ads)
    }
}

impl OppositionStore for SimStore {
    fn insert_research(&self, r: &OppositionResearch) -> SimResult<()> {
        let discovery = r.discovery.as_ref().map(serde_json::to_string).transpose()?;
        self.conn.execute(
            "INSERT INTO opposition_research (
                research_id, player_id, target_id, research_type, spend_tier, amount_spent,
                prior_attempts, started_at, completes_at, completed_at, status, discovery_json, seed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                &r.research_id,
                &r.player_id,
                &r.target_id,
                r.research_type.as_str(),
                r.spend_tier.as_str(),
                r.amount_spent,
                r.prior_attempts,
                to_ms(r.started_at),
                to_ms(r.completes_at),
                r.completed_at.map(to_ms),
                r.status.as_str(),
                discovery,
                &r.seed,
            ],
        )?;
        Ok(())
    }

    fn update_research(&self, r: &OppositionResearch) -> SimResult<()> {
        let discovery = r.discovery.as_ref().map(serde_json::to_string).transpose()?;
        let changed = self.conn.execute(
            "UPDATE opposition_research SET status = ?2, completed_at = ?3, discovery_json = ?4
             WHERE research_id = ?1",
            params![
                &r.research_id,
                r.status.as_str(),
                r.completed_at.map(to_ms),
                discovery,
            ],
        )?;
        if changed == 0 {
            return Err(SimError::not_found("research", &r.research_id));
        }
        Ok(())
    }

    fn research(&self, research_id: &str) -> SimResult<Option<OppositionResearch>> {
        let sql = format!("SELECT {RESEARCH_COLUMNS} FROM opposition_research WHERE research_id = ?1");
        let record = self
            .conn
            .query_row(&sql, params![research_id], map_research)
            .optional()?;
        Ok(record)
    }

    fn research_for(&self, player_id: &str) -> SimResult<Vec<OppositionResearch>> {
        let sql = format!(
            "SELECT {RESEARCH_COLUMNS} FROM opposition_research WHERE player_id = ?1
             ORDER BY started_at ASC, rowid ASC"
        );
        self.query_research(&sql, params![player_id])
    }

    fn research_due(&self, now: Instant) -> SimResult<Vec<OppositionResearch>> {
        let sql = format!(
            "SELECT {RESEARCH_COLUMNS} FROM opposition_research
             WHERE status = 'in_progress' AND completes_at <= ?1
             ORDER BY completes_at ASC, rowid ASC"
        );
        self.query_research(&sql, params![to_ms(now)])
    }

    fn insert_negative_ad(&self, ad: &NegativeAd) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO negative_ad (ad_id, player_id, target_id, launched_at, ad_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &ad.ad_id,
                &ad.player_id,
                &ad.target_id,
                to_ms(ad.launched_at),
                serde_json::to_string(ad)?,
            ],
        )?;
        Ok(())
    }

    fn negative_ad(&self, ad_id: &str) -> SimResult<Option<NegativeAd>> {
        let ad = self
            .conn
            .query_row(
                "SELECT ad_json FROM negative_ad WHERE ad_id = ?1",
                params![ad_id],
                map_ad,
            )
            .optional()?;
        Ok(ad)
    }

    fn negative_ads_by(&self, player_id: &str) -> SimResult<Vec<NegativeAd>> {
        self.query_ads(
            "SELECT ad_json FROM negative_ad WHERE player_id = ?1
             ORDER BY launched_at ASC, rowid ASC",
            params![player_id],
        )
    }

    fn negative_ads_against(&self, target_id: &str) -> SimResult<Vec<NegativeAd>> {
        self.query_ads(
            "SELECT ad_json FROM negative_ad WHERE target_id = ?1
             ORDER BY launched_at ASC, rowid ASC",
            params![target_id],
        )
    }

    fn insert_counter_ad(&self, c: &CounterAd) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO counter_ad (counter_id, ad_id, player_id, amount_spent, reduction, countered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &c.counter_id,
                &c.ad_id,
                &c.player_id,
                c.amount_spent,
                c.reduction,
                to_ms(c.countered_at),
            ],
        )?;
        Ok(())
    }

    fn counters_for(&self, ad_id: &str) -> SimResult<Vec<CounterAd>> {
        let mut stmt = self.conn.prepare(
            "SELECT counter_id, ad_id, player_id, amount_spent, reduction, countered_at
             FROM counter_ad WHERE ad_id = ?1
             ORDER BY countered_at ASC, rowid ASC",
        )?;
        let counters = stmt
            .query_map(params![ad_id], map_counter)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counters)
    }

    fn insert_influence_snapshot(&self, s: &InfluenceSnapshot) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO influence_snapshot (player_id, total, computed_at) VALUES (?1, ?2, ?3)",
            params![&s.player_id, s.total, to_ms(s.computed_at)],
        )?;
        Ok(())
    }

    fn latest_influence_snapshot(&self, player_id: &str) -> SimResult<Option<InfluenceSnapshot>> {
        let snapshot = self
            .conn
            .query_row(
                "SELECT player_id, total, computed_at FROM influence_snapshot
                 WHERE player_id = ?1 ORDER BY computed_at DESC, id DESC LIMIT 1",
                params![player_id],
                |row| {
                    Ok(InfluenceSnapshot {
                        player_id:   row.get(0)?,
                        total:       row.get(1)?,
                        computed_at: from_ms(2, row.get(2)?)?,
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }
}
