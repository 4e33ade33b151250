//! Campaign snapshots: one player's full record set to/from JSON.
//!
//! A snapshot captures everything needed to rebuild a player's standing
//! in another store: the cycle state and every record hanging off it.
//! Derived values (current phase, scandal impact) are not stored; they are
//! recomputed from the records at whatever "now" the reader uses.

use std::collections::BTreeMap;

use crate::{
    endorsement_subsystem::{EndorsementCategory, EndorsementRecord},
    fairness_subsystem::InfluenceSnapshot,
    negative_ad_subsystem::{CounterAd, NegativeAd},
    opposition_subsystem::OppositionResearch,
    phase_subsystem::CampaignPhaseState,
    polling_subsystem::PollingSnapshot,
    scandal_subsystem::ScandalRecord,
    types::{Instant, PlayerId},
};
use serde::{Deserialize, Serialize};

/// Bump when the snapshot layout changes incompatibly.
pub const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    pub format:       u32,
    pub player_id:    PlayerId,
    pub taken_at:     Instant,
    pub state:        CampaignPhaseState,
    pub polls:        Vec<PollingSnapshot>,
    pub endorsements: Vec<EndorsementRecord>,
    /// Lifetime acquisitions per category, swept records included.
    #[serde(default)]
    pub tallies:      BTreeMap<EndorsementCategory, usize>,
    pub scandals:     Vec<ScandalRecord>,
    pub research:     Vec<OppositionResearch>,
    pub ads:          Vec<NegativeAd>,
    pub counters:     Vec<CounterAd>,
    pub influence:    Option<InfluenceSnapshot>,
}

impl CampaignSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> crate::error::SimResult<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(crate::error::SimError::Validation(format!(
                "snapshot format {} is not supported (expected {SNAPSHOT_FORMAT})",
                snapshot.format
            )));
        }
        Ok(snapshot)
    }
}
