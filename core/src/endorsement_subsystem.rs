//! Endorsement subsystem: acquisition, stacking and expiry.
//!
//! Repeated endorsements from the same source category stack with
//! diminishing returns. The count is cumulative: expired endorsements
//! still count toward the diminishing factor, so letting one lapse and
//! re-acquiring it is never cheaper than diversifying.
//!
//! Bonus totals only include active records (no expiry, or expiry in the
//! future). Expired records stay visible until a sweep removes them.

use crate::{
    clock::real_time_after_game_hours,
    config::EndorsementConfig,
    error::{SimError, SimResult},
    phase_subsystem::CampaignPhase,
    types::{GameHours, Instant, PlayerId, RecordId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndorsementCategory {
    Celebrity,
    Union,
    Corporate,
    Party,
    Grassroots,
    Media,
}

/// Constant table row for a source category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryProfile {
    /// Influence bonus (percent) of a first endorsement.
    pub base_influence:   f64,
    /// Fundraising bonus (percent) of a first endorsement.
    pub base_fundraising: f64,
    /// Lifetime in game hours; `None` is permanent.
    pub duration_hours:   Option<GameHours>,
}

impl EndorsementCategory {
    pub const ALL: [EndorsementCategory; 6] = [
        Self::Celebrity,
        Self::Union,
        Self::Corporate,
        Self::Party,
        Self::Grassroots,
        Self::Media,
    ];

    pub fn profile(&self) -> CategoryProfile {
        let (base_influence, base_fundraising, duration_hours) = match self {
            Self::Celebrity  => (8.0, 5.0, Some(12.0)),
            Self::Union      => (6.0, 8.0, None),
            Self::Corporate  => (4.0, 12.0, Some(8.0)),
            Self::Party      => (10.0, 10.0, None),
            Self::Grassroots => (5.0, 3.0, Some(16.0)),
            Self::Media      => (7.0, 2.0, Some(6.0)),
        };
        CategoryProfile { base_influence, base_fundraising, duration_hours }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Celebrity  => "celebrity",
            Self::Union      => "union",
            Self::Corporate  => "corporate",
            Self::Party      => "party",
            Self::Grassroots => "grassroots",
            Self::Media      => "media",
        }
    }

    pub fn parse(s: &str) -> SimResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| SimError::Validation(format!("unknown endorsement category '{s}'")))
    }
}

impl fmt::Display for EndorsementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndorsementTier {
    Local,
    State,
    National,
}

impl EndorsementTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local    => "local",
            Self::State    => "state",
            Self::National => "national",
        }
    }

    pub fn parse(s: &str) -> SimResult<Self> {
        match s {
            "local"    => Ok(Self::Local),
            "state"    => Ok(Self::State),
            "national" => Ok(Self::National),
            _ => Err(SimError::Validation(format!("unknown endorsement tier '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndorsementRecord {
    pub endorsement_id:     RecordId,
    pub player_id:          PlayerId,
    pub category:           EndorsementCategory,
    pub tier:               EndorsementTier,
    pub acquired_at:        Instant,
    pub expires_at:         Option<Instant>,
    pub diminishing_factor: f64,
    pub influence_bonus:    f64,
    pub fundraising_bonus:  f64,
}

impl EndorsementRecord {
    pub fn is_active(&self, now: Instant) -> bool {
        match self.expires_at {
            None => true,
            Some(expiry) => expiry > now,
        }
    }
}

/// Diminishing factor for an acquisition that already has `prior`
/// same-category predecessors.
pub fn diminishing_factor(prior: usize, config: &EndorsementConfig) -> f64 {
    let factors = &config.diminishing_factors;
    factors
        .get(prior)
        .or_else(|| factors.last())
        .copied()
        .unwrap_or(1.0)
}

/// Same-category acquisitions `player_id` has made, expired included.
pub fn prior_count(
    existing: &[EndorsementRecord],
    player_id: &str,
    category: EndorsementCategory,
) -> usize {
    existing
        .iter()
        .filter(|r| r.player_id == player_id && r.category == category)
        .count()
}

/// Build the record for a new endorsement. `prior` is the cumulative
/// number of same-category acquisitions before this one.
pub fn acquire_endorsement(
    endorsement_id: &str,
    player_id: &str,
    category: EndorsementCategory,
    tier: EndorsementTier,
    prior: usize,
    now: Instant,
    config: &EndorsementConfig,
) -> EndorsementRecord {
    let factor = diminishing_factor(prior, config);
    let profile = category.profile();

    EndorsementRecord {
        endorsement_id: endorsement_id.to_string(),
        player_id: player_id.to_string(),
        category,
        tier,
        acquired_at: now,
        expires_at: profile
            .duration_hours
            .map(|hours| real_time_after_game_hours(now, hours)),
        diminishing_factor: factor,
        influence_bonus: profile.base_influence * factor,
        fundraising_bonus: profile.base_fundraising * factor,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EndorsementBonus {
    pub influence:   f64,
    pub fundraising: f64,
}

impl std::ops::AddAssign<&EndorsementRecord> for EndorsementBonus {
    fn add_assign(&mut self, record: &EndorsementRecord) {
        self.influence += record.influence_bonus;
        self.fundraising += record.fundraising_bonus;
    }
}

pub fn total_active_bonus(records: &[EndorsementRecord], now: Instant) -> EndorsementBonus {
    let mut total = EndorsementBonus::default();
    for record in records.iter().filter(|r| r.is_active(now)) {
        total += record;
    }
    total
}

/// Split records into (active, expired).
pub fn sweep_expired(
    records: Vec<EndorsementRecord>,
    now: Instant,
) -> (Vec<EndorsementRecord>, Vec<EndorsementRecord>) {
    records.into_iter().partition(|r| r.is_active(now))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndorsementPortfolio {
    pub active:             Vec<EndorsementRecord>,
    pub expired_count:      usize,
    pub bonus_by_category:  BTreeMap<EndorsementCategory, EndorsementBonus>,
    /// Counts over the records passed in, expired included.
    pub category_counts:    BTreeMap<EndorsementCategory, usize>,
    pub total:              EndorsementBonus,
}

pub fn portfolio(records: &[EndorsementRecord], now: Instant) -> EndorsementPortfolio {
    let mut active = Vec::new();
    let mut expired_count = 0;
    let mut bonus_by_category: BTreeMap<EndorsementCategory, EndorsementBonus> = BTreeMap::new();
    let mut category_counts: BTreeMap<EndorsementCategory, usize> = BTreeMap::new();
    let mut total = EndorsementBonus::default();

    for record in records {
        *category_counts.entry(record.category).or_default() += 1;
        if record.is_active(now) {
            *bonus_by_category.entry(record.category).or_default() += record;
            total += record;
            active.push(record.clone());
        } else {
            expired_count += 1;
        }
    }

    EndorsementPortfolio {
        active,
        expired_count,
        bonus_by_category,
        category_counts,
        total,
    }
}

/// Categories worth pursuing in `phase`, fewest-held first.
/// Advisory only; nothing in the engine acts on it.
pub fn recommend_categories(
    portfolio: &EndorsementPortfolio,
    phase: CampaignPhase,
) -> Vec<EndorsementCategory> {
    let preferred: &[EndorsementCategory] = match phase {
        CampaignPhase::Announcement => &[EndorsementCategory::Party, EndorsementCategory::Grassroots],
        CampaignPhase::Fundraising => &[EndorsementCategory::Corporate, EndorsementCategory::Union],
        CampaignPhase::Primary => &[EndorsementCategory::Party, EndorsementCategory::Union],
        CampaignPhase::Debate => &[EndorsementCategory::Media, EndorsementCategory::Celebrity],
        CampaignPhase::GeneralCampaign | CampaignPhase::FinalPush => &[
            EndorsementCategory::Celebrity,
            EndorsementCategory::Media,
            EndorsementCategory::Grassroots,
        ],
        CampaignPhase::Election => &[],
    };

    let mut ranked: Vec<EndorsementCategory> = preferred.to_vec();
    ranked.sort_by_key(|c| portfolio.category_counts.get(c).copied().unwrap_or(0));
    ranked
}
