//! Scandal subsystem: generation, decay, mitigation and resolution.
//!
//! A scandal knocks `severity × hit_per_severity` points off reputation when
//! it is discovered, then recovers linearly:
//!
//!   impact = max(0, hit − rate·h_discovered − containment·rate·h_contained)
//!
//! Lifecycle: DISCOVERED → CONTAINED → RESOLVED (or left DISCOVERED until
//! it decays enough to resolve). Containment does not change the stored
//! rate; its bonus only exists inside the impact calculation.

use crate::{
    clock::game_hours_between,
    config::ScandalConfig,
    error::{SimError, SimResult},
    phase_subsystem::CampaignPhaseState,
    rng::{chance, derive_seed, hash_range, hash_unit, SeedPurpose},
    types::{Instant, PlayerId, RecordId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScandalCategory {
    Financial,
    Personal,
    PolicyReversal,
    StaffMisconduct,
    Legal,
    MediaGaffe,
}

impl ScandalCategory {
    /// Roll order. NEVER reorder; it changes every seeded category roll.
    pub const ALL: [ScandalCategory; 6] = [
        Self::Financial,
        Self::Personal,
        Self::PolicyReversal,
        Self::StaffMisconduct,
        Self::Legal,
        Self::MediaGaffe,
    ];

    /// (roll weight, severity min, severity max)
    pub fn profile(&self) -> (f64, f64, f64) {
        match self {
            Self::Financial       => (0.20, 0.40, 0.90),
            Self::Personal        => (0.15, 0.30, 0.80),
            Self::PolicyReversal  => (0.25, 0.10, 0.40),
            Self::StaffMisconduct => (0.15, 0.20, 0.60),
            Self::Legal           => (0.10, 0.50, 1.00),
            Self::MediaGaffe      => (0.15, 0.05, 0.30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Financial       => "financial",
            Self::Personal        => "personal",
            Self::PolicyReversal  => "policy_reversal",
            Self::StaffMisconduct => "staff_misconduct",
            Self::Legal           => "legal",
            Self::MediaGaffe      => "media_gaffe",
        }
    }

    pub fn parse(s: &str) -> SimResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| SimError::Validation(format!("unknown scandal category '{s}'")))
    }
}

impl fmt::Display for ScandalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScandalStatus {
    Discovered,
    Contained,
    Resolved,
}

impl ScandalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Contained  => "contained",
            Self::Resolved   => "resolved",
        }
    }

    pub fn parse(s: &str) -> SimResult<Self> {
        match s {
            "discovered" => Ok(Self::Discovered),
            "contained"  => Ok(Self::Contained),
            "resolved"   => Ok(Self::Resolved),
            _ => Err(SimError::Validation(format!("unknown scandal status '{s}'"))),
        }
    }
}

impl fmt::Display for ScandalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MitigationAction {
    PublicApology,
    PressConference,
    LegalDefense,
    StaffDismissal,
    CharityDonation,
    Deflection,
}

impl MitigationAction {
    /// Added to the recovery rate (points per game hour).
    pub fn rate_delta(&self) -> f64 {
        match self {
            Self::PublicApology   => 0.30,
            Self::PressConference => 0.20,
            Self::LegalDefense    => 0.40,
            Self::StaffDismissal  => 0.35,
            Self::CharityDonation => 0.25,
            Self::Deflection      => 0.10,
        }
    }

    pub fn cost(&self) -> f64 {
        match self {
            Self::PublicApology   => 2_000.0,
            Self::PressConference => 5_000.0,
            Self::LegalDefense    => 25_000.0,
            Self::StaffDismissal  => 3_000.0,
            Self::CharityDonation => 15_000.0,
            Self::Deflection      => 1_000.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicApology   => "public_apology",
            Self::PressConference => "press_conference",
            Self::LegalDefense    => "legal_defense",
            Self::StaffDismissal  => "staff_dismissal",
            Self::CharityDonation => "charity_donation",
            Self::Deflection      => "deflection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScandalRecord {
    pub scandal_id:             RecordId,
    pub player_id:              PlayerId,
    pub category:               ScandalCategory,
    pub severity:               f64,
    pub status:                 ScandalStatus,
    pub discovered_at:          Instant,
    pub contained_at:           Option<Instant>,
    pub resolved_at:            Option<Instant>,
    pub reputation_hit:         f64,
    pub recovery_rate_per_hour: f64,
    pub mitigations:            Vec<MitigationAction>,
}

impl ScandalRecord {
    pub fn is_active(&self) -> bool {
        self.status != ScandalStatus::Resolved
    }
}

/// Weighted category roll.
pub fn roll_category(seed: &str) -> ScandalCategory {
    let roll = hash_unit(seed);
    let mut cumulative = 0.0;
    for category in ScandalCategory::ALL {
        cumulative += category.profile().0;
        if roll < cumulative {
            return category;
        }
    }
    ScandalCategory::MediaGaffe
}

/// Chance of a new scandal in one polling interval for this cycle.
pub fn scandal_chance(state: &CampaignPhaseState, config: &ScandalConfig) -> f64 {
    let pressure = 1.0 + state.difficulty.spend_pressure * config.spend_pressure_chance_weight;
    (config.base_chance_per_interval * pressure).clamp(0.0, 1.0)
}

/// Seeded roll: does a scandal break in the interval `discriminator`?
pub fn should_generate(state: &CampaignPhaseState, discriminator: &str, config: &ScandalConfig) -> bool {
    let seed = derive_seed(&state.seed, SeedPurpose::ScandalChance, discriminator);
    chance(&seed, scandal_chance(state, config))
}

/// Build a freshly discovered scandal. `trigger` forces the category;
/// otherwise it is rolled from the weighted table.
pub fn generate_scandal(
    scandal_id: &str,
    player_id: &str,
    seed: &str,
    trigger: Option<ScandalCategory>,
    now: Instant,
    config: &ScandalConfig,
) -> ScandalRecord {
    let category = trigger
        .unwrap_or_else(|| roll_category(&derive_seed(seed, SeedPurpose::ScandalCategory, "")));
    let (_, min, max) = category.profile();
    let severity = hash_range(&derive_seed(seed, SeedPurpose::ScandalSeverity, ""), min, max)
        .clamp(0.0, 1.0);

    ScandalRecord {
        scandal_id: scandal_id.to_string(),
        player_id: player_id.to_string(),
        category,
        severity,
        status: ScandalStatus::Discovered,
        discovered_at: now,
        contained_at: None,
        resolved_at: None,
        reputation_hit: severity * config.hit_per_severity,
        recovery_rate_per_hour: config.base_recovery_per_hour
            * (1.0 - severity * config.severity_recovery_drag),
        mitigations: Vec::new(),
    }
}

/// Reputation points this scandal still costs at `now`.
pub fn current_impact(record: &ScandalRecord, now: Instant, config: &ScandalConfig) -> f64 {
    if record.status == ScandalStatus::Resolved {
        return 0.0;
    }
    let rate = record.recovery_rate_per_hour;
    let since_discovery = game_hours_between(record.discovered_at, now).max(0.0);
    let mut recovered = rate * since_discovery;
    if let Some(contained_at) = record.contained_at {
        let since_containment = game_hours_between(contained_at, now).max(0.0);
        recovered += rate * config.containment_multiplier * since_containment;
    }
    (record.reputation_hit - recovered).max(0.0)
}

/// Sum of current impact across the player's unresolved scandals.
pub fn total_penalty(records: &[ScandalRecord], now: Instant, config: &ScandalConfig) -> f64 {
    records
        .iter()
        .filter(|r| r.is_active())
        .map(|r| current_impact(r, now, config))
        .sum()
}

/// Reputation as voters see it after scandal damage.
pub fn effective_reputation(
    base_reputation: f64,
    records: &[ScandalRecord],
    now: Instant,
    config: &ScandalConfig,
) -> f64 {
    (base_reputation - total_penalty(records, now, config)).clamp(0.0, 100.0)
}

/// Add `action`'s recovery boost. A saturated electorate (high
/// `engagement_saturation`) takes less notice of damage control.
pub fn apply_mitigation(
    record: &ScandalRecord,
    action: MitigationAction,
    engagement_saturation: f64,
    config: &ScandalConfig,
) -> SimResult<ScandalRecord> {
    if record.status == ScandalStatus::Resolved {
        return Err(SimError::transition(record.status, "mitigate"));
    }
    if record.mitigations.contains(&action) {
        return Err(SimError::Validation(format!(
            "{} already applied to scandal {}",
            action.as_str(),
            record.scandal_id
        )));
    }
    let mut next = record.clone();
    next.mitigations.push(action);
    let damping = 1.0 - config.saturation_mitigation_drag * engagement_saturation.clamp(0.0, 1.0);
    next.recovery_rate_per_hour = (record.recovery_rate_per_hour + action.rate_delta() * damping)
        .min(config.max_recovery_per_hour);
    Ok(next)
}

pub fn contain(record: &ScandalRecord, now: Instant) -> SimResult<ScandalRecord> {
    if record.status != ScandalStatus::Discovered {
        return Err(SimError::transition(record.status, "contain"));
    }
    Ok(ScandalRecord {
        status: ScandalStatus::Contained,
        contained_at: Some(now),
        ..record.clone()
    })
}

pub fn resolve(record: &ScandalRecord, now: Instant, config: &ScandalConfig) -> SimResult<ScandalRecord> {
    if record.status == ScandalStatus::Resolved {
        return Err(SimError::transition(record.status, "resolve"));
    }
    let impact = current_impact(record, now, config);
    if impact >= config.resolve_threshold {
        return Err(SimError::transition(
            format!("impact is still {impact:.2} (needs < {:.2})", config.resolve_threshold),
            "resolve",
        ));
    }
    Ok(mark_resolved(record, now))
}

fn mark_resolved(record: &ScandalRecord, now: Instant) -> ScandalRecord {
    ScandalRecord {
        status: ScandalStatus::Resolved,
        resolved_at: Some(now),
        ..record.clone()
    }
}

/// Scandals that have decayed below the auto-resolve threshold,
/// returned already resolved.
pub fn sweep_resolvable(
    records: &[ScandalRecord],
    now: Instant,
    config: &ScandalConfig,
) -> Vec<ScandalRecord> {
    records
        .iter()
        .filter(|r| r.is_active() && current_impact(r, now, config) < config.auto_resolve_threshold)
        .map(|r| mark_resolved(r, now))
        .collect()
}
