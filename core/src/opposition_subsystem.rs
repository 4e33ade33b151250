//! Opposition research: commissioning and resolving digs on a rival.
//!
//! Outcome odds start from the research type's base table
//! [nothing, minor, moderate, major] and are reshaped by one combined
//! multiplier:
//!
//!   m = spend_tier × skeleton_proximity(target) × (1 − repeat_penalty)
//!
//! applied per tier as nothing/m, minor·√m, moderate·m, major·m^1.2, then
//! renormalised to sum to 1.
//!
//! RULE: every roll is seeded from (cycle seed, target, type, attempt).
//! Record ids never feed a seed, so replays reproduce the same findings.

use crate::{
    clock::real_time_after_game_hours,
    config::ResearchConfig,
    error::{SimError, SimResult},
    rng::{derive_seed, hash_range, hash_unit, SeedPurpose, SeededRng},
    spend::{check_budget, SpendOutcome, SpendTier},
    types::{GameHours, Instant, PlayerId, RecordId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchType {
    BackgroundCheck,
    FinancialRecords,
    VotingRecord,
    PersonalLife,
    Associates,
}

impl ResearchType {
    pub const ALL: [ResearchType; 5] = [
        Self::BackgroundCheck,
        Self::FinancialRecords,
        Self::VotingRecord,
        Self::PersonalLife,
        Self::Associates,
    ];

    /// Base odds for [nothing, minor, moderate, major].
    pub fn base_probabilities(&self) -> [f64; 4] {
        match self {
            Self::BackgroundCheck  => [0.40, 0.35, 0.18, 0.07],
            Self::FinancialRecords => [0.45, 0.25, 0.20, 0.10],
            Self::VotingRecord     => [0.30, 0.45, 0.20, 0.05],
            Self::PersonalLife     => [0.55, 0.20, 0.15, 0.10],
            Self::Associates       => [0.50, 0.30, 0.15, 0.05],
        }
    }

    /// Game hours between commissioning and results.
    pub fn duration_hours(&self) -> GameHours {
        match self {
            Self::BackgroundCheck  => 2.0,
            Self::FinancialRecords => 4.0,
            Self::VotingRecord     => 2.0,
            Self::PersonalLife     => 3.0,
            Self::Associates       => 3.0,
        }
    }

    fn finding_pool(&self) -> &'static [&'static str] {
        match self {
            Self::BackgroundCheck => &[
                "Inflated résumé credentials",
                "Undisclosed past employer",
                "Misstated military service dates",
                "Old lawsuit settled quietly",
                "Professional license lapsed for two years",
                "Contradictory statements in past interviews",
            ],
            Self::FinancialRecords => &[
                "Late tax filings",
                "Unreported consulting income",
                "Donor received a municipal contract",
                "Offshore holding company",
                "Campaign funds used for personal travel",
                "Undisclosed stock trades before a committee vote",
            ],
            Self::VotingRecord => &[
                "Missed a string of key votes",
                "Flip-flopped on a signature issue",
                "Voted against a popular local measure",
                "Co-sponsored a bill later disavowed",
                "Voted for a pay raise during a budget freeze",
                "Record contradicts current platform",
            ],
            Self::PersonalLife => &[
                "Unpaid parking fines",
                "Publicized family feud",
                "Luxury purchases during a hardship pledge",
                "Deleted social media posts resurfaced",
                "Private club membership with exclusionary rules",
                "Property code violations at a rental",
            ],
            Self::Associates => &[
                "Long-time friend under investigation",
                "Former aide lobbying for a contractor",
                "Photographed with a controversial figure",
                "Major donor with a fraud conviction",
                "Business partner in bankruptcy litigation",
                "Campaign adviser with a plagiarism history",
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackgroundCheck  => "background_check",
            Self::FinancialRecords => "financial_records",
            Self::VotingRecord     => "voting_record",
            Self::PersonalLife     => "personal_life",
            Self::Associates       => "associates",
        }
    }

    pub fn parse(s: &str) -> SimResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SimError::Validation(format!("unknown research type '{s}'")))
    }
}

impl fmt::Display for ResearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeTier {
    Nothing,
    Minor,
    Moderate,
    Major,
}

impl OutcomeTier {
    pub const ALL: [OutcomeTier; 4] = [Self::Nothing, Self::Minor, Self::Moderate, Self::Major];

    /// (quality min, quality max, credibility min, credibility max, findings)
    fn discovery_profile(&self) -> Option<(f64, f64, f64, f64, usize)> {
        match self {
            Self::Nothing  => None,
            Self::Minor    => Some((20.0, 45.0, 0.40, 0.70, 1)),
            Self::Moderate => Some((45.0, 70.0, 0.55, 0.85, 2)),
            Self::Major    => Some((70.0, 95.0, 0.70, 0.95, 3)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nothing  => "nothing",
            Self::Minor    => "minor",
            Self::Moderate => "moderate",
            Self::Major    => "major",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    InProgress,
    Complete,
    Failed,
}

impl ResearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Complete   => "complete",
            Self::Failed     => "failed",
        }
    }

    pub fn parse(s: &str) -> SimResult<Self> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "complete"    => Ok(Self::Complete),
            "failed"      => Ok(Self::Failed),
            _ => Err(SimError::Validation(format!("unknown research status '{s}'"))),
        }
    }
}

impl fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    /// 0–100; feeds negative ad effectiveness directly.
    pub quality_score: f64,
    pub tier:          OutcomeTier,
    pub findings:      Vec<String>,
    /// 0–1; low credibility raises ethics and backfire risk.
    pub credibility:   f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OppositionResearch {
    pub research_id:   RecordId,
    pub player_id:     PlayerId,
    pub target_id:     PlayerId,
    pub research_type: ResearchType,
    pub spend_tier:    SpendTier,
    pub amount_spent:  f64,
    /// Same-target, same-type attempts made before this one.
    pub prior_attempts: u32,
    pub started_at:    Instant,
    pub completes_at:  Instant,
    pub completed_at:  Option<Instant>,
    pub status:        ResearchStatus,
    pub discovery:     Option<Discovery>,
    pub seed:          String,
}

/// How much dirt a target has to find, in [proximity_min, proximity_max].
/// Fixed per target across cycles.
pub fn skeleton_proximity(target_id: &str, config: &ResearchConfig) -> f64 {
    hash_range(
        &derive_seed(target_id, SeedPurpose::SkeletonProximity, ""),
        config.proximity_min,
        config.proximity_max,
    )
}

pub fn repeat_penalty(prior_attempts: u32, config: &ResearchConfig) -> f64 {
    (prior_attempts as f64 * config.repeat_penalty_per_attempt).min(config.max_repeat_penalty)
}

/// Reshaped and renormalised [nothing, minor, moderate, major] odds.
pub fn adjusted_probabilities(
    research_type: ResearchType,
    tier: SpendTier,
    proximity: f64,
    prior_attempts: u32,
    config: &ResearchConfig,
) -> [f64; 4] {
    let m = (tier.research_multiplier() * proximity * (1.0 - repeat_penalty(prior_attempts, config)))
        .max(f64::EPSILON);
    let [nothing, minor, moderate, major] = research_type.base_probabilities();
    let raw = [nothing / m, minor * m.sqrt(), moderate * m, major * m.powf(1.2)];
    let total: f64 = raw.iter().sum();
    raw.map(|p| p / total)
}

/// Walk the cumulative odds. Falls through to the last tier on rounding.
fn roll_outcome(probabilities: &[f64; 4], roll: f64) -> OutcomeTier {
    let mut cumulative = 0.0;
    for (tier, p) in OutcomeTier::ALL.iter().zip(probabilities) {
        cumulative += p;
        if roll < cumulative {
            return *tier;
        }
    }
    OutcomeTier::Major
}

/// Count of earlier attempts by `player_id` on the same target and type.
pub fn prior_attempts(
    history: &[OppositionResearch],
    player_id: &str,
    target_id: &str,
    research_type: ResearchType,
) -> u32 {
    history
        .iter()
        .filter(|r| {
            r.player_id == player_id && r.target_id == target_id && r.research_type == research_type
        })
        .count() as u32
}

/// Start a research job. Validation errors are returned before the
/// budget is looked at; an empty war chest is an ordinary outcome.
#[allow(clippy::too_many_arguments)]
pub fn commission_research(
    research_id: &str,
    player_id: &str,
    target_id: &str,
    research_type: ResearchType,
    amount: f64,
    history: &[OppositionResearch],
    available_funds: f64,
    cycle_seed: &str,
    now: Instant,
) -> SimResult<SpendOutcome<OppositionResearch>> {
    if target_id.is_empty() {
        return Err(SimError::Validation("research target must not be empty".into()));
    }
    if target_id == player_id {
        return Err(SimError::Validation("cannot commission research on yourself".into()));
    }
    let spend_tier = SpendTier::from_amount(amount)?;
    if let Some(short) = check_budget(amount, available_funds) {
        return Ok(short);
    }

    let attempts = prior_attempts(history, player_id, target_id, research_type);
    let seed = derive_seed(
        cycle_seed,
        SeedPurpose::ResearchOutcome,
        &format!("{target_id}:{}:{attempts}", research_type.as_str()),
    );

    let research = OppositionResearch {
        research_id: research_id.to_string(),
        player_id: player_id.to_string(),
        target_id: target_id.to_string(),
        research_type,
        spend_tier,
        amount_spent: amount,
        prior_attempts: attempts,
        started_at: now,
        completes_at: real_time_after_game_hours(now, research_type.duration_hours()),
        completed_at: None,
        status: ResearchStatus::InProgress,
        discovery: None,
        seed,
    };
    Ok(SpendOutcome::Completed { value: research, cost: amount })
}

/// Roll the outcome of a finished job. Fails while the job is still
/// running or once it has already been resolved.
pub fn complete_research(
    research: &OppositionResearch,
    now: Instant,
    config: &ResearchConfig,
) -> SimResult<OppositionResearch> {
    if research.status != ResearchStatus::InProgress {
        return Err(SimError::transition(research.status, "complete_research"));
    }
    if now < research.completes_at {
        return Err(SimError::transition(
            format!("in_progress until {}", research.completes_at.to_rfc3339()),
            "complete_research",
        ));
    }

    let proximity = skeleton_proximity(&research.target_id, config);
    let odds = adjusted_probabilities(
        research.research_type,
        research.spend_tier,
        proximity,
        research.prior_attempts,
        config,
    );
    let tier = roll_outcome(&odds, hash_unit(&research.seed));
    let discovery = discover(research, tier);

    log::debug!(
        "research: {} on {} ({}) rolled {}",
        research.player_id,
        research.target_id,
        research.research_type,
        tier.as_str()
    );

    Ok(OppositionResearch {
        status: if discovery.is_some() { ResearchStatus::Complete } else { ResearchStatus::Failed },
        completed_at: Some(now),
        discovery,
        ..research.clone()
    })
}

fn discover(research: &OppositionResearch, tier: OutcomeTier) -> Option<Discovery> {
    let (q_min, q_max, c_min, c_max, count) = tier.discovery_profile()?;
    let quality_score = hash_range(
        &derive_seed(&research.seed, SeedPurpose::ResearchQuality, ""),
        q_min,
        q_max,
    );
    let credibility = hash_range(
        &derive_seed(&research.seed, SeedPurpose::ResearchCredibility, ""),
        c_min,
        c_max,
    );
    let mut rng = SeededRng::from_seed(&derive_seed(&research.seed, SeedPurpose::ResearchFindings, ""));
    let findings = rng
        .pick_distinct(research.research_type.finding_pool(), count)
        .into_iter()
        .map(|f| f.to_string())
        .collect();

    Some(Discovery { quality_score, tier, findings, credibility })
}
