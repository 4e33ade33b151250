//! Influence baseline: one composite standing score per player.
//!
//! Steps:
//!   1. donation term   10·ln(donation / min) × level multiplier (0 below min)
//!   2. state term      scale × composite state weight
//!   3. proximity bonus max × ((window − h) / window)² inside the window
//!   4. reputation term 0 at or below neutral, linear to max at 100
//!   5. soft cap        v·T / (T + v)
//!   6. fairness floor  clamp up to the retention floor
//!   7. jitter          seeded ±amplitude, never below the floor
//!   8. total           rounded to an integer, still never below the floor

use crate::{
    config::SimConfig,
    error::{ensure_non_negative, SimResult},
    fairness_subsystem::{apply_retention_floor, clamp_level, fairness_floor, InfluenceSnapshot},
    rng::{derive_seed, hash_signed, SeedPurpose},
    types::GameHours,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceInputs {
    pub donation:          f64,
    pub level:             u32,
    /// Composite state weight in [0, 1].
    pub state_weight:      f64,
    /// Game hours until the election; `None` when no election is scheduled.
    pub hours_to_election: Option<GameHours>,
    pub reputation:        f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceBreakdown {
    pub donation_term:    f64,
    pub level_multiplier: f64,
    pub state_term:       f64,
    pub proximity_bonus:  f64,
    pub reputation_term:  f64,
    pub raw_sum:          f64,
    pub compressed:       f64,
    pub floor:            f64,
    pub floored:          f64,
    pub jitter:           f64,
    pub total:            i64,
}

pub fn level_multiplier(level: u32, config: &SimConfig) -> f64 {
    1.0 + config.influence.level_multiplier_step * f64::from(clamp_level(level, &config.fairness) - 1)
}

pub fn donation_term(donation: f64, config: &SimConfig) -> f64 {
    let cfg = &config.influence;
    if donation < cfg.min_donation {
        return 0.0;
    }
    cfg.donation_weight * (donation / cfg.min_donation).ln()
}

pub fn proximity_bonus(hours_to_election: Option<GameHours>, config: &SimConfig) -> f64 {
    let cfg = &config.influence;
    match hours_to_election {
        Some(h) if (0.0..=cfg.proximity_window_hours).contains(&h) => {
            let closeness = (cfg.proximity_window_hours - h) / cfg.proximity_window_hours;
            cfg.max_proximity_bonus * closeness * closeness
        }
        _ => 0.0,
    }
}

pub fn reputation_term(reputation: f64, config: &SimConfig) -> f64 {
    let cfg = &config.influence;
    let reputation = reputation.clamp(0.0, 100.0);
    if reputation <= cfg.reputation_neutral {
        return 0.0;
    }
    (reputation - cfg.reputation_neutral) / (100.0 - cfg.reputation_neutral) * cfg.max_reputation_bonus
}

/// Rational compression: monotonic, approaches `target` asymptotically.
pub fn soft_cap(value: f64, target: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    value * target / (target + value)
}

pub fn compute_baseline_influence(
    inputs: &InfluenceInputs,
    previous: Option<&InfluenceSnapshot>,
    seed: &str,
    config: &SimConfig,
) -> SimResult<InfluenceBreakdown> {
    ensure_non_negative("donation", inputs.donation)?;
    ensure_non_negative("state_weight", inputs.state_weight)?;
    ensure_non_negative("reputation", inputs.reputation)?;

    let multiplier = level_multiplier(inputs.level, config);
    let donation = donation_term(inputs.donation, config) * multiplier;
    let state = config.influence.state_weight_scale * inputs.state_weight.min(1.0);
    let proximity = proximity_bonus(inputs.hours_to_election, config);
    let reputation = reputation_term(inputs.reputation, config);

    let raw_sum = donation + state + proximity + reputation;
    let compressed = soft_cap(raw_sum, config.influence.soft_cap_target);

    let floor = fairness_floor(previous, inputs.level, &config.fairness);
    let floored = apply_retention_floor(compressed, previous, inputs.level, &config.fairness);

    let jitter = hash_signed(&derive_seed(seed, SeedPurpose::InfluenceJitter, ""))
        * config.influence.jitter_amplitude;
    let jittered = (floored + jitter).max(floor);
    let mut total = jittered.round();
    if total < floor {
        total = floor.ceil();
    }

    Ok(InfluenceBreakdown {
        donation_term: donation,
        level_multiplier: multiplier,
        state_term: state,
        proximity_bonus: proximity,
        reputation_term: reputation,
        raw_sum,
        compressed,
        floor,
        floored,
        jitter: jittered - floored,
        total: total as i64,
    })
}
