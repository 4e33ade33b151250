//! Competitive balance: keeps a runaway leader catchable.
//!
//! Three corrections, applied in this order:
//!   1. Systemic cap: support above the cap start keeps only a fraction
//!      of the excess (60 + (v − 60) × 0.2).
//!   2. Underdog buff: a candidate trailing the leader by more than the
//!      threshold gains min(gap × rate, max) points on top of the capped value.
//!   3. Frontrunner cost: a leader ahead of the runner-up by more than the
//!      threshold pays a multiplier on the cost of actions. Support itself
//!      is not touched.

use crate::{
    config::BalanceConfig,
    error::{SimError, SimResult},
    types::PlayerId,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePolling {
    pub player_id: PlayerId,
    pub support:   f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceAdjustment {
    pub player_id:        PlayerId,
    pub raw_support:      f64,
    pub capped_support:   f64,
    pub adjusted_support: f64,
    pub leader_id:        PlayerId,
    /// Lead over the runner-up when leading, otherwise the gap to the leader.
    pub margin:           f64,
    pub is_frontrunner:   bool,
    pub is_underdog:      bool,
    pub cost_multiplier:  f64,
    pub underdog_buff:    f64,
}

pub fn systemic_cap(support: f64, config: &BalanceConfig) -> f64 {
    if support > config.systemic_cap_start {
        config.systemic_cap_start + (support - config.systemic_cap_start) * config.systemic_cap_retention
    } else {
        support
    }
}

/// Highest support first; ties broken by player id so the ranking is stable.
fn ranked(pollings: &[CandidatePolling]) -> Vec<&CandidatePolling> {
    let mut ranked: Vec<&CandidatePolling> = pollings.iter().collect();
    ranked.sort_by(|a, b| {
        b.support
            .partial_cmp(&a.support)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    ranked
}

pub fn compute_balance_adjustment(
    player_id: &str,
    pollings: &[CandidatePolling],
    config: &BalanceConfig,
) -> SimResult<BalanceAdjustment> {
    if let Some(bad) = pollings.iter().find(|p| !p.support.is_finite() || p.support < 0.0) {
        return Err(SimError::Validation(format!(
            "support for {} must be a non-negative number, got {}",
            bad.player_id, bad.support
        )));
    }
    let candidate = pollings
        .iter()
        .find(|p| p.player_id == player_id)
        .ok_or_else(|| SimError::not_found("polling", player_id))?;

    let order = ranked(pollings);
    let leader = order[0];
    let runner_up_support = order.get(1).map(|p| p.support).unwrap_or(0.0);

    let is_leader = leader.player_id == candidate.player_id;
    let margin = if is_leader {
        candidate.support - runner_up_support
    } else {
        leader.support - candidate.support
    };

    let is_frontrunner = is_leader && margin > config.frontrunner_lead_threshold;
    let is_underdog = !is_leader && margin > config.underdog_gap_threshold;

    let cost_multiplier = if is_frontrunner {
        1.0 + margin * config.frontrunner_cost_per_point
    } else {
        1.0
    };
    let underdog_buff = if is_underdog {
        (margin * config.underdog_buff_per_point).min(config.max_underdog_buff)
    } else {
        0.0
    };

    let capped_support = systemic_cap(candidate.support, config);
    let adjusted_support = (capped_support + underdog_buff).clamp(0.0, 100.0);

    Ok(BalanceAdjustment {
        player_id: candidate.player_id.clone(),
        raw_support: candidate.support,
        capped_support,
        adjusted_support,
        leader_id: leader.player_id.clone(),
        margin,
        is_frontrunner,
        is_underdog,
        cost_multiplier,
        underdog_buff,
    })
}

/// Blend a base probability with the adjusted polling fraction, then
/// apply the underdog lift and frontrunner drag. Always inside
/// [floor, ceiling]; non-finite inputs collapse to an even chance.
pub fn fair_probability(
    base_probability: f64,
    adjustment: &BalanceAdjustment,
    config: &BalanceConfig,
) -> f64 {
    let base = if base_probability.is_finite() { base_probability.clamp(0.0, 1.0) } else { 0.5 };
    let polling = if adjustment.adjusted_support.is_finite() {
        adjustment.adjusted_support / 100.0
    } else {
        0.5
    };
    let lift = adjustment.underdog_buff / 100.0;
    let drag = (adjustment.cost_multiplier - 1.0) * config.frontrunner_probability_drag;

    let blended = 0.5 * base + 0.5 * polling + lift - drag;
    let blended = if blended.is_finite() { blended } else { 0.5 };
    blended.clamp(config.probability_floor, config.probability_ceiling)
}
