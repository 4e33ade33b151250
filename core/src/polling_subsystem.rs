//! Polling subsystem: periodic support snapshots.
//!
//! Each snapshot is built in six steps:
//!   1. Base support from reputation, endorsements, funds, scandals and
//!      the running support shift from attack ads
//!   2. Sample size hashed from the interval seed
//!   3. Volatility delta, dampened by how long the player was away
//!   4. Smoothing delta (EMA against the previous snapshot, adaptive weight)
//!   5. Final support = clamp(base + volatility + smoothing)
//!   6. Margin of error from sample size
//!
//! Snapshots are immutable once generated. Trend helpers at the bottom are
//! read-only aggregations over a window of snapshots.

use crate::{
    clock::{game_hours_between, game_hours_to_real_ms, real_hours_between, TIME_ACCELERATION},
    config::PollingConfig,
    phase_subsystem::CampaignPhaseState,
    rng::{derive_seed, hash_int_range, hash_signed, SeedPurpose},
    types::{GameHours, Instant, PlayerId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingSnapshot {
    pub player_id:        PlayerId,
    pub captured_at:      Instant,
    pub sample_size:      u32,
    pub base_support:     f64,
    pub volatility_delta: f64,
    pub smoothing_delta:  f64,
    pub final_support:    f64,
    pub margin_of_error:  f64,
    pub reputation:       f64,
    pub seed:             String,
}

/// Campaign signals the poll is computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollingInputs {
    pub reputation:          f64,
    pub endorsements:        u32,
    pub funds_raised:        f64,
    pub active_scandals:     u32,
    pub volatility_modifier: f64,
    /// Support points moved by attack ads, added after the other terms.
    pub support_shift:       f64,
}

impl PollingInputs {
    pub fn from_state(state: &CampaignPhaseState) -> Self {
        Self {
            reputation:          state.reputation,
            endorsements:        state.endorsements_acquired,
            funds_raised:        state.funds_raised,
            active_scandals:     state.active_scandals,
            volatility_modifier: state.difficulty.volatility_modifier,
            support_shift:       state.support_shift,
        }
    }

    /// Substitute the reputation actually visible to voters
    /// (after scandal penalties).
    pub fn with_reputation(self, reputation: f64) -> Self {
        Self { reputation, ..self }
    }
}

/// Step 1.
pub fn base_support(inputs: &PollingInputs) -> f64 {
    let reputation_term = 0.6 * inputs.reputation;
    let endorsement_term = (3.0 * inputs.endorsements as f64).min(15.0);
    let funds_term = (5.0 * inputs.funds_raised / 100_000.0).min(10.0);
    let scandal_term = 2.0 * inputs.active_scandals as f64;
    (reputation_term + endorsement_term + funds_term - scandal_term + inputs.support_shift)
        .clamp(0.0, 100.0)
}

/// Index of the polling interval `now` falls in. Snapshots taken in the
/// same interval share their seed.
pub fn interval_index(now: Instant, config: &PollingConfig) -> i64 {
    let interval_ms = game_hours_to_real_ms(config.interval_game_hours).max(1);
    now.timestamp_millis().div_euclid(interval_ms)
}

/// True when no snapshot exists yet for the interval `now` falls in.
pub fn snapshot_due(previous: Option<&PollingSnapshot>, now: Instant, config: &PollingConfig) -> bool {
    match previous {
        None => true,
        Some(prev) => interval_index(prev.captured_at, config) < interval_index(now, config),
    }
}

/// Volatility dampening and smoothing weight for the gap since the
/// previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfflineFactors {
    /// Real hours since the previous snapshot, if there was one.
    pub gap_hours:        Option<f64>,
    pub dampening:        f64,
    pub smoothing_weight: f64,
}

pub fn offline_factors(
    previous_at: Option<Instant>,
    now: Instant,
    config: &PollingConfig,
) -> OfflineFactors {
    let Some(previous_at) = previous_at else {
        return OfflineFactors {
            gap_hours: None,
            dampening: 1.0,
            smoothing_weight: 0.0,
        };
    };

    let gap = real_hours_between(previous_at, now);
    let interval_real_hours = config.interval_game_hours / TIME_ACCELERATION;
    let mut factors = OfflineFactors {
        gap_hours: Some(gap),
        dampening: 1.0,
        smoothing_weight: config.fresh_smoothing_weight,
    };
    if gap <= interval_real_hours {
        return factors;
    }
    for tier in &config.offline_tiers {
        if gap > tier.above_hours {
            factors.dampening = tier.dampening;
            factors.smoothing_weight = tier.smoothing_weight;
        }
    }
    factors
}

/// Margin of error shrinks with sample size, floored at the minimum.
pub fn margin_of_error(sample_size: u32, config: &PollingConfig) -> f64 {
    let scaled = config.base_margin_of_error * config.reference_sample_size / sample_size.max(1) as f64;
    scaled.max(config.min_margin_of_error)
}

/// Generate the snapshot for `now`. Pure: identical inputs give a
/// bit-identical snapshot.
pub fn generate_snapshot(
    player_id: &str,
    cycle_seed: &str,
    inputs: &PollingInputs,
    previous: Option<&PollingSnapshot>,
    now: Instant,
    config: &PollingConfig,
) -> PollingSnapshot {
    let seed = format!("{cycle_seed}:poll:{}", interval_index(now, config));

    let base = base_support(inputs);

    let sample_size = hash_int_range(
        &derive_seed(&seed, SeedPurpose::PollingSample, ""),
        config.sample_size_min,
        config.sample_size_max,
    );

    let factors = offline_factors(previous.map(|p| p.captured_at), now, config);
    let volatility = hash_signed(&derive_seed(&seed, SeedPurpose::PollingVolatility, ""))
        * config.max_shift_percent
        * inputs.volatility_modifier.clamp(0.0, 1.0)
        * factors.dampening;

    let raw = base + volatility;
    let smoothing = match previous {
        Some(prev) => {
            let w = factors.smoothing_weight;
            let smoothed = w * prev.final_support + (1.0 - w) * raw;
            smoothed - raw
        }
        None => 0.0,
    };

    let final_support = (raw + smoothing).clamp(0.0, 100.0);

    log::debug!(
        "polling: {player_id} base={base:.2} vol={volatility:+.2} smooth={smoothing:+.2} final={final_support:.2}"
    );

    PollingSnapshot {
        player_id: player_id.to_string(),
        captured_at: now,
        sample_size,
        base_support: base,
        volatility_delta: volatility,
        smoothing_delta: smoothing,
        final_support,
        margin_of_error: margin_of_error(sample_size, config),
        reputation: inputs.reputation,
        seed,
    }
}

// ── Trend utilities ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub samples:           usize,
    pub average:           f64,
    pub latest:            f64,
    pub direction:         TrendDirection,
    /// Support points per game hour across the window.
    pub momentum_per_hour: f64,
}

/// The last `window` snapshots, assuming `snapshots` is ordered by time.
fn tail(snapshots: &[PollingSnapshot], window: usize) -> &[PollingSnapshot] {
    let start = snapshots.len().saturating_sub(window.max(1));
    &snapshots[start..]
}

pub fn rolling_average(snapshots: &[PollingSnapshot], window: usize) -> Option<f64> {
    let tail = tail(snapshots, window);
    if tail.is_empty() {
        return None;
    }
    Some(tail.iter().map(|s| s.final_support).sum::<f64>() / tail.len() as f64)
}

pub fn classify_trend(snapshots: &[PollingSnapshot], threshold: f64) -> TrendDirection {
    match (snapshots.first(), snapshots.last()) {
        (Some(first), Some(last)) => {
            let change = last.final_support - first.final_support;
            if change > threshold {
                TrendDirection::Rising
            } else if change < -threshold {
                TrendDirection::Falling
            } else {
                TrendDirection::Stable
            }
        }
        _ => TrendDirection::Stable,
    }
}

pub fn momentum_per_hour(snapshots: &[PollingSnapshot]) -> f64 {
    let (Some(first), Some(last)) = (snapshots.first(), snapshots.last()) else {
        return 0.0;
    };
    let hours: GameHours = game_hours_between(first.captured_at, last.captured_at);
    if hours <= 0.0 {
        return 0.0;
    }
    (last.final_support - first.final_support) / hours
}

pub fn summarize_trend(
    snapshots: &[PollingSnapshot],
    window: usize,
    config: &PollingConfig,
) -> Option<TrendSummary> {
    let tail = tail(snapshots, window);
    let latest = tail.last()?.final_support;
    Some(TrendSummary {
        samples: tail.len(),
        average: rolling_average(tail, tail.len())?,
        latest,
        direction: classify_trend(tail, config.trend_threshold),
        momentum_per_hour: momentum_per_hour(tail),
    })
}
