//! Offline fairness: a returning player never loses standing for being away.
//!
//! RULE: the floor only ever raises a value.
//!
//!   floor = max(level_minimum(level), previous.total × retention)
//!
//! The divergence analyzer compares a value computed with the player online
//! against the same value reconstructed offline. It only reports; nothing
//! here mutates campaign state.

use crate::{
    config::FairnessConfig,
    types::{Instant, PlayerId},
};
use serde::{Deserialize, Serialize};

/// Last known influence total for a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceSnapshot {
    pub player_id:   PlayerId,
    pub total:       f64,
    pub computed_at: Instant,
}

pub fn clamp_level(level: u32, config: &FairnessConfig) -> u32 {
    level.clamp(1, config.max_level.max(1))
}

pub fn level_minimum(level: u32, config: &FairnessConfig) -> f64 {
    let level = clamp_level(level, config);
    config.level_minimum_base + config.level_minimum_step * f64::from(level - 1)
}

pub fn fairness_floor(previous: Option<&InfluenceSnapshot>, level: u32, config: &FairnessConfig) -> f64 {
    let retained = previous
        .map(|s| s.total.max(0.0) * config.retention_factor)
        .unwrap_or(0.0);
    level_minimum(level, config).max(retained)
}

/// Clamp `raw` up to the floor. Non-finite input lands on the floor.
pub fn apply_retention_floor(
    raw: f64,
    previous: Option<&InfluenceSnapshot>,
    level: u32,
    config: &FairnessConfig,
) -> f64 {
    let floor = fairness_floor(previous, level, config);
    if raw.is_finite() { raw.max(floor) } else { floor }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceSeverity {
    None,
    Minor,
    Major,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FairnessEventType {
    FloorApplied,
    DivergenceWarning,
}

/// Structured audit record for downstream telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessAuditEvent {
    pub event_type:     FairnessEventType,
    pub player_id:      PlayerId,
    pub occurred_at:    Instant,
    /// When the compared or retained value was last computed.
    pub reference_at:   Option<Instant>,
    pub raw_value:      f64,
    pub adjusted_value: f64,
    pub severity:       DivergenceSeverity,
    pub reason:         String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceReport {
    pub online:              f64,
    pub offline:             f64,
    pub relative_difference: f64,
    pub severity:            DivergenceSeverity,
    pub audit:               Option<FairnessAuditEvent>,
}

pub fn relative_difference(online: f64, offline: f64) -> f64 {
    let scale = online.abs().max(offline.abs());
    if scale == 0.0 || !scale.is_finite() {
        return 0.0;
    }
    (online - offline).abs() / scale
}

pub fn analyze_divergence(
    player_id: &str,
    online: f64,
    offline: f64,
    now: Instant,
    reference_at: Option<Instant>,
    config: &FairnessConfig,
) -> DivergenceReport {
    let diff = relative_difference(online, offline);
    let severity = if diff > config.divergence_major {
        DivergenceSeverity::Major
    } else if diff > config.divergence_warning {
        DivergenceSeverity::Minor
    } else {
        DivergenceSeverity::None
    };

    let audit = (severity != DivergenceSeverity::None).then(|| FairnessAuditEvent {
        event_type: FairnessEventType::DivergenceWarning,
        player_id: player_id.to_string(),
        occurred_at: now,
        reference_at,
        raw_value: offline,
        adjusted_value: online,
        severity,
        reason: format!(
            "online/offline values differ by {:.1}% (warning above {:.0}%)",
            diff * 100.0,
            config.divergence_warning * 100.0
        ),
    });

    DivergenceReport {
        online,
        offline,
        relative_difference: diff,
        severity,
        audit,
    }
}

/// Audit record for a value the floor had to raise, if it did.
pub fn floor_audit(
    player_id: &str,
    raw: f64,
    adjusted: f64,
    previous: Option<&InfluenceSnapshot>,
    now: Instant,
) -> Option<FairnessAuditEvent> {
    (adjusted > raw).then(|| FairnessAuditEvent {
        event_type: FairnessEventType::FloorApplied,
        player_id: player_id.to_string(),
        occurred_at: now,
        reference_at: previous.map(|s| s.computed_at),
        raw_value: raw,
        adjusted_value: adjusted,
        severity: DivergenceSeverity::None,
        reason: format!("raised from {raw:.2} to fairness floor {adjusted:.2}"),
    })
}
