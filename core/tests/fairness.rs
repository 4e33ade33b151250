//! Offline fairness and influence baseline tests.
//!
//! Tests cover: level minimums, retention floor, divergence severity,
//! floor audits, influence breakdown terms, engine auditing.

use std::sync::Arc;

use campaign_core::{
    clock::{real_time_after_game_hours, FixedClock},
    config::SimConfig,
    engine::CampaignEngine,
    error::SimError,
    fairness_subsystem::{
        analyze_divergence, apply_retention_floor, fairness_floor, floor_audit, level_minimum,
        relative_difference, DivergenceSeverity, FairnessEventType, InfluenceSnapshot,
    },
    influence_subsystem::{
        compute_baseline_influence, donation_term, level_multiplier, proximity_bonus,
        reputation_term, soft_cap, InfluenceInputs,
    },
    store::SimStore,
    types::Instant,
};
use chrono::{TimeZone, Utc};

fn t0() -> Instant {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn at(hours: f64) -> Instant {
    real_time_after_game_hours(t0(), hours)
}

fn build(run_id: &str) -> (CampaignEngine, Arc<FixedClock>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = SimStore::in_memory_migrated().expect("in-memory store");
    let clock = Arc::new(FixedClock::new(t0()));
    let engine = CampaignEngine::new(
        run_id.to_string(),
        Box::new(store),
        clock.clone(),
        SimConfig::default_test(),
    )
    .expect("build engine");
    (engine, clock)
}

fn previous(total: f64) -> InfluenceSnapshot {
    InfluenceSnapshot { player_id: "alice".into(), total, computed_at: t0() }
}

fn inputs(donation: f64) -> InfluenceInputs {
    InfluenceInputs {
        donation,
        level: 1,
        state_weight: 0.5,
        hours_to_election: None,
        reputation: 50.0,
    }
}

// ── Fairness floor ────────────────────────────────────────────────

/// Minimum grows by five per level and clamps to the level range.
#[test]
fn level_minimum_follows_level() {
    let config = SimConfig::default_test();
    assert_eq!(level_minimum(1, &config.fairness), 10.0);
    assert_eq!(level_minimum(5, &config.fairness), 30.0);
    assert_eq!(level_minimum(20, &config.fairness), 105.0);
    assert_eq!(level_minimum(0, &config.fairness), 10.0);
    assert_eq!(level_minimum(99, &config.fairness), 105.0);
}

/// A returning player keeps 85% of the last known total.
#[test]
fn floor_retains_previous_total() {
    let config = SimConfig::default_test();
    assert_eq!(fairness_floor(None, 3, &config.fairness), 20.0);
    assert!((fairness_floor(Some(&previous(200.0)), 1, &config.fairness) - 170.0).abs() < 1e-9);
    assert_eq!(fairness_floor(Some(&previous(10.0)), 3, &config.fairness), 20.0);
    assert_eq!(fairness_floor(Some(&previous(-50.0)), 1, &config.fairness), 10.0);
}

/// The floor only raises; non-finite input lands on it.
#[test]
fn retention_floor_only_raises() {
    let config = SimConfig::default_test();
    let prev = previous(100.0);
    assert_eq!(apply_retention_floor(40.0, Some(&prev), 1, &config.fairness), 85.0);
    assert_eq!(apply_retention_floor(120.0, Some(&prev), 1, &config.fairness), 120.0);
    assert_eq!(apply_retention_floor(f64::NAN, Some(&prev), 1, &config.fairness), 85.0);
    assert_eq!(apply_retention_floor(f64::NEG_INFINITY, None, 2, &config.fairness), 15.0);
}

/// The audit fires only when the floor changed the value.
#[test]
fn floor_audit_only_when_raised() {
    let prev = previous(100.0);
    let audit = floor_audit("alice", 40.0, 85.0, Some(&prev), at(2.0)).expect("raised");
    assert_eq!(audit.event_type, FairnessEventType::FloorApplied);
    assert_eq!(audit.reference_at, Some(t0()));
    assert_eq!(audit.raw_value, 40.0);
    assert_eq!(audit.adjusted_value, 85.0);
    assert!(floor_audit("alice", 90.0, 90.0, Some(&prev), at(2.0)).is_none());
}

// ── Divergence ────────────────────────────────────────────────────

#[test]
fn relative_difference_uses_larger_magnitude() {
    assert_eq!(relative_difference(0.0, 0.0), 0.0);
    assert!((relative_difference(100.0, 85.0) - 0.15).abs() < 1e-9);
    assert!((relative_difference(85.0, 100.0) - 0.15).abs() < 1e-9);
    assert_eq!(relative_difference(0.0, 10.0), 1.0);
}

/// Above 10% is minor, above 25% is major; both carry an audit.
#[test]
fn divergence_severity_thresholds() {
    let config = SimConfig::default_test();
    let cases = [
        (100.0, 95.0, DivergenceSeverity::None),
        (100.0, 90.0, DivergenceSeverity::None),
        (100.0, 85.0, DivergenceSeverity::Minor),
        (100.0, 75.0, DivergenceSeverity::Minor),
        (100.0, 70.0, DivergenceSeverity::Major),
    ];
    for (online, offline, want) in cases {
        let report = analyze_divergence("alice", online, offline, at(1.0), None, &config.fairness);
        assert_eq!(report.severity, want, "{online} vs {offline}");
        assert_eq!(report.audit.is_some(), want != DivergenceSeverity::None);
    }

    let report = analyze_divergence("alice", 100.0, 60.0, at(1.0), Some(t0()), &config.fairness);
    let audit = report.audit.expect("audit");
    assert_eq!(audit.event_type, FairnessEventType::DivergenceWarning);
    assert_eq!(audit.severity, DivergenceSeverity::Major);
    assert_eq!(audit.raw_value, 60.0);
    assert_eq!(audit.adjusted_value, 100.0);
    assert_eq!(audit.reference_at, Some(t0()));
}

// ── Influence baseline ────────────────────────────────────────────

/// Each term follows its formula.
#[test]
fn influence_terms() {
    let config = SimConfig::default_test();
    assert_eq!(donation_term(99.0, &config), 0.0);
    assert_eq!(donation_term(100.0, &config), 0.0);
    assert!((donation_term(10_000.0, &config) - 10.0 * 100f64.ln()).abs() < 1e-9);

    assert_eq!(level_multiplier(1, &config), 1.0);
    assert!((level_multiplier(11, &config) - 2.0).abs() < 1e-9);

    assert_eq!(proximity_bonus(None, &config), 0.0);
    assert_eq!(proximity_bonus(Some(30.0), &config), 0.0);
    assert_eq!(proximity_bonus(Some(24.0), &config), 0.0);
    assert_eq!(proximity_bonus(Some(0.0), &config), 15.0);
    assert!((proximity_bonus(Some(12.0), &config) - 3.75).abs() < 1e-9);

    assert_eq!(reputation_term(50.0, &config), 0.0);
    assert_eq!(reputation_term(20.0, &config), 0.0);
    assert!((reputation_term(75.0, &config) - 5.0).abs() < 1e-9);
    assert_eq!(reputation_term(100.0, &config), 10.0);
}

/// Soft cap is monotonic and stays below its target.
#[test]
fn soft_cap_is_monotonic() {
    assert_eq!(soft_cap(0.0, 100.0), 0.0);
    assert_eq!(soft_cap(-10.0, 100.0), 0.0);
    assert_eq!(soft_cap(100.0, 100.0), 50.0);
    let mut previous = 0.0;
    for v in (0..5_000).step_by(25) {
        let capped = soft_cap(v as f64, 100.0);
        assert!(capped >= previous);
        assert!(capped < 100.0);
        previous = capped;
    }
}

/// The total is the floored value plus bounded jitter, never below the floor.
#[test]
fn baseline_breakdown_is_consistent() {
    let config = SimConfig::default_test();
    let b = compute_baseline_influence(&inputs(10_000.0), None, "alice:1:cycle:", &config).expect("influence");
    assert!((b.state_term - 10.0).abs() < 1e-9);
    assert!((b.raw_sum - (b.donation_term + b.state_term)).abs() < 1e-9);
    assert!((b.compressed - soft_cap(b.raw_sum, 100.0)).abs() < 1e-9);
    assert_eq!(b.floor, 10.0);
    assert_eq!(b.floored, b.compressed);
    assert!(b.jitter.abs() <= 2.0 + 1e-9);
    assert!((b.total as f64 - (b.floored + b.jitter)).abs() <= 0.5 + 1e-9);

    let again = compute_baseline_influence(&inputs(10_000.0), None, "alice:1:cycle:", &config).expect("influence");
    assert_eq!(b, again);
}

/// A large previous total holds up a weak recomputation.
#[test]
fn baseline_respects_retention_floor() {
    let config = SimConfig::default_test();
    let prev = previous(200.0);
    for i in 0..20 {
        let seed = format!("alice:1:cycle:{i}");
        let b = compute_baseline_influence(&inputs(500.0), Some(&prev), &seed, &config).expect("influence");
        assert!((b.floor - 170.0).abs() < 1e-9);
        assert_eq!(b.floored, b.floor);
        assert!(b.total as f64 >= b.floor.ceil(), "total {} below floor", b.total);
        assert!(b.total <= 172);
    }
}

/// Weights beyond one are clipped; negative inputs are rejected.
#[test]
fn baseline_validates_inputs() {
    let config = SimConfig::default_test();
    let heavy = InfluenceInputs { state_weight: 4.0, ..inputs(0.0) };
    let b = compute_baseline_influence(&heavy, None, "s", &config).expect("influence");
    assert_eq!(b.state_term, 20.0);

    for bad in [
        InfluenceInputs { donation: -1.0, ..inputs(0.0) },
        InfluenceInputs { state_weight: -0.1, ..inputs(0.0) },
        InfluenceInputs { reputation: -5.0, ..inputs(0.0) },
    ] {
        assert!(matches!(
            compute_baseline_influence(&bad, None, "s", &config),
            Err(SimError::Validation(_))
        ));
    }
}

// ── Engine ────────────────────────────────────────────────────────

/// Through the engine: a value raised by the floor is audited, and the
/// stored total feeds the next floor.
#[test]
fn engine_audits_floor_application() {
    let (engine, clock) = build("fairness-floor");
    engine.start_campaign("alice").expect("start");

    let first = engine
        .compute_influence("alice", &InfluenceInputs { state_weight: 0.0, ..inputs(0.0) })
        .expect("influence");
    assert_eq!(first.compressed, 0.0);
    assert_eq!(first.floored, 10.0);

    let events = engine.events_for_player("alice").expect("events");
    assert_eq!(events.iter().filter(|e| e.event_type == "influence_computed").count(), 1);
    let audit = events
        .iter()
        .find(|e| e.event_type == "fairness_audit")
        .expect("floor audit");
    assert!(audit.payload.contains("floor_applied"), "payload {}", audit.payload);

    let rich = engine
        .compute_influence("alice", &InfluenceInputs { reputation: 100.0, ..inputs(1_000_000.0) })
        .expect("influence");
    assert!(rich.total > 40);

    clock.set(at(30.0));
    let back = engine
        .compute_influence("alice", &InfluenceInputs { state_weight: 0.0, ..inputs(0.0) })
        .expect("influence");
    assert!((back.floor - rich.total as f64 * 0.85).abs() < 1e-9);
    assert!(back.total as f64 >= back.floor.ceil());
}

/// Through the engine: only a noticeable divergence is recorded.
#[test]
fn engine_records_divergence_warnings() {
    let (engine, _clock) = build("fairness-divergence");
    engine.start_campaign("alice").expect("start");

    let quiet = engine.check_divergence("alice", 100.0, 97.0, None).expect("check");
    assert_eq!(quiet.severity, DivergenceSeverity::None);
    let loud = engine.check_divergence("alice", 100.0, 50.0, Some(t0())).expect("check");
    assert_eq!(loud.severity, DivergenceSeverity::Major);

    let audits: Vec<_> = engine
        .events_for_player("alice")
        .expect("events")
        .into_iter()
        .filter(|e| e.event_type == "fairness_audit")
        .collect();
    assert_eq!(audits.len(), 1);
    assert!(audits[0].payload.contains("divergence_warning"));
}
