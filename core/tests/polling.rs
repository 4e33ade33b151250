//! Polling engine tests.
//!
//! Tests cover: base support formula, snapshot determinism and bounds,
//! offline dampening tiers, margin of error, interval gating, trend summary.

use std::sync::Arc;

use campaign_core::{
    clock::{real_time_after_game_hours, FixedClock},
    config::SimConfig,
    engine::CampaignEngine,
    polling_subsystem::{
        base_support, generate_snapshot, margin_of_error, offline_factors, snapshot_due,
        summarize_trend, PollingInputs, PollingSnapshot, TrendDirection,
    },
    scandal_subsystem::ScandalCategory,
    store::SimStore,
    types::Instant,
};
use chrono::{Duration, TimeZone, Utc};

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

fn inputs(reputation: f64) -> PollingInputs {
    PollingInputs {
        reputation,
        endorsements: 0,
        funds_raised: 0.0,
        active_scandals: 0,
        volatility_modifier: 0.5,
        support_shift: 0.0,
    }
}

/// A fresh candidate at reputation 50 polls a base of 30.
#[test]
fn fresh_candidate_base_support_is_thirty() {
    assert_eq!(base_support(&inputs(50.0)), 30.0);
}

/// Each term is capped and the total stays in [0, 100].
#[test]
fn base_support_terms_are_capped() {
    let loaded = PollingInputs {
        endorsements: 20,
        funds_raised: 5_000_000.0,
        ..inputs(100.0)
    };
    // 60 + 15 + 10
    assert_eq!(base_support(&loaded), 85.0);

    let funded = PollingInputs { funds_raised: 100_000.0, ..inputs(50.0) };
    assert_eq!(base_support(&funded), 35.0);

    let disgraced = PollingInputs { active_scandals: 40, ..inputs(10.0) };
    assert_eq!(base_support(&disgraced), 0.0);

    // Attack-ad shifts count point for point.
    let attacked = PollingInputs { support_shift: -4.0, ..inputs(50.0) };
    assert_eq!(base_support(&attacked), 26.0);
}

/// Identical inputs give a bit-identical snapshot.
#[test]
fn snapshots_are_deterministic() {
    let config = SimConfig::default_test();
    let a = generate_snapshot("alice", "alice:1:cycle:", &inputs(55.0), None, at(3.0), &config.polling);
    let b = generate_snapshot("alice", "alice:1:cycle:", &inputs(55.0), None, at(3.0), &config.polling);
    assert_eq!(a, b);
    assert_eq!(a.final_support.to_bits(), b.final_support.to_bits());

    let other = generate_snapshot("alice", "alice:2:cycle:", &inputs(55.0), None, at(3.0), &config.polling);
    assert_ne!(a.seed, other.seed, "different cycle seeds must not share a poll seed");
}

/// Sample size, volatility, margin of error and support stay in range.
#[test]
fn snapshot_values_stay_in_bounds() {
    let config = SimConfig::default_test();
    let mut previous: Option<PollingSnapshot> = None;
    for hour in 0..200 {
        let now = at(hour as f64);
        let snapshot = generate_snapshot(
            "bob",
            "bob:1:cycle:",
            &PollingInputs { volatility_modifier: 0.9, ..inputs(70.0) },
            previous.as_ref(),
            now,
            &config.polling,
        );
        assert!((800..=3000).contains(&snapshot.sample_size), "sample {}", snapshot.sample_size);
        assert!(snapshot.volatility_delta.abs() <= 3.0 * 0.9 + 1e-9);
        assert!((0.0..=100.0).contains(&snapshot.final_support));
        assert!(snapshot.margin_of_error >= config.polling.min_margin_of_error);
        previous = Some(snapshot);
    }
}

/// The first snapshot of a campaign has no smoothing component.
#[test]
fn first_snapshot_is_unsmoothed() {
    let config = SimConfig::default_test();
    let s = generate_snapshot("alice", "seed", &inputs(50.0), None, t0(), &config.polling);
    assert_eq!(s.smoothing_delta, 0.0);
    assert_eq!(s.final_support, (s.base_support + s.volatility_delta).clamp(0.0, 100.0));
}

/// Smoothing pulls the new value towards the previous one.
#[test]
fn smoothing_pulls_towards_previous() {
    let config = SimConfig::default_test();
    let mut previous = generate_snapshot("alice", "seed", &inputs(50.0), None, t0(), &config.polling);
    previous.final_support = 80.0;

    let next = generate_snapshot("alice", "seed", &inputs(50.0), Some(&previous), at(5.0), &config.polling);
    let raw = next.base_support + next.volatility_delta;
    assert!(next.smoothing_delta > 0.0, "smoothing should pull upwards");
    assert!(next.final_support > raw && next.final_support < 80.0);
}

/// Offline gaps select the configured dampening tier.
#[test]
fn offline_factors_follow_tiers() {
    let config = SimConfig::default_test();
    let p = &config.polling;

    let none = offline_factors(None, t0(), p);
    assert_eq!((none.dampening, none.smoothing_weight), (1.0, 0.0));
    assert_eq!(none.gap_hours, None);

    let fresh = offline_factors(Some(t0()), t0() + Duration::seconds(10), p);
    assert_eq!((fresh.dampening, fresh.smoothing_weight), (1.0, p.fresh_smoothing_weight));

    let cases = [(2, 0.9, 0.5), (10, 0.75, 0.65), (30, 0.5, 0.8), (100, 0.25, 0.9)];
    for (hours, dampening, weight) in cases {
        let f = offline_factors(Some(t0()), t0() + Duration::hours(hours), p);
        assert_eq!(
            (f.dampening, f.smoothing_weight),
            (dampening, weight),
            "gap of {hours} real hours"
        );
    }
}

/// Larger samples shrink the margin down to the floor.
#[test]
fn margin_of_error_scales_with_sample() {
    let config = SimConfig::default_test();
    assert_eq!(margin_of_error(800, &config.polling), 4.0);
    assert_eq!(margin_of_error(1600, &config.polling), 2.0);
    assert_eq!(margin_of_error(3000, &config.polling), 1.5);
}

/// One snapshot per polling interval.
#[test]
fn snapshot_due_once_per_interval() {
    let config = SimConfig::default_test();
    assert!(snapshot_due(None, t0(), &config.polling));

    let s = generate_snapshot("alice", "seed", &inputs(50.0), None, t0(), &config.polling);
    assert!(!snapshot_due(Some(&s), t0(), &config.polling));
    assert!(snapshot_due(Some(&s), at(1.5), &config.polling));
}

/// Trend summary over an ordered window.
#[test]
fn trend_summary_classifies_direction() {
    let config = SimConfig::default_test();
    assert!(summarize_trend(&[], 5, &config.polling).is_none());

    let base = generate_snapshot("alice", "seed", &inputs(50.0), None, t0(), &config.polling);
    let series: Vec<PollingSnapshot> = (0..6)
        .map(|i| PollingSnapshot {
            captured_at: at(i as f64),
            final_support: 30.0 + 2.0 * i as f64,
            ..base.clone()
        })
        .collect();

    let rising = summarize_trend(&series, 4, &config.polling).expect("summary");
    assert_eq!(rising.samples, 4);
    assert_eq!(rising.direction, TrendDirection::Rising);
    assert_eq!(rising.latest, 40.0);
    assert!((rising.average - 37.0).abs() < 1e-9);
    assert!((rising.momentum_per_hour - 2.0).abs() < 1e-3);

    let falling: Vec<PollingSnapshot> = series.iter().rev().cloned().enumerate()
        .map(|(i, s)| PollingSnapshot { captured_at: at(i as f64), ..s })
        .collect();
    let summary = summarize_trend(&falling, 6, &config.polling).expect("summary");
    assert_eq!(summary.direction, TrendDirection::Falling);

    let flat = summarize_trend(&series[..1], 6, &config.polling).expect("summary");
    assert_eq!(flat.direction, TrendDirection::Stable);
}

/// Through the engine: polling reflects scandal damage.
#[test]
fn engine_poll_uses_effective_reputation() {
    let (engine, clock) = build("poll-scandal");
    engine.start_campaign("alice").expect("start");
    let clean = engine.take_poll("alice").expect("poll");
    assert_eq!(clean.reputation, 50.0);

    engine
        .trigger_scandal("alice", Some(ScandalCategory::Financial))
        .expect("scandal");
    clock.set(at(1.5));
    let hit = engine.take_poll("alice").expect("poll");
    assert!(hit.reputation < 50.0, "reputation after scandal {}", hit.reputation);
    assert!(hit.base_support < clean.base_support);

    let latest = engine.latest_poll("alice").expect("latest").expect("some poll");
    assert_eq!(latest, hit);
}

/// Through the engine: the scheduler polls each live player once per interval.
#[test]
fn engine_scheduler_polls_once_per_interval() {
    let (engine, clock) = build("poll-sweep");
    engine.start_campaign("alice").expect("start");
    engine.start_campaign("bob").expect("start");

    let first = engine.run_scheduled().expect("sweep");
    assert_eq!(first.polls_taken, 2);
    let again = engine.run_scheduled().expect("sweep");
    assert_eq!(again.polls_taken, 0, "second sweep in the same interval");

    for hour in 1..=5 {
        clock.set(at(hour as f64 + 0.5));
        engine.run_scheduled().expect("sweep");
    }
    let trend = engine.polling_trend("alice", 10).expect("trend").expect("summary");
    assert!(trend.samples >= 5, "samples {}", trend.samples);
}
