//! Campaign phase machine tests.
//!
//! Tests cover: phase windows, pause/resume banking, withdraw and complete
//! guards, early advancement, cycle rollover, difficulty seeding, stale
//! state writes.

use std::sync::Arc;

use campaign_core::{
    clock::{real_time_after_game_hours, FixedClock},
    config::SimConfig,
    engine::CampaignEngine,
    error::SimError,
    phase_subsystem::{
        advance_phase, start_cycle, CampaignPhase, CampaignPhaseState, CampaignStatus, PhaseMachine,
        PhaseObjectives, CYCLE_GAME_HOURS,
    },
    store::{CampaignStore, SimStore},
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

/// Durations sum to the cycle length and each phase owns its window.
#[test]
fn phases_follow_the_fixed_timeline() {
    let total: f64 = CampaignPhase::ORDER.iter().map(|p| p.duration_hours()).sum();
    assert_eq!(total, CYCLE_GAME_HOURS);

    let machine = PhaseMachine::start(t0());
    for phase in CampaignPhase::ORDER {
        let midpoint = phase.offset_hours() + phase.duration_hours() / 2.0;
        assert_eq!(
            machine.current_phase(at(midpoint)),
            phase,
            "expected {phase} at {midpoint} game hours"
        );
    }

    let window = machine.window(at(27.0));
    assert!(window.cycle_complete, "cycle should be complete after 27 game hours");
    assert_eq!(window.phase, CampaignPhase::Election);
    assert_eq!(window.remaining_in_phase, 0.0);
}

/// Phase bounds always span exactly the configured phase duration.
#[test]
fn phase_bounds_match_phase_duration() {
    let machine = PhaseMachine::start(t0());
    for hours in [0.5, 7.0, 11.2, 14.0, 18.9, 21.0, 24.0] {
        let (start, end) = machine.phase_bounds(at(hours));
        let phase = machine.current_phase(at(hours));
        let span = campaign_core::clock::game_hours_between(start, end);
        assert!(
            (span - phase.duration_hours()).abs() < 1e-3,
            "{phase} bounds span {span} game hours"
        );
    }
}

/// Time spent paused does not count towards the cycle.
#[test]
fn pause_freezes_and_resume_banks_the_gap() {
    let machine = PhaseMachine::start(t0());
    let paused = machine.pause(at(7.0)).expect("pause");
    assert_eq!(paused.status, CampaignStatus::Paused);
    assert_eq!(paused.current_phase(at(80.0)), CampaignPhase::Fundraising);

    let resumed = paused.resume(at(80.0)).expect("resume");
    let elapsed = resumed.elapsed_game_hours(at(80.0));
    assert!((elapsed - 7.0).abs() < 1e-3, "elapsed after resume = {elapsed}");
    assert_eq!(resumed.current_phase(at(80.0)), CampaignPhase::Fundraising);

    assert!(matches!(
        machine.resume(at(1.0)),
        Err(SimError::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        paused.pause(at(8.0)),
        Err(SimError::InvalidStateTransition { .. })
    ));
}

/// Withdrawal is refused once election results are in progress.
#[test]
fn withdraw_is_refused_during_election() {
    let machine = PhaseMachine::start(t0());
    let err = machine.withdraw(at(23.0)).expect_err("withdraw in election");
    assert!(matches!(err, SimError::InvalidStateTransition { .. }), "got {err}");

    let withdrawn = machine.withdraw(at(11.0)).expect("withdraw in primary");
    assert_eq!(withdrawn.status, CampaignStatus::Withdrawn);
    // The derived phase stays frozen at the moment of withdrawal.
    assert_eq!(withdrawn.current_phase(at(25.0)), CampaignPhase::Primary);
    assert!(withdrawn.withdraw(at(12.0)).is_err());
}

/// Completion needs the terminal phase.
#[test]
fn complete_requires_election_phase() {
    let machine = PhaseMachine::start(t0());
    assert!(machine.complete(at(20.0)).is_err(), "completed during final push");
    let done = machine.complete(at(23.0)).expect("complete in election");
    assert_eq!(done.status, CampaignStatus::Completed);
    assert!(done.complete(at(24.0)).is_err(), "completed twice");
}

/// Early advancement only works for objective-gated phases with the
/// objective met.
#[test]
fn early_advancement_checks_objectives() {
    let config = SimConfig::default_test();
    let machine = PhaseMachine::start(t0());

    let announcement = machine.advance_early(at(1.0), &PhaseObjectives::default(), &config.phase);
    assert!(announcement.is_err(), "announcement is time-gated");

    let short = PhaseObjectives { funds_raised: 10_000.0, ..Default::default() };
    assert!(machine.advance_early(at(7.0), &short, &config.phase).is_err());

    let funded = PhaseObjectives { funds_raised: 60_000.0, ..Default::default() };
    let advanced = machine
        .advance_early(at(7.0), &funded, &config.phase)
        .expect("fundraising objective met");
    assert_eq!(advanced.current_phase(at(7.0)), CampaignPhase::Primary);

    let primary = PhaseObjectives { endorsements_acquired: 3, ..Default::default() };
    let advanced = machine
        .advance_early(at(11.0), &primary, &config.phase)
        .expect("primary objective met");
    assert_eq!(advanced.current_phase(at(11.0)), CampaignPhase::Debate);

    let debate = PhaseObjectives { debate_submitted: true, ..Default::default() };
    let advanced = machine
        .advance_early(at(13.5), &debate, &config.phase)
        .expect("debate objective met");
    assert_eq!(advanced.current_phase(at(13.5)), CampaignPhase::GeneralCampaign);
}

/// Re-deriving the phase at the same instant is idempotent.
#[test]
fn advance_phase_is_idempotent() {
    let config = SimConfig::default_test();
    let state = start_cycle("alice", t0(), None, &config).expect("start");
    let first = advance_phase(&state, at(12.0));
    assert!(first.changed());
    assert_eq!(first.to, CampaignPhase::Primary);

    let second = advance_phase(&first.state, at(12.0));
    assert!(!second.changed());
    assert_eq!(second.state, first.state);
}

/// A new cycle is refused while the previous one is live, and carries
/// reputation over once it has finished.
#[test]
fn rollover_requires_a_finished_cycle() {
    let config = SimConfig::default_test();
    let first = start_cycle("alice", t0(), None, &config).expect("start");
    assert_eq!(first.cycle, 1);
    assert_eq!(first.reputation, config.phase.starting_reputation);
    assert_eq!(first.active_phase, CampaignPhase::Announcement);

    assert!(start_cycle("alice", at(10.0), Some(&first), &config).is_err());

    let bruised = CampaignPhaseState { reputation: 38.0, ..first.clone() };
    let second = start_cycle("alice", at(27.0), Some(&bruised), &config).expect("rollover");
    assert_eq!(second.cycle, 2);
    assert_eq!(second.reputation, 38.0);
    assert_ne!(second.seed, first.seed, "each cycle gets its own seed");
}

/// Difficulty indices are drawn from the cycle seed inside the configured range.
#[test]
fn difficulty_is_seeded_and_bounded() {
    let config = SimConfig::default_test();
    let a = start_cycle("alice", t0(), None, &config).expect("start a");
    let b = start_cycle("alice", at(5.0), None, &config).expect("start b");
    assert_eq!(a.difficulty, b.difficulty, "same player and cycle, same difficulty");

    for player in ["alice", "bob", "carol", "dave"] {
        let s = start_cycle(player, t0(), None, &config).expect("start");
        for v in [
            s.difficulty.spend_pressure,
            s.difficulty.volatility_modifier,
            s.difficulty.engagement_saturation,
        ] {
            assert!(
                (config.phase.difficulty_min..=config.phase.difficulty_max).contains(&v),
                "{player}: difficulty {v} out of range"
            );
        }
    }
}

/// Spend pressure erodes donations; spending beyond the war chest is refused.
#[test]
fn funds_are_credited_after_spend_pressure() {
    let config = SimConfig::default_test();
    let state = start_cycle("alice", t0(), None, &config).expect("start");
    let (funded, credited) = state.raise_funds(100_000.0, 0.0, &config.phase).expect("raise");
    assert!(credited < 100_000.0 && credited > 70_000.0, "credited {credited}");
    assert_eq!(funded.available_funds(), credited);

    assert!(funded.spend(credited + 1.0).is_err());
    assert!(state.raise_funds(-5.0, 0.0, &config.phase).is_err());
    let spent = funded.spend(10_000.0).expect("spend");
    assert!((spent.available_funds() - (credited - 10_000.0)).abs() < 1e-9);
}

/// A debate performance can only be submitted during the debate phase.
#[test]
fn debate_submission_is_phase_gated() {
    let config = SimConfig::default_test();
    let state = start_cycle("alice", t0(), None, &config).expect("start");
    assert!(state.submit_debate_performance(at(3.0)).is_err());
    let debated = state.submit_debate_performance(at(14.0)).expect("debate");
    assert!(debated.debate_submitted);
}

/// Through the engine: the scheduler completes the cycle and a rollover
/// starts cycle two.
#[test]
fn engine_completes_cycle_and_rolls_over() {
    let (engine, clock) = build("phase-rollover");
    engine.start_campaign("alice").expect("start");
    assert!(engine.start_campaign("alice").is_err(), "cycle still live");

    clock.set(at(12.0));
    let state = engine.campaign_state("alice").expect("state");
    assert_eq!(state.active_phase, CampaignPhase::Primary);

    clock.set(at(27.0));
    let report = engine.run_scheduled().expect("sweep");
    assert_eq!(report.cycles_completed, 1);
    let state = engine.stored_state("alice").expect("state");
    assert_eq!(state.machine.status, CampaignStatus::Completed);

    let next = engine.start_campaign("alice").expect("rollover");
    assert_eq!(next.cycle, 2);
    assert_eq!(next.machine.status, CampaignStatus::Running);
}

/// Through the engine: pause and resume bank the paused time.
#[test]
fn engine_pause_and_resume() {
    let (engine, clock) = build("phase-pause");
    engine.start_campaign("alice").expect("start");

    clock.set(at(7.0));
    engine.pause("alice").expect("pause");
    clock.set(at(40.0));
    let state = engine.campaign_state("alice").expect("state");
    assert_eq!(state.active_phase, CampaignPhase::Fundraising);
    assert_eq!(state.machine.status, CampaignStatus::Paused);

    let resumed = engine.resume("alice").expect("resume");
    assert_eq!(resumed.active_phase, CampaignPhase::Fundraising);
    assert_eq!(resumed.machine.status, CampaignStatus::Running);
}

/// Through the engine: early advancement records a phase change.
#[test]
fn engine_advance_early_after_fundraising_goal() {
    let (engine, clock) = build("phase-early");
    engine.start_campaign("alice").expect("start");
    clock.set(at(7.0));
    engine.raise_funds("alice", 90_000.0).expect("raise");

    let state = engine.advance_early("alice").expect("advance early");
    assert_eq!(state.active_phase, CampaignPhase::Primary);

    let early = engine
        .events_for_player("alice")
        .expect("events")
        .into_iter()
        .filter(|e| e.event_type == "phase_advanced")
        .any(|e| e.payload.contains("\"early\":true"));
    assert!(early, "expected an early phase_advanced event");
}

/// A write based on a stale read is refused.
#[test]
fn stale_state_write_is_a_version_conflict() {
    let config = SimConfig::default_test();
    let store = SimStore::in_memory_migrated().expect("store");
    let state = start_cycle("alice", t0(), None, &config).expect("start");
    store.insert_campaign_state(&state).expect("insert");

    let (raised, _) = state.raise_funds(1_000.0, 0.0, &config.phase).expect("raise");
    let saved = store.update_campaign_state(&raised).expect("first write");
    assert_eq!(saved.version, state.version + 1);

    let err = store.update_campaign_state(&raised).expect_err("stale write");
    assert!(matches!(err, SimError::VersionConflict { .. }));
    assert_eq!(store.latest_campaign_state("alice").expect("read"), Some(saved));
}

/// However often the scheduler looks, a cycle ends at its scheduled end.
#[test]
fn cycle_end_does_not_depend_on_sweep_cadence() {
    let mut endings = Vec::new();
    for (run_id, step) in [("phase-cadence-fine", 0.25), ("phase-cadence-coarse", 5.0)] {
        let (engine, clock) = build(run_id);
        engine.start_campaign("alice").expect("start");
        let mut hours = 0.0;
        while hours < 30.0 {
            hours += step;
            clock.set(at(hours));
            engine.run_scheduled().expect("sweep");
        }
        let state = engine.stored_state("alice").expect("state");
        assert_eq!(state.machine.status, CampaignStatus::Completed, "{run_id}");
        assert_eq!(state.active_phase, CampaignPhase::Election, "{run_id}");
        endings.push(state.machine.ended_at);
    }
    assert_eq!(endings[0], endings[1]);
    assert_eq!(endings[0], Some(at(CYCLE_GAME_HOURS)));
}

/// A cycle that was paused along the way ends later by the paused time.
#[test]
fn paused_cycle_ends_later_by_the_pause() {
    let machine = PhaseMachine::start(t0());
    let resumed = machine
        .pause(at(3.0))
        .expect("pause")
        .resume(at(5.0))
        .expect("resume");
    let done = resumed.complete(at(40.0)).expect("complete");
    assert_eq!(done.status, CampaignStatus::Completed);
    let ended = done.ended_at.expect("ended");
    let late = campaign_core::clock::game_hours_between(at(CYCLE_GAME_HOURS + 2.0), ended);
    assert!(late.abs() < 1e-3, "ended {late} game hours off schedule");
}

/// A machine that was paused and resumed survives a JSON round trip.
#[test]
fn resumed_machine_round_trips_through_json() {
    let machine = PhaseMachine::start(t0())
        .pause(at(7.0))
        .expect("pause")
        .resume(at(9.5))
        .expect("resume");
    let json = serde_json::to_string(&machine).expect("to json");
    let restored: PhaseMachine = serde_json::from_str(&json).expect("from json");
    assert_eq!(restored, machine);
    for hours in [9.5, 12.0, 20.0, 28.5] {
        assert_eq!(restored.current_phase(at(hours)), machine.current_phase(at(hours)));
    }
    assert_eq!(restored.current_phase(at(12.0)), CampaignPhase::Fundraising);
}
