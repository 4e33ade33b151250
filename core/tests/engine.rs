//! Engine surface tests.
//!
//! Tests cover: command dispatch and wire format, scheduler idempotence
//! and which campaigns it touches,
//! snapshot export/import, audit sinks.

use std::sync::Arc;

use campaign_core::{
    clock::{real_time_after_game_hours, FixedClock},
    command::{CommandOutcome, PlayerCommand, QueuedCommand},
    config::SimConfig,
    endorsement_subsystem::{EndorsementCategory, EndorsementTier},
    engine::{CampaignEngine, SweepReport},
    error::SimError,
    event::MemorySink,
    influence_subsystem::InfluenceInputs,
    opposition_subsystem::ResearchType,
    phase_subsystem::CampaignPhase,
    scandal_subsystem::ScandalCategory,
    snapshot::{CampaignSnapshot, SNAPSHOT_FORMAT},
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

fn command(engine: &CampaignEngine, player_id: &str, command: PlayerCommand) -> CommandOutcome {
    engine
        .submit_command(&QueuedCommand { player_id: player_id.to_string(), command })
        .expect("command")
}

// ── Commands ──────────────────────────────────────────────────────

/// Each command reaches its operation and is recorded on receipt.
#[test]
fn commands_dispatch_to_operations() {
    let (engine, _clock) = build("engine-commands");

    let started = command(&engine, "alice", PlayerCommand::StartCampaign);
    match started {
        CommandOutcome::State { state } => {
            assert_eq!(state.active_phase, CampaignPhase::Announcement);
            assert_eq!(state.cycle, 1);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    match command(&engine, "alice", PlayerCommand::RaiseFunds { amount: 10_000.0 }) {
        CommandOutcome::FundsRaised { state, credited } => {
            assert!(credited > 0.0 && credited <= 10_000.0);
            assert!((state.funds_raised - credited).abs() < 1e-9);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    assert!(matches!(
        command(&engine, "alice", PlayerCommand::TakePoll),
        CommandOutcome::Poll { .. }
    ));
    assert!(matches!(
        command(
            &engine,
            "alice",
            PlayerCommand::AcquireEndorsement {
                category: EndorsementCategory::Grassroots,
                tier:     EndorsementTier::Local,
            }
        ),
        CommandOutcome::Endorsement { .. }
    ));
    assert!(matches!(
        command(&engine, "alice", PlayerCommand::BalanceAdjustment),
        CommandOutcome::Balance { .. }
    ));
    assert!(matches!(
        command(
            &engine,
            "alice",
            PlayerCommand::ComputeInfluence(InfluenceInputs {
                donation:          10_000.0,
                level:             2,
                state_weight:      0.4,
                hours_to_election: None,
                reputation:        60.0,
            })
        ),
        CommandOutcome::Influence { .. }
    ));

    let received = engine
        .events_for_player("alice")
        .expect("events")
        .iter()
        .filter(|e| e.event_type == "player_command_received")
        .count();
    assert_eq!(received, 6);
}

/// Commands addressed to a missing campaign are not found.
#[test]
fn commands_for_unknown_players_fail() {
    let (engine, _clock) = build("engine-unknown");
    let err = engine
        .submit_command(&QueuedCommand { player_id: "ghost".into(), command: PlayerCommand::Pause })
        .expect_err("no campaign");
    assert!(matches!(err, SimError::NotFound { .. }));
    assert!(matches!(engine.stored_state("ghost"), Err(SimError::NotFound { .. })));
}

/// Commands arrive as flat JSON objects tagged by `cmd`.
#[test]
fn commands_parse_from_json() {
    let raise: QueuedCommand =
        serde_json::from_str(r#"{"player_id":"alice","cmd":"raise_funds","amount":2500.0}"#)
            .expect("parse");
    assert_eq!(raise.player_id, "alice");
    assert_eq!(raise.command, PlayerCommand::RaiseFunds { amount: 2_500.0 });
    assert_eq!(raise.command.name(), "raise_funds");

    let scandal: QueuedCommand =
        serde_json::from_str(r#"{"player_id":"bob","cmd":"trigger_scandal"}"#).expect("parse");
    assert_eq!(scandal.command, PlayerCommand::TriggerScandal { category: None });

    let research: QueuedCommand = serde_json::from_str(
        r#"{"player_id":"alice","cmd":"commission_research","target_id":"bob",
            "research_type":"financial_records","amount":12000.0}"#,
    )
    .expect("parse");
    assert_eq!(
        research.command,
        PlayerCommand::CommissionResearch {
            target_id:     "bob".into(),
            research_type: ResearchType::FinancialRecords,
            amount:        12_000.0,
        }
    );

    assert!(serde_json::from_str::<QueuedCommand>(r#"{"player_id":"alice","cmd":"launch_rocket"}"#).is_err());
}

// ── Scheduler ─────────────────────────────────────────────────────

/// A second sweep at the same instant finds nothing left to do.
#[test]
fn scheduler_is_idempotent_at_same_instant() {
    let (engine, clock) = build("engine-sweep");
    engine.start_campaign("alice").expect("start");
    engine.start_campaign("bob").expect("start");
    engine
        .acquire_endorsement("alice", EndorsementCategory::Media, EndorsementTier::Local)
        .expect("endorse");

    clock.set(at(7.25));
    let first = engine.run_scheduled().expect("sweep");
    assert_eq!(first.players, 2);
    assert_eq!(first.phase_changes, 2);
    assert_eq!(first.endorsements_expired, 1);
    assert_eq!(first.polls_taken, 2);

    let second = engine.run_scheduled().expect("sweep");
    assert_eq!(second, SweepReport { players: 2, ..SweepReport::default() });
}

/// Withdrawn campaigns drop out of the sweep.
#[test]
fn scheduler_skips_withdrawn_players() {
    let (engine, clock) = build("engine-withdrawn");
    engine.start_campaign("alice").expect("start");
    engine.start_campaign("bob").expect("start");
    engine.withdraw("bob").expect("withdraw");

    clock.set(at(1.5));
    let report = engine.run_scheduled().expect("sweep");
    assert_eq!(report.players, 1);
    assert_eq!(report.polls_taken, 1);
    assert!(engine.latest_poll("bob").expect("poll").is_none());
}

/// Paused campaigns stay on the books but are neither polled nor hit by
/// scandals until they resume.
#[test]
fn scheduler_leaves_paused_players_alone() {
    let (engine, clock) = build("engine-paused");
    engine.start_campaign("alice").expect("start");
    engine.start_campaign("bob").expect("start");
    clock.set(at(0.5));
    engine.pause("bob").expect("pause");

    for hours in [1.5, 3.0, 4.5, 6.0] {
        clock.set(at(hours));
        let report = engine.run_scheduled().expect("sweep");
        assert_eq!(report.players, 2);
        assert_eq!(report.polls_taken, 1);
    }
    assert!(engine.latest_poll("bob").expect("poll").is_none());
    assert!(engine.scandals("bob").expect("scandals").is_empty());

    engine.resume("bob").expect("resume");
    clock.set(at(7.5));
    let report = engine.run_scheduled().expect("sweep");
    assert_eq!(report.polls_taken, 2);
    assert!(engine.latest_poll("bob").expect("poll").is_some());
}

/// Extra sinks see the same entries as the store.
#[test]
fn sinks_receive_every_entry() {
    let _ = env_logger::builder().is_test(true).try_init();
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(FixedClock::new(t0()));
    let engine = CampaignEngine::new(
        "engine-sink".to_string(),
        Box::new(SimStore::in_memory_migrated().expect("store")),
        clock.clone(),
        SimConfig::default_test(),
    )
    .expect("build engine")
    .with_sink(Box::new(sink.clone()));

    engine.start_campaign("alice").expect("start");
    engine.raise_funds("alice", 1_000.0).expect("raise");
    engine.take_poll("alice").expect("poll");

    let stored = engine.events_for_player("alice").expect("events");
    let seen: Vec<_> = sink
        .entries()
        .into_iter()
        .filter(|e| e.player_id.as_deref() == Some("alice"))
        .collect();
    assert_eq!(seen.len(), stored.len());
    assert_eq!(sink.count_of("funds_raised"), 1);
    assert_eq!(sink.count_of("polling_snapshot_taken"), 1);
}

// ── Snapshots ─────────────────────────────────────────────────────

/// Build up some history for alice, ending at hour eight.
fn seasoned_engine(run_id: &str) -> (CampaignEngine, Arc<FixedClock>) {
    let (engine, clock) = build(run_id);
    engine.start_campaign("alice").expect("start");
    engine.start_campaign("bob").expect("start");
    engine.raise_funds("alice", 100_000.0).expect("raise");
    engine
        .acquire_endorsement("alice", EndorsementCategory::Media, EndorsementTier::State)
        .expect("endorse");
    engine
        .acquire_endorsement("alice", EndorsementCategory::Party, EndorsementTier::Local)
        .expect("endorse");
    engine
        .trigger_scandal("alice", Some(ScandalCategory::Personal))
        .expect("scandal");
    engine
        .commission_research("alice", "bob", ResearchType::VotingRecord, 10_000.0)
        .expect("research")
        .value()
        .expect("funded");
    engine
        .compute_influence(
            "alice",
            &InfluenceInputs {
                donation:          100_000.0,
                level:             3,
                state_weight:      0.5,
                hours_to_election: None,
                reputation:        50.0,
            },
        )
        .expect("influence");
    for hour in 1..=8 {
        clock.set(at(hour as f64 + 0.1));
        engine.run_scheduled().expect("sweep");
    }
    (engine, clock)
}

/// Export, carry as JSON, import into a fresh store: same records.
#[test]
fn snapshot_moves_a_campaign_between_stores() {
    let (source, _source_clock) = seasoned_engine("engine-export");
    let snapshot = source.export_snapshot("alice").expect("export");
    assert_eq!(snapshot.format, SNAPSHOT_FORMAT);
    assert!(!snapshot.polls.is_empty());
    assert_eq!(snapshot.endorsements.len(), 1, "the media endorsement has expired");
    assert_eq!(snapshot.tallies[&EndorsementCategory::Media], 1);
    assert_eq!(snapshot.research.len(), 1);
    assert!(snapshot.influence.is_some());

    let json = snapshot.to_json().expect("to json");
    let parsed = CampaignSnapshot::from_json(&json).expect("from json");
    assert_eq!(parsed, snapshot);

    let (target, target_clock) = build("engine-import");
    target_clock.set(source.now());
    target.import_snapshot(&parsed).expect("import");
    assert_eq!(target.export_snapshot("alice").expect("re-export"), snapshot);

    let again = target
        .acquire_endorsement("alice", EndorsementCategory::Media, EndorsementTier::State)
        .expect("endorse");
    assert_eq!(again.diminishing_factor, 0.8, "the tally came across with the snapshot");

    let err = target.import_snapshot(&parsed).expect_err("duplicate import");
    assert!(matches!(err, SimError::Validation(_)));
}

/// Unknown snapshot formats are refused.
#[test]
fn snapshot_rejects_unknown_format() {
    let (source, _clock) = seasoned_engine("engine-format");
    let mut snapshot = source.export_snapshot("alice").expect("export");
    snapshot.format = SNAPSHOT_FORMAT + 1;
    let json = snapshot.to_json().expect("to json");
    assert!(matches!(
        CampaignSnapshot::from_json(&json),
        Err(SimError::Validation(_))
    ));
    assert!(CampaignSnapshot::from_json("{not json").is_err());
}
