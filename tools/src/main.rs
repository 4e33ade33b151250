//! campaign-runner: headless runner for the campaign simulation core.
//!
//! Usage:
//!   campaign-runner --players 3 --hours 30 --db run.db
//!   campaign-runner --ipc-mode [--realtime]
//!
//! The scripted run drives every player through one full cycle on a fixed
//! clock, one game hour per step. IPC mode reads one JSON request per line
//! on stdin and answers with one JSON line on stdout.

use anyhow::{Context, Result};
use campaign_core::{
    clock::{Clock, FixedClock, SystemClock},
    command::QueuedCommand,
    config::SimConfig,
    endorsement_subsystem::{EndorsementCategory, EndorsementTier},
    engine::CampaignEngine,
    error::SimResult,
    event::{LogSink, MemorySink},
    influence_subsystem::InfluenceInputs,
    negative_ad_subsystem::AdRequest,
    opposition_subsystem::{ResearchStatus, ResearchType},
    phase_subsystem::CYCLE_GAME_HOURS,
    spend::SpendOutcome,
    store::SimStore,
    types::PlayerId,
};
use chrono::{TimeZone, Utc};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcRequest {
    /// A player command, e.g. `{"type":"command","player_id":"p1","cmd":"take_poll"}`.
    Command(QueuedCommand),
    State { player_id: PlayerId },
    /// Full record set for one player as a portable snapshot.
    Export { player_id: PlayerId },
    Advance { game_hours: f64 },
    Sweep,
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let players = parse_arg(&args, "--players", 3usize).max(2);
    let hours = parse_arg(&args, "--hours", CYCLE_GAME_HOURS.ceil() as u32 + 2);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let realtime = args.iter().any(|a| a == "--realtime");
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = str_arg(&args, "--data-dir").unwrap_or("./data");

    if !ipc_mode {
        println!("campaign-runner");
        println!("  players:   {players}");
        println!("  hours:     {hours}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = SimConfig::load(data_dir).context("loading tuning tables")?;
    let store = if db == ":memory:" {
        SimStore::in_memory()?
    } else {
        SimStore::open(db)?
    };
    store.migrate()?;

    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .context("fixed start instant")?;
    let fixed = Arc::new(FixedClock::new(start));
    let clock: Arc<dyn Clock> = if realtime {
        Arc::new(SystemClock)
    } else {
        fixed.clone()
    };

    let run_id = format!("run-{}", epoch_secs());
    let audit = Arc::new(MemorySink::new());
    let engine = CampaignEngine::new(run_id.clone(), Box::new(store), clock, config)?
        .with_sink(Box::new(LogSink))
        .with_sink(Box::new(audit.clone()));

    if ipc_mode {
        run_ipc_loop(&engine, &fixed)?;
    } else {
        run_script(&engine, &fixed, players, hours)?;
        print_summary(&engine, &audit, players)?;
    }
    Ok(())
}

fn run_ipc_loop(engine: &CampaignEngine, clock: &FixedClock) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut buffer = String::new();
    let mut handle = stdin.lock();

    loop {
        buffer.clear();
        if handle.read_line(&mut buffer)? == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let request: IpcRequest = match serde_json::from_str(&buffer) {
            Ok(r) => r,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };

        let reply = match request {
            IpcRequest::Quit => break,
            IpcRequest::Command(queued) => to_reply(engine.submit_command(&queued)),
            IpcRequest::State { player_id } => to_reply(engine.campaign_state(&player_id)),
            IpcRequest::Export { player_id } => to_reply(engine.export_snapshot(&player_id)),
            IpcRequest::Advance { game_hours } => {
                clock.advance_game_hours(game_hours);
                to_reply(engine.run_scheduled().map(|r| format!("{r:?}")))
            }
            IpcRequest::Sweep => to_reply(engine.run_scheduled().map(|r| format!("{r:?}"))),
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn to_reply<T: serde::Serialize>(result: SimResult<T>) -> serde_json::Value {
    match result.map(|v| serde_json::to_value(v)) {
        Ok(Ok(value)) => serde_json::json!({ "ok": value }),
        Ok(Err(e)) => serde_json::json!({ "error": e.to_string() }),
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    }
}

fn player_name(i: usize) -> PlayerId {
    format!("candidate-{}", i + 1)
}

/// Game-rule rejections are part of a scripted run, not failures.
fn note<T>(context: &str, result: SimResult<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("script: {context}: {e}");
            None
        }
    }
}

fn run_script(engine: &CampaignEngine, clock: &FixedClock, players: usize, hours: u32) -> Result<()> {
    let names: Vec<PlayerId> = (0..players).map(player_name).collect();
    for name in &names {
        engine.start_campaign(name)?;
    }

    let mut research_ids: Vec<Option<String>> = vec![None; players];
    let mut ad_ids: Vec<Option<String>> = vec![None; players];

    for hour in 0..=hours {
        for (i, name) in names.iter().enumerate() {
            let rival = &names[(i + 1) % players];
            match hour {
                1 => {
                    note("raise funds", engine.raise_funds(name, 70_000.0 + 15_000.0 * i as f64));
                }
                6 => {
                    note(
                        "party endorsement",
                        engine.acquire_endorsement(name, EndorsementCategory::Party, EndorsementTier::National),
                    );
                    note(
                        "union endorsement",
                        engine.acquire_endorsement(name, EndorsementCategory::Union, EndorsementTier::State),
                    );
                }
                8 => {
                    let outcome = note(
                        "commission research",
                        engine.commission_research(name, rival, ResearchType::BackgroundCheck, 12_000.0),
                    );
                    if let Some(SpendOutcome::Completed { value, .. }) = outcome {
                        research_ids[i] = Some(value.research_id);
                    }
                }
                13 => {
                    note("debate", engine.submit_debate(name));
                }
                16 => {
                    let research_id = research_ids[i].clone().filter(|id| {
                        engine
                            .research(name)
                            .map(|all| {
                                all.iter()
                                    .any(|r| &r.research_id == id && r.status == ResearchStatus::Complete)
                            })
                            .unwrap_or(false)
                    });
                    let request = AdRequest {
                        target_id: rival.clone(),
                        amount: 20_000.0,
                        research_id,
                        extreme: false,
                    };
                    if let Some(SpendOutcome::Completed { value, .. }) =
                        note("negative ad", engine.launch_negative_ad(name, &request))
                    {
                        ad_ids[i] = Some(value.ad_id);
                    }
                }
                17 => {
                    // Each candidate answers the ad aimed at them.
                    let attacker = (i + players - 1) % players;
                    if let Some(ad_id) = &ad_ids[attacker] {
                        note("counter ad", engine.counter_negative_ad(name, ad_id, 10_000.0));
                    }
                }
                22 => {
                    let inputs = InfluenceInputs {
                        donation:          5_000.0 * (i + 1) as f64,
                        level:             (i as u32 % 5) + 1,
                        state_weight:      0.5,
                        hours_to_election: Some(4.0),
                        reputation:        engine.effective_reputation(name).unwrap_or(50.0),
                    };
                    note("influence", engine.compute_influence(name, &inputs));
                }
                _ => {}
            }
        }

        let report = engine.run_scheduled()?;
        log::debug!("script: hour {hour}: {report:?}");
        clock.advance_game_hours(1.0);
    }
    Ok(())
}

fn print_summary(engine: &CampaignEngine, audit: &MemorySink, players: usize) -> Result<()> {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", engine.run_id);
    println!("  audit events:   {}", audit.entries().len());
    println!("  scandals:       {}", audit.count_of("scandal_discovered"));
    println!("  negative ads:   {}", audit.count_of("negative_ad_launched"));
    println!("  spend rejected: {}", audit.count_of("spend_rejected"));
    println!();
    println!("=== CANDIDATES ===");
    for i in 0..players {
        let name = player_name(i);
        let state = engine.stored_state(&name)?;
        let support = engine
            .latest_poll(&name)?
            .map(|p| format!("{:.1}% ±{:.1}", p.final_support, p.margin_of_error))
            .unwrap_or_else(|| "no polls".to_string());
        let balance = engine.balance_adjustment(&name).ok();
        println!(
            "  {name} | cycle {} {} ({}) | rep {:.1} | funds ${:.0} | support {support}{}",
            state.cycle,
            state.machine.status,
            state.active_phase,
            state.reputation,
            state.available_funds(),
            match balance {
                Some(b) if b.is_frontrunner => format!(" | frontrunner x{:.2}", b.cost_multiplier),
                Some(b) if b.is_underdog => format!(" | underdog +{:.2}", b.underdog_buff),
                _ => String::new(),
            }
        );
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn epoch_secs() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .to_string()
}
