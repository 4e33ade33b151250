//! Campaign phase machine: phase timing for one campaign cycle.
//!
//! The active phase is never stored as an independent fact. It is derived
//! from elapsed game hours:
//!
//!   elapsed = game_hours(started_at -> reference)
//!             - accumulated_paused_game_hours
//!             + advanced_game_hours
//!
//! where `reference` is `paused_at` while paused, `ended_at` once the cycle
//! has ended, and `now` otherwise. Walking the ordered phase table with that
//! value gives the same phase no matter when, or how often, it is asked.
//!
//! RULES:
//!   - Transitions are pure: they return a new value or an error, and the
//!     input is never modified.
//!   - Phase durations sum to CYCLE_GAME_HOURS.
//!   - Leaving a phase early requires that phase's objective to be met.

use crate::{
    clock::{game_hours_between, game_hours_to_real_ms, real_time_after_game_hours},
    config::{PhaseConfig, SimConfig},
    error::{ensure_non_negative, SimError, SimResult},
    rng::{compose_seed, derive_seed, hash_range, SeedPurpose},
    types::{GameHours, Instant, PlayerId},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Total length of one campaign cycle in game hours.
pub const CYCLE_GAME_HOURS: GameHours = 26.0;

/// Added when skipping to a phase boundary so float error can never
/// leave the machine just short of it.
const BOUNDARY_EPSILON: GameHours = 1e-6;

// ── Phases ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignPhase {
    Announcement,
    Fundraising,
    Primary,
    Debate,
    GeneralCampaign,
    FinalPush,
    Election,
}

impl CampaignPhase {
    /// Phase order. NEVER reorder; stored cycles depend on it.
    pub const ORDER: [CampaignPhase; 7] = [
        Self::Announcement,
        Self::Fundraising,
        Self::Primary,
        Self::Debate,
        Self::GeneralCampaign,
        Self::FinalPush,
        Self::Election,
    ];

    pub fn duration_hours(&self) -> GameHours {
        match self {
            Self::Announcement    => 6.0,
            Self::Fundraising     => 4.0,
            Self::Primary         => 3.0,
            Self::Debate          => 2.0,
            Self::GeneralCampaign => 4.0,
            Self::FinalPush       => 3.0,
            Self::Election        => 4.0,
        }
    }

    pub fn index(&self) -> usize {
        Self::ORDER.iter().position(|p| p == self).unwrap_or(0)
    }

    /// Game hours from cycle start to the beginning of this phase.
    pub fn offset_hours(&self) -> GameHours {
        Self::ORDER[..self.index()].iter().map(|p| p.duration_hours()).sum()
    }

    pub fn next(&self) -> Option<Self> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    /// Election results are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Election)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Announcement    => "announcement",
            Self::Fundraising     => "fundraising",
            Self::Primary         => "primary",
            Self::Debate          => "debate",
            Self::GeneralCampaign => "general_campaign",
            Self::FinalPush       => "final_push",
            Self::Election        => "election",
        }
    }

    pub fn parse(s: &str) -> SimResult<Self> {
        Self::ORDER
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SimError::Validation(format!("unknown campaign phase '{s}'")))
    }
}

impl fmt::Display for CampaignPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Running,
    Paused,
    Completed,
    Withdrawn,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running   => "running",
            Self::Paused    => "paused",
            Self::Completed => "completed",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> SimResult<Self> {
        match s {
            "running"   => Ok(Self::Running),
            "paused"    => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "withdrawn" => Ok(Self::Withdrawn),
            _ => Err(SimError::Validation(format!("unknown campaign status '{s}'"))),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Withdrawn)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Phase machine ────────────────────────────────────────────────────────────

/// Where the cycle stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseWindow {
    pub phase:              CampaignPhase,
    pub elapsed_game_hours: GameHours,
    pub elapsed_in_phase:   GameHours,
    pub remaining_in_phase: GameHours,
    /// True once the whole cycle (including the terminal phase) has elapsed.
    pub cycle_complete:     bool,
}

/// Inputs to the early-advancement predicates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseObjectives {
    pub funds_raised:          f64,
    pub endorsements_acquired: u32,
    pub debate_submitted:      bool,
}

/// The serialisable timing state of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMachine {
    pub started_at:                    Instant,
    pub paused_at:                     Option<Instant>,
    pub accumulated_paused_game_hours: GameHours,
    pub status:                        CampaignStatus,
    /// Game hours skipped by objective-based early advancement.
    #[serde(default)]
    pub advanced_game_hours:           GameHours,
    /// Freezes the derived phase once the cycle is completed or withdrawn.
    #[serde(default)]
    pub ended_at:                      Option<Instant>,
}

impl PhaseMachine {
    pub fn start(now: Instant) -> Self {
        Self {
            started_at: now,
            paused_at: None,
            accumulated_paused_game_hours: 0.0,
            status: CampaignStatus::Running,
            advanced_game_hours: 0.0,
            ended_at: None,
        }
    }

    fn reference_instant(&self, now: Instant) -> Instant {
        match self.status {
            CampaignStatus::Running => now,
            CampaignStatus::Paused => self.paused_at.unwrap_or(now),
            CampaignStatus::Completed | CampaignStatus::Withdrawn => self.ended_at.unwrap_or(now),
        }
    }

    /// Effective game hours into the cycle.
    pub fn elapsed_game_hours(&self, now: Instant) -> GameHours {
        let reference = self.reference_instant(now);
        let raw = game_hours_between(self.started_at, reference).max(0.0);
        (raw - self.accumulated_paused_game_hours + self.advanced_game_hours).max(0.0)
    }

    pub fn window(&self, now: Instant) -> PhaseWindow {
        window_for_elapsed(self.elapsed_game_hours(now))
    }

    pub fn current_phase(&self, now: Instant) -> CampaignPhase {
        self.window(now).phase
    }

    /// The real-time window of the current phase. `end - start` always equals
    /// the phase's configured duration.
    pub fn phase_bounds(&self, now: Instant) -> (Instant, Instant) {
        let window = self.window(now);
        let reference = self.reference_instant(now);
        let start = reference - Duration::milliseconds(game_hours_to_real_ms(window.elapsed_in_phase));
        let end = start + Duration::milliseconds(game_hours_to_real_ms(window.phase.duration_hours()));
        (start, end)
    }

    /// RUNNING -> PAUSED.
    pub fn pause(&self, now: Instant) -> SimResult<Self> {
        if self.status != CampaignStatus::Running {
            return Err(SimError::transition(self.status, "pause"));
        }
        Ok(Self {
            paused_at: Some(now),
            status: CampaignStatus::Paused,
            ..self.clone()
        })
    }

    /// PAUSED -> RUNNING. The pause is converted to game hours and banked.
    pub fn resume(&self, now: Instant) -> SimResult<Self> {
        if self.status != CampaignStatus::Paused {
            return Err(SimError::transition(self.status, "resume"));
        }
        let paused_at = self.paused_at.unwrap_or(now);
        let paused_hours = game_hours_between(paused_at, now).max(0.0);
        Ok(Self {
            paused_at: None,
            accumulated_paused_game_hours: self.accumulated_paused_game_hours + paused_hours,
            status: CampaignStatus::Running,
            ..self.clone()
        })
    }

    /// Any live status -> WITHDRAWN, except during the terminal phase.
    pub fn withdraw(&self, now: Instant) -> SimResult<Self> {
        if self.status.is_finished() {
            return Err(SimError::transition(self.status, "withdraw"));
        }
        let phase = self.current_phase(now);
        if phase.is_terminal() {
            return Err(SimError::transition(
                format!("in {phase} (results are final)"),
                "withdraw",
            ));
        }
        Ok(Self {
            ended_at: Some(self.reference_instant(now)),
            status: CampaignStatus::Withdrawn,
            ..self.clone()
        })
    }

    /// -> COMPLETED. Only legal once the terminal phase has been reached.
    /// A cycle that ran out while nobody looked ends at its scheduled end,
    /// not at the moment it was noticed.
    pub fn complete(&self, now: Instant) -> SimResult<Self> {
        if self.status.is_finished() {
            return Err(SimError::transition(self.status, "complete"));
        }
        let window = self.window(now);
        if !window.phase.is_terminal() {
            return Err(SimError::transition(format!("in {}", window.phase), "complete"));
        }
        let ended_at = if window.cycle_complete {
            self.scheduled_end()
        } else {
            self.reference_instant(now)
        };
        Ok(Self {
            ended_at: Some(ended_at),
            paused_at: None,
            status: CampaignStatus::Completed,
            ..self.clone()
        })
    }

    /// The instant the cycle runs out, given the pauses and early
    /// advancement banked so far.
    pub fn scheduled_end(&self) -> Instant {
        real_time_after_game_hours(
            self.started_at,
            CYCLE_GAME_HOURS + self.accumulated_paused_game_hours - self.advanced_game_hours,
        )
    }

    /// Jump to the start of the next phase when the current phase's
    /// objective has been met. Otherwise phases are strictly time-gated.
    pub fn advance_early(
        &self,
        now: Instant,
        objectives: &PhaseObjectives,
        config: &PhaseConfig,
    ) -> SimResult<Self> {
        if self.status != CampaignStatus::Running {
            return Err(SimError::transition(self.status, "advance phase early"));
        }
        let window = self.window(now);
        if window.phase.is_terminal() {
            return Err(SimError::transition(
                format!("in {} (terminal phase)", window.phase),
                "advance phase early",
            ));
        }
        if let Some(reason) = unmet_objective(window.phase, objectives, config) {
            return Err(SimError::transition(
                format!("in {} ({reason})", window.phase),
                "advance phase early",
            ));
        }
        Ok(Self {
            advanced_game_hours: self.advanced_game_hours
                + window.remaining_in_phase
                + BOUNDARY_EPSILON,
            ..self.clone()
        })
    }
}

fn window_for_elapsed(elapsed: GameHours) -> PhaseWindow {
    let mut offset = 0.0;
    for phase in CampaignPhase::ORDER {
        let end = offset + phase.duration_hours();
        if elapsed < end {
            return PhaseWindow {
                phase,
                elapsed_game_hours: elapsed,
                elapsed_in_phase: elapsed - offset,
                remaining_in_phase: end - elapsed,
                cycle_complete: false,
            };
        }
        offset = end;
    }
    let terminal = CampaignPhase::Election;
    PhaseWindow {
        phase: terminal,
        elapsed_game_hours: elapsed,
        elapsed_in_phase: terminal.duration_hours(),
        remaining_in_phase: 0.0,
        cycle_complete: true,
    }
}

/// `None` when the phase may be left early, otherwise why not.
fn unmet_objective(
    phase: CampaignPhase,
    objectives: &PhaseObjectives,
    config: &PhaseConfig,
) -> Option<String> {
    match phase {
        CampaignPhase::Fundraising => {
            if objectives.funds_raised >= config.min_funds_to_leave_fundraising {
                None
            } else {
                Some(format!(
                    "raised ${:.0} of ${:.0} required",
                    objectives.funds_raised, config.min_funds_to_leave_fundraising
                ))
            }
        }
        CampaignPhase::Primary => {
            if objectives.endorsements_acquired >= config.min_endorsements_to_leave_primary {
                None
            } else {
                Some(format!(
                    "{} of {} endorsements required",
                    objectives.endorsements_acquired, config.min_endorsements_to_leave_primary
                ))
            }
        }
        CampaignPhase::Debate => {
            if objectives.debate_submitted {
                None
            } else {
                Some("no debate performance submitted".into())
            }
        }
        _ => Some("phase is time-gated".into()),
    }
}

// ── Campaign phase state ─────────────────────────────────────────────────────

/// Per-cycle environmental difficulty, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyIndices {
    /// SPI; erodes fundraising efficiency.
    pub spend_pressure:        f64,
    /// VM; scales polling volatility.
    pub volatility_modifier:   f64,
    /// ES; dampens the recovery bought by scandal mitigation.
    pub engagement_saturation: f64,
}

impl DifficultyIndices {
    pub fn from_seed(cycle_seed: &str, config: &PhaseConfig) -> Self {
        let draw = |tag: &str| {
            hash_range(
                &derive_seed(cycle_seed, SeedPurpose::Difficulty, tag),
                config.difficulty_min,
                config.difficulty_max,
            )
            .clamp(0.0, 1.0)
        };
        Self {
            spend_pressure:        draw("spi"),
            volatility_modifier:   draw("vm"),
            engagement_saturation: draw("es"),
        }
    }
}

/// One player's active campaign cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPhaseState {
    pub player_id:             PlayerId,
    pub cycle:                 u32,
    pub active_phase:          CampaignPhase,
    pub phase_started_at:      Instant,
    pub phase_ends_at:         Instant,
    pub difficulty:            DifficultyIndices,
    pub funds_raised:          f64,
    pub funds_spent:           f64,
    pub endorsements_acquired: u32,
    pub active_scandals:       u32,
    pub reputation:            f64,
    /// Support points gained or lost to attack ads, on top of base support.
    #[serde(default)]
    pub support_shift:         f64,
    pub debate_submitted:      bool,
    pub seed:                  String,
    pub machine:               PhaseMachine,
    /// Optimistic concurrency token owned by the store.
    pub version:               i64,
}

/// Result of re-deriving the phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTransition {
    pub state:          CampaignPhaseState,
    pub from:           CampaignPhase,
    pub to:             CampaignPhase,
    pub cycle_complete: bool,
}

impl PhaseTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Begin a new cycle, either the player's first or a rollover from
/// `previous`. Fails while the previous cycle is still live.
pub fn start_cycle(
    player_id: &str,
    now: Instant,
    previous: Option<&CampaignPhaseState>,
    config: &SimConfig,
) -> SimResult<CampaignPhaseState> {
    let (cycle, reputation) = match previous {
        Some(prev) => {
            let done = prev.machine.status.is_finished() || prev.machine.window(now).cycle_complete;
            if !done {
                return Err(SimError::transition(
                    format!("cycle {} is {}", prev.cycle, prev.machine.status),
                    "start a new cycle",
                ));
            }
            (prev.cycle + 1, prev.reputation)
        }
        None => (1, config.phase.starting_reputation),
    };

    let seed = compose_seed(player_id, cycle, SeedPurpose::Cycle, "");
    let machine = PhaseMachine::start(now);
    let (phase_started_at, phase_ends_at) = machine.phase_bounds(now);

    Ok(CampaignPhaseState {
        player_id: player_id.to_string(),
        cycle,
        active_phase: machine.current_phase(now),
        phase_started_at,
        phase_ends_at,
        difficulty: DifficultyIndices::from_seed(&seed, &config.phase),
        funds_raised: 0.0,
        funds_spent: 0.0,
        endorsements_acquired: 0,
        active_scandals: 0,
        reputation: reputation.clamp(0.0, 100.0),
        support_shift: 0.0,
        debate_submitted: false,
        seed,
        machine,
        version: 0,
    })
}

/// Re-derive the active phase and its window. Idempotent: calling it any
/// number of times at the same `now` gives the same state.
pub fn advance_phase(state: &CampaignPhaseState, now: Instant) -> PhaseTransition {
    let window = state.machine.window(now);
    let next = state.with_machine(state.machine.clone(), now);
    PhaseTransition {
        from: state.active_phase,
        to: window.phase,
        cycle_complete: window.cycle_complete,
        state: next,
    }
}

impl CampaignPhaseState {
    /// Replace the machine and resynchronise the derived phase fields.
    fn with_machine(&self, machine: PhaseMachine, now: Instant) -> Self {
        let (phase_started_at, phase_ends_at) = machine.phase_bounds(now);
        Self {
            active_phase: machine.current_phase(now),
            phase_started_at,
            phase_ends_at,
            machine,
            ..self.clone()
        }
    }

    pub fn objectives(&self) -> PhaseObjectives {
        PhaseObjectives {
            funds_raised:          self.funds_raised,
            endorsements_acquired: self.endorsements_acquired,
            debate_submitted:      self.debate_submitted,
        }
    }

    pub fn available_funds(&self) -> f64 {
        (self.funds_raised - self.funds_spent).max(0.0)
    }

    pub fn is_live(&self) -> bool {
        !self.machine.status.is_finished()
    }

    pub fn pause(&self, now: Instant) -> SimResult<Self> {
        Ok(self.with_machine(self.machine.pause(now)?, now))
    }

    pub fn resume(&self, now: Instant) -> SimResult<Self> {
        Ok(self.with_machine(self.machine.resume(now)?, now))
    }

    pub fn withdraw(&self, now: Instant) -> SimResult<Self> {
        Ok(self.with_machine(self.machine.withdraw(now)?, now))
    }

    pub fn complete(&self, now: Instant) -> SimResult<Self> {
        Ok(self.with_machine(self.machine.complete(now)?, now))
    }

    pub fn advance_early(&self, now: Instant, config: &PhaseConfig) -> SimResult<Self> {
        let machine = self.machine.advance_early(now, &self.objectives(), config)?;
        Ok(self.with_machine(machine, now))
    }

    fn ensure_live(&self, action: &str) -> SimResult<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(SimError::transition(self.machine.status, action))
        }
    }

    /// Record a donation. Active endorsements add `fundraising_bonus`
    /// percent on top; spend pressure erodes what actually lands.
    /// Returns the new state and the amount credited.
    pub fn raise_funds(
        &self,
        amount: f64,
        fundraising_bonus: f64,
        config: &PhaseConfig,
    ) -> SimResult<(Self, f64)> {
        ensure_non_negative("donation amount", amount)?;
        ensure_non_negative("fundraising bonus", fundraising_bonus)?;
        self.ensure_live("raise funds")?;
        let credited = amount
            * (1.0 + fundraising_bonus / 100.0)
            * (1.0 - config.spend_pressure_drag * self.difficulty.spend_pressure);
        let next = Self {
            funds_raised: self.funds_raised + credited,
            ..self.clone()
        };
        Ok((next, credited))
    }

    /// Deduct `cost` from the budget. Callers check availability first.
    pub fn spend(&self, cost: f64) -> SimResult<Self> {
        ensure_non_negative("cost", cost)?;
        if cost > self.available_funds() + 1e-9 {
            return Err(SimError::Validation(format!(
                "cost ${cost:.2} exceeds available ${:.2}",
                self.available_funds()
            )));
        }
        Ok(Self {
            funds_spent: self.funds_spent + cost,
            ..self.clone()
        })
    }

    /// Shift polled support by `delta` points. The running shift stays
    /// within [-100, 100].
    pub fn apply_support_delta(&self, delta: f64) -> Self {
        Self {
            support_shift: (self.support_shift + delta).clamp(-100.0, 100.0),
            ..self.clone()
        }
    }

    pub fn submit_debate_performance(&self, now: Instant) -> SimResult<Self> {
        self.ensure_live("submit a debate performance")?;
        let phase = self.machine.current_phase(now);
        if phase != CampaignPhase::Debate {
            return Err(SimError::transition(
                format!("in {phase}"),
                "submit a debate performance",
            ));
        }
        Ok(Self {
            debate_submitted: true,
            ..self.clone()
        })
    }

    pub fn with_endorsement_count(&self, count: u32) -> Self {
        Self { endorsements_acquired: count, ..self.clone() }
    }

    pub fn with_active_scandals(&self, count: u32) -> Self {
        Self { active_scandals: count, ..self.clone() }
    }
}
