//! Audit events: everything the engine did, as structured records.
//!
//! RULE: Sinks are fire-and-forget. `emit` never returns an error and the
//! engine never retries; a sink that fails logs the failure and moves on.

use crate::{
    fairness_subsystem::FairnessAuditEvent,
    phase_subsystem::CampaignPhase,
    types::{Instant, PlayerId, RecordId, RunId},
};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Every event the engine records.
/// Variants may be added; never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine events ──────────────────────────────
    RunInitialized {
        run_id: RunId,
    },
    PlayerCommandReceived {
        player_id:    PlayerId,
        command_type: String,
    },

    // ── Phase machine events ───────────────────────
    CampaignStarted {
        player_id:      PlayerId,
        cycle:          u32,
        seed:           String,
        spend_pressure: f64,
        volatility:     f64,
        saturation:     f64,
    },
    PhaseAdvanced {
        player_id: PlayerId,
        cycle:     u32,
        from:      CampaignPhase,
        to:        CampaignPhase,
        early:     bool,
    },
    CampaignPaused {
        player_id: PlayerId,
        cycle:     u32,
    },
    CampaignResumed {
        player_id: PlayerId,
        cycle:     u32,
    },
    CampaignWithdrawn {
        player_id: PlayerId,
        cycle:     u32,
        phase:     CampaignPhase,
    },
    CampaignCompleted {
        player_id:  PlayerId,
        cycle:      u32,
        reputation: f64,
    },
    FundsRaised {
        player_id: PlayerId,
        requested: f64,
        credited:  f64,
    },
    DebateSubmitted {
        player_id: PlayerId,
        cycle:     u32,
    },
    SpendRejected {
        player_id: PlayerId,
        action:    String,
        cost:      f64,
        available: f64,
    },

    // ── Polling events ─────────────────────────────
    PollingSnapshotTaken {
        player_id:       PlayerId,
        final_support:   f64,
        margin_of_error: f64,
        sample_size:     u32,
    },

    // ── Endorsement events ─────────────────────────
    EndorsementAcquired {
        player_id:          PlayerId,
        endorsement_id:     RecordId,
        category:           String,
        diminishing_factor: f64,
        influence_bonus:    f64,
    },
    EndorsementsExpired {
        player_id: PlayerId,
        count:     usize,
    },

    // ── Scandal events ─────────────────────────────
    ScandalDiscovered {
        player_id:      PlayerId,
        scandal_id:     RecordId,
        category:       String,
        severity:       f64,
        reputation_hit: f64,
    },
    ScandalMitigated {
        player_id:     PlayerId,
        scandal_id:    RecordId,
        action:        String,
        recovery_rate: f64,
        cost:          f64,
    },
    ScandalContained {
        player_id:  PlayerId,
        scandal_id: RecordId,
    },
    ScandalResolved {
        player_id:  PlayerId,
        scandal_id: RecordId,
        automatic:  bool,
    },

    // ── Opposition events ──────────────────────────
    ResearchCommissioned {
        player_id:     PlayerId,
        research_id:   RecordId,
        target_id:     PlayerId,
        research_type: String,
        cost:          f64,
    },
    ResearchCompleted {
        player_id:   PlayerId,
        research_id: RecordId,
        status:      String,
        tier:        Option<String>,
    },
    NegativeAdLaunched {
        player_id:     PlayerId,
        ad_id:         RecordId,
        target_id:     PlayerId,
        effectiveness: f64,
        backfired:     bool,
        ethics:        f64,
    },
    NegativeAdCountered {
        player_id:  PlayerId,
        counter_id: RecordId,
        ad_id:      RecordId,
        reduction:  f64,
    },

    // ── Influence / fairness events ────────────────
    InfluenceComputed {
        player_id: PlayerId,
        total:     i64,
        floor:     f64,
    },
    FairnessAudit {
        audit: FairnessAuditEvent,
    },
}

impl SimEvent {
    /// Stable name for the event_type column.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. }        => "run_initialized",
            Self::PlayerCommandReceived { .. } => "player_command_received",
            Self::CampaignStarted { .. }       => "campaign_started",
            Self::PhaseAdvanced { .. }         => "phase_advanced",
            Self::CampaignPaused { .. }        => "campaign_paused",
            Self::CampaignResumed { .. }       => "campaign_resumed",
            Self::CampaignWithdrawn { .. }     => "campaign_withdrawn",
            Self::CampaignCompleted { .. }     => "campaign_completed",
            Self::FundsRaised { .. }           => "funds_raised",
            Self::DebateSubmitted { .. }       => "debate_submitted",
            Self::SpendRejected { .. }         => "spend_rejected",
            Self::PollingSnapshotTaken { .. }  => "polling_snapshot_taken",
            Self::EndorsementAcquired { .. }   => "endorsement_acquired",
            Self::EndorsementsExpired { .. }   => "endorsements_expired",
            Self::ScandalDiscovered { .. }     => "scandal_discovered",
            Self::ScandalMitigated { .. }      => "scandal_mitigated",
            Self::ScandalContained { .. }      => "scandal_contained",
            Self::ScandalResolved { .. }       => "scandal_resolved",
            Self::ResearchCommissioned { .. }  => "research_commissioned",
            Self::ResearchCompleted { .. }     => "research_completed",
            Self::NegativeAdLaunched { .. }    => "negative_ad_launched",
            Self::NegativeAdCountered { .. }   => "negative_ad_countered",
            Self::InfluenceComputed { .. }     => "influence_computed",
            Self::FairnessAudit { .. }         => "fairness_audit",
        }
    }

    pub fn player_id(&self) -> Option<&str> {
        match self {
            Self::RunInitialized { .. } => None,
            Self::FairnessAudit { audit } => Some(audit.player_id.as_str()),
            Self::PlayerCommandReceived { player_id, .. }
            | Self::CampaignStarted { player_id, .. }
            | Self::PhaseAdvanced { player_id, .. }
            | Self::CampaignPaused { player_id, .. }
            | Self::CampaignResumed { player_id, .. }
            | Self::CampaignWithdrawn { player_id, .. }
            | Self::CampaignCompleted { player_id, .. }
            | Self::FundsRaised { player_id, .. }
            | Self::DebateSubmitted { player_id, .. }
            | Self::SpendRejected { player_id, .. }
            | Self::PollingSnapshotTaken { player_id, .. }
            | Self::EndorsementAcquired { player_id, .. }
            | Self::EndorsementsExpired { player_id, .. }
            | Self::ScandalDiscovered { player_id, .. }
            | Self::ScandalMitigated { player_id, .. }
            | Self::ScandalContained { player_id, .. }
            | Self::ScandalResolved { player_id, .. }
            | Self::ResearchCommissioned { player_id, .. }
            | Self::ResearchCompleted { player_id, .. }
            | Self::NegativeAdLaunched { player_id, .. }
            | Self::NegativeAdCountered { player_id, .. }
            | Self::InfluenceComputed { player_id, .. } => Some(player_id.as_str()),
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:          Option<i64>,
    pub run_id:      RunId,
    pub player_id:   Option<PlayerId>,
    pub occurred_at: Instant,
    pub subsystem:   String,
    pub event_type:  String,
    pub payload:     String, // JSON-serialized SimEvent
}

impl EventLogEntry {
    pub fn new(run_id: &str, subsystem: &str, event: &SimEvent, at: Instant) -> serde_json::Result<Self> {
        Ok(Self {
            id:          None,
            run_id:      run_id.to_string(),
            player_id:   event.player_id().map(str::to_string),
            occurred_at: at,
            subsystem:   subsystem.to_string(),
            event_type:  event.event_type().to_string(),
            payload:     serde_json::to_string(event)?,
        })
    }

    pub fn event(&self) -> serde_json::Result<SimEvent> {
        serde_json::from_str(&self.payload)
    }
}

// ── Sinks ────────────────────────────────────────────────────────────────────

/// Receives audit events. Must not block the engine.
pub trait AuditSink: Send {
    fn emit(&self, entry: &EventLogEntry);
}

/// Writes every event to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AuditSink for LogSink {
    fn emit(&self, entry: &EventLogEntry) {
        log::debug!(
            "audit: [{}] {} {}",
            entry.subsystem,
            entry.event_type,
            entry.payload
        );
    }
}

/// Keeps events in memory. Used by tests and the runner summary.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<EventLogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<EventLogEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl AuditSink for MemorySink {
    fn emit(&self, entry: &EventLogEntry) {
        match self.entries.lock() {
            Ok(mut guard) => guard.push(entry.clone()),
            Err(poisoned) => poisoned.into_inner().push(entry.clone()),
        }
    }
}

impl<T: AuditSink + Sync> AuditSink for std::sync::Arc<T> {
    fn emit(&self, entry: &EventLogEntry) {
        (**self).emit(entry)
    }
}
