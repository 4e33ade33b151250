use serde::{Deserialize, Serialize};

use crate::{
    balance_subsystem::BalanceAdjustment,
    endorsement_subsystem::{EndorsementCategory, EndorsementRecord, EndorsementTier},
    influence_subsystem::{InfluenceBreakdown, InfluenceInputs},
    negative_ad_subsystem::{AdRequest, CounterAd, NegativeAd},
    opposition_subsystem::{OppositionResearch, ResearchType},
    phase_subsystem::CampaignPhaseState,
    polling_subsystem::PollingSnapshot,
    scandal_subsystem::{MitigationAction, ScandalCategory, ScandalRecord},
    spend::SpendOutcome,
    types::{PlayerId, RecordId},
};

/// All player-issued commands.
/// Variants may be added; never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum PlayerCommand {
    // ── Cycle control ─────────────────────────────
    StartCampaign,
    Pause,
    Resume,
    Withdraw,
    Complete,
    AdvanceEarly,
    SubmitDebate,
    RaiseFunds { amount: f64 },

    // ── Polling ───────────────────────────────────
    TakePoll,

    // ── Endorsements ──────────────────────────────
    AcquireEndorsement {
        category: EndorsementCategory,
        tier:     EndorsementTier,
    },

    // ── Scandals ──────────────────────────────────
    TriggerScandal {
        #[serde(default)]
        category: Option<ScandalCategory>,
    },
    MitigateScandal {
        scandal_id: RecordId,
        action:     MitigationAction,
    },
    ContainScandal { scandal_id: RecordId },
    ResolveScandal { scandal_id: RecordId },

    // ── Opposition ────────────────────────────────
    CommissionResearch {
        target_id:     PlayerId,
        research_type: ResearchType,
        amount:        f64,
    },
    CompleteResearch { research_id: RecordId },
    LaunchNegativeAd(AdRequest),
    CounterNegativeAd {
        ad_id:  RecordId,
        amount: f64,
    },

    // ── Standing ──────────────────────────────────
    BalanceAdjustment,
    ComputeInfluence(InfluenceInputs),
}

impl PlayerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartCampaign           => "start_campaign",
            Self::Pause                   => "pause",
            Self::Resume                  => "resume",
            Self::Withdraw                => "withdraw",
            Self::Complete                => "complete",
            Self::AdvanceEarly            => "advance_early",
            Self::SubmitDebate            => "submit_debate",
            Self::RaiseFunds { .. }       => "raise_funds",
            Self::TakePoll                => "take_poll",
            Self::AcquireEndorsement { .. } => "acquire_endorsement",
            Self::TriggerScandal { .. }   => "trigger_scandal",
            Self::MitigateScandal { .. }  => "mitigate_scandal",
            Self::ContainScandal { .. }   => "contain_scandal",
            Self::ResolveScandal { .. }   => "resolve_scandal",
            Self::CommissionResearch { .. } => "commission_research",
            Self::CompleteResearch { .. } => "complete_research",
            Self::LaunchNegativeAd(_)     => "launch_negative_ad",
            Self::CounterNegativeAd { .. } => "counter_negative_ad",
            Self::BalanceAdjustment       => "balance_adjustment",
            Self::ComputeInfluence(_)     => "compute_influence",
        }
    }
}

/// A command addressed to one player's campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedCommand {
    pub player_id: PlayerId,
    #[serde(flatten)]
    pub command:   PlayerCommand,
}

/// What a command produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    State { state: CampaignPhaseState },
    FundsRaised { state: CampaignPhaseState, credited: f64 },
    Poll { snapshot: PollingSnapshot },
    Endorsement { record: EndorsementRecord },
    Scandal { record: ScandalRecord },
    Mitigation { outcome: SpendOutcome<ScandalRecord> },
    Research { outcome: SpendOutcome<OppositionResearch> },
    ResearchResult { research: OppositionResearch },
    NegativeAd { outcome: SpendOutcome<NegativeAd> },
    Counter { outcome: SpendOutcome<CounterAd> },
    Balance { adjustment: BalanceAdjustment },
    Influence { breakdown: InfluenceBreakdown },
}
