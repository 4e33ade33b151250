//! Negative advertising: launch, backfire and counter ads.
//!
//! Effectiveness of a launched ad:
//!
//!   eff = research_eff × spend_tier × phase_timing
//!         × (1 − ethics/100) × (1 − fatigue)        clamped to [0, 100]
//!
//! research_eff is the backing discovery's quality score, or a flat
//! baseline for an unresearched attack.
//!
//! RULE: ads are immutable once launched. A counter ad is its own record;
//! the ad's current effectiveness is derived from the counters against it.

use crate::{
    clock::game_hours_between,
    config::NegativeAdConfig,
    error::{SimError, SimResult},
    opposition_subsystem::{OppositionResearch, ResearchStatus},
    phase_subsystem::{CampaignPhase, CampaignPhaseState},
    rng::{chance, derive_seed, SeedPurpose},
    spend::{check_budget, SpendOutcome, SpendTier},
    types::{Instant, PlayerId, RecordId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeAd {
    pub ad_id:                  RecordId,
    pub player_id:              PlayerId,
    pub target_id:              PlayerId,
    pub research_id:            Option<RecordId>,
    pub spend_tier:             SpendTier,
    pub amount_spent:           f64,
    pub launched_at:            Instant,
    pub phase:                  CampaignPhase,
    pub extreme:                bool,
    pub credibility:            f64,
    pub effectiveness:          f64,
    pub backfire_probability:   f64,
    pub backfired:              bool,
    pub ethics_penalty:         f64,
    pub voter_fatigue:          f64,
    /// Support points the target gains (positive) or loses (negative).
    pub target_support_delta:   f64,
    pub attacker_support_delta: f64,
    /// The part of `target_support_delta` that actually landed. Zero when
    /// the target had no live campaign at launch.
    #[serde(default)]
    pub applied_target_delta:   f64,
    pub seed:                   String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterAd {
    pub counter_id:   RecordId,
    pub ad_id:        RecordId,
    pub player_id:    PlayerId,
    pub amount_spent: f64,
    /// Reduction this counter contributes on its own, in [0, max].
    pub reduction:    f64,
    pub countered_at: Instant,
}

/// An ad as it stands after every counter launched against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeAdView {
    pub ad:                    NegativeAd,
    pub countered:             bool,
    pub counter_reduction:     f64,
    pub current_effectiveness: f64,
    pub current_target_delta:  f64,
}

/// What the attacker asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdRequest {
    pub target_id:   PlayerId,
    pub amount:      f64,
    #[serde(default)]
    pub research_id: Option<RecordId>,
    #[serde(default)]
    pub extreme:     bool,
}

/// `None` where ads may not run at all.
pub fn phase_timing_multiplier(phase: CampaignPhase) -> Option<f64> {
    match phase {
        CampaignPhase::Announcement    => None,
        CampaignPhase::Fundraising     => Some(0.8),
        CampaignPhase::Primary         => Some(1.0),
        CampaignPhase::Debate          => Some(1.1),
        CampaignPhase::GeneralCampaign => Some(1.2),
        CampaignPhase::FinalPush       => Some(1.0),
        CampaignPhase::Election        => Some(0.6),
    }
}

/// Ads by `player_id` launched in the `window_hours` game hours up to `now`.
fn recent_ads<'a>(
    history: &'a [NegativeAd],
    player_id: &'a str,
    now: Instant,
    window_hours: f64,
) -> impl Iterator<Item = &'a NegativeAd> + 'a {
    history.iter().filter(move |ad| {
        let age = game_hours_between(ad.launched_at, now);
        ad.player_id == player_id && age >= 0.0 && age < window_hours
    })
}

/// Ethics penalty in [0, 100]. The credibility term only applies to
/// research-backed attacks.
pub fn ethics_penalty(
    research_credibility: Option<f64>,
    history: &[NegativeAd],
    player_id: &str,
    extreme: bool,
    now: Instant,
    config: &NegativeAdConfig,
) -> f64 {
    let credibility_term = research_credibility
        .map(|c| (1.0 - c.clamp(0.0, 1.0)) * config.credibility_ethics_weight)
        .unwrap_or(0.0);
    let repeats = recent_ads(history, player_id, now, config.repeat_window_hours).count();
    let repeat_term = (repeats as f64 * config.repeat_ethics_per_ad).min(config.max_repeat_ethics);
    let extreme_term = if extreme { config.extreme_ethics_penalty } else { 0.0 };
    (credibility_term + repeat_term + extreme_term).clamp(0.0, 100.0)
}

/// Voter fatigue in [0, max_fatigue]: grows with ad frequency over the
/// trailing window and fades linearly after the most recent ad.
pub fn voter_fatigue(
    history: &[NegativeAd],
    player_id: &str,
    now: Instant,
    config: &NegativeAdConfig,
) -> f64 {
    let window = config.fatigue_window_hours;
    let mut count = 0usize;
    let mut latest: Option<Instant> = None;
    for ad in recent_ads(history, player_id, now, window) {
        count += 1;
        latest = latest.max(Some(ad.launched_at));
    }
    let Some(latest) = latest else {
        return 0.0;
    };
    let saturation = (count as f64 * config.fatigue_per_ad).min(config.max_fatigue);
    let decay = (1.0 - game_hours_between(latest, now) / window).max(0.0);
    saturation * decay
}

pub fn backfire_probability(
    credibility: f64,
    ethics_penalty: f64,
    extreme: bool,
    config: &NegativeAdConfig,
) -> f64 {
    let credibility_risk = (1.0 - credibility.clamp(0.0, 1.0)) * config.backfire_credibility_weight;
    let ethics_risk = ethics_penalty / 100.0 * config.backfire_ethics_weight;
    let extreme_risk = if extreme { config.extreme_backfire_bonus } else { 0.0 };
    (credibility_risk + ethics_risk + extreme_risk).clamp(0.0, config.max_backfire_probability)
}

pub fn compute_effectiveness(
    research_effectiveness: f64,
    tier: SpendTier,
    phase_multiplier: f64,
    ethics_penalty: f64,
    fatigue: f64,
) -> f64 {
    (research_effectiveness
        * tier.ad_multiplier()
        * phase_multiplier
        * (1.0 - ethics_penalty / 100.0)
        * (1.0 - fatigue))
        .clamp(0.0, 100.0)
}

/// Polling swing (target delta, attacker delta) for a resolved ad.
pub fn support_impact(effectiveness: f64, backfired: bool, config: &NegativeAdConfig) -> (f64, f64) {
    if backfired {
        let target_gain = (effectiveness * config.backfire_target_gain_rate)
            .min(config.max_backfire_target_gain);
        let attacker_loss = (effectiveness * config.backfire_attacker_loss_rate)
            .min(config.max_backfire_attacker_loss);
        (target_gain, -attacker_loss)
    } else {
        let target_loss = (effectiveness * config.target_swing_per_effectiveness)
            .min(config.max_target_swing);
        (-target_loss, -(target_loss * config.attacker_cost_fraction))
    }
}

/// Launch an attack ad for the attacker described by `state`.
///
/// `research` must be a completed job by the same player against the
/// same target when `request.research_id` is set.
pub fn launch_negative_ad(
    ad_id: &str,
    state: &CampaignPhaseState,
    request: &AdRequest,
    research: Option<&OppositionResearch>,
    history: &[NegativeAd],
    now: Instant,
    config: &NegativeAdConfig,
) -> SimResult<SpendOutcome<NegativeAd>> {
    if !state.is_live() {
        return Err(SimError::transition(state.machine.status, "launch_negative_ad"));
    }
    if request.target_id.is_empty() || request.target_id == state.player_id {
        return Err(SimError::Validation("negative ad needs a rival target".into()));
    }
    let tier = SpendTier::from_amount(request.amount)?;
    let phase = state.active_phase;
    let Some(phase_multiplier) = phase_timing_multiplier(phase) else {
        return Err(SimError::transition(phase, "launch_negative_ad"));
    };

    let discovery = match (&request.research_id, research) {
        (None, _) => None,
        (Some(id), Some(r)) if &r.research_id == id => {
            if r.player_id != state.player_id || r.target_id != request.target_id {
                return Err(SimError::not_found("research", id));
            }
            match (&r.status, &r.discovery) {
                (ResearchStatus::Complete, Some(d)) => Some(d),
                _ => {
                    return Err(SimError::Validation(format!(
                        "research {id} has no usable discovery ({})",
                        r.status
                    )))
                }
            }
        }
        (Some(id), _) => return Err(SimError::not_found("research", id)),
    };

    if let Some(short) = check_budget(request.amount, state.available_funds()) {
        return Ok(short);
    }

    let (research_effectiveness, credibility) = match discovery {
        Some(d) => (d.quality_score, d.credibility),
        None => (config.baseline_effectiveness, config.unresearched_credibility),
    };
    let ethics = ethics_penalty(
        discovery.map(|d| d.credibility),
        history,
        &state.player_id,
        request.extreme,
        now,
        config,
    );
    let fatigue = voter_fatigue(history, &state.player_id, now, config);
    let effectiveness =
        compute_effectiveness(research_effectiveness, tier, phase_multiplier, ethics, fatigue);

    let backfire_p = backfire_probability(credibility, ethics, request.extreme, config);
    let prior = history.iter().filter(|ad| ad.player_id == state.player_id).count();
    let seed = derive_seed(
        &state.seed,
        SeedPurpose::Backfire,
        &format!("{}:{prior}", request.target_id),
    );
    let backfired = chance(&seed, backfire_p);
    let (target_delta, attacker_delta) = support_impact(effectiveness, backfired, config);

    if backfired {
        log::info!(
            "negative_ad: {} → {} backfired (p={backfire_p:.2}, eff={effectiveness:.1})",
            state.player_id,
            request.target_id
        );
    }

    let ad = NegativeAd {
        ad_id: ad_id.to_string(),
        player_id: state.player_id.clone(),
        target_id: request.target_id.clone(),
        research_id: request.research_id.clone(),
        spend_tier: tier,
        amount_spent: request.amount,
        launched_at: now,
        phase,
        extreme: request.extreme,
        credibility,
        effectiveness,
        backfire_probability: backfire_p,
        backfired,
        ethics_penalty: ethics,
        voter_fatigue: fatigue,
        target_support_delta: target_delta,
        attacker_support_delta: attacker_delta,
        applied_target_delta: 0.0,
        seed,
    };
    Ok(SpendOutcome::Completed { value: ad, cost: request.amount })
}

/// Diminishing-returns reduction bought by one counter spend.
pub fn counter_reduction(amount: f64, config: &NegativeAdConfig) -> f64 {
    if amount <= 0.0 {
        return 0.0;
    }
    (amount / (amount + config.counter_half_saturation)).min(config.max_counter_reduction)
}

/// Counters compose multiplicatively; the total is capped.
pub fn combined_reduction(counters: &[CounterAd], config: &NegativeAdConfig) -> f64 {
    let remaining: f64 = counters.iter().map(|c| 1.0 - c.reduction).product();
    (1.0 - remaining).clamp(0.0, config.max_counter_reduction)
}

/// Buy a counter ad against `ad`. Only the targeted candidate may counter.
pub fn counter_negative_ad(
    counter_id: &str,
    player_id: &str,
    ad: &NegativeAd,
    amount: f64,
    available_funds: f64,
    now: Instant,
    config: &NegativeAdConfig,
) -> SimResult<SpendOutcome<CounterAd>> {
    if ad.target_id != player_id {
        return Err(SimError::not_found("negative_ad", &ad.ad_id));
    }
    if !(amount.is_finite() && amount > 0.0) {
        return Err(SimError::Validation(format!("counter spend must be positive, got {amount}")));
    }
    if now < ad.launched_at {
        return Err(SimError::Validation("cannot counter an ad before it launches".into()));
    }
    if let Some(short) = check_budget(amount, available_funds) {
        return Ok(short);
    }
    let counter = CounterAd {
        counter_id: counter_id.to_string(),
        ad_id: ad.ad_id.clone(),
        player_id: player_id.to_string(),
        amount_spent: amount,
        reduction: counter_reduction(amount, config),
        countered_at: now,
    };
    Ok(SpendOutcome::Completed { value: counter, cost: amount })
}

pub fn current_effectiveness(ad: &NegativeAd, counters: &[CounterAd], config: &NegativeAdConfig) -> f64 {
    ad.effectiveness * (1.0 - combined_reduction(counters, config))
}

pub fn view(ad: &NegativeAd, counters: &[CounterAd], config: &NegativeAdConfig) -> NegativeAdView {
    let own: Vec<CounterAd> = counters.iter().filter(|c| c.ad_id == ad.ad_id).cloned().collect();
    let reduction = combined_reduction(&own, config);
    // A backfire already helped the target; countering it changes nothing.
    let current_target_delta = if ad.backfired {
        ad.target_support_delta
    } else {
        ad.target_support_delta * (1.0 - reduction)
    };
    NegativeAdView {
        ad: ad.clone(),
        countered: !own.is_empty(),
        counter_reduction: reduction,
        current_effectiveness: ad.effectiveness * (1.0 - reduction),
        current_target_delta,
    }
}
