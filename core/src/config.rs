use serde::{Deserialize, Serialize};

// ── Phase machine config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Reputation a player's very first cycle starts with [0, 100].
    pub starting_reputation: f64,
    /// Funds that must be raised before Fundraising may be left early.
    pub min_funds_to_leave_fundraising: f64,
    /// Endorsements required before Primary may be left early.
    pub min_endorsements_to_leave_primary: u32,
    /// Fraction of raised funds lost at spend pressure 1.0.
    pub spend_pressure_drag: f64,
    /// Difficulty indices are drawn uniformly from [min, max].
    pub difficulty_min: f64,
    pub difficulty_max: f64,
}

// ── Polling config ────────────────────────────────────────────────

/// Offline-gap tier. Applies when the gap since the previous snapshot
/// exceeds `above_hours` real hours (and more than one interval).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineTier {
    pub above_hours: f64,
    /// Multiplier on the volatility magnitude.
    pub dampening: f64,
    /// EMA weight on the previous snapshot's final support.
    pub smoothing_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_game_hours: f64,
    pub sample_size_min: u32,
    pub sample_size_max: u32,
    /// Largest volatility swing at VM = 1.0, in support points.
    pub max_shift_percent: f64,
    /// Smoothing weight when the previous snapshot is at most one interval old.
    pub fresh_smoothing_weight: f64,
    /// Ordered by `above_hours` ascending.
    pub offline_tiers: Vec<OfflineTier>,
    pub base_margin_of_error: f64,
    pub reference_sample_size: f64,
    pub min_margin_of_error: f64,
    /// Net change (points) across a window that counts as a trend.
    pub trend_threshold: f64,
}

// ── Endorsement config ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndorsementConfig {
    /// Factor for the 1st, 2nd, 3rd, 4th-or-later same-category acquisition.
    pub diminishing_factors: Vec<f64>,
}

// ── Scandal config ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScandalConfig {
    /// Reputation points lost per unit of severity.
    pub hit_per_severity: f64,
    /// Natural recovery in points per game hour at severity 0.
    pub base_recovery_per_hour: f64,
    /// Recovery rate is scaled by (1 - severity * drag).
    pub severity_recovery_drag: f64,
    /// Extra recovery multiplier accrued after containment.
    pub containment_multiplier: f64,
    pub max_recovery_per_hour: f64,
    /// Mitigation gains are scaled by (1 - engagement saturation * drag).
    pub saturation_mitigation_drag: f64,
    /// Manual resolution is allowed below this impact.
    pub resolve_threshold: f64,
    /// The sweep resolves scandals below this impact.
    pub auto_resolve_threshold: f64,
    /// Chance of a new scandal per polling interval.
    pub base_chance_per_interval: f64,
    /// Extra chance at spend pressure 1.0 (scaled by the index).
    pub spend_pressure_chance_weight: f64,
}

// ── Opposition research config ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    pub repeat_penalty_per_attempt: f64,
    pub max_repeat_penalty: f64,
    pub proximity_min: f64,
    pub proximity_max: f64,
}

// ── Negative ad config ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegativeAdConfig {
    /// Effectiveness of an ad not backed by research.
    pub baseline_effectiveness: f64,
    /// Credibility assumed for unresearched attacks when rolling backfire.
    pub unresearched_credibility: f64,
    pub credibility_ethics_weight: f64,
    pub repeat_ethics_per_ad: f64,
    pub max_repeat_ethics: f64,
    pub extreme_ethics_penalty: f64,
    pub repeat_window_hours: f64,
    pub fatigue_per_ad: f64,
    pub max_fatigue: f64,
    /// Fatigue window and decay horizon (game hours).
    pub fatigue_window_hours: f64,
    pub backfire_credibility_weight: f64,
    pub backfire_ethics_weight: f64,
    pub extreme_backfire_bonus: f64,
    pub max_backfire_probability: f64,
    pub target_swing_per_effectiveness: f64,
    pub max_target_swing: f64,
    /// Fraction of the target's loss the attacker pays as ethics cost.
    pub attacker_cost_fraction: f64,
    pub backfire_target_gain_rate: f64,
    pub max_backfire_target_gain: f64,
    pub backfire_attacker_loss_rate: f64,
    pub max_backfire_attacker_loss: f64,
    /// Counter spend at which a counter ad halves the original.
    pub counter_half_saturation: f64,
    pub max_counter_reduction: f64,
}

// ── Balance config ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceConfig {
    pub frontrunner_lead_threshold: f64,
    pub frontrunner_cost_per_point: f64,
    pub underdog_gap_threshold: f64,
    pub underdog_buff_per_point: f64,
    pub max_underdog_buff: f64,
    pub systemic_cap_start: f64,
    /// Share of the excess above the cap start that is kept.
    pub systemic_cap_retention: f64,
    pub frontrunner_probability_drag: f64,
    pub probability_floor: f64,
    pub probability_ceiling: f64,
}

// ── Offline fairness config ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessConfig {
    /// Share of the last known influence a returning player keeps.
    pub retention_factor: f64,
    pub level_minimum_base: f64,
    pub level_minimum_step: f64,
    pub max_level: u32,
    /// Relative online/offline divergence that raises a warning.
    pub divergence_warning: f64,
    /// Relative divergence classified as major.
    pub divergence_major: f64,
}

// ── Influence baseline config ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluenceConfig {
    pub min_donation: f64,
    pub donation_weight: f64,
    pub level_multiplier_step: f64,
    pub state_weight_scale: f64,
    pub proximity_window_hours: f64,
    pub max_proximity_bonus: f64,
    pub reputation_neutral: f64,
    pub max_reputation_bonus: f64,
    pub soft_cap_target: f64,
    pub jitter_amplitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub phase: PhaseConfig,
    pub polling: PollingConfig,
    pub endorsement: EndorsementConfig,
    pub scandal: ScandalConfig,
    pub research: ResearchConfig,
    pub negative_ad: NegativeAdConfig,
    pub balance: BalanceConfig,
    pub fairness: FairnessConfig,
    pub influence: InfluenceConfig,
}

impl SimConfig {
    /// Load from the data/ directory.
    /// In tests, use SimConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/campaign/tuning.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SimConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject tables that would break the engine's invariants.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endorsement.diminishing_factors.is_empty() {
            anyhow::bail!("endorsement.diminishing_factors must not be empty");
        }
        if self.polling.sample_size_min == 0
            || self.polling.sample_size_min > self.polling.sample_size_max
        {
            anyhow::bail!("polling sample size range is invalid");
        }
        if self.polling.interval_game_hours <= 0.0 {
            anyhow::bail!("polling.interval_game_hours must be positive");
        }
        if !(0.0..1.0).contains(&self.fairness.retention_factor) {
            anyhow::bail!("fairness.retention_factor must be in [0, 1)");
        }
        if !(0.0..=1.0).contains(&self.scandal.saturation_mitigation_drag) {
            anyhow::bail!("scandal.saturation_mitigation_drag must be in [0, 1]");
        }
        if self.influence.soft_cap_target <= 0.0 {
            anyhow::bail!("influence.soft_cap_target must be positive");
        }
        let tiers = &self.polling.offline_tiers;
        if tiers.windows(2).any(|w| w[0].above_hours >= w[1].above_hours) {
            anyhow::bail!("polling.offline_tiers must be sorted by above_hours");
        }
        Ok(())
    }

    /// Config with hardcoded defaults for use in unit tests.
    /// Mirrors data/campaign/tuning.json.
    pub fn default_test() -> Self {
        Self {
            phase: PhaseConfig {
                starting_reputation: 50.0,
                min_funds_to_leave_fundraising: 50_000.0,
                min_endorsements_to_leave_primary: 3,
                spend_pressure_drag: 0.3,
                difficulty_min: 0.1,
                difficulty_max: 0.9,
            },
            polling: PollingConfig {
                interval_game_hours: 1.0,
                sample_size_min: 800,
                sample_size_max: 3000,
                max_shift_percent: 3.0,
                fresh_smoothing_weight: 0.3,
                offline_tiers: vec![
                    OfflineTier { above_hours: 0.0,  dampening: 0.9,  smoothing_weight: 0.5  },
                    OfflineTier { above_hours: 6.0,  dampening: 0.75, smoothing_weight: 0.65 },
                    OfflineTier { above_hours: 24.0, dampening: 0.5,  smoothing_weight: 0.8  },
                    OfflineTier { above_hours: 72.0, dampening: 0.25, smoothing_weight: 0.9  },
                ],
                base_margin_of_error: 4.0,
                reference_sample_size: 800.0,
                min_margin_of_error: 1.5,
                trend_threshold: 1.0,
            },
            endorsement: EndorsementConfig {
                diminishing_factors: vec![1.0, 0.8, 0.6, 0.4],
            },
            scandal: ScandalConfig {
                hit_per_severity: 20.0,
                base_recovery_per_hour: 0.5,
                severity_recovery_drag: 0.5,
                containment_multiplier: 1.5,
                max_recovery_per_hour: 3.0,
                saturation_mitigation_drag: 0.5,
                resolve_threshold: 2.0,
                auto_resolve_threshold: 1.0,
                base_chance_per_interval: 0.04,
                spend_pressure_chance_weight: 0.5,
            },
            research: ResearchConfig {
                repeat_penalty_per_attempt: 0.15,
                max_repeat_penalty: 0.60,
                proximity_min: 0.5,
                proximity_max: 1.5,
            },
            negative_ad: NegativeAdConfig {
                baseline_effectiveness: 30.0,
                unresearched_credibility: 0.5,
                credibility_ethics_weight: 30.0,
                repeat_ethics_per_ad: 5.0,
                max_repeat_ethics: 40.0,
                extreme_ethics_penalty: 15.0,
                repeat_window_hours: 24.0,
                fatigue_per_ad: 0.08,
                max_fatigue: 0.5,
                fatigue_window_hours: 168.0,
                backfire_credibility_weight: 0.3,
                backfire_ethics_weight: 0.3,
                extreme_backfire_bonus: 0.15,
                max_backfire_probability: 0.5,
                target_swing_per_effectiveness: 0.1,
                max_target_swing: 10.0,
                attacker_cost_fraction: 0.1,
                backfire_target_gain_rate: 0.03,
                max_backfire_target_gain: 2.0,
                backfire_attacker_loss_rate: 0.15,
                max_backfire_attacker_loss: 10.0,
                counter_half_saturation: 50_000.0,
                max_counter_reduction: 0.8,
            },
            balance: BalanceConfig {
                frontrunner_lead_threshold: 15.0,
                frontrunner_cost_per_point: 0.03,
                underdog_gap_threshold: 10.0,
                underdog_buff_per_point: 0.05,
                max_underdog_buff: 3.0,
                systemic_cap_start: 60.0,
                systemic_cap_retention: 0.2,
                frontrunner_probability_drag: 0.05,
                probability_floor: 0.01,
                probability_ceiling: 0.99,
            },
            fairness: FairnessConfig {
                retention_factor: 0.85,
                level_minimum_base: 10.0,
                level_minimum_step: 5.0,
                max_level: 20,
                divergence_warning: 0.10,
                divergence_major: 0.25,
            },
            influence: InfluenceConfig {
                min_donation: 100.0,
                donation_weight: 10.0,
                level_multiplier_step: 0.1,
                state_weight_scale: 20.0,
                proximity_window_hours: 24.0,
                max_proximity_bonus: 15.0,
                reputation_neutral: 50.0,
                max_reputation_bonus: 10.0,
                soft_cap_target: 100.0,
                jitter_amplitude: 2.0,
            },
        }
    }
}
