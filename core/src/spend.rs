//! Spend tiers and the insufficient-funds result shared by research,
//! negative ads and scandal mitigation.
//!
//! Running out of budget is an expected business outcome, not an error:
//! spend operations return `SpendOutcome::Insufficient` instead of `Err`.

use crate::error::{ensure_non_negative, SimError, SimResult};
use serde::{Deserialize, Serialize};

/// Discrete spend tiers. Amounts outside every tier are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendTier {
    Basic,
    Standard,
    Premium,
    Elite,
}

impl SpendTier {
    pub const ALL: [SpendTier; 4] = [Self::Basic, Self::Standard, Self::Premium, Self::Elite];

    /// Half-open amount range `[min, max)`; Elite includes its upper bound.
    pub fn range(&self) -> (f64, f64) {
        match self {
            Self::Basic    => (1_000.0, 10_000.0),
            Self::Standard => (10_000.0, 50_000.0),
            Self::Premium  => (50_000.0, 150_000.0),
            Self::Elite    => (150_000.0, 500_000.0),
        }
    }

    pub fn from_amount(amount: f64) -> SimResult<Self> {
        ensure_non_negative("spend amount", amount)?;
        for tier in Self::ALL {
            let (min, max) = tier.range();
            let inside = amount >= min
                && (amount < max || (tier == Self::Elite && amount <= max));
            if inside {
                return Ok(tier);
            }
        }
        Err(SimError::Validation(format!(
            "spend amount ${amount:.0} is outside the defined tiers ($1000 – $500000)"
        )))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic    => "basic",
            Self::Standard => "standard",
            Self::Premium  => "premium",
            Self::Elite    => "elite",
        }
    }

    pub fn parse(s: &str) -> SimResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SimError::Validation(format!("unknown spend tier '{s}'")))
    }

    /// Multiplier on research outcome odds.
    pub fn research_multiplier(&self) -> f64 {
        match self {
            Self::Basic    => 0.7,
            Self::Standard => 1.0,
            Self::Premium  => 1.3,
            Self::Elite    => 1.6,
        }
    }

    /// Multiplier on negative ad effectiveness.
    pub fn ad_multiplier(&self) -> f64 {
        match self {
            Self::Basic    => 0.6,
            Self::Standard => 1.0,
            Self::Premium  => 1.3,
            Self::Elite    => 1.5,
        }
    }
}

/// Result of an operation that costs campaign funds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SpendOutcome<T> {
    Completed { value: T, cost: f64 },
    Insufficient { cost: f64, available: f64 },
}

impl<T> SpendOutcome<T> {
    pub fn success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn cost(&self) -> f64 {
        match self {
            Self::Completed { cost, .. } | Self::Insufficient { cost, .. } => *cost,
        }
    }

    pub fn value(self) -> Option<T> {
        match self {
            Self::Completed { value, .. } => Some(value),
            Self::Insufficient { .. } => None,
        }
    }

    /// Scale the cost by `multiplier` and check the scaled cost against
    /// `available` again.
    pub fn with_cost_multiplier(self, multiplier: f64, available: f64) -> Self {
        match self {
            Self::Completed { value, cost } => {
                let scaled = cost * multiplier;
                check_budget(scaled, available)
                    .unwrap_or(Self::Completed { value, cost: scaled })
            }
            Self::Insufficient { cost, available } => Self::Insufficient {
                cost: cost * multiplier,
                available,
            },
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SpendOutcome<U> {
        match self {
            Self::Completed { value, cost } => SpendOutcome::Completed { value: f(value), cost },
            Self::Insufficient { cost, available } => SpendOutcome::Insufficient { cost, available },
        }
    }
}

/// Budget gate: `Some(Insufficient)` when `cost` exceeds `available`.
pub fn check_budget<T>(cost: f64, available: f64) -> Option<SpendOutcome<T>> {
    if cost > available {
        Some(SpendOutcome::Insufficient { cost, available })
    } else {
        None
    }
}
