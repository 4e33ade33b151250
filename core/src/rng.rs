//! Deterministic randomness.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! Every "random" decision is a pure function of a string seed,
//! hashed with 32-bit FNV-1a.
//!
//! Seeds are composed from (player id, cycle number, purpose tag) and an
//! optional discriminator such as an interval index or attempt count:
//!   "alice:3:polling_volatility:1042"
//! so the same question asked twice always gets the same answer, and
//! two different questions never share a stream.
//!
//! Where a decision needs several draws (picking findings from a list),
//! a `SeededRng` stream is derived from the seed string.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of a string seed.
pub fn fnv1a_32(input: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in input.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Uniform value in [0.0, 1.0].
pub fn hash_unit(seed: &str) -> f64 {
    f64::from(fnv1a_32(seed)) / f64::from(u32::MAX)
}

/// Uniform value in [-1.0, 1.0].
pub fn hash_signed(seed: &str) -> f64 {
    hash_unit(seed) * 2.0 - 1.0
}

/// Uniform value in [min, max].
pub fn hash_range(seed: &str, min: f64, max: f64) -> f64 {
    min + hash_unit(seed) * (max - min)
}

/// Integer in [min, max] inclusive.
pub fn hash_int_range(seed: &str, min: u32, max: u32) -> u32 {
    if max <= min {
        return min;
    }
    let span = u64::from(max - min) + 1;
    min + (u64::from(fnv1a_32(seed)) % span) as u32
}

/// Bernoulli trial: true with probability `p`.
pub fn chance(seed: &str, p: f64) -> bool {
    hash_unit(seed) < p
}

/// Compose the seed for one decision.
pub fn compose_seed(player_id: &str, cycle: u32, purpose: SeedPurpose, discriminator: &str) -> String {
    if discriminator.is_empty() {
        format!("{player_id}:{cycle}:{}", purpose.tag())
    } else {
        format!("{player_id}:{cycle}:{}:{discriminator}", purpose.tag())
    }
}

/// Extend an existing seed with a purpose tag and discriminator.
pub fn derive_seed(base: &str, purpose: SeedPurpose, discriminator: &str) -> String {
    if discriminator.is_empty() {
        format!("{base}:{}", purpose.tag())
    } else {
        format!("{base}:{}:{discriminator}", purpose.tag())
    }
}

/// Stable purpose tags.
/// NEVER rename a tag; renaming changes every seed that uses it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SeedPurpose {
    Cycle,
    Difficulty,
    PollingSample,
    PollingVolatility,
    ScandalChance,
    ScandalCategory,
    ScandalSeverity,
    ResearchOutcome,
    ResearchQuality,
    ResearchCredibility,
    ResearchFindings,
    SkeletonProximity,
    Backfire,
    InfluenceJitter,
}

impl SeedPurpose {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Cycle               => "cycle",
            Self::Difficulty          => "difficulty",
            Self::PollingSample       => "polling_sample",
            Self::PollingVolatility   => "polling_volatility",
            Self::ScandalChance       => "scandal_chance",
            Self::ScandalCategory     => "scandal_category",
            Self::ScandalSeverity     => "scandal_severity",
            Self::ResearchOutcome     => "research_outcome",
            Self::ResearchQuality     => "research_quality",
            Self::ResearchCredibility => "research_credibility",
            Self::ResearchFindings    => "research_findings",
            Self::SkeletonProximity   => "skeleton_proximity",
            Self::Backfire            => "backfire",
            Self::InfluenceJitter     => "influence_jitter",
        }
    }
}

/// A deterministic RNG stream derived from a seed string.
pub struct SeededRng {
    inner: Pcg64Mcg,
}

impl SeededRng {
    pub fn from_seed(seed: &str) -> Self {
        let hi = u64::from(fnv1a_32(seed));
        let lo = u64::from(fnv1a_32(&format!("{seed}#stream")));
        Self {
            inner: Pcg64Mcg::seed_from_u64((hi << 32) | lo),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Draw `count` distinct items from `items`, preserving draw order.
    pub fn pick_distinct<'a, T>(&mut self, items: &'a [T], count: usize) -> Vec<&'a T> {
        let mut pool: Vec<&T> = items.iter().collect();
        let mut picked = Vec::with_capacity(count.min(pool.len()));
        while picked.len() < count && !pool.is_empty() {
            let idx = self.next_u64_below(pool.len() as u64) as usize;
            picked.push(pool.swap_remove(idx));
        }
        picked
    }
}
