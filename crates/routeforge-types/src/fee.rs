//! Fee oracle data: current tiers and historical samples.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Urgency;

/// Named fee tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum FeeTier {
    Slow,
    Standard,
    Fast,
    Instant,
}

impl FeeTier {
    /// Tier used to price the direct route for an urgency.
    #[must_use]
    pub fn for_urgency(urgency: Urgency) -> Self {
        match urgency {
            Urgency::Immediate => Self::Fast,
            Urgency::Normal => Self::Standard,
            Urgency::Patient => Self::Slow,
        }
    }
}

impl fmt::Display for FeeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slow => write!(f, "SLOW"),
            Self::Standard => write!(f, "STANDARD"),
            Self::Fast => write!(f, "FAST"),
            Self::Instant => write!(f, "INSTANT"),
        }
    }
}

/// Base-layer fee per gas unit for each tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTiers {
    pub slow: Decimal,
    pub standard: Decimal,
    pub fast: Decimal,
    pub instant: Decimal,
}

impl FeeTiers {
    #[must_use]
    pub fn get(&self, tier: FeeTier) -> Decimal {
        match tier {
            FeeTier::Slow => self.slow,
            FeeTier::Standard => self.standard,
            FeeTier::Fast => self.fast,
            FeeTier::Instant => self.instant,
        }
    }

    /// Tiers must be non-negative and non-decreasing from slow to instant.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.slow >= Decimal::ZERO
            && self.slow <= self.standard
            && self.standard <= self.fast
            && self.fast <= self.instant
    }
}

/// One historical fee observation (standard tier, per gas unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSample {
    pub observed_at: DateTime<Utc>,
    pub fee: Decimal,
}
