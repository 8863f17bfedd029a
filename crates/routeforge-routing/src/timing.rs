//! Timing advisor for deferrable operations.
//!
//! Fee history is treated as cyclic with period `cycle_hours`: a sample seen
//! at `t` is expected to recur at `t + k * cycle`. Recommendations:
//!
//! - **Immediate**: now, fast tier.
//! - **Normal**: now if the current standard fee is already at or below the
//!   low-fee percentile of the history, otherwise the earliest projected
//!   low-fee sample within `normal_horizon_hours`.
//! - **Patient**: the cheapest projected sample within
//!   `[patient_min_hours, patient_max_hours]` from now.
//!
//! Empty history, or no projected sample inside the horizon, falls back to now
//! at the current fee. A recommendation is never earlier than `now`.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use routeforge_types::{EngineConfig, FeeSample, FeeTier, FeeTiers, TimingConfig, Urgency};
use serde::{Deserialize, Serialize};

/// Why a recommendation was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingBasis {
    /// Urgent operation, executed now.
    Immediate,
    /// Current or projected fee is within the low percentile.
    LowFeeWindow,
    /// Cheapest projected sample in the patient horizon.
    MinimumFeeWindow,
    /// No fee history to reason from.
    NoHistory,
    /// History exists but nothing projects into the horizon.
    NoWindowInHorizon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingRecommendation {
    pub execute_at: DateTime<Utc>,
    /// Expected fee per gas unit at `execute_at`.
    pub expected_fee: Decimal,
    pub tier: FeeTier,
    pub basis: TimingBasis,
}

#[derive(Debug, Clone)]
pub struct TimingAdvisor {
    timing: TimingConfig,
}

impl TimingAdvisor {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            timing: config.timing.clone(),
        }
    }

    /// Recommend when to execute an operation of the given urgency.
    #[must_use]
    pub fn recommend(
        &self,
        urgency: Urgency,
        history: &[FeeSample],
        current: &FeeTiers,
        now: DateTime<Utc>,
    ) -> TimingRecommendation {
        let tier = FeeTier::for_urgency(urgency);
        let now_at = |expected_fee, basis| TimingRecommendation {
            execute_at: now,
            expected_fee,
            tier,
            basis,
        };

        let rec = match urgency {
            Urgency::Immediate => now_at(current.get(tier), TimingBasis::Immediate),
            _ if history.is_empty() => now_at(current.get(tier), TimingBasis::NoHistory),
            Urgency::Normal => self
                .low_fee_window(history, current, now, tier)
                .unwrap_or_else(|| now_at(current.get(tier), TimingBasis::NoWindowInHorizon)),
            Urgency::Patient => self
                .minimum_fee_window(history, now, tier)
                .unwrap_or_else(|| now_at(current.get(tier), TimingBasis::NoWindowInHorizon)),
        };

        let rec = TimingRecommendation {
            execute_at: rec.execute_at.max(now),
            ..rec
        };
        tracing::debug!(
            urgency = %urgency,
            execute_at = %rec.execute_at,
            expected_fee = %rec.expected_fee,
            basis = ?rec.basis,
            "Timing recommendation"
        );
        rec
    }

    /// Nearest-rank percentile of the sampled fees.
    #[must_use]
    pub fn low_fee_threshold(&self, history: &[FeeSample]) -> Option<Decimal> {
        let mut fees: Vec<Decimal> = history.iter().map(|s| s.fee).collect();
        if fees.is_empty() {
            return None;
        }
        fees.sort();
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let rank = (self.timing.normal_percentile * fees.len() as f64).ceil() as usize;
        let idx = rank.clamp(1, fees.len()) - 1;
        Some(fees[idx])
    }

    fn low_fee_window(
        &self,
        history: &[FeeSample],
        current: &FeeTiers,
        now: DateTime<Utc>,
        tier: FeeTier,
    ) -> Option<TimingRecommendation> {
        let threshold = self.low_fee_threshold(history)?;
        if current.get(tier) <= threshold {
            return Some(TimingRecommendation {
                execute_at: now,
                expected_fee: current.get(tier),
                tier,
                basis: TimingBasis::LowFeeWindow,
            });
        }

        let horizon = now + Duration::hours(self.timing.normal_horizon_hours);
        history
            .iter()
            .filter(|s| s.fee <= threshold)
            .filter_map(|s| {
                let at = self.next_occurrence(s.observed_at, now)?;
                (at <= horizon).then_some((at, s.fee))
            })
            .min()
            .map(|(execute_at, expected_fee)| TimingRecommendation {
                execute_at,
                expected_fee,
                tier,
                basis: TimingBasis::LowFeeWindow,
            })
    }

    fn minimum_fee_window(
        &self,
        history: &[FeeSample],
        now: DateTime<Utc>,
        tier: FeeTier,
    ) -> Option<TimingRecommendation> {
        let start = now + Duration::hours(self.timing.patient_min_hours);
        let end = now + Duration::hours(self.timing.patient_max_hours);
        history
            .iter()
            .filter_map(|s| {
                let at = self.next_occurrence(s.observed_at, start)?;
                (at <= end).then_some((s.fee, at))
            })
            .min()
            .map(|(expected_fee, execute_at)| TimingRecommendation {
                execute_at,
                expected_fee,
                tier,
                basis: TimingBasis::MinimumFeeWindow,
            })
    }

    /// First recurrence of `observed` at or after `bound`.
    fn next_occurrence(
        &self,
        observed: DateTime<Utc>,
        bound: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if observed >= bound {
            return Some(observed);
        }
        if self.timing.cycle_hours <= 0 {
            return None;
        }
        let cycle_ms = self.timing.cycle_hours.checked_mul(3_600_000)?;
        let gap_ms = (bound - observed).num_milliseconds();
        let cycles = gap_ms.checked_add(cycle_ms - 1)? / cycle_ms;
        observed.checked_add_signed(Duration::milliseconds(cycles.checked_mul(cycle_ms)?))
    }
}
