//! Engine configuration.
//!
//! Every heuristic coefficient (fee ceilings, batch sizes, timing percentiles,
//! MEV weights, backoff schedule) is configuration. Defaults come from
//! [`crate::constants`]. The enclosing service loads an [`EngineConfig`] from
//! JSON and must call [`EngineConfig::validate`] before use.

use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{FeeTier, GasClass, RouteType, RouteforgeError, constants};

/// Top-level configuration for the route engine and wallet aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub routing: RoutingConfig,
    pub gas: GasSchedule,
    pub batching: BatchingConfig,
    pub timing: TimingConfig,
    pub mev: MevConfig,
    pub execution: ExecutionConfig,
    pub reconciliation: ReconciliationConfig,
}

impl EngineConfig {
    /// Parse from JSON and validate.
    ///
    /// # Errors
    /// `Serialization` for malformed JSON, `Configuration` for invalid values.
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject inconsistent settings.
    ///
    /// # Errors
    /// Returns `Configuration` describing the first problem found.
    pub fn validate(&self) -> crate::Result<()> {
        let fail = |msg: String| Err(RouteforgeError::Configuration(msg));

        if self.routing.max_acceptable_fee < Decimal::ZERO {
            return fail("routing.max_acceptable_fee must be non-negative".into());
        }
        if self.batching.min_batch_threshold < 2 {
            return fail("batching.min_batch_threshold must be at least 2".into());
        }
        if self.batching.min_batch_threshold > self.batching.max_batch_size {
            return fail(format!(
                "batching.min_batch_threshold ({}) exceeds max_batch_size ({})",
                self.batching.min_batch_threshold, self.batching.max_batch_size
            ));
        }
        if !(self.timing.normal_percentile > 0.0 && self.timing.normal_percentile <= 1.0) {
            return fail("timing.normal_percentile must be in (0, 1]".into());
        }
        let hours = 0..=constants::MAX_TIMING_HOURS;
        if !(1..=constants::MAX_TIMING_HOURS).contains(&self.timing.normal_horizon_hours) {
            return fail(format!(
                "timing.normal_horizon_hours must be in 1..={}",
                constants::MAX_TIMING_HOURS
            ));
        }
        for (name, value) in [
            ("patient_min_hours", self.timing.patient_min_hours),
            ("patient_max_hours", self.timing.patient_max_hours),
            ("cycle_hours", self.timing.cycle_hours),
        ] {
            if !hours.contains(&value) {
                return fail(format!(
                    "timing.{name} must be in 0..={}",
                    constants::MAX_TIMING_HOURS
                ));
            }
        }
        if self.timing.patient_min_hours > self.timing.patient_max_hours {
            return fail("timing.patient_min_hours exceeds patient_max_hours".into());
        }
        if self.execution.executor_deadline_ms == 0 {
            return fail("execution.executor_deadline_ms must be positive".into());
        }
        if self.reconciliation.max_attempts == 0 {
            return fail("reconciliation.max_attempts must be positive".into());
        }
        if self.reconciliation.multiplier == 0 {
            return fail("reconciliation.multiplier must be positive".into());
        }
        if self.reconciliation.initial_backoff_ms > self.reconciliation.max_backoff_ms {
            return fail("reconciliation.initial_backoff_ms exceeds max_backoff_ms".into());
        }
        Ok(())
    }
}

/// Route analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Routes estimating more than this are not viable.
    pub max_acceptable_fee: Decimal,
    pub slow_confirmation_secs: u64,
    pub standard_confirmation_secs: u64,
    pub fast_confirmation_secs: u64,
    pub instant_confirmation_secs: u64,
    /// Used when a conversion quote carries no time estimate.
    pub bridge_aggregation_secs: u64,
}

impl RoutingConfig {
    #[must_use]
    pub fn confirmation_secs(&self, tier: FeeTier) -> u64 {
        match tier {
            FeeTier::Slow => self.slow_confirmation_secs,
            FeeTier::Standard => self.standard_confirmation_secs,
            FeeTier::Fast => self.fast_confirmation_secs,
            FeeTier::Instant => self.instant_confirmation_secs,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_acceptable_fee: Decimal::from(constants::DEFAULT_MAX_ACCEPTABLE_FEE),
            slow_confirmation_secs: constants::SLOW_CONFIRMATION_SECS,
            standard_confirmation_secs: constants::STANDARD_CONFIRMATION_SECS,
            fast_confirmation_secs: constants::FAST_CONFIRMATION_SECS,
            instant_confirmation_secs: constants::INSTANT_CONFIRMATION_SECS,
            bridge_aggregation_secs: constants::DEFAULT_BRIDGE_AGGREGATION_SECS,
        }
    }
}

/// Gas estimates per asset class and for batch settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSchedule {
    pub native_transfer: u64,
    pub token_transfer: u64,
    pub complex_call: u64,
    pub batch_base_overhead: u64,
    pub batch_per_member: u64,
}

impl GasSchedule {
    /// Gas units for one standalone operation of this class.
    #[must_use]
    pub fn units_for(&self, class: GasClass) -> u64 {
        match class {
            GasClass::Native => self.native_transfer,
            GasClass::Token => self.token_transfer,
            GasClass::Complex => self.complex_call,
        }
    }

    /// Gas units of one batch settlement carrying `size` members.
    #[must_use]
    pub fn batch_overhead(&self, size: usize) -> u64 {
        let size = u64::try_from(size).unwrap_or(u64::MAX);
        self.batch_base_overhead
            .saturating_add(self.batch_per_member.saturating_mul(size))
    }
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            native_transfer: constants::GAS_NATIVE_TRANSFER,
            token_transfer: constants::GAS_TOKEN_TRANSFER,
            complex_call: constants::GAS_COMPLEX_CALL,
            batch_base_overhead: constants::GAS_BATCH_BASE_OVERHEAD,
            batch_per_member: constants::GAS_BATCH_PER_MEMBER,
        }
    }
}

/// Batch formation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub min_batch_threshold: usize,
    pub max_batch_size: usize,
    /// Expected wait before a batch is dispatched.
    pub batching_window_secs: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            min_batch_threshold: constants::DEFAULT_MIN_BATCH_THRESHOLD,
            max_batch_size: constants::DEFAULT_MAX_BATCH_SIZE,
            batching_window_secs: constants::DEFAULT_BATCHING_WINDOW_SECS,
        }
    }
}

/// Timing advisor coefficients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Fees at or below this percentile of the history count as "low".
    pub normal_percentile: f64,
    pub normal_horizon_hours: i64,
    pub patient_min_hours: i64,
    pub patient_max_hours: i64,
    /// Window requested from the fee oracle.
    pub history_window_hours: u32,
    /// Period used to project past samples forward.
    pub cycle_hours: i64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            normal_percentile: constants::DEFAULT_NORMAL_PERCENTILE,
            normal_horizon_hours: constants::DEFAULT_NORMAL_HORIZON_HOURS,
            patient_min_hours: constants::DEFAULT_PATIENT_MIN_HOURS,
            patient_max_hours: constants::DEFAULT_PATIENT_MAX_HOURS,
            history_window_hours: constants::DEFAULT_FEE_HISTORY_HOURS,
            cycle_hours: constants::FEE_CYCLE_HOURS,
        }
    }
}

/// MEV exposure classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MevConfig {
    /// Weighted exposure above which submission goes private.
    pub exposure_threshold: u128,
    /// Per-asset overrides of `exposure_threshold`, keyed by symbol.
    pub asset_thresholds: BTreeMap<String, u128>,
    /// Exposure weight per route type in basis points of the amount.
    pub route_weights_bps: BTreeMap<RouteType, u32>,
    /// Private path premium in basis points of the route fee.
    pub private_premium_bps: u32,
}

impl MevConfig {
    #[must_use]
    pub fn threshold_for(&self, asset: &str) -> u128 {
        self.asset_thresholds
            .get(asset)
            .copied()
            .unwrap_or(self.exposure_threshold)
    }

    #[must_use]
    pub fn weight_bps(&self, route_type: RouteType) -> u32 {
        self.route_weights_bps
            .get(&route_type)
            .copied()
            .unwrap_or(constants::BPS_DENOMINATOR)
    }
}

impl Default for MevConfig {
    fn default() -> Self {
        Self {
            exposure_threshold: constants::DEFAULT_MEV_EXPOSURE_THRESHOLD,
            asset_thresholds: BTreeMap::new(),
            route_weights_bps: BTreeMap::from([
                (RouteType::Direct, 10_000),
                (RouteType::SecondaryNetwork, 5_000),
                (RouteType::Batched, 3_000),
                (RouteType::BridgeAggregated, 15_000),
            ]),
            private_premium_bps: constants::DEFAULT_PRIVATE_SUBMISSION_PREMIUM_BPS,
        }
    }
}

/// Executor dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub executor_deadline_ms: u64,
}

impl ExecutionConfig {
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.executor_deadline_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            executor_deadline_ms: constants::DEFAULT_EXECUTOR_DEADLINE_MS,
        }
    }
}

/// Reconciliation poll budget and backoff schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: u32,
    pub max_backoff_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_RECONCILIATION_ATTEMPTS,
            initial_backoff_ms: constants::DEFAULT_RECONCILIATION_INITIAL_BACKOFF_MS,
            multiplier: constants::DEFAULT_RECONCILIATION_MULTIPLIER,
            max_backoff_ms: constants::DEFAULT_RECONCILIATION_MAX_BACKOFF_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = EngineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.batching.min_batch_threshold, 3);
        assert_eq!(cfg.reconciliation.max_attempts, 5);
        assert_eq!(cfg.timing.normal_horizon_hours, 4);
    }

    #[test]
    fn threshold_above_max_size_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.batching.min_batch_threshold = 20;
        cfg.batching.max_batch_size = 10;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, RouteforgeError::Configuration(_)));
    }

    #[test]
    fn bad_percentile_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.timing.normal_percentile = 0.0;
        assert!(cfg.validate().is_err());
        cfg.timing.normal_percentile = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn timing_hours_bounded() {
        let mut cfg = EngineConfig::default();
        cfg.timing.patient_min_hours = -1;
        assert!(matches!(cfg.validate(), Err(RouteforgeError::Configuration(_))));

        let mut cfg = EngineConfig::default();
        cfg.timing.normal_horizon_hours = i64::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.timing.patient_max_hours = constants::MAX_TIMING_HOURS + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.timing.cycle_hours = -24;
        assert!(cfg.validate().is_err());

        let err = EngineConfig::from_json(r#"{ "timing": { "cycle_hours": 9223372036854775807 } }"#)
            .unwrap_err();
        assert!(matches!(err, RouteforgeError::Configuration(_)));
    }

    #[test]
    fn gas_schedule_batch_overhead() {
        let gas = GasSchedule::default();
        assert_eq!(gas.batch_overhead(3), 30_000 + 3 * 12_000);
        assert_eq!(gas.units_for(GasClass::Token), 65_000);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg = EngineConfig::from_json(
            r#"{ "routing": { "max_acceptable_fee": "12.5" }, "batching": { "max_batch_size": 8 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.routing.max_acceptable_fee, Decimal::new(125, 1));
        assert_eq!(cfg.batching.max_batch_size, 8);
        assert_eq!(cfg.batching.min_batch_threshold, 3);
        assert_eq!(cfg.gas.native_transfer, 21_000);
    }

    #[test]
    fn invalid_json_values_rejected() {
        let err = EngineConfig::from_json(r#"{ "reconciliation": { "max_attempts": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, RouteforgeError::Configuration(_)));
    }

    #[test]
    fn mev_weights_and_overrides() {
        let mut mev = MevConfig::default();
        assert_eq!(mev.weight_bps(RouteType::Batched), 3_000);
        mev.asset_thresholds.insert("USDC".into(), 42);
        assert_eq!(mev.threshold_for("USDC"), 42);
        assert_eq!(mev.threshold_for("ETH"), mev.exposure_threshold);
    }
}
