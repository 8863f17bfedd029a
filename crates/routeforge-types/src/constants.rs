//! System-wide constants for the routeforge engine.
//!
//! Every heuristic coefficient here is only a default: the live value comes
//! from [`crate::EngineConfig`].

/// Name of the base settlement layer.
pub const BASE_NETWORK: &str = "base-layer";

/// Default maximum acceptable fee for a single operation (fee units).
pub const DEFAULT_MAX_ACCEPTABLE_FEE: i64 = 50;

/// Minimum number of compatible operations before a batch may form.
pub const DEFAULT_MIN_BATCH_THRESHOLD: usize = 3;

/// Maximum members in a single batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 16;

/// Seconds a deferrable operation waits in the batching window.
pub const DEFAULT_BATCHING_WINDOW_SECS: u64 = 300;

/// Gas units for a plain native-asset transfer.
pub const GAS_NATIVE_TRANSFER: u64 = 21_000;

/// Gas units for a token transfer.
pub const GAS_TOKEN_TRANSFER: u64 = 65_000;

/// Gas units for a contract-heavy operation (stake, swap leg).
pub const GAS_COMPLEX_CALL: u64 = 180_000;

/// Fixed gas overhead of a batch settlement call.
pub const GAS_BATCH_BASE_OVERHEAD: u64 = 30_000;

/// Additional gas per batch member.
pub const GAS_BATCH_PER_MEMBER: u64 = 12_000;

/// Expected confirmation seconds per fee tier.
pub const SLOW_CONFIRMATION_SECS: u64 = 600;
pub const STANDARD_CONFIRMATION_SECS: u64 = 180;
pub const FAST_CONFIRMATION_SECS: u64 = 45;
pub const INSTANT_CONFIRMATION_SECS: u64 = 15;

/// Expected seconds for a DEX-aggregated bridge when the quote omits it.
pub const DEFAULT_BRIDGE_AGGREGATION_SECS: u64 = 900;

/// Lower percentile of the trailing fee history treated as "low fee".
pub const DEFAULT_NORMAL_PERCENTILE: f64 = 0.25;

/// Normal urgency never waits longer than this.
pub const DEFAULT_NORMAL_HORIZON_HOURS: i64 = 4;

/// Patient urgency looks for the cheapest window inside `[min, max]` hours.
pub const DEFAULT_PATIENT_MIN_HOURS: i64 = 24;
pub const DEFAULT_PATIENT_MAX_HOURS: i64 = 48;

/// Fee history requested from the oracle.
pub const DEFAULT_FEE_HISTORY_HOURS: u32 = 72;

/// Period used to project past fee samples forward.
pub const FEE_CYCLE_HOURS: i64 = 24;

/// Upper bound for every timing horizon and the projection cycle (one year).
pub const MAX_TIMING_HOURS: i64 = 8_760;

/// Weighted exposure (smallest units) above which private submission is used.
pub const DEFAULT_MEV_EXPOSURE_THRESHOLD: u128 = 10_000_000_000_000_000_000;

/// Premium charged by the private-submission path, in basis points of the route fee.
pub const DEFAULT_PRIVATE_SUBMISSION_PREMIUM_BPS: u32 = 1_000;

/// Deadline for a single executor dispatch.
pub const DEFAULT_EXECUTOR_DEADLINE_MS: u64 = 30_000;

/// Reconciliation poll attempts before escalation.
pub const DEFAULT_RECONCILIATION_ATTEMPTS: u32 = 5;

/// First reconciliation backoff delay.
pub const DEFAULT_RECONCILIATION_INITIAL_BACKOFF_MS: u64 = 2_000;

/// Backoff growth factor between reconciliation polls.
pub const DEFAULT_RECONCILIATION_MULTIPLIER: u32 = 2;

/// Upper bound for a single reconciliation delay.
pub const DEFAULT_RECONCILIATION_MAX_BACKOFF_MS: u64 = 60_000;

/// Number of committed operation IDs remembered for idempotency.
pub const SETTLEMENT_IDEMPOTENCY_CACHE_SIZE: usize = 100_000;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "routeforge";
