//! Error types for the routeforge engine.
//!
//! All errors use the `RF_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors
//! - 2xx: Balance / reservation errors
//! - 3xx: Routing errors
//! - 4xx: Execution errors
//! - 5xx: Reconciliation errors
//! - 6xx: Operation lifecycle errors
//! - 9xx: General / internal errors
//!
//! Routing and execution failures carry the route type that was attempted and,
//! where known, the estimated-vs-realized fee delta so every failure is auditable.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{NetworkId, OperationId, OperationStatus, RouteType};

/// Central error enum for all routeforge operations.
#[derive(Debug, Error)]
pub enum RouteforgeError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// Malformed input (non-positive amount, empty destination, ...).
    #[error("RF_ERR_100: Validation failed: {reason}")]
    Validation { reason: String },

    /// The asset is not registered with the wallet.
    #[error("RF_ERR_101: Unknown asset: {0}")]
    UnknownAsset(String),

    /// The destination network or protocol does not support the asset.
    #[error("RF_ERR_102: Network {network} does not support asset {asset}")]
    UnsupportedAsset { network: NetworkId, asset: String },

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    /// Not enough available balance to perform the operation.
    #[error("RF_ERR_200: Insufficient available balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u128, available: u128 },

    /// Not enough reserved balance to commit or release.
    #[error("RF_ERR_201: Insufficient reserved balance")]
    InsufficientReserved,

    /// The reservation is unknown or not in a state allowing the transition.
    #[error("RF_ERR_202: Invalid reservation: {reason}")]
    InvalidReservation { reason: String },

    /// Supply conservation invariant violated. Critical safety alert.
    #[error("RF_ERR_203: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // Routing Errors (3xx)
    // =================================================================
    /// Every candidate route exceeds the fee ceiling. No reservation was made.
    #[error(
        "RF_ERR_300: No viable route among {candidates} candidates \
         (cheapest fee {cheapest_fee:?}, ceiling {ceiling})"
    )]
    NoViableRoute {
        candidates: usize,
        cheapest_fee: Option<Decimal>,
        ceiling: Decimal,
    },

    /// The fee oracle could not supply a snapshot.
    #[error("RF_ERR_301: Fee oracle unavailable: {0}")]
    FeeOracle(String),

    /// The network support analyzer could not quote a network.
    #[error("RF_ERR_302: Network quote failed for {network}: {reason}")]
    NetworkQuote { network: NetworkId, reason: String },

    // =================================================================
    // Execution Errors (4xx)
    // =================================================================
    /// The executor missed its deadline on every permitted attempt.
    #[error("RF_ERR_400: Executor timed out on {route_type} route (estimated fee {estimated_fee})")]
    ExecutorTimeout {
        route_type: RouteType,
        estimated_fee: Decimal,
    },

    /// The executor rejected the operation. Terminal: reservation released.
    #[error(
        "RF_ERR_401: Executor rejected {route_type} route: {reason} \
         (estimated fee {estimated_fee}, fee delta {fee_delta:?})"
    )]
    ExecutorRejected {
        route_type: RouteType,
        reason: String,
        estimated_fee: Decimal,
        fee_delta: Option<Decimal>,
    },

    /// No executor is able to serve the route.
    #[error("RF_ERR_402: Executor unavailable for {route_type} route: {reason}")]
    ExecutorUnavailable { route_type: RouteType, reason: String },

    // =================================================================
    // Reconciliation Errors (5xx)
    // =================================================================
    /// Bounded reconciliation ended without a terminal external status.
    #[error(
        "RF_ERR_500: Reconciliation exhausted for {operation_id} on {route_type} route \
         after {attempts} attempts; manual reconciliation required"
    )]
    ReconciliationExhausted {
        operation_id: OperationId,
        route_type: RouteType,
        attempts: u32,
    },

    /// The operation is not awaiting manual reconciliation.
    #[error("RF_ERR_501: Operation {0} is not awaiting manual reconciliation")]
    NotAwaitingReconciliation(OperationId),

    // =================================================================
    // Operation Lifecycle Errors (6xx)
    // =================================================================
    /// The operation was not found in the wallet's audit log.
    #[error("RF_ERR_600: Operation not found: {0}")]
    OperationNotFound(OperationId),

    /// Cancellation is only honored from `Pending` or `Batched`.
    #[error("RF_ERR_601: Operation cannot be cancelled in status {status}")]
    OperationNotCancellable { status: OperationStatus },

    /// The requested status transition is not part of the state machine.
    #[error("RF_ERR_602: Invalid status transition {from} -> {to}")]
    InvalidStatusTransition {
        from: OperationStatus,
        to: OperationStatus,
    },

    /// The operation is already a member of a batch.
    #[error("RF_ERR_603: Operation {0} already belongs to a batch")]
    AlreadyBatched(OperationId),

    /// The operation has already been committed (idempotency guard).
    #[error("RF_ERR_604: Operation already settled: {0}")]
    OperationAlreadySettled(OperationId),

    /// The caller's cancellation token fired before dispatch.
    #[error("RF_ERR_605: Operation {0} cancelled before dispatch")]
    Cancelled(OperationId),

    /// The batch is unknown or has already been dispatched.
    #[error("RF_ERR_606: Batch not found or already dispatched: {0}")]
    BatchNotFound(crate::BatchId),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// The price oracle could not price an asset.
    #[error("RF_ERR_900: Price unavailable for {asset} in {quote}")]
    PriceUnavailable { asset: String, quote: String },

    /// Configuration error (invalid values, inconsistent limits, etc.).
    #[error("RF_ERR_901: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("RF_ERR_902: Serialization error: {0}")]
    Serialization(String),

    /// Unrecoverable internal error.
    #[error("RF_ERR_999: Internal error: {0}")]
    Internal(String),
}

impl RouteforgeError {
    /// Route type attempted when the error occurred, if any.
    #[must_use]
    pub fn route_type(&self) -> Option<RouteType> {
        match self {
            Self::ExecutorTimeout { route_type, .. }
            | Self::ExecutorRejected { route_type, .. }
            | Self::ExecutorUnavailable { route_type, .. }
            | Self::ReconciliationExhausted { route_type, .. } => Some(*route_type),
            _ => None,
        }
    }

    /// Validation and balance errors are raised before any side effect.
    #[must_use]
    pub fn is_side_effect_free(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::UnknownAsset(_)
                | Self::UnsupportedAsset { .. }
                | Self::InsufficientBalance { .. }
                | Self::NoViableRoute { .. }
                | Self::Cancelled(_)
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, RouteforgeError>;

impl From<serde_json::Error> for RouteforgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Failure reported by an external executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    /// The executor did not obtain a terminal status in time. The external
    /// settlement may still land.
    #[error("executor timed out")]
    Timeout,

    /// Terminal rejection; nothing was settled externally.
    #[error("executor rejected: {reason}")]
    Rejected {
        reason: String,
        realized_fee: Option<Decimal>,
    },

    /// The executor could not be reached; nothing was submitted.
    #[error("executor unavailable: {0}")]
    Unavailable(String),
}
