//! Audit events emitted by the wallet aggregate.
//!
//! Events are published fire-and-forget with at-least-once delivery; consumers
//! deduplicate on `operation_id`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    AssetSymbol, BatchId, NetworkId, OperationId, OperationKind, Protection, RouteType, WalletId,
};

/// Emitted when an operation's settlement is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub operation_id: OperationId,
    pub wallet_id: WalletId,
    pub kind: OperationKind,
    pub asset: AssetSymbol,
    pub amount: u128,
    /// Route that actually settled (not necessarily the first pick).
    pub route_type: RouteType,
    pub network: Option<NetworkId>,
    pub batch_id: Option<BatchId>,
    pub estimated_fee: Decimal,
    pub realized_fee: Decimal,
    /// `realized_fee - estimated_fee`.
    pub fee_delta: Decimal,
    pub protection: Protection,
    pub settlement_ref: String,
    /// Executor dispatches made, including the retry.
    pub attempts: u32,
    /// Hex SHA-256 over the candidate list and chosen route.
    pub decision_digest: String,
    pub settled_at: DateTime<Utc>,
}

/// Emitted when an operation reaches `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub operation_id: OperationId,
    pub wallet_id: WalletId,
    pub kind: OperationKind,
    pub asset: AssetSymbol,
    pub amount: u128,
    pub route_type: Option<RouteType>,
    pub estimated_fee: Option<Decimal>,
    pub fee_delta: Option<Decimal>,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Emitted when reconciliation gives up and funds are escalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub operation_id: OperationId,
    pub wallet_id: WalletId,
    pub asset: AssetSymbol,
    pub amount: u128,
    pub route_type: RouteType,
    pub attempts: u32,
    pub escalated_at: DateTime<Utc>,
}

/// Everything the wallet publishes to its event sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    Settled(SettlementEvent),
    Failed(FailureEvent),
    ManualReconciliationRequired(EscalationEvent),
}

impl WalletEvent {
    #[must_use]
    pub fn operation_id(&self) -> OperationId {
        match self {
            Self::Settled(e) => e.operation_id,
            Self::Failed(e) => e.operation_id,
            Self::ManualReconciliationRequired(e) => e.operation_id,
        }
    }
}
