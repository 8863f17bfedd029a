//! Pending operation model and its lifecycle.
//!
//! ## State Machine
//!
//! ```text
//!   PENDING ──▶ BATCHED ──▶ ROUTED ──▶ SETTLED
//!      │           │          │  ╲
//!      │           │          │   ▶ AWAITING_CONFIRMATION ──▶ SETTLED | FAILED
//!      │           │          ▼              │
//!      │           │        FAILED           ▼
//!      ▼           ▼                 NEEDS_MANUAL_RECONCILIATION ──▶ SETTLED | FAILED
//!   CANCELLED   CANCELLED
//! ```
//!
//! A dissolved batch sends its remaining members from `BATCHED` back to
//! `PENDING`. `BATCHED` and `ROUTED` are transient. Cancellation is honored only from
//! `PENDING` or `BATCHED`; once an executor call is dispatched the operation
//! must reach a terminal state through execution or reconciliation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AssetSymbol, BatchId, NetworkId, OperationId, RouteforgeError, WalletId};

/// What the operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Transfer,
    Stake,
    Swap,
    Bridge,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer => write!(f, "TRANSFER"),
            Self::Stake => write!(f, "STAKE"),
            Self::Swap => write!(f, "SWAP"),
            Self::Bridge => write!(f, "BRIDGE"),
        }
    }
}

/// How soon the caller needs the operation settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Urgency {
    Immediate,
    Normal,
    Patient,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "IMMEDIATE"),
            Self::Normal => write!(f, "NORMAL"),
            Self::Patient => write!(f, "PATIENT"),
        }
    }
}

/// Lifecycle status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    Batched,
    Routed,
    /// Dispatch deadline expired; reconciliation is polling external status.
    AwaitingConfirmation,
    Settled,
    Failed,
    Cancelled,
    /// Reconciliation exhausted; funds are escalated until resolved by hand.
    NeedsManualReconciliation,
}

impl OperationStatus {
    /// Can the operation move from `self` to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        use OperationStatus::{
            AwaitingConfirmation, Batched, Cancelled, Failed, NeedsManualReconciliation,
            Pending, Routed, Settled,
        };
        matches!(
            (self, target),
            (Pending, Batched | Routed | Cancelled | Failed)
                | (Batched, Pending | Routed | Cancelled | Failed)
                | (Routed, Settled | Failed | AwaitingConfirmation)
                | (AwaitingConfirmation, Settled | Failed | NeedsManualReconciliation)
                | (NeedsManualReconciliation, Settled | Failed)
        )
    }

    /// Cancellation is only honored before dispatch.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Batched)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Batched => write!(f, "BATCHED"),
            Self::Routed => write!(f, "ROUTED"),
            Self::AwaitingConfirmation => write!(f, "AWAITING_CONFIRMATION"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::NeedsManualReconciliation => write!(f, "NEEDS_MANUAL_RECONCILIATION"),
        }
    }
}

/// A requested asset movement. Retained for audit once terminal, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: OperationId,
    pub wallet_id: WalletId,
    pub kind: OperationKind,
    pub asset: AssetSymbol,
    pub target_asset: Option<AssetSymbol>,
    /// Smallest units, always > 0.
    pub amount: u128,
    pub source: NetworkId,
    pub destination: String,
    pub urgency: Urgency,
    pub status: OperationStatus,
    pub batch_id: Option<BatchId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingOperation {
    #[must_use]
    pub fn new(
        wallet_id: WalletId,
        kind: OperationKind,
        asset: AssetSymbol,
        amount: u128,
        source: NetworkId,
        destination: impl Into<String>,
        urgency: Urgency,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OperationId::new(),
            wallet_id,
            kind,
            asset,
            target_asset: None,
            amount,
            source,
            destination: destination.into(),
            urgency,
            status: OperationStatus::Pending,
            batch_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `target`, enforcing the state machine.
    ///
    /// # Errors
    /// Returns `InvalidStatusTransition` if the move is not allowed.
    pub fn transition(&mut self, target: OperationStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(RouteforgeError::InvalidStatusTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl PendingOperation {
    pub fn dummy_transfer(asset: &str, amount: u128) -> Self {
        Self::new(
            WalletId::new(),
            OperationKind::Transfer,
            AssetSymbol::new(asset),
            amount,
            NetworkId::new(crate::constants::BASE_NETWORK),
            "0xdestination",
            Urgency::Patient,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut op = PendingOperation::dummy_transfer("ETH", 10);
        op.transition(OperationStatus::Batched).unwrap();
        op.transition(OperationStatus::Routed).unwrap();
        op.transition(OperationStatus::Settled).unwrap();
        assert!(op.status.is_terminal());
    }

    #[test]
    fn routed_cannot_be_cancelled() {
        let mut op = PendingOperation::dummy_transfer("ETH", 10);
        op.transition(OperationStatus::Routed).unwrap();
        assert!(!op.status.is_cancellable());
        let err = op.transition(OperationStatus::Cancelled).unwrap_err();
        assert!(matches!(
            err,
            RouteforgeError::InvalidStatusTransition {
                from: OperationStatus::Routed,
                to: OperationStatus::Cancelled
            }
        ));
    }

    #[test]
    fn pending_and_batched_are_cancellable() {
        assert!(OperationStatus::Pending.is_cancellable());
        assert!(OperationStatus::Batched.is_cancellable());
        assert!(!OperationStatus::AwaitingConfirmation.is_cancellable());
    }

    #[test]
    fn reconciliation_path() {
        let mut op = PendingOperation::dummy_transfer("ETH", 10);
        op.transition(OperationStatus::Routed).unwrap();
        op.transition(OperationStatus::AwaitingConfirmation).unwrap();
        op.transition(OperationStatus::NeedsManualReconciliation)
            .unwrap();
        assert!(!op.status.is_terminal());
        op.transition(OperationStatus::Failed).unwrap();
    }

    #[test]
    fn dissolved_batch_returns_to_pending() {
        let mut op = PendingOperation::dummy_transfer("ETH", 10);
        op.transition(OperationStatus::Batched).unwrap();
        op.transition(OperationStatus::Pending).unwrap();
        assert!(!OperationStatus::Routed.can_transition_to(OperationStatus::Pending));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            OperationStatus::Settled,
            OperationStatus::Failed,
            OperationStatus::Cancelled,
        ] {
            assert!(!terminal.can_transition_to(OperationStatus::Pending));
            assert!(!terminal.can_transition_to(OperationStatus::Routed));
        }
    }

    #[test]
    fn status_display() {
        assert_eq!(
            OperationStatus::NeedsManualReconciliation.to_string(),
            "NEEDS_MANUAL_RECONCILIATION"
        );
    }
}
