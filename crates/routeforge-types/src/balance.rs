//! Balance tracking types for the reservation model.
//!
//! Every (wallet, asset) pair has an `available` balance (spendable), a
//! `reserved` balance (held for an in-flight settlement) and an `escalated`
//! balance (held for operations awaiting manual reconciliation). Amounts are
//! non-negative integers in the asset's smallest unit.
//!
//! ## Reservation State Machine
//!
//! ```text
//!   ┌────────┐  executor success   ┌───────────┐
//!   │ ACTIVE ├────────────────────▶│ COMMITTED │
//!   └─┬────┬─┘                     └───────────┘
//!     │    │ failure / cancel
//!     │    ▼
//!     │  ┌──────────┐
//!     │  │ RELEASED │
//!     │  └──────────┘
//!     │ reconciliation exhausted
//!     ▼
//!   ┌───────────┐  manual resolution  ┌──────────────────────┐
//!   │ ESCALATED ├────────────────────▶│ COMMITTED / RELEASED │
//!   └───────────┘                     └──────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AssetSymbol, OperationId, ReservationId, WalletId};

/// A single balance entry for a (wallet, asset) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BalanceEntry {
    /// Spendable by new operations.
    pub available: u128,
    /// Held by active reservations.
    pub reserved: u128,
    /// Held by escalated reservations awaiting manual reconciliation.
    pub escalated: u128,
}

impl BalanceEntry {
    /// Create a zero balance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total balance owned by the wallet (available + reserved + escalated).
    #[must_use]
    pub fn total(&self) -> u128 {
        self.available
            .saturating_add(self.reserved)
            .saturating_add(self.escalated)
    }

    /// Whether this entry has no balance at all.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

/// Lifecycle state of a reservation. Transitions never go backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationState {
    /// Funds are held for an in-flight settlement.
    Active,
    /// The settlement succeeded; funds left the wallet.
    Committed,
    /// The settlement failed; funds returned to available.
    Released,
    /// Reconciliation gave up; funds held until a manual decision.
    Escalated,
}

impl ReservationState {
    /// Can this reservation transition to the given target state?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Active,
                Self::Committed | Self::Released | Self::Escalated
            ) | (Self::Escalated, Self::Committed | Self::Released)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Released)
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Committed => write!(f, "COMMITTED"),
            Self::Released => write!(f, "RELEASED"),
            Self::Escalated => write!(f, "ESCALATED"),
        }
    }
}

/// A hold placed on wallet balance for exactly one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub wallet_id: WalletId,
    pub operation_id: OperationId,
    pub asset: AssetSymbol,
    pub amount: u128,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ReservationState::Active
    }

    /// Move to `target`, enforcing the state machine.
    ///
    /// # Errors
    /// Returns `InvalidReservation` if the transition is not allowed.
    pub fn transition(&mut self, target: ReservationState) -> crate::Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(crate::RouteforgeError::InvalidReservation {
                reason: format!("{} cannot move {} -> {target}", self.id, self.state),
            });
        }
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}
