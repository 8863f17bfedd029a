//! Per-wallet balance ledger with reservations.
//!
//! The ledger is the source of truth for a wallet's balances. Every mutation
//! is all-or-nothing: either the full operation succeeds or nothing changes.
//!
//! | Call       | available | held   | outflow |
//! |------------|-----------|--------|---------|
//! | `deposit`  | +a        |        |         |
//! | `reserve`  | -a        | +a     |         |
//! | `release`  | +a        | -a     |         |
//! | `commit`   |           | -a     | +a      |
//!
//! `held` is `reserved` for active reservations and `escalated` once a
//! reservation is parked for manual reconciliation (`escalate` moves it).
//!
//! Conservation per asset: `Σ(available + reserved + escalated) == deposits − outflows`.

use std::collections::HashMap;

use chrono::Utc;
use routeforge_types::{
    AssetSymbol, BalanceEntry, OperationId, Reservation, ReservationId, ReservationState,
    Result, RouteforgeError, WalletId,
};

use crate::idempotency::SettlementGuard;

pub struct Ledger {
    wallet_id: WalletId,
    balances: HashMap<AssetSymbol, BalanceEntry>,
    reservations: HashMap<ReservationId, Reservation>,
    by_operation: HashMap<OperationId, ReservationId>,
    deposits: HashMap<AssetSymbol, u128>,
    outflows: HashMap<AssetSymbol, u128>,
    settled: SettlementGuard,
}

impl Ledger {
    #[must_use]
    pub fn new(wallet_id: WalletId, idempotency_cache_size: usize) -> Self {
        Self {
            wallet_id,
            balances: HashMap::new(),
            reservations: HashMap::new(),
            by_operation: HashMap::new(),
            deposits: HashMap::new(),
            outflows: HashMap::new(),
            settled: SettlementGuard::new(idempotency_cache_size),
        }
    }

    /// Credit available balance from outside the wallet.
    pub fn deposit(&mut self, asset: &AssetSymbol, amount: u128) {
        let entry = self.balances.entry(asset.clone()).or_default();
        entry.available = entry.available.saturating_add(amount);
        let total = self.deposits.entry(asset.clone()).or_default();
        *total = total.saturating_add(amount);
    }

    #[must_use]
    pub fn balance(&self, asset: &AssetSymbol) -> BalanceEntry {
        self.balances.get(asset).copied().unwrap_or_default()
    }

    /// Assets with any recorded balance, sorted.
    #[must_use]
    pub fn assets(&self) -> Vec<AssetSymbol> {
        let mut assets: Vec<AssetSymbol> = self.balances.keys().cloned().collect();
        assets.sort();
        assets
    }

    // -----------------------------------------------------------------
    // Reservations
    // -----------------------------------------------------------------

    /// Move `amount` from available to reserved for `operation_id`.
    ///
    /// # Errors
    /// - `InsufficientBalance` if available < amount
    /// - `InvalidReservation` if the operation already holds a reservation
    pub fn reserve(
        &mut self,
        operation_id: OperationId,
        asset: &AssetSymbol,
        amount: u128,
    ) -> Result<ReservationId> {
        if self.by_operation.contains_key(&operation_id) {
            return Err(RouteforgeError::InvalidReservation {
                reason: format!("{operation_id} already holds a reservation"),
            });
        }
        let entry = self.balances.entry(asset.clone()).or_default();
        if entry.available < amount {
            return Err(RouteforgeError::InsufficientBalance {
                needed: amount,
                available: entry.available,
            });
        }
        entry.available -= amount;
        entry.reserved += amount;

        let now = Utc::now();
        let id = ReservationId::new();
        self.reservations.insert(
            id,
            Reservation {
                id,
                wallet_id: self.wallet_id,
                operation_id,
                asset: asset.clone(),
                amount,
                state: ReservationState::Active,
                created_at: now,
                updated_at: now,
            },
        );
        self.by_operation.insert(operation_id, id);
        Ok(id)
    }

    /// Settle a reservation: its funds leave the wallet.
    ///
    /// # Errors
    /// - `OperationAlreadySettled` if the operation was committed before
    /// - `InvalidReservation` if the reservation is unknown or terminal
    pub fn commit(&mut self, id: ReservationId) -> Result<()> {
        let (operation_id, asset, amount, from) = self.holding(id)?;
        if self.settled.is_settled(&operation_id) {
            return Err(RouteforgeError::OperationAlreadySettled(operation_id));
        }
        self.debit_bucket(&asset, amount, from)?;
        self.transition(id, ReservationState::Committed)?;
        self.settled.mark_settled(operation_id)?;
        let out = self.outflows.entry(asset).or_default();
        *out = out.saturating_add(amount);
        Ok(())
    }

    /// Return a reservation's funds to available.
    ///
    /// # Errors
    /// `InvalidReservation` if the reservation is unknown or terminal.
    pub fn release(&mut self, id: ReservationId) -> Result<()> {
        let (_, asset, amount, from) = self.holding(id)?;
        self.debit_bucket(&asset, amount, from)?;
        self.transition(id, ReservationState::Released)?;
        let entry = self.balances.entry(asset).or_default();
        entry.available = entry.available.saturating_add(amount);
        Ok(())
    }

    /// Park an active reservation for manual reconciliation.
    ///
    /// # Errors
    /// `InvalidReservation` if the reservation is not active.
    pub fn escalate(&mut self, id: ReservationId) -> Result<()> {
        let (_, asset, amount, from) = self.holding(id)?;
        if from != ReservationState::Active {
            return Err(RouteforgeError::InvalidReservation {
                reason: format!("{id} is {from}, only ACTIVE reservations escalate"),
            });
        }
        self.debit_bucket(&asset, amount, from)?;
        self.transition(id, ReservationState::Escalated)?;
        let entry = self.balances.entry(asset).or_default();
        entry.escalated = entry.escalated.saturating_add(amount);
        Ok(())
    }

    #[must_use]
    pub fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.get(&id)
    }

    #[must_use]
    pub fn reservation_for(&self, operation_id: OperationId) -> Option<&Reservation> {
        self.by_operation
            .get(&operation_id)
            .and_then(|id| self.reservations.get(id))
    }

    fn holding(
        &self,
        id: ReservationId,
    ) -> Result<(OperationId, AssetSymbol, u128, ReservationState)> {
        let r = self
            .reservations
            .get(&id)
            .ok_or_else(|| RouteforgeError::InvalidReservation {
                reason: format!("{id} not found"),
            })?;
        if r.state.is_terminal() {
            return Err(RouteforgeError::InvalidReservation {
                reason: format!("{id} is already {}", r.state),
            });
        }
        Ok((r.operation_id, r.asset.clone(), r.amount, r.state))
    }

    fn debit_bucket(
        &mut self,
        asset: &AssetSymbol,
        amount: u128,
        state: ReservationState,
    ) -> Result<()> {
        let entry = self
            .balances
            .get_mut(asset)
            .ok_or(RouteforgeError::InsufficientReserved)?;
        let bucket = match state {
            ReservationState::Escalated => &mut entry.escalated,
            _ => &mut entry.reserved,
        };
        if *bucket < amount {
            return Err(RouteforgeError::InsufficientReserved);
        }
        *bucket -= amount;
        Ok(())
    }

    fn transition(&mut self, id: ReservationId, target: ReservationState) -> Result<()> {
        match self.reservations.get_mut(&id) {
            Some(r) => r.transition(target),
            None => Err(RouteforgeError::InvalidReservation {
                reason: format!("{id} not found"),
            }),
        }
    }

    // -----------------------------------------------------------------
    // Conservation
    // -----------------------------------------------------------------

    /// Expected holdings of `asset`: deposits − outflows.
    #[must_use]
    pub fn expected_supply(&self, asset: &AssetSymbol) -> u128 {
        let deposited = self.deposits.get(asset).copied().unwrap_or(0);
        let out = self.outflows.get(asset).copied().unwrap_or(0);
        deposited.saturating_sub(out)
    }

    /// Check every asset's holdings against its deposit/outflow history.
    ///
    /// # Errors
    /// `SupplyInvariantViolation` naming the first asset that does not balance.
    pub fn verify_conservation(&self) -> Result<()> {
        for asset in self.assets() {
            let actual = self.balance(&asset).total();
            let expected = self.expected_supply(&asset);
            if actual != expected {
                return Err(RouteforgeError::SupplyInvariantViolation {
                    reason: format!(
                        "Asset {asset}: holdings {actual} != expected {expected} \
                         (deposits={}, outflows={})",
                        self.deposits.get(&asset).copied().unwrap_or(0),
                        self.outflows.get(&asset).copied().unwrap_or(0),
                    ),
                });
            }
        }
        Ok(())
    }
}
