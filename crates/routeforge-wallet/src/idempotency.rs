//! Settlement idempotency guard: an operation commits at most once.
//!
//! A timed-out first dispatch can still confirm after the retry settled. The
//! guard turns that late confirmation into
//! [`RouteforgeError::OperationAlreadySettled`] instead of a second debit.
//!
//! Bounded with FIFO eviction so memory stays predictable in long-running
//! wallets.

use std::collections::{HashSet, VecDeque};

use routeforge_types::{OperationId, Result, RouteforgeError};

pub struct SettlementGuard {
    settled: HashSet<OperationId>,
    /// Insertion order (front = oldest).
    order: VecDeque<OperationId>,
    max_size: usize,
}

impl SettlementGuard {
    /// Create a guard holding at most `max_size` operations (minimum 1).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            settled: HashSet::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    /// Record a settlement.
    ///
    /// # Errors
    /// `OperationAlreadySettled` if `operation_id` was already recorded.
    pub fn mark_settled(&mut self, operation_id: OperationId) -> Result<()> {
        if self.settled.contains(&operation_id) {
            return Err(RouteforgeError::OperationAlreadySettled(operation_id));
        }

        if self.settled.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.settled.remove(&oldest);
            }
        }

        self.settled.insert(operation_id);
        self.order.push_back(operation_id);
        Ok(())
    }

    pub fn is_settled(&self, operation_id: &OperationId) -> bool {
        self.settled.contains(operation_id)
    }

    pub fn len(&self) -> usize {
        self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}
