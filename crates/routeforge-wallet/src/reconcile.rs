//! Bounded reconciliation of dispatched but unconfirmed attempts.
//!
//! After an executor deadline expires the external settlement may still land.
//! The reconciler polls every unresolved attempt on an exponential backoff
//! schedule for at most `max_attempts` rounds:
//!
//! - any attempt confirmed: that attempt is the settlement
//! - every attempt rejected: nothing settled, funds can be released
//! - rounds exhausted: hand over to manual reconciliation

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use routeforge_types::{OperationId, ReconciliationConfig, Route};
use rust_decimal::Decimal;

use crate::ports::{ExecutionReceipt, ExecutorSet, ExternalStatus};

/// A dispatch whose outcome is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedAttempt {
    pub attempt: u32,
    pub route: Route,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Confirmed {
        attempt: u32,
        route: Route,
        receipt: ExecutionReceipt,
    },
    /// The last rejection observed, which is the one that closes the operation.
    AllRejected {
        attempt: u32,
        route: Route,
        reason: String,
        realized_fee: Option<Decimal>,
    },
    Exhausted {
        polls: u32,
    },
}

/// Poll delays from the configured interval, growth factor and cap. No jitter;
/// `max_attempts` bounds the total wait instead of an elapsed-time limit.
#[must_use]
pub fn poll_schedule(config: &ReconciliationConfig) -> ExponentialBackoff {
    let mut schedule = ExponentialBackoff {
        initial_interval: Duration::from_millis(config.initial_backoff_ms),
        max_interval: Duration::from_millis(config.max_backoff_ms),
        multiplier: f64::from(config.multiplier),
        randomization_factor: 0.0,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };
    schedule.reset();
    schedule
}

pub struct Reconciler<'a> {
    executors: &'a ExecutorSet,
    config: &'a ReconciliationConfig,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(executors: &'a ExecutorSet, config: &'a ReconciliationConfig) -> Self {
        Self { executors, config }
    }

    /// Poll `attempts` until one resolves or the poll budget runs out.
    #[tracing::instrument(skip_all, fields(operation = %operation_id, attempts = attempts.len()))]
    pub async fn run(
        &self,
        operation_id: OperationId,
        attempts: Vec<UnresolvedAttempt>,
    ) -> ReconcileOutcome {
        let mut open = attempts;
        let mut last_rejection = None;
        let mut schedule = poll_schedule(self.config);

        for poll in 0..self.config.max_attempts {
            if open.is_empty() {
                break;
            }
            let delay = schedule.next_backoff().unwrap_or(schedule.max_interval);
            tokio::time::sleep(delay).await;

            let mut still_open = Vec::with_capacity(open.len());
            for pending in open {
                let executor = self.executors.for_route(pending.route.route_type);
                match executor.query_status(operation_id, pending.attempt).await {
                    Ok(ExternalStatus::Confirmed(receipt)) => {
                        tracing::info!(
                            attempt = pending.attempt,
                            route = %pending.route.label(),
                            poll,
                            "Reconciliation confirmed settlement"
                        );
                        return ReconcileOutcome::Confirmed {
                            attempt: pending.attempt,
                            route: pending.route,
                            receipt,
                        };
                    }
                    Ok(ExternalStatus::Rejected {
                        reason,
                        realized_fee,
                    }) => {
                        tracing::debug!(attempt = pending.attempt, poll, %reason, "Attempt rejected");
                        last_rejection = Some(ReconcileOutcome::AllRejected {
                            attempt: pending.attempt,
                            route: pending.route,
                            reason,
                            realized_fee,
                        });
                    }
                    Ok(ExternalStatus::Pending) => {
                        tracing::debug!(attempt = pending.attempt, poll, "Attempt still pending");
                        still_open.push(pending);
                    }
                    Err(err) => {
                        tracing::debug!(attempt = pending.attempt, poll, error = %err, "Status poll failed");
                        still_open.push(pending);
                    }
                }
            }
            open = still_open;
        }

        if open.is_empty() {
            if let Some(rejected) = last_rejection {
                return rejected;
            }
        }

        tracing::error!(
            unresolved = open.len(),
            polls = self.config.max_attempts,
            "Reconciliation exhausted"
        );
        ReconcileOutcome::Exhausted {
            polls: self.config.max_attempts,
        }
    }
}
