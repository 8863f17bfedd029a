//! # routeforge-wallet
//!
//! **Settlement Plane**: balance reservations, executor dispatch,
//! reconciliation, and the per-owner wallet aggregate.
//!
//! ## Architecture
//!
//! A [`WalletAggregate`] receives a request and:
//! 1. Serializes on its (wallet, asset) key ([`SettlementLocks`])
//! 2. Takes one market snapshot and routes through `routeforge-routing`
//! 3. Reserves funds in the [`Ledger`] (available → reserved)
//! 4. Dispatches to the route type's [`Executor`] under a deadline
//! 5. Commits, releases, or escalates the reservation
//!
//! ## Outcomes After A Timeout
//!
//! - **Retry**: one dispatch on the cached next-best route
//! - **Reconcile**: bounded polling of every unresolved attempt ([`Reconciler`])
//! - **Escalate**: funds parked until `resolve_manual_reconciliation`

pub mod idempotency;
pub mod ledger;
pub mod locks;
pub mod ports;
pub mod reconcile;
pub mod registry;
pub mod wallet;

pub use idempotency::SettlementGuard;
pub use ledger::Ledger;
pub use locks::{SettlementLocks, SettlementPermit};
pub use ports::{
    BatchDispatch, ChannelEventSink, DispatchRequest, EventSink, ExecutionReceipt, Executor,
    ExecutorSet, ExternalStatus, FeeOracle, NetworkSupportAnalyzer, PriceOracle,
};
pub use reconcile::{ReconcileOutcome, Reconciler, UnresolvedAttempt};
pub use registry::WalletRegistry;
pub use wallet::{BatchSettlement, ManualResolution, WalletAggregate, WalletPorts};
