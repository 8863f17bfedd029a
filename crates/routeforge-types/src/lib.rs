//! # routeforge-types
//!
//! Shared types, errors, and configuration for the **routeforge** settlement
//! and route-optimization engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`WalletId`], [`OwnerId`], [`OperationId`], [`BatchId`], [`ReservationId`], [`NetworkId`]
//! - **Asset model**: [`Asset`], [`AssetSymbol`], [`GasClass`]
//! - **Balance model**: [`BalanceEntry`], [`Reservation`], [`ReservationState`]
//! - **Fee model**: [`FeeTiers`], [`FeeTier`], [`FeeSample`]
//! - **Route model**: [`Route`], [`RouteType`], [`NetworkQuote`], [`ConversionQuote`], [`MarketSnapshot`]
//! - **Operation model**: [`PendingOperation`], [`OperationKind`], [`OperationStatus`], [`Urgency`]
//! - **Batch model**: [`Batch`]
//! - **Events**: [`WalletEvent`], [`SettlementEvent`], [`FailureEvent`]
//! - **Configuration**: [`EngineConfig`] and its sections
//! - **Errors**: [`RouteforgeError`] with `RF_ERR_` prefix codes, [`ExecutorError`]
//! - **Constants**: defaults for every tunable

pub mod asset;
pub mod balance;
pub mod batch;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod fee;
pub mod ids;
pub mod operation;
pub mod route;

// Re-export all primary types at crate root for ergonomic imports:
//   use routeforge_types::{Route, RouteType, PendingOperation, ...};

pub use asset::*;
pub use balance::*;
pub use batch::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use fee::*;
pub use ids::*;
pub use operation::*;
pub use route::*;

// Constants are accessed via `routeforge_types::constants::FOO`
// (not re-exported to avoid name collisions).
