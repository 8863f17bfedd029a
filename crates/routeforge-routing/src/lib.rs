//! # routeforge-routing
//!
//! **Pure route engine for routeforge.**
//!
//! This crate is the compute plane: it turns a request plus a single
//! [`MarketSnapshot`](routeforge_types::MarketSnapshot) into candidate routes
//! and picks one. It has:
//!
//! - **Zero side effects**: no I/O, no balance mutation, no async
//! - **Deterministic output**: same candidates -> same choice, replayable for audit
//! - **Batch formation**: compatible operations grouped only when it saves fees
//! - **Timing and MEV heuristics**: shape-preserving, coefficients from config

pub mod analyzer;
pub mod batcher;
pub mod determinism;
pub mod mev;
pub mod selector;
pub mod timing;

pub use analyzer::RouteAnalyzer;
pub use batcher::{BatchKey, TransactionBatcher};
pub use determinism::{compute_batch_digest, compute_decision_digest, verify_decision_digest};
pub use mev::MevGuard;
pub use selector::{RouteSelection, compare_routes, rank_routes, select_route};
pub use timing::{TimingAdvisor, TimingBasis, TimingRecommendation};
