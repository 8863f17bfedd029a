//! Route model: candidate execution paths and the per-request market snapshot
//! they are computed from.
//!
//! Routes are ephemeral. They are computed per request from one
//! [`MarketSnapshot`] and never persisted.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Asset, AssetSymbol, FeeTiers, NetworkId, OperationKind, Urgency};

/// Closed set of execution venues.
///
/// Declaration order is the fixed tie-break priority used by route selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum RouteType {
    /// Settle directly on the base layer.
    Direct,
    /// Bridge to and execute on a secondary network.
    SecondaryNetwork,
    /// Join a batch settlement with compatible operations.
    Batched,
    /// Convert through a DEX aggregator and bridge.
    BridgeAggregated,
}

impl RouteType {
    /// All route types in priority order.
    pub const ALL: [Self; 4] = [
        Self::Direct,
        Self::SecondaryNetwork,
        Self::Batched,
        Self::BridgeAggregated,
    ];

    /// Tie-break priority (lower wins).
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Self::Direct => 0,
            Self::SecondaryNetwork => 1,
            Self::Batched => 2,
            Self::BridgeAggregated => 3,
        }
    }

    /// Baseline execution risk on a 0–100 scale.
    #[must_use]
    pub fn base_risk(self) -> u8 {
        match self {
            Self::Direct => 10,
            Self::Batched => 20,
            Self::SecondaryNetwork => 35,
            Self::BridgeAggregated => 60,
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "DIRECT"),
            Self::SecondaryNetwork => write!(f, "SECONDARY_NETWORK"),
            Self::Batched => write!(f, "BATCHED"),
            Self::BridgeAggregated => write!(f, "BRIDGE_AGGREGATED"),
        }
    }
}

/// A candidate execution path with its cost/time/risk estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub route_type: RouteType,
    /// Target network for secondary-network routes.
    pub network: Option<NetworkId>,
    /// Never negative.
    pub estimated_fee: Decimal,
    pub estimated_time_seconds: u64,
    /// `estimated_fee <= max acceptable fee` at analysis time.
    pub viable: bool,
    /// 0–100, higher is riskier.
    pub risk_score: u8,
}

impl Route {
    /// Short label used in logs and audit records (`SECONDARY_NETWORK@arbitrum`).
    #[must_use]
    pub fn label(&self) -> String {
        match &self.network {
            Some(network) => format!("{}@{network}", self.route_type),
            None => self.route_type.to_string(),
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Route {
    pub fn dummy(route_type: RouteType, fee: i64, time_secs: u64) -> Self {
        Self {
            route_type,
            network: None,
            estimated_fee: Decimal::new(fee, 0),
            estimated_time_seconds: time_secs,
            viable: true,
            risk_score: route_type.base_risk(),
        }
    }

    #[must_use]
    pub fn on_network(mut self, network: &str) -> Self {
        self.network = Some(NetworkId::new(network));
        self
    }

    #[must_use]
    pub fn non_viable(mut self) -> Self {
        self.viable = false;
        self
    }
}

/// Costs quoted for moving the asset to one secondary network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkQuote {
    pub network: NetworkId,
    pub supports_asset: bool,
    pub bridge_cost: Decimal,
    pub destination_execution_cost: Decimal,
    pub estimated_time_seconds: u64,
}

/// Costs quoted for converting between assets through a DEX aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionQuote {
    pub from: AssetSymbol,
    pub to: AssetSymbol,
    pub protocol_fee: Decimal,
    pub estimated_slippage_cost: Decimal,
    pub estimated_time_seconds: Option<u64>,
}

/// Everything route analysis may read, captured once at the start of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub fee_tiers: FeeTiers,
    pub taken_at: DateTime<Utc>,
    pub network_quotes: Vec<NetworkQuote>,
    pub conversion: Option<ConversionQuote>,
    /// Compatible operations already pending in the batcher.
    pub compatible_pending: usize,
}

/// What is being routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub kind: OperationKind,
    pub asset: Asset,
    /// Set when the operation converts into a different asset.
    pub target_asset: Option<AssetSymbol>,
    pub amount: u128,
    pub source: NetworkId,
    pub destination: String,
    pub urgency: Urgency,
}

impl RouteRequest {
    /// Whether routing must include an asset conversion.
    #[must_use]
    pub fn requires_conversion(&self) -> bool {
        self.target_asset
            .as_ref()
            .is_some_and(|target| *target != self.asset.symbol)
    }
}

/// Submission path chosen for the executor call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionMode {
    /// Standard public broadcast.
    Public,
    /// Private relay, hidden from the public mempool.
    Private,
}

impl fmt::Display for SubmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "PUBLIC"),
            Self::Private => write!(f, "PRIVATE"),
        }
    }
}

/// Exposure classification of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ExposureLevel {
    Low,
    Elevated,
    High,
}

impl fmt::Display for ExposureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Elevated => write!(f, "ELEVATED"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// MEV protection decision recorded on every settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protection {
    pub exposure: ExposureLevel,
    pub mode: SubmissionMode,
    /// Extra fee expected from the private path (zero for public).
    pub fee_delta: Decimal,
}

impl Protection {
    #[must_use]
    pub fn public() -> Self {
        Self {
            exposure: ExposureLevel::Low,
            mode: SubmissionMode::Public,
            fee_delta: Decimal::ZERO,
        }
    }
}
