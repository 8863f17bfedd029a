//! Collaborator contracts consumed by the wallet.
//!
//! Everything behind these traits lives outside the engine: fee feeds,
//! network/bridge clients, executors, price feeds and the event bus. Every
//! async method is an explicit suspension point of a settlement request.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use routeforge_types::{
    AssetSymbol, BatchId, ConversionQuote, ExecutorError, FeeSample, FeeTiers, NetworkId,
    OperationId, OperationKind, Result, Route, RouteType, SubmissionMode, WalletEvent, WalletId,
};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Source of base-layer fee conditions.
#[async_trait]
pub trait FeeOracle: Send + Sync {
    /// Current fee per gas unit for each tier.
    async fn current_fee_tiers(&self) -> Result<FeeTiers>;

    /// Standard-tier samples over the trailing `window_hours`, oldest first.
    async fn fee_history(&self, window_hours: u32) -> Result<Vec<FeeSample>>;
}

/// Knowledge of secondary networks and conversion venues.
#[async_trait]
pub trait NetworkSupportAnalyzer: Send + Sync {
    async fn supports_asset(&self, network: &NetworkId, asset: &AssetSymbol) -> Result<bool>;

    async fn estimate_bridge_cost(
        &self,
        network: &NetworkId,
        asset: &AssetSymbol,
        amount: u128,
    ) -> Result<Decimal>;

    async fn estimate_destination_execution_cost(
        &self,
        network: &NetworkId,
        asset: &AssetSymbol,
        kind: OperationKind,
    ) -> Result<Decimal>;

    /// Expected seconds until the asset is usable on `network`.
    async fn estimate_transit_seconds(&self, network: &NetworkId) -> Result<u64>;

    /// Protocol fee and slippage for converting `amount` of `from` into `to`.
    async fn quote_conversion(
        &self,
        from: &AssetSymbol,
        to: &AssetSymbol,
        amount: u128,
    ) -> Result<ConversionQuote>;
}

/// Source of asset prices for portfolio valuation.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Price of one whole unit of `asset` in `quote`.
    ///
    /// # Errors
    /// `PriceUnavailable` when no price is known.
    async fn get_price(&self, asset: &AssetSymbol, quote: &str) -> Result<Decimal>;
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Members settled by one batched dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDispatch {
    pub batch_id: BatchId,
    pub members: Vec<OperationId>,
    /// Hex digest committing to the member set.
    pub digest: String,
}

/// One executor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub operation_id: OperationId,
    pub wallet_id: WalletId,
    /// 1 for the first dispatch, 2 for the timeout retry.
    pub attempt: u32,
    pub kind: OperationKind,
    pub asset: AssetSymbol,
    pub target_asset: Option<AssetSymbol>,
    pub amount: u128,
    pub destination: String,
    pub route: Route,
    pub mode: SubmissionMode,
    pub batch: Option<BatchDispatch>,
}

/// Successful external settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    pub settlement_ref: String,
    pub realized_fee: Decimal,
    /// Amount of the target asset credited back to the wallet (swaps).
    pub credited_amount: Option<u128>,
}

impl ExecutionReceipt {
    #[must_use]
    pub fn new(settlement_ref: impl Into<String>, realized_fee: Decimal) -> Self {
        Self {
            settlement_ref: settlement_ref.into(),
            realized_fee,
            credited_amount: None,
        }
    }
}

/// Status of a dispatched attempt as reported by the external system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalStatus {
    Pending,
    Confirmed(ExecutionReceipt),
    Rejected {
        reason: String,
        realized_fee: Option<Decimal>,
    },
}

/// Performs the external settlement call for one route type.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        request: &DispatchRequest,
    ) -> std::result::Result<ExecutionReceipt, ExecutorError>;

    /// Poll the terminal status of an earlier dispatch.
    async fn query_status(
        &self,
        operation_id: OperationId,
        attempt: u32,
    ) -> std::result::Result<ExternalStatus, ExecutorError>;
}

/// One executor per route type. The only place a [`RouteType`] turns into a
/// side effect.
#[derive(Clone)]
pub struct ExecutorSet {
    direct: Arc<dyn Executor>,
    secondary_network: Arc<dyn Executor>,
    batched: Arc<dyn Executor>,
    bridge_aggregated: Arc<dyn Executor>,
}

impl ExecutorSet {
    #[must_use]
    pub fn new(
        direct: Arc<dyn Executor>,
        secondary_network: Arc<dyn Executor>,
        batched: Arc<dyn Executor>,
        bridge_aggregated: Arc<dyn Executor>,
    ) -> Self {
        Self {
            direct,
            secondary_network,
            batched,
            bridge_aggregated,
        }
    }

    /// Same executor behind every route type.
    #[must_use]
    pub fn uniform(executor: Arc<dyn Executor>) -> Self {
        Self::new(
            Arc::clone(&executor),
            Arc::clone(&executor),
            Arc::clone(&executor),
            executor,
        )
    }

    #[must_use]
    pub fn for_route(&self, route_type: RouteType) -> &Arc<dyn Executor> {
        match route_type {
            RouteType::Direct => &self.direct,
            RouteType::SecondaryNetwork => &self.secondary_network,
            RouteType::Batched => &self.batched,
            RouteType::BridgeAggregated => &self.bridge_aggregated,
        }
    }
}

impl std::fmt::Debug for ExecutorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorSet").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Fire-and-forget event publication. Must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: WalletEvent);
}

/// Event sink backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<WalletEvent>,
}

impl ChannelEventSink {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WalletEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: WalletEvent) {
        let operation = event.operation_id();
        if self.tx.send(event).is_err() {
            tracing::warn!(operation = %operation, "Event receiver dropped, event discarded");
        }
    }
}
