//! Scripted in-memory collaborators shared by the wallet integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use routeforge_types::{
    Asset, AssetSymbol, ConversionQuote, EngineConfig, ExecutorError, FeeSample, FeeTiers,
    NetworkId, OperationId, OperationKind, OwnerId, Result, RouteType, RouteforgeError,
    WalletEvent, constants::BASE_NETWORK,
};
use routeforge_wallet::{
    ChannelEventSink, DispatchRequest, ExecutionReceipt, Executor, ExecutorSet, ExternalStatus,
    FeeOracle, NetworkSupportAnalyzer, PriceOracle, WalletAggregate, WalletPorts,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc::UnboundedReceiver;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn usdc() -> AssetSymbol {
    AssetSymbol::new("USDC")
}

pub fn eth() -> AssetSymbol {
    AssetSymbol::new("ETH")
}

pub fn arbitrum() -> NetworkId {
    NetworkId::new("arbitrum")
}

pub fn optimism() -> NetworkId {
    NetworkId::new("optimism")
}

/// One whole unit of an 18-decimal asset.
pub const UNIT: u128 = 1_000_000_000_000_000_000;

// ---------------------------------------------------------------------------
// Fee oracle
// ---------------------------------------------------------------------------

/// Tiers: slow 0.00005, standard 0.0001, fast 0.0002, instant 0.0004 per gas.
/// A token transfer (65k gas) costs 13 at the fast tier and 3.25 at the slow tier.
pub fn tiers() -> FeeTiers {
    FeeTiers {
        slow: Decimal::new(5, 5),
        standard: Decimal::new(10, 5),
        fast: Decimal::new(20, 5),
        instant: Decimal::new(40, 5),
    }
}

pub struct StaticFeeOracle {
    pub tiers: FeeTiers,
    pub history: Vec<FeeSample>,
}

#[async_trait]
impl FeeOracle for StaticFeeOracle {
    async fn current_fee_tiers(&self) -> Result<FeeTiers> {
        Ok(self.tiers)
    }

    async fn fee_history(&self, _window_hours: u32) -> Result<Vec<FeeSample>> {
        Ok(self.history.clone())
    }
}

// ---------------------------------------------------------------------------
// Networks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct NetworkCost {
    pub bridge: Decimal,
    pub execution: Decimal,
    pub transit_secs: u64,
}

/// Secondary networks with fixed costs. The base layer supports every asset
/// except those listed in `unsupported_on_base`.
pub struct StaticNetworks {
    pub costs: BTreeMap<NetworkId, NetworkCost>,
    pub unsupported_on_base: BTreeSet<AssetSymbol>,
    pub conversion: ConversionQuote,
}

impl StaticNetworks {
    pub fn new() -> Self {
        Self {
            costs: BTreeMap::new(),
            unsupported_on_base: BTreeSet::new(),
            conversion: ConversionQuote {
                from: usdc(),
                to: eth(),
                protocol_fee: Decimal::ONE,
                estimated_slippage_cost: Decimal::new(5, 1),
                estimated_time_seconds: Some(240),
            },
        }
    }

    /// arbitrum 2.2, optimism 3.1.
    pub fn with_rollups() -> Self {
        let mut networks = Self::new();
        networks.costs.insert(
            arbitrum(),
            NetworkCost {
                bridge: Decimal::new(2, 0),
                execution: Decimal::new(2, 1),
                transit_secs: 600,
            },
        );
        networks.costs.insert(
            optimism(),
            NetworkCost {
                bridge: Decimal::new(3, 0),
                execution: Decimal::new(1, 1),
                transit_secs: 900,
            },
        );
        networks
    }

    fn cost(&self, network: &NetworkId) -> Result<NetworkCost> {
        self.costs
            .get(network)
            .copied()
            .ok_or_else(|| RouteforgeError::NetworkQuote {
                network: network.clone(),
                reason: "unknown network".into(),
            })
    }
}

#[async_trait]
impl NetworkSupportAnalyzer for StaticNetworks {
    async fn supports_asset(&self, network: &NetworkId, asset: &AssetSymbol) -> Result<bool> {
        if network.as_str() == BASE_NETWORK {
            return Ok(!self.unsupported_on_base.contains(asset));
        }
        Ok(self.costs.contains_key(network))
    }

    async fn estimate_bridge_cost(
        &self,
        network: &NetworkId,
        _asset: &AssetSymbol,
        _amount: u128,
    ) -> Result<Decimal> {
        Ok(self.cost(network)?.bridge)
    }

    async fn estimate_destination_execution_cost(
        &self,
        network: &NetworkId,
        _asset: &AssetSymbol,
        _kind: OperationKind,
    ) -> Result<Decimal> {
        Ok(self.cost(network)?.execution)
    }

    async fn estimate_transit_seconds(&self, network: &NetworkId) -> Result<u64> {
        Ok(self.cost(network)?.transit_secs)
    }

    async fn quote_conversion(
        &self,
        from: &AssetSymbol,
        to: &AssetSymbol,
        _amount: u128,
    ) -> Result<ConversionQuote> {
        Ok(ConversionQuote {
            from: from.clone(),
            to: to.clone(),
            ..self.conversion.clone()
        })
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Step {
    Succeed {
        fee: Decimal,
        credited: Option<u128>,
    },
    Reject(String),
    Unavailable(String),
    /// Never answers; the wallet's deadline fires.
    Hang,
}

impl Step {
    pub fn succeed(fee: i64) -> Self {
        Self::Succeed {
            fee: Decimal::new(fee, 0),
            credited: None,
        }
    }
}

/// Executor that plays back scripted steps, then succeeds with `default_fee`.
pub struct ScriptedExecutor {
    steps: Mutex<VecDeque<Step>>,
    statuses: Mutex<HashMap<u32, ExternalStatus>>,
    calls: Mutex<Vec<DispatchRequest>>,
    default_fee: Decimal,
}

impl ScriptedExecutor {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            statuses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            default_fee: Decimal::new(2, 0),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn hanging() -> Arc<Self> {
        Self::new(vec![Step::Hang; 8])
    }

    /// Status reported for `attempt` while reconciling. Unset attempts stay pending.
    pub fn set_status(&self, attempt: u32, status: ExternalStatus) {
        self.statuses.lock().unwrap().insert(attempt, status);
    }

    pub fn calls(&self) -> Vec<DispatchRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(
        &self,
        request: &DispatchRequest,
    ) -> std::result::Result<ExecutionReceipt, ExecutorError> {
        self.calls.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(ExecutionReceipt::new(
                format!("tx:{}:{}", request.operation_id, request.attempt),
                self.default_fee,
            )),
            Some(Step::Succeed { fee, credited }) => Ok(ExecutionReceipt {
                settlement_ref: format!("tx:{}:{}", request.operation_id, request.attempt),
                realized_fee: fee,
                credited_amount: credited,
            }),
            Some(Step::Reject(reason)) => Err(ExecutorError::Rejected {
                reason,
                realized_fee: Some(Decimal::ONE),
            }),
            Some(Step::Unavailable(reason)) => Err(ExecutorError::Unavailable(reason)),
            Some(Step::Hang) => std::future::pending().await,
        }
    }

    async fn query_status(
        &self,
        _operation_id: OperationId,
        attempt: u32,
    ) -> std::result::Result<ExternalStatus, ExecutorError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&attempt)
            .cloned()
            .unwrap_or(ExternalStatus::Pending))
    }
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

pub struct FixedPrices(pub HashMap<AssetSymbol, Decimal>);

#[async_trait]
impl PriceOracle for FixedPrices {
    async fn get_price(&self, asset: &AssetSymbol, quote: &str) -> Result<Decimal> {
        self.0
            .get(asset)
            .copied()
            .ok_or_else(|| RouteforgeError::PriceUnavailable {
                asset: asset.to_string(),
                quote: quote.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Short deadline and backoff so timeout paths finish in milliseconds.
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.execution.executor_deadline_ms = 50;
    config.reconciliation.max_attempts = 3;
    config.reconciliation.initial_backoff_ms = 2;
    config.reconciliation.multiplier = 2;
    config.reconciliation.max_backoff_ms = 8;
    config
}

pub struct Harness {
    pub wallet: Arc<WalletAggregate>,
    pub events: UnboundedReceiver<WalletEvent>,
}

impl Harness {
    /// Wallet with USDC and ETH registered and one executor for every route.
    pub fn new(networks: StaticNetworks, executor: Arc<ScriptedExecutor>) -> Self {
        Self::build(fast_config(), networks, ExecutorSet::uniform(executor))
    }

    pub fn build(config: EngineConfig, networks: StaticNetworks, executors: ExecutorSet) -> Self {
        init_tracing();
        let (sink, events) = ChannelEventSink::channel();
        let secondary: Vec<NetworkId> = networks.costs.keys().cloned().collect();
        let ports = WalletPorts {
            fee_oracle: Arc::new(StaticFeeOracle {
                tiers: tiers(),
                history: Vec::new(),
            }),
            networks: Arc::new(networks),
            executors,
            events: Arc::new(sink),
        };
        let wallet = WalletAggregate::new(OwnerId::new(), config, secondary, ports).unwrap();
        wallet.register_asset(Asset::dummy_token("USDC"));
        wallet.register_asset(Asset::dummy_native());
        Self {
            wallet: Arc::new(wallet),
            events,
        }
    }

    /// Executors split by route type.
    pub fn split(
        networks: StaticNetworks,
        direct: Arc<ScriptedExecutor>,
        secondary: Arc<ScriptedExecutor>,
        batched: Arc<ScriptedExecutor>,
    ) -> Self {
        let bridge = ScriptedExecutor::succeeding();
        Self::build(
            fast_config(),
            networks,
            ExecutorSet::new(direct, secondary, batched, bridge),
        )
    }

    pub fn drain_events(&mut self) -> Vec<WalletEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn route_types(calls: &[DispatchRequest]) -> Vec<RouteType> {
    calls.iter().map(|c| c.route.route_type).collect()
}
