//! The wallet aggregate.
//!
//! Owns one owner's balances and orchestrates every asset movement through
//! reserve → execute → commit/release:
//!
//! 1. Validate input (no side effects on failure)
//! 2. Protocol-support check for stake, swap and bridge
//! 3. Queue on the (wallet, asset) settlement lock
//! 4. Balance check, then one market snapshot for all candidates
//! 5. Analyze, select, apply MEV protection. A `Batched` choice joins a real
//!    batch with the compatible queued transfers and settles with it
//! 6. Reserve funds and dispatch to the route's executor under a deadline
//! 7. Timeout: retry once on the cached next-best route, then reconcile
//! 8. Commit on success, release on rejection, escalate on exhausted reconciliation
//!
//! Local state sits behind one mutex that is never held across an await.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rust_decimal::Decimal;
use routeforge_routing::{
    BatchKey, MevGuard, RouteAnalyzer, RouteSelection, TimingAdvisor, TimingRecommendation,
    TransactionBatcher, compute_decision_digest,
};
use routeforge_types::{
    Asset, AssetSymbol, BalanceEntry, Batch, BatchId, EngineConfig, EscalationEvent,
    ExecutorError, FailureEvent, FeeTier, GasClass, MarketSnapshot, NetworkId, NetworkQuote,
    OperationId, OperationKind, OperationStatus, OwnerId, PendingOperation, Protection,
    ReservationId, Result, Route, RouteRequest, RouteType, RouteforgeError, SettlementEvent,
    SubmissionMode, Urgency, WalletEvent, WalletId, constants,
};
use tokio_util::sync::CancellationToken;

use crate::ledger::Ledger;
use crate::locks::SettlementLocks;
use crate::ports::{
    BatchDispatch, DispatchRequest, EventSink, ExecutionReceipt, ExecutorSet, FeeOracle,
    NetworkSupportAnalyzer, PriceOracle,
};
use crate::reconcile::{ReconcileOutcome, Reconciler, UnresolvedAttempt};

/// External collaborators a wallet talks to.
#[derive(Clone)]
pub struct WalletPorts {
    pub fee_oracle: Arc<dyn FeeOracle>,
    pub networks: Arc<dyn NetworkSupportAnalyzer>,
    pub executors: ExecutorSet,
    pub events: Arc<dyn EventSink>,
}

/// Manual decision for an operation in `NeedsManualReconciliation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualResolution {
    /// The external settlement did land.
    Settled {
        settlement_ref: String,
        realized_fee: Decimal,
    },
    /// Nothing settled; return the funds.
    Failed { reason: String },
}

/// Result of dispatching one formed batch.
#[derive(Debug, Clone)]
pub struct BatchSettlement {
    pub batch: Batch,
    pub events: Vec<SettlementEvent>,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// What the caller asked for, before an operation exists.
#[derive(Debug, Clone)]
struct OperationSpec {
    kind: OperationKind,
    asset: AssetSymbol,
    target_asset: Option<AssetSymbol>,
    amount: u128,
    destination: String,
    urgency: Urgency,
    /// Restricts secondary-network quoting to one network (bridges).
    network: Option<NetworkId>,
}

/// An operation holding a reservation while its settlement is unresolved.
#[derive(Debug, Clone)]
struct InFlight {
    operation_id: OperationId,
    kind: OperationKind,
    asset: AssetSymbol,
    target_asset: Option<AssetSymbol>,
    amount: u128,
    destination: String,
    reservation: ReservationId,
    batch_id: Option<BatchId>,
    decision_digest: String,
}

#[derive(Debug, Clone)]
struct Escalation {
    flight: InFlight,
    route: Route,
    protection: Protection,
    attempts: u32,
}

enum DispatchOutcome {
    Settled(ExecutionReceipt),
    Rejected {
        reason: String,
        realized_fee: Option<Decimal>,
    },
    Unavailable(String),
    TimedOut,
}

struct WalletState {
    assets: HashMap<AssetSymbol, Asset>,
    ledger: Ledger,
    operations: HashMap<OperationId, PendingOperation>,
    batcher: TransactionBatcher,
    /// Open staking positions.
    positions: BTreeMap<AssetSymbol, u128>,
    escalations: HashMap<OperationId, Escalation>,
}

impl WalletState {
    fn operation_mut(&mut self, id: OperationId) -> Result<&mut PendingOperation> {
        self.operations
            .get_mut(&id)
            .ok_or(RouteforgeError::OperationNotFound(id))
    }
}

// ---------------------------------------------------------------------------
// WalletAggregate
// ---------------------------------------------------------------------------

/// One owner's wallet. Share it as `Arc<WalletAggregate>`; every method takes
/// `&self`.
pub struct WalletAggregate {
    id: WalletId,
    owner: OwnerId,
    config: EngineConfig,
    base_network: NetworkId,
    /// Known secondary networks, sorted.
    secondary_networks: Vec<NetworkId>,
    analyzer: RouteAnalyzer,
    mev: MevGuard,
    timing: TimingAdvisor,
    ports: WalletPorts,
    locks: SettlementLocks,
    state: Mutex<WalletState>,
}

impl WalletAggregate {
    /// Create a wallet for `owner`.
    ///
    /// # Errors
    /// `Configuration` if `config` does not validate.
    pub fn new(
        owner: OwnerId,
        config: EngineConfig,
        secondary_networks: impl IntoIterator<Item = NetworkId>,
        ports: WalletPorts,
    ) -> Result<Self> {
        config.validate()?;
        let id = WalletId::new();
        let base_network = NetworkId::new(constants::BASE_NETWORK);
        let mut secondary_networks: Vec<NetworkId> = secondary_networks
            .into_iter()
            .filter(|n| *n != base_network)
            .collect();
        secondary_networks.sort();
        secondary_networks.dedup();

        tracing::info!(
            wallet = %id,
            owner = %owner,
            networks = secondary_networks.len(),
            "Wallet created"
        );

        Ok(Self {
            id,
            owner,
            analyzer: RouteAnalyzer::new(&config),
            mev: MevGuard::new(&config),
            timing: TimingAdvisor::new(&config),
            state: Mutex::new(WalletState {
                assets: HashMap::new(),
                ledger: Ledger::new(id, constants::SETTLEMENT_IDEMPOTENCY_CACHE_SIZE),
                operations: HashMap::new(),
                batcher: TransactionBatcher::new(&config),
                positions: BTreeMap::new(),
                escalations: HashMap::new(),
            }),
            config,
            base_network,
            secondary_networks,
            ports,
            locks: SettlementLocks::new(),
        })
    }

    #[must_use]
    pub fn id(&self) -> WalletId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    #[must_use]
    pub fn secondary_networks(&self) -> &[NetworkId] {
        &self.secondary_networks
    }

    fn state(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------
    // Assets and balances
    // -----------------------------------------------------------------

    pub fn register_asset(&self, asset: Asset) {
        self.state().assets.insert(asset.symbol.clone(), asset);
    }

    /// Credit funds arriving from outside the engine.
    ///
    /// # Errors
    /// `Validation` for a zero amount, `UnknownAsset` for an unregistered asset.
    pub fn deposit(&self, asset: &AssetSymbol, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(RouteforgeError::Validation {
                reason: "deposit amount must be positive".into(),
            });
        }
        let mut state = self.state();
        if !state.assets.contains_key(asset) {
            return Err(RouteforgeError::UnknownAsset(asset.to_string()));
        }
        state.ledger.deposit(asset, amount);
        tracing::debug!(wallet = %self.id, asset = %asset, amount, "Deposit credited");
        Ok(())
    }

    #[must_use]
    pub fn balance(&self, asset: &AssetSymbol) -> BalanceEntry {
        self.state().ledger.balance(asset)
    }

    /// Amount held in open staking positions.
    #[must_use]
    pub fn staked(&self, asset: &AssetSymbol) -> u128 {
        self.state().positions.get(asset).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn operation(&self, id: OperationId) -> Option<PendingOperation> {
        self.state().operations.get(&id).cloned()
    }

    /// Check holdings against deposits and outflows for every asset.
    ///
    /// # Errors
    /// `SupplyInvariantViolation` on the first asset that does not balance.
    pub fn verify_conservation(&self) -> Result<()> {
        self.state().ledger.verify_conservation()
    }

    /// Value of all holdings and open positions in `quote`. Read-only.
    ///
    /// # Errors
    /// `PriceUnavailable` from the oracle, `Validation` if a value overflows.
    pub async fn portfolio_value(&self, prices: &dyn PriceOracle, quote: &str) -> Result<Decimal> {
        let holdings: Vec<(Asset, u128)> = {
            let state = self.state();
            let mut symbols = state.ledger.assets();
            symbols.extend(state.positions.keys().cloned());
            symbols.sort();
            symbols.dedup();
            symbols
                .into_iter()
                .filter_map(|symbol| {
                    let held = state.ledger.balance(&symbol).total().saturating_add(
                        state.positions.get(&symbol).copied().unwrap_or(0),
                    );
                    let asset = state.assets.get(&symbol)?;
                    (held > 0).then(|| (asset.clone(), held))
                })
                .collect()
        };

        let mut value = Decimal::ZERO;
        for (asset, held) in holdings {
            let price = prices.get_price(&asset.symbol, quote).await?;
            let position = asset.to_units(held)?.checked_mul(price).ok_or_else(|| {
                RouteforgeError::Validation {
                    reason: format!("value of {held} {} overflows", asset.symbol),
                }
            })?;
            value += position;
        }
        Ok(value)
    }

    // -----------------------------------------------------------------
    // Immediate operations
    // -----------------------------------------------------------------

    /// Move `amount` of `asset` to `destination`.
    ///
    /// Settles with the balance reduced by exactly `amount`, or fails with the
    /// balance unchanged. The returned event names the route that actually
    /// settled.
    pub async fn transfer(
        &self,
        asset: &AssetSymbol,
        amount: u128,
        destination: &str,
        urgency: Urgency,
        cancel: Option<&CancellationToken>,
    ) -> Result<SettlementEvent> {
        self.execute(
            OperationSpec {
                kind: OperationKind::Transfer,
                asset: asset.clone(),
                target_asset: None,
                amount,
                destination: destination.to_string(),
                urgency,
                network: None,
            },
            cancel,
        )
        .await
    }

    /// Stake into `protocol`. The amount becomes an open position.
    pub async fn stake(
        &self,
        asset: &AssetSymbol,
        amount: u128,
        protocol: &str,
        urgency: Urgency,
        cancel: Option<&CancellationToken>,
    ) -> Result<SettlementEvent> {
        self.execute(
            OperationSpec {
                kind: OperationKind::Stake,
                asset: asset.clone(),
                target_asset: None,
                amount,
                destination: protocol.to_string(),
                urgency,
                network: None,
            },
            cancel,
        )
        .await
    }

    /// Convert `amount` of `asset` into `target`. The executor reports how
    /// much of `target` is credited back.
    pub async fn swap(
        &self,
        asset: &AssetSymbol,
        target: &AssetSymbol,
        amount: u128,
        urgency: Urgency,
        cancel: Option<&CancellationToken>,
    ) -> Result<SettlementEvent> {
        self.execute(
            OperationSpec {
                kind: OperationKind::Swap,
                asset: asset.clone(),
                target_asset: Some(target.clone()),
                amount,
                destination: self.id.to_string(),
                urgency,
                network: None,
            },
            cancel,
        )
        .await
    }

    /// Move `amount` of `asset` onto `network`.
    pub async fn bridge_to_secondary_network(
        &self,
        asset: &AssetSymbol,
        amount: u128,
        network: &NetworkId,
        urgency: Urgency,
        cancel: Option<&CancellationToken>,
    ) -> Result<SettlementEvent> {
        self.execute(
            OperationSpec {
                kind: OperationKind::Bridge,
                asset: asset.clone(),
                target_asset: None,
                amount,
                destination: network.to_string(),
                urgency,
                network: Some(network.clone()),
            },
            cancel,
        )
        .await
    }

    #[tracing::instrument(
        skip_all,
        fields(wallet = %self.id, kind = %spec.kind, asset = %spec.asset, amount = spec.amount)
    )]
    async fn execute(
        &self,
        spec: OperationSpec,
        cancel: Option<&CancellationToken>,
    ) -> Result<SettlementEvent> {
        let asset = self.validate(&spec)?;
        self.check_protocol_support(&spec).await?;

        let mut op = PendingOperation::new(
            self.id,
            spec.kind,
            spec.asset.clone(),
            spec.amount,
            self.base_network.clone(),
            spec.destination.clone(),
            spec.urgency,
        );
        op.target_asset.clone_from(&spec.target_asset);
        let operation_id = op.id;

        let Some(_permit) = self.locks.acquire(self.id, &spec.asset, cancel).await else {
            return Err(RouteforgeError::Cancelled(operation_id));
        };

        let available = self.balance(&spec.asset).available;
        if available < spec.amount {
            return Err(RouteforgeError::InsufficientBalance {
                needed: spec.amount,
                available,
            });
        }

        let snapshot = self.snapshot(&spec).await?;
        let request = RouteRequest {
            kind: spec.kind,
            asset,
            target_asset: spec.target_asset.clone(),
            amount: spec.amount,
            source: self.base_network.clone(),
            destination: spec.destination.clone(),
            urgency: spec.urgency,
        };
        let mut candidates = self.analyzer.analyze(&request, &snapshot)?;
        let mut selection = self.select(&candidates)?;

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(RouteforgeError::Cancelled(operation_id));
        }

        if selection.chosen.route_type == RouteType::Batched {
            let fee_per_gas = snapshot.fee_tiers.get(FeeTier::for_urgency(spec.urgency));
            let joined = self.join_batch(&mut op, request.asset.gas_class, fee_per_gas)?;
            if let Some(batch_id) = joined {
                return self.settle_joined_batch(operation_id, batch_id, &spec.asset).await;
            }
            tracing::info!(
                operation = %operation_id,
                "Compatible operations no longer queued, choosing among standalone routes"
            );
            candidates.retain(|r| r.route_type != RouteType::Batched);
            selection = self.select(&candidates)?;
        }

        let decision_digest = hex::encode(compute_decision_digest(&candidates, &selection.chosen));
        let protection = self.mev.protect(&spec.asset, &selection.chosen, spec.amount);

        let reservation = {
            let mut state = self.state();
            let reservation = state.ledger.reserve(operation_id, &spec.asset, spec.amount)?;
            op.transition(OperationStatus::Routed)?;
            state.operations.insert(operation_id, op);
            reservation
        };
        tracing::info!(
            operation = %operation_id,
            route = %selection.chosen.label(),
            fee = %selection.chosen.estimated_fee,
            mode = %protection.mode,
            candidates = candidates.len(),
            "Route selected"
        );

        let flight = InFlight {
            operation_id,
            kind: spec.kind,
            asset: spec.asset,
            target_asset: spec.target_asset,
            amount: spec.amount,
            destination: spec.destination,
            reservation,
            batch_id: None,
            decision_digest,
        };
        self.dispatch_with_retry(&flight, &selection, protection).await
    }

    fn select(&self, candidates: &[Route]) -> Result<RouteSelection> {
        RouteSelection::from_candidates(candidates).ok_or_else(|| RouteforgeError::NoViableRoute {
            candidates: candidates.len(),
            cheapest_fee: candidates.iter().map(|r| r.estimated_fee).min(),
            ceiling: self.analyzer.max_acceptable_fee(),
        })
    }

    /// Queue `op` and form a batch around it with the compatible operations
    /// already waiting. On success the operation is reserved and `Batched`;
    /// `None` means no batch could form and nothing changed.
    fn join_batch(
        &self,
        op: &mut PendingOperation,
        gas_class: GasClass,
        fee_per_gas: Decimal,
    ) -> Result<Option<BatchId>> {
        let mut guard = self.state();
        let state = &mut *guard;
        let key = BatchKey::new(op.asset.clone(), self.base_network.clone(), gas_class);
        state.batcher.enqueue(key, op.id)?;
        let Some(batch) = state.batcher.form_batch_with(op.id, fee_per_gas)? else {
            state.batcher.remove_pending(op.id);
            return Ok(None);
        };

        if let Err(err) = state.ledger.reserve(op.id, &op.asset, op.amount) {
            state.batcher.dissolve_batch(batch.id())?;
            state.batcher.remove_pending(op.id);
            return Err(err);
        }
        op.transition(OperationStatus::Batched)?;
        op.batch_id = Some(batch.id());
        state.operations.insert(op.id, op.clone());
        for member in batch.members() {
            if *member == op.id {
                continue;
            }
            let other = state.operation_mut(*member)?;
            other.transition(OperationStatus::Batched)?;
            other.batch_id = Some(batch.id());
        }
        Ok(Some(batch.id()))
    }

    /// Dispatch the batch an immediate transfer joined and return its own
    /// member event.
    async fn settle_joined_batch(
        &self,
        operation_id: OperationId,
        batch_id: BatchId,
        asset: &AssetSymbol,
    ) -> Result<SettlementEvent> {
        let settlement = self.dispatch_batch(batch_id, asset).await?;
        settlement
            .events
            .into_iter()
            .find(|event| event.operation_id == operation_id)
            .ok_or_else(|| {
                RouteforgeError::Internal(format!(
                    "{operation_id} missing from settled batch {batch_id}"
                ))
            })
    }

    /// First dispatch, one retry on timeout, then reconciliation.
    async fn dispatch_with_retry(
        &self,
        flight: &InFlight,
        selection: &RouteSelection,
        protection: Protection,
    ) -> Result<SettlementEvent> {
        let chosen = &selection.chosen;
        let first = self.dispatch_request(flight, 1, chosen, protection.mode, None);
        match self.dispatch(&first).await {
            DispatchOutcome::Settled(receipt) => {
                return self.settle(flight, chosen, protection, &receipt, receipt.realized_fee, 1);
            }
            DispatchOutcome::Rejected {
                reason,
                realized_fee,
            } => return Err(self.reject(flight, chosen, reason, realized_fee)),
            DispatchOutcome::Unavailable(reason) => return Err(self.unavailable(flight, chosen, reason)),
            DispatchOutcome::TimedOut => {}
        }

        let mut unresolved = vec![UnresolvedAttempt {
            attempt: 1,
            route: chosen.clone(),
        }];
        let mut dispatches = 1;
        let mut latest_unresolved = (chosen.clone(), protection);

        if let Some(next) = selection.next_best() {
            let retry_protection = self.mev.protect(&flight.asset, next, flight.amount);
            tracing::info!(
                operation = %flight.operation_id,
                route = %next.label(),
                fee = %next.estimated_fee,
                "Retrying on next-best route"
            );
            let second = self.dispatch_request(flight, 2, next, retry_protection.mode, None);
            dispatches = 2;
            match self.dispatch(&second).await {
                DispatchOutcome::Settled(receipt) => {
                    return self.settle(
                        flight,
                        next,
                        retry_protection,
                        &receipt,
                        receipt.realized_fee,
                        dispatches,
                    );
                }
                DispatchOutcome::Rejected {
                    reason,
                    realized_fee,
                } => {
                    tracing::warn!(
                        operation = %flight.operation_id,
                        route = %next.label(),
                        %reason,
                        realized_fee = ?realized_fee,
                        "Retry rejected, first attempt still unresolved"
                    );
                }
                DispatchOutcome::Unavailable(reason) => {
                    tracing::warn!(
                        operation = %flight.operation_id,
                        route = %next.label(),
                        %reason,
                        "Retry unavailable, first attempt still unresolved"
                    );
                }
                DispatchOutcome::TimedOut => {
                    unresolved.push(UnresolvedAttempt {
                        attempt: 2,
                        route: next.clone(),
                    });
                    latest_unresolved = (next.clone(), retry_protection);
                }
            }
        }

        self.set_status(flight.operation_id, OperationStatus::AwaitingConfirmation)?;
        let outcome = Reconciler::new(&self.ports.executors, &self.config.reconciliation)
            .run(flight.operation_id, unresolved)
            .await;
        match outcome {
            ReconcileOutcome::Confirmed {
                attempt,
                route,
                receipt,
            } => {
                let protection = if attempt == 1 { protection } else { latest_unresolved.1 };
                self.settle(flight, &route, protection, &receipt, receipt.realized_fee, dispatches)
            }
            ReconcileOutcome::AllRejected {
                route,
                reason,
                realized_fee,
                ..
            } => Err(self.reject(flight, &route, reason, realized_fee)),
            ReconcileOutcome::Exhausted { polls } => {
                self.escalate(flight, &latest_unresolved.0, latest_unresolved.1, dispatches)?;
                Err(RouteforgeError::ReconciliationExhausted {
                    operation_id: flight.operation_id,
                    route_type: latest_unresolved.0.route_type,
                    attempts: polls,
                })
            }
        }
    }

    fn validate(&self, spec: &OperationSpec) -> Result<Asset> {
        if spec.amount == 0 {
            return Err(RouteforgeError::Validation {
                reason: "amount must be positive".into(),
            });
        }
        if spec.destination.trim().is_empty() {
            return Err(RouteforgeError::Validation {
                reason: "destination must not be empty".into(),
            });
        }
        if spec.kind == OperationKind::Swap && spec.target_asset.as_ref() == Some(&spec.asset) {
            return Err(RouteforgeError::Validation {
                reason: format!("cannot swap {} into itself", spec.asset),
            });
        }
        if spec.network.as_ref() == Some(&self.base_network) {
            return Err(RouteforgeError::Validation {
                reason: format!("{} is the source network, not a secondary one", self.base_network),
            });
        }
        let state = self.state();
        if let Some(target) = &spec.target_asset {
            if !state.assets.contains_key(target) {
                return Err(RouteforgeError::UnknownAsset(target.to_string()));
            }
        }
        state
            .assets
            .get(&spec.asset)
            .cloned()
            .ok_or_else(|| RouteforgeError::UnknownAsset(spec.asset.to_string()))
    }

    /// The destination of a stake, swap or bridge must support the asset.
    async fn check_protocol_support(&self, spec: &OperationSpec) -> Result<()> {
        let (network, asset) = match spec.kind {
            OperationKind::Transfer => return Ok(()),
            OperationKind::Stake => (self.base_network.clone(), spec.asset.clone()),
            OperationKind::Swap => (
                self.base_network.clone(),
                spec.target_asset.clone().unwrap_or_else(|| spec.asset.clone()),
            ),
            OperationKind::Bridge => (
                spec.network.clone().unwrap_or_else(|| self.base_network.clone()),
                spec.asset.clone(),
            ),
        };
        if self.ports.networks.supports_asset(&network, &asset).await? {
            Ok(())
        } else {
            tracing::warn!(network = %network, asset = %asset, kind = %spec.kind, "Protocol support check failed");
            Err(RouteforgeError::UnsupportedAsset {
                network,
                asset: asset.to_string(),
            })
        }
    }

    /// Gather everything analysis reads, once.
    async fn snapshot(&self, spec: &OperationSpec) -> Result<MarketSnapshot> {
        let fee_tiers = self.ports.fee_oracle.current_fee_tiers().await?;

        let mut network_quotes = Vec::new();
        match (spec.kind, &spec.network) {
            (OperationKind::Bridge, Some(network)) => {
                network_quotes.push(self.quote_network(network, spec).await?);
            }
            (OperationKind::Transfer | OperationKind::Stake, _) => {
                for network in &self.secondary_networks {
                    match self.quote_network(network, spec).await {
                        Ok(quote) => network_quotes.push(quote),
                        Err(err) => {
                            tracing::warn!(network = %network, error = %err, "Network quote failed, skipping");
                        }
                    }
                }
            }
            _ => {}
        }

        let conversion = match &spec.target_asset {
            Some(target) if *target != spec.asset => Some(
                self.ports
                    .networks
                    .quote_conversion(&spec.asset, target, spec.amount)
                    .await?,
            ),
            _ => None,
        };

        let compatible_pending = if spec.kind == OperationKind::Transfer {
            let state = self.state();
            state.assets.get(&spec.asset).map_or(0, |asset| {
                state.batcher.compatible_count(&BatchKey::new(
                    spec.asset.clone(),
                    self.base_network.clone(),
                    asset.gas_class,
                ))
            })
        } else {
            0
        };

        Ok(MarketSnapshot {
            fee_tiers,
            taken_at: Utc::now(),
            network_quotes,
            conversion,
            compatible_pending,
        })
    }

    async fn quote_network(&self, network: &NetworkId, spec: &OperationSpec) -> Result<NetworkQuote> {
        let networks = &self.ports.networks;
        if !networks.supports_asset(network, &spec.asset).await? {
            return Ok(NetworkQuote {
                network: network.clone(),
                supports_asset: false,
                bridge_cost: Decimal::ZERO,
                destination_execution_cost: Decimal::ZERO,
                estimated_time_seconds: 0,
            });
        }
        Ok(NetworkQuote {
            network: network.clone(),
            supports_asset: true,
            bridge_cost: networks
                .estimate_bridge_cost(network, &spec.asset, spec.amount)
                .await?,
            destination_execution_cost: networks
                .estimate_destination_execution_cost(network, &spec.asset, spec.kind)
                .await?,
            estimated_time_seconds: networks.estimate_transit_seconds(network).await?,
        })
    }

    // -----------------------------------------------------------------
    // Dispatch and resolution
    // -----------------------------------------------------------------

    fn dispatch_request(
        &self,
        flight: &InFlight,
        attempt: u32,
        route: &Route,
        mode: SubmissionMode,
        batch: Option<BatchDispatch>,
    ) -> DispatchRequest {
        DispatchRequest {
            operation_id: flight.operation_id,
            wallet_id: self.id,
            attempt,
            kind: flight.kind,
            asset: flight.asset.clone(),
            target_asset: flight.target_asset.clone(),
            amount: flight.amount,
            destination: flight.destination.clone(),
            route: route.clone(),
            mode,
            batch,
        }
    }

    async fn dispatch(&self, request: &DispatchRequest) -> DispatchOutcome {
        let executor = self.ports.executors.for_route(request.route.route_type);
        let deadline = self.config.execution.deadline();
        match tokio::time::timeout(deadline, executor.execute(request)).await {
            Ok(Ok(receipt)) => DispatchOutcome::Settled(receipt),
            Ok(Err(ExecutorError::Rejected {
                reason,
                realized_fee,
            })) => DispatchOutcome::Rejected {
                reason,
                realized_fee,
            },
            Ok(Err(ExecutorError::Unavailable(reason))) => DispatchOutcome::Unavailable(reason),
            Ok(Err(ExecutorError::Timeout)) | Err(_) => {
                let err = RouteforgeError::ExecutorTimeout {
                    route_type: request.route.route_type,
                    estimated_fee: request.route.estimated_fee,
                };
                tracing::warn!(
                    operation = %request.operation_id,
                    attempt = request.attempt,
                    deadline_ms = self.config.execution.executor_deadline_ms,
                    error = %err,
                    "Executor deadline expired"
                );
                DispatchOutcome::TimedOut
            }
        }
    }

    fn set_status(&self, operation_id: OperationId, status: OperationStatus) -> Result<()> {
        self.state().operation_mut(operation_id)?.transition(status)
    }

    /// Commit the reservation and publish the settlement event.
    fn settle(
        &self,
        flight: &InFlight,
        route: &Route,
        protection: Protection,
        receipt: &ExecutionReceipt,
        realized_fee: Decimal,
        attempts: u32,
    ) -> Result<SettlementEvent> {
        {
            let mut state = self.state();
            state.ledger.commit(flight.reservation)?;
            if let (Some(target), Some(credited)) = (&flight.target_asset, receipt.credited_amount) {
                state.ledger.deposit(target, credited);
            }
            if flight.kind == OperationKind::Stake {
                let position = state.positions.entry(flight.asset.clone()).or_default();
                *position = position.saturating_add(flight.amount);
            }
            state.escalations.remove(&flight.operation_id);
            state
                .operation_mut(flight.operation_id)?
                .transition(OperationStatus::Settled)?;
        }

        let event = SettlementEvent {
            operation_id: flight.operation_id,
            wallet_id: self.id,
            kind: flight.kind,
            asset: flight.asset.clone(),
            amount: flight.amount,
            route_type: route.route_type,
            network: route.network.clone(),
            batch_id: flight.batch_id,
            estimated_fee: route.estimated_fee,
            realized_fee,
            fee_delta: realized_fee - route.estimated_fee,
            protection,
            settlement_ref: receipt.settlement_ref.clone(),
            attempts,
            decision_digest: flight.decision_digest.clone(),
            settled_at: Utc::now(),
        };
        tracing::info!(
            operation = %flight.operation_id,
            route = %route.label(),
            estimated_fee = %event.estimated_fee,
            realized_fee = %event.realized_fee,
            attempts,
            "Operation settled"
        );
        self.ports.events.publish(WalletEvent::Settled(event.clone()));
        Ok(event)
    }

    /// Release the reservation, mark the operation failed and publish.
    fn fail(
        &self,
        flight: &InFlight,
        route: &Route,
        reason: &str,
        realized_fee: Option<Decimal>,
    ) -> Result<()> {
        {
            let mut state = self.state();
            state.ledger.release(flight.reservation)?;
            state.escalations.remove(&flight.operation_id);
            state
                .operation_mut(flight.operation_id)?
                .transition(OperationStatus::Failed)?;
        }
        tracing::warn!(
            operation = %flight.operation_id,
            route = %route.label(),
            %reason,
            "Operation failed, reservation released"
        );
        self.ports.events.publish(WalletEvent::Failed(FailureEvent {
            operation_id: flight.operation_id,
            wallet_id: self.id,
            kind: flight.kind,
            asset: flight.asset.clone(),
            amount: flight.amount,
            route_type: Some(route.route_type),
            estimated_fee: Some(route.estimated_fee),
            fee_delta: realized_fee.map(|fee| fee - route.estimated_fee),
            reason: reason.to_string(),
            failed_at: Utc::now(),
        }));
        Ok(())
    }

    fn reject(
        &self,
        flight: &InFlight,
        route: &Route,
        reason: String,
        realized_fee: Option<Decimal>,
    ) -> RouteforgeError {
        if let Err(err) = self.fail(flight, route, &reason, realized_fee) {
            return err;
        }
        RouteforgeError::ExecutorRejected {
            route_type: route.route_type,
            reason,
            estimated_fee: route.estimated_fee,
            fee_delta: realized_fee.map(|fee| fee - route.estimated_fee),
        }
    }

    fn unavailable(&self, flight: &InFlight, route: &Route, reason: String) -> RouteforgeError {
        if let Err(err) = self.fail(flight, route, &reason, None) {
            return err;
        }
        RouteforgeError::ExecutorUnavailable {
            route_type: route.route_type,
            reason,
        }
    }

    /// Park the funds for manual reconciliation.
    fn escalate(
        &self,
        flight: &InFlight,
        route: &Route,
        protection: Protection,
        attempts: u32,
    ) -> Result<()> {
        {
            let mut state = self.state();
            state.ledger.escalate(flight.reservation)?;
            state
                .operation_mut(flight.operation_id)?
                .transition(OperationStatus::NeedsManualReconciliation)?;
            state.escalations.insert(
                flight.operation_id,
                Escalation {
                    flight: flight.clone(),
                    route: route.clone(),
                    protection,
                    attempts,
                },
            );
        }
        tracing::error!(
            operation = %flight.operation_id,
            route = %route.label(),
            amount = flight.amount,
            "Reconciliation exhausted, funds escalated for manual reconciliation"
        );
        self.ports
            .events
            .publish(WalletEvent::ManualReconciliationRequired(EscalationEvent {
                operation_id: flight.operation_id,
                wallet_id: self.id,
                asset: flight.asset.clone(),
                amount: flight.amount,
                route_type: route.route_type,
                attempts,
                escalated_at: Utc::now(),
            }));
        Ok(())
    }

    /// Settle or fail an operation parked in `NeedsManualReconciliation`.
    ///
    /// # Errors
    /// `NotAwaitingReconciliation` if the operation is not parked.
    pub fn resolve_manual_reconciliation(
        &self,
        operation_id: OperationId,
        resolution: ManualResolution,
    ) -> Result<()> {
        let escalation = self
            .state()
            .escalations
            .get(&operation_id)
            .cloned()
            .ok_or(RouteforgeError::NotAwaitingReconciliation(operation_id))?;

        match resolution {
            ManualResolution::Settled {
                settlement_ref,
                realized_fee,
            } => {
                let receipt = ExecutionReceipt::new(settlement_ref, realized_fee);
                self.settle(
                    &escalation.flight,
                    &escalation.route,
                    escalation.protection,
                    &receipt,
                    realized_fee,
                    escalation.attempts,
                )
                .map(|_| ())
            }
            ManualResolution::Failed { reason } => {
                self.fail(&escalation.flight, &escalation.route, &reason, None)
            }
        }
    }

    // -----------------------------------------------------------------
    // Deferred operations and batching
    // -----------------------------------------------------------------

    /// Reserve funds for a deferrable transfer and queue it for batching.
    ///
    /// The operation stays `Pending` until a batch forms around it.
    #[tracing::instrument(skip_all, fields(wallet = %self.id, asset = %asset, amount))]
    pub async fn queue_transfer(
        &self,
        asset: &AssetSymbol,
        amount: u128,
        destination: &str,
    ) -> Result<OperationId> {
        let spec = OperationSpec {
            kind: OperationKind::Transfer,
            asset: asset.clone(),
            target_asset: None,
            amount,
            destination: destination.to_string(),
            urgency: Urgency::Patient,
            network: None,
        };
        let registered = self.validate(&spec)?;
        let op = PendingOperation::new(
            self.id,
            OperationKind::Transfer,
            asset.clone(),
            amount,
            self.base_network.clone(),
            destination,
            Urgency::Patient,
        );
        let operation_id = op.id;

        let Some(_permit) = self.locks.acquire(self.id, asset, None).await else {
            return Err(RouteforgeError::Cancelled(operation_id));
        };
        let mut state = self.state();
        state.ledger.reserve(operation_id, asset, amount)?;
        let key = BatchKey::new(asset.clone(), self.base_network.clone(), registered.gas_class);
        state.batcher.enqueue(key, operation_id)?;
        state.operations.insert(operation_id, op);
        tracing::debug!(operation = %operation_id, "Transfer queued for batching");
        Ok(operation_id)
    }

    /// Form every batch the queues currently allow, priced at the slow tier.
    pub async fn form_batches(&self) -> Result<Vec<Batch>> {
        let tiers = self.ports.fee_oracle.current_fee_tiers().await?;
        let fee_per_gas = tiers.get(FeeTier::for_urgency(Urgency::Patient));

        let mut state = self.state();
        let batches = state.batcher.form_batches(fee_per_gas);
        for batch in &batches {
            for member in batch.members() {
                let op = state.operation_mut(*member)?;
                op.transition(OperationStatus::Batched)?;
                op.batch_id = Some(batch.id());
            }
        }
        Ok(batches)
    }

    /// Dispatch one formed batch through the batched executor and commit or
    /// release every member together.
    #[tracing::instrument(skip_all, fields(wallet = %self.id, batch = %batch_id))]
    pub async fn settle_batch(&self, batch_id: BatchId) -> Result<BatchSettlement> {
        let asset = self
            .state()
            .batcher
            .get_batch(batch_id)
            .map(|b| b.asset().clone())
            .ok_or(RouteforgeError::BatchNotFound(batch_id))?;
        let Some(_permit) = self.locks.acquire(self.id, &asset, None).await else {
            return Err(RouteforgeError::BatchNotFound(batch_id));
        };
        self.dispatch_batch(batch_id, &asset).await
    }

    /// Dispatch a formed batch. The caller holds the asset's settlement permit.
    async fn dispatch_batch(
        &self,
        batch_id: BatchId,
        asset: &AssetSymbol,
    ) -> Result<BatchSettlement> {
        let (batch, flights, digest) = {
            let mut state = self.state();
            let batch = state.batcher.take_batch(batch_id)?;
            let digest = hex::encode(batch.digest());
            let mut flights = Vec::with_capacity(batch.len());
            for member in batch.members() {
                let reservation = state
                    .ledger
                    .reservation_for(*member)
                    .map(|r| r.id)
                    .ok_or_else(|| RouteforgeError::InvalidReservation {
                        reason: format!("batch member {member} holds no reservation"),
                    })?;
                let op = state.operation_mut(*member)?;
                op.transition(OperationStatus::Routed)?;
                flights.push(InFlight {
                    operation_id: op.id,
                    kind: op.kind,
                    asset: op.asset.clone(),
                    target_asset: None,
                    amount: op.amount,
                    destination: op.destination.clone(),
                    reservation,
                    batch_id: Some(batch_id),
                    decision_digest: digest.clone(),
                });
            }
            (batch, flights, digest)
        };
        let Some(lead) = flights.first().cloned() else {
            return Err(RouteforgeError::BatchNotFound(batch_id));
        };

        let total: u128 = flights.iter().fold(0u128, |acc, f| acc.saturating_add(f.amount));
        let batch_route = Route {
            route_type: RouteType::Batched,
            network: None,
            estimated_fee: batch.total_fee(),
            estimated_time_seconds: self
                .config
                .batching
                .batching_window_secs
                .saturating_add(self.config.routing.confirmation_secs(FeeTier::Slow)),
            viable: true,
            risk_score: RouteType::Batched.base_risk(),
        };
        let member_route = Route {
            estimated_fee: batch.per_member_fee(),
            ..batch_route.clone()
        };
        let protection = self.mev.protect(asset, &batch_route, total);
        let request = DispatchRequest {
            amount: total,
            ..self.dispatch_request(
                &lead,
                1,
                &batch_route,
                protection.mode,
                Some(BatchDispatch {
                    batch_id,
                    members: batch.members().to_vec(),
                    digest,
                }),
            )
        };
        tracing::info!(members = flights.len(), fee = %batch.total_fee(), "Dispatching batch");

        let outcome = match self.dispatch(&request).await {
            DispatchOutcome::TimedOut => {
                for flight in &flights {
                    self.set_status(flight.operation_id, OperationStatus::AwaitingConfirmation)?;
                }
                let unresolved = vec![UnresolvedAttempt {
                    attempt: 1,
                    route: batch_route.clone(),
                }];
                match Reconciler::new(&self.ports.executors, &self.config.reconciliation)
                    .run(lead.operation_id, unresolved)
                    .await
                {
                    ReconcileOutcome::Confirmed { receipt, .. } => DispatchOutcome::Settled(receipt),
                    ReconcileOutcome::AllRejected {
                        reason,
                        realized_fee,
                        ..
                    } => DispatchOutcome::Rejected {
                        reason,
                        realized_fee,
                    },
                    ReconcileOutcome::Exhausted { polls } => {
                        for flight in &flights {
                            self.escalate(flight, &member_route, protection, 1)?;
                        }
                        return Err(RouteforgeError::ReconciliationExhausted {
                            operation_id: lead.operation_id,
                            route_type: RouteType::Batched,
                            attempts: polls,
                        });
                    }
                }
            }
            other => other,
        };

        match outcome {
            DispatchOutcome::Settled(receipt) => {
                let members = Decimal::from(flights.len());
                let realized_share = receipt.realized_fee / members;
                let mut events = Vec::with_capacity(flights.len());
                for flight in &flights {
                    events.push(self.settle(
                        flight,
                        &member_route,
                        protection,
                        &receipt,
                        realized_share,
                        1,
                    )?);
                }
                Ok(BatchSettlement { batch, events })
            }
            DispatchOutcome::Rejected {
                reason,
                realized_fee,
            } => {
                for flight in &flights {
                    self.fail(flight, &member_route, &reason, None)?;
                }
                Err(RouteforgeError::ExecutorRejected {
                    route_type: RouteType::Batched,
                    reason,
                    estimated_fee: batch.total_fee(),
                    fee_delta: realized_fee.map(|fee| fee - batch.total_fee()),
                })
            }
            DispatchOutcome::Unavailable(reason) => {
                for flight in &flights {
                    self.fail(flight, &member_route, &reason, None)?;
                }
                Err(RouteforgeError::ExecutorUnavailable {
                    route_type: RouteType::Batched,
                    reason,
                })
            }
            DispatchOutcome::TimedOut => Err(RouteforgeError::Internal(
                "batch dispatch outcome unresolved after reconciliation".into(),
            )),
        }
    }

    /// Cancel an operation that has not been dispatched.
    ///
    /// A batched operation dissolves its batch; the other members return to
    /// `Pending` and stay queued.
    ///
    /// # Errors
    /// - `OperationNotFound` for an unknown operation
    /// - `OperationNotCancellable` once the operation is `Routed` or later
    pub fn cancel(&self, operation_id: OperationId) -> Result<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        let (status, batch_id) = state
            .operations
            .get(&operation_id)
            .map(|op| (op.status, op.batch_id))
            .ok_or(RouteforgeError::OperationNotFound(operation_id))?;
        if !status.is_cancellable() {
            return Err(RouteforgeError::OperationNotCancellable { status });
        }

        if let Some(batch_id) = batch_id {
            let batch = state.batcher.dissolve_batch(batch_id)?;
            for member in batch.members() {
                if *member == operation_id {
                    continue;
                }
                let other = state.operation_mut(*member)?;
                other.transition(OperationStatus::Pending)?;
                other.batch_id = None;
            }
        }
        state.batcher.remove_pending(operation_id);

        let reservation = state
            .ledger
            .reservation_for(operation_id)
            .map(|r| r.id)
            .ok_or_else(|| RouteforgeError::InvalidReservation {
                reason: format!("{operation_id} holds no reservation"),
            })?;
        state.ledger.release(reservation)?;
        let op = state.operation_mut(operation_id)?;
        op.batch_id = None;
        op.transition(OperationStatus::Cancelled)?;
        tracing::info!(wallet = %self.id, operation = %operation_id, "Operation cancelled");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Timing
    // -----------------------------------------------------------------

    /// When to execute an operation of `urgency`, from current fees and history.
    pub async fn recommend_timing(&self, urgency: Urgency) -> Result<TimingRecommendation> {
        let tiers = self.ports.fee_oracle.current_fee_tiers().await?;
        let history = match urgency {
            Urgency::Immediate => Vec::new(),
            Urgency::Normal | Urgency::Patient => {
                self.ports
                    .fee_oracle
                    .fee_history(self.config.timing.history_window_hours)
                    .await?
            }
        };
        Ok(self.timing.recommend(urgency, &history, &tiers, Utc::now()))
    }
}

impl std::fmt::Debug for WalletAggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletAggregate")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("secondary_networks", &self.secondary_networks)
            .finish_non_exhaustive()
    }
}
