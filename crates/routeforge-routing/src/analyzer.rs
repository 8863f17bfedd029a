//! Candidate route generation.
//!
//! The analyzer reads one [`MarketSnapshot`] per request so every candidate
//! is priced against the same fee conditions. Families produced per kind:
//!
//! | Kind     | Candidates                                         |
//! |----------|----------------------------------------------------|
//! | Transfer | Direct, SecondaryNetwork (per network), Batched    |
//! | Stake    | Direct, SecondaryNetwork (per network)             |
//! | Bridge   | SecondaryNetwork (per quoted network)              |
//! | Swap     | BridgeAggregated when converting, otherwise Direct |
//!
//! A route is viable when its fee is within the configured ceiling. If no
//! candidate is viable the analyzer fails with `NoViableRoute`; it never
//! returns an empty list.

use rust_decimal::Decimal;
use routeforge_types::{
    BatchingConfig, EngineConfig, FeeTier, GasClass, GasSchedule, MarketSnapshot, NetworkId,
    OperationKind, Result, Route, RouteRequest, RouteType, RouteforgeError, RoutingConfig,
};

/// Computes candidate routes for a request.
#[derive(Debug, Clone)]
pub struct RouteAnalyzer {
    routing: RoutingConfig,
    gas: GasSchedule,
    batching: BatchingConfig,
}

impl RouteAnalyzer {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            routing: config.routing.clone(),
            gas: config.gas.clone(),
            batching: config.batching.clone(),
        }
    }

    /// The fee ceiling routes are checked against.
    #[must_use]
    pub fn max_acceptable_fee(&self) -> Decimal {
        self.routing.max_acceptable_fee
    }

    /// Produce the candidate list for `request` against `snapshot`.
    ///
    /// Candidates come out in a fixed order (Direct, secondary networks by
    /// name, Batched, BridgeAggregated) and include non-viable routes for audit.
    ///
    /// # Errors
    /// - `Validation` for a zero amount
    /// - `FeeOracle` for malformed fee tiers
    /// - `NoViableRoute` if no candidate is within the fee ceiling
    pub fn analyze(&self, request: &RouteRequest, snapshot: &MarketSnapshot) -> Result<Vec<Route>> {
        if request.amount == 0 {
            return Err(RouteforgeError::Validation {
                reason: "amount must be positive".into(),
            });
        }
        if !snapshot.fee_tiers.is_well_formed() {
            return Err(RouteforgeError::FeeOracle(
                "fee tiers must be non-negative and ordered slow <= standard <= fast <= instant"
                    .into(),
            ));
        }

        let tier = FeeTier::for_urgency(request.urgency);
        let mut candidates = Vec::new();

        match request.kind {
            OperationKind::Transfer => {
                candidates.push(self.direct_route(request, snapshot, tier));
                candidates.extend(self.secondary_routes(request, snapshot));
                if let Some(batched) = self.batched_route(request, snapshot, tier) {
                    candidates.push(batched);
                }
            }
            OperationKind::Stake => {
                candidates.push(self.direct_route(request, snapshot, tier));
                candidates.extend(self.secondary_routes(request, snapshot));
            }
            OperationKind::Bridge => {
                candidates.extend(self.secondary_routes(request, snapshot));
            }
            OperationKind::Swap => {
                if request.requires_conversion() {
                    candidates.extend(self.bridge_aggregated_route(snapshot, tier));
                } else {
                    candidates.push(self.direct_route(request, snapshot, tier));
                }
            }
        }

        for route in &candidates {
            tracing::debug!(
                kind = %request.kind,
                asset = %request.asset.symbol,
                route = %route.label(),
                fee = %route.estimated_fee,
                time_secs = route.estimated_time_seconds,
                viable = route.viable,
                "Candidate route"
            );
        }

        if candidates.iter().any(|r| r.viable) {
            Ok(candidates)
        } else {
            Err(RouteforgeError::NoViableRoute {
                candidates: candidates.len(),
                cheapest_fee: candidates.iter().map(|r| r.estimated_fee).min(),
                ceiling: self.routing.max_acceptable_fee,
            })
        }
    }

    /// Gas units one standalone execution of this request consumes.
    #[must_use]
    pub fn gas_units(&self, kind: OperationKind, class: GasClass) -> u64 {
        match kind {
            OperationKind::Stake | OperationKind::Swap => self.gas.units_for(GasClass::Complex),
            OperationKind::Transfer | OperationKind::Bridge => self.gas.units_for(class),
        }
    }

    fn finish(
        &self,
        route_type: RouteType,
        network: Option<NetworkId>,
        fee: Decimal,
        time: u64,
    ) -> Route {
        let estimated_fee = fee.max(Decimal::ZERO);
        Route {
            route_type,
            network,
            estimated_fee,
            estimated_time_seconds: time,
            viable: estimated_fee <= self.routing.max_acceptable_fee,
            risk_score: route_type.base_risk(),
        }
    }

    fn direct_route(&self, request: &RouteRequest, snapshot: &MarketSnapshot, tier: FeeTier) -> Route {
        let units = self.gas_units(request.kind, request.asset.gas_class);
        let fee = snapshot.fee_tiers.get(tier) * Decimal::from(units);
        self.finish(RouteType::Direct, None, fee, self.routing.confirmation_secs(tier))
    }

    fn secondary_routes(&self, request: &RouteRequest, snapshot: &MarketSnapshot) -> Vec<Route> {
        let mut quotes: Vec<_> = snapshot
            .network_quotes
            .iter()
            .filter(|q| q.supports_asset && q.network != request.source)
            .collect();
        quotes.sort_by(|a, b| a.network.cmp(&b.network));

        quotes
            .into_iter()
            .map(|q| {
                self.finish(
                    RouteType::SecondaryNetwork,
                    Some(q.network.clone()),
                    q.bridge_cost.max(Decimal::ZERO) + q.destination_execution_cost.max(Decimal::ZERO),
                    q.estimated_time_seconds,
                )
            })
            .collect()
    }

    /// Per-member share of a batch this request would join. Offered only once
    /// `min_batch_threshold` compatible operations are already pending; the
    /// batch then carries those plus the request itself.
    fn batched_route(&self, request: &RouteRequest, snapshot: &MarketSnapshot, tier: FeeTier) -> Option<Route> {
        if snapshot.compatible_pending < self.batching.min_batch_threshold {
            return None;
        }
        let members = snapshot
            .compatible_pending
            .saturating_add(1)
            .min(self.batching.max_batch_size)
            .max(1);
        let overhead = Decimal::from(self.gas.batch_overhead(members));
        let fee = snapshot.fee_tiers.get(tier) * overhead / Decimal::from(members);
        let time = self
            .batching
            .batching_window_secs
            .saturating_add(self.routing.confirmation_secs(tier));
        Some(self.finish(RouteType::Batched, None, fee, time))
    }

    fn bridge_aggregated_route(&self, snapshot: &MarketSnapshot, tier: FeeTier) -> Option<Route> {
        let quote = snapshot.conversion.as_ref()?;
        let gas = snapshot.fee_tiers.get(tier) * Decimal::from(self.gas.units_for(GasClass::Complex));
        let fee = quote.protocol_fee.max(Decimal::ZERO)
            + quote.estimated_slippage_cost.max(Decimal::ZERO)
            + gas;
        let time = quote
            .estimated_time_seconds
            .unwrap_or(self.routing.bridge_aggregation_secs);
        Some(self.finish(RouteType::BridgeAggregated, None, fee, time))
    }
}
