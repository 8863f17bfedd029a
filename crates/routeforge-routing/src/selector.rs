//! Deterministic route selection.
//!
//! Ordering among viable routes:
//! 1. lower `estimated_fee`
//! 2. lower `estimated_time_seconds`
//! 3. fixed priority: Direct, SecondaryNetwork, Batched, BridgeAggregated
//! 4. network name (so two secondary networks with equal cost never tie)
//!
//! The result depends only on the candidate values, never on their order in
//! the input slice.

use std::cmp::Ordering;

use routeforge_types::Route;

/// Total order used for selection and fallback ranking.
#[must_use]
pub fn compare_routes(a: &Route, b: &Route) -> Ordering {
    a.estimated_fee
        .cmp(&b.estimated_fee)
        .then(a.estimated_time_seconds.cmp(&b.estimated_time_seconds))
        .then(a.route_type.priority().cmp(&b.route_type.priority()))
        .then(a.network.cmp(&b.network))
        .then(a.risk_score.cmp(&b.risk_score))
}

/// Pick the optimal viable route, if any.
#[must_use]
pub fn select_route(candidates: &[Route]) -> Option<&Route> {
    candidates
        .iter()
        .filter(|r| r.viable)
        .min_by(|a, b| compare_routes(a, b))
}

/// All viable routes, best first.
#[must_use]
pub fn rank_routes(candidates: &[Route]) -> Vec<Route> {
    let mut viable: Vec<Route> = candidates.iter().filter(|r| r.viable).cloned().collect();
    viable.sort_by(compare_routes);
    viable
}

/// The chosen route plus the ranked fallbacks kept for a timeout retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSelection {
    pub chosen: Route,
    pub fallbacks: Vec<Route>,
}

impl RouteSelection {
    /// Rank `candidates` and split off the winner. `None` if nothing is viable.
    #[must_use]
    pub fn from_candidates(candidates: &[Route]) -> Option<Self> {
        let mut ranked = rank_routes(candidates).into_iter();
        let chosen = ranked.next()?;
        tracing::debug!(
            route = %chosen.label(),
            fee = %chosen.estimated_fee,
            fallbacks = ranked.len(),
            "Route selected"
        );
        Some(Self {
            chosen,
            fallbacks: ranked.collect(),
        })
    }

    /// The cached next-best candidate used for the single timeout retry.
    #[must_use]
    pub fn next_best(&self) -> Option<&Route> {
        self.fallbacks.first()
    }
}
