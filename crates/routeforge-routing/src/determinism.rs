//! Digests that make routing decisions and batches replayable.
//!
//! The decision digest commits to the ordered candidate list and the chosen
//! route. Replaying analysis on the same snapshot must reproduce it exactly.

use routeforge_types::{AssetSymbol, GasClass, NetworkId, OperationId, Route, RouteType};
use sha2::{Digest, Sha256};

fn route_type_tag(route_type: RouteType) -> u8 {
    route_type.priority()
}

fn hash_route(hasher: &mut Sha256, route: &Route) {
    hasher.update([route_type_tag(route.route_type)]);
    match &route.network {
        Some(network) => {
            hasher.update([1u8]);
            hasher.update((network.as_str().len() as u64).to_le_bytes());
            hasher.update(network.as_str().as_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update(route.estimated_fee.normalize().to_string().as_bytes());
    hasher.update(route.estimated_time_seconds.to_le_bytes());
    hasher.update([u8::from(route.viable), route.risk_score]);
}

/// Compute the decision digest over a candidate list and the chosen route.
#[must_use]
pub fn compute_decision_digest(candidates: &[Route], chosen: &Route) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"routeforge:decision:v1:");
    hasher.update((candidates.len() as u64).to_le_bytes());
    for route in candidates {
        hash_route(&mut hasher, route);
    }
    hasher.update(b"chosen:");
    hash_route(&mut hasher, chosen);

    let result = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    digest
}

/// Recompute and compare a recorded decision digest (hex-encoded).
#[must_use]
pub fn verify_decision_digest(candidates: &[Route], chosen: &Route, expected_hex: &str) -> bool {
    hex::encode(compute_decision_digest(candidates, chosen)) == expected_hex
}

/// Compute the digest committing to a batch's key and ordered members.
#[must_use]
pub fn compute_batch_digest(
    asset: &AssetSymbol,
    source: &NetworkId,
    gas_class: GasClass,
    members: &[OperationId],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"routeforge:batch:v1:");
    hasher.update(asset.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(source.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(match gas_class {
        GasClass::Native => [0u8],
        GasClass::Token => [1u8],
        GasClass::Complex => [2u8],
    });
    hasher.update((members.len() as u64).to_le_bytes());
    for id in members {
        hasher.update(id.0.as_bytes());
    }

    let result = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Route> {
        vec![
            Route::dummy(RouteType::Direct, 10, 180),
            Route::dummy(RouteType::SecondaryNetwork, 4, 600).on_network("arbitrum"),
            Route::dummy(RouteType::Batched, 6, 480),
        ]
    }

    #[test]
    fn same_input_same_digest() {
        let c = candidates();
        assert_eq!(
            compute_decision_digest(&c, &c[1]),
            compute_decision_digest(&c, &c[1])
        );
    }

    #[test]
    fn chosen_route_matters() {
        let c = candidates();
        assert_ne!(
            compute_decision_digest(&c, &c[0]),
            compute_decision_digest(&c, &c[1])
        );
    }

    #[test]
    fn candidate_order_matters() {
        let c = candidates();
        let mut reversed = c.clone();
        reversed.reverse();
        assert_ne!(
            compute_decision_digest(&c, &c[1]),
            compute_decision_digest(&reversed, &c[1])
        );
    }

    #[test]
    fn equal_fees_with_different_scale_hash_equal() {
        let mut a = Route::dummy(RouteType::Direct, 10, 180);
        let mut b = a.clone();
        a.estimated_fee = rust_decimal::Decimal::new(100, 1);
        b.estimated_fee = rust_decimal::Decimal::new(10, 0);
        assert_eq!(
            compute_decision_digest(std::slice::from_ref(&a), &a),
            compute_decision_digest(std::slice::from_ref(&b), &b)
        );
    }

    #[test]
    fn verify_hex_digest() {
        let c = candidates();
        let hex_digest = hex::encode(compute_decision_digest(&c, &c[1]));
        assert!(verify_decision_digest(&c, &c[1], &hex_digest));
        assert!(!verify_decision_digest(&c, &c[0], &hex_digest));
    }

    #[test]
    fn batch_digest_depends_on_members() {
        let asset = AssetSymbol::new("USDC");
        let source = NetworkId::new("base-layer");
        let a = OperationId::from_bytes([1; 16]);
        let b = OperationId::from_bytes([2; 16]);
        let one = compute_batch_digest(&asset, &source, GasClass::Token, &[a, b]);
        let two = compute_batch_digest(&asset, &source, GasClass::Token, &[a]);
        let three = compute_batch_digest(&asset, &source, GasClass::Native, &[a, b]);
        assert_ne!(one, two);
        assert_ne!(one, three);
    }
}
