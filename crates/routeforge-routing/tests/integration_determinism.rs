//! Integration test: routing determinism
//!
//! Given one market snapshot, analysis plus selection must produce the same
//! choice and the same decision digest on every run, regardless of the order
//! the candidates are presented in.

use std::collections::HashSet;

use chrono::Utc;
use rand::seq::SliceRandom;
use routeforge_routing::{
    BatchKey, RouteAnalyzer, RouteSelection, TransactionBatcher, compute_decision_digest,
    select_route, verify_decision_digest,
};
use routeforge_types::constants::BASE_NETWORK;
use routeforge_types::*;
use rust_decimal::Decimal;

fn snapshot(compatible_pending: usize) -> MarketSnapshot {
    MarketSnapshot {
        fee_tiers: FeeTiers {
            slow: Decimal::new(5, 5),
            standard: Decimal::new(10, 5),
            fast: Decimal::new(20, 5),
            instant: Decimal::new(40, 5),
        },
        taken_at: Utc::now(),
        network_quotes: vec![
            NetworkQuote {
                network: NetworkId::new("arbitrum"),
                supports_asset: true,
                bridge_cost: Decimal::new(25, 1),
                destination_execution_cost: Decimal::new(3, 1),
                estimated_time_seconds: 600,
            },
            NetworkQuote {
                network: NetworkId::new("optimism"),
                supports_asset: true,
                bridge_cost: Decimal::new(25, 1),
                destination_execution_cost: Decimal::new(3, 1),
                estimated_time_seconds: 600,
            },
        ],
        conversion: None,
        compatible_pending,
    }
}

fn transfer_request() -> RouteRequest {
    RouteRequest {
        kind: OperationKind::Transfer,
        asset: Asset::dummy_token("USDC"),
        target_asset: None,
        amount: 5_000_000,
        source: NetworkId::new(BASE_NETWORK),
        destination: "0xfeed".into(),
        urgency: Urgency::Normal,
    }
}

#[test]
fn analyze_and_select_twice_same_choice() {
    let analyzer = RouteAnalyzer::new(&EngineConfig::default());
    let snap = snapshot(4);
    let req = transfer_request();

    let first = analyzer.analyze(&req, &snap).unwrap();
    let second = analyzer.analyze(&req, &snap).unwrap();
    assert_eq!(first, second);

    let a = select_route(&first).unwrap();
    let b = select_route(&second).unwrap();
    assert_eq!(a, b);
    assert_eq!(
        compute_decision_digest(&first, a),
        compute_decision_digest(&second, b)
    );
}

#[test]
fn equal_cost_networks_resolve_by_name() {
    let analyzer = RouteAnalyzer::new(&EngineConfig::default());
    // no batch, direct costs 6.5, both secondaries cost 2.8 in 600s
    let candidates = analyzer.analyze(&transfer_request(), &snapshot(0)).unwrap();
    let chosen = select_route(&candidates).unwrap();
    assert_eq!(chosen.route_type, RouteType::SecondaryNetwork);
    assert_eq!(chosen.network.as_ref().unwrap().as_str(), "arbitrum");
}

#[test]
fn shuffled_candidates_same_choice() {
    let analyzer = RouteAnalyzer::new(&EngineConfig::default());
    let mut candidates = analyzer.analyze(&transfer_request(), &snapshot(4)).unwrap();
    let expected = RouteSelection::from_candidates(&candidates).unwrap();

    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        candidates.shuffle(&mut rng);
        let again = RouteSelection::from_candidates(&candidates).unwrap();
        assert_eq!(again, expected);
    }
}

#[test]
fn recorded_digest_replays() {
    let analyzer = RouteAnalyzer::new(&EngineConfig::default());
    let snap = snapshot(3);
    let candidates = analyzer.analyze(&transfer_request(), &snap).unwrap();
    let chosen = select_route(&candidates).unwrap().clone();
    let recorded = hex::encode(compute_decision_digest(&candidates, &chosen));

    // Replay later from the same snapshot
    let replayed = analyzer.analyze(&transfer_request(), &snap).unwrap();
    let replay_choice = select_route(&replayed).unwrap();
    assert!(verify_decision_digest(&replayed, replay_choice, &recorded));

    // A different fee snapshot does not verify
    let mut moved = snap.clone();
    moved.fee_tiers.standard = Decimal::new(11, 5);
    let drifted = analyzer.analyze(&transfer_request(), &moved).unwrap();
    let drift_choice = select_route(&drifted).unwrap();
    assert!(!verify_decision_digest(&drifted, drift_choice, &recorded));
}

#[test]
fn batches_respect_bounds_and_membership() {
    let config = EngineConfig::default();
    let mut batcher = TransactionBatcher::new(&config);
    let mut rng = rand::thread_rng();

    let keys = [
        BatchKey::new(AssetSymbol::new("USDC"), NetworkId::new(BASE_NETWORK), GasClass::Token),
        BatchKey::new(AssetSymbol::new("DAI"), NetworkId::new(BASE_NETWORK), GasClass::Token),
        BatchKey::new(AssetSymbol::new("USDC"), NetworkId::new("arbitrum"), GasClass::Token),
    ];
    let mut total = 0;
    for _ in 0..120 {
        let key = keys.choose(&mut rng).unwrap().clone();
        batcher.enqueue(key, OperationId::new()).unwrap();
        total += 1;
    }

    let mut seen = HashSet::new();
    let formed = batcher.form_batches(Decimal::new(1, 4));
    assert!(!formed.is_empty());
    for batch in &formed {
        assert!(batch.len() >= config.batching.min_batch_threshold);
        assert!(batch.len() <= config.batching.max_batch_size);
        for member in batch.members() {
            assert!(seen.insert(*member));
        }
    }

    let leftover: usize = keys.iter().map(|k| batcher.compatible_count(k)).sum();
    assert_eq!(seen.len() + leftover, total);
    for key in &keys {
        assert!(batcher.compatible_count(key) < config.batching.min_batch_threshold);
    }

    // A second formation pass never re-batches anything
    assert!(batcher.form_batches(Decimal::new(1, 4)).is_empty());
}
