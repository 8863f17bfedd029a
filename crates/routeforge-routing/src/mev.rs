//! MEV exposure classification.
//!
//! Exposure is the operation amount weighted by how visible its route is
//! (`route_weights_bps`). Above the asset's threshold the operation is
//! submitted privately and the expected premium is recorded as `fee_delta`.

use rust_decimal::Decimal;
use routeforge_types::{
    AssetSymbol, EngineConfig, ExposureLevel, MevConfig, Protection, Route, SubmissionMode,
    constants::BPS_DENOMINATOR,
};

#[derive(Debug, Clone)]
pub struct MevGuard {
    mev: MevConfig,
}

impl MevGuard {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            mev: config.mev.clone(),
        }
    }

    /// Weighted exposure of moving `amount` over `route`, in smallest units.
    #[must_use]
    pub fn exposure(&self, route: &Route, amount: u128) -> u128 {
        let weight = u128::from(self.mev.weight_bps(route.route_type));
        amount.saturating_mul(weight) / u128::from(BPS_DENOMINATOR)
    }

    #[must_use]
    pub fn classify(&self, asset: &AssetSymbol, route: &Route, amount: u128) -> ExposureLevel {
        let threshold = self.mev.threshold_for(asset.as_str());
        let exposure = self.exposure(route, amount);
        if exposure > threshold {
            ExposureLevel::High
        } else if exposure > threshold / 2 {
            ExposureLevel::Elevated
        } else {
            ExposureLevel::Low
        }
    }

    /// Decide the submission path for a selected route.
    #[must_use]
    pub fn protect(&self, asset: &AssetSymbol, route: &Route, amount: u128) -> Protection {
        let exposure = self.classify(asset, route, amount);
        if exposure != ExposureLevel::High {
            return Protection {
                exposure,
                mode: SubmissionMode::Public,
                fee_delta: Decimal::ZERO,
            };
        }

        let fee_delta = route.estimated_fee * Decimal::from(self.mev.private_premium_bps)
            / Decimal::from(BPS_DENOMINATOR);
        tracing::info!(
            asset = %asset,
            route = %route.label(),
            amount,
            fee_delta = %fee_delta,
            "High MEV exposure, switching to private submission"
        );
        Protection {
            exposure,
            mode: SubmissionMode::Private,
            fee_delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use routeforge_types::RouteType;

    use super::*;

    fn guard_with_threshold(threshold: u128) -> MevGuard {
        let mut cfg = EngineConfig::default();
        cfg.mev.exposure_threshold = threshold;
        MevGuard::new(&cfg)
    }

    fn usdc() -> AssetSymbol {
        AssetSymbol::new("USDC")
    }

    #[test]
    fn small_amount_stays_public() {
        let guard = guard_with_threshold(1_000);
        let route = Route::dummy(RouteType::Direct, 10, 60);
        let p = guard.protect(&usdc(), &route, 100);
        assert_eq!(p, Protection::public());
    }

    #[test]
    fn large_amount_goes_private_with_premium() {
        let guard = guard_with_threshold(1_000);
        let route = Route::dummy(RouteType::Direct, 10, 60);
        let p = guard.protect(&usdc(), &route, 5_000);
        assert_eq!(p.exposure, ExposureLevel::High);
        assert_eq!(p.mode, SubmissionMode::Private);
        // 10% of the route fee by default
        assert_eq!(p.fee_delta, Decimal::ONE);
    }

    #[test]
    fn elevated_is_still_public() {
        let guard = guard_with_threshold(1_000);
        let route = Route::dummy(RouteType::Direct, 10, 60);
        let p = guard.protect(&usdc(), &route, 800);
        assert_eq!(p.exposure, ExposureLevel::Elevated);
        assert_eq!(p.mode, SubmissionMode::Public);
        assert_eq!(p.fee_delta, Decimal::ZERO);
    }

    #[test]
    fn route_weight_scales_exposure() {
        let guard = guard_with_threshold(1_000);
        let amount = 3_000;
        let batched = Route::dummy(RouteType::Batched, 2, 400);
        let bridge = Route::dummy(RouteType::BridgeAggregated, 2, 900);
        // 30% vs 150% of the amount
        assert_eq!(guard.exposure(&batched, amount), 900);
        assert_eq!(guard.exposure(&bridge, amount), 4_500);
        assert_eq!(guard.classify(&usdc(), &batched, amount), ExposureLevel::Elevated);
        assert_eq!(guard.classify(&usdc(), &bridge, amount), ExposureLevel::High);
    }

    #[test]
    fn per_asset_threshold_override() {
        let mut cfg = EngineConfig::default();
        cfg.mev.exposure_threshold = 1_000_000;
        cfg.mev.asset_thresholds.insert("WBTC".into(), 10);
        let guard = MevGuard::new(&cfg);
        let route = Route::dummy(RouteType::Direct, 10, 60);
        assert_eq!(
            guard.classify(&AssetSymbol::new("WBTC"), &route, 100),
            ExposureLevel::High
        );
        assert_eq!(guard.classify(&usdc(), &route, 100), ExposureLevel::Low);
    }

    #[test]
    fn exposure_saturates() {
        let guard = guard_with_threshold(1);
        let route = Route::dummy(RouteType::BridgeAggregated, 1, 60);
        assert!(guard.exposure(&route, u128::MAX) > 0);
    }
}
