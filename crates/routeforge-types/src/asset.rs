//! Asset catalog types.
//!
//! An asset is identified by its symbol, carries its decimal precision, the
//! networks where it is natively usable, and the gas-parameter class that
//! drives both its direct-route gas estimate and its batch compatibility.

use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{NetworkId, RouteforgeError};

/// Asset ticker (e.g. "ETH", "USDC").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AssetSymbol(pub String);

impl AssetSymbol {
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetSymbol {
    fn from(symbol: &str) -> Self {
        Self(symbol.to_string())
    }
}

/// Gas-parameter class. Operations only batch with members of the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum GasClass {
    /// Native base-layer asset transfer.
    Native,
    /// Fungible token transfer.
    Token,
    /// Contract-heavy call (staking, swap legs).
    Complex,
}

impl fmt::Display for GasClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "NATIVE"),
            Self::Token => write!(f, "TOKEN"),
            Self::Complex => write!(f, "COMPLEX"),
        }
    }
}

/// A registered asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: AssetSymbol,
    /// Number of decimals between the smallest unit and one whole unit.
    pub decimals: u32,
    /// Networks on which the asset is natively usable.
    pub networks: BTreeSet<NetworkId>,
    pub gas_class: GasClass,
}

impl Asset {
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        decimals: u32,
        gas_class: GasClass,
        networks: impl IntoIterator<Item = NetworkId>,
    ) -> Self {
        Self {
            symbol: AssetSymbol::new(symbol),
            decimals,
            networks: networks.into_iter().collect(),
            gas_class,
        }
    }

    /// Whether the asset is natively usable on `network`.
    #[must_use]
    pub fn is_native_on(&self, network: &NetworkId) -> bool {
        self.networks.contains(network)
    }

    /// Convert an amount in smallest units to whole units.
    ///
    /// # Errors
    /// Returns `Validation` if the amount does not fit a `Decimal`.
    pub fn to_units(&self, amount: u128) -> crate::Result<Decimal> {
        let raw = i128::try_from(amount).map_err(|_| RouteforgeError::Validation {
            reason: format!("amount {amount} of {} out of range", self.symbol),
        })?;
        Decimal::try_from_i128_with_scale(raw, self.decimals).map_err(|e| {
            RouteforgeError::Validation {
                reason: format!("amount {amount} of {} not representable: {e}", self.symbol),
            }
        })
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Asset {
    /// An 18-decimal token native on the base layer and two secondary networks.
    pub fn dummy_token(symbol: &str) -> Self {
        Self::new(
            symbol,
            18,
            GasClass::Token,
            [
                NetworkId::new(crate::constants::BASE_NETWORK),
                NetworkId::new("arbitrum"),
                NetworkId::new("optimism"),
            ],
        )
    }

    /// The base layer's native asset.
    pub fn dummy_native() -> Self {
        Self::new(
            "ETH",
            18,
            GasClass::Native,
            [NetworkId::new(crate::constants::BASE_NETWORK)],
        )
    }
}
