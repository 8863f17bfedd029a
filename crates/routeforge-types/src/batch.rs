//! Batch model.
//!
//! A batch groups compatible pending operations (same asset, source network
//! and gas class) into one settlement. Once formed it is immutable: its
//! `digest` commits to the exact ordered member set.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AssetSymbol, BatchId, GasClass, NetworkId, OperationId};

/// An immutable group of operations settled together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    id: BatchId,
    asset: AssetSymbol,
    source: NetworkId,
    gas_class: GasClass,
    /// Sorted by operation ID.
    members: Vec<OperationId>,
    /// Fee of the whole batch settlement.
    total_fee: Decimal,
    /// Fee allocated to each member.
    per_member_fee: Decimal,
    /// Σ individual fees − batch fee. Always positive.
    savings: Decimal,
    digest: [u8; 32],
    formed_at: DateTime<Utc>,
}

impl Batch {
    /// Assemble a batch. Members are sorted so the digest is order-independent
    /// of arrival.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        asset: AssetSymbol,
        source: NetworkId,
        gas_class: GasClass,
        mut members: Vec<OperationId>,
        total_fee: Decimal,
        per_member_fee: Decimal,
        savings: Decimal,
        digest_fn: impl FnOnce(&[OperationId]) -> [u8; 32],
    ) -> Self {
        members.sort();
        let digest = digest_fn(&members);
        Self {
            id: BatchId::new(),
            asset,
            source,
            gas_class,
            members,
            total_fee,
            per_member_fee,
            savings,
            digest,
            formed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> BatchId {
        self.id
    }

    #[must_use]
    pub fn asset(&self) -> &AssetSymbol {
        &self.asset
    }

    #[must_use]
    pub fn source(&self) -> &NetworkId {
        &self.source
    }

    #[must_use]
    pub fn gas_class(&self) -> GasClass {
        self.gas_class
    }

    #[must_use]
    pub fn members(&self) -> &[OperationId] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &OperationId) -> bool {
        self.members.binary_search(id).is_ok()
    }

    #[must_use]
    pub fn total_fee(&self) -> Decimal {
        self.total_fee
    }

    #[must_use]
    pub fn per_member_fee(&self) -> Decimal {
        self.per_member_fee
    }

    #[must_use]
    pub fn savings(&self) -> Decimal {
        self.savings
    }

    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        self.digest
    }

    #[must_use]
    pub fn formed_at(&self) -> DateTime<Utc> {
        self.formed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(members: Vec<OperationId>) -> Batch {
        Batch::new(
            AssetSymbol::new("USDC"),
            NetworkId::new("base-layer"),
            GasClass::Token,
            members,
            Decimal::new(9, 0),
            Decimal::new(3, 0),
            Decimal::new(4, 0),
            |ids| {
                let mut d = [0u8; 32];
                #[allow(clippy::cast_possible_truncation)]
                {
                    d[0] = ids.len() as u8;
                }
                d
            },
        )
    }

    #[test]
    fn members_sorted_and_searchable() {
        let a = OperationId::from_bytes([3; 16]);
        let b = OperationId::from_bytes([1; 16]);
        let c = OperationId::from_bytes([2; 16]);
        let batch = make(vec![a, b, c]);
        assert_eq!(batch.members(), &[b, c, a]);
        assert!(batch.contains(&a));
        assert!(!batch.contains(&OperationId::from_bytes([9; 16])));
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.digest()[0], 3);
    }

    #[test]
    fn fees_are_exposed() {
        let batch = make(vec![OperationId::new()]);
        assert_eq!(batch.total_fee(), Decimal::new(9, 0));
        assert_eq!(batch.per_member_fee(), Decimal::new(3, 0));
        assert_eq!(batch.savings(), Decimal::new(4, 0));
    }
}
