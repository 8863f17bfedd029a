//! Transaction batcher.
//!
//! Pending operations are queued per [`BatchKey`] (asset, source network,
//! gas class) in arrival order. [`TransactionBatcher::form_batches`] walks
//! every queue and carves off batches of at most `max_batch_size` members
//! while at least `min_batch_threshold` operations remain and the batch saves
//! gas compared to settling each member alone.
//!
//! ## Invariants
//!
//! - An operation is either queued, in exactly one batch, or unknown
//! - Formed batches are immutable; dissolving one drops it and re-queues its members
//! - Every formed batch has `min_batch_threshold <= len <= max_batch_size`
//!
//! The batcher holds no lock of its own. The owner serializes access so one
//! `form_batches` call sees an atomic snapshot of membership.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use routeforge_types::{
    AssetSymbol, Batch, BatchId, BatchingConfig, EngineConfig, GasClass, GasSchedule,
    NetworkId, OperationId, Result, RouteforgeError,
};

use crate::determinism::compute_batch_digest;

/// Compatibility key. Only operations with equal keys batch together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchKey {
    pub asset: AssetSymbol,
    pub source: NetworkId,
    pub gas_class: GasClass,
}

impl BatchKey {
    #[must_use]
    pub fn new(asset: AssetSymbol, source: NetworkId, gas_class: GasClass) -> Self {
        Self {
            asset,
            source,
            gas_class,
        }
    }
}

/// Groups compatible pending operations to amortize settlement overhead.
#[derive(Debug)]
pub struct TransactionBatcher {
    gas: GasSchedule,
    batching: BatchingConfig,
    /// Queued operations per key, in arrival order.
    queues: BTreeMap<BatchKey, Vec<OperationId>>,
    /// Reverse index of queued operations.
    queued: HashMap<OperationId, BatchKey>,
    /// Operation → the batch it belongs to.
    membership: HashMap<OperationId, BatchId>,
    batches: HashMap<BatchId, Batch>,
}

impl TransactionBatcher {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            gas: config.gas.clone(),
            batching: config.batching.clone(),
            queues: BTreeMap::new(),
            queued: HashMap::new(),
            membership: HashMap::new(),
            batches: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------

    /// Queue an operation for batching.
    ///
    /// # Errors
    /// `AlreadyBatched` if the operation is already queued or in a batch.
    pub fn enqueue(&mut self, key: BatchKey, operation_id: OperationId) -> Result<()> {
        if self.queued.contains_key(&operation_id) || self.membership.contains_key(&operation_id)
        {
            return Err(RouteforgeError::AlreadyBatched(operation_id));
        }
        self.queues
            .entry(key.clone())
            .or_default()
            .push(operation_id);
        self.queued.insert(operation_id, key);
        Ok(())
    }

    /// Number of operations waiting under `key`.
    #[must_use]
    pub fn compatible_count(&self, key: &BatchKey) -> usize {
        self.queues.get(key).map_or(0, Vec::len)
    }

    /// Drop a queued operation. Returns `false` if it was not queued.
    pub fn remove_pending(&mut self, operation_id: OperationId) -> bool {
        let Some(key) = self.queued.remove(&operation_id) else {
            return false;
        };
        if let Some(queue) = self.queues.get_mut(&key) {
            queue.retain(|id| *id != operation_id);
            if queue.is_empty() {
                self.queues.remove(&key);
            }
        }
        true
    }

    #[must_use]
    pub fn is_queued(&self, operation_id: OperationId) -> bool {
        self.queued.contains_key(&operation_id)
    }

    // -----------------------------------------------------------------
    // Formation
    // -----------------------------------------------------------------

    /// Gas saved by settling `size` members of `class` as one batch.
    /// Negative when the batch costs more than individual settlement.
    #[must_use]
    pub fn projected_savings_gas(&self, class: GasClass, size: usize) -> i128 {
        let individual = i128::from(self.gas.units_for(class))
            .saturating_mul(i128::try_from(size).unwrap_or(i128::MAX));
        individual.saturating_sub(i128::from(self.gas.batch_overhead(size)))
    }

    /// Form every batch the current queues allow, priced at `fee_per_gas`.
    ///
    /// Members are taken from the head of each queue. Returns the newly formed
    /// batches, ordered by key.
    pub fn form_batches(&mut self, fee_per_gas: Decimal) -> Vec<Batch> {
        let threshold = self.batching.min_batch_threshold.max(1);
        let max_size = self.batching.max_batch_size.max(threshold);
        let mut formed = Vec::new();

        let keys: Vec<BatchKey> = self.queues.keys().cloned().collect();
        for key in keys {
            loop {
                let remaining = self.compatible_count(&key);
                if remaining < threshold {
                    break;
                }
                let size = remaining.min(max_size);
                let savings_gas = self.projected_savings_gas(key.gas_class, size);
                if savings_gas <= 0 {
                    tracing::debug!(
                        asset = %key.asset,
                        source = %key.source,
                        size,
                        savings_gas,
                        "Batch skipped: no projected savings"
                    );
                    break;
                }

                let Some(queue) = self.queues.get_mut(&key) else {
                    break;
                };
                let members: Vec<OperationId> = queue.drain(..size).collect();
                if queue.is_empty() {
                    self.queues.remove(&key);
                }

                let batch = self.build_batch(&key, members, fee_per_gas, savings_gas);
                for member in batch.members() {
                    self.queued.remove(member);
                    self.membership.insert(*member, batch.id());
                }

                tracing::info!(
                    batch = %batch.id(),
                    asset = %key.asset,
                    source = %key.source,
                    members = batch.len(),
                    per_member_fee = %batch.per_member_fee(),
                    savings = %batch.savings(),
                    "Batch formed"
                );

                formed.push(batch.clone());
                self.batches.insert(batch.id(), batch);
            }
        }
        formed
    }

    /// Form one batch around a queued `operation_id`: the operation plus the
    /// oldest compatible operations queued ahead of or behind it, up to
    /// `max_batch_size`. Returns `None` and leaves the queue untouched when
    /// the threshold is not met or the batch would not save gas.
    ///
    /// # Errors
    /// `OperationNotFound` if the operation is not queued.
    pub fn form_batch_with(
        &mut self,
        operation_id: OperationId,
        fee_per_gas: Decimal,
    ) -> Result<Option<Batch>> {
        let key = self
            .queued
            .get(&operation_id)
            .cloned()
            .ok_or(RouteforgeError::OperationNotFound(operation_id))?;
        let threshold = self.batching.min_batch_threshold.max(1);
        let max_size = self.batching.max_batch_size.max(threshold);

        let size = self.compatible_count(&key).min(max_size);
        if size < threshold {
            return Ok(None);
        }
        let savings_gas = self.projected_savings_gas(key.gas_class, size);
        if savings_gas <= 0 {
            return Ok(None);
        }

        let Some(queue) = self.queues.get_mut(&key) else {
            return Ok(None);
        };
        queue.retain(|id| *id != operation_id);
        let mut members: Vec<OperationId> = queue.drain(..size - 1).collect();
        members.push(operation_id);
        if queue.is_empty() {
            self.queues.remove(&key);
        }

        let batch = self.build_batch(&key, members, fee_per_gas, savings_gas);
        for member in batch.members() {
            self.queued.remove(member);
            self.membership.insert(*member, batch.id());
        }
        tracing::info!(
            batch = %batch.id(),
            asset = %key.asset,
            joined = %operation_id,
            members = batch.len(),
            per_member_fee = %batch.per_member_fee(),
            "Batch formed around operation"
        );
        self.batches.insert(batch.id(), batch.clone());
        Ok(Some(batch))
    }

    fn build_batch(
        &self,
        key: &BatchKey,
        members: Vec<OperationId>,
        fee_per_gas: Decimal,
        savings_gas: i128,
    ) -> Batch {
        let size = members.len();
        let total_fee = fee_per_gas * Decimal::from(self.gas.batch_overhead(size));
        let per_member_fee = total_fee / Decimal::from(size.max(1));
        let savings = fee_per_gas
            * Decimal::try_from_i128_with_scale(savings_gas, 0).unwrap_or(Decimal::MAX);
        Batch::new(
            key.asset.clone(),
            key.source.clone(),
            key.gas_class,
            members,
            total_fee,
            per_member_fee,
            savings,
            |sorted| compute_batch_digest(&key.asset, &key.source, key.gas_class, sorted),
        )
    }

    // -----------------------------------------------------------------
    // Formed batches
    // -----------------------------------------------------------------

    #[must_use]
    pub fn batch_of(&self, operation_id: OperationId) -> Option<BatchId> {
        self.membership.get(&operation_id).copied()
    }

    #[must_use]
    pub fn get_batch(&self, batch_id: BatchId) -> Option<&Batch> {
        self.batches.get(&batch_id)
    }

    /// Remove a formed batch for dispatch. Its members leave the batcher.
    ///
    /// # Errors
    /// `BatchNotFound` if the batch is unknown or already taken.
    pub fn take_batch(&mut self, batch_id: BatchId) -> Result<Batch> {
        let batch = self
            .batches
            .remove(&batch_id)
            .ok_or(RouteforgeError::BatchNotFound(batch_id))?;
        for member in batch.members() {
            self.membership.remove(member);
        }
        Ok(batch)
    }

    /// Drop a formed batch and put its members back at the head of their
    /// queue, in member order. Returns the dissolved batch.
    ///
    /// # Errors
    /// `BatchNotFound` if the batch is unknown or already taken.
    pub fn dissolve_batch(&mut self, batch_id: BatchId) -> Result<Batch> {
        let batch = self.take_batch(batch_id)?;
        let key = BatchKey::new(batch.asset().clone(), batch.source().clone(), batch.gas_class());
        let queue = self.queues.entry(key.clone()).or_default();
        let mut requeued: Vec<OperationId> = batch.members().to_vec();
        requeued.append(queue);
        *queue = requeued;
        for member in batch.members() {
            self.queued.insert(*member, key.clone());
        }
        tracing::info!(batch = %batch_id, members = batch.len(), "Batch dissolved");
        Ok(batch)
    }

    /// Formed batches not yet taken for dispatch.
    #[must_use]
    pub fn open_batches(&self) -> usize {
        self.batches.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use routeforge_types::constants::BASE_NETWORK;

    use super::*;

    fn key(asset: &str, class: GasClass) -> BatchKey {
        BatchKey::new(AssetSymbol::new(asset), NetworkId::new(BASE_NETWORK), class)
    }

    fn fee() -> Decimal {
        Decimal::new(1, 4)
    }

    fn batcher() -> TransactionBatcher {
        TransactionBatcher::new(&EngineConfig::default())
    }

    fn ids(n: u8) -> Vec<OperationId> {
        (1..=n).map(|i| OperationId::from_bytes([i; 16])).collect()
    }

    #[test]
    fn below_threshold_forms_nothing() {
        let mut b = batcher();
        for id in ids(2) {
            b.enqueue(key("USDC", GasClass::Token), id).unwrap();
        }
        assert!(b.form_batches(fee()).is_empty());
        assert_eq!(b.compatible_count(&key("USDC", GasClass::Token)), 2);
    }

    #[test]
    fn three_compatible_tokens_form_one_batch() {
        let mut b = batcher();
        for id in ids(3) {
            b.enqueue(key("USDC", GasClass::Token), id).unwrap();
        }
        let formed = b.form_batches(fee());
        assert_eq!(formed.len(), 1);
        let batch = &formed[0];
        assert_eq!(batch.len(), 3);
        // 66_000 gas across 3 members vs 65_000 each alone
        assert_eq!(batch.per_member_fee(), Decimal::new(22, 1));
        assert!(batch.per_member_fee() < fee() * Decimal::from(65_000u64));
        assert_eq!(batch.savings(), Decimal::new(129, 1));
        assert_eq!(b.compatible_count(&key("USDC", GasClass::Token)), 0);
        for id in ids(3) {
            assert_eq!(b.batch_of(id), Some(batch.id()));
        }
    }

    #[test]
    fn incompatible_keys_never_mix() {
        let mut b = batcher();
        let all = ids(4);
        b.enqueue(key("USDC", GasClass::Token), all[0]).unwrap();
        b.enqueue(key("USDC", GasClass::Token), all[1]).unwrap();
        b.enqueue(key("DAI", GasClass::Token), all[2]).unwrap();
        b.enqueue(key("USDC", GasClass::Complex), all[3]).unwrap();
        assert!(b.form_batches(fee()).is_empty());
    }

    #[test]
    fn native_batch_of_three_saves_nothing() {
        // 3 * 21_000 < 30_000 + 3 * 12_000
        let mut b = batcher();
        for id in ids(3) {
            b.enqueue(key("ETH", GasClass::Native), id).unwrap();
        }
        assert!(b.projected_savings_gas(GasClass::Native, 3) < 0);
        assert!(b.form_batches(fee()).is_empty());

        b.enqueue(key("ETH", GasClass::Native), OperationId::from_bytes([9; 16]))
            .unwrap();
        assert_eq!(b.form_batches(fee()).len(), 1);
    }

    #[test]
    fn large_queue_splits_at_max_size() {
        let mut b = batcher();
        for id in ids(20) {
            b.enqueue(key("USDC", GasClass::Token), id).unwrap();
        }
        let formed = b.form_batches(fee());
        let sizes: Vec<usize> = formed.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![16, 4]);
    }

    #[test]
    fn leftover_below_threshold_stays_queued() {
        let mut b = batcher();
        for id in ids(18) {
            b.enqueue(key("USDC", GasClass::Token), id).unwrap();
        }
        let formed = b.form_batches(fee());
        assert_eq!(formed.len(), 1);
        assert_eq!(b.compatible_count(&key("USDC", GasClass::Token)), 2);
    }

    #[test]
    fn no_operation_in_two_batches() {
        let mut b = batcher();
        for id in ids(40) {
            b.enqueue(key("USDC", GasClass::Token), id).unwrap();
        }
        let mut seen = HashSet::new();
        for batch in b.form_batches(fee()) {
            assert!(batch.len() >= 3 && batch.len() <= 16);
            for m in batch.members() {
                assert!(seen.insert(*m), "operation {m} in two batches");
            }
        }
        assert_eq!(seen.len() + b.compatible_count(&key("USDC", GasClass::Token)), 40);
    }

    #[test]
    fn batch_forms_around_late_arrival() {
        let mut b = TransactionBatcher::new(&EngineConfig {
            batching: BatchingConfig {
                max_batch_size: 4,
                ..BatchingConfig::default()
            },
            ..EngineConfig::default()
        });
        let all = ids(6);
        for id in &all {
            b.enqueue(key("USDC", GasClass::Token), *id).unwrap();
        }
        let batch = b.form_batch_with(all[5], fee()).unwrap().unwrap();
        assert_eq!(batch.len(), 4);
        assert!(batch.contains(&all[5]));
        for id in &all[..3] {
            assert_eq!(b.batch_of(*id), Some(batch.id()));
        }
        assert!(b.is_queued(all[3]) && b.is_queued(all[4]));
        assert_eq!(b.compatible_count(&key("USDC", GasClass::Token)), 2);
    }

    #[test]
    fn batch_around_operation_needs_threshold() {
        let mut b = batcher();
        let all = ids(2);
        for id in &all {
            b.enqueue(key("USDC", GasClass::Token), *id).unwrap();
        }
        assert!(b.form_batch_with(all[1], fee()).unwrap().is_none());
        assert_eq!(b.compatible_count(&key("USDC", GasClass::Token)), 2);

        let err = b.form_batch_with(OperationId::from_bytes([9; 16]), fee()).unwrap_err();
        assert!(matches!(err, RouteforgeError::OperationNotFound(_)));
    }

    #[test]
    fn double_enqueue_rejected() {
        let mut b = batcher();
        let id = OperationId::from_bytes([7; 16]);
        b.enqueue(key("USDC", GasClass::Token), id).unwrap();
        let err = b.enqueue(key("USDC", GasClass::Token), id).unwrap_err();
        assert!(matches!(err, RouteforgeError::AlreadyBatched(x) if x == id));
    }

    #[test]
    fn batched_operation_cannot_requeue() {
        let mut b = batcher();
        for id in ids(3) {
            b.enqueue(key("USDC", GasClass::Token), id).unwrap();
        }
        b.form_batches(fee());
        let err = b.enqueue(key("USDC", GasClass::Token), ids(3)[0]).unwrap_err();
        assert!(matches!(err, RouteforgeError::AlreadyBatched(_)));
    }

    #[test]
    fn remove_pending_only_affects_queue() {
        let mut b = batcher();
        let all = ids(3);
        for id in &all {
            b.enqueue(key("USDC", GasClass::Token), *id).unwrap();
        }
        assert!(b.remove_pending(all[1]));
        assert!(!b.remove_pending(all[1]));
        assert_eq!(b.compatible_count(&key("USDC", GasClass::Token)), 2);
        assert!(b.form_batches(fee()).is_empty());
    }

    #[test]
    fn take_batch_once() {
        let mut b = batcher();
        for id in ids(3) {
            b.enqueue(key("USDC", GasClass::Token), id).unwrap();
        }
        let batch_id = b.form_batches(fee())[0].id();
        let taken = b.take_batch(batch_id).unwrap();
        assert_eq!(taken.len(), 3);
        assert!(b.batch_of(ids(3)[0]).is_none());
        assert!(matches!(
            b.take_batch(batch_id),
            Err(RouteforgeError::BatchNotFound(_))
        ));
    }

    #[test]
    fn dissolve_requeues_members_ahead_of_new_arrivals() {
        let mut b = batcher();
        let all = ids(4);
        for id in &all[..3] {
            b.enqueue(key("USDC", GasClass::Token), *id).unwrap();
        }
        let batch_id = b.form_batches(fee())[0].id();
        b.enqueue(key("USDC", GasClass::Token), all[3]).unwrap();

        b.dissolve_batch(batch_id).unwrap();
        assert_eq!(b.open_batches(), 0);
        assert_eq!(b.compatible_count(&key("USDC", GasClass::Token)), 4);
        assert!(b.remove_pending(all[0]));
        let reformed = b.form_batches(fee());
        assert_eq!(reformed.len(), 1);
        assert!(reformed[0].contains(&all[3]));
    }

    #[test]
    fn batch_digest_is_stable_for_member_set() {
        let mut a = batcher();
        let mut b = batcher();
        let all = ids(3);
        for id in &all {
            a.enqueue(key("USDC", GasClass::Token), *id).unwrap();
        }
        for id in all.iter().rev() {
            b.enqueue(key("USDC", GasClass::Token), *id).unwrap();
        }
        assert_eq!(a.form_batches(fee())[0].digest(), b.form_batches(fee())[0].digest());
    }
}
