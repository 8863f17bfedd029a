//! Per-(wallet, asset) settlement serialization.
//!
//! At most one settlement per key is in flight. Waiters queue on a fair tokio
//! mutex, so requests against the same key run in arrival order while
//! different keys proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use routeforge_types::{AssetSymbol, WalletId};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Exclusive hold on one (wallet, asset) key. Released on drop.
#[derive(Debug)]
pub struct SettlementPermit {
    _guard: OwnedMutexGuard<()>,
}

#[derive(Debug, Default)]
pub struct SettlementLocks {
    keys: Mutex<HashMap<(WalletId, AssetSymbol), KeyLock>>,
}

impl SettlementLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key_lock(&self, wallet_id: WalletId, asset: &AssetSymbol) -> KeyLock {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(keys.entry((wallet_id, asset.clone())).or_default())
    }

    /// Wait for exclusive access to `(wallet_id, asset)`.
    ///
    /// Returns `None` if `cancel` fires while still queued.
    pub async fn acquire(
        &self,
        wallet_id: WalletId,
        asset: &AssetSymbol,
        cancel: Option<&CancellationToken>,
    ) -> Option<SettlementPermit> {
        let lock = self.key_lock(wallet_id, asset);
        let guard = match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return None,
                    guard = lock.lock_owned() => guard,
                }
            }
            None => lock.lock_owned().await,
        };
        Some(SettlementPermit { _guard: guard })
    }

    /// Whether a settlement currently holds the key.
    #[must_use]
    pub fn is_held(&self, wallet_id: WalletId, asset: &AssetSymbol) -> bool {
        self.key_lock(wallet_id, asset).try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn usdc() -> AssetSymbol {
        AssetSymbol::new("USDC")
    }

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(SettlementLocks::new());
        let wallet = WalletId::new();
        let permit = locks.acquire(wallet, &usdc(), None).await.unwrap();
        assert!(locks.is_held(wallet, &usdc()));

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire(wallet, &usdc(), None).await.is_some() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn different_keys_are_independent() {
        let locks = SettlementLocks::new();
        let wallet = WalletId::new();
        let _a = locks.acquire(wallet, &usdc(), None).await.unwrap();
        let _b = locks
            .acquire(wallet, &AssetSymbol::new("ETH"), None)
            .await
            .unwrap();
        let _c = locks.acquire(WalletId::new(), &usdc(), None).await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_waiter_gives_up() {
        let locks = SettlementLocks::new();
        let wallet = WalletId::new();
        let _held = locks.acquire(wallet, &usdc(), None).await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        assert!(locks.acquire(wallet, &usdc(), Some(&token)).await.is_none());
    }
}
