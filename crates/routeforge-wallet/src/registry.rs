//! Arena of wallets keyed by owner.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use routeforge_types::{EngineConfig, NetworkId, OwnerId, Result};

use crate::wallet::{WalletAggregate, WalletPorts};

/// One wallet per owner, created on first use and shared afterwards.
pub struct WalletRegistry {
    config: EngineConfig,
    secondary_networks: Vec<NetworkId>,
    ports: WalletPorts,
    wallets: Mutex<HashMap<OwnerId, Arc<WalletAggregate>>>,
}

impl WalletRegistry {
    /// # Errors
    /// `Configuration` if `config` does not validate.
    pub fn new(
        config: EngineConfig,
        secondary_networks: Vec<NetworkId>,
        ports: WalletPorts,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            secondary_networks,
            ports,
            wallets: Mutex::new(HashMap::new()),
        })
    }

    /// The owner's wallet, creating it if this is the first request.
    pub fn get_or_create(&self, owner: OwnerId) -> Result<Arc<WalletAggregate>> {
        let mut wallets = self.wallets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(wallet) = wallets.get(&owner) {
            return Ok(Arc::clone(wallet));
        }
        let wallet = Arc::new(WalletAggregate::new(
            owner,
            self.config.clone(),
            self.secondary_networks.iter().cloned(),
            self.ports.clone(),
        )?);
        wallets.insert(owner, Arc::clone(&wallet));
        Ok(wallet)
    }

    #[must_use]
    pub fn get(&self, owner: OwnerId) -> Option<Arc<WalletAggregate>> {
        self.wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&owner)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for WalletRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletRegistry")
            .field("wallets", &self.len())
            .finish_non_exhaustive()
    }
}
