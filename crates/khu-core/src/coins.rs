//! KHU colored-coin UTXO view.
//!
//! KHU_T coins live in their own keyed store, isolated from the base
//! chain's UTXO set. A coin is either `Unstaked` (spendable by REDEEM or
//! STAKE) or `Staked` (its value has moved into a shielded note); the
//! "staked and spent" combination is unrepresentable because spent coins
//! are simply absent from the view.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::types::{Amount, Hash256, OutPoint};

/// Staking status of a colored coin.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum CoinStake {
    Unstaked,
    Staked { since_height: u32 },
}

/// A KHU_T colored coin.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct KhuCoin {
    /// Value in sats.
    pub value: Amount,
    /// Hash of the owning public key.
    pub dest: Hash256,
    pub stake: CoinStake,
}

impl KhuCoin {
    pub fn unstaked(value: Amount, dest: Hash256) -> Self {
        Self { value, dest, stake: CoinStake::Unstaked }
    }

    pub fn is_staked(&self) -> bool {
        matches!(self.stake, CoinStake::Staked { .. })
    }
}

/// Mutable view over the KHU_T colored-coin set.
///
/// Implemented by the in-memory store (tests) and the RocksDB-backed
/// store (production); the engine depends only on this trait.
pub trait KhuCoinsView: Send + Sync {
    /// Look up a coin. Returns `None` if spent or unknown.
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<KhuCoin>, StoreError>;

    /// Whether an unspent coin exists at `outpoint`.
    fn have_coin(&self, outpoint: &OutPoint) -> Result<bool, StoreError> {
        Ok(self.coin(outpoint)?.is_some())
    }

    /// Add a new coin. Overwrites nothing: adding over an existing coin
    /// is a backend error.
    fn add_coin(&mut self, outpoint: OutPoint, coin: KhuCoin) -> Result<(), StoreError>;

    /// Remove a coin, returning it for undo journaling.
    fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Option<KhuCoin>, StoreError>;
}

/// In-memory colored-coin set.
#[derive(Clone, Debug, Default)]
pub struct MemoryCoins {
    coins: BTreeMap<OutPoint, KhuCoin>,
}

impl MemoryCoins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}

impl KhuCoinsView for MemoryCoins {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<KhuCoin>, StoreError> {
        Ok(self.coins.get(outpoint).copied())
    }

    fn add_coin(&mut self, outpoint: OutPoint, coin: KhuCoin) -> Result<(), StoreError> {
        if self.coins.contains_key(&outpoint) {
            return Err(StoreError::Backend(format!("coin exists: {outpoint}")));
        }
        self.coins.insert(outpoint, coin);
        Ok(())
    }

    fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Option<KhuCoin>, StoreError> {
        Ok(self.coins.remove(outpoint))
    }
}
