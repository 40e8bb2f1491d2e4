//! Global KHU state: the six coupled monetary scalars, governance anchors,
//! and chain linkage, with the sacred invariants.
//!
//! Invariants, checked after every connected block and after every undo:
//!
//! 1. `C == U + Z` (collateral equals transparent + shielded supply)
//! 2. `Cr == Ur`, or both zero (reward collateral equals unstake rights)
//! 3. `C, U, Z, Cr, Ur, T >= 0`
//! 4. `prev_state_hash` equals the full hash of the previous height's state

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{
    DOMC_COMMIT_OFFSET, DOMC_CYCLE_LENGTH, DOMC_REVEAL_OFFSET, R_DEFAULT, R_MAX_DYNAMIC_INIT,
};
use crate::error::FatalReason;
use crate::types::{Amount, Hash256};

/// Canonical KHU state at one block height.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct State {
    /// Collateral locked behind circulating supply.
    pub c: Amount,
    /// Transparent supply (KHU_T).
    pub u: Amount,
    /// Shielded supply (ZKHU notes).
    pub z: Amount,
    /// Reward-pool collateral.
    pub cr: Amount,
    /// Aggregate unstake rights (sum of per-note accumulated yield).
    pub ur: Amount,
    /// DAO treasury pool.
    pub t: Amount,

    /// Annual yield rate in basis points (1500 = 15.00%).
    pub r_annual: u16,
    /// Governance cap on `r_annual`, in basis points.
    pub r_max_dynamic: u16,
    /// Last height at which the daily yield pass ran.
    pub last_yield_height: u32,
    /// Amount injected by that pass (kept for exact undo).
    pub last_yield_amount: Amount,

    /// Start height of the current DOMC cycle (also the cycle id).
    pub domc_cycle_start: u32,
    pub domc_cycle_length: u32,
    /// Height at which the commit window opens.
    pub domc_commit_start: u32,
    /// Height at which the reveal window opens.
    pub domc_reveal_deadline: u32,

    pub height: u32,
    pub block_hash: Hash256,
    /// Full hash of the previous height's state.
    pub prev_state_hash: Hash256,
}

impl State {
    /// Base state persisted at the activation height, before any KHU block.
    ///
    /// All monetary scalars are zero; governance starts at the default
    /// rate with the initial dynamic cap, and the first DOMC cycle is
    /// anchored at activation.
    pub fn activation_base(activation_height: u32) -> Self {
        Self {
            r_annual: R_DEFAULT,
            r_max_dynamic: R_MAX_DYNAMIC_INIT,
            last_yield_height: activation_height,
            domc_cycle_start: activation_height,
            domc_cycle_length: DOMC_CYCLE_LENGTH,
            domc_commit_start: activation_height + DOMC_COMMIT_OFFSET,
            domc_reveal_deadline: activation_height + DOMC_REVEAL_OFFSET,
            height: activation_height,
            ..Self::default()
        }
    }

    /// Verify the sacred invariants.
    pub fn check_invariants(&self) -> Result<(), FatalReason> {
        let nonneg = self.c >= 0
            && self.u >= 0
            && self.z >= 0
            && self.cr >= 0
            && self.ur >= 0
            && self.t >= 0;
        let cuz_ok = self.c == self.u + self.z;
        let crur_ok = (self.cr == 0 && self.ur == 0) || self.cr == self.ur;

        if !(nonneg && cuz_ok && crur_ok) {
            tracing::warn!(
                height = self.height,
                c = self.c,
                u = self.u,
                z = self.z,
                cr = self.cr,
                ur = self.ur,
                t = self.t,
                "KHU invariant violation"
            );
            return Err(FatalReason::InvariantViolation {
                height: self.height,
                c: self.c,
                u: self.u,
                z: self.z,
                cr: self.cr,
                ur: self.ur,
                t: self.t,
            });
        }
        Ok(())
    }

    /// Canonical hash of the bonded-monetary subset, signed by quorums:
    /// `SHA-256(C || U || Cr || Ur || height)`, all little-endian.
    ///
    /// The field order is consensus-fixed.
    pub fn commitment_hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(4 * 8 + 4);
        data.extend_from_slice(&self.c.to_le_bytes());
        data.extend_from_slice(&self.u.to_le_bytes());
        data.extend_from_slice(&self.cr.to_le_bytes());
        data.extend_from_slice(&self.ur.to_le_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        Hash256(Sha256::digest(&data).into())
    }

    /// Hash of the complete record, used for `prev_state_hash` linkage.
    ///
    /// Explicit little-endian layout over every field in declaration
    /// order; consensus-fixed.
    pub fn full_hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(6 * 8 + 2 * 2 + 6 * 4 + 8 + 2 * 32);
        data.extend_from_slice(&self.c.to_le_bytes());
        data.extend_from_slice(&self.u.to_le_bytes());
        data.extend_from_slice(&self.z.to_le_bytes());
        data.extend_from_slice(&self.cr.to_le_bytes());
        data.extend_from_slice(&self.ur.to_le_bytes());
        data.extend_from_slice(&self.t.to_le_bytes());
        data.extend_from_slice(&self.r_annual.to_le_bytes());
        data.extend_from_slice(&self.r_max_dynamic.to_le_bytes());
        data.extend_from_slice(&self.last_yield_height.to_le_bytes());
        data.extend_from_slice(&self.last_yield_amount.to_le_bytes());
        data.extend_from_slice(&self.domc_cycle_start.to_le_bytes());
        data.extend_from_slice(&self.domc_cycle_length.to_le_bytes());
        data.extend_from_slice(&self.domc_commit_start.to_le_bytes());
        data.extend_from_slice(&self.domc_reveal_deadline.to_le_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(self.block_hash.as_bytes());
        data.extend_from_slice(self.prev_state_hash.as_bytes());
        Hash256(Sha256::digest(&data).into())
    }
}
