//! Hooks the core consumes from the masternode and shielded layers.
//!
//! The engine never talks to the quorum network or the proving system
//! directly; it is handed these capabilities at construction.

use std::collections::HashMap;

use crate::crypto::PublicKey;
use crate::note::ShieldedSpend;
use crate::types::{Hash256, OutPoint};

/// Masternode set queries and per-masternode vote signature checks.
pub trait MasternodeRegistry: Send + Sync {
    /// Whether `identity` is a currently-active masternode.
    fn is_active(&self, identity: &OutPoint) -> bool;

    /// Verify a vote signature made by `identity` over `message`.
    fn verify_vote(&self, identity: &OutPoint, message: &[u8], signature: &[u8]) -> bool;
}

/// Aggregate-signature verification for quorum state commitments.
///
/// The implementation (BLS, LLMQ membership) lives in the enclosing node;
/// commitment acceptance always routes through this hook.
pub trait QuorumVerifier: Send + Sync {
    fn verify_aggregate(
        &self,
        quorum_hash: &Hash256,
        message: &[u8],
        aggregate_sig: &[u8],
        signers: &[bool],
    ) -> bool;
}

/// Shielded spend proof verification.
///
/// The core assumes the proving system is sound and consumes only
/// `(cm, nullifier, anchor)`; this hook performs the actual check.
pub trait ShieldedVerifier: Send + Sync {
    fn verify_spend(&self, spend: &ShieldedSpend) -> bool;
}

/// Fixed masternode set backed by ed25519 keys.
///
/// Suitable for tests and for embedders whose registry is externally
/// managed; production nodes wire their deterministic masternode list in
/// through the same trait.
#[derive(Clone, Debug, Default)]
pub struct StaticRegistry {
    members: HashMap<OutPoint, PublicKey>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: OutPoint, key: PublicKey) {
        self.members.insert(identity, key);
    }

    pub fn remove(&mut self, identity: &OutPoint) {
        self.members.remove(identity);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl MasternodeRegistry for StaticRegistry {
    fn is_active(&self, identity: &OutPoint) -> bool {
        self.members.contains_key(identity)
    }

    fn verify_vote(&self, identity: &OutPoint, message: &[u8], signature: &[u8]) -> bool {
        match self.members.get(identity) {
            Some(key) => key.verify(message, signature),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn identity(seed: u8) -> OutPoint {
        OutPoint::new(Hash256([seed; 32]), 0)
    }

    #[test]
    fn empty_registry_knows_nobody() {
        let reg = StaticRegistry::new();
        assert!(!reg.is_active(&identity(1)));
        assert!(!reg.verify_vote(&identity(1), b"msg", &[0; 64]));
    }

    #[test]
    fn registered_masternode_is_active() {
        let kp = KeyPair::from_secret_bytes([3; 32]);
        let mut reg = StaticRegistry::new();
        reg.insert(identity(1), kp.public_key());
        assert!(reg.is_active(&identity(1)));
        assert!(!reg.is_active(&identity(2)));
    }

    #[test]
    fn vote_verification_uses_member_key() {
        let kp = KeyPair::from_secret_bytes([3; 32]);
        let mut reg = StaticRegistry::new();
        reg.insert(identity(1), kp.public_key());

        let sig = kp.sign(b"vote");
        assert!(reg.verify_vote(&identity(1), b"vote", &sig));
        assert!(!reg.verify_vote(&identity(1), b"other", &sig));
        assert!(!reg.verify_vote(&identity(2), b"vote", &sig));
    }

    #[test]
    fn remove_deactivates() {
        let kp = KeyPair::from_secret_bytes([3; 32]);
        let mut reg = StaticRegistry::new();
        reg.insert(identity(1), kp.public_key());
        reg.remove(&identity(1));
        assert!(!reg.is_active(&identity(1)));
        assert!(reg.is_empty());
    }
}
