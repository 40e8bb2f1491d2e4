//! ZKHU notes: the shielded staking record, its 512-byte memo codec, and
//! the append-only note commitment tree.
//!
//! A note is created by STAKE, accrues yield per-note via the daily yield
//! engine, and is consumed by UNSTAKE. The record is retained (with
//! `spent = true`) after UNSTAKE so the exact bonus remains available to
//! the disconnect path.
//!
//! BLAKE3 tree hashing is domain-separated:
//! - Leaf: `BLAKE3(0x00 || cm)`
//! - Internal node: `BLAKE3(0x01 || left || right)`
//!
//! Odd layers duplicate their last element; the empty tree anchors at
//! [`Hash256::ZERO`].

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::constants::{MATURITY, MAX_MONEY, MEMO_SIZE};
use crate::error::RejectReason;
use crate::types::{Amount, Hash256};

/// Domain separation prefix for leaf hashes.
const LEAF_PREFIX: u8 = 0x00;

/// Domain separation prefix for internal node hashes.
const NODE_PREFIX: u8 = 0x01;

/// A shielded staking note, keyed by its commitment `cm`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Note {
    /// Principal in sats.
    pub amount: Amount,
    /// Height at which STAKE was applied.
    pub stake_start_height: u32,
    /// Per-note accumulated yield. Grows monotonically with each daily
    /// pass; NOT a global-snapshot delta.
    pub ur_accumulated: Amount,
    /// Unique spender tag, proven consistent with the note by the
    /// shielded proof.
    pub nullifier: Hash256,
    /// Note commitment, appended to the commitment tree.
    pub cm: Hash256,
    /// True once UNSTAKE consumed the note.
    pub spent: bool,
}

impl Note {
    /// Bonus materialised at UNSTAKE.
    pub fn bonus(&self) -> Amount {
        self.ur_accumulated
    }

    /// Whether the note may be unstaked at `height`.
    pub fn is_mature(&self, height: u32) -> bool {
        height.saturating_sub(self.stake_start_height) >= MATURITY
    }
}

/// Decoded contents of a ZKHU memo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoFields {
    pub stake_start_height: u32,
    pub amount: Amount,
    pub ur_accumulated: Amount,
}

/// The 512-byte Sapling memo attached to every ZKHU note.
///
/// Layout: `"ZKHU" || version(1) || stake_start_height(u32 LE) ||
/// amount(i64 LE) || ur_accumulated(i64 LE) || zero padding`.
#[derive(Clone, bincode::Encode, bincode::Decode)]
pub struct Memo(pub [u8; MEMO_SIZE]);

impl Memo {
    pub const MAGIC: [u8; 4] = *b"ZKHU";
    pub const VERSION: u8 = 1;
    /// Bytes of meaningful payload before the zero padding.
    const HEADER: usize = 4 + 1 + 4 + 8 + 8;

    /// Encode note fields into a fresh memo.
    pub fn encode(fields: &MemoFields) -> Self {
        let mut data = [0u8; MEMO_SIZE];
        data[0..4].copy_from_slice(&Self::MAGIC);
        data[4] = Self::VERSION;
        data[5..9].copy_from_slice(&fields.stake_start_height.to_le_bytes());
        data[9..17].copy_from_slice(&fields.amount.to_le_bytes());
        data[17..25].copy_from_slice(&fields.ur_accumulated.to_le_bytes());
        Self(data)
    }

    /// Decode and validate a memo.
    ///
    /// Rejects wrong magic or version, non-zero padding, and out-of-range
    /// amounts.
    pub fn decode(&self) -> Result<MemoFields, RejectReason> {
        if self.0[0..4] != Self::MAGIC || self.0[4] != Self::VERSION {
            return Err(RejectReason::InvalidMemo);
        }
        if self.0[Self::HEADER..].iter().any(|b| *b != 0) {
            return Err(RejectReason::InvalidMemo);
        }
        let mut h = [0u8; 4];
        h.copy_from_slice(&self.0[5..9]);
        let mut a = [0u8; 8];
        a.copy_from_slice(&self.0[9..17]);
        let mut ur = [0u8; 8];
        ur.copy_from_slice(&self.0[17..25]);

        let amount = i64::from_le_bytes(a);
        let ur_accumulated = i64::from_le_bytes(ur);
        if amount <= 0 || amount > MAX_MONEY || ur_accumulated < 0 {
            return Err(RejectReason::InvalidMemo);
        }
        Ok(MemoFields {
            stake_start_height: u32::from_le_bytes(h),
            amount,
            ur_accumulated,
        })
    }
}

impl fmt::Debug for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Memo({}..)", hex::encode(&self.0[..8]))
    }
}

impl PartialEq for Memo {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl Eq for Memo {}

impl Default for Memo {
    fn default() -> Self {
        Self([0u8; MEMO_SIZE])
    }
}

impl Serialize for Memo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Memo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MemoVisitor;
        impl<'de> Visitor<'de> for MemoVisitor {
            type Value = Memo;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{MEMO_SIZE} memo bytes")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Memo, E> {
                if v.len() != MEMO_SIZE {
                    return Err(E::invalid_length(v.len(), &self));
                }
                let mut data = [0u8; MEMO_SIZE];
                data.copy_from_slice(v);
                Ok(Memo(data))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Memo, A::Error> {
                let mut data = [0u8; MEMO_SIZE];
                for (i, slot) in data.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(Memo(data))
            }
        }
        deserializer.deserialize_bytes(MemoVisitor)
    }
}

/// The shielded output carried by a STAKE transaction.
///
/// The proof itself is verified by the enclosing validator; the core
/// consumes only the commitment, the declared nullifier, and the memo.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct ShieldedOutput {
    pub cm: Hash256,
    pub nullifier: Hash256,
    pub memo: Memo,
}

/// The shielded spend carried by an UNSTAKE transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct ShieldedSpend {
    pub nullifier: Hash256,
    /// Tree anchor the spend proof was built against.
    pub anchor: Hash256,
    /// Opaque zero-knowledge proof blob.
    pub proof: Vec<u8>,
    /// Value commitment, opaque to the core.
    pub cv: Hash256,
    /// Randomised verification key, opaque to the core.
    pub rk: Hash256,
}

/// Append-only BLAKE3 Merkle tree over note commitments.
///
/// `root()` is the anchor. [`truncate_last`](Self::truncate_last) exists
/// solely for the STAKE undo path; anchors for earlier tree states stay
/// valid because the store keeps one tree snapshot per anchor.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct NoteCommitmentTree {
    leaves: Vec<Hash256>,
}

impl NoteCommitmentTree {
    pub fn new() -> Self {
        Self { leaves: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Append a note commitment.
    pub fn append(&mut self, cm: Hash256) {
        self.leaves.push(cm);
    }

    /// Last appended commitment, if any.
    pub fn last(&self) -> Option<&Hash256> {
        self.leaves.last()
    }

    /// Remove the most recently appended commitment.
    pub fn truncate_last(&mut self) -> Option<Hash256> {
        self.leaves.pop()
    }

    /// Current anchor. [`Hash256::ZERO`] for the empty tree.
    pub fn root(&self) -> Hash256 {
        if self.leaves.is_empty() {
            return Hash256::ZERO;
        }
        let mut current: Vec<Hash256> = self.leaves.iter().map(leaf_hash).collect();
        while current.len() > 1 {
            current = next_layer(&current);
        }
        current[0]
    }
}

/// Domain-separated leaf hash: `BLAKE3(0x00 || cm)`.
fn leaf_hash(cm: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(cm.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Domain-separated internal node hash: `BLAKE3(0x01 || left || right)`.
fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Pair adjacent hashes, duplicating the last element on odd layers.
fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() { &layer[i + 1] } else { left };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}
