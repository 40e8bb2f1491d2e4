//! Core protocol types: amounts, hashes, outpoints, typed KHU transactions.
//!
//! All monetary values are signed 64-bit sats (1 KHU = 10^8 sats); any
//! intermediate arithmetic widens to `i128` and narrows back through
//! [`checked_amount`], the single overflow choke-point.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::MAX_MONEY;
use crate::error::{FatalReason, RejectReason};
use crate::note::{ShieldedOutput, ShieldedSpend};

/// Monetary quantity in sats. Signed so that underflow is detectable
/// rather than wrapping.
pub type Amount = i64;

/// Narrow a widened intermediate back to an [`Amount`].
///
/// Rejects negative values and values above [`MAX_MONEY`]. Every monetary
/// computation in the crate funnels through here.
pub fn checked_amount(value: i128) -> Result<Amount, FatalReason> {
    if value < 0 || value > MAX_MONEY as i128 {
        return Err(FatalReason::AmountOverflow);
    }
    Ok(value as Amount)
}

/// `a + b` with the money-range check applied.
pub fn add_amounts(a: Amount, b: Amount) -> Result<Amount, FatalReason> {
    checked_amount(a as i128 + b as i128)
}

/// `a - b` with the money-range check applied (negative results are fatal).
pub fn sub_amounts(a: Amount, b: Amount) -> Result<Amount, FatalReason> {
    checked_amount(a as i128 - b as i128)
}

/// A 32-byte hash value.
///
/// Used for block hashes, transaction ids, note commitments, nullifiers,
/// anchors, and state hashes.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Marks "no anchor" and unset linkage fields.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a specific output of a previous transaction.
///
/// Doubles as the masternode identity key in governance messages
/// (the collateral outpoint identifies the masternode).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    pub txid: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, index: u32) -> Self {
        Self { txid, index }
    }

    /// Fixed-layout encoding used inside signing messages and store keys.
    pub fn to_key_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(self.txid.as_bytes());
        out[32..].copy_from_slice(&self.index.to_le_bytes());
        out
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transparent transaction output.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in sats.
    pub value: Amount,
    /// Hash of the recipient's public key.
    pub dest: Hash256,
}

/// One-byte transaction type tag carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[repr(u8)]
pub enum TxType {
    Mint = 0,
    Redeem = 1,
    Stake = 2,
    Unstake = 3,
    DomcCommit = 4,
    DomcReveal = 5,
}

impl TxType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Mint),
            1 => Some(Self::Redeem),
            2 => Some(Self::Stake),
            3 => Some(Self::Unstake),
            4 => Some(Self::DomcCommit),
            5 => Some(Self::DomcReveal),
            _ => None,
        }
    }
}

/// MINT: lock `amount` of collateral, create `amount` of transparent supply.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct MintPayload {
    pub amount: Amount,
    pub dest: Hash256,
}

/// REDEEM: burn `amount` of transparent supply, release its collateral.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct RedeemPayload {
    pub amount: Amount,
    pub dest: Hash256,
}

/// STAKE: convert a transparent KHU_T coin into a shielded ZKHU note.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct StakePayload {
    /// Declared principal; must equal the spent coin value and the memo amount.
    pub amount: Amount,
}

/// UNSTAKE: consume a ZKHU note, release principal plus accumulated bonus.
///
/// Carries `cm` explicitly: the shielded nullifier derivation differs from
/// the note-store lookup key.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct UnstakePayload {
    pub cm: Hash256,
}

/// Masternode commit for an R% vote: publishes `hash(r_proposal || salt)`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct DomcCommit {
    pub commit_hash: Hash256,
    /// Masternode collateral outpoint (identity).
    pub identity: OutPoint,
    /// Cycle id (= cycle start height).
    pub cycle_id: u32,
    pub commit_height: u32,
    pub sig: Vec<u8>,
}

impl DomcCommit {
    /// Fixed-layout message the masternode signs.
    pub fn signing_message(&self) -> Vec<u8> {
        let mut msg = Vec::with_capacity(1 + 32 + 36 + 4 + 4);
        msg.push(TxType::DomcCommit.as_u8());
        msg.extend_from_slice(self.commit_hash.as_bytes());
        msg.extend_from_slice(&self.identity.to_key_bytes());
        msg.extend_from_slice(&self.cycle_id.to_le_bytes());
        msg.extend_from_slice(&self.commit_height.to_le_bytes());
        msg
    }
}

/// Masternode reveal for an R% vote: `(r_proposal, salt)` matching a prior commit.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct DomcReveal {
    /// Proposed annual rate in basis points.
    pub r_proposal: u16,
    pub salt: Hash256,
    pub identity: OutPoint,
    pub cycle_id: u32,
    pub reveal_height: u32,
    pub sig: Vec<u8>,
}

impl DomcReveal {
    /// `blake3(r_proposal_le || salt)`; must equal the committed hash.
    pub fn commit_hash(r_proposal: u16, salt: &Hash256) -> Hash256 {
        let mut data = [0u8; 2 + 32];
        data[..2].copy_from_slice(&r_proposal.to_le_bytes());
        data[2..].copy_from_slice(salt.as_bytes());
        Hash256(blake3::hash(&data).into())
    }

    /// Fixed-layout message the masternode signs.
    pub fn signing_message(&self) -> Vec<u8> {
        let mut msg = Vec::with_capacity(1 + 2 + 32 + 36 + 4 + 4);
        msg.push(TxType::DomcReveal.as_u8());
        msg.extend_from_slice(&self.r_proposal.to_le_bytes());
        msg.extend_from_slice(self.salt.as_bytes());
        msg.extend_from_slice(&self.identity.to_key_bytes());
        msg.extend_from_slice(&self.cycle_id.to_le_bytes());
        msg.extend_from_slice(&self.reveal_height.to_le_bytes());
        msg
    }
}

/// Quorum-signed commitment to the bonded-monetary subset of a state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct StateCommitment {
    pub height: u32,
    /// `H(C || U || Cr || Ur || height)`, see [`State::commitment_hash`](crate::state::State::commitment_hash).
    pub state_hash: Hash256,
    /// Quorum identifier the aggregate signature was produced under.
    pub quorum_hash: Hash256,
    /// Aggregate BLS signature, opaque to the core.
    pub aggregate_sig: Vec<u8>,
    /// `signers[i]` is true when quorum member `i` signed.
    pub signers: Vec<bool>,
}

impl StateCommitment {
    /// Number of members that signed.
    pub fn signer_count(&self) -> usize {
        self.signers.iter().filter(|s| **s).count()
    }
}

/// Typed payload of a KHU transaction, one variant per wire tag.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum Payload {
    Mint(MintPayload),
    Redeem(RedeemPayload),
    Stake(StakePayload),
    Unstake(UnstakePayload),
    DomcCommit(DomcCommit),
    DomcReveal(DomcReveal),
}

impl Payload {
    pub fn tx_type(&self) -> TxType {
        match self {
            Payload::Mint(_) => TxType::Mint,
            Payload::Redeem(_) => TxType::Redeem,
            Payload::Stake(_) => TxType::Stake,
            Payload::Unstake(_) => TxType::Unstake,
            Payload::DomcCommit(_) => TxType::DomcCommit,
            Payload::DomcReveal(_) => TxType::DomcReveal,
        }
    }
}

/// A typed KHU transaction as consumed by the state engine.
///
/// The enclosing chain has already checked scripts and base-layer rules;
/// the core sees only the structured payload plus the transparent and
/// shielded plumbing it needs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct KhuTransaction {
    pub version: u32,
    /// Transparent KHU_T inputs being spent.
    pub inputs: Vec<OutPoint>,
    /// Transparent outputs created.
    pub outputs: Vec<TxOutput>,
    /// Present on STAKE: the new shielded note.
    pub shielded_output: Option<ShieldedOutput>,
    /// Present on UNSTAKE: the shielded spend being proven.
    pub shielded_spend: Option<ShieldedSpend>,
    pub payload: Payload,
}

impl KhuTransaction {
    /// Compute the transaction id (BLAKE3 hash of the canonical encoding).
    ///
    /// Uses bincode with standard config for deterministic serialization.
    pub fn txid(&self) -> Result<Hash256, RejectReason> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| RejectReason::Serialization(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }

    pub fn tx_type(&self) -> TxType {
        self.payload.tx_type()
    }

    /// First transparent output, where MINT/REDEEM/UNSTAKE pay out.
    pub fn output0(&self) -> Option<&TxOutput> {
        self.outputs.first()
    }
}

/// The KHU-relevant view of one connected block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct KhuBlock {
    pub height: u32,
    pub hash: Hash256,
    /// KHU-typed transactions in block order.
    pub txs: Vec<KhuTransaction>,
}

impl KhuBlock {
    /// A block carrying no KHU transactions (state still propagates).
    pub fn empty(height: u32, hash: Hash256) -> Self {
        Self { height, hash, txs: Vec::new() }
    }
}
