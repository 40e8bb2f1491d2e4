//! Error types for the KHU protocol.
use thiserror::Error;

/// Per-transaction validation rejection. The transaction is refused and
/// global state is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("wrong transaction type")] WrongTxType,
    #[error("invalid amount: {0}")] InvalidAmount(i64),
    #[error("invalid destination")] InvalidDestination,
    #[error("unknown KHU input: {0}")] UnknownInput(String),
    #[error("input is staked: {0}")] InputStaked(String),
    #[error("insufficient KHU_T: have {have}, need {need}")] InsufficientFunds { have: i64, need: i64 },
    #[error("output amount mismatch: expected {expected}, got {got}")] OutputAmountMismatch { expected: i64, got: i64 },
    #[error("insufficient collateral: C={c} U={u} amount={amount}")] InsufficientCollateral { c: i64, u: i64, amount: i64 },
    #[error("missing shielded output")] MissingShieldedOutput,
    #[error("missing shielded spend")] MissingShieldedSpend,
    #[error("invalid note memo")] InvalidMemo,
    #[error("shielded proof rejected")] ProofInvalid,
    #[error("unknown anchor")] AnchorUnknown,
    #[error("unknown note commitment")] NoteUnknown,
    #[error("duplicate note commitment")] DuplicateNote,
    #[error("note already spent")] NoteSpent,
    #[error("nullifier already spent")] NullifierSpent,
    #[error("nullifier does not match note")] NullifierMismatch,
    #[error("maturity not reached: staked at {start}, height {height}")] MaturityNotReached { start: u32, height: u32 },
    #[error("negative bonus")] NegativeBonus,
    #[error("insufficient reward pool: Cr={cr} Ur={ur} bonus={bonus}")] InsufficientCr { cr: i64, ur: i64, bonus: i64 },
    #[error("money range exceeded")] MoneyRange,
    #[error("masternode not active")] MasternodeInactive,
    #[error("bad vote signature")] BadVoteSignature,
    #[error("vote outside phase window at height {0}")] OutsidePhaseWindow(u32),
    #[error("wrong cycle id: expected {expected}, got {got}")] WrongCycleId { expected: u32, got: u32 },
    #[error("wrong vote height: {0}")] WrongVoteHeight(u32),
    #[error("duplicate vote in cycle")] DuplicateVote,
    #[error("no matching commit")] NoMatchingCommit,
    #[error("reveal does not match committed hash")] CommitMismatch,
    #[error("proposal out of range: {0} bp")] ProposalOutOfRange(u16),
    #[error("quorum insufficient: {signed}/{total}")] QuorumInsufficient { signed: usize, total: usize },
    #[error("commitment hash mismatch at height {0}")] CommitmentHashMismatch(u32),
    #[error("commitment height mismatch: {got} != {expected}")] CommitmentHeightMismatch { expected: u32, got: u32 },
    #[error("aggregate signature invalid")] AggregateSigInvalid,
    #[error("serialization: {0}")] Serialization(String),
}

/// Block-level fatal error. The enclosing driver must discard the block;
/// stores roll back to their pre-block snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FatalReason {
    #[error("invariants violated at height {height}: C={c} U={u} Z={z} Cr={cr} Ur={ur} T={t}")]
    InvariantViolation { height: u32, c: i64, u: i64, z: i64, cr: i64, ur: i64, t: i64 },
    #[error("amount overflow")] AmountOverflow,
    #[error("height mismatch: expected {expected}, got {got}")] HeightMismatch { expected: u32, got: u32 },
    #[error("state missing at height {0}")] StateMissing(u32),
    #[error("state hash chain broken at height {0}")] StateChainBroken(u32),
    #[error("yield undo checksum mismatch: recomputed {recomputed}, recorded {recorded}")]
    YieldChecksumMismatch { recomputed: i64, recorded: i64 },
    #[error("disconnect did not restore prior state at height {0}")] UndoMismatch(u32),
    #[error("undo data missing: {0}")] UndoDataMissing(String),
    #[error("chain is empty below activation")] EmptyChain,
}

/// Reorg refusal, surfaced as fatal at the chain layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReorgReason {
    #[error("reorg depth {depth} exceeds finality depth {max}")] ReorgTooDeep { depth: u32, max: u32 },
    #[error("finalized commitment conflict at height {0}")] FinalityConflict(u32),
}

/// Persistence layer failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend: {0}")] Backend(String),
    #[error("codec: {0}")] Codec(String),
    #[error("finalized commitment is immutable at height {0}")] Immutable(u32),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KhuError {
    #[error(transparent)] Reject(#[from] RejectReason),
    #[error(transparent)] Fatal(#[from] FatalReason),
    #[error(transparent)] Reorg(#[from] ReorgReason),
    #[error(transparent)] Store(#[from] StoreError),
}
