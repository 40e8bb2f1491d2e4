//! Keyed-store interfaces and their in-memory implementations.
//!
//! Each logical store (state, notes, commitments, DOMC records) is a
//! trait; the engine depends on the traits, never on a concrete backend.
//! The in-memory implementations back the test suites and double as the
//! reference semantics for the RocksDB backend.
//!
//! All writes for a single block must be atomic from the perspective of
//! readers: the engine brackets block processing with
//! [`KhuStores::begin_block`] / [`commit_block`](KhuStores::commit_block) /
//! [`abort_block`](KhuStores::abort_block).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::coins::{KhuCoin, KhuCoinsView, MemoryCoins};
use crate::error::{FatalReason, KhuError, StoreError};
use crate::note::{Note, NoteCommitmentTree};
use crate::state::State;
use crate::types::{DomcCommit, DomcReveal, Hash256, KhuBlock, OutPoint, StateCommitment};

/// Per-block undo journal: coins consumed by the block's transactions, in
/// the order they were spent. Created coins are re-derived from the block
/// itself on disconnect.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct BlockUndo {
    pub spent_coins: Vec<(OutPoint, KhuCoin)>,
}

/// Pre-finalize governance rates, journaled at each DOMC cycle boundary
/// so a boundary block can be disconnected exactly.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct RateUndo {
    pub r_annual: u16,
    pub r_max_dynamic: u16,
}

/// Per-height state records plus the block/undo data needed to reverse them.
pub trait StateStore: Send + Sync {
    fn write_state(&mut self, state: &State) -> Result<(), StoreError>;
    fn read_state(&self, height: u32) -> Result<Option<State>, StoreError>;
    fn erase_state(&mut self, height: u32) -> Result<(), StoreError>;

    fn write_block(&mut self, block: &KhuBlock) -> Result<(), StoreError>;
    fn read_block(&self, height: u32) -> Result<Option<KhuBlock>, StoreError>;
    fn erase_block(&mut self, height: u32) -> Result<(), StoreError>;

    fn write_block_undo(&mut self, height: u32, undo: &BlockUndo) -> Result<(), StoreError>;
    fn read_block_undo(&self, height: u32) -> Result<Option<BlockUndo>, StoreError>;
    fn erase_block_undo(&mut self, height: u32) -> Result<(), StoreError>;

    /// Height of the newest persisted state, `None` before activation.
    fn best_height(&self) -> Result<Option<u32>, StoreError>;
    fn set_best_height(&mut self, height: u32) -> Result<(), StoreError>;
}

/// ZKHU notes, nullifier spent-set, nullifier lookups, and tree anchors.
pub trait NoteStore: Send + Sync {
    fn write_note(&mut self, note: &Note) -> Result<(), StoreError>;
    fn read_note(&self, cm: &Hash256) -> Result<Option<Note>, StoreError>;
    fn erase_note(&mut self, cm: &Hash256) -> Result<(), StoreError>;

    /// Streaming pass over every note, in commitment order. The visitor
    /// returns whether it mutated the note; mutated notes are written
    /// back. The note set must never be loaded wholesale.
    fn update_notes(
        &mut self,
        visit: &mut dyn FnMut(&mut Note) -> Result<bool, FatalReason>,
    ) -> Result<(), KhuError>;

    fn mark_nullifier_spent(&mut self, nullifier: &Hash256) -> Result<(), StoreError>;
    fn is_nullifier_spent(&self, nullifier: &Hash256) -> Result<bool, StoreError>;
    fn clear_nullifier(&mut self, nullifier: &Hash256) -> Result<(), StoreError>;

    /// `nullifier -> cm` lookup recorded at STAKE, consumed by UNSTAKE.
    fn write_nullifier_link(&mut self, nullifier: &Hash256, cm: &Hash256) -> Result<(), StoreError>;
    fn read_nullifier_link(&self, nullifier: &Hash256) -> Result<Option<Hash256>, StoreError>;
    fn erase_nullifier_link(&mut self, nullifier: &Hash256) -> Result<(), StoreError>;

    fn write_anchor(&mut self, anchor: &Hash256, tree: &NoteCommitmentTree) -> Result<(), StoreError>;
    fn read_anchor(&self, anchor: &Hash256) -> Result<Option<NoteCommitmentTree>, StoreError>;
    fn erase_anchor(&mut self, anchor: &Hash256) -> Result<(), StoreError>;

    /// Anchor of the live tree; [`Hash256::ZERO`] when the tree is empty.
    fn current_anchor(&self) -> Result<Hash256, StoreError>;
    fn set_current_anchor(&mut self, anchor: &Hash256) -> Result<(), StoreError>;
}

/// Quorum-signed state commitments and the finality watermark.
///
/// Commitments at or below the latest finalized height are immutable;
/// attempts to overwrite or erase them fail with [`StoreError::Immutable`].
pub trait CommitmentStore: Send + Sync {
    fn write_commitment(&mut self, commitment: &StateCommitment) -> Result<(), StoreError>;
    fn read_commitment(&self, height: u32) -> Result<Option<StateCommitment>, StoreError>;
    fn have_commitment(&self, height: u32) -> Result<bool, StoreError> {
        Ok(self.read_commitment(height)?.is_some())
    }
    fn erase_commitment(&mut self, height: u32) -> Result<(), StoreError>;

    fn latest_finalized_height(&self) -> Result<Option<u32>, StoreError>;
    fn set_latest_finalized_height(&mut self, height: u32) -> Result<(), StoreError>;
}

/// DOMC commits, reveals, and the per-boundary rate undo journal.
///
/// Reveals are stacked per `(cycle, identity)`: an in-phase supersession
/// pushes, its undo pops, and the live reveal is the top of the stack.
pub trait DomcStore: Send + Sync {
    fn write_commit(&mut self, commit: &DomcCommit) -> Result<(), StoreError>;
    fn read_commit(&self, cycle_id: u32, identity: &OutPoint) -> Result<Option<DomcCommit>, StoreError>;
    fn erase_commit(&mut self, cycle_id: u32, identity: &OutPoint) -> Result<(), StoreError>;

    fn push_reveal(&mut self, reveal: &DomcReveal) -> Result<(), StoreError>;
    fn live_reveal(&self, cycle_id: u32, identity: &OutPoint) -> Result<Option<DomcReveal>, StoreError>;
    fn pop_reveal(&mut self, cycle_id: u32, identity: &OutPoint) -> Result<Option<DomcReveal>, StoreError>;

    /// Live reveal of every identity that voted in `cycle_id`, in
    /// identity order.
    fn reveals_for_cycle(&self, cycle_id: u32) -> Result<Vec<DomcReveal>, StoreError>;

    fn write_rate_undo(&mut self, boundary_height: u32, undo: &RateUndo) -> Result<(), StoreError>;
    fn read_rate_undo(&self, boundary_height: u32) -> Result<Option<RateUndo>, StoreError>;
    fn erase_rate_undo(&mut self, boundary_height: u32) -> Result<(), StoreError>;
}

/// Split borrow over every store, handed to the block pipeline.
pub struct StoresMut<'a> {
    pub state: &'a mut dyn StateStore,
    pub notes: &'a mut dyn NoteStore,
    pub coins: &'a mut dyn KhuCoinsView,
    pub commitments: &'a mut dyn CommitmentStore,
    pub domc: &'a mut dyn DomcStore,
}

/// The bundle of stores the engine owns, with per-block atomicity.
pub trait KhuStores: Send + Sync {
    fn split(&mut self) -> StoresMut<'_>;

    fn state(&self) -> &dyn StateStore;
    fn notes(&self) -> &dyn NoteStore;
    fn coins(&self) -> &dyn KhuCoinsView;
    fn commitments(&self) -> &dyn CommitmentStore;
    fn domc(&self) -> &dyn DomcStore;

    /// Open the per-block write scope.
    fn begin_block(&mut self) -> Result<(), StoreError>;
    /// Atomically publish everything written since `begin_block`.
    fn commit_block(&mut self) -> Result<(), StoreError>;
    /// Discard everything written since `begin_block`.
    fn abort_block(&mut self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------

/// In-memory state store for tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryStateStore {
    states: BTreeMap<u32, State>,
    blocks: BTreeMap<u32, KhuBlock>,
    undos: BTreeMap<u32, BlockUndo>,
    best: Option<u32>,
}

impl StateStore for MemoryStateStore {
    fn write_state(&mut self, state: &State) -> Result<(), StoreError> {
        self.states.insert(state.height, state.clone());
        Ok(())
    }

    fn read_state(&self, height: u32) -> Result<Option<State>, StoreError> {
        Ok(self.states.get(&height).cloned())
    }

    fn erase_state(&mut self, height: u32) -> Result<(), StoreError> {
        self.states.remove(&height);
        Ok(())
    }

    fn write_block(&mut self, block: &KhuBlock) -> Result<(), StoreError> {
        self.blocks.insert(block.height, block.clone());
        Ok(())
    }

    fn read_block(&self, height: u32) -> Result<Option<KhuBlock>, StoreError> {
        Ok(self.blocks.get(&height).cloned())
    }

    fn erase_block(&mut self, height: u32) -> Result<(), StoreError> {
        self.blocks.remove(&height);
        Ok(())
    }

    fn write_block_undo(&mut self, height: u32, undo: &BlockUndo) -> Result<(), StoreError> {
        self.undos.insert(height, undo.clone());
        Ok(())
    }

    fn read_block_undo(&self, height: u32) -> Result<Option<BlockUndo>, StoreError> {
        Ok(self.undos.get(&height).cloned())
    }

    fn erase_block_undo(&mut self, height: u32) -> Result<(), StoreError> {
        self.undos.remove(&height);
        Ok(())
    }

    fn best_height(&self) -> Result<Option<u32>, StoreError> {
        Ok(self.best)
    }

    fn set_best_height(&mut self, height: u32) -> Result<(), StoreError> {
        self.best = Some(height);
        Ok(())
    }
}

/// In-memory note store for tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryNoteStore {
    notes: BTreeMap<Hash256, Note>,
    spent_nullifiers: BTreeSet<Hash256>,
    links: BTreeMap<Hash256, Hash256>,
    anchors: BTreeMap<Hash256, NoteCommitmentTree>,
    current_anchor: Hash256,
}

impl MemoryNoteStore {
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }
}

impl NoteStore for MemoryNoteStore {
    fn write_note(&mut self, note: &Note) -> Result<(), StoreError> {
        self.notes.insert(note.cm, note.clone());
        Ok(())
    }

    fn read_note(&self, cm: &Hash256) -> Result<Option<Note>, StoreError> {
        Ok(self.notes.get(cm).cloned())
    }

    fn erase_note(&mut self, cm: &Hash256) -> Result<(), StoreError> {
        self.notes.remove(cm);
        Ok(())
    }

    fn update_notes(
        &mut self,
        visit: &mut dyn FnMut(&mut Note) -> Result<bool, FatalReason>,
    ) -> Result<(), KhuError> {
        for note in self.notes.values_mut() {
            visit(note)?;
        }
        Ok(())
    }

    fn mark_nullifier_spent(&mut self, nullifier: &Hash256) -> Result<(), StoreError> {
        self.spent_nullifiers.insert(*nullifier);
        Ok(())
    }

    fn is_nullifier_spent(&self, nullifier: &Hash256) -> Result<bool, StoreError> {
        Ok(self.spent_nullifiers.contains(nullifier))
    }

    fn clear_nullifier(&mut self, nullifier: &Hash256) -> Result<(), StoreError> {
        self.spent_nullifiers.remove(nullifier);
        Ok(())
    }

    fn write_nullifier_link(&mut self, nullifier: &Hash256, cm: &Hash256) -> Result<(), StoreError> {
        self.links.insert(*nullifier, *cm);
        Ok(())
    }

    fn read_nullifier_link(&self, nullifier: &Hash256) -> Result<Option<Hash256>, StoreError> {
        Ok(self.links.get(nullifier).copied())
    }

    fn erase_nullifier_link(&mut self, nullifier: &Hash256) -> Result<(), StoreError> {
        self.links.remove(nullifier);
        Ok(())
    }

    fn write_anchor(&mut self, anchor: &Hash256, tree: &NoteCommitmentTree) -> Result<(), StoreError> {
        self.anchors.insert(*anchor, tree.clone());
        Ok(())
    }

    fn read_anchor(&self, anchor: &Hash256) -> Result<Option<NoteCommitmentTree>, StoreError> {
        Ok(self.anchors.get(anchor).cloned())
    }

    fn erase_anchor(&mut self, anchor: &Hash256) -> Result<(), StoreError> {
        self.anchors.remove(anchor);
        Ok(())
    }

    fn current_anchor(&self) -> Result<Hash256, StoreError> {
        Ok(self.current_anchor)
    }

    fn set_current_anchor(&mut self, anchor: &Hash256) -> Result<(), StoreError> {
        self.current_anchor = *anchor;
        Ok(())
    }
}

/// In-memory commitment store for tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryCommitmentStore {
    commitments: BTreeMap<u32, StateCommitment>,
    finalized: Option<u32>,
}

impl MemoryCommitmentStore {
    fn assert_mutable(&self, height: u32) -> Result<(), StoreError> {
        match self.finalized {
            Some(f) if height <= f => Err(StoreError::Immutable(height)),
            _ => Ok(()),
        }
    }
}

impl CommitmentStore for MemoryCommitmentStore {
    fn write_commitment(&mut self, commitment: &StateCommitment) -> Result<(), StoreError> {
        self.assert_mutable(commitment.height)?;
        self.commitments.insert(commitment.height, commitment.clone());
        Ok(())
    }

    fn read_commitment(&self, height: u32) -> Result<Option<StateCommitment>, StoreError> {
        Ok(self.commitments.get(&height).cloned())
    }

    fn erase_commitment(&mut self, height: u32) -> Result<(), StoreError> {
        self.assert_mutable(height)?;
        self.commitments.remove(&height);
        Ok(())
    }

    fn latest_finalized_height(&self) -> Result<Option<u32>, StoreError> {
        Ok(self.finalized)
    }

    fn set_latest_finalized_height(&mut self, height: u32) -> Result<(), StoreError> {
        self.finalized = Some(self.finalized.map_or(height, |f| f.max(height)));
        Ok(())
    }
}

/// In-memory DOMC store for tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryDomcStore {
    commits: BTreeMap<(u32, OutPoint), DomcCommit>,
    reveals: BTreeMap<(u32, OutPoint), Vec<DomcReveal>>,
    rate_undos: BTreeMap<u32, RateUndo>,
}

impl DomcStore for MemoryDomcStore {
    fn write_commit(&mut self, commit: &DomcCommit) -> Result<(), StoreError> {
        self.commits.insert((commit.cycle_id, commit.identity), commit.clone());
        Ok(())
    }

    fn read_commit(&self, cycle_id: u32, identity: &OutPoint) -> Result<Option<DomcCommit>, StoreError> {
        Ok(self.commits.get(&(cycle_id, *identity)).cloned())
    }

    fn erase_commit(&mut self, cycle_id: u32, identity: &OutPoint) -> Result<(), StoreError> {
        self.commits.remove(&(cycle_id, *identity));
        Ok(())
    }

    fn push_reveal(&mut self, reveal: &DomcReveal) -> Result<(), StoreError> {
        self.reveals
            .entry((reveal.cycle_id, reveal.identity))
            .or_default()
            .push(reveal.clone());
        Ok(())
    }

    fn live_reveal(&self, cycle_id: u32, identity: &OutPoint) -> Result<Option<DomcReveal>, StoreError> {
        Ok(self
            .reveals
            .get(&(cycle_id, *identity))
            .and_then(|stack| stack.last().cloned()))
    }

    fn pop_reveal(&mut self, cycle_id: u32, identity: &OutPoint) -> Result<Option<DomcReveal>, StoreError> {
        let key = (cycle_id, *identity);
        let Some(stack) = self.reveals.get_mut(&key) else {
            return Ok(None);
        };
        let popped = stack.pop();
        if stack.is_empty() {
            self.reveals.remove(&key);
        }
        Ok(popped)
    }

    fn reveals_for_cycle(&self, cycle_id: u32) -> Result<Vec<DomcReveal>, StoreError> {
        Ok(self
            .reveals
            .range((cycle_id, OutPoint::new(Hash256::ZERO, 0))..)
            .take_while(|((cycle, _), _)| *cycle == cycle_id)
            .filter_map(|(_, stack)| stack.last().cloned())
            .collect())
    }

    fn write_rate_undo(&mut self, boundary_height: u32, undo: &RateUndo) -> Result<(), StoreError> {
        self.rate_undos.insert(boundary_height, *undo);
        Ok(())
    }

    fn read_rate_undo(&self, boundary_height: u32) -> Result<Option<RateUndo>, StoreError> {
        Ok(self.rate_undos.get(&boundary_height).copied())
    }

    fn erase_rate_undo(&mut self, boundary_height: u32) -> Result<(), StoreError> {
        self.rate_undos.remove(&boundary_height);
        Ok(())
    }
}

/// The full in-memory store bundle.
///
/// Per-block atomicity is a whole-bundle snapshot: cheap at test scale,
/// and the reference behavior the RocksDB write-batch must match.
#[derive(Clone, Debug, Default)]
pub struct MemoryStores {
    pub state: MemoryStateStore,
    pub notes: MemoryNoteStore,
    pub coins: MemoryCoins,
    pub commitments: MemoryCommitmentStore,
    pub domc: MemoryDomcStore,
    snapshot: Option<Box<MemoryStores>>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KhuStores for MemoryStores {
    fn split(&mut self) -> StoresMut<'_> {
        StoresMut {
            state: &mut self.state,
            notes: &mut self.notes,
            coins: &mut self.coins,
            commitments: &mut self.commitments,
            domc: &mut self.domc,
        }
    }

    fn state(&self) -> &dyn StateStore {
        &self.state
    }

    fn notes(&self) -> &dyn NoteStore {
        &self.notes
    }

    fn coins(&self) -> &dyn KhuCoinsView {
        &self.coins
    }

    fn commitments(&self) -> &dyn CommitmentStore {
        &self.commitments
    }

    fn domc(&self) -> &dyn DomcStore {
        &self.domc
    }

    fn begin_block(&mut self) -> Result<(), StoreError> {
        let mut snap = self.clone();
        snap.snapshot = None;
        self.snapshot = Some(Box::new(snap));
        Ok(())
    }

    fn commit_block(&mut self) -> Result<(), StoreError> {
        self.snapshot = None;
        Ok(())
    }

    fn abort_block(&mut self) -> Result<(), StoreError> {
        if let Some(snap) = self.snapshot.take() {
            *self = *snap;
        }
        Ok(())
    }
}
