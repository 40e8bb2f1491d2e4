//! The block pipeline: ordered composition of every KHU effect, with
//! exact reversal on disconnect.
//!
//! A [`KhuEngine`] is the single owned value encapsulating the state
//! lock and every persistent store; all hooks are methods on it and
//! there is no process-wide mutable state. The enclosing chain drives it
//! from its one block-processing task; concurrent readers take the
//! shared side of the lock.
//!
//! Connect order (any failing step aborts the whole block and rolls the
//! stores back): copy previous state and set linkage; treasury accrual
//! at its boundary (on the initial `U + Ur`); DOMC finalize + rollover
//! at its boundary; per-transaction effects in block order; the daily
//! yield pass when due; invariant check; persist; finality bookkeeping.
//! Disconnect runs the exact reverse and then proves it restored the
//! previous state bit-for-bit.

use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

use khu_core::bonding::{apply_mint, apply_redeem, undo_mint, undo_redeem};
use khu_core::constants::FINALITY_DEPTH;
use khu_core::error::{FatalReason, KhuError, ReorgReason};
use khu_core::masternodes::{MasternodeRegistry, QuorumVerifier, ShieldedVerifier};
use khu_core::staking::{apply_stake, apply_unstake, undo_stake, undo_unstake};
use khu_core::state::State;
use khu_core::store::{BlockUndo, KhuStores};
use khu_core::types::{KhuBlock, Payload, StateCommitment};
use khu_yield::{
    accrue_treasury, apply_daily_yield, is_treasury_boundary, is_yield_due, undo_daily_yield,
    undo_treasury,
};

use crate::commitment;
use crate::domc;

/// Chain-level parameters the engine is constructed with.
#[derive(Clone, Copy, Debug, Default)]
pub struct Params {
    /// Height of V6 activation; the treasury, yield, and DOMC cycles are
    /// all anchored here.
    pub activation_height: u32,
}

/// The deterministic KHU state-transition engine.
pub struct KhuEngine<S: KhuStores> {
    stores: RwLock<S>,
    params: Params,
    masternodes: Arc<dyn MasternodeRegistry>,
    quorum: Arc<dyn QuorumVerifier>,
    shielded: Arc<dyn ShieldedVerifier>,
}

impl<S: KhuStores> KhuEngine<S> {
    /// Build the engine around its stores and external capabilities.
    ///
    /// On first use the activation base state is persisted so every
    /// later block has a predecessor to link against.
    pub fn new(
        mut stores: S,
        params: Params,
        masternodes: Arc<dyn MasternodeRegistry>,
        quorum: Arc<dyn QuorumVerifier>,
        shielded: Arc<dyn ShieldedVerifier>,
    ) -> Result<Self, KhuError> {
        if stores.state().best_height()?.is_none() {
            let base = State::activation_base(params.activation_height);
            stores.begin_block()?;
            let s = stores.split();
            s.state.write_state(&base)?;
            s.state.set_best_height(base.height)?;
            stores.commit_block()?;
            tracing::info!(height = base.height, "initialized KHU state at activation");
        }
        Ok(Self {
            stores: RwLock::new(stores),
            params,
            masternodes,
            quorum,
            shielded,
        })
    }

    /// Shared access to the stores for read-only queries.
    pub fn stores(&self) -> RwLockReadGuard<'_, S> {
        self.stores.read()
    }

    /// Tear the engine down and hand its stores back, e.g. to reopen
    /// them under a fresh engine instance.
    pub fn into_inner(self) -> S {
        self.stores.into_inner()
    }

    /// State at the current tip.
    pub fn current_state(&self) -> Result<Option<State>, KhuError> {
        let stores = self.stores.read();
        let Some(best) = stores.state().best_height()? else {
            return Ok(None);
        };
        Ok(stores.state().read_state(best)?)
    }

    /// Greatest height pinned by an accepted quorum commitment.
    pub fn latest_finalized_height(&self) -> Result<Option<u32>, KhuError> {
        Ok(self.stores.read().commitments().latest_finalized_height()?)
    }

    /// Connect the next block. Steps run in the fixed consensus order;
    /// any failure rolls every store back to the pre-block snapshot.
    pub fn connect_block(&self, block: &KhuBlock) -> Result<(), KhuError> {
        let mut stores = self.stores.write();
        let tip = stores
            .state()
            .best_height()?
            .ok_or(FatalReason::EmptyChain)?;
        if block.height != tip + 1 {
            return Err(FatalReason::HeightMismatch {
                expected: tip + 1,
                got: block.height,
            }
            .into());
        }
        let prev = stores
            .state()
            .read_state(tip)?
            .ok_or(FatalReason::StateMissing(tip))?;

        stores.begin_block()?;
        match self.connect_inner(&mut stores, block, &prev) {
            Ok(()) => {
                stores.commit_block()?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = stores.abort_block() {
                    tracing::error!(%abort_err, "store rollback failed after rejected block");
                }
                Err(e)
            }
        }
    }

    fn connect_inner(&self, stores: &mut S, block: &KhuBlock, prev: &State) -> Result<(), KhuError> {
        let s = stores.split();
        let height = block.height;
        let activation = self.params.activation_height;

        let mut state = prev.clone();
        state.height = height;
        state.block_hash = block.hash;
        state.prev_state_hash = prev.full_hash();

        // Treasury accrues before any per-tx effect, on the initial U + Ur.
        if is_treasury_boundary(height, activation) {
            accrue_treasury(&mut state, height)?;
        }

        // Finalize the elapsed DOMC cycle, then anchor the next one.
        if domc::is_cycle_boundary(height, activation) {
            domc::finalize_cycle(&mut state, s.domc, height)?;
            domc::initialize_cycle(&mut state, height, activation);
        }

        let mut undo = BlockUndo::default();
        for tx in &block.txs {
            match &tx.payload {
                Payload::Mint(_) => apply_mint(tx, &mut state, s.coins, height)?,
                Payload::Redeem(_) => apply_redeem(tx, &mut state, s.coins, &mut undo, height)?,
                Payload::Stake(_) => {
                    apply_stake(tx, &mut state, s.coins, s.notes, &mut undo, height)?
                }
                Payload::Unstake(_) => {
                    apply_unstake(tx, &mut state, s.coins, s.notes, &*self.shielded, height)?
                }
                Payload::DomcCommit(commit) => {
                    domc::check_commit(commit, &state, &*self.masternodes, s.domc, height)?;
                    domc::apply_commit(commit, s.domc)?;
                }
                Payload::DomcReveal(reveal) => {
                    domc::check_reveal(reveal, &state, &*self.masternodes, s.domc, height)?;
                    domc::apply_reveal(reveal, s.domc)?;
                }
            }
        }

        if is_yield_due(&state, height) {
            apply_daily_yield(&mut state, s.notes, height)?;
        }

        state.check_invariants()?;

        // A quorum may already have pinned this height from the network.
        commitment::check_reorg_conflict(s.commitments, height, &state.commitment_hash())?;

        s.state.write_state(&state)?;
        s.state.write_block(block)?;
        s.state.write_block_undo(height, &undo)?;
        s.state.set_best_height(height)?;

        tracing::debug!(
            height,
            txs = block.txs.len(),
            c = state.c,
            u = state.u,
            z = state.z,
            cr = state.cr,
            "connected KHU block"
        );
        Ok(())
    }

    /// Disconnect the tip block, restoring the previous state exactly.
    pub fn disconnect_block(&self) -> Result<(), KhuError> {
        let mut stores = self.stores.write();
        self.disconnect_tip_locked(&mut stores)
    }

    /// Unwind the chain down to `target` height.
    ///
    /// Refused outright when the reorg depth exceeds [`FINALITY_DEPTH`]
    /// or when it would cross the finalized watermark.
    pub fn disconnect_to(&self, target: u32) -> Result<(), KhuError> {
        let mut stores = self.stores.write();
        let tip = stores
            .state()
            .best_height()?
            .ok_or(FatalReason::EmptyChain)?;
        if target > tip {
            return Err(FatalReason::HeightMismatch { expected: tip, got: target }.into());
        }
        let depth = tip - target;
        if depth > FINALITY_DEPTH {
            return Err(ReorgReason::ReorgTooDeep { depth, max: FINALITY_DEPTH }.into());
        }
        // Rejected outright, before any block is unwound: a mid-loop
        // failure would already have persisted the disconnects above it.
        if let Some(finalized) = stores.commitments().latest_finalized_height()? {
            if finalized >= target {
                return Err(ReorgReason::FinalityConflict(finalized).into());
            }
        }
        while stores
            .state()
            .best_height()?
            .ok_or(FatalReason::EmptyChain)?
            > target
        {
            self.disconnect_tip_locked(&mut stores)?;
        }
        Ok(())
    }

    fn disconnect_tip_locked(&self, stores: &mut S) -> Result<(), KhuError> {
        let tip = stores
            .state()
            .best_height()?
            .ok_or(FatalReason::EmptyChain)?;
        if tip <= self.params.activation_height {
            return Err(FatalReason::EmptyChain.into());
        }
        if let Some(finalized) = stores.commitments().latest_finalized_height()? {
            if tip <= finalized {
                return Err(ReorgReason::FinalityConflict(tip).into());
            }
        }

        let current = stores
            .state()
            .read_state(tip)?
            .ok_or(FatalReason::StateMissing(tip))?;
        let prev = stores
            .state()
            .read_state(tip - 1)?
            .ok_or(FatalReason::StateMissing(tip - 1))?;
        let block = stores
            .state()
            .read_block(tip)?
            .ok_or_else(|| FatalReason::UndoDataMissing(format!("block {tip}")))?;
        let mut undo = stores
            .state()
            .read_block_undo(tip)?
            .ok_or_else(|| FatalReason::UndoDataMissing(format!("undo {tip}")))?;

        stores.begin_block()?;
        match Self::disconnect_inner(
            stores,
            &block,
            &current,
            &prev,
            &mut undo,
            self.params.activation_height,
        ) {
            Ok(()) => {
                stores.commit_block()?;
                tracing::debug!(height = tip, "disconnected KHU block");
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = stores.abort_block() {
                    tracing::error!(%abort_err, "store rollback failed after failed disconnect");
                }
                Err(e)
            }
        }
    }

    fn disconnect_inner(
        stores: &mut S,
        block: &KhuBlock,
        current: &State,
        prev: &State,
        undo: &mut BlockUndo,
        activation: u32,
    ) -> Result<(), KhuError> {
        let s = stores.split();
        let height = block.height;
        let mut state = current.clone();

        // Reverse of step 5: the yield pass, if this block ran one.
        if state.last_yield_height == height {
            undo_daily_yield(
                &mut state,
                s.notes,
                height,
                prev.last_yield_height,
                prev.last_yield_amount,
            )?;
        }

        // Reverse of step 4: transactions in reverse block order.
        for tx in block.txs.iter().rev() {
            match &tx.payload {
                Payload::Mint(_) => undo_mint(tx, &mut state, s.coins)?,
                Payload::Redeem(_) => undo_redeem(tx, &mut state, s.coins, undo)?,
                Payload::Stake(_) => undo_stake(tx, &mut state, s.coins, s.notes, undo)?,
                Payload::Unstake(_) => undo_unstake(tx, &mut state, s.coins, s.notes)?,
                Payload::DomcCommit(commit) => domc::undo_commit(commit, s.domc)?,
                Payload::DomcReveal(reveal) => domc::undo_reveal(reveal, s.domc)?,
            }
        }

        // Reverse of step 3: the cycle boundary.
        if domc::is_cycle_boundary(height, activation) {
            domc::undo_finalize_cycle(&mut state, s.domc, height)?;
        }

        // Reverse of step 2: the treasury boundary. U and Ur are back to
        // the values the accrual saw, so the budget recomputes exactly.
        if is_treasury_boundary(height, activation) {
            undo_treasury(&mut state, height)?;
        }

        state.height = prev.height;
        state.block_hash = prev.block_hash;
        state.prev_state_hash = prev.prev_state_hash;

        state.check_invariants()?;
        if state.full_hash() != prev.full_hash() {
            return Err(FatalReason::UndoMismatch(height).into());
        }

        s.state.erase_state(height)?;
        s.state.erase_block(height)?;
        s.state.erase_block_undo(height)?;
        s.state.set_best_height(height - 1)?;
        Ok(())
    }

    /// Accept a quorum-signed commitment, advancing finality.
    ///
    /// The aggregate signature and threshold are always verified. When
    /// this node already has state at the pinned height, a hash
    /// divergence means this node is on a conflicting fork.
    pub fn submit_commitment(&self, commitment_msg: &StateCommitment) -> Result<(), KhuError> {
        let mut stores = self.stores.write();
        commitment::verify_quorum_commitment(commitment_msg, &*self.quorum)?;

        if let Some(local) = stores.state().read_state(commitment_msg.height)? {
            if local.commitment_hash() != commitment_msg.state_hash {
                return Err(ReorgReason::FinalityConflict(commitment_msg.height).into());
            }
        }

        let s = stores.split();
        commitment::accept_commitment(commitment_msg, s.commitments)?;
        Ok(())
    }
}
