//! STAKE and UNSTAKE: form conversion between transparent and shielded
//! supply, and the double-flux release of accumulated yield.
//!
//! STAKE is a pure form conversion `KHU_T -> ZKHU`: `U` and `Z` move by
//! the principal, `C` is untouched, and a note is created. UNSTAKE is the
//! most delicate operation in the system: the four bonus mutations are
//! adjacent and move `bonus` from `(Cr, Ur)` into `(C, U)` while both
//! invariants hold, then the principal materialises transparently.

use crate::coins::{KhuCoin, KhuCoinsView};
use crate::constants::MAX_MONEY;
use crate::error::{FatalReason, KhuError, RejectReason};
use crate::masternodes::ShieldedVerifier;
use crate::note::{Note, NoteCommitmentTree};
use crate::state::State;
use crate::store::{BlockUndo, NoteStore};
use crate::types::{
    add_amounts, sub_amounts, KhuTransaction, OutPoint, Payload, StakePayload, UnstakePayload,
};

/// Validate a STAKE transaction against the colored-coin view and note store.
pub fn check_stake<'a>(
    tx: &'a KhuTransaction,
    coins: &dyn KhuCoinsView,
    notes: &dyn NoteStore,
    height: u32,
) -> Result<&'a StakePayload, RejectReason> {
    let Payload::Stake(payload) = &tx.payload else {
        return Err(RejectReason::WrongTxType);
    };
    if payload.amount <= 0 || payload.amount > MAX_MONEY {
        return Err(RejectReason::InvalidAmount(payload.amount));
    }

    // Exactly one KHU_T input, unstaked, matching the declared principal.
    let [input] = tx.inputs.as_slice() else {
        return Err(RejectReason::UnknownInput("stake requires one input".into()));
    };
    let coin = coins
        .coin(input)
        .map_err(|e| RejectReason::UnknownInput(e.to_string()))?
        .ok_or_else(|| RejectReason::UnknownInput(input.to_string()))?;
    if coin.is_staked() {
        return Err(RejectReason::InputStaked(input.to_string()));
    }
    if coin.value != payload.amount {
        return Err(RejectReason::OutputAmountMismatch {
            expected: coin.value,
            got: payload.amount,
        });
    }

    // Exactly one shielded output carrying the ZKHU memo.
    let output = tx
        .shielded_output
        .as_ref()
        .ok_or(RejectReason::MissingShieldedOutput)?;
    let fields = output.memo.decode()?;
    if fields.amount != coin.value
        || fields.stake_start_height != height
        || fields.ur_accumulated != 0
    {
        return Err(RejectReason::InvalidMemo);
    }

    // Fresh commitment and nullifier.
    if notes
        .read_note(&output.cm)
        .map_err(|e| RejectReason::UnknownInput(e.to_string()))?
        .is_some()
    {
        return Err(RejectReason::DuplicateNote);
    }
    if notes
        .read_nullifier_link(&output.nullifier)
        .map_err(|e| RejectReason::UnknownInput(e.to_string()))?
        .is_some()
    {
        return Err(RejectReason::DuplicateNote);
    }

    Ok(payload)
}

/// Apply a STAKE: spend the coin, create the note, extend the tree.
///
/// State change is `U -= amount; Z += amount`; `C, Cr, Ur, T` untouched,
/// so `U + Z` and both invariants are preserved.
pub fn apply_stake(
    tx: &KhuTransaction,
    state: &mut State,
    coins: &mut dyn KhuCoinsView,
    notes: &mut dyn NoteStore,
    undo: &mut BlockUndo,
    height: u32,
) -> Result<(), KhuError> {
    let amount = check_stake(tx, coins, notes, height)?.amount;
    let output = tx
        .shielded_output
        .as_ref()
        .ok_or(RejectReason::MissingShieldedOutput)?;

    let input = tx.inputs[0];
    let coin = coins
        .spend_coin(&input)?
        .ok_or_else(|| RejectReason::UnknownInput(input.to_string()))?;
    undo.spent_coins.push((input, coin));

    let note = Note {
        amount,
        stake_start_height: height,
        ur_accumulated: 0,
        nullifier: output.nullifier,
        cm: output.cm,
        spent: false,
    };
    notes.write_note(&note)?;

    // Extend the commitment tree and persist the new anchor.
    let mut tree = read_current_tree(notes)?;
    tree.append(output.cm);
    let anchor = tree.root();
    notes.write_anchor(&anchor, &tree)?;
    notes.set_current_anchor(&anchor)?;
    notes.write_nullifier_link(&output.nullifier, &output.cm)?;

    // Pure form conversion.
    state.u = sub_amounts(state.u, amount)?;
    state.z = add_amounts(state.z, amount)?;

    state.check_invariants()?;
    tracing::debug!(amount, height, u = state.u, z = state.z, "applied STAKE");
    Ok(())
}

/// Undo a STAKE: restore the coin, erase the note, shrink the tree.
pub fn undo_stake(
    tx: &KhuTransaction,
    state: &mut State,
    coins: &mut dyn KhuCoinsView,
    notes: &mut dyn NoteStore,
    undo: &mut BlockUndo,
) -> Result<(), KhuError> {
    let Payload::Stake(payload) = &tx.payload else {
        return Err(RejectReason::WrongTxType.into());
    };
    let amount = payload.amount;
    let output = tx
        .shielded_output
        .as_ref()
        .ok_or(RejectReason::MissingShieldedOutput)?;

    state.u = add_amounts(state.u, amount)?;
    state.z = sub_amounts(state.z, amount)?;

    // Roll the tree back to its pre-append anchor.
    let old_anchor = notes.current_anchor()?;
    let mut tree = read_current_tree(notes)?;
    match tree.truncate_last() {
        Some(cm) if cm == output.cm => {}
        _ => {
            return Err(FatalReason::UndoDataMissing(format!("tree tip for {}", output.cm)).into());
        }
    }
    let anchor = tree.root();
    if !anchor.is_zero() {
        notes.write_anchor(&anchor, &tree)?;
    }
    notes.set_current_anchor(&anchor)?;
    notes.erase_anchor(&old_anchor)?;

    notes.erase_nullifier_link(&output.nullifier)?;
    notes.erase_note(&output.cm)?;

    let (outpoint, coin) = undo
        .spent_coins
        .pop()
        .ok_or_else(|| FatalReason::UndoDataMissing(tx.inputs[0].to_string()))?;
    coins.add_coin(outpoint, coin)?;

    state.check_invariants()?;
    tracing::debug!(amount, u = state.u, z = state.z, "undone STAKE");
    Ok(())
}

/// Validate an UNSTAKE transaction. The shielded proof is checked through
/// the injected verifier; everything else is data the core owns.
pub fn check_unstake(
    tx: &KhuTransaction,
    state: &State,
    notes: &dyn NoteStore,
    shielded: &dyn ShieldedVerifier,
    height: u32,
) -> Result<Note, RejectReason> {
    let Payload::Unstake(UnstakePayload { cm }) = &tx.payload else {
        return Err(RejectReason::WrongTxType);
    };
    let spend = tx
        .shielded_spend
        .as_ref()
        .ok_or(RejectReason::MissingShieldedSpend)?;

    if !shielded.verify_spend(spend) {
        return Err(RejectReason::ProofInvalid);
    }
    if notes
        .read_anchor(&spend.anchor)
        .map_err(|e| RejectReason::UnknownInput(e.to_string()))?
        .is_none()
    {
        return Err(RejectReason::AnchorUnknown);
    }

    let note = notes
        .read_note(cm)
        .map_err(|e| RejectReason::UnknownInput(e.to_string()))?
        .ok_or(RejectReason::NoteUnknown)?;
    if note.spent {
        return Err(RejectReason::NoteSpent);
    }
    if notes
        .is_nullifier_spent(&spend.nullifier)
        .map_err(|e| RejectReason::UnknownInput(e.to_string()))?
    {
        return Err(RejectReason::NullifierSpent);
    }
    if spend.nullifier != note.nullifier
        || notes
            .read_nullifier_link(&spend.nullifier)
            .map_err(|e| RejectReason::UnknownInput(e.to_string()))?
            != Some(*cm)
    {
        return Err(RejectReason::NullifierMismatch);
    }

    if !note.is_mature(height) {
        return Err(RejectReason::MaturityNotReached {
            start: note.stake_start_height,
            height,
        });
    }

    let bonus = note.bonus();
    if bonus < 0 {
        return Err(RejectReason::NegativeBonus);
    }
    if state.cr < bonus || state.ur < bonus {
        return Err(RejectReason::InsufficientCr {
            cr: state.cr,
            ur: state.ur,
            bonus,
        });
    }
    if state.c as i128 + bonus as i128 > MAX_MONEY as i128
        || state.u as i128 + bonus as i128 > MAX_MONEY as i128
    {
        return Err(RejectReason::MoneyRange);
    }

    // Output 0 pays principal plus bonus to a valid destination.
    let expected = note.amount.saturating_add(bonus);
    let out = tx.output0().ok_or(RejectReason::OutputAmountMismatch {
        expected,
        got: 0,
    })?;
    if out.value != expected {
        return Err(RejectReason::OutputAmountMismatch {
            expected,
            got: out.value,
        });
    }
    if out.dest.is_zero() {
        return Err(RejectReason::InvalidDestination);
    }

    Ok(note)
}

/// Apply an UNSTAKE: the double flux, then the principal release.
pub fn apply_unstake(
    tx: &KhuTransaction,
    state: &mut State,
    coins: &mut dyn KhuCoinsView,
    notes: &mut dyn NoteStore,
    shielded: &dyn ShieldedVerifier,
    height: u32,
) -> Result<(), KhuError> {
    let mut note = check_unstake(tx, state, notes, shielded, height)?;
    let bonus = note.bonus();
    let amount = note.amount;

    // Double flux; the four bonus lines stay adjacent, then the principal
    // materialises transparently. C already covered the principal at STAKE.
    state.u = add_amounts(state.u, bonus)?;
    state.c = add_amounts(state.c, bonus)?;
    state.cr = sub_amounts(state.cr, bonus)?;
    state.ur = sub_amounts(state.ur, bonus)?;
    state.z = sub_amounts(state.z, amount)?;
    state.u = add_amounts(state.u, amount)?;

    notes.mark_nullifier_spent(&note.nullifier)?;
    note.spent = true;
    notes.write_note(&note)?;

    let out = tx
        .output0()
        .ok_or(RejectReason::OutputAmountMismatch { expected: amount + bonus, got: 0 })?;
    coins.add_coin(
        OutPoint::new(tx.txid()?, 0),
        KhuCoin::unstaked(out.value, out.dest),
    )?;

    state.check_invariants()?;
    tracing::debug!(
        amount,
        bonus,
        height,
        c = state.c,
        u = state.u,
        cr = state.cr,
        ur = state.ur,
        "applied UNSTAKE"
    );
    Ok(())
}

/// Undo an UNSTAKE: reverse the six mutations in reverse order, un-spend
/// the nullifier, unmark the note.
///
/// The note record was retained with `spent = true`, so the exact bonus
/// is still available here.
pub fn undo_unstake(
    tx: &KhuTransaction,
    state: &mut State,
    coins: &mut dyn KhuCoinsView,
    notes: &mut dyn NoteStore,
) -> Result<(), KhuError> {
    let Payload::Unstake(UnstakePayload { cm }) = &tx.payload else {
        return Err(RejectReason::WrongTxType.into());
    };
    let mut note = notes
        .read_note(cm)?
        .ok_or_else(|| FatalReason::UndoDataMissing(cm.to_string()))?;
    if !note.spent {
        return Err(FatalReason::UndoDataMissing(format!("unspent note {cm}")).into());
    }
    let bonus = note.bonus();
    let amount = note.amount;

    coins.spend_coin(&OutPoint::new(tx.txid()?, 0))?;

    note.spent = false;
    notes.write_note(&note)?;
    notes.clear_nullifier(&note.nullifier)?;

    // Reverse of the apply ordering.
    state.u = sub_amounts(state.u, amount)?;
    state.z = add_amounts(state.z, amount)?;
    state.ur = add_amounts(state.ur, bonus)?;
    state.cr = add_amounts(state.cr, bonus)?;
    state.c = sub_amounts(state.c, bonus)?;
    state.u = sub_amounts(state.u, bonus)?;

    state.check_invariants()?;
    tracing::debug!(amount, bonus, c = state.c, u = state.u, "undone UNSTAKE");
    Ok(())
}

/// Load the live commitment tree, empty when no anchor is set.
fn read_current_tree(notes: &dyn NoteStore) -> Result<NoteCommitmentTree, KhuError> {
    let anchor = notes.current_anchor()?;
    if anchor.is_zero() {
        return Ok(NoteCommitmentTree::new());
    }
    Ok(notes
        .read_anchor(&anchor)?
        .ok_or_else(|| FatalReason::UndoDataMissing(format!("anchor {anchor}")))?)
}
