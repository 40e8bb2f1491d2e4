//! Daily yield engine: streaming per-note accrual into `(Cr, Ur)`.
//!
//! Runs at the end of a connected block whenever at least
//! [`YIELD_INTERVAL`] blocks have passed since the last pass and the
//! governed rate is non-zero. Only mature, unspent notes participate.
//! All arithmetic is integer-only with i128 intermediates.

use khu_core::constants::{BPS_PRECISION, DAYS_PER_YEAR, YIELD_INTERVAL};
use khu_core::error::{FatalReason, KhuError};
use khu_core::state::State;
use khu_core::store::NoteStore;
use khu_core::types::{add_amounts, checked_amount, sub_amounts, Amount};

/// Per-note daily increment: `floor(amount * r_annual / 10000 / 365)`.
pub fn daily_note_yield(amount: Amount, r_annual_bps: u16) -> Result<Amount, FatalReason> {
    let numerator = amount as i128 * r_annual_bps as i128;
    let annual = numerator / BPS_PRECISION as i128;
    checked_amount(annual / DAYS_PER_YEAR as i128)
}

/// Whether the daily pass is due at `height`.
pub fn is_yield_due(state: &State, height: u32) -> bool {
    state.r_annual > 0 && height.saturating_sub(state.last_yield_height) >= YIELD_INTERVAL
}

/// Run the daily yield pass.
///
/// Streams over the note store; each eligible note's `ur_accumulated`
/// grows by its own increment, and the sum is injected into `Ur` and `Cr`
/// equally so the reward pool stays matched to the aggregate rights.
/// Records `last_yield_height` and `last_yield_amount` for the exact undo.
pub fn apply_daily_yield(
    state: &mut State,
    notes: &mut dyn NoteStore,
    height: u32,
) -> Result<Amount, KhuError> {
    let rate = state.r_annual;
    let mut total: i128 = 0;

    notes.update_notes(&mut |note| {
        if note.spent || !note.is_mature(height) {
            return Ok(false);
        }
        let daily = daily_note_yield(note.amount, rate)?;
        if daily == 0 {
            return Ok(false);
        }
        note.ur_accumulated = add_amounts(note.ur_accumulated, daily)?;
        total += daily as i128;
        Ok(true)
    })?;

    let total = checked_amount(total)?;

    state.ur = add_amounts(state.ur, total)?;
    state.cr = add_amounts(state.cr, total)?;
    state.last_yield_height = height;
    state.last_yield_amount = total;

    state.check_invariants()?;
    tracing::debug!(height, total, rate, "applied daily yield");
    Ok(total)
}

/// Reverse the daily pass that ran at `height`.
///
/// The eligible set is re-derived from the note store (eligibility is a
/// pure function of the pass height), each note's increment is
/// subtracted, and the recomputed total is checked against the recorded
/// `last_yield_amount`; divergence is fatal.
pub fn undo_daily_yield(
    state: &mut State,
    notes: &mut dyn NoteStore,
    height: u32,
    prev_yield_height: u32,
    prev_yield_amount: Amount,
) -> Result<Amount, KhuError> {
    let rate = state.r_annual;
    let mut total: i128 = 0;

    notes.update_notes(&mut |note| {
        if note.spent || !note.is_mature(height) {
            return Ok(false);
        }
        let daily = daily_note_yield(note.amount, rate)?;
        if daily == 0 {
            return Ok(false);
        }
        note.ur_accumulated = sub_amounts(note.ur_accumulated, daily)?;
        total += daily as i128;
        Ok(true)
    })?;

    let total = checked_amount(total)?;
    if total != state.last_yield_amount {
        return Err(FatalReason::YieldChecksumMismatch {
            recomputed: total,
            recorded: state.last_yield_amount,
        }
        .into());
    }

    state.ur = sub_amounts(state.ur, total)?;
    state.cr = sub_amounts(state.cr, total)?;
    state.last_yield_height = prev_yield_height;
    state.last_yield_amount = prev_yield_amount;

    state.check_invariants()?;
    tracing::debug!(height, total, "undone daily yield");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use khu_core::constants::{COIN, MATURITY};
    use khu_core::note::Note;
    use khu_core::store::MemoryNoteStore;
    use khu_core::types::Hash256;
    use proptest::prelude::*;

    fn note(seed: u8, amount: Amount, start: u32) -> Note {
        Note {
            amount,
            stake_start_height: start,
            ur_accumulated: 0,
            nullifier: Hash256([seed ^ 0xFF; 32]),
            cm: Hash256([seed; 32]),
            spent: false,
        }
    }

    // --- daily_note_yield ---

    #[test]
    fn zero_rate_yields_nothing() {
        assert_eq!(daily_note_yield(100 * COIN, 0).unwrap(), 0);
    }

    #[test]
    fn fifteen_percent_daily_increment() {
        // 10000 KHU at 15%: floor(10000e8 * 1500 / 10000 / 365)
        let expected = (10_000u128 * COIN as u128 * 1_500 / 10_000 / 365) as i64;
        assert_eq!(daily_note_yield(10_000 * COIN, 1_500).unwrap(), expected);
    }

    #[test]
    fn small_amount_floors_to_zero() {
        // 100 sats at 1 bp: 100 * 1 / 10000 = 0.
        assert_eq!(daily_note_yield(100, 1).unwrap(), 0);
    }

    #[test]
    fn one_year_of_daily_yield_sums_below_nominal_rate() {
        // Flooring loses dust: 365 daily slices never exceed the annual amount.
        let amount = 12_345 * COIN + 6_789;
        let daily = daily_note_yield(amount, 1_000).unwrap();
        let annual_exact = amount as i128 * 1_000 / 10_000;
        assert!(365 * daily as i128 <= annual_exact);
    }

    // --- apply/undo pass ---

    fn yield_setup(amounts: &[Amount]) -> (State, MemoryNoteStore) {
        let mut state = State::default();
        let mut notes = MemoryNoteStore::default();
        let mut z = 0;
        for (i, amount) in amounts.iter().enumerate() {
            notes.write_note(&note(i as u8 + 1, *amount, 0)).unwrap();
            z += amount;
        }
        state.c = z;
        state.z = z;
        state.r_annual = 1_500;
        (state, notes)
    }

    #[test]
    fn yield_is_linear_over_notes() {
        let amounts = [100 * COIN, 250 * COIN, 7 * COIN];
        let (mut state, mut notes) = yield_setup(&amounts);
        let height = MATURITY + 10;

        let total = apply_daily_yield(&mut state, &mut notes, height).unwrap();
        let expected: i64 = amounts
            .iter()
            .map(|a| daily_note_yield(*a, 1_500).unwrap())
            .sum();
        assert_eq!(total, expected);
        assert_eq!(state.ur, expected);
        assert_eq!(state.cr, expected);
        assert_eq!(state.last_yield_height, height);
        assert_eq!(state.last_yield_amount, expected);

        for (i, amount) in amounts.iter().enumerate() {
            let n = notes.read_note(&Hash256([i as u8 + 1; 32])).unwrap().unwrap();
            assert_eq!(n.ur_accumulated, daily_note_yield(*amount, 1_500).unwrap());
        }
    }

    #[test]
    fn immature_notes_do_not_participate() {
        let mut state = State::default();
        let mut notes = MemoryNoteStore::default();
        notes.write_note(&note(1, 100 * COIN, 0)).unwrap();
        notes.write_note(&note(2, 100 * COIN, 10)).unwrap(); // still immature
        state.c = 200 * COIN;
        state.z = 200 * COIN;
        state.r_annual = 1_500;

        let total = apply_daily_yield(&mut state, &mut notes, MATURITY).unwrap();
        assert_eq!(total, daily_note_yield(100 * COIN, 1_500).unwrap());
        let young = notes.read_note(&Hash256([2; 32])).unwrap().unwrap();
        assert_eq!(young.ur_accumulated, 0);
    }

    #[test]
    fn spent_notes_do_not_participate() {
        let (mut state, mut notes) = yield_setup(&[100 * COIN, 100 * COIN]);
        let mut spent = notes.read_note(&Hash256([2; 32])).unwrap().unwrap();
        spent.spent = true;
        notes.write_note(&spent).unwrap();

        let total = apply_daily_yield(&mut state, &mut notes, MATURITY + 1).unwrap();
        assert_eq!(total, daily_note_yield(100 * COIN, 1_500).unwrap());
    }

    #[test]
    fn undo_restores_notes_and_pools() {
        let amounts = [100 * COIN, 250 * COIN];
        let (mut state, mut notes) = yield_setup(&amounts);
        let before_state = state.clone();
        let height = MATURITY + 5;

        apply_daily_yield(&mut state, &mut notes, height).unwrap();
        undo_daily_yield(&mut state, &mut notes, height, before_state.last_yield_height, 0)
            .unwrap();

        assert_eq!(state, before_state);
        for i in 1..=2u8 {
            let n = notes.read_note(&Hash256([i; 32])).unwrap().unwrap();
            assert_eq!(n.ur_accumulated, 0);
        }
    }

    #[test]
    fn undo_detects_checksum_divergence() {
        let (mut state, mut notes) = yield_setup(&[100 * COIN]);
        let height = MATURITY + 5;
        apply_daily_yield(&mut state, &mut notes, height).unwrap();

        // Tamper with the recorded amount.
        state.last_yield_amount += 1;
        let err = undo_daily_yield(&mut state, &mut notes, height, 0, 0).unwrap_err();
        assert!(matches!(
            err,
            KhuError::Fatal(FatalReason::YieldChecksumMismatch { .. })
        ));
    }

    #[test]
    fn yield_due_predicate() {
        let mut state = State::default();
        state.r_annual = 1_500;
        state.last_yield_height = 1_000;
        assert!(!is_yield_due(&state, 1_000 + YIELD_INTERVAL - 1));
        assert!(is_yield_due(&state, 1_000 + YIELD_INTERVAL));

        state.r_annual = 0;
        assert!(!is_yield_due(&state, 1_000 + 10 * YIELD_INTERVAL));
    }

    proptest! {
        // Per-note increments always sum to the pool injection.
        #[test]
        fn yield_linearity_law(
            a in 1i64..=1_000_000 * COIN,
            b in 1i64..=1_000_000 * COIN,
            rate in 1u16..=5_000,
        ) {
            let (mut state, mut notes) = yield_setup(&[a, b]);
            state.r_annual = rate;
            let total = apply_daily_yield(&mut state, &mut notes, MATURITY).unwrap();
            let expected =
                daily_note_yield(a, rate).unwrap() + daily_note_yield(b, rate).unwrap();
            prop_assert_eq!(total, expected);
            prop_assert_eq!(state.cr, state.ur);
            state.check_invariants().unwrap();
        }

        // Apply then undo is the identity on state and notes.
        #[test]
        fn yield_round_trip_law(
            a in 1i64..=1_000_000 * COIN,
            rate in 1u16..=5_000,
        ) {
            let (mut state, mut notes) = yield_setup(&[a]);
            state.r_annual = rate;
            let before = state.clone();
            apply_daily_yield(&mut state, &mut notes, MATURITY).unwrap();
            undo_daily_yield(&mut state, &mut notes, MATURITY, before.last_yield_height, before.last_yield_amount).unwrap();
            prop_assert_eq!(state, before);
        }
    }
}
