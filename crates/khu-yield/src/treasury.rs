//! DAO treasury accrual.
//!
//! At every treasury-cycle boundary the budget `(U + Ur) / 182500`
//! (2% annualised at the daily cadence) accrues into `T`. The budget is
//! a pure function of `(U, Ur)` at the boundary, so the undo needs no
//! journal: the disconnect path unwinds per-transaction effects first,
//! which restores exactly the `(U, Ur)` the accrual saw.

use khu_core::constants::{TREASURY_CYCLE, TREASURY_DIVISOR};
use khu_core::error::KhuError;
use khu_core::state::State;
use khu_core::types::{checked_amount, Amount};

/// Whether `height` is a treasury accrual boundary.
pub fn is_treasury_boundary(height: u32, activation_height: u32) -> bool {
    if height <= activation_height {
        return false;
    }
    (height - activation_height) % TREASURY_CYCLE == 0
}

/// Budget accrued at a boundary: `(U + Ur) / 182500`, 128-bit exact.
pub fn treasury_budget(state: &State) -> Result<Amount, KhuError> {
    let total = state.u as i128 + state.ur as i128;
    if total < 0 {
        return Err(khu_core::error::FatalReason::AmountOverflow.into());
    }
    Ok(checked_amount(total / TREASURY_DIVISOR as i128)?)
}

/// Accrue the boundary budget into `T`. Returns the budget.
pub fn accrue_treasury(state: &mut State, height: u32) -> Result<Amount, KhuError> {
    let budget = treasury_budget(state)?;
    state.t = checked_amount(state.t as i128 + budget as i128)?;
    tracing::debug!(height, budget, t = state.t, "accrued DAO treasury");
    Ok(budget)
}

/// Reverse a boundary accrual. `(U, Ur)` must already be restored to
/// their pre-block values. Returns the budget removed.
pub fn undo_treasury(state: &mut State, height: u32) -> Result<Amount, KhuError> {
    let budget = treasury_budget(state)?;
    state.t = checked_amount(state.t as i128 - budget as i128)?;
    tracing::debug!(height, budget, t = state.t, "undone DAO treasury");
    Ok(budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use khu_core::constants::COIN;
    use proptest::prelude::*;

    #[test]
    fn boundary_predicate() {
        assert!(!is_treasury_boundary(0, 0));
        assert!(!is_treasury_boundary(100, 0));
        assert!(is_treasury_boundary(TREASURY_CYCLE, 0));
        assert!(is_treasury_boundary(2 * TREASURY_CYCLE, 0));
        assert!(!is_treasury_boundary(TREASURY_CYCLE + 1, 0));
    }

    #[test]
    fn boundary_respects_activation_offset() {
        let activation = 1_000;
        assert!(!is_treasury_boundary(activation, activation));
        assert!(is_treasury_boundary(activation + TREASURY_CYCLE, activation));
        assert!(!is_treasury_boundary(TREASURY_CYCLE, activation));
    }

    #[test]
    fn budget_formula() {
        let mut state = State::default();
        state.u = 182_500 * COIN;
        state.ur = 0;
        assert_eq!(treasury_budget(&state).unwrap(), COIN);
    }

    #[test]
    fn budget_includes_unstake_rights() {
        let mut state = State::default();
        state.u = 100_000 * COIN;
        state.ur = 82_500 * COIN;
        assert_eq!(treasury_budget(&state).unwrap(), COIN);
    }

    #[test]
    fn budget_floors() {
        let mut state = State::default();
        state.u = TREASURY_DIVISOR - 1;
        assert_eq!(treasury_budget(&state).unwrap(), 0);
        state.u = TREASURY_DIVISOR;
        assert_eq!(treasury_budget(&state).unwrap(), 1);
    }

    #[test]
    fn accrue_then_undo_is_identity() {
        let mut state = State::default();
        state.u = 9_999_999 * COIN;
        state.ur = 123 * COIN;
        state.cr = 123 * COIN;
        state.c = state.u;
        let before = state.clone();

        accrue_treasury(&mut state, TREASURY_CYCLE).unwrap();
        assert!(state.t > 0);
        undo_treasury(&mut state, TREASURY_CYCLE).unwrap();
        assert_eq!(state, before);
    }

    proptest! {
        #[test]
        fn accrual_never_negative(u in 0i64..=i64::MAX / 4, ur in 0i64..=i64::MAX / 4) {
            let mut state = State::default();
            state.u = u;
            state.ur = ur;
            let budget = treasury_budget(&state).unwrap();
            prop_assert!(budget >= 0);
        }
    }
}
