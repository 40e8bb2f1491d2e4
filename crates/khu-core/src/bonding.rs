//! MINT and REDEEM: bonded minting of transparent supply.
//!
//! Supply never exists without matching collateral. Both effects mutate
//! `C` and `U` as an adjacent atomic pair with no statements between the
//! two mutations, and verify the invariants before returning.

use crate::coins::{KhuCoin, KhuCoinsView};
use crate::constants::MAX_MONEY;
use crate::error::{KhuError, RejectReason};
use crate::state::State;
use crate::store::BlockUndo;
use crate::types::{add_amounts, sub_amounts, KhuTransaction, MintPayload, OutPoint, Payload, RedeemPayload};

/// Validate a MINT transaction. Pure over the transaction.
pub fn check_mint(tx: &KhuTransaction) -> Result<&MintPayload, RejectReason> {
    let Payload::Mint(payload) = &tx.payload else {
        return Err(RejectReason::WrongTxType);
    };
    if payload.amount <= 0 || payload.amount > MAX_MONEY {
        return Err(RejectReason::InvalidAmount(payload.amount));
    }
    if payload.dest.is_zero() {
        return Err(RejectReason::InvalidDestination);
    }
    // Output 0 carries the newly minted KHU_T coin.
    let out = tx.output0().ok_or(RejectReason::OutputAmountMismatch {
        expected: payload.amount,
        got: 0,
    })?;
    if out.value != payload.amount || out.dest != payload.dest {
        return Err(RejectReason::OutputAmountMismatch {
            expected: payload.amount,
            got: out.value,
        });
    }
    Ok(payload)
}

/// Apply a MINT: lock collateral, create supply, record the colored UTXO.
pub fn apply_mint(
    tx: &KhuTransaction,
    state: &mut State,
    coins: &mut dyn KhuCoinsView,
    height: u32,
) -> Result<(), KhuError> {
    let payload = *check_mint(tx)?;
    let amount = payload.amount;

    // Atomic pair: collateral and supply move together.
    state.c = add_amounts(state.c, amount)?;
    state.u = add_amounts(state.u, amount)?;

    coins.add_coin(
        OutPoint::new(tx.txid()?, 0),
        KhuCoin::unstaked(amount, payload.dest),
    )?;

    state.check_invariants()?;
    tracing::debug!(amount, height, c = state.c, u = state.u, "applied MINT");
    Ok(())
}

/// Undo a MINT: erase the colored UTXO, release collateral and supply.
pub fn undo_mint(
    tx: &KhuTransaction,
    state: &mut State,
    coins: &mut dyn KhuCoinsView,
) -> Result<(), KhuError> {
    let payload = *check_mint(tx)?;
    let amount = payload.amount;

    coins.spend_coin(&OutPoint::new(tx.txid()?, 0))?;

    // Atomic pair, reversed.
    state.c = sub_amounts(state.c, amount)?;
    state.u = sub_amounts(state.u, amount)?;

    state.check_invariants()?;
    tracing::debug!(amount, c = state.c, u = state.u, "undone MINT");
    Ok(())
}

/// Validate a REDEEM transaction against state and the colored-coin view.
pub fn check_redeem<'a>(
    tx: &'a KhuTransaction,
    state: &State,
    coins: &dyn KhuCoinsView,
) -> Result<&'a RedeemPayload, RejectReason> {
    let Payload::Redeem(payload) = &tx.payload else {
        return Err(RejectReason::WrongTxType);
    };
    if payload.amount <= 0 || payload.amount > MAX_MONEY {
        return Err(RejectReason::InvalidAmount(payload.amount));
    }
    if payload.dest.is_zero() {
        return Err(RejectReason::InvalidDestination);
    }
    if tx.inputs.is_empty() {
        return Err(RejectReason::InsufficientFunds { have: 0, need: payload.amount });
    }

    // Inputs must resolve to unspent, unstaked colored coins.
    let mut total_input: i64 = 0;
    for input in &tx.inputs {
        let coin = coins
            .coin(input)
            .map_err(|e| RejectReason::UnknownInput(e.to_string()))?
            .ok_or_else(|| RejectReason::UnknownInput(input.to_string()))?;
        if coin.is_staked() {
            return Err(RejectReason::InputStaked(input.to_string()));
        }
        total_input = total_input.saturating_add(coin.value);
    }
    if total_input < payload.amount {
        return Err(RejectReason::InsufficientFunds {
            have: total_input,
            need: payload.amount,
        });
    }

    // Output 0 pays the released collateral to the destination.
    let out = tx.output0().ok_or(RejectReason::OutputAmountMismatch {
        expected: payload.amount,
        got: 0,
    })?;
    if out.value != payload.amount {
        return Err(RejectReason::OutputAmountMismatch {
            expected: payload.amount,
            got: out.value,
        });
    }

    // Pre-mutation collateral check.
    if state.c < payload.amount || state.u < payload.amount {
        return Err(RejectReason::InsufficientCollateral {
            c: state.c,
            u: state.u,
            amount: payload.amount,
        });
    }
    Ok(payload)
}

/// Apply a REDEEM: burn supply, release collateral, spend the inputs.
pub fn apply_redeem(
    tx: &KhuTransaction,
    state: &mut State,
    coins: &mut dyn KhuCoinsView,
    undo: &mut BlockUndo,
    height: u32,
) -> Result<(), KhuError> {
    let amount = check_redeem(tx, state, coins)?.amount;

    state.check_invariants()?;

    // Atomic pair: collateral and supply move together.
    state.c = sub_amounts(state.c, amount)?;
    state.u = sub_amounts(state.u, amount)?;

    state.check_invariants()?;

    for input in &tx.inputs {
        let coin = coins
            .spend_coin(input)?
            .ok_or_else(|| RejectReason::UnknownInput(input.to_string()))?;
        undo.spent_coins.push((*input, coin));
    }

    tracing::debug!(amount, height, c = state.c, u = state.u, "applied REDEEM");
    Ok(())
}

/// Undo a REDEEM: restore the spent inputs, re-bond collateral and supply.
///
/// `undo` is consumed from the tail: the caller walks the block's
/// transactions in reverse.
pub fn undo_redeem(
    tx: &KhuTransaction,
    state: &mut State,
    coins: &mut dyn KhuCoinsView,
    undo: &mut BlockUndo,
) -> Result<(), KhuError> {
    let Payload::Redeem(payload) = &tx.payload else {
        return Err(RejectReason::WrongTxType.into());
    };
    let amount = payload.amount;

    for input in tx.inputs.iter().rev() {
        let (outpoint, coin) = undo
            .spent_coins
            .pop()
            .ok_or_else(|| KhuError::Fatal(crate::error::FatalReason::UndoDataMissing(input.to_string())))?;
        if outpoint != *input {
            return Err(crate::error::FatalReason::UndoDataMissing(input.to_string()).into());
        }
        coins.add_coin(outpoint, coin)?;
    }

    // Atomic pair, reversed.
    state.c = add_amounts(state.c, amount)?;
    state.u = add_amounts(state.u, amount)?;

    state.check_invariants()?;
    tracing::debug!(amount, c = state.c, u = state.u, "undone REDEEM");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coins::MemoryCoins;
    use crate::constants::COIN;
    use crate::error::FatalReason;
    use crate::types::{Hash256, TxOutput};
    use proptest::prelude::*;

    fn dest() -> Hash256 {
        Hash256([0xAA; 32])
    }

    fn mint_tx(amount: i64) -> KhuTransaction {
        KhuTransaction {
            version: 1,
            inputs: vec![],
            outputs: vec![TxOutput { value: amount, dest: dest() }],
            shielded_output: None,
            shielded_spend: None,
            payload: Payload::Mint(MintPayload { amount, dest: dest() }),
        }
    }

    fn redeem_tx(amount: i64, inputs: Vec<OutPoint>) -> KhuTransaction {
        KhuTransaction {
            version: 1,
            inputs,
            outputs: vec![TxOutput { value: amount, dest: dest() }],
            shielded_output: None,
            shielded_spend: None,
            payload: Payload::Redeem(RedeemPayload { amount, dest: dest() }),
        }
    }

    // --- MINT validation ---

    #[test]
    fn mint_zero_amount_rejected() {
        assert_eq!(
            check_mint(&mint_tx(0)),
            Err(RejectReason::InvalidAmount(0))
        );
    }

    #[test]
    fn mint_negative_amount_rejected() {
        assert_eq!(
            check_mint(&mint_tx(-5)),
            Err(RejectReason::InvalidAmount(-5))
        );
    }

    #[test]
    fn mint_zero_dest_rejected() {
        let mut tx = mint_tx(COIN);
        tx.payload = Payload::Mint(MintPayload { amount: COIN, dest: Hash256::ZERO });
        assert_eq!(check_mint(&tx), Err(RejectReason::InvalidDestination));
    }

    #[test]
    fn mint_output_mismatch_rejected() {
        let mut tx = mint_tx(COIN);
        tx.outputs[0].value = COIN - 1;
        assert!(matches!(
            check_mint(&tx),
            Err(RejectReason::OutputAmountMismatch { .. })
        ));
    }

    #[test]
    fn mint_wrong_type_rejected() {
        let tx = redeem_tx(COIN, vec![]);
        assert_eq!(check_mint(&tx), Err(RejectReason::WrongTxType));
    }

    // --- MINT apply/undo ---

    #[test]
    fn mint_moves_c_and_u_together() {
        let mut state = State::default();
        let mut coins = MemoryCoins::new();
        let tx = mint_tx(100 * COIN);

        apply_mint(&tx, &mut state, &mut coins, 10).unwrap();
        assert_eq!(state.c, 100 * COIN);
        assert_eq!(state.u, 100 * COIN);
        assert_eq!(state.z, 0);
        assert!(coins.have_coin(&OutPoint::new(tx.txid().unwrap(), 0)).unwrap());
    }

    #[test]
    fn mint_undo_restores_exactly() {
        let mut state = State::default();
        let mut coins = MemoryCoins::new();
        let tx = mint_tx(100 * COIN);

        apply_mint(&tx, &mut state, &mut coins, 10).unwrap();
        undo_mint(&tx, &mut state, &mut coins).unwrap();
        assert_eq!(state, State::default());
        assert!(coins.is_empty());
    }

    #[test]
    fn mint_overflow_is_fatal() {
        let mut state = State::default();
        state.c = MAX_MONEY;
        state.u = MAX_MONEY;
        let mut coins = MemoryCoins::new();
        let err = apply_mint(&mint_tx(1), &mut state, &mut coins, 10).unwrap_err();
        assert_eq!(err, KhuError::Fatal(FatalReason::AmountOverflow));
        // State untouched on failure.
        assert_eq!(state.c, MAX_MONEY);
    }

    // --- REDEEM ---

    fn minted_setup(amount: i64) -> (State, MemoryCoins, OutPoint) {
        let mut state = State::default();
        let mut coins = MemoryCoins::new();
        let tx = mint_tx(amount);
        apply_mint(&tx, &mut state, &mut coins, 1).unwrap();
        (state, coins, OutPoint::new(tx.txid().unwrap(), 0))
    }

    #[test]
    fn redeem_round_trips_mint() {
        let (mut state, mut coins, op) = minted_setup(100 * COIN);
        let tx = redeem_tx(100 * COIN, vec![op]);
        let mut undo = BlockUndo::default();

        apply_redeem(&tx, &mut state, &mut coins, &mut undo, 2).unwrap();
        assert_eq!(state.c, 0);
        assert_eq!(state.u, 0);
        assert!(coins.is_empty());
        assert_eq!(undo.spent_coins.len(), 1);
    }

    #[test]
    fn redeem_unknown_input_rejected() {
        let (state, coins, _) = minted_setup(100 * COIN);
        let tx = redeem_tx(COIN, vec![OutPoint::new(Hash256([9; 32]), 0)]);
        assert!(matches!(
            check_redeem(&tx, &state, &coins),
            Err(RejectReason::UnknownInput(_))
        ));
    }

    #[test]
    fn redeem_exceeding_inputs_rejected() {
        let (state, coins, op) = minted_setup(100 * COIN);
        let tx = redeem_tx(101 * COIN, vec![op]);
        assert!(matches!(
            check_redeem(&tx, &state, &coins),
            Err(RejectReason::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn redeem_exceeding_collateral_rejected() {
        // Coins exist but global U has been drained by a prior redeem.
        let (mut state, coins, op) = minted_setup(100 * COIN);
        state.c = COIN;
        state.u = COIN;
        state.z = 0;
        let tx = redeem_tx(2 * COIN, vec![op]);
        assert!(matches!(
            check_redeem(&tx, &state, &coins),
            Err(RejectReason::InsufficientCollateral { .. })
        ));
    }

    #[test]
    fn redeem_staked_input_rejected() {
        let mut state = State::default();
        state.c = COIN;
        state.u = COIN;
        let mut coins = MemoryCoins::new();
        let op = OutPoint::new(Hash256([1; 32]), 0);
        coins
            .add_coin(
                op,
                KhuCoin {
                    value: COIN,
                    dest: dest(),
                    stake: crate::coins::CoinStake::Staked { since_height: 1 },
                },
            )
            .unwrap();
        let tx = redeem_tx(COIN, vec![op]);
        assert!(matches!(
            check_redeem(&tx, &state, &coins),
            Err(RejectReason::InputStaked(_))
        ));
    }

    #[test]
    fn redeem_output_mismatch_rejected() {
        let (state, coins, op) = minted_setup(100 * COIN);
        let mut tx = redeem_tx(50 * COIN, vec![op]);
        tx.outputs[0].value = 49 * COIN;
        assert!(matches!(
            check_redeem(&tx, &state, &coins),
            Err(RejectReason::OutputAmountMismatch { .. })
        ));
    }

    #[test]
    fn redeem_undo_restores_exactly() {
        let (mut state, mut coins, op) = minted_setup(100 * COIN);
        let before_state = state.clone();
        let tx = redeem_tx(100 * COIN, vec![op]);
        let mut undo = BlockUndo::default();

        apply_redeem(&tx, &mut state, &mut coins, &mut undo, 2).unwrap();
        undo_redeem(&tx, &mut state, &mut coins, &mut undo).unwrap();

        assert_eq!(state, before_state);
        assert!(coins.have_coin(&op).unwrap());
        assert!(undo.spent_coins.is_empty());
    }

    proptest! {
        // MINT then REDEEM of the same amount leaves (C, U) unchanged.
        #[test]
        fn mint_redeem_round_trip_law(amount in 1i64..=1_000_000 * COIN) {
            let mut state = State::default();
            let mut coins = MemoryCoins::new();
            let mint = mint_tx(amount);
            apply_mint(&mint, &mut state, &mut coins, 1).unwrap();

            let op = OutPoint::new(mint.txid().unwrap(), 0);
            let redeem = redeem_tx(amount, vec![op]);
            let mut undo = BlockUndo::default();
            apply_redeem(&redeem, &mut state, &mut coins, &mut undo, 2).unwrap();

            prop_assert_eq!(state.c, 0);
            prop_assert_eq!(state.u, 0);
            state.check_invariants().unwrap();
        }
    }
}
