//! DOMC: commit-reveal masternode voting on the annual yield rate.
//!
//! Every [`DOMC_CYCLE_LENGTH`] blocks one cycle completes. Masternodes
//! first publish `hash(r_proposal || salt)` during the commit window,
//! then reveal `(r_proposal, salt)` during the reveal window. At the
//! boundary the upper median of the live reveals, clamped to
//! `R_max_dynamic`, becomes the new `R_annual`.
//!
//! There is no minimum quorum: one valid reveal moves the rate, zero
//! reveals leave it unchanged.

use khu_core::constants::{
    BLOCKS_PER_YEAR, DOMC_COMMIT_OFFSET, DOMC_CYCLE_LENGTH, DOMC_REVEAL_OFFSET, R_MAX_ABS,
    R_MAX_DYNAMIC_DECAY_PER_YEAR, R_MAX_DYNAMIC_FLOOR, R_MAX_DYNAMIC_INIT,
};
use khu_core::error::{FatalReason, KhuError, RejectReason};
use khu_core::masternodes::MasternodeRegistry;
use khu_core::state::State;
use khu_core::store::{DomcStore, RateUndo};
use khu_core::types::{DomcCommit, DomcReveal};

/// Whether `height` is a DOMC cycle boundary.
pub fn is_cycle_boundary(height: u32, activation_height: u32) -> bool {
    if height <= activation_height {
        return false;
    }
    (height - activation_height) % DOMC_CYCLE_LENGTH == 0
}

/// Whether `height` lies in the commit window of the cycle at `cycle_start`.
pub fn in_commit_phase(height: u32, cycle_start: u32) -> bool {
    height >= cycle_start + DOMC_COMMIT_OFFSET && height < cycle_start + DOMC_REVEAL_OFFSET
}

/// Whether `height` lies in the reveal window of the cycle at `cycle_start`.
pub fn in_reveal_phase(height: u32, cycle_start: u32) -> bool {
    height >= cycle_start + DOMC_REVEAL_OFFSET && height < cycle_start + DOMC_CYCLE_LENGTH
}

/// Governance cap schedule: starts at 4000 bp, loses 100 bp per elapsed
/// year since activation, floored at 700 bp.
pub fn r_max_dynamic_at(height: u32, activation_height: u32) -> u16 {
    let elapsed_years = height.saturating_sub(activation_height) / BLOCKS_PER_YEAR;
    let decay = (elapsed_years as u64).saturating_mul(R_MAX_DYNAMIC_DECAY_PER_YEAR as u64);
    let capped = (R_MAX_DYNAMIC_INIT as u64).saturating_sub(decay);
    (capped as u16).max(R_MAX_DYNAMIC_FLOOR)
}

/// Upper median: element at index `n / 2` of the ascending sort.
pub fn median_proposal(proposals: &[u16]) -> Option<u16> {
    if proposals.is_empty() {
        return None;
    }
    let mut sorted = proposals.to_vec();
    sorted.sort_unstable();
    Some(sorted[sorted.len() / 2])
}

/// Validate a DOMC commit accepted into a block at `height`.
pub fn check_commit(
    commit: &DomcCommit,
    state: &State,
    masternodes: &dyn MasternodeRegistry,
    domc: &dyn DomcStore,
    height: u32,
) -> Result<(), RejectReason> {
    if commit.commit_hash.is_zero() {
        return Err(RejectReason::CommitMismatch);
    }
    if commit.cycle_id != state.domc_cycle_start {
        return Err(RejectReason::WrongCycleId {
            expected: state.domc_cycle_start,
            got: commit.cycle_id,
        });
    }
    if !in_commit_phase(height, state.domc_cycle_start) {
        return Err(RejectReason::OutsidePhaseWindow(height));
    }
    if commit.commit_height != height {
        return Err(RejectReason::WrongVoteHeight(commit.commit_height));
    }
    if !masternodes.is_active(&commit.identity) {
        return Err(RejectReason::MasternodeInactive);
    }
    if !masternodes.verify_vote(&commit.identity, &commit.signing_message(), &commit.sig) {
        return Err(RejectReason::BadVoteSignature);
    }
    let existing = domc
        .read_commit(commit.cycle_id, &commit.identity)
        .map_err(|e| RejectReason::Serialization(e.to_string()))?;
    if existing.is_some() {
        return Err(RejectReason::DuplicateVote);
    }
    Ok(())
}

/// Store a validated commit.
pub fn apply_commit(commit: &DomcCommit, domc: &mut dyn DomcStore) -> Result<(), KhuError> {
    domc.write_commit(commit)?;
    tracing::debug!(cycle = commit.cycle_id, height = commit.commit_height, "applied DOMC commit");
    Ok(())
}

/// Remove a commit during disconnect.
pub fn undo_commit(commit: &DomcCommit, domc: &mut dyn DomcStore) -> Result<(), KhuError> {
    domc.erase_commit(commit.cycle_id, &commit.identity)?;
    Ok(())
}

/// Validate a DOMC reveal accepted into a block at `height`.
pub fn check_reveal(
    reveal: &DomcReveal,
    state: &State,
    masternodes: &dyn MasternodeRegistry,
    domc: &dyn DomcStore,
    height: u32,
) -> Result<(), RejectReason> {
    if reveal.cycle_id != state.domc_cycle_start {
        return Err(RejectReason::WrongCycleId {
            expected: state.domc_cycle_start,
            got: reveal.cycle_id,
        });
    }
    if !in_reveal_phase(height, state.domc_cycle_start) {
        return Err(RejectReason::OutsidePhaseWindow(height));
    }
    if reveal.reveal_height != height {
        return Err(RejectReason::WrongVoteHeight(reveal.reveal_height));
    }
    // R_MIN is zero, which the unsigned proposal field already enforces.
    if reveal.r_proposal > R_MAX_ABS {
        return Err(RejectReason::ProposalOutOfRange(reveal.r_proposal));
    }
    if !masternodes.is_active(&reveal.identity) {
        return Err(RejectReason::MasternodeInactive);
    }
    if !masternodes.verify_vote(&reveal.identity, &reveal.signing_message(), &reveal.sig) {
        return Err(RejectReason::BadVoteSignature);
    }

    let commit = domc
        .read_commit(reveal.cycle_id, &reveal.identity)
        .map_err(|e| RejectReason::Serialization(e.to_string()))?
        .ok_or(RejectReason::NoMatchingCommit)?;
    if DomcReveal::commit_hash(reveal.r_proposal, &reveal.salt) != commit.commit_hash {
        return Err(RejectReason::CommitMismatch);
    }
    // A second reveal inside the window supersedes the first; the store
    // stacks them so disconnect can restore the superseded vote.
    Ok(())
}

/// Store a validated reveal (pushing onto the supersession stack).
pub fn apply_reveal(reveal: &DomcReveal, domc: &mut dyn DomcStore) -> Result<(), KhuError> {
    domc.push_reveal(reveal)?;
    tracing::debug!(
        cycle = reveal.cycle_id,
        r = reveal.r_proposal,
        height = reveal.reveal_height,
        "applied DOMC reveal"
    );
    Ok(())
}

/// Remove the latest reveal for the voter during disconnect.
pub fn undo_reveal(reveal: &DomcReveal, domc: &mut dyn DomcStore) -> Result<(), KhuError> {
    let popped = domc.pop_reveal(reveal.cycle_id, &reveal.identity)?;
    if popped.as_ref() != Some(reveal) {
        return Err(FatalReason::UndoDataMissing(format!(
            "reveal by {} in cycle {}",
            reveal.identity, reveal.cycle_id
        ))
        .into());
    }
    Ok(())
}

/// Finalize the cycle ending at `height`: tally the live reveals, clamp
/// the median, journal the pre-update rates for the undo path.
pub fn finalize_cycle(
    state: &mut State,
    domc: &mut dyn DomcStore,
    height: u32,
) -> Result<(), KhuError> {
    let cycle_id = state.domc_cycle_start;
    if height != cycle_id + DOMC_CYCLE_LENGTH {
        return Err(FatalReason::HeightMismatch {
            expected: cycle_id + DOMC_CYCLE_LENGTH,
            got: height,
        }
        .into());
    }

    domc.write_rate_undo(
        height,
        &RateUndo {
            r_annual: state.r_annual,
            r_max_dynamic: state.r_max_dynamic,
        },
    )?;

    let reveals = domc.reveals_for_cycle(cycle_id)?;
    let proposals: Vec<u16> = reveals.iter().map(|r| r.r_proposal).collect();
    if let Some(median) = median_proposal(&proposals) {
        let clamped = median.min(state.r_max_dynamic);
        tracing::info!(
            cycle = cycle_id,
            votes = proposals.len(),
            median,
            clamped,
            "DOMC cycle finalized"
        );
        state.r_annual = clamped;
    } else {
        tracing::info!(cycle = cycle_id, "DOMC cycle finalized with no reveals");
    }
    Ok(())
}

/// Anchor the next cycle starting at `height` and refresh the dynamic cap.
pub fn initialize_cycle(state: &mut State, height: u32, activation_height: u32) {
    state.domc_cycle_start = height;
    state.domc_cycle_length = DOMC_CYCLE_LENGTH;
    state.domc_commit_start = height + DOMC_COMMIT_OFFSET;
    state.domc_reveal_deadline = height + DOMC_REVEAL_OFFSET;
    state.r_max_dynamic = r_max_dynamic_at(height, activation_height);
}

/// Reverse a boundary's finalize + initialize during disconnect.
///
/// The rates come from the explicit pre-image journal: the tally cannot
/// be recomputed because reveals may be removed in the same reorg.
pub fn undo_finalize_cycle(
    state: &mut State,
    domc: &mut dyn DomcStore,
    height: u32,
) -> Result<(), KhuError> {
    let undo = domc
        .read_rate_undo(height)?
        .ok_or_else(|| FatalReason::UndoDataMissing(format!("rate undo at {height}")))?;

    state.r_annual = undo.r_annual;
    state.r_max_dynamic = undo.r_max_dynamic;

    // Restore the previous cycle's anchors.
    let prev_start = height - DOMC_CYCLE_LENGTH;
    state.domc_cycle_start = prev_start;
    state.domc_cycle_length = DOMC_CYCLE_LENGTH;
    state.domc_commit_start = prev_start + DOMC_COMMIT_OFFSET;
    state.domc_reveal_deadline = prev_start + DOMC_REVEAL_OFFSET;

    domc.erase_rate_undo(height)?;
    tracing::debug!(height, "undone DOMC finalize");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use khu_core::crypto::KeyPair;
    use khu_core::masternodes::StaticRegistry;
    use khu_core::store::MemoryDomcStore;
    use khu_core::types::{Hash256, OutPoint};

    fn identity(seed: u8) -> OutPoint {
        OutPoint::new(Hash256([seed; 32]), 0)
    }

    fn registry_with(seeds: &[u8]) -> (StaticRegistry, Vec<KeyPair>) {
        let mut reg = StaticRegistry::new();
        let mut keys = Vec::new();
        for seed in seeds {
            let kp = KeyPair::from_secret_bytes([*seed; 32]);
            reg.insert(identity(*seed), kp.public_key());
            keys.push(kp);
        }
        (reg, keys)
    }

    fn signed_commit(kp: &KeyPair, seed: u8, cycle: u32, height: u32, r: u16, salt: u8) -> DomcCommit {
        let mut commit = DomcCommit {
            commit_hash: DomcReveal::commit_hash(r, &Hash256([salt; 32])),
            identity: identity(seed),
            cycle_id: cycle,
            commit_height: height,
            sig: vec![],
        };
        commit.sig = kp.sign(&commit.signing_message());
        commit
    }

    fn signed_reveal(kp: &KeyPair, seed: u8, cycle: u32, height: u32, r: u16, salt: u8) -> DomcReveal {
        let mut reveal = DomcReveal {
            r_proposal: r,
            salt: Hash256([salt; 32]),
            identity: identity(seed),
            cycle_id: cycle,
            reveal_height: height,
            sig: vec![],
        };
        reveal.sig = kp.sign(&reveal.signing_message());
        reveal
    }

    fn cycle_state(cycle_start: u32) -> State {
        let mut state = State::activation_base(0);
        initialize_cycle(&mut state, cycle_start, 0);
        state
    }

    // --- phases ---

    #[test]
    fn phase_windows() {
        let s = 0;
        assert!(!in_commit_phase(0, s));
        assert!(!in_commit_phase(DOMC_COMMIT_OFFSET - 1, s));
        assert!(in_commit_phase(DOMC_COMMIT_OFFSET, s));
        assert!(in_commit_phase(DOMC_REVEAL_OFFSET - 1, s));
        assert!(!in_commit_phase(DOMC_REVEAL_OFFSET, s));

        assert!(in_reveal_phase(DOMC_REVEAL_OFFSET, s));
        assert!(in_reveal_phase(DOMC_CYCLE_LENGTH - 1, s));
        assert!(!in_reveal_phase(DOMC_CYCLE_LENGTH, s));
    }

    #[test]
    fn cycle_boundary_predicate() {
        assert!(!is_cycle_boundary(0, 0));
        assert!(is_cycle_boundary(DOMC_CYCLE_LENGTH, 0));
        assert!(!is_cycle_boundary(DOMC_CYCLE_LENGTH + 1, 0));
        assert!(is_cycle_boundary(1_000 + DOMC_CYCLE_LENGTH, 1_000));
    }

    // --- r_max_dynamic schedule ---

    #[test]
    fn cap_starts_at_init() {
        assert_eq!(r_max_dynamic_at(0, 0), R_MAX_DYNAMIC_INIT);
        assert_eq!(r_max_dynamic_at(BLOCKS_PER_YEAR - 1, 0), R_MAX_DYNAMIC_INIT);
    }

    #[test]
    fn cap_decays_per_year() {
        assert_eq!(r_max_dynamic_at(BLOCKS_PER_YEAR, 0), R_MAX_DYNAMIC_INIT - 100);
        assert_eq!(r_max_dynamic_at(3 * BLOCKS_PER_YEAR, 0), R_MAX_DYNAMIC_INIT - 300);
    }

    #[test]
    fn cap_floors_at_700() {
        // 33 years of decay would go below the floor.
        assert_eq!(r_max_dynamic_at(40 * BLOCKS_PER_YEAR, 0), R_MAX_DYNAMIC_FLOOR);
        assert_eq!(r_max_dynamic_at(u32::MAX, 0), R_MAX_DYNAMIC_FLOOR);
    }

    // --- median ---

    #[test]
    fn median_empty_is_none() {
        assert_eq!(median_proposal(&[]), None);
    }

    #[test]
    fn median_odd_count() {
        assert_eq!(median_proposal(&[1_000, 1_800, 2_200, 3_900, 4_500]), Some(2_200));
    }

    #[test]
    fn median_even_count_takes_upper() {
        assert_eq!(median_proposal(&[1_000, 2_000]), Some(2_000));
        assert_eq!(median_proposal(&[4_000, 1_000, 2_000, 3_000]), Some(3_000));
    }

    #[test]
    fn median_single_vote() {
        assert_eq!(median_proposal(&[4_200]), Some(4_200));
    }

    // --- commit validation ---

    #[test]
    fn commit_accepted_in_window() {
        let (reg, keys) = registry_with(&[1]);
        let state = cycle_state(0);
        let domc = MemoryDomcStore::default();
        let h = DOMC_COMMIT_OFFSET + 5;
        let commit = signed_commit(&keys[0], 1, 0, h, 1_500, 9);
        check_commit(&commit, &state, &reg, &domc, h).unwrap();
    }

    #[test]
    fn commit_rejected_outside_window() {
        let (reg, keys) = registry_with(&[1]);
        let state = cycle_state(0);
        let domc = MemoryDomcStore::default();
        let h = DOMC_COMMIT_OFFSET - 1;
        let commit = signed_commit(&keys[0], 1, 0, h, 1_500, 9);
        assert_eq!(
            check_commit(&commit, &state, &reg, &domc, h),
            Err(RejectReason::OutsidePhaseWindow(h))
        );
    }

    #[test]
    fn commit_rejected_for_wrong_cycle() {
        let (reg, keys) = registry_with(&[1]);
        let state = cycle_state(0);
        let domc = MemoryDomcStore::default();
        let h = DOMC_COMMIT_OFFSET + 5;
        let commit = signed_commit(&keys[0], 1, 7, h, 1_500, 9);
        assert!(matches!(
            check_commit(&commit, &state, &reg, &domc, h),
            Err(RejectReason::WrongCycleId { .. })
        ));
    }

    #[test]
    fn commit_rejected_for_inactive_masternode() {
        let (_, keys) = registry_with(&[1]);
        let reg = StaticRegistry::new();
        let state = cycle_state(0);
        let domc = MemoryDomcStore::default();
        let h = DOMC_COMMIT_OFFSET + 5;
        let commit = signed_commit(&keys[0], 1, 0, h, 1_500, 9);
        assert_eq!(
            check_commit(&commit, &state, &reg, &domc, h),
            Err(RejectReason::MasternodeInactive)
        );
    }

    #[test]
    fn commit_rejected_for_bad_signature() {
        let (reg, keys) = registry_with(&[1]);
        let state = cycle_state(0);
        let domc = MemoryDomcStore::default();
        let h = DOMC_COMMIT_OFFSET + 5;
        let mut commit = signed_commit(&keys[0], 1, 0, h, 1_500, 9);
        commit.commit_hash = Hash256([0x55; 32]); // signature no longer covers this
        assert_eq!(
            check_commit(&commit, &state, &reg, &domc, h),
            Err(RejectReason::BadVoteSignature)
        );
    }

    #[test]
    fn second_commit_rejected() {
        let (reg, keys) = registry_with(&[1]);
        let state = cycle_state(0);
        let mut domc = MemoryDomcStore::default();
        let h = DOMC_COMMIT_OFFSET + 5;
        let commit = signed_commit(&keys[0], 1, 0, h, 1_500, 9);
        apply_commit(&commit, &mut domc).unwrap();

        let again = signed_commit(&keys[0], 1, 0, h + 1, 2_000, 10);
        assert_eq!(
            check_commit(&again, &state, &reg, &domc, h + 1),
            Err(RejectReason::DuplicateVote)
        );
    }

    // --- reveal validation ---

    fn committed_setup(r: u16, salt: u8) -> (StaticRegistry, Vec<KeyPair>, State, MemoryDomcStore) {
        let (reg, keys) = registry_with(&[1]);
        let state = cycle_state(0);
        let mut domc = MemoryDomcStore::default();
        let commit = signed_commit(&keys[0], 1, 0, DOMC_COMMIT_OFFSET + 1, r, salt);
        apply_commit(&commit, &mut domc).unwrap();
        (reg, keys, state, domc)
    }

    #[test]
    fn reveal_accepted_when_matching_commit() {
        let (reg, keys, state, domc) = committed_setup(1_500, 9);
        let h = DOMC_REVEAL_OFFSET + 5;
        let reveal = signed_reveal(&keys[0], 1, 0, h, 1_500, 9);
        check_reveal(&reveal, &state, &reg, &domc, h).unwrap();
    }

    #[test]
    fn reveal_rejected_without_commit() {
        let (reg, keys) = registry_with(&[1]);
        let state = cycle_state(0);
        let domc = MemoryDomcStore::default();
        let h = DOMC_REVEAL_OFFSET + 5;
        let reveal = signed_reveal(&keys[0], 1, 0, h, 1_500, 9);
        assert_eq!(
            check_reveal(&reveal, &state, &reg, &domc, h),
            Err(RejectReason::NoMatchingCommit)
        );
    }

    #[test]
    fn reveal_rejected_when_hash_differs() {
        let (reg, keys, state, domc) = committed_setup(1_500, 9);
        let h = DOMC_REVEAL_OFFSET + 5;
        // Revealing a different proposal than was committed.
        let reveal = signed_reveal(&keys[0], 1, 0, h, 1_600, 9);
        assert_eq!(
            check_reveal(&reveal, &state, &reg, &domc, h),
            Err(RejectReason::CommitMismatch)
        );
    }

    #[test]
    fn reveal_rejected_outside_window() {
        let (reg, keys, state, domc) = committed_setup(1_500, 9);
        let h = DOMC_REVEAL_OFFSET - 1;
        let reveal = signed_reveal(&keys[0], 1, 0, h, 1_500, 9);
        assert_eq!(
            check_reveal(&reveal, &state, &reg, &domc, h),
            Err(RejectReason::OutsidePhaseWindow(h))
        );
    }

    #[test]
    fn reveal_rejected_above_absolute_max() {
        let (reg, keys, state, domc) = committed_setup(5_001, 9);
        let h = DOMC_REVEAL_OFFSET + 5;
        let reveal = signed_reveal(&keys[0], 1, 0, h, 5_001, 9);
        assert_eq!(
            check_reveal(&reveal, &state, &reg, &domc, h),
            Err(RejectReason::ProposalOutOfRange(5_001))
        );
    }

    // --- finalize / undo ---

    fn finalize_with_reveals(proposals: &[u16], r_max_dynamic: u16) -> (State, MemoryDomcStore) {
        let seeds: Vec<u8> = (1..=proposals.len() as u8).collect();
        let (_, keys) = registry_with(&seeds);
        let mut state = cycle_state(0);
        state.r_max_dynamic = r_max_dynamic;
        let mut domc = MemoryDomcStore::default();
        for (i, r) in proposals.iter().enumerate() {
            let reveal = signed_reveal(&keys[i], seeds[i], 0, DOMC_REVEAL_OFFSET + 1, *r, 9);
            apply_reveal(&reveal, &mut domc).unwrap();
        }
        finalize_cycle(&mut state, &mut domc, DOMC_CYCLE_LENGTH).unwrap();
        (state, domc)
    }

    #[test]
    fn finalize_applies_median() {
        let (state, _) = finalize_with_reveals(&[1_000, 1_800, 2_200, 3_900, 4_500], 3_000);
        assert_eq!(state.r_annual, 2_200);
    }

    #[test]
    fn finalize_clamps_to_dynamic_cap() {
        let (state, _) = finalize_with_reveals(&[3_500, 3_700, 3_900], 3_000);
        assert_eq!(state.r_annual, 3_000);
    }

    #[test]
    fn finalize_without_reveals_keeps_rate() {
        let mut state = cycle_state(0);
        let before = state.r_annual;
        let mut domc = MemoryDomcStore::default();
        finalize_cycle(&mut state, &mut domc, DOMC_CYCLE_LENGTH).unwrap();
        assert_eq!(state.r_annual, before);
    }

    #[test]
    fn finalize_journals_previous_rates() {
        let (_, domc) = finalize_with_reveals(&[2_000], 3_000);
        let undo = domc.read_rate_undo(DOMC_CYCLE_LENGTH).unwrap().unwrap();
        assert_eq!(undo.r_annual, khu_core::constants::R_DEFAULT);
        assert_eq!(undo.r_max_dynamic, 3_000);
    }

    #[test]
    fn undo_restores_rates_and_anchors() {
        let (mut state, mut domc) = finalize_with_reveals(&[2_000], 3_000);
        initialize_cycle(&mut state, DOMC_CYCLE_LENGTH, 0);
        assert_eq!(state.domc_cycle_start, DOMC_CYCLE_LENGTH);
        assert_eq!(state.r_annual, 2_000);

        undo_finalize_cycle(&mut state, &mut domc, DOMC_CYCLE_LENGTH).unwrap();
        assert_eq!(state.r_annual, khu_core::constants::R_DEFAULT);
        assert_eq!(state.r_max_dynamic, 3_000);
        assert_eq!(state.domc_cycle_start, 0);
        assert_eq!(state.domc_commit_start, DOMC_COMMIT_OFFSET);
        assert_eq!(domc.read_rate_undo(DOMC_CYCLE_LENGTH).unwrap(), None);
    }

    #[test]
    fn undo_reveal_requires_exact_top_of_stack() {
        let (_, keys) = registry_with(&[1]);
        let mut domc = MemoryDomcStore::default();
        let r1 = signed_reveal(&keys[0], 1, 0, DOMC_REVEAL_OFFSET + 1, 1_000, 9);
        let r2 = signed_reveal(&keys[0], 1, 0, DOMC_REVEAL_OFFSET + 2, 2_000, 9);
        apply_reveal(&r1, &mut domc).unwrap();
        apply_reveal(&r2, &mut domc).unwrap();

        // Undo out of order is a fatal inconsistency.
        assert!(undo_reveal(&r1, &mut domc).is_err());
    }

    #[test]
    fn reveal_supersession_round_trip() {
        let (_, keys) = registry_with(&[1]);
        let mut domc = MemoryDomcStore::default();
        let r1 = signed_reveal(&keys[0], 1, 0, DOMC_REVEAL_OFFSET + 1, 1_000, 9);
        let r2 = signed_reveal(&keys[0], 1, 0, DOMC_REVEAL_OFFSET + 2, 2_000, 9);
        apply_reveal(&r1, &mut domc).unwrap();
        apply_reveal(&r2, &mut domc).unwrap();

        assert_eq!(domc.reveals_for_cycle(0).unwrap()[0].r_proposal, 2_000);
        undo_reveal(&r2, &mut domc).unwrap();
        assert_eq!(domc.reveals_for_cycle(0).unwrap()[0].r_proposal, 1_000);
        undo_reveal(&r1, &mut domc).unwrap();
        assert!(domc.reveals_for_cycle(0).unwrap().is_empty());
    }

    proptest::proptest! {
        #[test]
        fn median_is_a_member_and_upper(votes in proptest::collection::vec(0u16..=5_000, 1..20)) {
            let m = median_proposal(&votes).unwrap();
            proptest::prop_assert!(votes.contains(&m));
            let below = votes.iter().filter(|v| **v <= m).count();
            // At least half the votes are at or below the upper median.
            proptest::prop_assert!(below * 2 >= votes.len());
        }
    }
}
