//! Quorum state commitments and the finality gate.
//!
//! Each persisted state has a canonical commitment hash over the
//! bonded-monetary subset `(C, U, Cr, Ur, height)`. Masternode quorums
//! sign that hash; once a commitment with a 60% signer share and a valid
//! aggregate signature is stored, the height is finalized: it can never
//! be erased, and no conflicting state may be connected there.

use khu_core::constants::{QUORUM_THRESHOLD_DEN, QUORUM_THRESHOLD_NUM};
use khu_core::error::{KhuError, RejectReason, ReorgReason};
use khu_core::masternodes::QuorumVerifier;
use khu_core::state::State;
use khu_core::store::CommitmentStore;
use khu_core::types::{Hash256, StateCommitment};

/// Whether the signer bitset clears the 60% quorum threshold.
pub fn has_quorum(signers: &[bool]) -> bool {
    if signers.is_empty() {
        return false;
    }
    let signed = signers.iter().filter(|s| **s).count();
    signed * QUORUM_THRESHOLD_DEN >= signers.len() * QUORUM_THRESHOLD_NUM
}

/// Build an unsigned commitment for `state`; the quorum fills in the
/// signature fields through its own collection round.
pub fn create_commitment(state: &State, quorum_hash: Hash256) -> StateCommitment {
    StateCommitment {
        height: state.height,
        state_hash: state.commitment_hash(),
        quorum_hash,
        aggregate_sig: Vec::new(),
        signers: Vec::new(),
    }
}

/// Verify everything about a commitment that does not need local state:
/// structural fields, the quorum threshold, and the aggregate signature
/// through the injected verifier. The signature check is never skipped.
///
/// A commitment may arrive from the quorum network before this node has
/// connected the height it pins, so this is the acceptance gate; the
/// state-side check happens wherever the pinned state is known.
pub fn verify_quorum_commitment(
    commitment: &StateCommitment,
    quorum: &dyn QuorumVerifier,
) -> Result<(), RejectReason> {
    if commitment.height == 0 || commitment.state_hash.is_zero() || commitment.quorum_hash.is_zero()
    {
        return Err(RejectReason::CommitmentHashMismatch(commitment.height));
    }
    if !has_quorum(&commitment.signers) {
        return Err(RejectReason::QuorumInsufficient {
            signed: commitment.signer_count(),
            total: commitment.signers.len(),
        });
    }
    if !quorum.verify_aggregate(
        &commitment.quorum_hash,
        commitment.state_hash.as_bytes(),
        &commitment.aggregate_sig,
        &commitment.signers,
    ) {
        return Err(RejectReason::AggregateSigInvalid);
    }
    Ok(())
}

/// Full verification of a commitment against the state it claims to pin.
pub fn verify_commitment(
    commitment: &StateCommitment,
    state: &State,
    quorum: &dyn QuorumVerifier,
) -> Result<(), RejectReason> {
    verify_quorum_commitment(commitment, quorum)?;
    if commitment.height != state.height {
        return Err(RejectReason::CommitmentHeightMismatch {
            expected: state.height,
            got: commitment.height,
        });
    }
    if commitment.state_hash != state.commitment_hash() {
        return Err(RejectReason::CommitmentHashMismatch(commitment.height));
    }
    Ok(())
}

/// Store a verified commitment and advance the finality watermark.
pub fn accept_commitment(
    commitment: &StateCommitment,
    store: &mut dyn CommitmentStore,
) -> Result<(), KhuError> {
    store.write_commitment(commitment)?;
    store.set_latest_finalized_height(commitment.height)?;
    tracing::info!(
        height = commitment.height,
        signers = commitment.signer_count(),
        "state commitment finalized"
    );
    Ok(())
}

/// Reject any chain whose state at a finalized height diverges from the
/// pinned hash.
pub fn check_reorg_conflict(
    store: &dyn CommitmentStore,
    height: u32,
    candidate_state_hash: &Hash256,
) -> Result<(), KhuError> {
    if let Some(commitment) = store.read_commitment(height)? {
        if commitment.state_hash != *candidate_state_hash {
            return Err(ReorgReason::FinalityConflict(height).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use khu_core::constants::COIN;
    use khu_core::store::MemoryCommitmentStore;

    /// Verifier that accepts any aggregate signature.
    struct AcceptQuorum;
    impl QuorumVerifier for AcceptQuorum {
        fn verify_aggregate(&self, _: &Hash256, _: &[u8], _: &[u8], _: &[bool]) -> bool {
            true
        }
    }

    /// Verifier that rejects every aggregate signature.
    struct RejectQuorum;
    impl QuorumVerifier for RejectQuorum {
        fn verify_aggregate(&self, _: &Hash256, _: &[u8], _: &[u8], _: &[bool]) -> bool {
            false
        }
    }

    fn state_at(height: u32) -> State {
        let mut s = State::default();
        s.height = height;
        s.c = 100 * COIN;
        s.u = 100 * COIN;
        s
    }

    fn signed_commitment(state: &State, signers: Vec<bool>) -> StateCommitment {
        let mut c = create_commitment(state, Hash256([0x51; 32]));
        c.aggregate_sig = vec![0xAB; 96];
        c.signers = signers;
        c
    }

    // --- quorum threshold ---

    #[test]
    fn empty_bitset_has_no_quorum() {
        assert!(!has_quorum(&[]));
    }

    #[test]
    fn quorum_at_exactly_sixty_percent() {
        // 3 of 5 signers.
        assert!(has_quorum(&[true, true, true, false, false]));
        // 2 of 5 is below.
        assert!(!has_quorum(&[true, true, false, false, false]));
    }

    #[test]
    fn quorum_rounding_works_for_awkward_sizes() {
        // 60% of 7 = 4.2, so 4 signers are not enough; 5 are.
        let mut signers = vec![true, true, true, true, false, false, false];
        assert!(!has_quorum(&signers));
        signers[4] = true;
        assert!(has_quorum(&signers));
    }

    #[test]
    fn full_bitset_has_quorum() {
        assert!(has_quorum(&[true; 10]));
    }

    // --- verification ---

    #[test]
    fn verify_accepts_valid_commitment() {
        let state = state_at(5);
        let c = signed_commitment(&state, vec![true; 5]);
        verify_commitment(&c, &state, &AcceptQuorum).unwrap();
    }

    #[test]
    fn verify_rejects_hash_mismatch() {
        let state = state_at(5);
        let mut c = signed_commitment(&state, vec![true; 5]);
        c.state_hash = Hash256([7; 32]);
        assert_eq!(
            verify_commitment(&c, &state, &AcceptQuorum),
            Err(RejectReason::CommitmentHashMismatch(5))
        );
    }

    #[test]
    fn verify_rejects_height_mismatch() {
        let state = state_at(5);
        let mut c = signed_commitment(&state, vec![true; 5]);
        c.height = 6;
        assert!(matches!(
            verify_commitment(&c, &state, &AcceptQuorum),
            Err(RejectReason::CommitmentHeightMismatch { .. })
        ));
    }

    #[test]
    fn verify_rejects_insufficient_quorum() {
        let state = state_at(5);
        let c = signed_commitment(&state, vec![true, false, false, false, false]);
        assert_eq!(
            verify_commitment(&c, &state, &AcceptQuorum),
            Err(RejectReason::QuorumInsufficient { signed: 1, total: 5 })
        );
    }

    #[test]
    fn verify_always_checks_aggregate_signature() {
        let state = state_at(5);
        let c = signed_commitment(&state, vec![true; 5]);
        assert_eq!(
            verify_commitment(&c, &state, &RejectQuorum),
            Err(RejectReason::AggregateSigInvalid)
        );
    }

    // --- acceptance and finality ---

    #[test]
    fn accept_advances_finalized_height() {
        let state = state_at(5);
        let c = signed_commitment(&state, vec![true; 5]);
        let mut store = MemoryCommitmentStore::default();
        accept_commitment(&c, &mut store).unwrap();

        assert_eq!(store.latest_finalized_height().unwrap(), Some(5));
        assert!(store.have_commitment(5).unwrap());
    }

    #[test]
    fn reorg_conflict_detected() {
        let state = state_at(5);
        let c = signed_commitment(&state, vec![true; 5]);
        let mut store = MemoryCommitmentStore::default();
        accept_commitment(&c, &mut store).unwrap();

        // Same hash passes.
        check_reorg_conflict(&store, 5, &state.commitment_hash()).unwrap();

        // Divergent hash is refused.
        let mut other = state.clone();
        other.c += COIN;
        other.u += COIN;
        let err = check_reorg_conflict(&store, 5, &other.commitment_hash()).unwrap_err();
        assert_eq!(err, KhuError::Reorg(ReorgReason::FinalityConflict(5)));
    }

    #[test]
    fn no_commitment_means_no_conflict() {
        let store = MemoryCommitmentStore::default();
        check_reorg_conflict(&store, 99, &Hash256([1; 32])).unwrap();
    }
}
