//! Builders and fixtures shared by the integration tests.

use std::path::Path;
use std::sync::Arc;

use khu_consensus::{KhuEngine, Params};
use khu_core::coins::{KhuCoin, KhuCoinsView};
use khu_core::crypto::KeyPair;
use khu_core::masternodes::{QuorumVerifier, ShieldedVerifier, StaticRegistry};
use khu_core::note::{Memo, MemoFields, Note, ShieldedOutput, ShieldedSpend};
use khu_core::state::State;
use khu_core::store::{KhuStores, MemoryStores, NoteStore, StateStore};
use khu_core::types::{
    DomcCommit, DomcReveal, Hash256, KhuBlock, KhuTransaction, MintPayload, OutPoint, Payload,
    RedeemPayload, StakePayload, StateCommitment, TxOutput, UnstakePayload,
};
use khu_store::{RocksStores, StoreConfig};

/// Quorum verifier that accepts every aggregate signature.
pub struct TestQuorum;

impl QuorumVerifier for TestQuorum {
    fn verify_aggregate(&self, _: &Hash256, _: &[u8], _: &[u8], _: &[bool]) -> bool {
        true
    }
}

/// Shielded verifier that accepts every spend proof.
pub struct TestShielded;

impl ShieldedVerifier for TestShielded {
    fn verify_spend(&self, _: &ShieldedSpend) -> bool {
        true
    }
}

pub fn dest(seed: u8) -> Hash256 {
    Hash256([seed; 32])
}

pub fn identity(seed: u8) -> OutPoint {
    OutPoint::new(Hash256([seed; 32]), 0)
}

/// Engine over fresh in-memory stores, activation at height 0.
pub fn memory_engine() -> KhuEngine<MemoryStores> {
    engine_over(MemoryStores::new(), StaticRegistry::new())
}

/// Engine over pre-seeded in-memory stores.
pub fn engine_over(stores: MemoryStores, registry: StaticRegistry) -> KhuEngine<MemoryStores> {
    KhuEngine::new(
        stores,
        Params::default(),
        Arc::new(registry),
        Arc::new(TestQuorum),
        Arc::new(TestShielded),
    )
    .expect("engine init")
}

/// Engine over a RocksDB store rooted at `path`.
pub fn rocks_engine(path: &Path) -> KhuEngine<RocksStores> {
    let config = StoreConfig {
        data_dir: path.to_path_buf(),
        cache_size: 8 << 20,
        wipe: false,
    };
    KhuEngine::new(
        RocksStores::open(&config).expect("open stores"),
        Params::default(),
        Arc::new(StaticRegistry::new()),
        Arc::new(TestQuorum),
        Arc::new(TestShielded),
    )
    .expect("engine init")
}

/// Move the tip of pre-seeded stores to `height` without connecting the
/// intermediate blocks. The planted state copies the current tip's
/// scalars; `last_yield_height` is pinned to `height` so no back-dated
/// yield pass fires on the next connect unless a test re-arms it.
pub fn jump_to(stores: &mut MemoryStores, height: u32) {
    let best = stores
        .state()
        .best_height()
        .expect("best height")
        .expect("seeded chain");
    let mut state = stores
        .state()
        .read_state(best)
        .expect("read state")
        .expect("tip state");
    state.height = height;
    state.block_hash = Hash256([0xEE; 32]);
    state.last_yield_height = height;
    let split = stores.split();
    split.state.write_state(&state).expect("write state");
    split.state.set_best_height(height).expect("set best");
}

/// Rewrite one field of the tip state in place (for seeding scenarios).
pub fn edit_tip_state(stores: &mut MemoryStores, edit: impl FnOnce(&mut State)) {
    let best = stores
        .state()
        .best_height()
        .expect("best height")
        .expect("seeded chain");
    let mut state = stores
        .state()
        .read_state(best)
        .expect("read state")
        .expect("tip state");
    edit(&mut state);
    stores.split().state.write_state(&state).expect("write state");
}

pub fn block(height: u32, txs: Vec<KhuTransaction>) -> KhuBlock {
    KhuBlock {
        height,
        hash: Hash256([(height % 251) as u8 + 1; 32]),
        txs,
    }
}

/// Connect empty blocks for every height in `range`.
pub fn connect_span<S: KhuStores>(
    engine: &KhuEngine<S>,
    range: std::ops::RangeInclusive<u32>,
) {
    for height in range {
        engine
            .connect_block(&block(height, vec![]))
            .unwrap_or_else(|e| panic!("connect empty block {height}: {e}"));
    }
}

pub fn mint_tx(amount: i64, to: Hash256) -> KhuTransaction {
    KhuTransaction {
        version: 1,
        inputs: vec![],
        outputs: vec![TxOutput { value: amount, dest: to }],
        shielded_output: None,
        shielded_spend: None,
        payload: Payload::Mint(MintPayload { amount, dest: to }),
    }
}

pub fn redeem_tx(amount: i64, inputs: Vec<OutPoint>, to: Hash256) -> KhuTransaction {
    KhuTransaction {
        version: 1,
        inputs,
        outputs: vec![TxOutput { value: amount, dest: to }],
        shielded_output: None,
        shielded_spend: None,
        payload: Payload::Redeem(RedeemPayload { amount, dest: to }),
    }
}

pub fn stake_tx(amount: i64, input: OutPoint, height: u32, note_seed: u8) -> KhuTransaction {
    KhuTransaction {
        version: 1,
        inputs: vec![input],
        outputs: vec![],
        shielded_output: Some(ShieldedOutput {
            cm: Hash256([note_seed; 32]),
            nullifier: Hash256([note_seed ^ 0xFF; 32]),
            memo: Memo::encode(&MemoFields {
                stake_start_height: height,
                amount,
                ur_accumulated: 0,
            }),
        }),
        shielded_spend: None,
        payload: Payload::Stake(StakePayload { amount }),
    }
}

pub fn unstake_tx(note: &Note, anchor: Hash256, payout: i64, to: Hash256) -> KhuTransaction {
    KhuTransaction {
        version: 1,
        inputs: vec![],
        outputs: vec![TxOutput { value: payout, dest: to }],
        shielded_output: None,
        shielded_spend: Some(ShieldedSpend {
            nullifier: note.nullifier,
            anchor,
            proof: vec![0; 192],
            cv: Hash256([0x0C; 32]),
            rk: Hash256([0x0D; 32]),
        }),
        payload: Payload::Unstake(UnstakePayload { cm: note.cm }),
    }
}

/// Registry with one ed25519 masternode per seed.
pub fn registry_with(seeds: &[u8]) -> (StaticRegistry, Vec<KeyPair>) {
    let mut registry = StaticRegistry::new();
    let mut keys = Vec::new();
    for seed in seeds {
        let kp = KeyPair::from_secret_bytes([*seed; 32]);
        registry.insert(identity(*seed), kp.public_key());
        keys.push(kp);
    }
    (registry, keys)
}

pub fn commit_vote_tx(
    kp: &KeyPair,
    seed: u8,
    cycle_id: u32,
    height: u32,
    r_proposal: u16,
    salt: u8,
) -> KhuTransaction {
    let mut commit = DomcCommit {
        commit_hash: DomcReveal::commit_hash(r_proposal, &Hash256([salt; 32])),
        identity: identity(seed),
        cycle_id,
        commit_height: height,
        sig: vec![],
    };
    commit.sig = kp.sign(&commit.signing_message());
    KhuTransaction {
        version: 1,
        inputs: vec![],
        outputs: vec![],
        shielded_output: None,
        shielded_spend: None,
        payload: Payload::DomcCommit(commit),
    }
}

pub fn reveal_vote_tx(
    kp: &KeyPair,
    seed: u8,
    cycle_id: u32,
    height: u32,
    r_proposal: u16,
    salt: u8,
) -> KhuTransaction {
    let mut reveal = DomcReveal {
        r_proposal,
        salt: Hash256([salt; 32]),
        identity: identity(seed),
        cycle_id,
        reveal_height: height,
        sig: vec![],
    };
    reveal.sig = kp.sign(&reveal.signing_message());
    KhuTransaction {
        version: 1,
        inputs: vec![],
        outputs: vec![],
        shielded_output: None,
        shielded_spend: None,
        payload: Payload::DomcReveal(reveal),
    }
}

/// Commitment over `state` signed by an always-accepted quorum.
pub fn quorum_commitment(state: &State) -> StateCommitment {
    StateCommitment {
        height: state.height,
        state_hash: state.commitment_hash(),
        quorum_hash: Hash256([0x51; 32]),
        aggregate_sig: vec![0xAB; 96],
        signers: vec![true; 5],
    }
}

/// The single KHU_T coin outpoint a mint transaction creates.
pub fn minted_outpoint(tx: &KhuTransaction) -> OutPoint {
    OutPoint::new(tx.txid().expect("txid"), 0)
}

/// Read a coin through an engine's stores.
pub fn coin_of<S: KhuStores>(engine: &KhuEngine<S>, outpoint: &OutPoint) -> Option<KhuCoin> {
    engine.stores().coins().coin(outpoint).expect("coin read")
}

/// Read a note through an engine's stores.
pub fn note_of<S: KhuStores>(engine: &KhuEngine<S>, cm: &Hash256) -> Option<Note> {
    engine.stores().notes().read_note(cm).expect("note read")
}

/// Current anchor of an engine's note tree.
pub fn anchor_of<S: KhuStores>(engine: &KhuEngine<S>) -> Hash256 {
    engine.stores().notes().current_anchor().expect("anchor")
}
