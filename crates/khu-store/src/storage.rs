//! RocksDB-backed implementations of every KHU store trait.
//!
//! One database, one column family per logical store, single-byte key
//! prefixes inside each family so records never collide. All writes
//! between [`KhuStores::begin_block`] and
//! [`commit_block`](KhuStores::commit_block) are staged in a pending
//! overlay and published as one atomic [`WriteBatch`]; reads during the
//! block observe the overlay, readers outside it never see a partially
//! applied block.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};

use khu_core::coins::{KhuCoin, KhuCoinsView};
use khu_core::error::{FatalReason, KhuError, StoreError};
use khu_core::note::{Note, NoteCommitmentTree};
use khu_core::state::State;
use khu_core::store::{
    BlockUndo, CommitmentStore, DomcStore, KhuStores, NoteStore, RateUndo, StateStore, StoresMut,
};
use khu_core::types::{DomcCommit, DomcReveal, Hash256, KhuBlock, OutPoint, StateCommitment};

use crate::config::StoreConfig;

// --- Column family names ---

const CF_STATE: &str = "state";
const CF_COINS: &str = "khu_utxo";
const CF_NOTES: &str = "notes";
const CF_COMMITMENTS: &str = "commitments";
const CF_DOMC: &str = "domc";

const ALL_CFS: &[&str] = &[CF_STATE, CF_COINS, CF_NOTES, CF_COMMITMENTS, CF_DOMC];

// --- In-family key prefixes ---

const K_STATE: u8 = b'S';
const K_BLOCK: u8 = b'K';
const K_UNDO: u8 = b'D';
const K_BEST: u8 = b'B';

const K_COIN: u8 = b'U';

const K_NOTE: u8 = b'T';
const K_ANCHOR: u8 = b'A';
const K_NULLIFIER: u8 = b'N';
const K_LINK: u8 = b'L';
const K_LIVE_ANCHOR: u8 = b'R';

const K_COMMITMENT: u8 = b'C';
const K_FINALIZED: u8 = b'L';

const K_DOMC_COMMIT: u8 = b'C';
const K_DOMC_REVEAL: u8 = b'R';
const K_RATE_UNDO: u8 = b'U';

// --- Key builders (big-endian heights keep range scans ordered) ---

fn height_key(prefix: u8, height: u32) -> [u8; 5] {
    let mut key = [0u8; 5];
    key[0] = prefix;
    key[1..].copy_from_slice(&height.to_be_bytes());
    key
}

fn hash_key(prefix: u8, hash: &Hash256) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[0] = prefix;
    key[1..].copy_from_slice(hash.as_bytes());
    key
}

fn outpoint_key(prefix: u8, outpoint: &OutPoint) -> [u8; 37] {
    let mut key = [0u8; 37];
    key[0] = prefix;
    key[1..].copy_from_slice(&outpoint.to_key_bytes());
    key
}

fn vote_key(prefix: u8, cycle_id: u32, identity: &OutPoint) -> [u8; 41] {
    let mut key = [0u8; 41];
    key[0] = prefix;
    key[1..5].copy_from_slice(&cycle_id.to_be_bytes());
    key[5..].copy_from_slice(&identity.to_key_bytes());
    key
}

// --- Codec helpers ---

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(value)
}

fn backend(e: rocksdb::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Writes staged since `begin_block`. `None` value means deletion.
#[derive(Default)]
struct Pending {
    writes: BTreeMap<(&'static str, Vec<u8>), Option<Vec<u8>>>,
}

/// The database plus the pending per-block overlay, shared by all
/// column-family views.
struct Shared {
    db: DB,
    pending: Mutex<Option<Pending>>,
}

impl Shared {
    fn cf(&self, name: &'static str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family: {name}")))
    }

    fn get(&self, cf_name: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(pending) = self.pending.lock().as_ref() {
            if let Some(staged) = pending.writes.get(&(cf_name, key.to_vec())) {
                return Ok(staged.clone());
            }
        }
        let cf = self.cf(cf_name)?;
        self.db.get_cf(cf, key).map_err(backend)
    }

    fn put(&self, cf_name: &'static str, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        let mut guard = self.pending.lock();
        match guard.as_mut() {
            Some(pending) => {
                pending.writes.insert((cf_name, key), Some(value));
                Ok(())
            }
            None => {
                drop(guard);
                let cf = self.cf(cf_name)?;
                self.db.put_cf(cf, key, value).map_err(backend)
            }
        }
    }

    fn delete(&self, cf_name: &'static str, key: Vec<u8>) -> Result<(), StoreError> {
        let mut guard = self.pending.lock();
        match guard.as_mut() {
            Some(pending) => {
                pending.writes.insert((cf_name, key), None);
                Ok(())
            }
            None => {
                drop(guard);
                let cf = self.cf(cf_name)?;
                self.db.delete_cf(cf, key).map_err(backend)
            }
        }
    }

    fn begin(&self) {
        *self.pending.lock() = Some(Pending::default());
    }

    fn commit(&self) -> Result<(), StoreError> {
        let Some(pending) = self.pending.lock().take() else {
            return Ok(());
        };
        let mut batch = WriteBatch::default();
        for ((cf_name, key), value) in &pending.writes {
            let cf = self.cf(*cf_name)?;
            match value {
                Some(bytes) => batch.put_cf(cf, key, bytes),
                None => batch.delete_cf(cf, key),
            }
        }
        self.db.write(batch).map_err(backend)
    }

    fn abort(&self) {
        *self.pending.lock() = None;
    }

    /// Staged entries of one family under `prefix`.
    fn overlay_prefix(&self, cf_name: &'static str, prefix: u8) -> BTreeMap<Vec<u8>, Option<Vec<u8>>> {
        match self.pending.lock().as_ref() {
            Some(pending) => pending
                .writes
                .iter()
                .filter(|((name, key), _)| *name == cf_name && key.first() == Some(&prefix))
                .map(|((_, key), value)| (key.clone(), value.clone()))
                .collect(),
            None => BTreeMap::new(),
        }
    }

    /// Merged (database + overlay) entries under `prefix`, key-ordered.
    fn scan_prefix(
        &self,
        cf_name: &'static str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let overlay = match self.pending.lock().as_ref() {
            Some(pending) => pending
                .writes
                .iter()
                .filter(|((name, key), _)| *name == cf_name && key.starts_with(prefix))
                .map(|((_, key), value)| (key.clone(), value.clone()))
                .collect::<BTreeMap<_, _>>(),
            None => BTreeMap::new(),
        };

        let cf = self.cf(cf_name)?;
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(backend)?;
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.to_vec(), value.to_vec());
        }
        for (key, value) in overlay {
            match value {
                Some(bytes) => {
                    merged.insert(key, bytes);
                }
                None => {
                    merged.remove(&key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

/// State records, block bodies, undo journals, and the best height.
pub struct StateCf {
    shared: Arc<Shared>,
}

impl StateStore for StateCf {
    fn write_state(&mut self, state: &State) -> Result<(), StoreError> {
        self.shared
            .put(CF_STATE, height_key(K_STATE, state.height).to_vec(), encode(state)?)
    }

    fn read_state(&self, height: u32) -> Result<Option<State>, StoreError> {
        self.shared
            .get(CF_STATE, &height_key(K_STATE, height))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn erase_state(&mut self, height: u32) -> Result<(), StoreError> {
        self.shared.delete(CF_STATE, height_key(K_STATE, height).to_vec())
    }

    fn write_block(&mut self, block: &KhuBlock) -> Result<(), StoreError> {
        self.shared
            .put(CF_STATE, height_key(K_BLOCK, block.height).to_vec(), encode(block)?)
    }

    fn read_block(&self, height: u32) -> Result<Option<KhuBlock>, StoreError> {
        self.shared
            .get(CF_STATE, &height_key(K_BLOCK, height))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn erase_block(&mut self, height: u32) -> Result<(), StoreError> {
        self.shared.delete(CF_STATE, height_key(K_BLOCK, height).to_vec())
    }

    fn write_block_undo(&mut self, height: u32, undo: &BlockUndo) -> Result<(), StoreError> {
        self.shared
            .put(CF_STATE, height_key(K_UNDO, height).to_vec(), encode(undo)?)
    }

    fn read_block_undo(&self, height: u32) -> Result<Option<BlockUndo>, StoreError> {
        self.shared
            .get(CF_STATE, &height_key(K_UNDO, height))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn erase_block_undo(&mut self, height: u32) -> Result<(), StoreError> {
        self.shared.delete(CF_STATE, height_key(K_UNDO, height).to_vec())
    }

    fn best_height(&self) -> Result<Option<u32>, StoreError> {
        match self.shared.get(CF_STATE, &[K_BEST])? {
            Some(bytes) if bytes.len() == 4 => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes);
                Ok(Some(u32::from_le_bytes(buf)))
            }
            Some(_) => Err(StoreError::Codec("invalid best-height length".into())),
            None => Ok(None),
        }
    }

    fn set_best_height(&mut self, height: u32) -> Result<(), StoreError> {
        self.shared
            .put(CF_STATE, vec![K_BEST], height.to_le_bytes().to_vec())
    }
}

/// KHU_T colored coins.
pub struct CoinCf {
    shared: Arc<Shared>,
}

impl KhuCoinsView for CoinCf {
    fn coin(&self, outpoint: &OutPoint) -> Result<Option<KhuCoin>, StoreError> {
        self.shared
            .get(CF_COINS, &outpoint_key(K_COIN, outpoint))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn add_coin(&mut self, outpoint: OutPoint, coin: KhuCoin) -> Result<(), StoreError> {
        if self.coin(&outpoint)?.is_some() {
            return Err(StoreError::Backend(format!("coin exists: {outpoint}")));
        }
        self.shared
            .put(CF_COINS, outpoint_key(K_COIN, &outpoint).to_vec(), encode(&coin)?)
    }

    fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Option<KhuCoin>, StoreError> {
        let existing = self.coin(outpoint)?;
        if existing.is_some() {
            self.shared
                .delete(CF_COINS, outpoint_key(K_COIN, outpoint).to_vec())?;
        }
        Ok(existing)
    }
}

/// Notes, nullifiers, anchors.
pub struct NoteCf {
    shared: Arc<Shared>,
}

impl NoteStore for NoteCf {
    fn write_note(&mut self, note: &Note) -> Result<(), StoreError> {
        self.shared
            .put(CF_NOTES, hash_key(K_NOTE, &note.cm).to_vec(), encode(note)?)
    }

    fn read_note(&self, cm: &Hash256) -> Result<Option<Note>, StoreError> {
        self.shared
            .get(CF_NOTES, &hash_key(K_NOTE, cm))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn erase_note(&mut self, cm: &Hash256) -> Result<(), StoreError> {
        self.shared.delete(CF_NOTES, hash_key(K_NOTE, cm).to_vec())
    }

    fn update_notes(
        &mut self,
        visit: &mut dyn FnMut(&mut Note) -> Result<bool, FatalReason>,
    ) -> Result<(), KhuError> {
        // Stream the database snapshot, overlaying any writes staged in
        // the current block, then visit overlay-only notes (created
        // earlier in this very block).
        let overlay = self.shared.overlay_prefix(CF_NOTES, K_NOTE);
        let mut visited: Vec<Vec<u8>> = Vec::new();

        let cf = self.shared.cf(CF_NOTES)?;
        let iter = self
            .shared
            .db
            .iterator_cf(cf, IteratorMode::From(&[K_NOTE], Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(backend)?;
            if key.first() != Some(&K_NOTE) {
                break;
            }
            let bytes = match overlay.get(key.as_ref()) {
                Some(None) => continue,
                Some(Some(staged)) => staged.clone(),
                None => value.to_vec(),
            };
            visited.push(key.to_vec());
            let mut note: Note = decode(&bytes)?;
            if visit(&mut note)? {
                self.shared.put(CF_NOTES, key.to_vec(), encode(&note)?)?;
            }
        }

        for (key, value) in overlay {
            if visited.contains(&key) {
                continue;
            }
            let Some(bytes) = value else { continue };
            let mut note: Note = decode(&bytes)?;
            if visit(&mut note)? {
                self.shared.put(CF_NOTES, key, encode(&note)?)?;
            }
        }
        Ok(())
    }

    fn mark_nullifier_spent(&mut self, nullifier: &Hash256) -> Result<(), StoreError> {
        self.shared
            .put(CF_NOTES, hash_key(K_NULLIFIER, nullifier).to_vec(), vec![1])
    }

    fn is_nullifier_spent(&self, nullifier: &Hash256) -> Result<bool, StoreError> {
        Ok(self
            .shared
            .get(CF_NOTES, &hash_key(K_NULLIFIER, nullifier))?
            .is_some())
    }

    fn clear_nullifier(&mut self, nullifier: &Hash256) -> Result<(), StoreError> {
        self.shared
            .delete(CF_NOTES, hash_key(K_NULLIFIER, nullifier).to_vec())
    }

    fn write_nullifier_link(&mut self, nullifier: &Hash256, cm: &Hash256) -> Result<(), StoreError> {
        self.shared.put(
            CF_NOTES,
            hash_key(K_LINK, nullifier).to_vec(),
            cm.as_bytes().to_vec(),
        )
    }

    fn read_nullifier_link(&self, nullifier: &Hash256) -> Result<Option<Hash256>, StoreError> {
        match self.shared.get(CF_NOTES, &hash_key(K_LINK, nullifier))? {
            Some(bytes) if bytes.len() == 32 => {
                let mut cm = [0u8; 32];
                cm.copy_from_slice(&bytes);
                Ok(Some(Hash256(cm)))
            }
            Some(_) => Err(StoreError::Codec("invalid nullifier link length".into())),
            None => Ok(None),
        }
    }

    fn erase_nullifier_link(&mut self, nullifier: &Hash256) -> Result<(), StoreError> {
        self.shared
            .delete(CF_NOTES, hash_key(K_LINK, nullifier).to_vec())
    }

    fn write_anchor(&mut self, anchor: &Hash256, tree: &NoteCommitmentTree) -> Result<(), StoreError> {
        self.shared
            .put(CF_NOTES, hash_key(K_ANCHOR, anchor).to_vec(), encode(tree)?)
    }

    fn read_anchor(&self, anchor: &Hash256) -> Result<Option<NoteCommitmentTree>, StoreError> {
        self.shared
            .get(CF_NOTES, &hash_key(K_ANCHOR, anchor))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn erase_anchor(&mut self, anchor: &Hash256) -> Result<(), StoreError> {
        self.shared
            .delete(CF_NOTES, hash_key(K_ANCHOR, anchor).to_vec())
    }

    fn current_anchor(&self) -> Result<Hash256, StoreError> {
        match self.shared.get(CF_NOTES, &[K_LIVE_ANCHOR])? {
            Some(bytes) if bytes.len() == 32 => {
                let mut anchor = [0u8; 32];
                anchor.copy_from_slice(&bytes);
                Ok(Hash256(anchor))
            }
            Some(_) => Err(StoreError::Codec("invalid anchor length".into())),
            None => Ok(Hash256::ZERO),
        }
    }

    fn set_current_anchor(&mut self, anchor: &Hash256) -> Result<(), StoreError> {
        self.shared
            .put(CF_NOTES, vec![K_LIVE_ANCHOR], anchor.as_bytes().to_vec())
    }
}

/// Quorum commitments and the finality watermark.
pub struct CommitmentCf {
    shared: Arc<Shared>,
}

impl CommitmentCf {
    fn assert_mutable(&self, height: u32) -> Result<(), StoreError> {
        match self.latest_finalized_height()? {
            Some(finalized) if height <= finalized => Err(StoreError::Immutable(height)),
            _ => Ok(()),
        }
    }
}

impl CommitmentStore for CommitmentCf {
    fn write_commitment(&mut self, commitment: &StateCommitment) -> Result<(), StoreError> {
        self.assert_mutable(commitment.height)?;
        self.shared.put(
            CF_COMMITMENTS,
            height_key(K_COMMITMENT, commitment.height).to_vec(),
            encode(commitment)?,
        )
    }

    fn read_commitment(&self, height: u32) -> Result<Option<StateCommitment>, StoreError> {
        self.shared
            .get(CF_COMMITMENTS, &height_key(K_COMMITMENT, height))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn erase_commitment(&mut self, height: u32) -> Result<(), StoreError> {
        self.assert_mutable(height)?;
        self.shared
            .delete(CF_COMMITMENTS, height_key(K_COMMITMENT, height).to_vec())
    }

    fn latest_finalized_height(&self) -> Result<Option<u32>, StoreError> {
        match self.shared.get(CF_COMMITMENTS, &[K_FINALIZED])? {
            Some(bytes) if bytes.len() == 4 => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes);
                Ok(Some(u32::from_le_bytes(buf)))
            }
            Some(_) => Err(StoreError::Codec("invalid finalized-height length".into())),
            None => Ok(None),
        }
    }

    fn set_latest_finalized_height(&mut self, height: u32) -> Result<(), StoreError> {
        let new = match self.latest_finalized_height()? {
            Some(existing) => existing.max(height),
            None => height,
        };
        self.shared
            .put(CF_COMMITMENTS, vec![K_FINALIZED], new.to_le_bytes().to_vec())
    }
}

/// DOMC votes and the rate undo journal.
pub struct DomcCf {
    shared: Arc<Shared>,
}

impl DomcCf {
    fn reveal_stack(&self, cycle_id: u32, identity: &OutPoint) -> Result<Vec<DomcReveal>, StoreError> {
        match self
            .shared
            .get(CF_DOMC, &vote_key(K_DOMC_REVEAL, cycle_id, identity))?
        {
            Some(bytes) => decode(&bytes),
            None => Ok(Vec::new()),
        }
    }

    fn store_reveal_stack(
        &self,
        cycle_id: u32,
        identity: &OutPoint,
        stack: &[DomcReveal],
    ) -> Result<(), StoreError> {
        let key = vote_key(K_DOMC_REVEAL, cycle_id, identity).to_vec();
        if stack.is_empty() {
            self.shared.delete(CF_DOMC, key)
        } else {
            self.shared.put(CF_DOMC, key, encode(&stack.to_vec())?)
        }
    }
}

impl DomcStore for DomcCf {
    fn write_commit(&mut self, commit: &DomcCommit) -> Result<(), StoreError> {
        self.shared.put(
            CF_DOMC,
            vote_key(K_DOMC_COMMIT, commit.cycle_id, &commit.identity).to_vec(),
            encode(commit)?,
        )
    }

    fn read_commit(&self, cycle_id: u32, identity: &OutPoint) -> Result<Option<DomcCommit>, StoreError> {
        self.shared
            .get(CF_DOMC, &vote_key(K_DOMC_COMMIT, cycle_id, identity))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn erase_commit(&mut self, cycle_id: u32, identity: &OutPoint) -> Result<(), StoreError> {
        self.shared
            .delete(CF_DOMC, vote_key(K_DOMC_COMMIT, cycle_id, identity).to_vec())
    }

    fn push_reveal(&mut self, reveal: &DomcReveal) -> Result<(), StoreError> {
        let mut stack = self.reveal_stack(reveal.cycle_id, &reveal.identity)?;
        stack.push(reveal.clone());
        self.store_reveal_stack(reveal.cycle_id, &reveal.identity, &stack)
    }

    fn live_reveal(&self, cycle_id: u32, identity: &OutPoint) -> Result<Option<DomcReveal>, StoreError> {
        Ok(self.reveal_stack(cycle_id, identity)?.pop())
    }

    fn pop_reveal(&mut self, cycle_id: u32, identity: &OutPoint) -> Result<Option<DomcReveal>, StoreError> {
        let mut stack = self.reveal_stack(cycle_id, identity)?;
        let popped = stack.pop();
        if popped.is_some() {
            self.store_reveal_stack(cycle_id, identity, &stack)?;
        }
        Ok(popped)
    }

    fn reveals_for_cycle(&self, cycle_id: u32) -> Result<Vec<DomcReveal>, StoreError> {
        let mut prefix = [0u8; 5];
        prefix[0] = K_DOMC_REVEAL;
        prefix[1..].copy_from_slice(&cycle_id.to_be_bytes());

        let mut reveals = Vec::new();
        for (_, bytes) in self.shared.scan_prefix(CF_DOMC, &prefix)? {
            let stack: Vec<DomcReveal> = decode(&bytes)?;
            if let Some(live) = stack.last() {
                reveals.push(live.clone());
            }
        }
        Ok(reveals)
    }

    fn write_rate_undo(&mut self, boundary_height: u32, undo: &RateUndo) -> Result<(), StoreError> {
        self.shared.put(
            CF_DOMC,
            height_key(K_RATE_UNDO, boundary_height).to_vec(),
            encode(undo)?,
        )
    }

    fn read_rate_undo(&self, boundary_height: u32) -> Result<Option<RateUndo>, StoreError> {
        self.shared
            .get(CF_DOMC, &height_key(K_RATE_UNDO, boundary_height))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn erase_rate_undo(&mut self, boundary_height: u32) -> Result<(), StoreError> {
        self.shared
            .delete(CF_DOMC, height_key(K_RATE_UNDO, boundary_height).to_vec())
    }
}

/// The RocksDB-backed store bundle.
pub struct RocksStores {
    shared: Arc<Shared>,
    state: StateCf,
    notes: NoteCf,
    coins: CoinCf,
    commitments: CommitmentCf,
    domc: DomcCf,
}

impl RocksStores {
    /// Open (or create) the database described by `config`.
    ///
    /// With `wipe` set, any existing database is destroyed first.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let path = config.db_path();
        if config.wipe && path.exists() {
            DB::destroy(&Options::default(), &path).map_err(backend)?;
            tracing::info!(?path, "wiped KHU database for reindex");
        }
        Self::open_path(&path, config.cache_size)
    }

    fn open_path(path: &Path, cache_size: usize) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_db_write_buffer_size(cache_size);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors).map_err(backend)?;
        let shared = Arc::new(Shared {
            db,
            pending: Mutex::new(None),
        });
        tracing::debug!(?path, "opened KHU stores");

        Ok(Self {
            state: StateCf { shared: Arc::clone(&shared) },
            notes: NoteCf { shared: Arc::clone(&shared) },
            coins: CoinCf { shared: Arc::clone(&shared) },
            commitments: CommitmentCf { shared: Arc::clone(&shared) },
            domc: DomcCf { shared: Arc::clone(&shared) },
            shared,
        })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.shared.db.flush().map_err(backend)
    }
}

impl KhuStores for RocksStores {
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
        self.shared.begin();
        Ok(())
    }

    fn commit_block(&mut self) -> Result<(), StoreError> {
        self.shared.commit()
    }

    fn abort_block(&mut self) -> Result<(), StoreError> {
        self.shared.abort();
        Ok(())
    }
}
