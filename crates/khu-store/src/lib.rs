//! # khu-store
//! RocksDB persistence for the KHU state engine: one column family per
//! logical store, per-block atomic write batches.

pub mod config;
pub mod storage;

pub use config::StoreConfig;
pub use storage::RocksStores;
