//! Store configuration.

use std::path::PathBuf;

/// Configuration for the persistent KHU stores.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Write-buffer budget for the database, in bytes.
    pub cache_size: usize,
    /// Destroy any existing database before opening (reindex).
    pub wipe: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("khu");
        Self {
            data_dir,
            cache_size: 64 << 20,
            wipe: false,
        }
    }
}

impl StoreConfig {
    /// Path to the RocksDB directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("khustate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_data_dir_ends_with_khu() {
        let cfg = StoreConfig::default();
        assert!(
            cfg.data_dir.ends_with("khu"),
            "data_dir should end with 'khu': {:?}",
            cfg.data_dir
        );
    }

    #[test]
    fn default_does_not_wipe() {
        assert!(!StoreConfig::default().wipe);
    }

    #[test]
    fn db_path_appends_khustate() {
        let cfg = StoreConfig {
            data_dir: PathBuf::from("/tmp/khu-test"),
            ..StoreConfig::default()
        };
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/khu-test/khustate"));
    }
}
