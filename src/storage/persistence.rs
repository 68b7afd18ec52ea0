//! Ledger persistence layer
//!
//! The block stream, the configuration, the wallet's tracked scripts and the
//! outpoints the wallet owns are written. The Output Ledger is rebuilt by
//! replaying the blocks on load, and the ownership index is reinstated from
//! the saved outpoints, so a script tracked without a rescan stays unscanned.

use crate::core::{Block, LedgerConfig, LedgerError, OutPoint};
use crate::node::Node;
use crate::wallet::{Wallet, WalletData};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Replay failed: {0}")]
    Replay(#[from] LedgerError),
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub chain_file: String,
    pub backup_enabled: bool,
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ledger_data"),
            chain_file: "chain.json".to_string(),
            backup_enabled: true,
            max_backups: 5,
        }
    }
}

/// On-disk layout of a saved node
#[derive(Debug, Serialize)]
struct ChainFileRef<'a> {
    config: &'a LedgerConfig,
    blocks: &'a [Block],
    wallet: WalletData,
    owned: Vec<OutPoint>,
}

#[derive(Debug, Deserialize)]
struct ChainFile {
    #[serde(default)]
    config: LedgerConfig,
    blocks: Vec<Block>,
    wallet: WalletData,
    /// Missing in files written before ownership was saved
    #[serde(default)]
    owned: Option<Vec<OutPoint>>,
}

impl ChainFile {
    fn into_node(self) -> Result<Node, StorageError> {
        let wallet = Wallet::from_data(self.wallet);
        let node = match self.owned {
            Some(owned) => Node::restore(self.config, wallet, self.blocks, &owned)?,
            None => Node::replay(self.config, wallet, self.blocks)?,
        };
        Ok(node)
    }
}

/// Ledger storage manager
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    /// Create a new storage manager
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    fn chain_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.chain_file)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.backup.{}", self.config.chain_file, index))
    }

    /// Save the node to disk
    pub fn save(&self, node: &Node) -> Result<(), StorageError> {
        let path = self.chain_path();

        if self.config.backup_enabled && self.config.max_backups > 0 && path.exists() {
            self.rotate_backups()?;
            fs::copy(&path, self.backup_path(0))?;
        }

        // Write to temporary file first
        let temp_path = self.config.data_dir.join(format!("{}.tmp", self.config.chain_file));
        save_to_file(node, &temp_path)?;

        // Atomic rename
        fs::rename(&temp_path, &path)?;
        debug!("Saved chain at height {} to {:?}", node.tip(), path);

        Ok(())
    }

    /// Load the node from disk, replaying every block
    pub fn load(&self) -> Result<Node, StorageError> {
        let path = self.chain_path();

        if !path.exists() {
            return Err(StorageError::InvalidData("Chain file not found".to_string()));
        }

        let node = load_from_file(&path)?;
        info!("Loaded chain at height {} from {:?}", node.tip(), path);
        Ok(node)
    }

    /// Check if a saved chain exists
    pub fn exists(&self) -> bool {
        self.chain_path().exists()
    }

    fn rotate_backups(&self) -> Result<(), StorageError> {
        let oldest = self.backup_path(self.config.max_backups - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        for i in (0..self.config.max_backups - 1).rev() {
            let current = self.backup_path(i);
            if current.exists() {
                fs::rename(&current, self.backup_path(i + 1))?;
            }
        }

        Ok(())
    }

    /// Restore from a backup
    pub fn restore_backup(&self, backup_index: usize) -> Result<Node, StorageError> {
        let backup_path = self.backup_path(backup_index);

        if !backup_path.exists() {
            return Err(StorageError::InvalidData(format!(
                "Backup {} not found",
                backup_index
            )));
        }

        load_from_file(&backup_path)
    }

    /// List available backups
    pub fn list_backups(&self) -> Vec<usize> {
        (0..self.config.max_backups)
            .filter(|i| self.backup_path(*i).exists())
            .collect()
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        let path = self.chain_path();

        let file_size = if path.exists() {
            fs::metadata(&path)?.len()
        } else {
            0
        };

        Ok(StorageStats {
            file_size,
            backup_count: self.list_backups().len(),
            data_dir: self.config.data_dir.clone(),
        })
    }
}

/// Storage statistics
#[derive(Debug)]
pub struct StorageStats {
    pub file_size: u64,
    pub backup_count: usize,
    pub data_dir: PathBuf,
}

/// Save a node to a specific file path
pub fn save_to_file(node: &Node, path: &Path) -> Result<(), StorageError> {
    let file = fs::File::create(path)?;
    let writer = BufWriter::new(file);
    let data = ChainFileRef {
        config: node.config(),
        blocks: node.chain().blocks(),
        wallet: node.wallet().to_data(),
        owned: node.owned_outpoints(),
    };
    serde_json::to_writer_pretty(writer, &data)?;
    Ok(())
}

/// Load a node from a specific file path
pub fn load_from_file(path: &Path) -> Result<Node, StorageError> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let data: ChainFile = serde_json::from_reader(reader)?;
    data.into_node()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        let config = LedgerConfig::default().with_maturity(2);
        let mut node = Node::with_stake(config, Wallet::new("storage-test"), 800).unwrap();
        node.generate(2, None).unwrap();
        node
    }

    fn storage(dir: &tempfile::TempDir, max_backups: usize) -> Storage {
        Storage::new(StorageConfig {
            data_dir: dir.path().to_path_buf(),
            max_backups,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_save_load_node() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir, 5);
        let mut node = node();
        let imported = node.new_address();
        let spend = node.build_spend(&imported, 100).unwrap();
        node.mine_block(vec![spend.transaction]).unwrap();

        storage.save(&node).unwrap();
        assert!(storage.exists());

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.tip(), node.tip());
        assert_eq!(loaded.config(), node.config());
        assert_eq!(loaded.wallet().scripts(), node.wallet().scripts());
        assert_eq!(loaded.wallet().index(), node.wallet().index());
        assert_eq!(loaded.get_balance(None).unwrap(), node.get_balance(None).unwrap());
        assert_eq!(loaded.chain().utxo_hash(), node.chain().utxo_hash());
    }

    #[test]
    fn test_tracked_script_waits_for_rescan() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir, 5);
        let mut node = node();
        node.generate(1, Some(("imported", 40))).unwrap();
        node.track_script("imported");
        storage.save(&node).unwrap();

        let mut loaded = storage.load().unwrap();
        assert_eq!(loaded.wallet().index(), node.wallet().index());
        assert_eq!(loaded.get_balance(Some(10)).unwrap(), 800);

        loaded.rescan(0, loaded.tip()).unwrap();
        storage.save(&loaded).unwrap();
        assert_eq!(storage.load().unwrap().get_balance(Some(10)).unwrap(), 840);
    }

    #[test]
    fn test_file_without_ownership_is_rescanned() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir, 0);
        let mut node = node();
        node.generate(1, Some(("imported", 40))).unwrap();
        node.track_script("imported");
        storage.save(&node).unwrap();

        let path = temp_dir.path().join("chain.json");
        let mut value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("owned");
        fs::write(&path, value.to_string()).unwrap();

        assert_eq!(storage.load().unwrap().get_balance(Some(10)).unwrap(), 840);
    }

    #[test]
    fn test_backup_rotation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir, 3);
        let mut node = node();

        for _ in 0..5 {
            storage.save(&node).unwrap();
            node.generate(1, None).unwrap();
        }

        assert_eq!(storage.list_backups(), vec![0, 1, 2]);
        let restored = storage.restore_backup(0).unwrap();
        assert_eq!(restored.tip(), node.tip() - 2);
        assert!(storage.restore_backup(7).is_err());
    }

    #[test]
    fn test_tampered_chain_fails_replay() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir, 0);
        storage.save(&node()).unwrap();

        let path = temp_dir.path().join("chain.json");
        let mut value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        value["blocks"][1]["previous_hash"] = serde_json::Value::String("00".to_string());
        fs::write(&path, value.to_string()).unwrap();

        assert!(matches!(storage.load(), Err(StorageError::Replay(_))));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage(&temp_dir, 5);
        assert!(matches!(storage.load(), Err(StorageError::InvalidData(_))));
        assert_eq!(storage.stats().unwrap().file_size, 0);
    }
}
