//! CLI commands for the ledger
//!
//! Implements all command handlers for the CLI interface.

use crate::core::{ApplyOutcome, FeePolicy, GenesisPolicy, LedgerConfig};
use crate::crypto::sha256_hex;
use crate::node::Node;
use crate::storage::{Storage, StorageConfig};
use crate::wallet::Wallet;
use chrono::Utc;
use log::warn;
use std::path::{Path, PathBuf};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Config values given on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub maturity: Option<u64>,
    pub freeze_genesis: bool,
    pub fee: Option<u64>,
}

impl ConfigOverrides {
    pub fn apply(&self, mut config: LedgerConfig) -> LedgerConfig {
        if let Some(window) = self.maturity {
            config = config.with_maturity(window);
        }
        if self.freeze_genesis {
            config = config.with_genesis_policy(GenesisPolicy::Frozen);
        }
        if let Some(fee) = self.fee {
            config = config.with_fee(FeePolicy::Flat(fee));
        }
        config
    }

    fn touches_maturity(&self) -> bool {
        self.maturity.is_some() || self.freeze_genesis
    }
}

fn storage_for(data_dir: &Path) -> CliResult<Storage> {
    let storage_config = StorageConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    };
    Ok(Storage::new(storage_config)?)
}

/// Application state
pub struct AppState {
    pub node: Node,
    pub storage: Storage,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load the saved ledger, applying command-line overrides
    pub fn open(data_dir: PathBuf, overrides: ConfigOverrides) -> CliResult<Self> {
        let storage = storage_for(&data_dir)?;
        if !storage.exists() {
            return Err(format!(
                "no ledger at {:?}; run `ledger init` first",
                data_dir
            )
            .into());
        }

        let mut node = storage.load()?;
        if overrides.touches_maturity() {
            warn!("Maturity settings are fixed when the ledger is initialised; ignoring overrides");
        }
        if let Some(fee) = overrides.fee {
            node.set_fee_policy(FeePolicy::Flat(fee));
        }

        Ok(Self {
            node,
            storage,
            data_dir,
        })
    }

    /// Save the current state
    pub fn save(&self) -> CliResult<()> {
        self.storage.save(&self.node)?;
        Ok(())
    }
}

/// Initialize a new ledger whose genesis stakes `allocation` to a fresh wallet
pub fn cmd_init(
    data_dir: &Path,
    allocation: u64,
    seed: Option<&str>,
    overrides: ConfigOverrides,
) -> CliResult<()> {
    let storage = storage_for(data_dir)?;

    if storage.exists() {
        println!("⚠️  Ledger already exists at {:?}", data_dir);
        return Ok(());
    }

    let seed = match seed {
        Some(seed) => seed.to_string(),
        None => sha256_hex(format!("{}{:?}", Utc::now().to_rfc3339(), data_dir).as_bytes()),
    };
    let config = overrides.apply(LedgerConfig::default());
    let node = Node::with_stake(config, Wallet::new(&seed), allocation)?;
    storage.save(&node)?;

    println!("✅ Ledger initialized!");
    println!("   📁 Data directory: {:?}", data_dir);
    println!("   ⏳ Maturity window: {} blocks", config.maturity.window);
    println!("   🔒 Genesis: {:?}", config.maturity.genesis);
    println!("   📍 Stake script: {}", node.wallet().primary_script());
    println!("   🧱 Genesis block hash: {}", node.chain().tip_hash());

    Ok(())
}

/// Extend the chain with `count` blocks
pub fn cmd_generate(
    state: &mut AppState,
    count: u64,
    reward: Option<u64>,
    to: Option<&str>,
) -> CliResult<()> {
    let script = match (reward, to) {
        (Some(_), Some(to)) => Some(to.to_string()),
        (Some(_), None) => Some(state.node.new_address()),
        (None, _) => None,
    };
    let reward = script.as_deref().zip(reward);

    println!("🧱 Generating {} block(s)", count);
    for outcome in state.node.generate(count, reward)? {
        match outcome {
            ApplyOutcome::Applied { height, hash, created } => {
                println!("   #{} | {} | {} new outputs", height, &hash[..16], created.len());
            }
            ApplyOutcome::Rejected(err) => {
                println!("   ❌ Block rejected: {}", err);
            }
        }
    }
    state.save()?;

    println!("\n⛓️  Tip is now at height {}", state.node.tip());
    Ok(())
}

/// Derive a new script for the wallet
pub fn cmd_new_address(state: &mut AppState) -> CliResult<()> {
    let script = state.node.new_address();
    state.save()?;

    println!("🔐 New script: {}", script);
    Ok(())
}

/// Track a script controlled by an external key
pub fn cmd_track(state: &mut AppState, script: &str) -> CliResult<()> {
    if state.node.track_script(script) {
        state.save()?;
        println!("👀 Now tracking {}", script);
        println!("   Run `ledger rescan` to pick up outputs already in the chain.");
    } else {
        println!("   Already tracking {}", script);
    }
    Ok(())
}

/// Show the wallet balance
pub fn cmd_balance(state: &AppState, height: Option<u64>) -> CliResult<()> {
    let breakdown = state.node.breakdown(height)?;

    println!("💰 Balance at height {}", breakdown.height);
    println!("   ├─ Spendable: {}", breakdown.spendable);
    println!("   ├─ Immature: {}", breakdown.immature);
    println!("   └─ Spent: {}", breakdown.spent);

    if breakdown.height > state.node.tip() {
        println!("\n   (projected beyond tip {})", state.node.tip());
    }
    Ok(())
}

/// Build a spend and mine it into the next block
pub fn cmd_send(state: &mut AppState, to: &str, amount: u64) -> CliResult<()> {
    let spend = state.node.build_spend(to, amount)?;

    println!("📤 Transaction created:");
    println!("   ID: {}", spend.transaction.id);
    println!("   To: {}", to);
    println!("   Amount: {}", amount);
    println!("   Total out: {}", spend.transaction.total_output());
    println!("   Inputs: {}", spend.selected.len());
    println!("   Fee: {}", spend.fee);
    println!("   Change: {}", spend.change);

    match state.node.mine_block(vec![spend.transaction])? {
        ApplyOutcome::Applied { height, .. } => {
            state.save()?;
            println!("\n✅ Included in block {}", height);
        }
        ApplyOutcome::Rejected(err) => {
            println!("\n❌ Block rejected: {}", err);
        }
    }
    Ok(())
}

/// Re-derive wallet ownership over a height range
pub fn cmd_rescan(state: &mut AppState, from: u64, to: Option<u64>) -> CliResult<()> {
    let to = to.unwrap_or_else(|| state.node.tip());
    let found = state.node.rescan(from, to)?;
    state.save()?;

    println!("🔍 Rescanned heights {}..={}", from, to);
    println!("   Owned outputs in range: {}", found);
    println!("   Balance: {}", state.node.get_balance(None)?);
    Ok(())
}

/// Print a snapshot of the unspent set
pub fn cmd_snapshot(state: &AppState, output: Option<&Path>) -> CliResult<()> {
    let snapshot = state.node.snapshot();

    match output {
        Some(path) => {
            std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
            println!("📦 Snapshot written to {:?}", path);
        }
        None => {
            println!("📸 UTXO Snapshot");
            println!("   ├─ Height: {}", snapshot.header.height);
            println!("   ├─ Block hash: {}", snapshot.header.block_hash);
            println!("   ├─ Subsets: {}", snapshot.header.total_utxo_subsets);
            println!("   ├─ Total value: {}", snapshot.total_value());
            println!("   └─ Snapshot hash: {}", snapshot.header.snapshot_hash);
        }
    }
    Ok(())
}

/// Display ledger info
pub fn cmd_info(state: &AppState) -> CliResult<()> {
    let stats = state.node.stats();
    let config = state.node.config();

    println!("⛓️  Ledger Info");
    println!("   ├─ Height: {}", stats.height);
    println!("   ├─ Total blocks: {}", stats.total_blocks);
    println!("   ├─ Total transactions: {}", stats.total_transactions);
    println!("   ├─ Outputs: {} ({} spent)", stats.total_outputs, stats.spent_outputs);
    println!("   ├─ Unspent value: {}", stats.unspent_value);
    println!("   ├─ Maturity: {} blocks, genesis {:?}", config.maturity.window, config.maturity.genesis);
    println!("   ├─ Fee policy: {:?}", config.fee);
    println!("   ├─ Tracked scripts: {}", state.node.wallet().scripts().len());
    println!("   └─ Latest hash: {}", stats.latest_hash);

    let storage = state.storage.stats()?;
    println!("\n💾 Storage: {} bytes, {} backups", storage.file_size, storage.backup_count);
    Ok(())
}

/// Replace the current ledger with a numbered backup
pub fn cmd_restore(state: &mut AppState, backup: usize) -> CliResult<()> {
    let available = state.storage.list_backups();
    state.node = state.storage.restore_backup(backup)?;
    state.save()?;

    println!("♻️  Restored backup {} of {:?}", backup, available);
    println!("   Height: {}", state.node.tip());
    Ok(())
}

/// Check ledger invariants
pub fn cmd_verify(state: &mut AppState) -> CliResult<()> {
    println!("🔍 Verifying ledger...");

    match state.node.verify_integrity() {
        Ok(()) => {
            println!("✅ Ledger is consistent!");
            println!("   {} blocks replayed and checked", state.node.stats().total_blocks);
        }
        Err(err) => {
            println!("❌ Ledger verification FAILED!");
            println!("   {}", err);
        }
    }
    Ok(())
}
