//! UTXO Ledger CLI Application
//!
//! A command-line interface for driving the ledger and its wallet.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use utxo_ledger::cli::{self, AppState, ConfigOverrides};

#[derive(Parser)]
#[command(name = "ledger")]
#[command(version = "0.1.0")]
#[command(about = "A UTXO ledger with wallet ownership tracking", long_about = None)]
struct Cli {
    /// Data directory for ledger storage
    #[arg(short, long, default_value = ".ledger_data")]
    data_dir: PathBuf,

    /// Blocks before coinbase and stake rewards can be spent
    #[arg(long, global = true)]
    maturity: Option<u64>,

    /// Never let genesis allocations mature
    #[arg(long, global = true)]
    freeze_genesis: bool,

    /// Flat fee per transaction
    #[arg(long, global = true)]
    fee: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new ledger
    Init {
        /// Amount staked to the wallet in the genesis block
        #[arg(short, long)]
        allocation: u64,

        /// Wallet seed (random if omitted)
        #[arg(long)]
        seed: Option<String>,
    },

    /// Extend the chain with new blocks
    Generate {
        /// Number of blocks
        #[arg(short, long, default_value = "1")]
        count: u64,

        /// Coinbase reward per block
        #[arg(short, long)]
        reward: Option<u64>,

        /// Script receiving the reward (a new wallet script if omitted)
        #[arg(short, long)]
        to: Option<String>,
    },

    /// Derive a new wallet script
    NewAddress,

    /// Track a script controlled by an external key
    Track {
        #[arg(short, long)]
        script: String,
    },

    /// Show the wallet balance
    Balance {
        /// Height to evaluate at (defaults to the tip)
        #[arg(long)]
        height: Option<u64>,
    },

    /// Send funds and mine the spend into the next block
    Send {
        /// Recipient's script
        #[arg(short, long)]
        to: String,

        /// Amount to send
        #[arg(short, long)]
        amount: u64,
    },

    /// Re-derive wallet ownership over a height range
    Rescan {
        #[arg(long, default_value = "0")]
        from: u64,

        /// Defaults to the tip
        #[arg(long)]
        to: Option<u64>,
    },

    /// Capture a UTXO snapshot at the tip
    Snapshot {
        /// Write the full snapshot as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the ledger with a saved backup
    Restore {
        /// Backup number (0 is the most recent)
        #[arg(short, long)]
        backup: usize,
    },

    /// Display ledger information
    Info,

    /// Verify ledger invariants
    Verify,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        maturity: cli.maturity,
        freeze_genesis: cli.freeze_genesis,
        fee: cli.fee,
    };

    // Handle init separately (no state to load yet)
    if let Commands::Init { allocation, seed } = &cli.command {
        return cli::cmd_init(&cli.data_dir, *allocation, seed.as_deref(), overrides);
    }

    let mut state = AppState::open(cli.data_dir.clone(), overrides)?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Generate { count, reward, to } => {
            cli::cmd_generate(&mut state, count, reward, to.as_deref())?;
        }

        Commands::NewAddress => {
            cli::cmd_new_address(&mut state)?;
        }

        Commands::Track { script } => {
            cli::cmd_track(&mut state, &script)?;
        }

        Commands::Balance { height } => {
            cli::cmd_balance(&state, height)?;
        }

        Commands::Send { to, amount } => {
            cli::cmd_send(&mut state, &to, amount)?;
        }

        Commands::Rescan { from, to } => {
            cli::cmd_rescan(&mut state, from, to)?;
        }

        Commands::Snapshot { output } => {
            cli::cmd_snapshot(&state, output.as_deref())?;
        }

        Commands::Restore { backup } => {
            cli::cmd_restore(&mut state, backup)?;
        }

        Commands::Info => {
            cli::cmd_info(&state)?;
        }

        Commands::Verify => {
            cli::cmd_verify(&mut state)?;
        }
    }

    Ok(())
}
