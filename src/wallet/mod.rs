//! Wallet module: tracked scripts, ownership, balances and spends

pub mod balance;
pub mod builder;
pub mod ownership;
pub mod wallet;

pub use balance::{balance, breakdown, BalanceBreakdown};
pub use builder::{build_spend, spendable_outputs, SpendContext, UnsignedSpend};
pub use ownership::OwnershipIndex;
pub use wallet::{TrackedScripts, Wallet, WalletData};
