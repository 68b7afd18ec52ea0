//! End-to-end: spend a matured genesis stake back into the same wallet.

use utxo_ledger::core::{
    ApplyOutcome, Block, LedgerConfig, LedgerError, Transaction, TransactionBuilder,
    COINBASE_MATURITY,
};
use utxo_ledger::node::Node;
use utxo_ledger::wallet::Wallet;

const STAKE: u64 = 10_000;

fn staked_node() -> Node {
    Node::with_stake(LedgerConfig::default(), Wallet::new("spend-genesis"), STAKE).unwrap()
}

#[test]
fn test_spend_genesis_after_maturity() {
    let mut node = staked_node();
    assert_eq!(node.tip(), 0);

    let outcomes = node.generate(COINBASE_MATURITY, None).unwrap();
    assert!(outcomes.iter().all(ApplyOutcome::is_applied));
    assert_eq!(node.tip(), 100);

    assert_eq!(node.rescan(0, node.tip()).unwrap(), 1);
    assert_eq!(node.get_balance(Some(99)).unwrap(), 0);
    assert_eq!(node.get_balance(Some(100)).unwrap(), STAKE);

    let destination = node.new_address();
    let spend = node.build_spend(&destination, 5_000).unwrap();
    assert_eq!(spend.selected.len(), 1);
    assert_eq!(spend.transaction.outputs[0].amount, 5_000);
    assert_eq!(spend.transaction.outputs[0].script, destination);
    assert_eq!(spend.change, 4_999);
    assert_eq!(spend.transaction.outputs[1].script, node.wallet().primary_script());

    let outcome = node.mine_block(vec![spend.transaction]).unwrap();
    assert!(outcome.is_applied());
    assert_eq!(node.get_balance(None).unwrap(), STAKE - spend.fee);

    node.verify_integrity().unwrap();
}

#[test]
fn test_incremental_matches_rescan() {
    let mut node = staked_node();
    let reward_script = node.new_address();
    node.generate(105, Some((&reward_script, 50))).unwrap();

    let spend = node.build_spend("outside", 3_000).unwrap();
    node.mine_block(vec![spend.transaction]).unwrap();
    node.generate(3, None).unwrap();

    let tip = node.tip();
    let incremental = node.wallet().index().clone();
    let balances: Vec<u64> = (0..=tip + 5)
        .map(|h| node.get_balance(Some(h)).unwrap())
        .collect();

    node.rescan(0, tip).unwrap();
    assert_eq!(node.wallet().index(), &incremental);
    for (h, expected) in balances.into_iter().enumerate() {
        assert_eq!(node.get_balance(Some(h as u64)).unwrap(), expected);
    }

    // Rescan is idempotent
    node.rescan(0, tip).unwrap();
    assert_eq!(node.wallet().index(), &incremental);
}

#[test]
fn test_immature_rewards_do_not_fund_spends() {
    let mut node = staked_node();
    let reward_script = node.new_address();
    node.generate(99, Some((&reward_script, 1_000))).unwrap();

    // Plenty of value, none of it mature yet
    let breakdown = node.breakdown(None).unwrap();
    assert_eq!(breakdown.spendable, 0);
    assert!(breakdown.immature > STAKE);

    let err = node.build_spend("outside", 10).unwrap_err();
    assert_eq!(err, LedgerError::InsufficientFunds { have: 0, need: 11 });

    // One more block matures the genesis stake only
    node.generate(1, None).unwrap();
    assert_eq!(node.get_balance(None).unwrap(), STAKE);
    let err = node.build_spend("outside", STAKE).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { have: STAKE, .. }));
}

#[test]
fn test_invalid_block_is_atomic() {
    let mut node = staked_node();
    node.generate(COINBASE_MATURITY, None).unwrap();

    let before_hash = node.chain().utxo_hash().clone();
    let before_balance = node.get_balance(None).unwrap();
    let before_index = node.wallet().index().clone();

    let genesis_tx = &node.chain().block(0).unwrap().transactions[0];
    let valid = TransactionBuilder::new()
        .add_input(&genesis_tx.outpoint(0))
        .add_output("outside", 9_000)
        .build();
    let reward = Transaction::coinbase(&node.wallet().primary_script(), 50, node.tip() + 1);
    let bogus = TransactionBuilder::new()
        .add_input(&genesis_tx.outpoint(7))
        .add_output("outside", 1)
        .build();

    let block = Block::new(
        node.tip() + 1,
        node.chain().tip_hash().to_string(),
        vec![reward, valid, bogus],
    );
    match node.apply_block(block).unwrap() {
        ApplyOutcome::Rejected(LedgerError::InvalidSpend { .. }) => {}
        other => panic!("unexpected outcome {:?}", other),
    }

    assert_eq!(node.tip(), COINBASE_MATURITY);
    assert_eq!(node.chain().utxo_hash(), &before_hash);
    assert_eq!(node.get_balance(None).unwrap(), before_balance);
    assert_eq!(node.wallet().index(), &before_index);
}
