#![cfg(test)]
#![allow(dead_code)]

pub mod logging;
pub mod node;
pub mod peer;
pub mod random;

use shielded_wallet::coin_selection::available_value;
use shielded_wallet::consts::NATIVE_ASSET;
use shielded_wallet::key_keeper::LocalKeyKeeper;
use shielded_wallet::storage::MemoryWalletDb;
use shielded_wallet::*;

use crate::common::node::SharedNode;
use crate::common::peer::Mailbox;

pub type TestWallet = Wallet<LocalKeyKeeper, MemoryWalletDb, SharedNode, Mailbox>;

pub const START_HEIGHT: Height = 10;

/// Small anonymity windows keep spend proofs quick
pub fn test_config() -> WalletConfig {
    WalletConfig::from_toml_str(
        r#"
[transactions]
default_lifetime = 20
max_peer_height_delta = 5

[shielded]
large_window = { m = 3 }
small_window = { m = 2 }
asset_window = { m = 2 }
max_window_backlog = 64
voucher_retries = 2
"#,
    )
    .expect("test config")
}

pub fn new_wallet(seed: [u8; 32], node: &SharedNode, mailbox: &Mailbox) -> TestWallet {
    new_wallet_with(seed, test_config(), node, mailbox)
}

pub fn new_wallet_with(seed: [u8; 32], config: WalletConfig, node: &SharedNode, mailbox: &Mailbox) -> TestWallet {
    let keeper = LocalKeyKeeper::new(&seed, &config);
    Wallet::new(keeper, MemoryWalletDb::new(), node.clone(), mailbox.clone(), config).expect("wallet")
}

/// Give the wallet confirmed native coins of the given values
pub fn fund(wallet: &mut TestWallet, values: &[Amount]) -> Vec<CoinId> {
    let first = wallet.coins().iter().map(|c| c.id.index + 1).max().unwrap_or(0);
    values
        .iter()
        .zip(first..)
        .map(|(value, index)| {
            let mut coin = Coin::new(CoinId::new(index, *value, NATIVE_ASSET, KeyType::Regular), CoinStatus::Available);
            coin.confirm_height = Some(START_HEIGHT);
            wallet.add_coin(coin.clone()).expect("add coin");
            coin.id
        })
        .collect()
}

pub fn balance(wallet: &TestWallet) -> Amount {
    available_value(&wallet.coins(), &wallet.shielded_coins(), NATIVE_ASSET)
}

pub fn values_with_status(wallet: &TestWallet, status: CoinStatus) -> Vec<Amount> {
    let mut values: Vec<Amount> = wallet.coins().iter().filter(|c| c.status == status).map(|c| c.value()).collect();
    values.sort_unstable();
    values
}

/// Run every wallet and deliver messages until nothing moves
pub fn pump(wallets: &mut [&mut TestWallet], mailbox: &Mailbox) {
    loop {
        for wallet in wallets.iter_mut() {
            wallet.run_until_idle();
        }
        let Some((to, message)) = mailbox.pop() else {
            break;
        };
        for wallet in wallets.iter_mut().filter(|w| w.identity() == to) {
            wallet.on_peer_message(message.clone()).expect("peer message");
        }
    }
}

/// Mine a block and let every wallet react to it
pub fn mine(node: &SharedNode, wallets: &mut [&mut TestWallet], mailbox: &Mailbox) {
    node.mine();
    for wallet in wallets.iter_mut() {
        wallet.on_tip_changed().expect("tip changed");
    }
    pump(wallets, mailbox);
}
