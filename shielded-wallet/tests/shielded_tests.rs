mod common;

use proptest::prelude::*;

use shielded_wallet::builder::choose_voucher;
use shielded_wallet::consts::SHIELDED_KEY_INDEX;
use shielded_wallet::key_keeper::{KeyKeeper, LocalKeyKeeper, Method, Response};
use shielded_wallet::shielded::ticket::Voucher;
use shielded_wallet::*;

use crate::common::node::SharedNode;
use crate::common::peer::Mailbox;
use crate::common::random::{gen_random, gen_seed};
use crate::common::*;

fn identity_of(keeper: &mut LocalKeyKeeper) -> PeerId {
    match keeper.handle(Method::GetIdentity { index: 0 }).expect("identity") {
        Response::Identity(id) => id,
        other => panic!("unexpected response {other:?}"),
    }
}

fn vouchers_from(keeper: &mut LocalKeyKeeper, count: u32) -> Vec<Voucher> {
    let method = Method::CreateVouchers { key_index: SHIELDED_KEY_INDEX, nonce: gen_random(), count };
    match keeper.handle(method).expect("vouchers") {
        Response::Vouchers(vouchers) => vouchers,
        other => panic!("unexpected response {other:?}"),
    }
}

fn shielded_values(wallet: &TestWallet, status: CoinStatus) -> Vec<Amount> {
    let mut values: Vec<Amount> =
        wallet.shielded_coins().iter().filter(|c| c.status == status).map(|c| c.value).collect();
    values.sort_unstable();
    values
}

#[test]
fn push_to_self_then_spend_back() {
    logging::init();
    let node = SharedNode::new();
    let mailbox = Mailbox::new();
    let mut alice = new_wallet(gen_seed(), &node, &mailbox);
    fund(&mut alice, &[100]);

    let push = alice
        .send_shielded(ShieldedSendRequest { amount: 40, fee: 3, ..Default::default() })
        .expect("push");
    pump(&mut [&mut alice], &mailbox);
    assert_eq!(alice.status(push).unwrap(), TxStatus::Registering);
    assert!(mailbox.is_empty());
    // recognised while signing, confirmed once it is in the pool
    assert_eq!(shielded_values(&alice, CoinStatus::Unconfirmed), vec![40]);

    mine(&node, &mut [&mut alice], &mailbox);
    assert_eq!(alice.status(push).unwrap(), TxStatus::Completed);
    assert_eq!(node.pool_size(), 1);
    assert_eq!(shielded_values(&alice, CoinStatus::Available), vec![40]);
    assert_eq!(values_with_status(&alice, CoinStatus::Available), vec![57]);

    let coin = alice.shielded_coins()[0].clone();
    assert_eq!(coin.txo_id, Some(0));
    assert_eq!(coin.user.sender, *alice.identity().as_bytes());

    let pull = alice.spend_shielded(coin.id, 1).expect("pull");
    pump(&mut [&mut alice], &mailbox);
    assert_eq!(alice.status(pull).unwrap(), TxStatus::Registering);
    assert!(!alice.large_window_lost(pull).unwrap());

    mine(&node, &mut [&mut alice], &mailbox);
    assert_eq!(alice.status(pull).unwrap(), TxStatus::Completed);
    assert_eq!(shielded_values(&alice, CoinStatus::Spent), vec![40]);
    // 40 less the kernel fee and the spend kernel fee
    assert_eq!(values_with_status(&alice, CoinStatus::Available), vec![37, 57]);
}

#[test]
fn push_to_peer_with_requested_vouchers() {
    logging::init();
    let node = SharedNode::new();
    let mailbox = Mailbox::new();
    let mut alice = new_wallet(gen_seed(), &node, &mailbox);
    let mut bob = new_wallet(gen_seed(), &node, &mailbox);
    fund(&mut alice, &[100]);

    let handle = alice
        .send_shielded(ShieldedSendRequest { peer: Some(bob.identity()), amount: 25, fee: 3, ..Default::default() })
        .expect("push");
    pump(&mut [&mut alice, &mut bob], &mailbox);
    assert_eq!(alice.status(handle).unwrap(), TxStatus::Registering);
    assert!(alice.shielded_coins().is_empty());

    let bob_handle = bob.handle_of(&alice.tx_id(handle).unwrap()).expect("voucher issuer");
    assert_eq!(bob.status(bob_handle).unwrap(), TxStatus::Completed);

    mine(&node, &mut [&mut alice, &mut bob], &mailbox);
    assert_eq!(alice.status(handle).unwrap(), TxStatus::Completed);
    assert_eq!(shielded_values(&bob, CoinStatus::Available), vec![25]);
    assert_eq!(bob.shielded_coins()[0].user.sender, *alice.identity().as_bytes());
    assert_eq!(values_with_status(&alice, CoinStatus::Available), vec![72]);
}

#[test]
fn lost_vouchers_are_requested_again() {
    logging::init();
    let node = SharedNode::new();
    let mailbox = Mailbox::new();
    let mut alice = new_wallet(gen_seed(), &node, &mailbox);
    let mut bob = new_wallet(gen_seed(), &node, &mailbox);
    fund(&mut alice, &[100]);

    let handle = alice
        .send_shielded(ShieldedSendRequest { peer: Some(bob.identity()), amount: 25, fee: 3, ..Default::default() })
        .expect("push");
    alice.run_until_idle();
    let (_, request) = mailbox.pop().expect("voucher request");
    bob.on_peer_message(request).unwrap();
    bob.run_until_idle();
    mailbox.clear();

    // same block: no second request
    alice.on_tip_changed().unwrap();
    alice.run_until_idle();
    assert!(mailbox.is_empty());

    mine(&node, &mut [&mut alice, &mut bob], &mailbox);
    assert_eq!(alice.status(handle).unwrap(), TxStatus::Registering);
}

#[test]
fn silent_peer_runs_out_of_voucher_requests() {
    logging::init();
    let node = SharedNode::new();
    let mailbox = Mailbox::new();
    let mut alice = new_wallet(gen_seed(), &node, &mailbox);
    let stranger = identity_of(&mut LocalKeyKeeper::new(&gen_seed(), &test_config()));
    fund(&mut alice, &[100]);

    let handle = alice
        .send_shielded(ShieldedSendRequest { peer: Some(stranger), amount: 25, fee: 3, ..Default::default() })
        .expect("push");
    alice.run_until_idle();

    let mut requests = mailbox.len();
    for _ in 0..5 {
        mailbox.clear();
        node.mine();
        alice.on_tip_changed().unwrap();
        alice.run_until_idle();
        requests += mailbox.len();
    }
    assert_eq!(alice.status(handle).unwrap(), TxStatus::Failed(TxFailureReason::NoVouchers));
    assert_eq!(requests as u32, test_config().shielded.voucher_retries + 1);
    assert_eq!(balance(&alice), 100);
}

#[test]
fn supplied_voucher_must_belong_to_the_receiver() {
    logging::init();
    let node = SharedNode::new();
    let mailbox = Mailbox::new();
    let mut alice = new_wallet(gen_seed(), &node, &mailbox);
    let bob = new_wallet(gen_seed(), &node, &mailbox);
    let carol = new_wallet(gen_seed(), &node, &mailbox);
    fund(&mut alice, &[100]);

    let voucher = vouchers_from(&mut bob.keeper().clone(), 1).remove(0);

    let wrong = alice
        .send_shielded(ShieldedSendRequest {
            peer: Some(carol.identity()),
            voucher: Some(voucher.clone()),
            amount: 25,
            fee: 3,
            ..Default::default()
        })
        .expect("push");
    alice.run_until_idle();
    assert_eq!(alice.status(wrong).unwrap(), TxStatus::Failed(TxFailureReason::NoVouchers));
    assert_eq!(balance(&alice), 100);

    let right = alice
        .send_shielded(ShieldedSendRequest {
            peer: Some(bob.identity()),
            voucher: Some(voucher),
            amount: 25,
            fee: 3,
            ..Default::default()
        })
        .expect("push");
    alice.run_until_idle();
    assert_eq!(alice.status(right).unwrap(), TxStatus::Registering);
    assert!(mailbox.is_empty());
}

#[test]
fn unconfirmed_shielded_coin_cannot_be_spent() {
    logging::init();
    let node = SharedNode::new();
    let mailbox = Mailbox::new();
    let mut alice = new_wallet(gen_seed(), &node, &mailbox);
    fund(&mut alice, &[100]);

    alice.send_shielded(ShieldedSendRequest { amount: 40, fee: 3, ..Default::default() }).expect("push");
    pump(&mut [&mut alice], &mailbox);
    let coin = alice.shielded_coins()[0].id;
    assert!(matches!(alice.spend_shielded(coin, 1), Err(WalletError::InvalidParameters(_))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn vouchers_verify_only_for_their_issuer(seed in any::<[u8; 32]>(), other in any::<[u8; 32]>(), count in 1u32..4) {
        prop_assume!(seed != other);
        let config = test_config();
        let mut keeper = LocalKeyKeeper::new(&seed, &config);
        let issuer = identity_of(&mut keeper);
        let stranger = identity_of(&mut LocalKeyKeeper::new(&other, &config));

        let vouchers = vouchers_from(&mut keeper, count);
        prop_assert_eq!(vouchers.len(), count as usize);
        for voucher in &vouchers {
            prop_assert!(voucher.is_valid(&issuer));
            prop_assert!(!voucher.is_valid(&stranger));
        }
        prop_assert!(choose_voucher(&vouchers, &issuer).is_some());
        prop_assert!(choose_voucher(&vouchers, &stranger).is_none());
    }
}
