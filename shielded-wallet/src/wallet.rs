//! The wallet: an arena of transactions driven by a single-threaded event loop.
//!
//! Transactions live in a map keyed by [`TxHandle`]. Key keeper answers, peer messages and chain
//! progress are routed to a handle and mark it for an update; a handle that is gone by then is
//! simply ignored. All working state is in the parameter store, so an update always starts by
//! loading it and ends by writing it back.

use std::collections::{BTreeMap, BTreeSet};

use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::builder::*;
use crate::chain::*;
use crate::coin_selection::*;
use crate::config::WalletConfig;
use crate::consts::*;
use crate::core_types::*;
use crate::error::*;
use crate::kernel::{KernelId, TxKernel};
use crate::key_keeper::{Completion, KeyKeeper, KeyKeeperQueue, Method, PaymentInfo, Response};
use crate::peer::*;
use crate::random::Random;
use crate::shielded::scan_output;
use crate::shielded::ticket::{TicketId, Voucher};
use crate::shielded::viewer::{ShieldedAddress, Viewer};
use crate::shielded::ShieldedCoin;
use crate::signature::Signature;
use crate::storage::*;
use crate::transaction::{Input, Transaction};

/// Most vouchers handed out per request
const MAX_VOUCHERS_PER_REQUEST: u32 = 16;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxState {
    Initial,
    AwaitingPeer,
    Signing,
    Signed,
    Registered,
    Completed,
    Failed(TxFailureReason),
    Cancelled,
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Completed | TxState::Failed(_) | TxState::Cancelled)
    }
}

/// What the caller sees of a transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    InProgress,
    Registering,
    Completed,
    Failed(TxFailureReason),
    Cancelled,
}

impl From<&TxState> for TxStatus {
    fn from(state: &TxState) -> Self {
        match state {
            TxState::Initial => TxStatus::Pending,
            TxState::AwaitingPeer | TxState::Signing => TxStatus::InProgress,
            TxState::Signed | TxState::Registered => TxStatus::Registering,
            TxState::Completed => TxStatus::Completed,
            TxState::Failed(reason) => TxStatus::Failed(reason.clone()),
            TxState::Cancelled => TxStatus::Cancelled,
        }
    }
}

/// Push into the shielded pool; without a peer the output goes to ourselves
#[derive(Clone, Debug, Default)]
pub struct ShieldedSendRequest {
    pub peer: Option<PeerId>,
    pub voucher: Option<Voucher>,
    pub amount: Amount,
    pub asset_id: AssetId,
    pub fee: Amount,
    pub message: [u8; 32],
}

#[derive(Clone, Debug)]
struct ActiveTx {
    tx_id: TxId,
    tx_type: TxType,
    initiator: bool,
    peer: Option<PeerId>,
    state: TxState,
}

/// Shape of a transaction before its coins are chosen
struct Plan {
    tx_type: TxType,
    peer: Option<PeerId>,
    asset_id: AssetId,
    /// value leaving the wallet
    amount: Amount,
    /// own new coins besides change
    outputs: Vec<Amount>,
    fee: Amount,
    preselected_shielded: Vec<TicketId>,
    peer_outputs: usize,
    shielded_outputs: usize,
    message: [u8; 32],
}

macro_rules! ready {
    ($step:expr) => {
        match $step {
            Step::Done => {}
            other => return Ok(other),
        }
    };
}

pub struct Wallet<K, D, N, P> {
    config: WalletConfig,
    keeper: KeyKeeperQueue<K>,
    db: D,
    node: N,
    peers: P,
    identity: PeerId,
    viewer: Viewer,
    txs: BTreeMap<TxHandle, ActiveTx>,
    by_id: BTreeMap<TxId, TxHandle>,
    next_handle: u64,
    dirty: BTreeSet<TxHandle>,
    scanned_txos: TxoId,
}

fn keeper_call<K: KeyKeeper>(keeper: &mut K, method: Method) -> Result<Response> {
    keeper.handle(method).map_err(|e| WalletError::Failed(e.into()))
}

impl<K: KeyKeeper, D: WalletDb, N: NodeGateway, P: PeerChannel> Wallet<K, D, N, P> {
    /// Open a wallet over existing storage; unfinished transactions resume on the next run
    pub fn new(mut keeper: K, db: D, node: N, peers: P, config: WalletConfig) -> Result<Self> {
        let Response::Identity(identity) = keeper_call(&mut keeper, Method::GetIdentity { index: 0 })? else {
            return Err(WalletError::InvalidParameters("unexpected key keeper response".into()));
        };
        let Response::Viewer(viewer) = keeper_call(&mut keeper, Method::GetViewer { key_index: SHIELDED_KEY_INDEX })? else {
            return Err(WalletError::InvalidParameters("unexpected key keeper response".into()));
        };

        let mut wallet = Self {
            config,
            keeper: KeyKeeperQueue::new(keeper),
            db,
            node,
            peers,
            identity,
            viewer,
            txs: BTreeMap::new(),
            by_id: BTreeMap::new(),
            next_handle: 1,
            dirty: BTreeSet::new(),
            scanned_txos: 0,
        };
        wallet.restore()?;
        Ok(wallet)
    }

    fn restore(&mut self) -> Result<()> {
        for tx_id in self.db.tx_ids() {
            let Some(entry) = self.load_entry(&tx_id)? else {
                continue;
            };
            if entry.state.is_terminal() {
                continue;
            }
            info!(tx_id = %tx_id, state = ?entry.state, "resuming transaction");
            let initiator = entry.initiator;
            let handle = self.insert(entry);
            if initiator {
                // the key keeper may have restarted too; hand it back the slot we were signing with
                if let Some(slot) = TxBuilder::load(&self.db, &tx_id, DEFAULT_SUB_TX)?.held_nonce_slot() {
                    if let Err(err) = self.keeper.submit(handle, Method::RestoreNonceSlot { slot }) {
                        error!(tx_id = %tx_id, %err, "key keeper request refused");
                    }
                }
            }
        }
        Ok(())
    }

    fn load_entry(&self, tx_id: &TxId) -> Result<Option<ActiveTx>> {
        let (Some(state), Some(tx_type)) = (
            get_param(&self.db, tx_id, DEFAULT_SUB_TX, TxParameterId::State)?,
            get_param(&self.db, tx_id, DEFAULT_SUB_TX, TxParameterId::TxType)?,
        ) else {
            return Ok(None);
        };
        Ok(Some(ActiveTx {
            tx_id: *tx_id,
            tx_type,
            initiator: get_param(&self.db, tx_id, DEFAULT_SUB_TX, TxParameterId::IsInitiator)?.unwrap_or(false),
            peer: get_param(&self.db, tx_id, DEFAULT_SUB_TX, TxParameterId::PeerId)?,
            state,
        }))
    }

    fn insert(&mut self, entry: ActiveTx) -> TxHandle {
        let handle = TxHandle(self.next_handle);
        self.next_handle += 1;
        self.by_id.insert(entry.tx_id, handle);
        self.txs.insert(handle, entry);
        self.dirty.insert(handle);
        handle
    }

    pub fn identity(&self) -> PeerId {
        self.identity
    }

    pub fn shielded_address(&self) -> ShieldedAddress {
        self.viewer.to_address()
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn keeper(&self) -> &K {
        self.keeper.keeper()
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn coins(&self) -> Vec<Coin> {
        self.db.coins()
    }

    pub fn shielded_coins(&self) -> Vec<ShieldedCoin> {
        self.db.shielded_coins()
    }

    /// Record a coin found outside of a transaction (for example mined)
    pub fn add_coin(&mut self, coin: Coin) -> Result<()> {
        self.db.save_coin(&coin)
    }

    pub fn tx_id(&self, handle: TxHandle) -> Option<TxId> {
        self.txs.get(&handle).map(|e| e.tx_id)
    }

    pub fn handle_of(&self, tx_id: &TxId) -> Option<TxHandle> {
        self.by_id.get(tx_id).copied()
    }

    pub fn status(&self, handle: TxHandle) -> Result<TxStatus> {
        self.txs.get(&handle).map(|e| TxStatus::from(&e.state)).ok_or(WalletError::UnknownTransaction(handle))
    }

    fn param<T: serde::de::DeserializeOwned>(&self, handle: TxHandle, id: TxParameterId) -> Result<Option<T>> {
        let entry = self.txs.get(&handle).ok_or(WalletError::UnknownTransaction(handle))?;
        get_param(&self.db, &entry.tx_id, DEFAULT_SUB_TX, id)
    }

    /// Whether a shielded input of the transaction had to settle for the small anonymity window
    pub fn large_window_lost(&self, handle: TxHandle) -> Result<bool> {
        Ok(self.param(handle, TxParameterId::LargeWindowLost)?.unwrap_or(false))
    }

    pub fn kernel(&self, handle: TxHandle) -> Result<Option<TxKernel>> {
        self.param(handle, TxParameterId::Kernel)
    }

    pub fn transaction(&self, handle: TxHandle) -> Result<Option<Transaction>> {
        self.param(handle, TxParameterId::Transaction)
    }

    /// Receiver's signed confirmation of a payment we made
    pub fn payment_proof(&self, handle: TxHandle) -> Result<Option<Signature>> {
        self.param(handle, TxParameterId::PeerPaymentProof)
    }

    pub fn export_transaction(&self, handle: TxHandle) -> Result<String> {
        let entry = self.txs.get(&handle).ok_or(WalletError::UnknownTransaction(handle))?;
        export_transaction(&self.db, &entry.tx_id)
    }

    pub fn import_transaction(&mut self, data: &str) -> Result<TxHandle> {
        let tx_id = import_transaction(&mut self.db, data)?;
        if let Some(handle) = self.by_id.get(&tx_id) {
            self.dirty.insert(*handle);
            return Ok(*handle);
        }
        let entry = self
            .load_entry(&tx_id)?
            .ok_or_else(|| WalletError::InvalidParameters("imported transaction has no state".into()))?;
        Ok(self.insert(entry))
    }

    pub fn send(&mut self, peer: PeerId, amount: Amount, asset_id: AssetId, fee: Amount) -> Result<TxHandle> {
        if amount == 0 {
            return Err(WalletError::InvalidParameters("zero amount".into()));
        }
        self.start(Plan {
            tx_type: TxType::Simple,
            peer: Some(peer),
            asset_id,
            amount,
            outputs: Vec::new(),
            fee,
            preselected_shielded: Vec::new(),
            peer_outputs: 1,
            shielded_outputs: 0,
            message: [0u8; 32],
        })
    }

    pub fn split(&mut self, amounts: &[Amount], asset_id: AssetId, fee: Amount) -> Result<TxHandle> {
        if amounts.is_empty() || amounts.contains(&0) {
            return Err(WalletError::InvalidParameters("split needs non-zero amounts".into()));
        }
        self.start(Plan {
            tx_type: TxType::Split,
            peer: None,
            asset_id,
            amount: 0,
            outputs: amounts.to_vec(),
            fee,
            preselected_shielded: Vec::new(),
            peer_outputs: 0,
            shielded_outputs: 0,
            message: [0u8; 32],
        })
    }

    pub fn send_shielded(&mut self, request: ShieldedSendRequest) -> Result<TxHandle> {
        if request.amount == 0 {
            return Err(WalletError::InvalidParameters("zero amount".into()));
        }
        let handle = self.start(Plan {
            tx_type: TxType::PushShielded,
            peer: request.peer,
            asset_id: request.asset_id,
            amount: request.amount,
            outputs: Vec::new(),
            fee: request.fee,
            preselected_shielded: Vec::new(),
            peer_outputs: 0,
            shielded_outputs: 1,
            message: request.message,
        })?;
        if let (Some(voucher), Some(tx_id)) = (request.voucher, self.tx_id(handle)) {
            set_param(&mut self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::PeerVouchers, &vec![voucher])?;
        }
        Ok(handle)
    }

    /// Move a shielded coin back into a standard output
    pub fn spend_shielded(&mut self, coin: TicketId, fee: Amount) -> Result<TxHandle> {
        let asset_id = self
            .db
            .shielded_coin(&coin)
            .filter(|c| c.is_available())
            .ok_or_else(|| WalletError::InvalidParameters(format!("shielded coin {coin} is not available")))?
            .asset_id;
        self.start(Plan {
            tx_type: TxType::PullShielded,
            peer: None,
            asset_id,
            amount: 0,
            outputs: Vec::new(),
            fee,
            preselected_shielded: vec![coin],
            peer_outputs: 0,
            shielded_outputs: 0,
            message: [0u8; 32],
        })
    }

    /// Choose and reserve coins, then queue the transaction. Nothing is written unless the
    /// transaction can be funded.
    fn start(&mut self, plan: Plan) -> Result<TxHandle> {
        let coins = self.db.coins();
        let shielded = self.db.shielded_coins();
        let fees = &self.config.fees;
        let max_shielded = self.config.shielded.max_shielded_inputs;
        // saturates; a total past the amount range can never be funded and fails selection
        let asset_total = plan.outputs.iter().fold(plan.amount, |acc, v| acc.saturating_add(*v));

        let native = plan.asset_id == NATIVE_ASSET;
        let asset_selection = select_coins(
            &coins,
            &shielded,
            &SelectionRequest {
                asset_id: plan.asset_id,
                target: if native { asset_total.saturating_add(plan.fee) } else { asset_total },
                preselected: Vec::new(),
                preselected_shielded: plan.preselected_shielded.clone(),
                max_shielded,
                shielded_input_fee: fees.shielded_input_fee,
            },
        )?;
        let fee_selection = if native {
            None
        } else {
            Some(select_coins(
                &coins,
                &shielded,
                &SelectionRequest {
                    asset_id: NATIVE_ASSET,
                    target: plan.fee.saturating_add(asset_selection.shielded_fee),
                    max_shielded: max_shielded.saturating_sub(asset_selection.shielded_inputs.len()),
                    shielded_input_fee: fees.shielded_input_fee,
                    ..Default::default()
                },
            )?)
        };

        let selections: Vec<&Selection> = std::iter::once(&asset_selection).chain(fee_selection.as_ref()).collect();
        let change_outputs = selections.iter().filter(|s| s.change > 0).count();
        let required = self.config.required_fee(1, plan.outputs.len() + change_outputs + plan.peer_outputs, 0, plan.shielded_outputs);
        if plan.fee < required {
            warn!(fee = plan.fee, required, "fee is too small");
            return Err(WalletError::Failed(TxFailureReason::FeeIsTooSmall));
        }

        let tx_id = TxId::new_random_with_params(&mut OsRng, ());
        let tip = self.node.tip().height;
        let mut builder = TxBuilder::new(tx_id, DEFAULT_SUB_TX);
        builder.amount = plan.amount;
        builder.asset_id = plan.asset_id;
        builder.fee = plan.fee;
        builder.height = HeightRange::new(tip, self.config.transactions.default_lifetime);
        builder.message = plan.message;

        for (selection, asset_id) in selections.iter().zip([plan.asset_id, NATIVE_ASSET]) {
            builder.inputs.extend(selection.inputs.iter().copied());
            builder.shielded_inputs.extend(selection.shielded_inputs.iter().cloned());
            if selection.change > 0 {
                builder.outputs.push(self.new_coin(selection.change, asset_id, KeyType::Change, tx_id)?);
            }
        }
        for value in &plan.outputs {
            builder.outputs.push(self.new_coin(*value, plan.asset_id, KeyType::Regular, tx_id)?);
        }
        self.reserve(&tx_id, &builder)?;
        builder.save(&mut self.db)?;

        let entry = ActiveTx { tx_id, tx_type: plan.tx_type, initiator: true, peer: plan.peer, state: TxState::Initial };
        self.save_entry(&entry)?;
        info!(tx_id = %tx_id, tx_type = ?plan.tx_type, amount = plan.amount, fee = plan.fee, "transaction created");
        Ok(self.insert(entry))
    }

    fn new_coin(&mut self, value: Amount, asset_id: AssetId, key_type: KeyType, tx_id: TxId) -> Result<CoinId> {
        let id = CoinId::new(self.db.allocate_coin_index()?, value, asset_id, key_type);
        let mut coin = Coin::new(id, CoinStatus::Unconfirmed);
        coin.create_tx = Some(tx_id);
        self.db.save_coin(&coin)?;
        Ok(id)
    }

    fn reserve(&mut self, tx_id: &TxId, builder: &TxBuilder) -> Result<()> {
        for id in &builder.inputs {
            if let Some(mut coin) = self.db.coin(id) {
                coin.status = CoinStatus::Outgoing;
                coin.spent_tx = Some(*tx_id);
                self.db.save_coin(&coin)?;
            }
        }
        for shielded in &builder.shielded_inputs {
            if let Some(mut coin) = self.db.shielded_coin(&shielded.id) {
                coin.status = CoinStatus::Outgoing;
                coin.spent_tx = Some(*tx_id);
                self.db.save_shielded_coin(&coin)?;
            }
        }
        Ok(())
    }

    fn save_entry(&mut self, entry: &ActiveTx) -> Result<()> {
        let tx_id = entry.tx_id;
        set_param(&mut self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::TxType, &entry.tx_type)?;
        set_param(&mut self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::IsInitiator, &entry.initiator)?;
        set_param(&mut self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::State, &entry.state)?;
        if let Some(peer) = &entry.peer {
            set_param(&mut self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::PeerId, peer)?;
        }
        set_param(&mut self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::MyId, &self.identity)
    }

    fn set_state(&mut self, handle: TxHandle, state: TxState) -> Result<()> {
        let Some(entry) = self.txs.get_mut(&handle) else {
            return Ok(());
        };
        info!(tx_id = %entry.tx_id, from = ?entry.state, to = ?state, "transaction state changed");
        entry.state = state.clone();
        let tx_id = entry.tx_id;
        set_param(&mut self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::State, &state)
    }

    fn state(&self, handle: TxHandle) -> TxState {
        self.txs.get(&handle).map(|e| e.state.clone()).unwrap_or(TxState::Cancelled)
    }

    /// Process everything that is ready: pending updates and key keeper answers
    pub fn run_until_idle(&mut self) {
        loop {
            while let Some(handle) = self.dirty.pop_first() {
                self.update(handle);
            }
            match self.keeper.poll() {
                Some(completion) => self.on_completion(completion),
                None => break,
            }
        }
    }

    fn update(&mut self, handle: TxHandle) {
        let Some(entry) = self.txs.get(&handle).cloned() else {
            return;
        };
        if entry.state.is_terminal() || self.keeper.has_pending(handle) {
            return;
        }
        if let Err(reason) = self.advance(handle, &entry) {
            self.fail(handle, reason, true);
        }
    }

    fn advance(&mut self, handle: TxHandle, entry: &ActiveTx) -> core::result::Result<(), TxFailureReason> {
        let mut builder = TxBuilder::load(&self.db, &entry.tx_id, DEFAULT_SUB_TX)?;

        let step = if entry.state == TxState::Registered {
            self.await_confirmation(handle, &builder)?
        } else {
            let tip = self.node.tip().height;
            if builder.height.max != 0 && tip > builder.height.max {
                return Err(TxFailureReason::Expired);
            }
            match (entry.tx_type, entry.initiator) {
                (TxType::Simple, true) => self.simple_sender(handle, entry, &mut builder)?,
                (TxType::Simple, false) => self.simple_receiver(handle, entry, &mut builder)?,
                (TxType::Split | TxType::PullShielded, _) => self.split_tx(handle, &mut builder)?,
                (TxType::PushShielded, true) => self.push_shielded(handle, entry, &mut builder)?,
                (TxType::PushShielded, false) => self.issue_vouchers(entry)?,
            }
        };

        builder.save(&mut self.db)?;
        if let Step::Request(method) = step {
            if let Err(err) = self.keeper.submit(handle, method) {
                error!(tx_id = %entry.tx_id, %err, "key keeper request refused");
            }
        }
        Ok(())
    }

    fn window_rnd() -> u32 {
        u32::new_random_with_params(&mut OsRng, ())
    }

    /// Standard inputs, outputs and shielded spends, in that order
    fn prepare_coins(&self, builder: &mut TxBuilder) -> core::result::Result<Step, TxFailureReason> {
        ready!(builder.commitments_step());
        ready!(builder.outputs_step());
        builder.shielded_input_step(&self.node, &self.config.shielded, self.config.fees.shielded_input_fee, Self::window_rnd())
    }

    fn simple_sender(
        &mut self,
        handle: TxHandle,
        entry: &ActiveTx,
        builder: &mut TxBuilder,
    ) -> core::result::Result<Step, TxFailureReason> {
        let peer = entry.peer.ok_or(TxFailureReason::InvalidState)?;

        if entry.state == TxState::Initial {
            ready!(self.prepare_coins(builder)?);
            ready!(builder.nonce_slot_step());
            ready!(builder.sender_initial_step());
            let (Some(excess), Some(nonce)) = (builder.public_excess, builder.public_nonce) else {
                return Err(TxFailureReason::InvalidState);
            };
            let invitation = PeerMessage::new(entry.tx_id, TxType::Simple, builder.sub_tx, self.identity)
                .with(TxParameterId::Amount, &builder.amount)?
                .with(TxParameterId::AssetId, &builder.asset_id)?
                .with(TxParameterId::Fee, &builder.fee)?
                .with(TxParameterId::MinHeight, &builder.height.min)?
                .with(TxParameterId::MaxHeight, &builder.height.max)?
                .with(TxParameterId::PeerPublicExcess, &excess)?
                .with(TxParameterId::PeerPublicNonce, &nonce)?;
            self.peers.send(&peer, invitation);
            self.set_state(handle, TxState::AwaitingPeer)?;
            return Ok(Step::Wait);
        }

        if entry.state == TxState::AwaitingPeer {
            if !builder.has_peer_response() {
                return Ok(Step::Wait);
            }
            if let Some(peer_max) = builder.peer.max_height {
                if peer_max.abs_diff(builder.height.max) > self.config.transactions.max_peer_height_delta {
                    warn!(tx_id = %entry.tx_id, own = builder.height.max, peer = peer_max, "peer max height is unacceptable");
                    return Err(TxFailureReason::MaxHeightIsUnacceptable);
                }
                builder.height.max = peer_max;
            }
            self.set_state(handle, TxState::Signing)?;
        }

        if self.state(handle) == TxState::Signing {
            let payment = PaymentInfo {
                value: builder.amount,
                asset_id: builder.asset_id,
                sender: self.identity,
                receiver: peer,
                signature: builder.peer.payment_proof.clone(),
            };
            ready!(builder.sender_final_step(Some(payment))?);
            builder.finalize_signature()?;
        }
        self.register(handle, builder)
    }

    fn simple_receiver(
        &mut self,
        handle: TxHandle,
        entry: &ActiveTx,
        builder: &mut TxBuilder,
    ) -> core::result::Result<Step, TxFailureReason> {
        let peer = entry.peer.ok_or(TxFailureReason::InvalidState)?;
        if builder.amount == 0 {
            return Err(TxFailureReason::InvalidTransaction);
        }
        if builder.fee < self.config.fees.minimum_fee {
            return Err(TxFailureReason::FeeIsTooSmall);
        }
        if builder.outputs.is_empty() {
            let id = self.new_coin(builder.amount, builder.asset_id, KeyType::Regular, entry.tx_id)?;
            builder.outputs.push(id);
            builder.height.max = builder.height.min.saturating_add(self.config.transactions.default_lifetime);
        }
        ready!(builder.outputs_step());
        let payment = PaymentInfo {
            value: builder.amount,
            asset_id: builder.asset_id,
            sender: peer,
            receiver: self.identity,
            signature: None,
        };
        ready!(builder.receiver_step(Some(payment)));

        let (Some(excess), Some(nonce), Some(partial), Some(offset)) =
            (builder.public_excess, builder.public_nonce, builder.partial_signature, builder.offset)
        else {
            return Err(TxFailureReason::InvalidState);
        };
        let kernel_id = builder.joint_kernel_id().ok_or(TxFailureReason::InvalidState)?;
        let response = PeerMessage::new(entry.tx_id, TxType::Simple, builder.sub_tx, self.identity)
            .with(TxParameterId::PeerPublicExcess, &excess)?
            .with(TxParameterId::PeerPublicNonce, &nonce)?
            .with(TxParameterId::PeerSignature, &partial)?
            .with(TxParameterId::PeerInputs, &Vec::<Input>::new())?
            .with(TxParameterId::PeerOutputs, &builder.created_outputs.clone().unwrap_or_default())?
            .with(TxParameterId::PeerOffset, &offset)?
            .with(TxParameterId::PeerMaxHeight, &builder.height.max)?
            .with(TxParameterId::PeerPaymentProof, &builder.payment_proof)?;
        self.peers.send(&peer, response);

        set_param(&mut self.db, &entry.tx_id, builder.sub_tx, TxParameterId::KernelId, &kernel_id)?;
        self.set_state(handle, TxState::Registered)?;
        Ok(Step::Wait)
    }

    fn split_tx(&mut self, handle: TxHandle, builder: &mut TxBuilder) -> core::result::Result<Step, TxFailureReason> {
        if self.state(handle) == TxState::Initial {
            ready!(self.prepare_coins(builder)?);
            ready!(builder.split_step());
        }
        self.register(handle, builder)
    }

    fn push_shielded(
        &mut self,
        handle: TxHandle,
        entry: &ActiveTx,
        builder: &mut TxBuilder,
    ) -> core::result::Result<Step, TxFailureReason> {
        if self.state(handle) == TxState::Initial {
            if builder.voucher.is_none() {
                let Some(vouchers) = &builder.peer.vouchers else {
                    return self.request_vouchers(entry);
                };
                let owner = entry.peer.unwrap_or(self.identity);
                let voucher = choose_voucher(vouchers, &owner).ok_or_else(|| {
                    warn!(tx_id = %entry.tx_id, received = vouchers.len(), "no voucher verifies");
                    TxFailureReason::NoVouchers
                })?;
                builder.voucher = Some(voucher);
            }
            ready!(self.prepare_coins(builder)?);
            ready!(builder.send_shielded_step(builder.shielded_output_params(&self.identity))?);

            if let Some(coin) = builder.detect_own_output(&self.viewer) {
                if self.db.shielded_coin(&coin.id).is_none() {
                    info!(tx_id = %entry.tx_id, value = coin.value, "shielded output is ours");
                    self.db.save_shielded_coin(&coin)?;
                }
            }
        }
        self.register(handle, builder)
    }

    /// Ask for vouchers: our own key keeper for a self-send, the peer otherwise. Unanswered
    /// requests to a peer are repeated once per block.
    fn request_vouchers(&mut self, entry: &ActiveTx) -> core::result::Result<Step, TxFailureReason> {
        let Some(peer) = entry.peer else {
            return Ok(Step::Request(Method::CreateVouchers {
                key_index: SHIELDED_KEY_INDEX,
                nonce: <[u8; 32]>::new_random_with_params(&mut OsRng, ()),
                count: 1,
            }));
        };

        let tx_id = entry.tx_id;
        let tip = self.node.tip().height;
        let last: Option<Height> = get_param(&self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::LastVoucherRequestHeight)?;
        if last.is_some_and(|h| h >= tip) {
            return Ok(Step::Wait);
        }
        let requests: u32 = get_param(&self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::VoucherRequests)?.unwrap_or(0);
        if requests > self.config.shielded.voucher_retries {
            warn!(tx_id = %tx_id, requests, "peer sent no vouchers");
            return Err(TxFailureReason::NoVouchers);
        }

        let request = PeerMessage::new(tx_id, TxType::PushShielded, DEFAULT_SUB_TX, self.identity)
            .with(TxParameterId::VoucherRequest, &1u32)?;
        self.peers.send(&peer, request);
        debug!(tx_id = %tx_id, attempt = requests + 1, "vouchers requested");
        set_param(&mut self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::VoucherRequests, &(requests + 1))?;
        set_param(&mut self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::LastVoucherRequestHeight, &tip)?;
        Ok(Step::Wait)
    }

    /// Receiving side of a shielded push: hand out vouchers for our own viewer
    fn issue_vouchers(&mut self, entry: &ActiveTx) -> core::result::Result<Step, TxFailureReason> {
        let count: u32 = get_param(&self.db, &entry.tx_id, DEFAULT_SUB_TX, TxParameterId::VoucherRequest)?.unwrap_or(1);
        Ok(Step::Request(Method::CreateVouchers {
            key_index: SHIELDED_KEY_INDEX,
            nonce: <[u8; 32]>::new_random_with_params(&mut OsRng, ()),
            count: count.clamp(1, MAX_VOUCHERS_PER_REQUEST),
        }))
    }

    fn on_vouchers(&mut self, handle: TxHandle, entry: &ActiveTx, vouchers: Vec<Voucher>) -> core::result::Result<(), TxFailureReason> {
        if entry.initiator {
            set_param(&mut self.db, &entry.tx_id, DEFAULT_SUB_TX, TxParameterId::PeerVouchers, &vouchers)?;
            self.dirty.insert(handle);
            return Ok(());
        }
        let peer = entry.peer.ok_or(TxFailureReason::InvalidState)?;
        let message = PeerMessage::new(entry.tx_id, TxType::PushShielded, DEFAULT_SUB_TX, self.identity)
            .with(TxParameterId::PeerVouchers, &vouchers)?;
        self.peers.send(&peer, message);
        self.set_state(handle, TxState::Completed)?;
        Ok(())
    }

    /// Check the assembled transaction and hand it to the node
    fn register(&mut self, handle: TxHandle, builder: &mut TxBuilder) -> core::result::Result<Step, TxFailureReason> {
        let tx_id = builder.tx_id;
        let mut state = self.state(handle);
        if matches!(state, TxState::Initial | TxState::AwaitingPeer | TxState::Signing) {
            let tx = builder.assemble().ok_or(TxFailureReason::InvalidState)?;
            let tip = self.node.tip().height;
            if let Err(err) = tx.validate(tip, &self.config.shielded.asset_window, self.config.arithmetic_mode) {
                error!(tx_id = %tx_id, %err, "assembled transaction is invalid");
                return Err(TxFailureReason::InvalidTransaction);
            }
            set_param(&mut self.db, &tx_id, builder.sub_tx, TxParameterId::Transaction, &tx)?;
            builder.payment_proof = builder.peer.payment_proof.clone();
            self.set_state(handle, TxState::Signed)?;
            state = TxState::Signed;
        }

        if state == TxState::Signed {
            let tx: Transaction =
                get_param(&self.db, &tx_id, builder.sub_tx, TxParameterId::Transaction)?.ok_or(TxFailureReason::InvalidState)?;
            match self.node.register_transaction(&tx) {
                RegistrationStatus::Accepted | RegistrationStatus::AlreadyRegistered => {
                    info!(tx_id = %tx_id, "transaction registered");
                    self.set_state(handle, TxState::Registered)?;
                }
                RegistrationStatus::Rejected(reason) => {
                    error!(tx_id = %tx_id, %reason, "node rejected the transaction");
                    return Err(TxFailureReason::FailedToRegister(reason));
                }
            }
        }
        Ok(Step::Wait)
    }

    /// Complete once the kernel is in the chain; expire if it can no longer get there
    fn await_confirmation(&mut self, handle: TxHandle, builder: &TxBuilder) -> core::result::Result<Step, TxFailureReason> {
        let kernel_id: KernelId = match &builder.kernel {
            Some(kernel) => kernel.id(),
            None => get_param(&self.db, &builder.tx_id, builder.sub_tx, TxParameterId::KernelId)?
                .ok_or(TxFailureReason::InvalidState)?,
        };
        if let Some(height) = self.node.kernel_proof(&kernel_id) {
            self.complete(handle, height)?;
            return Ok(Step::Wait);
        }
        if self.node.tip().height > builder.height.max {
            return Err(TxFailureReason::Expired);
        }
        Ok(Step::Wait)
    }

    fn complete(&mut self, handle: TxHandle, proof_height: Height) -> Result<()> {
        let Some(tx_id) = self.tx_id(handle) else {
            return Ok(());
        };
        let tip = self.node.tip().height;
        let maturity = self.config.transactions.coin_maturity;
        for mut coin in self.db.coins() {
            if coin.spent_tx == Some(tx_id) {
                coin.status = CoinStatus::Spent;
                coin.spent_height = Some(proof_height);
                self.db.save_coin(&coin)?;
            } else if coin.create_tx == Some(tx_id) && coin.status == CoinStatus::Unconfirmed {
                coin.confirm_height = Some(proof_height);
                coin.status = if proof_height + maturity > tip { CoinStatus::Maturing } else { CoinStatus::Available };
                self.db.save_coin(&coin)?;
            }
        }
        for mut coin in self.db.shielded_coins() {
            if coin.spent_tx == Some(tx_id) {
                coin.status = CoinStatus::Spent;
                coin.spent_height = Some(proof_height);
                self.db.save_shielded_coin(&coin)?;
            }
        }
        set_param(&mut self.db, &tx_id, DEFAULT_SUB_TX, TxParameterId::KernelProofHeight, &proof_height)?;
        self.set_state(handle, TxState::Completed)
    }

    /// Undo reservations and drop what the transaction would have created
    fn rollback(&mut self, tx_id: &TxId) -> Result<()> {
        for mut coin in self.db.coins() {
            if coin.spent_tx == Some(*tx_id) && coin.status != CoinStatus::Spent {
                coin.status = CoinStatus::Available;
                coin.spent_tx = None;
                self.db.save_coin(&coin)?;
            } else if coin.create_tx == Some(*tx_id) && coin.status == CoinStatus::Unconfirmed {
                self.db.remove_coin(&coin.id)?;
            }
        }
        for mut coin in self.db.shielded_coins() {
            if coin.spent_tx == Some(*tx_id) && coin.status != CoinStatus::Spent {
                coin.status = CoinStatus::Available;
                coin.spent_tx = None;
                self.db.save_shielded_coin(&coin)?;
            } else if coin.create_tx == Some(*tx_id) && coin.txo_id.is_none() {
                self.db.remove_shielded_coin(&coin.id)?;
            }
        }
        Ok(())
    }

    fn fail(&mut self, handle: TxHandle, reason: TxFailureReason, notify_peer: bool) {
        let Some(entry) = self.txs.get(&handle).cloned() else {
            return;
        };
        if entry.state.is_terminal() {
            return;
        }
        error!(tx_id = %entry.tx_id, %reason, code = reason.code(), "transaction failed");
        self.keeper.cancel(handle);
        self.release_nonce_slot(handle, &entry.tx_id);
        if notify_peer {
            self.notify_peer(&entry, &reason);
        }
        if let Err(err) = self.record_failure(handle, &entry.tx_id, reason) {
            error!(tx_id = %entry.tx_id, %err, "failed to record transaction failure");
        }
    }

    fn record_failure(&mut self, handle: TxHandle, tx_id: &TxId, reason: TxFailureReason) -> Result<()> {
        self.rollback(tx_id)?;
        set_param(&mut self.db, tx_id, DEFAULT_SUB_TX, TxParameterId::FailureReason, &reason)?;
        self.set_state(handle, TxState::Failed(reason))
    }

    /// Give a slot that will never be signed with back to the key keeper. The answer arrives
    /// after the transaction is closed and is dropped.
    fn release_nonce_slot(&mut self, handle: TxHandle, tx_id: &TxId) {
        let slot = match TxBuilder::load(&self.db, tx_id, DEFAULT_SUB_TX) {
            Ok(builder) => builder.held_nonce_slot(),
            Err(err) => {
                error!(tx_id = %tx_id, %err, "failed to load transaction");
                None
            }
        };
        if let Some(slot) = slot {
            debug!(tx_id = %tx_id, slot = slot.index, "releasing nonce slot");
            if let Err(err) = self.keeper.submit(handle, Method::ReleaseNonceSlot { slot }) {
                error!(tx_id = %tx_id, %err, "key keeper request refused");
            }
        }
    }

    fn notify_peer(&mut self, entry: &ActiveTx, reason: &TxFailureReason) {
        let (Some(peer), TxType::Simple) = (entry.peer, entry.tx_type) else {
            return;
        };
        match PeerMessage::new(entry.tx_id, entry.tx_type, DEFAULT_SUB_TX, self.identity).with(TxParameterId::FailureReason, reason) {
            Ok(message) => self.peers.send(&peer, message),
            Err(err) => error!(tx_id = %entry.tx_id, %err, "failed to notify peer"),
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        let Some(entry) = self.txs.get(&completion.handle).cloned() else {
            debug!(handle = ?completion.handle, kind = ?completion.kind, "completion for an unknown transaction");
            return;
        };
        if entry.state.is_terminal() {
            return;
        }
        let handle = completion.handle;
        let result = match completion.result {
            Err(err) => {
                warn!(tx_id = %entry.tx_id, kind = ?completion.kind, %err, "key keeper request failed");
                Err(TxFailureReason::from(err))
            }
            Ok(Response::Vouchers(vouchers)) => self.on_vouchers(handle, &entry, vouchers),
            Ok(response) => self.apply_response(&entry, response),
        };
        match result {
            Ok(()) => {
                self.dirty.insert(handle);
            }
            Err(reason) => self.fail(handle, reason, true),
        }
    }

    fn apply_response(&mut self, entry: &ActiveTx, response: Response) -> core::result::Result<(), TxFailureReason> {
        let mut builder = TxBuilder::load(&self.db, &entry.tx_id, DEFAULT_SUB_TX)?;
        builder.apply(response)?;
        builder.save(&mut self.db)?;
        Ok(())
    }

    /// Parameters from the other party of a transaction. Invitations and voucher requests open
    /// a new transaction on this side.
    pub fn on_peer_message(&mut self, message: PeerMessage) -> Result<()> {
        if let Some(reason) = message.get::<TxFailureReason>(TxParameterId::FailureReason)? {
            let Some(handle) = self.handle_of(&message.tx_id) else {
                return Ok(());
            };
            if self.txs.get(&handle).and_then(|e| e.peer) != Some(message.from) {
                return Ok(());
            }
            let registered = self
                .txs
                .get(&handle)
                .is_some_and(|e| e.initiator && matches!(e.state, TxState::Signed | TxState::Registered));
            if registered {
                warn!(tx_id = %message.tx_id, %reason, "peer failure ignored, the transaction may still complete");
            } else {
                warn!(tx_id = %message.tx_id, %reason, "peer failed the transaction");
                self.fail(handle, reason, false);
            }
            return Ok(());
        }

        let handle = match self.handle_of(&message.tx_id) {
            Some(handle) if self.txs.get(&handle).is_some_and(|e| e.peer == Some(message.from)) => {
                let signing = self
                    .txs
                    .get(&handle)
                    .is_some_and(|e| e.initiator && !matches!(e.state, TxState::Initial | TxState::AwaitingPeer));
                if signing {
                    warn!(tx_id = %message.tx_id, "peer parameters are fixed once signing started");
                    return Ok(());
                }
                let reopen = self.txs.get(&handle).is_some_and(|e| !e.initiator)
                    && message.tx_type == TxType::PushShielded
                    && message.has(TxParameterId::VoucherRequest)
                    && self.state(handle) == TxState::Completed;
                self.store_peer_params(&message, |id| id >= TxParameterId::PeerPublicExcess)?;
                if reopen {
                    self.set_state(handle, TxState::Initial)?;
                }
                handle
            }
            Some(_) => {
                warn!(tx_id = %message.tx_id, "message from a stranger ignored");
                return Ok(());
            }
            None => {
                if let Some(mut entry) = self.load_entry(&message.tx_id)? {
                    let reissue = !entry.initiator
                        && entry.peer == Some(message.from)
                        && message.tx_type == TxType::PushShielded
                        && message.has(TxParameterId::VoucherRequest);
                    if !reissue {
                        debug!(tx_id = %message.tx_id, "message for a finished transaction ignored");
                        return Ok(());
                    }
                    self.store_peer_params(&message, |id| id >= TxParameterId::PeerPublicExcess)?;
                    entry.state = TxState::Initial;
                    self.save_entry(&entry)?;
                    return self.reopened(entry);
                }
                let opens = match message.tx_type {
                    TxType::Simple => message.has(TxParameterId::PeerPublicExcess) && message.has(TxParameterId::Amount),
                    TxType::PushShielded => message.has(TxParameterId::VoucherRequest),
                    TxType::Split | TxType::PullShielded => false,
                };
                if !opens {
                    debug!(tx_id = %message.tx_id, "message for an unknown transaction ignored");
                    return Ok(());
                }
                self.store_peer_params(&message, |id| id.is_peer_settable())?;
                let entry = ActiveTx {
                    tx_id: message.tx_id,
                    tx_type: message.tx_type,
                    initiator: false,
                    peer: Some(message.from),
                    state: TxState::Initial,
                };
                self.save_entry(&entry)?;
                info!(tx_id = %message.tx_id, tx_type = ?message.tx_type, "incoming transaction");
                self.insert(entry)
            }
        };
        self.dirty.insert(handle);
        Ok(())
    }

    fn reopened(&mut self, entry: ActiveTx) -> Result<()> {
        info!(tx_id = %entry.tx_id, "vouchers requested again");
        self.insert(entry);
        Ok(())
    }

    fn store_peer_params(&mut self, message: &PeerMessage, allowed: impl Fn(TxParameterId) -> bool) -> Result<()> {
        for (id, raw) in &message.params {
            if allowed(*id) {
                self.db.set_raw(&message.tx_id, message.sub_tx, *id, raw.clone())?;
            } else {
                warn!(tx_id = %message.tx_id, param = ?id, "peer may not set parameter");
            }
        }
        Ok(())
    }

    /// New block: pick up shielded outputs, mature coins and re-run every live transaction
    pub fn on_tip_changed(&mut self) -> Result<()> {
        let tip = self.node.tip().height;
        self.scan_shielded(tip)?;

        let maturity = self.config.transactions.coin_maturity;
        for mut coin in self.db.coins() {
            if coin.status == CoinStatus::Maturing && coin.confirm_height.is_some_and(|h| h + maturity <= tip) {
                coin.status = CoinStatus::Available;
                self.db.save_coin(&coin)?;
            }
        }

        let live: Vec<TxHandle> = self.txs.iter().filter(|(_, e)| !e.state.is_terminal()).map(|(h, _)| *h).collect();
        self.dirty.extend(live);
        Ok(())
    }

    fn scan_shielded(&mut self, tip: Height) -> Result<()> {
        for (txo_id, txo) in self.node.shielded_outputs(self.scanned_txos) {
            self.scanned_txos = self.scanned_txos.max(txo_id + 1);
            let Some(found) = scan_output(&self.viewer, SHIELDED_KEY_INDEX, &txo) else {
                continue;
            };
            let mut coin = self.db.shielded_coin(&found.id).unwrap_or(found);
            if coin.txo_id.is_none() {
                info!(txo_id, value = coin.value, asset_id = coin.asset_id, "shielded coin confirmed");
                coin.txo_id = Some(txo_id);
                coin.confirm_height = Some(tip);
                if coin.status == CoinStatus::Unconfirmed {
                    coin.status = CoinStatus::Available;
                }
                self.db.save_shielded_coin(&coin)?;
            }
        }
        Ok(())
    }

    /// Give up on a transaction that has not reached the node yet
    pub fn cancel(&mut self, handle: TxHandle) -> Result<()> {
        let entry = self.txs.get(&handle).cloned().ok_or(WalletError::UnknownTransaction(handle))?;
        match entry.state {
            TxState::Initial | TxState::AwaitingPeer | TxState::Signing => {}
            TxState::Cancelled => return Ok(()),
            _ => return Err(WalletError::CannotCancel),
        }
        self.keeper.cancel(handle);
        self.release_nonce_slot(handle, &entry.tx_id);
        self.notify_peer(&entry, &TxFailureReason::Cancelled);
        self.rollback(&entry.tx_id)?;
        self.set_state(handle, TxState::Cancelled)
    }
}
