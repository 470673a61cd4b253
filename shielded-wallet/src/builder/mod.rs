//! Working state of one transaction leg.
//!
//! A [`TxBuilder`] is loaded from the parameter store at every step and written back after it,
//! so a wallet restarted from the same storage and key keeper resumes exactly where it stopped.
//! Each phase either has what it needs, asks the key keeper for it, or waits for the peer.

mod shielded;
mod signing;

pub use shielded::choose_voucher;

use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::Scalar;

use crate::core_types::*;
use crate::error;
use crate::key_keeper::{KernelParameters, Method, NonceSlot};
use crate::kernel::TxKernel;
use crate::shielded::ticket::Voucher;
use crate::shielded::ShieldedCoin;
use crate::signature::Signature;
use crate::storage::{get_param, set_param, TxParameterId, WalletDb};
use crate::transaction::{Input, Output, Transaction};

/// Outcome of one phase of a builder
#[derive(Debug)]
pub enum Step {
    Done,
    Request(Method),
    Wait,
}

/// What the counterparty has told us so far
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerData {
    pub excess: Option<CompressedRistretto>,
    pub nonce: Option<CompressedRistretto>,
    pub signature: Option<Scalar>,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub offset: Option<Scalar>,
    pub max_height: Option<Height>,
    pub payment_proof: Option<Signature>,
    pub vouchers: Option<Vec<Voucher>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxBuilder {
    pub tx_id: TxId,
    pub sub_tx: SubTxId,
    pub amount: Amount,
    pub asset_id: AssetId,
    pub fee: Amount,
    pub height: HeightRange,
    pub message: [u8; 32],

    pub inputs: Vec<CoinId>,
    pub outputs: Vec<CoinId>,
    pub shielded_inputs: Vec<ShieldedCoin>,
    pub input_commitments: Option<Vec<CompressedRistretto>>,
    pub created_outputs: Option<Vec<Output>>,
    /// finished spend kernels, in `shielded_inputs` order
    pub shielded_kernels: Vec<TxKernel>,
    pub shielded_offset: Scalar,

    pub nonce_slot: Option<NonceSlot>,
    pub public_excess: Option<CompressedRistretto>,
    pub public_nonce: Option<CompressedRistretto>,
    pub partial_signature: Option<Scalar>,
    pub offset: Option<Scalar>,
    pub kernel: Option<TxKernel>,
    pub payment_proof: Option<Signature>,
    pub voucher: Option<Voucher>,
    pub large_window_lost: bool,

    pub peer: PeerData,
}

macro_rules! load {
    ($db:expr, $tx:expr, $sub:expr, $id:ident) => {
        get_param($db, $tx, $sub, TxParameterId::$id)?
    };
}

impl TxBuilder {
    pub fn new(tx_id: TxId, sub_tx: SubTxId) -> Self {
        Self { tx_id, sub_tx, ..Default::default() }
    }

    pub fn load<D: WalletDb + ?Sized>(db: &D, tx_id: &TxId, sub_tx: SubTxId) -> error::Result<Self> {
        let (tx, sub) = (tx_id, sub_tx);
        Ok(Self {
            tx_id: *tx_id,
            sub_tx,
            amount: load!(db, tx, sub, Amount).unwrap_or_default(),
            asset_id: load!(db, tx, sub, AssetId).unwrap_or_default(),
            fee: load!(db, tx, sub, Fee).unwrap_or_default(),
            height: HeightRange {
                min: load!(db, tx, sub, MinHeight).unwrap_or_default(),
                max: load!(db, tx, sub, MaxHeight).unwrap_or_default(),
            },
            message: load!(db, tx, sub, Message).unwrap_or_default(),
            inputs: load!(db, tx, sub, Inputs).unwrap_or_default(),
            outputs: load!(db, tx, sub, Outputs).unwrap_or_default(),
            shielded_inputs: load!(db, tx, sub, ShieldedInputs).unwrap_or_default(),
            input_commitments: load!(db, tx, sub, InputCommitments),
            created_outputs: load!(db, tx, sub, CreatedOutputs),
            shielded_kernels: load!(db, tx, sub, ShieldedKernels).unwrap_or_default(),
            shielded_offset: load!(db, tx, sub, ShieldedOffset).unwrap_or_default(),
            nonce_slot: load!(db, tx, sub, NonceSlot),
            public_excess: load!(db, tx, sub, PublicExcess),
            public_nonce: load!(db, tx, sub, PublicNonce),
            partial_signature: load!(db, tx, sub, PartialSignature),
            offset: load!(db, tx, sub, Offset),
            kernel: load!(db, tx, sub, Kernel),
            payment_proof: load!(db, tx, sub, PaymentProof),
            voucher: load!(db, tx, sub, Voucher),
            large_window_lost: load!(db, tx, sub, LargeWindowLost).unwrap_or_default(),
            peer: PeerData {
                excess: load!(db, tx, sub, PeerPublicExcess),
                nonce: load!(db, tx, sub, PeerPublicNonce),
                signature: load!(db, tx, sub, PeerSignature),
                inputs: load!(db, tx, sub, PeerInputs).unwrap_or_default(),
                outputs: load!(db, tx, sub, PeerOutputs).unwrap_or_default(),
                offset: load!(db, tx, sub, PeerOffset),
                max_height: load!(db, tx, sub, PeerMaxHeight),
                payment_proof: load!(db, tx, sub, PeerPaymentProof),
                vouchers: load!(db, tx, sub, PeerVouchers),
            },
        })
    }

    /// Write back the local working state; peer data is only ever written by the peer
    pub fn save<D: WalletDb + ?Sized>(&self, db: &mut D) -> error::Result<()> {
        let (tx, sub) = (&self.tx_id, self.sub_tx);
        set_param(db, tx, sub, TxParameterId::Amount, &self.amount)?;
        set_param(db, tx, sub, TxParameterId::AssetId, &self.asset_id)?;
        set_param(db, tx, sub, TxParameterId::Fee, &self.fee)?;
        set_param(db, tx, sub, TxParameterId::MinHeight, &self.height.min)?;
        set_param(db, tx, sub, TxParameterId::MaxHeight, &self.height.max)?;
        set_param(db, tx, sub, TxParameterId::Message, &self.message)?;
        set_param(db, tx, sub, TxParameterId::Inputs, &self.inputs)?;
        set_param(db, tx, sub, TxParameterId::Outputs, &self.outputs)?;
        set_param(db, tx, sub, TxParameterId::ShieldedInputs, &self.shielded_inputs)?;
        set_param(db, tx, sub, TxParameterId::ShieldedKernels, &self.shielded_kernels)?;
        set_param(db, tx, sub, TxParameterId::ShieldedOffset, &self.shielded_offset)?;
        set_param(db, tx, sub, TxParameterId::LargeWindowLost, &self.large_window_lost)?;

        macro_rules! save_opt {
            ($field:expr, $id:ident) => {
                if let Some(value) = &$field {
                    set_param(db, tx, sub, TxParameterId::$id, value)?;
                }
            };
        }
        save_opt!(self.input_commitments, InputCommitments);
        save_opt!(self.created_outputs, CreatedOutputs);
        save_opt!(self.nonce_slot, NonceSlot);
        save_opt!(self.public_excess, PublicExcess);
        save_opt!(self.public_nonce, PublicNonce);
        save_opt!(self.partial_signature, PartialSignature);
        save_opt!(self.offset, Offset);
        save_opt!(self.kernel, Kernel);
        save_opt!(self.payment_proof, PaymentProof);
        save_opt!(self.voucher, Voucher);
        if let Some(kernel) = &self.kernel {
            set_param(db, tx, sub, TxParameterId::KernelId, &kernel.id())?;
        }
        Ok(())
    }

    pub fn kernel_parameters(&self) -> KernelParameters {
        KernelParameters {
            peer_excess: self.peer.excess,
            peer_nonce: self.peer.nonce,
            ..KernelParameters::new(self.fee, self.height)
        }
    }

    /// Commitments of our standard inputs
    pub fn commitments_step(&self) -> Step {
        if self.input_commitments.is_some() || self.inputs.is_empty() {
            return Step::Done;
        }
        Step::Request(Method::RecoverCommitments { coins: self.inputs.clone() })
    }

    /// Range-proven outputs for our coins
    pub fn outputs_step(&self) -> Step {
        if self.created_outputs.is_some() || self.outputs.is_empty() {
            return Step::Done;
        }
        Step::Request(Method::CreateOutputs { coins: self.outputs.clone() })
    }

    /// Everything both sides contributed, with the given kernel and the summed offset
    pub fn assemble(&self) -> Option<Transaction> {
        let kernel = self.kernel.clone()?;
        let mut inputs: Vec<Input> = self
            .input_commitments
            .iter()
            .flatten()
            .map(|commitment| Input { commitment: *commitment })
            .collect();
        if inputs.len() != self.inputs.len() {
            return None;
        }
        inputs.extend(self.peer.inputs.iter().cloned());

        let mut outputs = self.created_outputs.clone().unwrap_or_default();
        if outputs.len() != self.outputs.len() {
            return None;
        }
        outputs.extend(self.peer.outputs.iter().cloned());

        let mut kernels = vec![kernel];
        kernels.extend(self.shielded_kernels.iter().cloned());

        let mut tx = Transaction {
            inputs,
            outputs,
            kernels,
            offset: self.offset? + self.shielded_offset + self.peer.offset.unwrap_or_default(),
        };
        tx.normalize();
        Some(tx)
    }
}
