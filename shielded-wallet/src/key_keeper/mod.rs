//! The boundary around private key material.
//!
//! Every operation that touches a secret scalar is a [`Method`] handled by a [`KeyKeeper`], which
//! answers with one [`Response`]. Callers only ever see public data: commitments, public
//! excesses and nonces, partial signatures, finished kernels and the offsets to fold into the
//! transaction.

mod local;
mod queue;

pub use local::LocalKeyKeeper;
pub use queue::{Completion, DuplicateRequest, KeyKeeperQueue};

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::*;
use crate::domain_separators;
use crate::hash_functions::*;
use crate::kernel::*;
use crate::shielded::output::ShieldedOutputParams;
use crate::shielded::spend::SpendWindow;
use crate::shielded::ticket::Voucher;
use crate::shielded::viewer::Viewer;
use crate::shielded::ShieldedCoin;
use crate::signature::Signature;
use crate::transaction::Output;
use crate::transcript::*;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum KeyKeeperError {
    #[error("rejected by the user")]
    UserRejected,
    #[error("communication failure")]
    CommunicationFailure,
    #[error("unspecified key keeper failure")]
    Unspecified,
    #[error("invalid parameters: {0}")]
    InvalidParameters(&'static str),
    #[error("no free nonce slot")]
    NonceSlotBusy,
    #[error("payment proof does not verify")]
    InvalidPaymentProof,
}

pub type Result<T> = core::result::Result<T, KeyKeeperError>;

/// Payment confirmation: the receiver's signature over what it was paid
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub value: Amount,
    pub asset_id: AssetId,
    pub sender: PeerId,
    pub receiver: PeerId,
    pub signature: Option<Signature>,
}

impl PaymentInfo {
    pub fn message(&self, kernel_id: &KernelId) -> [u8; 32] {
        derive_bytes_32(&make_transcript!(domain_separators::PAYMENT_CONFIRMATION,
            KernelId : kernel_id, u64 : &self.value, u32 : &self.asset_id, PeerId : &self.sender), &[])
    }

    pub fn is_valid(&self, kernel_id: &KernelId) -> bool {
        match (&self.signature, self.receiver.decompress()) {
            (Some(signature), Some(pk)) => signature.is_valid(&self.message(kernel_id), &pk),
            _ => false,
        }
    }
}

/// A nonce slot held by a transaction.
///
/// The slot nonce is derived from the master key and `id`, so a transaction that persisted its
/// slot can hand it back to a freshly started key keeper and sign with the same nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceSlot {
    pub index: u32,
    pub id: [u8; 32],
}

/// Public description of the kernel being signed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelParameters {
    pub fee: Amount,
    pub height: HeightRange,
    pub hash_lock: Option<HashLock>,
    pub peer_excess: Option<CompressedRistretto>,
    pub peer_nonce: Option<CompressedRistretto>,
    pub payment: Option<PaymentInfo>,
}

impl KernelParameters {
    pub fn new(fee: Amount, height: HeightRange) -> Self {
        Self { fee, height, hash_lock: None, peer_excess: None, peer_nonce: None, payment: None }
    }

    /// Kernel over the total excess, and the total nonce its challenge uses
    pub fn joint_kernel(&self, excess: &RistrettoPoint, nonce: &RistrettoPoint) -> Option<(TxKernel, CompressedRistretto)> {
        let peer_excess = self.peer_excess?.decompress()?;
        let peer_nonce = self.peer_nonce?.decompress()?;
        let mut kernel = TxKernel::standard(self.fee, self.height, self.hash_lock.clone());
        kernel.set_excess(&(excess + peer_excess));
        Some((kernel, (nonce + peer_nonce).compress()))
    }
}

/// Requests a key keeper understands
#[derive(Clone, Debug)]
pub enum Method {
    GetIdentity { index: u64 },
    /// watch-only viewer for an owner key
    GetViewer { key_index: u64 },
    RecoverCommitments { coins: Vec<CoinId> },
    CreateOutputs { coins: Vec<CoinId> },
    AllocateNonceSlot,
    /// take back a slot allocated before a restart
    RestoreNonceSlot { slot: NonceSlot },
    ReleaseNonceSlot { slot: NonceSlot },
    /// initiator side of a two-party kernel; `initial` only publishes excess and nonce
    SignSender {
        inputs: Vec<CoinId>,
        outputs: Vec<CoinId>,
        kernel: KernelParameters,
        slot: NonceSlot,
        initial: bool,
    },
    SignReceiver {
        inputs: Vec<CoinId>,
        outputs: Vec<CoinId>,
        kernel: KernelParameters,
    },
    /// single-party kernel over our own inputs and outputs
    SignSplit {
        inputs: Vec<CoinId>,
        outputs: Vec<CoinId>,
        kernel: KernelParameters,
    },
    CreateVouchers { key_index: u64, nonce: [u8; 32], count: u32 },
    SignSendShielded {
        inputs: Vec<CoinId>,
        outputs: Vec<CoinId>,
        kernel: KernelParameters,
        voucher: Voucher,
        output: ShieldedOutputParams,
    },
    SpendShielded {
        coin: ShieldedCoin,
        window: SpendWindow,
        elements: Vec<RistrettoPoint>,
        fee: Amount,
        height: HeightRange,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MethodKind {
    GetIdentity,
    GetViewer,
    RecoverCommitments,
    CreateOutputs,
    AllocateNonceSlot,
    RestoreNonceSlot,
    ReleaseNonceSlot,
    SignSender,
    SignReceiver,
    SignSplit,
    CreateVouchers,
    SignSendShielded,
    SpendShielded,
}

impl Method {
    pub fn kind(&self) -> MethodKind {
        match self {
            Method::GetIdentity { .. } => MethodKind::GetIdentity,
            Method::GetViewer { .. } => MethodKind::GetViewer,
            Method::RecoverCommitments { .. } => MethodKind::RecoverCommitments,
            Method::CreateOutputs { .. } => MethodKind::CreateOutputs,
            Method::AllocateNonceSlot => MethodKind::AllocateNonceSlot,
            Method::RestoreNonceSlot { .. } => MethodKind::RestoreNonceSlot,
            Method::ReleaseNonceSlot { .. } => MethodKind::ReleaseNonceSlot,
            Method::SignSender { .. } => MethodKind::SignSender,
            Method::SignReceiver { .. } => MethodKind::SignReceiver,
            Method::SignSplit { .. } => MethodKind::SignSplit,
            Method::CreateVouchers { .. } => MethodKind::CreateVouchers,
            Method::SignSendShielded { .. } => MethodKind::SignSendShielded,
            Method::SpendShielded { .. } => MethodKind::SpendShielded,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Response {
    Identity(PeerId),
    Viewer(Viewer),
    Commitments(Vec<CompressedRistretto>),
    Outputs(Vec<Output>),
    NonceSlot(NonceSlot),
    Released,
    SenderInitial {
        excess: CompressedRistretto,
        nonce: CompressedRistretto,
    },
    SenderFinal {
        partial: Scalar,
        offset: Scalar,
    },
    ReceiverSigned {
        excess: CompressedRistretto,
        nonce: CompressedRistretto,
        partial: Scalar,
        offset: Scalar,
        payment_proof: Option<Signature>,
    },
    /// a finished single-party kernel and the offset to add to the transaction
    Kernel {
        kernel: TxKernel,
        offset: Scalar,
    },
    Vouchers(Vec<Voucher>),
}

pub trait KeyKeeper {
    fn handle(&mut self, method: Method) -> Result<Response>;
}

impl<K: KeyKeeper + ?Sized> KeyKeeper for Box<K> {
    fn handle(&mut self, method: Method) -> Result<Response> {
        (**self).handle(method)
    }
}
