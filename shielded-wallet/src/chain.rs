//! The wallet's view of the chain.

use curve25519_dalek::ristretto::RistrettoPoint;
use serde::{Deserialize, Serialize};

use crate::core_types::*;
use crate::kernel::KernelId;
use crate::shielded::output::ShieldedTxo;
use crate::transaction::Transaction;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub height: Height,
    pub hash: [u8; 32],
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    /// the node has already seen this transaction
    AlreadyRegistered,
    Rejected(String),
}

/// Node interface. Answers reflect the node's state at the time of the call; progress of the
/// chain reaches the wallet through [`Wallet::on_tip_changed`](crate::wallet::Wallet::on_tip_changed).
pub trait NodeGateway {
    fn tip(&self) -> ChainTip;

    /// Number of elements in the shielded pool
    fn shielded_output_count(&self) -> TxoId;

    /// Pool elements `start..start + count`; shorter if the node knows fewer
    fn shielded_window(&self, start: TxoId, count: u32) -> Vec<RistrettoPoint>;

    /// Shielded outputs from `start` on, with their pool positions
    fn shielded_outputs(&self, start: TxoId) -> Vec<(TxoId, ShieldedTxo)>;

    /// Height of the block containing the kernel, if it is in the chain
    fn kernel_proof(&self, kernel_id: &KernelId) -> Option<Height>;

    fn register_transaction(&mut self, tx: &Transaction) -> RegistrationStatus;
}
