use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core_types::*;
use crate::error::Result;

use super::WalletDb;

/// Keys of the per-transaction parameter store.
///
/// Parameters below `PeerPublicExcess` are private working state. The `Peer*` ones, together
/// with the invitation fields, are what a counterparty may set through the parameter bag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TxParameterId {
    TxType,
    State,
    IsInitiator,
    MyId,
    PeerId,
    Amount,
    AssetId,
    Fee,
    MinHeight,
    MaxHeight,
    Message,

    Inputs,
    Outputs,
    ShieldedInputs,
    InputCommitments,
    CreatedOutputs,
    ShieldedKernels,
    ShieldedOffset,
    NonceSlot,
    PublicExcess,
    PublicNonce,
    PartialSignature,
    Offset,
    Kernel,
    KernelId,
    Transaction,
    Voucher,
    VoucherRequests,
    LastVoucherRequestHeight,
    LargeWindowLost,
    KernelProofHeight,
    PaymentProof,

    PeerPublicExcess,
    PeerPublicNonce,
    PeerSignature,
    PeerInputs,
    PeerOutputs,
    PeerOffset,
    PeerMaxHeight,
    PeerPaymentProof,
    PeerVouchers,
    VoucherRequest,
    FailureReason,
}

impl TxParameterId {
    /// Whether a counterparty is allowed to write this parameter
    pub fn is_peer_settable(&self) -> bool {
        matches!(
            self,
            TxParameterId::TxType
                | TxParameterId::PeerId
                | TxParameterId::Amount
                | TxParameterId::AssetId
                | TxParameterId::Fee
                | TxParameterId::MinHeight
                | TxParameterId::MaxHeight
                | TxParameterId::Message
        ) || *self >= TxParameterId::PeerPublicExcess
    }
}

pub fn get_param<T: DeserializeOwned, D: WalletDb + ?Sized>(
    db: &D,
    tx_id: &TxId,
    sub_tx: SubTxId,
    id: TxParameterId,
) -> Result<Option<T>> {
    match db.get_raw(tx_id, sub_tx, id) {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn set_param<T: Serialize + ?Sized, D: WalletDb + ?Sized>(
    db: &mut D,
    tx_id: &TxId,
    sub_tx: SubTxId,
    id: TxParameterId,
    value: &T,
) -> Result<()> {
    db.set_raw(tx_id, sub_tx, id, serde_json::to_string(value)?)
}

/// Every stored parameter of one transaction, in a portable form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxExport {
    pub tx_id: TxId,
    pub params: Vec<(SubTxId, TxParameterId, String)>,
}

pub fn export_transaction<D: WalletDb + ?Sized>(db: &D, tx_id: &TxId) -> Result<String> {
    let export = TxExport { tx_id: *tx_id, params: db.tx_params(tx_id) };
    Ok(serde_json::to_string(&export)?)
}

pub fn import_transaction<D: WalletDb + ?Sized>(db: &mut D, data: &str) -> Result<TxId> {
    let export: TxExport = serde_json::from_str(data)?;
    for (sub_tx, id, raw) in export.params {
        db.set_raw(&export.tx_id, sub_tx, id, raw)?;
    }
    Ok(export.tx_id)
}
