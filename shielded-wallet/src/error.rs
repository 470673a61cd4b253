use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::*;
use crate::key_keeper::KeyKeeperError;

/// Why a transaction failed; stable codes for the caller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum TxFailureReason {
    #[error("not enough funds")]
    NoInputs,
    #[error("rejected by the user on the key keeper")]
    KeyKeeperUserRejected,
    #[error("key keeper is not reachable")]
    KeyKeeperCommunicationFailure,
    #[error("key keeper failed")]
    KeyKeeperError,
    #[error("transaction is invalid")]
    InvalidTransaction,
    #[error("peer signature is invalid")]
    InvalidPeerSignature,
    #[error("node rejected the transaction: {0}")]
    FailedToRegister(String),
    #[error("no usable vouchers")]
    NoVouchers,
    #[error("transaction expired")]
    Expired,
    #[error("cancelled")]
    Cancelled,
    #[error("anonymity window for the shielded input is unavailable")]
    ShieldedWindowUnavailable,
    #[error("fee is too small")]
    FeeIsTooSmall,
    #[error("peer's max height is unacceptable")]
    MaxHeightIsUnacceptable,
    #[error("payment proof is invalid")]
    InvalidPaymentProof,
    #[error("transaction is in an invalid state")]
    InvalidState,
}

impl TxFailureReason {
    pub fn code(&self) -> u32 {
        match self {
            TxFailureReason::NoInputs => 1,
            TxFailureReason::KeyKeeperUserRejected => 2,
            TxFailureReason::KeyKeeperCommunicationFailure => 3,
            TxFailureReason::KeyKeeperError => 4,
            TxFailureReason::InvalidTransaction => 5,
            TxFailureReason::InvalidPeerSignature => 6,
            TxFailureReason::FailedToRegister(_) => 7,
            TxFailureReason::NoVouchers => 8,
            TxFailureReason::Expired => 9,
            TxFailureReason::Cancelled => 10,
            TxFailureReason::ShieldedWindowUnavailable => 11,
            TxFailureReason::FeeIsTooSmall => 12,
            TxFailureReason::MaxHeightIsUnacceptable => 13,
            TxFailureReason::InvalidPaymentProof => 14,
            TxFailureReason::InvalidState => 15,
        }
    }
}

impl From<KeyKeeperError> for TxFailureReason {
    fn from(err: KeyKeeperError) -> Self {
        match err {
            KeyKeeperError::UserRejected => TxFailureReason::KeyKeeperUserRejected,
            KeyKeeperError::CommunicationFailure => TxFailureReason::KeyKeeperCommunicationFailure,
            KeyKeeperError::InvalidPaymentProof => TxFailureReason::InvalidPaymentProof,
            KeyKeeperError::Unspecified | KeyKeeperError::InvalidParameters(_) | KeyKeeperError::NonceSlotBusy => {
                TxFailureReason::KeyKeeperError
            }
        }
    }
}

/// Errors returned synchronously by wallet entry points
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("not enough funds of asset {asset}: need {required}, have {available}")]
    NoInputs { asset: AssetId, required: Amount, available: Amount },
    #[error("unknown transaction {0:?}")]
    UnknownTransaction(TxHandle),
    #[error("transaction can no longer be cancelled")]
    CannotCancel,
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("transaction failed: {0}")]
    Failed(#[from] TxFailureReason),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WalletError {
    /// Reason code of the equivalent asynchronous failure, if there is one
    pub fn reason(&self) -> Option<TxFailureReason> {
        match self {
            WalletError::NoInputs { .. } => Some(TxFailureReason::NoInputs),
            WalletError::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

impl From<WalletError> for TxFailureReason {
    fn from(err: WalletError) -> Self {
        match err.reason() {
            Some(reason) => reason,
            None => TxFailureReason::InvalidState,
        }
    }
}

pub type Result<T> = core::result::Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let reasons = [
            TxFailureReason::NoInputs,
            TxFailureReason::KeyKeeperUserRejected,
            TxFailureReason::KeyKeeperCommunicationFailure,
            TxFailureReason::KeyKeeperError,
            TxFailureReason::InvalidTransaction,
            TxFailureReason::InvalidPeerSignature,
            TxFailureReason::FailedToRegister("x".into()),
            TxFailureReason::NoVouchers,
            TxFailureReason::Expired,
            TxFailureReason::Cancelled,
            TxFailureReason::ShieldedWindowUnavailable,
            TxFailureReason::FeeIsTooSmall,
            TxFailureReason::MaxHeightIsUnacceptable,
            TxFailureReason::InvalidPaymentProof,
            TxFailureReason::InvalidState,
        ];
        let mut codes: Vec<u32> = reasons.iter().map(|r| r.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), reasons.len());
    }

    #[test]
    fn key_keeper_errors_map_to_distinct_reasons() {
        assert_eq!(TxFailureReason::from(KeyKeeperError::UserRejected), TxFailureReason::KeyKeeperUserRejected);
        assert_eq!(
            TxFailureReason::from(KeyKeeperError::CommunicationFailure),
            TxFailureReason::KeyKeeperCommunicationFailure
        );
        assert_eq!(TxFailureReason::from(KeyKeeperError::Unspecified), TxFailureReason::KeyKeeperError);
        assert_eq!(
            WalletError::NoInputs { asset: 0, required: 1000, available: 100 }.to_string(),
            "not enough funds of asset 0: need 1000, have 100"
        );
    }
}
