//! Parameter bags exchanged between the two parties of a transaction.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core_types::*;
use crate::error::Result;
use crate::storage::TxParameterId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    /// two-party send between standard outputs
    Simple,
    /// single-party rearrangement of own coins
    Split,
    /// send into the shielded pool
    PushShielded,
    /// spend out of the shielded pool
    PullShielded,
}

/// SetTxParameter: a set of typed parameters for one leg of a transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMessage {
    pub tx_id: TxId,
    pub tx_type: TxType,
    pub sub_tx: SubTxId,
    pub from: PeerId,
    pub params: Vec<(TxParameterId, String)>,
}

impl PeerMessage {
    pub fn new(tx_id: TxId, tx_type: TxType, sub_tx: SubTxId, from: PeerId) -> Self {
        Self { tx_id, tx_type, sub_tx, from, params: Vec::new() }
    }

    pub fn with<T: Serialize + ?Sized>(mut self, id: TxParameterId, value: &T) -> Result<Self> {
        self.params.push((id, serde_json::to_string(value)?));
        Ok(self)
    }

    pub fn get<T: DeserializeOwned>(&self, id: TxParameterId) -> Result<Option<T>> {
        match self.params.iter().find(|(p, _)| *p == id) {
            Some((_, raw)) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    pub fn has(&self, id: TxParameterId) -> bool {
        self.params.iter().any(|(p, _)| *p == id)
    }
}

/// Outgoing side of the transport; delivery is the transport's business
pub trait PeerChannel {
    fn send(&mut self, to: &PeerId, message: PeerMessage);
}
