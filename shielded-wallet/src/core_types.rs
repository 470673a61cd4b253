use curve25519_dalek::ristretto::CompressedRistretto;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::domain_separators;
use crate::hash_functions::*;
use crate::random::Random;
use crate::transcript::*;
use crate::type_macros::*;

/// Value in the smallest unit of an asset
pub type Amount = u64;
/// Block height
pub type Height = u64;
/// Confidential asset id, 0 is the native coin
pub type AssetId = u32;
/// Position of an output in the global shielded output sequence
pub type TxoId = u64;
/// Leg of a transaction; simple transactions have exactly one
pub type SubTxId = u32;

define_tiny_byte_type! {TxId, "Wallet-local transaction identifier, shared with the peer", TX_ID_BYTES, Copy, Hash, PartialOrd, Ord}
define_tiny_point_type! {PeerId, "Public identity key of a wallet, used to address peers and sign payment confirmations"}

/// Stable handle of an active transaction inside a wallet's arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHandle(pub u64);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightRange {
    pub min: Height,
    pub max: Height,
}

impl HeightRange {
    pub fn new(min: Height, lifetime: Height) -> Self {
        Self { min, max: min.saturating_add(lifetime) }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn contains(&self, height: Height) -> bool {
        self.min <= height && height <= self.max
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyType {
    Regular,
    Change,
    Coinbase,
}

impl KeyType {
    fn tag(&self) -> u8 {
        match self {
            KeyType::Regular => b'R',
            KeyType::Change => b'C',
            KeyType::Coinbase => b'B',
        }
    }
}

/// Identifies a standard UTXO; enough to re-derive its blinding factor from the master key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoinId {
    pub key_type: KeyType,
    pub sub_index: u32,
    pub index: u64,
    pub value: Amount,
    pub asset_id: AssetId,
}

impl CoinId {
    pub fn new(index: u64, value: Amount, asset_id: AssetId, key_type: KeyType) -> Self {
        Self { key_type, sub_index: 0, index, value, asset_id }
    }

    /// hv = H_32(type, sub_index, index, value, asset)
    pub fn hash_value(&self) -> [u8; 32] {
        let transcript = make_transcript!(domain_separators::COIN_ID,
            u8 : &self.key_type.tag(), u32 : &self.sub_index, u64 : &self.index,
            u64 : &self.value, u32 : &self.asset_id);
        derive_bytes_32(&transcript, &[])
    }

    pub fn is_native(&self) -> bool {
        self.asset_id == NATIVE_ASSET
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoinStatus {
    /// created by a pending transaction
    Unconfirmed,
    Available,
    /// confirmed, but not spendable yet
    Maturing,
    /// reserved by a pending transaction
    Outgoing,
    Spent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub id: CoinId,
    pub status: CoinStatus,
    pub create_tx: Option<TxId>,
    pub spent_tx: Option<TxId>,
    pub confirm_height: Option<Height>,
    pub spent_height: Option<Height>,
}

impl Coin {
    pub fn new(id: CoinId, status: CoinStatus) -> Self {
        Self { id, status, create_tx: None, spent_tx: None, confirm_height: None, spent_height: None }
    }

    pub fn value(&self) -> Amount {
        self.id.value
    }

    pub fn asset_id(&self) -> AssetId {
        self.id.asset_id
    }

    pub fn is_available(&self) -> bool {
        self.status == CoinStatus::Available && self.spent_tx.is_none()
    }
}
