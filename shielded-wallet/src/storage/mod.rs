//! Wallet persistence: coins, shielded coins and the per-transaction parameter store.

mod params;

pub use params::*;

use std::collections::BTreeMap;

use crate::core_types::*;
use crate::error::Result;
use crate::shielded::ticket::TicketId;
use crate::shielded::ShieldedCoin;

/// Storage the wallet runs on. Reads cannot fail; writes may.
pub trait WalletDb {
    fn coins(&self) -> Vec<Coin>;
    fn coin(&self, id: &CoinId) -> Option<Coin>;
    fn save_coin(&mut self, coin: &Coin) -> Result<()>;
    fn remove_coin(&mut self, id: &CoinId) -> Result<()>;

    fn shielded_coins(&self) -> Vec<ShieldedCoin>;
    fn shielded_coin(&self, id: &TicketId) -> Option<ShieldedCoin>;
    fn save_shielded_coin(&mut self, coin: &ShieldedCoin) -> Result<()>;
    fn remove_shielded_coin(&mut self, id: &TicketId) -> Result<()>;

    /// Fresh derivation index for a new coin
    fn allocate_coin_index(&mut self) -> Result<u64>;

    fn get_raw(&self, tx_id: &TxId, sub_tx: SubTxId, id: TxParameterId) -> Option<String>;
    fn set_raw(&mut self, tx_id: &TxId, sub_tx: SubTxId, id: TxParameterId, value: String) -> Result<()>;
    fn delete_raw(&mut self, tx_id: &TxId, sub_tx: SubTxId, id: TxParameterId) -> Result<()>;
    fn tx_params(&self, tx_id: &TxId) -> Vec<(SubTxId, TxParameterId, String)>;
    /// Every transaction with stored parameters
    fn tx_ids(&self) -> Vec<TxId>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryWalletDb {
    coins: BTreeMap<CoinId, Coin>,
    shielded: BTreeMap<TicketId, ShieldedCoin>,
    params: BTreeMap<(TxId, SubTxId, TxParameterId), String>,
    next_index: u64,
}

impl MemoryWalletDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WalletDb for MemoryWalletDb {
    fn coins(&self) -> Vec<Coin> {
        self.coins.values().cloned().collect()
    }

    fn coin(&self, id: &CoinId) -> Option<Coin> {
        self.coins.get(id).cloned()
    }

    fn save_coin(&mut self, coin: &Coin) -> Result<()> {
        self.next_index = self.next_index.max(coin.id.index + 1);
        self.coins.insert(coin.id, coin.clone());
        Ok(())
    }

    fn remove_coin(&mut self, id: &CoinId) -> Result<()> {
        self.coins.remove(id);
        Ok(())
    }

    fn shielded_coins(&self) -> Vec<ShieldedCoin> {
        self.shielded.values().cloned().collect()
    }

    fn shielded_coin(&self, id: &TicketId) -> Option<ShieldedCoin> {
        self.shielded.get(id).cloned()
    }

    fn save_shielded_coin(&mut self, coin: &ShieldedCoin) -> Result<()> {
        self.shielded.insert(coin.id, coin.clone());
        Ok(())
    }

    fn remove_shielded_coin(&mut self, id: &TicketId) -> Result<()> {
        self.shielded.remove(id);
        Ok(())
    }

    fn allocate_coin_index(&mut self) -> Result<u64> {
        let index = self.next_index;
        self.next_index += 1;
        Ok(index)
    }

    fn get_raw(&self, tx_id: &TxId, sub_tx: SubTxId, id: TxParameterId) -> Option<String> {
        self.params.get(&(*tx_id, sub_tx, id)).cloned()
    }

    fn set_raw(&mut self, tx_id: &TxId, sub_tx: SubTxId, id: TxParameterId, value: String) -> Result<()> {
        self.params.insert((*tx_id, sub_tx, id), value);
        Ok(())
    }

    fn delete_raw(&mut self, tx_id: &TxId, sub_tx: SubTxId, id: TxParameterId) -> Result<()> {
        self.params.remove(&(*tx_id, sub_tx, id));
        Ok(())
    }

    fn tx_params(&self, tx_id: &TxId) -> Vec<(SubTxId, TxParameterId, String)> {
        self.params
            .iter()
            .filter(|((tx, _, _), _)| tx == tx_id)
            .map(|((_, sub_tx, id), value)| (*sub_tx, *id, value.clone()))
            .collect()
    }

    fn tx_ids(&self) -> Vec<TxId> {
        let mut ids: Vec<TxId> = self.params.keys().map(|(tx, _, _)| *tx).collect();
        ids.dedup();
        ids
    }
}
