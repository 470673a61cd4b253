//! Lelantus shielded pool: tickets, outputs, vouchers and spends.

pub mod output;
pub mod spend;
pub mod ticket;
pub mod viewer;

use curve25519_dalek::Scalar;
use serde::{Deserialize, Serialize};

use crate::core_types::*;
use output::*;
use ticket::*;
use viewer::*;

/// What the owner must keep to spend a shielded coin later
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedKeyMaterial {
    pub k_g: Scalar,
    pub created_by_viewer: bool,
    pub key_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedCoin {
    pub id: TicketId,
    pub key: ShieldedKeyMaterial,
    pub value: Amount,
    pub asset_id: AssetId,
    pub user: UserData,
    pub txo_id: Option<TxoId>,
    pub status: CoinStatus,
    pub create_tx: Option<TxId>,
    pub spent_tx: Option<TxId>,
    pub confirm_height: Option<Height>,
    pub spent_height: Option<Height>,
}

impl ShieldedCoin {
    pub fn is_available(&self) -> bool {
        self.status == CoinStatus::Available && self.txo_id.is_some() && self.spent_tx.is_none()
    }
}

/// Try to recognise a shielded output as ours
pub fn scan_output(viewer: &Viewer, key_index: u64, txo: &ShieldedTxo) -> Option<ShieldedCoin> {
    let params = TicketParams::recover(&txo.ticket, viewer)?;
    let recovered = txo.recover(&params.shared_secret)?;
    Some(ShieldedCoin {
        id: txo.ticket.id(),
        key: ShieldedKeyMaterial { k_g: params.k_g, created_by_viewer: params.created_by_viewer, key_index },
        value: recovered.value,
        asset_id: recovered.asset_id,
        user: recovered.user,
        txo_id: None,
        status: CoinStatus::Unconfirmed,
        create_tx: None,
        spent_tx: None,
        confirm_height: None,
        spent_height: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::Kdf;
    use crate::math_utils::ArithmeticMode;
    use crate::one_of_many::ProofConfig;
    use rand_core::OsRng;

    #[test]
    fn scanned_coin_restores_ticket() {
        let master = Kdf::from_seed(&[11u8; 32]);
        let viewer = Viewer::from_master(&master, 3);
        let (ticket, params) = TicketParams::generate_for_address(&viewer.to_address(), &[4u8; 32]);
        let out = ShieldedOutputParams { value: 70, asset_id: 0, user: UserData::default() };
        let (txo, _) = ShieldedTxo::generate(&mut OsRng, &ticket, &params.shared_secret, &out,
            &ProofConfig::new(2), ArithmeticMode::ConstantTime).expect("output");

        let coin = scan_output(&viewer, 3, &txo).expect("ours");
        assert_eq!(coin.value, 70);
        assert!(!coin.is_available());
        let restored = TicketParams::restore(&coin.key.k_g, coin.key.created_by_viewer, &viewer);
        assert_eq!(restored.serial_pub.compress(), ticket.serial_pub);

        assert!(scan_output(&Viewer::from_master(&master, 4), 4, &txo).is_none());
    }
}
