//! Input selection for one asset.
//!
//! Explicitly requested coins are used first. Standard coins are then added smallest first and
//! the result is trimmed of coins it does not need. Shielded coins come last, each one raising
//! the native amount to cover by the fee its spend kernel pays.

use tracing::warn;

use crate::consts::NATIVE_ASSET;
use crate::core_types::*;
use crate::error::{Result, WalletError};
use crate::shielded::ticket::TicketId;
use crate::shielded::ShieldedCoin;

#[derive(Clone, Debug, Default)]
pub struct SelectionRequest {
    pub asset_id: AssetId,
    /// value to cover, fees included but not those of shielded inputs
    pub target: Amount,
    pub preselected: Vec<CoinId>,
    pub preselected_shielded: Vec<TicketId>,
    pub max_shielded: usize,
    pub shielded_input_fee: Amount,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<CoinId>,
    pub shielded_inputs: Vec<ShieldedCoin>,
    /// value of everything selected
    pub total: Amount,
    /// kernel fees of the selected shielded inputs; part of the target for native selections
    pub shielded_fee: Amount,
    pub change: Amount,
}

impl Selection {
    /// value this selection must cover
    fn required(&self, request: &SelectionRequest) -> Amount {
        if request.asset_id == NATIVE_ASSET {
            request.target.saturating_add(self.shielded_fee)
        } else {
            request.target
        }
    }

    fn is_enough(&self, request: &SelectionRequest) -> bool {
        self.total >= self.required(request)
    }

    fn add_coin(&mut self, coin: &Coin) {
        self.inputs.push(coin.id);
        self.total = self.total.saturating_add(coin.value());
    }

    fn add_shielded(&mut self, coin: &ShieldedCoin, fee: Amount) {
        self.shielded_inputs.push(coin.clone());
        self.total = self.total.saturating_add(coin.value);
        self.shielded_fee = self.shielded_fee.saturating_add(fee);
    }
}

/// Choose inputs of `request.asset_id` out of the given coins. Only available coins are eligible,
/// so anything reserved by another pending transaction is never picked twice.
pub fn select_coins(coins: &[Coin], shielded: &[ShieldedCoin], request: &SelectionRequest) -> Result<Selection> {
    let mut selection = Selection::default();

    for id in &request.preselected {
        match coins.iter().find(|c| c.id == *id && c.is_available()) {
            Some(coin) if coin.asset_id() == request.asset_id => selection.add_coin(coin),
            _ => return Err(WalletError::InvalidParameters(format!("coin {id:?} is not available"))),
        }
    }
    for id in &request.preselected_shielded {
        match shielded.iter().find(|c| c.id == *id && c.is_available()) {
            Some(coin) if coin.asset_id == request.asset_id => selection.add_shielded(coin, request.shielded_input_fee),
            _ => return Err(WalletError::InvalidParameters(format!("shielded coin {id} is not available"))),
        }
    }

    if !selection.is_enough(request) {
        select_standard(coins, request, &mut selection);
    }
    if !selection.is_enough(request) {
        select_shielded(shielded, request, &mut selection);
    }

    let required = selection.required(request);
    if selection.total < required {
        let available = available_value(coins, shielded, request.asset_id);
        warn!(asset_id = request.asset_id, "You only have {available}, need {required}");
        return Err(WalletError::NoInputs { asset: request.asset_id, required, available });
    }
    selection.change = selection.total - required;
    Ok(selection)
}

fn select_standard(coins: &[Coin], request: &SelectionRequest, selection: &mut Selection) {
    let preselected = selection.inputs.len();
    let mut candidates: Vec<&Coin> = coins
        .iter()
        .filter(|c| c.is_available() && c.asset_id() == request.asset_id && !selection.inputs.contains(&c.id))
        .collect();
    candidates.sort_by_key(|c| (c.value(), c.id));

    for coin in candidates {
        if selection.is_enough(request) {
            break;
        }
        selection.add_coin(coin);
    }

    // drop the smallest picks that turned out unnecessary
    let required = selection.required(request);
    let mut index = preselected;
    while index < selection.inputs.len() {
        let value = selection.inputs[index].value;
        if selection.total - value >= required {
            selection.inputs.remove(index);
            selection.total -= value;
        } else {
            index += 1;
        }
    }
}

fn select_shielded(shielded: &[ShieldedCoin], request: &SelectionRequest, selection: &mut Selection) {
    let mut candidates: Vec<&ShieldedCoin> = shielded
        .iter()
        .filter(|c| {
            c.is_available()
                && c.asset_id == request.asset_id
                && !selection.shielded_inputs.iter().any(|s| s.id == c.id)
        })
        .collect();
    candidates.sort_by_key(|c| (c.value, c.id));

    for coin in candidates {
        if selection.is_enough(request) || selection.shielded_inputs.len() >= request.max_shielded {
            break;
        }
        selection.add_shielded(coin, request.shielded_input_fee);
    }
}

/// Value of every eligible coin of an asset
pub fn available_value(coins: &[Coin], shielded: &[ShieldedCoin], asset_id: AssetId) -> Amount {
    let standard = coins.iter().filter(|c| c.is_available() && c.asset_id() == asset_id).map(|c| c.value());
    let pool = shielded.iter().filter(|c| c.is_available() && c.asset_id == asset_id).map(|c| c.value);
    standard.chain(pool).fold(0, Amount::saturating_add)
}
