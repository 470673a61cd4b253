//! Shielded inputs and outputs of a transaction leg.

use crate::chain::NodeGateway;
use crate::config::ShieldedConfig;
use crate::consts::SHIELDED_KEY_INDEX;
use crate::error::TxFailureReason;
use crate::kernel::KernelBody;
use crate::shielded::output::{ShieldedOutputParams, UserData};
use crate::shielded::spend::{fit_window, select_spend_window, WindowFit};
use crate::shielded::viewer::Viewer;
use crate::shielded::scan_output;

use super::*;

/// First voucher that really comes from `identity`
pub fn choose_voucher(vouchers: &[Voucher], identity: &PeerId) -> Option<Voucher> {
    vouchers.iter().find(|v| v.is_valid(identity)).cloned()
}

impl TxBuilder {
    /// Spend proof request for the next shielded input that has none yet.
    ///
    /// The window is fetched here; if the node turns out to know fewer pool elements than it
    /// reported, the window is chosen again against what it returned.
    pub fn shielded_input_step<N: NodeGateway + ?Sized>(
        &mut self,
        node: &N,
        config: &ShieldedConfig,
        fee: Amount,
        rnd: u32,
    ) -> Result<Step, TxFailureReason> {
        let Some(coin) = self.shielded_inputs.get(self.shielded_kernels.len()).cloned() else {
            return Ok(Step::Done);
        };
        let txo_id = coin.txo_id.ok_or(TxFailureReason::InvalidState)?;
        let mut shielded_outputs = node.shielded_output_count();

        loop {
            if txo_id >= shielded_outputs {
                return Err(TxFailureReason::ShieldedWindowUnavailable);
            }
            let window = select_spend_window(
                txo_id,
                shielded_outputs,
                &config.large_window,
                &config.small_window,
                config.max_window_backlog,
                rnd,
            );
            match fit_window(&window, txo_id, node.shielded_window(window.start(), window.count())) {
                WindowFit::Complete(elements) => {
                    self.large_window_lost |= window.large_window_lost;
                    return Ok(Step::Request(Method::SpendShielded { coin, window, elements, fee, height: self.height }));
                }
                WindowFit::Shrunk { shielded_outputs: available } if available < shielded_outputs => {
                    shielded_outputs = available;
                }
                _ => return Err(TxFailureReason::ShieldedWindowUnavailable),
            }
        }
    }

    pub fn shielded_output_params(&self, sender: &PeerId) -> ShieldedOutputParams {
        ShieldedOutputParams {
            value: self.amount,
            asset_id: self.asset_id,
            user: UserData { sender: *sender.as_bytes(), message: self.message },
        }
    }

    /// Our own coin, if the signed shielded output is addressed to us
    pub fn detect_own_output(&self, viewer: &Viewer) -> Option<ShieldedCoin> {
        let Some(KernelBody::ShieldedOutput { txo, .. }) = self.kernel.as_ref().map(|k| &k.body) else {
            return None;
        };
        let mut coin = scan_output(viewer, SHIELDED_KEY_INDEX, txo)?;
        coin.create_tx = Some(self.tx_id);
        Some(coin)
    }
}
