//! Wallet configuration, loadable from TOML. Every section and field falls back to its default.

use serde::{Deserialize, Serialize};

use crate::core_types::*;
use crate::math_utils::ArithmeticMode;
use crate::one_of_many::ProofConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub transactions: TransactionConfig,
    #[serde(default)]
    pub shielded: ShieldedConfig,
    #[serde(default)]
    pub arithmetic_mode: ArithmeticMode,
}

/// Per-element fees; a transaction's fee must cover the sum for its elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default)]
    pub kernel_fee: Amount,
    #[serde(default)]
    pub output_fee: Amount,
    #[serde(default = "default_shielded_input_fee")]
    pub shielded_input_fee: Amount,
    #[serde(default = "default_shielded_output_fee")]
    pub shielded_output_fee: Amount,
    #[serde(default = "default_minimum_fee")]
    pub minimum_fee: Amount,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            kernel_fee: 0,
            output_fee: 0,
            shielded_input_fee: default_shielded_input_fee(),
            shielded_output_fee: default_shielded_output_fee(),
            minimum_fee: default_minimum_fee(),
        }
    }
}

fn default_shielded_input_fee() -> Amount {
    2
}

fn default_shielded_output_fee() -> Amount {
    1
}

fn default_minimum_fee() -> Amount {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// blocks a transaction may take to confirm
    #[serde(default = "default_lifetime")]
    pub default_lifetime: Height,
    /// how far the peer's proposed max height may deviate from ours
    #[serde(default = "default_max_peer_height_delta")]
    pub max_peer_height_delta: Height,
    /// blocks before a confirmed output becomes spendable
    #[serde(default)]
    pub coin_maturity: Height,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_lifetime: default_lifetime(),
            max_peer_height_delta: default_max_peer_height_delta(),
            coin_maturity: 0,
        }
    }
}

fn default_lifetime() -> Height {
    120
}

fn default_max_peer_height_delta() -> Height {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedConfig {
    #[serde(default = "default_large_window")]
    pub large_window: ProofConfig,
    #[serde(default = "default_small_window")]
    pub small_window: ProofConfig,
    /// how far a spend window may trail the end of the pool
    #[serde(default = "default_max_window_backlog")]
    pub max_window_backlog: TxoId,
    #[serde(default = "default_asset_window")]
    pub asset_window: ProofConfig,
    #[serde(default = "default_max_shielded_inputs")]
    pub max_shielded_inputs: usize,
    #[serde(default = "default_voucher_retries")]
    pub voucher_retries: u32,
}

impl Default for ShieldedConfig {
    fn default() -> Self {
        Self {
            large_window: default_large_window(),
            small_window: default_small_window(),
            max_window_backlog: default_max_window_backlog(),
            asset_window: default_asset_window(),
            max_shielded_inputs: default_max_shielded_inputs(),
            voucher_retries: default_voucher_retries(),
        }
    }
}

fn default_large_window() -> ProofConfig {
    ProofConfig::new(10)
}

fn default_small_window() -> ProofConfig {
    ProofConfig::new(6)
}

fn default_max_window_backlog() -> TxoId {
    64 * 1024
}

fn default_asset_window() -> ProofConfig {
    ProofConfig::new(3)
}

fn default_max_shielded_inputs() -> usize {
    4
}

fn default_voucher_retries() -> u32 {
    3
}

impl WalletConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Fee implied by the elements of a transaction
    pub fn required_fee(&self, kernels: usize, outputs: usize, shielded_inputs: usize, shielded_outputs: usize) -> Amount {
        let fees = &self.fees;
        let implied = fees.kernel_fee * kernels as Amount
            + fees.output_fee * outputs as Amount
            + fees.shielded_input_fee * shielded_inputs as Amount
            + fees.shielded_output_fee * shielded_outputs as Amount;
        implied.max(fees.minimum_fee)
    }
}
