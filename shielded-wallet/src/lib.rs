//! Confidential-transaction wallet: MimbleWimble kernels negotiated between two parties, and
//! Lelantus shielded outputs and spends.

pub mod consts;
pub mod core_types;
mod domain_separators;
pub mod hash_functions;
mod impls;
pub mod math_utils;
pub mod random;
mod transcript;
mod type_macros;

pub mod asset;
pub mod kdf;
pub mod kernel;
pub mod one_of_many;
pub mod range_proof;
pub mod shielded;
pub mod signature;
pub mod transaction;

pub mod builder;
pub mod chain;
pub mod coin_selection;
pub mod config;
pub mod error;
pub mod key_keeper;
pub mod peer;
pub mod storage;
pub mod wallet;

pub use config::WalletConfig;
pub use core_types::*;
pub use error::{Result, TxFailureReason, WalletError};
pub use wallet::{ShieldedSendRequest, TxState, TxStatus, Wallet};
