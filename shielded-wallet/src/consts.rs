use crate::core_types::AssetId;

/// Asset id of the native coin, used for fees
pub const NATIVE_ASSET: AssetId = 0;
pub const ENCRYPTED_VALUE_BYTES: usize = 8;
pub const ENCRYPTED_ASSET_BYTES: usize = 4;
pub const PROOF_TAG_BYTES: usize = 16;
pub const USER_MESSAGES: usize = 2;
pub const TX_ID_BYTES: usize = 16;
pub const NONCE_SLOTS: u32 = 16;
pub const RANGE_PROOF_BITS: usize = 64;
pub const DEFAULT_SUB_TX: u32 = 1;

/// The group order l = 2^252 + 27742317777372353535851937790883648493, little-endian
pub const GROUP_ORDER_BYTES: [u8; 32] = [
    0xed, 0xd3, 0xf5, 0x5c, 0x1a, 0x63, 0x12, 0x58, 0xd6, 0x9c, 0xf7, 0xa2, 0xde, 0xf9, 0xde, 0x14,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10,
];
/// Owner key index the wallet receives shielded coins on
pub const SHIELDED_KEY_INDEX: u64 = 0;
