// Generators
pub const GENERATOR_H: &str = "Confidential value generator H";
pub const GENERATOR_J: &str = "Lelantus serial generator J";
pub const GENERATOR_F: &str = "Lelantus one-of-many bit generator F";
pub const ASSET_GENERATOR: &str = "Confidential asset generator";

// Key derivation domain separators
pub const KDF_GENERATOR_SECRET: &str = "Kdf generator secret";
pub const KDF_COFACTOR: &str = "Kdf cofactor";
pub const KDF_CHILD_SECRET: &str = "Kdf child secret";
pub const KDF_CHILD_COFACTOR: &str = "Kdf child cofactor";
pub const KDF_KEY: &str = "Kdf key";
pub const COIN_ID: &str = "Coin id";
pub const OWNER_KEY: &str = "Own.Key";
pub const OWNER_GENERATION_KEY: &str = "Own.Gen";
pub const OWNER_SERIAL_KEY: &str = "Own.Ser";
pub const IDENTITY_KEY: &str = "Wallet identity key";
pub const OUTPUT_ASSET_BLINDING: &str = "Output asset blinding";

// Signing domain separators
pub const SIGNATURE_CHALLENGE: &str = "Schnorr challenge";
pub const KERNEL_ID: &str = "Kernel id";
pub const HASH_LOCK_IMAGE: &str = "Kernel hash lock";
pub const PAYMENT_CONFIRMATION: &str = "Payment confirmation";
pub const SLOT_NONCE: &str = "Nonce slot nonce";
pub const SLOT_OFFSET: &str = "Nonce slot offset";

// Lelantus ticket domain separators
pub const TICKET_GENERATION_SCALAR: &str = "Lelantus kG";
pub const TICKET_PREIMAGE_KEY: &str = "Lelantus kG-k";
pub const SERIAL_PREIMAGE: &str = "Lelantus k-pI";
pub const TO_SERIAL: &str = "Lelantus to serial";
pub const TICKET_DH: &str = "Lelantus DH";
pub const TICKET_NONCE_G: &str = "Lelantus nG";
pub const TICKET_NONCE_J: &str = "Lelantus nJ";
pub const TICKET_CHALLENGE: &str = "Lelantus Out-S";
pub const TICKET_ID: &str = "Lelantus ticket id";
pub const SHARED_SECRET: &str = "Lelantus sh.skt";
pub const VOUCHER: &str = "Lelantus voucher";

// Lelantus output domain separators
pub const OUTPUT_BLINDING: &str = "Lelantus kG-O";
pub const SHIELDED_ASSET_BLINDING: &str = "Lelantus asset blinding";
pub const PROOF_TAG: &str = "Lelantus bp-s";
pub const ENCRYPTION_MASK_VALUE: &str = "Lelantus encryption mask value";
pub const ENCRYPTION_MASK_ASSET: &str = "Lelantus encryption mask asset";
pub const ENCRYPTION_MASK_MESSAGE: &str = "Lelantus encryption mask message";
pub const ENCRYPTION_MASK_FLAGS: &str = "Lelantus encryption mask flags";
pub const SHIELDED_TXO_ID: &str = "Lelantus output id";
pub const SHIELDED_SPEND_ID: &str = "Lelantus spend id";

// Proof transcripts
pub const ONE_OF_MANY_PROOF: &[u8] = b"Lelantus one-of-many proof";
pub const RANGE_PROOF: &[u8] = b"Confidential range proof";
pub const ASSET_PROOF: &str = "Confidential asset proof";
