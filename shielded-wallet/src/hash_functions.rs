use blake2::{digest, Blake2bVarCore};
use curve25519_dalek::{RistrettoPoint, Scalar};
use digest::core_api::{OutputSizeUser, TruncSide, UpdateCore, VariableOutputCore};
use typenum::Unsigned;

/// Keyed BLAKE2b with a caller-chosen output length (at most 64 bytes).
pub fn hash_base(data: &[u8], key: &[u8], out: &mut [u8]) {
    assert!(key.len() <= 64);
    assert!(!out.is_empty());
    assert!(out.len() <= <<Blake2bVarCore as OutputSizeUser>::OutputSize as Unsigned>::USIZE);
    assert!(matches!(Blake2bVarCore::TRUNC_SIDE, TruncSide::Left));

    let mut hasher = Blake2bVarCore::new_with_params(&[], &[], key.len(), out.len());

    let mut buffer = digest::core_api::Buffer::<Blake2bVarCore>::default();
    if !key.is_empty() {
        buffer.digest_blocks(key, |blocks| hasher.update_blocks(blocks));
        hasher.update_blocks(core::slice::from_ref(&buffer.pad_with_zeros()));
    }

    buffer.digest_blocks(data, |blocks| hasher.update_blocks(blocks));

    let mut full_out = Default::default();
    hasher.finalize_variable_core(&mut buffer, &mut full_out);
    out.copy_from_slice(&full_out[..out.len()]);
}

/// H_N[key](data)
pub fn derive_bytes<const N: usize>(data: &[u8], key: &[u8]) -> [u8; N] {
    let mut res = [0u8; N];
    hash_base(data, key, &mut res);
    res
}

pub fn derive_bytes_32(data: &[u8], key: &[u8]) -> [u8; 32] {
    derive_bytes::<32>(data, key)
}

/// H_n[key](data) = H_64[key](data) mod l
pub fn derive_scalar(data: &[u8], key: &[u8]) -> Scalar {
    let unreduced64_scalar = derive_bytes::<64>(data, key);
    Scalar::from_bytes_mod_order_wide(&unreduced64_scalar)
}

/// H_p(data): Elligator map of a 64-byte uniform hash, no known discrete log
pub fn hash_to_point(data: &[u8]) -> RistrettoPoint {
    RistrettoPoint::from_uniform_bytes(&derive_bytes::<64>(data, &[]))
}
