use std::sync::LazyLock;

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::traits::{Identity, MultiscalarMul, VartimeMultiscalarMul};
use curve25519_dalek::Scalar;
use serde::{Deserialize, Serialize};

use crate::consts::GROUP_ORDER_BYTES;
use crate::core_types::Amount;
use crate::domain_separators;
use crate::hash_functions::hash_to_point;
use crate::transcript::*;

/// Blinding and signing generator
pub const G: RistrettoPoint = RISTRETTO_BASEPOINT_POINT;

/// Native value generator
pub static H: LazyLock<RistrettoPoint> = LazyLock::new(|| {
    hash_to_point(&make_transcript!(domain_separators::GENERATOR_H,))
});

/// Serial generator for Lelantus tickets
pub static J: LazyLock<RistrettoPoint> = LazyLock::new(|| {
    hash_to_point(&make_transcript!(domain_separators::GENERATOR_J,))
});

/// Bit commitment generator for one-of-many proofs
pub static F: LazyLock<RistrettoPoint> = LazyLock::new(|| {
    hash_to_point(&make_transcript!(domain_separators::GENERATOR_F,))
});

/// Which flavour of curve arithmetic to use for multi-exponentiations. Anything touching
/// secret scalars stays constant-time; verifiers may opt into the faster variable-time path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticMode {
    #[default]
    ConstantTime,
    VarTime,
}

pub fn multiscalar_mul(mode: ArithmeticMode, scalars: &[Scalar], points: &[RistrettoPoint]) -> RistrettoPoint {
    assert_eq!(scalars.len(), points.len());
    match mode {
        ArithmeticMode::ConstantTime => RistrettoPoint::multiscalar_mul(scalars, points),
        ArithmeticMode::VarTime => RistrettoPoint::vartime_multiscalar_mul(scalars, points),
    }
}

/// C = b G + v V, for a value generator V
pub fn commit(value: Amount, blinding: &Scalar, value_generator: &RistrettoPoint) -> RistrettoPoint {
    RistrettoPoint::mul_base(blinding) + Scalar::from(value) * value_generator
}

/// x G
pub fn scalar_mul_base(x: &Scalar) -> RistrettoPoint {
    RistrettoPoint::mul_base(x)
}

/// x G + y J
pub fn scalar_mul_gj(x: &Scalar, y: &Scalar) -> RistrettoPoint {
    RistrettoPoint::mul_base(x) + y * *J
}

pub fn decompress(point: &CompressedRistretto) -> Option<RistrettoPoint> {
    point.decompress()
}

pub fn identity() -> RistrettoPoint {
    RistrettoPoint::identity()
}

/// x + k l over 256-bit little-endian integers, None if the sum leaves 256 bits
pub fn add_group_order_multiple(x: &[u8; 32], k: u8) -> Option<[u8; 32]> {
    let mut out = [0u8; 32];
    let mut carry = 0u32;
    for i in 0..32 {
        let v = x[i] as u32 + (k as u32) * (GROUP_ORDER_BYTES[i] as u32) + carry;
        out[i] = v as u8;
        carry = v >> 8;
    }
    if carry == 0 {
        Some(out)
    } else {
        None
    }
}

/// Split a 256-bit string into (m mod l, floor(m / l)); the quotient always fits in 4 bits
pub fn reduce_with_quotient(bytes: &[u8; 32]) -> (Scalar, u8) {
    let reduced = Scalar::from_bytes_mod_order(*bytes);
    let reduced_bytes = reduced.to_bytes();
    for k in 0..16u8 {
        if add_group_order_multiple(&reduced_bytes, k).as_ref() == Some(bytes) {
            return (reduced, k);
        }
    }
    unreachable!("2^256 / l < 16")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generators_are_distinct() {
        assert_ne!(G, *H);
        assert_ne!(G, *J);
        assert_ne!(*H, *J);
        assert_ne!(*F, *J);
    }

    #[test]
    fn order_multiple_round_trip() {
        for bytes in [[0u8; 32], [0xffu8; 32], GROUP_ORDER_BYTES] {
            let (reduced, k) = reduce_with_quotient(&bytes);
            assert_eq!(Some(bytes), add_group_order_multiple(&reduced.to_bytes(), k));
        }
        assert_eq!(reduce_with_quotient(&GROUP_ORDER_BYTES), (Scalar::ZERO, 1));
        assert_eq!(reduce_with_quotient(&[0xffu8; 32]).1, 15);
    }

    #[test]
    fn multiscalar_modes_agree() {
        let scalars = [Scalar::from(3u64), Scalar::from(5u64)];
        let points = [G, *H];
        assert_eq!(
            multiscalar_mul(ArithmeticMode::ConstantTime, &scalars, &points),
            multiscalar_mul(ArithmeticMode::VarTime, &scalars, &points)
        );
    }
}
