//! Schnorr signatures over G, and the two-party aggregation used by kernels.
//!
//! Signature (R, s) on message m under P = x G verifies iff s G = R + e P, e = H_n(R, m).
//! Two parties holding (x_a, n_a) and (x_b, n_b) each publish P_i = x_i G and R_i = n_i G,
//! compute e over the total nonce R = R_a + R_b, and produce s_i = n_i + e x_i. The sum
//! s = s_a + s_b is a plain signature under P = P_a + P_b.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::Scalar;
use serde::{Deserialize, Serialize};

use crate::domain_separators;
use crate::hash_functions::*;
use crate::math_utils::*;
use crate::random::Random;
use crate::transcript::*;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub nonce_pub: CompressedRistretto,
    pub k: Scalar,
}

/// e = H_n(R, m)
pub fn challenge(nonce_pub: &CompressedRistretto, msg: &[u8; 32]) -> Scalar {
    let transcript = make_transcript!(domain_separators::SIGNATURE_CHALLENGE,
        CompressedRistretto : nonce_pub, Bytes32 : msg);
    derive_scalar(&transcript, &[])
}

impl Signature {
    pub fn sign(msg: &[u8; 32], sk: &Scalar, nonce: &Scalar) -> Self {
        let nonce_pub = scalar_mul_base(nonce).compress();
        let k = sign_partial(msg, &nonce_pub, sk, nonce);
        Self { nonce_pub, k }
    }

    pub fn sign_random<R: rand_core::CryptoRngCore + ?Sized>(rng: &mut R, msg: &[u8; 32], sk: &Scalar) -> Self {
        Self::sign(msg, sk, &Scalar::new_random_with_params(rng, ()))
    }

    /// s G == R + e P
    pub fn is_valid(&self, msg: &[u8; 32], pk: &RistrettoPoint) -> bool {
        let Some(nonce_pub) = self.nonce_pub.decompress() else {
            return false;
        };
        is_valid_partial(msg, &self.nonce_pub, &self.k, &nonce_pub, pk)
    }
}

/// s_i = n_i + e x_i, with e computed over the total nonce
pub fn sign_partial(msg: &[u8; 32], total_nonce_pub: &CompressedRistretto, sk: &Scalar, nonce: &Scalar) -> Scalar {
    nonce + challenge(total_nonce_pub, msg) * sk
}

/// s_i G == R_i + e P_i, with e computed over the total nonce
pub fn is_valid_partial(
    msg: &[u8; 32],
    total_nonce_pub: &CompressedRistretto,
    partial: &Scalar,
    nonce_pub: &RistrettoPoint,
    pk: &RistrettoPoint,
) -> bool {
    let e = challenge(total_nonce_pub, msg);
    scalar_mul_base(partial) == nonce_pub + e * pk
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    fn random_scalar() -> Scalar {
        Scalar::new_random_with_params(&mut OsRng, ())
    }

    #[test]
    fn single_party_signature() {
        let sk = random_scalar();
        let msg = [42u8; 32];
        let sig = Signature::sign_random(&mut OsRng, &msg, &sk);
        assert!(sig.is_valid(&msg, &scalar_mul_base(&sk)));
        assert!(!sig.is_valid(&[43u8; 32], &scalar_mul_base(&sk)));
    }

    #[test]
    fn two_party_aggregate_signature_verifies() {
        let (x_a, n_a, x_b, n_b) = (random_scalar(), random_scalar(), random_scalar(), random_scalar());
        let (p_a, r_a) = (scalar_mul_base(&x_a), scalar_mul_base(&n_a));
        let (p_b, r_b) = (scalar_mul_base(&x_b), scalar_mul_base(&n_b));
        let total_nonce = (r_a + r_b).compress();
        let msg = [1u8; 32];

        let s_a = sign_partial(&msg, &total_nonce, &x_a, &n_a);
        let s_b = sign_partial(&msg, &total_nonce, &x_b, &n_b);
        assert!(is_valid_partial(&msg, &total_nonce, &s_a, &r_a, &p_a));
        assert!(is_valid_partial(&msg, &total_nonce, &s_b, &r_b, &p_b));

        let sig = Signature { nonce_pub: total_nonce, k: s_a + s_b };
        assert!(sig.is_valid(&msg, &(p_a + p_b)));
    }

    #[test]
    fn mutated_partial_signature_fails() {
        let (x, n) = (random_scalar(), random_scalar());
        let (p, r) = (scalar_mul_base(&x), scalar_mul_base(&n));
        let total_nonce = (r + scalar_mul_base(&random_scalar())).compress();
        let msg = [9u8; 32];
        let s = sign_partial(&msg, &total_nonce, &x, &n);

        for bit in [0usize, 7, 100, 251] {
            let mut bytes = s.to_bytes();
            bytes[bit / 8] ^= 1 << (bit % 8);
            let mutated = Scalar::from_bytes_mod_order(bytes);
            assert!(!is_valid_partial(&msg, &total_nonce, &mutated, &r, &p));
        }
    }
}
