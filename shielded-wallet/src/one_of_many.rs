//! Groth–Kohlweiss one-of-many proof with binary decomposition (n = 2).
//!
//! Proves knowledge of an index l and a scalar r such that W_l = r G, for a public list
//! W_0 .. W_{N-1}, N = 2^M, without revealing l. Each bit l_j of the index is committed as
//! c_l = l_j F + r_j G and shown to be a bit; the list is then folded with the polynomials
//! p_i(x) = prod_j f_{j,i_j}(x), whose only degree-M term belongs to p_l.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::traits::IsIdentity;
use curve25519_dalek::Scalar;
use merlin::Transcript;
use serde::{Deserialize, Serialize};

use crate::domain_separators;
use crate::math_utils::*;
use crate::random::Random;

/// Anonymity set shape: N = 2^m elements
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofConfig {
    pub m: u32,
}

impl ProofConfig {
    pub const fn new(m: u32) -> Self {
        Self { m }
    }

    pub const fn size(&self) -> usize {
        1usize << self.m
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitProof {
    pub c_l: CompressedRistretto,
    pub c_a: CompressedRistretto,
    pub c_b: CompressedRistretto,
    pub f: Scalar,
    pub z_a: Scalar,
    pub z_b: Scalar,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneOfManyProof {
    pub bits: Vec<BitProof>,
    pub c_d: Vec<CompressedRistretto>,
    pub z_d: Scalar,
}

fn bit_commit(mode: ArithmeticMode, value: &Scalar, blinding: &Scalar) -> RistrettoPoint {
    multiscalar_mul(mode, &[*value, *blinding], &[*F, G])
}

fn fiat_shamir_challenge(
    context: &[u8; 32],
    list: &[RistrettoPoint],
    bit_commitments: &[(CompressedRistretto, CompressedRistretto, CompressedRistretto)],
    c_d: &[CompressedRistretto],
) -> Scalar {
    let mut transcript = Transcript::new(domain_separators::ONE_OF_MANY_PROOF);
    transcript.append_message(b"context", context);
    transcript.append_u64(b"n", list.len() as u64);
    for element in list {
        transcript.append_message(b"W", element.compress().as_bytes());
    }
    for (c_l, c_a, c_b) in bit_commitments {
        transcript.append_message(b"c_l", c_l.as_bytes());
        transcript.append_message(b"c_a", c_a.as_bytes());
        transcript.append_message(b"c_b", c_b.as_bytes());
    }
    for c in c_d {
        transcript.append_message(b"c_d", c.as_bytes());
    }
    let mut wide = [0u8; 64];
    transcript.challenge_bytes(b"x", &mut wide);
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// (a x + b) * poly, coefficients in ascending degree
fn mul_linear(poly: &[Scalar], a: &Scalar, b: &Scalar) -> Vec<Scalar> {
    let mut res = vec![Scalar::ZERO; poly.len() + 1];
    for (k, coeff) in poly.iter().enumerate() {
        res[k] += coeff * b;
        res[k + 1] += coeff * a;
    }
    res
}

/// Products prod_j f_{j, i_j} for every index i, bit j of i selecting f1 or f0
fn fold_bits(f0: &[Scalar], f1: &[Scalar]) -> Vec<Scalar> {
    let mut products = vec![Scalar::ONE];
    for (a0, a1) in f0.iter().zip(f1) {
        let half = products.len();
        let mut next = vec![Scalar::ZERO; half * 2];
        for (i, p) in products.iter().enumerate() {
            next[i] = p * a0;
            next[i + half] = p * a1;
        }
        products = next;
    }
    products
}

impl OneOfManyProof {
    pub fn create<R: rand_core::CryptoRngCore + ?Sized>(
        rng: &mut R,
        config: &ProofConfig,
        list: &[RistrettoPoint],
        index: usize,
        witness: &Scalar,
        context: &[u8; 32],
        mode: ArithmeticMode,
    ) -> Self {
        let m = config.m as usize;
        let n = config.size();
        assert_eq!(list.len(), n);
        assert!(index < n);

        let l: Vec<Scalar> = (0..m).map(|j| Scalar::from(((index >> j) & 1) as u64)).collect();
        let r: Vec<Scalar> = (0..m).map(|_| Scalar::new_random_with_params(rng, ())).collect();
        let a: Vec<Scalar> = (0..m).map(|_| Scalar::new_random_with_params(rng, ())).collect();
        let s: Vec<Scalar> = (0..m).map(|_| Scalar::new_random_with_params(rng, ())).collect();
        let t: Vec<Scalar> = (0..m).map(|_| Scalar::new_random_with_params(rng, ())).collect();
        let rho: Vec<Scalar> = (0..m).map(|_| Scalar::new_random_with_params(rng, ())).collect();

        // c_l = l F + r G, c_a = a F + s G, c_b = (l a) F + t G
        let bit_commitments: Vec<_> = (0..m)
            .map(|j| {
                (
                    bit_commit(mode, &l[j], &r[j]).compress(),
                    bit_commit(mode, &a[j], &s[j]).compress(),
                    bit_commit(mode, &(l[j] * a[j]), &t[j]).compress(),
                )
            })
            .collect();

        // p_i(x) = prod_j f_{j,i_j}(x), f_{j,1} = l_j x + a_j, f_{j,0} = (1 - l_j) x - a_j
        let coefficients: Vec<Vec<Scalar>> = (0..n)
            .map(|i| {
                (0..m).fold(vec![Scalar::ONE], |poly, j| {
                    if (i >> j) & 1 == 1 {
                        mul_linear(&poly, &l[j], &a[j])
                    } else {
                        mul_linear(&poly, &(Scalar::ONE - l[j]), &(-a[j]))
                    }
                })
            })
            .collect();

        // c_d_k = sum_i p_{i,k} W_i + rho_k G
        let mut points = list.to_vec();
        points.push(G);
        let c_d: Vec<CompressedRistretto> = (0..m)
            .map(|k| {
                let mut scalars: Vec<Scalar> = coefficients.iter().map(|p| p[k]).collect();
                scalars.push(rho[k]);
                multiscalar_mul(mode, &scalars, &points).compress()
            })
            .collect();

        let x = fiat_shamir_challenge(context, list, &bit_commitments, &c_d);

        let bits = (0..m)
            .map(|j| {
                let f = l[j] * x + a[j];
                BitProof {
                    c_l: bit_commitments[j].0,
                    c_a: bit_commitments[j].1,
                    c_b: bit_commitments[j].2,
                    f,
                    z_a: r[j] * x + s[j],
                    z_b: r[j] * (x - f) + t[j],
                }
            })
            .collect();

        // z_d = r x^m - sum_k rho_k x^k
        let mut x_pow = Scalar::ONE;
        let mut z_d = Scalar::ZERO;
        for rho_k in rho.iter() {
            z_d -= rho_k * x_pow;
            x_pow *= x;
        }
        z_d += witness * x_pow;

        Self { bits, c_d, z_d }
    }

    pub fn verify(&self, config: &ProofConfig, list: &[RistrettoPoint], context: &[u8; 32], mode: ArithmeticMode) -> bool {
        let m = config.m as usize;
        if list.len() != config.size() || self.bits.len() != m || self.c_d.len() != m {
            return false;
        }

        let bit_commitments: Vec<_> = self.bits.iter().map(|b| (b.c_l, b.c_a, b.c_b)).collect();
        let x = fiat_shamir_challenge(context, list, &bit_commitments, &self.c_d);

        for bit in self.bits.iter() {
            let (Some(c_l), Some(c_a), Some(c_b)) = (bit.c_l.decompress(), bit.c_a.decompress(), bit.c_b.decompress())
            else {
                return false;
            };
            // x c_l + c_a == f F + z_a G
            let check_a = multiscalar_mul(mode,
                &[x, Scalar::ONE, -bit.f, -bit.z_a],
                &[c_l, c_a, *F, G]);
            // (x - f) c_l + c_b == z_b G
            let check_b = multiscalar_mul(mode,
                &[x - bit.f, Scalar::ONE, -bit.z_b],
                &[c_l, c_b, G]);
            if !check_a.is_identity() || !check_b.is_identity() {
                return false;
            }
        }

        let f1: Vec<Scalar> = self.bits.iter().map(|b| b.f).collect();
        let f0: Vec<Scalar> = f1.iter().map(|f| x - f).collect();
        let mut scalars = fold_bits(&f0, &f1);
        let mut points = list.to_vec();

        // sum_i p_i(x) W_i - sum_k x^k c_d_k - z_d G == 0
        let mut x_pow = Scalar::ONE;
        for c in self.c_d.iter() {
            let Some(c) = c.decompress() else {
                return false;
            };
            scalars.push(-x_pow);
            points.push(c);
            x_pow *= x;
        }
        scalars.push(-self.z_d);
        points.push(G);

        multiscalar_mul(mode, &scalars, &points).is_identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    fn random_list(n: usize) -> Vec<RistrettoPoint> {
        (0..n).map(|_| RistrettoPoint::new_random_with_params(&mut OsRng, ())).collect()
    }

    #[test]
    fn proof_for_every_index_verifies() {
        let config = ProofConfig::new(3);
        let context = [5u8; 32];
        for index in 0..config.size() {
            let mut list = random_list(config.size());
            let witness = Scalar::new_random_with_params(&mut OsRng, ());
            list[index] = scalar_mul_base(&witness);
            let proof = OneOfManyProof::create(&mut OsRng, &config, &list, index, &witness, &context,
                ArithmeticMode::ConstantTime);
            assert!(proof.verify(&config, &list, &context, ArithmeticMode::VarTime));
        }
    }

    #[test]
    fn proof_rejects_wrong_witness_context_or_list() {
        let config = ProofConfig::new(2);
        let context = [1u8; 32];
        let mut list = random_list(config.size());
        let witness = Scalar::new_random_with_params(&mut OsRng, ());
        list[2] = scalar_mul_base(&witness);

        let bad = OneOfManyProof::create(&mut OsRng, &config, &list, 2, &(witness + Scalar::ONE), &context,
            ArithmeticMode::ConstantTime);
        assert!(!bad.verify(&config, &list, &context, ArithmeticMode::VarTime));

        let good = OneOfManyProof::create(&mut OsRng, &config, &list, 2, &witness, &context,
            ArithmeticMode::ConstantTime);
        assert!(good.verify(&config, &list, &context, ArithmeticMode::VarTime));
        assert!(!good.verify(&config, &list, &[2u8; 32], ArithmeticMode::VarTime));

        let mut other_list = list.clone();
        other_list[0] = RistrettoPoint::new_random_with_params(&mut OsRng, ());
        assert!(!good.verify(&config, &other_list, &context, ArithmeticMode::VarTime));
        assert!(!good.verify(&ProofConfig::new(3), &list, &context, ArithmeticMode::VarTime));
    }

    #[test]
    fn identity_padding_is_a_valid_list_element() {
        let config = ProofConfig::new(2);
        let context = [0u8; 32];
        let witness = Scalar::new_random_with_params(&mut OsRng, ());
        let list = vec![identity(), identity(), scalar_mul_base(&witness), random_list(1)[0]];
        let proof = OneOfManyProof::create(&mut OsRng, &config, &list, 2, &witness, &context,
            ArithmeticMode::ConstantTime);
        assert!(proof.verify(&config, &list, &context, ArithmeticMode::ConstantTime));
    }
}
