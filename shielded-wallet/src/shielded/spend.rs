//! Spending shielded coins.
//!
//! The pool holds elements W_i = C_i + SerialPub_i. To spend one the owner reveals SpendPk (the
//! double-spend tag), commits the value afresh as C' = r' G + v H** and proves with a one-of-many
//! proof that exactly one of W_i - kJ J - C' is a multiple of G, where kJ = ToSerial(SpendPk).
//! A Schnorr signature by the spend key binds SpendPk to the kernel.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::Scalar;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::asset::*;
use crate::consts::NATIVE_ASSET;
use crate::core_types::*;
use crate::domain_separators;
use crate::hash_functions::*;
use crate::math_utils::*;
use crate::one_of_many::*;
use crate::random::Random;
use crate::shielded::ticket::to_serial;
use crate::signature::Signature;
use crate::transcript::*;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendHeader {
    pub window_end: TxoId,
    pub config: ProofConfig,
    pub spend_pk: CompressedRistretto,
    pub commitment: CompressedRistretto,
    pub asset_proof: Option<AssetProof>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedSpend {
    pub header: SpendHeader,
    pub proof: OneOfManyProof,
    pub signature: Signature,
}

/// Secrets of the coin being spent
pub struct SpendWitness {
    /// position inside the window
    pub index: usize,
    pub value: Amount,
    pub asset_id: AssetId,
    pub k_ser_g: Scalar,
    /// effective blinding of the pool output, b + v r_a
    pub output_blinding: Scalar,
    pub spend_sk: Scalar,
}

/// Fresh blinding of the re-commitment C' = r_out G + v (H_a + r2 G)
pub struct SpendBlinding {
    pub r_out: Scalar,
    pub r2: Scalar,
}

impl SpendBlinding {
    /// What the transaction offset must absorb for this input: -(r_out + v r2)
    pub fn offset_contribution(&self, value: Amount) -> Scalar {
        -modify_sk(&self.r_out, value, &self.r2)
    }
}

impl SpendHeader {
    pub fn hash(&self) -> [u8; 32] {
        let mut transcript = TranscriptBuf::new(domain_separators::SHIELDED_SPEND_ID);
        transcript
            .append(&self.window_end)
            .append(&self.config.m)
            .append(&self.spend_pk)
            .append(&self.commitment);
        if let Some(proof) = &self.asset_proof {
            transcript.append(&proof.blinded_generator).append(&proof.window_begin);
        }
        derive_bytes_32(transcript.as_bytes(), &[])
    }
}

/// W_i - kJ J - C'
fn shifted_list(elements: &[RistrettoPoint], spend_pk: &CompressedRistretto, commitment: &RistrettoPoint) -> Vec<RistrettoPoint> {
    let shift = to_serial(spend_pk) * *J + commitment;
    elements.iter().map(|w| w - shift).collect()
}

impl ShieldedSpend {
    /// The public part of the spend, fixed before the kernel message is known
    pub fn prepare<R: rand_core::CryptoRngCore + ?Sized>(
        rng: &mut R,
        window: &SpendWindow,
        witness: &SpendWitness,
        asset_config: &ProofConfig,
        mode: ArithmeticMode,
    ) -> (SpendHeader, SpendBlinding) {
        let spend_pk = scalar_mul_base(&witness.spend_sk).compress();
        let r_out = Scalar::new_random_with_params(rng, ());
        let (r2, value_generator, asset_proof) = if witness.asset_id == NATIVE_ASSET {
            (Scalar::ZERO, *H, None)
        } else {
            let r2 = Scalar::new_random_with_params(rng, ());
            let proof = AssetProof::create(rng, witness.asset_id, &r2, asset_config, spend_pk.as_bytes(), mode);
            (r2, blinded_generator(witness.asset_id, &r2), Some(proof))
        };
        let header = SpendHeader {
            window_end: window.window_end,
            config: window.config,
            spend_pk,
            commitment: commit(witness.value, &r_out, &value_generator).compress(),
            asset_proof,
        };
        (header, SpendBlinding { r_out, r2 })
    }

    pub fn create<R: rand_core::CryptoRngCore + ?Sized>(
        rng: &mut R,
        header: SpendHeader,
        blinding: &SpendBlinding,
        witness: &SpendWitness,
        elements: &[RistrettoPoint],
        msg: &[u8; 32],
        mode: ArithmeticMode,
    ) -> Option<Self> {
        let commitment = header.commitment.decompress()?;
        let list = shifted_list(elements, &header.spend_pk, &commitment);
        // r = kSerG + (k_out + v r_a) - (r_out + v r2)
        let r = witness.k_ser_g + witness.output_blinding - modify_sk(&blinding.r_out, witness.value, &blinding.r2);
        let proof = OneOfManyProof::create(rng, &header.config, &list, witness.index, &r, msg, mode);
        let signature = Signature::sign_random(rng, msg, &witness.spend_sk);
        Some(Self { header, proof, signature })
    }

    pub fn verify(&self, elements: &[RistrettoPoint], msg: &[u8; 32], asset_config: &ProofConfig, mode: ArithmeticMode) -> bool {
        if elements.len() != self.header.config.size() {
            return false;
        }
        let (Some(spend_pk), Some(commitment)) = (self.header.spend_pk.decompress(), self.header.commitment.decompress())
        else {
            return false;
        };
        if let Some(proof) = &self.header.asset_proof {
            if proof.verify(asset_config, self.header.spend_pk.as_bytes(), mode).is_none() {
                return false;
            }
        }
        if !self.signature.is_valid(msg, &spend_pk) {
            return false;
        }
        let list = shifted_list(elements, &self.header.spend_pk, &commitment);
        self.proof.verify(&self.header.config, &list, msg, mode)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendWindow {
    pub config: ProofConfig,
    /// one past the last pool element of the window
    pub window_end: TxoId,
    /// position of the coin inside the (left padded) window
    pub index: u32,
    pub large_window_lost: bool,
}

impl SpendWindow {
    /// First pool element the window covers
    pub fn start(&self) -> TxoId {
        self.window_end.saturating_sub(self.config.size() as TxoId)
    }

    /// Number of real pool elements in the window
    pub fn count(&self) -> u32 {
        (self.window_end - self.start()) as u32
    }
}

fn place_in_window(txo_id: TxoId, n: TxoId, shielded_outputs: TxoId, rnd: u32) -> (u32, TxoId) {
    let mut index = rnd as TxoId % n;
    let mut window_end = txo_id + n - index;
    if window_end > shielded_outputs {
        window_end = shielded_outputs;
        index = txo_id + n - shielded_outputs;
    }
    (index as u32, window_end)
}

/// Choose the anonymity window for spending pool element `txo_id` out of `shielded_outputs`.
///
/// The coin lands at a pseudo-random position of a large window. If that window would trail the
/// pool by more than `max_backlog` it is moved forward, and if the coin then falls out of it the
/// smaller configuration is used instead.
pub fn select_spend_window(
    txo_id: TxoId,
    shielded_outputs: TxoId,
    large: &ProofConfig,
    small: &ProofConfig,
    max_backlog: TxoId,
    rnd: u32,
) -> SpendWindow {
    assert!(txo_id < shielded_outputs);
    let n = large.size() as TxoId;
    let (mut index, mut window_end) = place_in_window(txo_id, n, shielded_outputs, rnd);

    if shielded_outputs > window_end + max_backlog {
        let repositioned_end = shielded_outputs - max_backlog;
        match (txo_id + n).checked_sub(repositioned_end) {
            Some(val) if val < n => {
                window_end = repositioned_end;
                index = val as u32;
            }
            _ => {
                warn!(txo_id, shielded_outputs, "large anonymity window unavailable, falling back to {} elements", small.size());
                let (index, window_end) = place_in_window(txo_id, small.size() as TxoId, shielded_outputs, rnd);
                return SpendWindow { config: *small, window_end, index, large_window_lost: true };
            }
        }
    }
    SpendWindow { config: *large, window_end, index, large_window_lost: false }
}

#[derive(Debug, PartialEq, Eq)]
pub enum WindowFit {
    /// the full list, left padded with the identity up to N
    Complete(Vec<RistrettoPoint>),
    /// the node knows fewer outputs than assumed; reselect with this pool size
    Shrunk { shielded_outputs: TxoId },
    /// the coin is beyond what the node returned
    Unavailable,
}

/// Fit the fetched window elements (starting at `window.start()`) to the proof size
pub fn fit_window(window: &SpendWindow, txo_id: TxoId, fetched: Vec<RistrettoPoint>) -> WindowFit {
    let expected = window.count() as usize;
    if fetched.len() < expected {
        let available_end = window.start() + fetched.len() as TxoId;
        return if txo_id < available_end {
            WindowFit::Shrunk { shielded_outputs: available_end }
        } else {
            WindowFit::Unavailable
        };
    }
    let mut list = vec![identity(); window.config.size() - expected];
    list.extend(fetched.into_iter().take(expected));
    WindowFit::Complete(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    const LARGE: ProofConfig = ProofConfig::new(4);
    const SMALL: ProofConfig = ProofConfig::new(2);

    #[test]
    fn window_contains_the_coin() {
        for (txo_id, count, rnd) in [(0, 1, 7), (5, 100, 3), (90, 100, 1), (99, 100, 15), (3, 5, 0)] {
            let w = select_spend_window(txo_id, count, &LARGE, &SMALL, 1000, rnd);
            assert!(w.window_end <= count);
            assert!(w.start() <= txo_id && txo_id < w.window_end);
            let position = (w.config.size() as TxoId - w.count() as TxoId) + (txo_id - w.start());
            assert_eq!(position, w.index as TxoId);
            assert!(!w.large_window_lost);
        }
    }

    #[test]
    fn backlog_moves_window_forward_or_shrinks_it() {
        // window ends at 16, pool at 40: moved to end at 20, coin still inside
        let w = select_spend_window(10, 40, &LARGE, &SMALL, 20, 10);
        assert_eq!(w.window_end, 20);
        assert_eq!(w.index, 10 + 16 - 20);
        assert!(!w.large_window_lost);

        // coin too old for the moved window
        let w = select_spend_window(1, 100, &LARGE, &SMALL, 20, 0);
        assert!(w.large_window_lost);
        assert_eq!(w.config, SMALL);
        assert!(w.start() <= 1 && 1 < w.window_end);
    }

    #[test]
    fn fetched_window_is_padded_or_rejected() {
        let w = select_spend_window(1, 3, &SMALL, &SMALL, 100, 0);
        assert_eq!(w.count(), 3);
        let points = vec![G, G, G];
        match fit_window(&w, 1, points) {
            WindowFit::Complete(list) => {
                assert_eq!(list.len(), 4);
                assert_eq!(list[0], identity());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(fit_window(&w, 1, vec![G, G]), WindowFit::Shrunk { shielded_outputs: 2 });
        assert_eq!(fit_window(&w, 1, vec![G]), WindowFit::Unavailable);
    }

    #[test]
    fn spend_proof_over_pool_window() {
        let k_ser_g = Scalar::new_random_with_params(&mut OsRng, ());
        let k_out = Scalar::new_random_with_params(&mut OsRng, ());
        let spend_sk = Scalar::new_random_with_params(&mut OsRng, ());
        let spend_pk = scalar_mul_base(&spend_sk).compress();
        let value = 1000;

        // element = C + SerialPub = (k_out G + v H) + (kSerG G + kJ J)
        let element = commit(value, &k_out, &H) + scalar_mul_gj(&k_ser_g, &to_serial(&spend_pk));
        let mut elements: Vec<RistrettoPoint> = (0..4).map(|_| RistrettoPoint::new_random_with_params(&mut OsRng, ())).collect();
        let window = SpendWindow { config: SMALL, window_end: 4, index: 2, large_window_lost: false };
        elements[2] = element;

        let witness = SpendWitness {
            index: 2,
            value,
            asset_id: NATIVE_ASSET,
            k_ser_g,
            output_blinding: k_out,
            spend_sk,
        };
        let (header, blinding) = ShieldedSpend::prepare(&mut OsRng, &window, &witness, &SMALL, ArithmeticMode::ConstantTime);
        let msg = header.hash();
        let spend = ShieldedSpend::create(&mut OsRng, header, &blinding, &witness, &elements, &msg,
            ArithmeticMode::ConstantTime).expect("spend");
        assert!(spend.verify(&elements, &msg, &SMALL, ArithmeticMode::VarTime));
        assert!(!spend.verify(&elements, &[0u8; 32], &SMALL, ArithmeticMode::VarTime));

        // C' balances against the offset contribution
        let c = spend.header.commitment.decompress().expect("point");
        assert_eq!(c, commit(value, &-blinding.offset_contribution(value), &H));

        let mut other = elements.clone();
        other[2] = RistrettoPoint::new_random_with_params(&mut OsRng, ());
        assert!(!spend.verify(&other, &msg, &SMALL, ArithmeticMode::VarTime));
    }
}
