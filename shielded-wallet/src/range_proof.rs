//! Bulletproof range proofs for Pedersen commitments C = b G + v V with an arbitrary value
//! generator V (H for the native asset, a blinded asset generator otherwise).
//!
//! The bulletproofs crate is built on curve25519-dalek-ng, so points and scalars cross over by
//! their canonical encodings.

use std::sync::LazyLock;

use bulletproofs::{BulletproofGens, PedersenGens, RangeProof};
use curve25519_dalek::{RistrettoPoint, Scalar};
use curve25519_dalek_ng as dalek_ng;
use merlin::Transcript;
use serde::{Deserialize, Serialize};

use crate::consts::RANGE_PROOF_BITS;
use crate::core_types::Amount;
use crate::domain_separators;
use crate::math_utils::*;

static BP_GENS: LazyLock<BulletproofGens> = LazyLock::new(|| BulletproofGens::new(RANGE_PROOF_BITS, 1));

/// Serialized bulletproof
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidentialProof(pub Vec<u8>);

fn to_ng_point(point: &RistrettoPoint) -> Option<dalek_ng::ristretto::RistrettoPoint> {
    dalek_ng::ristretto::CompressedRistretto(point.compress().to_bytes()).decompress()
}

fn to_ng_scalar(scalar: &Scalar) -> dalek_ng::scalar::Scalar {
    dalek_ng::scalar::Scalar::from_bytes_mod_order(scalar.to_bytes())
}

fn pedersen_gens(value_generator: &RistrettoPoint) -> Option<PedersenGens> {
    Some(PedersenGens {
        B: to_ng_point(value_generator)?,
        B_blinding: to_ng_point(&G)?,
    })
}

fn proof_transcript(context: &[u8; 32]) -> Transcript {
    let mut transcript = Transcript::new(domain_separators::RANGE_PROOF);
    transcript.append_message(b"context", context);
    transcript
}

impl ConfidentialProof {
    /// Proves 0 <= value < 2^64 for commit(value, blinding, value_generator)
    pub fn create(value: Amount, blinding: &Scalar, value_generator: &RistrettoPoint, context: &[u8; 32]) -> Option<Self> {
        let pc_gens = pedersen_gens(value_generator)?;
        let mut transcript = proof_transcript(context);
        let (proof, commitment) = RangeProof::prove_single(
            &BP_GENS,
            &pc_gens,
            &mut transcript,
            value,
            &to_ng_scalar(blinding),
            RANGE_PROOF_BITS,
        )
        .ok()?;

        // the proof must be about our commitment, not merely an equivalent one
        let expected = commit(value, blinding, value_generator).compress();
        if commitment.to_bytes() != expected.to_bytes() {
            return None;
        }
        Some(Self(proof.to_bytes()))
    }

    pub fn verify(&self, commitment: &RistrettoPoint, value_generator: &RistrettoPoint, context: &[u8; 32]) -> bool {
        let Some(pc_gens) = pedersen_gens(value_generator) else {
            return false;
        };
        let Ok(proof) = RangeProof::from_bytes(&self.0) else {
            return false;
        };
        let commitment = dalek_ng::ristretto::CompressedRistretto(commitment.compress().to_bytes());
        let mut transcript = proof_transcript(context);
        proof
            .verify_single(&BP_GENS, &pc_gens, &mut transcript, &commitment, RANGE_PROOF_BITS)
            .is_ok()
    }
}
