//! Confidential assets.
//!
//! Every custom asset id a has its own value generator H_a. Outputs never expose H_a directly:
//! they commit against a blinded generator H* = H_a + r_a G and attach an [`AssetProof`], a
//! one-of-many proof that H* - H_i is a multiple of G for exactly one H_i in a public window of
//! asset generators.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::Scalar;
use serde::{Deserialize, Serialize};

use crate::consts::NATIVE_ASSET;
use crate::core_types::*;
use crate::domain_separators;
use crate::hash_functions::*;
use crate::math_utils::*;
use crate::one_of_many::*;
use crate::transcript::*;

/// H for the native asset, H_a = H_p(a) otherwise
pub fn asset_generator(asset_id: AssetId) -> RistrettoPoint {
    if asset_id == NATIVE_ASSET {
        return *H;
    }
    hash_to_point(&make_transcript!(domain_separators::ASSET_GENERATOR, u32 : &asset_id))
}

/// H* = H_a + r_a G
pub fn blinded_generator(asset_id: AssetId, asset_blinding: &Scalar) -> RistrettoPoint {
    asset_generator(asset_id) + scalar_mul_base(asset_blinding)
}

/// Effective blinding of b G + v H*, expressed over the unblinded generator: b + v r_a
pub fn modify_sk(sk: &Scalar, value: Amount, asset_blinding: &Scalar) -> Scalar {
    sk + Scalar::from(value) * asset_blinding
}

/// First asset id of the window holding `asset_id`
pub fn window_begin(asset_id: AssetId, config: &ProofConfig) -> AssetId {
    let n = config.size() as u64;
    ((asset_id as u64 / n) * n) as AssetId
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetProof {
    pub blinded_generator: CompressedRistretto,
    pub window_begin: AssetId,
    pub proof: OneOfManyProof,
}

fn shifted_window(blinded: &RistrettoPoint, begin: AssetId, config: &ProofConfig) -> Vec<RistrettoPoint> {
    (0..config.size() as u64)
        .map(|i| {
            let id = begin as u64 + i;
            // ids past the end of the id space never match
            match AssetId::try_from(id) {
                Ok(id) => blinded - asset_generator(id),
                Err(_) => identity(),
            }
        })
        .collect()
}

fn proof_context(blinded: &CompressedRistretto, begin: AssetId, context: &[u8; 32]) -> [u8; 32] {
    let transcript = make_transcript!(domain_separators::ASSET_PROOF,
        CompressedRistretto : blinded, u32 : &begin, Bytes32 : context);
    derive_bytes_32(&transcript, &[])
}

impl AssetProof {
    pub fn create<R: rand_core::CryptoRngCore + ?Sized>(
        rng: &mut R,
        asset_id: AssetId,
        asset_blinding: &Scalar,
        config: &ProofConfig,
        context: &[u8; 32],
        mode: ArithmeticMode,
    ) -> Self {
        let blinded = blinded_generator(asset_id, asset_blinding);
        let blinded_generator = blinded.compress();
        let begin = window_begin(asset_id, config);
        let list = shifted_window(&blinded, begin, config);
        let proof = OneOfManyProof::create(
            rng,
            config,
            &list,
            (asset_id - begin) as usize,
            asset_blinding,
            &proof_context(&blinded_generator, begin, context),
            mode,
        );
        Self { blinded_generator, window_begin: begin, proof }
    }

    /// The blinded generator, if the proof holds
    pub fn verify(&self, config: &ProofConfig, context: &[u8; 32], mode: ArithmeticMode) -> Option<RistrettoPoint> {
        if self.window_begin != window_begin(self.window_begin, config) {
            return None;
        }
        let blinded = self.blinded_generator.decompress()?;
        let list = shifted_window(&blinded, self.window_begin, config);
        let ctx = proof_context(&self.blinded_generator, self.window_begin, context);
        self.proof.verify(config, &list, &ctx, mode).then_some(blinded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::Random;
    use rand_core::OsRng;

    #[test]
    fn asset_proof_round_trip() {
        let config = ProofConfig::new(3);
        let r_a = Scalar::new_random_with_params(&mut OsRng, ());
        let context = [8u8; 32];
        let proof = AssetProof::create(&mut OsRng, 13, &r_a, &config, &context, ArithmeticMode::ConstantTime);
        assert_eq!(proof.window_begin, 8);
        assert_eq!(proof.verify(&config, &context, ArithmeticMode::VarTime), Some(blinded_generator(13, &r_a)));
        assert_eq!(proof.verify(&config, &[9u8; 32], ArithmeticMode::VarTime), None);

        let mut moved = proof.clone();
        moved.window_begin = 16;
        assert_eq!(moved.verify(&config, &context, ArithmeticMode::VarTime), None);
    }

    #[test]
    fn modified_key_opens_blinded_commitment() {
        let r_a = Scalar::new_random_with_params(&mut OsRng, ());
        let sk = Scalar::new_random_with_params(&mut OsRng, ());
        let c = commit(77, &sk, &blinded_generator(5, &r_a));
        assert_eq!(c, commit(77, &modify_sk(&sk, 77, &r_a), &asset_generator(5)));
    }

    #[test]
    fn generators_are_per_asset() {
        assert_eq!(asset_generator(NATIVE_ASSET), *H);
        assert_ne!(asset_generator(1), asset_generator(2));
        assert_eq!(window_begin(u32::MAX, &ProofConfig::new(3)), u32::MAX - 7);
    }
}
