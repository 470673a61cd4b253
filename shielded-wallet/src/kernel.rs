use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use serde::{Deserialize, Serialize};

use crate::core_types::*;
use crate::domain_separators;
use crate::hash_functions::*;
use crate::math_utils::ArithmeticMode;
use crate::one_of_many::ProofConfig;
use crate::random::Random;
use crate::shielded::output::ShieldedTxo;
use crate::shielded::spend::{ShieldedSpend, SpendHeader};
use crate::signature::Signature;
use crate::transcript::*;
use crate::type_macros::*;

define_tiny_byte_type! {KernelId, "Kernel message hash; what the kernel signature signs", 32, Copy, Hash, PartialOrd, Ord}

/// Kernel is only valid together with the preimage of its lock image
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashLock {
    pub preimage: [u8; 32],
}

impl HashLock {
    pub fn image(&self) -> [u8; 32] {
        derive_bytes_32(&make_transcript!(domain_separators::HASH_LOCK_IMAGE, Bytes32 : &self.preimage), &[])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelBody {
    /// Excess commitment signed by (both) parties
    Standard {
        commitment: CompressedRistretto,
        signature: Signature,
        hash_lock: Option<HashLock>,
    },
    /// Single-party excess together with the shielded output it pays into
    ShieldedOutput {
        commitment: CompressedRistretto,
        signature: Signature,
        txo: ShieldedTxo,
    },
    /// Spend of a shielded coin; its re-commitment counts as a transaction input
    ShieldedInput { spend: ShieldedSpend },
}

fn kernel_transcript(fee: Amount, height: &HeightRange) -> TranscriptBuf {
    let mut transcript = TranscriptBuf::new(domain_separators::KERNEL_ID);
    transcript.append(&fee).append(&height.min).append(&height.max);
    transcript
}

/// Id of a shielded input kernel; known as soon as the spend header is, before proving
pub fn shielded_input_kernel_id(fee: Amount, height: &HeightRange, header: &SpendHeader) -> KernelId {
    let mut transcript = kernel_transcript(fee, height);
    transcript.append(&2u8).append(&header.hash());
    KernelId(derive_bytes_32(transcript.as_bytes(), &[]))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxKernel {
    pub fee: Amount,
    pub height: HeightRange,
    pub body: KernelBody,
}

impl TxKernel {
    /// Unsigned standard kernel
    pub fn standard(fee: Amount, height: HeightRange, hash_lock: Option<HashLock>) -> Self {
        Self {
            fee,
            height,
            body: KernelBody::Standard { commitment: CompressedRistretto::default(), signature: Signature::default(), hash_lock },
        }
    }

    /// Message hash; covers everything but the signature and the spend proof
    pub fn id(&self) -> KernelId {
        let mut transcript = kernel_transcript(self.fee, &self.height);
        match &self.body {
            KernelBody::Standard { commitment, hash_lock, .. } => {
                transcript.append(&0u8).append(commitment);
                match hash_lock {
                    Some(lock) => transcript.append(&true).append(&lock.image()),
                    None => transcript.append(&false),
                };
            }
            KernelBody::ShieldedOutput { commitment, txo, .. } => {
                transcript.append(&1u8).append(commitment).append(&txo.id());
            }
            KernelBody::ShieldedInput { spend } => return shielded_input_kernel_id(self.fee, &self.height, &spend.header),
        }
        KernelId(derive_bytes_32(transcript.as_bytes(), &[]))
    }

    /// Excess point signed by the kernel signature, if the kernel has one
    pub fn excess(&self) -> Option<CompressedRistretto> {
        match &self.body {
            KernelBody::Standard { commitment, .. } | KernelBody::ShieldedOutput { commitment, .. } => Some(*commitment),
            KernelBody::ShieldedInput { .. } => None,
        }
    }

    pub fn set_excess(&mut self, excess: &RistrettoPoint) {
        match &mut self.body {
            KernelBody::Standard { commitment, .. } | KernelBody::ShieldedOutput { commitment, .. } => {
                *commitment = excess.compress()
            }
            KernelBody::ShieldedInput { .. } => panic!("shielded input kernels carry no excess"),
        }
    }

    pub fn set_signature(&mut self, sig: Signature) {
        match &mut self.body {
            KernelBody::Standard { signature, .. } | KernelBody::ShieldedOutput { signature, .. } => *signature = sig,
            KernelBody::ShieldedInput { .. } => panic!("shielded input kernels are signed by their spend"),
        }
    }

    pub fn hash_lock(&self) -> Option<&HashLock> {
        match &self.body {
            KernelBody::Standard { hash_lock, .. } => hash_lock.as_ref(),
            _ => None,
        }
    }

    /// Self-contained checks. Spend proofs need the pool window and are checked by
    /// [`ShieldedSpend::verify`].
    pub fn is_valid(&self, asset_config: &ProofConfig, mode: ArithmeticMode) -> bool {
        if self.height.is_empty() {
            return false;
        }
        let msg = self.id();
        match &self.body {
            KernelBody::Standard { commitment, signature, .. } => {
                commitment.decompress().is_some_and(|excess| signature.is_valid(msg.as_bytes(), &excess))
            }
            KernelBody::ShieldedOutput { commitment, signature, txo } => {
                commitment.decompress().is_some_and(|excess| signature.is_valid(msg.as_bytes(), &excess))
                    && txo.is_valid(asset_config, mode)
            }
            KernelBody::ShieldedInput { spend } => {
                spend.header.spend_pk.decompress().is_some_and(|pk| spend.signature.is_valid(msg.as_bytes(), &pk))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math_utils::scalar_mul_base;
    use curve25519_dalek::Scalar;
    use rand_core::OsRng;

    #[test]
    fn signed_standard_kernel_is_valid() {
        let sk = Scalar::new_random_with_params(&mut OsRng, ());
        let mut kernel = TxKernel::standard(2, HeightRange::new(10, 120), None);
        kernel.set_excess(&scalar_mul_base(&sk));
        let sig = Signature::sign_random(&mut OsRng, kernel.id().as_bytes(), &sk);
        kernel.set_signature(sig);
        assert!(kernel.is_valid(&ProofConfig::new(2), ArithmeticMode::VarTime));

        kernel.fee = 3;
        assert!(!kernel.is_valid(&ProofConfig::new(2), ArithmeticMode::VarTime));
    }

    #[test]
    fn id_ignores_signature_but_covers_hash_lock() {
        let plain = TxKernel::standard(1, HeightRange::new(0, 5), None);
        let mut signed = plain.clone();
        signed.set_signature(Signature { nonce_pub: CompressedRistretto::default(), k: Scalar::ONE });
        assert_eq!(plain.id(), signed.id());

        let locked = TxKernel::standard(1, HeightRange::new(0, 5), Some(HashLock { preimage: [1u8; 32] }));
        assert_ne!(plain.id(), locked.id());
        let other = TxKernel::standard(1, HeightRange::new(0, 5), Some(HashLock { preimage: [2u8; 32] }));
        assert_ne!(locked.id(), other.id());
    }
}
