use std::cmp::Ordering;

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::traits::Identity;
use curve25519_dalek::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::*;
use crate::consts::NATIVE_ASSET;
use crate::core_types::*;
use crate::kernel::*;
use crate::math_utils::*;
use crate::one_of_many::ProofConfig;
use crate::range_proof::ConfidentialProof;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub commitment: CompressedRistretto,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub commitment: CompressedRistretto,
    pub range_proof: ConfidentialProof,
    pub asset_proof: Option<AssetProof>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub kernels: Vec<TxKernel>,
    pub offset: Scalar,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("output {0} has an invalid proof")]
    OutputProof(usize),
    #[error("kernel {0} is invalid")]
    Kernel(usize),
    #[error("kernel {0} is not valid at height {1}")]
    KernelHeight(usize, Height),
    #[error("malformed point")]
    BadPoint,
    #[error("transaction does not balance")]
    Balance,
}

impl Output {
    /// Standard output for value v of an asset; asset outputs commit against H_a + r_a G
    pub fn create<R: rand_core::CryptoRngCore + ?Sized>(
        rng: &mut R,
        value: Amount,
        blinding: &Scalar,
        asset_id: AssetId,
        asset_blinding: &Scalar,
        asset_config: &ProofConfig,
        mode: ArithmeticMode,
    ) -> Option<Self> {
        let value_generator = if asset_id == NATIVE_ASSET { *H } else { blinded_generator(asset_id, asset_blinding) };
        let commitment = commit(value, blinding, &value_generator).compress();
        let range_proof = ConfidentialProof::create(value, blinding, &value_generator, commitment.as_bytes())?;
        let asset_proof = (asset_id != NATIVE_ASSET)
            .then(|| AssetProof::create(rng, asset_id, asset_blinding, asset_config, commitment.as_bytes(), mode));
        Some(Self { commitment, range_proof, asset_proof })
    }

    pub fn is_valid(&self, asset_config: &ProofConfig, mode: ArithmeticMode) -> bool {
        let Some(commitment) = self.commitment.decompress() else {
            return false;
        };
        let value_generator = match &self.asset_proof {
            None => *H,
            Some(proof) => match proof.verify(asset_config, self.commitment.as_bytes(), mode) {
                Some(generator) => generator,
                None => return false,
            },
        };
        self.range_proof.verify(&commitment, &value_generator, self.commitment.as_bytes())
    }
}

impl Transaction {
    pub fn total_fee(&self) -> Amount {
        self.kernels.iter().map(|k| k.fee).sum()
    }

    /// Canonical order; an input and an output with the same commitment cancel out
    pub fn normalize(&mut self) {
        self.inputs.sort_by(|a, b| a.commitment.as_bytes().cmp(b.commitment.as_bytes()));
        self.outputs.sort_by(|a, b| a.commitment.as_bytes().cmp(b.commitment.as_bytes()));

        let mut inputs = Vec::with_capacity(self.inputs.len());
        let mut outputs = Vec::with_capacity(self.outputs.len());
        let mut ins = std::mem::take(&mut self.inputs).into_iter().peekable();
        let mut outs = std::mem::take(&mut self.outputs).into_iter().peekable();
        loop {
            let step = match (ins.peek(), outs.peek()) {
                (Some(i), Some(o)) => i.commitment.as_bytes().cmp(o.commitment.as_bytes()),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => break,
            };
            match step {
                Ordering::Less => inputs.extend(ins.next()),
                Ordering::Greater => outputs.extend(outs.next()),
                Ordering::Equal => {
                    ins.next();
                    outs.next();
                }
            }
        }
        self.inputs = inputs;
        self.outputs = outputs;
        self.kernels.sort_by_key(|k| k.id());
    }

    /// sum(outputs) - sum(inputs) + fee H - sum(excess) - offset G
    fn balance_residue(&self) -> Option<RistrettoPoint> {
        let mut sum = RistrettoPoint::identity();
        for output in self.outputs.iter() {
            sum += output.commitment.decompress()?;
        }
        for input in self.inputs.iter() {
            sum -= input.commitment.decompress()?;
        }
        for kernel in self.kernels.iter() {
            if let Some(excess) = kernel.excess() {
                sum -= excess.decompress()?;
            }
            match &kernel.body {
                KernelBody::ShieldedOutput { txo, .. } => sum += txo.commitment.decompress()?,
                KernelBody::ShieldedInput { spend } => sum -= spend.header.commitment.decompress()?,
                KernelBody::Standard { .. } => {}
            }
        }
        sum += Scalar::from(self.total_fee()) * *H;
        sum -= scalar_mul_base(&self.offset);
        Some(sum)
    }

    pub fn is_balanced(&self) -> bool {
        self.balance_residue() == Some(RistrettoPoint::identity())
    }

    /// Everything a node would check except spend proofs, which need the shielded pool
    pub fn validate(&self, height: Height, asset_config: &ProofConfig, mode: ArithmeticMode) -> Result<(), ValidationError> {
        for (i, output) in self.outputs.iter().enumerate() {
            if !output.is_valid(asset_config, mode) {
                return Err(ValidationError::OutputProof(i));
            }
        }
        for (i, kernel) in self.kernels.iter().enumerate() {
            if !kernel.height.contains(height) {
                return Err(ValidationError::KernelHeight(i, height));
            }
            if !kernel.is_valid(asset_config, mode) {
                return Err(ValidationError::Kernel(i));
            }
        }
        match self.balance_residue() {
            None => Err(ValidationError::BadPoint),
            Some(residue) if residue == RistrettoPoint::identity() => Ok(()),
            Some(_) => Err(ValidationError::Balance),
        }
    }
}
