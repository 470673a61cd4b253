//! Shielded outputs.
//!
//! All per-output secrets come from the ticket's shared secret: the blinding factor, the asset
//! blinding, and the masks that encrypt value, asset id and the two user messages. Each message
//! m is stored as (m mod l) + mask with the quotient floor(m / l) kept in a masked flags nibble.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::Scalar;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::asset::*;
use crate::consts::*;
use crate::core_types::*;
use crate::domain_separators;
use crate::hash_functions::*;
use crate::math_utils::*;
use crate::one_of_many::ProofConfig;
use crate::range_proof::ConfidentialProof;
use crate::shielded::ticket::*;
use crate::transcript::*;

/// Two 256-bit messages carried by every shielded output
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub sender: [u8; 32],
    pub message: [u8; 32],
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedOutputParams {
    pub value: Amount,
    pub asset_id: AssetId,
    pub user: UserData,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedTxo {
    pub ticket: Ticket,
    pub commitment: CompressedRistretto,
    pub range_proof: ConfidentialProof,
    pub asset_proof: Option<AssetProof>,
    pub encrypted_value: [u8; ENCRYPTED_VALUE_BYTES],
    pub encrypted_asset: [u8; ENCRYPTED_ASSET_BYTES],
    pub encrypted_messages: [Scalar; USER_MESSAGES],
    pub encrypted_flags: u8,
    pub proof_tag: [u8; PROOF_TAG_BYTES],
}

/// Secrets of an output, as derived from the shared secret
struct OutputKeys {
    blinding: Scalar,
    asset_blinding: Scalar,
    value_mask: [u8; ENCRYPTED_VALUE_BYTES],
    asset_mask: [u8; ENCRYPTED_ASSET_BYTES],
    message_masks: [Scalar; USER_MESSAGES],
    flags_mask: u8,
}

impl OutputKeys {
    fn derive(shared_secret: &SharedSecret) -> Self {
        let ss = shared_secret.as_bytes();
        let message_mask = |i: u8| {
            derive_scalar(&make_transcript!(domain_separators::ENCRYPTION_MASK_MESSAGE, u8 : &i), ss)
        };
        Self {
            blinding: derive_scalar(&make_transcript!(domain_separators::OUTPUT_BLINDING,), ss),
            asset_blinding: derive_scalar(&make_transcript!(domain_separators::SHIELDED_ASSET_BLINDING,), ss),
            value_mask: derive_bytes(&make_transcript!(domain_separators::ENCRYPTION_MASK_VALUE,), ss),
            asset_mask: derive_bytes(&make_transcript!(domain_separators::ENCRYPTION_MASK_ASSET,), ss),
            message_masks: [message_mask(0), message_mask(1)],
            flags_mask: derive_bytes::<1>(&make_transcript!(domain_separators::ENCRYPTION_MASK_FLAGS,), ss)[0],
        }
    }

    fn asset_blinding_for(&self, asset_id: AssetId) -> Scalar {
        if asset_id == NATIVE_ASSET {
            Scalar::ZERO
        } else {
            self.asset_blinding
        }
    }
}

fn proof_tag(shared_secret: &SharedSecret, commitment: &CompressedRistretto) -> [u8; PROOF_TAG_BYTES] {
    derive_bytes(&make_transcript!(domain_separators::PROOF_TAG,
        SharedSecret : shared_secret, CompressedRistretto : commitment), &[])
}

fn xor<const N: usize>(a: &[u8; N], b: &[u8; N]) -> [u8; N] {
    core::array::from_fn(|i| a[i] ^ b[i])
}

/// The output blinding, effective over the unblinded asset generator
pub fn output_blinding(shared_secret: &SharedSecret, value: Amount, asset_id: AssetId) -> Scalar {
    let keys = OutputKeys::derive(shared_secret);
    modify_sk(&keys.blinding, value, &keys.asset_blinding_for(asset_id))
}

impl ShieldedTxo {
    /// Build an output for a ticket. Returns the output and its effective blinding factor
    /// b + v r_a, which is what the kernel signer must account for.
    pub fn generate<R: rand_core::CryptoRngCore + ?Sized>(
        rng: &mut R,
        ticket: &Ticket,
        shared_secret: &SharedSecret,
        params: &ShieldedOutputParams,
        asset_config: &ProofConfig,
        mode: ArithmeticMode,
    ) -> Option<(Self, Scalar)> {
        let keys = OutputKeys::derive(shared_secret);
        let ticket_id = ticket.id();

        let asset_blinding = keys.asset_blinding_for(params.asset_id);
        let (value_generator, asset_proof) = if params.asset_id == NATIVE_ASSET {
            (*H, None)
        } else {
            let proof = AssetProof::create(rng, params.asset_id, &asset_blinding, asset_config, ticket_id.as_bytes(), mode);
            (blinded_generator(params.asset_id, &asset_blinding), Some(proof))
        };

        let commitment = commit(params.value, &keys.blinding, &value_generator).compress();
        let range_proof = ConfidentialProof::create(params.value, &keys.blinding, &value_generator, ticket_id.as_bytes())?;

        let mut encrypted_messages = [Scalar::ZERO; USER_MESSAGES];
        let mut flags = 0u8;
        for (i, msg) in [&params.user.sender, &params.user.message].into_iter().enumerate() {
            let (reduced, quotient) = reduce_with_quotient(msg);
            encrypted_messages[i] = reduced + keys.message_masks[i];
            flags |= quotient << (4 * i);
        }

        let txo = Self {
            ticket: ticket.clone(),
            commitment,
            range_proof,
            asset_proof,
            encrypted_value: xor(&params.value.to_le_bytes(), &keys.value_mask),
            encrypted_asset: xor(&params.asset_id.to_le_bytes(), &keys.asset_mask),
            encrypted_messages,
            encrypted_flags: flags ^ keys.flags_mask,
            proof_tag: proof_tag(shared_secret, &commitment),
        };
        Some((txo, modify_sk(&keys.blinding, params.value, &asset_blinding)))
    }

    /// Decrypt with a shared secret; None unless every derived value matches
    pub fn recover(&self, shared_secret: &SharedSecret) -> Option<ShieldedOutputParams> {
        if !bool::from(proof_tag(shared_secret, &self.commitment)[..].ct_eq(&self.proof_tag[..])) {
            return None;
        }
        let keys = OutputKeys::derive(shared_secret);
        let value = Amount::from_le_bytes(xor(&self.encrypted_value, &keys.value_mask));
        let asset_id = AssetId::from_le_bytes(xor(&self.encrypted_asset, &keys.asset_mask));

        let value_generator = match (&self.asset_proof, asset_id == NATIVE_ASSET) {
            (None, true) => *H,
            (Some(proof), false) => {
                let expected = blinded_generator(asset_id, &keys.asset_blinding);
                if proof.blinded_generator != expected.compress() {
                    return None;
                }
                expected
            }
            _ => return None,
        };
        if commit(value, &keys.blinding, &value_generator).compress() != self.commitment {
            return None;
        }

        let flags = self.encrypted_flags ^ keys.flags_mask;
        let mut messages = [[0u8; 32]; USER_MESSAGES];
        for (i, msg) in messages.iter_mut().enumerate() {
            let reduced = self.encrypted_messages[i] - keys.message_masks[i];
            *msg = add_group_order_multiple(&reduced.to_bytes(), (flags >> (4 * i)) & 0x0f)?;
        }
        let [sender, message] = messages;

        Some(ShieldedOutputParams { value, asset_id, user: UserData { sender, message } })
    }

    /// Ticket signature, asset proof and range proof
    pub fn is_valid(&self, asset_config: &ProofConfig, mode: ArithmeticMode) -> bool {
        if !self.ticket.is_valid() {
            return false;
        }
        let Some(commitment) = self.commitment.decompress() else {
            return false;
        };
        let context = self.ticket.id();
        let value_generator = match &self.asset_proof {
            None => *H,
            Some(proof) => match proof.verify(asset_config, context.as_bytes(), mode) {
                Some(generator) => generator,
                None => return false,
            },
        };
        self.range_proof.verify(&commitment, &value_generator, context.as_bytes())
    }

    /// C + SerialPub, the element this output contributes to the shielded pool
    pub fn pool_element(&self) -> Option<RistrettoPoint> {
        Some(self.commitment.decompress()? + self.ticket.serial_pub.decompress()?)
    }

    pub fn id(&self) -> [u8; 32] {
        let mut transcript = TranscriptBuf::new(domain_separators::SHIELDED_TXO_ID);
        transcript
            .append(&self.ticket.serial_pub)
            .append(&self.ticket.signature.nonce_pub)
            .append(&self.commitment)
            .append_bytes(&self.range_proof.0)
            .append(&self.encrypted_value)
            .append(&self.encrypted_asset)
            .append(&self.encrypted_messages[0])
            .append(&self.encrypted_messages[1])
            .append(&self.encrypted_flags)
            .append(&self.proof_tag);
        if let Some(proof) = &self.asset_proof {
            transcript.append(&proof.blinded_generator).append(&proof.window_begin);
        }
        derive_bytes_32(transcript.as_bytes(), &[])
    }
}
