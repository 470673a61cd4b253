//! Kernel signing phases: the initiator's offer and final signature, the receiver's counter
//! signature and the single-party variants.

use curve25519_dalek::ristretto::CompressedRistretto;
use tracing::debug;

use crate::error::TxFailureReason;
use crate::kernel::{KernelBody, TxKernel};
use crate::key_keeper::{Method, NonceSlot, PaymentInfo, Response};
use crate::shielded::output::ShieldedOutputParams;
use crate::signature::{is_valid_partial, Signature};

use super::*;

impl TxBuilder {
    pub fn nonce_slot_step(&self) -> Step {
        match self.nonce_slot {
            Some(_) => Step::Done,
            None => Step::Request(Method::AllocateNonceSlot),
        }
    }

    /// Slot the key keeper still holds for us; the final signature consumes it
    pub fn held_nonce_slot(&self) -> Option<NonceSlot> {
        self.nonce_slot.filter(|_| self.partial_signature.is_none())
    }

    /// Offer: our public excess and nonce, no signature yet
    pub fn sender_initial_step(&self) -> Step {
        match (self.public_excess, self.nonce_slot) {
            (Some(_), _) => Step::Done,
            (None, Some(slot)) => Step::Request(Method::SignSender {
                inputs: self.inputs.clone(),
                outputs: self.outputs.clone(),
                kernel: self.kernel_parameters(),
                slot,
                initial: true,
            }),
            (None, None) => self.nonce_slot_step(),
        }
    }

    /// Whether the peer's counter signature has arrived in full
    pub fn has_peer_response(&self) -> bool {
        self.peer.excess.is_some() && self.peer.nonce.is_some() && self.peer.signature.is_some() && self.peer.offset.is_some()
    }

    /// Final signature of the initiator; `payment` is checked by the key keeper
    pub fn sender_final_step(&self, payment: Option<PaymentInfo>) -> Result<Step, TxFailureReason> {
        if self.partial_signature.is_some() {
            return Ok(Step::Done);
        }
        let slot = self.nonce_slot.ok_or(TxFailureReason::InvalidState)?;
        if !self.is_peer_signature_valid() {
            return Err(TxFailureReason::InvalidPeerSignature);
        }
        let mut kernel = self.kernel_parameters();
        kernel.payment = payment;
        Ok(Step::Request(Method::SignSender {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            kernel,
            slot,
            initial: false,
        }))
    }

    pub fn receiver_step(&self, payment: Option<PaymentInfo>) -> Step {
        if self.partial_signature.is_some() {
            return Step::Done;
        }
        let mut kernel = self.kernel_parameters();
        kernel.payment = payment;
        Step::Request(Method::SignReceiver { inputs: self.inputs.clone(), outputs: self.outputs.clone(), kernel })
    }

    pub fn split_step(&self) -> Step {
        if self.kernel.is_some() {
            return Step::Done;
        }
        Step::Request(Method::SignSplit {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            kernel: self.kernel_parameters(),
        })
    }

    pub fn send_shielded_step(&self, output: ShieldedOutputParams) -> Result<Step, TxFailureReason> {
        if self.kernel.is_some() {
            return Ok(Step::Done);
        }
        let voucher = self.voucher.clone().ok_or(TxFailureReason::NoVouchers)?;
        Ok(Step::Request(Method::SignSendShielded {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            kernel: self.kernel_parameters(),
            voucher,
            output,
        }))
    }

    /// Joint kernel over both excesses, unsigned, and the total nonce
    fn joint_kernel(&self) -> Option<(TxKernel, CompressedRistretto)> {
        let excess = self.public_excess?.decompress()?;
        let nonce = self.public_nonce?.decompress()?;
        self.kernel_parameters().joint_kernel(&excess, &nonce)
    }

    /// Id of the two-party kernel, known once both offers are
    pub fn joint_kernel_id(&self) -> Option<crate::kernel::KernelId> {
        self.joint_kernel().map(|(kernel, _)| kernel.id())
    }

    /// s_peer G == R_peer + e P_peer
    pub fn is_peer_signature_valid(&self) -> bool {
        let (Some((kernel, total_nonce)), Some(partial)) = (self.joint_kernel(), self.peer.signature) else {
            return false;
        };
        let (Some(peer_nonce), Some(peer_excess)) =
            (self.peer.nonce.and_then(|n| n.decompress()), self.peer.excess.and_then(|e| e.decompress()))
        else {
            return false;
        };
        is_valid_partial(kernel.id().as_bytes(), &total_nonce, &partial, &peer_nonce, &peer_excess)
    }

    /// Sum both partial signatures into the final kernel
    pub fn finalize_signature(&mut self) -> Result<(), TxFailureReason> {
        if self.kernel.is_some() {
            return Ok(());
        }
        let (mut kernel, total_nonce) = self.joint_kernel().ok_or(TxFailureReason::InvalidState)?;
        let (Some(own), Some(peer)) = (self.partial_signature, self.peer.signature) else {
            return Err(TxFailureReason::InvalidState);
        };
        if !self.is_peer_signature_valid() {
            return Err(TxFailureReason::InvalidPeerSignature);
        }
        kernel.set_signature(Signature { nonce_pub: total_nonce, k: own + peer });
        debug!(tx_id = %self.tx_id, kernel = %kernel.id(), "kernel signature finalized");
        self.kernel = Some(kernel);
        Ok(())
    }

    /// Merge a key keeper answer into the working state
    pub fn apply(&mut self, response: Response) -> Result<(), TxFailureReason> {
        match response {
            Response::Commitments(commitments) => self.input_commitments = Some(commitments),
            Response::Outputs(outputs) => self.created_outputs = Some(outputs),
            Response::NonceSlot(slot) => self.nonce_slot = Some(slot),
            Response::Released => {}
            Response::SenderInitial { excess, nonce } => {
                self.public_excess = Some(excess);
                self.public_nonce = Some(nonce);
            }
            Response::SenderFinal { partial, offset } => {
                self.partial_signature = Some(partial);
                self.offset = Some(offset);
            }
            Response::ReceiverSigned { excess, nonce, partial, offset, payment_proof } => {
                self.public_excess = Some(excess);
                self.public_nonce = Some(nonce);
                self.partial_signature = Some(partial);
                self.offset = Some(offset);
                self.payment_proof = payment_proof;
            }
            Response::Kernel { kernel, offset } => match kernel.body {
                KernelBody::ShieldedInput { .. } => {
                    self.shielded_kernels.push(kernel);
                    self.shielded_offset += offset;
                }
                _ => {
                    self.kernel = Some(kernel);
                    self.offset = Some(offset);
                }
            },
            Response::Identity(_) | Response::Viewer(_) | Response::Vouchers(_) => {
                return Err(TxFailureReason::InvalidState)
            }
        }
        Ok(())
    }
}
