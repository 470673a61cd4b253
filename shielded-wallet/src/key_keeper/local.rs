use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::Scalar;
use rand_core::OsRng;
use tracing::{debug, warn};

use crate::asset::*;
use crate::config::WalletConfig;
use crate::consts::NONCE_SLOTS;
use crate::core_types::*;
use crate::domain_separators;
use crate::hash_functions::*;
use crate::kdf::*;
use crate::kernel::*;
use crate::math_utils::*;
use crate::one_of_many::ProofConfig;
use crate::random::Random;
use crate::shielded::output::*;
use crate::shielded::spend::*;
use crate::shielded::ticket::*;
use crate::shielded::viewer::Viewer;
use crate::shielded::ShieldedCoin;
use crate::signature::*;
use crate::transaction::Output;
use crate::transcript::*;

use super::*;

/// Identity used to sign vouchers and payment confirmations
const IDENTITY_INDEX: u64 = 0;

/// Software key keeper holding the master key in memory
#[derive(Clone, Debug)]
pub struct LocalKeyKeeper {
    master: Kdf,
    /// id of the slot's current holder
    slots: Vec<Option<[u8; 32]>>,
    asset_window: ProofConfig,
    mode: ArithmeticMode,
}

impl LocalKeyKeeper {
    pub fn new(seed: &[u8; 32], config: &WalletConfig) -> Self {
        Self {
            master: Kdf::from_seed(seed),
            slots: vec![None; NONCE_SLOTS as usize],
            asset_window: config.shielded.asset_window,
            mode: config.arithmetic_mode,
        }
    }

    fn asset_blinding(&self, coin: &CoinId) -> Scalar {
        if coin.is_native() {
            return Scalar::ZERO;
        }
        let hv = derive_bytes_32(&make_transcript!(domain_separators::OUTPUT_ASSET_BLINDING,
            Bytes32 : &coin.hash_value()), &[]);
        self.master.derive_key(&hv)
    }

    /// Blinding of the coin's commitment over its unblinded asset generator
    fn coin_sk(&self, coin: &CoinId) -> Scalar {
        modify_sk(&self.master.derive_coin_key(coin), coin.value, &self.asset_blinding(coin))
    }

    /// sum(outputs) - sum(inputs)
    fn blinding_excess(&self, inputs: &[CoinId], outputs: &[CoinId]) -> Scalar {
        let outs: Scalar = outputs.iter().map(|c| self.coin_sk(c)).sum();
        let ins: Scalar = inputs.iter().map(|c| self.coin_sk(c)).sum();
        outs - ins
    }

    fn check_slot(&self, slot: &NonceSlot) -> Result<()> {
        match self.slots.get(slot.index as usize) {
            Some(Some(id)) if *id == slot.id => Ok(()),
            _ => Err(KeyKeeperError::InvalidParameters("nonce slot not allocated")),
        }
    }

    /// (nonce, offset) pinned to a slot until the slot is consumed
    fn slot_secrets(&self, slot: &NonceSlot) -> Result<(Scalar, Scalar)> {
        self.check_slot(slot)?;
        let nonce = self.master.derive_key(&derive_bytes_32(&make_transcript!(domain_separators::SLOT_NONCE,
            u32 : &slot.index, Bytes32 : &slot.id), &[]));
        let offset = self.master.derive_key(&derive_bytes_32(&make_transcript!(domain_separators::SLOT_OFFSET,
            u32 : &slot.index, Bytes32 : &slot.id), &[]));
        Ok((nonce, offset))
    }

    fn allocate_slot(&mut self) -> Result<NonceSlot> {
        let index = self.slots.iter().position(Option::is_none).ok_or(KeyKeeperError::NonceSlotBusy)?;
        let id = <[u8; 32]>::new_random_with_params(&mut OsRng, ());
        self.slots[index] = Some(id);
        Ok(NonceSlot { index: index as u32, id })
    }

    fn restore_slot(&mut self, slot: NonceSlot) -> Result<NonceSlot> {
        match self.slots.get_mut(slot.index as usize) {
            Some(held @ None) => {
                *held = Some(slot.id);
                Ok(slot)
            }
            Some(Some(id)) if *id == slot.id => Ok(slot),
            Some(Some(_)) => Err(KeyKeeperError::NonceSlotBusy),
            None => Err(KeyKeeperError::InvalidParameters("nonce slot out of range")),
        }
    }

    /// Free a slot; a slot already consumed or held by someone else is left alone
    fn release_slot(&mut self, slot: &NonceSlot) {
        if self.check_slot(slot).is_ok() {
            self.slots[slot.index as usize] = None;
        }
    }

    fn identity(&self) -> (Scalar, PeerId) {
        identity_key(&self.master, IDENTITY_INDEX)
    }

    fn sign_sender(
        &mut self,
        inputs: &[CoinId],
        outputs: &[CoinId],
        kernel: &KernelParameters,
        slot: &NonceSlot,
        initial: bool,
    ) -> Result<Response> {
        let (nonce, offset) = self.slot_secrets(slot)?;
        let sk = self.blinding_excess(inputs, outputs) - offset;
        let excess = scalar_mul_base(&sk);
        let nonce_pub = scalar_mul_base(&nonce);

        if initial {
            return Ok(Response::SenderInitial { excess: excess.compress(), nonce: nonce_pub.compress() });
        }

        let (joint, total_nonce) = kernel
            .joint_kernel(&excess, &nonce_pub)
            .ok_or(KeyKeeperError::InvalidParameters("peer excess and nonce required"))?;
        let kernel_id = joint.id();

        if let Some(payment) = &kernel.payment {
            if !payment.is_valid(&kernel_id) {
                warn!(kernel = %kernel_id, "payment confirmation does not verify");
                return Err(KeyKeeperError::InvalidPaymentProof);
            }
        }

        let partial = sign_partial(kernel_id.as_bytes(), &total_nonce, &sk, &nonce);
        self.release_slot(slot);
        Ok(Response::SenderFinal { partial, offset })
    }

    fn sign_receiver(&mut self, inputs: &[CoinId], outputs: &[CoinId], kernel: &KernelParameters) -> Result<Response> {
        let nonce = Scalar::new_random_with_params(&mut OsRng, ());
        let offset = Scalar::new_random_with_params(&mut OsRng, ());
        let sk = self.blinding_excess(inputs, outputs) - offset;
        let excess = scalar_mul_base(&sk);
        let nonce_pub = scalar_mul_base(&nonce);

        let (joint, total_nonce) = kernel
            .joint_kernel(&excess, &nonce_pub)
            .ok_or(KeyKeeperError::InvalidParameters("peer excess and nonce required"))?;
        let kernel_id = joint.id();

        let payment_proof = match &kernel.payment {
            Some(payment) => {
                let (identity_sk, identity) = self.identity();
                if identity != payment.receiver {
                    return Err(KeyKeeperError::InvalidParameters("payment addressed to another identity"));
                }
                Some(Signature::sign_random(&mut OsRng, &payment.message(&kernel_id), &identity_sk))
            }
            None => None,
        };

        Ok(Response::ReceiverSigned {
            excess: excess.compress(),
            nonce: nonce_pub.compress(),
            partial: sign_partial(kernel_id.as_bytes(), &total_nonce, &sk, &nonce),
            offset,
            payment_proof,
        })
    }

    fn sign_split(&mut self, inputs: &[CoinId], outputs: &[CoinId], kernel: &KernelParameters) -> Result<Response> {
        let offset = Scalar::new_random_with_params(&mut OsRng, ());
        let sk = self.blinding_excess(inputs, outputs) - offset;

        let mut signed = TxKernel::standard(kernel.fee, kernel.height, kernel.hash_lock.clone());
        signed.set_excess(&scalar_mul_base(&sk));
        let signature = Signature::sign_random(&mut OsRng, signed.id().as_bytes(), &sk);
        signed.set_signature(signature);
        Ok(Response::Kernel { kernel: signed, offset })
    }

    fn create_vouchers(&mut self, key_index: u64, nonce: &[u8; 32], count: u32) -> Result<Response> {
        let viewer = Viewer::from_master(&self.master, key_index);
        let (identity_sk, _) = self.identity();
        let vouchers = (0..count)
            .map(|i| {
                let ticket_nonce = derive_bytes_32(&make_transcript!(domain_separators::VOUCHER,
                    Bytes32 : nonce, u32 : &i), &[]);
                Voucher::create(&mut OsRng, &viewer, &ticket_nonce, &identity_sk)
            })
            .collect();
        Ok(Response::Vouchers(vouchers))
    }

    fn sign_send_shielded(
        &mut self,
        inputs: &[CoinId],
        outputs: &[CoinId],
        kernel: &KernelParameters,
        voucher: &Voucher,
        output: &ShieldedOutputParams,
    ) -> Result<Response> {
        let (txo, txo_sk) = ShieldedTxo::generate(
            &mut OsRng,
            &voucher.ticket,
            &voucher.shared_secret,
            output,
            &self.asset_window,
            self.mode,
        )
        .ok_or(KeyKeeperError::Unspecified)?;

        let offset = Scalar::new_random_with_params(&mut OsRng, ());
        let sk = self.blinding_excess(inputs, outputs) + txo_sk - offset;

        let mut signed = TxKernel {
            fee: kernel.fee,
            height: kernel.height,
            body: KernelBody::ShieldedOutput {
                commitment: scalar_mul_base(&sk).compress(),
                signature: Signature::default(),
                txo,
            },
        };
        let signature = Signature::sign_random(&mut OsRng, signed.id().as_bytes(), &sk);
        signed.set_signature(signature);
        Ok(Response::Kernel { kernel: signed, offset })
    }

    fn spend_shielded(
        &mut self,
        coin: &ShieldedCoin,
        window: &SpendWindow,
        elements: &[RistrettoPoint],
        fee: Amount,
        height: HeightRange,
    ) -> Result<Response> {
        let viewer = Viewer::from_master(&self.master, coin.key.key_index);
        let params = TicketParams::restore(&coin.key.k_g, coin.key.created_by_viewer, &viewer);
        let spend_sk = params.spend_sk(&viewer).ok_or(KeyKeeperError::Unspecified)?;

        let witness = SpendWitness {
            index: window.index as usize,
            value: coin.value,
            asset_id: coin.asset_id,
            k_ser_g: params.k_g,
            output_blinding: output_blinding(&params.shared_secret, coin.value, coin.asset_id),
            spend_sk,
        };
        let (header, blinding) = ShieldedSpend::prepare(&mut OsRng, window, &witness, &self.asset_window, self.mode);
        let kernel_id = shielded_input_kernel_id(fee, &height, &header);
        let spend = ShieldedSpend::create(&mut OsRng, header, &blinding, &witness, elements, kernel_id.as_bytes(), self.mode)
            .ok_or(KeyKeeperError::Unspecified)?;
        debug!(kernel = %kernel_id, window_end = window.window_end, "shielded spend proof created");

        Ok(Response::Kernel {
            kernel: TxKernel { fee, height, body: KernelBody::ShieldedInput { spend } },
            offset: blinding.offset_contribution(coin.value),
        })
    }
}

impl KeyKeeper for LocalKeyKeeper {
    fn handle(&mut self, method: Method) -> Result<Response> {
        match method {
            Method::GetIdentity { index } => Ok(Response::Identity(identity_key(&self.master, index).1)),
            Method::GetViewer { key_index } => Ok(Response::Viewer(Viewer::from_master(&self.master, key_index).watch_only())),
            Method::RecoverCommitments { coins } => Ok(Response::Commitments(
                coins
                    .iter()
                    .map(|c| commit(c.value, &self.coin_sk(c), &asset_generator(c.asset_id)).compress())
                    .collect(),
            )),
            Method::CreateOutputs { coins } => {
                let outputs = coins
                    .iter()
                    .map(|c| {
                        Output::create(
                            &mut OsRng,
                            c.value,
                            &self.master.derive_coin_key(c),
                            c.asset_id,
                            &self.asset_blinding(c),
                            &self.asset_window,
                            self.mode,
                        )
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or(KeyKeeperError::Unspecified)?;
                Ok(Response::Outputs(outputs))
            }
            Method::AllocateNonceSlot => Ok(Response::NonceSlot(self.allocate_slot()?)),
            Method::RestoreNonceSlot { slot } => Ok(Response::NonceSlot(self.restore_slot(slot)?)),
            Method::ReleaseNonceSlot { slot } => {
                self.release_slot(&slot);
                Ok(Response::Released)
            }
            Method::SignSender { inputs, outputs, kernel, slot, initial } => {
                self.sign_sender(&inputs, &outputs, &kernel, &slot, initial)
            }
            Method::SignReceiver { inputs, outputs, kernel } => self.sign_receiver(&inputs, &outputs, &kernel),
            Method::SignSplit { inputs, outputs, kernel } => self.sign_split(&inputs, &outputs, &kernel),
            Method::CreateVouchers { key_index, nonce, count } => self.create_vouchers(key_index, &nonce, count),
            Method::SignSendShielded { inputs, outputs, kernel, voucher, output } => {
                self.sign_send_shielded(&inputs, &outputs, &kernel, &voucher, &output)
            }
            Method::SpendShielded { coin, window, elements, fee, height } => {
                self.spend_shielded(&coin, &window, &elements, fee, height)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Input, Transaction};

    fn keeper(seed: u8) -> LocalKeyKeeper {
        LocalKeyKeeper::new(&[seed; 32], &WalletConfig::default())
    }

    fn coin(index: u64, value: Amount) -> CoinId {
        CoinId::new(index, value, 0, KeyType::Regular)
    }

    #[test]
    fn two_party_signing_produces_a_balanced_transaction() {
        let mut sender = keeper(1);
        let mut receiver = keeper(2);
        let (s_in, s_change, r_out) = (vec![coin(1, 100)], vec![coin(2, 68)], vec![coin(1, 30)]);

        let Ok(Response::NonceSlot(slot)) = sender.handle(Method::AllocateNonceSlot) else { panic!("slot") };
        let mut params = KernelParameters::new(2, HeightRange::new(5, 10));
        let Ok(Response::SenderInitial { excess, nonce }) = sender.handle(Method::SignSender {
            inputs: s_in.clone(), outputs: s_change.clone(), kernel: params.clone(), slot, initial: true,
        }) else { panic!("initial") };

        let mut receiver_params = params.clone();
        receiver_params.peer_excess = Some(excess);
        receiver_params.peer_nonce = Some(nonce);
        let Ok(Response::ReceiverSigned { excess: r_excess, nonce: r_nonce, partial: r_partial, offset: r_offset, .. }) =
            receiver.handle(Method::SignReceiver { inputs: vec![], outputs: r_out.clone(), kernel: receiver_params })
        else { panic!("receiver") };

        params.peer_excess = Some(r_excess);
        params.peer_nonce = Some(r_nonce);
        let Ok(Response::SenderFinal { partial, offset }) = sender.handle(Method::SignSender {
            inputs: s_in.clone(), outputs: s_change.clone(), kernel: params.clone(), slot, initial: false,
        }) else { panic!("final") };

        let (mut kernel, total_nonce) = params
            .joint_kernel(&excess.decompress().expect("point"), &nonce.decompress().expect("point"))
            .expect("joint");
        kernel.set_signature(Signature { nonce_pub: total_nonce, k: partial + r_partial });

        let Ok(Response::Commitments(inputs)) = sender.handle(Method::RecoverCommitments { coins: s_in }) else { panic!() };
        let Ok(Response::Outputs(mut outputs)) = sender.handle(Method::CreateOutputs { coins: s_change }) else { panic!() };
        let Ok(Response::Outputs(r_outputs)) = receiver.handle(Method::CreateOutputs { coins: r_out }) else { panic!() };
        outputs.extend(r_outputs);

        let mut tx = Transaction {
            inputs: inputs.into_iter().map(|commitment| Input { commitment }).collect(),
            outputs,
            kernels: vec![kernel],
            offset: offset + r_offset,
        };
        tx.normalize();
        assert_eq!(tx.validate(6, &ProofConfig::new(3), ArithmeticMode::VarTime), Ok(()));
    }

    #[test]
    fn nonce_slot_is_consumed_by_final_signature() {
        let mut k = keeper(3);
        let Ok(Response::NonceSlot(slot)) = k.handle(Method::AllocateNonceSlot) else { panic!() };
        let params = KernelParameters::new(1, HeightRange::new(0, 10));
        let first = k.handle(Method::SignSender {
            inputs: vec![coin(1, 5)], outputs: vec![], kernel: params.clone(), slot, initial: true,
        });
        let again = k.handle(Method::SignSender {
            inputs: vec![coin(1, 5)], outputs: vec![], kernel: params.clone(), slot, initial: true,
        });
        match (first, again) {
            (Ok(Response::SenderInitial { nonce: a, .. }), Ok(Response::SenderInitial { nonce: b, .. })) => assert_eq!(a, b),
            other => panic!("unexpected {other:?}"),
        }

        for _ in 1..NONCE_SLOTS {
            assert!(matches!(k.handle(Method::AllocateNonceSlot), Ok(Response::NonceSlot(_))));
        }
        assert_eq!(k.handle(Method::AllocateNonceSlot).err(), Some(KeyKeeperError::NonceSlotBusy));
    }

    #[test]
    fn restored_slot_signs_with_the_same_nonce() {
        let params = KernelParameters::new(1, HeightRange::new(0, 10));
        let offer = |k: &mut LocalKeyKeeper, slot: NonceSlot| match k.handle(Method::SignSender {
            inputs: vec![coin(1, 5)], outputs: vec![], kernel: params.clone(), slot, initial: true,
        }) {
            Ok(Response::SenderInitial { excess, nonce }) => (excess, nonce),
            other => panic!("unexpected {other:?}"),
        };

        let mut before = keeper(6);
        let Ok(Response::NonceSlot(slot)) = before.handle(Method::AllocateNonceSlot) else { panic!() };
        let first = offer(&mut before, slot);

        let mut after = keeper(6);
        assert_eq!(
            after.handle(Method::SignSender {
                inputs: vec![coin(1, 5)], outputs: vec![], kernel: params.clone(), slot, initial: true,
            }).err(),
            Some(KeyKeeperError::InvalidParameters("nonce slot not allocated"))
        );
        assert!(matches!(after.handle(Method::RestoreNonceSlot { slot }), Ok(Response::NonceSlot(s)) if s == slot));
        assert_eq!(offer(&mut after, slot), first);

        let stranger = NonceSlot { index: slot.index, id: [9u8; 32] };
        assert_eq!(after.handle(Method::RestoreNonceSlot { slot: stranger }).err(), Some(KeyKeeperError::NonceSlotBusy));
    }

    #[test]
    fn released_slots_can_be_allocated_again() {
        let mut k = keeper(7);
        let slots: Vec<NonceSlot> = (0..NONCE_SLOTS)
            .map(|_| match k.handle(Method::AllocateNonceSlot) {
                Ok(Response::NonceSlot(slot)) => slot,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(k.handle(Method::AllocateNonceSlot).err(), Some(KeyKeeperError::NonceSlotBusy));

        assert!(matches!(k.handle(Method::ReleaseNonceSlot { slot: slots[3] }), Ok(Response::Released)));
        // a second release of the same slot is harmless
        assert!(matches!(k.handle(Method::ReleaseNonceSlot { slot: slots[3] }), Ok(Response::Released)));
        let Ok(Response::NonceSlot(fresh)) = k.handle(Method::AllocateNonceSlot) else { panic!() };
        assert_eq!(fresh.index, slots[3].index);
        assert_ne!(fresh.id, slots[3].id);
    }

    #[test]
    fn asset_commitments_match_outputs() {
        let mut k = keeper(4);
        let asset_coin = CoinId::new(9, 40, 3, KeyType::Regular);
        let Ok(Response::Commitments(c)) = k.handle(Method::RecoverCommitments { coins: vec![asset_coin] }) else { panic!() };
        let Ok(Response::Outputs(o)) = k.handle(Method::CreateOutputs { coins: vec![asset_coin] }) else { panic!() };
        assert_eq!(c[0], o[0].commitment);
        assert!(o[0].asset_proof.is_some());
        assert!(o[0].is_valid(&ProofConfig::new(3), ArithmeticMode::VarTime));
    }

    #[test]
    fn vouchers_are_signed_by_identity() {
        let mut k = keeper(5);
        let Ok(Response::Identity(id)) = k.handle(Method::GetIdentity { index: IDENTITY_INDEX }) else { panic!() };
        let Ok(Response::Vouchers(vouchers)) = k.handle(Method::CreateVouchers { key_index: 0, nonce: [1u8; 32], count: 3 })
        else { panic!() };
        assert_eq!(vouchers.len(), 3);
        assert!(vouchers.iter().all(|v| v.is_valid(&id)));
        assert_ne!(vouchers[0].ticket, vouchers[1].ticket);
    }
}
