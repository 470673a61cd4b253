//! Tickets: one-time serial keys for shielded outputs.
//!
//! A ticket publishes SerialPub = kG G + kJ J together with a two-generator Schnorr proof of
//! knowledge of (kG, kJ). The proof nonces are derived from the DH point shared with the owner,
//! so the owner can strip them off again and recover kG, and from it everything else.
//!
//! - k = H("kG-k", kG) under the generation key (private when the owner made the ticket itself)
//! - serial preimage = H("k-pI", k), SpendPk = ser.derive_pkey_g(preimage), kJ = ToSerial(SpendPk)
//! - DH point = gen.derive_key(H("DH", SerialPub)) SerialPub

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::traits::IsIdentity;
use curve25519_dalek::Scalar;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::core_types::*;
use crate::domain_separators;
use crate::hash_functions::*;
use crate::kdf::*;
use crate::math_utils::*;
use crate::random::Random;
use crate::shielded::viewer::*;
use crate::signature::Signature;
use crate::transcript::*;
use crate::type_macros::*;

define_tiny_byte_type! {TicketId, "Hash of a ticket's serial public key; names a shielded coin", 32, Copy, Hash, PartialOrd, Ord}
define_tiny_byte_type! {SharedSecret, "Secret shared between the creator of a shielded output and its owner", 32, Zeroize}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSignature {
    pub nonce_pub: CompressedRistretto,
    pub k_g: Scalar,
    pub k_j: Scalar,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub serial_pub: CompressedRistretto,
    pub signature: TicketSignature,
}

/// Everything known about a ticket by whoever created or recovered it
#[derive(Clone, Debug)]
pub struct TicketParams {
    pub k_g: Scalar,
    pub k_j: Scalar,
    pub created_by_viewer: bool,
    pub serial_preimage: [u8; 32],
    pub spend_pk: CompressedRistretto,
    pub serial_pub: RistrettoPoint,
    pub shared_secret: SharedSecret,
}

fn ticket_challenge(serial_pub: &CompressedRistretto, nonce_pub: &CompressedRistretto) -> Scalar {
    let transcript = make_transcript!(domain_separators::TICKET_CHALLENGE,
        CompressedRistretto : serial_pub, CompressedRistretto : nonce_pub);
    derive_scalar(&transcript, &[])
}

fn dh_hash_value(serial_pub: &CompressedRistretto) -> [u8; 32] {
    derive_bytes_32(&make_transcript!(domain_separators::TICKET_DH, CompressedRistretto : serial_pub), &[])
}

fn dh_nonces(dh_point: &RistrettoPoint) -> (Scalar, Scalar) {
    let n_g = derive_scalar(&make_transcript!(domain_separators::TICKET_NONCE_G, RistrettoPoint : dh_point), &[]);
    let n_j = derive_scalar(&make_transcript!(domain_separators::TICKET_NONCE_J, RistrettoPoint : dh_point), &[]);
    (n_g, n_j)
}

fn shared_secret_from(dh_point: &RistrettoPoint) -> SharedSecret {
    SharedSecret(derive_bytes_32(&make_transcript!(domain_separators::SHARED_SECRET, RistrettoPoint : dh_point), &[]))
}

/// Hash value under which the generation key derives k from kG
fn preimage_key_hash_value(k_g: &Scalar) -> [u8; 32] {
    derive_bytes_32(&make_transcript!(domain_separators::TICKET_PREIMAGE_KEY, Scalar : k_g), &[])
}

/// (serial preimage, SpendPk, kJ) for a preimage key k
fn serial_keys(k: &Scalar, ser: &PublicKdf) -> ([u8; 32], CompressedRistretto, Scalar) {
    let preimage = derive_bytes_32(&make_transcript!(domain_separators::SERIAL_PREIMAGE, Scalar : k), &[]);
    let spend_pk = ser.derive_pkey_g(&preimage).compress();
    (preimage, spend_pk, to_serial(&spend_pk))
}

/// kJ = ToSerial(SpendPk); public, so verifiers can strip kJ J off a window element
pub fn to_serial(spend_pk: &CompressedRistretto) -> Scalar {
    derive_scalar(&make_transcript!(domain_separators::TO_SERIAL, CompressedRistretto : spend_pk), &[])
}

impl Ticket {
    pub fn id(&self) -> TicketId {
        TicketId(derive_bytes_32(&make_transcript!(domain_separators::TICKET_ID,
            CompressedRistretto : &self.serial_pub), &[]))
    }

    /// s_G G + s_J J == R + e SerialPub
    pub fn is_valid(&self) -> bool {
        let (Some(serial_pub), Some(nonce_pub)) = (self.serial_pub.decompress(), self.signature.nonce_pub.decompress())
        else {
            return false;
        };
        if serial_pub.is_identity() {
            return false;
        }
        let e = ticket_challenge(&self.serial_pub, &self.signature.nonce_pub);
        multiscalar_mul(ArithmeticMode::VarTime,
            &[self.signature.k_g, self.signature.k_j, -Scalar::ONE, -e],
            &[G, *J, nonce_pub, serial_pub])
            .is_identity()
    }
}

impl TicketParams {
    fn sign(&self, dh_point: &RistrettoPoint) -> Ticket {
        let (n_g, n_j) = dh_nonces(dh_point);
        let serial_pub = self.serial_pub.compress();
        let nonce_pub = scalar_mul_gj(&n_g, &n_j).compress();
        let e = ticket_challenge(&serial_pub, &nonce_pub);
        Ticket {
            serial_pub,
            signature: TicketSignature { nonce_pub, k_g: n_g + e * self.k_g, k_j: n_j + e * self.k_j },
        }
    }

    fn from_preimage_key(k_g: Scalar, k: &Scalar, created_by_viewer: bool, ser: &PublicKdf, dh: impl FnOnce(&CompressedRistretto, &Scalar, &Scalar, &RistrettoPoint) -> RistrettoPoint)
        -> (Self, RistrettoPoint)
    {
        let (serial_preimage, spend_pk, k_j) = serial_keys(k, ser);
        let serial_pub = scalar_mul_gj(&k_g, &k_j);
        let dh_point = dh(&serial_pub.compress(), &k_g, &k_j, &serial_pub);
        let params = Self {
            k_g,
            k_j,
            created_by_viewer,
            serial_preimage,
            spend_pk,
            serial_pub,
            shared_secret: shared_secret_from(&dh_point),
        };
        (params, dh_point)
    }

    fn generation_scalar<K: PublicKeyDerivation>(gen: &K, nonce: &[u8; 32]) -> Scalar {
        gen.derive_pkey(&derive_bytes_32(&make_transcript!(domain_separators::TICKET_GENERATION_SCALAR,
            Bytes32 : nonce), &[]))
    }

    /// Ticket made by the owner itself (vouchers, self-sends)
    pub fn generate_by_viewer(viewer: &Viewer, nonce: &[u8; 32]) -> (Ticket, Self) {
        let k_g = Self::generation_scalar(&viewer.gen, nonce);
        let k = viewer.gen.derive_key(&preimage_key_hash_value(&k_g));
        let (params, dh_point) = Self::from_preimage_key(k_g, &k, true, &viewer.ser,
            |serial_pub, _, _, point| viewer.gen.derive_key(&dh_hash_value(serial_pub)) * point);
        (params.sign(&dh_point), params)
    }

    /// Ticket made by a sender who only knows the owner's public address
    pub fn generate_for_address(address: &ShieldedAddress, nonce: &[u8; 32]) -> (Ticket, Self) {
        let k_g = Self::generation_scalar(&address.gen, nonce);
        let k = address.gen.derive_pkey(&preimage_key_hash_value(&k_g));
        let (params, dh_point) = Self::from_preimage_key(k_g, &k, false, &address.ser,
            |serial_pub, k_g, k_j, _| {
                // c x (kG G + kJ J) = kG x (c G) + kJ x (c J)
                let hv = dh_hash_value(serial_pub);
                k_g * address.gen.derive_pkey_g(&hv) + k_j * address.gen.derive_pkey_j(&hv)
            });
        (params.sign(&dh_point), params)
    }

    /// Re-derive everything from the stored kG
    pub fn restore(k_g: &Scalar, created_by_viewer: bool, viewer: &Viewer) -> Self {
        let hv = preimage_key_hash_value(k_g);
        let k = if created_by_viewer { viewer.gen.derive_key(&hv) } else { viewer.gen.derive_pkey(&hv) };
        Self::from_preimage_key(*k_g, &k, created_by_viewer, &viewer.ser,
            |serial_pub, _, _, point| viewer.gen.derive_key(&dh_hash_value(serial_pub)) * point).0
    }

    /// Ownership check; None if the ticket is not addressed to this viewer
    pub fn recover(ticket: &Ticket, viewer: &Viewer) -> Option<Self> {
        let serial_pub = ticket.serial_pub.decompress()?;
        let dh_point = viewer.gen.derive_key(&dh_hash_value(&ticket.serial_pub)) * serial_pub;
        let (n_g, n_j) = dh_nonces(&dh_point);
        if scalar_mul_gj(&n_g, &n_j).compress() != ticket.signature.nonce_pub {
            return None;
        }

        let e = ticket_challenge(&ticket.serial_pub, &ticket.signature.nonce_pub);
        let e_inv = e.invert();
        let k_g = (ticket.signature.k_g - n_g) * e_inv;
        let k_j = (ticket.signature.k_j - n_j) * e_inv;

        [true, false]
            .into_iter()
            .map(|created_by_viewer| Self::restore(&k_g, created_by_viewer, viewer))
            .find(|params| params.k_j == k_j && params.serial_pub == serial_pub)
    }

    /// Spend key for SpendPk; needs a spend-capable viewer
    pub fn spend_sk(&self, viewer: &Viewer) -> Option<Scalar> {
        viewer.ser_private.as_ref().map(|ser| ser.derive_key(&self.serial_preimage))
    }
}

/// Pre-published ticket plus the shared secret, signed by the owner's identity key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub ticket: Ticket,
    pub shared_secret: SharedSecret,
    pub signature: Signature,
}

fn voucher_message(ticket_id: &TicketId, shared_secret: &SharedSecret) -> [u8; 32] {
    derive_bytes_32(&make_transcript!(domain_separators::VOUCHER,
        TicketId : ticket_id, SharedSecret : shared_secret), &[])
}

impl Voucher {
    pub fn create<R: rand_core::CryptoRngCore + ?Sized>(
        rng: &mut R,
        viewer: &Viewer,
        nonce: &[u8; 32],
        identity_sk: &Scalar,
    ) -> Self {
        let (ticket, params) = TicketParams::generate_by_viewer(viewer, nonce);
        let msg = voucher_message(&ticket.id(), &params.shared_secret);
        Self {
            signature: Signature::sign(&msg, identity_sk, &Scalar::new_random_with_params(rng, ())),
            shared_secret: params.shared_secret.clone(),
            ticket,
        }
    }

    pub fn is_valid(&self, identity: &PeerId) -> bool {
        let Some(pk) = identity.decompress() else {
            return false;
        };
        self.ticket.is_valid()
            && self.signature.is_valid(&voucher_message(&self.ticket.id(), &self.shared_secret), &pk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    fn viewer(seed: u8) -> Viewer {
        Viewer::from_master(&Kdf::from_seed(&[seed; 32]), 0)
    }

    #[test]
    fn viewer_ticket_is_recovered_with_same_secret() {
        let v = viewer(1);
        let (ticket, params) = TicketParams::generate_by_viewer(&v, &[9u8; 32]);
        assert!(ticket.is_valid());
        let recovered = TicketParams::recover(&ticket, &v).expect("owned");
        assert!(recovered.created_by_viewer);
        assert_eq!(recovered.k_g, params.k_g);
        assert_eq!(recovered.shared_secret, params.shared_secret);
        assert_eq!(recovered.spend_pk, params.spend_pk);
        assert!(TicketParams::recover(&ticket, &viewer(2)).is_none());
    }

    #[test]
    fn address_ticket_is_recovered_by_owner_only() {
        let v = viewer(3);
        let (ticket, params) = TicketParams::generate_for_address(&v.to_address(), &[5u8; 32]);
        assert!(ticket.is_valid());
        let recovered = TicketParams::recover(&ticket, &v.watch_only()).expect("owned");
        assert!(!recovered.created_by_viewer);
        assert_eq!(recovered.shared_secret, params.shared_secret);
        assert!(TicketParams::recover(&ticket, &viewer(4)).is_none());
    }

    #[test]
    fn spend_key_opens_spend_pk() {
        let v = viewer(6);
        let (_, params) = TicketParams::generate_by_viewer(&v, &[1u8; 32]);
        let sk = params.spend_sk(&v).expect("spend capable");
        assert_eq!(scalar_mul_base(&sk).compress(), params.spend_pk);
        assert!(params.spend_sk(&v.watch_only()).is_none());
    }

    #[test]
    fn any_mutated_byte_breaks_the_ticket() {
        let (ticket, _) = TicketParams::generate_by_viewer(&viewer(7), &[2u8; 32]);
        for i in 0..32 {
            let mut t = ticket.clone();
            t.serial_pub.0[i] ^= 0x01;
            assert!(!t.is_valid(), "serial byte {i}");

            let mut t = ticket.clone();
            t.signature.nonce_pub.0[i] ^= 0x01;
            assert!(!t.is_valid(), "nonce byte {i}");

            let mut t = ticket.clone();
            let mut k = t.signature.k_g.to_bytes();
            k[i] ^= 0x01;
            t.signature.k_g = Scalar::from_bytes_mod_order(k);
            assert!(!t.is_valid(), "k_g byte {i}");

            let mut t = ticket.clone();
            let mut k = t.signature.k_j.to_bytes();
            k[i] ^= 0x01;
            t.signature.k_j = Scalar::from_bytes_mod_order(k);
            assert!(!t.is_valid(), "k_j byte {i}");
        }
    }

    #[test]
    fn voucher_is_bound_to_identity() {
        let master = Kdf::from_seed(&[8u8; 32]);
        let v = Viewer::from_master(&master, 0);
        let (sk, id) = identity_key(&master, 0);
        let voucher = Voucher::create(&mut OsRng, &v, &[3u8; 32], &sk);
        assert!(voucher.is_valid(&id));

        let (_, other) = identity_key(&master, 1);
        assert!(!voucher.is_valid(&other));

        let mut forged = voucher.clone();
        forged.shared_secret.0[0] ^= 1;
        assert!(!forged.is_valid(&id));
    }
}
