//! Key derivation hierarchy.
//!
//! A private [`Kdf`] is a pair (generator secret s, cofactor c). Public key derivation only needs
//! s together with c G and c J, so a [`PublicKdf`] can recognise and verify everything a [`Kdf`]
//! produces without being able to sign for it:
//!
//! - x(hv) = H_n[s](hv)  (public part)
//! - sk(hv) = c x(hv)    (private key)
//! - PK_G(hv) = x(hv) (c G), PK_J(hv) = x(hv) (c J)

use curve25519_dalek::{RistrettoPoint, Scalar};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core_types::*;
use crate::domain_separators;
use crate::hash_functions::*;
use crate::math_utils::*;
use crate::transcript::*;

/// Operations available to anyone holding at least the public half of a key family
pub trait PublicKeyDerivation {
    /// x = H_n[s](hv)
    fn derive_pkey(&self, hv: &[u8; 32]) -> Scalar;

    /// x c G
    fn derive_pkey_g(&self, hv: &[u8; 32]) -> RistrettoPoint;

    /// x c J
    fn derive_pkey_j(&self, hv: &[u8; 32]) -> RistrettoPoint;
}

/// Operations requiring the private cofactor
pub trait KeyDerivation: PublicKeyDerivation {
    /// sk = c x
    fn derive_key(&self, hv: &[u8; 32]) -> Scalar;
}

#[derive(Clone, Debug, Zeroize, ZeroizeOnDrop)]
pub struct Kdf {
    generator_secret: [u8; 32],
    cofactor: Scalar,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKdf {
    generator_secret: [u8; 32],
    cofactor_g: RistrettoPoint,
    cofactor_j: RistrettoPoint,
}

fn derive_public_scalar(generator_secret: &[u8; 32], hv: &[u8; 32]) -> Scalar {
    // x = H_n[s](hv)
    let transcript = make_transcript!(domain_separators::KDF_KEY, Bytes32 : hv);
    derive_scalar(&transcript, generator_secret)
}

fn child_parts(generator_secret: &[u8; 32], hv: &[u8; 32]) -> ([u8; 32], Scalar) {
    // s' = H_32[s](hv), t = H_n[s](hv)
    let secret_transcript = make_transcript!(domain_separators::KDF_CHILD_SECRET, Bytes32 : hv);
    let cofactor_transcript = make_transcript!(domain_separators::KDF_CHILD_COFACTOR, Bytes32 : hv);
    (
        derive_bytes_32(&secret_transcript, generator_secret),
        derive_scalar(&cofactor_transcript, generator_secret),
    )
}

impl Kdf {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        // s = H_32[seed], c = H_n[seed]
        let secret_transcript = make_transcript!(domain_separators::KDF_GENERATOR_SECRET,);
        let cofactor_transcript = make_transcript!(domain_separators::KDF_COFACTOR,);
        Self {
            generator_secret: derive_bytes_32(&secret_transcript, seed),
            cofactor: derive_scalar(&cofactor_transcript, seed),
        }
    }

    pub fn to_public(&self) -> PublicKdf {
        PublicKdf {
            generator_secret: self.generator_secret,
            cofactor_g: scalar_mul_base(&self.cofactor),
            cofactor_j: self.cofactor * *J,
        }
    }

    /// Child key family; `self.to_public().child(hv) == self.child(hv).to_public()`
    pub fn child(&self, hv: &[u8; 32]) -> Kdf {
        let (generator_secret, t) = child_parts(&self.generator_secret, hv);
        Kdf { generator_secret, cofactor: self.cofactor * t }
    }

    pub fn derive_coin_key(&self, coin_id: &CoinId) -> Scalar {
        self.derive_key(&coin_id.hash_value())
    }
}

impl PublicKdf {
    pub fn child(&self, hv: &[u8; 32]) -> PublicKdf {
        let (generator_secret, t) = child_parts(&self.generator_secret, hv);
        PublicKdf {
            generator_secret,
            cofactor_g: t * self.cofactor_g,
            cofactor_j: t * self.cofactor_j,
        }
    }
}

impl PublicKeyDerivation for Kdf {
    fn derive_pkey(&self, hv: &[u8; 32]) -> Scalar {
        derive_public_scalar(&self.generator_secret, hv)
    }

    fn derive_pkey_g(&self, hv: &[u8; 32]) -> RistrettoPoint {
        scalar_mul_base(&self.derive_key(hv))
    }

    fn derive_pkey_j(&self, hv: &[u8; 32]) -> RistrettoPoint {
        self.derive_key(hv) * *J
    }
}

impl KeyDerivation for Kdf {
    fn derive_key(&self, hv: &[u8; 32]) -> Scalar {
        self.cofactor * self.derive_pkey(hv)
    }
}

impl PublicKeyDerivation for PublicKdf {
    fn derive_pkey(&self, hv: &[u8; 32]) -> Scalar {
        derive_public_scalar(&self.generator_secret, hv)
    }

    fn derive_pkey_g(&self, hv: &[u8; 32]) -> RistrettoPoint {
        self.derive_pkey(hv) * self.cofactor_g
    }

    fn derive_pkey_j(&self, hv: &[u8; 32]) -> RistrettoPoint {
        self.derive_pkey(hv) * self.cofactor_j
    }
}

/// Domain-separated 32-byte hash value for a labelled index
pub fn index_hash_value(domain_sep: &str, index: u64) -> [u8; 32] {
    let mut transcript = TranscriptBuf::new(domain_sep);
    transcript.append(&index);
    derive_bytes_32(transcript.as_bytes(), &[])
}

/// Owner key family for a given key index; the root of everything a viewer can see
pub fn owner_kdf(master: &Kdf, key_index: u64) -> Kdf {
    master.child(&index_hash_value(domain_separators::OWNER_KEY, key_index))
}

/// Identity key pair for a wallet address index
pub fn identity_key(master: &Kdf, address_index: u64) -> (Scalar, PeerId) {
    let sk = master.derive_key(&index_hash_value(domain_separators::IDENTITY_KEY, address_index));
    let pk = PeerId::from_point(&scalar_mul_base(&sk));
    (sk, pk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_derivation_matches_private() {
        let kdf = Kdf::from_seed(&[7u8; 32]);
        let pkdf = kdf.to_public();
        let hv = [3u8; 32];
        let sk = kdf.derive_key(&hv);
        assert_eq!(scalar_mul_base(&sk), pkdf.derive_pkey_g(&hv));
        assert_eq!(sk * *J, pkdf.derive_pkey_j(&hv));
        assert_eq!(kdf.derive_pkey(&hv), pkdf.derive_pkey(&hv));
    }

    #[test]
    fn child_derivation_commutes_with_publication() {
        let kdf = Kdf::from_seed(&[1u8; 32]);
        let hv = [2u8; 32];
        assert_eq!(kdf.child(&hv).to_public(), kdf.to_public().child(&hv));
    }

    #[test]
    fn coin_keys_depend_on_every_coin_field() {
        let kdf = Kdf::from_seed(&[5u8; 32]);
        let base = CoinId::new(1, 100, 0, KeyType::Regular);
        let mut other = base;
        other.value = 101;
        assert_ne!(kdf.derive_coin_key(&base), kdf.derive_coin_key(&other));
        other = base;
        other.key_type = KeyType::Change;
        assert_ne!(kdf.derive_coin_key(&base), kdf.derive_coin_key(&other));
    }
}
