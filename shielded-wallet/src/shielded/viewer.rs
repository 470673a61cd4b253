use serde::{Deserialize, Serialize};

use crate::domain_separators;
use crate::kdf::*;

/// Keys that recognise shielded outputs addressed to one owner key.
///
/// The generation key is always private here (recognition needs the DH secret). The serial key
/// is public unless the viewer can also spend, in which case `ser_private` holds its private half.
#[derive(Clone, Debug)]
pub struct Viewer {
    pub gen: Kdf,
    pub ser: PublicKdf,
    pub ser_private: Option<Kdf>,
}

/// Public half of a [`Viewer`]; enough to address shielded outputs to it without interaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedAddress {
    pub gen: PublicKdf,
    pub ser: PublicKdf,
}

fn generation_kdf(owner: &Kdf) -> Kdf {
    let hv = index_hash_value(domain_separators::OWNER_GENERATION_KEY, 0);
    Kdf::from_seed(&owner.derive_pkey(&hv).to_bytes())
}

fn serial_hash_value() -> [u8; 32] {
    index_hash_value(domain_separators::OWNER_SERIAL_KEY, 0)
}

impl Viewer {
    pub fn from_owner(owner: &Kdf) -> Self {
        let ser_private = owner.child(&serial_hash_value());
        Self {
            gen: generation_kdf(owner),
            ser: ser_private.to_public(),
            ser_private: Some(ser_private),
        }
    }

    pub fn from_master(master: &Kdf, key_index: u64) -> Self {
        Self::from_owner(&owner_kdf(master, key_index))
    }

    /// Viewer that recognises outputs but cannot derive spend keys
    pub fn watch_only(&self) -> Self {
        Self { gen: self.gen.clone(), ser: self.ser.clone(), ser_private: None }
    }

    pub fn can_spend(&self) -> bool {
        self.ser_private.is_some()
    }

    pub fn to_address(&self) -> ShieldedAddress {
        ShieldedAddress { gen: self.gen.to_public(), ser: self.ser.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_key_matches_public_owner_derivation() {
        let owner = Kdf::from_seed(&[4u8; 32]);
        let viewer = Viewer::from_owner(&owner);
        assert_eq!(viewer.ser, owner.to_public().child(&serial_hash_value()));
        assert!(viewer.can_spend());
        assert!(!viewer.watch_only().can_spend());
        assert_eq!(viewer.watch_only().to_address(), viewer.to_address());
    }

    #[test]
    fn key_indices_give_unrelated_viewers() {
        let master = Kdf::from_seed(&[1u8; 32]);
        assert_ne!(Viewer::from_master(&master, 0).to_address(), Viewer::from_master(&master, 1).to_address());
    }
}
