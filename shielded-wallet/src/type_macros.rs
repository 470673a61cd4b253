macro_rules! define_tiny_type {
    ($tiny:ident, $doc:literal, $base:ty $(,$extra_derivs:ident)*) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize $(,$extra_derivs)*)]
        pub struct $tiny(pub $base);
        impl Random for $tiny {
            type Params = <$base as Random>::Params;
            fn new_random_with_params<R: rand_core::CryptoRngCore + ?Sized>(rng: &mut R, p: Self::Params) -> Self {
                $tiny(<$base>::new_random_with_params(rng, p))
            }
        }
        impl ToTranscriptBytes for $tiny {
            type Len = <$base as ToTranscriptBytes>::Len;
            fn to_transcript_bytes(&self) -> generic_array::GenericArray<u8, Self::Len> {
                self.0.to_transcript_bytes()
            }
        }
    };
}

macro_rules! define_tiny_point_type {
    ($tiny:ident, $doc:literal) => {
        define_tiny_type! {$tiny, $doc, CompressedRistretto, Copy, Default, Hash}
        impl $tiny {
            pub fn from_point(point: &curve25519_dalek::RistrettoPoint) -> Self {
                Self(point.compress())
            }
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(CompressedRistretto(bytes))
            }
            pub fn as_bytes(&self) -> &[u8; 32] {
                self.0.as_bytes()
            }
            pub fn decompress(&self) -> Option<curve25519_dalek::RistrettoPoint> {
                self.0.decompress()
            }
        }
    };
}

macro_rules! define_tiny_byte_type {
    ($tiny:ident, $doc:literal, $size:expr $(,$extra_derivs:ident)*) => {
        define_tiny_type!{$tiny, $doc, [u8; $size] $(,$extra_derivs)*}
        impl Default for $tiny {
            fn default() -> Self {
                Self([0u8; $size])
            }
        }
        impl $tiny {
            pub fn as_bytes(&self) -> &[u8; $size] {
                &self.0
            }
        }
        impl From<[u8; $size]> for $tiny {
            fn from(value: [u8; $size]) -> Self {
                Self(value)
            }
        }
        impl core::fmt::Display for $tiny {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }
    };
}

pub(crate) use define_tiny_byte_type;
pub(crate) use define_tiny_point_type;
pub(crate) use define_tiny_type;
