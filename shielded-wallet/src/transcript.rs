use generic_array::{ArrayLength, GenericArray};

pub trait ToTranscriptBytes {
    type Len: ArrayLength<u8>;
    fn to_transcript_bytes(&self) -> GenericArray<u8, Self::Len>;
}

/// 32-byte strings for use in transcript macros, which only accept type paths
pub(crate) type Bytes32 = [u8; 32];

macro_rules! calculate_transcript_len_types_only {
    () => { typenum::U0 };
    ($trans_type:path) => { <$trans_type as ToTranscriptBytes>::Len };
    ($trans_type:path, $($trans_types:path),+) => {
        typenum::Sum<
            calculate_transcript_len_types_only!($trans_type),
            calculate_transcript_len_types_only!($($trans_types),+)
        >
    };
}

macro_rules! calculate_transcript_len {
    ($domain_sep:path, $($trans_types:path),*) => {
        1usize
            + $domain_sep.len()
            + <calculate_transcript_len_types_only!($($trans_types),*) as typenum::Unsigned>::USIZE
    };
}

macro_rules! make_transcript {
    ($domain_sep:path, $($trans_type:path : $es:expr),*) => {
        {
            assert!($domain_sep.len() < 256);
            assert!($domain_sep.is_ascii());
            const TRANSCRIPT_LEN: usize = calculate_transcript_len!($domain_sep, $($trans_type),*);
            let mut transcript = [0u8; TRANSCRIPT_LEN];
            transcript[0] = ($domain_sep.len()) as u8;
            transcript[1..($domain_sep.len()+1)].copy_from_slice($domain_sep.as_bytes());
            {
                #![allow(unused_mut)]
                let mut transcript_idx = 1 + $domain_sep.len();
                $(
                    let es_bytes = ($es as &$trans_type).to_transcript_bytes();
                    let es_slice = es_bytes.as_slice();
                    transcript[transcript_idx..(transcript_idx+es_slice.len())].copy_from_slice(es_slice);
                    transcript_idx += es_slice.len();
                )*
                assert_eq!(transcript_idx, TRANSCRIPT_LEN);
            }
            transcript
        }
    };
}

/// Growable transcript for data whose size is only known at runtime (kernel lists, windows).
/// Same framing as `make_transcript!`: length-prefixed domain separator, then raw fields.
pub(crate) struct TranscriptBuf(Vec<u8>);

impl TranscriptBuf {
    pub fn new(domain_sep: &str) -> Self {
        assert!(domain_sep.len() < 256);
        let mut buf = Vec::with_capacity(1 + domain_sep.len() + 128);
        buf.push(domain_sep.len() as u8);
        buf.extend_from_slice(domain_sep.as_bytes());
        Self(buf)
    }

    pub fn append<T: ToTranscriptBytes + ?Sized>(&mut self, value: &T) -> &mut Self {
        self.0.extend_from_slice(value.to_transcript_bytes().as_slice());
        self
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        self.0.extend_from_slice(bytes);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

pub(crate) use calculate_transcript_len;
pub(crate) use calculate_transcript_len_types_only;
pub(crate) use make_transcript;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_separators;

    #[test]
    fn transcript_is_length_prefixed() {
        let value = 0x0102u16;
        let transcript = make_transcript!(domain_separators::KERNEL_ID, u16 : &value);
        assert_eq!(domain_separators::KERNEL_ID.len(), transcript[0] as usize);
        assert_eq!(&transcript[1..=transcript[0] as usize], domain_separators::KERNEL_ID.as_bytes());
        assert_eq!(&transcript[transcript.len() - 2..], &[0x02, 0x01]);
    }

    #[test]
    fn buffer_matches_fixed_transcript() {
        let a = 7u64;
        let b: Bytes32 = [9u8; 32];
        let fixed = make_transcript!(domain_separators::KERNEL_ID, u64 : &a, Bytes32 : &b);
        let mut buf = TranscriptBuf::new(domain_separators::KERNEL_ID);
        buf.append(&a).append(&b);
        assert_eq!(fixed.as_slice(), buf.as_bytes());
    }
}
