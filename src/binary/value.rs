//! LEB128 variable-length integers.
//!
//! An `N`-bit integer may take at most `ceil(N / 7)` bytes, and the bits of
//! the final byte beyond `N` must be zero (unsigned) or copies of the sign
//! bit (signed).

use super::decode::{ByteReader, Decode, Result};
use crate::error::DecodeError;

const CONTINUATION_BIT: u8 = 0x80;
const SIGN_BIT: u8 = 0x40;
const PAYLOAD_BITS: u32 = 7;

/// Unsigned LEB128 integer with at most `N` significant bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarU<const N: u32>(pub u64);

/// Signed LEB128 integer of `N` bits, sign-extended to 64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarS<const N: u32>(pub i64);

impl<'a, const N: u32> Decode<'a> for VarU<N> {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        debug_assert!(N <= u64::BITS);
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let byte: u8 = bytes.next()?;
            let payload = byte & !CONTINUATION_BIT;
            if shift + PAYLOAD_BITS >= N {
                // last byte the width allows
                let usable = N - shift;
                if byte & CONTINUATION_BIT != 0 || u32::from(payload) >> usable != 0 {
                    return Err(DecodeError::IntegerOverflow);
                }
            }
            result |= u64::from(payload) << shift;
            if byte & CONTINUATION_BIT == 0 {
                return Ok(Self(result));
            }
            shift += PAYLOAD_BITS;
        }
    }
}

impl<'a, const N: u32> Decode<'a> for VarS<N> {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        debug_assert!(N <= i64::BITS);
        let mut result = 0i64;
        let mut shift = 0;
        loop {
            let byte: u8 = bytes.next()?;
            let payload = byte & !CONTINUATION_BIT;
            if shift + PAYLOAD_BITS >= N {
                // bits from the sign position upward must agree
                let usable = N - shift;
                let high = (0x7f >> (usable - 1)) << (usable - 1);
                let bits = payload & high;
                if byte & CONTINUATION_BIT != 0 || (bits != 0 && bits != high) {
                    return Err(DecodeError::IntegerOverflow);
                }
            }
            result |= i64::from(payload) << shift;
            shift += PAYLOAD_BITS;
            if byte & CONTINUATION_BIT == 0 {
                if shift < i64::BITS && byte & SIGN_BIT != 0 {
                    result |= !0 << shift;
                }
                return Ok(Self(result));
            }
        }
    }
}
