// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! LEB128 decoding.

use super::Error;

// An integral type with a LEB128 encoding.
pub(super) trait Leb128: Sized {
    const BITS: u32;
    const SIGNED: bool;

    // Truncates the accumulated (and, where relevant, sign-extended) bits.
    fn from_bits(bits: u64) -> Self;
}

impl Leb128 for u32 {
    const BITS: u32 = 32;
    const SIGNED: bool = false;

    fn from_bits(bits: u64) -> Self {
        bits as u32
    }
}

impl Leb128 for i32 {
    const BITS: u32 = 32;
    const SIGNED: bool = true;

    fn from_bits(bits: u64) -> Self {
        bits as u32 as i32
    }
}

impl Leb128 for i64 {
    const BITS: u32 = 64;
    const SIGNED: bool = true;

    fn from_bits(bits: u64) -> Self {
        bits as i64
    }
}

const PAYLOAD: u8 = 0x7f;
const CONTINUATION: u8 = 0x80;
const SIGN: u8 = 0x40;

// Reads a LEB128-encoded value from a byte source.
//
// The encoding may be at most ceil(BITS / 7) bytes long, and the bits of the
// final byte beyond BITS must be zero (unsigned) or copies of the sign bit
// (signed).
pub(super) fn read<T: Leb128>(mut next_byte: impl FnMut() -> Result<u8, Error>) -> Result<T, Error> {
    let max_len = T::BITS.div_ceil(7);
    let mut bits = 0u64;
    for i in 0..max_len {
        let byte = next_byte()?;
        let payload = byte & PAYLOAD;
        let shift = 7 * i;
        let last = byte & CONTINUATION == 0;

        if i == max_len - 1 {
            if !last {
                return Err(Error::InvalidLeb128);
            }
            let used = T::BITS - shift;
            let unused = if T::SIGNED {
                // Includes the sign bit itself.
                payload >> (used - 1)
            } else {
                payload >> used
            };
            let all_set = PAYLOAD >> (if T::SIGNED { used - 1 } else { used });
            let valid = unused == 0 || (T::SIGNED && unused == all_set);
            if !valid {
                return Err(Error::InvalidLeb128);
            }
        }

        bits |= u64::from(payload) << shift;
        if last {
            let width = shift + 7;
            if T::SIGNED && width < 64 && byte & SIGN != 0 {
                bits |= !0u64 << width;
            }
            return Ok(T::from_bits(bits));
        }
    }
    unreachable!("the final byte either terminates or fails")
}
