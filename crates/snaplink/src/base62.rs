//! Bijective base-62 codec between raw `u64` values and short tokens.
//!
//! The alphabet orders digits before lowercase before uppercase, so symbol
//! index equals numeric value. Both directions are pure functions; the only
//! canonical token with a leading `'0'` is `"0"` itself (the encoder never
//! pads).

use crate::error::{Error, Result};

/// The 62-symbol alphabet, in significance order.
pub const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const BASE: u64 = 62;
// u64::MAX encodes to 11 base-62 symbols.
const MAX_ENCODED_LEN: usize = 11;
const INVALID: u8 = 0xFF;

const DECODE_LUT: [u8; 256] = {
    let mut lut = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        lut[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    lut
};

/// Encodes a raw value as a short token.
///
/// Repeated division by 62, remainders collected least-significant first and
/// emitted in reverse. Zero encodes to `"0"`.
pub fn encode(mut value: u64) -> String {
    let mut buf = [0u8; MAX_ENCODED_LEN];
    let mut pos = buf.len();
    loop {
        pos -= 1;
        buf[pos] = ALPHABET[(value % BASE) as usize];
        value /= BASE;
        if value == 0 {
            break;
        }
    }
    // SAFETY: the alphabet is pure ASCII.
    unsafe { core::str::from_utf8_unchecked(&buf[pos..]) }.to_owned()
}

/// Decodes a short token back to its raw value.
///
/// Positional left-to-right evaluation with checked arithmetic.
///
/// # Errors
///
/// Returns [`Error::InvalidToken`] for empty input, any byte outside the
/// alphabet, or a value that overflows `u64`.
pub fn decode(token: &str) -> Result<u64> {
    if token.is_empty() {
        return Err(invalid(token));
    }

    let mut value: u64 = 0;
    for &byte in token.as_bytes() {
        let digit = DECODE_LUT[byte as usize];
        if digit == INVALID {
            return Err(invalid(token));
        }
        value = value
            .checked_mul(BASE)
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or_else(|| invalid(token))?;
    }
    Ok(value)
}

fn invalid(token: &str) -> Error {
    Error::InvalidToken {
        token: token.to_owned(),
    }
}
