//! Shared word/padding math, string-array packing, and hex formatting.

pub mod hex;

use crate::constants::STRING_PAD_CHAR;
use crate::EvioError;

/// Bytes of padding needed to bring `length` to a 4-byte boundary.
const PAD_VALUE: [usize; 4] = [0, 3, 2, 1];

/// Returns the number of bytes needed to pad `length` to a 4-byte boundary.
///
/// # Examples
///
/// ```
/// assert_eq!(evio::util::padding(0), 0);
/// assert_eq!(evio::util::padding(5), 3);
/// assert_eq!(evio::util::padding(6), 2);
/// assert_eq!(evio::util::padding(7), 1);
/// ```
pub fn padding(length: usize) -> usize {
    PAD_VALUE[length % 4]
}

/// Returns `length` rounded up to a whole number of 32-bit words.
pub fn words(length: usize) -> usize {
    length / 4 + usize::from(padding(length) > 0)
}

/// Returns `length` padded up to a 4-byte boundary.
pub fn padded_length(length: usize) -> usize {
    length + padding(length)
}

/// Pack an array of strings into the evio string-array byte form.
///
/// Each string is terminated with NUL, then the whole payload is padded to a
/// 4-byte boundary with `\x04` bytes. A payload already on a word boundary
/// still gets a full word of padding, so an empty array packs to
/// `\x04\x04\x04\x04`.
pub fn pack_strings(strings: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for s in strings {
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }
    let pads = [4, 3, 2, 1][out.len() % 4];
    out.resize(out.len() + pads, STRING_PAD_CHAR);
    out
}

/// Unpack evio string-array bytes into strings.
///
/// Strings are NUL-terminated; the first `\x04` where a new string would
/// begin ends the array. A trailing unterminated fragment is ignored, which
/// matches how externally produced data is tolerated.
pub fn unpack_strings(bytes: &[u8]) -> Result<Vec<String>, EvioError> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if b == 0 {
            let s = std::str::from_utf8(&bytes[start..i])
                .map_err(|_| EvioError::InvalidData("non-ASCII bytes in string array".into()))?;
            out.push(s.to_string());
            start = i + 1;
        } else if b == STRING_PAD_CHAR && i == start {
            break;
        }
        i += 1;
    }
    Ok(out)
}
