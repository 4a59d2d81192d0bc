//! Hex and base64url encoding helpers used to turn task signatures into
//! filesystem-safe directory names.
//!
//! These are deliberately small and dependency-light: the crate only needs a
//! stable, safe-for-all-OSes textual form for a digest, not a general-purpose
//! codec library.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::InvalidArgumentError;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Encodes `bytes` as an uppercase hex string.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        out.push(HEX_DIGITS[(byte & 0xF) as usize] as char);
    }
    out
}

/// Decodes a hex string back into bytes.
///
/// Accepts both upper- and lowercase digits. Rejects odd-length input and
/// non-hex characters with the stable messages asserted by the test suite.
pub fn from_hex(hex: &str) -> Result<Vec<u8>, InvalidArgumentError> {
    if hex.len() % 2 != 0 {
        return Err(InvalidArgumentError::OddLength);
    }

    let mut out = Vec::with_capacity(hex.len() / 2);
    let chars: Vec<char> = hex.chars().collect();

    for pair in chars.chunks(2) {
        let hi = hex_digit(pair[0])?;
        let lo = hex_digit(pair[1])?;
        out.push((hi << 4) | lo);
    }

    Ok(out)
}

fn hex_digit(c: char) -> Result<u8, InvalidArgumentError> {
    match c {
        '0'..='9' => Ok(c as u8 - b'0'),
        'a'..='f' => Ok(c as u8 - b'a' + 10),
        'A'..='F' => Ok(c as u8 - b'A' + 10),
        other => Err(InvalidArgumentError::NotHexDigit(other)),
    }
}

/// Encodes `bytes` as an unpadded, URL-safe base64 string.
///
/// Usable as a filesystem directory name on all target OSes (no `/`, `+`, or
/// padding `=`).
pub fn to_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes a base64url string produced by [`to_base64url`].
pub fn from_base64url(text: &str) -> Result<Vec<u8>, InvalidArgumentError> {
    URL_SAFE_NO_PAD
        .decode(text)
        .map_err(InvalidArgumentError::InvalidBase64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let bytes = b"the quick brown fox".to_vec();
        let hex = to_hex(&bytes);
        assert_eq!(from_hex(&hex).unwrap(), bytes);
    }

    #[test]
    fn hex_round_trip_is_upper() {
        let hex = "deadbeef";
        let bytes = from_hex(hex).unwrap();
        assert_eq!(to_hex(&bytes), hex.to_uppercase());
    }

    #[test]
    fn hex_odd_length_is_rejected() {
        let err = from_hex("abc").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The given string has an odd length. Hex strings must be of even length."
        );
    }

    #[test]
    fn hex_invalid_digit_is_rejected() {
        let err = from_hex("zz").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The character 'z' is not a valid hexadecimal digit. Allowed characters: 0-9, a-f, A-F."
        );
    }

    #[test]
    fn base64url_round_trip() {
        let bytes = (0u8..=255).collect::<Vec<_>>();
        let text = to_base64url(&bytes);
        assert!(!text.contains('/') && !text.contains('+') && !text.contains('='));
        assert_eq!(from_base64url(&text).unwrap(), bytes);
    }

    #[test]
    fn base64url_malformed_input_is_reported_as_invalid_base64_not_null() {
        let err = from_base64url("not valid base64!!").unwrap_err();
        assert!(matches!(err, InvalidArgumentError::InvalidBase64(_)));
    }
}
