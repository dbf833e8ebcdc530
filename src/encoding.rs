//! Base64 helpers for network hashes and chain transaction ids
//!
//! The signing network identifies transactions by URL-safe base64 strings
//! without padding. Decoding is lenient and accepts the standard alphabet
//! and padded input as well, since chain handlers are not consistent.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;

use crate::error::{Result, TransferError};

/// Encode bytes as URL-safe base64 without padding
pub fn to_url_base64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64 in either alphabet, padded or not
pub fn from_base64(value: &str) -> Result<Vec<u8>> {
    let value = value.trim();
    URL_SAFE_NO_PAD
        .decode(value)
        .or_else(|_| URL_SAFE.decode(value))
        .or_else(|_| STANDARD.decode(value))
        .or_else(|_| STANDARD_NO_PAD.decode(value))
        .map_err(TransferError::from)
}

/// Decode a base64 value that must be exactly 32 bytes long
pub fn from_base64_32(value: &str) -> Result<[u8; 32]> {
    let bytes = from_base64(value)?;
    if bytes.len() != 32 {
        return Err(TransferError::ParameterError(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Serde adapter for optional 32-byte values encoded as hex
pub mod hex_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<[u8; 32]>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<[u8; 32]>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(d)? else {
            return Ok(None);
        };
        let raw = raw.strip_prefix("0x").unwrap_or(&raw);
        let mut out = [0u8; 32];
        hex::decode_to_slice(raw, &mut out).map_err(serde::de::Error::custom)?;
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_base64_has_no_padding() {
        let encoded = to_url_base64(&[0xfb, 0xff]);
        assert_eq!(encoded, "-_8");
    }

    #[test]
    fn test_lenient_decode() {
        assert_eq!(from_base64("-_8").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(from_base64("+/8=").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(from_base64("+/8").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_from_base64_32_rejects_wrong_length() {
        assert!(from_base64_32("AAAA").is_err());
        let zero = to_url_base64(&[0u8; 32]);
        assert_eq!(from_base64_32(&zero).unwrap(), [0u8; 32]);
    }
}
