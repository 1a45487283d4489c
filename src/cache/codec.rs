//! Value Codec Module
//!
//! Serializes values to JSON and wraps them in a small binary envelope
//! carrying the category, the absolute deadline and a compression flag.
//!
//! ```text
//! +-------+-------+----------+------------------+-------------+
//! | magic | flags | category | deadline (u64 BE)| payload ... |
//! +-------+-------+----------+------------------+-------------+
//! ```
//!
//! Bytes that do not start with the magic byte are read as bare JSON in
//! the default category. Counters are stored this way.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{CacheCategory, CachePolicy};
use crate::error::{CacheError, Result};

/// First byte of every envelope. Never the first byte of JSON text.
pub const MAGIC: u8 = 0xCE;

const FLAG_COMPRESSED: u8 = 0b0000_0001;
const HEADER_LEN: usize = 11;

// == Decoded Value ==
/// Envelope contents after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedValue {
    pub category: CacheCategory,
    /// Unix milliseconds, None = no absolute deadline
    pub absolute_deadline: Option<u64>,
    /// Uncompressed JSON payload
    pub payload: Vec<u8>,
}

impl DecodedValue {
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

// == Serialize ==
/// Serializes a value to its JSON payload.
pub fn to_payload<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

// == Encode ==
/// Wraps a JSON payload in an envelope, compressing it when the policy asks.
pub fn encode(
    category: CacheCategory,
    absolute_deadline: Option<u64>,
    payload: &[u8],
    policy: &CachePolicy,
) -> Result<Vec<u8>> {
    let compress = policy.should_compress(payload.len());
    let body = if compress {
        gzip(payload)?
    } else {
        payload.to_vec()
    };

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.push(MAGIC);
    out.push(if compress { FLAG_COMPRESSED } else { 0 });
    out.push(category.index() as u8);
    out.extend_from_slice(&absolute_deadline.unwrap_or(0).to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

// == Decode ==
/// Unwraps stored bytes.
pub fn decode(bytes: &[u8]) -> Result<DecodedValue> {
    if !is_envelope(bytes) {
        return Ok(DecodedValue {
            category: CacheCategory::Default,
            absolute_deadline: None,
            payload: bytes.to_vec(),
        });
    }
    if bytes.len() < HEADER_LEN {
        return Err(CacheError::Decode(format!(
            "Envelope truncated: {} bytes",
            bytes.len()
        )));
    }

    let flags = bytes[1];
    let category = CacheCategory::from_index(bytes[2] as usize);
    let mut deadline = [0u8; 8];
    deadline.copy_from_slice(&bytes[3..HEADER_LEN]);
    let deadline = u64::from_be_bytes(deadline);
    let body = &bytes[HEADER_LEN..];

    let payload = if flags & FLAG_COMPRESSED != 0 {
        gunzip(body)?
    } else {
        body.to_vec()
    };

    Ok(DecodedValue {
        category,
        absolute_deadline: (deadline != 0).then_some(deadline),
        payload,
    })
}

/// True if the bytes carry an envelope header.
pub fn is_envelope(bytes: &[u8]) -> bool {
    bytes.first() == Some(&MAGIC)
}

/// Reads only the category from stored bytes.
pub fn peek_category(bytes: &[u8]) -> CacheCategory {
    match bytes {
        [MAGIC, _, id, ..] if bytes.len() >= HEADER_LEN => CacheCategory::from_index(*id as usize),
        _ => CacheCategory::Default,
    }
}

// == Compression Helpers ==
fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| CacheError::Decode(format!("Compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Decode(format!("Compression failed: {}", e)))
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Decode(format!("Decompression failed: {}", e)))?;
    Ok(out)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_payload_not_compressed() {
        let policy = CachePolicy::minutes(1);
        let bytes = encode(CacheCategory::Role, Some(42), b"\"admin\"", &policy).unwrap();

        assert_eq!(bytes[0], MAGIC);
        assert_eq!(bytes[1], 0);
        assert_eq!(&bytes[HEADER_LEN..], b"\"admin\"");

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.category, CacheCategory::Role);
        assert_eq!(decoded.absolute_deadline, Some(42));
        assert_eq!(decoded.deserialize::<String>().unwrap(), "admin");
    }

    #[test]
    fn test_large_payload_compressed() {
        let policy = CachePolicy::minutes(1);
        let value = vec!["permission:read"; 500];
        let payload = to_payload(&value).unwrap();
        let bytes = encode(CacheCategory::Permission, None, &payload, &policy).unwrap();

        assert_eq!(bytes[1] & FLAG_COMPRESSED, FLAG_COMPRESSED);
        assert!(bytes.len() < payload.len());

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.absolute_deadline, None);
        assert_eq!(decoded.deserialize::<Vec<String>>().unwrap().len(), 500);
    }

    #[test]
    fn test_compression_disabled() {
        let mut policy = CachePolicy::minutes(1);
        policy.compression_enabled = false;
        let payload = vec![b'a'; 4096];
        let bytes = encode(CacheCategory::Default, None, &payload, &policy).unwrap();
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes.len(), HEADER_LEN + payload.len());
    }

    #[test]
    fn test_bare_json_is_default_category() {
        let decoded = decode(b"17").unwrap();
        assert_eq!(decoded.category, CacheCategory::Default);
        assert_eq!(decoded.deserialize::<i64>().unwrap(), 17);
        assert_eq!(peek_category(b"17"), CacheCategory::Default);
    }

    #[test]
    fn test_truncated_envelope_rejected() {
        let result = decode(&[MAGIC, 0, 1]);
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_corrupt_compressed_body_rejected() {
        let mut bytes = vec![MAGIC, FLAG_COMPRESSED, 0];
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes.extend_from_slice(b"not gzip");
        assert!(matches!(decode(&bytes), Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_peek_category() {
        let policy = CachePolicy::minutes(1);
        let bytes = encode(CacheCategory::Directory, None, b"1", &policy).unwrap();
        assert_eq!(peek_category(&bytes), CacheCategory::Directory);
    }
}
