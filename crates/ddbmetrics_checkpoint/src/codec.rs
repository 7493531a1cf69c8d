//! Blob encoding: JSON, optionally gzip-compressed.
//!
//! Decoding sniffs the gzip magic so blobs written with compression disabled
//! stay readable after it is re-enabled, and vice versa.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::io::{Read, Write};

use crate::error::{CheckpointError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

/// Serialize `value` to JSON and gzip it when `compress` is set.
pub fn encode<T: Serialize>(value: &T, compress: bool) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(value)?;
    if !compress {
        return Ok(json);
    }
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Pretty JSON for human consumption (`export_json`).
pub fn encode_pretty<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

/// Decode a blob into an untyped JSON document.
///
/// Any failure here (bad gzip stream, truncated data, invalid JSON) is reported
/// as [`CheckpointError::Corrupt`].
pub fn decode(bytes: &[u8]) -> Result<serde_json::Value> {
    if bytes.is_empty() {
        return Err(CheckpointError::corrupt("empty checkpoint blob"));
    }

    let json = if is_compressed(bytes) {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CheckpointError::corrupt(format!("gzip decode failed: {}", e)))?;
        out
    } else {
        bytes.to_vec()
    };

    let value: serde_json::Value = serde_json::from_slice(&json)
        .map_err(|e| CheckpointError::corrupt(format!("invalid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(CheckpointError::corrupt("checkpoint root is not an object"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_accepts_plain_and_gzip() {
        let doc = json!({"operation_id": "op", "schema_version": "1.2.0"});
        let plain = encode(&doc, false).unwrap();
        let packed = encode(&doc, true).unwrap();
        assert!(!is_compressed(&plain));
        assert!(is_compressed(&packed));
        assert_eq!(decode(&plain).unwrap(), doc);
        assert_eq!(decode(&packed).unwrap(), doc);
    }

    #[test]
    fn test_truncated_gzip_is_corrupt() {
        let doc = json!({"operation_id": "op", "padding": "x".repeat(512)});
        let packed = encode(&doc, true).unwrap();
        let err = decode(&packed[..packed.len() / 2]).unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt(_)));
    }

    #[test]
    fn test_non_object_root_is_corrupt() {
        assert!(matches!(
            decode(b"[1,2,3]").unwrap_err(),
            CheckpointError::Corrupt(_)
        ));
        assert!(matches!(decode(b"").unwrap_err(), CheckpointError::Corrupt(_)));
    }
}
