//! Payload encoding
//!
//! Values are stored as JSON strings. With compression enabled the JSON is
//! gzipped and stored as `gz:` followed by standard base64. Decoding looks at
//! the prefix, so stores written with either setting stay readable.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Prefix marking a compressed payload
pub const COMPRESSED_PREFIX: &str = "gz:";

/// Errors encoding or decoding a payload
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Serialize a value for storage
pub fn encode<T: Serialize + ?Sized>(value: &T, compress: bool) -> Result<String, CodecError> {
    let json = serde_json::to_string(value)?;
    if !compress {
        return Ok(json);
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(format!("{}{}", COMPRESSED_PREFIX, STANDARD.encode(compressed)))
}

/// Deserialize a stored value, compressed or not
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, CodecError> {
    match raw.strip_prefix(COMPRESSED_PREFIX) {
        Some(encoded) => {
            let compressed = STANDARD.decode(encoded.trim())?;
            let mut json = String::new();
            GzDecoder::new(compressed.as_slice()).read_to_string(&mut json)?;
            Ok(serde_json::from_str(&json)?)
        }
        None => Ok(serde_json::from_str(raw)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Draft {
        origin: String,
        vehicles: u32,
    }

    #[test]
    fn test_plain_payload_is_json() {
        let draft = Draft {
            origin: "Dallas, TX".into(),
            vehicles: 3,
        };
        let raw = encode(&draft, false).unwrap();
        assert_eq!(raw, r#"{"origin":"Dallas, TX","vehicles":3}"#);
        assert_eq!(decode::<Draft>(&raw).unwrap(), draft);
    }

    #[test]
    fn test_compressed_payload_has_prefix() {
        let draft = Draft {
            origin: "Reno, NV".into(),
            vehicles: 9,
        };
        let raw = encode(&draft, true).unwrap();
        assert!(raw.starts_with(COMPRESSED_PREFIX));
        assert_eq!(decode::<Draft>(&raw).unwrap(), draft);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            decode::<Draft>("gz:%%%"),
            Err(CodecError::Base64(_))
        ));
        assert!(matches!(decode::<Draft>("{"), Err(CodecError::Json(_))));
        // Valid base64 that is not gzip
        assert!(matches!(
            decode::<Draft>("gz:aGVsbG8="),
            Err(CodecError::Compression(_))
        ));
    }
}
