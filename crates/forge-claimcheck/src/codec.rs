//! Byte-level compression and value encoding.
//!
//! Values cross the wire as bytes chosen by their declared Rust type:
//! `String` is UTF-8, `Vec<u8>` passes through untouched and [`Json<T>`] goes
//! through `serde_json`. Decoding picks the same branch from the requested
//! type and never sniffs the content.

use crate::errors::{ClaimCheckError, ClaimCheckResult};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};

/// First two bytes of every gzip member (RFC 1952).
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub trait CompressionCodec: Send + Sync + fmt::Debug {
    fn compress(&self, bytes: &[u8]) -> ClaimCheckResult<Vec<u8>>;

    /// Checks only the leading signature; `bytes` is left untouched.
    fn is_compressed(&self, bytes: &[u8]) -> bool;

    /// Fails with [`ClaimCheckError::Format`] when the signature is absent or
    /// the stream is corrupt.
    fn decompress(&self, bytes: &[u8]) -> ClaimCheckResult<Vec<u8>>;
}

#[derive(Clone, Copy, Debug)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl CompressionCodec for GzipCodec {
    fn compress(&self, bytes: &[u8]) -> ClaimCheckResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2 + 32), self.level);
        encoder
            .write_all(bytes)
            .map_err(|err| ClaimCheckError::Format(format!("gzip compression failed: {err}")))?;
        encoder
            .finish()
            .map_err(|err| ClaimCheckError::Format(format!("gzip compression failed: {err}")))
    }

    fn is_compressed(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(&GZIP_MAGIC)
    }

    fn decompress(&self, bytes: &[u8]) -> ClaimCheckResult<Vec<u8>> {
        if !self.is_compressed(bytes) {
            return Err(ClaimCheckError::Format(
                "stream does not start with a gzip signature".to_string(),
            ));
        }
        let mut decoded = Vec::with_capacity(bytes.len() * 2);
        GzDecoder::new(bytes)
            .read_to_end(&mut decoded)
            .map_err(|err| ClaimCheckError::Format(format!("gzip decompression failed: {err}")))?;
        Ok(decoded)
    }
}

/// Closed set of payload encodings, selected by the declared type.
pub trait PayloadCodec: Sized {
    fn encode_payload(&self) -> ClaimCheckResult<Vec<u8>>;
    fn decode_payload(bytes: Vec<u8>) -> ClaimCheckResult<Self>;
}

impl PayloadCodec for String {
    fn encode_payload(&self) -> ClaimCheckResult<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode_payload(bytes: Vec<u8>) -> ClaimCheckResult<Self> {
        String::from_utf8(bytes)
            .map_err(|err| ClaimCheckError::Decode(format!("payload is not valid UTF-8: {err}")))
    }
}

impl PayloadCodec for Vec<u8> {
    fn encode_payload(&self) -> ClaimCheckResult<Vec<u8>> {
        Ok(self.clone())
    }

    fn decode_payload(bytes: Vec<u8>) -> ClaimCheckResult<Self> {
        Ok(bytes)
    }
}

/// Structured value encoded as JSON.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> PayloadCodec for Json<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode_payload(&self) -> ClaimCheckResult<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|err| ClaimCheckError::Serialization(err.to_string()))
    }

    fn decode_payload(bytes: Vec<u8>) -> ClaimCheckResult<Self> {
        serde_json::from_slice(&bytes)
            .map(Json)
            .map_err(|err| ClaimCheckError::Decode(err.to_string()))
    }
}

pub fn encode_value<T: PayloadCodec>(value: &T) -> ClaimCheckResult<Vec<u8>> {
    value.encode_payload()
}

pub fn decode_value<T: PayloadCodec>(bytes: Vec<u8>) -> ClaimCheckResult<T> {
    T::decode_payload(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn gzip_round_trip_and_signature() {
        let codec = GzipCodec::new();
        let raw = "abc".repeat(1_000).into_bytes();
        let compressed = codec.compress(&raw).expect("compress should succeed");

        assert!(codec.is_compressed(&compressed));
        assert!(!codec.is_compressed(&raw));
        assert!(compressed.len() < raw.len());
        assert_eq!(codec.decompress(&compressed).expect("decompress"), raw);
    }

    #[test]
    fn gzip_output_is_deterministic() {
        let codec = GzipCodec::with_level(6);
        let first = codec.compress(b"same input").expect("compress");
        let second = codec.compress(b"same input").expect("compress");
        assert_eq!(first, second);
    }

    #[test]
    fn decompress_without_signature_is_format_error() {
        let codec = GzipCodec::new();
        assert!(matches!(
            codec.decompress(b"plain text"),
            Err(ClaimCheckError::Format(_))
        ));
        assert!(matches!(codec.decompress(&[]), Err(ClaimCheckError::Format(_))));
    }

    #[test]
    fn decompress_with_bad_checksum_is_format_error() {
        let codec = GzipCodec::new();
        let mut compressed = codec.compress(&vec![7u8; 4_096]).expect("compress");
        let crc_offset = compressed.len() - 8;
        compressed[crc_offset] ^= 0xff;
        assert!(codec.is_compressed(&compressed));
        assert!(matches!(
            codec.decompress(&compressed),
            Err(ClaimCheckError::Format(_))
        ));
    }

    #[test]
    fn string_encodes_as_raw_utf8() {
        let encoded = encode_value(&"héllo".to_string()).expect("encode");
        assert_eq!(encoded, "héllo".as_bytes());
        let decoded: String = decode_value(encoded).expect("decode");
        assert_eq!(decoded, "héllo");
    }

    #[test]
    fn bytes_pass_through_unchanged() {
        let raw = vec![0u8, 159, 146, 150, 255];
        assert_eq!(encode_value(&raw).expect("encode"), raw);
        let decoded: Vec<u8> = decode_value(raw.clone()).expect("decode");
        assert_eq!(decoded, raw);
    }

    #[test]
    fn json_values_round_trip_and_strings_are_quoted() {
        let tags = Json(BTreeMap::from([
            ("key1".to_string(), "value1".to_string()),
            ("key2".to_string(), "value2".to_string()),
        ]));
        let encoded = encode_value(&tags).expect("encode");
        let decoded: Json<BTreeMap<String, String>> = decode_value(encoded).expect("decode");
        assert_eq!(decoded, tags);

        let quoted = encode_value(&Json("abc".to_string())).expect("encode");
        assert_eq!(quoted, b"\"abc\"");
    }

    #[test]
    fn decode_picks_branch_by_requested_type() {
        let bytes = b"\"abc\"".to_vec();
        let as_text: String = decode_value(bytes.clone()).expect("decode text");
        let as_json: Json<String> = decode_value(bytes).expect("decode json");
        assert_eq!(as_text, "\"abc\"");
        assert_eq!(as_json.into_inner(), "abc");
    }

    #[test]
    fn invalid_utf8_is_decode_error() {
        let result: ClaimCheckResult<String> = decode_value(vec![0xff, 0xfe]);
        assert!(matches!(result, Err(ClaimCheckError::Decode(_))));
    }
}
