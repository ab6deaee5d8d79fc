use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const COMPRESSION_TYPE_PROPERTY: &str = "CompressionType";
pub const MESSAGE_STORAGE_KEY_PROPERTY: &str = "MessageStorageKey";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMarker {
    None,
    Gzip,
}

impl CompressionMarker {
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionMarker::None => "none",
            CompressionMarker::Gzip => "gzip",
        }
    }

    /// Case-insensitive; `None` for anything that is not a known marker.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("none") {
            Some(CompressionMarker::None)
        } else if value.eq_ignore_ascii_case("gzip") {
            Some(CompressionMarker::Gzip)
        } else {
            None
        }
    }
}

impl fmt::Display for CompressionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport message as seen by the claim-check layer: string metadata
/// properties plus an optional body.
///
/// Constructors keep exactly one of `body` and the storage-key property set.
/// An envelope without a compression property is a legacy message whose body
/// is the encoded value itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
}

impl Envelope {
    pub fn legacy(body: Vec<u8>) -> Self {
        Self {
            session_id: None,
            properties: BTreeMap::new(),
            body: Some(body),
        }
    }

    pub fn inline(body: Vec<u8>, marker: CompressionMarker) -> Self {
        Self {
            session_id: None,
            properties: BTreeMap::from([(
                COMPRESSION_TYPE_PROPERTY.to_string(),
                marker.as_str().to_string(),
            )]),
            body: Some(body),
        }
    }

    pub fn external(storage_key: String, marker: CompressionMarker) -> Self {
        Self {
            session_id: None,
            properties: BTreeMap::from([
                (
                    COMPRESSION_TYPE_PROPERTY.to_string(),
                    marker.as_str().to_string(),
                ),
                (MESSAGE_STORAGE_KEY_PROPERTY.to_string(), storage_key),
            ]),
            body: None,
        }
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Raw compression property; `None` or empty means legacy.
    pub fn compression_type(&self) -> Option<&str> {
        self.properties
            .get(COMPRESSION_TYPE_PROPERTY)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn storage_key(&self) -> Option<&str> {
        self.properties
            .get(MESSAGE_STORAGE_KEY_PROPERTY)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn is_legacy(&self) -> bool {
        self.compression_type().is_none()
    }

    pub fn is_external(&self) -> bool {
        self.storage_key().is_some()
    }

    /// Bytes carried by the envelope itself, excluding properties.
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Vec::len)
    }
}
