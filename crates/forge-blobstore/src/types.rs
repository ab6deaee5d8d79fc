use serde::{Deserialize, Serialize};
use std::fmt;

pub type StorageKey = String;
pub type ContainerName = String;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrchestrationInstance {
    pub instance_id: String,
    pub execution_id: String,
}

impl OrchestrationInstance {
    pub fn new(instance_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            execution_id: execution_id.into(),
        }
    }
}

/// Logical kind encoded as the first segment of a storage key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobKind {
    Blob,
    Message,
    Session,
}

impl BlobKind {
    pub const ALL: [BlobKind; 3] = [BlobKind::Blob, BlobKind::Message, BlobKind::Session];

    pub fn as_str(self) -> &'static str {
        match self {
            BlobKind::Blob => "blob",
            BlobKind::Message => "message",
            BlobKind::Session => "session",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A storage key split on its first `|`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedKey {
    /// `<kind>-<yyyymmdd>`; the container is `<hub>-<container_suffix>`.
    pub container_suffix: String,
    pub blob_name: String,
}
