use forge_blobstore::BlobStoreError;
use thiserror::Error;

/// Top-level error type for the forge-claimcheck crate.
#[derive(Debug, Error)]
pub enum ClaimCheckError {
    #[error(
        "payload of {size} bytes exceeds the inline limit of {limit} bytes and no blob store is configured"
    )]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("payload of {size} bytes exceeds the external storage limit of {limit} bytes")]
    UnsupportedSize { size: usize, limit: usize },
    #[error("session state of {size} bytes exceeded the termination threshold of {limit} bytes")]
    StateTooLarge { size: usize, limit: usize },
    #[error("invalid payload format: {0}")]
    Format(String),
    #[error("envelope declares compression type '{marker}' but content is not compressed")]
    CompressionMismatch { marker: String },
    #[error("envelope specifies an invalid compression type: '{0}'")]
    InvalidCompressionMarker(String),
    #[error("unable to decode payload: {0}")]
    Decode(String),
    #[error("a blob store is required to {0}")]
    ExternalStoreRequired(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("content hash mismatch for {key}: expected {expected}, found {actual}")]
    IntegrityMismatch {
        key: String,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Store(#[from] BlobStoreError),
}

pub type ClaimCheckResult<T> = Result<T, ClaimCheckError>;

impl ClaimCheckError {
    /// Conditions that will fail again for the same payload no matter how often
    /// the caller retries.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClaimCheckError::UnsupportedSize { .. } | ClaimCheckError::StateTooLarge { .. }
        )
    }

    /// Conditions that point at corrupted or foreign data rather than at the
    /// caller's configuration.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            ClaimCheckError::Format(_)
                | ClaimCheckError::CompressionMismatch { .. }
                | ClaimCheckError::InvalidCompressionMarker(_)
                | ClaimCheckError::Decode(_)
                | ClaimCheckError::IntegrityMismatch { .. }
                | ClaimCheckError::Store(BlobStoreError::MalformedKey { .. })
                | ClaimCheckError::Store(BlobStoreError::MalformedContainerName { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classes() {
        assert!(ClaimCheckError::StateTooLarge { size: 2, limit: 1 }.is_fatal());
        assert!(ClaimCheckError::UnsupportedSize { size: 2, limit: 1 }.is_fatal());
        assert!(!ClaimCheckError::PayloadTooLarge { size: 2, limit: 1 }.is_fatal());
        assert!(!ClaimCheckError::ExternalStoreRequired("load".to_string()).is_fatal());
    }

    #[test]
    fn malformed_key_from_store_counts_as_corruption() {
        let error = ClaimCheckError::from(BlobStoreError::MalformedKey {
            key: "nokey".to_string(),
            reason: "missing delimiter".to_string(),
        });
        assert!(error.is_corruption());
        assert!(!error.is_fatal());
        assert!(error.to_string().contains("nokey"));
    }

    #[test]
    fn store_not_found_is_neither_fatal_nor_corruption() {
        let error = ClaimCheckError::from(BlobStoreError::NotFound {
            resource: "blob",
            id: "blob-20150516|a".to_string(),
        });
        assert!(!error.is_fatal());
        assert!(!error.is_corruption());
    }
}
