use crate::codec::{PayloadCodec, decode_value, encode_value};
use crate::errors::{ClaimCheckError, ClaimCheckResult};
use chrono::{DateTime, Utc};
use forge_blobstore::{BlobStore, DaySource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub const CONTENT_HASH_METADATA_KEY: &str = "content_hash";
pub const CONTENT_LENGTH_METADATA_KEY: &str = "content_length";

/// Typed reference to a value stored unconditionally in the blob store.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ExternalBlob<T> {
    pub storage_key: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip)]
    marker: PhantomData<fn() -> T>,
}

impl<T> ExternalBlob<T> {
    pub fn new(storage_key: impl Into<String>) -> Self {
        Self {
            storage_key: storage_key.into(),
            metadata: BTreeMap::new(),
            marker: PhantomData,
        }
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.metadata
            .get(CONTENT_HASH_METADATA_KEY)
            .map(String::as_str)
    }
}

impl<T> Clone for ExternalBlob<T> {
    fn clone(&self) -> Self {
        Self {
            storage_key: self.storage_key.clone(),
            metadata: self.metadata.clone(),
            marker: PhantomData,
        }
    }
}

impl<T> PartialEq for ExternalBlob<T> {
    fn eq(&self, other: &Self) -> bool {
        self.storage_key == other.storage_key && self.metadata == other.metadata
    }
}

impl<T> Eq for ExternalBlob<T> {}

impl<T> fmt::Debug for ExternalBlob<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalBlob")
            .field("storage_key", &self.storage_key)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Writes any value through the blob store, with no size policy.
#[derive(Clone)]
pub struct BlobHelper {
    store: Arc<dyn BlobStore>,
}

impl BlobHelper {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Keys under the date of `created`, or today when unset.
    pub async fn save<T: PayloadCodec>(
        &self,
        value: &T,
        created: Option<DateTime<Utc>>,
    ) -> ClaimCheckResult<ExternalBlob<T>> {
        self.save_with_metadata(value, created, BTreeMap::new())
            .await
    }

    pub async fn save_with_metadata<T: PayloadCodec>(
        &self,
        value: &T,
        created: Option<DateTime<Utc>>,
        mut metadata: BTreeMap<String, String>,
    ) -> ClaimCheckResult<ExternalBlob<T>> {
        let bytes = encode_value(value)?;
        let key = self.store.build_storage_key(DaySource::from(created))?;
        metadata.insert(
            CONTENT_HASH_METADATA_KEY.to_string(),
            blake3::hash(&bytes).to_hex().to_string(),
        );
        metadata.insert(
            CONTENT_LENGTH_METADATA_KEY.to_string(),
            bytes.len().to_string(),
        );
        self.store.save(&key, &bytes).await?;
        tracing::debug!(storage_key = %key, size = bytes.len(), "stored external blob");

        let mut blob = ExternalBlob::new(key);
        blob.metadata = metadata;
        Ok(blob)
    }

    /// Verifies the recorded content hash, when present, before decoding.
    pub async fn load<T: PayloadCodec>(&self, blob: &ExternalBlob<T>) -> ClaimCheckResult<T> {
        let bytes = self.store.load(&blob.storage_key).await?;
        if let Some(expected) = blob.content_hash() {
            let actual = blake3::hash(&bytes).to_hex().to_string();
            if actual != expected {
                return Err(ClaimCheckError::IntegrityMismatch {
                    key: blob.storage_key.clone(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        decode_value(bytes)
    }
}
