use crate::keys::{self, DaySource};
use crate::types::OrchestrationInstance;
use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("resource not found: {resource} ({id})")]
    NotFound { resource: &'static str, id: String },

    #[error("malformed storage key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },

    #[error("malformed container name '{container_name}': {reason}")]
    MalformedContainerName {
        container_name: String,
        reason: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

pub type BlobStoreResult<T> = Result<T, BlobStoreError>;

/// Key/value byte store addressed by day-bucketed storage keys.
///
/// Keys are produced by the `build_*` methods, whose defaults delegate to
/// [`crate::keys`]. Backends are expected to map the key's container suffix
/// to a coarse container named `<hub>-<suffix>` so retention can drop whole
/// days at once.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// `blob-<day>|<id>` for ad-hoc values.
    fn build_storage_key(&self, created: DaySource) -> BlobStoreResult<String> {
        keys::build_storage_key(created)
    }

    /// `message-<day>|<instance>/<execution>/<id>`, bucketed by fire time when known.
    fn build_message_storage_key(
        &self,
        instance: Option<&OrchestrationInstance>,
        fire_time: DaySource,
    ) -> BlobStoreResult<String> {
        keys::build_message_storage_key(instance, fire_time)
    }

    /// `session-<today>|<session>/<id>`.
    fn build_session_storage_key(&self, session_id: &str) -> BlobStoreResult<String> {
        keys::build_session_storage_key(session_id)
    }

    async fn save(&self, key: &str, bytes: &[u8]) -> BlobStoreResult<()>;

    async fn load(&self, key: &str) -> BlobStoreResult<Vec<u8>>;

    /// Deletes every container of this hub dated strictly before `threshold`.
    /// Returns the number of containers removed.
    async fn purge_expired(&self, threshold: NaiveDate) -> BlobStoreResult<usize>;

    /// Deletes every container of this hub.
    async fn delete_all(&self) -> BlobStoreResult<usize>;
}
