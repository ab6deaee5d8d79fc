use crate::keys::{self, CONTAINER_DELIMITER};
use crate::store::{BlobStore, BlobStoreError, BlobStoreResult};
use crate::types::ContainerName;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    containers: BTreeMap<ContainerName, BTreeMap<String, Vec<u8>>>,
}

/// In-process [`BlobStore`] that keeps the same container layout as the
/// filesystem backend.
#[derive(Clone, Debug)]
pub struct MemoryBlobStore {
    hub_name: String,
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryBlobStore {
    pub fn new(hub_name: impl Into<String>) -> BlobStoreResult<Self> {
        let hub_name = hub_name.into();
        keys::validate_hub_name(&hub_name)?;
        Ok(Self {
            hub_name,
            inner: Arc::new(Mutex::new(MemoryState::default())),
        })
    }

    pub fn hub_name(&self) -> &str {
        &self.hub_name
    }

    /// Container names currently holding at least one blob, sorted.
    pub fn container_names(&self) -> BlobStoreResult<Vec<ContainerName>> {
        let state = self.lock()?;
        Ok(state.containers.keys().cloned().collect())
    }

    pub fn blob_count(&self) -> BlobStoreResult<usize> {
        let state = self.lock()?;
        Ok(state.containers.values().map(BTreeMap::len).sum())
    }

    fn lock(&self) -> BlobStoreResult<MutexGuard<'_, MemoryState>> {
        self.inner
            .lock()
            .map_err(|_| BlobStoreError::Backend("memory blobstore mutex poisoned".to_string()))
    }

    fn owns_container(&self, container_name: &str) -> bool {
        container_name
            .strip_prefix(self.hub_name.as_str())
            .is_some_and(|rest| rest.starts_with(CONTAINER_DELIMITER))
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> BlobStoreResult<()> {
        let parsed = keys::parse_key(key)?;
        let container = keys::container_name(&self.hub_name, &parsed.container_suffix);
        let mut state = self.lock()?;
        state
            .containers
            .entry(container)
            .or_default()
            .insert(parsed.blob_name, bytes.to_vec());
        Ok(())
    }

    async fn load(&self, key: &str) -> BlobStoreResult<Vec<u8>> {
        let parsed = keys::parse_key(key)?;
        let container = keys::container_name(&self.hub_name, &parsed.container_suffix);
        let state = self.lock()?;
        state
            .containers
            .get(&container)
            .and_then(|blobs| blobs.get(&parsed.blob_name))
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound {
                resource: "blob",
                id: key.to_string(),
            })
    }

    async fn purge_expired(&self, threshold: NaiveDate) -> BlobStoreResult<usize> {
        let mut state = self.lock()?;
        let mut expired = Vec::new();
        for name in state.containers.keys() {
            if self.owns_container(name) && keys::is_container_expired(name, threshold)? {
                expired.push(name.clone());
            }
        }
        for name in &expired {
            state.containers.remove(name);
            tracing::info!(container = %name, "purged expired container");
        }
        Ok(expired.len())
    }

    async fn delete_all(&self) -> BlobStoreResult<usize> {
        let mut state = self.lock()?;
        let before = state.containers.len();
        state.containers.clear();
        Ok(before)
    }
}
