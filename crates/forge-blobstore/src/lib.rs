pub mod fs;
pub mod keys;
pub mod memory;
pub mod store;
pub mod types;

pub use fs::FsBlobStore;
pub use keys::{
    BLOB_NAME_DELIMITER, CONTAINER_DELIMITER, DaySource, KEY_DELIMITER, build_key,
    build_message_storage_key, build_session_storage_key, build_storage_key, container_name,
    format_day_segment, is_container_expired, parse_day_segment, parse_key, validate_hub_name,
};
pub use memory::MemoryBlobStore;
pub use store::{BlobStore, BlobStoreError, BlobStoreResult};
pub use types::{BlobKind, ContainerName, OrchestrationInstance, ParsedKey, StorageKey};
