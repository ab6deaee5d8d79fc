//! Claim-check payload handling for orchestration messages and session state.
//!
//! Small payloads travel inline, optionally gzip-compressed. Large payloads
//! are written to a [`forge_blobstore::BlobStore`] and replaced by a storage
//! key. Session state gets a hard size ceiling and a decoder that still reads
//! every historical state encoding.

pub mod blob;
pub mod codec;
pub mod envelope;
pub mod errors;
pub mod history;
pub mod message;
pub mod session;
pub mod settings;

pub use blob::{BlobHelper, ExternalBlob};
pub use codec::{
    CompressionCodec, GZIP_MAGIC, GzipCodec, Json, PayloadCodec, decode_value, encode_value,
};
pub use envelope::{
    COMPRESSION_TYPE_PROPERTY, CompressionMarker, Envelope, MESSAGE_STORAGE_KEY_PROPERTY,
};
pub use errors::{ClaimCheckError, ClaimCheckResult};
pub use history::{HistoryEvent, OrchestrationStatus, RuntimeState, SENTINEL_EVENT_ID};
pub use message::{MessageContext, MessageConverter};
pub use session::{DecodedLayer, EncodedState, RuntimeStateConverter, StateFormat};
pub use settings::{
    ClaimCheckConfig, CompressionMode, CompressionSettings, ENV_PREFIX, MessageSettings,
    SessionSettings,
};
