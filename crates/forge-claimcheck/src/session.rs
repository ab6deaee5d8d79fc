//! Session (runtime) state persistence.
//!
//! Encoding always serializes the whole history. The result is rejected when
//! it exceeds the termination ceiling and moved to the blob store when it
//! exceeds the external threshold, leaving a stub record in its place.
//!
//! Decoding accepts, in priority order:
//! 1. the session record `{"events": [...], "storage_key": "..."}`,
//! 2. the older runtime-state object (extra fields ignored, events kept),
//! 3. a bare JSON array of events.
//!
//! Any of them may be gzip-compressed.

use crate::codec::{CompressionCodec, GzipCodec};
use crate::errors::{ClaimCheckError, ClaimCheckResult};
use crate::history::{HistoryEvent, RuntimeState};
use crate::settings::{ClaimCheckConfig, SessionSettings};
use forge_blobstore::BlobStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Serialize)]
struct SessionStateRecordRef<'a> {
    events: &'a [HistoryEvent],
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_key: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionStateRecord {
    events: Vec<HistoryEvent>,
    #[serde(default)]
    storage_key: Option<String>,
}

#[derive(Deserialize)]
struct LegacyRuntimeState {
    events: Vec<HistoryEvent>,
}

/// Which historical encoding a state blob was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFormat {
    SessionRecord,
    RuntimeState,
    EventList,
}

impl StateFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            StateFormat::SessionRecord => "session_record",
            StateFormat::RuntimeState => "runtime_state",
            StateFormat::EventList => "event_list",
        }
    }
}

impl fmt::Display for StateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded blob, before any stub indirection is followed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedLayer {
    pub format: StateFormat,
    pub events: Vec<HistoryEvent>,
    /// Set when the blob is a stub for externally stored state.
    pub storage_key: Option<String>,
    pub compressed: bool,
}

/// Bytes to persist inline plus the bookkeeping of how they were produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedState {
    pub bytes: Vec<u8>,
    /// Serialized size of the full state before compression.
    pub raw_size: usize,
    /// Size of the full state as checked against the thresholds.
    pub compressed_size: usize,
    /// Key of the externally stored state when `bytes` is a stub.
    pub storage_key: Option<String>,
}

impl EncodedState {
    pub fn is_stub(&self) -> bool {
        self.storage_key.is_some()
    }
}

#[derive(Clone)]
pub struct RuntimeStateConverter {
    settings: SessionSettings,
    compress: bool,
    store: Option<Arc<dyn BlobStore>>,
    codec: Arc<dyn CompressionCodec>,
}

impl fmt::Debug for RuntimeStateConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeStateConverter")
            .field("settings", &self.settings)
            .field("compress", &self.compress)
            .field("has_store", &self.store.is_some())
            .field("codec", &self.codec)
            .finish()
    }
}

impl RuntimeStateConverter {
    pub fn new(settings: SessionSettings, compress: bool) -> Self {
        Self {
            settings,
            compress,
            store: None,
            codec: Arc::new(GzipCodec::default()),
        }
    }

    pub fn from_config(config: &ClaimCheckConfig) -> Self {
        Self::new(config.session, config.compress_session_state)
    }

    pub fn with_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn CompressionCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub async fn encode(
        &self,
        state: &RuntimeState,
        session_id: &str,
    ) -> ClaimCheckResult<EncodedState> {
        let (bytes, raw_size) = self.serialize(&SessionStateRecordRef {
            events: &state.events,
            storage_key: None,
        })?;
        let compressed_size = bytes.len();
        tracing::info!(
            session_id,
            raw_size,
            compressed_size,
            events = state.len(),
            "serialized session state"
        );

        if compressed_size > self.settings.termination_threshold_bytes {
            return Err(ClaimCheckError::StateTooLarge {
                size: compressed_size,
                limit: self.settings.termination_threshold_bytes,
            });
        }
        if compressed_size <= self.settings.external_storage_threshold_bytes {
            return Ok(EncodedState {
                bytes,
                raw_size,
                compressed_size,
                storage_key: None,
            });
        }

        let Some(store) = self.store.as_ref() else {
            return Err(ClaimCheckError::ExternalStoreRequired(format!(
                "hold session state of {compressed_size} bytes (external threshold {} bytes)",
                self.settings.external_storage_threshold_bytes
            )));
        };
        let key = store.build_session_storage_key(session_id)?;
        let sentinel = [HistoryEvent::sentinel()];
        let (stub, _) = self.serialize(&SessionStateRecordRef {
            events: &sentinel,
            storage_key: Some(&key),
        })?;
        store.save(&key, &bytes).await?;
        tracing::info!(session_id, storage_key = %key, compressed_size, "externalized session state");

        Ok(EncodedState {
            bytes: stub,
            raw_size,
            compressed_size,
            storage_key: Some(key),
        })
    }

    /// Empty input is a session with no history yet.
    pub async fn decode(&self, bytes: &[u8], session_id: &str) -> ClaimCheckResult<RuntimeState> {
        let Some(layer) = self.decode_layer(bytes, session_id)? else {
            tracing::info!(session_id, "no session state exists, starting a new one");
            return Ok(RuntimeState::default());
        };
        let Some(key) = layer.storage_key else {
            return Ok(RuntimeState::new(layer.events));
        };

        let Some(store) = self.store.as_ref() else {
            return Err(ClaimCheckError::ExternalStoreRequired(format!(
                "load the session state stored under '{key}'"
            )));
        };
        let external = store.load(&key).await?;
        match self.decode_layer(&external, session_id)? {
            Some(DecodedLayer {
                storage_key: Some(nested),
                ..
            }) => Err(ClaimCheckError::Decode(format!(
                "session state under '{key}' is itself a stub pointing at '{nested}'"
            ))),
            Some(inner) => Ok(RuntimeState::new(inner.events)),
            None => Err(ClaimCheckError::Decode(format!(
                "session state under '{key}' is empty"
            ))),
        }
    }

    /// Decodes a single blob without following a stub's storage key.
    pub fn decode_layer(
        &self,
        bytes: &[u8],
        session_id: &str,
    ) -> ClaimCheckResult<Option<DecodedLayer>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let compressed = self.codec.is_compressed(bytes);
        let decompressed;
        let text = if compressed {
            decompressed = self.codec.decompress(bytes)?;
            decompressed.as_slice()
        } else {
            bytes
        };
        tracing::debug!(
            session_id,
            stored_size = bytes.len(),
            size = text.len(),
            "read session state"
        );

        let (format, events, storage_key) = decode_with_fallback(text, session_id)?;
        Ok(Some(DecodedLayer {
            format,
            events,
            storage_key,
            compressed,
        }))
    }

    fn serialize<S: Serialize>(&self, record: &S) -> ClaimCheckResult<(Vec<u8>, usize)> {
        let raw = serde_json::to_vec(record)
            .map_err(|err| ClaimCheckError::Serialization(err.to_string()))?;
        let raw_size = raw.len();
        if self.compress {
            Ok((self.codec.compress(&raw)?, raw_size))
        } else {
            Ok((raw, raw_size))
        }
    }
}

type Decoded = (StateFormat, Vec<HistoryEvent>, Option<String>);

fn decode_with_fallback(bytes: &[u8], session_id: &str) -> ClaimCheckResult<Decoded> {
    match serde_json::from_slice::<SessionStateRecord>(bytes) {
        Ok(record) => {
            let storage_key = record.storage_key.filter(|key| !key.trim().is_empty());
            return Ok((StateFormat::SessionRecord, record.events, storage_key));
        }
        Err(err) => {
            tracing::warn!(session_id, error = %err, "session state is not a session record");
        }
    }

    match serde_json::from_slice::<LegacyRuntimeState>(bytes) {
        Ok(state) => return Ok((StateFormat::RuntimeState, state.events, None)),
        Err(err) => {
            tracing::warn!(session_id, error = %err, "session state is not a runtime state");
        }
    }

    serde_json::from_slice::<Vec<HistoryEvent>>(bytes)
        .map(|events| (StateFormat::EventList, events, None))
        .map_err(|err| {
            ClaimCheckError::Decode(format!(
                "session state for '{session_id}' matches no known format: {err}"
            ))
        })
}
