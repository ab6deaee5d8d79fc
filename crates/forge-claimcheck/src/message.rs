use crate::codec::{CompressionCodec, GzipCodec, PayloadCodec, decode_value, encode_value};
use crate::envelope::{CompressionMarker, Envelope};
use crate::errors::{ClaimCheckError, ClaimCheckResult};
use crate::settings::{ClaimCheckConfig, CompressionMode, CompressionSettings, MessageSettings};
use chrono::{DateTime, Utc};
use forge_blobstore::{BlobStore, DaySource, OrchestrationInstance};
use std::fmt;
use std::sync::Arc;

/// Identity and timing used to name an externalized message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageContext {
    pub instance: Option<OrchestrationInstance>,
    /// Only used to label diagnostics.
    pub message_type: Option<String>,
    /// Scheduled fire time; the key is bucketed under its date when set.
    pub fire_time: Option<DateTime<Utc>>,
}

impl MessageContext {
    pub fn for_instance(instance: OrchestrationInstance) -> Self {
        Self {
            instance: Some(instance),
            ..Self::default()
        }
    }

    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn with_fire_time(mut self, fire_time: DateTime<Utc>) -> Self {
        self.fire_time = Some(fire_time);
        self
    }
}

/// Decides inline vs compressed vs externalized for outbound messages and
/// reverses that decision on receipt.
#[derive(Clone)]
pub struct MessageConverter {
    compression: CompressionSettings,
    limits: MessageSettings,
    store: Option<Arc<dyn BlobStore>>,
    codec: Arc<dyn CompressionCodec>,
}

impl fmt::Debug for MessageConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageConverter")
            .field("compression", &self.compression)
            .field("limits", &self.limits)
            .field("has_store", &self.store.is_some())
            .field("codec", &self.codec)
            .finish()
    }
}

impl MessageConverter {
    pub fn new(compression: CompressionSettings, limits: MessageSettings) -> Self {
        Self {
            compression,
            limits,
            store: None,
            codec: Arc::new(GzipCodec::default()),
        }
    }

    pub fn from_config(config: &ClaimCheckConfig) -> Self {
        Self::new(config.compression, config.message)
    }

    pub fn with_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn CompressionCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn compression(&self) -> CompressionSettings {
        self.compression
    }

    pub fn limits(&self) -> MessageSettings {
        self.limits
    }

    pub async fn to_envelope<T: PayloadCodec>(
        &self,
        value: &T,
        context: &MessageContext,
    ) -> ClaimCheckResult<Envelope> {
        let session_id = context.instance.as_ref().map(|i| i.instance_id.clone());

        if self.compression.mode == CompressionMode::Legacy {
            return Ok(Envelope::legacy(encode_value(value)?).with_session_id(session_id));
        }

        let raw = encode_value(value)?;
        let raw_size = raw.len();
        let (payload, marker) = if self.compression.should_compress(raw_size) {
            let compressed = self.codec.compress(&raw)?;
            tracing::debug!(
                message_type = context.message_type.as_deref().unwrap_or_default(),
                instance_id = session_id.as_deref().unwrap_or_default(),
                raw_size,
                compressed_size = compressed.len(),
                "message compression stats"
            );
            (compressed, CompressionMarker::Gzip)
        } else {
            (raw, CompressionMarker::None)
        };

        let size = payload.len();
        if size < self.limits.max_inline_bytes {
            return Ok(Envelope::inline(payload, marker).with_session_id(session_id));
        }
        if size >= self.limits.max_external_bytes {
            return Err(ClaimCheckError::UnsupportedSize {
                size,
                limit: self.limits.max_external_bytes,
            });
        }
        let Some(store) = self.store.as_ref() else {
            return Err(ClaimCheckError::PayloadTooLarge {
                size,
                limit: self.limits.max_inline_bytes,
            });
        };

        let key = store.build_message_storage_key(
            context.instance.as_ref(),
            DaySource::from(context.fire_time),
        )?;
        tracing::info!(storage_key = %key, size, %marker, "externalizing message payload");
        store.save(&key, &payload).await?;
        Ok(Envelope::external(key, marker).with_session_id(session_id))
    }

    pub async fn from_envelope<T: PayloadCodec>(&self, envelope: &Envelope) -> ClaimCheckResult<T> {
        let Some(compression_type) = envelope.compression_type() else {
            let body = envelope.body.clone().ok_or_else(|| {
                ClaimCheckError::Decode("legacy envelope carries no body".to_string())
            })?;
            return decode_value(body);
        };
        let marker = CompressionMarker::parse(compression_type).ok_or_else(|| {
            ClaimCheckError::InvalidCompressionMarker(compression_type.to_string())
        })?;

        let bytes = self.load_payload(envelope).await?;
        match marker {
            CompressionMarker::None => decode_value(bytes),
            CompressionMarker::Gzip => {
                if !self.codec.is_compressed(&bytes) {
                    return Err(ClaimCheckError::CompressionMismatch {
                        marker: compression_type.to_string(),
                    });
                }
                decode_value(self.codec.decompress(&bytes)?)
            }
        }
    }

    async fn load_payload(&self, envelope: &Envelope) -> ClaimCheckResult<Vec<u8>> {
        if envelope.body.is_some() && envelope.storage_key().is_some() {
            return Err(ClaimCheckError::Format(
                "envelope carries both a body and a storage key".to_string(),
            ));
        }
        let Some(key) = envelope.storage_key() else {
            return envelope.body.clone().ok_or_else(|| {
                ClaimCheckError::Decode(
                    "envelope carries neither a body nor a storage key".to_string(),
                )
            });
        };
        let Some(store) = self.store.as_ref() else {
            return Err(ClaimCheckError::ExternalStoreRequired(format!(
                "load the message payload stored under '{key}'"
            )));
        };
        Ok(store.load(key).await?)
    }
}
