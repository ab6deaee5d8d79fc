use crate::errors::{ClaimCheckError, ClaimCheckResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * KIB;

pub const DEFAULT_COMPRESSION_THRESHOLD_BYTES: usize = 32 * KIB;
pub const DEFAULT_MAX_INLINE_MESSAGE_BYTES: usize = 170 * KIB;
pub const DEFAULT_MAX_EXTERNAL_MESSAGE_BYTES: usize = 10 * MIB;
pub const DEFAULT_SESSION_EXTERNAL_STORAGE_THRESHOLD_BYTES: usize = 230 * KIB;
pub const DEFAULT_SESSION_TERMINATION_THRESHOLD_BYTES: usize = 10 * MIB;

pub const ENV_PREFIX: &str = "FORGE_CLAIMCHECK_";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
    /// Value goes out inline with no compression marker, for consumers that
    /// predate compression and externalization.
    Legacy,
    #[default]
    Never,
    Always,
    Threshold,
}

impl CompressionMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "legacy" => Some(Self::Legacy),
            "never" => Some(Self::Never),
            "always" => Some(Self::Always),
            "threshold" | "threshold_based" => Some(Self::Threshold),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub mode: CompressionMode,
    /// Raw size above which [`CompressionMode::Threshold`] compresses.
    pub threshold_bytes: usize,
}

impl CompressionSettings {
    pub fn new(mode: CompressionMode, threshold_bytes: usize) -> Self {
        Self {
            mode,
            threshold_bytes,
        }
    }

    pub fn should_compress(&self, raw_size: usize) -> bool {
        match self.mode {
            CompressionMode::Always => true,
            CompressionMode::Threshold => raw_size > self.threshold_bytes,
            CompressionMode::Never | CompressionMode::Legacy => false,
        }
    }
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            mode: CompressionMode::default(),
            threshold_bytes: DEFAULT_COMPRESSION_THRESHOLD_BYTES,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSettings {
    /// Largest final (possibly compressed) payload sent inline, exclusive.
    pub max_inline_bytes: usize,
    /// Largest payload accepted for external storage, exclusive.
    pub max_external_bytes: usize,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            max_inline_bytes: DEFAULT_MAX_INLINE_MESSAGE_BYTES,
            max_external_bytes: DEFAULT_MAX_EXTERNAL_MESSAGE_BYTES,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub external_storage_threshold_bytes: usize,
    pub termination_threshold_bytes: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            external_storage_threshold_bytes: DEFAULT_SESSION_EXTERNAL_STORAGE_THRESHOLD_BYTES,
            termination_threshold_bytes: DEFAULT_SESSION_TERMINATION_THRESHOLD_BYTES,
        }
    }
}

/// All size and compression knobs, read once and handed to converters by value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimCheckConfig {
    pub compression: CompressionSettings,
    pub message: MessageSettings,
    pub session: SessionSettings,
    /// Whether session state is gzip-compressed before the size checks.
    pub compress_session_state: bool,
}

impl ClaimCheckConfig {
    pub fn from_json_path(path: &Path) -> ClaimCheckResult<Self> {
        let raw = std::fs::read(path).map_err(|err| {
            ClaimCheckError::InvalidConfiguration(format!(
                "failed reading config '{}': {err}",
                path.display()
            ))
        })?;
        let config: Self = serde_json::from_slice(&raw).map_err(|err| {
            ClaimCheckError::InvalidConfiguration(format!(
                "failed parsing config '{}': {err}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `FORGE_CLAIMCHECK_*` process environment variables.
    pub fn from_env() -> ClaimCheckResult<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies `FORGE_CLAIMCHECK_*` overrides resolved through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> ClaimCheckResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(value) = var("COMPRESSION_MODE") {
            self.compression.mode = CompressionMode::parse(&value).ok_or_else(|| {
                ClaimCheckError::InvalidConfiguration(format!(
                    "{ENV_PREFIX}COMPRESSION_MODE: unknown mode '{value}'"
                ))
            })?;
        }
        apply_size(&var, "COMPRESSION_THRESHOLD_BYTES", &mut self.compression.threshold_bytes)?;
        apply_size(&var, "MAX_INLINE_MESSAGE_BYTES", &mut self.message.max_inline_bytes)?;
        apply_size(&var, "MAX_EXTERNAL_MESSAGE_BYTES", &mut self.message.max_external_bytes)?;
        apply_size(
            &var,
            "SESSION_EXTERNAL_STORAGE_THRESHOLD_BYTES",
            &mut self.session.external_storage_threshold_bytes,
        )?;
        apply_size(
            &var,
            "SESSION_TERMINATION_THRESHOLD_BYTES",
            &mut self.session.termination_threshold_bytes,
        )?;
        if let Some(value) = var("COMPRESS_SESSION_STATE") {
            self.compress_session_state = parse_bool(&value).ok_or_else(|| {
                ClaimCheckError::InvalidConfiguration(format!(
                    "{ENV_PREFIX}COMPRESS_SESSION_STATE: expected true/false, got '{value}'"
                ))
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ClaimCheckResult<()> {
        if self.message.max_inline_bytes == 0 {
            return Err(ClaimCheckError::InvalidConfiguration(
                "message.max_inline_bytes must be greater than zero".to_string(),
            ));
        }
        if self.message.max_inline_bytes >= self.message.max_external_bytes {
            return Err(ClaimCheckError::InvalidConfiguration(format!(
                "message.max_inline_bytes ({}) must be below message.max_external_bytes ({})",
                self.message.max_inline_bytes, self.message.max_external_bytes
            )));
        }
        if self.session.external_storage_threshold_bytes >= self.session.termination_threshold_bytes
        {
            return Err(ClaimCheckError::InvalidConfiguration(format!(
                "session.external_storage_threshold_bytes ({}) must be below session.termination_threshold_bytes ({})",
                self.session.external_storage_threshold_bytes,
                self.session.termination_threshold_bytes
            )));
        }
        Ok(())
    }
}

fn apply_size<F>(var: &F, suffix: &str, target: &mut usize) -> ClaimCheckResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = var(suffix) else {
        return Ok(());
    };
    *target = value.trim().parse::<usize>().map_err(|err| {
        ClaimCheckError::InvalidConfiguration(format!("{ENV_PREFIX}{suffix}: '{value}': {err}"))
    })?;
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_limits() {
        let config = ClaimCheckConfig::default();
        assert_eq!(config.message.max_inline_bytes, 170 * 1024);
        assert_eq!(config.message.max_external_bytes, 10 * 1024 * 1024);
        assert_eq!(config.session.external_storage_threshold_bytes, 230 * 1024);
        assert_eq!(config.session.termination_threshold_bytes, 10 * 1024 * 1024);
        assert_eq!(config.compression.mode, CompressionMode::Never);
        assert!(!config.compress_session_state);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_compress_by_mode() {
        let threshold = CompressionSettings::new(CompressionMode::Threshold, 10);
        assert!(!threshold.should_compress(10));
        assert!(threshold.should_compress(11));
        assert!(CompressionSettings::new(CompressionMode::Always, 10).should_compress(0));
        assert!(!CompressionSettings::new(CompressionMode::Never, 10).should_compress(1_000));
        assert!(!CompressionSettings::new(CompressionMode::Legacy, 10).should_compress(1_000));
    }

    #[test]
    fn env_overrides_apply_on_top_of_defaults() {
        let vars = HashMap::from([
            ("FORGE_CLAIMCHECK_COMPRESSION_MODE", "threshold"),
            ("FORGE_CLAIMCHECK_COMPRESSION_THRESHOLD_BYTES", "2048"),
            ("FORGE_CLAIMCHECK_MAX_INLINE_MESSAGE_BYTES", "1024"),
            ("FORGE_CLAIMCHECK_COMPRESS_SESSION_STATE", "true"),
        ]);
        let config = ClaimCheckConfig::default()
            .with_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .expect("overrides should apply");

        assert_eq!(config.compression.mode, CompressionMode::Threshold);
        assert_eq!(config.compression.threshold_bytes, 2048);
        assert_eq!(config.message.max_inline_bytes, 1024);
        assert_eq!(config.message.max_external_bytes, 10 * 1024 * 1024);
        assert!(config.compress_session_state);
    }

    #[test]
    fn env_overrides_reject_garbage() {
        let bad_mode = ClaimCheckConfig::default().with_overrides(|name| {
            (name == "FORGE_CLAIMCHECK_COMPRESSION_MODE").then(|| "sometimes".to_string())
        });
        assert!(matches!(bad_mode, Err(ClaimCheckError::InvalidConfiguration(_))));

        let bad_size = ClaimCheckConfig::default().with_overrides(|name| {
            (name == "FORGE_CLAIMCHECK_MAX_INLINE_MESSAGE_BYTES").then(|| "-5".to_string())
        });
        assert!(matches!(bad_size, Err(ClaimCheckError::InvalidConfiguration(_))));
    }

    #[test]
    fn validate_rejects_inverted_limits() {
        let mut config = ClaimCheckConfig::default();
        config.message.max_inline_bytes = config.message.max_external_bytes;
        assert!(config.validate().is_err());

        let mut config = ClaimCheckConfig::default();
        config.session.external_storage_threshold_bytes = 20 * 1024 * 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_config_fills_missing_fields_with_defaults() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let path = tmp.path().join("claimcheck.json");
        std::fs::write(
            &path,
            r#"{"compression":{"mode":"always"},"session":{"external_storage_threshold_bytes":2048,"termination_threshold_bytes":10240}}"#,
        )
        .expect("config should be written");

        let config = ClaimCheckConfig::from_json_path(&path).expect("config should load");
        assert_eq!(config.compression.mode, CompressionMode::Always);
        assert_eq!(
            config.compression.threshold_bytes,
            DEFAULT_COMPRESSION_THRESHOLD_BYTES
        );
        assert_eq!(config.session.external_storage_threshold_bytes, 2048);
        assert_eq!(config.message, MessageSettings::default());
    }
}
