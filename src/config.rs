use crate::error::{ReaderError, Result};
use crate::types::{CardProtocol, CardShareMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings of a PC/SC backed reader.
///
/// Every field has a default, so a config file only lists what it changes:
///
/// ```toml
/// reader_name_filter = "ACR122"
/// protocol = "any"
/// detection_timeout_ms = 30000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Case-insensitive substring of the reader name. `"*"` or empty picks the first reader.
    pub reader_name_filter: String,
    pub protocol: CardProtocol,
    pub share_mode: CardShareMode,
    pub scan_message: String,
    /// Name reported until a physical reader has been selected.
    pub name: String,
    pub poll_interval_ms: u64,
    pub detection_timeout_ms: Option<u64>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            reader_name_filter: "*".to_string(),
            protocol: CardProtocol::default(),
            share_mode: CardShareMode::default(),
            scan_message: String::new(),
            name: "PCSC".to_string(),
            poll_interval_ms: 500,
            detection_timeout_ms: None,
        }
    }
}

impl ReaderConfig {
    pub fn with_filter(reader_name_filter: impl Into<String>) -> Self {
        Self {
            reader_name_filter: reader_name_filter.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ReaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: ReaderConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a `.json` file as JSON, anything else as TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(ReaderError::config("poll_interval_ms must be greater than 0"));
        }
        if self.detection_timeout_ms == Some(0) {
            return Err(ReaderError::config(
                "detection_timeout_ms must be greater than 0 when set",
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn detection_timeout(&self) -> Option<Duration> {
        self.detection_timeout_ms.map(Duration::from_millis)
    }

    /// True when the filter should pick the first reader found.
    pub fn matches_any_reader(&self) -> bool {
        self.reader_name_filter.is_empty() || self.reader_name_filter == "*"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ReaderConfig::from_toml_str("").unwrap();
        assert_eq!(config, ReaderConfig::default());
        assert!(config.matches_any_reader());
        assert_eq!(config.protocol, CardProtocol::T1);
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = ReaderConfig::from_toml_str(
            r#"
            reader_name_filter = "acr122"
            protocol = "any"
            share_mode = "exclusive"
            detection_timeout_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.reader_name_filter, "acr122");
        assert_eq!(config.protocol, CardProtocol::Any);
        assert_eq!(config.share_mode, CardShareMode::Exclusive);
        assert_eq!(config.detection_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.poll_interval_ms, 500);
        assert!(!config.matches_any_reader());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = ReaderConfig::from_toml_str("poll_interval_ms = 0").unwrap_err();
        assert!(matches!(err, ReaderError::Config { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ReaderConfig::from_json_str(r#"{"detection_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ReaderError::Config { .. }));
    }

    #[test]
    fn unknown_protocol_fails_to_parse() {
        let err = ReaderConfig::from_toml_str(r#"protocol = "t2""#).unwrap_err();
        assert!(matches!(err, ReaderError::Toml(_)));
    }
}
