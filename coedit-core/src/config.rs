use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Client-side collaboration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollabConfig {
    /// Websocket endpoint of the sync server
    pub server_url: String,
    /// Room every local document is replicated through
    pub room: String,
    /// Only documents with this locator scheme are synchronized
    pub tracked_scheme: String,
    /// Display name announced through awareness
    pub user_name: String,
    /// Minimum interval between cursor broadcasts
    pub cursor_interval_ms: u64,
    /// Warn about keys left pending longer than this (None = never)
    pub pending_warn_after_secs: Option<u64>,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:12345".to_string(),
            room: "coedit".to_string(),
            tracked_scheme: "file".to_string(),
            user_name: "anonymous".to_string(),
            cursor_interval_ms: 33,
            pending_warn_after_secs: None,
        }
    }
}

impl CollabConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn cursor_interval(&self) -> Duration {
        Duration::from_millis(self.cursor_interval_ms)
    }

    pub fn pending_warn_after(&self) -> Option<Duration> {
        self.pending_warn_after_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollabConfig::default();
        assert_eq!(config.server_url, "ws://127.0.0.1:12345");
        assert_eq!(config.tracked_scheme, "file");
        assert_eq!(config.cursor_interval(), Duration::from_millis(33));
        assert!(config.pending_warn_after().is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CollabConfig::from_toml_str(
            r#"
            room = "design-review"
            pending_warn_after_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.room, "design-review");
        assert_eq!(config.pending_warn_after(), Some(Duration::from_secs(10)));
        assert_eq!(config.server_url, CollabConfig::default().server_url);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(CollabConfig::from_toml_str("room = [").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collab.toml");
        std::fs::write(&path, "user_name = \"situ\"\n").unwrap();
        let config = CollabConfig::load(&path).unwrap();
        assert_eq!(config.user_name, "situ");
    }
}
