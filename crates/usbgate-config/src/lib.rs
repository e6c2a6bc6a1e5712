#![deny(unsafe_code)]

//! Configuration loading and validation for usbgate.
//!
//! Loads TOML configuration files and validates them against expected
//! schemas. Provides the [`AppConfig`] type as the central configuration
//! structure shared by the library core and the CLI.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Socket paths and notification-socket ownership.
    #[serde(default)]
    pub sockets: SocketsConfig,

    /// Platform capabilities.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Client identity presented to the accessory server.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Socket paths used to talk to the accessory server.
///
/// The request socket is created and owned by the server; the notification
/// socket is created by this library and must be connectable by the server
/// process, which runs as a different user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketsConfig {
    /// Path of the server's request/response socket.
    #[serde(default = "default_server_path")]
    pub server_path: String,

    /// Path this library binds to receive permission notifications.
    #[serde(default = "default_notify_path")]
    pub notify_path: String,

    /// Mode bits applied to the notification socket after binding.
    #[serde(default = "default_notify_mode")]
    pub notify_mode: u32,

    /// Optional owner uid for the notification socket. Must be set
    /// together with `notify_owner_gid`.
    #[serde(default)]
    pub notify_owner_uid: Option<u32>,

    /// Optional owner gid for the notification socket.
    #[serde(default)]
    pub notify_owner_gid: Option<u32>,
}

impl Default for SocketsConfig {
    fn default() -> Self {
        Self {
            server_path: default_server_path(),
            notify_path: default_notify_path(),
            notify_mode: default_notify_mode(),
            notify_owner_uid: None,
            notify_owner_gid: None,
        }
    }
}

impl SocketsConfig {
    /// Server socket path as a [`PathBuf`].
    pub fn server_path(&self) -> PathBuf {
        PathBuf::from(&self.server_path)
    }

    /// Notification socket path as a [`PathBuf`].
    pub fn notify_path(&self) -> PathBuf {
        PathBuf::from(&self.notify_path)
    }

    /// Owner (uid, gid) to assign to the notification socket, if configured.
    pub fn notify_owner(&self) -> Option<(u32, u32)> {
        match (self.notify_owner_uid, self.notify_owner_gid) {
            (Some(uid), Some(gid)) => Some((uid, gid)),
            _ => None,
        }
    }
}

fn default_server_path() -> String {
    "/tmp/usb_server_sock".to_string()
}

fn default_notify_path() -> String {
    "/tmp/usb_acc_sock".to_string()
}

fn default_notify_mode() -> u32 {
    0o777
}

/// Platform capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// True on targets without real accessory hardware (emulators).
    /// Every accessory operation fails with `NotSupported` when set.
    #[serde(default)]
    pub emulated: bool,

    /// Device node handed to the application once permission is granted.
    #[serde(default = "default_device_node")]
    pub device_node: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            emulated: false,
            device_node: default_device_node(),
        }
    }
}

fn default_device_node() -> String {
    "/dev/usb_accessory".to_string()
}

/// Client identity presented to the accessory server.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Application identifier sent with permission requests. When unset,
    /// the identity is derived from the current process executable name.
    #[serde(default)]
    pub app_id: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sockets.server_path.is_empty() {
            return Err(ConfigError::Validation(
                "sockets.server_path must not be empty".to_string(),
            ));
        }
        if self.sockets.notify_path.is_empty() {
            return Err(ConfigError::Validation(
                "sockets.notify_path must not be empty".to_string(),
            ));
        }
        // The two channels must never share an address: the notification
        // bind would unlink the server's socket.
        if self.sockets.server_path == self.sockets.notify_path {
            return Err(ConfigError::Validation(
                "sockets.server_path and sockets.notify_path must differ".to_string(),
            ));
        }
        if self.sockets.notify_mode > 0o777 {
            return Err(ConfigError::Validation(format!(
                "sockets.notify_mode must be at most 0o777, got 0o{:o}",
                self.sockets.notify_mode
            )));
        }
        if self.sockets.notify_owner_uid.is_some() != self.sockets.notify_owner_gid.is_some() {
            return Err(ConfigError::Validation(
                "sockets.notify_owner_uid and sockets.notify_owner_gid must be set together"
                    .to_string(),
            ));
        }
        if self.platform.device_node.is_empty() {
            return Err(ConfigError::Validation(
                "platform.device_node must not be empty".to_string(),
            ));
        }
        if let Some(app_id) = &self.client.app_id {
            if app_id.is_empty() {
                return Err(ConfigError::Validation(
                    "client.app_id must not be empty when set".to_string(),
                ));
            }
            // The wire format cannot carry the field separator.
            if app_id.contains('|') {
                return Err(ConfigError::Validation(
                    "client.app_id must not contain '|'".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.sockets.server_path, "/tmp/usb_server_sock");
        assert_eq!(config.sockets.notify_path, "/tmp/usb_acc_sock");
        assert_eq!(config.sockets.notify_mode, 0o777);
        assert_eq!(config.sockets.notify_owner(), None);
        assert!(!config.platform.emulated);
        assert_eq!(config.platform.device_node, "/dev/usb_accessory");
        assert_eq!(config.client.app_id, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.sockets.server_path, "/tmp/usb_server_sock");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [sockets]
            server_path = "/run/usbgate/server.sock"
            notify_path = "/run/usbgate/notify.sock"
            notify_mode = 0o770
            notify_owner_uid = 5000
            notify_owner_gid = 5000

            [platform]
            emulated = true
            device_node = "/dev/usb_accessory0"

            [client]
            app_id = "com.example.app"

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.sockets.server_path, "/run/usbgate/server.sock");
        assert_eq!(config.sockets.notify_mode, 0o770);
        assert_eq!(config.sockets.notify_owner(), Some((5000, 5000)));
        assert!(config.platform.emulated);
        assert_eq!(config.platform.device_node, "/dev/usb_accessory0");
        assert_eq!(config.client.app_id.as_deref(), Some("com.example.app"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_empty_server_path() {
        let toml = r#"
            [sockets]
            server_path = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_shared_socket_path() {
        let toml = r#"
            [sockets]
            server_path = "/tmp/one_sock"
            notify_path = "/tmp/one_sock"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_wide_mode() {
        let toml = r#"
            [sockets]
            notify_mode = 0o1777
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_partial_owner() {
        let toml = r#"
            [sockets]
            notify_owner_uid = 5000
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_separator_in_app_id() {
        let toml = r#"
            [client]
            app_id = "com.example|app"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_app_id() {
        let toml = r#"
            [client]
            app_id = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("usbgate.toml");
        tokio::fs::write(&path, b"[platform]\nemulated = true\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert!(config.platform.emulated);
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/usbgate.toml")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
