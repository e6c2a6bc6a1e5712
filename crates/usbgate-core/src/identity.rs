//! Application identity presented to the accessory server.
//!
//! Permission checks and requests carry an application identifier so the
//! server can key its grant table per application. The identifier comes
//! from configuration when set; otherwise it is derived from the current
//! process executable name.

use tracing::debug;
use usbgate_config::ClientConfig;

/// Resolve the identity string sent with permission operations.
///
/// Returns `None` when no identity can be determined; permission checks
/// then report "not granted" without touching the server.
pub fn resolve_app_id(config: &ClientConfig) -> Option<String> {
    if let Some(app_id) = &config.app_id {
        return Some(app_id.clone());
    }

    let app_id = std::env::current_exe()
        .ok()?
        .file_name()?
        .to_string_lossy()
        .into_owned();
    debug!(app_id = %app_id, "derived application identity from executable name");
    Some(app_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_override_wins() {
        let config = ClientConfig {
            app_id: Some("com.example.app".to_string()),
        };
        assert_eq!(resolve_app_id(&config).as_deref(), Some("com.example.app"));
    }

    #[test]
    fn test_default_derives_from_executable() {
        let config = ClientConfig::default();
        let app_id = resolve_app_id(&config).expect("test binary has an executable name");
        assert!(!app_id.is_empty());
    }
}
