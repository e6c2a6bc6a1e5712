//! Config builders for tests.

use usbgate_config::AppConfig;

use crate::server::FakeUsbServer;

/// Build an [`AppConfig`] wired to a running [`FakeUsbServer`]: both
/// socket paths live in the server's temp directory and the app identity
/// is pinned so request lines are predictable.
pub fn config_for(server: &FakeUsbServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.sockets.server_path = server.socket_path().to_string_lossy().into_owned();
    config.sockets.notify_path = server.notify_path().to_string_lossy().into_owned();
    config.client.app_id = Some("com.example.app".to_string());
    config
}

/// Build an [`AppConfig`] whose server socket path points nowhere, for
/// exercising the unreachable-server paths. Socket paths are scoped to
/// the process so parallel test runs don't collide.
pub fn unreachable_config() -> AppConfig {
    let pid = std::process::id();
    let tmp = std::env::temp_dir();
    let mut config = AppConfig::default();
    config.sockets.server_path = tmp
        .join(format!("usbgate-test-{pid}-no-server.sock"))
        .to_string_lossy()
        .into_owned();
    config.sockets.notify_path = tmp
        .join(format!("usbgate-test-{pid}-notify.sock"))
        .to_string_lossy()
        .into_owned();
    config.client.app_id = Some("com.example.app".to_string());
    config
}
