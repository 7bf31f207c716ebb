//! Constants and configuration values used throughout the Montage MCP server

/// Default interface the plugin bridge listens on
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// Default port the plugin bridge listens on
pub const DEFAULT_BIND_PORT: u16 = 8765;

/// Default number of seconds a call waits for a plugin response
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;

/// Directory for temporary files (logs, etc.)
pub const TEMP_DIR: &str = "/tmp";

/// Default log file name for development mode
pub const DEV_LOG_FILENAME: &str = "montage-mcp.log";

/// Development log file path
pub fn dev_log_path() -> String {
    format!("{}/{}", TEMP_DIR, DEV_LOG_FILENAME)
}
