use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Environment variable that replaces the platform config directory.
pub const CONFIG_DIR_ENV: &str = "PARLEY_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub fn default_connect_timeout() -> Duration {
    Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
}
