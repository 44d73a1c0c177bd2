use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::config::defaults::{
    default_connect_timeout, DEFAULT_BASE_URL, DEFAULT_MODEL,
};
use crate::core::orchestrator::{OrchestratorSettings, OverlapPolicy, RegeneratePolicy};

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Root URL of the answering service (e.g., "http://localhost:3001")
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    /// Document collections searched when answering every message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_sources: Vec<String>,
    /// "resend" or "reuse-user-turn"
    pub regenerate: Option<RegeneratePolicy>,
    /// "reject" or "cancel-previous"
    pub overlap: Option<OverlapPolicy>,
    pub connect_timeout_secs: Option<u64>,
    /// Ask the service's own regenerate endpoint when reusing the user turn
    pub native_regenerate: Option<bool>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths under the home directory to `~` notation on Unix-like systems
///
/// # Examples
/// - Unix: `/home/user/.config/parley/config.toml` → `~/.config/parley/config.toml`
/// - Windows: paths are shown unchanged
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn effective_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn effective_model(&self) -> &str {
        self.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn effective_connect_timeout(&self) -> Duration {
        self.connect_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(default_connect_timeout)
    }

    pub fn native_regenerate_enabled(&self) -> bool {
        self.native_regenerate.unwrap_or(false)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            model: self.effective_model().to_string(),
            data_sources: self.data_sources.clone(),
            regenerate: self.regenerate.unwrap_or_default(),
            overlap: self.overlap.unwrap_or_default(),
        }
    }
}
