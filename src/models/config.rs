use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default mirrors for the Steam app-name catalog, tried in order.
pub const DEFAULT_CATALOG_URLS: [&str; 4] = [
    "https://api.steampowered.com/ISteamApps/GetAppList/v0002/?format=json",
    "https://raw.githubusercontent.com/oxypanel/Steam-App-List/main/data/apps.json",
    "https://raw.githubusercontent.com/teslaworks/steam-app-list/master/steam_app_list.json",
    "https://raw.githubusercontent.com/WindowsGSM/SteamAppInfo/master/apps.json",
];

/// User configuration from `swch Config.yaml`, overridable with `SWCH_*` variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Steam install root. Empty means auto-detect.
    #[serde(default)]
    pub steam_path: String,

    /// Where snapshots, caches and overlay files live. Empty means `<config dir>/swch`.
    #[serde(default)]
    pub data_dir: String,

    #[serde(default = "default_catalog_urls")]
    pub catalog_urls: Vec<String>,

    #[serde(default = "default_catalog_timeout")]
    pub catalog_timeout_secs: u64,

    #[serde(default = "default_kill_poll_attempts")]
    pub kill_poll_attempts: u32,

    #[serde(default = "default_kill_poll_interval")]
    pub kill_poll_interval_ms: u64,

    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub console_logging: bool,

    #[serde(default)]
    pub json_logs: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            steam_path: String::new(),
            data_dir: String::new(),
            catalog_urls: default_catalog_urls(),
            catalog_timeout_secs: default_catalog_timeout(),
            kill_poll_attempts: default_kill_poll_attempts(),
            kill_poll_interval_ms: default_kill_poll_interval(),
            debug_mode: false,
            log_dir: default_log_dir(),
            console_logging: false,
            json_logs: false,
        }
    }
}

impl UserConfig {
    pub fn kill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.kill_poll_interval_ms)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_secs)
    }
}

fn default_catalog_urls() -> Vec<String> {
    DEFAULT_CATALOG_URLS.iter().map(|u| u.to_string()).collect()
}

fn default_catalog_timeout() -> u64 {
    10
}

fn default_kill_poll_attempts() -> u32 {
    20
}

fn default_kill_poll_interval() -> u64 {
    500
}

fn default_log_dir() -> String {
    "logs".to_string()
}
