use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::privacy::avatar_url::AvatarOptions;

/// HTTP API 服务器默认端口
pub const DEFAULT_PORT: u16 = 19530;
pub const DATA_DIR_ENV: &str = "GRAVATAR_PRIVACY_DATA_DIR";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// SQLite file, relative to the data directory
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Bearer key for the admin routes. Empty disables them.
    #[serde(default)]
    pub admin_api_key: String,
    #[serde(default)]
    pub access_log_enabled: bool,
    #[serde(default = "default_log_to_file")]
    pub log_to_file: bool,
    #[serde(default)]
    pub avatar: AvatarOptions,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_database_file() -> String {
    "gravatar_privacy.db".to_string()
}

fn default_log_to_file() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: default_bind_address(),
            database_file: default_database_file(),
            admin_api_key: String::new(),
            access_log_enabled: false,
            log_to_file: true,
            avatar: AvatarOptions::default(),
        }
    }
}

impl Settings {
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.database_file)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Data directory: `$GRAVATAR_PRIVACY_DATA_DIR`, else `~/.gravatar_privacy`. Created if missing.
pub fn get_data_dir() -> Result<PathBuf, String> {
    let dir = match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .ok_or("Failed to locate home directory")?
            .join(".gravatar_privacy"),
    };
    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("Failed to create data dir {:?}: {}", dir, e))?;
    Ok(dir)
}

/// 加载设置; a missing file yields defaults.
pub fn load_settings(data_dir: &Path) -> Result<Settings, String> {
    let settings_path = data_dir.join(SETTINGS_FILE);

    if !settings_path.exists() {
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(&settings_path)
        .map_err(|e| format!("Failed to read settings file: {}", e))?;

    serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse settings: {}", e))
}

/// 保存设置
pub fn save_settings(data_dir: &Path, settings: &Settings) -> Result<(), String> {
    let settings_path = data_dir.join(SETTINGS_FILE);

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;

    std::fs::write(&settings_path, content)
        .map_err(|e| format!("Failed to write settings file: {}", e))
}
