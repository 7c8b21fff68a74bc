use std::path::PathBuf;

use crate::APP_NAME;

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const LOG_FILE_NAME: &str = "wallchanger.log";
#[cfg(unix)]
pub const SOCKET_NAME: &str = "wallchanger.sock";

/// Per-user application directory.
///
/// `%APPDATA%\wallchanger` on Windows, `$XDG_CONFIG_HOME/wallchanger`
/// (or the platform equivalent) elsewhere.
pub fn app_dir() -> PathBuf {
    if let Some(base) = dirs::config_dir() {
        return base.join(APP_NAME);
    }

    match std::env::current_exe() {
        Ok(path) => path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))),
        Err(_) => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

pub fn default_config_path() -> PathBuf {
    app_dir().join(CONFIG_FILE_NAME)
}

pub fn log_path() -> PathBuf {
    app_dir().join(LOG_FILE_NAME)
}

/// Directory for the owner's command socket.
#[cfg(unix)]
pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(std::env::temp_dir)
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
