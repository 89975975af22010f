//! Platform configuration paths

use std::path::PathBuf;

/// Directory name used under the platform config root
const APP_NAME: &str = "winprobe";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/winprobe/`
/// - macOS: `~/Library/Application Support/winprobe/`
/// - Windows: `%APPDATA%\winprobe\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
