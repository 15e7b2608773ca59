//! Configuration loading and data folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

const APP_DIR: &str = "sacraltrack";

/// Resolve the folder holding service-local data (the interaction cache),
/// following the priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`data_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(value) = config_file_string("data_folder") {
        return PathBuf::from(value);
    }

    // Priority 4: OS-dependent compiled default
    default_data_folder()
}

/// Resolve the base URL of the remote interaction service.
/// Priority: command-line argument, then `ST_REMOTE_URL`, then the
/// `remote_url` config file key. There is no compiled default; a missing
/// URL is a configuration error.
pub fn resolve_remote_url(cli_arg: Option<&str>) -> Result<String> {
    if let Some(url) = cli_arg {
        return Ok(url.to_string());
    }

    if let Ok(url) = std::env::var("ST_REMOTE_URL") {
        if !url.is_empty() {
            return Ok(url);
        }
    }

    if let Some(url) = config_file_string("remote_url") {
        return Ok(url);
    }

    Err(Error::Config(
        "remote service URL not configured (use --remote-url, ST_REMOTE_URL, or config file)"
            .to_string(),
    ))
}

/// Read one string key from the first config file found
fn config_file_string(key: &str) -> Option<String> {
    let path = find_config_file()?;
    let content = std::fs::read_to_string(path).ok()?;
    let value = toml::from_str::<toml::Value>(&content).ok()?;
    value.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Locate the config file: user config dir first, then the system path
fn find_config_file() -> Option<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }

    let system = PathBuf::from("/etc/sacraltrack/config.toml");
    if system.exists() {
        return Some(system);
    }

    None
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./sacraltrack_data"))
}
