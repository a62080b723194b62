//! Configuration for the tournament server
//!
//! Handles data directory configuration with the following precedence:
//! 1. TOURNAMENT_DATA_DIR environment variable
//! 2. ~/.config/tournament-server/data (production default)
//! 3. ./data (fallback for development)
//!
//! The listen address comes from TOURNAMENT_ADDR and file logging is switched
//! on by TOURNAMENT_LOG_DIR.

use std::path::PathBuf;

const DEFAULT_CONFIG_DIR: &str = ".config/tournament-server/data";
const DEV_DATA_DIR: &str = "./data";
const DEFAULT_ADDR: &str = "127.0.0.1:8090";
const DATABASE_FILE: &str = "data.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub addr: String,
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: get_data_dir(),
            addr: get_addr(),
            log_dir: get_log_dir(),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

/// Get the data directory for persistence.
///
/// Priority:
/// 1. TOURNAMENT_DATA_DIR env variable if set
/// 2. $HOME/.config/tournament-server/data if HOME is set
/// 3. ./data as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TOURNAMENT_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_CONFIG_DIR);
    }

    PathBuf::from(DEV_DATA_DIR)
}

pub fn get_addr() -> String {
    std::env::var("TOURNAMENT_ADDR")
        .ok()
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string())
}

pub fn get_log_dir() -> Option<PathBuf> {
    std::env::var("TOURNAMENT_LOG_DIR")
        .ok()
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
}
