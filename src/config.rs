use std::path::PathBuf;

use serde::Deserialize;

/// Application settings read from Rocket's figment (`Rocket.toml`, `ROCKET_*`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: i64,
    /// Base URL of a remote entity API. Reports read from the local pool when unset.
    #[serde(default)]
    pub entity_api_url: Option<String>,
}

fn default_database_path() -> PathBuf {
    let mut path = PathBuf::from("data");
    path.push("municipal.sqlite");
    path
}

fn default_max_sessions() -> i64 {
    5
}
