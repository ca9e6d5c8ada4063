// ==================== CONFIGURATION ====================
// Everything is read from the environment once at startup.

use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_MIRROR_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address {value:?}: {source}")]
    Bind {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub mirror: Option<MirrorConfig>,
    pub catalog_path: Option<PathBuf>,
    pub restore_file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup (the environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_value = match (get("LEADERBOARD_BIND"), get("PORT")) {
            (Some(bind), _) => bind,
            (None, Some(port)) => format!("0.0.0.0:{}", port),
            (None, None) => DEFAULT_BIND.to_string(),
        };
        let bind = bind_value
            .parse()
            .map_err(|source| ConfigError::Bind { value: bind_value.clone(), source })?;

        let timeout_ms = get("LEADERBOARD_MIRROR_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| (100..=60_000).contains(v))
            .unwrap_or(DEFAULT_MIRROR_TIMEOUT_MS);

        let mirror = get("LEADERBOARD_MIRROR_URL").map(|base_url| MirrorConfig {
            base_url,
            auth_token: get("LEADERBOARD_MIRROR_TOKEN"),
            timeout: Duration::from_millis(timeout_ms),
        });

        Ok(Self {
            bind,
            data_dir: get("LEADERBOARD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            mirror,
            catalog_path: get("LEADERBOARD_CATALOG_PATH").map(PathBuf::from),
            restore_file: get("LEADERBOARD_RESTORE_FILE").map(PathBuf::from),
        })
    }
}
