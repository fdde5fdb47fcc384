use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

/// Every recognized option, loaded once at startup and passed by reference
/// into the components that need it. Nothing reads the environment after
/// `Config::load` returns.
pub struct Config {
    /// Redis endpoint without a database index, e.g. `redis://127.0.0.1:6379`.
    pub redis_url: String,
    /// Logical Redis database holding staged code. Also selects the
    /// `__keyevent@{db}__:expired` channel the listener subscribes to.
    pub redis_db: u8,
    pub database_url: String,
    /// Namespace prefix for every staging key this service owns.
    pub code_save_prefix: String,
    /// Debounce window: quiet time after the last save before code is
    /// persisted.
    pub debounce_ttl_secs: u64,
    /// Safety TTL on the staged code itself, well above the debounce window.
    pub data_ttl_secs: u64,
    /// Reconciliation sweep period. 0 disables the sweep.
    pub sweep_interval_secs: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    /// Cookie carrying session identity. Consumed by the auth layer in front
    /// of this service, carried here so both read the same name.
    pub token_cookie_name: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379"),
            redis_db: try_load("REDIS_CODE_SAVE_DB", "10"),
            database_url: try_load("DATABASE_URL", "postgres://localhost/autosave"),
            code_save_prefix: try_load("REDIS_CODE_SAVE_PREFIX", "autosave"),
            debounce_ttl_secs: try_load("AUTOSAVE_DEBOUNCE_TTL", "5"),
            data_ttl_secs: try_load("AUTOSAVE_DATA_TTL", "86400"),
            sweep_interval_secs: try_load("AUTOSAVE_SWEEP_INTERVAL", "300"),
            reconnect_base_ms: try_load("AUTOSAVE_RECONNECT_BASE_MS", "500"),
            reconnect_max_ms: try_load("AUTOSAVE_RECONNECT_MAX_MS", "30000"),
            token_cookie_name: try_load("TOKEN_COOKIE_NAME", "token"),
        }
    }

    /// Redis URL with the staging database index appended.
    pub fn staging_url(&self) -> String {
        format!("{}/{}", self.redis_url.trim_end_matches('/'), self.redis_db)
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
