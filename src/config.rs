use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Size limits applied to client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub max_history: usize,
    pub max_message_len: usize,
    pub max_code_len: usize,
    pub max_name_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_history: 500,
            max_message_len: 2000,
            max_code_len: 1_000_000,
            max_name_len: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: SocketAddr::from(([0, 0, 0, 0], 2052)),
            static_dir: PathBuf::from("public"),
            tls_cert: PathBuf::from("ssl/room/certificate.pem"),
            tls_key: PathBuf::from("ssl/room/private.key"),
            ping_interval: Duration::from_millis(25_000),
            ping_timeout: Duration::from_millis(20_000),
            limits: Limits::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source, starting from the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(addr) = parsed(&lookup, "CODESYNC_ADDR")? {
            config.addr = addr;
        }
        if let Some(dir) = lookup("CODESYNC_STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        if let Some(cert) = lookup("CODESYNC_TLS_CERT") {
            config.tls_cert = PathBuf::from(cert);
        }
        if let Some(key) = lookup("CODESYNC_TLS_KEY") {
            config.tls_key = PathBuf::from(key);
        }
        if let Some(ms) = positive(&lookup, "CODESYNC_PING_INTERVAL_MS")? {
            config.ping_interval = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = positive(&lookup, "CODESYNC_PING_TIMEOUT_MS")? {
            config.ping_timeout = Duration::from_millis(ms as u64);
        }
        if let Some(n) = positive(&lookup, "CODESYNC_MAX_HISTORY")? {
            config.limits.max_history = n;
        }
        if let Some(n) = positive(&lookup, "CODESYNC_MAX_MESSAGE_LEN")? {
            config.limits.max_message_len = n;
        }
        if let Some(n) = positive(&lookup, "CODESYNC_MAX_CODE_LEN")? {
            config.limits.max_code_len = n;
        }
        if let Some(n) = positive(&lookup, "CODESYNC_MAX_NAME_LEN")? {
            config.limits.max_name_len = n;
        }

        Ok(config)
    }
}

fn parsed<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => {
            let result = value.trim().parse::<T>();
            result.map(Some).map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            })
        }
    }
}

fn positive<F>(lookup: &F, name: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parsed::<F, usize>(lookup, name)? {
        Some(0) => Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        other => Ok(other),
    }
}
