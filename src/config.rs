use crate::constants::{
    DEFAULT_ALLOWED_ORIGINS, DEFAULT_CACHE_DIR, DEFAULT_CACHE_TTL_SECONDS,
    DEFAULT_FETCH_TIMEOUT_SECONDS, DEFAULT_PATH_PREFIX, DEFAULT_PORT, DEFAULT_USER_AGENT,
};
use crate::error::{ProxyError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration of the proxy core. Immutable once the server starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Route namespace, e.g. `/cachingproxy`. No trailing slash.
    pub path_prefix: String,
    /// Origin prefixes a target URL must start with.
    pub allowed_origins: Vec<String>,
    pub default_cache_ttl: Duration,
    pub user_agent: String,
    pub fetch_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
            default_cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS),
        }
    }
}

/// The `config.toml` document. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    path_prefix: Option<String>,
    allowed_origins: Option<Vec<String>>,
    /// Seconds.
    default_cache_ttl: Option<u64>,
    user_agent: Option<String>,
    /// Seconds.
    fetch_timeout: Option<u64>,
    cache_dir: Option<PathBuf>,
    port: Option<u16>,
}

/// Everything the binary needs to start: the proxy core config plus process-level options.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub proxy: ProxyConfig,
    pub cache_dir: PathBuf,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy: ProxyConfig::default(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: SettingsFile = toml::from_str(content)?;
        let defaults = Self::default();

        let proxy = ProxyConfig {
            path_prefix: file
                .path_prefix
                .map(|p| normalize_prefix(&p))
                .unwrap_or(defaults.proxy.path_prefix),
            allowed_origins: file.allowed_origins.unwrap_or(defaults.proxy.allowed_origins),
            default_cache_ttl: file
                .default_cache_ttl
                .map(Duration::from_secs)
                .unwrap_or(defaults.proxy.default_cache_ttl),
            user_agent: file.user_agent.unwrap_or(defaults.proxy.user_agent),
            fetch_timeout: file
                .fetch_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.proxy.fetch_timeout),
        };

        Ok(Self {
            proxy,
            cache_dir: file.cache_dir.unwrap_or(defaults.cache_dir),
            port: file.port.unwrap_or(defaults.port),
        })
    }

    /// Applies `CACHING_PROXY_*` environment overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(port) = lookup("CACHING_PROXY_PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| ProxyError::Config(format!("Invalid CACHING_PROXY_PORT '{}': {}", port, e)))?;
        }
        if let Some(dir) = lookup("CACHING_PROXY_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(origins) = lookup("CACHING_PROXY_ALLOWED_ORIGINS") {
            self.proxy.allowed_origins = origins
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
        }
        Ok(self)
    }
}

/// Route prefixes are joined with `/proxy`, so they carry a leading slash and no trailing one.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
