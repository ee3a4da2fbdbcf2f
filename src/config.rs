//! Configuration loading and persistence.
//!
//! Handles reading and writing the kslive configuration file. The session
//! cookie is never written to disk: it comes from `KSLIVE_COOKIE` or from
//! the cookie file named by `cookie_file`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::api::{CredentialProvider, FileCookie, StaticCookie};
use crate::constants;

/// HTTP proxy used for both API calls and the room socket.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

impl ProxyConfig {
    /// `host:port`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `http://host:port`, as reqwest expects.
    pub fn url(&self) -> String {
        format!("http://{}", self.authority())
    }
}

/// Configuration for the kslive CLI.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Live room page URL.
    pub page_url: String,
    /// Session cookie - NOT serialized to disk.
    #[serde(skip)]
    pub cookie: String,
    /// File holding the session cookie (raw header or browser export).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_file: Option<PathBuf>,
    /// Base URL of the live site.
    pub api_base: String,
    /// Proxy host; used only together with `proxy_port`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_host: Option<String>,
    /// Proxy port; used only together with `proxy_host`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_port: Option<u16>,
    /// Seconds between heartbeats.
    pub heartbeat_interval_secs: u64,
    /// Seconds allowed for opening the room socket.
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_url: String::new(),
            cookie: String::new(),
            cookie_file: None,
            api_base: constants::DEFAULT_API_BASE.to_string(),
            proxy_host: None,
            proxy_port: None,
            heartbeat_interval_secs: constants::HEARTBEAT_INTERVAL.as_secs(),
            connect_timeout_secs: constants::CONNECT_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/kslive-test`
    /// 2. `KSLIVE_CONFIG_DIR` env var: explicit override
    /// 3. Default: platform config dir joined with `kslive`
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/kslive-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var("KSLIVE_CONFIG_DIR") {
                    PathBuf::from(dir)
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("kslive")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of the configuration file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from `path` without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(page_url) = std::env::var("KSLIVE_PAGE_URL") {
            self.page_url = page_url;
        }

        // Cookie from env var only; never persisted
        if let Ok(cookie) = std::env::var("KSLIVE_COOKIE") {
            self.cookie = cookie;
        }

        if let Ok(cookie_file) = std::env::var("KSLIVE_COOKIE_FILE") {
            self.cookie_file = Some(PathBuf::from(cookie_file));
        }

        if let Ok(api_base) = std::env::var("KSLIVE_API_BASE") {
            self.api_base = api_base;
        }

        if let Ok(host) = std::env::var("KSLIVE_PROXY_HOST") {
            self.proxy_host = Some(host);
        }

        if let Ok(port) = std::env::var("KSLIVE_PROXY_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.proxy_port = Some(port);
            }
        }

        if let Ok(secs) = std::env::var("KSLIVE_HEARTBEAT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.heartbeat_interval_secs = secs;
            }
        }

        if let Ok(secs) = std::env::var("KSLIVE_CONNECT_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.connect_timeout_secs = secs;
            }
        }
    }

    /// Persists the current configuration to disk.
    /// Note: the cookie is NOT saved.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Persists the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Proxy settings, when both host and port are set.
    pub fn proxy(&self) -> Option<ProxyConfig> {
        match (&self.proxy_host, self.proxy_port) {
            (Some(host), Some(port)) if !host.is_empty() => Some(ProxyConfig {
                host: host.clone(),
                port,
            }),
            _ => None,
        }
    }

    /// Heartbeat cadence. Zero falls back to the protocol default.
    pub fn heartbeat_interval(&self) -> Duration {
        match self.heartbeat_interval_secs {
            0 => constants::HEARTBEAT_INTERVAL,
            secs => Duration::from_secs(secs),
        }
    }

    /// Socket open timeout. Zero falls back to the default.
    pub fn connect_timeout(&self) -> Duration {
        match self.connect_timeout_secs {
            0 => constants::CONNECT_TIMEOUT,
            secs => Duration::from_secs(secs),
        }
    }

    /// Cookie source: an explicit cookie wins over the cookie file.
    pub fn credential_provider(&self) -> Box<dyn CredentialProvider> {
        match (&self.cookie_file, self.cookie.is_empty()) {
            (Some(path), true) => Box::new(FileCookie::new(path)),
            _ => Box::new(StaticCookie::new(self.cookie.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_base, "https://live.kuaishou.com");
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(20));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert!(config.proxy().is_none());
    }

    #[test]
    fn test_config_serialization_excludes_cookie() {
        let config = Config {
            cookie: "userId=secret_cookie".to_string(),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();

        assert!(!json.contains("secret_cookie"));
        assert!(!json.contains("\"cookie\""));
    }

    #[test]
    fn test_proxy_requires_host_and_port() {
        let mut config = Config {
            proxy_host: Some("127.0.0.1".to_string()),
            ..Config::default()
        };
        assert!(config.proxy().is_none());

        config.proxy_port = Some(7890);
        let proxy = config.proxy().unwrap();
        assert_eq!(proxy.url(), "http://127.0.0.1:7890");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config {
            page_url: "https://live.example.com/u/abc".to_string(),
            cookie: "not-saved".to_string(),
            heartbeat_interval_secs: 15,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.page_url, "https://live.example.com/u/abc");
        assert_eq!(loaded.heartbeat_interval_secs, 15);
        assert!(loaded.cookie.is_empty());

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"page_url":"https://live.example.com/u/x"}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.api_base, "https://live.kuaishou.com");
        assert_eq!(loaded.connect_timeout_secs, 10);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.page_url.is_empty());
    }

    #[test]
    fn test_explicit_cookie_wins_over_file() {
        let config = Config {
            cookie: "a=b".to_string(),
            cookie_file: Some(PathBuf::from("/nonexistent")),
            ..Config::default()
        };
        assert_eq!(config.credential_provider().cookie().unwrap(), "a=b");
    }
}
