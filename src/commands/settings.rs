//! `kslive config`: show or edit the configuration file.
//!
//! Values are edited through the JSON form of [`Config`], so any field the
//! file accepts can be set by name. The cookie is never written.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::config::Config;

const KEYS: &[&str] = &[
    "page_url",
    "cookie_file",
    "api_base",
    "proxy_host",
    "proxy_port",
    "heartbeat_interval_secs",
    "connect_timeout_secs",
];

/// Print the effective configuration (file plus env overrides).
pub fn show(config: &Config) -> Result<()> {
    println!("# {}", Config::config_path()?.display());
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Print one configuration value.
pub fn get(config: &Config, key: &str) -> Result<()> {
    if !KEYS.contains(&key) {
        anyhow::bail!("Unknown config key '{key}'");
    }
    let doc = serde_json::to_value(config)?;
    match doc.get(key) {
        Some(Value::String(s)) => println!("{s}"),
        Some(value) => println!("{value}"),
        None => println!("null"),
    }
    Ok(())
}

/// Return `config` with `key` set to `value`.
///
/// `value` is parsed as JSON first (numbers, `null`), and as a plain
/// string otherwise.
pub fn apply(config: &Config, key: &str, value: &str) -> Result<Config> {
    let mut doc = serde_json::to_value(config)?;
    let Value::Object(fields) = &mut doc else {
        anyhow::bail!("Config is not a JSON object");
    };
    if key == "cookie" {
        anyhow::bail!("The cookie is not stored in the config file; use KSLIVE_COOKIE or cookie_file");
    }
    if !KEYS.contains(&key) {
        anyhow::bail!("Unknown config key '{key}' (expected one of: {})", KEYS.join(", "));
    }
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    fields.insert(key.to_string(), parsed);

    let mut updated: Config =
        serde_json::from_value(doc).with_context(|| format!("Invalid value for '{key}'"))?;
    updated.cookie.clone_from(&config.cookie);
    Ok(updated)
}

/// Set `key` in the stored configuration file.
pub fn set(key: &str, value: &str) -> Result<()> {
    let path = Config::config_path()?;
    let stored = Config::load_from(&path)?;
    let updated = apply(&stored, key, value)?;
    updated.save_to(&path)?;
    println!("Set {key} in {}", path.display());
    Ok(())
}
