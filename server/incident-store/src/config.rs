//! Store configuration with sane defaults, overridable from the environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("{key}: expected {expected}, got {value:?}")]
  Invalid {
    key: &'static str,
    value: String,
    expected: &'static str,
  },
}

impl ConfigError {
  fn invalid(key: &'static str, value: &str, expected: &'static str) -> Self {
    Self::Invalid {
      key,
      value: value.to_string(),
      expected,
    }
  }
}

/// What `initialize()` does when the durable record cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnCorrupt {
  /// Abort startup with `StoreError::Corrupt`.
  Fail,
  /// Move the bad record aside, log the loss, start empty.
  Reset,
}

impl OnCorrupt {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "fail" | "abort" => Some(Self::Fail),
      "reset" | "empty" => Some(Self::Reset),
      _ => None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Config {
  /// Location of the durable JSON record.
  pub data_path: PathBuf,
  /// Persist after every accepted mutation. When false, only `flush()` writes.
  pub auto_persist: bool,
  pub on_corrupt: OnCorrupt,
  /// Upper bound on a single durable write attempt.
  pub persist_timeout: Duration,
  /// Extra attempts after the first failed write.
  pub persist_retries: u32,
  /// Delay before the first retry; doubles per attempt.
  pub retry_backoff: Duration,
  /// HTTP port (the service binds 127.0.0.1 only).
  pub port: u16,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_path: PathBuf::from("data/incidents.json"),
      auto_persist: true,
      on_corrupt: OnCorrupt::Fail,
      persist_timeout: Duration::from_millis(5000),
      persist_retries: 2,
      retry_backoff: Duration::from_millis(50),
      port: 5005,
    }
  }
}

impl Config {
  /// Defaults overridden by `INCIDENT_STORE_*` and `PORT`.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Same as `from_env` with an injectable variable source.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Self::default();

    if let Some(path) = lookup("INCIDENT_STORE_PATH") {
      config.data_path = PathBuf::from(path);
    }
    if let Some(v) = lookup("INCIDENT_STORE_AUTO_PERSIST") {
      config.auto_persist = parse_bool(&v)
        .ok_or_else(|| ConfigError::invalid("INCIDENT_STORE_AUTO_PERSIST", &v, "true|false"))?;
    }
    if let Some(v) = lookup("INCIDENT_STORE_ON_CORRUPT") {
      config.on_corrupt = OnCorrupt::from_str_loose(&v)
        .ok_or_else(|| ConfigError::invalid("INCIDENT_STORE_ON_CORRUPT", &v, "fail|reset"))?;
    }
    if let Some(v) = lookup("INCIDENT_STORE_PERSIST_TIMEOUT_MS") {
      config.persist_timeout = Duration::from_millis(parse_num("INCIDENT_STORE_PERSIST_TIMEOUT_MS", &v)?);
    }
    if let Some(v) = lookup("INCIDENT_STORE_PERSIST_RETRIES") {
      config.persist_retries = parse_num("INCIDENT_STORE_PERSIST_RETRIES", &v)?;
    }
    if let Some(v) = lookup("INCIDENT_STORE_RETRY_BACKOFF_MS") {
      config.retry_backoff = Duration::from_millis(parse_num("INCIDENT_STORE_RETRY_BACKOFF_MS", &v)?);
    }
    if let Some(v) = lookup("PORT") {
      config.port = parse_num("PORT", &v)?;
    }

    Ok(config)
  }
}

fn parse_bool(s: &str) -> Option<bool> {
  match s.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Some(true),
    "0" | "false" | "no" | "off" => Some(false),
    _ => None,
  }
}

fn parse_num<T: std::str::FromStr>(key: &'static str, v: &str) -> Result<T, ConfigError> {
  v.trim()
    .parse()
    .map_err(|_| ConfigError::invalid(key, v, "a non-negative integer"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |key| map.get(key).cloned()
  }

  #[test]
  fn empty_environment_gives_defaults() {
    let config = Config::from_lookup(lookup(&[])).unwrap();
    assert!(config.auto_persist);
    assert_eq!(config.on_corrupt, OnCorrupt::Fail);
    assert_eq!(config.port, 5005);
  }

  #[test]
  fn overrides_are_applied() {
    let config = Config::from_lookup(lookup(&[
      ("INCIDENT_STORE_PATH", "/tmp/x.json"),
      ("INCIDENT_STORE_AUTO_PERSIST", "false"),
      ("INCIDENT_STORE_ON_CORRUPT", "reset"),
      ("INCIDENT_STORE_PERSIST_TIMEOUT_MS", "250"),
      ("INCIDENT_STORE_PERSIST_RETRIES", "0"),
      ("PORT", "8080"),
    ]))
    .unwrap();
    assert_eq!(config.data_path, PathBuf::from("/tmp/x.json"));
    assert!(!config.auto_persist);
    assert_eq!(config.on_corrupt, OnCorrupt::Reset);
    assert_eq!(config.persist_timeout, Duration::from_millis(250));
    assert_eq!(config.persist_retries, 0);
    assert_eq!(config.port, 8080);
  }

  #[test]
  fn bad_values_are_reported_with_the_key() {
    let err = Config::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
    assert_eq!(
      err,
      ConfigError::Invalid {
        key: "PORT",
        value: "http".into(),
        expected: "a non-negative integer",
      }
    );
    assert_eq!(err.to_string(), "PORT: expected a non-negative integer, got \"http\"");

    let err = Config::from_lookup(lookup(&[("INCIDENT_STORE_ON_CORRUPT", "ignore")])).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { key: "INCIDENT_STORE_ON_CORRUPT", .. }));
  }
}
