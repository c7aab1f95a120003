use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::freshness::DEFAULT_STALE_AFTER_SECS;

/// Backend used when nothing is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Environment variable holding the bearer token
pub const TOKEN_ENV: &str = "B9S_API_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_api_url")]
  pub url: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
    }
  }
}

fn default_api_url() -> String {
  DEFAULT_API_URL.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Seconds after the last fetch before cached integrations are refreshed
  #[serde(default = "default_stale_after")]
  pub stale_after_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_after_secs: default_stale_after(),
    }
  }
}

fn default_stale_after() -> u64 {
  DEFAULT_STALE_AFTER_SECS
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./b9s.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/b9s/config.yaml
  ///
  /// Unlike an explicit path, a missing default file is not an error: every
  /// setting has a default.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("b9s.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("b9s").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Header title: the configured one, or the API host.
  pub fn display_title(&self) -> String {
    if let Some(title) = &self.title {
      return title.clone();
    }
    url::Url::parse(&self.api.url)
      .ok()
      .and_then(|u| u.host_str().map(|h| h.to_string()))
      .unwrap_or_else(|| self.api.url.clone())
  }

  /// Get the API token from the environment, if set.
  pub fn get_api_token() -> Option<String> {
    std::env::var(TOKEN_ENV)
      .ok()
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty())
  }
}

/// Directory for the local database and logs
pub fn data_dir() -> Result<PathBuf> {
  dirs::data_dir()
    .map(|d| d.join("b9s"))
    .ok_or_else(|| eyre!("Could not determine data directory"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_when_fields_missing() {
    let config = Config::parse("title: Burnout\n").unwrap();
    assert_eq!(config.api.url, DEFAULT_API_URL);
    assert_eq!(config.cache.stale_after_secs, 300);
    assert_eq!(config.display_title(), "Burnout");
  }

  #[test]
  fn test_full_config() {
    let config = Config::parse(
      "api:\n  url: https://api.example.com/v1\ncache:\n  stale_after_secs: 60\n",
    )
    .unwrap();
    assert_eq!(config.api.url, "https://api.example.com/v1");
    assert_eq!(config.cache.stale_after_secs, 60);
    assert_eq!(config.display_title(), "api.example.com");
  }

  #[test]
  fn test_empty_file_is_default() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.api.url, DEFAULT_API_URL);
  }

  #[test]
  fn test_explicit_missing_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("b9s.yaml");
    std::fs::write(&path, "api:\n  url: http://127.0.0.1:9000\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.api.url, "http://127.0.0.1:9000");
  }
}
