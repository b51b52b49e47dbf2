use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Gateway configuration.
///
/// Every field has a workable compiled default, so a missing config file
/// is not an error: the gateway starts with the defaults and logs that it
/// did so.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL of the application origin. Precache manifest paths are
  /// resolved against it.
  pub origin: String,

  /// Override for the build-wide version token. Defaults to the crate
  /// version; changing the token is what invalidates all namespaces at
  /// the next activation.
  pub version: Option<String>,

  /// Hostnames whose responses are cached with the timeout-bounded race.
  pub api_hosts: Vec<String>,

  /// Hosts serving web-font CSS manifests (stale-while-revalidate).
  pub font_css_hosts: Vec<String>,

  /// Hosts serving font files (cache-first).
  pub font_file_hosts: Vec<String>,

  /// Extra hosts whose responses are treated as images.
  pub image_hosts: Vec<String>,

  /// Mandatory shell precache manifest. If any of these fails to fetch
  /// during install, the whole install fails.
  pub precache: Vec<String>,

  /// Optional secondary precache list (e.g. locally-hosted font files).
  /// Failures here are tolerated individually.
  pub secondary_precache: Vec<String>,

  /// Path of the app-shell document served as the navigation fallback.
  pub shell_document: String,

  /// Path of the offline page served when the shell document is not
  /// cached either.
  pub offline_page: String,

  pub capacity: CapacityConfig,

  /// Deadline for API fetches, in milliseconds.
  pub api_deadline_ms: u64,

  /// Cache database location (default: `<data_dir>/offramp/cache.db`).
  pub db_path: Option<PathBuf>,
}

/// Per-kind maximum entry counts for the capacity-bounded stores.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
  pub images: usize,
  pub documents: usize,
  pub fonts: usize,
  pub api: usize,
}

impl Default for CapacityConfig {
  fn default() -> Self {
    Self {
      images: 200,
      documents: 60,
      fonts: 40,
      api: 50,
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      version: None,
      api_hosts: Vec::new(),
      font_css_hosts: vec!["fonts.googleapis.com".to_string()],
      font_file_hosts: vec!["fonts.gstatic.com".to_string()],
      image_hosts: Vec::new(),
      precache: vec![
        "/index.html".to_string(),
        "/offline.html".to_string(),
        "/manifest.json".to_string(),
      ],
      secondary_precache: Vec::new(),
      shell_document: "/index.html".to_string(),
      offline_page: "/offline.html".to_string(),
      capacity: CapacityConfig::default(),
      api_deadline_ms: 4000,
      db_path: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offramp.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offramp/config.yaml
  ///
  /// Falls back to the compiled defaults when no file is found.
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
      None => {
        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offramp.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offramp").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// The effective version token for this build.
  pub fn version_token(&self) -> String {
    self
      .version
      .clone()
      .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_workable() {
    let config = Config::default();
    assert!(config.precache.contains(&"/offline.html".to_string()));
    assert_eq!(config.capacity.images, 200);
    assert_eq!(config.api_deadline_ms, 4000);
  }

  #[test]
  fn test_version_token_defaults_to_crate_version() {
    let config = Config::default();
    assert_eq!(config.version_token(), env!("CARGO_PKG_VERSION"));
  }

  #[test]
  fn test_partial_yaml_fills_defaults() {
    let config: Config = serde_yaml::from_str(
      "origin: https://app.example.com\napi_hosts:\n  - api.example.com\n",
    )
    .unwrap();
    assert_eq!(config.origin, "https://app.example.com");
    assert_eq!(config.api_hosts, vec!["api.example.com".to_string()]);
    // Untouched fields keep their defaults
    assert_eq!(config.capacity.fonts, 40);
    assert_eq!(config.offline_page, "/offline.html");
  }

  #[test]
  fn test_capacity_override() {
    let config: Config = serde_yaml::from_str("capacity:\n  images: 10\n").unwrap();
    assert_eq!(config.capacity.images, 10);
    assert_eq!(config.capacity.documents, 60);
  }
}
