use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub http: HttpConfig,
  pub cache: CacheConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  /// Base URL that relative request URLs are resolved against
  pub base_url: Option<String>,
  pub user_agent: String,
  /// Per-request timeout; no timeout if unset
  pub timeout_ms: Option<u64>,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      base_url: None,
      user_agent: concat!("smart-fetch/", env!("CARGO_PKG_VERSION")).to_string(),
      timeout_ms: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Run a background sweep of expired entries at this interval
  pub sweep_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Write daily-rolling log files here instead of stderr
  pub directory: Option<PathBuf>,
  /// `EnvFilter` directives, overridden by `SMART_FETCH_LOG`
  pub filter: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./smart-fetch.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/smart-fetch/config.yaml
  ///
  /// Without a config file every setting takes its default.
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
    let local = PathBuf::from("smart-fetch.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("smart-fetch").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty document deserializes as null rather than an empty mapping
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }
}
