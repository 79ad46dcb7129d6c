use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base url of the backend, e.g. "http://localhost:8001"
  pub url: String,
  /// Per-request timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// Treat cached entries older than this as missing. Unset means never stale.
  pub stale_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Default filter when COLCACHE_LOG is not set
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Directory for log files (defaults to the data directory)
  pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      dir: None,
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./colcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/colcache/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/colcache/config.yaml \
         or pass --url."
      )),
    }
  }

  /// Configuration for a backend given on the command line, with defaults for everything else.
  pub fn for_url(url: &str) -> Self {
    Self {
      api: ApiConfig {
        url: url.to_string(),
        timeout_secs: default_timeout_secs(),
      },
      cache: CacheConfig::default(),
      log: LogConfig::default(),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("colcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("colcache").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Get the backend API key from environment variables.
  ///
  /// Checks COLCACHE_API_KEY first, then AIRWEAVE_API_KEY as fallback.
  /// A missing key is not an error: local backends run without auth.
  pub fn get_api_key() -> Option<String> {
    std::env::var("COLCACHE_API_KEY")
      .or_else(|_| std::env::var("AIRWEAVE_API_KEY"))
      .ok()
      .filter(|k| !k.is_empty())
  }
}
