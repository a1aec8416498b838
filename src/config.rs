use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::constants;
use crate::display::DisplayMode;

/// User preferences read from `prefs.toml` in the platform config directory.
/// Every field is optional; anything missing falls back to the embedded constants.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub metadata_endpoint: Option<String>,
  pub api_key: Option<String>,
  pub server_url: Option<String>,
  pub stream_url: Option<String>,
  pub stream_topic: Option<String>,
  pub debounce_ms: Option<u64>,
  pub display_mode: Option<String>,
  pub log_level: Option<String>,
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "marquee") {
      let config_file = proj_dirs.config_dir().join("prefs.toml");
      if let Ok(content) = std::fs::read_to_string(config_file)
        && let Ok(config) = toml::from_str(&content)
      {
        return config;
      }
    }
    Self::default()
  }

  /// Field-wise overlay: values set in `self` win over `base`.
  pub fn or(self, base: Config) -> Config {
    Config {
      metadata_endpoint: self.metadata_endpoint.or(base.metadata_endpoint),
      api_key: self.api_key.or(base.api_key),
      server_url: self.server_url.or(base.server_url),
      stream_url: self.stream_url.or(base.stream_url),
      stream_topic: self.stream_topic.or(base.stream_topic),
      debounce_ms: self.debounce_ms.or(base.debounce_ms),
      display_mode: self.display_mode.or(base.display_mode),
      log_level: self.log_level.or(base.log_level),
    }
  }
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
  pub metadata_endpoint: String,
  pub api_key: Option<String>,
  pub server_url: String,
  pub stream_url: String,
  pub stream_topic: String,
  pub debounce: Duration,
  /// `None` means auto-detect from the terminal environment.
  pub display_mode: Option<DisplayMode>,
  pub log_level: String,
}

impl Settings {
  pub fn resolve(config: Config) -> Self {
    let c = constants();
    Self {
      metadata_endpoint: config.metadata_endpoint.unwrap_or_else(|| c.metadata_endpoint.clone()),
      api_key: config.api_key.filter(|k| !k.trim().is_empty()),
      server_url: config.server_url.unwrap_or_else(|| c.server_url.clone()).trim_end_matches('/').to_string(),
      stream_url: config.stream_url.unwrap_or_else(|| c.stream_url.clone()),
      stream_topic: config.stream_topic.unwrap_or_else(|| c.stream_topic.clone()),
      debounce: Duration::from_millis(config.debounce_ms.unwrap_or(c.debounce_ms)),
      display_mode: config.display_mode.as_deref().and_then(DisplayMode::from_config),
      log_level: config.log_level.unwrap_or_else(|| c.default_log_level.clone()),
    }
  }
}
