//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! with no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Collaborator endpoints
  pub metadata_endpoint: String,
  pub server_url: String,
  pub stream_url: String,
  pub stream_topic: String,
  pub update_path: String,

  // Search
  pub debounce_ms: u64,

  // Presenter display strings
  pub loading_text: String,
  pub not_found_text: String,
  pub loading_poster: String,

  // Logging
  pub log_file_prefix: String,
  pub default_log_level: String,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.debounce_ms, 1000);
    assert_eq!(c.stream_topic, "/stream/verbatim");
    assert_eq!(c.update_path, "/movie/update");
  }

  #[test]
  fn display_strings_match_presenter_contract() {
    let c = constants();
    assert_eq!(c.loading_text, "Loading...");
    assert_eq!(c.not_found_text, "Movie not found!");
    assert!(!c.loading_poster.is_empty());
  }
}
