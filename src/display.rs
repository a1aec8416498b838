use clap::ValueEnum;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliDisplayMode {
  Auto,
  Direct,
  Ascii,
}

/// How the poster panel draws images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
  Ascii,
  Direct,
}

impl DisplayMode {
  pub fn label(self) -> &'static str {
    match self {
      DisplayMode::Ascii => "ASCII",
      DisplayMode::Direct => "Half-block",
    }
  }

  /// Parse the `display_mode` preference. Unknown values and "auto" mean auto-detect.
  pub fn from_config(s: &str) -> Option<Self> {
    match s.to_lowercase().as_str() {
      "direct" | "half-block" => Some(DisplayMode::Direct),
      "ascii" => Some(DisplayMode::Ascii),
      _ => None,
    }
  }
}

/// Detect the best poster rendering the terminal supports.
///
/// - Direct: `COLORTERM` is `truecolor` or `24bit`, or a known true-color terminal
/// - Ascii: fallback
pub fn detect_display_mode() -> DisplayMode {
  let term = std::env::var("TERM").unwrap_or_default();
  let term_program = std::env::var("TERM_PROGRAM").unwrap_or_default().to_lowercase();

  if term == "xterm-kitty" || matches!(term_program.as_str(), "kitty" | "wezterm" | "ghostty" | "iterm.app") {
    return DisplayMode::Direct;
  }

  let colorterm = std::env::var("COLORTERM").unwrap_or_default().to_lowercase();
  if colorterm == "truecolor" || colorterm == "24bit" {
    return DisplayMode::Direct;
  }

  DisplayMode::Ascii
}

/// CLI flag wins; otherwise the preference; otherwise auto-detect.
pub fn resolve_display_mode(cli: CliDisplayMode, preferred: Option<DisplayMode>) -> DisplayMode {
  match cli {
    CliDisplayMode::Direct => DisplayMode::Direct,
    CliDisplayMode::Ascii => DisplayMode::Ascii,
    CliDisplayMode::Auto => preferred.unwrap_or_else(detect_display_mode),
  }
}
