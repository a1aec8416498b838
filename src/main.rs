mod app;
mod bus;
mod config;
mod constants;
mod display;
mod graphics;
mod input;
mod logging;
mod movie;
mod presenter;
mod search;
mod stomp;
mod stream;
mod ui;

use anyhow::Result;
use clap::Parser;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use std::time::Duration;
use tracing::info;

use app::App;
use config::{Config, Settings};
use display::CliDisplayMode;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Poster rendering: 'auto', 'direct' (half-block), or 'ascii' (default: auto-detect)
  #[arg(short, long, default_value = "auto")]
  display_mode: CliDisplayMode,

  /// Movie metadata endpoint
  #[arg(long)]
  endpoint: Option<String>,

  /// API key sent to the metadata endpoint
  #[arg(long)]
  api_key: Option<String>,

  /// Base URL of the verbatim server
  #[arg(long)]
  server: Option<String>,

  /// WebSocket URL of the verbatim stream
  #[arg(long)]
  stream_url: Option<String>,

  /// Quiet period after the last keystroke before searching
  #[arg(long)]
  debounce_ms: Option<u64>,

  /// Log filter, e.g. 'debug' or 'marquee=trace' (RUST_LOG wins)
  #[arg(long)]
  log_level: Option<String>,
}

impl Args {
  fn config(&self) -> Config {
    Config {
      metadata_endpoint: self.endpoint.clone(),
      api_key: self.api_key.clone(),
      server_url: self.server.clone(),
      stream_url: self.stream_url.clone(),
      stream_topic: None,
      debounce_ms: self.debounce_ms,
      display_mode: None,
      log_level: self.log_level.clone(),
    }
  }
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let settings = Settings::resolve(args.config().or(Config::load()));

  let _log_guard = match logging::init_logging(&settings.log_level) {
    Ok(guard) => Some(guard),
    Err(e) => {
      eprintln!("warning: logging disabled: {:#}", e);
      None
    }
  };
  info!(
    endpoint = %settings.metadata_endpoint,
    server = %settings.server_url,
    stream = %settings.stream_url,
    "marquee starting"
  );

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, args.display_mode, &settings).await;
  ratatui::restore();
  result
}

async fn run(terminal: &mut DefaultTerminal, cli_mode: CliDisplayMode, settings: &Settings) -> Result<()> {
  let display_mode = display::resolve_display_mode(cli_mode, settings.display_mode);
  info!(mode = display_mode.label(), "poster display mode");

  let mut app = App::new(settings, display_mode);
  app.start();

  loop {
    app.check_pending();

    terminal.draw(|frame| ui::ui(frame, &mut app))?;

    if event::poll(Duration::from_millis(50))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key);
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  app.shutdown();
  Ok(())
}
