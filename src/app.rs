use anyhow::Result;
use image::DynamicImage;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::config::Settings;
use crate::display::DisplayMode;
use crate::movie::{HttpMovieApi, MovieApi, fetch_poster, is_remote_poster};
use crate::presenter::ResultPresenter;
use crate::search::SearchCoordinator;
use crate::stream::StreamSubscriber;

type PosterResult = (String, Result<DynamicImage>);

/// Poster image state for the current search result.
#[derive(Default)]
pub struct PosterCache {
  /// URL currently shown or being fetched.
  pub url: Option<String>,
  pub image: Option<DynamicImage>,
  /// `image` fitted to the last poster area: (width, height, image).
  pub fitted: Option<(u16, u16, DynamicImage)>,
  rx: Option<oneshot::Receiver<PosterResult>>,
}

impl PosterCache {
  fn reset(&mut self) {
    *self = Self::default();
  }

  pub fn is_fetching(&self) -> bool {
    self.rx.is_some()
  }
}

pub struct App {
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub should_quit: bool,
  pub display_mode: DisplayMode,
  pub presenter: ResultPresenter,
  /// Log rows scrolled up from the newest entry; 0 follows the stream.
  pub log_offset: usize,
  pub poster: PosterCache,
  events: mpsc::UnboundedReceiver<BusEvent>,
  search: SearchCoordinator,
  stream: StreamSubscriber,
  http_client: Client,
}

impl App {
  pub fn new(settings: &Settings, display_mode: DisplayMode) -> Self {
    let http_client = Client::new();
    let api = Arc::new(HttpMovieApi::new(http_client.clone(), settings));
    Self::with_parts(settings, display_mode, EventBus::new(), api, http_client)
  }

  pub fn with_parts(
    settings: &Settings,
    display_mode: DisplayMode,
    bus: EventBus,
    api: Arc<dyn MovieApi>,
    http_client: Client,
  ) -> Self {
    let events = bus.subscribe();
    let search = SearchCoordinator::new(api, bus.clone(), settings.debounce);
    debug!(subscribers = bus.subscriber_count(), "app: bus wired");
    let stream = StreamSubscriber::new(settings.stream_url.clone(), settings.stream_topic.clone(), bus);

    Self {
      input: String::new(),
      cursor_position: 0,
      input_scroll: 0,
      should_quit: false,
      display_mode,
      presenter: ResultPresenter::new(),
      log_offset: 0,
      poster: PosterCache::default(),
      events,
      search,
      stream,
      http_client,
    }
  }

  /// Open the live stream subscription. Called once at startup.
  pub fn start(&mut self) {
    info!("app: starting stream subscription");
    self.stream.start();
  }

  pub fn shutdown(&mut self) {
    info!(
      query = %self.search.query(),
      status = ?self.search.status(),
      pending = self.search.has_pending_timer(),
      "app: shutting down"
    );
    self.search.dispose();
    self.stream.dispose();
  }

  /// Forward the current input text to the search coordinator.
  pub fn on_input_changed(&mut self) {
    self.search.on_input(&self.input);
  }

  /// Apply every queued bus event to the presenter, in order, then reconcile
  /// the poster fetch with the presenter's poster reference.
  pub fn check_pending(&mut self) {
    while let Ok(event) = self.events.try_recv() {
      debug!(event = event.name(), "app: applying event");
      self.presenter.apply(event);
    }
    self.sync_poster();
    self.poll_poster();
  }

  fn sync_poster(&mut self) {
    let wanted = self.presenter.poster();
    if !is_remote_poster(wanted) {
      if self.poster.url.is_some() {
        self.poster.reset();
      }
      return;
    }
    if self.poster.url.as_deref() == Some(wanted) {
      return;
    }

    let url = wanted.to_string();
    self.poster.reset();
    self.poster.url = Some(url.clone());

    let client = self.http_client.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = fetch_poster(&client, &url).await;
      let _ = tx.send((url, result));
    });
    self.poster.rx = Some(rx);
  }

  fn poll_poster(&mut self) {
    let Some(mut rx) = self.poster.rx.take() else { return };
    match rx.try_recv() {
      Ok((url, result)) => {
        if self.poster.url.as_deref() != Some(url.as_str()) {
          return;
        }
        match result {
          Ok(image) => {
            self.poster.image = Some(image);
            self.poster.fitted = None;
          }
          // Poster failures are cosmetic; the title line already shows the match.
          Err(e) => warn!(url = %url, err = %format!("{:#}", e), "app: poster fetch failed"),
        }
      }
      Err(oneshot::error::TryRecvError::Empty) => {
        self.poster.rx = Some(rx);
      }
      Err(oneshot::error::TryRecvError::Closed) => {}
    }
  }

  pub fn scroll_log_up(&mut self, rows: usize) {
    self.log_offset = self.log_offset.saturating_add(rows).min(self.presenter.log().len());
  }

  pub fn scroll_log_down(&mut self, rows: usize) {
    self.log_offset = self.log_offset.saturating_sub(rows);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::movie::MovieRecord;
  use crate::search::SearchStatus;
  use crate::stream::VerbatimMessage;
  use async_trait::async_trait;
  use std::time::Duration;

  struct OneMovie;

  #[async_trait]
  impl MovieApi for OneMovie {
    async fn lookup(&self, name: &str) -> anyhow::Result<MovieRecord> {
      if name != "Up" {
        return Ok(MovieRecord::default());
      }
      Ok(MovieRecord {
        title: Some("Up".to_string()),
        year: Some("2009".to_string()),
        poster: Some("N/A".to_string()),
        ..MovieRecord::default()
      })
    }

    async fn notify_update(&self, _name: &str) -> anyhow::Result<()> {
      Ok(())
    }
  }

  fn app() -> (App, EventBus) {
    let settings = Settings::resolve(Config::default());
    let bus = EventBus::new();
    let app = App::with_parts(&settings, DisplayMode::Ascii, bus.clone(), Arc::new(OneMovie), Client::new());
    (app, bus)
  }

  fn verbatim(text: &str) -> BusEvent {
    BusEvent::NewVerbatim(VerbatimMessage { text: Some(text.to_string()), ..VerbatimMessage::default() })
  }

  #[tokio::test(start_paused = true)]
  async fn typing_a_match_updates_title_and_clears_log() {
    let (mut app, bus) = app();
    bus.emit(verbatim("before"));
    app.check_pending();
    assert_eq!(app.presenter.log().len(), 1);

    app.input = "Up".to_string();
    app.on_input_changed();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    app.check_pending();

    assert_eq!(app.presenter.status(), SearchStatus::Found);
    assert_eq!(app.presenter.title_display(), "Up (2009)");
    assert!(app.presenter.log().is_empty());
    // "N/A" is not fetchable.
    assert!(app.poster.url.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn unknown_movie_shows_not_found() {
    let (mut app, _bus) = app();
    app.input = "qwerty".to_string();
    app.on_input_changed();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    app.check_pending();

    assert_eq!(app.presenter.title_display(), "Movie not found!");
    assert_eq!(app.presenter.poster(), "");
  }

  async fn unused_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
  }

  #[tokio::test]
  async fn remote_poster_starts_one_fetch() {
    let (mut app, bus) = app();
    let poster = format!("http://127.0.0.1:{}/heat.jpg", unused_port().await);
    let record = MovieRecord {
      title: Some("Heat".to_string()),
      year: Some("1995".to_string()),
      poster: Some(poster.clone()),
      ..MovieRecord::default()
    };
    bus.emit(BusEvent::SearchResult(record));
    app.check_pending();
    assert_eq!(app.poster.url.as_deref(), Some(poster.as_str()));
    assert!(app.poster.image.is_none());

    // Re-applying the same result does not restart the fetch.
    app.check_pending();
    assert_eq!(app.poster.url.as_deref(), Some(poster.as_str()));

    bus.emit(BusEvent::Loading);
    app.check_pending();
    assert!(app.poster.url.is_none());
    assert!(!app.poster.is_fetching());
  }

  #[test]
  fn log_scroll_is_clamped() {
    let (mut app, bus) = app();
    for t in ["a", "b", "c"] {
      bus.emit(verbatim(t));
    }
    app.check_pending();

    app.scroll_log_up(10);
    assert_eq!(app.log_offset, 3);
    app.scroll_log_down(1);
    assert_eq!(app.log_offset, 2);
    app.scroll_log_down(10);
    assert_eq!(app.log_offset, 0);
  }
}
