use tracing::debug;

use crate::bus::BusEvent;
use crate::constants::constants;
use crate::movie::MovieRecord;
use crate::search::SearchStatus;
use crate::stream::VerbatimMessage;

/// Renderable state derived from bus events. Nothing else mutates it.
#[derive(Debug, Default)]
pub struct ResultPresenter {
  status: SearchStatus,
  title_display: String,
  poster: String,
  log: Vec<VerbatimMessage>,
  /// Scroll-to-bottom intents raised by appends and not yet taken by the view.
  scroll_requests: usize,
}

impl ResultPresenter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn apply(&mut self, event: BusEvent) {
    match event {
      BusEvent::Loading => self.on_loading(),
      BusEvent::SearchResult(record) => self.on_search_result(record),
      BusEvent::NewVerbatim(message) => self.on_new_verbatim(message),
      BusEvent::ClearVerbatim => self.on_clear_verbatim(),
    }
  }

  fn on_loading(&mut self) {
    self.status = SearchStatus::Loading;
    self.title_display = constants().loading_text.clone();
    self.poster = constants().loading_poster.clone();
  }

  fn on_search_result(&mut self, record: MovieRecord) {
    match record.matched_title() {
      None => {
        self.status = SearchStatus::NotFound;
        self.title_display = constants().not_found_text.clone();
        self.poster = String::new();
      }
      Some(title) => {
        self.status = SearchStatus::Found;
        self.title_display = format!("{} ({})", title, record.year.as_deref().unwrap_or_default());
        self.poster = record.poster.unwrap_or_default();
      }
    }
  }

  fn on_new_verbatim(&mut self, message: VerbatimMessage) {
    self.log.push(message);
    self.scroll_requests += 1;
  }

  fn on_clear_verbatim(&mut self) {
    debug!(dropped = self.log.len(), "presenter: clearing verbatim log");
    self.log.clear();
  }

  pub fn status(&self) -> SearchStatus {
    self.status
  }

  pub fn title_display(&self) -> &str {
    &self.title_display
  }

  pub fn poster(&self) -> &str {
    &self.poster
  }

  pub fn is_loading_poster(&self) -> bool {
    self.poster == constants().loading_poster
  }

  pub fn log(&self) -> &[VerbatimMessage] {
    &self.log
  }

  /// Take the pending scroll-to-bottom intents. The view calls this after it
  /// has read the log for the frame, so an intent never precedes its append.
  pub fn take_scroll_requests(&mut self) -> usize {
    std::mem::take(&mut self.scroll_requests)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(title: Option<&str>, year: Option<&str>, poster: Option<&str>) -> MovieRecord {
    MovieRecord {
      title: title.map(str::to_string),
      year: year.map(str::to_string),
      poster: poster.map(str::to_string),
      ..MovieRecord::default()
    }
  }

  fn verbatim(text: &str) -> VerbatimMessage {
    VerbatimMessage { text: Some(text.to_string()), ..VerbatimMessage::default() }
  }

  fn texts(p: &ResultPresenter) -> Vec<&str> {
    p.log().iter().filter_map(|m| m.text.as_deref()).collect()
  }

  #[test]
  fn starts_idle_and_empty() {
    let p = ResultPresenter::new();
    assert_eq!(p.status(), SearchStatus::Idle);
    assert_eq!(p.title_display(), "");
    assert_eq!(p.poster(), "");
    assert!(p.log().is_empty());
  }

  #[test]
  fn loading_shows_placeholder() {
    let mut p = ResultPresenter::new();
    p.apply(BusEvent::Loading);
    assert_eq!(p.status(), SearchStatus::Loading);
    assert_eq!(p.title_display(), "Loading...");
    assert_eq!(p.poster(), constants().loading_poster);
    assert!(p.is_loading_poster());
  }

  #[test]
  fn found_result_formats_title_and_year() {
    let mut p = ResultPresenter::new();
    p.apply(BusEvent::Loading);
    p.apply(BusEvent::SearchResult(record(Some("Inception"), Some("2010"), Some("p.jpg"))));
    assert_eq!(p.status(), SearchStatus::Found);
    assert_eq!(p.title_display(), "Inception (2010)");
    assert_eq!(p.poster(), "p.jpg");
    assert!(!p.is_loading_poster());
  }

  #[test]
  fn empty_result_is_not_found() {
    let mut p = ResultPresenter::new();
    p.apply(BusEvent::Loading);
    p.apply(BusEvent::SearchResult(MovieRecord::default()));
    assert_eq!(p.status(), SearchStatus::NotFound);
    assert_eq!(p.title_display(), "Movie not found!");
    assert_eq!(p.poster(), "");
  }

  #[test]
  fn empty_title_is_not_found() {
    let mut p = ResultPresenter::new();
    p.apply(BusEvent::SearchResult(record(Some(""), Some("2010"), Some("p.jpg"))));
    assert_eq!(p.title_display(), "Movie not found!");
    assert_eq!(p.poster(), "");
  }

  #[test]
  fn appends_keep_arrival_order() {
    let mut p = ResultPresenter::new();
    for t in ["a", "b", "c", "d"] {
      p.apply(BusEvent::NewVerbatim(verbatim(t)));
    }
    assert_eq!(texts(&p), vec!["a", "b", "c", "d"]);
  }

  #[test]
  fn clear_empties_log_and_count_restarts() {
    let mut p = ResultPresenter::new();
    for t in ["a", "b", "c"] {
      p.apply(BusEvent::NewVerbatim(verbatim(t)));
    }
    p.apply(BusEvent::ClearVerbatim);
    assert!(p.log().is_empty());

    p.apply(BusEvent::NewVerbatim(verbatim("x")));
    p.apply(BusEvent::NewVerbatim(verbatim("y")));
    assert_eq!(texts(&p), vec!["x", "y"]);
  }

  #[test]
  fn clear_does_not_touch_search_display() {
    let mut p = ResultPresenter::new();
    p.apply(BusEvent::SearchResult(record(Some("Heat"), Some("1995"), Some("h.jpg"))));
    p.apply(BusEvent::ClearVerbatim);
    assert_eq!(p.title_display(), "Heat (1995)");
    assert_eq!(p.poster(), "h.jpg");
  }

  #[test]
  fn one_scroll_intent_per_append() {
    let mut p = ResultPresenter::new();
    assert_eq!(p.take_scroll_requests(), 0);
    p.apply(BusEvent::NewVerbatim(verbatim("a")));
    p.apply(BusEvent::NewVerbatim(verbatim("b")));
    assert_eq!(p.take_scroll_requests(), 2);
    assert_eq!(p.take_scroll_requests(), 0);
    p.apply(BusEvent::ClearVerbatim);
    assert_eq!(p.take_scroll_requests(), 0);
  }

  #[test]
  fn match_then_clear_empties_log_regardless_of_prior_appends() {
    let mut p = ResultPresenter::new();
    let events = vec![
      BusEvent::NewVerbatim(verbatim("old-1")),
      BusEvent::Loading,
      BusEvent::NewVerbatim(verbatim("old-2")),
      BusEvent::SearchResult(record(Some("Up"), Some("2009"), Some("u.jpg"))),
      BusEvent::NewVerbatim(verbatim("old-3")),
      BusEvent::ClearVerbatim,
    ];
    for e in events {
      p.apply(e);
    }
    assert!(p.log().is_empty());
    assert_eq!(p.title_display(), "Up (2009)");
  }
}
