//! Debounced movie search.
//!
//! Every keystroke re-arms a single timer. When the timer survives a quiet
//! period, the coordinator emits `Loading`, looks up the query current at that
//! moment and publishes the result on the bus. A confirmed match is followed by
//! the update notification and, once that completes, a `ClearVerbatim`.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::movie::MovieApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStatus {
  #[default]
  Idle,
  Loading,
  Found,
  NotFound,
}

#[derive(Default)]
struct SearchState {
  query: String,
  /// The armed debounce timer. Cleared when it fires or is cancelled.
  pending: Option<JoinHandle<()>>,
  /// When the armed timer is due.
  deadline: Option<Instant>,
  /// Bumped whenever a timer is armed or cancelled; a timer only fires if its
  /// generation is still current.
  generation: u64,
  /// Bumped for every issued lookup and on blank input; responses for older
  /// requests are discarded.
  request: u64,
  status: SearchStatus,
}

/// Shared pieces a timer task needs after it wakes up.
#[derive(Clone)]
struct Shared {
  state: Arc<StdMutex<SearchState>>,
  api: Arc<dyn MovieApi>,
  bus: EventBus,
}

impl Shared {
  fn lock(&self) -> MutexGuard<'_, SearchState> {
    // Never held across an await; recover the guard rather than propagate poison.
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

pub struct SearchCoordinator {
  shared: Shared,
  delay: Duration,
}

impl SearchCoordinator {
  pub fn new(api: Arc<dyn MovieApi>, bus: EventBus, delay: Duration) -> Self {
    Self { shared: Shared { state: Arc::new(StdMutex::new(SearchState::default())), api, bus }, delay }
  }

  /// Record `text` as the current query and re-arm the debounce timer.
  ///
  /// The previous timer is cancelled before the new one is armed, unless it
  /// is already due: then its lookup is issued with the text it expired on.
  /// Blank input only cancels, and discards any in-flight response. Must be
  /// called from within a tokio runtime.
  pub fn on_input(&self, text: &str) {
    let query = text.trim().to_string();
    let mut state = self.shared.lock();

    let due = state.pending.is_some() && state.deadline.is_some_and(|d| d <= Instant::now());
    if due {
      let expired = std::mem::take(&mut state.query);
      debug!(query = %expired, "search: timer due at input, firing");
      let issued = Self::begin_lookup(&self.shared.bus, &mut state, expired);
      tokio::spawn(Self::complete_lookup(self.shared.clone(), issued));
    }

    state.query = query;
    Self::cancel_pending(&mut state);

    if state.query.is_empty() {
      debug!("search: blank query, timer not armed");
      state.request = state.request.wrapping_add(1);
      return;
    }

    let generation = state.generation;
    let shared = self.shared.clone();
    let delay = self.delay;
    state.deadline = Some(Instant::now() + delay);
    state.pending = Some(tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      Self::run_lookup(shared, generation).await;
    }));
  }

  /// Cancel any armed timer. In-flight lookups are not interrupted.
  pub fn dispose(&self) {
    let mut state = self.shared.lock();
    Self::cancel_pending(&mut state);
  }

  pub fn status(&self) -> SearchStatus {
    self.shared.lock().status
  }

  pub fn query(&self) -> String {
    self.shared.lock().query.clone()
  }

  pub fn has_pending_timer(&self) -> bool {
    self.shared.lock().pending.is_some()
  }

  fn cancel_pending(state: &mut SearchState) {
    if let Some(handle) = state.pending.take() {
      handle.abort();
    }
    state.deadline = None;
    state.generation = state.generation.wrapping_add(1);
  }

  async fn run_lookup(shared: Shared, generation: u64) {
    let issued = {
      let mut state = shared.lock();
      if state.generation != generation {
        // Superseded between wake-up and here.
        return;
      }
      state.pending = None;
      state.deadline = None;
      let query = state.query.clone();
      Self::begin_lookup(&shared.bus, &mut state, query)
    };
    Self::complete_lookup(shared, issued).await;
  }

  /// Mark a lookup for `query` as issued and announce it. Returns the query
  /// with its request token.
  fn begin_lookup(bus: &EventBus, state: &mut SearchState, query: String) -> (String, u64) {
    state.status = SearchStatus::Loading;
    state.request = state.request.wrapping_add(1);
    bus.emit(BusEvent::Loading);
    (query, state.request)
  }

  async fn complete_lookup(shared: Shared, (query, request): (String, u64)) {
    info!(query = %query, request, "search: lookup issued");
    let record = match shared.api.lookup(&query).await {
      Ok(record) => record,
      Err(e) => {
        warn!(query = %query, err = %format!("{:#}", e), "search: lookup failed");
        return;
      }
    };

    let matched = record.matched_title().map(str::to_string);
    {
      let mut state = shared.lock();
      if state.request != request {
        debug!(query = %query, request, latest = state.request, "search: discarding stale response");
        return;
      }
      state.status = if matched.is_some() { SearchStatus::Found } else { SearchStatus::NotFound };
      // Emitted under the lock so a newer lookup cannot announce itself in between.
      shared.bus.emit(BusEvent::SearchResult(record));
    }

    let Some(name) = matched else {
      info!(query = %query, "search: no match");
      return;
    };
    info!(title = %name, "search: matched, notifying update");
    match shared.api.notify_update(&name).await {
      Ok(()) => shared.bus.emit(BusEvent::ClearVerbatim),
      Err(e) => warn!(title = %name, err = %format!("{:#}", e), "search: update notification failed"),
    }
  }
}

impl Drop for SearchCoordinator {
  fn drop(&mut self) {
    self.dispose();
  }
}
