//! Typed event bus shared by the search coordinator, the stream subscriber
//! and the presenter.
//!
//! Every subscriber owns an unbounded FIFO queue. `emit` pushes a clone of the
//! event into each live queue in one step, so all subscribers observe events
//! in the same order. Whoever drains a queue applies events one at a time.

use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use tracing::trace;

use crate::movie::MovieRecord;
use crate::stream::VerbatimMessage;

/// Events exchanged between components.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
  /// A debounced lookup is about to be issued.
  Loading,
  /// Lookup finished. A record without a title means "not found".
  SearchResult(MovieRecord),
  /// A message arrived on the live stream.
  NewVerbatim(VerbatimMessage),
  /// The update notification for a matched movie completed.
  ClearVerbatim,
}

impl BusEvent {
  pub fn name(&self) -> &'static str {
    match self {
      BusEvent::Loading => "loading",
      BusEvent::SearchResult(_) => "search-result",
      BusEvent::NewVerbatim(_) => "new-verbatim",
      BusEvent::ClearVerbatim => "clear-verbatim",
    }
  }
}

#[derive(Clone, Default)]
pub struct EventBus {
  subscribers: Arc<StdMutex<Vec<mpsc::UnboundedSender<BusEvent>>>>,
}

impl EventBus {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a new subscriber. Events emitted before this call are not replayed.
  pub fn subscribe(&self) -> mpsc::UnboundedReceiver<BusEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.lock().push(tx);
    rx
  }

  /// Deliver `event` to every live subscriber. Subscribers whose receiver was
  /// dropped are pruned.
  pub fn emit(&self, event: BusEvent) {
    trace!(event = event.name(), "bus: emit");
    // The lock is held across all sends so concurrent emitters cannot interleave.
    self.lock().retain(|tx| tx.send(event.clone()).is_ok());
  }

  pub fn subscriber_count(&self) -> usize {
    self.lock().len()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<BusEvent>>> {
    // A panic while holding this lock can only come from a send, which never panics;
    // recover the guard instead of propagating poison.
    self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}
