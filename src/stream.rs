//! Live verbatim stream: one STOMP-over-WebSocket subscription per process.
//!
//! Each `MESSAGE` body is decoded into a [`VerbatimMessage`] and published as
//! `NewVerbatim`. A body that fails to decode is dropped on its own; the
//! subscription keeps listening. There is no reconnection: once the
//! connection fails or closes the subscriber stays inert.

use chrono::{DateTime, Utc};
use futures::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::stomp::{Command, Frame, StompError};

/// A message pushed by the live stream. Every field is optional; unknown
/// fields are retained in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerbatimMessage {
  pub source: Option<String>,
  pub text: Option<String>,
  pub author_name: Option<String>,
  pub user_name: Option<String>,
  pub user_pic: Option<String>,
  /// Epoch milliseconds or an RFC 3339 string, depending on the server's serializer.
  pub date_posted: Option<serde_json::Value>,
  /// Classifier name to review label, e.g. `NB -> POSITIVE`.
  pub sentiment: Option<BTreeMap<String, String>>,
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

impl VerbatimMessage {
  pub fn posted_at(&self) -> Option<DateTime<Utc>> {
    match self.date_posted.as_ref()? {
      serde_json::Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
      serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc)),
      _ => None,
    }
  }
}

#[derive(Debug, Error)]
pub enum StreamError {
  #[error("invalid STOMP frame: {0}")]
  Frame(#[from] StompError),
  #[error("invalid verbatim payload: {0}")]
  Decode(#[from] serde_json::Error),
  #[error("broker sent ERROR: {0}")]
  Broker(String),
  #[error("transport error: {0}")]
  Transport(#[from] tokio_tungstenite::tungstenite::Error),
  #[error("connection closed")]
  Closed,
}

/// Decode a `MESSAGE` body.
pub fn decode_verbatim(body: &str) -> Result<VerbatimMessage, StreamError> {
  Ok(serde_json::from_str(body)?)
}

/// Read frames until the broker acknowledges the connection.
pub async fn await_connected<S>(texts: &mut S) -> Result<Frame, StreamError>
where
  S: Stream<Item = Result<String, StreamError>> + Unpin,
{
  while let Some(text) = texts.next().await {
    let Some(frame) = Frame::parse(&text?)? else { continue };
    match frame.command {
      Command::Connected => return Ok(frame),
      Command::Error => return Err(StreamError::Broker(broker_message(&frame))),
      other => debug!(command = other.as_str(), "stream: ignoring frame before CONNECTED"),
    }
  }
  Err(StreamError::Closed)
}

/// Forward every decodable `MESSAGE` to the bus until the stream ends.
///
/// Returns the error that ended the subscription. Per-message problems
/// (unparseable frame, undecodable body) are logged and skipped.
pub async fn pump<S>(texts: &mut S, bus: &EventBus) -> StreamError
where
  S: Stream<Item = Result<String, StreamError>> + Unpin,
{
  while let Some(text) = texts.next().await {
    let text = match text {
      Ok(text) => text,
      Err(e) => return e,
    };
    let frame = match Frame::parse(&text) {
      Ok(Some(frame)) => frame,
      Ok(None) => continue,
      Err(e) => {
        warn!(err = %e, "stream: dropping unparseable frame");
        continue;
      }
    };
    match frame.command {
      Command::Message => match decode_verbatim(&frame.body) {
        Ok(message) => bus.emit(BusEvent::NewVerbatim(message)),
        Err(e) => warn!(err = %e, message_id = frame.get("message-id").unwrap_or("?"), "stream: dropping message"),
      },
      Command::Error => return StreamError::Broker(broker_message(&frame)),
      other => debug!(command = other.as_str(), "stream: ignoring frame"),
    }
  }
  StreamError::Closed
}

fn broker_message(frame: &Frame) -> String {
  frame.get("message").map(str::to_string).unwrap_or_else(|| frame.body.trim().to_string())
}

/// Owns the single live subscription.
pub struct StreamSubscriber {
  url: String,
  topic: String,
  bus: EventBus,
  task: Option<JoinHandle<()>>,
}

impl StreamSubscriber {
  pub fn new(url: String, topic: String, bus: EventBus) -> Self {
    Self { url, topic, bus, task: None }
  }

  /// Open the connection and the subscription in a background task.
  ///
  /// Calling this while a subscription task is still alive does nothing, so
  /// at most one subscription exists at a time. Must be called from within a
  /// tokio runtime.
  pub fn start(&mut self) {
    if self.is_running() {
      warn!(url = %self.url, "stream: start called while already subscribed, ignoring");
      return;
    }
    let url = self.url.clone();
    let topic = self.topic.clone();
    let bus = self.bus.clone();
    self.task = Some(tokio::spawn(async move {
      if let Err(e) = subscribe(&url, &topic, &bus).await {
        warn!(url = %url, err = %e, "stream: subscription ended");
      }
    }));
  }

  pub fn is_running(&self) -> bool {
    self.task.as_ref().is_some_and(|t| !t.is_finished())
  }

  /// Drop the subscription. The log already received is untouched.
  pub fn dispose(&mut self) {
    if let Some(task) = self.task.take() {
      info!("stream: disposing subscription");
      task.abort();
    }
  }
}

impl Drop for StreamSubscriber {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

async fn subscribe(url: &str, topic: &str, bus: &EventBus) -> Result<(), StreamError> {
  let (ws, _) = tokio_tungstenite::connect_async(url).await?;
  let (mut sink, source) = ws.split();

  let mut texts = std::pin::pin!(source.filter_map(|msg| async move {
    match msg {
      Ok(Message::Text(text)) => Some(Ok(text.as_str().to_string())),
      Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
      Ok(Message::Close(_)) => Some(Err(StreamError::Closed)),
      Ok(_) => None,
      Err(e) => Some(Err(StreamError::Transport(e))),
    }
  }));

  let host = reqwest::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default();
  sink.send(Message::text(Frame::connect(&host).encode())).await?;
  let connected = await_connected(&mut texts).await?;
  info!(url = %url, version = connected.get("version").unwrap_or("?"), "stream: connected");

  sink.send(Message::text(Frame::subscribe("sub-0", topic).encode())).await?;
  info!(topic = %topic, "stream: subscribed");

  match pump(&mut texts, bus).await {
    StreamError::Closed => {
      info!("stream: connection closed by server");
      Ok(())
    }
    e => Err(e),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::stream;
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;
  use tokio::net::TcpListener;

  fn message_frame(body: &str) -> String {
    Frame { command: Command::Message, headers: vec![("destination".into(), "/stream/verbatim".into())], body: body.into() }
      .encode()
  }

  fn texts(items: Vec<String>) -> impl Stream<Item = Result<String, StreamError>> + Unpin {
    stream::iter(items.into_iter().map(Ok))
  }

  fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<BusEvent>) -> Vec<VerbatimMessage> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
      match event {
        BusEvent::NewVerbatim(m) => out.push(m),
        other => panic!("unexpected event {:?}", other),
      }
    }
    out
  }

  #[test]
  fn decodes_full_verbatim() {
    let body = r#"{
      "source":"TWITTER","text":"Loved it","authorName":"Ann","userName":"ann",
      "userPic":"http://pic","datePosted":1456790400000,
      "sentiment":{"NB":"POSITIVE","SVM":"NEGATIVE"},"lang":"en"
    }"#;
    let m = decode_verbatim(body).unwrap();
    assert_eq!(m.source.as_deref(), Some("TWITTER"));
    assert_eq!(m.user_name.as_deref(), Some("ann"));
    assert_eq!(m.sentiment.as_ref().and_then(|s| s.get("SVM")).map(String::as_str), Some("NEGATIVE"));
    assert_eq!(m.posted_at().map(|d| d.timestamp()), Some(1_456_790_400));
    assert_eq!(m.extra.get("lang").and_then(|v| v.as_str()), Some("en"));
  }

  #[test]
  fn decodes_sparse_verbatim() {
    let m = decode_verbatim("{}").unwrap();
    assert_eq!(m, VerbatimMessage::default());
    assert_eq!(m.posted_at(), None);
  }

  #[test]
  fn rfc3339_date_is_understood() {
    let m = decode_verbatim(r#"{"datePosted":"2016-03-01T00:00:00Z"}"#).unwrap();
    assert_eq!(m.posted_at().map(|d| d.timestamp()), Some(1_456_790_400));
  }

  #[test]
  fn non_object_payload_is_a_decode_error() {
    assert!(matches!(decode_verbatim("[1,2]"), Err(StreamError::Decode(_))));
    assert!(matches!(decode_verbatim("{not json"), Err(StreamError::Decode(_))));
  }

  #[tokio::test]
  async fn messages_are_forwarded_in_arrival_order() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let mut input = texts(vec![
      message_frame(r#"{"text":"one"}"#),
      "\n".to_string(),
      message_frame(r#"{"text":"two"}"#),
      message_frame(r#"{"text":"three"}"#),
    ]);

    let end = pump(&mut input, &bus).await;
    assert!(matches!(end, StreamError::Closed));
    let got: Vec<_> = drain(&mut rx).into_iter().filter_map(|m| m.text).collect();
    assert_eq!(got, vec!["one", "two", "three"]);
  }

  #[tokio::test]
  async fn malformed_payload_does_not_end_subscription() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let mut input = texts(vec![
      message_frame("{broken"),
      "GARBAGE".to_string(),
      message_frame(r#"{"text":"still here"}"#),
    ]);

    pump(&mut input, &bus).await;
    let got = drain(&mut rx);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].text.as_deref(), Some("still here"));
  }

  #[tokio::test]
  async fn broker_error_ends_pump() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let error = Frame::new(Command::Error).header("message", "access denied").encode();
    let mut input = texts(vec![error, message_frame(r#"{"text":"late"}"#)]);

    match pump(&mut input, &bus).await {
      StreamError::Broker(msg) => assert_eq!(msg, "access denied"),
      other => panic!("unexpected end {:?}", other),
    }
    assert!(drain(&mut rx).is_empty());
  }

  #[tokio::test]
  async fn transport_error_ends_pump() {
    let bus = EventBus::new();
    let mut input = stream::iter(vec![Err(StreamError::Closed), Ok(message_frame("{}"))]);
    assert!(matches!(pump(&mut input, &bus).await, StreamError::Closed));
  }

  #[tokio::test]
  async fn await_connected_skips_heartbeats() {
    let mut input = texts(vec!["\n".to_string(), "CONNECTED\nversion:1.2\n\n\0".to_string()]);
    let frame = await_connected(&mut input).await.unwrap();
    assert_eq!(frame.get("version"), Some("1.2"));
  }

  #[tokio::test]
  async fn await_connected_reports_broker_error() {
    let mut input = texts(vec!["ERROR\nmessage:bad login\n\n\0".to_string()]);
    assert!(matches!(await_connected(&mut input).await, Err(StreamError::Broker(m)) if m == "bad login"));
  }

  #[tokio::test]
  async fn await_connected_on_empty_stream_is_closed() {
    let mut input = texts(Vec::new());
    assert!(matches!(await_connected(&mut input).await, Err(StreamError::Closed)));
  }

  async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
  }

  #[tokio::test]
  async fn connect_failure_leaves_subscriber_inert() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    let url = format!("ws://127.0.0.1:{}/stream/websocket", unused_port().await);
    let mut subscriber = StreamSubscriber::new(url, "/t".into(), bus);
    subscriber.start();
    for _ in 0..200 {
      if !subscriber.is_running() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!subscriber.is_running());
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn dispose_stops_the_task() {
    let url = format!("ws://127.0.0.1:{}/stream/websocket", unused_port().await);
    let mut subscriber = StreamSubscriber::new(url, "/t".into(), EventBus::new());
    subscriber.start();
    subscriber.dispose();
    assert!(!subscriber.is_running());
  }

  #[tokio::test]
  async fn second_start_while_connected_is_ignored() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/stream/websocket", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    // Accepts connections and never answers the handshake, so the task stays alive.
    let server = tokio::spawn(async move {
      let mut held = Vec::new();
      while let Ok((socket, _)) = listener.accept().await {
        counter.fetch_add(1, Ordering::SeqCst);
        held.push(socket);
      }
    });

    let mut subscriber = StreamSubscriber::new(url, "/t".into(), EventBus::new());
    subscriber.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    subscriber.start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(subscriber.is_running());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    subscriber.dispose();
    server.abort();
  }
}
