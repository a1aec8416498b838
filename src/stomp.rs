//! Minimal STOMP 1.2 frame codec, enough for a subscribe-only client.
//!
//! A frame is `COMMAND EOL *(header EOL) EOL body NUL`. EOL may be `\n` or
//! `\r\n`. A text message made only of EOLs is a heart-beat.

use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StompError {
  #[error("frame is missing its NUL terminator")]
  MissingTerminator,
  #[error("unknown STOMP command {0:?}")]
  UnknownCommand(String),
  #[error("malformed header line {0:?}")]
  MalformedHeader(String),
  #[error("content-length {declared} exceeds body of {actual} bytes")]
  BadContentLength { declared: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
  Connect,
  Connected,
  Subscribe,
  Unsubscribe,
  Disconnect,
  Message,
  Receipt,
  Error,
}

impl Command {
  pub fn as_str(self) -> &'static str {
    match self {
      Command::Connect => "CONNECT",
      Command::Connected => "CONNECTED",
      Command::Subscribe => "SUBSCRIBE",
      Command::Unsubscribe => "UNSUBSCRIBE",
      Command::Disconnect => "DISCONNECT",
      Command::Message => "MESSAGE",
      Command::Receipt => "RECEIPT",
      Command::Error => "ERROR",
    }
  }

  /// CONNECT and CONNECTED frames do not escape header values.
  fn escapes_headers(self) -> bool {
    !matches!(self, Command::Connect | Command::Connected)
  }
}

impl FromStr for Command {
  type Err = StompError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "CONNECT" | "STOMP" => Command::Connect,
      "CONNECTED" => Command::Connected,
      "SUBSCRIBE" => Command::Subscribe,
      "UNSUBSCRIBE" => Command::Unsubscribe,
      "DISCONNECT" => Command::Disconnect,
      "MESSAGE" => Command::Message,
      "RECEIPT" => Command::Receipt,
      "ERROR" => Command::Error,
      other => return Err(StompError::UnknownCommand(other.to_string())),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  pub command: Command,
  pub headers: Vec<(String, String)>,
  pub body: String,
}

impl Frame {
  pub fn new(command: Command) -> Self {
    Self { command, headers: Vec::new(), body: String::new() }
  }

  pub fn header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn connect(host: &str) -> Self {
    Frame::new(Command::Connect).header("accept-version", "1.1,1.2").header("host", host).header("heart-beat", "0,0")
  }

  pub fn subscribe(id: &str, destination: &str) -> Self {
    Frame::new(Command::Subscribe).header("id", id).header("destination", destination).header("ack", "auto")
  }

  /// First occurrence wins when a header is repeated.
  pub fn get(&self, name: &str) -> Option<&str> {
    self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
  }

  pub fn encode(&self) -> String {
    let mut out = String::with_capacity(64 + self.body.len());
    out.push_str(self.command.as_str());
    out.push('\n');
    for (name, value) in &self.headers {
      if self.command.escapes_headers() {
        let _ = writeln!(out, "{}:{}", escape(name), escape(value));
      } else {
        let _ = writeln!(out, "{}:{}", name, value);
      }
    }
    out.push('\n');
    out.push_str(&self.body);
    out.push('\0');
    out
  }

  /// Parse one frame. Returns `Ok(None)` for a heart-beat.
  pub fn parse(raw: &str) -> Result<Option<Frame>, StompError> {
    let raw = raw.trim_start_matches(['\r', '\n']);
    if raw.is_empty() {
      return Ok(None);
    }

    let (head, rest) = split_head(raw).ok_or(StompError::MissingTerminator)?;
    let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
    let command: Command = lines.next().unwrap_or_default().parse()?;

    let mut headers = Vec::new();
    for line in lines {
      let (name, value) = line.split_once(':').ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
      if command.escapes_headers() {
        headers.push((unescape(name)?, unescape(value)?));
      } else {
        headers.push((name.to_string(), value.to_string()));
      }
    }

    let mut frame = Frame { command, headers, body: String::new() };
    let declared = frame.get("content-length").and_then(|v| v.trim().parse::<usize>().ok());
    frame.body = match declared {
      Some(len) => {
        if rest.len() <= len || !rest.is_char_boundary(len) {
          return Err(StompError::BadContentLength { declared: len, actual: rest.len() });
        }
        rest[..len].to_string()
      }
      None => {
        let end = rest.find('\0').ok_or(StompError::MissingTerminator)?;
        rest[..end].to_string()
      }
    };
    Ok(Some(frame))
  }
}

/// Split at the blank line that ends the headers.
fn split_head(raw: &str) -> Option<(&str, &str)> {
  let lf = raw.find("\n\n").map(|i| (i, 2));
  let crlf = raw.find("\r\n\r\n").map(|i| (i, 4));
  let (idx, sep) = match (lf, crlf) {
    (Some(a), Some(b)) => {
      if a.0 < b.0 {
        a
      } else {
        b
      }
    }
    (Some(a), None) => a,
    (None, Some(b)) => b,
    (None, None) => return None,
  };
  Some((&raw[..idx], &raw[idx + sep..]))
}

fn escape(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      ':' => out.push_str("\\c"),
      c => out.push(c),
    }
  }
  out
}

fn unescape(s: &str) -> Result<String, StompError> {
  let mut out = String::with_capacity(s.len());
  let mut chars = s.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('\\') => out.push('\\'),
      Some('n') => out.push('\n'),
      Some('r') => out.push('\r'),
      Some('c') => out.push(':'),
      _ => return Err(StompError::MalformedHeader(s.to_string())),
    }
  }
  Ok(out)
}
