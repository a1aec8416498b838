use chrono::Local;
use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, BorderType, List, ListItem, Padding, Paragraph},
};

use crate::app::App;
use crate::graphics::{PosterWidget, fit_poster};
use crate::search::SearchStatus;
use crate::stream::VerbatimMessage;

// --- Palette ---

const ACCENT: Color = Color::Rgb(0xe0, 0xaf, 0x68);
const FG: Color = Color::Rgb(0xc0, 0xca, 0xf5);
const MUTED: Color = Color::Rgb(0x56, 0x5f, 0x89);
const BORDER: Color = Color::Rgb(0x3b, 0x42, 0x61);
const POSITIVE: Color = Color::Rgb(0x9e, 0xce, 0x6a);
const NEGATIVE: Color = Color::Rgb(0xf7, 0x76, 0x8e);
const KEY_FG: Color = Color::Rgb(0x1a, 0x1b, 0x26);

const POSTER_WIDTH: u16 = 32;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// Range of log rows to show for a viewport of `height` rows scrolled
/// `offset` rows up from the newest entry.
pub fn visible_window(total: usize, height: usize, offset: usize) -> (usize, usize) {
  let end = total - offset.min(total);
  (end.saturating_sub(height), end)
}

fn sentiment_badge(label: &str) -> (&'static str, Color) {
  match label.to_uppercase().as_str() {
    "POSITIVE" | "POS" => ("+", POSITIVE),
    "NEGATIVE" | "NEG" => ("-", NEGATIVE),
    _ => ("?", MUTED),
  }
}

fn verbatim_line(message: &VerbatimMessage, width: usize) -> Line<'static> {
  let mut spans = Vec::new();
  let mut used = 0;

  if let Some(posted) = message.posted_at() {
    let stamp = format!("{} ", posted.with_timezone(&Local).format("%H:%M"));
    used += stamp.chars().count();
    spans.push(Span::styled(stamp, Style::default().fg(MUTED)));
  }

  let author = match (&message.user_name, &message.author_name) {
    (Some(user), _) => format!("@{} ", user),
    (None, Some(name)) => format!("{} ", name),
    (None, None) => String::new(),
  };
  if !author.is_empty() {
    used += author.chars().count();
    spans.push(Span::styled(author, Style::default().fg(ACCENT)));
  }

  if let Some(sentiment) = &message.sentiment {
    for (classifier, label) in sentiment {
      let (mark, color) = sentiment_badge(label);
      let badge = format!("{}{} ", classifier, mark);
      used += badge.chars().count();
      spans.push(Span::styled(badge, Style::default().fg(color)));
    }
  }

  let text = message.text.as_deref().unwrap_or("").replace('\n', " ");
  spans.push(Span::styled(truncate_str(&text, width.saturating_sub(used)), Style::default().fg(FG)));
  Line::from(spans)
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let [header_area, input_area, title_area, main_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, header_area);
  render_input(frame, app, input_area);
  render_title(frame, app, title_area);

  let [poster_area, log_area] =
    Layout::horizontal([Constraint::Length(POSTER_WIDTH), Constraint::Min(10)]).areas(main_area);
  render_poster(frame, app, poster_area);
  render_log(frame, app, log_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, area: Rect) {
  let left = Line::from(Span::styled(" ▶ marquee ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(MUTED)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let input_block = Block::bordered()
    .title(" Movie ")
    .title_style(Style::default().fg(ACCENT))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(ACCENT))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.input, app.cursor_position);

  if cursor_col < app.input_scroll {
    app.input_scroll = cursor_col;
  } else if cursor_col >= app.input_scroll + inner_w {
    app.input_scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = app
    .input
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.input_scroll)
    .take_while(|(start, _, _)| *start < app.input_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  let paragraph = Paragraph::new(visible).style(Style::default().fg(FG)).block(input_block);
  frame.render_widget(paragraph, area);

  let cursor_x = area.x + 2 + (cursor_col - app.input_scroll) as u16;
  frame.set_cursor_position((cursor_x, area.y + 1));
}

fn render_title(frame: &mut Frame, app: &App, area: Rect) {
  let presenter = &app.presenter;
  let (text, style) = match presenter.status() {
    SearchStatus::Idle => (" Type a movie name".to_string(), Style::default().fg(MUTED)),
    SearchStatus::Loading => (format!(" ⏳ {}", presenter.title_display()), Style::default().fg(ACCENT)),
    SearchStatus::Found => {
      (format!(" 🎬 {}", presenter.title_display()), Style::default().fg(FG).add_modifier(Modifier::BOLD))
    }
    SearchStatus::NotFound => (format!(" ⚠  {}", presenter.title_display()), Style::default().fg(NEGATIVE)),
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_poster(frame: &mut Frame, app: &mut App, area: Rect) {
  let block = Block::bordered()
    .title(Line::from(vec![
      Span::styled(" Poster ", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
      Span::styled(format!("[{}] ", app.display_mode.label().to_lowercase()), Style::default().fg(MUTED)),
    ]))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(BORDER));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  if let Some(ref image) = app.poster.image {
    let stale = app.poster.fitted.as_ref().is_none_or(|(w, h, _)| *w != inner.width || *h != inner.height);
    if stale {
      app.poster.fitted = Some((inner.width, inner.height, fit_poster(image, inner, app.display_mode)));
    }
    if let Some((_, _, ref fitted)) = app.poster.fitted {
      frame.render_widget(PosterWidget { image: fitted, display_mode: app.display_mode }, inner);
    }
    return;
  }

  let placeholder = if app.presenter.is_loading_poster() || app.poster.is_fetching() {
    "loading…".to_string()
  } else if app.presenter.poster().is_empty() {
    String::new()
  } else if app.poster.url.is_none() {
    // Not a fetchable image (e.g. "N/A").
    "no poster".to_string()
  } else {
    truncate_str(app.presenter.poster(), inner.width as usize)
  };
  let [_, middle, _] =
    Layout::vertical([Constraint::Fill(1), Constraint::Length(1), Constraint::Fill(1)]).areas(inner);
  frame.render_widget(
    Paragraph::new(placeholder).style(Style::default().fg(MUTED)).alignment(Alignment::Center),
    middle,
  );
}

fn render_log(frame: &mut Frame, app: &mut App, area: Rect) {
  let total = app.presenter.log().len();
  // Scroll intents are honored only once the appended rows are in this frame.
  if app.presenter.take_scroll_requests() > 0 {
    app.log_offset = 0;
  }

  let height = area.height.saturating_sub(2) as usize;
  app.log_offset = app.log_offset.min(total.saturating_sub(height));
  let (start, end) = visible_window(total, height, app.log_offset);
  let inner_w = area.width.saturating_sub(2) as usize;

  let items: Vec<ListItem> =
    app.presenter.log()[start..end].iter().map(|m| ListItem::new(verbatim_line(m, inner_w))).collect();

  let title = if app.log_offset > 0 {
    format!(" Verbatims · {} (↑{}) ", total, app.log_offset)
  } else {
    format!(" Verbatims · {} ", total)
  };
  let list = List::new(items).block(
    Block::bordered()
      .title(title)
      .title_style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))
      .border_type(BorderType::Rounded)
      .border_style(Style::default().fg(BORDER)),
  );
  frame.render_widget(list, area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let quit_label = if app.input.is_empty() { "Quit" } else { "Clear" };
  let keys = [("Type", "Search"), ("↑/↓ PgUp/PgDn", "Scroll"), ("^u", "Clear"), ("Esc", quit_label)];

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(KEY_FG).bg(ACCENT)),
        Span::styled(format!(" {} ", action), Style::default().fg(MUTED)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);
}
