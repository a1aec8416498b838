use image::{DynamicImage, imageops::FilterType};
use ratatui::{
  buffer::Buffer,
  layout::Rect,
  style::{Color, Style},
  widgets::Widget,
};

use crate::display::DisplayMode;

// --- Poster Widget ---

/// Draws an already-fitted poster (see [`fit_poster`]) centered in the area.
pub struct PosterWidget<'a> {
  pub image: &'a DynamicImage,
  pub display_mode: DisplayMode,
}

const ASCII_CHARS: [&str; 10] = [" ", ".", ":", "-", "=", "+", "*", "#", "%", "@"];

impl Widget for PosterWidget<'_> {
  fn render(self, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
      return;
    }
    match self.display_mode {
      DisplayMode::Direct => render_direct(self.image, area, buf),
      DisplayMode::Ascii => render_ascii(self.image, area, buf),
    }
  }
}

/// Resize `image` to fit `area`, preserving aspect ratio.
/// Half-block rendering packs two pixel rows per cell.
pub fn fit_poster(image: &DynamicImage, area: Rect, mode: DisplayMode) -> DynamicImage {
  // Terminal cells are roughly twice as tall as they are wide, so fit against
  // a square-pixel box of width x 2*height in both modes.
  let (w, h) = ((area.width as u32).max(1), (area.height as u32 * 2).max(1));
  let fitted = image.resize(w, h, FilterType::Triangle);
  match mode {
    DisplayMode::Direct => fitted,
    // One character per cell: squash back to one pixel row per cell.
    DisplayMode::Ascii => fitted.resize_exact(fitted.width(), (fitted.height() / 2).max(1), FilterType::Triangle),
  }
}

fn cell_pos(origin: u16, offset: u32, i: u32) -> u16 {
  origin.saturating_add((offset.min(u16::MAX as u32)) as u16).saturating_add((i.min(u16::MAX as u32)) as u16)
}

fn render_direct(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let rgb = image.to_rgb8();
  let img_w = rgb.width().min(area.width as u32);
  let img_h = rgb.height();
  let cell_h = img_h.div_ceil(2);
  let offset_x = (area.width as u32).saturating_sub(img_w) / 2;
  let offset_y = (area.height as u32).saturating_sub(cell_h) / 2;

  for y in 0..cell_h.min(area.height as u32) {
    for x in 0..img_w {
      let upper = rgb.get_pixel(x, y * 2);
      let lower_y = y * 2 + 1;
      let fg = Color::Rgb(upper[0], upper[1], upper[2]);
      let bg = if lower_y < img_h {
        let lower = rgb.get_pixel(x, lower_y);
        Color::Rgb(lower[0], lower[1], lower[2])
      } else {
        Color::Reset
      };
      buf.set_string(
        cell_pos(area.x, offset_x, x),
        cell_pos(area.y, offset_y, y),
        "▀",
        Style::default().fg(fg).bg(bg),
      );
    }
  }
}

fn render_ascii(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let luma = image.to_luma8();
  let img_w = luma.width().min(area.width as u32);
  let img_h = luma.height().min(area.height as u32);
  let offset_x = (area.width as u32).saturating_sub(img_w) / 2;
  let offset_y = (area.height as u32).saturating_sub(img_h) / 2;

  for y in 0..img_h {
    for x in 0..img_w {
      buf.set_string(
        cell_pos(area.x, offset_x, x),
        cell_pos(area.y, offset_y, y),
        ascii_shade(luma.get_pixel(x, y)[0]),
        Style::default(),
      );
    }
  }
}

fn ascii_shade(pixel: u8) -> &'static str {
  let idx = ((pixel as f32 / 255.0) * (ASCII_CHARS.len() - 1) as f32).round() as usize;
  ASCII_CHARS[idx.min(ASCII_CHARS.len() - 1)]
}
