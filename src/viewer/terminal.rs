//! Terminal I/O layer: raw mode, Kitty Graphics Protocol, text rows, status bar, OSC 52.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use crossterm::{
    ExecutableCommand, QueueableCommand, cursor,
    style::{self, Stylize},
    terminal,
};
use std::io::{self, Write, stdout};

use super::state::Layout;

const CHUNK_SIZE: usize = 4096;

/// Kitty image ID of the single image shown by the detail viewer.
pub(super) const IMAGE_ID: u32 = 1;

// ---------------------------------------------------------------------------
// RawGuard — restores raw mode, alternate screen and images on Drop
// ---------------------------------------------------------------------------

pub(super) struct RawGuard {
    cleaned: bool,
}

impl RawGuard {
    pub(super) fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        stdout().execute(terminal::EnterAlternateScreen)?;
        stdout().execute(cursor::Hide)?;
        Ok(Self { cleaned: false })
    }

    pub(super) fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        let mut out = stdout();
        let _ = write!(out, "\x1b_Ga=d,d=A,q=2\x1b\\");
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ---------------------------------------------------------------------------
// Kitty protocol helpers
// ---------------------------------------------------------------------------

/// Transmit PNG data in base64 chunks (a=t: store only, no placement).
pub(super) fn send_image(png_data: &[u8], image_id: u32) -> io::Result<()> {
    let encoded = BASE64.encode(png_data);
    let chunks: Vec<&[u8]> = encoded.as_bytes().chunks(CHUNK_SIZE).collect();

    let mut out = stdout();
    for (i, chunk) in chunks.iter().enumerate() {
        let m = if i + 1 == chunks.len() { 0 } else { 1 };
        if i == 0 {
            write!(out, "\x1b_Ga=t,f=100,i={image_id},t=d,q=2,m={m};")?;
        } else {
            write!(out, "\x1b_Gm={m},q=2;")?;
        }
        out.write_all(chunk)?;
        write!(out, "\x1b\\")?;
    }
    out.flush()
}

/// Place a previously transmitted image scaled to `cols` × `rows` cells.
pub(super) fn place_image(image_id: u32, col: u16, row: u16, cols: u16, rows: u16) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(col, row))?;
    write!(out, "\x1b_Ga=p,i={image_id},c={cols},r={rows},C=1,q=2\x1b\\")?;
    out.flush()
}

/// Remove placements of an image but keep its data.
pub(super) fn delete_placements(image_id: u32) -> io::Result<()> {
    let mut out = stdout();
    write!(out, "\x1b_Ga=d,d=i,i={image_id},q=2\x1b\\")?;
    out.flush()
}

/// Delete image data + placements.
pub(super) fn delete_image(image_id: u32) -> io::Result<()> {
    let mut out = stdout();
    write!(out, "\x1b_Ga=d,d=I,i={image_id},q=2\x1b\\")?;
    out.flush()
}

/// Clear the text layer.
pub(super) fn clear_screen() -> io::Result<()> {
    let mut out = stdout();
    out.queue(terminal::Clear(terminal::ClearType::All))?;
    out.flush()
}

// ---------------------------------------------------------------------------
// Text rows
// ---------------------------------------------------------------------------

/// Cut `text` to at most `width` characters, marking the cut with `…`.
pub(super) fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut s: String = text.chars().take(width - 1).collect();
    s.push('…');
    s
}

/// Left-align `text` in exactly `width` columns.
pub(super) fn pad(text: &str, width: usize) -> String {
    format!("{:<width$}", truncate(text, width), width = width)
}

/// Pattern line at the top of the screen.
pub(super) fn draw_title(layout: &Layout, mode: &str, pattern: &str) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, 0))?;
    let line = pad(&format!(" [{mode}] {pattern}"), layout.cols as usize);
    write!(out, "{}", line.bold())?;
    out.flush()
}

/// Centered message in the body area (empty states, error panel).
pub(super) fn draw_message(layout: &Layout, lines: &[&str], is_error: bool) -> io::Result<()> {
    let mut out = stdout();
    let top = layout.grid_top + layout.grid_rows.saturating_sub(lines.len() as u16) / 2;
    for (i, line) in lines.iter().enumerate() {
        let text = truncate(line, layout.cols as usize);
        let col = (layout.cols as usize).saturating_sub(text.chars().count()) / 2;
        out.queue(cursor::MoveTo(col as u16, top + i as u16))?;
        if is_error && i == 0 {
            write!(out, "{}", text.red().bold())?;
        } else if is_error {
            write!(out, "{}", text.red())?;
        } else {
            write!(out, "{}", text.dark_grey())?;
        }
    }
    out.flush()
}

/// Draw the status bar on the last terminal row.
pub(super) fn draw_status_bar(layout: &Layout, text: &str) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, layout.status_row))?;
    let padded = pad(text, layout.cols as usize);
    write!(out, "{}", padded.on_dark_grey().white())?;
    out.queue(style::ResetColor)?;
    out.flush()
}

/// Draw an input bar on the status row (`:input_` or `/input_`).
pub(super) fn draw_input_bar(layout: &Layout, prefix: &str, input: &str) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, layout.status_row))?;
    let prompt = format!("{prefix}{input}_");
    // Keep the end of long input visible.
    let width = layout.cols as usize;
    let count = prompt.chars().count();
    let shown: String = if count > width {
        prompt.chars().skip(count - width).collect()
    } else {
        prompt
    };
    write!(out, "{}", pad(&shown, width).on_dark_grey().white())?;
    out.queue(style::ResetColor)?;
    out.flush()
}

/// Send text to the system clipboard via OSC 52.
pub(super) fn send_osc52(text: &str) -> io::Result<()> {
    let encoded = BASE64.encode(text.as_bytes());
    let mut out = stdout();
    write!(out, "\x1b]52;c;{encoded}\x1b\\")?;
    out.flush()
}

pub(super) fn check_tty() -> anyhow::Result<()> {
    use std::io::IsTerminal;
    // Only stdout matters. crossterm's `use-dev-tty` reads keyboard from /dev/tty
    // (Unix) or Console API (Windows), so stdin being a pipe is always fine.
    if !io::stdout().is_terminal() {
        anyhow::bail!(
            "imgrid viewer requires an interactive terminal.\n\
             \n\
             Supported terminals: Kitty, Ghostty, WezTerm\n\
             To print matches instead, use: imgrid list <pattern>"
        );
    }
    Ok(())
}
