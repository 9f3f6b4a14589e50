//! Grid mode: cursor movement, grouping/column controls, mode transitions,
//! and drawing of the virtualized grid.

use crossterm::{QueueableCommand, cursor, style::Stylize};
use log::debug;
use std::io::{self, Write, stdout};
use std::ops::Range;

use super::input::GridAction;
use super::mode_command::CommandState;
use super::mode_prompt::PromptState;
use super::state::{Layout, ViewState, move_items, move_rows};
use super::terminal::{self, pad};
use super::{Effect, ViewerMode};
use crate::group::{GridRow, Grouped, MatchItem, cell_label};
use crate::query::{QueryKey, QueryMode};
use crate::session::{QueryPhase, Session};
use crate::viewport::RowKind;
use crate::worker::Transport;

pub(super) struct GridCtx<'a> {
    pub grouped: &'a Grouped,
    pub cursor: usize,
    /// Image rows moved by `d`/`u`.
    pub half_page: isize,
    pub key: Option<&'a QueryKey>,
    /// Mode offered by the prompt when nothing was submitted yet.
    pub default_mode: QueryMode,
}

impl GridCtx<'_> {
    fn selected(&self) -> Option<&MatchItem> {
        self.grouped.matches.get(self.cursor)
    }
}

pub(super) fn handle(action: GridAction, ctx: &GridCtx) -> Vec<Effect> {
    let g = ctx.grouped;
    match action {
        GridAction::Quit => vec![Effect::Exit],

        GridAction::CancelInput | GridAction::Digit => vec![Effect::RedrawStatusBar],

        GridAction::Down(n) => vec![Effect::MoveCursor(move_rows(g, ctx.cursor, n as isize))],
        GridAction::Up(n) => vec![Effect::MoveCursor(move_rows(g, ctx.cursor, -(n as isize)))],
        GridAction::Right(n) => vec![Effect::MoveCursor(move_items(g, ctx.cursor, n as isize))],
        GridAction::Left(n) => vec![Effect::MoveCursor(move_items(g, ctx.cursor, -(n as isize)))],
        GridAction::HalfPageDown(n) => {
            let rows = ctx.half_page * n as isize;
            vec![Effect::MoveCursor(move_rows(g, ctx.cursor, rows))]
        }
        GridAction::HalfPageUp(n) => {
            let rows = ctx.half_page * n as isize;
            vec![Effect::MoveCursor(move_rows(g, ctx.cursor, -rows))]
        }
        GridAction::JumpToTop => vec![Effect::MoveCursor(0)],
        GridAction::JumpToBottom => vec![Effect::MoveCursor(g.total().saturating_sub(1))],
        GridAction::JumpToMatch(n) => {
            let idx = (n as usize).saturating_sub(1);
            if idx < g.total() {
                vec![Effect::MoveCursor(idx)]
            } else {
                vec![
                    Effect::Flash(format!("Match {n} not loaded ({} so far)", g.total())),
                    Effect::RedrawStatusBar,
                ]
            }
        }

        GridAction::OpenSelected => match ctx.selected() {
            Some(m) => vec![Effect::Open(m.global_index)],
            None => vec![Effect::Flash("Nothing to open".into()), Effect::RedrawStatusBar],
        },

        GridAction::NextGroup => vec![Effect::CycleGroup { forward: true }],
        GridAction::PrevGroup => vec![Effect::CycleGroup { forward: false }],
        GridAction::MoreColumns => vec![Effect::CycleColumns { forward: true }],
        GridAction::FewerColumns => vec![Effect::CycleColumns { forward: false }],

        GridAction::EditPattern => {
            let ps = match ctx.key {
                Some(key) => PromptState::new(&key.pattern, key.mode),
                None => PromptState::new("", ctx.default_mode),
            };
            vec![Effect::SetMode(ViewerMode::Prompt(ps)), Effect::RedrawStatusBar]
        }
        GridAction::ToggleMode => vec![Effect::ToggleMode],
        GridAction::Resubmit => vec![Effect::Resubmit],
        GridAction::EnterCommand => vec![
            Effect::SetMode(ViewerMode::Command(CommandState::new())),
            Effect::RedrawStatusBar,
        ],

        GridAction::OpenUrl => match ctx.selected() {
            Some(m) => vec![Effect::OpenUrl(m.url.clone())],
            None => vec![],
        },
        GridAction::Yank => match ctx.selected() {
            Some(m) => {
                debug!("grid: yank {}", m.object);
                vec![
                    Effect::Yank(m.object.clone()),
                    Effect::Flash(format!("Yanked {}", m.object)),
                    Effect::RedrawStatusBar,
                ]
            }
            None => vec![],
        },
    }
}

/// Last path component of an object key.
fn basename(object: &str) -> &str {
    object.rsplit('/').next().unwrap_or(object)
}

/// Draw the grid body. Returns the range of rows that intersect the screen
/// so the caller can feed the proximity trigger.
pub(super) fn draw_grid_screen<T: Transport>(
    layout: &Layout,
    session: &Session<T>,
    view: &ViewState,
) -> io::Result<Range<usize>> {
    match session.phase() {
        QueryPhase::Idle => {
            terminal::draw_message(layout, &["Press / to enter a pattern"], false)?;
            return Ok(0..0);
        }
        QueryPhase::Scanning => {
            terminal::draw_message(layout, &["Scanning bucket…"], false)?;
            return Ok(0..0);
        }
        QueryPhase::Failed(e) => {
            let msg = e.user_message();
            terminal::draw_message(
                layout,
                &["Query failed", msg.as_str(), "", "r: retry   /: edit pattern"],
                true,
            )?;
            return Ok(0..0);
        }
        QueryPhase::Ready => {}
    }

    let grouped = session.grouped();
    let model = session.viewport();
    if model.is_empty() {
        let loaded = session.fetch().items().len();
        if loaded > 0 {
            let line = format!("{loaded} objects matched, but the pattern has no captures to group on");
            terminal::draw_message(layout, &[line.as_str()], false)?;
        } else if let Some(e) = session.fetch().error() {
            let msg = e.user_message();
            terminal::draw_message(layout, &["Query failed", msg.as_str()], true)?;
        } else {
            terminal::draw_message(layout, &["No matches yet. Try adjusting your pattern."], false)?;
        }
        return Ok(0..0);
    }

    let height = layout.grid_rows as u32;
    let range = model.visible_range(view.scroll, height);
    let col_w = (layout.cols as usize / session.columns().max(1)).max(1);
    let names = session.capture_names();
    let mut out = stdout();

    for idx in range.clone() {
        let top = model.offset_of(idx) as i64 - view.scroll as i64;
        for line in 0..model.row_size(idx) {
            let y = top + line as i64;
            if y < 0 || y >= height as i64 {
                continue;
            }
            let screen_row = layout.grid_top + y as u16;
            match (model.kind(idx), grouped.rows.get(idx)) {
                (Some(RowKind::Header), Some(GridRow::Header { label, size })) => {
                    if line == 0 {
                        out.queue(cursor::MoveTo(0, screen_row))?;
                        let text = pad(&format!("▾ {label}  ({size})"), layout.cols as usize);
                        write!(out, "{}", text.bold().cyan())?;
                    }
                }
                (Some(RowKind::Images), Some(row)) => {
                    for (j, m) in grouped.row_items(row).iter().enumerate() {
                        let text = match line {
                            0 => cell_label(m, names),
                            1 => basename(&m.object).to_string(),
                            _ => String::new(),
                        };
                        let cell = pad(&format!(" {text}"), col_w.saturating_sub(1));
                        out.queue(cursor::MoveTo((j * col_w) as u16, screen_row))?;
                        if m.global_index == view.cursor {
                            write!(out, "{}", cell.reverse())?;
                        } else if line == 0 {
                            write!(out, "{cell}")?;
                        } else {
                            write!(out, "{}", cell.dark_grey())?;
                        }
                    }
                }
                _ => {
                    if line == 0 {
                        out.queue(cursor::MoveTo(0, screen_row))?;
                        write!(out, "{}", "  Loading more…".dark_grey())?;
                    }
                }
            }
        }
    }

    // Pagination stopped on an error: say so below the last row if it fits.
    if let Some(e) = session.fetch().error()
        && range.end == model.len()
    {
        let y = model.total_height() as i64 - view.scroll as i64;
        if (0..height as i64).contains(&y) {
            out.queue(cursor::MoveTo(0, layout.grid_top + y as u16))?;
            let text = pad(
                &format!("  ! {}  (r: retry)", e.user_message()),
                layout.cols as usize,
            );
            write!(out, "{}", text.red())?;
        }
    }

    out.flush()?;
    Ok(range)
}
