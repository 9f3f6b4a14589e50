//! Detail viewer: one match at a time, prev/next across page boundaries.

use crossterm::{QueueableCommand, cursor, style::Stylize};
use std::io::{self, Write, stdout};

use super::input::ViewerAction;
use super::mode_command::CommandState;
use super::state::{ImageStatus, Layout, ViewState, fit_cells};
use super::terminal::{self, IMAGE_ID, pad};
use super::{Effect, ViewerMode};
use crate::group::MatchItem;
use crate::navigation::{Direction, NavState};
use crate::session::Session;
use crate::worker::Transport;

/// Rows above the image: object key and captures.
const HEADER_ROWS: u16 = 2;

pub(super) fn handle(action: ViewerAction, selected: Option<&MatchItem>) -> Vec<Effect> {
    match action {
        ViewerAction::Quit => vec![Effect::Exit],
        ViewerAction::Next => vec![Effect::Navigate(Direction::Next)],
        ViewerAction::Prev => vec![Effect::Navigate(Direction::Prev)],
        ViewerAction::Close => vec![Effect::Close],
        ViewerAction::OpenUrl => match selected {
            Some(m) => vec![Effect::OpenUrl(m.url.clone())],
            None => vec![],
        },
        ViewerAction::Yank => match selected {
            Some(m) => vec![
                Effect::Yank(m.object.clone()),
                Effect::Flash(format!("Yanked {}", m.object)),
                Effect::RedrawStatusBar,
            ],
            None => vec![],
        },
        ViewerAction::EnterCommand => vec![
            Effect::SetMode(ViewerMode::Command(CommandState::new())),
            Effect::RedrawStatusBar,
        ],
    }
}

/// `name=value` pairs in capture-name order.
fn captures_line(m: &MatchItem, names: &[String]) -> String {
    names
        .iter()
        .map(|n| {
            let v = m.captures.get(n).map(String::as_str).unwrap_or("—");
            format!("{n}={v}")
        })
        .collect::<Vec<_>>()
        .join("  ")
}

pub(super) fn draw_viewer_screen<T: Transport>(
    layout: &Layout,
    session: &Session<T>,
    view: &ViewState,
) -> io::Result<()> {
    match session.nav().state() {
        NavState::Closed => return Ok(()),
        NavState::AwaitingNext => {
            return terminal::draw_message(layout, &["Loading next page…"], false);
        }
        NavState::Viewing(_) => {}
    }
    let Some(m) = session.selected_match() else {
        return Ok(());
    };

    let mut out = stdout();
    let width = layout.cols as usize;
    out.queue(cursor::MoveTo(0, layout.grid_top))?;
    write!(out, "{}", pad(&format!(" {}", m.object), width).bold())?;
    out.queue(cursor::MoveTo(0, layout.grid_top + 1))?;
    let caps = format!(" {}", captures_line(m, session.capture_names()));
    write!(out, "{}", pad(&caps, width).dark_grey())?;
    out.flush()?;

    let body_top = layout.grid_top + HEADER_ROWS;
    let body_rows = layout.grid_rows.saturating_sub(HEADER_ROWS);
    let status = view
        .image
        .as_ref()
        .filter(|slot| slot.object == m.object)
        .map(|slot| &slot.status);
    match status {
        Some(ImageStatus::Ready { width, height }) => {
            let (cols, rows) = fit_cells(
                (*width, *height),
                (layout.cols, body_rows),
                (layout.cell_w, layout.cell_h),
            );
            let col = layout.cols.saturating_sub(cols) / 2;
            terminal::place_image(IMAGE_ID, col, body_top, cols, rows)?;
        }
        Some(ImageStatus::Failed(msg)) => {
            let line = format!("Image failed: {msg}");
            terminal::draw_message(layout, &[line.as_str()], true)?;
        }
        Some(ImageStatus::Loading) | None => {
            terminal::draw_message(layout, &["Loading image…"], false)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::item;
    use crate::group::group;
    use std::sync::Arc;

    fn one() -> MatchItem {
        let items = vec![Arc::new(item("e1/cat_00.jpg", &[("exp", "e1"), ("class", "cat")]))];
        group(&items, Some("exp"), 4).matches.remove(0)
    }

    #[test]
    fn keys_map_to_navigation() {
        assert!(matches!(
            handle(ViewerAction::Next, None)[..],
            [Effect::Navigate(Direction::Next)]
        ));
        assert!(matches!(
            handle(ViewerAction::Prev, None)[..],
            [Effect::Navigate(Direction::Prev)]
        ));
        assert!(matches!(handle(ViewerAction::Close, None)[..], [Effect::Close]));
    }

    #[test]
    fn open_and_yank_need_a_match() {
        assert!(handle(ViewerAction::OpenUrl, None).is_empty());
        let m = one();
        let effects = handle(ViewerAction::OpenUrl, Some(&m));
        assert!(matches!(&effects[0], Effect::OpenUrl(u) if u.ends_with("e1/cat_00.jpg")));
        let effects = handle(ViewerAction::Yank, Some(&m));
        assert!(matches!(&effects[0], Effect::Yank(o) if o == "e1/cat_00.jpg"));
    }

    #[test]
    fn captures_in_name_order() {
        let m = one();
        let names = vec!["exp".to_string(), "class".to_string(), "seq".to_string()];
        assert_eq!(captures_line(&m, &names), "exp=e1  class=cat  seq=—");
    }
}
