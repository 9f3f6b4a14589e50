//! Input processing layer: key mapping and numeric prefix accumulator.
//!
//! Pure logic, no I/O. All functions are deterministic and testable.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const MAX_COUNT: u32 = 99_999;

/// Accumulated numeric prefix for vim/less-style commands.
///
/// Users type digits then a command character: `5j` moves five rows down,
/// `120g` jumps to the 120th match.
pub(super) struct InputAccumulator {
    count: Option<u32>,
}

impl InputAccumulator {
    pub(super) fn new() -> Self {
        Self { count: None }
    }

    /// Feed a digit. Further digits are ignored once the cap is reached.
    fn push_digit(&mut self, d: u32) -> bool {
        let current = self.count.unwrap_or(0);
        let new = current.saturating_mul(10).saturating_add(d);
        if new > MAX_COUNT {
            return false;
        }
        self.count = Some(new);
        true
    }

    /// Take the accumulated count, resetting to None.
    fn take(&mut self) -> Option<u32> {
        self.count.take()
    }

    /// Peek at the current accumulated count without consuming it.
    pub(super) fn peek(&self) -> Option<u32> {
        self.count
    }

    pub(super) fn reset(&mut self) {
        self.count = None;
    }

    pub(super) fn is_active(&self) -> bool {
        self.count.is_some()
    }
}

/// Actions available while the grid is showing.
#[derive(Debug, PartialEq)]
pub(super) enum GridAction {
    Quit,
    Down(u32),
    Up(u32),
    Left(u32),
    Right(u32),
    HalfPageDown(u32),
    HalfPageUp(u32),
    JumpToTop,
    JumpToBottom,
    /// 1-based match number.
    JumpToMatch(u32),
    OpenSelected,
    NextGroup,
    PrevGroup,
    MoreColumns,
    FewerColumns,
    EditPattern,
    ToggleMode,
    Resubmit,
    EnterCommand,
    OpenUrl,
    Yank,
    CancelInput,
    /// A digit was accumulated; caller should redraw status bar.
    Digit,
}

/// Actions available while the detail viewer is open.
#[derive(Debug, PartialEq)]
pub(super) enum ViewerAction {
    Quit,
    Next,
    Prev,
    Close,
    OpenUrl,
    Yank,
    EnterCommand,
}

/// Line-editing actions shared by the pattern prompt and the command bar.
#[derive(Debug, PartialEq)]
pub(super) enum EditAction {
    Type(char),
    Backspace,
    Clear,
    /// Pattern prompt only: flip percent/regex.
    ToggleMode,
    Execute,
    Cancel,
}

/// Map a key event to a `GridAction`, consuming/updating the accumulator as needed.
///
/// Returns `None` for unknown keys (caller should reset accumulator).
pub(super) fn map_grid_key(key: KeyEvent, acc: &mut InputAccumulator) -> Option<GridAction> {
    let KeyEvent { code, modifiers, .. } = key;

    match (code, modifiers) {
        (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
            Some(GridAction::Quit)
        }

        (KeyCode::Esc, _) => {
            acc.reset();
            Some(GridAction::CancelInput)
        }

        (KeyCode::Char(c @ '0'..='9'), KeyModifiers::NONE) => {
            let d = c as u32 - '0' as u32;
            acc.push_digit(d);
            Some(GridAction::Digit)
        }

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => {
            Some(GridAction::Down(acc.take().unwrap_or(1)))
        }
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(GridAction::Up(acc.take().unwrap_or(1))),
        (KeyCode::Char('h'), _) | (KeyCode::Left, _) => {
            Some(GridAction::Left(acc.take().unwrap_or(1)))
        }
        (KeyCode::Char('l'), _) | (KeyCode::Right, _) => {
            Some(GridAction::Right(acc.take().unwrap_or(1)))
        }
        (KeyCode::Char('d'), _) | (KeyCode::PageDown, _) => {
            Some(GridAction::HalfPageDown(acc.take().unwrap_or(1)))
        }
        (KeyCode::Char('u'), _) | (KeyCode::PageUp, _) => {
            Some(GridAction::HalfPageUp(acc.take().unwrap_or(1)))
        }
        (KeyCode::Char('g'), _) | (KeyCode::Home, _) => match acc.take() {
            None => Some(GridAction::JumpToTop),
            Some(n) => Some(GridAction::JumpToMatch(n)),
        },
        (KeyCode::Char('G'), _) | (KeyCode::End, _) => match acc.take() {
            None => Some(GridAction::JumpToBottom),
            Some(n) => Some(GridAction::JumpToMatch(n)),
        },

        (KeyCode::Enter, _) => Some(GridAction::OpenSelected),
        (KeyCode::Tab, _) => Some(GridAction::NextGroup),
        (KeyCode::BackTab, _) => Some(GridAction::PrevGroup),
        (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => Some(GridAction::MoreColumns),
        (KeyCode::Char('-'), _) => Some(GridAction::FewerColumns),
        (KeyCode::Char('/'), _) => Some(GridAction::EditPattern),
        (KeyCode::Char('m'), _) => Some(GridAction::ToggleMode),
        (KeyCode::Char('r'), _) => Some(GridAction::Resubmit),
        (KeyCode::Char(':'), _) => Some(GridAction::EnterCommand),
        (KeyCode::Char('o'), _) => Some(GridAction::OpenUrl),
        (KeyCode::Char('y'), _) => Some(GridAction::Yank),

        _ => None,
    }
}

pub(super) fn map_viewer_key(key: KeyEvent) -> Option<ViewerAction> {
    let KeyEvent { code, modifiers, .. } = key;

    match (code, modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(ViewerAction::Quit),
        (KeyCode::Char('l'), _)
        | (KeyCode::Right, _)
        | (KeyCode::Char('n'), _)
        | (KeyCode::Char('j'), _)
        | (KeyCode::Char(' '), _) => Some(ViewerAction::Next),
        (KeyCode::Char('h'), _)
        | (KeyCode::Left, _)
        | (KeyCode::Char('p'), _)
        | (KeyCode::Char('k'), _) => Some(ViewerAction::Prev),
        (KeyCode::Esc, _) | (KeyCode::Char('q'), _) | (KeyCode::Backspace, _) => {
            Some(ViewerAction::Close)
        }
        (KeyCode::Char('o'), _) => Some(ViewerAction::OpenUrl),
        (KeyCode::Char('y'), _) => Some(ViewerAction::Yank),
        (KeyCode::Char(':'), _) => Some(ViewerAction::EnterCommand),
        _ => None,
    }
}

pub(super) fn map_edit_key(key: KeyEvent) -> Option<EditAction> {
    let KeyEvent { code, modifiers, .. } = key;

    match (code, modifiers) {
        (KeyCode::Esc, _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(EditAction::Cancel),
        (KeyCode::Char('u'), KeyModifiers::CONTROL) => Some(EditAction::Clear),
        (KeyCode::Enter, _) => Some(EditAction::Execute),
        (KeyCode::Backspace, _) => Some(EditAction::Backspace),
        (KeyCode::Tab, _) => Some(EditAction::ToggleMode),
        (KeyCode::Char(c), m) if !m.contains(KeyModifiers::CONTROL) => Some(EditAction::Type(c)),
        _ => None,
    }
}
