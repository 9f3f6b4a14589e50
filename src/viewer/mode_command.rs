//! Command mode handler (`:` prompt).

use super::input::EditAction;
use super::{Effect, ViewerMode};
use crate::query::QueryMode;
use crate::session::COLUMN_CHOICES;

/// Mutable state for command mode (`:` prompt).
pub(super) struct CommandState {
    pub input: String,
}

impl CommandState {
    pub(super) fn new() -> Self {
        Self {
            input: String::new(),
        }
    }
}

pub(super) fn handle(action: EditAction, cs: &mut CommandState) -> Vec<Effect> {
    match action {
        EditAction::Type(c) => {
            cs.input.push(c);
            vec![Effect::RedrawStatusBar]
        }
        EditAction::Backspace => {
            if cs.input.pop().is_none() {
                // Empty input + Backspace → cancel (vim behavior)
                return vec![Effect::SetMode(ViewerMode::Normal), Effect::MarkDirty];
            }
            vec![Effect::RedrawStatusBar]
        }
        EditAction::Clear => {
            cs.input.clear();
            vec![Effect::RedrawStatusBar]
        }
        EditAction::ToggleMode => vec![],
        EditAction::Execute => {
            let mut effects = vec![Effect::SetMode(ViewerMode::Normal)];
            match parse_command(&cs.input) {
                Ok(cmd) => effects.extend(cmd),
                Err(msg) => effects.push(Effect::Flash(msg)),
            }
            effects.push(Effect::MarkDirty);
            effects
        }
        EditAction::Cancel => vec![Effect::SetMode(ViewerMode::Normal), Effect::MarkDirty],
    }
}

/// Parse a `:` command line into effects.
fn parse_command(line: &str) -> Result<Option<Effect>, String> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("Too many arguments: {}", line.trim()));
    }
    match (cmd, arg) {
        ("q" | "quit", None) => Ok(Some(Effect::Exit)),
        ("group" | "g", Some(name)) => Ok(Some(Effect::GroupBy(name.to_string()))),
        ("group" | "g", None) => Err("Usage: :group <capture name>".into()),
        ("cols" | "columns", Some(n)) => match n.parse::<usize>() {
            Ok(n) if COLUMN_CHOICES.contains(&n) => Ok(Some(Effect::SetColumns(n))),
            _ => Err(format!("Columns must be one of {COLUMN_CHOICES:?}")),
        },
        ("cols" | "columns", None) => Err("Usage: :cols <n>".into()),
        ("mode", None) => Ok(Some(Effect::ToggleMode)),
        ("mode", Some(m)) => match QueryMode::parse(m) {
            Some(mode) => Ok(Some(Effect::SetQueryMode(mode))),
            None => Err(format!("Unknown mode: {m} (percent or regex)")),
        },
        ("r" | "refresh", None) => Ok(Some(Effect::Resubmit)),
        _ => Err(format!("Unknown command: {}", line.trim())),
    }
}
