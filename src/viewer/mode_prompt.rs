//! Pattern prompt (`/`): edit the pattern and its mode, submit on Enter.

use super::input::EditAction;
use super::{Effect, ViewerMode};
use crate::query::{QueryKey, QueryMode};

pub(super) struct PromptState {
    pub input: String,
    pub mode: QueryMode,
}

impl PromptState {
    pub(super) fn new(pattern: &str, mode: QueryMode) -> Self {
        Self {
            input: pattern.to_string(),
            mode,
        }
    }

    /// Status-row prefix, e.g. `/percent `.
    pub(super) fn prefix(&self) -> String {
        format!("/{} ", self.mode)
    }
}

pub(super) fn handle(action: EditAction, ps: &mut PromptState) -> Vec<Effect> {
    match action {
        EditAction::Type(c) => {
            ps.input.push(c);
            vec![Effect::RedrawStatusBar]
        }
        EditAction::Backspace => {
            if ps.input.pop().is_none() {
                // Empty input + Backspace → cancel (vim behavior)
                return vec![Effect::SetMode(ViewerMode::Normal), Effect::MarkDirty];
            }
            vec![Effect::RedrawStatusBar]
        }
        EditAction::Clear => {
            ps.input.clear();
            vec![Effect::RedrawStatusBar]
        }
        EditAction::ToggleMode => {
            ps.mode = ps.mode.toggled();
            vec![Effect::RedrawStatusBar]
        }
        EditAction::Execute => {
            let pattern = ps.input.trim();
            if pattern.is_empty() {
                return vec![Effect::Flash("Pattern is empty".into()), Effect::RedrawStatusBar];
            }
            // The loop leaves prompt mode only if the pattern is accepted.
            vec![Effect::Submit(QueryKey::new(pattern, ps.mode))]
        }
        EditAction::Cancel => vec![Effect::SetMode(ViewerMode::Normal), Effect::MarkDirty],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_and_submit() {
        let mut ps = PromptState::new("gs://b/", QueryMode::Percent);
        for c in "%x%".chars() {
            handle(EditAction::Type(c), &mut ps);
        }
        handle(EditAction::ToggleMode, &mut ps);
        assert_eq!(ps.prefix(), "/regex ");
        let effects = handle(EditAction::Execute, &mut ps);
        assert!(matches!(
            &effects[0],
            Effect::Submit(k) if k.pattern == "gs://b/%x%" && k.mode == QueryMode::Regex
        ));
    }

    #[test]
    fn empty_pattern_is_refused() {
        let mut ps = PromptState::new("  ", QueryMode::Percent);
        let effects = handle(EditAction::Execute, &mut ps);
        assert!(matches!(effects[0], Effect::Flash(_)));
    }

    #[test]
    fn backspace_on_empty_cancels() {
        let mut ps = PromptState::new("a", QueryMode::Percent);
        assert!(matches!(handle(EditAction::Backspace, &mut ps)[0], Effect::RedrawStatusBar));
        assert!(matches!(
            handle(EditAction::Backspace, &mut ps)[0],
            Effect::SetMode(ViewerMode::Normal)
        ));
        ps.input.push_str("abc");
        handle(EditAction::Clear, &mut ps);
        assert!(ps.input.is_empty());
    }
}
