//! Dropdown open/close state and keyboard navigation.
//!
//! [`DropdownState`] owns the transient presentation state of one control:
//! whether the list is open, the search text, the highlighted row, and the
//! loading flags. [`DropdownState::handle_key`] is a translator from a key
//! press to a [`NavOutcome`]; it mutates only this state and tells the owning
//! facade what to do next (select, create, emit, nothing). Selection state,
//! option data, and event emission all live elsewhere, which keeps the whole
//! keyboard surface testable as plain sequences of key presses.
//!
//! Invariants:
//! - `highlighted` is `Some(i)` only while open with `i < filtered_len`.
//! - A closed control never carries search text.
//! - Tab never traps focus: it resolves to [`NavOutcome::TabOut`] whether or
//!   not something was highlighted.

use tracing::debug;

use core_events::{KeyCode, KeyEvent, KeyModifiers};

pub mod placement;

pub use placement::{
    CellRect, DROPDOWN_MAX_ROWS, DropdownGeometry, Placement, click_outside, resolve_placement,
};

/// How arrow keys behave at the list edges. Select-style controls stop at
/// the boundary; combo-style controls cycle past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightMove {
    Clamp,
    Wrap,
}

impl HighlightMove {
    fn next(self, current: usize, len: usize) -> usize {
        match self {
            Self::Clamp => (current + 1).min(len - 1),
            Self::Wrap => (current + 1) % len,
        }
    }

    fn prev(self, current: usize, len: usize) -> usize {
        match self {
            Self::Clamp => current.saturating_sub(1),
            Self::Wrap => (current + len - 1) % len,
        }
    }
}

/// Per-key facts the translator needs from the owning control.
#[derive(Debug, Clone, Copy)]
pub struct NavContext {
    /// Number of rows currently in the filtered list.
    pub filtered_len: usize,
    pub disabled: bool,
    pub readonly: bool,
    pub multiple: bool,
    /// Enter on a non-matching search offers creation instead of a no-op.
    pub allow_create: bool,
    /// Printable keys open a closed control and seed the search with the
    /// typed character (combo-style controls).
    pub typing_opens: bool,
    pub movement: HighlightMove,
}

/// What the owning control should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    /// Key not consumed here; the host may still act on it.
    Ignored,
    /// The list just opened with an empty search.
    Opened,
    /// The list just opened seeded with one typed character; treat the
    /// search as changed too.
    OpenedWithSearch,
    Closed,
    /// Escape on a closed control: restore the captured selection.
    ResetValue,
    /// The highlight moved to this row.
    Highlighted(usize),
    SelectHighlighted(usize),
    /// Enter with no matching row and a non-empty search.
    CreateFromSearch,
    /// Tab always leaves the control; commit the highlighted row first
    /// when there is one.
    TabOut { select: Option<usize> },
    /// Backspace on an empty multi-value search: drop the newest chip.
    RemoveLastChip,
    /// The search text changed; refilter and (for remote sources) refetch.
    SearchChanged,
}

#[derive(Debug, Clone, Default)]
pub struct DropdownState {
    open: bool,
    search: String,
    highlighted: Option<usize>,
    searching: bool,
}

impl DropdownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    /// True while the current list reflects an in-progress remote search.
    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn set_searching(&mut self, searching: bool) {
        self.searching = searching;
    }

    /// Open the list. Returns `false` (and changes nothing) for disabled or
    /// readonly controls.
    pub fn open(&mut self, filtered_len: usize, disabled: bool, readonly: bool) -> bool {
        if disabled || readonly || self.open {
            return false;
        }
        self.open = true;
        self.search.clear();
        self.highlighted = if filtered_len > 0 { Some(0) } else { None };
        true
    }

    /// Close the list and drop all transient state.
    pub fn close(&mut self) {
        self.open = false;
        self.search.clear();
        self.searching = false;
        self.highlighted = None;
    }

    /// Re-anchor the highlight after the filtered list changed (typing,
    /// remote results). The first row wins; an empty list clears it.
    pub fn sync_filtered(&mut self, filtered_len: usize) {
        self.highlighted = if self.open && filtered_len > 0 {
            Some(0)
        } else {
            None
        };
    }

    /// Replace the search text wholesale (facade-level setter).
    pub fn set_search(&mut self, term: impl Into<String>) {
        self.search = term.into();
    }

    /// Translate one key press. Mutates only open/search/highlight state;
    /// everything else is reported through the returned [`NavOutcome`].
    pub fn handle_key(&mut self, key: KeyEvent, ctx: &NavContext) -> NavOutcome {
        if ctx.disabled || ctx.readonly {
            return NavOutcome::Ignored;
        }
        if key.mods.intersects(KeyModifiers::CTRL | KeyModifiers::ALT) {
            return NavOutcome::Ignored;
        }
        if self.open {
            self.key_while_open(key.code, ctx)
        } else {
            self.key_while_closed(key.code, ctx)
        }
    }

    fn key_while_closed(&mut self, code: KeyCode, ctx: &NavContext) -> NavOutcome {
        match code {
            KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Down | KeyCode::Up => {
                if self.open(ctx.filtered_len, ctx.disabled, ctx.readonly) {
                    NavOutcome::Opened
                } else {
                    NavOutcome::Ignored
                }
            }
            KeyCode::Char(c) if ctx.typing_opens => {
                if !self.open(ctx.filtered_len, ctx.disabled, ctx.readonly) {
                    return NavOutcome::Ignored;
                }
                self.search.push(c);
                debug!(target: "dropdown", %c, "opened by typing");
                NavOutcome::OpenedWithSearch
            }
            KeyCode::Esc => NavOutcome::ResetValue,
            _ => NavOutcome::Ignored,
        }
    }

    fn key_while_open(&mut self, code: KeyCode, ctx: &NavContext) -> NavOutcome {
        match code {
            KeyCode::Down => self.move_highlight(ctx, MoveDir::Next),
            KeyCode::Up => self.move_highlight(ctx, MoveDir::Prev),
            KeyCode::Home => self.jump_highlight(ctx, 0),
            KeyCode::End => self.jump_highlight(ctx, ctx.filtered_len.saturating_sub(1)),
            KeyCode::Enter => match self.highlighted {
                Some(at) if at < ctx.filtered_len => NavOutcome::SelectHighlighted(at),
                _ if ctx.allow_create && !self.search.trim().is_empty() => {
                    NavOutcome::CreateFromSearch
                }
                _ => NavOutcome::Ignored,
            },
            KeyCode::Esc => {
                self.close();
                NavOutcome::Closed
            }
            KeyCode::Tab => {
                let select = self.highlighted.filter(|at| *at < ctx.filtered_len);
                self.close();
                NavOutcome::TabOut { select }
            }
            KeyCode::Backspace => {
                if self.search.pop().is_some() {
                    NavOutcome::SearchChanged
                } else if ctx.multiple {
                    NavOutcome::RemoveLastChip
                } else {
                    NavOutcome::Ignored
                }
            }
            KeyCode::Char(c) => {
                self.search.push(c);
                NavOutcome::SearchChanged
            }
            _ => NavOutcome::Ignored,
        }
    }

    fn move_highlight(&mut self, ctx: &NavContext, dir: MoveDir) -> NavOutcome {
        if ctx.filtered_len == 0 {
            self.highlighted = None;
            return NavOutcome::Ignored;
        }
        let next = match (self.highlighted, dir) {
            (None, _) => 0,
            (Some(at), MoveDir::Next) => ctx.movement.next(at.min(ctx.filtered_len - 1), ctx.filtered_len),
            (Some(at), MoveDir::Prev) => ctx.movement.prev(at.min(ctx.filtered_len - 1), ctx.filtered_len),
        };
        self.highlighted = Some(next);
        NavOutcome::Highlighted(next)
    }

    fn jump_highlight(&mut self, ctx: &NavContext, to: usize) -> NavOutcome {
        if ctx.filtered_len == 0 {
            self.highlighted = None;
            return NavOutcome::Ignored;
        }
        let to = to.min(ctx.filtered_len - 1);
        self.highlighted = Some(to);
        NavOutcome::Highlighted(to)
    }
}

#[derive(Debug, Clone, Copy)]
enum MoveDir {
    Next,
    Prev,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn ctx(len: usize, movement: HighlightMove) -> NavContext {
        NavContext {
            filtered_len: len,
            disabled: false,
            readonly: false,
            multiple: false,
            allow_create: false,
            typing_opens: false,
            movement,
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::plain(code)
    }

    fn opened(len: usize, movement: HighlightMove) -> (DropdownState, NavContext) {
        let mut state = DropdownState::new();
        let c = ctx(len, movement);
        assert_eq!(state.handle_key(key(KeyCode::Enter), &c), NavOutcome::Opened);
        (state, c)
    }

    #[test]
    fn enter_space_and_arrows_open_a_closed_control() {
        for code in [KeyCode::Enter, KeyCode::Char(' '), KeyCode::Down, KeyCode::Up] {
            let mut state = DropdownState::new();
            let c = ctx(3, HighlightMove::Clamp);
            assert_eq!(state.handle_key(key(code), &c), NavOutcome::Opened);
            assert!(state.is_open());
            assert_eq!(state.highlighted(), Some(0));
        }
    }

    #[test]
    fn disabled_and_readonly_ignore_everything() {
        for (disabled, readonly) in [(true, false), (false, true)] {
            let mut state = DropdownState::new();
            let mut c = ctx(3, HighlightMove::Clamp);
            c.disabled = disabled;
            c.readonly = readonly;
            assert_eq!(state.handle_key(key(KeyCode::Enter), &c), NavOutcome::Ignored);
            assert!(!state.is_open());
        }
    }

    #[test]
    fn clamp_stops_at_both_edges() {
        let (mut state, c) = opened(3, HighlightMove::Clamp);
        assert_eq!(state.handle_key(key(KeyCode::Up), &c), NavOutcome::Highlighted(0));
        for expected in [1, 2, 2] {
            assert_eq!(
                state.handle_key(key(KeyCode::Down), &c),
                NavOutcome::Highlighted(expected)
            );
        }
    }

    #[test]
    fn wrap_cycles_past_both_edges() {
        let (mut state, c) = opened(3, HighlightMove::Wrap);
        assert_eq!(state.handle_key(key(KeyCode::Up), &c), NavOutcome::Highlighted(2));
        assert_eq!(state.handle_key(key(KeyCode::Down), &c), NavOutcome::Highlighted(0));
        assert_eq!(state.handle_key(key(KeyCode::Down), &c), NavOutcome::Highlighted(1));
    }

    #[test]
    fn home_and_end_jump() {
        let (mut state, c) = opened(5, HighlightMove::Clamp);
        assert_eq!(state.handle_key(key(KeyCode::End), &c), NavOutcome::Highlighted(4));
        assert_eq!(state.handle_key(key(KeyCode::Home), &c), NavOutcome::Highlighted(0));
    }

    #[test]
    fn enter_selects_the_highlighted_row() {
        let (mut state, c) = opened(3, HighlightMove::Clamp);
        state.handle_key(key(KeyCode::Down), &c);
        assert_eq!(
            state.handle_key(key(KeyCode::Enter), &c),
            NavOutcome::SelectHighlighted(1)
        );
    }

    #[test]
    fn enter_without_highlight_offers_creation_only_when_allowed() {
        let (mut state, mut c) = opened(0, HighlightMove::Wrap);
        state.set_search("brand new");
        assert_eq!(state.handle_key(key(KeyCode::Enter), &c), NavOutcome::Ignored);
        c.allow_create = true;
        assert_eq!(
            state.handle_key(key(KeyCode::Enter), &c),
            NavOutcome::CreateFromSearch
        );
        state.set_search("   ");
        assert_eq!(state.handle_key(key(KeyCode::Enter), &c), NavOutcome::Ignored);
    }

    #[test]
    fn escape_closes_and_clears_transient_state() {
        let (mut state, c) = opened(3, HighlightMove::Clamp);
        state.handle_key(key(KeyCode::Char('x')), &c);
        assert_eq!(state.handle_key(key(KeyCode::Esc), &c), NavOutcome::Closed);
        assert!(!state.is_open());
        assert_eq!(state.search(), "");
        assert_eq!(state.highlighted(), None);
    }

    #[test]
    fn escape_on_a_closed_control_requests_value_reset() {
        let mut state = DropdownState::new();
        let c = ctx(3, HighlightMove::Clamp);
        assert_eq!(state.handle_key(key(KeyCode::Esc), &c), NavOutcome::ResetValue);
    }

    #[test]
    fn tab_always_leaves_the_control() {
        let (mut state, c) = opened(3, HighlightMove::Clamp);
        state.handle_key(key(KeyCode::Down), &c);
        assert_eq!(
            state.handle_key(key(KeyCode::Tab), &c),
            NavOutcome::TabOut { select: Some(1) }
        );
        assert!(!state.is_open());

        let (mut state, c) = opened(0, HighlightMove::Clamp);
        assert_eq!(
            state.handle_key(key(KeyCode::Tab), &c),
            NavOutcome::TabOut { select: None }
        );
        assert!(!state.is_open());
    }

    #[test]
    fn typing_edits_the_search_while_open() {
        let (mut state, c) = opened(3, HighlightMove::Clamp);
        state.handle_key(key(KeyCode::Char('a')), &c);
        assert_eq!(
            state.handle_key(key(KeyCode::Char('b')), &c),
            NavOutcome::SearchChanged
        );
        assert_eq!(state.search(), "ab");
        assert_eq!(
            state.handle_key(key(KeyCode::Backspace), &c),
            NavOutcome::SearchChanged
        );
        assert_eq!(state.search(), "a");
    }

    #[test]
    fn backspace_on_empty_multi_search_removes_a_chip() {
        let (mut state, mut c) = opened(3, HighlightMove::Clamp);
        c.multiple = true;
        assert_eq!(
            state.handle_key(key(KeyCode::Backspace), &c),
            NavOutcome::RemoveLastChip
        );
        c.multiple = false;
        assert_eq!(state.handle_key(key(KeyCode::Backspace), &c), NavOutcome::Ignored);
    }

    #[test]
    fn typing_opens_seeds_the_search() {
        let mut state = DropdownState::new();
        let mut c = ctx(3, HighlightMove::Wrap);
        c.typing_opens = true;
        assert_eq!(
            state.handle_key(key(KeyCode::Char('r')), &c),
            NavOutcome::OpenedWithSearch
        );
        assert!(state.is_open());
        assert_eq!(state.search(), "r");

        // Without the flag, printables on a closed control fall through.
        let mut plain = DropdownState::new();
        let c = ctx(3, HighlightMove::Clamp);
        assert_eq!(plain.handle_key(key(KeyCode::Char('r')), &c), NavOutcome::Ignored);
    }

    #[test]
    fn modified_keys_are_left_for_the_host() {
        let (mut state, c) = opened(3, HighlightMove::Clamp);
        let ctrl = KeyEvent {
            code: KeyCode::Char('c'),
            mods: KeyModifiers::CTRL,
        };
        assert_eq!(state.handle_key(ctrl, &c), NavOutcome::Ignored);
        assert_eq!(state.search(), "");
    }

    #[test]
    fn sync_filtered_reanchors_or_clears_the_highlight() {
        let (mut state, c) = opened(5, HighlightMove::Clamp);
        state.handle_key(key(KeyCode::End), &c);
        state.sync_filtered(2);
        assert_eq!(state.highlighted(), Some(0));
        state.sync_filtered(0);
        assert_eq!(state.highlighted(), None);
    }

    proptest! {
        // The highlight never leaves the filtered range, whatever the user
        // mashes and however the list shrinks underneath them.
        #[test]
        fn highlight_stays_in_bounds(
            len in 0usize..20,
            wrap in proptest::bool::ANY,
            keys in proptest::collection::vec(0u8..6, 0..40),
        ) {
            let movement = if wrap { HighlightMove::Wrap } else { HighlightMove::Clamp };
            let mut state = DropdownState::new();
            let mut c = ctx(len, movement);
            state.handle_key(key(KeyCode::Enter), &c);
            for k in keys {
                let code = match k {
                    0 => KeyCode::Down,
                    1 => KeyCode::Up,
                    2 => KeyCode::Home,
                    3 => KeyCode::End,
                    4 => KeyCode::Char('q'),
                    _ => KeyCode::Backspace,
                };
                state.handle_key(key(code), &c);
                if let Some(at) = state.highlighted() {
                    prop_assert!(at < c.filtered_len);
                }
                // Lists shrink as searches narrow.
                c.filtered_len = c.filtered_len.saturating_sub(k as usize % 2);
                state.sync_filtered(c.filtered_len);
            }
        }
    }
}
