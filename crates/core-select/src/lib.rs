//! Selection state, value semantics, and recent-selection persistence.
//!
//! The engine is deliberately event-free: every mutating operation returns
//! the resulting [`ChangeDetail`] (and, for [`SelectionEngine::select`], what
//! the owning control should do next), and the facade layer turns those into
//! channel events. That keeps cardinality rules testable without a runtime.

use serde_json::Value;
use tracing::debug;

use core_options::{OptionId, OptionItem, OptionSet};

pub mod recent;

pub use recent::{RECENT_LIMIT, RecentStore};

/// Single mode replaces the selection; multi mode toggles membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Single,
    Multi,
}

/// The `change` payload: submission value, full selected options, and
/// whether the change came from `clear()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeDetail {
    pub value: Value,
    pub selected: Vec<OptionItem>,
    pub cleared: bool,
}

/// What the owning control should do after a selection.
///
/// Single mode closes the dropdown; multi mode keeps it open so the user can
/// keep toggling. Both clear the transient search text.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOutcome {
    pub close_dropdown: bool,
    pub clear_search: bool,
    pub change: ChangeDetail,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionEngine {
    mode: SelectionMode,
    selected: Vec<OptionId>,
    original: Vec<OptionId>,
}

impl Default for SelectionMode {
    fn default() -> Self {
        Self::Single
    }
}

impl SelectionEngine {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            selected: Vec::new(),
            original: Vec::new(),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Selected ids in insertion order (chips render in this order).
    pub fn selected_ids(&self) -> &[OptionId] {
        &self.selected
    }

    pub fn is_selected(&self, id: &OptionId) -> bool {
        self.selected.contains(id)
    }

    pub fn selected_options(&self, set: &OptionSet) -> Vec<OptionItem> {
        self.selected
            .iter()
            .filter_map(|id| set.get(id).cloned())
            .collect()
    }

    /// Submission value: the selected option's value in single mode, an
    /// array of values in multi mode.
    pub fn value(&self, set: &OptionSet) -> Value {
        match self.mode {
            SelectionMode::Single => self
                .selected
                .first()
                .and_then(|id| set.get(id))
                .map(|item| item.value.clone())
                .unwrap_or(Value::Null),
            SelectionMode::Multi => Value::Array(
                self.selected
                    .iter()
                    .filter_map(|id| set.get(id))
                    .map(|item| item.value.clone())
                    .collect(),
            ),
        }
    }

    /// Select (or, in multi mode, toggle) an option. Returns `None` when the
    /// id does not exist in the set.
    pub fn select(&mut self, id: &OptionId, set: &OptionSet) -> Option<SelectOutcome> {
        set.get(id)?;
        let close_dropdown = match self.mode {
            SelectionMode::Single => {
                self.selected.clear();
                self.selected.push(id.clone());
                true
            }
            SelectionMode::Multi => {
                match self.selected.iter().position(|s| s == id) {
                    Some(at) => {
                        self.selected.remove(at);
                    }
                    None => self.selected.push(id.clone()),
                }
                false
            }
        };
        Some(SelectOutcome {
            close_dropdown,
            clear_search: true,
            change: self.change_detail(set, false),
        })
    }

    /// Remove one id from the selection (chip remove affordance).
    pub fn deselect(&mut self, id: &OptionId, set: &OptionSet) -> Option<ChangeDetail> {
        let at = self.selected.iter().position(|s| s == id)?;
        self.selected.remove(at);
        Some(self.change_detail(set, false))
    }

    /// Remove the most recently added id (Backspace on an empty multi
    /// input). Returns the removed id alongside the change.
    pub fn pop_last(&mut self, set: &OptionSet) -> Option<(OptionId, ChangeDetail)> {
        let id = self.selected.pop()?;
        Some((id, self.change_detail(set, false)))
    }

    pub fn clear(&mut self, set: &OptionSet) -> ChangeDetail {
        self.selected.clear();
        self.change_detail(set, true)
    }

    /// Programmatic value assignment. Accepts a scalar or an array; each
    /// entry is matched by submission value first, then by id; unmatched
    /// entries are silently dropped. Emits nothing.
    pub fn set_value(&mut self, incoming: &Value, set: &OptionSet) {
        let wanted: Vec<&Value> = match incoming {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        self.selected.clear();
        for value in wanted {
            if value.is_null() {
                continue;
            }
            match set.find_by_value_or_id(value) {
                Some(item) => {
                    if !self.selected.contains(&item.id) {
                        self.selected.push(item.id.clone());
                        if self.mode == SelectionMode::Single {
                            break;
                        }
                    }
                }
                None => {
                    debug!(target: "select", value = %value, "unmatched value dropped");
                }
            }
        }
    }

    /// Capture the current selection as the reset target. Called once after
    /// initial configuration.
    pub fn capture_original(&mut self) {
        self.original = self.selected.clone();
    }

    /// Restore the captured selection (Escape on a closed control).
    pub fn reset(&mut self, set: &OptionSet) -> ChangeDetail {
        self.selected = self
            .original
            .iter()
            .filter(|id| set.contains(id))
            .cloned()
            .collect();
        self.change_detail(set, false)
    }

    fn change_detail(&self, set: &OptionSet, cleared: bool) -> ChangeDetail {
        ChangeDetail {
            value: self.value(set),
            selected: self.selected_options(set),
            cleared,
        }
    }
}
