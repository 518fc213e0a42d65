//! Insertion-ordered option set with filtering and grouping views.

use std::collections::HashMap;
use std::ops::Range;

use serde_json::Value;

use crate::{OptionId, OptionItem};

/// A control's option set.
///
/// Invariants:
/// - ids are unique; pushing an existing id overwrites the item in place,
///   keeping its original position (map semantics);
/// - iteration order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct OptionSet {
    items: Vec<OptionItem>,
    index: HashMap<OptionId, usize>,
}

/// Grouped rendering view: ungrouped options first, then each group in
/// first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedOptions {
    pub ungrouped: Vec<OptionId>,
    pub groups: Vec<(String, Vec<OptionId>)>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<OptionItem>) -> Self {
        let mut set = Self::new();
        set.replace(items);
        set
    }

    /// Replace the entire set, preserving the order of `items`.
    pub fn replace(&mut self, items: Vec<OptionItem>) {
        self.items.clear();
        self.index.clear();
        for item in items {
            self.push(item);
        }
    }

    /// Insert or overwrite by id. An overwrite keeps the original position.
    pub fn push(&mut self, item: OptionItem) {
        match self.index.get(&item.id) {
            Some(&at) => self.items[at] = item,
            None => {
                self.index.insert(item.id.clone(), self.items.len());
                self.items.push(item);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &OptionId) -> Option<&OptionItem> {
        self.index.get(id).map(|&at| &self.items[at])
    }

    pub fn contains(&self, id: &OptionId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptionItem> {
        self.items.iter()
    }

    pub fn ids(&self) -> Vec<OptionId> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }

    pub fn items(&self) -> &[OptionItem] {
        &self.items
    }

    /// Case-insensitive substring filter over label and description. An
    /// empty term matches everything.
    pub fn filter(&self, term: &str) -> Vec<OptionId> {
        if term.is_empty() {
            return self.ids();
        }
        let needle = term.to_lowercase();
        self.items
            .iter()
            .filter(|item| {
                item.label.to_lowercase().contains(&needle)
                    || item
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .map(|item| item.id.clone())
            .collect()
    }

    pub fn has_groups(&self) -> bool {
        self.items.iter().any(|item| item.group.is_some())
    }

    /// Grouped view in first-seen group order. Callers use this only when
    /// the set has groups and no search filter is active.
    pub fn grouped(&self) -> GroupedOptions {
        let mut view = GroupedOptions::default();
        let mut order: HashMap<&str, usize> = HashMap::new();
        for item in &self.items {
            match item.group.as_deref() {
                None => view.ungrouped.push(item.id.clone()),
                Some(group) => {
                    let at = *order.entry(group).or_insert_with(|| {
                        view.groups.push((group.to_string(), Vec::new()));
                        view.groups.len() - 1
                    });
                    view.groups[at].1.push(item.id.clone());
                }
            }
        }
        view
    }

    /// Lookup used by the programmatic value setter: match by submission
    /// value first, then by id string.
    pub fn find_by_value_or_id(&self, wanted: &Value) -> Option<&OptionItem> {
        if let Some(item) = self.items.iter().find(|item| &item.value == wanted) {
            return Some(item);
        }
        let as_id = match wanted {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        self.get(&OptionId::new(as_id))
    }

    /// Whether any option's label equals `text` case-insensitively. Gates
    /// the create-new affordance.
    pub fn label_exists(&self, text: &str) -> bool {
        let wanted = text.to_lowercase();
        self.items
            .iter()
            .any(|item| item.label.to_lowercase() == wanted)
    }
}

/// Byte range of the first case-insensitive occurrence of `term` in `text`,
/// for highlight rendering. Offsets index into the original `text` even when
/// lowercasing changes byte lengths.
pub fn match_span(text: &str, term: &str) -> Option<Range<usize>> {
    if term.is_empty() {
        return None;
    }
    let needle = term.to_lowercase();
    let mut lowered = String::with_capacity(text.len());
    // Byte offset in `lowered` -> byte offset of the originating char in `text`.
    let mut origin = Vec::with_capacity(text.len());
    for (at, ch) in text.char_indices() {
        for folded in ch.to_lowercase() {
            lowered.push(folded);
            origin.resize(lowered.len(), at);
        }
    }
    let start_lowered = lowered.find(&needle)?;
    let end_lowered = start_lowered + needle.len();
    let start = origin[start_lowered];
    let end = if end_lowered >= origin.len() {
        text.len()
    } else {
        origin[end_lowered]
    };
    Some(start..end)
}
