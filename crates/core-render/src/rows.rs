//! Dropdown list view-model.
//!
//! The facade flattens its filtered options into [`ListRow`]s once per
//! frame; the overlay painter consumes them without knowing anything about
//! option sets, searches, or history. Option rows carry their index into
//! the filtered list, which is the space the keyboard highlight addresses,
//! so headers and status rows never shift the navigation math.

use std::ops::Range;

use core_options::{OptionId, OptionItem, match_span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRow {
    /// Section label; never selectable.
    GroupHeader(String),
    Option(OptionRow),
    /// Remote search in progress.
    Loading,
    /// Nothing matched the search; carries the configured message.
    Empty(String),
    /// Last remote search failed; prior options stay usable below.
    Error(String),
    /// Offer to create an option from the current search text.
    Create { label: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionRow {
    /// Position in the filtered option list (the highlight space).
    pub index: usize,
    pub label: String,
    pub description: Option<String>,
    pub badge: Option<String>,
    pub disabled: bool,
    pub selected: bool,
    pub is_new: bool,
    /// Byte range of the search match within `label`.
    pub matched: Option<Range<usize>>,
}

/// Inputs for one row build. `filtered` is already ordered for display
/// (recent entries first when `recent_count > 0`, then group order).
#[derive(Debug, Clone, Copy)]
pub struct RowsInput<'a> {
    pub filtered: &'a [OptionItem],
    /// How many leading entries of `filtered` form the recent section.
    pub recent_count: usize,
    pub grouped: bool,
    pub search: &'a str,
    pub selected: &'a [OptionId],
    pub loading: bool,
    pub error: Option<&'a str>,
    /// Message for the no-matches row.
    pub empty_text: &'a str,
    /// Append a create row for the trimmed search text.
    pub offer_create: bool,
}

pub fn build_rows(input: &RowsInput) -> Vec<ListRow> {
    if input.loading {
        return vec![ListRow::Loading];
    }
    let mut rows = Vec::new();
    if let Some(message) = input.error {
        rows.push(ListRow::Error(message.to_string()));
    }

    let recent = input.recent_count.min(input.filtered.len());
    if recent > 0 {
        rows.push(ListRow::GroupHeader("Recent".to_string()));
        for (index, item) in input.filtered[..recent].iter().enumerate() {
            rows.push(option_row(index, item, input));
        }
    }

    let mut current_group: Option<&str> = None;
    for (offset, item) in input.filtered[recent..].iter().enumerate() {
        if recent > 0 && offset == 0 {
            rows.push(ListRow::GroupHeader("All".to_string()));
        }
        if input.grouped {
            let group = item.group.as_deref();
            if let Some(name) = group
                && current_group != Some(name)
            {
                rows.push(ListRow::GroupHeader(name.to_string()));
            }
            current_group = group;
        }
        rows.push(option_row(recent + offset, item, input));
    }

    if input.filtered.is_empty() && !input.offer_create {
        rows.push(ListRow::Empty(input.empty_text.to_string()));
    }
    if input.offer_create {
        rows.push(ListRow::Create {
            label: input.search.trim().to_string(),
        });
    }
    rows
}

fn option_row(index: usize, item: &OptionItem, input: &RowsInput) -> ListRow {
    let matched = if input.search.is_empty() {
        None
    } else {
        match_span(&item.label, input.search)
    };
    ListRow::Option(OptionRow {
        index,
        label: item.label.clone(),
        description: item.description.clone(),
        badge: item.badge.clone(),
        disabled: item.disabled,
        selected: input.selected.contains(&item.id),
        is_new: item.is_new,
        matched,
    })
}

/// Number of selectable rows (what the highlight ranges over).
pub fn selectable_len(rows: &[ListRow]) -> usize {
    rows.iter()
        .filter(|row| matches!(row, ListRow::Option(_)))
        .count()
}

/// Row position of the option carrying `index`, for scroll anchoring.
pub fn position_of(rows: &[ListRow], index: usize) -> Option<usize> {
    rows.iter()
        .position(|row| matches!(row, ListRow::Option(opt) if opt.index == index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_options::{FieldMap, normalize_option};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn items(raw: serde_json::Value) -> Vec<OptionItem> {
        let fields = FieldMap::default();
        raw.as_array()
            .unwrap()
            .iter()
            .map(|v| normalize_option(v, &fields))
            .collect()
    }

    fn base_input<'a>(filtered: &'a [OptionItem], search: &'a str) -> RowsInput<'a> {
        RowsInput {
            filtered,
            recent_count: 0,
            grouped: false,
            search,
            selected: &[],
            loading: false,
            error: None,
            empty_text: "No options found",
            offer_create: false,
        }
    }

    #[test]
    fn flat_list_yields_one_row_per_option() {
        let opts = items(json!([
            {"id": "a", "label": "Alpha"},
            {"id": "b", "label": "Beta"}
        ]));
        let rows = build_rows(&base_input(&opts, ""));
        assert_eq!(rows.len(), 2);
        assert_eq!(selectable_len(&rows), 2);
        match &rows[1] {
            ListRow::Option(opt) => {
                assert_eq!(opt.index, 1);
                assert_eq!(opt.label, "Beta");
                assert_eq!(opt.matched, None);
            }
            other => panic!("expected option row, got {other:?}"),
        }
    }

    #[test]
    fn group_headers_interleave_without_shifting_indices() {
        let opts = items(json!([
            {"id": "u", "label": "Loose"},
            {"id": "a", "label": "Alpha", "group": "Crew"},
            {"id": "b", "label": "Beta", "group": "Crew"},
            {"id": "c", "label": "Gamma", "group": "Route"}
        ]));
        let mut input = base_input(&opts, "");
        input.grouped = true;
        let rows = build_rows(&input);
        assert_eq!(
            rows.iter()
                .filter(|r| matches!(r, ListRow::GroupHeader(_)))
                .count(),
            2
        );
        assert_eq!(selectable_len(&rows), 4);
        // The last option still carries its filtered index.
        match rows.last() {
            Some(ListRow::Option(opt)) => assert_eq!(opt.index, 3),
            other => panic!("expected option row, got {other:?}"),
        }
        assert_eq!(position_of(&rows, 3), Some(rows.len() - 1));
    }

    #[test]
    fn recent_section_gets_its_own_headers() {
        let opts = items(json!([
            {"id": "r1", "label": "Recent one"},
            {"id": "a", "label": "Alpha"},
            {"id": "b", "label": "Beta"}
        ]));
        let mut input = base_input(&opts, "");
        input.recent_count = 1;
        let rows = build_rows(&input);
        assert_eq!(rows[0], ListRow::GroupHeader("Recent".to_string()));
        assert!(matches!(&rows[1], ListRow::Option(opt) if opt.index == 0));
        assert_eq!(rows[2], ListRow::GroupHeader("All".to_string()));
        assert_eq!(selectable_len(&rows), 3);
    }

    #[test]
    fn search_marks_match_spans() {
        let opts = items(json!([{"id": "a", "label": "Rooftop"}]));
        let rows = build_rows(&base_input(&opts, "oft"));
        match &rows[0] {
            ListRow::Option(opt) => assert_eq!(opt.matched, Some(2..5)),
            other => panic!("expected option row, got {other:?}"),
        }
    }

    #[test]
    fn loading_replaces_everything() {
        let opts = items(json!([{"id": "a", "label": "Alpha"}]));
        let mut input = base_input(&opts, "al");
        input.loading = true;
        assert_eq!(build_rows(&input), vec![ListRow::Loading]);
    }

    #[test]
    fn empty_and_create_rows() {
        let none: Vec<OptionItem> = Vec::new();
        let rows = build_rows(&base_input(&none, "zz"));
        assert_eq!(rows, vec![ListRow::Empty("No options found".to_string())]);

        let mut input = base_input(&none, "  New Crew ");
        input.offer_create = true;
        let rows = build_rows(&input);
        assert_eq!(
            rows,
            vec![ListRow::Create {
                label: "New Crew".to_string()
            }]
        );
    }

    #[test]
    fn error_row_keeps_prior_options_usable() {
        let opts = items(json!([{"id": "a", "label": "Alpha"}]));
        let mut input = base_input(&opts, "");
        input.error = Some("endpoint unavailable");
        let rows = build_rows(&input);
        assert_eq!(rows[0], ListRow::Error("endpoint unavailable".to_string()));
        assert_eq!(selectable_len(&rows), 1);
    }
}
