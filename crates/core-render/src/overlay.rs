//! Dropdown pane painting.
//!
//! The pane is drawn into the shared frame after the base rows, covering
//! whatever lies beneath its rectangle. Every pane cell is written (blank
//! cells included) so stale base content never shows through. Scrolling
//! keeps the highlighted row inside the visible window.

use std::ops::Range;

use core_dropdown::DropdownGeometry;

use crate::rows::{ListRow, position_of};
use crate::{CellFlags, Frame, text_width};

/// Visible slice of `total` rows, `visible` tall, keeping `anchor` in view.
pub fn scroll_window(total: usize, visible: usize, anchor: Option<usize>) -> Range<usize> {
    if visible == 0 || total <= visible {
        return 0..total;
    }
    let anchor = anchor.unwrap_or(0).min(total - 1);
    let start = anchor.saturating_sub(visible - 1).min(total - visible);
    start..start + visible
}

/// Paint `rows` into `frame` at `geo`. `highlighted` is the filtered-list
/// index the keyboard highlight sits on.
pub fn paint_pane(
    frame: &mut Frame,
    geo: &DropdownGeometry,
    rows: &[ListRow],
    highlighted: Option<usize>,
) {
    let rect = geo.rect;
    let anchor = highlighted.and_then(|index| position_of(rows, index));
    let window = scroll_window(rows.len(), rect.height as usize, anchor);

    for (slot, row_at) in window.enumerate() {
        let y = rect.row + slot as u16;
        let row = &rows[row_at];
        let base = base_flags(row, highlighted);
        frame.fill(rect.col, y, rect.col + rect.width, base);
        paint_row(frame, row, rect.col, y, rect.col + rect.width, base);
    }
}

fn base_flags(row: &ListRow, highlighted: Option<usize>) -> CellFlags {
    match row {
        ListRow::Option(opt) => {
            let mut flags = CellFlags::empty();
            if Some(opt.index) == highlighted {
                flags |= CellFlags::REVERSE;
            }
            if opt.disabled {
                flags |= CellFlags::DIM;
            }
            flags
        }
        ListRow::GroupHeader(_) => CellFlags::BOLD | CellFlags::DIM,
        ListRow::Loading | ListRow::Empty(_) => CellFlags::DIM,
        ListRow::Error(_) => CellFlags::ERR,
        ListRow::Create { .. } => CellFlags::BOLD,
    }
}

fn paint_row(frame: &mut Frame, row: &ListRow, x: u16, y: u16, max_x: u16, base: CellFlags) {
    match row {
        ListRow::GroupHeader(name) => {
            frame.set_text(x, y, name, max_x, base);
        }
        ListRow::Loading => {
            frame.set_text(x + 1, y, "Searching…", max_x, base);
        }
        ListRow::Empty(message) => {
            frame.set_text(x + 1, y, message, max_x, base);
        }
        ListRow::Error(message) => {
            frame.set_text(x + 1, y, message, max_x, base);
        }
        ListRow::Create { label } => {
            frame.set_text(x + 1, y, &format!("+ Create \"{label}\""), max_x, base);
        }
        ListRow::Option(opt) => {
            let marker = if opt.selected { "✓ " } else { "  " };
            let mut at = frame.set_text(x + 1, y, marker, max_x, base);
            let label_start = at;
            at = frame.set_text(at, y, &opt.label, max_x, base);
            if let Some(span) = &opt.matched {
                let lead = text_width(&opt.label[..span.start]);
                let span_cols = text_width(&opt.label[span.clone()]);
                frame.apply_flags_span(label_start + lead, y, span_cols, CellFlags::UNDERLINE);
            }
            if opt.is_new {
                at = frame.set_text(at, y, " (new)", max_x, base | CellFlags::DIM);
            }
            if let Some(desc) = &opt.description {
                at = frame.set_text(at + 1, y, "· ", max_x, base | CellFlags::DIM);
                at = frame.set_text(at, y, desc, max_x, base | CellFlags::DIM);
            }
            if let Some(badge) = &opt.badge {
                let badge_cols = text_width(badge) + 2;
                let badge_x = max_x.saturating_sub(badge_cols);
                if badge_x > at {
                    frame.set_text(badge_x, y, &format!("[{badge}]"), max_x, base | CellFlags::BOLD);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::OptionRow;
    use core_dropdown::{CellRect, DropdownGeometry, Placement};
    use pretty_assertions::assert_eq;

    fn opt(index: usize, label: &str) -> ListRow {
        ListRow::Option(OptionRow {
            index,
            label: label.to_string(),
            description: None,
            badge: None,
            disabled: false,
            selected: false,
            is_new: false,
            matched: None,
        })
    }

    fn geo(row: u16, height: u16) -> DropdownGeometry {
        DropdownGeometry {
            placement: Placement::Below,
            rect: CellRect::new(row, 0, 20, height),
            visible_rows: height,
        }
    }

    #[test]
    fn scroll_window_keeps_anchor_visible() {
        assert_eq!(scroll_window(3, 5, Some(2)), 0..3);
        assert_eq!(scroll_window(10, 4, Some(0)), 0..4);
        assert_eq!(scroll_window(10, 4, Some(7)), 4..8);
        assert_eq!(scroll_window(10, 4, Some(9)), 6..10);
        assert_eq!(scroll_window(10, 4, None), 0..4);
    }

    #[test]
    fn pane_covers_base_content() {
        let mut frame = Frame::new(20, 3);
        frame.set_text(0, 1, "underneath underneath", 20, CellFlags::empty());
        paint_pane(&mut frame, &geo(1, 1), &[opt(0, "Alpha")], None);
        assert_eq!(frame.row_text(1), "   Alpha");
    }

    #[test]
    fn highlight_and_selection_markers() {
        let mut frame = Frame::new(20, 2);
        let rows = vec![
            opt(0, "Alpha"),
            ListRow::Option(OptionRow {
                index: 1,
                label: "Beta".to_string(),
                description: None,
                badge: None,
                disabled: false,
                selected: true,
                is_new: false,
                matched: None,
            }),
        ];
        paint_pane(&mut frame, &geo(0, 2), &rows, Some(1));
        assert_eq!(frame.row_text(1), " ✓ Beta");
        let leaders: Vec<_> = frame.row_leaders(1).collect();
        assert!(leaders.iter().all(|(_, _, flags, _)| flags.contains(CellFlags::REVERSE)));
        let first: Vec<_> = frame.row_leaders(0).collect();
        assert!(first.iter().all(|(_, _, flags, _)| !flags.contains(CellFlags::REVERSE)));
    }

    #[test]
    fn match_span_is_underlined_in_visual_columns() {
        let mut frame = Frame::new(20, 1);
        let rows = vec![ListRow::Option(OptionRow {
            index: 0,
            label: "Rooftop".to_string(),
            description: None,
            badge: None,
            disabled: false,
            selected: false,
            is_new: false,
            matched: Some(2..5),
        })];
        paint_pane(&mut frame, &geo(0, 1), &rows, None);
        // Label starts after the two-cell marker at col 1: "oft" sits at 5..8.
        for x in 5..8 {
            assert!(frame.cells[x].flags.contains(CellFlags::UNDERLINE), "col {x}");
        }
        assert!(!frame.cells[4].flags.contains(CellFlags::UNDERLINE));
        assert!(!frame.cells[8].flags.contains(CellFlags::UNDERLINE));
    }

    #[test]
    fn long_lists_scroll_to_the_highlight() {
        let mut frame = Frame::new(20, 3);
        let rows: Vec<ListRow> = (0..10).map(|i| opt(i, &format!("Opt {i}"))).collect();
        paint_pane(&mut frame, &geo(0, 3), &rows, Some(6));
        assert_eq!(frame.row_text(0), "   Opt 4");
        assert_eq!(frame.row_text(2), "   Opt 6");
    }
}
