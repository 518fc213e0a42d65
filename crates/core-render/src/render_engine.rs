//! Frame assembly and terminal emission for a set of controls.
//!
//! `build_frame` is pure: it lays every control row into a [`Frame`], then
//! paints open dropdown panes over the base plane, and reports where the
//! terminal cursor belongs (the insertion point of the focused control's
//! search text). `present` translates a frame into batched terminal
//! commands and ends by parking the cursor at that insertion point, so a
//! repaint never steals focus from the text the user is typing into.

use anyhow::Result;
use tracing::debug;

use core_dropdown::{CellRect, resolve_placement};

use crate::batch_writer::BatchWriter;
use crate::overlay::paint_pane;
use crate::rows::ListRow;
use crate::style::{RESET, Theme};
use crate::{CellFlags, Frame};

/// Per-frame snapshot of one control, assembled by its facade.
#[derive(Debug, Clone)]
pub struct ControlModel {
    pub name: String,
    pub label: Option<String>,
    pub placeholder: String,
    /// Control row rectangle in screen cells (height 1).
    pub rect: CellRect,
    pub focused: bool,
    pub disabled: bool,
    pub multiple: bool,
    pub open: bool,
    /// Chip labels in insertion order (multi mode).
    pub chips: Vec<String>,
    /// Selected option label (single mode).
    pub display: Option<String>,
    pub search: String,
    /// Validation or load-failure text shown inline.
    pub error: Option<String>,
    pub rows: Vec<ListRow>,
    pub highlighted: Option<usize>,
}

pub struct RenderEngine {
    theme: Theme,
    frames: u64,
    last_print_commands: u64,
    last_cells_printed: u64,
}

impl Default for RenderEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngine {
    pub fn new() -> Self {
        Self {
            theme: Theme::default(),
            frames: 0,
            last_print_commands: 0,
            last_cells_printed: 0,
        }
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    /// (print commands, logical cells) of the last presented frame.
    pub fn last_frame_cost(&self) -> (u64, u64) {
        (self.last_print_commands, self.last_cells_printed)
    }

    /// Compose the full frame. Base rows first, then every open pane, so
    /// panes cover unrelated controls exactly like a floating layer.
    pub fn build_frame(
        &self,
        models: &[ControlModel],
        width: u16,
        height: u16,
    ) -> (Frame, Option<(u16, u16)>) {
        let mut frame = Frame::new(width, height);
        let mut cursor = None;
        for model in models {
            let insert_at = paint_control_row(&mut frame, model);
            if model.focused {
                cursor = Some((insert_at, model.rect.row));
            }
        }
        for model in models {
            if !model.open || model.rows.is_empty() {
                continue;
            }
            let geo = resolve_placement(model.rect, height, model.rows.len() as u16);
            paint_pane(&mut frame, &geo, &model.rows, model.highlighted);
        }
        (frame, cursor)
    }

    /// Emit the frame. Rows are painted top to bottom; the cursor is left
    /// hidden unless a focused control claimed an insertion point.
    pub fn present(&mut self, frame: &Frame, cursor: Option<(u16, u16)>) -> Result<()> {
        let mut writer = BatchWriter::new();
        writer.hide_cursor();
        for y in 0..frame.height {
            self.emit_row(&mut writer, frame, y);
        }
        if let Some((x, y)) = cursor {
            writer.move_to(x, y);
            writer.show_cursor();
        }
        let (print_commands, cells_printed) = writer.flush()?;
        self.frames += 1;
        self.last_print_commands = print_commands;
        self.last_cells_printed = cells_printed;
        debug!(
            target: "render",
            frame = self.frames,
            print_commands,
            cells_printed,
            "frame presented"
        );
        Ok(())
    }

    /// Build and emit in one step.
    pub fn render(&mut self, models: &[ControlModel], width: u16, height: u16) -> Result<()> {
        let (frame, cursor) = self.build_frame(models, width, height);
        self.present(&frame, cursor)
    }

    fn emit_row(&self, writer: &mut BatchWriter, frame: &Frame, y: u16) {
        writer.move_to(0, y);
        writer.clear_line();
        let mut run = String::new();
        let mut run_flags = CellFlags::empty();
        for (cluster, _, flags, _) in frame.row_leaders(y) {
            if flags != run_flags {
                self.emit_run(writer, &run, run_flags);
                run.clear();
                run_flags = flags;
            }
            run.push_str(cluster);
        }
        self.emit_run(writer, &run, run_flags);
    }

    fn emit_run(&self, writer: &mut BatchWriter, run: &str, flags: CellFlags) {
        if run.is_empty() {
            return;
        }
        let prefix = self.theme.sgr_prefix(flags);
        if prefix.is_empty() {
            for ch in run.chars() {
                writer.print(ch.to_string());
            }
        } else {
            writer.print(format!("{prefix}{run}{RESET}"));
        }
    }
}

/// Paint one control row and return the cursor insertion column.
fn paint_control_row(frame: &mut Frame, model: &ControlModel) -> u16 {
    let rect = model.rect;
    let max_x = rect.right().min(frame.width);
    let base = if model.disabled {
        CellFlags::DIM
    } else {
        CellFlags::empty()
    };
    frame.fill(rect.col, rect.row, max_x, base);

    // Reserve the right edge for the caret and an optional error message.
    let caret = if model.open { "▴" } else { "▾" };
    let caret_x = max_x.saturating_sub(2);
    frame.set_text(caret_x, rect.row, caret, max_x, base);
    let mut text_limit = caret_x.saturating_sub(1);
    if let Some(error) = &model.error {
        let err_cols = crate::text_width(error);
        let err_x = text_limit.saturating_sub(err_cols + 1);
        frame.set_text(err_x, rect.row, error, text_limit, CellFlags::ERR);
        text_limit = err_x.saturating_sub(1);
    }

    let mut at = rect.col;
    if let Some(label) = &model.label {
        at = frame.set_text(at, rect.row, label, text_limit, base | CellFlags::BOLD);
        at = frame.set_text(at, rect.row, " ", text_limit, base);
    }
    if model.multiple {
        for chip in &model.chips {
            at = frame.set_text(at, rect.row, &format!("[{chip}]"), text_limit, base | CellFlags::REVERSE);
            at = frame.set_text(at, rect.row, " ", text_limit, base);
        }
    }

    if !model.search.is_empty() {
        at = frame.set_text(at, rect.row, &model.search, text_limit, base);
    } else if !model.multiple
        && let Some(display) = &model.display
    {
        at = frame.set_text(at, rect.row, display, text_limit, base);
    } else if model.chips.is_empty() {
        frame.set_text(at, rect.row, &model.placeholder, text_limit, base | CellFlags::DIM);
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::OptionRow;
    use pretty_assertions::assert_eq;

    fn model(name: &str, row: u16) -> ControlModel {
        ControlModel {
            name: name.to_string(),
            label: None,
            placeholder: "Pick one".to_string(),
            rect: CellRect::new(row, 0, 30, 1),
            focused: false,
            disabled: false,
            multiple: false,
            open: false,
            chips: Vec::new(),
            display: None,
            search: String::new(),
            error: None,
            rows: Vec::new(),
            highlighted: None,
        }
    }

    fn option_rows(labels: &[&str]) -> Vec<ListRow> {
        labels
            .iter()
            .enumerate()
            .map(|(index, label)| {
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
            })
            .collect()
    }

    #[test]
    fn closed_control_shows_placeholder_and_caret() {
        let engine = RenderEngine::new();
        let (frame, cursor) = engine.build_frame(&[model("crew", 0)], 40, 4);
        let row = frame.row_text(0);
        assert!(row.starts_with("Pick one"));
        assert!(row.ends_with('▾'));
        assert_eq!(cursor, None);
    }

    #[test]
    fn selected_display_replaces_the_placeholder() {
        let engine = RenderEngine::new();
        let mut m = model("crew", 0);
        m.display = Some("Alpha".to_string());
        let (frame, _) = engine.build_frame(&[m], 40, 4);
        assert!(frame.row_text(0).starts_with("Alpha"));
    }

    #[test]
    fn chips_render_in_insertion_order() {
        let engine = RenderEngine::new();
        let mut m = model("crew", 0);
        m.multiple = true;
        m.chips = vec!["Alpha".to_string(), "Beta".to_string()];
        let (frame, _) = engine.build_frame(&[m], 40, 4);
        assert!(frame.row_text(0).starts_with("[Alpha] [Beta]"));
    }

    #[test]
    fn focused_cursor_lands_after_the_search_text() {
        let engine = RenderEngine::new();
        let mut m = model("crew", 0);
        m.focused = true;
        m.open = true;
        m.search = "ro".to_string();
        m.rows = option_rows(&["Roof"]);
        let (_, cursor) = engine.build_frame(&[m], 40, 6);
        assert_eq!(cursor, Some((2, 0)));
    }

    #[test]
    fn open_pane_covers_the_control_below() {
        let engine = RenderEngine::new();
        let mut top = model("crew", 0);
        top.open = true;
        top.rows = option_rows(&["Alpha", "Beta"]);
        top.highlighted = Some(0);
        let below = model("route", 1);
        let (frame, _) = engine.build_frame(&[top, below], 40, 6);
        assert_eq!(frame.row_text(1), "   Alpha");
        assert_eq!(frame.row_text(2), "   Beta");
    }

    #[test]
    fn pane_flips_above_near_the_bottom_edge() {
        let engine = RenderEngine::new();
        let mut m = model("crew", 8);
        m.open = true;
        m.rows = option_rows(&["Alpha", "Beta"]);
        let (frame, _) = engine.build_frame(&[m], 40, 10);
        assert_eq!(frame.row_text(6), "   Alpha");
        assert_eq!(frame.row_text(7), "   Beta");
        assert!(frame.row_text(9).is_empty());
    }

    #[test]
    fn error_text_sits_inside_the_right_edge() {
        let engine = RenderEngine::new();
        let mut m = model("crew", 0);
        m.error = Some("required".to_string());
        let (frame, _) = engine.build_frame(&[m], 40, 2);
        let row = frame.row_text(0);
        assert!(row.contains("required"));
        assert!(row.ends_with('▾'));
    }
}
