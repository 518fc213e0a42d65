use core_dropdown::CellRect;
use core_render::render_engine::{ControlModel, RenderEngine};
use core_render::rows::{OptionRow, build_rows};
use core_render::{CellFlags, ListRow};
use core_options::{FieldMap, normalize_option};
use serde_json::json;

// Wide grapheme clusters must survive the whole pipeline: row build keeps
// byte spans, the painter converts them to visual columns, and the frame
// stores one leader plus continuations per cluster.

fn model_with_rows(rows: Vec<ListRow>) -> ControlModel {
    ControlModel {
        name: "crew".to_string(),
        label: None,
        placeholder: String::new(),
        rect: CellRect::new(0, 0, 30, 1),
        focused: false,
        disabled: false,
        multiple: false,
        open: true,
        chips: Vec::new(),
        display: None,
        search: String::new(),
        error: None,
        rows,
        highlighted: Some(0),
    }
}

#[test]
fn wide_labels_render_with_continuations() {
    let fields = FieldMap::default();
    let items = vec![normalize_option(
        &json!({"id": "jp", "label": "日本 crew"}),
        &fields,
    )];
    let rows = build_rows(&core_render::rows::RowsInput {
        filtered: &items,
        recent_count: 0,
        grouped: false,
        search: "",
        selected: &[],
        loading: false,
        error: None,
        empty_text: "No options found",
        offer_create: false,
    });

    let engine = RenderEngine::new();
    let (frame, _) = engine.build_frame(&[model_with_rows(rows)], 30, 4);
    // Pane opens below the control row.
    assert_eq!(frame.row_text(1), "   日本 crew");
    let leaders: Vec<_> = frame.row_leaders(1).collect();
    let wide: Vec<_> = leaders.iter().filter(|(_, w, _, _)| *w == 2).collect();
    assert_eq!(wide.len(), 2, "two double-width clusters");
}

#[test]
fn match_underline_lands_on_visual_columns_past_wide_clusters() {
    // Label "日本 crew", search "crew": byte span starts at 7, but the
    // underline must start at visual column 5 within the label.
    let label = "日本 crew";
    let start = label.find("crew").unwrap();
    let rows = vec![ListRow::Option(OptionRow {
        index: 0,
        label: label.to_string(),
        description: None,
        badge: None,
        disabled: false,
        selected: false,
        is_new: false,
        matched: Some(start..start + 4),
    })];

    let engine = RenderEngine::new();
    let (frame, _) = engine.build_frame(&[model_with_rows(rows)], 30, 4);
    // Marker occupies cols 1-2, label starts at col 3, "crew" at col 8.
    for x in 8..12 {
        let cell = &frame.cells[frame.width as usize + x];
        assert!(cell.flags.contains(CellFlags::UNDERLINE), "col {x}");
    }
    let before = &frame.cells[frame.width as usize + 7];
    assert!(!before.flags.contains(CellFlags::UNDERLINE));
}
