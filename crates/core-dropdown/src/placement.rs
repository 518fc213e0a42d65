//! Dropdown geometry: where the list pane goes relative to its control.
//!
//! Everything is measured in terminal cells. The list prefers the space
//! below the control and flips above only when below cannot hold a full
//! pane and above is strictly roomier. The pane is rendered on the overlay
//! plane, so it may cover unrelated rows; it must never extend past the
//! viewport edge.

use tracing::debug;

/// Tallest pane we will ever draw, matching the scroll cutoff of the list.
pub const DROPDOWN_MAX_ROWS: u16 = 12;

/// A rectangle in screen cells. `row`/`col` are the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub row: u16,
    pub col: u16,
    pub width: u16,
    pub height: u16,
}

impl CellRect {
    pub fn new(row: u16, col: u16, width: u16, height: u16) -> Self {
        Self {
            row,
            col,
            width,
            height,
        }
    }

    /// First row below the rectangle.
    pub fn bottom(&self) -> u16 {
        self.row.saturating_add(self.height)
    }

    /// First column right of the rectangle.
    pub fn right(&self) -> u16 {
        self.col.saturating_add(self.width)
    }

    pub fn contains(&self, row: u16, col: u16) -> bool {
        row >= self.row && row < self.bottom() && col >= self.col && col < self.right()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Below,
    Above,
}

/// A resolved pane position. `visible_rows` is how many list rows fit; the
/// rect height equals it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropdownGeometry {
    pub placement: Placement,
    pub rect: CellRect,
    pub visible_rows: u16,
}

/// Place a pane of up to `wanted_rows` rows against `control` inside a
/// viewport of `viewport_rows` total rows. The pane spans the control's
/// width and clips to whatever space the chosen side actually has.
pub fn resolve_placement(control: CellRect, viewport_rows: u16, wanted_rows: u16) -> DropdownGeometry {
    let wanted = wanted_rows.clamp(1, DROPDOWN_MAX_ROWS);
    let space_below = viewport_rows.saturating_sub(control.bottom());
    let space_above = control.row;

    let placement = if space_below < DROPDOWN_MAX_ROWS && space_above > space_below {
        Placement::Above
    } else {
        Placement::Below
    };

    let space = match placement {
        Placement::Below => space_below,
        Placement::Above => space_above,
    };
    let visible_rows = wanted.min(space).max(1);
    let row = match placement {
        Placement::Below => control.bottom(),
        Placement::Above => control.row.saturating_sub(visible_rows),
    };
    debug!(
        target: "dropdown.placement",
        ?placement,
        space_below,
        space_above,
        visible_rows,
        "pane placed"
    );
    DropdownGeometry {
        placement,
        rect: CellRect::new(row, control.col, control.width, visible_rows),
        visible_rows,
    }
}

/// Whether a click at `(row, col)` landed outside both the control and its
/// open pane. Such clicks close the dropdown.
pub fn click_outside(control: CellRect, pane: Option<CellRect>, row: u16, col: u16) -> bool {
    if control.contains(row, col) {
        return false;
    }
    !pane.is_some_and(|p| p.contains(row, col))
}
