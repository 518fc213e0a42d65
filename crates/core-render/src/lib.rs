//! Rendering primitives + frame assembly for the control surfaces.
//!
//! `Cell` stores the full grapheme cluster for leader cells along with its
//! visual width; continuation cells (width == 0) occupy the remaining
//! columns of a multi-column cluster and never print text. Emission prints
//! only leader clusters exactly once.
//!
//! Invariants:
//! - Leader: width >= 1, `cluster` non-empty.
//! - Continuation: width == 0, `cluster` empty.
//! - Continuations immediately follow their leader horizontally; no gaps.
//! - Styling flags are applied over spans and mark leader + continuations,
//!   but emission derives printable content solely from leaders.
//! - A styled run wraps whole clusters, never truncating combining marks or
//!   ZWJ sequences.
//!
//! The dropdown pane is painted into the same frame after the base rows
//! (see [`overlay`]), so it covers whatever lies beneath it, and the frame
//! diff never needs to know about stacking.

use bitflags::bitflags;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

pub mod batch_writer;
pub mod overlay;
pub mod render_engine;
pub mod rows;
pub mod style;

pub use render_engine::{ControlModel, RenderEngine};
pub use rows::ListRow;
pub use style::Theme;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CellFlags: u8 {
        const REVERSE   = 0b0000_0001; // highlighted row, chips
        const DIM       = 0b0000_0010; // placeholder, disabled rows
        const BOLD      = 0b0000_0100; // group headers, badges
        const UNDERLINE = 0b0000_1000; // search match span
        const ERR       = 0b0001_0000; // load failures, validation text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Full grapheme cluster string (leader cells only). Empty for
    /// continuation cells.
    pub cluster: String,
    /// Visual width in terminal columns. `0` designates a continuation cell.
    pub width: u8,
    pub flags: CellFlags,
}

impl Cell {
    #[inline]
    pub fn leader(cluster: &str, width: u16, flags: CellFlags) -> Self {
        Self {
            cluster: cluster.to_string(),
            width: width.max(1) as u8,
            flags,
        }
    }

    #[inline]
    pub fn continuation(flags: CellFlags) -> Self {
        Self {
            cluster: String::new(),
            width: 0,
            flags,
        }
    }

    #[inline]
    pub fn is_leader(&self) -> bool {
        self.width > 0
    }

    #[inline]
    pub fn visual_width(&self) -> u16 {
        self.width as u16
    }
}

impl Default for Cell {
    fn default() -> Self {
        // Blank areas are single space leaders.
        Cell {
            cluster: " ".to_string(),
            width: 1,
            flags: CellFlags::empty(),
        }
    }
}

/// Visual width of one grapheme cluster. Zero-width clusters still occupy
/// one cell so they stay addressable.
pub fn cluster_width(cluster: &str) -> u16 {
    (cluster.width() as u16).max(1)
}

/// Total visual width of a string in terminal columns.
pub fn text_width(text: &str) -> u16 {
    text.graphemes(true).map(cluster_width).sum()
}

/// Truncate `text` to at most `max_cols` columns on a cluster boundary.
pub fn clip_text(text: &str, max_cols: u16) -> &str {
    let mut cols = 0u16;
    let mut end = 0usize;
    for (at, cluster) in text.grapheme_indices(true) {
        let w = cluster_width(cluster);
        if cols + w > max_cols {
            return &text[..at];
        }
        cols += w;
        end = at + cluster.len();
    }
    &text[..end]
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u16,
    pub height: u16,
    pub cells: Vec<Cell>,
}

impl Frame {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::default(); (width as usize) * (height as usize)],
        }
    }

    #[inline]
    fn index(&self, x: u16, y: u16) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    /// Set a full cluster at (x,y) and populate continuation cells for its
    /// width.
    pub fn set_cluster(&mut self, x: u16, y: u16, cluster: &str, width: u16, flags: CellFlags) {
        if x >= self.width || y >= self.height {
            return;
        }
        let w = width.max(1).min(self.width - x);
        if let Some(idx) = self.index(x, y) {
            self.cells[idx] = Cell::leader(cluster, w, flags);
        }
        for dx in 1..w {
            if let Some(c_idx) = self.index(x + dx, y) {
                self.cells[c_idx] = Cell::continuation(flags);
            }
        }
    }

    /// Write `text` starting at (x,y), clipping at `max_x` (exclusive).
    /// Returns the first column after the written text.
    pub fn set_text(&mut self, x: u16, y: u16, text: &str, max_x: u16, flags: CellFlags) -> u16 {
        let limit = max_x.min(self.width);
        let mut at = x;
        for cluster in text.graphemes(true) {
            let w = cluster_width(cluster);
            if at + w > limit {
                break;
            }
            self.set_cluster(at, y, cluster, w, flags);
            at += w;
        }
        at
    }

    /// Fill `[x, end_x)` on row `y` with spaces carrying `flags`.
    pub fn fill(&mut self, x: u16, y: u16, end_x: u16, flags: CellFlags) {
        for col in x..end_x.min(self.width) {
            self.set_cluster(col, y, " ", 1, flags);
        }
    }

    /// Apply additional flags over an existing span (leader + continuations).
    pub fn apply_flags_span(&mut self, x: u16, y: u16, span_width: u16, flags: CellFlags) {
        let span = span_width.min(self.width.saturating_sub(x));
        for dx in 0..span {
            if let Some(idx) = self.index(x + dx, y) {
                self.cells[idx].flags |= flags;
            }
        }
    }

    /// Iterate leader cells of a row, yielding (cluster, width, flags,
    /// start_x).
    pub fn row_leaders(&self, y: u16) -> impl Iterator<Item = (&str, u16, CellFlags, u16)> {
        let width = self.width;
        let start = y as usize * width as usize;
        let mut x = 0u16;
        std::iter::from_fn(move || {
            while x < width {
                let idx = start + x as usize;
                let cell = &self.cells[idx];
                if cell.is_leader() {
                    let w = cell.visual_width();
                    let out = (&*cell.cluster, w, cell.flags, x);
                    x = x.saturating_add(w);
                    return Some(out);
                } else {
                    x += 1;
                }
            }
            None
        })
    }

    /// The row's visible text with trailing blanks trimmed (tests and
    /// diagnostics only).
    pub fn row_text(&self, y: u16) -> String {
        if y >= self.height {
            return String::new();
        }
        let mut out = String::new();
        for (cluster, _, _, _) in self.row_leaders(y) {
            out.push_str(cluster);
        }
        out.trim_end().to_string()
    }
}
