//! Styling layer: maps semantic cell flags to terminal attributes.
//!
//! Hosts override presentation through [`Theme`] rather than by patching
//! emission logic. A theme holds bare SGR parameter lists per semantic
//! role; composition joins the parameters of every set flag into a single
//! escape sequence so a run is styled by one prefix and one reset.
//!
//! Invariants:
//! * `sgr_prefix` returns an empty string for empty flags, so unstyled
//!   runs emit no escape bytes at all.
//! * Styled runs always terminate with [`RESET`]; nested sequences are
//!   never emitted.

use crate::CellFlags;

pub const RESET: &str = "\x1b[0m";

/// Terminal attribute parameters per semantic role. Parameters are SGR
/// numbers without the escape framing (`"7"`, `"38;5;245"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    /// Highlighted row and chips.
    pub highlight: String,
    /// Placeholder text and disabled rows.
    pub dim: String,
    /// Group headers and the create-row affordance.
    pub emphasis: String,
    /// The portion of a label matching the current search.
    pub match_span: String,
    /// Load failures and validation messages.
    pub error: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            highlight: "7".to_string(),
            dim: "2".to_string(),
            emphasis: "1".to_string(),
            match_span: "4".to_string(),
            error: "31".to_string(),
        }
    }
}

impl Theme {
    /// Preset for dark terminal backgrounds.
    pub fn dark() -> Self {
        Self::default()
    }

    /// Preset for light terminal backgrounds: faint attributes render
    /// poorly there, so secondary text uses bright-black instead.
    pub fn light() -> Self {
        Self {
            dim: "90".to_string(),
            match_span: "4;34".to_string(),
            ..Self::default()
        }
    }

    /// Escape prefix for a flag set, empty when nothing is styled.
    pub fn sgr_prefix(&self, flags: CellFlags) -> String {
        if flags.is_empty() {
            return String::new();
        }
        let mut params: Vec<&str> = Vec::new();
        if flags.contains(CellFlags::REVERSE) {
            params.push(&self.highlight);
        }
        if flags.contains(CellFlags::DIM) {
            params.push(&self.dim);
        }
        if flags.contains(CellFlags::BOLD) {
            params.push(&self.emphasis);
        }
        if flags.contains(CellFlags::UNDERLINE) {
            params.push(&self.match_span);
        }
        if flags.contains(CellFlags::ERR) {
            params.push(&self.error);
        }
        if params.is_empty() {
            return String::new();
        }
        format!("\x1b[{}m", params.join(";"))
    }
}
