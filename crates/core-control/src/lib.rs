//! Public control surfaces: configuration plus the HybridSelect,
//! HybridInput, and AdvancedCombo facades.
//!
//! Each facade wraps the shared [`ControlCore`], which composes the option
//! set, selection engine, dropdown state, and remote fetcher into one
//! keyboard- and mouse-driven control. Facades own the pieces the core must
//! not know about: sync-group membership, publish fan-out, and the
//! text-input value model.

use thiserror::Error;

pub mod config;

mod combo;
mod core;
mod input;
mod select;

pub use combo::AdvancedCombo;
pub use config::{
    ConfigFile, ControlConfig, InteractionMode, SizeVariant, ThemeChoice, discover, load_from,
};
pub use input::{HybridInput, InputRules};
pub use select::HybridSelect;
pub use self::core::{COMBO_DEBOUNCE, COMBO_MAX_ITEMS, ControlCore, KeyResponse, Tuning};

/// Failures surfaced by the programmatic control API. Keyboard and mouse
/// paths never produce these; they degrade to no-ops instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("option {0:?} is not in the option set")]
    UnknownOption(String),
    #[error("control {0:?} is disabled")]
    Disabled(String),
    #[error("control {0:?} was destroyed")]
    Destroyed(String),
}
