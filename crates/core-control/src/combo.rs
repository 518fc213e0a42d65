//! The AdvancedCombo facade: a HybridSelect retuned for heavy typeahead.
//!
//! The combo differs from the select only in tuning and surface: arrows
//! cycle past the list edges, the keystroke-to-network debounce is
//! tighter, the filtered list is capped, and free-text entry routes
//! through an optional confirmation hook before an option is created.
//! Everything else delegates to the wrapped select.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use core_events::EventSink;
use core_fetch::SearchBackend;

use crate::config::ControlConfig;
use crate::core::Tuning;
use crate::select::HybridSelect;

pub struct AdvancedCombo {
    select: HybridSelect,
}

impl AdvancedCombo {
    pub fn new(
        config: ControlConfig,
        backend: Arc<dyn SearchBackend>,
        sink: EventSink,
    ) -> Self {
        Self {
            select: HybridSelect::with_tuning(config, Tuning::combo(), backend, sink),
        }
    }

    /// Allow (or forbid) committing text that matches no option.
    pub fn set_free_text(&self, allow: bool) {
        self.select.set_allow_create(allow);
    }

    /// Hook consulted before free text becomes an option. Returning false
    /// declines the creation and leaves the control untouched.
    pub fn on_confirm_create(&self, confirm: impl Fn(&str) -> bool + Send + 'static) {
        self.select.set_create_gate(Box::new(confirm));
    }
}

impl Deref for AdvancedCombo {
    type Target = HybridSelect;

    fn deref(&self) -> &Self::Target {
        &self.select
    }
}

impl DerefMut for AdvancedCombo {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.select
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::{Event, KeyCode, KeyEvent};
    use core_fetch::BoxedSearch;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    struct NullBackend;

    impl SearchBackend for NullBackend {
        fn search<'a>(&'a self, _url: &'a str, _term: &'a str) -> BoxedSearch<'a> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    fn combo() -> AdvancedCombo {
        let (tx, _rx) = mpsc::channel::<Event>(64);
        let combo = AdvancedCombo::new(
            ControlConfig::named("route"),
            Arc::new(NullBackend),
            EventSink::new(tx),
        );
        combo.set_options(&[
            json!({"id": "n", "label": "North"}),
            json!({"id": "s", "label": "South"}),
            json!({"id": "e", "label": "East"}),
        ]);
        combo
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::plain(code)
    }

    #[test]
    fn arrows_wrap_past_the_list_edges() {
        let combo = combo();
        combo.handle_key(key(KeyCode::Enter));
        assert_eq!(combo.model().highlighted, Some(0));
        combo.handle_key(key(KeyCode::Up));
        assert_eq!(combo.model().highlighted, Some(2));
        combo.handle_key(key(KeyCode::Down));
        assert_eq!(combo.model().highlighted, Some(0));
    }

    #[test]
    fn typing_a_closed_combo_opens_and_filters() {
        let combo = combo();
        combo.handle_key(key(KeyCode::Char('s')));
        assert!(combo.is_open());
        let model = combo.model();
        // "s" matches South and East.
        assert_eq!(model.highlighted, Some(0));
        assert_eq!(model.search, "s");
    }

    #[test]
    fn free_text_is_declined_until_confirmed() {
        let combo = combo();
        combo.set_free_text(true);
        combo.on_confirm_create(|_| false);

        combo.handle_key(key(KeyCode::Char('z')));
        combo.handle_key(key(KeyCode::Char('z')));
        combo.handle_key(key(KeyCode::Enter));
        assert_eq!(combo.options_len(), 3, "declined create changes nothing");

        combo.on_confirm_create(|label| label == "zz");
        combo.handle_key(key(KeyCode::Enter));
        assert_eq!(combo.options_len(), 4);
        let selected = combo.selected_options();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].label, "zz");
        assert!(selected[0].is_new);
        assert!(!combo.is_open(), "creation commits and closes");
    }

    #[test]
    fn free_text_off_ignores_unmatched_enter() {
        let combo = combo();
        combo.handle_key(key(KeyCode::Char('q')));
        combo.handle_key(key(KeyCode::Enter));
        assert_eq!(combo.options_len(), 3);
        assert!(combo.selected_options().is_empty());
    }
}
