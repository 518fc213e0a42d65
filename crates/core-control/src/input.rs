//! The HybridInput facade: free-text entry with validation and remote
//! suggestions.
//!
//! Unlike the select controls, the value here is the typed string itself;
//! the dropdown pane only ever shows suggestions, and accepting one copies
//! its label into the value. Validation runs in two layers: local rules
//! (required, length, character allowlist) answer synchronously, and an
//! optional validation endpoint is consulted afterwards with the same
//! abort-previous debounce the option fetcher uses. A network failure
//! during remote validation accepts the value; only an explicit `false`
//! from the endpoint rejects it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use core_dropdown::{CellRect, DropdownState, HighlightMove, NavContext};
use core_events::{
    ControlEvent, ControlPayload, EventSink, KeyCode, KeyEvent, KeyModifiers,
};
use core_fetch::{DEFAULT_DEBOUNCE, RemoteFetcher, SearchBackend};
use core_options::OptionItem;
use core_render::rows::{RowsInput, build_rows};
use core_render::ControlModel;

use crate::config::ControlConfig;
use crate::core::KeyResponse;

/// Validation rules applied to the typed value.
#[derive(Clone)]
pub struct InputRules {
    pub required: bool,
    pub min_length: usize,
    pub max_length: Option<usize>,
    /// Full character allowlist; `None` accepts anything printable.
    pub allowed: Option<String>,
    /// Endpoint consulted after local rules pass. The response body's
    /// `valid` (or `ok`) field decides; a missing field accepts.
    pub validate_url: Option<String>,
    pub validate_debounce: Duration,
}

impl Default for InputRules {
    fn default() -> Self {
        Self {
            required: false,
            min_length: 0,
            max_length: None,
            allowed: None,
            validate_url: None,
            validate_debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl InputRules {
    fn accepts(&self, c: char) -> bool {
        match &self.allowed {
            Some(set) => set.contains(c),
            None => true,
        }
    }

    fn check(&self, value: &str) -> Result<(), String> {
        if self.required && value.trim().is_empty() {
            return Err("A value is required".to_string());
        }
        let len = value.chars().count();
        if len < self.min_length {
            return Err(format!("Enter at least {} characters", self.min_length));
        }
        if let Some(max) = self.max_length
            && len > max
        {
            return Err(format!("Enter at most {max} characters"));
        }
        if let Some(bad) = value.chars().find(|c| !self.accepts(*c)) {
            return Err(format!("Character {bad:?} is not allowed"));
        }
        Ok(())
    }
}

/// Text input with layered validation and an optional suggestion source.
pub struct HybridInput {
    config: ControlConfig,
    rules: InputRules,
    value: String,
    original: String,
    validation_error: Option<String>,
    suggestions: Vec<OptionItem>,
    dropdown: DropdownState,
    fetcher: RemoteFetcher,
    backend: Arc<dyn SearchBackend>,
    sink: EventSink,
    validate_in_flight: Option<JoinHandle<()>>,
    rect: CellRect,
    focused: bool,
}

impl HybridInput {
    pub fn new(
        config: ControlConfig,
        rules: InputRules,
        backend: Arc<dyn SearchBackend>,
        sink: EventSink,
    ) -> Self {
        let mut fetcher = RemoteFetcher::new(&config.name, backend.clone(), sink.clone())
            .with_fields(config.fields.clone())
            .with_min_search_length(config.min_search_length);
        fetcher.set_data_url(config.data_url.clone());
        let rect = CellRect::new(0, 0, config.size.width(), 1);
        Self {
            config,
            rules,
            value: String::new(),
            original: String::new(),
            validation_error: None,
            suggestions: Vec::new(),
            dropdown: DropdownState::new(),
            fetcher,
            backend,
            sink,
            validate_in_flight: None,
            rect,
            focused: false,
        }
    }

    /// Shorten the suggestion debounce (tests).
    pub fn with_suggestion_debounce(mut self, debounce: Duration) -> Self {
        self.fetcher.set_debounce(debounce);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn validation_error(&self) -> Option<&str> {
        self.validation_error.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.dropdown.is_open()
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
        if !focused {
            self.dropdown.close();
        }
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn set_rect(&mut self, rect: CellRect) {
        self.rect = rect;
    }

    /// A terminal resize invalidates the pane placement; close it.
    pub fn handle_resize(&mut self, _cols: u16, _rows: u16) {
        self.dropdown.close();
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.validation_error = None;
    }

    /// Remember the current value as the Esc-restore point.
    pub fn capture_original(&mut self) {
        self.original = self.value.clone();
    }

    // ---- keyboard ----------------------------------------------------

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyResponse {
        if self.config.disabled || self.config.readonly {
            return KeyResponse::Ignored;
        }
        if key.mods.intersects(KeyModifiers::CTRL | KeyModifiers::ALT) {
            return KeyResponse::Ignored;
        }
        match key.code {
            KeyCode::Tab => {
                self.dropdown.close();
                self.focused = false;
                KeyResponse::FocusNext
            }
            KeyCode::Esc => {
                if self.dropdown.is_open() {
                    self.dropdown.close();
                } else if self.value != self.original {
                    self.value = self.original.clone();
                    self.validation_error = None;
                    self.emit(ControlPayload::SearchInput {
                        term: self.value.clone(),
                    });
                }
                KeyResponse::Handled
            }
            KeyCode::Enter => {
                if let Some(at) = self.dropdown.highlighted().filter(|_| self.dropdown.is_open()) {
                    self.accept_suggestion(at);
                } else {
                    self.validate_now();
                }
                KeyResponse::Handled
            }
            KeyCode::Up | KeyCode::Down if self.dropdown.is_open() => {
                let ctx = self.nav_context();
                self.dropdown.handle_key(key, &ctx);
                KeyResponse::Handled
            }
            KeyCode::Down if self.fetcher.has_remote_source() => {
                self.open_suggestions();
                KeyResponse::Handled
            }
            KeyCode::Backspace => {
                if self.value.pop().is_some() {
                    self.value_changed();
                }
                KeyResponse::Handled
            }
            KeyCode::Char(c) => {
                let at_cap = self
                    .rules
                    .max_length
                    .is_some_and(|max| self.value.chars().count() >= max);
                if at_cap || !self.rules.accepts(c) {
                    debug!(
                        target: "control",
                        control = self.config.name.as_str(),
                        %c,
                        "rejected character"
                    );
                } else {
                    self.value.push(c);
                    self.value_changed();
                }
                KeyResponse::Handled
            }
            _ => KeyResponse::Ignored,
        }
    }

    fn nav_context(&self) -> NavContext {
        NavContext {
            filtered_len: self.suggestions.len(),
            disabled: self.config.disabled,
            readonly: self.config.readonly,
            multiple: false,
            allow_create: false,
            typing_opens: false,
            movement: HighlightMove::Clamp,
        }
    }

    fn value_changed(&mut self) {
        self.validation_error = None;
        self.emit(ControlPayload::SearchInput {
            term: self.value.clone(),
        });
        if self.fetcher.has_remote_source() {
            self.open_suggestions();
        }
        if self.rules.validate_url.is_some() && self.rules.check(&self.value).is_ok() {
            self.spawn_validate(self.rules.validate_debounce);
        }
    }

    fn open_suggestions(&mut self) {
        if !self.dropdown.is_open() {
            self.dropdown
                .open(self.suggestions.len(), self.config.disabled, self.config.readonly);
        }
        self.dropdown.set_searching(true);
        self.fetcher.queue_search(&self.value);
    }

    fn accept_suggestion(&mut self, at: usize) {
        let Some(item) = self.suggestions.get(at).cloned() else {
            return;
        };
        self.value = item.label.clone();
        self.dropdown.close();
        self.validation_error = None;
        self.emit(ControlPayload::Changed {
            value: Value::String(item.label.clone()),
            selected: vec![item],
            cleared: false,
        });
    }

    // ---- validation --------------------------------------------------

    /// Validate immediately: local rules first, then the endpoint.
    pub fn validate_now(&mut self) {
        match self.rules.check(&self.value) {
            Err(message) => {
                self.validation_error = Some(message.clone());
                self.emit(ControlPayload::Validated {
                    ok: false,
                    message: Some(message),
                });
            }
            Ok(()) if self.rules.validate_url.is_some() => {
                self.spawn_validate(Duration::ZERO);
            }
            Ok(()) => {
                self.validation_error = None;
                self.emit(ControlPayload::Validated {
                    ok: true,
                    message: None,
                });
            }
        }
    }

    fn spawn_validate(&mut self, delay: Duration) {
        let Some(url) = self.rules.validate_url.clone() else {
            return;
        };
        self.abort_validate();
        let control = self.config.name.clone();
        let backend = Arc::clone(&self.backend);
        let sink = self.sink.clone();
        let value = self.value.clone();
        self.validate_in_flight = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let (ok, message) = match backend.search(&url, &value).await {
                Ok(body) => {
                    let ok = body
                        .get("valid")
                        .or_else(|| body.get("ok"))
                        .and_then(Value::as_bool)
                        .unwrap_or(true);
                    let message = body
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    (ok, message)
                }
                Err(err) => {
                    // Inconclusive checks accept; the endpoint owns rejection.
                    warn!(
                        target: "control",
                        control = control.as_str(),
                        error = %err,
                        "remote validation unreachable; accepting"
                    );
                    (true, None)
                }
            };
            sink.emit(ControlEvent::new(
                control,
                ControlPayload::Validated { ok, message },
            ));
        }));
    }

    fn abort_validate(&mut self) {
        if let Some(handle) = self.validate_in_flight.take()
            && !handle.is_finished()
        {
            handle.abort();
        }
    }

    // ---- events ------------------------------------------------------

    fn emit(&self, payload: ControlPayload) {
        self.sink
            .emit(ControlEvent::new(self.config.name.clone(), payload));
    }

    /// Route an event from the shared channel back into the control.
    pub fn handle_event(&mut self, event: &ControlEvent) {
        if event.control != self.config.name {
            return;
        }
        match &event.payload {
            ControlPayload::Loaded { options, .. } => {
                self.dropdown.set_searching(false);
                self.suggestions = options.clone();
                if self.dropdown.is_open() {
                    self.dropdown.sync_filtered(self.suggestions.len());
                }
            }
            ControlPayload::LoadFailed { .. } => {
                self.dropdown.set_searching(false);
            }
            ControlPayload::Validated { ok, message } => {
                self.validation_error = if *ok {
                    None
                } else {
                    Some(
                        message
                            .clone()
                            .unwrap_or_else(|| "Invalid value".to_string()),
                    )
                };
            }
            _ => {}
        }
    }

    // ---- rendering ---------------------------------------------------

    pub fn model(&self) -> ControlModel {
        let open = self.dropdown.is_open();
        let rows = if open {
            build_rows(&RowsInput {
                filtered: &self.suggestions,
                recent_count: 0,
                grouped: false,
                search: &self.value,
                selected: &[],
                loading: self.dropdown.is_searching(),
                error: None,
                empty_text: &self.config.empty_text,
                offer_create: false,
            })
        } else {
            Vec::new()
        };
        ControlModel {
            name: self.config.name.clone(),
            label: self.config.label.clone(),
            placeholder: self.config.placeholder.clone(),
            rect: self.rect,
            focused: self.focused,
            disabled: self.config.disabled,
            multiple: false,
            open,
            chips: Vec::new(),
            display: None,
            search: self.value.clone(),
            error: self.validation_error.clone(),
            rows,
            highlighted: self.dropdown.highlighted(),
        }
    }

    // ---- lifecycle ---------------------------------------------------

    pub fn destroy(&mut self) {
        self.fetcher.abort();
        self.abort_validate();
        self.dropdown.close();
    }
}

impl Drop for HybridInput {
    fn drop(&mut self) {
        self.abort_validate();
    }
}
