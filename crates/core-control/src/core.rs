//! The shared control core.
//!
//! One [`ControlCore`] composes the option set, selection engine, dropdown
//! state machine, recent history, and remote fetcher behind a single
//! keyboard/mouse/event surface. The core is synchronous and lock-free; the
//! facades serialize access and handle sync-group fan-out. Publishing is
//! deferred: mutations that change the shareable option set raise a flag
//! that the owning facade drains with [`ControlCore::take_publish`] after
//! releasing its lock, so registry callbacks never run under a core lock.
//!
//! Publish points are create, programmatic `set_options`, and an empty-term
//! remote load. Searched results stay local to the control that typed the
//! search, and a snapshot applied through [`ControlCore::set_items`] never
//! re-raises the flag.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use core_dropdown::{
    CellRect, DropdownState, HighlightMove, NavContext, NavOutcome, click_outside,
    resolve_placement,
};
use core_events::{ControlEvent, ControlPayload, EventSink, KeyCode, KeyEvent};
use core_fetch::{DEFAULT_DEBOUNCE, RemoteFetcher, SearchBackend};
use core_options::{OptionId, OptionItem, OptionSet, normalize_all};
use core_render::overlay::scroll_window;
use core_render::rows::{RowsInput, build_rows, position_of};
use core_render::{ControlModel, ListRow};
use core_select::{ChangeDetail, RecentStore, SelectOutcome, SelectionEngine, SelectionMode};

use crate::ControlError;
use crate::config::{ControlConfig, InteractionMode};

/// Keystroke-to-network delay for combo-style controls, which filter
/// server-side on every keystroke and want a snappier feel.
pub const COMBO_DEBOUNCE: Duration = Duration::from_millis(160);

/// Cap on rendered rows for combo-style controls fed by large result sets.
pub const COMBO_MAX_ITEMS: usize = 200;

/// Behavior knobs that distinguish the control families without forking the
/// core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    pub movement: HighlightMove,
    /// Printable keys open a closed control and seed the search.
    pub typing_opens: bool,
    pub debounce: Duration,
    /// Cap on the filtered list; `None` renders everything.
    pub max_items: Option<usize>,
}

impl Tuning {
    /// Select-family behavior: highlight clamps at the edges, typing opens
    /// only in combobox mode.
    pub fn select(mode: InteractionMode) -> Self {
        Self {
            movement: HighlightMove::Clamp,
            typing_opens: mode == InteractionMode::Combobox,
            debounce: DEFAULT_DEBOUNCE,
            max_items: None,
        }
    }

    /// Combo-family behavior: wrap-around highlight, always types-to-open,
    /// tighter debounce, capped list.
    pub fn combo() -> Self {
        Self {
            movement: HighlightMove::Wrap,
            typing_opens: true,
            debounce: COMBO_DEBOUNCE,
            max_items: Some(COMBO_MAX_ITEMS),
        }
    }
}

/// What the host should do with a key after the control saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResponse {
    /// Consumed by the control.
    Handled,
    /// Tab: move focus to the next control.
    FocusNext,
    /// Not consumed; the host may act on it.
    Ignored,
}

pub struct ControlCore {
    config: ControlConfig,
    tuning: Tuning,
    options: OptionSet,
    engine: SelectionEngine,
    dropdown: DropdownState,
    fetcher: RemoteFetcher,
    recent: RecentStore,
    recent_ids: Vec<OptionId>,
    sink: EventSink,
    /// Filtered option ids in display order; the highlight indexes this.
    filtered: Vec<OptionId>,
    /// Leading entries of `filtered` that form the recent section.
    recent_count: usize,
    load_error: Option<String>,
    viewport: (u16, u16),
    rect: CellRect,
    focused: bool,
    destroyed: bool,
    pending_publish: bool,
    create_gate: Option<Box<dyn Fn(&str) -> bool + Send>>,
}

impl ControlCore {
    pub fn new(
        config: ControlConfig,
        tuning: Tuning,
        backend: Arc<dyn SearchBackend>,
        sink: EventSink,
    ) -> Self {
        let mut fetcher = RemoteFetcher::new(&config.name, backend, sink.clone())
            .with_fields(config.fields.clone())
            .with_debounce(tuning.debounce)
            .with_min_search_length(config.min_search_length);
        fetcher.set_data_url(config.data_url.clone());

        let recent = RecentStore::new();
        let recent_ids = if config.show_recent {
            recent.load(&config.name)
        } else {
            Vec::new()
        };
        let rect = CellRect::new(0, 0, config.size.width(), 1);
        let engine = SelectionEngine::new(if config.multiple {
            SelectionMode::Multi
        } else {
            SelectionMode::Single
        });

        let mut core = Self {
            config,
            tuning,
            options: OptionSet::new(),
            engine,
            dropdown: DropdownState::new(),
            fetcher,
            recent,
            recent_ids,
            sink,
            filtered: Vec::new(),
            recent_count: 0,
            load_error: None,
            viewport: (80, 24),
            rect,
            focused: false,
            destroyed: false,
            pending_publish: false,
            create_gate: None,
        };
        core.refilter();
        core
    }

    /// Swap the recent-history store (tests, embedded hosts).
    pub fn with_recent(mut self, store: RecentStore) -> Self {
        self.recent = store;
        self.recent_ids = if self.config.show_recent {
            self.recent.load(&self.config.name)
        } else {
            Vec::new()
        };
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.dropdown.is_open()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn has_remote_source(&self) -> bool {
        self.fetcher.has_remote_source()
    }

    pub fn options_len(&self) -> usize {
        self.options.len()
    }

    // ---- keyboard ----------------------------------------------------

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyResponse {
        if self.destroyed {
            return KeyResponse::Ignored;
        }
        // An unsearchable control keeps its list but never takes text.
        if !self.config.searchable
            && self.dropdown.is_open()
            && matches!(key.code, KeyCode::Char(_))
        {
            return KeyResponse::Handled;
        }
        let ctx = self.nav_context();
        match self.dropdown.handle_key(key, &ctx) {
            NavOutcome::Ignored => KeyResponse::Ignored,
            NavOutcome::Opened => {
                self.after_open();
                KeyResponse::Handled
            }
            NavOutcome::OpenedWithSearch => {
                self.emit(ControlPayload::Opened);
                self.search_changed();
                KeyResponse::Handled
            }
            NavOutcome::Closed => {
                self.after_close();
                KeyResponse::Handled
            }
            NavOutcome::ResetValue => {
                let change = self.engine.reset(&self.options);
                self.emit_change(change);
                KeyResponse::Handled
            }
            NavOutcome::Highlighted(_) => KeyResponse::Handled,
            NavOutcome::SelectHighlighted(at) => {
                self.select_filtered(at);
                KeyResponse::Handled
            }
            NavOutcome::CreateFromSearch => {
                self.create_from_search();
                KeyResponse::Handled
            }
            NavOutcome::TabOut { select } => {
                if let Some(at) = select {
                    self.commit_filtered(at);
                }
                self.focused = false;
                self.after_close();
                KeyResponse::FocusNext
            }
            NavOutcome::RemoveLastChip => {
                if let Some((_, change)) = self.engine.pop_last(&self.options) {
                    self.emit_change(change);
                }
                KeyResponse::Handled
            }
            NavOutcome::SearchChanged => {
                self.search_changed();
                KeyResponse::Handled
            }
        }
    }

    fn nav_context(&self) -> NavContext {
        NavContext {
            filtered_len: self.filtered.len(),
            disabled: self.config.disabled,
            readonly: self.config.readonly,
            multiple: self.config.multiple,
            allow_create: self.offer_create_allowed(),
            typing_opens: self.tuning.typing_opens && self.config.searchable,
            movement: self.tuning.movement,
        }
    }

    fn offer_create_allowed(&self) -> bool {
        self.config.allow_create && !self.options.label_exists(self.dropdown.search().trim())
    }

    // ---- mouse -------------------------------------------------------

    /// Route a click. Returns whether this control consumed it.
    pub fn handle_click(&mut self, row: u16, col: u16) -> bool {
        if self.destroyed || self.config.disabled {
            return false;
        }
        if self.rect.contains(row, col) {
            self.focused = true;
            self.toggle();
            return true;
        }
        if !self.dropdown.is_open() {
            return false;
        }
        let rows = self.rows();
        let geo = resolve_placement(self.rect, self.viewport.1, rows.len() as u16);
        if click_outside(self.rect, Some(geo.rect), row, col) {
            self.close();
            return false;
        }
        let anchor = self.dropdown.highlighted().and_then(|at| position_of(&rows, at));
        let window = scroll_window(rows.len(), geo.rect.height as usize, anchor);
        let slot = (row - geo.rect.row) as usize;
        if let Some(row_at) = window.clone().nth(slot) {
            match &rows[row_at] {
                ListRow::Option(opt) if !opt.disabled => {
                    let at = opt.index;
                    self.select_filtered(at);
                }
                ListRow::Create { .. } => self.create_from_search(),
                _ => {}
            }
        }
        true
    }

    // ---- open/close --------------------------------------------------

    pub fn open(&mut self) {
        if self
            .dropdown
            .open(self.filtered.len(), self.config.disabled, self.config.readonly)
        {
            self.after_open();
        }
    }

    pub fn close(&mut self) {
        if self.dropdown.is_open() {
            self.dropdown.close();
            self.after_close();
        }
    }

    pub fn toggle(&mut self) {
        if self.dropdown.is_open() {
            self.close();
        } else {
            self.open();
        }
    }

    fn after_open(&mut self) {
        self.refilter();
        self.dropdown.sync_filtered(self.filtered.len());
        self.emit(ControlPayload::Opened);
        if self.options.is_empty() {
            self.refetch();
        }
    }

    fn after_close(&mut self) {
        self.refilter();
        self.emit(ControlPayload::Closed);
    }

    // ---- search and filtering ----------------------------------------

    fn search_changed(&mut self) {
        let term = self.dropdown.search().to_string();
        self.load_error = None;
        self.emit(ControlPayload::SearchInput { term: term.clone() });
        self.refilter();
        self.dropdown.sync_filtered(self.filtered.len());
        if self.fetcher.has_remote_source()
            && term.chars().count() >= self.config.min_search_length
        {
            self.dropdown.set_searching(true);
            self.fetcher.queue_search(&term);
        }
    }

    /// Rebuild the filtered id list from the current search. With no search
    /// the grouped order applies and the recent section (live ids only) is
    /// prepended; a search flattens everything into match order.
    fn refilter(&mut self) {
        let term = self.dropdown.search().to_string();
        let mut ids = if term.is_empty() {
            let base = if self.options.has_groups() {
                let view = self.options.grouped();
                let mut out = view.ungrouped;
                for (_, members) in view.groups {
                    out.extend(members);
                }
                out
            } else {
                self.options.ids()
            };
            if self.config.show_recent {
                let mut out: Vec<OptionId> = self
                    .recent_ids
                    .iter()
                    .filter(|id| self.options.contains(id))
                    .cloned()
                    .collect();
                self.recent_count = out.len();
                out.extend(base);
                out
            } else {
                self.recent_count = 0;
                base
            }
        } else {
            self.recent_count = 0;
            self.options.filter(&term)
        };
        if let Some(cap) = self.tuning.max_items {
            ids.truncate(cap);
        }
        self.filtered = ids;
    }

    // ---- selection ---------------------------------------------------

    fn commit_filtered(&mut self, at: usize) -> Option<SelectOutcome> {
        let id = self.filtered.get(at)?.clone();
        let outcome = self.engine.select(&id, &self.options)?;
        if self.config.show_recent {
            self.recent_ids = self.recent.save(&self.config.name, &id);
        }
        self.emit_change(outcome.change.clone());
        Some(outcome)
    }

    fn select_filtered(&mut self, at: usize) {
        let Some(outcome) = self.commit_filtered(at) else {
            return;
        };
        self.apply_outcome(&outcome);
    }

    fn apply_outcome(&mut self, outcome: &SelectOutcome) {
        if outcome.clear_search {
            self.dropdown.set_search("");
        }
        if outcome.close_dropdown {
            self.dropdown.close();
            self.after_close();
        } else {
            self.refilter();
            self.dropdown.sync_filtered(self.filtered.len());
        }
    }

    fn create_from_search(&mut self) {
        let label = self.dropdown.search().trim().to_string();
        if label.is_empty() || self.options.label_exists(&label) {
            return;
        }
        if let Some(gate) = &self.create_gate
            && !gate(&label)
        {
            debug!(target: "control", control = %self.config.name, %label, "creation declined by host");
            return;
        }
        let item = OptionItem::created(&label);
        let id = item.id.clone();
        self.options.push(item.clone());
        self.emit(ControlPayload::Created { label, option: item });
        self.pending_publish = true;
        let Some(outcome) = self.engine.select(&id, &self.options) else {
            return;
        };
        if self.config.show_recent {
            self.recent_ids = self.recent.save(&self.config.name, &id);
        }
        self.emit_change(outcome.change.clone());
        self.apply_outcome(&outcome);
    }

    /// Programmatic selection by id.
    pub fn select_id(&mut self, id: &OptionId) -> Result<(), ControlError> {
        if self.destroyed {
            return Err(ControlError::Destroyed(self.config.name.clone()));
        }
        if self.config.disabled {
            return Err(ControlError::Disabled(self.config.name.clone()));
        }
        let outcome = self
            .engine
            .select(id, &self.options)
            .ok_or_else(|| ControlError::UnknownOption(id.as_str().to_string()))?;
        if self.config.show_recent {
            self.recent_ids = self.recent.save(&self.config.name, id);
        }
        self.emit_change(outcome.change.clone());
        Ok(())
    }

    pub fn deselect(&mut self, id: &OptionId) {
        if let Some(change) = self.engine.deselect(id, &self.options) {
            self.emit_change(change);
        }
    }

    pub fn clear(&mut self) {
        let change = self.engine.clear(&self.options);
        self.dropdown.set_search("");
        self.refilter();
        self.dropdown.sync_filtered(self.filtered.len());
        self.emit_change(change);
    }

    pub fn set_value(&mut self, value: &Value) {
        self.engine.set_value(value, &self.options);
    }

    pub fn capture_original(&mut self) {
        self.engine.capture_original();
    }

    pub fn value(&self) -> Value {
        self.engine.value(&self.options)
    }

    pub fn selected_options(&self) -> Vec<OptionItem> {
        self.engine.selected_options(&self.options)
    }

    // ---- option data -------------------------------------------------

    /// Replace the option set from raw records; publishes to the group.
    pub fn set_options(&mut self, raw: &[Value]) {
        let items = normalize_all(raw, &self.config.fields);
        self.set_items(items);
        self.pending_publish = true;
    }

    /// Replace the option set from already-normalized items. Used for sync
    /// snapshots, so it never raises the publish flag.
    pub fn set_items(&mut self, items: Vec<OptionItem>) {
        self.options.replace(items);
        self.refilter();
        self.dropdown.sync_filtered(self.filtered.len());
    }

    /// Apply a remote load result routed back from the event channel. A
    /// result for a search term the user has since abandoned still lands
    /// here; replacing the set and refiltering is harmless either way.
    pub fn apply_loaded(&mut self, options: Vec<OptionItem>, search_term: &str) {
        self.dropdown.set_searching(false);
        self.load_error = None;
        self.options.replace(options);
        self.refilter();
        self.dropdown.sync_filtered(self.filtered.len());
        if search_term.is_empty() {
            self.pending_publish = true;
        }
    }

    /// A failed load keeps the prior options usable.
    pub fn apply_load_failed(&mut self, message: impl Into<String>) {
        self.dropdown.set_searching(false);
        self.load_error = Some(message.into());
    }

    // ---- remote source -----------------------------------------------

    pub fn set_data_url(&mut self, url: Option<String>) {
        self.config.data_url = url.clone();
        self.fetcher.set_data_url(url);
        self.refetch();
    }

    /// Empty-term fetch, used for the initial load, data-url changes, and
    /// sync-group refreshes. Skipped when a minimum search length gates the
    /// endpoint, since an empty term can never satisfy it.
    pub fn refetch(&mut self) {
        if !self.fetcher.has_remote_source() || self.config.min_search_length > 0 {
            return;
        }
        if self.dropdown.is_open() {
            self.dropdown.set_searching(true);
        }
        self.fetcher.force_fetch("");
    }

    /// Re-run the current search immediately.
    pub fn refresh(&mut self) {
        let term = self.dropdown.search().to_string();
        if !self.fetcher.has_remote_source()
            || term.chars().count() < self.config.min_search_length
        {
            return;
        }
        if self.dropdown.is_open() {
            self.dropdown.set_searching(true);
        }
        self.fetcher.force_fetch(&term);
    }

    // ---- live settings -----------------------------------------------

    pub fn set_disabled(&mut self, disabled: bool) {
        self.config.disabled = disabled;
        if disabled {
            self.close();
        }
    }

    pub fn set_allow_create(&mut self, allow: bool) {
        self.config.allow_create = allow;
    }

    pub fn set_sync_group(&mut self, group: impl Into<String>) {
        self.config.sync_group = group.into();
    }

    pub fn set_create_gate(&mut self, gate: Box<dyn Fn(&str) -> bool + Send>) {
        self.create_gate = Some(gate);
    }

    // ---- geometry ----------------------------------------------------

    pub fn set_rect(&mut self, rect: CellRect) {
        self.rect = rect;
    }

    pub fn rect(&self) -> CellRect {
        self.rect
    }

    pub fn set_viewport(&mut self, cols: u16, rows: u16) {
        self.viewport = (cols, rows);
    }

    /// A resize invalidates the pane geometry; force-close and let the user
    /// reopen against the new viewport.
    pub fn handle_resize(&mut self, cols: u16, rows: u16) {
        self.viewport = (cols, rows);
        self.close();
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
        if !focused {
            self.close();
        }
    }

    // ---- rendering ---------------------------------------------------

    fn rows(&self) -> Vec<ListRow> {
        let items: Vec<OptionItem> = self
            .filtered
            .iter()
            .filter_map(|id| self.options.get(id).cloned())
            .collect();
        let search = self.dropdown.search();
        build_rows(&RowsInput {
            filtered: &items,
            recent_count: self.recent_count,
            grouped: self.options.has_groups() && search.is_empty(),
            search,
            selected: self.engine.selected_ids(),
            loading: self.dropdown.is_searching(),
            error: self.load_error.as_deref(),
            empty_text: &self.config.empty_text,
            offer_create: self.offer_create_allowed() && !search.trim().is_empty(),
        })
    }

    /// Snapshot for the render engine.
    pub fn model(&self) -> ControlModel {
        let open = self.dropdown.is_open();
        let search = self.dropdown.search().to_string();
        let selected = self.selected_options();
        let chips = if self.config.multiple {
            selected.iter().map(|item| item.label.clone()).collect()
        } else {
            Vec::new()
        };
        let display = if self.config.multiple {
            None
        } else {
            selected.first().map(|item| item.label.clone())
        };
        let placeholder = if open && search.is_empty() && self.config.searchable {
            self.config.search_placeholder.clone()
        } else {
            self.config.placeholder.clone()
        };
        ControlModel {
            name: self.config.name.clone(),
            label: self.config.label.clone(),
            placeholder,
            rect: self.rect,
            focused: self.focused,
            disabled: self.config.disabled,
            multiple: self.config.multiple,
            open,
            chips,
            display,
            search,
            error: if open { None } else { self.load_error.clone() },
            rows: if open { self.rows() } else { Vec::new() },
            highlighted: self.dropdown.highlighted(),
        }
    }

    // ---- lifecycle ---------------------------------------------------

    /// Abort in-flight work and go inert. Idempotent; the facade handles
    /// registry unregistration.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.fetcher.abort();
        self.dropdown.close();
    }

    /// Drain the deferred-publish flag. The facade publishes the returned
    /// options after releasing its lock.
    pub fn take_publish(&mut self) -> Option<Vec<OptionItem>> {
        if !self.pending_publish {
            return None;
        }
        self.pending_publish = false;
        Some(self.options.items().to_vec())
    }

    fn emit(&self, payload: ControlPayload) {
        self.sink
            .emit(ControlEvent::new(self.config.name.clone(), payload));
    }

    fn emit_change(&self, change: ChangeDetail) {
        self.emit(ControlPayload::Changed {
            value: change.value,
            selected: change.selected,
            cleared: change.cleared,
        });
    }
}
