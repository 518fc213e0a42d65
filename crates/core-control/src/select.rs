//! The HybridSelect facade: a [`ControlCore`] behind a lock, wired into the
//! sync registry.
//!
//! The facade owns the two concerns the core must not know about. First,
//! serialization: the registry delivers snapshots from whichever control
//! published, so the core sits behind a mutex and every entry point goes
//! through [`SelectShared::lock`]. Second, publish fan-out: the core only
//! raises a flag when its option set becomes shareable, and the facade
//! drains that flag with the lock released before calling into the
//! registry. Registry calls are never made while the core lock is held,
//! which is what keeps fan-out deadlock-free when two grouped controls
//! mutate concurrently.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::debug;

use core_dropdown::CellRect;
use core_events::{ControlEvent, ControlPayload, EventSink, KeyEvent};
use core_fetch::SearchBackend;
use core_options::{OptionId, OptionItem};
use core_render::ControlModel;
use core_sync::{MemberId, SyncMember, next_member_id};

use crate::ControlError;
use crate::config::ControlConfig;
use crate::core::{ControlCore, KeyResponse, Tuning};

/// The lock-owning half shared between the facade and the sync registry.
pub(crate) struct SelectShared {
    member_id: MemberId,
    core: Mutex<ControlCore>,
}

impl SelectShared {
    fn new(core: ControlCore) -> Arc<Self> {
        Arc::new(Self {
            member_id: next_member_id(),
            core: Mutex::new(core),
        })
    }

    /// Recover from poisoning rather than propagate it. The core's state
    /// stays internally consistent across panics in callers.
    fn lock(&self) -> MutexGuard<'_, ControlCore> {
        match self.core.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SyncMember for SelectShared {
    fn sync_id(&self) -> MemberId {
        self.member_id
    }

    fn apply_sync_snapshot(&self, options: &[OptionItem]) -> anyhow::Result<()> {
        self.lock().set_items(options.to_vec());
        Ok(())
    }

    fn has_remote_source(&self) -> bool {
        self.lock().has_remote_source()
    }

    fn request_refetch(&self) {
        self.lock().refetch();
    }
}

/// Single- or multi-select control with search, recent history, remote
/// options, and sync-group membership.
pub struct HybridSelect {
    shared: Arc<SelectShared>,
    group: String,
    name: String,
    destroyed: bool,
}

impl HybridSelect {
    pub fn new(
        config: ControlConfig,
        backend: Arc<dyn SearchBackend>,
        sink: EventSink,
    ) -> Self {
        let tuning = Tuning::select(config.mode);
        Self::with_tuning(config, tuning, backend, sink)
    }

    pub(crate) fn with_tuning(
        config: ControlConfig,
        tuning: Tuning,
        backend: Arc<dyn SearchBackend>,
        sink: EventSink,
    ) -> Self {
        let group = config.sync_group.clone();
        let name = config.name.clone();
        let shared = SelectShared::new(ControlCore::new(config, tuning, backend, sink));
        core_sync::register(&group, &(shared.clone() as Arc<dyn SyncMember>));
        debug!(target: "control", control = name.as_str(), group = group.as_str(), "control created");
        Self {
            shared,
            group,
            name,
            destroyed: false,
        }
    }

    /// Kick the initial fetch for remote controls. Separate from
    /// construction so controls can be built before the runtime starts.
    pub fn connect(&self) {
        self.with_core(|core| core.refetch());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` against the core, then fan out any publish it raised.
    /// The registry call happens strictly after the guard drops.
    fn with_core<T>(&self, f: impl FnOnce(&mut ControlCore) -> T) -> T {
        let (out, publish) = {
            let mut core = self.shared.lock();
            let out = f(&mut core);
            (out, core.take_publish())
        };
        if let Some(options) = publish {
            core_sync::publish(&self.group, &options, self.shared.member_id);
        }
        out
    }

    // ---- interaction -------------------------------------------------

    pub fn handle_key(&self, key: KeyEvent) -> KeyResponse {
        self.with_core(|core| core.handle_key(key))
    }

    /// Returns true when the click landed on this control or its pane.
    pub fn handle_click(&self, row: u16, col: u16) -> bool {
        self.with_core(|core| core.handle_click(row, col))
    }

    pub fn handle_resize(&self, cols: u16, rows: u16) {
        self.with_core(|core| core.handle_resize(cols, rows));
    }

    /// Route an event from the shared channel back into the control.
    /// Events addressed to other controls are ignored.
    pub fn handle_event(&self, event: &ControlEvent) {
        if event.control != self.name {
            return;
        }
        match &event.payload {
            ControlPayload::Loaded {
                options,
                search_term,
            } => {
                self.with_core(|core| core.apply_loaded(options.clone(), search_term));
            }
            ControlPayload::LoadFailed { message } => {
                self.with_core(|core| core.apply_load_failed(message.clone()));
            }
            _ => {}
        }
    }

    pub fn open(&self) {
        self.with_core(|core| core.open());
    }

    pub fn close(&self) {
        self.with_core(|core| core.close());
    }

    pub fn toggle(&self) {
        self.with_core(|core| core.toggle());
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().is_open()
    }

    pub fn set_focused(&self, focused: bool) {
        self.with_core(|core| core.set_focused(focused));
    }

    pub fn is_focused(&self) -> bool {
        self.shared.lock().is_focused()
    }

    // ---- value -------------------------------------------------------

    pub fn select_id(&self, id: &OptionId) -> Result<(), ControlError> {
        self.with_core(|core| core.select_id(id))
    }

    pub fn deselect(&self, id: &OptionId) {
        self.with_core(|core| core.deselect(id));
    }

    pub fn clear(&self) {
        self.with_core(|core| core.clear());
    }

    pub fn set_value(&self, value: &Value) {
        self.with_core(|core| core.set_value(value));
    }

    pub fn value(&self) -> Value {
        self.shared.lock().value()
    }

    pub fn selected_options(&self) -> Vec<OptionItem> {
        self.shared.lock().selected_options()
    }

    /// Remember the current value as the Esc-restore point.
    pub fn capture_original(&self) {
        self.with_core(|core| core.capture_original());
    }

    // ---- options -----------------------------------------------------

    pub fn set_options(&self, raw: &[Value]) {
        self.with_core(|core| core.set_options(raw));
    }

    pub fn options_len(&self) -> usize {
        self.shared.lock().options_len()
    }

    pub fn set_data_url(&self, url: Option<String>) {
        self.with_core(|core| core.set_data_url(url));
    }

    pub fn refresh(&self) {
        self.with_core(|core| core.refresh());
    }

    // ---- attributes --------------------------------------------------

    pub fn set_disabled(&self, disabled: bool) {
        self.with_core(|core| core.set_disabled(disabled));
    }

    pub fn set_allow_create(&self, allow: bool) {
        self.with_core(|core| core.set_allow_create(allow));
    }

    pub fn set_create_gate(&self, gate: Box<dyn Fn(&str) -> bool + Send>) {
        self.with_core(|core| core.set_create_gate(gate));
    }

    /// Move the control to another sync group. The registry replays the
    /// new group's snapshot as part of the migration.
    pub fn set_sync_group(&mut self, group: impl Into<String>) {
        let group = group.into();
        if group == self.group {
            return;
        }
        self.with_core(|core| core.set_sync_group(group.clone()));
        core_sync::migrate(
            &self.group,
            &group,
            &(self.shared.clone() as Arc<dyn SyncMember>),
        );
        self.group = group;
    }

    pub fn sync_group(&self) -> &str {
        &self.group
    }

    // ---- layout and rendering ----------------------------------------

    pub fn set_rect(&self, rect: CellRect) {
        self.with_core(|core| core.set_rect(rect));
    }

    pub fn rect(&self) -> CellRect {
        self.shared.lock().rect()
    }

    pub fn set_viewport(&self, cols: u16, rows: u16) {
        self.with_core(|core| core.set_viewport(cols, rows));
    }

    pub fn model(&self) -> ControlModel {
        self.shared.lock().model()
    }

    // ---- lifecycle ---------------------------------------------------

    /// Abort in-flight work and leave the sync group. Idempotent; the
    /// control rejects programmatic selection afterwards.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.shared.lock().destroy();
        core_sync::unregister(&self.group, self.shared.member_id);
        debug!(target: "control", control = self.name.as_str(), "control destroyed");
    }
}

impl Drop for HybridSelect {
    fn drop(&mut self) {
        self.destroy();
    }
}
