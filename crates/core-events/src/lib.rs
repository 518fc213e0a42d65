//! Core event types and channel helpers for the hybrid control runtime.
//!
//! Controls never touch each other directly: every state transition is
//! surfaced as a [`ControlEvent`] pushed into one bounded channel whose sole
//! consumer is the application event loop.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

use core_options::OptionItem;
use serde_json::Value;

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// The event loop uses a bounded mpsc channel sized by `EVENT_CHANNEL_CAP` for memory safety and
// natural producer backpressure. Producers are the terminal input task, the tick source, and the
// per-control fetch tasks; the single consumer is the UI loop, which is also the only mutator of
// control state. Send failures (consumer dropped) are counted, not retried.
// -------------------------------------------------------------------------------------------------
pub const EVENT_CHANNEL_CAP: usize = 8192;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Simple atomic counters (no locking, fetch_add relaxed). Inspected in unit tests or periodically
// logged; a metrics integration can export them later without changing call sites.
// -------------------------------------------------------------------------------------------------
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static CHANNEL_BLOCKING_SENDS: AtomicU64 = AtomicU64::new(0);
pub static KEYPRESS_TOTAL: AtomicU64 = AtomicU64::new(0); // total keypress events emitted
pub static CONTROL_EVENTS_EMITTED: AtomicU64 = AtomicU64::new(0);
pub static CONTROL_EVENTS_DROPPED: AtomicU64 = AtomicU64::new(0); // full or closed channel
// Async input task lifecycle telemetry
pub static ASYNC_INPUT_STARTS: AtomicU64 = AtomicU64::new(0);
pub static ASYNC_INPUT_STOP_SIGNAL: AtomicU64 = AtomicU64::new(0);
pub static ASYNC_INPUT_STOP_CHANNEL: AtomicU64 = AtomicU64::new(0);
pub static ASYNC_INPUT_STOP_STREAM: AtomicU64 = AtomicU64::new(0);
pub static ASYNC_INPUT_STOP_ERROR: AtomicU64 = AtomicU64::new(0);

/// Top-level event enum consumed by the central event loop.
#[derive(Debug, Clone)]
pub enum Event {
    Input(InputEvent),
    /// A control surfaced a state transition (change, open, load, ...).
    Control(ControlEvent),
    Command(CommandEvent),
    RenderRequested,
    /// Periodic monotonic tick used for lightweight refresh without busy
    /// polling.
    Tick,
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum CommandEvent {
    Quit,
}

/// Event emitted by a control, namespaced by its logical `control` name.
///
/// The rendition of the bubbling `hybrid-select:<event>` custom events: every
/// payload carries the originating control's name so loop-level consumers can
/// route without holding control references.
#[derive(Debug, Clone)]
pub struct ControlEvent {
    pub control: String,
    pub payload: ControlPayload,
}

impl ControlEvent {
    pub fn new(control: impl Into<String>, payload: ControlPayload) -> Self {
        Self {
            control: control.into(),
            payload,
        }
    }

    /// Stable event name used in logs.
    pub fn name(&self) -> &'static str {
        match self.payload {
            ControlPayload::Changed { .. } => "change",
            ControlPayload::Opened => "open",
            ControlPayload::Closed => "close",
            ControlPayload::SearchInput { .. } => "input",
            ControlPayload::Loaded { .. } => "load",
            ControlPayload::LoadFailed { .. } => "error",
            ControlPayload::Created { .. } => "create",
            ControlPayload::Validated { .. } => "validated",
        }
    }
}

/// Event-specific payloads.
#[derive(Debug, Clone)]
pub enum ControlPayload {
    /// Selection changed. `value` is the submission value (array in multi
    /// mode), `selected` the full selected options, `cleared` true when the
    /// change came from `clear()`.
    Changed {
        value: Value,
        selected: Vec<OptionItem>,
        cleared: bool,
    },
    Opened,
    Closed,
    /// Search text changed (per keystroke, before any debounce).
    SearchInput { term: String },
    /// Remote data arrived and replaced the option set.
    Loaded {
        options: Vec<OptionItem>,
        search_term: String,
    },
    /// Remote fetch failed for a reason other than cancellation.
    LoadFailed { message: String },
    /// Create-new affordance activated.
    Created { label: String, option: OptionItem },
    /// Input validation result (hybrid input control).
    Validated { ok: bool, message: Option<String> },
}

/// Non-blocking sender handed to each control for event emission.
///
/// Controls emit from the UI loop's call stack, so blocking on a full channel
/// would deadlock the consumer; `try_send` plus a drop counter is the policy.
/// A disconnected sink (tests, headless use) swallows events.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<Event>>,
}

impl EventSink {
    pub fn new(tx: Sender<Event>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that drops everything. Useful for tests and for controls not yet
    /// attached to a running loop.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ControlEvent) {
        CONTROL_EVENTS_EMITTED.fetch_add(1, Ordering::Relaxed);
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(Event::Control(event)) {
            Ok(()) => {}
            Err(err) => {
                CONTROL_EVENTS_DROPPED.fetch_add(1, Ordering::Relaxed);
                CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(target: "runtime.events", error = %err, "control event dropped");
            }
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("connected", &self.tx.is_some())
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------
// Async Event Sources
// -------------------------------------------------------------------------------------------------
// Each source owns one background task pushing `Event`s into the shared channel and terminates
// promptly on channel send failure (consumer dropped). The bounded channel supplies flow control;
// prioritization can layer later without changing this API.

/// Trait implemented by any async event producer. Implementors usually hold
/// configuration and spawn one background task that pushes `Event`s into the
/// shared channel.
pub trait AsyncEventSource: Send + 'static {
    /// Human-readable stable identifier (used for logging / diagnostics).
    fn name(&self) -> &'static str;
    /// Consume self and spawn the background task, returning a JoinHandle.
    /// Implementors should stop when `tx.send(..).await` returns Err (channel
    /// closed) or on their own internal stop condition, and avoid busy loops
    /// by awaiting timers or external IO futures.
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Registry of event sources, spawned together at startup.
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl Default for EventSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    /// Spawn all registered sources, returning their JoinHandles. The supplied
    /// `Sender` reference stays owned by the caller; each source receives its
    /// own clone so no additional strong references linger inside the registry
    /// once this call returns.
    ///
    /// Ordering guarantee: call this after constructing the primary runtime
    /// channel and before the event loop begins consuming events. During
    /// shutdown the caller should drop its final `Sender` clone before
    /// awaiting the returned handles so the sources observe the closed channel
    /// and exit cooperatively.
    pub fn spawn_all(&mut self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        // Take ownership so duplicate spawns are prevented if called twice.
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            let name = src.name();
            tracing::info!(target: "runtime.events", source = name, "spawning event source");
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

/// Built-in monotonic tick source. Emits `Event::Tick` every configured
/// interval.
pub struct TickEventSource {
    interval: std::time::Duration,
}

impl TickEventSource {
    pub fn new(interval: std::time::Duration) -> Self {
        Self { interval }
    }
}

impl AsyncEventSource for TickEventSource {
    fn name(&self) -> &'static str {
        "tick"
    }
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let dur = self.interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dur);
            loop {
                interval.tick().await;
                if tx.send(Event::Tick).await.is_err() {
                    break;
                }
            }
        })
    }
}

/// Normalized input events.
#[derive(Debug, Clone)]
pub enum InputEvent {
    Key(KeyEvent),
    /// Terminal resize (columns, rows). Open dropdowns force-close on this.
    Resize(u16, u16),
    Mouse(MouseEvent),
    /// Synthetic interrupt (Ctrl-C) surfaced distinctly.
    CtrlC,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub mods: KeyModifiers,
}

impl KeyEvent {
    pub fn plain(code: KeyCode) -> Self {
        Self {
            code,
            mods: KeyModifiers::empty(),
        }
    }
}

/// Normalized logical key representations consumed by the dropdown
/// navigation layer. Printables are always `Char` (space included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Esc,
    Backspace,
    Tab,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Delete,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct KeyModifiers: u8 {
        const CTRL = 0b0000_0001;
        const ALT  = 0b0000_0010;
        const SHIFT= 0b0000_0100;
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:?}", self.code, self.mods)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub column: u16,
    pub row: u16,
    pub mods: KeyModifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseEventKind {
    Down(MouseButton),
    Up(MouseButton),
    Drag(MouseButton),
    ScrollUp,
    ScrollDown,
    Moved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

/// Helper result type shared across event-producing crates.
pub type EventResult<T> = anyhow::Result<T>;


#[cfg(test)]
mod tests {
    use super::*;
    use core_options::OptionId;
    use tokio::sync::mpsc;

    #[test]
    fn key_event_display() {
        let k = KeyEvent {
            code: KeyCode::Char('x'),
            mods: KeyModifiers::CTRL,
        };
        let s = format!("{}", k);
        assert!(s.contains("Char"));
    }

    #[test]
    fn control_event_names_are_stable() {
        let changed = ControlEvent::new(
            "crew",
            ControlPayload::Changed {
                value: Value::Null,
                selected: Vec::new(),
                cleared: true,
            },
        );
        assert_eq!(changed.name(), "change");
        assert_eq!(changed.control, "crew");
        let failed = ControlEvent::new(
            "crew",
            ControlPayload::LoadFailed {
                message: "boom".into(),
            },
        );
        assert_eq!(failed.name(), "error");
    }

    #[tokio::test]
    async fn sink_delivers_and_disconnected_sink_swallows() {
        let (tx, mut rx) = mpsc::channel::<Event>(4);
        let sink = EventSink::new(tx);
        sink.emit(ControlEvent::new("crew", ControlPayload::Opened));
        match rx.recv().await {
            Some(Event::Control(ev)) => assert_eq!(ev.name(), "open"),
            other => panic!("expected control event, got {:?}", other),
        }

        let orphan = EventSink::disconnected();
        orphan.emit(ControlEvent::new(
            "crew",
            ControlPayload::Created {
                label: "New".into(),
                option: core_options::OptionItem::created("New"),
            },
        ));
        // No panic, no delivery; the option id was still minted.
        let opt = core_options::OptionItem::created("X");
        assert_ne!(opt.id, OptionId::new(""));
    }
}
