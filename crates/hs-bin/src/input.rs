//! Async terminal input task.
//!
//! One spawned task owns the crossterm [`EventStream`] and forwards
//! normalized events into the shared channel. The task exits on a shutdown
//! signal, on channel closure, or when the stream ends; the runtime signals
//! shutdown first and then joins the handle, so stream teardown always runs
//! on the task's own stack.

use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossterm::event::{
    Event as CEvent, KeyCode as CKeyCode, KeyEvent as CKeyEvent, KeyEventKind as CKind,
    KeyModifiers as CMods, MouseButton as CMouseButton, MouseEvent as CMouseEvent,
    MouseEventKind as CMouseKind,
};
use tokio::sync::{Notify, mpsc::Sender};
use tokio::task;
use tokio_stream::StreamExt;
use tracing::{info, trace, warn};

use core_events::{
    ASYNC_INPUT_STARTS, ASYNC_INPUT_STOP_CHANNEL, ASYNC_INPUT_STOP_ERROR, ASYNC_INPUT_STOP_SIGNAL,
    ASYNC_INPUT_STOP_STREAM, CHANNEL_BLOCKING_SENDS, CHANNEL_SEND_FAILURES, Event, InputEvent,
    KEYPRESS_TOTAL, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};

#[derive(Clone, Debug)]
pub struct InputShutdown {
    notify: Arc<Notify>,
}

impl InputShutdown {
    pub fn signal(&self) {
        self.notify.notify_one();
    }
}

#[derive(Clone, Debug)]
struct ShutdownListener {
    notify: Arc<Notify>,
}

impl ShutdownListener {
    fn new_pair() -> (InputShutdown, Self) {
        let notify = Arc::new(Notify::new());
        (
            InputShutdown {
                notify: notify.clone(),
            },
            Self { notify },
        )
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Spawn the input task over the live crossterm stream.
pub fn spawn_input(sender: Sender<Event>) -> (task::JoinHandle<()>, InputShutdown) {
    let (shutdown, listener) = ShutdownListener::new_pair();
    let handle = task::spawn(async move {
        let stream = crossterm::event::EventStream::new();
        InputTask::new(sender, stream, listener).run().await;
    });
    (handle, shutdown)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExitReason {
    ShutdownSignal,
    ChannelClosed,
    StreamEnded,
    StreamError,
}

impl ExitReason {
    fn as_str(&self) -> &'static str {
        match self {
            Self::ShutdownSignal => "shutdown_signal",
            Self::ChannelClosed => "channel_closed",
            Self::StreamEnded => "stream_ended",
            Self::StreamError => "stream_error",
        }
    }
}

struct InputTask<S>
where
    S: tokio_stream::Stream<Item = io::Result<CEvent>> + Send + Unpin + 'static,
{
    sender: Sender<Event>,
    stream: S,
    shutdown: ShutdownListener,
    exit_reason: ExitReason,
}

impl<S> InputTask<S>
where
    S: tokio_stream::Stream<Item = io::Result<CEvent>> + Send + Unpin + 'static,
{
    fn new(sender: Sender<Event>, stream: S, shutdown: ShutdownListener) -> Self {
        Self {
            sender,
            stream,
            shutdown,
            exit_reason: ExitReason::StreamEnded,
        }
    }

    async fn run(mut self) {
        info!(target: "input", "input task started");
        ASYNC_INPUT_STARTS.fetch_add(1, Ordering::Relaxed);

        loop {
            let maybe_result = tokio::select! {
                biased;
                _ = self.shutdown.wait() => {
                    self.exit_reason = ExitReason::ShutdownSignal;
                    break;
                }
                result = self.stream.next() => result,
            };

            let Some(result) = maybe_result else {
                break;
            };

            let keep_going = match result {
                Ok(CEvent::Key(key)) => self.handle_key(key).await,
                Ok(CEvent::Resize(w, h)) => {
                    trace!(target: "input", w, h, "resize");
                    self.send(Event::Input(InputEvent::Resize(w, h))).await
                }
                Ok(CEvent::Mouse(mouse)) => self.handle_mouse(mouse).await,
                Ok(_) => true,
                Err(err) => {
                    warn!(target: "input", error = %err, "input stream error");
                    self.exit_reason = ExitReason::StreamError;
                    false
                }
            };
            if !keep_going {
                break;
            }
        }

        match self.exit_reason {
            ExitReason::ShutdownSignal => {
                ASYNC_INPUT_STOP_SIGNAL.fetch_add(1, Ordering::Relaxed);
            }
            ExitReason::ChannelClosed => {
                ASYNC_INPUT_STOP_CHANNEL.fetch_add(1, Ordering::Relaxed);
            }
            ExitReason::StreamEnded => {
                ASYNC_INPUT_STOP_STREAM.fetch_add(1, Ordering::Relaxed);
            }
            ExitReason::StreamError => {
                ASYNC_INPUT_STOP_ERROR.fetch_add(1, Ordering::Relaxed);
            }
        }
        info!(
            target: "input",
            reason = self.exit_reason.as_str(),
            "input task stopped"
        );
    }

    async fn handle_key(&mut self, key: CKeyEvent) -> bool {
        if !matches!(key.kind, CKind::Press | CKind::Repeat) {
            return true;
        }
        if matches!(key.code, CKeyCode::Char('c')) && key.modifiers.contains(CMods::CONTROL) {
            return self.send(Event::Input(InputEvent::CtrlC)).await;
        }
        let Some(key) = map_key(&key) else {
            return true;
        };
        trace!(target: "input", key = %key, "keypress");
        let sent = self.send(Event::Input(InputEvent::Key(key))).await;
        if sent {
            KEYPRESS_TOTAL.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    async fn handle_mouse(&mut self, mouse: CMouseEvent) -> bool {
        let Some(mouse) = map_mouse(&mouse) else {
            return true;
        };
        self.send(Event::Input(InputEvent::Mouse(mouse))).await
    }

    async fn send(&mut self, event: Event) -> bool {
        match self.sender.send(event).await {
            Ok(()) => {
                CHANNEL_BLOCKING_SENDS.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
                if self.exit_reason != ExitReason::ShutdownSignal {
                    self.exit_reason = ExitReason::ChannelClosed;
                }
                false
            }
        }
    }
}

fn map_mods(mods: CMods) -> KeyModifiers {
    let mut out = KeyModifiers::empty();
    if mods.contains(CMods::CONTROL) {
        out |= KeyModifiers::CTRL;
    }
    if mods.contains(CMods::ALT) {
        out |= KeyModifiers::ALT;
    }
    if mods.contains(CMods::SHIFT) {
        out |= KeyModifiers::SHIFT;
    }
    out
}

fn map_key(key: &CKeyEvent) -> Option<KeyEvent> {
    let code = match key.code {
        CKeyCode::Char(c) => KeyCode::Char(c),
        CKeyCode::Enter => KeyCode::Enter,
        CKeyCode::Esc => KeyCode::Esc,
        CKeyCode::Backspace => KeyCode::Backspace,
        CKeyCode::Tab => KeyCode::Tab,
        CKeyCode::BackTab => KeyCode::Tab,
        CKeyCode::Up => KeyCode::Up,
        CKeyCode::Down => KeyCode::Down,
        CKeyCode::Left => KeyCode::Left,
        CKeyCode::Right => KeyCode::Right,
        CKeyCode::Home => KeyCode::Home,
        CKeyCode::End => KeyCode::End,
        CKeyCode::Delete => KeyCode::Delete,
        _ => return None,
    };
    let mut mods = map_mods(key.modifiers);
    if matches!(key.code, CKeyCode::BackTab) {
        mods |= KeyModifiers::SHIFT;
    }
    // Shift is baked into the char itself.
    if matches!(code, KeyCode::Char(_)) {
        mods.remove(KeyModifiers::SHIFT);
    }
    Some(KeyEvent { code, mods })
}

fn map_mouse(mouse: &CMouseEvent) -> Option<MouseEvent> {
    let kind = match mouse.kind {
        CMouseKind::Down(button) => MouseEventKind::Down(map_button(button)),
        CMouseKind::Up(button) => MouseEventKind::Up(map_button(button)),
        CMouseKind::Drag(button) => MouseEventKind::Drag(map_button(button)),
        CMouseKind::ScrollUp => MouseEventKind::ScrollUp,
        CMouseKind::ScrollDown => MouseEventKind::ScrollDown,
        CMouseKind::Moved => MouseEventKind::Moved,
        CMouseKind::ScrollLeft | CMouseKind::ScrollRight => return None,
    };
    Some(MouseEvent {
        kind,
        column: mouse.column,
        row: mouse.row,
        mods: map_mods(mouse.modifiers),
    })
}

fn map_button(button: CMouseButton) -> MouseButton {
    match button {
        CMouseButton::Left => MouseButton::Left,
        CMouseButton::Right => MouseButton::Right,
        CMouseButton::Middle => MouseButton::Middle,
    }
}
