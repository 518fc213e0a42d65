//! Hybrid controls demo entrypoint.
//!
//! Hosts a handful of controls in a terminal UI: two selects sharing a sync
//! group, a combo with free-text entry, and a validated text input. The
//! layout is a fixed column; every event that touches control state marks
//! the frame dirty and the loop re-renders after the cycle.

mod input;
mod terminal;

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use tracing_appender::non_blocking::WorkerGuard;

use core_control::{
    AdvancedCombo, ConfigFile, ControlConfig, HybridInput, HybridSelect, InputRules, KeyResponse,
    load_from,
};
use core_events::{
    CommandEvent, ControlEvent, EVENT_CHANNEL_CAP, Event, EventSink, EventSourceRegistry,
    InputEvent, MouseButton, MouseEvent, MouseEventKind, TickEventSource,
};
use core_dropdown::CellRect;
use core_fetch::{HttpBackend, SearchBackend};
use core_render::render_engine::RenderEngine;
use core_render::{ControlModel, Theme};

use crate::input::{InputShutdown, spawn_input};
use crate::terminal::{SessionGuard, TerminalSession};

const CONTROL_COL: u16 = 2;
const CONTROL_ROW_STRIDE: u16 = 3;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "hybrid-controls", version, about = "Hybrid select/input/combo demo")]
struct Args {
    /// Optional configuration file path (overrides discovery of
    /// `hybrid-controls.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Log filter directive (overrides `RUST_LOG`), e.g. `debug` or
    /// `control=trace,render=info`.
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
    /// Directory for `hybrid-controls.log`.
    #[arg(long = "log-dir", default_value = ".")]
    pub log_dir: PathBuf,
    /// Color preset for the terminal background.
    #[arg(long = "theme", value_enum, default_value_t = ThemeArg::Dark)]
    pub theme: ThemeArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ThemeArg {
    Dark,
    Light,
}

impl ThemeArg {
    fn to_theme(self) -> Theme {
        match self {
            ThemeArg::Dark => Theme::dark(),
            ThemeArg::Light => Theme::light(),
        }
    }
}

struct AppStartup {
    terminal: TerminalSession,
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self {
            terminal: TerminalSession::new(),
            log_guard: None,
        }
    }

    fn run(&mut self, args: &Args) -> Result<SessionGuard<'_>> {
        self.configure_logging(args);
        Self::install_panic_hook();

        info!(target: "runtime", "startup");
        self.terminal.set_title("Hybrid Controls")?;
        self.terminal.enter_guard()
    }

    fn configure_logging(&mut self, args: &Args) {
        let log_dir = args.log_dir.as_path();
        let log_path = log_dir.join("hybrid-controls.log");
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let filter = match &args.log_level {
            Some(directive) => tracing_subscriber::EnvFilter::try_new(directive)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::from_default_env()),
            None => tracing_subscriber::EnvFilter::from_default_env(),
        };
        let file_appender = tracing_appender::rolling::never(log_dir, "hybrid-controls.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        match tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(nb_writer)
            .try_init()
        {
            Ok(()) => {
                self.log_guard = Some(guard);
            }
            Err(_err) => {
                // Global subscriber already installed; drop the guard so the
                // writer shuts down.
            }
        }
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

/// One hosted control, dispatched by kind.
enum Control {
    Select(HybridSelect),
    Combo(AdvancedCombo),
    Input(HybridInput),
}

impl Control {
    fn name(&self) -> &str {
        match self {
            Control::Select(c) => c.name(),
            Control::Combo(c) => c.name(),
            Control::Input(c) => c.name(),
        }
    }

    /// Kick the initial fetch for remote controls.
    fn connect(&self) {
        match self {
            Control::Select(c) => c.connect(),
            Control::Combo(c) => c.connect(),
            Control::Input(_) => {}
        }
    }

    fn handle_key(&mut self, key: core_events::KeyEvent) -> KeyResponse {
        match self {
            Control::Select(c) => c.handle_key(key),
            Control::Combo(c) => c.handle_key(key),
            Control::Input(c) => c.handle_key(key),
        }
    }

    /// Returns true when the click landed on this control or its pane.
    fn handle_click(&mut self, row: u16, col: u16) -> bool {
        match self {
            Control::Select(c) => c.handle_click(row, col),
            Control::Combo(c) => c.handle_click(row, col),
            Control::Input(_) => false,
        }
    }

    fn handle_event(&mut self, event: &ControlEvent) {
        match self {
            Control::Select(c) => c.handle_event(event),
            Control::Combo(c) => c.handle_event(event),
            Control::Input(c) => c.handle_event(event),
        }
    }

    fn handle_resize(&mut self, cols: u16, rows: u16) {
        match self {
            Control::Select(c) => c.handle_resize(cols, rows),
            Control::Combo(c) => c.handle_resize(cols, rows),
            Control::Input(c) => c.handle_resize(cols, rows),
        }
    }

    fn set_focused(&mut self, focused: bool) {
        match self {
            Control::Select(c) => c.set_focused(focused),
            Control::Combo(c) => c.set_focused(focused),
            Control::Input(c) => c.set_focused(focused),
        }
    }

    fn set_rect(&mut self, rect: CellRect) {
        match self {
            Control::Select(c) => c.set_rect(rect),
            Control::Combo(c) => c.set_rect(rect),
            Control::Input(c) => c.set_rect(rect),
        }
    }

    fn model(&self) -> ControlModel {
        match self {
            Control::Select(c) => c.model(),
            Control::Combo(c) => c.model(),
            Control::Input(c) => c.model(),
        }
    }
}

/// Build the hosted controls from config, falling back to the built-in demo
/// set when the file defines none.
fn build_controls(
    file: &ConfigFile,
    backend: &Arc<dyn SearchBackend>,
    sink: &EventSink,
) -> Vec<Control> {
    if file.controls.is_empty() {
        return demo_controls(backend, sink);
    }
    file.controls
        .iter()
        .cloned()
        .map(|config| {
            if config.allow_create {
                Control::Combo(AdvancedCombo::new(config, backend.clone(), sink.clone()))
            } else {
                Control::Select(HybridSelect::new(config, backend.clone(), sink.clone()))
            }
        })
        .collect()
}

fn demo_controls(backend: &Arc<dyn SearchBackend>, sink: &EventSink) -> Vec<Control> {
    let mut crew_config = ControlConfig::named("crew");
    crew_config.label = Some("Crew".to_string());
    crew_config.multiple = true;
    crew_config.clearable = true;
    crew_config.sync_group = "crew-sync".to_string();
    let crew = HybridSelect::new(crew_config, backend.clone(), sink.clone());
    crew.set_options(&[
        json!({"id": "ada", "label": "Ada Osei", "group": "Flight"}),
        json!({"id": "bo", "label": "Bo Lindqvist", "group": "Flight"}),
        json!({"id": "cy", "label": "Cy Okafor", "group": "Ground"}),
        json!({"id": "dee", "label": "Dee Marsh", "group": "Ground"}),
    ]);

    let mut backup_config = ControlConfig::named("backup-crew");
    backup_config.label = Some("Backup crew".to_string());
    backup_config.sync_group = "crew-sync".to_string();
    let backup = HybridSelect::new(backup_config, backend.clone(), sink.clone());

    let mut route_config = ControlConfig::named("route");
    route_config.label = Some("Route".to_string());
    route_config.allow_create = true;
    route_config.show_recent = true;
    let route = AdvancedCombo::new(route_config, backend.clone(), sink.clone());
    route.set_options(&[
        json!({"id": "nrt", "label": "Northern transit"}),
        json!({"id": "sca", "label": "Southern arc"}),
        json!({"id": "pol", "label": "Polar crossing"}),
    ]);
    route.on_confirm_create(|label| !label.trim().is_empty());

    let mut callsign_config = ControlConfig::named("callsign");
    callsign_config.label = Some("Callsign".to_string());
    callsign_config.placeholder = "Enter a callsign".to_string();
    let callsign = HybridInput::new(
        callsign_config,
        InputRules {
            required: true,
            min_length: 3,
            max_length: Some(12),
            ..InputRules::default()
        },
        backend.clone(),
        sink.clone(),
    );

    vec![
        Control::Select(crew),
        Control::Select(backup),
        Control::Combo(route),
        Control::Input(callsign),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownReason {
    CtrlC,
    CommandQuit,
    ShutdownEvent,
    ChannelClosed,
}

impl ShutdownReason {
    fn as_str(&self) -> &'static str {
        match self {
            ShutdownReason::CtrlC => "ctrl_c",
            ShutdownReason::CommandQuit => "command_quit",
            ShutdownReason::ShutdownEvent => "shutdown_event",
            ShutdownReason::ChannelClosed => "channel_closed",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum LoopControl {
    Continue,
    Break(ShutdownReason),
}

struct ControlsRuntime<'a> {
    controls: Vec<Control>,
    focused: usize,
    engine: RenderEngine,
    viewport: (u16, u16),
    dirty: bool,
    rx: mpsc::Receiver<Event>,
    tx: Option<mpsc::Sender<Event>>,
    source_handles: Vec<tokio::task::JoinHandle<()>>,
    input_task: Option<tokio::task::JoinHandle<()>>,
    input_shutdown: Option<InputShutdown>,
    _terminal_guard: SessionGuard<'a>,
}

impl<'a> ControlsRuntime<'a> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        mut controls: Vec<Control>,
        viewport: (u16, u16),
        theme: Theme,
        tx: mpsc::Sender<Event>,
        rx: mpsc::Receiver<Event>,
        input_task: tokio::task::JoinHandle<()>,
        input_shutdown: InputShutdown,
        source_handles: Vec<tokio::task::JoinHandle<()>>,
        terminal_guard: SessionGuard<'a>,
    ) -> Self {
        for (i, control) in controls.iter_mut().enumerate() {
            let row = (i as u16) * CONTROL_ROW_STRIDE + 1;
            let width = control.model().rect.width;
            control.set_rect(CellRect::new(row, CONTROL_COL, width, 1));
            control.handle_resize(viewport.0, viewport.1);
        }
        if let Some(first) = controls.first_mut() {
            first.set_focused(true);
        }
        Self {
            controls,
            focused: 0,
            engine: RenderEngine::new().with_theme(theme),
            viewport,
            dirty: true,
            rx,
            tx: Some(tx),
            source_handles,
            input_task: Some(input_task),
            input_shutdown: Some(input_shutdown),
            _terminal_guard: terminal_guard,
        }
    }

    async fn run(&mut self) -> Result<()> {
        for control in &self.controls {
            control.connect();
        }
        self.render();

        let mut reason = ShutdownReason::ChannelClosed;
        while let Some(event) = self.rx.recv().await {
            let control = match &event {
                Event::Input(input) => self.handle_input_event(input),
                Event::Control(ev) => self.handle_control_event(ev),
                Event::Command(CommandEvent::Quit) => {
                    LoopControl::Break(ShutdownReason::CommandQuit)
                }
                Event::RenderRequested => {
                    self.dirty = true;
                    LoopControl::Continue
                }
                Event::Tick => LoopControl::Continue,
                Event::Shutdown => LoopControl::Break(ShutdownReason::ShutdownEvent),
            };
            match control {
                LoopControl::Break(r) => {
                    reason = r;
                    break;
                }
                LoopControl::Continue => {
                    if self.dirty {
                        self.render();
                    }
                }
            }
        }

        self.rx.close();
        self.finalize_shutdown(reason).await;
        Ok(())
    }

    fn handle_input_event(&mut self, input: &InputEvent) -> LoopControl {
        match input {
            InputEvent::CtrlC => LoopControl::Break(ShutdownReason::CtrlC),
            InputEvent::Key(key) => {
                if let Some(control) = self.controls.get_mut(self.focused) {
                    match control.handle_key(*key) {
                        KeyResponse::FocusNext => {
                            self.focus_next();
                            self.dirty = true;
                        }
                        KeyResponse::Handled => self.dirty = true,
                        KeyResponse::Ignored => {}
                    }
                }
                LoopControl::Continue
            }
            InputEvent::Resize(cols, rows) => {
                self.viewport = (*cols, *rows);
                for control in &mut self.controls {
                    control.handle_resize(*cols, *rows);
                }
                self.dirty = true;
                LoopControl::Continue
            }
            InputEvent::Mouse(mouse) => {
                self.handle_mouse(mouse);
                LoopControl::Continue
            }
        }
    }

    /// Tab walks the controls in layout order, wrapping at the end.
    fn focus_next(&mut self) {
        if self.controls.is_empty() {
            return;
        }
        if let Some(current) = self.controls.get_mut(self.focused) {
            current.set_focused(false);
        }
        self.focused = (self.focused + 1) % self.controls.len();
        if let Some(next) = self.controls.get_mut(self.focused) {
            next.set_focused(true);
        }
    }

    /// Every control sees the click so open panes can apply their own
    /// outside-click containment; focus follows the control that claimed it.
    fn handle_mouse(&mut self, mouse: &MouseEvent) {
        if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
            return;
        }
        let mut claimed = None;
        for (i, control) in self.controls.iter_mut().enumerate() {
            if control.handle_click(mouse.row, mouse.column) {
                claimed = Some(i);
            }
        }
        if let Some(i) = claimed
            && i != self.focused
        {
            if let Some(current) = self.controls.get_mut(self.focused) {
                current.set_focused(false);
            }
            self.focused = i;
            if let Some(next) = self.controls.get_mut(self.focused) {
                next.set_focused(true);
            }
        }
        self.dirty = true;
    }

    fn handle_control_event(&mut self, event: &ControlEvent) -> LoopControl {
        debug!(
            target: "runtime.events",
            control = event.control.as_str(),
            event = event.name(),
            "control event"
        );
        for control in &mut self.controls {
            control.handle_event(event);
        }
        self.dirty = true;
        LoopControl::Continue
    }

    fn render(&mut self) {
        let models: Vec<ControlModel> = self.controls.iter().map(Control::model).collect();
        let (cols, rows) = self.viewport;
        if let Err(err) = self.engine.render(&models, cols, rows) {
            error!(target: "render.engine", ?err, "render failed");
        }
        self.dirty = false;
    }

    async fn finalize_shutdown(&mut self, reason: ShutdownReason) {
        info!(target: "runtime.shutdown", reason = reason.as_str(), "shutdown begin");
        if let Some(tx) = self.tx.take() {
            trace!(
                target: "runtime.shutdown",
                reason = reason.as_str(),
                "dropping runtime sender"
            );
            drop(tx);
        }

        while let Some(handle) = self.source_handles.pop() {
            match tokio::time::timeout(Duration::from_millis(200), handle).await {
                Ok(Ok(())) => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "event source task stopped"
                ),
                Ok(Err(err)) if err.is_cancelled() => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "event source task cancelled"
                ),
                Ok(Err(err)) => error!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    ?err,
                    "event source task error"
                ),
                Err(_) => warn!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "event source task timeout"
                ),
            }
        }

        if let Some(shutdown) = self.input_shutdown.take() {
            trace!(
                target: "runtime.shutdown",
                reason = reason.as_str(),
                "input task shutdown signal"
            );
            shutdown.signal();
        }

        if let Some(handle) = self.input_task.take() {
            match handle.await {
                Ok(()) => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "input task joined"
                ),
                Err(err) if err.is_cancelled() => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "input task cancelled"
                ),
                Err(err) => error!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    ?err,
                    "input task join failed"
                ),
            }
        }

        info!(target: "runtime.shutdown", reason = reason.as_str(), "shutdown complete");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut startup = AppStartup::new();
    let terminal_guard = startup.run(&args)?;

    let config = load_from(args.config.clone())?;
    info!(
        target: "runtime.startup",
        controls = config.controls.len(),
        config_override = args.config.is_some(),
        "bootstrap complete"
    );

    let (tx, rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAP);
    let (input_task, input_shutdown) = spawn_input(tx.clone());
    let mut registry = EventSourceRegistry::new();
    registry.register(TickEventSource::new(Duration::from_millis(250)));
    let source_handles = registry.spawn_all(&tx);

    let backend: Arc<dyn SearchBackend> = Arc::new(HttpBackend::new());
    let sink = EventSink::new(tx.clone());
    let controls = build_controls(&config, &backend, &sink);
    let viewport = crossterm::terminal::size().unwrap_or((80, 24));

    let mut runtime = ControlsRuntime::new(
        controls,
        viewport,
        args.theme.to_theme(),
        tx,
        rx,
        input_task,
        input_shutdown,
        source_handles,
        terminal_guard,
    );
    runtime.run().await
}
