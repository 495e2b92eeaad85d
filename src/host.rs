//! Host lifecycle boundary.
//!
//! [`ViewerHost`] is the seam the embedding platform drives: every lifecycle
//! and input entry point acquires the render gate before touching the screen
//! stack, mirroring how the render loop holds the gate for the duration of
//! each frame. The core never inherits a host type; the host implements
//! [`HostEnv`] and the core calls through it.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::gate::RenderGate;
use crate::screen::{ConfigMap, Menu, MenuItem, ScreenId, ScreenKind};
use crate::stack::{SavedScreen, ScreenRegistry, ScreenStack};

/// Capabilities the embedding host provides to the core.
pub trait HostEnv: Send + Sync {
    /// The last screen was popped; tear down the hosting context.
    fn terminate(&self);

    /// Full-screen ("lights out") mode, toggled with bar visibility.
    fn set_lights_out(&self, enabled: bool);

    fn lock_orientation(&self);

    fn unlock_orientation(&self);

    /// Hold the rendered content still across a transition.
    fn freeze_surface(&self);

    fn unfreeze_surface(&self);

    /// Menu contents went stale; rebuild them on the next open.
    fn invalidate_options_menu(&self);

    /// Start the device unlock flow.
    fn launch_unlock_flow(&self);
}

/// Owns the render gate and the screen stack, and wraps every host entry
/// point in a gate acquisition.
///
/// The gate is the cross-thread pause protocol; the inner mutex only gives
/// Rust an owner for the stack data and is never held without the gate.
pub struct ViewerHost {
    gate: Arc<RenderGate>,
    stack: Mutex<ScreenStack>,
}

impl ViewerHost {
    pub fn new(host_env: Arc<dyn HostEnv>, registry: ScreenRegistry) -> Self {
        let gate = Arc::new(RenderGate::new());
        let stack = ScreenStack::new(Arc::clone(&gate), host_env, registry);
        Self {
            gate,
            stack: Mutex::new(stack),
        }
    }

    pub fn gate(&self) -> &Arc<RenderGate> {
        &self.gate
    }

    pub fn push(&self, kind: ScreenKind, config: ConfigMap) -> Result<ScreenId> {
        let _gate = self.gate.lock();
        self.stack.lock().push(kind, config, Instant::now())
    }

    pub fn pop(&self, target: Option<ScreenId>) {
        let _gate = self.gate.lock();
        self.stack.lock().pop(target, Instant::now());
    }

    pub fn back(&self) {
        let _gate = self.gate.lock();
        self.stack.lock().back(Instant::now());
    }

    pub fn resume(&self) {
        let _gate = self.gate.lock();
        self.stack.lock().resume(Instant::now());
    }

    pub fn pause(&self) {
        let _gate = self.gate.lock();
        self.stack.lock().pause(Instant::now());
    }

    pub fn destroy(&self) {
        let _gate = self.gate.lock();
        self.stack.lock().destroy(Instant::now());
    }

    pub fn create_options_menu(&self, menu: &mut Menu) -> bool {
        let _gate = self.gate.lock();
        self.stack.lock().create_options_menu(menu)
    }

    pub fn item_selected(&self, item: &MenuItem) -> bool {
        let _gate = self.gate.lock();
        self.stack.lock().item_selected(item, Instant::now())
    }

    pub fn activity_result(&self, request: i32, code: i32, data: Option<&ConfigMap>) {
        let _gate = self.gate.lock();
        self.stack
            .lock()
            .activity_result(request, code, data, Instant::now());
    }

    /// Serializes the stack to a JSON blob the host can persist.
    pub fn save_state(&self) -> Result<String> {
        let _gate = self.gate.lock();
        let saved = self.stack.lock().save_state();
        serde_json::to_string(&saved).context("failed to serialize screen stack state")
    }

    /// Rebuilds the stack from a blob produced by [`ViewerHost::save_state`].
    pub fn restore_state(&self, blob: &str) -> Result<()> {
        let saved: Vec<SavedScreen> =
            serde_json::from_str(blob).context("failed to parse screen stack state")?;
        let _gate = self.gate.lock();
        self.stack.lock().restore_state(saved, Instant::now())
    }

    /// One frame of render-thread processing.
    pub fn frame(&self, now: Instant) {
        let _gate = self.gate.lock();
        self.stack.lock().frame(now);
    }

    /// Gate-wrapped direct access for drivers that deliver view callbacks to
    /// a concrete screen.
    pub fn with_stack<R>(&self, f: impl FnOnce(&mut ScreenStack) -> R) -> R {
        let _gate = self.gate.lock();
        f(&mut self.stack.lock())
    }
}

/// Spawns the dedicated render thread, pumping frames at `frame_interval`
/// until cancelled.
pub fn run_render_loop(
    host: Arc<ViewerHost>,
    cancel: CancellationToken,
    frame_interval: Duration,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("render".into())
        .spawn(move || {
            info!("render loop started");
            while !cancel.is_cancelled() {
                let frame_start = Instant::now();
                host.frame(frame_start);
                if let Some(remaining) = frame_interval.checked_sub(frame_start.elapsed()) {
                    thread::sleep(remaining);
                }
            }
            info!("render loop stopped");
        })
        .context("failed to spawn render thread")
}
