//! Ordered LIFO collection of screens with lifecycle dispatch.
//!
//! Every public operation must run with the render gate held; the stack
//! asserts this instead of locking itself, since the host owns the gate and
//! wraps each entry point. Screens never call back into the stack while it
//! is borrowed — they queue [`StackRequest`]s on the environment and the
//! stack applies them once the dispatch returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::gate::RenderGate;
use crate::host::HostEnv;
use crate::screen::{
    BackAction, ConfigMap, LifecyclePhase, Menu, MenuItem, Screen, ScreenEnv, ScreenId, ScreenKind,
    StackRequest,
};

type ScreenBuilder = Box<dyn Fn() -> Box<dyn Screen> + Send>;

/// Factory table mapping screen kinds to constructors. The host registers
/// builders at init time; construction dependencies (models, surfaces,
/// bridges) are captured by the closures rather than reached globally.
#[derive(Default)]
pub struct ScreenRegistry {
    builders: HashMap<ScreenKind, ScreenBuilder>,
}

impl ScreenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: ScreenKind,
        builder: impl Fn() -> Box<dyn Screen> + Send + 'static,
    ) {
        self.builders.insert(kind, Box::new(builder));
    }

    fn build(&self, kind: ScreenKind) -> Result<Box<dyn Screen>> {
        match self.builders.get(&kind) {
            Some(builder) => Ok(builder()),
            None => bail!("no screen builder registered for {kind:?}"),
        }
    }
}

/// Persisted form of one stack entry: its kind, entry configuration, and the
/// screen's private state map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedScreen {
    pub kind: ScreenKind,
    pub config: ConfigMap,
    pub state: ConfigMap,
}

struct Entry {
    id: ScreenId,
    kind: ScreenKind,
    screen: Box<dyn Screen>,
    config: ConfigMap,
    phase: LifecyclePhase,
}

pub struct ScreenStack {
    gate: Arc<RenderGate>,
    env: ScreenEnv,
    registry: ScreenRegistry,
    entries: Vec<Entry>,
    next_id: ScreenId,
    resumed: bool,
    terminated: bool,
}

impl ScreenStack {
    pub fn new(gate: Arc<RenderGate>, host: Arc<dyn HostEnv>, registry: ScreenRegistry) -> Self {
        Self {
            gate,
            env: ScreenEnv::new(host),
            registry,
            entries: Vec::new(),
            next_id: 1,
            resumed: false,
            terminated: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn top_id(&self) -> Option<ScreenId> {
        self.entries.last().map(|entry| entry.id)
    }

    /// Identity of the single resumed screen, if any. Panics if more than
    /// one entry is resumed, which would be a lifecycle defect.
    pub fn resumed_screen(&self) -> Option<ScreenId> {
        let mut resumed = self
            .entries
            .iter()
            .filter(|entry| entry.phase == LifecyclePhase::Resumed);
        let first = resumed.next().map(|entry| entry.id);
        assert!(resumed.next().is_none(), "more than one resumed screen");
        first
    }

    /// Mutable access to the top screen together with the environment, for
    /// the render-side driver that delivers view callbacks.
    pub fn top_with_env(&mut self) -> Option<(&mut dyn Screen, &ScreenEnv)> {
        let env = &self.env;
        self.entries
            .last_mut()
            .map(|entry| (entry.screen.as_mut(), env))
    }

    /// Constructs a screen of the given kind, creates it with `config`,
    /// pauses the previous top and resumes the new one. A create failure
    /// rolls back completely: the previous top stays resumed.
    pub fn push(&mut self, kind: ScreenKind, config: ConfigMap, now: Instant) -> Result<ScreenId> {
        self.gate.assert_held();
        let id = self.push_internal(kind, config, now)?;
        self.process_requests(now);
        Ok(id)
    }

    /// Destroys the given screen (or the top if unspecified), delivering its
    /// result to the new top. Popping the sole remaining screen notifies the
    /// host to terminate, exactly once.
    pub fn pop(&mut self, target: Option<ScreenId>, now: Instant) {
        self.gate.assert_held();
        assert!(!self.entries.is_empty(), "pop on an empty screen stack");
        let index = match target {
            None => self.entries.len() - 1,
            Some(id) => self
                .entries
                .iter()
                .position(|entry| entry.id == id)
                .expect("pop of a screen that is not on the stack"),
        };
        self.pop_at(index, now);
        self.process_requests(now);
    }

    /// Delivers a back event to the top screen; pops it if unhandled.
    pub fn back(&mut self, now: Instant) {
        self.gate.assert_held();
        self.sync_depth();
        let Some(top) = self.entries.last_mut() else {
            return;
        };
        let action = top.screen.on_back(&self.env, now);
        if action == BackAction::Unhandled {
            let index = self.entries.len() - 1;
            self.pop_at(index, now);
        }
        self.process_requests(now);
    }

    /// Marks the stack active and resumes the top screen.
    pub fn resume(&mut self, now: Instant) {
        self.gate.assert_held();
        self.sync_depth();
        self.resumed = true;
        if let Some(top) = self.entries.last_mut()
            && top.phase != LifecyclePhase::Resumed
        {
            top.screen.on_resume(&self.env, now);
            top.phase = LifecyclePhase::Resumed;
        }
        self.process_requests(now);
    }

    /// Pauses the top screen and marks the stack inactive.
    pub fn pause(&mut self, now: Instant) {
        self.gate.assert_held();
        self.sync_depth();
        self.resumed = false;
        if let Some(top) = self.entries.last_mut()
            && top.phase == LifecyclePhase::Resumed
        {
            top.screen.on_pause(&self.env, now);
            top.phase = LifecyclePhase::Paused;
        }
        self.process_requests(now);
    }

    /// Tears down every screen top-to-bottom without host termination.
    pub fn destroy(&mut self, now: Instant) {
        self.gate.assert_held();
        self.resumed = false;
        self.sync_depth();
        while let Some(mut entry) = self.entries.pop() {
            if entry.phase == LifecyclePhase::Resumed {
                entry.screen.on_pause(&self.env, now);
            }
            entry.screen.on_destroy(&self.env);
            entry.phase = LifecyclePhase::Destroyed;
            debug!(id = entry.id, kind = ?entry.kind, "screen destroyed");
        }
        // Teardown discards whatever the dying screens requested.
        let _ = self.env.drain_requests();
    }

    /// Render-thread frame hook: runs the top screen's frame processing
    /// (message delivery happens there), then applies any queued requests.
    pub fn frame(&mut self, now: Instant) {
        self.gate.assert_held();
        self.sync_depth();
        if self.resumed
            && let Some(top) = self.entries.last_mut()
        {
            top.screen.on_frame(&self.env, now);
        }
        self.process_requests(now);
    }

    /// Serializes the ordered (kind, config, private-state) sequence.
    pub fn save_state(&self) -> Vec<SavedScreen> {
        self.gate.assert_held();
        self.entries
            .iter()
            .map(|entry| SavedScreen {
                kind: entry.kind,
                config: entry.config.clone(),
                state: entry.screen.save_state(),
            })
            .collect()
    }

    /// Rebuilds the stack bottom-to-top from saved state. Screens receive
    /// their private map as the restore argument; entry-intent logic does
    /// not re-run. The stack must be empty.
    pub fn restore_state(&mut self, saved: Vec<SavedScreen>, now: Instant) -> Result<()> {
        self.gate.assert_held();
        ensure!(
            self.entries.is_empty(),
            "restore_state into a non-empty stack"
        );

        let mut restored: Vec<Entry> = Vec::with_capacity(saved.len());
        for snapshot in saved {
            let id = self.next_id;
            let mut screen = match self.registry.build(snapshot.kind) {
                Ok(screen) => screen,
                Err(err) => {
                    Self::unwind(&self.env, &mut restored);
                    return Err(err);
                }
            };
            if let Err(err) =
                screen.on_create(&self.env, id, &snapshot.config, Some(&snapshot.state))
            {
                Self::unwind(&self.env, &mut restored);
                return Err(err).with_context(|| {
                    format!("failed to restore screen {:?}", snapshot.kind)
                });
            }
            self.next_id += 1;
            restored.push(Entry {
                id,
                kind: snapshot.kind,
                screen,
                config: snapshot.config,
                phase: LifecyclePhase::Created,
            });
        }

        info!(depth = restored.len(), "screen stack restored");
        self.entries = restored;
        self.sync_depth();
        if self.resumed
            && let Some(top) = self.entries.last_mut()
        {
            top.screen.on_resume(&self.env, now);
            top.phase = LifecyclePhase::Resumed;
        }
        self.process_requests(now);
        Ok(())
    }

    /// Menu construction is offered to the top screen only.
    pub fn create_options_menu(&mut self, menu: &mut Menu) -> bool {
        self.gate.assert_held();
        match self.entries.last_mut() {
            Some(top) => top.screen.on_create_menu(menu),
            None => false,
        }
    }

    /// Menu selection is offered to the top screen only.
    pub fn item_selected(&mut self, item: &MenuItem, now: Instant) -> bool {
        self.gate.assert_held();
        self.sync_depth();
        let handled = match self.entries.last_mut() {
            Some(top) => top.screen.on_item_selected(&self.env, item, now),
            None => false,
        };
        self.process_requests(now);
        handled
    }

    /// Forwards an external activity result to the top screen.
    pub fn activity_result(
        &mut self,
        request: i32,
        code: i32,
        data: Option<&ConfigMap>,
        now: Instant,
    ) {
        self.gate.assert_held();
        self.sync_depth();
        if let Some(top) = self.entries.last_mut() {
            top.screen.on_screen_result(&self.env, request, code, data);
        }
        self.process_requests(now);
    }

    fn push_internal(
        &mut self,
        kind: ScreenKind,
        config: ConfigMap,
        now: Instant,
    ) -> Result<ScreenId> {
        let mut screen = self.registry.build(kind)?;
        let id = self.next_id;
        screen
            .on_create(&self.env, id, &config, None)
            .with_context(|| format!("failed to create screen {kind:?}"))?;
        self.next_id += 1;

        if self.resumed
            && let Some(top) = self.entries.last_mut()
            && top.phase == LifecyclePhase::Resumed
        {
            top.screen.on_pause(&self.env, now);
            top.phase = LifecyclePhase::Paused;
        }

        self.entries.push(Entry {
            id,
            kind,
            screen,
            config,
            phase: LifecyclePhase::Created,
        });
        self.sync_depth();
        if self.resumed {
            let top = self.entries.last_mut().expect("entry just pushed");
            top.screen.on_resume(&self.env, now);
            top.phase = LifecyclePhase::Resumed;
        }
        info!(id, ?kind, depth = self.entries.len(), "screen pushed");
        Ok(id)
    }

    fn pop_at(&mut self, index: usize, now: Instant) {
        let was_top = index == self.entries.len() - 1;
        let mut entry = self.entries.remove(index);
        self.sync_depth();
        if entry.phase == LifecyclePhase::Resumed {
            entry.screen.on_pause(&self.env, now);
            entry.phase = LifecyclePhase::Paused;
        }
        let result = entry.screen.take_result();
        entry.screen.on_destroy(&self.env);
        entry.phase = LifecyclePhase::Destroyed;
        info!(id = entry.id, kind = ?entry.kind, depth = self.entries.len(), "screen popped");

        if !was_top {
            return;
        }
        match self.entries.last_mut() {
            Some(top) => {
                if let Some(result) = result {
                    top.screen
                        .on_screen_result(&self.env, 0, result.code, Some(&result.data));
                }
                if self.resumed && top.phase != LifecyclePhase::Resumed {
                    top.screen.on_resume(&self.env, now);
                    top.phase = LifecyclePhase::Resumed;
                }
            }
            None => self.notify_terminate(),
        }
    }

    fn process_requests(&mut self, now: Instant) {
        loop {
            let requests = self.env.drain_requests();
            if requests.is_empty() {
                break;
            }
            for request in requests {
                match request {
                    StackRequest::Finish(id) => {
                        match self.entries.iter().position(|entry| entry.id == id) {
                            Some(index) => self.pop_at(index, now),
                            // Already popped; finishing twice is benign.
                            None => debug!(id, "finish requested for a screen no longer present"),
                        }
                    }
                    StackRequest::Push { kind, config } => {
                        if let Err(err) = self.push_internal(kind, config, now) {
                            warn!(error = ?err, "requested screen push failed");
                        }
                    }
                }
            }
        }
    }

    fn unwind(env: &ScreenEnv, restored: &mut Vec<Entry>) {
        while let Some(mut entry) = restored.pop() {
            entry.screen.on_destroy(env);
        }
        let _ = env.drain_requests();
    }

    fn sync_depth(&self) {
        self.env.set_stack_depth(self.entries.len());
    }

    fn notify_terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        info!("last screen popped; requesting host termination");
        self.env.host().terminate();
    }
}
