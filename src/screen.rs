//! The capability contract every screen-stack entry implements, plus the
//! opaque configuration/result maps screens exchange with the host.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::host::HostEnv;
use crate::transition::TransitionStore;

/// Stable identity of a screen while it lives on the stack.
pub type ScreenId = u64;

/// Result code meaning the screen completed normally.
pub const RESULT_OK: i32 = -1;
/// Result code meaning the screen was dismissed without a result.
pub const RESULT_CANCELED: i32 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Text(String),
    /// Opaque payload the core passes through unexamined.
    Blob(Vec<u8>),
}

/// Ordered key→value map used for screen entry configuration, private saved
/// state, and result data. Typed getters ignore unknown or mistyped keys and
/// fall back to the caller's default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigMap {
    entries: BTreeMap<String, ConfigValue>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.entries.get(key) {
            Some(ConfigValue::Bool(value)) => *value,
            _ => default,
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.entries.get(key) {
            Some(ConfigValue::Int(value)) => *value,
            _ => default,
        }
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(ConfigValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_blob(&self, key: &str) -> Option<&[u8]> {
        match self.entries.get(key) {
            Some(ConfigValue::Blob(value)) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Code-plus-map result a screen hands back when it is popped.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenResult {
    pub code: i32,
    pub data: ConfigMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Created,
    Resumed,
    Paused,
    Destroyed,
}

/// Display flags a screen asks the host to honor while it is on top.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenFlags {
    pub show_when_locked: bool,
}

/// Outcome of delivering a back event to the top screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackAction {
    Handled,
    Unhandled,
}

/// Kinds the screen factory can construct; also the tag persisted in saved
/// stack state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenKind {
    PhotoView,
}

#[derive(Debug, Clone, Default)]
pub struct Menu {
    items: Vec<MenuItem>,
}

impl Menu {
    pub fn add(&mut self, item: MenuItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub id: u32,
    pub title: String,
}

/// Structural operations a screen may request from inside a dispatch. The
/// stack applies them after the dispatch returns, so no screen ever re-enters
/// the stack while it is borrowed.
#[derive(Debug)]
pub enum StackRequest {
    Finish(ScreenId),
    Push { kind: ScreenKind, config: ConfigMap },
}

/// Environment handed to every screen callback: host capabilities, the
/// transition store, and the deferred stack-request queue.
pub struct ScreenEnv {
    host: Arc<dyn HostEnv>,
    transitions: TransitionStore,
    requests: RefCell<Vec<StackRequest>>,
    depth: std::cell::Cell<usize>,
}

impl ScreenEnv {
    pub fn new(host: Arc<dyn HostEnv>) -> Self {
        Self {
            host,
            transitions: TransitionStore::default(),
            requests: RefCell::new(Vec::new()),
            depth: std::cell::Cell::new(0),
        }
    }

    /// Stack depth at the time of the current dispatch.
    pub fn stack_depth(&self) -> usize {
        self.depth.get()
    }

    pub(crate) fn set_stack_depth(&self, depth: usize) {
        self.depth.set(depth);
    }

    pub fn host(&self) -> &dyn HostEnv {
        self.host.as_ref()
    }

    pub fn transitions(&self) -> &TransitionStore {
        &self.transitions
    }

    /// Ask the stack to pop the given screen once the current dispatch ends.
    pub fn request_finish(&self, id: ScreenId) {
        self.requests.borrow_mut().push(StackRequest::Finish(id));
    }

    /// Ask the stack to push a new screen once the current dispatch ends.
    pub fn request_push(&self, kind: ScreenKind, config: ConfigMap) {
        self.requests
            .borrow_mut()
            .push(StackRequest::Push { kind, config });
    }

    pub(crate) fn drain_requests(&self) -> Vec<StackRequest> {
        std::mem::take(&mut *self.requests.borrow_mut())
    }
}

/// One interactive UI state owned by the screen stack.
///
/// Lifecycle calls arrive on the control thread under the render gate;
/// `on_frame` runs on the render thread at frame boundaries and is where
/// message delivery happens. `now` is threaded explicitly so tests never
/// depend on wall-clock sleeps.
pub trait Screen: Send + 'static {
    fn kind(&self) -> ScreenKind;

    fn flags(&self) -> ScreenFlags {
        ScreenFlags::default()
    }

    fn on_create(
        &mut self,
        env: &ScreenEnv,
        id: ScreenId,
        config: &ConfigMap,
        restore: Option<&ConfigMap>,
    ) -> Result<()>;

    fn on_resume(&mut self, env: &ScreenEnv, now: Instant);

    fn on_pause(&mut self, env: &ScreenEnv, now: Instant);

    fn on_destroy(&mut self, env: &ScreenEnv);

    fn on_back(&mut self, _env: &ScreenEnv, _now: Instant) -> BackAction {
        BackAction::Unhandled
    }

    /// Render-thread frame hook; message scheduler pumping happens here.
    fn on_frame(&mut self, _env: &ScreenEnv, _now: Instant) {}

    fn on_create_menu(&mut self, _menu: &mut Menu) -> bool {
        false
    }

    fn on_item_selected(&mut self, _env: &ScreenEnv, _item: &MenuItem, _now: Instant) -> bool {
        false
    }

    fn on_screen_result(
        &mut self,
        _env: &ScreenEnv,
        _request: i32,
        _code: i32,
        _data: Option<&ConfigMap>,
    ) {
    }

    /// Private state persisted alongside the entry configuration.
    fn save_state(&self) -> ConfigMap {
        ConfigMap::new()
    }

    /// Result delivered to the screen beneath when this one is popped.
    fn take_result(&mut self) -> Option<ScreenResult> {
        None
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
