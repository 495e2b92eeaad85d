//! Mutual exclusion between the control thread and the render thread.
//!
//! The render thread holds the gate for the duration of each frame; the
//! control thread acquires it around every structural mutation of the screen
//! stack and every lifecycle dispatch into a screen. Acquiring from the
//! control thread therefore waits for the in-flight frame to finish and
//! blocks the next one from starting.

use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Reentrant render-pause lock.
///
/// Nested `lock()` calls from the thread that already owns the gate succeed
/// immediately; the gate is released once every guard from that thread has
/// been dropped. The guard must not be held across a suspension point, which
/// is enforced by making it `!Send`.
#[derive(Debug, Default)]
pub struct RenderGate {
    state: Mutex<GateState>,
    released: Condvar,
}

impl RenderGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the gate, waiting for any other thread to release it.
    pub fn lock(&self) -> RenderGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                Some(_) => self.released.wait(&mut state),
            }
        }
        RenderGuard {
            gate: self,
            _not_send: PhantomData,
        }
    }

    /// Whether the calling thread currently owns the gate.
    pub fn is_held(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Panics unless the calling thread owns the gate. Mutating the screen
    /// stack without it is a programming defect, not a recoverable fault.
    pub fn assert_held(&self) {
        assert!(
            self.is_held(),
            "render gate must be held for structural screen-stack operations"
        );
    }

    fn release(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.owner, Some(thread::current().id()));
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.released.notify_all();
        }
    }
}

/// Scoped gate acquisition; releases on every exit path, panics included.
pub struct RenderGuard<'a> {
    gate: &'a RenderGate,
    // Keep the guard on the acquiring thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for RenderGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
