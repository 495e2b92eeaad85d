//! One-shot parameter hand-off between a popped screen and the one beneath
//! it. Reads consume: a value can be observed exactly once.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::screen::ConfigValue;

#[derive(Debug, Default)]
pub struct TransitionStore {
    entries: RefCell<HashMap<String, ConfigValue>>,
}

impl TransitionStore {
    pub fn put(&self, key: impl Into<String>, value: ConfigValue) {
        self.entries.borrow_mut().insert(key.into(), value);
    }

    /// Removes and returns the entry, if present.
    pub fn take(&self, key: &str) -> Option<ConfigValue> {
        self.entries.borrow_mut().remove(key)
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}
