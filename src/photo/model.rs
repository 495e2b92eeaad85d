//! Boundary to the browsing model that feeds the photo screen. Loading,
//! retries, and actual deletion live behind this trait in the external data
//! layer; the screen only observes focus-relative items.

use std::fmt;

/// Stable identity of one media item within its set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaPath(pub String);

impl MediaPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl fmt::Display for MediaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operations the focused item supports, surfaced as affordances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemSupport {
    pub go_back: bool,
    pub unlock: bool,
    pub action: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaItemInfo {
    pub path: MediaPath,
    pub support: ItemSupport,
}

impl MediaItemInfo {
    pub fn plain(path: impl Into<String>) -> Self {
        Self {
            path: MediaPath::new(path),
            support: ItemSupport::default(),
        }
    }
}

pub trait PhotoModel: Send {
    fn resume(&mut self);

    fn pause(&mut self);

    fn is_empty(&self) -> bool;

    /// Item at `offset` from the focused one (0 = focused, 1 = next).
    fn item(&self, offset: i32) -> Option<MediaItemInfo>;

    /// Move focus to `path`, falling back to `index_hint` if the path is
    /// unknown.
    fn set_current(&mut self, path: &MediaPath, index_hint: usize);

    /// Prefer focusing `path` when it next becomes available (used when an
    /// undone deletion reappears).
    fn set_focus_hint(&mut self, path: &MediaPath);
}

/// In-memory model over a fixed item list; enough for the demo binary and
/// for exercising the screen without a data layer.
#[derive(Debug, Default)]
pub struct MemoryPhotoModel {
    items: Vec<MediaItemInfo>,
    focus: usize,
    active: bool,
}

impl MemoryPhotoModel {
    pub fn new(items: Vec<MediaItemInfo>) -> Self {
        Self {
            items,
            focus: 0,
            active: false,
        }
    }

    pub fn focused_index(&self) -> usize {
        self.focus
    }
}

impl PhotoModel for MemoryPhotoModel {
    fn resume(&mut self) {
        self.active = true;
    }

    fn pause(&mut self) {
        self.active = false;
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn item(&self, offset: i32) -> Option<MediaItemInfo> {
        let index = i64::try_from(self.focus).ok()? + i64::from(offset);
        let index = usize::try_from(index).ok()?;
        self.items.get(index).cloned()
    }

    fn set_current(&mut self, path: &MediaPath, index_hint: usize) {
        self.focus = self
            .items
            .iter()
            .position(|item| &item.path == path)
            .unwrap_or_else(|| index_hint.min(self.items.len().saturating_sub(1)));
    }

    fn set_focus_hint(&mut self, path: &MediaPath) {
        if let Some(index) = self.items.iter().position(|item| &item.path == path) {
            self.focus = index;
        }
    }
}
