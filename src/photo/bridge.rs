//! Protocol between the photo screen and an external embedding bridge, such
//! as a live camera preview host occupying index 0 of the browsing sequence.

use std::sync::Arc;

/// Axis-aligned frame in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Capability surface the photo screen exposes to an attached bridge while
/// the screen is alive.
pub trait BridgeServer: Send + Sync {
    fn set_camera_relative_frame(&self, frame: Rect);

    /// The default is enabled.
    fn set_swiping_enabled(&self, enabled: bool);

    /// Switch to the previous (-1) or next (1) picture with the capture
    /// animation. Returns whether the switch was performed.
    fn switch_with_capture_animation(&self, offset: i32) -> bool;
}

/// The external embedding component. Calls into a detached bridge are
/// no-ops on the implementor's side, never errors.
pub trait AppBridge: Send + Sync {
    /// A `None` server means the screen's services are no longer available.
    fn set_server(&self, server: Option<Arc<dyn BridgeServer>>);

    fn detach_screen_nail(&self);

    /// The preview will (or will no longer) be drawn full screen on the
    /// next frame.
    fn on_full_screen_changed(&self, full: bool);

    /// Returns true if the bridge consumed the tap.
    fn on_single_tap_up(&self, x: i32, y: i32) -> bool;
}
