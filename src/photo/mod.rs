//! The photo-browsing screen: transient bar chrome, coalesced refreshes, the
//! camera/photo boundary handshake with an embedding bridge, and the
//! single-slot deferred delete.

pub mod bridge;
pub mod model;

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, trace, warn};

use crate::scheduler::{Message, MessagePost, MessageScheduler};
use crate::screen::{
    BackAction, ConfigMap, ConfigValue, Menu, MenuItem, RESULT_OK, Screen, ScreenEnv, ScreenFlags,
    ScreenId, ScreenKind, ScreenResult,
};

use bridge::{AppBridge, BridgeServer, Rect};
use model::{MediaItemInfo, MediaPath, PhotoModel};

pub const KEY_MEDIA_SET_PATH: &str = "media-set-path";
pub const KEY_MEDIA_ITEM_PATH: &str = "media-item-path";
pub const KEY_INDEX_HINT: &str = "index-hint";
pub const KEY_TREAT_BACK_AS_UP: &str = "treat-back-as-up";
pub const KEY_START_IN_FILMSTRIP: &str = "start-in-filmstrip";
pub const KEY_SHOW_WHEN_LOCKED: &str = "show-when-locked";
pub const KEY_SINGLE_ITEM_ONLY: &str = "single-item-only";
pub const KEY_BRIDGE_PAYLOAD: &str = "bridge-payload";
pub const KEY_RETURN_INDEX_HINT: &str = "return-index-hint";

/// Rendering-side capabilities of the photo surface. Implemented by the
/// drawing backend; every call originates on the render thread.
pub trait PhotoSurface: Send + Sync {
    fn set_camera_relative_frame(&self, frame: Rect);

    fn set_swiping_enabled(&self, enabled: bool);

    fn switch_with_capture_animation(&self, offset: i32) -> bool;

    fn set_want_picture_center_callbacks(&self, want: bool);

    fn stop_scrolling(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarVisibility {
    Shown,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhotoMessage {
    HideBars,
    WantBars,
    UpdateBars,
    FullScreenChanged(bool),
    DeferredRefresh,
    CameraCenter,
    PictureCenter,
    RefreshImage,
    RefreshPhotoUi,
    UpdateProgress,
    UnfreezeSurface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoMessageKind {
    HideBars,
    WantBars,
    UpdateBars,
    FullScreenChanged,
    DeferredRefresh,
    CameraCenter,
    PictureCenter,
    RefreshImage,
    RefreshPhotoUi,
    UpdateProgress,
    UnfreezeSurface,
}

impl Message for PhotoMessage {
    type Kind = PhotoMessageKind;

    fn kind(&self) -> PhotoMessageKind {
        match self {
            PhotoMessage::HideBars => PhotoMessageKind::HideBars,
            PhotoMessage::WantBars => PhotoMessageKind::WantBars,
            PhotoMessage::UpdateBars => PhotoMessageKind::UpdateBars,
            PhotoMessage::FullScreenChanged(_) => PhotoMessageKind::FullScreenChanged,
            PhotoMessage::DeferredRefresh => PhotoMessageKind::DeferredRefresh,
            PhotoMessage::CameraCenter => PhotoMessageKind::CameraCenter,
            PhotoMessage::PictureCenter => PhotoMessageKind::PictureCenter,
            PhotoMessage::RefreshImage => PhotoMessageKind::RefreshImage,
            PhotoMessage::RefreshPhotoUi => PhotoMessageKind::RefreshPhotoUi,
            PhotoMessage::UpdateProgress => PhotoMessageKind::UpdateProgress,
            PhotoMessage::UnfreezeSurface => PhotoMessageKind::UnfreezeSurface,
        }
    }
}

/// Timing knobs for the screen's message choreography.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoTimings {
    pub hide_bars_timeout: Duration,
    pub deferred_refresh_window: Duration,
    pub camera_switch_cutoff: Duration,
    pub unfreeze_delay: Duration,
}

impl Default for PhotoTimings {
    fn default() -> Self {
        Self {
            hide_bars_timeout: Duration::from_millis(3500),
            deferred_refresh_window: Duration::from_millis(250),
            camera_switch_cutoff: Duration::from_millis(300),
            unfreeze_delay: Duration::from_millis(250),
        }
    }
}

/// Control-thread handle for toggling bar availability without the gate.
pub struct BarsControl {
    allowed: Arc<AtomicBool>,
    poster: MessagePost<PhotoMessage>,
}

impl BarsControl {
    pub fn set_allowed(&self, allowed: bool) {
        self.allowed.store(allowed, Ordering::Relaxed);
        self.poster.post(PhotoMessage::UpdateBars);
    }

    pub fn want_bars(&self) {
        self.poster.post(PhotoMessage::WantBars);
    }
}

#[derive(Debug, Clone)]
struct PendingDelete {
    path: MediaPath,
    was_focus: bool,
}

struct SurfaceServer {
    surface: Arc<dyn PhotoSurface>,
}

impl BridgeServer for SurfaceServer {
    fn set_camera_relative_frame(&self, frame: Rect) {
        self.surface.set_camera_relative_frame(frame);
    }

    fn set_swiping_enabled(&self, enabled: bool) {
        self.surface.set_swiping_enabled(enabled);
    }

    fn switch_with_capture_animation(&self, offset: i32) -> bool {
        self.surface.switch_with_capture_animation(offset)
    }
}

pub struct PhotoViewController {
    id: ScreenId,
    scheduler: MessageScheduler<PhotoMessage>,
    surface: Arc<dyn PhotoSurface>,
    model: Box<dyn PhotoModel>,
    bridge: Option<Arc<dyn AppBridge>>,
    timings: PhotoTimings,

    bars: BarVisibility,
    bars_allowed: Arc<AtomicBool>,
    menu_open: bool,

    active: bool,
    model_attached: bool,
    flags: ScreenFlags,

    current_index: usize,
    current_photo: Option<MediaItemInfo>,
    has_camera_nail: bool,
    camera_switch_cutoff: Option<Instant>,
    skip_next_photo_update: bool,

    deferred_refresh_waiting: bool,
    defer_refresh_until: Option<Instant>,

    pending_delete: Option<PendingDelete>,

    treat_back_as_up: bool,
    start_in_filmstrip: bool,
    single_item_only: bool,
    recenter_camera_on_resume: bool,

    media_set_path: Option<String>,
    media_item_path: Option<MediaPath>,
    result: Option<ScreenResult>,
}

impl PhotoViewController {
    pub fn new(
        surface: Arc<dyn PhotoSurface>,
        model: Box<dyn PhotoModel>,
        bridge: Option<Arc<dyn AppBridge>>,
        timings: PhotoTimings,
    ) -> Self {
        Self {
            id: 0,
            scheduler: MessageScheduler::new(),
            surface,
            model,
            bridge,
            timings,
            bars: BarVisibility::Shown,
            bars_allowed: Arc::new(AtomicBool::new(true)),
            menu_open: false,
            active: false,
            model_attached: false,
            flags: ScreenFlags::default(),
            current_index: 0,
            current_photo: None,
            has_camera_nail: false,
            camera_switch_cutoff: None,
            skip_next_photo_update: false,
            deferred_refresh_waiting: false,
            defer_refresh_until: None,
            pending_delete: None,
            treat_back_as_up: false,
            start_in_filmstrip: false,
            single_item_only: false,
            recenter_camera_on_resume: true,
            media_set_path: None,
            media_item_path: None,
            result: None,
        }
    }

    /// Cross-thread posting handle for view and data-layer events.
    pub fn poster(&self) -> MessagePost<PhotoMessage> {
        self.scheduler.poster()
    }

    pub fn bars_control(&self) -> BarsControl {
        BarsControl {
            allowed: Arc::clone(&self.bars_allowed),
            poster: self.scheduler.poster(),
        }
    }

    pub fn bars(&self) -> BarVisibility {
        self.bars
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn pending_delete_path(&self) -> Option<&MediaPath> {
        self.pending_delete.as_ref().map(|pending| &pending.path)
    }

    //
    // Callbacks from the photo surface (render thread).
    //

    /// Single-tap dispatch: bridge first refusal, then the focused item's
    /// go-back/unlock affordances, then the bar toggle.
    pub fn on_single_tap_up(&mut self, env: &ScreenEnv, x: i32, y: i32, now: Instant) {
        if let Some(bridge) = &self.bridge
            && bridge.on_single_tap_up(x, y)
        {
            return;
        }

        let Some(item) = self.model.item(0) else {
            // Item not ready, or it is the camera preview.
            return;
        };

        if item.support.go_back {
            if self.back_pressed(env, now) == BackAction::Unhandled {
                env.request_finish(self.id);
            }
        } else if item.support.unlock {
            env.host().launch_unlock_flow();
        } else {
            self.toggle_bars(env, now);
        }
    }

    /// Focus moved to `index`. Runs the camera-boundary rules, then the
    /// ordinary current-photo update unless a rule suppressed it.
    pub fn on_photo_changed(
        &mut self,
        env: &ScreenEnv,
        index: usize,
        path: Option<&MediaPath>,
        now: Instant,
    ) {
        let old_index = self.current_index;
        self.current_index = index;
        let mut suppress_reload = false;

        if self.has_camera_nail {
            if index > 0 {
                self.skip_next_photo_update = false;
            }

            if old_index == 2 && index == 1 {
                // Rapid back-and-forth at the preview boundary; swallow the
                // reload while the previous crossing is still settling.
                suppress_reload = self
                    .camera_switch_cutoff
                    .is_some_and(|cutoff| now < cutoff);
                self.camera_switch_cutoff = Some(now + self.timings.camera_switch_cutoff);
                self.surface.stop_scrolling();
            } else if old_index >= 1 && index == 0 {
                self.surface.set_want_picture_center_callbacks(true);
                self.skip_next_photo_update = true;
            }
        }

        if !self.skip_next_photo_update && !suppress_reload {
            if path.is_some()
                && let Some(photo) = self.model.item(0)
            {
                self.update_current_photo(env, Some(photo));
            }
            self.update_bars(env);
        }
        self.refresh_hiding_message(now);
    }

    /// The view finished centering. Collapses to exactly one of the two
    /// center messages, replacing whichever is still pending.
    pub fn on_picture_center(&mut self, is_camera: bool, now: Instant) {
        let is_camera = is_camera || (self.has_camera_nail && self.bridge.is_none());
        self.surface.set_want_picture_center_callbacks(false);
        self.scheduler.cancel(PhotoMessageKind::CameraCenter);
        self.scheduler.cancel(PhotoMessageKind::PictureCenter);
        let message = if is_camera {
            PhotoMessage::CameraCenter
        } else {
            PhotoMessage::PictureCenter
        };
        self.scheduler.post(message, now);
    }

    /// The browsing model finished a load pass.
    pub fn on_loading_finished(&mut self, env: &ScreenEnv, failed: bool) {
        if failed {
            warn!("photo model reported a failed load");
        }
        if !self.model.is_empty() {
            if let Some(photo) = self.model.item(0) {
                self.update_current_photo(env, Some(photo));
            }
        } else if self.active {
            // Nothing left to show; close the screen. Retrying is the data
            // layer's concern.
            env.request_finish(self.id);
        }
    }

    pub fn on_current_image_updated(&mut self, env: &ScreenEnv) {
        env.host().unfreeze_surface();
    }

    pub fn on_menu_visibility_changed(&mut self, visible: bool, now: Instant) {
        self.menu_open = visible;
        self.refresh_hiding_message(now);
    }

    /// Coalesces bursts of refresh requests into one execution at the end of
    /// a rolling window.
    pub fn request_deferred_refresh(&mut self, now: Instant) {
        self.defer_refresh_until = Some(now + self.timings.deferred_refresh_window);
        if !self.deferred_refresh_waiting {
            self.deferred_refresh_waiting = true;
            self.scheduler.post_delayed(
                PhotoMessage::DeferredRefresh,
                self.timings.deferred_refresh_window,
                now,
            );
        }
    }

    //
    // Deferred delete with a single pending slot.
    //

    /// Records `path` as pending deletion, committing any previous pending
    /// one first. `offset` 0 means the focused item was deleted.
    pub fn on_delete_image(&mut self, path: MediaPath, offset: i32) {
        self.on_commit_delete();
        debug!(%path, offset, "deletion pending");
        self.pending_delete = Some(PendingDelete {
            path,
            was_focus: offset == 0,
        });
    }

    pub fn on_undo_delete(&mut self) {
        let Some(pending) = self.pending_delete.take() else {
            return;
        };
        // Put the undeleted item back in focus if it was focused when
        // deleted.
        if pending.was_focus {
            self.model.set_focus_hint(&pending.path);
        }
    }

    pub fn on_commit_delete(&mut self) {
        // The data layer performs the actual removal.
        self.pending_delete = None;
    }

    //
    // Message handling (render thread, via on_frame).
    //

    fn handle_message(&mut self, env: &ScreenEnv, message: PhotoMessage, now: Instant) {
        trace!(?message, "photo message");
        match message {
            PhotoMessage::HideBars => self.hide_bars(env),
            PhotoMessage::WantBars => self.want_bars(env, now),
            PhotoMessage::UpdateBars => self.update_bars(env),
            PhotoMessage::FullScreenChanged(full) => {
                if let Some(bridge) = &self.bridge {
                    bridge.on_full_screen_changed(full);
                }
            }
            PhotoMessage::DeferredRefresh => self.deferred_refresh_elapsed(env, now),
            PhotoMessage::CameraCenter => self.camera_centered(env),
            PhotoMessage::PictureCenter => {
                // Centered on a static photo; the ordinary update already
                // covered it.
            }
            PhotoMessage::RefreshImage => {
                let photo = self.current_photo.take();
                self.update_current_photo(env, photo);
            }
            PhotoMessage::RefreshPhotoUi => self.refresh_photo_ui(env),
            PhotoMessage::UpdateProgress => self.update_progress(),
            PhotoMessage::UnfreezeSurface => env.host().unfreeze_surface(),
        }
    }

    fn deferred_refresh_elapsed(&mut self, env: &ScreenEnv, now: Instant) {
        let deadline = self.defer_refresh_until.unwrap_or(now);
        if deadline <= now {
            self.deferred_refresh_waiting = false;
            self.refresh_photo_ui(env);
        } else {
            // The window moved while we were waiting; sleep out the rest.
            self.scheduler
                .post_delayed(PhotoMessage::DeferredRefresh, deadline - now, now);
        }
    }

    fn camera_centered(&mut self, env: &ScreenEnv) {
        self.skip_next_photo_update = false;
        if self.current_index != 0 {
            return;
        }
        match &self.bridge {
            None => {
                // Reached the placeholder by swiping; leave it focused so the
                // host's back lands here.
            }
            Some(_) => {
                self.update_bars(env);
                if let Some(photo) = self.model.item(1) {
                    self.update_current_photo(env, Some(photo));
                }
            }
        }
    }

    fn update_current_photo(&mut self, env: &ScreenEnv, photo: Option<MediaItemInfo>) {
        if self.current_photo.as_ref().map(|item| &item.path)
            == photo.as_ref().map(|item| &item.path)
        {
            return;
        }
        self.current_photo = photo;
        self.refresh_photo_ui(env);
    }

    fn refresh_photo_ui(&mut self, env: &ScreenEnv) {
        let Some(photo) = &self.current_photo else {
            return;
        };
        // Ending up zoomed in on an action item loses the context of the
        // action; ask for a center callback so the view can zoom out.
        if photo.support.action {
            self.surface.set_want_picture_center_callbacks(true);
        }
        env.host().invalidate_options_menu();
        self.update_progress();
    }

    fn update_progress(&mut self) {
        trace!(index = self.current_index, "progress recomputed");
    }

    //
    // Bar show/hide management.
    //

    fn can_show_bars(&self) -> bool {
        // No bars over the live camera preview.
        if self.bridge.is_some() && self.current_index == 0 {
            return false;
        }
        self.bars_allowed.load(Ordering::Relaxed)
    }

    fn show_bars(&mut self, env: &ScreenEnv, now: Instant) {
        if self.bars == BarVisibility::Shown {
            return;
        }
        self.bars = BarVisibility::Shown;
        env.host().unlock_orientation();
        env.host().set_lights_out(false);
        self.refresh_hiding_message(now);
    }

    fn hide_bars(&mut self, env: &ScreenEnv) {
        if self.bars == BarVisibility::Hidden {
            return;
        }
        self.bars = BarVisibility::Hidden;
        env.host().set_lights_out(true);
        self.scheduler.cancel(PhotoMessageKind::HideBars);
    }

    fn toggle_bars(&mut self, env: &ScreenEnv, now: Instant) {
        if self.bars == BarVisibility::Shown {
            self.hide_bars(env);
        } else if self.can_show_bars() {
            self.show_bars(env, now);
        }
    }

    fn want_bars(&mut self, env: &ScreenEnv, now: Instant) {
        if self.can_show_bars() {
            self.show_bars(env, now);
        }
    }

    fn update_bars(&mut self, env: &ScreenEnv) {
        if !self.can_show_bars() {
            self.hide_bars(env);
        }
    }

    fn refresh_hiding_message(&mut self, now: Instant) {
        self.scheduler.cancel(PhotoMessageKind::HideBars);
        if !self.menu_open {
            self.scheduler.post_delayed(
                PhotoMessage::HideBars,
                self.timings.hide_bars_timeout,
                now,
            );
        }
    }

    //
    // Back and result handling.
    //

    fn back_pressed(&mut self, env: &ScreenEnv, _now: Instant) -> BackAction {
        if self.bridge.is_some() && self.surface.switch_with_capture_animation(-1) {
            return BackAction::Handled;
        }
        self.set_result();
        if self.start_in_filmstrip {
            return BackAction::Handled;
        }
        if self.treat_back_as_up {
            // Up is absorbed while embedded under a camera host, and at the
            // root of the stack; anywhere else it behaves like back.
            if self.bridge.is_some() || env.stack_depth() <= 1 {
                return BackAction::Handled;
            }
        }
        BackAction::Unhandled
    }

    fn set_result(&mut self) {
        let data = ConfigMap::new().with(
            KEY_RETURN_INDEX_HINT,
            ConfigValue::Int(self.current_index as i64),
        );
        self.result = Some(ScreenResult {
            code: RESULT_OK,
            data,
        });
    }
}

impl Screen for PhotoViewController {
    fn kind(&self) -> ScreenKind {
        ScreenKind::PhotoView
    }

    fn flags(&self) -> ScreenFlags {
        self.flags
    }

    fn on_create(
        &mut self,
        _env: &ScreenEnv,
        id: ScreenId,
        config: &ConfigMap,
        restore: Option<&ConfigMap>,
    ) -> Result<()> {
        self.id = id;
        self.treat_back_as_up = config.get_bool(KEY_TREAT_BACK_AS_UP, false);
        self.start_in_filmstrip = config.get_bool(KEY_START_IN_FILMSTRIP, false);
        self.single_item_only = config.get_bool(KEY_SINGLE_ITEM_ONLY, false);
        self.media_set_path = config.get_text(KEY_MEDIA_SET_PATH).map(String::from);
        self.media_item_path = config
            .get_text(KEY_MEDIA_ITEM_PATH)
            .map(MediaPath::new);
        let index_hint = match restore {
            Some(saved) => saved.get_int(KEY_INDEX_HINT, 0),
            None => config.get_int(KEY_INDEX_HINT, 0),
        };
        self.current_index = usize::try_from(index_hint).unwrap_or(0);
        debug!(
            set = ?self.media_set_path,
            item = %self.media_item_path.as_ref().map(|p| p.0.as_str()).unwrap_or("<none>"),
            index = self.current_index,
            "photo screen configured"
        );

        if self.bridge.is_some() && !self.single_item_only {
            self.bars = BarVisibility::Hidden;
            self.has_camera_nail = true;
            self.flags.show_when_locked = config.get_bool(KEY_SHOW_WHEN_LOCKED, false);
        }
        if let Some(bridge) = &self.bridge {
            bridge.set_server(Some(Arc::new(SurfaceServer {
                surface: Arc::clone(&self.surface),
            })));
        }
        if let Some(payload) = config.get_blob(KEY_BRIDGE_PAYLOAD) {
            // Opaque; only the bridge implementation interprets it.
            debug!(len = payload.len(), "bridge payload attached");
        }

        match &self.media_item_path {
            Some(path) => {
                self.model.set_current(path, self.current_index);
                self.model_attached = true;
            }
            None => {
                // Nothing to browse; the first resume closes the screen.
                warn!("photo screen created without a media item path");
                self.model_attached = false;
            }
        }
        Ok(())
    }

    fn on_resume(&mut self, env: &ScreenEnv, now: Instant) {
        if !self.model_attached {
            env.request_finish(self.id);
            return;
        }
        env.host().freeze_surface();
        self.active = true;
        self.model.resume();
        if self.bars == BarVisibility::Hidden {
            env.host().set_lights_out(true);
        }
        if self.has_camera_nail && self.recenter_camera_on_resume {
            // Returning from another screen lands back on the live preview
            // unless a delivered result said otherwise.
            self.current_index = 0;
        }
        self.recenter_camera_on_resume = true;
        self.scheduler.post_delayed(
            PhotoMessage::UnfreezeSurface,
            self.timings.unfreeze_delay,
            now,
        );
    }

    fn on_pause(&mut self, env: &ScreenEnv, _now: Instant) {
        self.active = false;
        env.host().unfreeze_surface();
        self.scheduler.cancel(PhotoMessageKind::UnfreezeSurface);
        self.scheduler.cancel(PhotoMessageKind::HideBars);
        self.model.pause();
        self.on_commit_delete();
    }

    fn on_destroy(&mut self, _env: &ScreenEnv) {
        if let Some(bridge) = self.bridge.take() {
            bridge.set_server(None);
            bridge.detach_screen_nail();
        }
        // Remove all pending messages.
        self.scheduler.cancel_all();
    }

    fn on_back(&mut self, env: &ScreenEnv, now: Instant) -> BackAction {
        self.back_pressed(env, now)
    }

    fn on_frame(&mut self, env: &ScreenEnv, now: Instant) {
        for message in self.scheduler.take_due(now) {
            self.handle_message(env, message, now);
        }
    }

    fn on_create_menu(&mut self, _menu: &mut Menu) -> bool {
        true
    }

    fn on_item_selected(&mut self, _env: &ScreenEnv, _item: &MenuItem, now: Instant) -> bool {
        if !self.model_attached {
            return true;
        }
        self.refresh_hiding_message(now);
        false
    }

    fn on_screen_result(
        &mut self,
        _env: &ScreenEnv,
        _request: i32,
        code: i32,
        _data: Option<&ConfigMap>,
    ) {
        if code == crate::screen::RESULT_CANCELED {
            // A reset, not a real result.
            return;
        }
        self.recenter_camera_on_resume = false;
    }

    fn save_state(&self) -> ConfigMap {
        ConfigMap::new().with(KEY_INDEX_HINT, ConfigValue::Int(self.current_index as i64))
    }

    fn take_result(&mut self) -> Option<ScreenResult> {
        self.result.take()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
