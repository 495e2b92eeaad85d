use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rust_photo_viewer::host::HostEnv;
use rust_photo_viewer::photo::bridge::{AppBridge, BridgeServer, Rect};
use rust_photo_viewer::photo::model::{ItemSupport, MediaItemInfo, MediaPath, PhotoModel};
use rust_photo_viewer::photo::{
    BarVisibility, KEY_MEDIA_ITEM_PATH, KEY_RETURN_INDEX_HINT, PhotoMessage, PhotoSurface,
    PhotoTimings, PhotoViewController,
};
use rust_photo_viewer::screen::{ConfigMap, ConfigValue, Screen, ScreenEnv};

#[derive(Default)]
struct RecordingHost {
    events: Mutex<Vec<String>>,
}

impl RecordingHost {
    fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.as_str() == event)
            .count()
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

impl HostEnv for RecordingHost {
    fn terminate(&self) {
        self.record("terminate");
    }

    fn set_lights_out(&self, enabled: bool) {
        self.record(format!("lights-out:{enabled}"));
    }

    fn lock_orientation(&self) {
        self.record("orientation-lock");
    }

    fn unlock_orientation(&self) {
        self.record("orientation-unlock");
    }

    fn freeze_surface(&self) {
        self.record("freeze");
    }

    fn unfreeze_surface(&self) {
        self.record("unfreeze");
    }

    fn invalidate_options_menu(&self) {
        self.record("invalidate-menu");
    }

    fn launch_unlock_flow(&self) {
        self.record("unlock-flow");
    }
}

#[derive(Default)]
struct RecordingSurface {
    events: Mutex<Vec<String>>,
    switch_handled: AtomicBool,
}

impl RecordingSurface {
    fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.as_str() == event)
            .count()
    }
}

impl PhotoSurface for RecordingSurface {
    fn set_camera_relative_frame(&self, _frame: Rect) {
        self.events.lock().unwrap().push("camera-frame".into());
    }

    fn set_swiping_enabled(&self, enabled: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("swiping:{enabled}"));
    }

    fn switch_with_capture_animation(&self, offset: i32) -> bool {
        self.events
            .lock()
            .unwrap()
            .push(format!("switch:{offset}"));
        self.switch_handled.load(Ordering::Relaxed)
    }

    fn set_want_picture_center_callbacks(&self, want: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("want-center:{want}"));
    }

    fn stop_scrolling(&self) {
        self.events.lock().unwrap().push("stop-scrolling".into());
    }
}

#[derive(Default)]
struct RecordingBridge {
    events: Mutex<Vec<String>>,
    server: Mutex<Option<Arc<dyn BridgeServer>>>,
    consume_taps: AtomicBool,
}

impl RecordingBridge {
    fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.as_str() == event)
            .count()
    }

    fn has_server(&self) -> bool {
        self.server.lock().unwrap().is_some()
    }
}

impl AppBridge for RecordingBridge {
    fn set_server(&self, server: Option<Arc<dyn BridgeServer>>) {
        self.events.lock().unwrap().push(format!(
            "set-server:{}",
            if server.is_some() { "some" } else { "none" }
        ));
        *self.server.lock().unwrap() = server;
    }

    fn detach_screen_nail(&self) {
        self.events.lock().unwrap().push("detach-nail".into());
    }

    fn on_full_screen_changed(&self, full: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("full-screen:{full}"));
    }

    fn on_single_tap_up(&self, _x: i32, _y: i32) -> bool {
        self.events.lock().unwrap().push("tap".into());
        self.consume_taps.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct ModelState {
    items: Vec<MediaItemInfo>,
    focus: usize,
    focus_hints: Vec<MediaPath>,
}

#[derive(Clone, Default)]
struct SharedModel(Arc<Mutex<ModelState>>);

impl SharedModel {
    fn with_items(items: Vec<MediaItemInfo>) -> Self {
        Self(Arc::new(Mutex::new(ModelState {
            items,
            ..ModelState::default()
        })))
    }

    fn set_focus(&self, focus: usize) {
        self.0.lock().unwrap().focus = focus;
    }

    fn focus_hints(&self) -> Vec<MediaPath> {
        self.0.lock().unwrap().focus_hints.clone()
    }
}

impl PhotoModel for SharedModel {
    fn resume(&mut self) {}

    fn pause(&mut self) {}

    fn is_empty(&self) -> bool {
        self.0.lock().unwrap().items.is_empty()
    }

    fn item(&self, offset: i32) -> Option<MediaItemInfo> {
        let state = self.0.lock().unwrap();
        let index = usize::try_from(i64::try_from(state.focus).ok()? + i64::from(offset)).ok()?;
        state.items.get(index).cloned()
    }

    fn set_current(&mut self, path: &MediaPath, index_hint: usize) {
        let mut state = self.0.lock().unwrap();
        state.focus = state
            .items
            .iter()
            .position(|item| &item.path == path)
            .unwrap_or(index_hint);
    }

    fn set_focus_hint(&mut self, path: &MediaPath) {
        self.0.lock().unwrap().focus_hints.push(path.clone());
    }
}

struct Fixture {
    controller: PhotoViewController,
    env: ScreenEnv,
    host: Arc<RecordingHost>,
    surface: Arc<RecordingSurface>,
    bridge: Option<Arc<RecordingBridge>>,
    model: SharedModel,
}

fn plain_items(count: usize) -> Vec<MediaItemInfo> {
    (0..count)
        .map(|index| MediaItemInfo::plain(format!("/local/{index}")))
        .collect()
}

fn fixture(items: Vec<MediaItemInfo>, with_bridge: bool) -> Fixture {
    let host = Arc::new(RecordingHost::default());
    let surface = Arc::new(RecordingSurface::default());
    let bridge = with_bridge.then(|| Arc::new(RecordingBridge::default()));
    let model = SharedModel::with_items(items);

    let controller = PhotoViewController::new(
        Arc::clone(&surface) as Arc<dyn PhotoSurface>,
        Box::new(model.clone()),
        bridge
            .as_ref()
            .map(|bridge| Arc::clone(bridge) as Arc<dyn AppBridge>),
        PhotoTimings::default(),
    );
    let env = ScreenEnv::new(Arc::clone(&host) as Arc<dyn HostEnv>);
    Fixture {
        controller,
        env,
        host,
        surface,
        bridge,
        model,
    }
}

fn created(items: Vec<MediaItemInfo>, with_bridge: bool, now: Instant) -> Fixture {
    let mut fx = fixture(items, with_bridge);
    let config = ConfigMap::new().with(
        KEY_MEDIA_ITEM_PATH,
        ConfigValue::Text("/local/0".into()),
    );
    fx.controller
        .on_create(&fx.env, 1, &config, None)
        .expect("create photo screen");
    fx.controller.on_resume(&fx.env, now);
    fx
}

const MS: Duration = Duration::from_millis(1);

#[test]
fn bars_start_hidden_with_a_bridge_attached() {
    let t0 = Instant::now();
    let fx = created(plain_items(3), true, t0);
    assert_eq!(fx.controller.bars(), BarVisibility::Hidden);
    assert!(fx.bridge.as_ref().unwrap().has_server());
}

#[test]
fn bars_start_shown_without_a_bridge() {
    let t0 = Instant::now();
    let fx = created(plain_items(3), false, t0);
    assert_eq!(fx.controller.bars(), BarVisibility::Shown);
}

#[test]
fn hide_timer_fires_exactly_once_after_timeout() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), false, t0);

    // Tap to hide, tap again to show; showing arms the timer.
    fx.controller.on_single_tap_up(&fx.env, 10, 10, t0);
    assert_eq!(fx.controller.bars(), BarVisibility::Hidden);
    let t1 = t0 + 100 * MS;
    fx.controller.on_single_tap_up(&fx.env, 10, 10, t1);
    assert_eq!(fx.controller.bars(), BarVisibility::Shown);

    let hides_before = fx.host.count("lights-out:true");
    fx.controller.on_frame(&fx.env, t1 + 3499 * MS);
    assert_eq!(fx.controller.bars(), BarVisibility::Shown);

    fx.controller.on_frame(&fx.env, t1 + 3500 * MS);
    assert_eq!(fx.controller.bars(), BarVisibility::Hidden);
    assert_eq!(fx.host.count("lights-out:true"), hides_before + 1);

    // No second hide later.
    fx.controller.on_frame(&fx.env, t1 + 8000 * MS);
    assert_eq!(fx.host.count("lights-out:true"), hides_before + 1);
}

#[test]
fn interaction_restarts_the_hide_timer() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), false, t0);

    fx.controller.on_single_tap_up(&fx.env, 10, 10, t0);
    let t1 = t0 + 100 * MS;
    fx.controller.on_single_tap_up(&fx.env, 10, 10, t1);
    assert_eq!(fx.controller.bars(), BarVisibility::Shown);

    // A menu selection 2 s in restarts the full window.
    let t2 = t1 + 2000 * MS;
    let item = rust_photo_viewer::screen::MenuItem {
        id: 1,
        title: "details".into(),
    };
    fx.controller.on_item_selected(&fx.env, &item, t2);

    fx.controller.on_frame(&fx.env, t1 + 3500 * MS);
    assert_eq!(
        fx.controller.bars(),
        BarVisibility::Shown,
        "original deadline must not fire after an interaction"
    );
    fx.controller.on_frame(&fx.env, t2 + 3500 * MS);
    assert_eq!(fx.controller.bars(), BarVisibility::Hidden);
}

#[test]
fn hide_timer_never_fires_while_a_menu_is_open() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), false, t0);

    fx.controller.on_single_tap_up(&fx.env, 10, 10, t0);
    let t1 = t0 + 100 * MS;
    fx.controller.on_single_tap_up(&fx.env, 10, 10, t1);

    let t2 = t1 + 500 * MS;
    fx.controller.on_menu_visibility_changed(true, t2);
    fx.controller.on_frame(&fx.env, t2 + 10_000 * MS);
    assert_eq!(fx.controller.bars(), BarVisibility::Shown);

    // Closing the menu re-arms the timer.
    let t3 = t2 + 11_000 * MS;
    fx.controller.on_menu_visibility_changed(false, t3);
    fx.controller.on_frame(&fx.env, t3 + 3500 * MS);
    assert_eq!(fx.controller.bars(), BarVisibility::Hidden);
}

#[test]
fn deferred_refresh_coalesces_a_burst_into_one_execution() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), false, t0);
    // Give the screen a current photo so a refresh is observable.
    fx.controller.on_loading_finished(&fx.env, false);
    let baseline = fx.host.count("invalidate-menu");

    // Five requests inside 100 ms.
    let mut last = t0;
    for index in 0..5u64 {
        last = t0 + Duration::from_millis(index * 25);
        fx.controller.request_deferred_refresh(last);
    }

    // The first deadline passes without running: the window moved.
    fx.controller.on_frame(&fx.env, t0 + 250 * MS);
    assert_eq!(fx.host.count("invalidate-menu"), baseline);

    // Exactly one execution at the end of the extended window.
    fx.controller.on_frame(&fx.env, last + 250 * MS);
    assert_eq!(fx.host.count("invalidate-menu"), baseline + 1);

    fx.controller.on_frame(&fx.env, last + 2000 * MS);
    assert_eq!(fx.host.count("invalidate-menu"), baseline + 1);
}

#[test]
fn delete_then_undo_restores_focus_and_clears_the_slot() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), false, t0);

    let path = MediaPath::new("/local/1");
    fx.controller.on_delete_image(path.clone(), 0);
    assert_eq!(fx.controller.pending_delete_path(), Some(&path));

    fx.controller.on_undo_delete();
    assert_eq!(fx.controller.pending_delete_path(), None);
    assert_eq!(fx.model.focus_hints(), vec![path]);
}

#[test]
fn undo_after_commit_is_a_no_op() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), false, t0);

    fx.controller.on_delete_image(MediaPath::new("/local/1"), 0);
    fx.controller.on_commit_delete();
    assert_eq!(fx.controller.pending_delete_path(), None);

    fx.controller.on_undo_delete();
    assert!(fx.model.focus_hints().is_empty());
}

#[test]
fn second_delete_implicitly_commits_the_first() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), false, t0);

    fx.controller.on_delete_image(MediaPath::new("/local/1"), 0);
    fx.controller.on_delete_image(MediaPath::new("/local/2"), 1);
    let pending = fx.controller.pending_delete_path().cloned();
    assert_eq!(pending, Some(MediaPath::new("/local/2")));

    // The second deletion was not of the focused item, so undo restores
    // nothing.
    fx.controller.on_undo_delete();
    assert!(fx.model.focus_hints().is_empty());
}

#[test]
fn undeleting_an_unfocused_item_does_not_move_focus() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), false, t0);

    fx.controller.on_delete_image(MediaPath::new("/local/2"), 1);
    fx.controller.on_undo_delete();
    assert!(fx.model.focus_hints().is_empty());
}

#[test]
fn boundary_crossing_suppresses_a_second_reload_within_the_window() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(4), true, t0);

    // Walk out to index 2.
    fx.model.set_focus(1);
    fx.controller
        .on_photo_changed(&fx.env, 1, Some(&MediaPath::new("/local/1")), t0);
    fx.model.set_focus(2);
    fx.controller
        .on_photo_changed(&fx.env, 2, Some(&MediaPath::new("/local/2")), t0 + 10 * MS);

    // First crossing 2 -> 1: reload happens, window opens.
    let invalidates = fx.host.count("invalidate-menu");
    fx.model.set_focus(1);
    let t1 = t0 + 20 * MS;
    fx.controller
        .on_photo_changed(&fx.env, 1, Some(&MediaPath::new("/local/1")), t1);
    assert_eq!(fx.surface.count("stop-scrolling"), 1);
    assert!(fx.host.count("invalidate-menu") > invalidates);

    // Swipe away and cross back inside the window: no reload.
    fx.model.set_focus(2);
    fx.controller
        .on_photo_changed(&fx.env, 2, Some(&MediaPath::new("/local/2")), t1 + 50 * MS);
    let invalidates = fx.host.count("invalidate-menu");
    fx.model.set_focus(1);
    fx.controller
        .on_photo_changed(&fx.env, 1, Some(&MediaPath::new("/local/1")), t1 + 100 * MS);
    assert_eq!(fx.surface.count("stop-scrolling"), 2);
    assert_eq!(
        fx.host.count("invalidate-menu"),
        invalidates,
        "second crossing inside the suppression window must not reload"
    );
}

#[test]
fn crossing_back_to_the_preview_defers_to_the_centering_callback() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(4), true, t0);

    fx.model.set_focus(1);
    fx.controller
        .on_photo_changed(&fx.env, 1, Some(&MediaPath::new("/local/1")), t0);
    fx.model.set_focus(2);
    fx.controller
        .on_photo_changed(&fx.env, 2, Some(&MediaPath::new("/local/2")), t0 + 5 * MS);

    // Crossing back to 0 requests centering callbacks and suppresses the
    // ordinary update.
    let invalidates = fx.host.count("invalidate-menu");
    fx.model.set_focus(0);
    fx.controller
        .on_photo_changed(&fx.env, 0, Some(&MediaPath::new("/local/0")), t0 + 10 * MS);
    assert_eq!(fx.surface.count("want-center:true"), 1);
    assert_eq!(fx.host.count("invalidate-menu"), invalidates);

    // Centering resolves on the preview: bars refresh and the first static
    // photo becomes the next current item.
    fx.controller.on_picture_center(true, t0 + 50 * MS);
    assert_eq!(fx.surface.count("want-center:false"), 1);
    fx.controller.on_frame(&fx.env, t0 + 60 * MS);
    assert!(fx.host.count("invalidate-menu") > invalidates);

    // The skip flag is consumed; later changes update normally.
    fx.model.set_focus(2);
    let invalidates = fx.host.count("invalidate-menu");
    fx.controller
        .on_photo_changed(&fx.env, 2, Some(&MediaPath::new("/local/2")), t0 + 500 * MS);
    assert!(fx.host.count("invalidate-menu") > invalidates);
}

#[test]
fn tap_precedence_bridge_first() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), true, t0);
    let bridge = Arc::clone(fx.bridge.as_ref().unwrap());
    bridge.consume_taps.store(true, Ordering::Relaxed);

    let bars_before = fx.controller.bars();
    fx.controller.on_single_tap_up(&fx.env, 5, 5, t0);
    assert_eq!(bridge.count("tap"), 1);
    assert_eq!(fx.controller.bars(), bars_before);
}

#[test]
fn tap_on_an_unlock_item_launches_the_unlock_flow() {
    let t0 = Instant::now();
    let items = vec![MediaItemInfo {
        path: MediaPath::new("/locked/0"),
        support: ItemSupport {
            unlock: true,
            ..ItemSupport::default()
        },
    }];
    let mut fx = created(items, false, t0);

    fx.controller.on_single_tap_up(&fx.env, 5, 5, t0);
    assert_eq!(fx.host.count("unlock-flow"), 1);
    assert_eq!(fx.controller.bars(), BarVisibility::Shown);
}

#[test]
fn tap_on_a_go_back_item_sets_the_return_index_result() {
    let t0 = Instant::now();
    let items = vec![MediaItemInfo {
        path: MediaPath::new("/back/0"),
        support: ItemSupport {
            go_back: true,
            ..ItemSupport::default()
        },
    }];
    let mut fx = created(items, false, t0);

    fx.controller.on_single_tap_up(&fx.env, 5, 5, t0);
    let result = fx.controller.take_result().expect("result must be set");
    assert_eq!(result.data.get_int(KEY_RETURN_INDEX_HINT, -1), 0);
}

#[test]
fn bars_never_show_over_the_live_preview() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), true, t0);
    assert_eq!(fx.controller.current_index(), 0);

    let control = fx.controller.bars_control();
    control.want_bars();
    fx.controller.on_frame(&fx.env, t0 + 10 * MS);
    assert_eq!(fx.controller.bars(), BarVisibility::Hidden);
}

#[test]
fn full_screen_message_reaches_the_bridge() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), true, t0);
    let bridge = Arc::clone(fx.bridge.as_ref().unwrap());

    fx.controller
        .poster()
        .post(PhotoMessage::FullScreenChanged(true));
    fx.controller.on_frame(&fx.env, t0 + 10 * MS);
    assert_eq!(bridge.count("full-screen:true"), 1);
}

#[test]
fn destroy_detaches_the_bridge_and_cancels_pending_messages() {
    let t0 = Instant::now();
    let mut fx = created(plain_items(3), true, t0);
    let bridge = Arc::clone(fx.bridge.as_ref().unwrap());

    // Arm the hide timer on a static photo.
    fx.model.set_focus(1);
    fx.controller
        .on_photo_changed(&fx.env, 1, Some(&MediaPath::new("/local/1")), t0);
    fx.controller.on_single_tap_up(&fx.env, 5, 5, t0 + 10 * MS);
    assert_eq!(fx.controller.bars(), BarVisibility::Shown);

    fx.controller.on_destroy(&fx.env);
    assert!(!bridge.has_server());
    assert_eq!(bridge.count("detach-nail"), 1);

    // The armed timer must not fire after teardown.
    let hides = fx.host.count("lights-out:true");
    fx.controller.on_frame(&fx.env, t0 + 10_000 * MS);
    assert_eq!(fx.host.count("lights-out:true"), hides);
}

#[test]
fn empty_model_on_load_requests_screen_close() {
    let t0 = Instant::now();
    let mut fx = created(Vec::new(), false, t0);

    // Active screen with an empty model: the load-finished report asks the
    // stack to close it; directly observable through the queued result of
    // take_result staying empty and no refresh happening.
    let invalidates = fx.host.count("invalidate-menu");
    fx.controller.on_loading_finished(&fx.env, true);
    assert_eq!(fx.host.count("invalidate-menu"), invalidates);
}
