//! Binary entrypoint for the photo viewer core.
//!
//! Wires the host boundary together: screen registry with injected
//! dependencies, render-loop thread, and ctrl-c shutdown. The drawing
//! backend stays external; the stand-ins here log what a renderer would do.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, trace};
use tracing_subscriber::{EnvFilter, fmt};

use rust_photo_viewer::config::ViewerConfig;
use rust_photo_viewer::host::{HostEnv, ViewerHost, run_render_loop};
use rust_photo_viewer::photo::bridge::Rect;
use rust_photo_viewer::photo::model::{MediaItemInfo, MemoryPhotoModel};
use rust_photo_viewer::photo::{KEY_MEDIA_ITEM_PATH, PhotoSurface, PhotoViewController};
use rust_photo_viewer::screen::{ConfigMap, ConfigValue, ScreenKind};
use rust_photo_viewer::stack::ScreenRegistry;
use rust_photo_viewer::tile::{TilePool, TiledImageProvider};

#[derive(Debug, Parser)]
#[command(name = "rust-photo-viewer", about = "Interactive photo viewer core")]
struct Cli {
    /// Path to YAML config file; defaults apply when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Photos to browse, first one focused
    #[arg(value_name = "PHOTO")]
    photos: Vec<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(
        format!("rust_photo_viewer={level}")
            .parse()
            .context("invalid log directive")?,
    );
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

/// Host capabilities backed by the process itself; termination cancels the
/// run.
struct ProcessHost {
    cancel: CancellationToken,
}

impl HostEnv for ProcessHost {
    fn terminate(&self) {
        info!("host terminate requested");
        self.cancel.cancel();
    }

    fn set_lights_out(&self, enabled: bool) {
        debug!(enabled, "lights-out mode");
    }

    fn lock_orientation(&self) {
        debug!("orientation locked");
    }

    fn unlock_orientation(&self) {
        debug!("orientation unlocked");
    }

    fn freeze_surface(&self) {
        debug!("surface frozen");
    }

    fn unfreeze_surface(&self) {
        debug!("surface unfrozen");
    }

    fn invalidate_options_menu(&self) {
        debug!("options menu invalidated");
    }

    fn launch_unlock_flow(&self) {
        info!("unlock flow requested");
    }
}

/// Drawing-backend stand-in; a real renderer would act on these.
struct NullSurface;

impl PhotoSurface for NullSurface {
    fn set_camera_relative_frame(&self, frame: Rect) {
        trace!(?frame, "camera relative frame");
    }

    fn set_swiping_enabled(&self, enabled: bool) {
        trace!(enabled, "swiping");
    }

    fn switch_with_capture_animation(&self, offset: i32) -> bool {
        trace!(offset, "capture-animation switch declined");
        false
    }

    fn set_want_picture_center_callbacks(&self, want: bool) {
        trace!(want, "picture-center callbacks");
    }

    fn stop_scrolling(&self) {
        trace!("scrolling stopped");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = match &cli.config {
        Some(path) => ViewerConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    cfg.validate().context("validating configuration")?;

    let cancel = CancellationToken::new();
    let host_env: Arc<dyn HostEnv> = Arc::new(ProcessHost {
        cancel: cancel.clone(),
    });

    // Exercise the tile pyramid on the first photo so the pipeline is
    // visible even without a drawing backend.
    if let Some(first) = cli.photos.first() {
        let pixels = image::open(first)
            .with_context(|| format!("failed to open {}", first.display()))?
            .to_rgba8();
        let mut provider = TiledImageProvider::new(pixels, cfg.tiles.max_backing_size)?;
        let mut pool = TilePool::new(
            cfg.tiles.tile_size,
            cfg.tiles.border_size,
            cfg.tiles.pool_capacity,
        );
        if provider.level_count() > 0 {
            let tile = provider.tile(
                0,
                0,
                0,
                cfg.tiles.tile_size,
                cfg.tiles.border_size,
                Some(&mut pool),
            );
            pool.release(tile);
        }
        info!(
            width = provider.image_width(),
            height = provider.image_height(),
            levels = provider.level_count(),
            pooled = pool.len(),
            "tile pyramid ready"
        );
        provider.recycle();
    }

    let items: Vec<MediaItemInfo> = cli
        .photos
        .iter()
        .map(|path| MediaItemInfo::plain(path.display().to_string()))
        .collect();
    info!(count = items.len(), "photos to browse");

    let surface: Arc<dyn PhotoSurface> = Arc::new(NullSurface);
    let timings = cfg.photo.timings();
    let mut registry = ScreenRegistry::new();
    registry.register(ScreenKind::PhotoView, {
        let surface = Arc::clone(&surface);
        let items = items.clone();
        move || {
            Box::new(PhotoViewController::new(
                Arc::clone(&surface),
                Box::new(MemoryPhotoModel::new(items.clone())),
                None,
                timings,
            ))
        }
    });

    let host = Arc::new(ViewerHost::new(host_env, registry));

    let mut entry = ConfigMap::new();
    if let Some(first) = cli.photos.first() {
        entry.insert(
            KEY_MEDIA_ITEM_PATH,
            ConfigValue::Text(first.display().to_string()),
        );
    }
    host.push(ScreenKind::PhotoView, entry)?;
    host.resume();

    let render = run_render_loop(Arc::clone(&host), cancel.clone(), cfg.render.frame_interval)?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("ctrl-c received; shutting down"),
        _ = cancel.cancelled() => info!("host terminated"),
    }
    cancel.cancel();
    render
        .join()
        .map_err(|_| anyhow!("render thread panicked"))?;

    host.pause();
    host.destroy();
    Ok(())
}
