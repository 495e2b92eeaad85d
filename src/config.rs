//! YAML-backed configuration for the viewer core.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::photo::PhotoTimings;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub photo: PhotoConfig,
    pub tiles: TileConfig,
    pub render: RenderConfig,
}

/// Timing knobs for the photo screen's message choreography.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PhotoConfig {
    /// Idle time before the bars auto-hide.
    #[serde(with = "humantime_serde")]
    pub hide_bars_timeout: Duration,
    /// Rolling window that coalesces UI refresh requests.
    #[serde(with = "humantime_serde")]
    pub deferred_refresh_window: Duration,
    /// Suppression window after a crossing near the camera boundary.
    #[serde(with = "humantime_serde")]
    pub camera_switch_cutoff: Duration,
    /// Delay before the render surface unfreezes after a resume.
    #[serde(with = "humantime_serde")]
    pub unfreeze_delay: Duration,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        let timings = PhotoTimings::default();
        Self {
            hide_bars_timeout: timings.hide_bars_timeout,
            deferred_refresh_window: timings.deferred_refresh_window,
            camera_switch_cutoff: timings.camera_switch_cutoff,
            unfreeze_delay: timings.unfreeze_delay,
        }
    }
}

impl PhotoConfig {
    pub fn timings(&self) -> PhotoTimings {
        PhotoTimings {
            hide_bars_timeout: self.hide_bars_timeout,
            deferred_refresh_window: self.deferred_refresh_window,
            camera_switch_cutoff: self.camera_switch_cutoff,
            unfreeze_delay: self.unfreeze_delay,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TileConfig {
    pub tile_size: u32,
    pub border_size: u32,
    /// Pyramid levels are halved until both dimensions fit this.
    pub max_backing_size: u32,
    pub pool_capacity: usize,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            border_size: 1,
            max_backing_size: 640,
            pool_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Cadence of the render loop's frame processing.
    #[serde(with = "humantime_serde")]
    pub frame_interval: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
        }
    }
}

impl ViewerConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        serde_yaml::from_str(input).context("failed to parse viewer configuration")
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.photo.hide_bars_timeout > Duration::ZERO,
            "hide-bars-timeout must be positive"
        );
        ensure!(
            self.photo.deferred_refresh_window > Duration::ZERO,
            "deferred-refresh-window must be positive"
        );
        ensure!(
            self.photo.camera_switch_cutoff > Duration::ZERO,
            "camera-switch-cutoff must be positive"
        );
        ensure!(self.tiles.tile_size > 0, "tile-size must be positive");
        ensure!(
            self.tiles.max_backing_size > 0,
            "max-backing-size must be positive"
        );
        ensure!(
            self.render.frame_interval > Duration::ZERO,
            "frame-interval must be positive"
        );
        Ok(())
    }
}
