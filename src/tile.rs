//! Tiled mipmap image provider.
//!
//! Builds a resolution pyramid by repeated halving until both dimensions fit
//! the maximum backing size, keeps the smallest image aside as the screen
//! nail, and serves bordered fixed-size tiles from any remaining level. The
//! provider has no thread ownership of its own; callers serialize access or
//! treat it as owned by the render thread.

use anyhow::{Context, Result, ensure};
use fast_image_resize as fir;
use image::RgbaImage;
use tracing::debug;

/// Caller-owned free list of recycled tile buffers. Confined to the render
/// thread along with the provider, so no locking.
#[derive(Debug)]
pub struct TilePool {
    edge: u32,
    capacity: usize,
    free: Vec<RgbaImage>,
}

impl TilePool {
    pub fn new(tile_size: u32, border_size: u32, capacity: usize) -> Self {
        Self {
            edge: tile_size + 2 * border_size,
            capacity,
            free: Vec::new(),
        }
    }

    /// Edge length of the buffers this pool recycles.
    pub fn tile_edge(&self) -> u32 {
        self.edge
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Returns a tile to the pool. Buffers of the wrong shape, or beyond
    /// capacity, are dropped.
    pub fn release(&mut self, tile: RgbaImage) {
        if tile.width() == self.edge && tile.height() == self.edge && self.free.len() < self.capacity
        {
            self.free.push(tile);
        }
    }

    pub fn clear(&mut self) {
        self.free.clear();
    }

    fn acquire(&mut self, edge: u32) -> Option<RgbaImage> {
        if self.edge == edge {
            self.free.pop()
        } else {
            None
        }
    }
}

pub struct TiledImageProvider {
    levels: Vec<RgbaImage>,
    screen_nail: Option<RgbaImage>,
    image_width: u32,
    image_height: u32,
    recycled: bool,
}

impl TiledImageProvider {
    /// Builds the pyramid from `source`. Level 0 is the original; each
    /// further level halves both dimensions (rounded up) until both fit
    /// `max_backing_size`. The smallest image becomes the screen nail and is
    /// not addressable as a level.
    pub fn new(source: RgbaImage, max_backing_size: u32) -> Result<Self> {
        ensure!(max_backing_size > 0, "max backing size must be positive");
        ensure!(
            source.width() > 0 && source.height() > 0,
            "source image must not be empty"
        );

        let image_width = source.width();
        let image_height = source.height();
        let mut levels = vec![source];
        loop {
            let last = levels.last().expect("pyramid always has an image");
            if last.width() <= max_backing_size && last.height() <= max_backing_size {
                break;
            }
            let next = halve(last).context("failed to downscale pyramid level")?;
            levels.push(next);
        }

        let screen_nail = levels.pop();
        if let Some(nail) = &screen_nail {
            debug!(
                levels = levels.len(),
                nail_width = nail.width(),
                nail_height = nail.height(),
                "mipmap pyramid built"
            );
        }
        Ok(Self {
            levels,
            screen_nail,
            image_width,
            image_height,
            recycled: false,
        })
    }

    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    /// Number of addressable pyramid levels; the screen nail is excluded.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Lowest-resolution image, available instantly as a preview. `None`
    /// once recycled.
    pub fn screen_nail(&self) -> Option<&RgbaImage> {
        self.screen_nail.as_ref()
    }

    /// Extracts a `tile_size + 2 * border_size` square. `x` and `y` are
    /// top-left coordinates in level-0 pixel space; they are right-shifted
    /// by `level` into that level's space. Regions falling outside the
    /// source stay cleared. A pooled buffer of matching shape is reused
    /// (cleared first); otherwise a fresh one is allocated.
    pub fn tile(
        &self,
        level: usize,
        x: i32,
        y: i32,
        tile_size: u32,
        border_size: u32,
        pool: Option<&mut TilePool>,
    ) -> RgbaImage {
        assert!(!self.recycled, "tile requested from a recycled provider");
        assert!(
            level < self.levels.len(),
            "tile level {level} out of range (level count {})",
            self.levels.len()
        );

        let x = x >> level;
        let y = y >> level;
        let edge = tile_size + 2 * border_size;

        let mut out = match pool.and_then(|pool| pool.acquire(edge)) {
            Some(mut recycled) => {
                recycled.fill(0);
                recycled
            }
            // Freshly allocated buffers start cleared.
            None => RgbaImage::new(edge, edge),
        };

        let offset_x = i64::from(border_size) - i64::from(x);
        let offset_y = i64::from(border_size) - i64::from(y);
        blit(&self.levels[level], &mut out, offset_x, offset_y);
        out
    }

    pub fn is_recycled(&self) -> bool {
        self.recycled
    }

    /// Releases every level and the screen nail. Idempotent.
    pub fn recycle(&mut self) {
        if self.recycled {
            return;
        }
        self.recycled = true;
        self.levels.clear();
        self.screen_nail = None;
    }
}

/// Copies `src` into `dst` with its top-left corner at `(offset_x,
/// offset_y)`; the parts of `dst` the source does not cover are untouched.
fn blit(src: &RgbaImage, dst: &mut RgbaImage, offset_x: i64, offset_y: i64) {
    const BYTES_PER_PIXEL: i64 = 4;

    let dst_w = i64::from(dst.width());
    let dst_h = i64::from(dst.height());
    let src_w = i64::from(src.width());
    let src_h = i64::from(src.height());

    let x0 = offset_x.max(0);
    let x1 = (offset_x + src_w).min(dst_w);
    let y0 = offset_y.max(0);
    let y1 = (offset_y + src_h).min(dst_h);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let src_raw = src.as_raw();
    let row_bytes = ((x1 - x0) * BYTES_PER_PIXEL) as usize;
    for dst_y in y0..y1 {
        let src_y = dst_y - offset_y;
        let src_start = ((src_y * src_w + (x0 - offset_x)) * BYTES_PER_PIXEL) as usize;
        let dst_start = ((dst_y * dst_w + x0) * BYTES_PER_PIXEL) as usize;
        (**dst)[dst_start..dst_start + row_bytes]
            .copy_from_slice(&src_raw[src_start..src_start + row_bytes]);
    }
}

/// Halves both dimensions (rounded up), matching the rest of the pipeline's
/// RGBA8 resize path.
fn halve(source: &RgbaImage) -> Result<RgbaImage> {
    let target_w = source.width().div_ceil(2).max(1);
    let target_h = source.height().div_ceil(2).max(1);

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for pyramid downscale")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("pyramid downscale failed")?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .context("failed to construct downscaled RGBA image")
}
