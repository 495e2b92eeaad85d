use image::{Rgba, RgbaImage};
use rust_photo_viewer::tile::{TilePool, TiledImageProvider};

const INK: Rgba<u8> = Rgba([40, 80, 120, 255]);
const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

fn solid(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, INK)
}

#[test]
fn pyramid_halves_until_both_dimensions_fit_the_backing_size() {
    // 1000x700 -> 500x350 -> 250x175; the last fits 256 and becomes the
    // screen nail, leaving two addressable levels.
    let provider = TiledImageProvider::new(solid(1000, 700), 256).unwrap();

    assert_eq!(provider.image_width(), 1000);
    assert_eq!(provider.image_height(), 700);
    assert_eq!(provider.level_count(), 2);
    assert_eq!(provider.screen_nail().unwrap().dimensions(), (250, 175));
}

#[test]
fn pyramid_rounds_odd_dimensions_up() {
    // 999x701 -> 500x351 -> 250x176.
    let provider = TiledImageProvider::new(solid(999, 701), 256).unwrap();
    assert_eq!(provider.level_count(), 2);
    assert_eq!(provider.screen_nail().unwrap().dimensions(), (250, 176));
}

#[test]
fn tile_is_positioned_by_level_shifted_coordinates() {
    let provider = TiledImageProvider::new(solid(1000, 700), 256).unwrap();

    // Level-0 coordinates (512, 512) shift to (256, 256) on level 1, whose
    // image is 500x350: the source covers dst x in [0, 252) and y in
    // [0, 102), the rest stays under-painted.
    let tile = provider.tile(1, 512, 512, 256, 8, None);
    assert_eq!(tile.dimensions(), (272, 272));
    assert_eq!(*tile.get_pixel(100, 50), INK);
    assert_eq!(*tile.get_pixel(251, 101), INK);
    assert_eq!(*tile.get_pixel(252, 50), CLEAR);
    assert_eq!(*tile.get_pixel(100, 102), CLEAR);
}

#[test]
fn interior_tile_fills_the_border_from_neighboring_pixels() {
    let provider = TiledImageProvider::new(solid(1000, 700), 256).unwrap();

    // Fully interior at level 0: every pixel, border included, comes from
    // the source.
    let tile = provider.tile(0, 256, 256, 256, 8, None);
    assert_eq!(tile.dimensions(), (272, 272));
    assert!(tile.pixels().all(|px| *px == INK));
}

#[test]
fn tile_overlapping_the_image_edge_is_under_painted_outside() {
    let provider = TiledImageProvider::new(solid(1000, 700), 256).unwrap();

    // Starts at (900, 600): source pixels run out 100 past the origin in
    // each axis, so dst is covered for x, y in [0, 108).
    let tile = provider.tile(0, 900, 600, 256, 8, None);
    assert_eq!(*tile.get_pixel(0, 0), INK);
    assert_eq!(*tile.get_pixel(107, 107), INK);
    assert_eq!(*tile.get_pixel(108, 50), CLEAR);
    assert_eq!(*tile.get_pixel(50, 108), CLEAR);
}

#[test]
fn pooled_buffers_are_consumed_and_recycled() {
    let provider = TiledImageProvider::new(solid(1000, 700), 256).unwrap();
    let mut pool = TilePool::new(256, 8, 2);
    pool.release(RgbaImage::from_pixel(272, 272, Rgba([9, 9, 9, 9])));
    assert_eq!(pool.len(), 1);

    let tile = provider.tile(0, 256, 256, 256, 8, Some(&mut pool));
    assert!(pool.is_empty(), "the pooled buffer must be reused");
    assert!(tile.pixels().all(|px| *px == INK));

    pool.release(tile);
    assert_eq!(pool.len(), 1);
}

#[test]
fn pool_with_mismatched_shape_falls_back_to_allocation() {
    let provider = TiledImageProvider::new(solid(1000, 700), 256).unwrap();
    let mut pool = TilePool::new(64, 0, 2);
    pool.release(RgbaImage::new(64, 64));

    let tile = provider.tile(0, 0, 0, 256, 8, Some(&mut pool));
    assert_eq!(tile.dimensions(), (272, 272));
    // The mismatched buffer stays pooled.
    assert_eq!(pool.len(), 1);
}

#[test]
#[should_panic(expected = "recycled")]
fn tile_after_recycle_is_a_programming_error() {
    let mut provider = TiledImageProvider::new(solid(1000, 700), 256).unwrap();
    provider.recycle();
    let _ = provider.tile(0, 0, 0, 256, 8, None);
}
