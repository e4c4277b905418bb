//! Per-draw camera state and viewport subdivision.
//!
//! Pixel rectangles use a top-left origin: `x` grows to the right and `y` grows
//! downward, matching the render target layout of the backend.

use glam::{Mat4, Vec3};

/// An integer pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Creates a new rectangle.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// One past the right-most column.
    #[must_use]
    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    /// One past the bottom-most row.
    #[must_use]
    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Whether the rectangle covers no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Splits the rectangle into tiles of at most `tile_width × tile_height`,
    /// row by row from the top-left corner.
    ///
    /// A zero tile dimension is treated as "no subdivision" along that axis.
    pub fn tiles(&self, tile_width: u32, tile_height: u32) -> impl Iterator<Item = PixelRect> {
        let rect = *self;
        let tile_width = if tile_width == 0 { rect.width.max(1) } else { tile_width };
        let tile_height = if tile_height == 0 { rect.height.max(1) } else { tile_height };

        let rows = rect.height.div_ceil(tile_height);
        let cols = rect.width.div_ceil(tile_width);

        (0..rows).flat_map(move |row| {
            (0..cols).map(move |col| {
                let offset_x = col * tile_width;
                let offset_y = row * tile_height;
                PixelRect {
                    x: rect.x + offset_x as i32,
                    y: rect.y + offset_y as i32,
                    width: tile_width.min(rect.width - offset_x),
                    height: tile_height.min(rect.height - offset_y),
                }
            })
        })
    }
}

/// Camera state threaded through one draw of the component tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraViewport {
    /// World-to-camera transform.
    pub view: Mat4,
    /// Projection for the whole (uncropped) viewport.
    pub full_projection: Mat4,
    /// Maps the clip region of the current pixel rectangle onto the full clip cube.
    pub viewport_crop: Mat4,
    /// Pixel rectangle the draw is restricted to.
    pub rect: PixelRect,
}

impl CameraViewport {
    /// Creates an uncropped camera viewport.
    #[must_use]
    pub fn new(view: Mat4, full_projection: Mat4, rect: PixelRect) -> Self {
        Self {
            view,
            full_projection,
            viewport_crop: Mat4::IDENTITY,
            rect,
        }
    }

    /// The projection to use for the current pixel rectangle.
    #[must_use]
    pub fn viewport_projection(&self) -> Mat4 {
        self.viewport_crop * self.full_projection
    }

    /// Replaces the view matrix.
    #[must_use]
    pub fn with_view(mut self, view: Mat4) -> Self {
        self.view = view;
        self
    }

    /// Replaces the full projection.
    #[must_use]
    pub fn with_full_projection(mut self, full_projection: Mat4) -> Self {
        self.full_projection = full_projection;
        self
    }

    /// Restricts drawing to `tile`, a sub-rectangle of `frame`, where `frame` is the
    /// rectangle the current crop is expressed relative to.
    ///
    /// The new crop is composed onto the existing one, so cropping an already
    /// cropped viewport keeps refining the same projection.
    #[must_use]
    pub fn cropped_to(&self, frame: PixelRect, tile: PixelRect) -> Self {
        Self {
            viewport_crop: tile_crop(frame, tile) * self.viewport_crop,
            rect: tile,
            ..*self
        }
    }

    /// Splits this viewport into cropped tiles of at most `tile_width × tile_height`.
    pub fn subdivide(
        &self,
        tile_width: u32,
        tile_height: u32,
    ) -> impl Iterator<Item = CameraViewport> + '_ {
        self.rect
            .tiles(tile_width, tile_height)
            .map(move |tile| self.cropped_to(self.rect, tile))
    }
}

/// Crop matrix that maps the clip-space region of `tile` within `frame` onto the
/// full `[-1, 1]` clip square.
#[must_use]
pub fn tile_crop(frame: PixelRect, tile: PixelRect) -> Mat4 {
    if frame.is_empty() || tile.is_empty() {
        return Mat4::IDENTITY;
    }

    let frame_width = frame.width as f32;
    let frame_height = frame.height as f32;
    let tile_width = tile.width as f32;
    let tile_height = tile.height as f32;

    let center_x = -1.0 + (2.0 * (tile.x - frame.x) as f32 + tile_width) / frame_width;
    let center_y = 1.0 - (2.0 * (tile.y - frame.y) as f32 + tile_height) / frame_height;

    Mat4::from_scale(Vec3::new(
        frame_width / tile_width,
        frame_height / tile_height,
        1.0,
    )) * Mat4::from_translation(Vec3::new(-center_x, -center_y, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;
    use proptest::prelude::*;

    #[test]
    fn test_tiles_cover_uneven_rect() {
        let rect = PixelRect::new(10, 20, 300, 130);
        let tiles: Vec<_> = rect.tiles(128, 64).collect();
        assert_eq!(tiles.len(), 3 * 3);
        assert_eq!(tiles[0], PixelRect::new(10, 20, 128, 64));
        assert_eq!(tiles[2], PixelRect::new(266, 20, 44, 64));
        assert_eq!(tiles[8], PixelRect::new(266, 148, 44, 2));
    }

    #[test]
    fn test_zero_tile_size_means_whole_rect() {
        let rect = PixelRect::new(0, 0, 64, 32);
        let tiles: Vec<_> = rect.tiles(0, 0).collect();
        assert_eq!(tiles, vec![rect]);
    }

    #[test]
    fn test_whole_frame_crop_is_identity() {
        let frame = PixelRect::new(0, 0, 800, 600);
        let crop = tile_crop(frame, frame);
        assert!(crop.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn test_top_left_quadrant_crop() {
        let frame = PixelRect::new(0, 0, 100, 100);
        let tile = PixelRect::new(0, 0, 50, 50);
        let crop = tile_crop(frame, tile);
        // Top-left corner of the frame in clip space is (-1, 1).
        let corner = crop * Vec4::new(-1.0, 1.0, 0.0, 1.0);
        assert!((corner.x + 1.0).abs() < 1e-6);
        assert!((corner.y - 1.0).abs() < 1e-6);
        // Frame center lands on the tile's bottom-right corner.
        let center = crop * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((center.x - 1.0).abs() < 1e-6);
        assert!((center.y + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_subdivide_composes_projection() {
        let projection = Mat4::perspective_rh(1.0, 1.5, 0.1, 10.0);
        let camera = CameraViewport::new(Mat4::IDENTITY, projection, PixelRect::new(0, 0, 300, 200));
        for tile in camera.subdivide(128, 128) {
            assert_eq!(tile.full_projection, projection);
            assert_eq!(tile.viewport_projection(), tile.viewport_crop * projection);
        }
    }

    proptest! {
        #[test]
        fn prop_tiles_cover_every_pixel_once(
            width in 1u32..300,
            height in 1u32..120,
            tile_width in 1u32..160,
            tile_height in 1u32..160,
        ) {
            let rect = PixelRect::new(5, 7, width, height);
            let mut counts = vec![0u8; (width * height) as usize];
            for tile in rect.tiles(tile_width, tile_height) {
                prop_assert!(tile.width <= tile_width && tile.height <= tile_height);
                for y in tile.y..tile.bottom() {
                    for x in tile.x..tile.right() {
                        let index = ((y - rect.y) as u32 * width + (x - rect.x) as u32) as usize;
                        counts[index] += 1;
                    }
                }
            }
            prop_assert!(counts.iter().all(|&c| c == 1));
        }

        #[test]
        fn prop_tile_crop_maps_tile_corners_to_clip_corners(
            tx in 0i32..200,
            ty in 0i32..200,
            tw in 1u32..100,
            th in 1u32..100,
        ) {
            let frame = PixelRect::new(0, 0, 300, 300);
            let tile = PixelRect::new(tx, ty, tw, th);
            let crop = tile_crop(frame, tile);
            let to_clip = |px: f32, py: f32| {
                Vec4::new(-1.0 + 2.0 * px / 300.0, 1.0 - 2.0 * py / 300.0, 0.0, 1.0)
            };
            let top_left = crop * to_clip(tx as f32, ty as f32);
            let bottom_right = crop * to_clip((tx + tw as i32) as f32, (ty + th as i32) as f32);
            prop_assert!((top_left.x + 1.0).abs() < 1e-3);
            prop_assert!((top_left.y - 1.0).abs() < 1e-3);
            prop_assert!((bottom_right.x - 1.0).abs() < 1e-3);
            prop_assert!((bottom_right.y + 1.0).abs() < 1e-3);
        }
    }
}
