//! Tile routing for side-by-side split rendering.
//!
//! A split viewport is divided at a column into a left and a right half. Each
//! half is drawn by its own component with an aspect-corrected projection, and
//! every tile of a subdivided draw is routed to whichever halves it touches.

use glam::{Mat4, Vec3};

use crate::error::{CoreError, CoreResult};
use crate::viewport::{CameraViewport, PixelRect};

/// Which half of a split a draw belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitSide {
    Left,
    Right,
}

/// One routed draw: the half it targets and the camera to draw it with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitDraw {
    pub side: SplitSide,
    pub camera: CameraViewport,
}

/// A split position expressed as a fraction of the viewport width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitLayout {
    fraction: f32,
}

impl Default for SplitLayout {
    fn default() -> Self {
        Self { fraction: 0.5 }
    }
}

impl SplitLayout {
    /// Creates a layout splitting at `fraction` of the width.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSplit`] unless `0 < fraction < 1`.
    pub fn new(fraction: f32) -> CoreResult<Self> {
        if fraction > 0.0 && fraction < 1.0 {
            Ok(Self { fraction })
        } else {
            Err(CoreError::InvalidSplit(fraction))
        }
    }

    /// The split fraction.
    #[must_use]
    pub fn fraction(&self) -> f32 {
        self.fraction
    }

    /// Split column relative to the left edge of a viewport `width` pixels wide.
    #[must_use]
    pub fn split_pixel(&self, width: u32) -> u32 {
        ((self.fraction * width as f32).round() as u32).min(width)
    }

    /// The local viewport of each half within `viewport`.
    #[must_use]
    pub fn halves(&self, viewport: PixelRect) -> (PixelRect, PixelRect) {
        let split = self.split_pixel(viewport.width);
        let left = PixelRect::new(viewport.x, viewport.y, split, viewport.height);
        let right = PixelRect::new(
            viewport.x + split as i32,
            viewport.y,
            viewport.width - split,
            viewport.height,
        );
        (left, right)
    }

    /// Projection used by one half, scaled vertically to keep the aspect ratio
    /// of the narrower half.
    #[must_use]
    pub fn half_projection(&self, side: SplitSide, full_projection: Mat4) -> Mat4 {
        let scale = match side {
            SplitSide::Left => self.fraction,
            SplitSide::Right => 1.0 - self.fraction,
        };
        Mat4::from_scale(Vec3::new(1.0, scale, 1.0)) * full_projection
    }

    /// Routes one tile of `camera.rect` to the halves it intersects.
    ///
    /// A tile straddling the split column produces two draws with clipped widths.
    #[must_use]
    pub fn route_tile(&self, camera: &CameraViewport, tile: PixelRect) -> Vec<SplitDraw> {
        let (left, right) = self.halves(camera.rect);
        let split_x = right.x;
        let mut draws = Vec::with_capacity(2);

        if tile.x < split_x {
            let width = (tile.width as i32).min(split_x - tile.x) as u32;
            let part = PixelRect::new(tile.x, tile.y, width, tile.height);
            if !part.is_empty() {
                draws.push(SplitDraw {
                    side: SplitSide::Left,
                    camera: camera
                        .with_full_projection(
                            self.half_projection(SplitSide::Left, camera.full_projection),
                        )
                        .cropped_to(left, part),
                });
            }
        }

        let start = tile.x.max(split_x);
        let end = tile.right();
        if start < end {
            let part = PixelRect::new(start, tile.y, (end - start) as u32, tile.height);
            draws.push(SplitDraw {
                side: SplitSide::Right,
                camera: camera
                    .with_full_projection(
                        self.half_projection(SplitSide::Right, camera.full_projection),
                    )
                    .cropped_to(right, part),
            });
        }

        draws
    }

    /// Routes every tile of a subdivided draw, grouped per tile in draw order.
    #[must_use]
    pub fn route(
        &self,
        camera: &CameraViewport,
        tile_width: u32,
        tile_height: u32,
    ) -> Vec<Vec<SplitDraw>> {
        camera
            .rect
            .tiles(tile_width, tile_height)
            .map(|tile| self.route_tile(camera, tile))
            .collect()
    }
}
