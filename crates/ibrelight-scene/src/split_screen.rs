//! Side-by-side drawing of two components.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use ibrelight_core::{CameraViewport, SplitDraw, SplitLayout, SplitSide};
use ibrelight_gl::Framebuffer;

use crate::component::{Lifecycle, RenderedComponent};
use crate::error::{SceneError, SceneResult};

/// A component shared between several parents.
pub type SharedComponent = Rc<RefCell<dyn RenderedComponent>>;

/// Routes draws to a left and a right component split at a width fraction.
///
/// The halves are borrowed, not owned: their owners initialize, update and close
/// them. This node only routes draw calls.
pub struct SplitScreenComponent {
    layout: SplitLayout,
    left: Weak<RefCell<dyn RenderedComponent>>,
    right: Weak<RefCell<dyn RenderedComponent>>,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for SplitScreenComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitScreenComponent")
            .field("layout", &self.layout)
            .field("attached", &self.is_attached())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl SplitScreenComponent {
    pub fn new(layout: SplitLayout, left: &SharedComponent, right: &SharedComponent) -> Self {
        Self {
            layout,
            left: Rc::downgrade(left),
            right: Rc::downgrade(right),
            lifecycle: Lifecycle::default(),
        }
    }

    #[must_use]
    pub fn layout(&self) -> SplitLayout {
        self.layout
    }

    pub fn set_layout(&mut self, layout: SplitLayout) {
        self.layout = layout;
    }

    /// Whether both halves are still alive.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.left.strong_count() > 0 && self.right.strong_count() > 0
    }

    fn half(&self, side: SplitSide) -> SceneResult<SharedComponent> {
        let half = match side {
            SplitSide::Left => &self.left,
            SplitSide::Right => &self.right,
        };
        half.upgrade().ok_or(SceneError::Closed("split screen half"))
    }

    fn draw_routed(&self, framebuffer: &dyn Framebuffer, draws: &[SplitDraw]) -> SceneResult<()> {
        for draw in draws {
            self.half(draw.side)?
                .borrow_mut()
                .draw(framebuffer, &draw.camera)?;
        }
        Ok(())
    }
}

impl RenderedComponent for SplitScreenComponent {
    fn initialize(&mut self) -> SceneResult<()> {
        self.lifecycle.mark_initialized("split screen")
    }

    fn reload_shaders(&mut self) -> SceneResult<()> {
        Ok(())
    }

    fn draw(&mut self, framebuffer: &dyn Framebuffer, camera: &CameraViewport) -> SceneResult<()> {
        self.lifecycle.ensure_ready("split screen")?;
        let draws = self.layout.route_tile(camera, camera.rect);
        self.draw_routed(framebuffer, &draws)
    }

    /// Routes each tile to the halves it touches; a tile straddling the split
    /// draws into both with clipped widths.
    fn draw_in_subdivisions(
        &mut self,
        framebuffer: &dyn Framebuffer,
        tile_width: u32,
        tile_height: u32,
        camera: &CameraViewport,
    ) -> SceneResult<()> {
        self.lifecycle.ensure_ready("split screen")?;
        for draws in self.layout.route(camera, tile_width, tile_height) {
            self.draw_routed(framebuffer, &draws)?;
            framebuffer.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.lifecycle.close();
    }
}
