//! The rendered component lifecycle.
//!
//! Every node of the render graph implements [`RenderedComponent`]:
//! `initialize` once, then any number of `update`/`draw` calls, then `close`.
//! Nodes embed a [`Lifecycle`] to enforce that order.

use std::cell::RefCell;
use std::rc::Rc;

use ibrelight_core::CameraViewport;
use ibrelight_gl::Framebuffer;

use crate::error::{SceneError, SceneResult};

/// Lifecycle state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Initialized,
    Closed,
}

impl Lifecycle {
    /// Records a successful `initialize`.
    ///
    /// A closed component cannot be brought back; build a new one instead.
    pub fn mark_initialized(&mut self, component: &'static str) -> SceneResult<()> {
        if *self == Self::Closed {
            return Err(SceneError::Closed(component));
        }
        *self = Self::Initialized;
        Ok(())
    }

    /// Fails unless the component is initialized and not yet closed.
    pub fn ensure_ready(self, component: &'static str) -> SceneResult<()> {
        match self {
            Self::Initialized => Ok(()),
            Self::Uninitialized => Err(SceneError::NotInitialized(component)),
            Self::Closed => Err(SceneError::Closed(component)),
        }
    }

    /// Moves to `Closed`. Returns `false` when the component was already closed.
    pub fn close(&mut self) -> bool {
        let first = *self != Self::Closed;
        *self = Self::Closed;
        first
    }

    #[must_use]
    pub fn is_initialized(self) -> bool {
        self == Self::Initialized
    }

    #[must_use]
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

/// A node of the render graph.
pub trait RenderedComponent {
    /// Allocates GPU resources for this node and the children it owns.
    fn initialize(&mut self) -> SceneResult<()>;

    /// Per-frame work that does not need a render target.
    fn update(&mut self) -> SceneResult<()> {
        Ok(())
    }

    /// Recompiles shaders, keeping the previous programs if compilation fails.
    fn reload_shaders(&mut self) -> SceneResult<()>;

    /// Draws into `framebuffer` within `camera.rect`.
    fn draw(&mut self, framebuffer: &dyn Framebuffer, camera: &CameraViewport) -> SceneResult<()>;

    /// Draws tile by tile, flushing after each tile.
    ///
    /// Each tile is drawn with a cropped copy of `camera`, so the tiles together
    /// produce the same image as one full draw.
    fn draw_in_subdivisions(
        &mut self,
        framebuffer: &dyn Framebuffer,
        tile_width: u32,
        tile_height: u32,
        camera: &CameraViewport,
    ) -> SceneResult<()> {
        for tile in camera.subdivide(tile_width, tile_height) {
            self.draw(framebuffer, &tile)?;
            framebuffer.flush()?;
        }
        Ok(())
    }

    /// Releases owned resources. Safe to call more than once.
    fn close(&mut self);
}

/// Shared nodes forward to the inner component.
///
/// This lets one node appear in several places of the graph, for example as a
/// split screen half and as the content of a lit root.
impl<T: RenderedComponent + ?Sized> RenderedComponent for Rc<RefCell<T>> {
    fn initialize(&mut self) -> SceneResult<()> {
        self.borrow_mut().initialize()
    }

    fn update(&mut self) -> SceneResult<()> {
        self.borrow_mut().update()
    }

    fn reload_shaders(&mut self) -> SceneResult<()> {
        self.borrow_mut().reload_shaders()
    }

    fn draw(&mut self, framebuffer: &dyn Framebuffer, camera: &CameraViewport) -> SceneResult<()> {
        self.borrow_mut().draw(framebuffer, camera)
    }

    fn draw_in_subdivisions(
        &mut self,
        framebuffer: &dyn Framebuffer,
        tile_width: u32,
        tile_height: u32,
        camera: &CameraViewport,
    ) -> SceneResult<()> {
        self.borrow_mut()
            .draw_in_subdivisions(framebuffer, tile_width, tile_height, camera)
    }

    fn close(&mut self) {
        self.borrow_mut().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        lifecycle: Lifecycle,
        releases: usize,
    }

    impl RenderedComponent for Counter {
        fn initialize(&mut self) -> SceneResult<()> {
            self.lifecycle.mark_initialized("counter")
        }

        fn reload_shaders(&mut self) -> SceneResult<()> {
            self.lifecycle.ensure_ready("counter")
        }

        fn draw(&mut self, _: &dyn Framebuffer, _: &CameraViewport) -> SceneResult<()> {
            self.lifecycle.ensure_ready("counter")
        }

        fn close(&mut self) {
            if self.lifecycle.close() {
                self.releases += 1;
            }
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut lifecycle = Lifecycle::default();
        assert!(matches!(
            lifecycle.ensure_ready("node"),
            Err(SceneError::NotInitialized("node"))
        ));

        lifecycle.mark_initialized("node").unwrap();
        assert!(lifecycle.ensure_ready("node").is_ok());

        assert!(lifecycle.close());
        assert!(!lifecycle.close());
        assert!(matches!(lifecycle.ensure_ready("node"), Err(SceneError::Closed("node"))));
        assert!(lifecycle.mark_initialized("node").is_err());
    }

    #[test]
    fn test_close_before_initialize_is_noop() {
        let mut counter = Counter::default();
        counter.close();
        counter.close();
        assert_eq!(counter.releases, 1);
        assert!(counter.lifecycle.is_closed());
    }

    #[test]
    fn test_shared_component_forwards() {
        let shared = Rc::new(RefCell::new(Counter::default()));
        let mut handle: Rc<RefCell<Counter>> = Rc::clone(&shared);

        assert!(handle.reload_shaders().is_err());
        handle.initialize().unwrap();
        assert!(handle.reload_shaders().is_ok());

        handle.close();
        handle.close();
        assert_eq!(shared.borrow().releases, 1);
    }
}
