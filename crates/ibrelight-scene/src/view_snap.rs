//! Drawing from the captured view nearest to the requested camera.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use glam::Mat4;
use ibrelight_core::{snap_to_view, CameraViewport, SnapResult, ViewSet};
use ibrelight_gl::Framebuffer;

use crate::component::{Lifecycle, RenderedComponent};
use crate::error::{SceneError, SceneResult};
use crate::scene_model::SharedSceneModel;

/// Shared read access to the most recent snapped view index.
#[derive(Debug, Clone, Default)]
pub struct SnapIndex(Rc<Cell<Option<usize>>>);

impl SnapIndex {
    /// The last snapped index, or `None` before the first snap.
    #[must_use]
    pub fn get(&self) -> Option<usize> {
        self.0.get()
    }

    fn set(&self, index: usize) {
        self.0.set(Some(index));
    }
}

/// Replaces the camera view with the nearest captured pose before drawing its child.
pub struct ViewSnap {
    views: Arc<dyn ViewSet>,
    scene: SharedSceneModel,
    child: Option<Box<dyn RenderedComponent>>,
    index: SnapIndex,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for ViewSnap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewSnap")
            .field("views", &self.views.camera_pose_count())
            .field("index", &self.index.get())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl ViewSnap {
    /// Takes ownership of `child`.
    pub fn new(
        views: Arc<dyn ViewSet>,
        scene: SharedSceneModel,
        child: Box<dyn RenderedComponent>,
    ) -> Self {
        Self {
            views,
            scene,
            child: Some(child),
            index: SnapIndex::default(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// Handle that follows the snapped index across draws.
    #[must_use]
    pub fn snap_index(&self) -> SnapIndex {
        self.index.clone()
    }

    /// Snaps `target_view` to the view set and records the winning index.
    pub fn snap(&self, target_view: Mat4) -> SceneResult<SnapResult> {
        let model = self.scene.borrow().model;
        let result = snap_to_view(target_view, model, self.views.as_ref())?;
        if self.index.get() != Some(result.index) {
            log::debug!(
                "snapped to view {} ({})",
                result.index,
                self.views.image_name(result.index)
            );
        }
        self.index.set(result.index);
        Ok(result)
    }

    fn snapped_camera(&self, camera: &CameraViewport) -> SceneResult<CameraViewport> {
        Ok(camera.with_view(self.snap(camera.view)?.view))
    }

    fn child(&mut self) -> SceneResult<&mut Box<dyn RenderedComponent>> {
        self.lifecycle.ensure_ready("view snap")?;
        self.child.as_mut().ok_or(SceneError::Closed("view snap"))
    }
}

impl RenderedComponent for ViewSnap {
    fn initialize(&mut self) -> SceneResult<()> {
        if let Some(child) = self.child.as_mut() {
            child.initialize()?;
        }
        self.lifecycle.mark_initialized("view snap")
    }

    fn update(&mut self) -> SceneResult<()> {
        self.child()?.update()
    }

    fn reload_shaders(&mut self) -> SceneResult<()> {
        self.child()?.reload_shaders()
    }

    fn draw(&mut self, framebuffer: &dyn Framebuffer, camera: &CameraViewport) -> SceneResult<()> {
        self.lifecycle.ensure_ready("view snap")?;
        let snapped = self.snapped_camera(camera)?;
        self.child()?.draw(framebuffer, &snapped)
    }

    fn draw_in_subdivisions(
        &mut self,
        framebuffer: &dyn Framebuffer,
        tile_width: u32,
        tile_height: u32,
        camera: &CameraViewport,
    ) -> SceneResult<()> {
        self.lifecycle.ensure_ready("view snap")?;
        let snapped = self.snapped_camera(camera)?;
        self.child()?
            .draw_in_subdivisions(framebuffer, tile_width, tile_height, &snapped)
    }

    fn close(&mut self) {
        if self.lifecycle.close() {
            if let Some(mut child) = self.child.take() {
                child.close();
            }
        }
    }
}
