//! The lit part of the render graph.
//!
//! A [`LitRoot`] owns the [`LightingResources`] and the content drawn under
//! them. Every draw refreshes shadow maps and screen-space depth before any
//! content draws, since lit shaders sample both.

use std::rc::Rc;

use ibrelight_core::CameraViewport;
use ibrelight_gl::Framebuffer;

use crate::component::{Lifecycle, RenderedComponent};
use crate::error::{SceneError, SceneResult};
use crate::lighting::{LightingHandle, SharedLighting};

/// Keeps the first error while still running every step.
pub(crate) fn first_error(results: impl IntoIterator<Item = SceneResult<()>>) -> SceneResult<()> {
    results.into_iter().fold(Ok(()), |first, result| first.and(result))
}

/// Owner of lighting resources and the lit content subtree.
pub struct LitRoot {
    lighting: Option<SharedLighting>,
    content: Option<Box<dyn RenderedComponent>>,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for LitRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LitRoot")
            .field("has_lighting", &self.lighting.is_some())
            .field("has_content", &self.content.is_some())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl LitRoot {
    /// Takes ownership of `lighting`. Content is attached with [`Self::set_content`].
    pub fn new(lighting: SharedLighting) -> Self {
        Self {
            lighting: Some(lighting),
            content: None,
            lifecycle: Lifecycle::default(),
        }
    }

    /// A non-owning handle for content that samples the lighting buffers.
    ///
    /// The handle stops resolving once this root is closed.
    pub fn lighting_handle(&self) -> Option<LightingHandle> {
        self.lighting.as_ref().map(Rc::downgrade)
    }

    /// Replaces the owned content, closing the previous subtree.
    pub fn set_content(&mut self, content: Box<dyn RenderedComponent>) {
        if let Some(mut previous) = self.content.replace(content) {
            previous.close();
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn lighting(&self) -> SceneResult<&SharedLighting> {
        self.lighting
            .as_ref()
            .ok_or(SceneError::Closed("lighting resources"))
    }

    /// Refreshes shadow maps, then camera depth, then submits both.
    fn setup_for_draw(&self, camera: &CameraViewport) -> SceneResult<()> {
        let mut lighting = self.lighting()?.borrow_mut();
        lighting.refresh_shadow_maps()?;
        lighting.refresh_screen_space_depth(camera.view, camera.full_projection)?;
        lighting.submit()
    }

    /// Runs the lighting refresh and then hands the content to `draw_content`.
    fn lit_draw(
        &mut self,
        camera: &CameraViewport,
        draw_content: impl FnOnce(&mut dyn RenderedComponent) -> SceneResult<()>,
    ) -> SceneResult<()> {
        self.lifecycle.ensure_ready("lit root")?;
        self.setup_for_draw(camera)?;
        match self.content.as_deref_mut() {
            Some(content) => draw_content(content),
            None => Ok(()),
        }
    }
}

impl RenderedComponent for LitRoot {
    fn initialize(&mut self) -> SceneResult<()> {
        self.lighting()?.borrow_mut().initialize()?;
        if let Some(content) = self.content.as_mut() {
            content.initialize()?;
        }
        self.lifecycle.mark_initialized("lit root")
    }

    fn update(&mut self) -> SceneResult<()> {
        self.lifecycle.ensure_ready("lit root")?;
        match self.content.as_mut() {
            Some(content) => content.update(),
            None => Ok(()),
        }
    }

    fn reload_shaders(&mut self) -> SceneResult<()> {
        self.lifecycle.ensure_ready("lit root")?;
        let lighting = self.lighting()?.borrow_mut().reload_shaders();
        let content = self
            .content
            .as_mut()
            .map_or(Ok(()), |content| content.reload_shaders());
        first_error([lighting, content])
    }

    fn draw(&mut self, framebuffer: &dyn Framebuffer, camera: &CameraViewport) -> SceneResult<()> {
        self.lit_draw(camera, |content| content.draw(framebuffer, camera))
    }

    fn draw_in_subdivisions(
        &mut self,
        framebuffer: &dyn Framebuffer,
        tile_width: u32,
        tile_height: u32,
        camera: &CameraViewport,
    ) -> SceneResult<()> {
        self.lit_draw(camera, |content| {
            content.draw_in_subdivisions(framebuffer, tile_width, tile_height, camera)
        })
    }

    fn close(&mut self) {
        if !self.lifecycle.close() {
            return;
        }
        if let Some(mut content) = self.content.take() {
            content.close();
        }
        if let Some(lighting) = self.lighting.take() {
            lighting.borrow_mut().close();
        }
        log::debug!("closed lit root");
    }
}

impl Drop for LitRoot {
    fn drop(&mut self) {
        self.close();
    }
}

/// Ordered children drawn one after another under one lit root.
#[derive(Default)]
pub struct LitContent {
    children: Vec<Box<dyn RenderedComponent>>,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for LitContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LitContent")
            .field("children", &self.children.len())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl LitContent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an owned child; it draws after the existing children.
    pub fn push(&mut self, child: Box<dyn RenderedComponent>) {
        self.children.push(child);
    }

    #[must_use]
    pub fn with_child(mut self, child: Box<dyn RenderedComponent>) -> Self {
        self.push(child);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl RenderedComponent for LitContent {
    fn initialize(&mut self) -> SceneResult<()> {
        for child in &mut self.children {
            child.initialize()?;
        }
        self.lifecycle.mark_initialized("lit content")
    }

    fn update(&mut self) -> SceneResult<()> {
        self.lifecycle.ensure_ready("lit content")?;
        self.children.iter_mut().try_for_each(|child| child.update())
    }

    fn reload_shaders(&mut self) -> SceneResult<()> {
        self.lifecycle.ensure_ready("lit content")?;
        let results: Vec<_> = self
            .children
            .iter_mut()
            .map(|child| child.reload_shaders())
            .collect();
        first_error(results)
    }

    fn draw(&mut self, framebuffer: &dyn Framebuffer, camera: &CameraViewport) -> SceneResult<()> {
        self.lifecycle.ensure_ready("lit content")?;
        self.children
            .iter_mut()
            .try_for_each(|child| child.draw(framebuffer, camera))
    }

    fn close(&mut self) {
        if self.lifecycle.close() {
            for child in &mut self.children {
                child.close();
            }
            self.children.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use std::sync::Arc;

    use glam::{Mat4, Vec3};
    use ibrelight_core::{PixelRect, ViewSetData};
    use ibrelight_gl::{
        wgpu, ColorFormat, Context, FramebufferSize, GlError, GlResult, RenderTargets, Texture,
    };

    use crate::lighting::LightingResources;
    use crate::scene_model::SceneModel;
    use crate::view_snap::ViewSnap;

    type CallLog = Rc<RefCell<Vec<&'static str>>>;

    #[derive(Default)]
    struct MockLighting {
        log: CallLog,
        depth_views: Rc<RefCell<Vec<Mat4>>>,
    }

    impl LightingResources for MockLighting {
        fn initialize(&mut self) -> SceneResult<()> {
            self.log.borrow_mut().push("lighting:initialize");
            Ok(())
        }

        fn reload_shaders(&mut self) -> SceneResult<()> {
            self.log.borrow_mut().push("lighting:reload");
            Err(SceneError::NotInitialized("depth program"))
        }

        fn refresh_shadow_maps(&mut self) -> SceneResult<()> {
            self.log.borrow_mut().push("shadow maps");
            Ok(())
        }

        fn refresh_screen_space_depth(&mut self, view: Mat4, _: Mat4) -> SceneResult<()> {
            self.log.borrow_mut().push("screen space depth");
            self.depth_views.borrow_mut().push(view);
            Ok(())
        }

        fn submit(&self) -> SceneResult<()> {
            self.log.borrow_mut().push("submit");
            Ok(())
        }

        fn light_projection(&self, _: usize) -> Mat4 {
            Mat4::IDENTITY
        }

        fn shadow_maps(&self) -> Option<&Texture> {
            None
        }

        fn screen_space_depth(&self) -> Option<&Texture> {
            None
        }

        fn environment_map(&self) -> Option<&Texture> {
            None
        }

        fn backplate_texture(&self) -> Option<&Texture> {
            None
        }

        fn close(&mut self) {
            self.log.borrow_mut().push("lighting:close");
        }
    }

    struct MockContent {
        log: CallLog,
        lifecycle: Lifecycle,
    }

    impl RenderedComponent for MockContent {
        fn initialize(&mut self) -> SceneResult<()> {
            self.log.borrow_mut().push("content:initialize");
            self.lifecycle.mark_initialized("mock content")
        }

        fn update(&mut self) -> SceneResult<()> {
            self.log.borrow_mut().push("content:update");
            Ok(())
        }

        fn reload_shaders(&mut self) -> SceneResult<()> {
            self.log.borrow_mut().push("content:reload");
            Ok(())
        }

        fn draw(&mut self, _: &dyn Framebuffer, _: &CameraViewport) -> SceneResult<()> {
            self.log.borrow_mut().push("content:draw");
            Ok(())
        }

        fn close(&mut self) {
            if self.lifecycle.close() {
                self.log.borrow_mut().push("content:close");
            }
        }
    }

    /// Records flushes; nothing reaches a device.
    struct MockFramebuffer {
        log: CallLog,
    }

    impl Framebuffer for MockFramebuffer {
        fn context(&self) -> &Context {
            unreachable!("mock framebuffer has no context")
        }

        fn size(&self) -> FramebufferSize {
            FramebufferSize::new(64, 64)
        }

        fn render_targets(&self) -> GlResult<RenderTargets> {
            Err(GlError::Configuration("mock framebuffer has no targets".into()))
        }

        fn readback_source(&self, _: usize) -> GlResult<(wgpu::Texture, ColorFormat)> {
            Err(GlError::Configuration("mock framebuffer has no attachments".into()))
        }

        fn color_attachment_count(&self) -> usize {
            0
        }

        fn flush(&self) -> GlResult<()> {
            self.log.borrow_mut().push("flush");
            Ok(())
        }
    }

    fn lit_root(log: &CallLog) -> LitRoot {
        lit_root_with(MockLighting {
            log: Rc::clone(log),
            ..MockLighting::default()
        })
    }

    fn lit_root_with(lighting: MockLighting) -> LitRoot {
        let log = Rc::clone(&lighting.log);
        let lighting: SharedLighting = Rc::new(RefCell::new(lighting));
        let mut root = LitRoot::new(lighting);
        root.set_content(Box::new(MockContent {
            log,
            lifecycle: Lifecycle::default(),
        }));
        root
    }

    fn camera() -> CameraViewport {
        CameraViewport::new(Mat4::IDENTITY, Mat4::IDENTITY, PixelRect::new(0, 0, 64, 64))
    }

    #[test]
    fn test_lighting_refresh_precedes_content() {
        let log = CallLog::default();
        let framebuffer = MockFramebuffer { log: Rc::clone(&log) };
        let mut root = lit_root(&log);
        root.initialize().unwrap();
        log.borrow_mut().clear();

        for _ in 0..2 {
            root.draw(&framebuffer, &camera()).unwrap();
        }

        assert_eq!(
            *log.borrow(),
            [
                "shadow maps",
                "screen space depth",
                "submit",
                "content:draw",
                "shadow maps",
                "screen space depth",
                "submit",
                "content:draw",
            ]
        );
    }

    #[test]
    fn test_subdivided_draw_refreshes_lighting_once() {
        let log = CallLog::default();
        let framebuffer = MockFramebuffer { log: Rc::clone(&log) };
        let mut root = lit_root(&log);
        root.initialize().unwrap();
        log.borrow_mut().clear();

        root.draw_in_subdivisions(&framebuffer, 32, 32, &camera()).unwrap();

        let mut expected = vec!["shadow maps", "screen space depth", "submit"];
        for _ in 0..4 {
            expected.extend(["content:draw", "flush"]);
        }
        assert_eq!(*log.borrow(), expected);
    }

    #[test]
    fn test_draw_before_initialize_fails() {
        let log = CallLog::default();
        let framebuffer = MockFramebuffer { log: Rc::clone(&log) };
        let mut root = lit_root(&log);
        let result = root.draw(&framebuffer, &camera());
        assert!(matches!(result, Err(SceneError::NotInitialized(_))));
        let result = root.draw_in_subdivisions(&framebuffer, 32, 32, &camera());
        assert!(matches!(result, Err(SceneError::NotInitialized(_))));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_snapped_root_renders_depth_from_snapped_view() {
        let log = CallLog::default();
        let framebuffer = MockFramebuffer { log: Rc::clone(&log) };
        let captured = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO, Vec3::Y);
        let requested = Mat4::look_at_rh(Vec3::new(0.5, 0.2, 4.0), Vec3::ZERO, Vec3::Y);
        let depth_views = Rc::new(RefCell::new(Vec::new()));
        let root = lit_root_with(MockLighting {
            log: Rc::clone(&log),
            depth_views: Rc::clone(&depth_views),
        });
        let mut snap = ViewSnap::new(
            Arc::new(ViewSetData::from_poses([captured])),
            SceneModel::default().into_shared(),
            Box::new(root),
        );
        snap.initialize().unwrap();

        let camera =
            CameraViewport::new(requested, Mat4::IDENTITY, PixelRect::new(0, 0, 64, 64));
        snap.draw_in_subdivisions(&framebuffer, 64, 64, &camera).unwrap();

        let depth_views = depth_views.borrow();
        assert_eq!(depth_views.len(), 1);
        assert!(depth_views[0].abs_diff_eq(captured, 1e-5));
    }

    #[test]
    fn test_initialize_covers_lighting_and_content() {
        let log = CallLog::default();
        let mut root = lit_root(&log);
        root.initialize().unwrap();
        assert_eq!(*log.borrow(), ["lighting:initialize", "content:initialize"]);
    }

    #[test]
    fn test_reload_continues_after_lighting_failure() {
        let log = CallLog::default();
        let mut root = lit_root(&log);
        root.initialize().unwrap();
        log.borrow_mut().clear();

        assert!(root.reload_shaders().is_err());
        assert_eq!(*log.borrow(), ["lighting:reload", "content:reload"]);
    }

    #[test]
    fn test_close_twice_releases_once() {
        let log = CallLog::default();
        let mut root = lit_root(&log);
        root.initialize().unwrap();
        let handle = root.lighting_handle().unwrap();
        log.borrow_mut().clear();

        root.close();
        root.close();
        drop(root);

        assert_eq!(*log.borrow(), ["content:close", "lighting:close"]);
        assert!(handle.upgrade().is_none());
    }

    #[test]
    fn test_lit_content_draws_children_in_order() {
        let log = CallLog::default();
        let mut content = LitContent::new();
        for _ in 0..2 {
            content.push(Box::new(MockContent {
                log: Rc::clone(&log),
                lifecycle: Lifecycle::default(),
            }));
        }
        assert_eq!(content.len(), 2);

        content.initialize().unwrap();
        content.update().unwrap();
        content.close();
        content.close();

        assert_eq!(
            *log.borrow(),
            [
                "content:initialize",
                "content:initialize",
                "content:update",
                "content:update",
                "content:close",
                "content:close",
            ]
        );
    }
}
