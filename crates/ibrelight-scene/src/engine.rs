//! The project rendering engine: lit subject, camera widgets and the light
//! calibration split, drawn in tiles into an offscreen target.

use std::cell::RefCell;
use std::path::Path;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use glam::{Mat4, Vec4};
use ibrelight_core::{CameraViewport, RenderSettings, SplitLayout, ViewProjection, ViewSet};
use ibrelight_gl::{
    AttachmentSpec, ColorFormat, ColorReadback, Context, DepthPrecision, Framebuffer,
    FramebufferObject, FramebufferSize, GraphicsResource, ImageFileFormat, Texture,
};

use crate::camera_widget_group::CameraWidgetGroup;
use crate::component::{Lifecycle, RenderedComponent};
use crate::error::{SceneError, SceneResult};
use crate::lighting::{SharedLighting, ShadowLightingResources};
use crate::lit_root::{first_error, LitContent, LitRoot};
use crate::scene_model::{SharedSceneModel, SubjectGeometry};
use crate::split_screen::{SharedComponent, SplitScreenComponent};
use crate::subject::IbrSubject;
use crate::view_snap::{SnapIndex, ViewSnap};

const ENGINE: &str = "rendering engine";

/// Sample count of the offscreen target when multisampling is enabled.
const MULTISAMPLES: u32 = 4;

const DEFAULT_BACKGROUND: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

/// The main lit root, or a split between it and the calibration view.
///
/// The calibration half snaps to the nearest captured pose before its own lit
/// root refreshes, so each half's screen-space depth matches the view it draws.
struct FrameContent {
    main: SharedComponent,
    calibration: SharedComponent,
    split: Option<SplitScreenComponent>,
}

impl FrameContent {
    fn set_calibration_mode(&mut self, enabled: bool) -> SceneResult<()> {
        match (enabled, self.split.is_some()) {
            (true, false) => {
                let mut split =
                    SplitScreenComponent::new(SplitLayout::default(), &self.main, &self.calibration);
                split.initialize()?;
                self.split = Some(split);
            }
            (false, true) => {
                if let Some(mut split) = self.split.take() {
                    split.close();
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl RenderedComponent for FrameContent {
    fn initialize(&mut self) -> SceneResult<()> {
        self.main.initialize()?;
        self.calibration.initialize()?;
        if let Some(split) = self.split.as_mut() {
            split.initialize()?;
        }
        Ok(())
    }

    fn update(&mut self) -> SceneResult<()> {
        self.main.update()?;
        self.calibration.update()
    }

    fn reload_shaders(&mut self) -> SceneResult<()> {
        let main = self.main.reload_shaders();
        let calibration = self.calibration.reload_shaders();
        first_error([main, calibration])
    }

    fn draw(&mut self, framebuffer: &dyn Framebuffer, camera: &CameraViewport) -> SceneResult<()> {
        match self.split.as_mut() {
            Some(split) => split.draw(framebuffer, camera),
            None => self.main.draw(framebuffer, camera),
        }
    }

    fn draw_in_subdivisions(
        &mut self,
        framebuffer: &dyn Framebuffer,
        tile_width: u32,
        tile_height: u32,
        camera: &CameraViewport,
    ) -> SceneResult<()> {
        match self.split.as_mut() {
            Some(split) => split.draw_in_subdivisions(framebuffer, tile_width, tile_height, camera),
            None => self
                .main
                .draw_in_subdivisions(framebuffer, tile_width, tile_height, camera),
        }
    }

    fn close(&mut self) {
        if let Some(mut split) = self.split.take() {
            split.close();
        }
        self.main.close();
        self.calibration.close();
    }
}

/// Shadow-mapped lighting casting shadows from the subject positions.
fn shadow_lighting(
    context: &Context,
    scene: &SharedSceneModel,
    geometry: &SubjectGeometry,
    settings: &RenderSettings,
) -> SceneResult<Rc<RefCell<ShadowLightingResources>>> {
    let mut shadows = ShadowLightingResources::new(context.clone(), Rc::clone(scene), settings);
    shadows.set_shadow_caster(Rc::clone(&geometry.position))?;
    Ok(Rc::new(RefCell::new(shadows)))
}

/// Frame size after applying the half-resolution setting.
fn target_size(size: FramebufferSize, settings: &RenderSettings) -> FramebufferSize {
    if settings.half_resolution_enabled {
        FramebufferSize::new((size.width / 2).max(1), (size.height / 2).max(1))
    } else {
        FramebufferSize::new(size.width.max(1), size.height.max(1))
    }
}

/// Camera used before the first [`ProjectRenderingEngine::set_camera`]: the
/// first captured pose, or a default perspective looking down -Z.
fn initial_camera(views: &dyn ViewSet) -> (Mat4, Mat4) {
    if views.camera_pose_count() > 0 {
        (views.camera_pose(0), views.camera_projection(0).to_matrix())
    } else {
        (
            Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -2.0)),
            ViewProjection::default().to_matrix(),
        )
    }
}

/// Renders one project into an offscreen framebuffer.
///
/// The frame holds an RGBA8 color attachment, an R8UI object-id attachment
/// and a 24-bit depth buffer. Every frame is drawn in subdivisions of the
/// configured tile size.
pub struct ProjectRenderingEngine {
    context: Context,
    settings: RenderSettings,
    scene: SharedSceneModel,
    views: Arc<dyn ViewSet>,
    content: FrameContent,
    lighting: Weak<RefCell<ShadowLightingResources>>,
    subject: Rc<RefCell<IbrSubject>>,
    calibration_subject: Rc<RefCell<IbrSubject>>,
    widgets: Rc<RefCell<CameraWidgetGroup>>,
    snap_index: SnapIndex,
    framebuffer: Option<FramebufferObject>,
    requested_size: FramebufferSize,
    view: Mat4,
    projection: Mat4,
    background: Vec4,
    last_draw_error: Option<String>,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for ProjectRenderingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectRenderingEngine")
            .field("views", &self.views.camera_pose_count())
            .field("size", &self.requested_size)
            .field("calibration", &self.settings.light_calibration_mode)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl ProjectRenderingEngine {
    /// Assembles the render graph. Nothing touches the GPU until [`Self::initialize`].
    pub fn new(
        context: Context,
        views: Arc<dyn ViewSet>,
        scene: SharedSceneModel,
        geometry: &SubjectGeometry,
        settings: RenderSettings,
        size: FramebufferSize,
    ) -> SceneResult<Self> {
        let shadows = shadow_lighting(&context, &scene, geometry, &settings)?;
        let lighting_weak = Rc::downgrade(&shadows);
        let lighting: SharedLighting = shadows;
        let subject = Rc::new(RefCell::new(IbrSubject::new(
            context.clone(),
            Rc::clone(&scene),
            Rc::downgrade(&lighting),
            geometry,
            &settings,
        )?));

        let calibration_lighting: SharedLighting =
            shadow_lighting(&context, &scene, geometry, &settings)?;
        let calibration_subject = Rc::new(RefCell::new(IbrSubject::new(
            context.clone(),
            Rc::clone(&scene),
            Rc::downgrade(&calibration_lighting),
            geometry,
            &settings,
        )?));
        let mut calibration_root = LitRoot::new(calibration_lighting);
        calibration_root.set_content(Box::new(Rc::clone(&calibration_subject)));

        let snap = ViewSnap::new(
            Arc::clone(&views),
            Rc::clone(&scene),
            Box::new(calibration_root),
        );
        let snap_index = snap.snap_index();
        let widgets = Rc::new(RefCell::new(
            CameraWidgetGroup::new(context.clone(), Arc::clone(&views), Rc::clone(&scene), &settings)
                .with_snap_index(snap_index.clone()),
        ));

        let mut main_root = LitRoot::new(lighting);
        main_root.set_content(Box::new(
            LitContent::new()
                .with_child(Box::new(Rc::clone(&subject)))
                .with_child(Box::new(Rc::clone(&widgets))),
        ));
        let content = FrameContent {
            main: Rc::new(RefCell::new(main_root)),
            calibration: Rc::new(RefCell::new(snap)),
            split: None,
        };

        let (view, projection) = initial_camera(views.as_ref());
        Ok(Self {
            context,
            settings,
            scene,
            views,
            content,
            lighting: lighting_weak,
            subject,
            calibration_subject,
            widgets,
            snap_index,
            framebuffer: None,
            requested_size: size,
            view,
            projection,
            background: DEFAULT_BACKGROUND,
            last_draw_error: None,
            lifecycle: Lifecycle::default(),
        })
    }

    /// Compiles programs, allocates lighting buffers and the offscreen frame.
    pub fn initialize(&mut self) -> SceneResult<()> {
        self.content.initialize()?;
        self.content
            .set_calibration_mode(self.settings.light_calibration_mode)?;
        self.framebuffer = Some(self.create_framebuffer()?);
        self.lifecycle.mark_initialized(ENGINE)?;
        log::info!(
            "rendering engine ready: {} views, {}x{} frame",
            self.views.camera_pose_count(),
            self.requested_size.width,
            self.requested_size.height
        );
        Ok(())
    }

    fn create_framebuffer(&self) -> SceneResult<FramebufferObject> {
        let size = target_size(self.requested_size, &self.settings);
        let samples = if self.settings.multisampling_enabled {
            MULTISAMPLES
        } else {
            1
        };
        let mut builder = self
            .context
            .build_framebuffer_object(size.width, size.height)
            .add_color_attachment(
                AttachmentSpec::color(ColorFormat::RGBA8)
                    .with_multisamples(samples)
                    .with_linear_filtering(true),
            );
        // Integer targets cannot be resolved, so multisampled frames have no id attachment.
        if samples == 1 {
            builder = builder.add_color_attachment(AttachmentSpec::color(ColorFormat::R8UI));
        }
        let framebuffer = builder
            .add_depth_attachment(
                AttachmentSpec::depth(DepthPrecision::Fixed24).with_multisamples(samples),
            )
            .create_framebuffer_object()?;
        Ok(framebuffer)
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    #[must_use]
    pub fn scene(&self) -> &SharedSceneModel {
        &self.scene
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Index of the view the calibration half last snapped to.
    #[must_use]
    pub fn snap_index(&self) -> SnapIndex {
        self.snap_index.clone()
    }

    /// The offscreen frame, once initialized.
    #[must_use]
    pub fn framebuffer(&self) -> Option<&FramebufferObject> {
        self.framebuffer.as_ref()
    }

    /// Message of the draw error currently being suppressed, if any.
    #[must_use]
    pub fn last_draw_error(&self) -> Option<&str> {
        self.last_draw_error.as_deref()
    }

    pub fn set_camera(&mut self, view: Mat4, projection: Mat4) {
        self.view = view;
        self.projection = projection;
    }

    pub fn set_background_color(&mut self, color: Vec4) {
        self.background = color;
    }

    /// Hands an environment map to the main view's lighting, closing the previous one.
    pub fn set_environment_map(&mut self, texture: Option<Texture>) -> SceneResult<()> {
        self.shadow_lighting()?
            .borrow_mut()
            .take_environment_map(texture);
        Ok(())
    }

    /// Hands a backplate texture to the main view's lighting, closing the previous one.
    pub fn set_backplate_texture(&mut self, texture: Option<Texture>) -> SceneResult<()> {
        self.shadow_lighting()?
            .borrow_mut()
            .take_backplate_texture(texture);
        Ok(())
    }

    fn shadow_lighting(&self) -> SceneResult<Rc<RefCell<ShadowLightingResources>>> {
        self.lighting
            .upgrade()
            .ok_or(SceneError::Closed("lighting resources"))
    }

    /// Applies new settings. Shader changes land on the next [`Self::update`];
    /// target size and sampling changes reallocate the frame immediately.
    pub fn set_settings(&mut self, settings: RenderSettings) -> SceneResult<()> {
        self.subject.borrow_mut().set_settings(&settings);
        self.calibration_subject.borrow_mut().set_settings(&settings);
        self.widgets
            .borrow_mut()
            .set_visible(settings.visible_camera_poses);

        let reallocate = settings.half_resolution_enabled != self.settings.half_resolution_enabled
            || settings.multisampling_enabled != self.settings.multisampling_enabled;
        let calibration = settings.light_calibration_mode;
        self.settings = settings;

        if self.lifecycle.is_initialized() {
            self.content.set_calibration_mode(calibration)?;
            if reallocate {
                self.replace_framebuffer()?;
            }
        }
        Ok(())
    }

    /// Resizes the offscreen frame.
    pub fn resize(&mut self, size: FramebufferSize) -> SceneResult<()> {
        if size == self.requested_size {
            return Ok(());
        }
        self.requested_size = size;
        if self.lifecycle.is_initialized() {
            self.replace_framebuffer()?;
        }
        Ok(())
    }

    fn replace_framebuffer(&mut self) -> SceneResult<()> {
        let framebuffer = self.create_framebuffer()?;
        if let Some(mut previous) = self.framebuffer.replace(framebuffer) {
            previous.close();
        }
        Ok(())
    }

    /// Rebuilds programs whose defines changed since the last frame.
    pub fn update(&mut self) -> SceneResult<()> {
        self.lifecycle.ensure_ready(ENGINE)?;
        self.content.update()
    }

    /// Recompiles every program from source, keeping the old ones on failure.
    pub fn reload_shaders(&mut self) -> SceneResult<()> {
        self.lifecycle.ensure_ready(ENGINE)?;
        let result = self.content.reload_shaders();
        if result.is_ok() {
            log::info!("reloaded shaders");
        }
        result
    }

    /// Clears the frame and draws the graph in subdivisions.
    ///
    /// Draw failures are logged once and then suppressed until a frame
    /// succeeds again; they are still returned to the caller.
    pub fn render_frame(&mut self) -> SceneResult<()> {
        self.lifecycle.ensure_ready(ENGINE)?;
        let framebuffer = self
            .framebuffer
            .as_ref()
            .ok_or(SceneError::NotInitialized(ENGINE))?;

        let result = Self::clear_frame(framebuffer, self.background).and_then(|()| {
            let camera =
                CameraViewport::new(self.view, self.projection, framebuffer.size().full_rect());
            self.content.draw_in_subdivisions(
                framebuffer,
                self.settings.subdivision_width,
                self.settings.subdivision_height,
                &camera,
            )?;
            framebuffer.flush()?;
            Ok(())
        });

        match result {
            Ok(()) => {
                if self.last_draw_error.take().is_some() {
                    log::info!("drawing recovered");
                }
                Ok(())
            }
            Err(error) => {
                if self.last_draw_error.is_none() {
                    log::error!("failed to draw frame: {error}");
                }
                self.last_draw_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    fn clear_frame(framebuffer: &FramebufferObject, background: Vec4) -> SceneResult<()> {
        framebuffer.clear_color_buffer(0, background.to_array())?;
        if framebuffer.color_attachment_count() > 1 {
            framebuffer.clear_integer_color_buffer(1, [0; 4])?;
        }
        framebuffer.clear_depth_buffer()?;
        Ok(())
    }

    /// Reads back the color attachment of the last frame.
    pub fn read_frame(&self) -> SceneResult<ColorReadback> {
        let framebuffer = self
            .framebuffer
            .as_ref()
            .ok_or(SceneError::NotInitialized(ENGINE))?;
        Ok(framebuffer.read_color_buffer(0)?)
    }

    /// Saves the color attachment of the last frame.
    pub fn save_frame(&self, format: ImageFileFormat, path: &Path) -> SceneResult<()> {
        let framebuffer = self
            .framebuffer
            .as_ref()
            .ok_or(SceneError::NotInitialized(ENGINE))?;
        framebuffer.save_to_file(0, format, path)?;
        Ok(())
    }

    /// Closes the graph and the offscreen frame. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.lifecycle.close() {
            return;
        }
        self.content.close();
        if let Some(mut framebuffer) = self.framebuffer.take() {
            framebuffer.close();
        }
        log::debug!("closed rendering engine");
    }
}

impl Drop for ProjectRenderingEngine {
    fn drop(&mut self) {
        self.close();
    }
}
