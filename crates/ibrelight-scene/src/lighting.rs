//! Shadow maps, screen-space depth and environment textures shared by lit content.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use glam::Mat4;
use ibrelight_core::RenderSettings;
use ibrelight_gl::{
    AttachmentSpec, Context, DepthPrecision, Drawable, Framebuffer, FramebufferObject,
    GraphicsResource, PrimitiveMode, RenderState, Texture, VertexBuffer,
};

use crate::error::{SceneError, SceneResult};
use crate::scene_model::SharedSceneModel;
use crate::shader_component::ProgramSpec;

/// Buffers a [`crate::LitRoot`] refreshes before its content draws.
pub trait LightingResources {
    fn initialize(&mut self) -> SceneResult<()>;

    /// Rebuilds internal programs, keeping the previous ones on failure.
    fn reload_shaders(&mut self) -> SceneResult<()>;

    /// Renders scene depth from every light into its shadow map layer.
    fn refresh_shadow_maps(&mut self) -> SceneResult<()>;

    /// Renders scene depth from the camera.
    fn refresh_screen_space_depth(&mut self, view: Mat4, projection: Mat4) -> SceneResult<()>;

    /// Submits the recorded refresh work.
    fn submit(&self) -> SceneResult<()>;

    /// Projection used to render and sample the shadow map of light `index`.
    fn light_projection(&self, index: usize) -> Mat4;

    fn shadow_maps(&self) -> Option<&Texture>;

    fn screen_space_depth(&self) -> Option<&Texture>;

    fn environment_map(&self) -> Option<&Texture>;

    fn backplate_texture(&self) -> Option<&Texture>;

    /// Releases owned resources. Safe to call more than once.
    fn close(&mut self);
}

/// Lighting resources owned by one lit root.
pub type SharedLighting = Rc<RefCell<dyn LightingResources>>;

/// Non-owning reference held by lit content.
pub type LightingHandle = Weak<RefCell<dyn LightingResources>>;

/// Runs `operation` under `state`, restoring the previous state afterwards.
fn with_render_state<T>(
    context: &Context,
    state: RenderState,
    operation: impl FnOnce() -> SceneResult<T>,
) -> SceneResult<T> {
    let previous = context.state();
    context.set_state(state);
    let result = operation();
    context.set_state(previous);
    result
}

/// Shadow-mapped lighting: one depth layer per light plus camera-space depth.
pub struct ShadowLightingResources {
    context: Context,
    scene: SharedSceneModel,
    depth_spec: ProgramSpec,
    shadow_map_resolution: u32,
    screen_space_depth_resolution: u32,
    depth_drawable: Option<Drawable>,
    shadow_maps: Option<Texture>,
    shadow_framebuffer: Option<FramebufferObject>,
    screen_space_depth: Option<FramebufferObject>,
    shadow_caster: Option<Rc<VertexBuffer>>,
    environment_map: Option<Texture>,
    backplate: Option<Texture>,
    initialized: bool,
}

impl std::fmt::Debug for ShadowLightingResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowLightingResources")
            .field("shadow_map_resolution", &self.shadow_map_resolution)
            .field(
                "shadow_map_layers",
                &self.shadow_maps.as_ref().map(Texture::layers),
            )
            .field("has_shadow_caster", &self.shadow_caster.is_some())
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl ShadowLightingResources {
    pub fn new(context: Context, scene: SharedSceneModel, settings: &RenderSettings) -> Self {
        Self {
            context,
            scene,
            depth_spec: ProgramSpec::from_file(settings.shader_path("common/depth.wgsl")),
            shadow_map_resolution: settings.shadow_map_resolution.max(1),
            screen_space_depth_resolution: settings.screen_space_depth_resolution.max(1),
            depth_drawable: None,
            shadow_maps: None,
            shadow_framebuffer: None,
            screen_space_depth: None,
            shadow_caster: None,
            environment_map: None,
            backplate: None,
            initialized: false,
        }
    }

    /// Shares the position buffer rendered into the depth buffers.
    pub fn set_shadow_caster(&mut self, positions: Rc<VertexBuffer>) -> SceneResult<()> {
        if let Some(drawable) = self.depth_drawable.as_mut() {
            drawable.add_vertex_buffer("position", &positions)?;
        }
        self.shadow_caster = Some(positions);
        Ok(())
    }

    /// Takes ownership of an environment map, closing the previous one.
    pub fn take_environment_map(&mut self, texture: Option<Texture>) {
        if let Some(mut previous) = std::mem::replace(&mut self.environment_map, texture) {
            previous.close();
        }
    }

    /// Takes ownership of a backplate texture, closing the previous one.
    pub fn take_backplate_texture(&mut self, texture: Option<Texture>) {
        if let Some(mut previous) = std::mem::replace(&mut self.backplate, texture) {
            previous.close();
        }
    }

    fn ensure_initialized(&self) -> SceneResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(SceneError::NotInitialized("lighting resources"))
        }
    }

    fn create_shadow_maps(&self, layers: u32) -> SceneResult<Texture> {
        let size = self.shadow_map_resolution;
        let texture = self
            .context
            .build_depth_texture_array(size, size, layers.max(1))
            .set_depth_precision(DepthPrecision::Float32)
            .create_texture()?;
        log::debug!("allocated {layers} shadow map layers at {size}x{size}");
        Ok(texture)
    }

    /// Reallocates the shadow map array when there are more lights than layers.
    fn ensure_shadow_capacity(&mut self, light_count: u32) -> SceneResult<()> {
        let layers = self.shadow_maps.as_ref().map_or(0, Texture::layers);
        if layers < light_count.max(1) {
            let replacement = self.create_shadow_maps(light_count)?;
            if let Some(mut previous) = self.shadow_maps.replace(replacement) {
                previous.close();
            }
        }
        Ok(())
    }

    fn depth_state() -> RenderState {
        RenderState {
            depth_test: true,
            depth_write: true,
            back_face_culling: false,
            alpha_blending: false,
        }
    }
}

impl LightingResources for ShadowLightingResources {
    fn initialize(&mut self) -> SceneResult<()> {
        let program = self.depth_spec.build(&self.context)?;
        let mut drawable = self.context.create_drawable(program)?;
        if let Some(caster) = &self.shadow_caster {
            drawable.add_vertex_buffer("position", caster)?;
        }

        let light_count = self.scene.borrow().light_count() as u32;
        let shadow_maps = self.create_shadow_maps(light_count)?;

        let size = self.shadow_map_resolution;
        let shadow_framebuffer = self
            .context
            .build_framebuffer_object(size, size)
            .add_depth_attachment(AttachmentSpec::depth(DepthPrecision::Float32))
            .create_framebuffer_object()?;

        let size = self.screen_space_depth_resolution;
        let screen_space_depth = self
            .context
            .build_framebuffer_object(size, size)
            .add_depth_attachment(
                AttachmentSpec::depth(DepthPrecision::Fixed16).with_linear_filtering(true),
            )
            .create_framebuffer_object()?;

        self.depth_drawable = Some(drawable);
        self.shadow_maps = Some(shadow_maps);
        self.shadow_framebuffer = Some(shadow_framebuffer);
        self.screen_space_depth = Some(screen_space_depth);
        self.initialized = true;
        Ok(())
    }

    fn reload_shaders(&mut self) -> SceneResult<()> {
        self.ensure_initialized()?;
        let program = match self.depth_spec.build(&self.context) {
            Ok(program) => program,
            Err(e) => {
                log::error!("failed to reload depth shaders, keeping previous program: {e}");
                return Err(e.into());
            }
        };
        let drawable = self
            .depth_drawable
            .as_mut()
            .ok_or(SceneError::Closed("lighting resources"))?;
        let mut previous = drawable.set_program(program)?;
        previous.close();
        Ok(())
    }

    fn refresh_shadow_maps(&mut self) -> SceneResult<()> {
        self.ensure_initialized()?;
        let scene = Rc::clone(&self.scene);
        let scene = scene.borrow();
        self.ensure_shadow_capacity(scene.light_count() as u32)?;

        let has_caster = self.shadow_caster.is_some();
        let (Some(drawable), Some(shadow_maps), Some(framebuffer)) = (
            self.depth_drawable.as_mut(),
            self.shadow_maps.as_ref(),
            self.shadow_framebuffer.as_mut(),
        ) else {
            return Err(SceneError::Closed("lighting resources"));
        };

        with_render_state(&self.context, Self::depth_state(), || {
            for index in 0..scene.light_count() {
                framebuffer.set_depth_attachment_layer(shadow_maps, index as u32)?;
                framebuffer.clear_depth_buffer()?;
                if !has_caster {
                    continue;
                }
                let program = drawable.program_mut();
                program.set_uniform("projection", scene.light_projection(index))?;
                program.set_uniform("model_view", scene.light_model_view(index))?;
                drawable.draw(PrimitiveMode::Triangles, &*framebuffer)?;
            }
            Ok(())
        })
    }

    fn refresh_screen_space_depth(&mut self, view: Mat4, projection: Mat4) -> SceneResult<()> {
        self.ensure_initialized()?;
        let model_view = self.scene.borrow().model_view(view);
        let has_caster = self.shadow_caster.is_some();
        let (Some(drawable), Some(framebuffer)) =
            (self.depth_drawable.as_mut(), self.screen_space_depth.as_ref())
        else {
            return Err(SceneError::Closed("lighting resources"));
        };

        with_render_state(&self.context, Self::depth_state(), || {
            framebuffer.clear_depth_buffer()?;
            if has_caster {
                let program = drawable.program_mut();
                program.set_uniform("projection", projection)?;
                program.set_uniform("model_view", model_view)?;
                drawable.draw(PrimitiveMode::Triangles, framebuffer)?;
            }
            Ok(())
        })
    }

    fn submit(&self) -> SceneResult<()> {
        self.context.flush()?;
        Ok(())
    }

    fn light_projection(&self, index: usize) -> Mat4 {
        self.scene.borrow().light_projection(index)
    }

    fn shadow_maps(&self) -> Option<&Texture> {
        self.shadow_maps.as_ref()
    }

    fn screen_space_depth(&self) -> Option<&Texture> {
        self.screen_space_depth
            .as_ref()
            .and_then(|framebuffer| framebuffer.depth_texture().ok().flatten())
    }

    fn environment_map(&self) -> Option<&Texture> {
        self.environment_map.as_ref()
    }

    fn backplate_texture(&self) -> Option<&Texture> {
        self.backplate.as_ref()
    }

    fn close(&mut self) {
        if let Some(mut drawable) = self.depth_drawable.take() {
            drawable.close();
        }
        for mut texture in [
            self.shadow_maps.take(),
            self.environment_map.take(),
            self.backplate.take(),
        ]
        .into_iter()
        .flatten()
        {
            texture.close();
        }
        for mut framebuffer in [self.shadow_framebuffer.take(), self.screen_space_depth.take()]
            .into_iter()
            .flatten()
        {
            framebuffer.close();
        }
        self.shadow_caster = None;
        if std::mem::take(&mut self.initialized) {
            log::debug!("closed lighting resources");
        }
    }
}

impl Drop for ShadowLightingResources {
    fn drop(&mut self) {
        self.close();
    }
}
