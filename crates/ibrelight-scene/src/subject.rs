//! The relit subject: the default content of a lit root.

use glam::Vec4;
use ibrelight_core::matrix::VIEW_INVERSE_TOLERANCE;
use ibrelight_core::{quick_inverse, view_position, CameraViewport, RenderSettings};
use ibrelight_gl::{ColorFormat, Context, Framebuffer, GraphicsResource, Texture};

use crate::component::{Lifecycle, RenderedComponent};
use crate::error::{SceneError, SceneResult};
use crate::lighting::LightingHandle;
use crate::scene_model::{SharedSceneModel, SubjectGeometry, MAX_VIRTUAL_LIGHTS};
use crate::shader_component::{ProgramSpec, ShaderComponent};

const SUBJECT: &str = "IBR subject";

/// Reach of the screen-space occlusion march, relative to the subject size.
const OCCLUSION_DISTANCE_SCALE: f32 = 0.1;

fn program_spec(settings: &RenderSettings) -> ProgramSpec {
    ProgramSpec::from_file(settings.shader_path("common/subject.wgsl"))
        .with_define("SHADOWS_ENABLED", settings.shadows_enabled)
        .with_define("RELIGHTING_ENABLED", settings.relighting_enabled)
}

/// Draws the subject mesh lit by the scene lights, sampling the shadow maps,
/// screen-space depth and environment map of the enclosing lit root.
pub struct IbrSubject {
    shader: ShaderComponent,
    lighting: LightingHandle,
    scene: SharedSceneModel,
    settings: RenderSettings,
    /// Black cubemap bound while the lighting has no environment map.
    blank_environment: Option<Texture>,
}

impl std::fmt::Debug for IbrSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IbrSubject")
            .field("shader", &self.shader)
            .field("lighting_alive", &(self.lighting.strong_count() > 0))
            .finish_non_exhaustive()
    }
}

impl IbrSubject {
    pub fn new(
        context: Context,
        scene: SharedSceneModel,
        lighting: LightingHandle,
        geometry: &SubjectGeometry,
        settings: &RenderSettings,
    ) -> SceneResult<Self> {
        let mut shader = ShaderComponent::new(context, SUBJECT, program_spec(settings));
        for (name, buffer) in geometry.attributes() {
            shader.add_vertex_buffer(name, buffer)?;
        }
        Ok(Self {
            shader,
            lighting,
            scene,
            settings: settings.clone(),
            blank_environment: None,
        })
    }

    /// Applies new settings; shader defines change on the next update.
    pub fn set_settings(&mut self, settings: &RenderSettings) {
        self.shader
            .set_define("SHADOWS_ENABLED", settings.shadows_enabled);
        self.shader
            .set_define("RELIGHTING_ENABLED", settings.relighting_enabled);
        self.settings = settings.clone();
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.shader.lifecycle()
    }

    #[must_use]
    pub fn shader(&self) -> &ShaderComponent {
        &self.shader
    }

    fn set_uniforms(&mut self, camera: &CameraViewport) -> SceneResult<()> {
        let lighting = self
            .lighting
            .upgrade()
            .ok_or(SceneError::Closed("lighting resources"))?;
        let lighting = lighting.borrow();
        let scene = self.scene.borrow();
        let model_view = scene.model_view(camera.view);
        let light_count = scene.light_count().min(MAX_VIRTUAL_LIGHTS);

        let program = self.shader.program_mut()?;
        program.set_uniform("model_view", model_view)?;
        program.set_uniform("view_pos", view_position(model_view)?)?;
        program.set_uniform("projection", camera.viewport_projection())?;
        program.set_uniform("full_projection", camera.full_projection)?;
        program.set_uniform("default_diffuse_color", scene.default_diffuse_color)?;
        program.set_uniform("ambient_color", scene.ambient_color)?;
        program.set_uniform("gamma", self.settings.gamma)?;
        program.set_uniform("occlusion_bias", self.settings.occlusion_bias)?;
        program.set_uniform("light_count", light_count as u32)?;

        for (index, light) in scene.lights.iter().take(light_count).enumerate() {
            let light_model_view = scene.light_model_view(index);
            let light_to_object = quick_inverse(light_model_view, VIEW_INVERSE_TOLERANCE)?;
            program.set_uniform(&format!("light_pos[{index}]"), light_to_object.w_axis)?;
            program.set_uniform(
                &format!("light_intensity[{index}]"),
                light.color.extend(1.0),
            )?;
            program.set_uniform(
                &format!("light_spot[{index}]"),
                Vec4::new(light.spot_size.cos(), light.spot_taper, 0.0, 0.0),
            )?;
            program.set_uniform(
                &format!("light_matrix[{index}]"),
                lighting.light_projection(index) * light_model_view,
            )?;
        }

        if let Some(shadow_maps) = lighting.shadow_maps() {
            program.set_texture("shadow_maps", shadow_maps)?;
        }
        if let Some(depth) = lighting.screen_space_depth() {
            program.set_texture("screen_space_depth", depth)?;
        }

        let loaded = lighting.environment_map();
        let environment = loaded
            .or(self.blank_environment.as_ref())
            .ok_or(SceneError::NotInitialized(SUBJECT))?;
        program.set_uniform("environment_enabled", loaded.is_some())?;
        program.set_uniform("environment_matrix", scene.environment_matrix())?;
        program.set_uniform(
            "environment_mip_level",
            environment.mip_level_count().saturating_sub(1) as f32,
        )?;
        program.set_uniform("occlusion_distance", OCCLUSION_DISTANCE_SCALE * scene.scale)?;
        program.set_texture("environment_map", environment)?;
        Ok(())
    }
}

impl RenderedComponent for IbrSubject {
    fn initialize(&mut self) -> SceneResult<()> {
        self.shader.initialize()?;
        let blank = self
            .shader
            .context()
            .build_color_cubemap(1)
            .set_internal_format(ColorFormat::RGBA8)
            .create_texture()?;
        if let Some(mut previous) = self.blank_environment.replace(blank) {
            previous.close();
        }
        Ok(())
    }

    fn update(&mut self) -> SceneResult<()> {
        self.shader.update()
    }

    fn reload_shaders(&mut self) -> SceneResult<()> {
        self.shader.reload_shaders()
    }

    /// Draws with back-face culling disabled, restoring the previous state after.
    fn draw(&mut self, framebuffer: &dyn Framebuffer, camera: &CameraViewport) -> SceneResult<()> {
        self.shader.lifecycle().ensure_ready(SUBJECT)?;
        self.set_uniforms(camera)?;

        let context = self.shader.context().clone();
        let previous = context.state();
        context.disable_back_face_culling();
        let result = self.shader.draw_primitives(framebuffer, camera);
        context.set_state(previous);
        result
    }

    fn close(&mut self) {
        self.shader.close();
        if let Some(mut blank) = self.blank_environment.take() {
            blank.close();
        }
    }
}
