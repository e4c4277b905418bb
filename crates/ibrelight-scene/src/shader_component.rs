//! A component drawing one program over shared vertex buffers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ibrelight_core::CameraViewport;
use ibrelight_gl::{
    Context, DefineValue, Drawable, Framebuffer, GlResult, GraphicsResource, PrimitiveMode,
    Program, ShaderType, VertexBuffer,
};

use crate::component::{Lifecycle, RenderedComponent};
use crate::error::{SceneError, SceneResult};

/// Shader files and defines a program is built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramSpec {
    stages: Vec<(ShaderType, PathBuf)>,
    defines: BTreeMap<String, DefineValue>,
}

impl ProgramSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Vertex and fragment stages from one WGSL file holding both entry points.
    #[must_use]
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new()
            .with_stage(ShaderType::Vertex, path.clone())
            .with_stage(ShaderType::Fragment, path)
    }

    #[must_use]
    pub fn with_stage(mut self, stage: ShaderType, path: impl Into<PathBuf>) -> Self {
        self.stages.retain(|(existing, _)| *existing != stage);
        self.stages.push((stage, path.into()));
        self
    }

    #[must_use]
    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<DefineValue>) -> Self {
        self.set_define(name, value);
        self
    }

    /// Sets a define. Returns `true` when the value changed.
    pub fn set_define(&mut self, name: impl Into<String>, value: impl Into<DefineValue>) -> bool {
        let value = value.into();
        self.defines.insert(name.into(), value) != Some(value)
    }

    pub fn defines(&self) -> &BTreeMap<String, DefineValue> {
        &self.defines
    }

    /// Path of the source for `stage`, if any.
    pub fn stage_path(&self, stage: ShaderType) -> Option<&Path> {
        self.stages
            .iter()
            .find(|(existing, _)| *existing == stage)
            .map(|(_, path)| path.as_path())
    }

    /// Whether `program` was compiled with different define values.
    pub fn differs_from(&self, program: &Program) -> bool {
        self.defines
            .iter()
            .any(|(name, value)| program.define_value(name) != Some(*value))
    }

    /// Compiles and links a new program.
    pub fn build(&self, context: &Context) -> GlResult<Program> {
        let mut builder = context.shader_program_builder();
        for (stage, path) in &self.stages {
            builder = builder.add_shader_file(*stage, path.clone());
        }
        for (name, value) in &self.defines {
            builder = builder.define(name.clone(), *value);
        }
        builder.create_program()
    }
}

/// A program and its drawable, rebuilt from a [`ProgramSpec`] on reload.
///
/// Vertex buffers are shared with other components and reattached to every
/// rebuilt program. Drawing sets `model_view`, `projection` and
/// `full_projection` from the camera, then draws triangles.
pub struct ShaderComponent {
    context: Context,
    name: &'static str,
    spec: ProgramSpec,
    mode: PrimitiveMode,
    attributes: Vec<(String, Rc<VertexBuffer>)>,
    drawable: Option<Drawable>,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for ShaderComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderComponent")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl ShaderComponent {
    pub fn new(context: Context, name: &'static str, spec: ProgramSpec) -> Self {
        Self {
            context,
            name,
            spec,
            mode: PrimitiveMode::Triangles,
            attributes: Vec::new(),
            drawable: None,
            lifecycle: Lifecycle::default(),
        }
    }

    /// Sets the primitive mode used by [`RenderedComponent::draw`].
    #[must_use]
    pub fn with_mode(mut self, mode: PrimitiveMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn spec(&self) -> &ProgramSpec {
        &self.spec
    }

    /// Changes a define; takes effect on the next [`RenderedComponent::update`].
    pub fn set_define(&mut self, name: impl Into<String>, value: impl Into<DefineValue>) -> bool {
        self.spec.set_define(name, value)
    }

    /// Shares `buffer` as the source of attribute `name`.
    ///
    /// Returns `Ok(false)` when the current program has no such attribute.
    pub fn add_vertex_buffer(
        &mut self,
        name: impl Into<String>,
        buffer: Rc<VertexBuffer>,
    ) -> SceneResult<bool> {
        let name = name.into();
        let used = match self.drawable.as_mut() {
            Some(drawable) => drawable.add_vertex_buffer(&name, &buffer)?,
            None => true,
        };
        self.attributes.retain(|(existing, _)| *existing != name);
        self.attributes.push((name, buffer));
        Ok(used)
    }

    /// Whether the spec defines differ from the linked program.
    #[must_use]
    pub fn needs_reload(&self) -> bool {
        self.drawable
            .as_ref()
            .is_some_and(|drawable| self.spec.differs_from(drawable.program()))
    }

    pub fn drawable_mut(&mut self) -> SceneResult<&mut Drawable> {
        self.lifecycle.ensure_ready(self.name)?;
        self.drawable.as_mut().ok_or(SceneError::Closed(self.name))
    }

    pub fn program(&self) -> SceneResult<&Program> {
        self.lifecycle.ensure_ready(self.name)?;
        self.drawable
            .as_ref()
            .map(Drawable::program)
            .ok_or(SceneError::Closed(self.name))
    }

    pub fn program_mut(&mut self) -> SceneResult<&mut Program> {
        Ok(self.drawable_mut()?.program_mut())
    }

    /// Draws with the configured primitive mode into `camera.rect`.
    pub fn draw_primitives(
        &mut self,
        framebuffer: &dyn Framebuffer,
        camera: &CameraViewport,
    ) -> SceneResult<()> {
        let mode = self.mode;
        self.drawable_mut()?
            .draw_viewport(mode, framebuffer, camera.rect)?;
        Ok(())
    }
}

impl RenderedComponent for ShaderComponent {
    fn initialize(&mut self) -> SceneResult<()> {
        let program = self.spec.build(&self.context)?;
        let mut drawable = self.context.create_drawable(program)?;
        for (name, buffer) in &self.attributes {
            drawable.add_vertex_buffer(name, buffer)?;
        }
        self.drawable = Some(drawable);
        self.lifecycle.mark_initialized(self.name)
    }

    fn update(&mut self) -> SceneResult<()> {
        if self.lifecycle.is_initialized() && self.needs_reload() {
            log::debug!("{} defines changed, reloading shaders", self.name);
            self.reload_shaders()?;
        }
        Ok(())
    }

    fn reload_shaders(&mut self) -> SceneResult<()> {
        self.lifecycle.ensure_ready(self.name)?;
        let program = match self.spec.build(&self.context) {
            Ok(program) => program,
            Err(e) => {
                log::error!("failed to reload {} shaders, keeping previous program: {e}", self.name);
                return Err(e.into());
            }
        };
        let drawable = self.drawable.as_mut().ok_or(SceneError::Closed(self.name))?;
        let mut previous = drawable.set_program(program)?;
        previous.close();
        Ok(())
    }

    fn draw(&mut self, framebuffer: &dyn Framebuffer, camera: &CameraViewport) -> SceneResult<()> {
        let program = self.program_mut()?;
        program.set_uniform("model_view", camera.view)?;
        program.set_uniform("projection", camera.viewport_projection())?;
        program.set_uniform("full_projection", camera.full_projection)?;
        self.draw_primitives(framebuffer, camera)
    }

    fn close(&mut self) {
        if self.lifecycle.close() {
            if let Some(mut drawable) = self.drawable.take() {
                drawable.close();
            }
            self.attributes.clear();
            log::debug!("closed {}", self.name);
        }
    }
}
