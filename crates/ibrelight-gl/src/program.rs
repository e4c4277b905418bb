//! Shader programs: building, compiling, linking and uniform state.
//!
//! Stage sources are WGSL. [`ProgramBuilder::define`] injects `const`
//! declarations ahead of every stage. Compilation is checked with naga before
//! anything reaches the device, so compile and link failures come back with a
//! readable log instead of a device error.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{IVec2, IVec3, IVec4, Mat3, Mat4, UVec2, UVec3, UVec4, Vec2, Vec3, Vec4};
use ibrelight_core::ResourceManager;

use crate::buffer::{record_upload, uniform_size, UniformBuffer};
use crate::context::Context;
use crate::error::{GlError, GlResult};
use crate::reflect::{
    self, ProgramInterface, ScalarType, UniformType, TEXTURE_GROUP, UNIFORM_BUFFER_GROUP,
    UNIFORM_GROUP,
};
use crate::resource::GraphicsResource;
use crate::texture::{SamplerKind, Texture, TextureShape};

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// Shader pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Vertex,
    Fragment,
    Geometry,
    TessControl,
    TessEvaluation,
    Compute,
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Geometry => "geometry",
            Self::TessControl => "tessellation control",
            Self::TessEvaluation => "tessellation evaluation",
            Self::Compute => "compute",
        })
    }
}

impl ShaderType {
    fn naga_stage(self) -> Option<naga::ShaderStage> {
        match self {
            Self::Vertex => Some(naga::ShaderStage::Vertex),
            Self::Fragment => Some(naga::ShaderStage::Fragment),
            _ => None,
        }
    }
}

/// Value of a compile-time define.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefineValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
}

impl DefineValue {
    fn declaration(&self, name: &str) -> String {
        match self {
            Self::Bool(v) => format!("const {name}: bool = {v};"),
            Self::Int(v) => format!("const {name}: i32 = {v};"),
            Self::UInt(v) => format!("const {name}: u32 = {v}u;"),
            Self::Float(v) => format!("const {name}: f32 = {v:?};"),
        }
    }
}

impl From<bool> for DefineValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for DefineValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for DefineValue {
    fn from(value: u32) -> Self {
        Self::UInt(value)
    }
}

impl From<f32> for DefineValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ShaderSource {
    File(PathBuf),
    Code(String),
}

/// Everything needed to rebuild a program from scratch.
#[derive(Debug, Clone, Default, PartialEq)]
struct ProgramRecipe {
    stages: Vec<(ShaderType, ShaderSource)>,
    defines: BTreeMap<String, DefineValue>,
}

impl ProgramRecipe {
    /// Loads one stage and prepends the defines.
    fn compose(&self, source: &ShaderSource) -> GlResult<String> {
        let code = match source {
            ShaderSource::Code(code) => Cow::Borrowed(code.as_str()),
            ShaderSource::File(path) => Cow::Owned(read_shader_file(path)?),
        };
        let mut composed = String::with_capacity(code.len() + 64 * self.defines.len());
        for (name, value) in &self.defines {
            composed.push_str(&value.declaration(name));
            composed.push('\n');
        }
        composed.push_str(&code);
        Ok(composed)
    }
}

fn read_shader_file(path: &Path) -> GlResult<String> {
    match std::fs::read_to_string(path) {
        Ok(code) => Ok(code),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(GlError::ShaderFileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Parses and validates one stage.
fn compile_stage(stage: ShaderType, source: &str) -> GlResult<naga::Module> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| GlError::ShaderCompile {
        stage,
        log: e.emit_to_string(source),
    })?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| GlError::ShaderCompile {
        stage,
        log: e.emit_to_string(source),
    })?;
    Ok(module)
}

fn link_error(log: impl Into<String>) -> GlError {
    let log = log.into();
    log::warn!("program failed to link:\n{log}");
    GlError::ProgramLink { log }
}

/// Configures a [`Program`].
#[derive(Debug)]
pub struct ProgramBuilder {
    context: Context,
    recipe: ProgramRecipe,
}

impl ProgramBuilder {
    pub(crate) fn new(context: Context) -> Self {
        Self {
            context,
            recipe: ProgramRecipe::default(),
        }
    }

    #[must_use]
    pub fn add_shader_file(mut self, stage: ShaderType, path: impl Into<PathBuf>) -> Self {
        self.recipe
            .stages
            .push((stage, ShaderSource::File(path.into())));
        self
    }

    #[must_use]
    pub fn add_shader_source(mut self, stage: ShaderType, code: impl Into<String>) -> Self {
        self.recipe
            .stages
            .push((stage, ShaderSource::Code(code.into())));
        self
    }

    /// Declares `const NAME = value;` ahead of every stage.
    #[must_use]
    pub fn define(mut self, name: impl Into<String>, value: impl Into<DefineValue>) -> Self {
        self.recipe.defines.insert(name.into(), value.into());
        self
    }

    /// Compiles and links the stages.
    pub fn create_program(self) -> GlResult<Program> {
        self.context.ensure_current()?;
        Program::build(self.context, self.recipe)
    }
}

/// A value assignable to a named uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    IVec2(IVec2),
    IVec3(IVec3),
    IVec4(IVec4),
    UVec2(UVec2),
    UVec3(UVec3),
    UVec4(UVec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

macro_rules! uniform_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for UniformValue {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

uniform_from!(
    bool => Bool, i32 => Int, u32 => UInt, f32 => Float,
    Vec2 => Vec2, Vec3 => Vec3, Vec4 => Vec4,
    IVec2 => IVec2, IVec3 => IVec3, IVec4 => IVec4,
    UVec2 => UVec2, UVec3 => UVec3, UVec4 => UVec4,
    Mat3 => Mat3, Mat4 => Mat4,
);

impl UniformValue {
    /// Bytes in uniform layout, if the value fits a uniform of type `ty`.
    fn encode(&self, ty: UniformType) -> Option<Vec<u8>> {
        use ScalarType::{Float, Sint, Uint};
        Some(match (*self, ty) {
            (Self::Bool(v), UniformType::Scalar(Uint | Sint)) => u32::from(v).to_le_bytes().to_vec(),
            (Self::Int(v), UniformType::Scalar(Sint)) => v.to_le_bytes().to_vec(),
            (Self::UInt(v), UniformType::Scalar(Uint)) => v.to_le_bytes().to_vec(),
            (Self::Float(v), UniformType::Scalar(Float)) => v.to_le_bytes().to_vec(),
            (Self::Vec2(v), UniformType::Vector(Float, 2)) => pod_bytes(&v.to_array()),
            (Self::Vec3(v), UniformType::Vector(Float, 3)) => pod_bytes(&v.to_array()),
            (Self::Vec4(v), UniformType::Vector(Float, 4)) => pod_bytes(&v.to_array()),
            (Self::IVec2(v), UniformType::Vector(Sint, 2)) => pod_bytes(&v.to_array()),
            (Self::IVec3(v), UniformType::Vector(Sint, 3)) => pod_bytes(&v.to_array()),
            (Self::IVec4(v), UniformType::Vector(Sint, 4)) => pod_bytes(&v.to_array()),
            (Self::UVec2(v), UniformType::Vector(Uint, 2)) => pod_bytes(&v.to_array()),
            (Self::UVec3(v), UniformType::Vector(Uint, 3)) => pod_bytes(&v.to_array()),
            (Self::UVec4(v), UniformType::Vector(Uint, 4)) => pod_bytes(&v.to_array()),
            (Self::Mat3(m), UniformType::Matrix { columns: 3, rows: 3 }) => {
                let mut out = Vec::with_capacity(48);
                for column in [m.x_axis, m.y_axis, m.z_axis] {
                    out.extend(pod_bytes(&column.extend(0.0).to_array()));
                }
                out
            }
            (Self::Mat4(m), UniformType::Matrix { columns: 4, rows: 4 }) => {
                pod_bytes(&m.to_cols_array())
            }
            _ => return None,
        })
    }
}

fn pod_bytes<T: bytemuck::Pod>(values: &[T]) -> Vec<u8> {
    bytemuck::cast_slice::<T, u8>(values).to_vec()
}

/// A texture as bound to one program slot.
#[derive(Debug, Clone)]
struct BoundTexture {
    view: wgpu::TextureView,
    sampler: Option<wgpu::Sampler>,
}

struct UniformStorage {
    data: Vec<u8>,
    buffer: wgpu::Buffer,
    dirty: bool,
}

struct ProgramInner {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    interface: ProgramInterface,
    bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    blocks: Vec<UniformStorage>,
    textures: ResourceManager<String, BoundTexture>,
    uniform_buffers: ResourceManager<String, wgpu::Buffer>,
}

/// A linked shader program with its uniform state.
pub struct Program {
    context: Context,
    id: u64,
    recipe: ProgramRecipe,
    inner: Option<ProgramInner>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("id", &self.id)
            .field("linked", &self.inner.is_some())
            .field("defines", &self.recipe.defines)
            .finish_non_exhaustive()
    }
}

impl Program {
    fn build(context: Context, recipe: ProgramRecipe) -> GlResult<Self> {
        let mut vertex = None;
        let mut fragment = None;

        for (stage, source) in &recipe.stages {
            let Some(naga_stage) = stage.naga_stage() else {
                return Err(GlError::config(format!(
                    "{stage} shaders are not supported by this backend"
                )));
            };
            let code = recipe.compose(source)?;
            let module = compile_stage(*stage, &code).inspect_err(|e| log::warn!("{e}"))?;
            let slot = if naga_stage == naga::ShaderStage::Vertex {
                &mut vertex
            } else {
                &mut fragment
            };
            if slot.is_some() {
                return Err(link_error(format!("more than one {stage} shader attached")));
            }
            *slot = Some((code, module));
        }

        let (vertex_code, vertex_module) =
            vertex.ok_or_else(|| link_error("no vertex shader attached"))?;
        let (fragment_code, fragment_module) =
            fragment.ok_or_else(|| link_error("no fragment shader attached"))?;

        let vertex_stage =
            reflect::reflect_stage(&vertex_module, naga::ShaderStage::Vertex).map_err(link_error)?;
        let fragment_stage = reflect::reflect_stage(&fragment_module, naga::ShaderStage::Fragment)
            .map_err(link_error)?;
        let interface = reflect::link(&vertex_stage, &fragment_stage).map_err(link_error)?;

        let inner = context
            .with_error_scope(|device| {
                let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("ibrelight vertex shader"),
                    source: wgpu::ShaderSource::Wgsl(Cow::Owned(vertex_code)),
                });
                let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("ibrelight fragment shader"),
                    source: wgpu::ShaderSource::Wgsl(Cow::Owned(fragment_code)),
                });

                let bind_group_layouts: Vec<_> = (0..interface.bind_group_count())
                    .map(|group| {
                        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                            label: Some("ibrelight bind group layout"),
                            entries: &interface.layout_entries(group),
                        })
                    })
                    .collect();
                let layout_refs: Vec<&wgpu::BindGroupLayout> = bind_group_layouts.iter().collect();
                let pipeline_layout =
                    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("ibrelight pipeline layout"),
                        bind_group_layouts: &layout_refs,
                        push_constant_ranges: &[],
                    });

                let blocks = interface
                    .blocks
                    .iter()
                    .map(|block| {
                        let size = uniform_size(block.size as usize);
                        UniformStorage {
                            data: vec![0; size as usize],
                            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                                label: Some("ibrelight uniform block"),
                                size,
                                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                                mapped_at_creation: false,
                            }),
                            dirty: true,
                        }
                    })
                    .collect();

                (vertex, fragment, bind_group_layouts, pipeline_layout, blocks)
            })
            .map_err(|e| match e {
                GlError::OutOfMemory => e,
                other => link_error(other.to_string()),
            })?;
        let (vertex, fragment, bind_group_layouts, pipeline_layout, blocks) = inner;

        let textures = ResourceManager::new("texture", context.max_texture_units());
        let uniform_buffers =
            ResourceManager::new("uniform buffer", context.max_uniform_buffer_units());

        log::debug!(
            "linked program ({} uniforms, {} textures, {} attributes)",
            interface.uniforms.len(),
            interface.textures.len(),
            interface.attributes.len()
        );

        Ok(Self {
            context,
            id: NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed),
            recipe,
            inner: Some(ProgramInner {
                vertex,
                fragment,
                interface,
                bind_group_layouts,
                pipeline_layout,
                blocks,
                textures,
                uniform_buffers,
            }),
        })
    }

    /// Compiles and links the same sources again, re-reading shader files.
    pub fn rebuild(&self) -> GlResult<Program> {
        self.context.ensure_current()?;
        Program::build(self.context.clone(), self.recipe.clone())
    }

    fn inner(&self) -> GlResult<&ProgramInner> {
        self.context.ensure_current()?;
        self.inner.as_ref().ok_or(GlError::UnlinkedProgram)
    }

    fn inner_mut(&mut self) -> GlResult<&mut ProgramInner> {
        self.context.ensure_current()?;
        self.inner.as_mut().ok_or(GlError::UnlinkedProgram)
    }

    /// Unique id within the process.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Whether the program is linked and usable.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.inner.is_some()
    }

    /// The reflected interface.
    pub fn interface(&self) -> GlResult<&ProgramInterface> {
        Ok(&self.inner()?.interface)
    }

    /// The value a define was compiled with.
    #[must_use]
    pub fn define_value(&self, name: &str) -> Option<DefineValue> {
        self.recipe.defines.get(name).copied()
    }

    /// Whether the program declares a uniform called `name`.
    #[must_use]
    pub fn has_uniform(&self, name: &str) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|inner| inner.interface.uniforms.contains_key(name))
    }

    /// Sets a named uniform; `Ok(false)` when the program has no such uniform.
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) -> GlResult<bool> {
        let value = value.into();
        let inner = self.inner_mut()?;
        let Some(field) = inner.interface.uniforms.get(name).copied() else {
            return Ok(false);
        };
        let bytes = value.encode(field.ty).ok_or_else(|| {
            GlError::config(format!(
                "uniform `{name}` has type {:?}, got {value:?}",
                field.ty
            ))
        })?;
        let storage = &mut inner.blocks[field.block];
        let start = field.offset as usize;
        storage.data[start..start + bytes.len()].copy_from_slice(&bytes);
        storage.dirty = true;
        Ok(true)
    }

    /// Binds a texture to the sampler uniform `name`, assigning it a texture unit.
    ///
    /// `Ok(false)` when the program has no such texture.
    pub fn set_texture(&mut self, name: &str, texture: &Texture) -> GlResult<bool> {
        self.context.ensure_same(texture.context())?;
        let inner = self.inner_mut()?;
        let Some(binding) = inner.interface.texture(name) else {
            return Ok(false);
        };
        let expected = binding.view_dimension;
        let actual = match texture.shape() {
            TextureShape::Texture2D => wgpu::TextureViewDimension::D2,
            TextureShape::Cubemap => wgpu::TextureViewDimension::Cube,
            TextureShape::Texture2DArray => wgpu::TextureViewDimension::D2Array,
        };
        if expected != actual {
            return Err(GlError::config(format!(
                "texture `{name}` expects a {expected:?} view, got {actual:?}"
            )));
        }
        let sampler = inner
            .interface
            .samplers
            .iter()
            .find(|s| s.texture == name)
            .map(|s| match s.binding_type {
                wgpu::SamplerBindingType::Comparison => texture.sampler(SamplerKind::Comparison),
                wgpu::SamplerBindingType::Filtering => texture.sampler(SamplerKind::Filtering),
                wgpu::SamplerBindingType::NonFiltering => texture.sampler(SamplerKind::Nearest),
            })
            .transpose()?
            .cloned();
        let bound = BoundTexture {
            view: texture.sampling_view()?.clone(),
            sampler,
        };
        inner.textures.assign_by_key(name.to_owned(), bound)?;
        Ok(true)
    }

    /// Binds a whole uniform buffer; `Ok(false)` when the program has no such buffer.
    pub fn set_uniform_buffer(&mut self, name: &str, buffer: &UniformBuffer) -> GlResult<bool> {
        self.context.ensure_same(buffer.context())?;
        let raw = buffer.raw()?.clone();
        let inner = self.inner_mut()?;
        if inner.interface.uniform_buffer(name).is_none() {
            return Ok(false);
        }
        inner.uniform_buffers.assign_by_key(name.to_owned(), raw)?;
        Ok(true)
    }

    /// Texture unit assigned to `name`, if it has been bound.
    #[must_use]
    pub fn texture_unit(&self, name: &str) -> Option<usize> {
        self.inner
            .as_ref()
            .and_then(|inner| inner.textures.unit_for_key(&name.to_owned()))
    }

    pub(crate) fn modules(&self) -> GlResult<(&wgpu::ShaderModule, &wgpu::ShaderModule)> {
        let inner = self.inner()?;
        Ok((&inner.vertex, &inner.fragment))
    }

    pub(crate) fn pipeline_layout(&self) -> GlResult<&wgpu::PipelineLayout> {
        Ok(&self.inner()?.pipeline_layout)
    }

    /// Records uploads of changed uniform blocks ahead of a draw.
    pub(crate) fn record_uniform_uploads(&mut self, encoder: &mut wgpu::CommandEncoder) -> GlResult<()> {
        let device = self.context.device().clone();
        let inner = self.inner_mut()?;
        for block in inner.blocks.iter_mut().filter(|b| b.dirty) {
            record_upload(&device, encoder, &block.buffer, &block.data);
            block.dirty = false;
        }
        Ok(())
    }

    /// Bind groups for the current uniform, texture and buffer bindings.
    pub(crate) fn bind_groups(&self) -> GlResult<Vec<wgpu::BindGroup>> {
        let inner = self.inner()?;
        let interface = &inner.interface;
        let device = self.context.device();
        let mut groups = Vec::with_capacity(inner.bind_group_layouts.len());

        for (group, layout) in inner.bind_group_layouts.iter().enumerate() {
            let group = group as u32;
            let mut entries = Vec::new();
            match group {
                UNIFORM_GROUP => {
                    for (block, storage) in interface.blocks.iter().zip(&inner.blocks) {
                        entries.push(wgpu::BindGroupEntry {
                            binding: block.binding,
                            resource: storage.buffer.as_entire_binding(),
                        });
                    }
                }
                TEXTURE_GROUP => {
                    for texture in &interface.textures {
                        let bound = inner.textures.resource_by_key(&texture.name).ok_or_else(|| {
                            GlError::config(format!("texture `{}` has not been set", texture.name))
                        })?;
                        entries.push(wgpu::BindGroupEntry {
                            binding: texture.binding,
                            resource: wgpu::BindingResource::TextureView(&bound.view),
                        });
                    }
                    for sampler in &interface.samplers {
                        let sampler_resource = inner
                            .textures
                            .resource_by_key(&sampler.texture)
                            .and_then(|bound| bound.sampler.as_ref())
                            .ok_or_else(|| {
                                GlError::config(format!(
                                    "texture `{}` has not been set",
                                    sampler.texture
                                ))
                            })?;
                        entries.push(wgpu::BindGroupEntry {
                            binding: sampler.binding,
                            resource: wgpu::BindingResource::Sampler(sampler_resource),
                        });
                    }
                }
                UNIFORM_BUFFER_GROUP => {
                    for buffer in &interface.uniform_buffers {
                        let bound = inner
                            .uniform_buffers
                            .resource_by_key(&buffer.name)
                            .ok_or_else(|| {
                                GlError::config(format!(
                                    "uniform buffer `{}` has not been set",
                                    buffer.name
                                ))
                            })?;
                        entries.push(wgpu::BindGroupEntry {
                            binding: buffer.binding,
                            resource: bound.as_entire_binding(),
                        });
                    }
                }
                _ => {}
            }
            groups.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("ibrelight bind group"),
                layout,
                entries: &entries,
            }));
        }
        Ok(groups)
    }
}

impl GraphicsResource for Program {
    fn close(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            for storage in inner.blocks.drain(..) {
                storage.buffer.destroy();
            }
            log::debug!("closed program {}", self.id);
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_type_display() {
        assert_eq!(ShaderType::Vertex.to_string(), "vertex");
        assert_eq!(ShaderType::TessControl.to_string(), "tessellation control");
        assert!(ShaderType::Geometry.naga_stage().is_none());
    }

    #[test]
    fn test_define_declarations() {
        assert_eq!(DefineValue::from(true).declaration("SHADOWS"), "const SHADOWS: bool = true;");
        assert_eq!(DefineValue::from(4u32).declaration("LIGHTS"), "const LIGHTS: u32 = 4u;");
        assert_eq!(DefineValue::from(-2).declaration("OFFSET"), "const OFFSET: i32 = -2;");
        assert_eq!(DefineValue::from(2.0f32).declaration("GAMMA"), "const GAMMA: f32 = 2.0;");
    }

    #[test]
    fn test_defines_precede_source() {
        let mut recipe = ProgramRecipe::default();
        recipe.defines.insert("LIGHTS".into(), DefineValue::UInt(2));
        let code = recipe
            .compose(&ShaderSource::Code("fn f() -> u32 { return LIGHTS; }".into()))
            .unwrap();
        assert!(code.starts_with("const LIGHTS: u32 = 2u;\n"));
        assert!(compile_stage(ShaderType::Fragment, &code).is_ok());
    }

    #[test]
    fn test_missing_file_is_reported_as_not_found() {
        let recipe = ProgramRecipe::default();
        let err = recipe
            .compose(&ShaderSource::File(PathBuf::from("/nonexistent/shader.wgsl")))
            .unwrap_err();
        assert!(matches!(err, GlError::ShaderFileNotFound { .. }));
    }

    #[test]
    fn test_compile_error_carries_log() {
        let err = compile_stage(ShaderType::Fragment, "fn broken( {").unwrap_err();
        match err {
            GlError::ShaderCompile { stage, log } => {
                assert_eq!(stage, ShaderType::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_validation_error_is_compile_error() {
        let err = compile_stage(ShaderType::Vertex, "fn f() -> f32 { return 1u; }").unwrap_err();
        assert!(matches!(err, GlError::ShaderCompile { .. }));
    }

    #[test]
    fn test_uniform_encoding_checks_types() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let bytes = UniformValue::Mat4(m)
            .encode(UniformType::Matrix { columns: 4, rows: 4 })
            .unwrap();
        assert_eq!(bytes.len(), 64);
        assert_eq!(&bytes[48..52], &1.0f32.to_le_bytes());

        assert!(UniformValue::Float(1.0)
            .encode(UniformType::Scalar(ScalarType::Uint))
            .is_none());
        assert_eq!(
            UniformValue::Bool(true)
                .encode(UniformType::Scalar(ScalarType::Uint))
                .unwrap(),
            1u32.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn test_mat3_is_padded_per_column() {
        let bytes = UniformValue::Mat3(Mat3::IDENTITY)
            .encode(UniformType::Matrix { columns: 3, rows: 3 })
            .unwrap();
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[16..20], &0f32.to_le_bytes());
        assert_eq!(&bytes[20..24], &1f32.to_le_bytes());
    }
}
