//! Shader interface reflection over naga modules.
//!
//! Binding conventions:
//! - group 0: uniform blocks; their members are addressable by name
//! - group 1: textures, each optionally paired with a sampler named `<texture>_sampler`
//! - group 2: uniform buffers bound as a whole
//!
//! Vertex attributes are the location-bound inputs of the vertex entry point.

use std::collections::BTreeMap;

/// Group holding uniform blocks.
pub const UNIFORM_GROUP: u32 = 0;
/// Group holding textures and samplers.
pub const TEXTURE_GROUP: u32 = 1;
/// Group holding whole uniform buffers.
pub const UNIFORM_BUFFER_GROUP: u32 = 2;

/// Suffix naming the sampler of a texture.
pub const SAMPLER_SUFFIX: &str = "_sampler";

/// Arrays longer than this are not flattened into named uniforms.
const MAX_FLATTENED_ARRAY: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Float,
    Sint,
    Uint,
    Bool,
}

impl ScalarType {
    fn from_naga(kind: naga::ScalarKind) -> Option<Self> {
        match kind {
            naga::ScalarKind::Float => Some(Self::Float),
            naga::ScalarKind::Sint => Some(Self::Sint),
            naga::ScalarKind::Uint => Some(Self::Uint),
            naga::ScalarKind::Bool => Some(Self::Bool),
            _ => None,
        }
    }
}

/// Type of one addressable uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Scalar(ScalarType),
    Vector(ScalarType, u8),
    Matrix { columns: u8, rows: u8 },
}

/// One named uniform inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformField {
    /// Index into [`ProgramInterface::blocks`].
    pub block: usize,
    pub offset: u32,
    pub ty: UniformType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    pub name: String,
    pub binding: u32,
    pub size: u32,
    pub visibility: wgpu::ShaderStages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: String,
    pub binding: u32,
    pub view_dimension: wgpu::TextureViewDimension,
    pub sample_type: wgpu::TextureSampleType,
    pub multisampled: bool,
    pub visibility: wgpu::ShaderStages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerBinding {
    pub name: String,
    /// Name of the paired texture.
    pub texture: String,
    pub binding: u32,
    pub binding_type: wgpu::SamplerBindingType,
    pub visibility: wgpu::ShaderStages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBufferBinding {
    pub name: String,
    pub binding: u32,
    pub visibility: wgpu::ShaderStages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: String,
    pub location: u32,
    pub format: wgpu::VertexFormat,
}

/// The linked interface of a vertex + fragment program.
#[derive(Debug, Clone, Default)]
pub struct ProgramInterface {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub blocks: Vec<UniformBlock>,
    pub uniforms: BTreeMap<String, UniformField>,
    pub textures: Vec<TextureBinding>,
    pub samplers: Vec<SamplerBinding>,
    pub uniform_buffers: Vec<UniformBufferBinding>,
    pub attributes: Vec<VertexAttribute>,
    /// Color attachment locations the fragment stage writes.
    pub fragment_outputs: Vec<u32>,
}

impl ProgramInterface {
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    #[must_use]
    pub fn texture(&self, name: &str) -> Option<&TextureBinding> {
        self.textures.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn uniform_buffer(&self, name: &str) -> Option<&UniformBufferBinding> {
        self.uniform_buffers.iter().find(|b| b.name == name)
    }

    /// Bind groups used, as a dense count from group 0.
    #[must_use]
    pub fn bind_group_count(&self) -> u32 {
        if !self.uniform_buffers.is_empty() {
            UNIFORM_BUFFER_GROUP + 1
        } else if !self.textures.is_empty() || !self.samplers.is_empty() {
            TEXTURE_GROUP + 1
        } else if !self.blocks.is_empty() {
            UNIFORM_GROUP + 1
        } else {
            0
        }
    }

    /// Layout entries of bind group `group`.
    #[must_use]
    pub fn layout_entries(&self, group: u32) -> Vec<wgpu::BindGroupLayoutEntry> {
        match group {
            UNIFORM_GROUP => self
                .blocks
                .iter()
                .map(|b| uniform_entry(b.binding, b.visibility))
                .collect(),
            TEXTURE_GROUP => {
                let textures = self.textures.iter().map(|t| wgpu::BindGroupLayoutEntry {
                    binding: t.binding,
                    visibility: t.visibility,
                    ty: wgpu::BindingType::Texture {
                        sample_type: t.sample_type,
                        view_dimension: t.view_dimension,
                        multisampled: t.multisampled,
                    },
                    count: None,
                });
                let samplers = self.samplers.iter().map(|s| wgpu::BindGroupLayoutEntry {
                    binding: s.binding,
                    visibility: s.visibility,
                    ty: wgpu::BindingType::Sampler(s.binding_type),
                    count: None,
                });
                textures.chain(samplers).collect()
            }
            UNIFORM_BUFFER_GROUP => self
                .uniform_buffers
                .iter()
                .map(|b| uniform_entry(b.binding, b.visibility))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Value type crossing a stage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IoType {
    scalar: ScalarType,
    components: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IoSlot {
    name: String,
    location: u32,
    ty: Option<IoType>,
}

#[derive(Debug, Clone, PartialEq)]
enum ResourceKind {
    UniformBlock {
        size: u32,
        fields: Vec<(String, u32, UniformType)>,
    },
    Texture {
        view_dimension: wgpu::TextureViewDimension,
        class: TextureClass,
        multisampled: bool,
    },
    Sampler {
        comparison: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextureClass {
    Float,
    Sint,
    Uint,
    Depth,
}

#[derive(Debug, Clone, PartialEq)]
struct GlobalResource {
    name: String,
    group: u32,
    binding: u32,
    kind: ResourceKind,
}

/// Resources and IO of one stage.
#[derive(Debug, Clone)]
pub(crate) struct StageInterface {
    stage: naga::ShaderStage,
    entry_point: String,
    globals: Vec<GlobalResource>,
    inputs: Vec<IoSlot>,
    outputs: Vec<IoSlot>,
}

fn stage_name(stage: naga::ShaderStage) -> &'static str {
    match stage {
        naga::ShaderStage::Vertex => "vertex",
        naga::ShaderStage::Fragment => "fragment",
        naga::ShaderStage::Compute => "compute",
        _ => "mesh",
    }
}

/// Reflects the first `stage` entry point of `module` and its global resources.
pub(crate) fn reflect_stage(
    module: &naga::Module,
    stage: naga::ShaderStage,
) -> Result<StageInterface, String> {
    let entry = module
        .entry_points
        .iter()
        .find(|e| e.stage == stage)
        .ok_or_else(|| format!("no {} entry point", stage_name(stage)))?;

    let mut globals = Vec::new();
    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else {
            continue;
        };
        let name = var.name.clone().unwrap_or_default();
        let kind = match var.space {
            naga::AddressSpace::Uniform => {
                let mut fields = Vec::new();
                let inner = &module.types[var.ty].inner;
                if let naga::TypeInner::Struct { members, .. } = inner {
                    for member in members {
                        let member_name = member.name.clone().unwrap_or_default();
                        flatten_uniform(module, member.ty, &member_name, member.offset, &mut fields);
                    }
                } else {
                    flatten_uniform(module, var.ty, &name, 0, &mut fields);
                }
                ResourceKind::UniformBlock {
                    size: inner.size(module.to_ctx()),
                    fields,
                }
            }
            naga::AddressSpace::Handle => match &module.types[var.ty].inner {
                naga::TypeInner::Image {
                    dim,
                    arrayed,
                    class,
                } => {
                    let (class, multisampled) = match class {
                        naga::ImageClass::Sampled { kind, multi } => {
                            let class = match kind {
                                naga::ScalarKind::Sint => TextureClass::Sint,
                                naga::ScalarKind::Uint => TextureClass::Uint,
                                _ => TextureClass::Float,
                            };
                            (class, *multi)
                        }
                        naga::ImageClass::Depth { multi } => (TextureClass::Depth, *multi),
                        _ => return Err(format!("texture `{name}` has an unsupported image class")),
                    };
                    let view_dimension = match (dim, arrayed) {
                        (naga::ImageDimension::D1, _) => wgpu::TextureViewDimension::D1,
                        (naga::ImageDimension::D2, false) => wgpu::TextureViewDimension::D2,
                        (naga::ImageDimension::D2, true) => wgpu::TextureViewDimension::D2Array,
                        (naga::ImageDimension::D3, _) => wgpu::TextureViewDimension::D3,
                        (naga::ImageDimension::Cube, false) => wgpu::TextureViewDimension::Cube,
                        (naga::ImageDimension::Cube, true) => wgpu::TextureViewDimension::CubeArray,
                    };
                    ResourceKind::Texture {
                        view_dimension,
                        class,
                        multisampled,
                    }
                }
                naga::TypeInner::Sampler { comparison } => ResourceKind::Sampler {
                    comparison: *comparison,
                },
                _ => return Err(format!("resource `{name}` has an unsupported handle type")),
            },
            _ => {
                return Err(format!(
                    "resource `{name}` uses an unsupported address space"
                ))
            }
        };
        globals.push(GlobalResource {
            name,
            group: binding.group,
            binding: binding.binding,
            kind,
        });
    }

    let mut inputs = Vec::new();
    for argument in &entry.function.arguments {
        let name = argument.name.clone().unwrap_or_default();
        collect_io(module, argument.binding.as_ref(), argument.ty, &name, &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_io(module, result.binding.as_ref(), result.ty, "", &mut outputs);
    }

    Ok(StageInterface {
        stage,
        entry_point: entry.name.clone(),
        globals,
        inputs,
        outputs,
    })
}

fn uniform_type(inner: &naga::TypeInner) -> Option<UniformType> {
    match *inner {
        naga::TypeInner::Scalar(scalar) => ScalarType::from_naga(scalar.kind).map(UniformType::Scalar),
        naga::TypeInner::Vector { size, scalar } => {
            ScalarType::from_naga(scalar.kind).map(|s| UniformType::Vector(s, size as u8))
        }
        naga::TypeInner::Matrix { columns, rows, .. } => Some(UniformType::Matrix {
            columns: columns as u8,
            rows: rows as u8,
        }),
        _ => None,
    }
}

fn flatten_uniform(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    name: &str,
    offset: u32,
    fields: &mut Vec<(String, u32, UniformType)>,
) {
    let inner = &module.types[ty].inner;
    if let Some(uniform) = uniform_type(inner) {
        fields.push((name.to_owned(), offset, uniform));
        return;
    }
    match inner {
        naga::TypeInner::Struct { members, .. } => {
            for member in members {
                let member_name = format!("{name}.{}", member.name.as_deref().unwrap_or_default());
                flatten_uniform(module, member.ty, &member_name, offset + member.offset, fields);
            }
        }
        naga::TypeInner::Array {
            base,
            size: naga::ArraySize::Constant(count),
            stride,
        } if count.get() <= MAX_FLATTENED_ARRAY => {
            for i in 0..count.get() {
                flatten_uniform(module, *base, &format!("{name}[{i}]"), offset + i * stride, fields);
            }
        }
        _ => {}
    }
}

fn io_type(inner: &naga::TypeInner) -> Option<IoType> {
    match *inner {
        naga::TypeInner::Scalar(scalar) => ScalarType::from_naga(scalar.kind).map(|scalar| IoType {
            scalar,
            components: 1,
        }),
        naga::TypeInner::Vector { size, scalar } => {
            ScalarType::from_naga(scalar.kind).map(|scalar| IoType {
                scalar,
                components: size as u8,
            })
        }
        _ => None,
    }
}

fn collect_io(
    module: &naga::Module,
    binding: Option<&naga::Binding>,
    ty: naga::Handle<naga::Type>,
    name: &str,
    slots: &mut Vec<IoSlot>,
) {
    let inner = &module.types[ty].inner;
    match binding {
        Some(naga::Binding::Location { location, .. }) => slots.push(IoSlot {
            name: name.to_owned(),
            location: *location,
            ty: io_type(inner),
        }),
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = inner {
                for member in members {
                    let member_name = member.name.clone().unwrap_or_default();
                    collect_io(module, member.binding.as_ref(), member.ty, &member_name, slots);
                }
            }
        }
    }
}

fn vertex_format(ty: Option<IoType>) -> Option<wgpu::VertexFormat> {
    let IoType { scalar, components } = ty?;
    use wgpu::VertexFormat as F;
    Some(match (scalar, components) {
        (ScalarType::Float, 1) => F::Float32,
        (ScalarType::Float, 2) => F::Float32x2,
        (ScalarType::Float, 3) => F::Float32x3,
        (ScalarType::Float, 4) => F::Float32x4,
        (ScalarType::Sint, 1) => F::Sint32,
        (ScalarType::Sint, 2) => F::Sint32x2,
        (ScalarType::Sint, 3) => F::Sint32x3,
        (ScalarType::Sint, 4) => F::Sint32x4,
        (ScalarType::Uint, 1) => F::Uint32,
        (ScalarType::Uint, 2) => F::Uint32x2,
        (ScalarType::Uint, 3) => F::Uint32x3,
        (ScalarType::Uint, 4) => F::Uint32x4,
        _ => return None,
    })
}

fn visibility(stage: naga::ShaderStage) -> wgpu::ShaderStages {
    match stage {
        naga::ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
        naga::ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
        _ => wgpu::ShaderStages::COMPUTE,
    }
}

/// Checks that two stages fit together and merges their resources.
///
/// The error string is the link log.
pub(crate) fn link(
    vertex: &StageInterface,
    fragment: &StageInterface,
) -> Result<ProgramInterface, String> {
    let mut errors = Vec::new();

    for input in &fragment.inputs {
        match vertex.outputs.iter().find(|o| o.location == input.location) {
            None => errors.push(format!(
                "fragment input `{}` at location {} is not written by the vertex stage",
                input.name, input.location
            )),
            Some(output) if output.ty != input.ty => errors.push(format!(
                "fragment input `{}` at location {} does not match the vertex output type",
                input.name, input.location
            )),
            Some(_) => {}
        }
    }

    // Merge globals by (group, binding).
    let mut merged: BTreeMap<(u32, u32), (GlobalResource, wgpu::ShaderStages)> = BTreeMap::new();
    for stage in [vertex, fragment] {
        for global in &stage.globals {
            let key = (global.group, global.binding);
            match merged.get_mut(&key) {
                Some((existing, stages)) => {
                    if existing.name != global.name || existing.kind != global.kind {
                        errors.push(format!(
                            "binding @group({}) @binding({}) is `{}` in one stage and `{}` in another",
                            key.0, key.1, existing.name, global.name
                        ));
                    }
                    *stages |= visibility(stage.stage);
                }
                None => {
                    merged.insert(key, (global.clone(), visibility(stage.stage)));
                }
            }
        }
    }

    let mut interface = ProgramInterface {
        vertex_entry: vertex.entry_point.clone(),
        fragment_entry: fragment.entry_point.clone(),
        fragment_outputs: fragment.outputs.iter().map(|o| o.location).collect(),
        ..ProgramInterface::default()
    };

    let textures_by_name: BTreeMap<&str, TextureClass> = merged
        .values()
        .filter_map(|(g, _)| match g.kind {
            ResourceKind::Texture { class, .. } => Some((g.name.as_str(), class)),
            _ => None,
        })
        .collect();
    let filtering_pairs: Vec<String> = merged
        .values()
        .filter_map(|(g, _)| match g.kind {
            ResourceKind::Sampler { comparison: false } => g
                .name
                .strip_suffix(SAMPLER_SUFFIX)
                .map(str::to_owned),
            _ => None,
        })
        .collect();

    for ((group, binding), (global, stages)) in &merged {
        match (&global.kind, *group) {
            (ResourceKind::UniformBlock { size, fields }, UNIFORM_GROUP) => {
                let block = interface.blocks.len();
                interface.blocks.push(UniformBlock {
                    name: global.name.clone(),
                    binding: *binding,
                    size: *size,
                    visibility: *stages,
                });
                for (name, offset, ty) in fields {
                    if interface
                        .uniforms
                        .insert(
                            name.clone(),
                            UniformField {
                                block,
                                offset: *offset,
                                ty: *ty,
                            },
                        )
                        .is_some()
                    {
                        errors.push(format!("uniform `{name}` is declared in more than one block"));
                    }
                }
            }
            (ResourceKind::UniformBlock { .. }, UNIFORM_BUFFER_GROUP) => {
                interface.uniform_buffers.push(UniformBufferBinding {
                    name: global.name.clone(),
                    binding: *binding,
                    visibility: *stages,
                });
            }
            (
                ResourceKind::Texture {
                    view_dimension,
                    class,
                    multisampled,
                },
                TEXTURE_GROUP,
            ) => {
                let filtered = !multisampled && filtering_pairs.iter().any(|n| n == &global.name);
                let sample_type = match class {
                    TextureClass::Float => wgpu::TextureSampleType::Float {
                        filterable: filtered,
                    },
                    TextureClass::Sint => wgpu::TextureSampleType::Sint,
                    TextureClass::Uint => wgpu::TextureSampleType::Uint,
                    TextureClass::Depth => wgpu::TextureSampleType::Depth,
                };
                interface.textures.push(TextureBinding {
                    name: global.name.clone(),
                    binding: *binding,
                    view_dimension: *view_dimension,
                    sample_type,
                    multisampled: *multisampled,
                    visibility: *stages,
                });
            }
            (ResourceKind::Sampler { comparison }, TEXTURE_GROUP) => {
                let Some(texture) = global.name.strip_suffix(SAMPLER_SUFFIX) else {
                    errors.push(format!(
                        "sampler `{}` must be named `<texture>{SAMPLER_SUFFIX}`",
                        global.name
                    ));
                    continue;
                };
                let Some(class) = textures_by_name.get(texture) else {
                    errors.push(format!(
                        "sampler `{}` has no texture named `{texture}`",
                        global.name
                    ));
                    continue;
                };
                let binding_type = match (comparison, class) {
                    (true, _) => wgpu::SamplerBindingType::Comparison,
                    (false, TextureClass::Float) => wgpu::SamplerBindingType::Filtering,
                    (false, _) => wgpu::SamplerBindingType::NonFiltering,
                };
                interface.samplers.push(SamplerBinding {
                    name: global.name.clone(),
                    texture: texture.to_owned(),
                    binding: *binding,
                    binding_type,
                    visibility: *stages,
                });
            }
            (_, group) => errors.push(format!(
                "`{}` is in bind group {group}, which does not hold that kind of resource",
                global.name
            )),
        }
    }

    for input in &vertex.inputs {
        match vertex_format(input.ty) {
            Some(format) => interface.attributes.push(VertexAttribute {
                name: input.name.clone(),
                location: input.location,
                format,
            }),
            None => errors.push(format!(
                "vertex attribute `{}` has an unsupported type",
                input.name
            )),
        }
    }

    if errors.is_empty() {
        Ok(interface)
    } else {
        Err(errors.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(source: &str, stage: naga::ShaderStage) -> StageInterface {
        let module = naga::front::wgsl::parse_str(source).unwrap();
        reflect_stage(&module, stage).unwrap()
    }

    const VERTEX: &str = r"
struct Uniforms {
    model_view: mat4x4<f32>,
    projection: mat4x4<f32>,
    light_count: u32,
    tint: vec3<f32>,
}
@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) texCoord: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = u.projection * u.model_view * vec4<f32>(position, 1.0);
    out.tex_coord = texCoord;
    return out;
}
";

    const FRAGMENT: &str = r"
@group(1) @binding(0) var albedo: texture_2d<f32>;
@group(1) @binding(1) var albedo_sampler: sampler;
@group(1) @binding(2) var shadow_maps: texture_depth_2d_array;
@group(1) @binding(3) var shadow_maps_sampler: sampler_comparison;

struct Material { gloss: f32, weights: array<vec4<f32>, 2> }
@group(2) @binding(0) var<uniform> material: Material;

@fragment
fn fs_main(@location(0) tex_coord: vec2<f32>) -> @location(0) vec4<f32> {
    let shadow = textureSampleCompare(shadow_maps, shadow_maps_sampler, tex_coord, 0, 0.5);
    return textureSample(albedo, albedo_sampler, tex_coord) * shadow * material.gloss;
}
";

    #[test]
    fn test_reflects_uniform_members_by_name() {
        let interface = link(
            &stage(VERTEX, naga::ShaderStage::Vertex),
            &stage(FRAGMENT, naga::ShaderStage::Fragment),
        )
        .unwrap();

        assert_eq!(interface.vertex_entry, "vs_main");
        assert_eq!(interface.fragment_entry, "fs_main");
        assert_eq!(interface.blocks.len(), 1);
        let projection = interface.uniforms["projection"];
        assert_eq!(projection.offset, 64);
        assert_eq!(projection.ty, UniformType::Matrix { columns: 4, rows: 4 });
        assert_eq!(
            interface.uniforms["light_count"].ty,
            UniformType::Scalar(ScalarType::Uint)
        );
        assert_eq!(
            interface.uniforms["tint"].ty,
            UniformType::Vector(ScalarType::Float, 3)
        );
        assert_eq!(interface.blocks[0].visibility, wgpu::ShaderStages::VERTEX);
    }

    #[test]
    fn test_reflects_textures_and_samplers() {
        let interface = link(
            &stage(VERTEX, naga::ShaderStage::Vertex),
            &stage(FRAGMENT, naga::ShaderStage::Fragment),
        )
        .unwrap();

        let albedo = interface.texture("albedo").unwrap();
        assert_eq!(
            albedo.sample_type,
            wgpu::TextureSampleType::Float { filterable: true }
        );
        let shadows = interface.texture("shadow_maps").unwrap();
        assert_eq!(shadows.view_dimension, wgpu::TextureViewDimension::D2Array);
        assert_eq!(shadows.sample_type, wgpu::TextureSampleType::Depth);

        let comparison = interface
            .samplers
            .iter()
            .find(|s| s.texture == "shadow_maps")
            .unwrap();
        assert_eq!(comparison.binding_type, wgpu::SamplerBindingType::Comparison);

        assert!(interface.uniform_buffer("material").is_some());
        assert_eq!(interface.bind_group_count(), 3);
        assert_eq!(interface.layout_entries(TEXTURE_GROUP).len(), 4);
    }

    #[test]
    fn test_reflects_vertex_attributes() {
        let interface = link(
            &stage(VERTEX, naga::ShaderStage::Vertex),
            &stage(FRAGMENT, naga::ShaderStage::Fragment),
        )
        .unwrap();

        let position = interface.attribute("position").unwrap();
        assert_eq!(position.location, 0);
        assert_eq!(position.format, wgpu::VertexFormat::Float32x3);
        assert_eq!(
            interface.attribute("texCoord").unwrap().format,
            wgpu::VertexFormat::Float32x2
        );
        assert_eq!(interface.fragment_outputs, vec![0]);
    }

    #[test]
    fn test_flattens_struct_and_array_members() {
        let source = r"
struct Light { position: vec3<f32>, intensity: f32 }
struct Lights { lights: array<Light, 2>, count: i32 }
@group(0) @binding(0) var<uniform> lights: Lights;
@vertex
fn main() -> @builtin(position) vec4<f32> {
    return vec4<f32>(lights.lights[0].position, f32(lights.count));
}
";
        let vertex = stage(source, naga::ShaderStage::Vertex);
        let fragment_src = "@fragment fn main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
        let fragment = stage(fragment_src, naga::ShaderStage::Fragment);
        let interface = link(&vertex, &fragment).unwrap();

        assert_eq!(interface.uniforms["lights[0].position"].offset, 0);
        assert_eq!(interface.uniforms["lights[1].intensity"].offset, 28);
        assert_eq!(interface.uniforms["count"].offset, 32);
    }

    #[test]
    fn test_unmatched_fragment_input_fails_to_link() {
        let vertex_src = "@vertex fn main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }";
        let fragment_src =
            "@fragment fn main(@location(2) normal: vec3<f32>) -> @location(0) vec4<f32> { return vec4<f32>(normal, 1.0); }";
        let log = link(
            &stage(vertex_src, naga::ShaderStage::Vertex),
            &stage(fragment_src, naga::ShaderStage::Fragment),
        )
        .unwrap_err();
        assert!(log.contains("location 2"));
    }

    #[test]
    fn test_unpaired_sampler_fails_to_link() {
        let vertex_src = "@vertex fn main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }";
        let fragment_src = r"
@group(1) @binding(0) var tex: texture_2d<f32>;
@group(1) @binding(1) var smp: sampler;
@fragment fn main() -> @location(0) vec4<f32> { return textureSample(tex, smp, vec2<f32>(0.5)); }
";
        let log = link(
            &stage(vertex_src, naga::ShaderStage::Vertex),
            &stage(fragment_src, naga::ShaderStage::Fragment),
        )
        .unwrap_err();
        assert!(log.contains("smp"));
    }

    #[test]
    fn test_missing_entry_point() {
        let module = naga::front::wgsl::parse_str(
            "@fragment fn main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
        )
        .unwrap();
        assert!(reflect_stage(&module, naga::ShaderStage::Vertex).is_err());
    }
}
