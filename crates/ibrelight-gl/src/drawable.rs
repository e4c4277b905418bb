//! Drawables: a program paired with vertex buffers, drawn into framebuffers.

use std::collections::{BTreeMap, HashMap};

use ibrelight_core::PixelRect;
use wgpu::util::DeviceExt;

use crate::buffer::VertexBuffer;
use crate::context::{Context, RenderState};
use crate::error::{GlError, GlResult};
use crate::framebuffer::{Framebuffer, RenderTargets};
use crate::program::Program;
use crate::resource::GraphicsResource;

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
    LinesAdjacency,
    LineStripAdjacency,
    TrianglesAdjacency,
    TriangleStripAdjacency,
}

impl PrimitiveMode {
    /// Backend topology, or an error for modes with no equivalent.
    pub fn topology(self) -> GlResult<wgpu::PrimitiveTopology> {
        use wgpu::PrimitiveTopology as T;
        match self {
            Self::Points => Ok(T::PointList),
            Self::Lines | Self::LineLoop => Ok(T::LineList),
            Self::LineStrip => Ok(T::LineStrip),
            Self::Triangles | Self::TriangleFan => Ok(T::TriangleList),
            Self::TriangleStrip => Ok(T::TriangleStrip),
            Self::LinesAdjacency
            | Self::LineStripAdjacency
            | Self::TrianglesAdjacency
            | Self::TriangleStripAdjacency => Err(GlError::UnsupportedPrimitiveMode(self)),
        }
    }

    /// Whether the mode is drawn through generated indices.
    #[must_use]
    pub fn is_emulated(self) -> bool {
        matches!(self, Self::LineLoop | Self::TriangleFan)
    }
}

/// Index list emulating a line loop or triangle fan over `count` vertices.
fn emulated_indices(mode: PrimitiveMode, count: u32) -> Vec<u32> {
    match mode {
        PrimitiveMode::LineLoop if count >= 2 => (0..count)
            .flat_map(|i| [i, (i + 1) % count])
            .collect(),
        PrimitiveMode::TriangleFan if count >= 3 => {
            (1..count - 1).flat_map(|i| [0, i, i + 1]).collect()
        }
        _ => Vec::new(),
    }
}

/// Clamps `rect` to the target; `None` when nothing is left to draw.
fn clamp_to_target(rect: PixelRect, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = rect.x.max(0) as i64;
    let y0 = rect.y.max(0) as i64;
    let x1 = i64::from(rect.right()).min(i64::from(width));
    let y1 = i64::from(rect.bottom()).min(i64::from(height));
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

#[derive(Debug, Clone)]
struct BoundAttribute {
    buffer: wgpu::Buffer,
    format: wgpu::VertexFormat,
    count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    topology: wgpu::PrimitiveTopology,
    color_formats: Vec<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    sample_count: u32,
    state: RenderState,
}

/// A program bound to vertex attribute sources.
///
/// The drawable owns its program. Vertex buffers are referenced, not owned.
pub struct Drawable {
    context: Context,
    program: Program,
    attributes: BTreeMap<String, BoundAttribute>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    index_buffers: HashMap<(PrimitiveMode, u32), (wgpu::Buffer, u32)>,
    closed: bool,
}

impl std::fmt::Debug for Drawable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drawable")
            .field("program", &self.program)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("pipelines", &self.pipelines.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drawable {
    pub(crate) fn new(context: Context, program: Program) -> GlResult<Self> {
        context.ensure_same(program.context())?;
        if !program.is_linked() {
            return Err(GlError::UnlinkedProgram);
        }
        Ok(Self {
            context,
            program,
            attributes: BTreeMap::new(),
            pipelines: HashMap::new(),
            index_buffers: HashMap::new(),
            closed: false,
        })
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Mutable access for setting uniforms and textures.
    pub fn program_mut(&mut self) -> &mut Program {
        &mut self.program
    }

    /// Swaps in a new program, returning the previous one.
    ///
    /// Vertex buffers stay attached by name.
    pub fn set_program(&mut self, program: Program) -> GlResult<Program> {
        self.context.ensure_same(program.context())?;
        if !program.is_linked() {
            return Err(GlError::UnlinkedProgram);
        }
        self.pipelines.clear();
        Ok(std::mem::replace(&mut self.program, program))
    }

    /// Attaches `buffer` to the vertex attribute `name`.
    ///
    /// Returns `Ok(false)` when the program has no such attribute.
    pub fn add_vertex_buffer(&mut self, name: &str, buffer: &VertexBuffer) -> GlResult<bool> {
        self.context.ensure_same(buffer.context())?;
        let Some(attribute) = self.program.interface()?.attribute(name) else {
            return Ok(false);
        };
        if !matches!(
            attribute.format,
            wgpu::VertexFormat::Float32
                | wgpu::VertexFormat::Float32x2
                | wgpu::VertexFormat::Float32x3
                | wgpu::VertexFormat::Float32x4
        ) {
            return Err(GlError::config(format!(
                "attribute `{name}` is not a float attribute"
            )));
        }
        self.attributes.insert(
            name.to_owned(),
            BoundAttribute {
                buffer: buffer.raw()?.clone(),
                format: buffer.format(),
                count: buffer.count(),
            },
        );
        Ok(true)
    }

    /// Draws over the whole framebuffer.
    pub fn draw(&mut self, mode: PrimitiveMode, framebuffer: &dyn Framebuffer) -> GlResult<()> {
        self.draw_viewport(mode, framebuffer, framebuffer.full_viewport())
    }

    /// Draws into the pixel rectangle `viewport` of `framebuffer`.
    pub fn draw_viewport(
        &mut self,
        mode: PrimitiveMode,
        framebuffer: &dyn Framebuffer,
        viewport: PixelRect,
    ) -> GlResult<()> {
        if self.closed {
            return Err(GlError::ResourceClosed("drawable"));
        }
        self.context.ensure_current()?;
        self.context.ensure_same(framebuffer.context())?;
        let topology = mode.topology()?;

        let targets = framebuffer.render_targets()?;
        let Some((x, y, width, height)) =
            clamp_to_target(viewport, targets.size.width, targets.size.height)
        else {
            return Ok(());
        };

        let vertex_count = self.vertex_count()?;
        let index_buffer = if mode.is_emulated() {
            match self.index_buffer(mode, vertex_count) {
                Some(entry) => Some(entry),
                None => return Ok(()),
            }
        } else {
            None
        };
        let pipeline = self.pipeline(topology, &targets)?;
        let bind_groups = self.program.bind_groups()?;

        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("ibrelight draw encoder"),
                });
        self.program.record_uniform_uploads(&mut encoder)?;
        let interface = self.program.interface()?;

        {
            let color_attachments: Vec<_> = targets
                .colors
                .iter()
                .map(|target| {
                    Some(wgpu::RenderPassColorAttachment {
                        view: &target.view,
                        depth_slice: None,
                        resolve_target: target.resolve_target.as_ref(),
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
                .collect();
            let depth_attachment =
                targets
                    .depth
                    .as_ref()
                    .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                        view: &depth.view,
                        depth_ops: depth.format.has_depth_aspect().then_some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: depth.format.has_stencil_aspect().then_some(
                            wgpu::Operations {
                                load: wgpu::LoadOp::Load,
                                store: wgpu::StoreOp::Store,
                            },
                        ),
                    });

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("ibrelight draw pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                ..Default::default()
            });
            pass.set_pipeline(&pipeline);
            for (group, bind_group) in bind_groups.iter().enumerate() {
                pass.set_bind_group(group as u32, bind_group, &[]);
            }
            for (slot, attribute) in interface.attributes.iter().enumerate() {
                if let Some(bound) = self.attributes.get(&attribute.name) {
                    pass.set_vertex_buffer(slot as u32, bound.buffer.slice(..));
                }
            }
            pass.set_viewport(x as f32, y as f32, width as f32, height as f32, 0.0, 1.0);
            pass.set_scissor_rect(x, y, width, height);
            match &index_buffer {
                Some((buffer, count)) => {
                    pass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..*count, 0, 0..1);
                }
                None => pass.draw(0..vertex_count, 0..1),
            }
        }

        self.context.enqueue(encoder.finish());
        Ok(())
    }

    /// Vertices drawable with every attribute bound.
    fn vertex_count(&self) -> GlResult<u32> {
        let interface = self.program.interface()?;
        if interface.attributes.is_empty() {
            return Err(GlError::config("program declares no vertex attributes"));
        }
        let mut count = u32::MAX;
        for attribute in &interface.attributes {
            let bound = self.attributes.get(&attribute.name).ok_or_else(|| {
                GlError::config(format!(
                    "vertex attribute `{}` has no buffer",
                    attribute.name
                ))
            })?;
            count = count.min(bound.count);
        }
        Ok(count)
    }

    /// Cached generated indices; `None` when too few vertices form a primitive.
    fn index_buffer(&mut self, mode: PrimitiveMode, count: u32) -> Option<(wgpu::Buffer, u32)> {
        if let Some(cached) = self.index_buffers.get(&(mode, count)) {
            return Some(cached.clone());
        }
        let indices = emulated_indices(mode, count);
        if indices.is_empty() {
            return None;
        }
        let buffer = self
            .context
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("ibrelight emulated indices"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let entry = (buffer, indices.len() as u32);
        self.index_buffers.insert((mode, count), entry.clone());
        Some(entry)
    }

    fn pipeline(
        &mut self,
        topology: wgpu::PrimitiveTopology,
        targets: &RenderTargets,
    ) -> GlResult<wgpu::RenderPipeline> {
        let state = self.context.state();
        let key = PipelineKey {
            topology,
            color_formats: targets.color_formats(),
            depth_format: targets.depth.as_ref().map(|d| d.format),
            sample_count: targets.sample_count,
            state,
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline.clone());
        }

        let interface = self.program.interface()?;
        let (vertex_module, fragment_module) = self.program.modules()?;
        let layout = self.program.pipeline_layout()?;

        let vertex_attributes: Vec<[wgpu::VertexAttribute; 1]> = interface
            .attributes
            .iter()
            .map(|attribute| {
                let format = self
                    .attributes
                    .get(&attribute.name)
                    .map_or(attribute.format, |bound| bound.format);
                [wgpu::VertexAttribute {
                    format,
                    offset: 0,
                    shader_location: attribute.location,
                }]
            })
            .collect();
        let vertex_layouts: Vec<wgpu::VertexBufferLayout<'_>> = vertex_attributes
            .iter()
            .map(|attributes| wgpu::VertexBufferLayout {
                array_stride: attributes[0].format.size(),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = targets
            .colors
            .iter()
            .enumerate()
            .map(|(index, target)| {
                let written = interface.fragment_outputs.contains(&(index as u32));
                let blend = (state.alpha_blending && !target.format.is_integer())
                    .then_some(wgpu::BlendState::ALPHA_BLENDING);
                Some(wgpu::ColorTargetState {
                    format: target.format.to_wgpu(),
                    blend,
                    write_mask: if written {
                        wgpu::ColorWrites::ALL
                    } else {
                        wgpu::ColorWrites::empty()
                    },
                })
            })
            .collect();

        let depth_stencil = targets.depth.as_ref().map(|depth| {
            let has_depth = depth.format.has_depth_aspect();
            wgpu::DepthStencilState {
                format: depth.format,
                depth_write_enabled: has_depth && state.depth_test && state.depth_write,
                depth_compare: if has_depth && state.depth_test {
                    wgpu::CompareFunction::Less
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }
        });

        let pipeline = self.context.with_error_scope(|device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("ibrelight drawable pipeline"),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: Some(interface.vertex_entry.as_str()),
                    buffers: &vertex_layouts,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment_module,
                    entry_point: Some(interface.fragment_entry.as_str()),
                    targets: &color_targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    cull_mode: state.back_face_culling.then_some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: targets.sample_count,
                    ..Default::default()
                },
                multiview: None,
                cache: None,
            })
        })?;

        log::debug!(
            "built pipeline for program {} ({topology:?}, {} samples)",
            self.program.id(),
            targets.sample_count
        );
        self.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }
}

impl GraphicsResource for Drawable {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.program.close();
        self.pipelines.clear();
        for (_, (buffer, _)) in self.index_buffers.drain() {
            buffer.destroy();
        }
        self.attributes.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Drawable {
    fn drop(&mut self) {
        self.close();
    }
}
