//! Vertex and uniform buffers.

use std::sync::atomic::{AtomicU64, Ordering};

use wgpu::util::DeviceExt;

use crate::context::Context;
use crate::error::{GlError, GlResult};
use crate::resource::GraphicsResource;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Floats per vertex and vertex count of tightly packed vertex data.
fn vertex_layout(components: u32, len: usize) -> GlResult<u32> {
    if !(1..=4).contains(&components) {
        return Err(GlError::config(format!(
            "vertex buffers hold 1 to 4 components per vertex, got {components}"
        )));
    }
    if len == 0 || len % components as usize != 0 {
        return Err(GlError::config(format!(
            "{len} floats do not form whole {components}-component vertices"
        )));
    }
    u32::try_from(len / components as usize)
        .map_err(|_| GlError::config("too many vertices for one buffer"))
}

/// A buffer of float vectors feeding one vertex attribute.
///
/// Drawables referencing a vertex buffer do not own it; closing the buffer
/// invalidates every drawable still using it.
pub struct VertexBuffer {
    context: Context,
    id: u64,
    components: u32,
    count: u32,
    buffer: Option<wgpu::Buffer>,
}

impl std::fmt::Debug for VertexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexBuffer")
            .field("id", &self.id)
            .field("components", &self.components)
            .field("count", &self.count)
            .field("closed", &self.buffer.is_none())
            .finish_non_exhaustive()
    }
}

impl VertexBuffer {
    pub(crate) fn new(context: Context, components: u32, data: &[f32]) -> GlResult<Self> {
        context.ensure_current()?;
        let count = vertex_layout(components, data.len())?;
        let buffer = context.with_error_scope(|device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("ibrelight vertex buffer"),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            })
        })?;
        Ok(Self {
            context,
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            components,
            count,
            buffer: Some(buffer),
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn components(&self) -> u32 {
        self.components
    }

    /// Number of vertices.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Vertex format of one element.
    #[must_use]
    pub fn format(&self) -> wgpu::VertexFormat {
        match self.components {
            1 => wgpu::VertexFormat::Float32,
            2 => wgpu::VertexFormat::Float32x2,
            3 => wgpu::VertexFormat::Float32x3,
            _ => wgpu::VertexFormat::Float32x4,
        }
    }

    pub(crate) fn raw(&self) -> GlResult<&wgpu::Buffer> {
        self.context.ensure_current()?;
        self.buffer
            .as_ref()
            .ok_or(GlError::ResourceClosed("vertex buffer"))
    }
}

impl GraphicsResource for VertexBuffer {
    fn close(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy();
            log::debug!("closed vertex buffer {} ({} vertices)", self.id, self.count);
        }
    }

    fn is_closed(&self) -> bool {
        self.buffer.is_none()
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Rounds a uniform size up to the 16-byte granularity of uniform bindings.
pub(crate) fn uniform_size(len: usize) -> u64 {
    (len.max(16) as u64).div_ceil(16) * 16
}

/// Records a copy of `data` into `target` so it lands in command order.
pub(crate) fn record_upload(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    target: &wgpu::Buffer,
    data: &[u8],
) {
    let size = uniform_size(data.len());
    let mut padded = data.to_vec();
    padded.resize(size as usize, 0);
    let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("ibrelight uniform staging"),
        contents: &padded,
        usage: wgpu::BufferUsages::COPY_SRC,
    });
    encoder.copy_buffer_to_buffer(&staging, 0, target, 0, size);
}

/// A uniform buffer bound as a whole to a program's uniform buffer group.
pub struct UniformBuffer {
    context: Context,
    size: u64,
    buffer: Option<wgpu::Buffer>,
}

impl std::fmt::Debug for UniformBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniformBuffer")
            .field("size", &self.size)
            .field("closed", &self.buffer.is_none())
            .finish_non_exhaustive()
    }
}

impl UniformBuffer {
    pub(crate) fn new(context: Context, data: &[u8]) -> GlResult<Self> {
        context.ensure_current()?;
        let size = uniform_size(data.len());
        let mut padded = data.to_vec();
        padded.resize(size as usize, 0);
        let buffer = context.with_error_scope(|device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("ibrelight uniform buffer"),
                contents: &padded,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        })?;
        Ok(Self {
            context,
            size,
            buffer: Some(buffer),
        })
    }

    /// Size in bytes, including padding.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Replaces the contents; draws recorded earlier still see the old data.
    pub fn set_data(&self, data: &[u8]) -> GlResult<()> {
        let buffer = self.raw()?;
        if uniform_size(data.len()) > self.size {
            return Err(GlError::config(format!(
                "{} bytes do not fit a {}-byte uniform buffer",
                data.len(),
                self.size
            )));
        }
        let device = self.context.device();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("ibrelight uniform upload"),
        });
        record_upload(device, &mut encoder, buffer, data);
        self.context.enqueue(encoder.finish());
        Ok(())
    }

    /// Replaces the contents with a plain-old-data value.
    pub fn set_value<T: bytemuck::Pod>(&self, value: &T) -> GlResult<()> {
        self.set_data(bytemuck::bytes_of(value))
    }

    pub(crate) fn raw(&self) -> GlResult<&wgpu::Buffer> {
        self.context.ensure_current()?;
        self.buffer
            .as_ref()
            .ok_or(GlError::ResourceClosed("uniform buffer"))
    }
}

impl GraphicsResource for UniformBuffer {
    fn close(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy();
            log::debug!("closed {}-byte uniform buffer", self.size);
        }
    }

    fn is_closed(&self) -> bool {
        self.buffer.is_none()
    }
}

impl Drop for UniformBuffer {
    fn drop(&mut self) {
        self.close();
    }
}
