//! The graphics context: one device session and the gate for every GPU object.
//!
//! A [`Context`] owns the wgpu device and queue, a headless default framebuffer,
//! the fixed-function render state, and the list of recorded command buffers
//! waiting to be submitted. Handles are cheap clones of the same session and are
//! deliberately `!Send`: a context is used from the thread it is current on.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pollster::FutureExt;

use crate::buffer::{UniformBuffer, VertexBuffer};
use crate::drawable::Drawable;
use crate::error::{GlError, GlResult};
use crate::framebuffer::{DefaultFramebuffer, FramebufferObjectBuilder, FramebufferSize};
use crate::program::{Program, ProgramBuilder};
use crate::texture::{
    ColorCubemapBuilder, ColorTextureBuilder, DepthStencilTextureBuilder, DepthTextureArrayBuilder,
    DepthTextureBuilder, StencilTextureBuilder, TextureBuilder,
};

/// Format of the default framebuffer's color buffer.
pub const DEFAULT_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Format of the default framebuffer's depth buffer.
pub const DEFAULT_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_CONTEXT: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Fixed-function state captured by drawables when they build pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub back_face_culling: bool,
    pub alpha_blending: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            back_face_culling: true,
            alpha_blending: false,
        }
    }
}

pub(crate) struct DefaultTargets {
    pub(crate) size: FramebufferSize,
    pub(crate) color: wgpu::Texture,
    pub(crate) color_view: wgpu::TextureView,
    pub(crate) depth_view: wgpu::TextureView,
}

struct ContextShared {
    id: u64,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    features: wgpu::Features,
    limits: wgpu::Limits,
    pending: RefCell<Vec<wgpu::CommandBuffer>>,
    state: Cell<RenderState>,
    default_targets: DefaultTargets,
}

/// Handle to one graphics device session.
#[derive(Clone)]
pub struct Context {
    shared: Rc<ContextShared>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.shared.id)
            .field("adapter", &self.shared.adapter.get_info().name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}

impl Eq for Context {}

/// Optional features used when the adapter offers them.
fn optional_features() -> wgpu::Features {
    wgpu::Features::TEXTURE_COMPRESSION_BC
        | wgpu::Features::FLOAT32_FILTERABLE
        | wgpu::Features::DEPTH32FLOAT_STENCIL8
        | wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES
}

impl Context {
    /// Creates a headless context whose default framebuffer is `width × height`.
    ///
    /// The new context is made current on the calling thread.
    pub async fn new_headless_async(width: u32, height: u32) -> GlResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| GlError::AdapterCreationFailed)?;

        let features = adapter.features() & optional_features();
        let adapter_limits = adapter.limits();
        let limits = wgpu::Limits {
            max_color_attachments: adapter_limits.max_color_attachments,
            max_sampled_textures_per_shader_stage: adapter_limits
                .max_sampled_textures_per_shader_stage,
            max_samplers_per_shader_stage: adapter_limits.max_samplers_per_shader_stage,
            max_uniform_buffers_per_shader_stage: adapter_limits
                .max_uniform_buffers_per_shader_stage,
            max_texture_dimension_2d: adapter_limits.max_texture_dimension_2d,
            max_texture_array_layers: adapter_limits.max_texture_array_layers,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("ibrelight device (headless)"),
                required_features: features,
                required_limits: limits.clone(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await?;

        Ok(Self::from_parts(adapter, device, queue, width, height))
    }

    /// Blocking variant of [`Context::new_headless_async`].
    pub fn new_headless(width: u32, height: u32) -> GlResult<Self> {
        Self::new_headless_async(width, height).block_on()
    }

    /// Wraps an existing device session.
    ///
    /// The new context is made current on the calling thread.
    pub fn from_parts(
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
    ) -> Self {
        let info = adapter.get_info();
        log::info!(
            "graphics context on {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        device.on_uncaptured_error(Arc::new(|error| {
            log::error!("uncaptured graphics error: {error}");
        }));

        let default_targets = create_default_targets(&device, width.max(1), height.max(1));
        let shared = ContextShared {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            features: device.features(),
            limits: device.limits(),
            adapter,
            device,
            queue,
            pending: RefCell::new(Vec::new()),
            state: Cell::new(RenderState::default()),
            default_targets,
        };

        let context = Self {
            shared: Rc::new(shared),
        };
        context.make_current();
        context
    }

    /// Unique id of this session within the process.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Makes this context current on the calling thread.
    pub fn make_current(&self) {
        CURRENT_CONTEXT.with(|current| current.set(Some(self.shared.id)));
    }

    /// Clears the current context of the calling thread if it is this one.
    pub fn release_current(&self) {
        CURRENT_CONTEXT.with(|current| {
            if current.get() == Some(self.shared.id) {
                current.set(None);
            }
        });
    }

    /// Whether this context is current on the calling thread.
    #[must_use]
    pub fn is_current(&self) -> bool {
        CURRENT_CONTEXT.with(|current| current.get() == Some(self.shared.id))
    }

    /// Fails with [`GlError::ContextNotCurrent`] unless this context is current.
    pub fn ensure_current(&self) -> GlResult<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(GlError::ContextNotCurrent)
        }
    }

    /// Fails with [`GlError::ContextMismatch`] unless `other` is the same session.
    pub fn ensure_same(&self, other: &Context) -> GlResult<()> {
        if self == other {
            Ok(())
        } else {
            Err(GlError::ContextMismatch)
        }
    }

    /// The wgpu device.
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.shared.device
    }

    /// The wgpu queue.
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.shared.queue
    }

    /// Adapter description.
    #[must_use]
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.shared.adapter.get_info()
    }

    /// Enabled device features.
    #[must_use]
    pub fn features(&self) -> wgpu::Features {
        self.shared.features
    }

    /// Device limits.
    #[must_use]
    pub fn limits(&self) -> &wgpu::Limits {
        &self.shared.limits
    }

    /// Number of texture units available to one program.
    #[must_use]
    pub fn max_texture_units(&self) -> usize {
        self.shared.limits.max_sampled_textures_per_shader_stage as usize
    }

    /// Number of uniform buffer units available to one program.
    #[must_use]
    pub fn max_uniform_buffer_units(&self) -> usize {
        self.shared.limits.max_uniform_buffers_per_shader_stage as usize
    }

    /// Capabilities of `format` on this device.
    #[must_use]
    pub fn format_features(&self, format: wgpu::TextureFormat) -> wgpu::TextureFormatFeatures {
        if self
            .shared
            .features
            .contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
        {
            self.shared.adapter.get_texture_format_features(format)
        } else {
            format.guaranteed_format_features(self.shared.features)
        }
    }

    /// Current render state.
    #[must_use]
    pub fn state(&self) -> RenderState {
        self.shared.state.get()
    }

    /// Replaces the render state.
    pub fn set_state(&self, state: RenderState) {
        self.shared.state.set(state);
    }

    fn update_state(&self, update: impl FnOnce(&mut RenderState)) {
        let mut state = self.shared.state.get();
        update(&mut state);
        self.shared.state.set(state);
    }

    pub fn enable_depth_test(&self) {
        self.update_state(|s| s.depth_test = true);
    }

    pub fn disable_depth_test(&self) {
        self.update_state(|s| s.depth_test = false);
    }

    pub fn enable_depth_write(&self) {
        self.update_state(|s| s.depth_write = true);
    }

    pub fn disable_depth_write(&self) {
        self.update_state(|s| s.depth_write = false);
    }

    pub fn enable_back_face_culling(&self) {
        self.update_state(|s| s.back_face_culling = true);
    }

    pub fn disable_back_face_culling(&self) {
        self.update_state(|s| s.back_face_culling = false);
    }

    pub fn enable_alpha_blending(&self) {
        self.update_state(|s| s.alpha_blending = true);
    }

    pub fn disable_alpha_blending(&self) {
        self.update_state(|s| s.alpha_blending = false);
    }

    /// Queues a recorded command buffer for the next [`Context::flush`].
    pub(crate) fn enqueue(&self, commands: wgpu::CommandBuffer) {
        self.shared.pending.borrow_mut().push(commands);
    }

    /// Number of command buffers waiting for submission.
    #[must_use]
    pub fn pending_command_count(&self) -> usize {
        self.shared.pending.borrow().len()
    }

    /// Submits all recorded commands.
    pub fn flush(&self) -> GlResult<()> {
        self.ensure_current()?;
        let pending: Vec<_> = self.shared.pending.borrow_mut().drain(..).collect();
        if pending.is_empty() {
            return Ok(());
        }
        self.with_error_scope(|_| {
            self.shared.queue.submit(pending);
        })
    }

    /// Submits all recorded commands and waits for the device to go idle.
    pub fn finish(&self) -> GlResult<()> {
        self.flush()?;
        self.shared
            .device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| GlError::InvalidOperation(e.to_string()))?;
        Ok(())
    }

    /// Runs `operation` inside validation and out-of-memory error scopes.
    ///
    /// Errors raised by the device while `operation` runs are returned instead
    /// of being reported as uncaptured.
    pub fn with_error_scope<T>(&self, operation: impl FnOnce(&wgpu::Device) -> T) -> GlResult<T> {
        let device = &self.shared.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = operation(device);
        let validation = device.pop_error_scope().block_on();
        let out_of_memory = device.pop_error_scope().block_on();

        if let Some(error) = out_of_memory {
            return Err(error.into());
        }
        if let Some(error) = validation {
            return Err(error.into());
        }
        Ok(value)
    }

    pub(crate) fn default_targets(&self) -> &DefaultTargets {
        &self.shared.default_targets
    }

    /// The default (window-equivalent) framebuffer.
    #[must_use]
    pub fn default_framebuffer(&self) -> DefaultFramebuffer {
        DefaultFramebuffer::new(self.clone())
    }

    /// Starts building a 2D color texture.
    #[must_use]
    pub fn build_color_texture_2d(&self, width: u32, height: u32) -> ColorTextureBuilder {
        TextureBuilder::new(self.clone(), width, height, 1)
    }

    /// Starts building a 2D depth texture.
    #[must_use]
    pub fn build_depth_texture_2d(&self, width: u32, height: u32) -> DepthTextureBuilder {
        TextureBuilder::new(self.clone(), width, height, 1)
    }

    /// Starts building a 2D stencil texture.
    #[must_use]
    pub fn build_stencil_texture_2d(&self, width: u32, height: u32) -> StencilTextureBuilder {
        TextureBuilder::new(self.clone(), width, height, 1)
    }

    /// Starts building a 2D combined depth-stencil texture.
    #[must_use]
    pub fn build_depth_stencil_texture_2d(
        &self,
        width: u32,
        height: u32,
    ) -> DepthStencilTextureBuilder {
        TextureBuilder::new(self.clone(), width, height, 1)
    }

    /// Starts building a color cubemap with square faces.
    #[must_use]
    pub fn build_color_cubemap(&self, face_size: u32) -> ColorCubemapBuilder {
        TextureBuilder::new(self.clone(), face_size, face_size, 6)
    }

    /// Starts building an array of 2D depth textures.
    #[must_use]
    pub fn build_depth_texture_array(
        &self,
        width: u32,
        height: u32,
        layers: u32,
    ) -> DepthTextureArrayBuilder {
        TextureBuilder::new(self.clone(), width, height, layers)
    }

    /// Starts building a framebuffer object.
    #[must_use]
    pub fn build_framebuffer_object(&self, width: u32, height: u32) -> FramebufferObjectBuilder {
        FramebufferObjectBuilder::new(self.clone(), FramebufferSize::new(width, height))
    }

    /// Starts building a shader program.
    #[must_use]
    pub fn shader_program_builder(&self) -> ProgramBuilder {
        ProgramBuilder::new(self.clone())
    }

    /// Creates a vertex buffer from tightly packed float vectors.
    pub fn create_vertex_buffer(&self, components: u32, data: &[f32]) -> GlResult<VertexBuffer> {
        VertexBuffer::new(self.clone(), components, data)
    }

    /// Creates the `[-1, 1]²` rectangle as a four-vertex triangle fan.
    pub fn create_rectangle(&self) -> GlResult<VertexBuffer> {
        self.create_vertex_buffer(2, &[-1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0])
    }

    /// Creates a uniform buffer with initial contents.
    pub fn create_uniform_buffer(&self, data: &[u8]) -> GlResult<UniformBuffer> {
        UniformBuffer::new(self.clone(), data)
    }

    /// Creates a drawable around `program`.
    pub fn create_drawable(&self, program: Program) -> GlResult<Drawable> {
        Drawable::new(self.clone(), program)
    }
}

fn create_default_targets(device: &wgpu::Device, width: u32, height: u32) -> DefaultTargets {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("default framebuffer color"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEFAULT_COLOR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("default framebuffer depth"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEFAULT_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

    DefaultTargets {
        size: FramebufferSize::new(width, height),
        color,
        color_view,
        depth_view,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_render_state() {
        let state = RenderState::default();
        assert!(state.depth_test);
        assert!(state.depth_write);
        assert!(state.back_face_culling);
        assert!(!state.alpha_blending);
    }

    #[test]
    fn test_optional_features_are_format_related() {
        let features = optional_features();
        assert!(features.contains(wgpu::Features::TEXTURE_COMPRESSION_BC));
        assert!(features.contains(wgpu::Features::DEPTH32FLOAT_STENCIL8));
    }
}
