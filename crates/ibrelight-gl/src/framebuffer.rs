//! Render targets: the default framebuffer and framebuffer objects.
//!
//! Clears are recorded into the owning context's command list like draws, so they
//! stay ordered with respect to each other. Reads flush the context first.

use std::path::Path;

use ibrelight_core::PixelRect;

use crate::context::{Context, DEFAULT_COLOR_FORMAT, DEFAULT_DEPTH_FORMAT};
use crate::error::{GlError, GlResult};
use crate::format::{ColorFormat, DepthPrecision, TextureFormat};
use crate::readback::{read_texture_into, ColorReadback, ImageFileFormat};
use crate::resource::GraphicsResource;
use crate::texture::Texture;

/// Pixel dimensions of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferSize {
    pub width: u32,
    pub height: u32,
}

impl FramebufferSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The rectangle covering the whole target.
    #[must_use]
    pub fn full_rect(self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }
}

/// Format and sampling options of one framebuffer attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentSpec {
    format: TextureFormat,
    multisamples: u32,
    mipmaps: bool,
    linear_filtering: bool,
}

impl AttachmentSpec {
    fn with_format(format: TextureFormat) -> Self {
        Self {
            format,
            multisamples: 1,
            mipmaps: false,
            linear_filtering: false,
        }
    }

    #[must_use]
    pub fn color(format: ColorFormat) -> Self {
        Self::with_format(TextureFormat::Color(format))
    }

    #[must_use]
    pub fn depth(precision: DepthPrecision) -> Self {
        Self::with_format(TextureFormat::Depth(precision))
    }

    #[must_use]
    pub fn stencil() -> Self {
        Self::with_format(TextureFormat::Stencil)
    }

    #[must_use]
    pub fn depth_stencil(precision: DepthPrecision) -> Self {
        Self::with_format(TextureFormat::DepthStencil(precision))
    }

    #[must_use]
    pub fn with_multisamples(mut self, samples: u32) -> Self {
        self.multisamples = samples;
        self
    }

    #[must_use]
    pub fn with_mipmaps(mut self, enabled: bool) -> Self {
        self.mipmaps = enabled;
        self
    }

    #[must_use]
    pub fn with_linear_filtering(mut self, enabled: bool) -> Self {
        self.linear_filtering = enabled;
        self
    }

    #[must_use]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[must_use]
    pub fn multisamples(&self) -> u32 {
        self.multisamples
    }

    #[must_use]
    pub fn mipmaps(&self) -> bool {
        self.mipmaps
    }

    #[must_use]
    pub fn linear_filtering(&self) -> bool {
        self.linear_filtering
    }
}

/// One color target of a render pass.
#[derive(Debug, Clone)]
pub struct ColorTargetView {
    pub view: wgpu::TextureView,
    pub resolve_target: Option<wgpu::TextureView>,
    pub format: ColorFormat,
}

/// The depth and/or stencil target of a render pass.
#[derive(Debug, Clone)]
pub struct DepthTargetView {
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
}

/// Everything a render pass needs to write into a framebuffer.
#[derive(Debug, Clone)]
pub struct RenderTargets {
    pub colors: Vec<ColorTargetView>,
    pub depth: Option<DepthTargetView>,
    pub sample_count: u32,
    pub size: FramebufferSize,
}

impl RenderTargets {
    /// Backend color formats, in attachment order.
    #[must_use]
    pub fn color_formats(&self) -> Vec<wgpu::TextureFormat> {
        self.colors.iter().map(|c| c.format.to_wgpu()).collect()
    }
}

/// What a clear pass writes.
#[derive(Debug, Clone, Copy)]
enum Clear {
    Color(usize, wgpu::Color),
    Depth(f32),
    Stencil(u32),
}

fn record_clear(context: &Context, targets: &RenderTargets, clear: Clear) -> GlResult<()> {
    context.ensure_current()?;
    let mut color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = Vec::new();
    let mut depth_attachment = None;

    match clear {
        Clear::Color(index, value) => {
            let target = targets.colors.get(index).ok_or_else(|| {
                GlError::config(format!(
                    "color attachment {index} out of range for {} attachments",
                    targets.colors.len()
                ))
            })?;
            color_attachments = (0..index).map(|_| None).collect();
            color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                depth_slice: None,
                resolve_target: target.resolve_target.as_ref(),
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(value),
                    store: wgpu::StoreOp::Store,
                },
            }));
        }
        Clear::Depth(depth) => {
            let target = targets
                .depth
                .as_ref()
                .filter(|d| d.format.has_depth_aspect())
                .ok_or_else(|| GlError::config("framebuffer has no depth attachment"))?;
            depth_attachment = Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });
        }
        Clear::Stencil(value) => {
            let target = targets
                .depth
                .as_ref()
                .filter(|d| d.format.has_stencil_aspect())
                .ok_or_else(|| GlError::config("framebuffer has no stencil attachment"))?;
            depth_attachment = Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.view,
                depth_ops: None,
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(value),
                    store: wgpu::StoreOp::Store,
                }),
            });
        }
    }

    let mut encoder = context
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("ibrelight clear encoder"),
        });
    {
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ibrelight clear pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_attachment,
            ..Default::default()
        });
    }
    context.enqueue(encoder.finish());
    Ok(())
}

/// A render target that can be drawn into, cleared and read back.
pub trait Framebuffer {
    /// The owning context.
    fn context(&self) -> &Context;

    fn size(&self) -> FramebufferSize;

    /// Views for a render pass.
    fn render_targets(&self) -> GlResult<RenderTargets>;

    /// The single-sampled texture holding color attachment `index`.
    fn readback_source(&self, index: usize) -> GlResult<(wgpu::Texture, ColorFormat)>;

    fn color_attachment_count(&self) -> usize;

    /// The viewport covering the whole framebuffer.
    fn full_viewport(&self) -> PixelRect {
        self.size().full_rect()
    }

    fn clear_color_buffer(&self, index: usize, color: [f32; 4]) -> GlResult<()> {
        let targets = self.render_targets()?;
        if targets
            .colors
            .get(index)
            .is_some_and(|c| c.format.is_integer())
        {
            return Err(GlError::config(format!(
                "color attachment {index} holds integers; use an integer clear"
            )));
        }
        let [r, g, b, a] = color.map(f64::from);
        record_clear(self.context(), &targets, Clear::Color(index, wgpu::Color { r, g, b, a }))
    }

    fn clear_integer_color_buffer(&self, index: usize, value: [i32; 4]) -> GlResult<()> {
        let targets = self.render_targets()?;
        let [r, g, b, a] = value.map(f64::from);
        record_clear(self.context(), &targets, Clear::Color(index, wgpu::Color { r, g, b, a }))
    }

    /// Clears depth to the far plane.
    fn clear_depth_buffer(&self) -> GlResult<()> {
        self.clear_depth_buffer_to(1.0)
    }

    fn clear_depth_buffer_to(&self, depth: f32) -> GlResult<()> {
        let targets = self.render_targets()?;
        record_clear(self.context(), &targets, Clear::Depth(depth))
    }

    fn clear_stencil_buffer(&self, value: u32) -> GlResult<()> {
        let targets = self.render_targets()?;
        record_clear(self.context(), &targets, Clear::Stencil(value))
    }

    /// Reads color attachment `index` into a new readback.
    fn read_color_buffer(&self, index: usize) -> GlResult<ColorReadback> {
        let (_, format) = self.readback_source(index)?;
        let size = self.size();
        let mut readback = ColorReadback::new(size.width, size.height, format);
        self.read_color_buffer_into(index, &mut readback)?;
        Ok(readback)
    }

    /// Reads color attachment `index` into an existing readback, reusing its storage.
    fn read_color_buffer_into(&self, index: usize, readback: &mut ColorReadback) -> GlResult<()> {
        let (texture, format) = self.readback_source(index)?;
        read_texture_into(self.context(), &texture, format, readback)
    }

    /// Reads color attachment `index` and encodes it to `path`.
    fn save_to_file(
        &self,
        index: usize,
        file_format: ImageFileFormat,
        path: &Path,
    ) -> GlResult<()> {
        self.read_color_buffer(index)?.save(path, file_format)
    }

    /// Submits recorded work for this framebuffer's context.
    fn flush(&self) -> GlResult<()> {
        self.context().flush()
    }
}

/// The context's built-in render target.
#[derive(Debug, Clone)]
pub struct DefaultFramebuffer {
    context: Context,
}

impl DefaultFramebuffer {
    pub(crate) fn new(context: Context) -> Self {
        Self { context }
    }
}

impl Framebuffer for DefaultFramebuffer {
    fn context(&self) -> &Context {
        &self.context
    }

    fn size(&self) -> FramebufferSize {
        self.context.default_targets().size
    }

    fn render_targets(&self) -> GlResult<RenderTargets> {
        self.context.ensure_current()?;
        let targets = self.context.default_targets();
        Ok(RenderTargets {
            colors: vec![ColorTargetView {
                view: targets.color_view.clone(),
                resolve_target: None,
                format: ColorFormat::RGBA8,
            }],
            depth: Some(DepthTargetView {
                view: targets.depth_view.clone(),
                format: DEFAULT_DEPTH_FORMAT,
            }),
            sample_count: 1,
            size: targets.size,
        })
    }

    fn readback_source(&self, index: usize) -> GlResult<(wgpu::Texture, ColorFormat)> {
        self.context.ensure_current()?;
        if index != 0 {
            return Err(GlError::config(format!(
                "default framebuffer has one color attachment, asked for {index}"
            )));
        }
        debug_assert_eq!(DEFAULT_COLOR_FORMAT, ColorFormat::RGBA8.to_wgpu());
        Ok((self.context.default_targets().color.clone(), ColorFormat::RGBA8))
    }

    fn color_attachment_count(&self) -> usize {
        1
    }
}

/// Configures a [`FramebufferObject`].
#[derive(Debug)]
pub struct FramebufferObjectBuilder {
    context: Context,
    size: FramebufferSize,
    colors: Vec<AttachmentSpec>,
    depth: Vec<AttachmentSpec>,
}

impl FramebufferObjectBuilder {
    pub(crate) fn new(context: Context, size: FramebufferSize) -> Self {
        Self {
            context,
            size,
            colors: Vec::new(),
            depth: Vec::new(),
        }
    }

    #[must_use]
    pub fn add_color_attachment(mut self, spec: AttachmentSpec) -> Self {
        self.colors.push(spec);
        self
    }

    #[must_use]
    pub fn add_color_attachments(mut self, spec: AttachmentSpec, count: usize) -> Self {
        self.colors.extend(std::iter::repeat(spec).take(count));
        self
    }

    #[must_use]
    pub fn add_depth_attachment(mut self, spec: AttachmentSpec) -> Self {
        self.depth.push(spec);
        self
    }

    #[must_use]
    pub fn add_stencil_attachment(mut self, spec: AttachmentSpec) -> Self {
        self.depth.push(spec);
        self
    }

    #[must_use]
    pub fn add_depth_stencil_attachment(mut self, spec: AttachmentSpec) -> Self {
        self.depth.push(spec);
        self
    }

    /// Validates the attachments and allocates their textures.
    pub fn create_framebuffer_object(self) -> GlResult<FramebufferObject> {
        self.context.ensure_current()?;
        validate_attachments(
            &self.colors,
            &self.depth,
            self.context.limits().max_color_attachments as usize,
        )?;
        let FramebufferSize { width, height } = self.size;

        let mut colors = Vec::with_capacity(self.colors.len());
        for spec in &self.colors {
            let Some(format) = spec.format.color() else {
                continue;
            };
            let texture = self
                .context
                .build_color_texture_2d(width, height)
                .set_internal_format(format)
                .set_multisamples(spec.multisamples)
                .set_mipmaps_enabled(spec.mipmaps)
                .set_linear_filtering_enabled(spec.linear_filtering)
                .create_texture()?;
            let resolve = if spec.multisamples > 1 {
                Some(
                    self.context
                        .build_color_texture_2d(width, height)
                        .set_internal_format(format)
                        .set_linear_filtering_enabled(spec.linear_filtering)
                        .create_texture()?,
                )
            } else {
                None
            };
            let view = texture.attachment_view(0)?;
            let resolve_view = resolve.as_ref().map(|r| r.attachment_view(0)).transpose()?;
            colors.push(ColorAttachment {
                texture,
                resolve,
                view,
                resolve_view,
                format,
            });
        }

        let depth = match self.depth.first() {
            Some(spec) => {
                let texture = build_depth_like(&self.context, self.size, spec)?;
                let view = texture.attachment_view(0)?;
                Some(DepthAttachment {
                    format: texture.storage_format(),
                    owned: Some(texture),
                    view,
                })
            }
            None => None,
        };

        let sample_count = self
            .colors
            .iter()
            .chain(&self.depth)
            .map(|spec| spec.multisamples)
            .next()
            .unwrap_or(1);

        log::debug!(
            "created {}x{} framebuffer object with {} color attachment(s)",
            width,
            height,
            colors.len()
        );

        Ok(FramebufferObject {
            context: self.context,
            size: self.size,
            colors,
            depth,
            sample_count,
            closed: false,
        })
    }
}

fn build_depth_like(
    context: &Context,
    size: FramebufferSize,
    spec: &AttachmentSpec,
) -> GlResult<Texture> {
    let FramebufferSize { width, height } = size;
    match spec.format {
        TextureFormat::Depth(precision) => context
            .build_depth_texture_2d(width, height)
            .set_depth_precision(precision)
            .set_multisamples(spec.multisamples)
            .set_linear_filtering_enabled(spec.linear_filtering)
            .create_texture(),
        TextureFormat::DepthStencil(precision) => context
            .build_depth_stencil_texture_2d(width, height)
            .set_depth_precision(precision)
            .set_multisamples(spec.multisamples)
            .set_linear_filtering_enabled(spec.linear_filtering)
            .create_texture(),
        TextureFormat::Stencil => context
            .build_stencil_texture_2d(width, height)
            .set_multisamples(spec.multisamples)
            .create_texture(),
        other => Err(GlError::config(format!(
            "{other:?} cannot be a depth or stencil attachment"
        ))),
    }
}

/// Attachment rules checked before any allocation.
pub(crate) fn validate_attachments(
    colors: &[AttachmentSpec],
    depth: &[AttachmentSpec],
    max_color_attachments: usize,
) -> GlResult<()> {
    if colors.is_empty() && depth.is_empty() {
        return Err(GlError::config(
            "a framebuffer object needs at least one attachment",
        ));
    }
    if colors.len() > max_color_attachments {
        return Err(GlError::config(format!(
            "{} color attachments exceed the device limit of {max_color_attachments}",
            colors.len()
        )));
    }
    if depth.len() > 1 {
        return Err(GlError::config(
            "a framebuffer object takes at most one depth, stencil or depth-stencil attachment",
        ));
    }
    if let Some(spec) = colors.iter().find(|s| s.format.color().is_none()) {
        return Err(GlError::config(format!(
            "{:?} is not a color format",
            spec.format
        )));
    }
    if let Some(spec) = depth.iter().find(|s| s.format.color().is_some()) {
        return Err(GlError::config(format!(
            "{:?} is not a depth or stencil format",
            spec.format
        )));
    }

    let mut samples = colors.iter().chain(depth).map(|s| s.multisamples);
    if let Some(first) = samples.next() {
        if samples.any(|s| s != first) {
            return Err(GlError::config(
                "all attachments must share one sample count",
            ));
        }
    }
    if let Some(spec) = colors
        .iter()
        .find(|s| s.multisamples > 1 && s.format.color().is_some_and(ColorFormat::is_integer))
    {
        return Err(GlError::config(format!(
            "integer attachment {:?} cannot be multisampled",
            spec.format
        )));
    }
    Ok(())
}

struct ColorAttachment {
    texture: Texture,
    resolve: Option<Texture>,
    view: wgpu::TextureView,
    resolve_view: Option<wgpu::TextureView>,
    format: ColorFormat,
}

impl ColorAttachment {
    fn sampled(&self) -> &Texture {
        self.resolve.as_ref().unwrap_or(&self.texture)
    }
}

struct DepthAttachment {
    owned: Option<Texture>,
    format: wgpu::TextureFormat,
    view: wgpu::TextureView,
}

/// An off-screen render target owning its attachment textures.
pub struct FramebufferObject {
    context: Context,
    size: FramebufferSize,
    colors: Vec<ColorAttachment>,
    depth: Option<DepthAttachment>,
    sample_count: u32,
    closed: bool,
}

impl std::fmt::Debug for FramebufferObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramebufferObject")
            .field("size", &self.size)
            .field("colors", &self.colors.len())
            .field("has_depth", &self.depth.is_some())
            .field("sample_count", &self.sample_count)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl FramebufferObject {
    fn ensure_open(&self) -> GlResult<()> {
        self.context.ensure_current()?;
        if self.closed {
            Err(GlError::ResourceClosed("framebuffer object"))
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// The sampleable texture of color attachment `index` (resolved if multisampled).
    pub fn color_texture(&self, index: usize) -> GlResult<&Texture> {
        self.ensure_open()?;
        self.colors
            .get(index)
            .map(ColorAttachment::sampled)
            .ok_or_else(|| GlError::config(format!("no color attachment {index}")))
    }

    /// The owned depth texture, if the depth attachment was not replaced.
    pub fn depth_texture(&self) -> GlResult<Option<&Texture>> {
        self.ensure_open()?;
        Ok(self.depth.as_ref().and_then(|d| d.owned.as_ref()))
    }

    /// Redirects depth writes to one layer of a depth texture array.
    ///
    /// The framebuffer does not take ownership of `texture`; an owned depth
    /// attachment is closed.
    pub fn set_depth_attachment_layer(&mut self, texture: &Texture, layer: u32) -> GlResult<()> {
        self.ensure_open()?;
        self.context.ensure_same(texture.context())?;
        if !matches!(
            texture.format(),
            TextureFormat::Depth(_) | TextureFormat::DepthStencil(_)
        ) {
            return Err(GlError::config(format!(
                "{:?} is not a depth format",
                texture.format()
            )));
        }
        if (texture.width(), texture.height()) != (self.size.width, self.size.height) {
            return Err(GlError::config(format!(
                "depth layer is {}x{}, framebuffer is {}x{}",
                texture.width(),
                texture.height(),
                self.size.width,
                self.size.height
            )));
        }
        if texture.multisamples() != self.sample_count {
            return Err(GlError::config(
                "depth layer sample count differs from the framebuffer",
            ));
        }

        let view = texture.attachment_view(layer)?;
        if let Some(mut previous) = self.depth.take().and_then(|d| d.owned) {
            previous.close();
        }
        self.depth = Some(DepthAttachment {
            owned: None,
            format: texture.storage_format(),
            view,
        });
        Ok(())
    }
}

impl Framebuffer for FramebufferObject {
    fn context(&self) -> &Context {
        &self.context
    }

    fn size(&self) -> FramebufferSize {
        self.size
    }

    fn render_targets(&self) -> GlResult<RenderTargets> {
        self.ensure_open()?;
        Ok(RenderTargets {
            colors: self
                .colors
                .iter()
                .map(|c| ColorTargetView {
                    view: c.view.clone(),
                    resolve_target: c.resolve_view.clone(),
                    format: c.format,
                })
                .collect(),
            depth: self.depth.as_ref().map(|d| DepthTargetView {
                view: d.view.clone(),
                format: d.format,
            }),
            sample_count: self.sample_count,
            size: self.size,
        })
    }

    fn readback_source(&self, index: usize) -> GlResult<(wgpu::Texture, ColorFormat)> {
        self.ensure_open()?;
        let attachment = self
            .colors
            .get(index)
            .ok_or_else(|| GlError::config(format!("no color attachment {index}")))?;
        Ok((attachment.sampled().raw()?.clone(), attachment.format))
    }

    fn color_attachment_count(&self) -> usize {
        self.colors.len()
    }
}

impl GraphicsResource for FramebufferObject {
    fn close(&mut self) {
        if self.closed {
            return;
        }
        for mut attachment in self.colors.drain(..) {
            attachment.texture.close();
            if let Some(resolve) = attachment.resolve.as_mut() {
                resolve.close();
            }
        }
        if let Some(mut owned) = self.depth.take().and_then(|d| d.owned) {
            owned.close();
        }
        self.closed = true;
        log::debug!(
            "closed {}x{} framebuffer object",
            self.size.width,
            self.size.height
        );
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for FramebufferObject {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_rect_covers_target() {
        let rect = FramebufferSize::new(640, 480).full_rect();
        assert_eq!(rect, PixelRect::new(0, 0, 640, 480));
    }

    #[test]
    fn test_attachment_spec_setters() {
        let spec = AttachmentSpec::color(ColorFormat::RGBA16F)
            .with_multisamples(4)
            .with_linear_filtering(true);
        assert_eq!(spec.format(), TextureFormat::Color(ColorFormat::RGBA16F));
        assert_eq!(spec.multisamples(), 4);
        assert!(spec.linear_filtering());
        assert!(!spec.mipmaps());
    }

    #[test]
    fn test_needs_an_attachment() {
        assert!(validate_attachments(&[], &[], 8).is_err());
        let depth = [AttachmentSpec::depth(DepthPrecision::Fixed24)];
        assert!(validate_attachments(&[], &depth, 8).is_ok());
    }

    #[test]
    fn test_color_limit_and_single_depth() {
        let colors = vec![AttachmentSpec::color(ColorFormat::RGBA8); 9];
        assert!(validate_attachments(&colors, &[], 8).is_err());

        let depth = [
            AttachmentSpec::depth(DepthPrecision::Fixed24),
            AttachmentSpec::stencil(),
        ];
        assert!(validate_attachments(&colors[..1], &depth, 8).is_err());
    }

    #[test]
    fn test_sample_counts_must_match() {
        let colors = [
            AttachmentSpec::color(ColorFormat::RGBA8).with_multisamples(4),
            AttachmentSpec::color(ColorFormat::RGBA8),
        ];
        assert!(validate_attachments(&colors, &[], 8).is_err());

        let colors = [AttachmentSpec::color(ColorFormat::RGBA8).with_multisamples(4)];
        let depth = [AttachmentSpec::depth(DepthPrecision::Fixed24).with_multisamples(4)];
        assert!(validate_attachments(&colors, &depth, 8).is_ok());
    }

    #[test]
    fn test_integer_attachment_cannot_be_multisampled() {
        let colors = [AttachmentSpec::color(ColorFormat::R8UI).with_multisamples(4)];
        assert!(validate_attachments(&colors, &[], 8).is_err());
    }

    #[test]
    fn test_slots_reject_wrong_kinds() {
        let colors = [AttachmentSpec::depth(DepthPrecision::Fixed24)];
        assert!(validate_attachments(&colors, &[], 8).is_err());
        let depth = [AttachmentSpec::color(ColorFormat::RGBA8)];
        assert!(validate_attachments(&[], &depth, 8).is_err());
    }
}
