//! Graphics resource layer for ibrelight-rs.
//!
//! This crate wraps wgpu behind a small, context-centred API:
//! - [`Context`] owns the device session and is the factory for every resource
//! - typed texture builders ([`ColorTextureBuilder`], [`DepthTextureArrayBuilder`], ...)
//! - [`FramebufferObject`] and the [`Framebuffer`] trait with clears and readback
//! - [`Program`] compiled from WGSL with reflected uniforms, textures and attributes
//! - [`Drawable`] pairing a program with vertex buffers
//!
//! Every resource implements [`GraphicsResource`]: `close` is idempotent and
//! also runs on drop.

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
// Pixel and texel math converts freely between integer widths and floats
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
// Builders consume self to allow chaining
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]

pub mod buffer;
pub mod context;
pub mod drawable;
pub mod error;
pub mod format;
pub mod framebuffer;
pub mod program;
pub mod readback;
pub mod reflect;
pub mod resource;
pub mod texture;

pub use buffer::{UniformBuffer, VertexBuffer};
pub use context::{Context, RenderState, DEFAULT_COLOR_FORMAT, DEFAULT_DEPTH_FORMAT};
pub use drawable::{Drawable, PrimitiveMode};
pub use error::{GlError, GlResult};
pub use format::{ColorFormat, CompressionFormat, DataType, DepthPrecision, TextureFormat};
pub use framebuffer::{
    AttachmentSpec, DefaultFramebuffer, Framebuffer, FramebufferObject, FramebufferObjectBuilder,
    FramebufferSize, RenderTargets,
};
pub use program::{DefineValue, Program, ProgramBuilder, ShaderType, UniformValue};
pub use readback::{ColorReadback, ImageFileFormat};
pub use reflect::ProgramInterface;
pub use resource::GraphicsResource;
pub use texture::{
    ColorCubemapBuilder, ColorTextureBuilder, CubemapFace, DepthStencilTextureBuilder,
    DepthTextureArrayBuilder, DepthTextureBuilder, StencilTextureBuilder, Texture, TextureBuilder,
    TextureShape,
};

// Re-export wgpu so callers can name adapter and device types
pub use wgpu;
