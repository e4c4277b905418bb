//! ibrelight-rs: image-based relighting on top of wgpu.
//!
//! The workspace is layered:
//! - `ibrelight-core`: GPU-free bookkeeping (unit tables, viewports, view sets, loading monitors)
//! - `ibrelight-gl`: the graphics context and its resources (textures, framebuffers, programs)
//! - `ibrelight-scene`: the rendered-component tree and the project rendering engine
//!
//! This crate re-exports all three and adds project files, mesh upload and
//! headless rendering.
//!
//! # Quick Start
//!
//! ```no_run
//! use ibrelight::*;
//!
//! fn main() -> Result<()> {
//!     init_logging();
//!
//!     let project = ProjectDescription::load("project.json")?;
//!     let mesh = MeshData::new(
//!         vec![Vec3::ZERO, Vec3::X, Vec3::Y],
//!         vec![Vec3::Z; 3],
//!     );
//!     render_to_file(&project, &mesh, "frame.png", 800, 600)?;
//!     Ok(())
//! }
//! ```

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
// Builders consume self to allow chaining
#![allow(clippy::return_self_not_must_use)]
// Pass-through wrappers take owned values for ergonomics
#![allow(clippy::needless_pass_by_value)]

pub mod error;
pub mod headless;
pub mod init;
pub mod mesh;
pub mod project;

pub use error::{IbrelightError, Result};
pub use headless::{render_to_file, render_to_image, render_view_to_image, render_views_to_directory};
pub use init::init_logging;
pub use mesh::MeshData;
pub use project::{LightSpec, ProjectDescription};

// Re-export core types
pub use ibrelight_core::{
    snap_to_view, CameraViewport, CancellationToken, CapturedView, CoreError, LoadingMonitor,
    LoadingSession, NullMonitor, PixelRect, RenderSettings, ResourceManager, SnapResult,
    SplitLayout, SplitSide, TrackedMonitor, ViewProjection, ViewSet, ViewSetData,
};
pub use ibrelight_core::{Mat4, Vec2, Vec3, Vec4};

// Re-export graphics types
pub use ibrelight_gl::{
    AttachmentSpec, ColorFormat, ColorReadback, Context, DepthPrecision, Drawable, Framebuffer,
    FramebufferObject, FramebufferSize, GlError, GraphicsResource, ImageFileFormat, PrimitiveMode,
    Program, ShaderType, Texture, TextureFormat, VertexBuffer,
};

// Re-export the render graph
pub use ibrelight_scene::{
    CameraWidgetGroup, GraphicsStreamFactory, IbrSubject, LightInstance, LitContent, LitRoot,
    ProjectRenderingEngine, QueueSummary, RenderRequest, RenderedComponent, RequestQueue,
    RequestTarget, SceneError, SceneModel, SplitScreenComponent, SubjectGeometry,
    VertexShaderChoice, ViewSnap,
};
