//! Rendered-component tree for ibrelight-rs.
//!
//! Components share one lifecycle ([`RenderedComponent`]): initialize, update,
//! reload shaders, draw (whole or in tiles) and close. The tree is built from:
//! - [`LitRoot`] owning [`LightingResources`] and refreshing shadow maps before its content draws
//! - [`IbrSubject`] and [`CameraWidgetGroup`] as lit content
//! - [`ViewSnap`] and [`SplitScreenComponent`] for the light calibration view
//! - [`ProjectRenderingEngine`] composing all of the above into an offscreen frame
//!
//! Batch work over every captured view goes through [`GraphicsStreamFactory`]
//! and the [`RequestQueue`].

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
// Light counts and view indices are passed to shaders as u32
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
// Builders consume self to allow chaining
#![allow(clippy::return_self_not_must_use)]

pub mod camera_widget_group;
pub mod component;
pub mod engine;
pub mod error;
pub mod lighting;
pub mod lit_root;
pub mod request_queue;
pub mod scene_model;
pub mod shader_component;
pub mod split_screen;
pub mod stream;
pub mod subject;
pub mod view_snap;

pub use camera_widget_group::{frustum_lines, CameraWidgetGroup};
pub use component::{Lifecycle, RenderedComponent};
pub use engine::ProjectRenderingEngine;
pub use error::{SceneError, SceneResult};
pub use lighting::{LightingHandle, LightingResources, ShadowLightingResources, SharedLighting};
pub use lit_root::{LitContent, LitRoot};
pub use request_queue::{
    QueueSummary, RenderRequest, RenderRequestBuilder, Request, RequestHandle, RequestQueue,
    RequestTarget, ShaderSetup, VertexShaderChoice,
};
pub use scene_model::{
    LightInstance, SceneModel, SharedSceneModel, SubjectGeometry, MAX_VIRTUAL_LIGHTS,
};
pub use shader_component::{ProgramSpec, ShaderComponent};
pub use split_screen::{SharedComponent, SplitScreenComponent};
pub use stream::{
    clear_attachments, DrawableViewRenderer, GraphicsStreamFactory, ParallelViewRenderStream,
    SequentialViewRenderStream, SingleAttachmentStream, ViewRenderer,
};
pub use subject::IbrSubject;
pub use view_snap::{SnapIndex, ViewSnap};
