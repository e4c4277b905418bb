//! GPU-free foundations for ibrelight-rs.
//!
//! This crate holds everything the rendering layers need that does not touch the GPU:
//! - [`ResourceManager`] for bounded unit assignment
//! - [`CameraViewport`] and viewport subdivision for tiled drawing
//! - [`SplitLayout`] for routing tiles across a split screen
//! - [`ViewSet`] and [`snap_to_view`] for captured camera poses
//! - [`LoadingMonitor`], [`LoadingSession`] and [`CancellationToken`] for long operations
//! - [`RenderSettings`] configuration

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Settings structs legitimately have many boolean flags
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
// Pixel math converts between u32 sizes and i32 coordinates
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod cancel;
pub mod error;
pub mod loading;
pub mod matrix;
pub mod options;
pub mod resource_manager;
pub mod split;
pub mod view_set;
pub mod view_snap;
pub mod viewport;

pub use cancel::CancellationToken;
pub use error::{CoreError, CoreResult};
pub use loading::{LoadingMonitor, LoadingSession, NullMonitor, TrackedMonitor};
pub use matrix::{forward_direction, quick_inverse, view_position};
pub use options::RenderSettings;
pub use resource_manager::ResourceManager;
pub use split::{SplitDraw, SplitLayout, SplitSide};
pub use view_set::{CapturedView, ViewProjection, ViewSet, ViewSetData};
pub use view_snap::{snap_to_view, SnapResult};
pub use viewport::{tile_crop, CameraViewport, PixelRect};

// Re-export glam types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};
