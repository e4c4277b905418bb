//! Error type of the ibrelight facade.

use thiserror::Error;

/// Errors surfaced by the top-level API.
#[derive(Error, Debug)]
pub enum IbrelightError {
    /// Bookkeeping, math or loading failure.
    #[error(transparent)]
    Core(#[from] ibrelight_core::CoreError),

    /// Graphics resource failure.
    #[error(transparent)]
    Gl(#[from] ibrelight_gl::GlError),

    /// Render graph failure.
    #[error(transparent)]
    Scene(#[from] ibrelight_scene::SceneError),

    /// Mesh arrays that cannot be uploaded as subject geometry.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed project description.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for the facade.
pub type Result<T> = std::result::Result<T, IbrelightError>;
