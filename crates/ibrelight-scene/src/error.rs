//! Render graph error types.

use ibrelight_core::CoreError;
use ibrelight_gl::GlError;
use thiserror::Error;

/// Errors that can occur while building or drawing the render graph.
#[derive(Error, Debug)]
pub enum SceneError {
    /// A component was used before `initialize` succeeded.
    #[error("{0} used before initialization")]
    NotInitialized(&'static str),

    /// A component, or a resource it borrows, was used after it was closed.
    #[error("{0} has been closed")]
    Closed(&'static str),

    /// Graphics layer error.
    #[error(transparent)]
    Gl(#[from] GlError),

    /// Core error, including cancellation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A parallel stream worker panicked.
    #[error("view stream worker panicked")]
    WorkerPanicked,

    /// A single-attachment stream was driven by a renderer without color attachments.
    #[error("view renderer has no color attachments")]
    NoColorAttachments,
}

impl SceneError {
    /// Whether this error is a cancellation request rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Core(CoreError::Cancelled))
    }
}

impl From<std::io::Error> for SceneError {
    fn from(e: std::io::Error) -> Self {
        Self::Core(CoreError::Io(e))
    }
}

/// Result type alias for render graph operations.
pub type SceneResult<T> = std::result::Result<T, SceneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_recognized() {
        assert!(SceneError::from(CoreError::Cancelled).is_cancelled());
        assert!(!SceneError::NotInitialized("subject").is_cancelled());
    }

    #[test]
    fn test_gl_errors_convert() {
        let error: SceneError = GlError::ContextNotCurrent.into();
        assert!(matches!(error, SceneError::Gl(GlError::ContextNotCurrent)));
    }
}
