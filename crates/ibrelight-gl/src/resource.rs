//! The ownership contract shared by every GPU-backed object.

/// A GPU object with deterministic release.
///
/// Closing is idempotent: the first call releases the GPU memory, later calls do
/// nothing. Every implementor also closes itself when dropped, so scoped
/// ownership releases memory even on early returns.
pub trait GraphicsResource {
    /// Releases the underlying GPU object.
    fn close(&mut self);

    /// Whether [`GraphicsResource::close`] has been called.
    fn is_closed(&self) -> bool;
}
