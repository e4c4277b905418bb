//! Graphics error types.
//!
//! Errors fall into the groups callers handle differently: configuration and
//! capacity errors from builders, compile and link errors with their logs, I/O
//! errors for missing shader files, and driver errors mapped one-to-one from
//! backend error codes.

use std::path::PathBuf;

use ibrelight_core::CoreError;
use thiserror::Error;

use crate::program::ShaderType;

/// Errors that can occur in the graphics layer.
#[derive(Error, Debug)]
pub enum GlError {
    /// A builder was configured with an unsupported combination of options.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A bounded unit table overflowed, or another core operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A shader stage failed to compile.
    #[error("{stage} shader failed to compile:\n{log}")]
    ShaderCompile { stage: ShaderType, log: String },

    /// Shader stages failed to link into a program.
    #[error("program failed to link:\n{log}")]
    ProgramLink { log: String },

    /// A program was used before it was successfully linked.
    #[error("program is not linked")]
    UnlinkedProgram,

    /// A shader source file does not exist.
    #[error("shader file not found: {}", path.display())]
    ShaderFileNotFound { path: PathBuf },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A resource was used after it was closed.
    #[error("{0} has been closed")]
    ResourceClosed(&'static str),

    /// A resource was used while its context is not current on this thread.
    #[error("the owning context is not current on this thread")]
    ContextNotCurrent,

    /// Resources from two different contexts were combined.
    #[error("resource belongs to a different context")]
    ContextMismatch,

    /// The backend cannot draw the requested primitive mode.
    #[error("unsupported primitive mode: {0:?}")]
    UnsupportedPrimitiveMode(crate::drawable::PrimitiveMode),

    /// Driver reported an invalid enumeration value.
    #[error("invalid enum")]
    InvalidEnum,

    /// Driver reported an invalid argument value.
    #[error("invalid value")]
    InvalidValue,

    /// Driver rejected an operation in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Driver rejected an operation on an incomplete framebuffer.
    #[error("invalid framebuffer operation")]
    InvalidFramebufferOperation,

    /// Driver state stack overflowed.
    #[error("stack overflow")]
    StackOverflow,

    /// Driver state stack underflowed.
    #[error("stack underflow")]
    StackUnderflow,

    /// Device memory is exhausted.
    #[error("out of graphics memory")]
    OutOfMemory,

    /// A driver error code with no dedicated variant.
    #[error("unknown driver error 0x{0:04X}")]
    UnknownDriverError(u32),

    /// No graphics adapter is available.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create a device on the adapter.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// Mapping a readback buffer failed.
    #[error("GPU readback failed")]
    ReadbackFailed,

    /// Image encoding or decoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl GlError {
    /// Maps a classic driver error code onto its error, or `None` for "no error".
    #[must_use]
    pub fn from_driver_code(code: u32) -> Option<Self> {
        match code {
            0 => None,
            0x0500 => Some(Self::InvalidEnum),
            0x0501 => Some(Self::InvalidValue),
            0x0502 => Some(Self::InvalidOperation(String::from("driver rejected operation"))),
            0x0503 => Some(Self::StackOverflow),
            0x0504 => Some(Self::StackUnderflow),
            0x0505 => Some(Self::OutOfMemory),
            0x0506 => Some(Self::InvalidFramebufferOperation),
            other => Some(Self::UnknownDriverError(other)),
        }
    }

    /// Whether this error means the device ran out of resources and should be
    /// shown to the user rather than treated as a bug.
    #[must_use]
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::OutOfMemory)
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<wgpu::Error> for GlError {
    fn from(error: wgpu::Error) -> Self {
        match error {
            wgpu::Error::OutOfMemory { .. } => Self::OutOfMemory,
            wgpu::Error::Validation { description, .. } => Self::InvalidOperation(description),
            wgpu::Error::Internal { description, .. } => {
                log::error!("internal graphics error: {description}");
                Self::UnknownDriverError(u32::MAX)
            }
        }
    }
}

/// A specialized Result type for graphics operations.
pub type GlResult<T> = std::result::Result<T, GlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_codes_map_one_to_one() {
        assert!(GlError::from_driver_code(0).is_none());
        assert!(matches!(GlError::from_driver_code(0x0500), Some(GlError::InvalidEnum)));
        assert!(matches!(GlError::from_driver_code(0x0501), Some(GlError::InvalidValue)));
        assert!(matches!(
            GlError::from_driver_code(0x0502),
            Some(GlError::InvalidOperation(_))
        ));
        assert!(matches!(GlError::from_driver_code(0x0503), Some(GlError::StackOverflow)));
        assert!(matches!(GlError::from_driver_code(0x0504), Some(GlError::StackUnderflow)));
        assert!(matches!(GlError::from_driver_code(0x0505), Some(GlError::OutOfMemory)));
        assert!(matches!(
            GlError::from_driver_code(0x0506),
            Some(GlError::InvalidFramebufferOperation)
        ));
        assert!(matches!(
            GlError::from_driver_code(0x9999),
            Some(GlError::UnknownDriverError(0x9999))
        ));
    }

    #[test]
    fn test_only_out_of_memory_is_exhaustion() {
        assert!(GlError::OutOfMemory.is_resource_exhaustion());
        assert!(!GlError::InvalidEnum.is_resource_exhaustion());
        assert!(!GlError::Core(CoreError::NoAvailableUnits {
            kind: "texture",
            capacity: 16
        })
        .is_resource_exhaustion());
    }

    #[test]
    fn test_messages_carry_logs() {
        let err = GlError::ProgramLink {
            log: String::from("missing entry point"),
        };
        assert!(err.to_string().contains("missing entry point"));

        let err = GlError::ShaderFileNotFound {
            path: PathBuf::from("shaders/missing.frag.wgsl"),
        };
        assert!(err.to_string().contains("missing.frag.wgsl"));
    }
}
