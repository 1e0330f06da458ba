//! Graphics error types.

use thiserror::Error;

/// Errors that can occur in the graphics core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize a backend or context.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a GPU resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A requested feature is not supported by the device.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Shader translation, compilation or linking failed.
    #[error("shader compilation failed: {0}")]
    ShaderCompilationFailed(String),
    /// The owning context was discarded.
    #[error("context discarded")]
    ContextDiscarded,
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the crate.
pub type GraphicsResult<T> = Result<T, GraphicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");
    }

    #[test]
    fn test_shader_error_display() {
        let err = GraphicsError::ShaderCompilationFailed("missing entry point".into());
        assert_eq!(
            err.to_string(),
            "shader compilation failed: missing entry point"
        );
    }
}
