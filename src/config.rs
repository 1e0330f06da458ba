//! Context configuration.

use std::fmt;
use std::sync::Arc;

use crate::caps::Caps;
use crate::pipeline::{DefaultShaderErrorHandler, ShaderErrorHandler};

/// Backend selection for a [`Context`](crate::Context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// No-op backend that records commands, for tests and headless tooling.
    #[default]
    Dummy,
    /// OpenGL 4.3+ via glow. Requires a caller-provided current context.
    OpenGl,
    /// Vulkan 1.3 via ash, headless.
    Vulkan,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dummy => write!(f, "Dummy"),
            Self::OpenGl => write!(f, "OpenGL"),
            Self::Vulkan => write!(f, "Vulkan"),
        }
    }
}

/// Options used when creating a context.
///
/// # Example
///
/// ```ignore
/// let options = ContextOptions::new()
///     .with_backend(BackendType::Vulkan)
///     .with_resource_budget(96 * 1024 * 1024)
///     .with_validation(true);
/// let context = Context::new(options)?;
/// ```
#[derive(Clone)]
pub struct ContextOptions {
    /// Backend to create.
    pub backend: BackendType,
    /// Bytes of budgeted resources the cache keeps before purging.
    pub max_resource_budget: u64,
    /// Block size for the vertex and instance buffer pools.
    pub vertex_block_size: u64,
    /// Block size for the uniform buffer pool.
    pub uniform_block_size: u64,
    /// Enable API validation (Vulkan layers, GL debug output).
    pub validation: bool,
    /// Receives shader translation and compilation failures.
    pub shader_error_handler: Arc<dyn ShaderErrorHandler>,
    /// Capabilities used by deferred contexts and the dummy backend.
    pub caps: Option<Caps>,
}

impl ContextOptions {
    /// Default resource budget: 256 MiB.
    pub const DEFAULT_RESOURCE_BUDGET: u64 = 256 * 1024 * 1024;
    /// Default vertex/instance pool block: 64 KiB.
    pub const DEFAULT_VERTEX_BLOCK_SIZE: u64 = 64 * 1024;
    /// Default uniform pool block: 16 KiB.
    pub const DEFAULT_UNIFORM_BLOCK_SIZE: u64 = 16 * 1024;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_resource_budget(mut self, bytes: u64) -> Self {
        self.max_resource_budget = bytes;
        self
    }

    pub fn with_buffer_block_size(mut self, vertex: u64, uniform: u64) -> Self {
        self.vertex_block_size = vertex;
        self.uniform_block_size = uniform;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation = enabled;
        self
    }

    pub fn with_shader_error_handler(mut self, handler: Arc<dyn ShaderErrorHandler>) -> Self {
        self.shader_error_handler = handler;
        self
    }

    pub fn with_caps(mut self, caps: Caps) -> Self {
        self.caps = Some(caps);
        self
    }
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            max_resource_budget: Self::DEFAULT_RESOURCE_BUDGET,
            vertex_block_size: Self::DEFAULT_VERTEX_BLOCK_SIZE,
            uniform_block_size: Self::DEFAULT_UNIFORM_BLOCK_SIZE,
            validation: cfg!(debug_assertions),
            shader_error_handler: Arc::new(DefaultShaderErrorHandler),
            caps: None,
        }
    }
}

impl fmt::Debug for ContextOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextOptions")
            .field("backend", &self.backend)
            .field("max_resource_budget", &self.max_resource_budget)
            .field("vertex_block_size", &self.vertex_block_size)
            .field("uniform_block_size", &self.uniform_block_size)
            .field("validation", &self.validation)
            .field("caps", &self.caps.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = ContextOptions::new()
            .with_backend(BackendType::Vulkan)
            .with_resource_budget(1024)
            .with_buffer_block_size(4096, 512)
            .with_validation(false);
        assert_eq!(options.backend, BackendType::Vulkan);
        assert_eq!(options.max_resource_budget, 1024);
        assert_eq!(options.vertex_block_size, 4096);
        assert_eq!(options.uniform_block_size, 512);
        assert!(!options.validation);
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(BackendType::OpenGl.to_string(), "OpenGL");
    }
}
