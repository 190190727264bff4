use thiserror::Error;

/// Errors raised by the graphics layer.
///
/// Resource errors (adapter, device, compile, incomplete target) are fatal
/// during initialization; binding errors fail the offending draw call
/// immediately so stale GPU state never renders silently.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(String),

    #[error("failed to create GPU device: {0}")]
    RequestDevice(String),

    #[error("failed to create rendering surface: {0}")]
    Surface(String),

    #[error("shader '{label}' failed to compile: {message}")]
    ShaderCompile { label: String, message: String },

    #[error("render target is incomplete: {0}")]
    IncompleteTarget(String),

    #[error("program '{program}' declares uniform '{name}' but the draw set does not provide it")]
    MissingUniform { program: String, name: String },

    #[error("uniform '{name}' has the wrong type, expected {expected}")]
    UniformType {
        name: String,
        expected: &'static str,
    },

    #[error("unknown or destroyed {0} handle")]
    UnknownHandle(&'static str),

    #[error("no active frame or offscreen render target")]
    NoTarget,

    #[error("pixel readback failed: {0}")]
    Readback(String),
}
