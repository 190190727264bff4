pub mod context;
pub mod error;
pub mod shader;
pub mod shaders;
pub mod uniforms;

pub use context::GraphicsContext;
pub use error::RenderError;
pub use shader::{ShaderComposer, ShaderDefine, ShaderProgram};
pub use uniforms::{UniformBinder, UniformLayout, UniformLayoutBuilder, UniformSet, UniformValue};

/// Identifier of geometry uploaded to the graphics context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryHandle(pub(crate) u64);

/// Identifier of a compiled shader program variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u64);

/// Identifier of a device-resident texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);
