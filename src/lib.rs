//! Physically based sphere-grid viewer with baked image-based lighting.
//!
//! The crate exposes the building blocks separately from the binary so the
//! renderer stays usable from headless tools and tests: geometry and
//! texture data types, the orbit camera, the GPU context with its named
//! uniform binder, and the one-shot lighting precompute.

pub mod app;
pub mod assets;
pub mod camera;
pub mod geometry;
pub mod ibl;
pub mod lights;
pub mod pbr;
pub mod render;
pub mod texture;

pub use app::{Application, RenderSettings, SceneAssets};
pub use camera::Camera;
pub use geometry::GeometryBuffer;
pub use ibl::BakedIbl;
pub use lights::{DirectionalLight, LightRig, PointLight};
pub use render::{GraphicsContext, RenderError, ShaderProgram, UniformSet, UniformValue};
pub use texture::{PixelFormat, Texture};
