//! GPU-facing side of the viewer: resource upload, uniform plumbing, the
//! orbit camera, and the multisampled render pipeline.

pub mod camera;
pub mod material;
pub mod model;
pub mod render_engine;
pub mod texture;
pub mod uniforms;
pub mod vertex;

pub use camera::{CameraFrame, OrbitCamera};
pub use model::{DrawModel, Model};
pub use render_engine::{BlendMode, RenderEngine};
