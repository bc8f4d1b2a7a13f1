//! Sceneview
//!
//! A standalone 3D scene viewer built on wgpu and winit. Scene documents
//! are parsed into an arena graph, flattened into single-index GPU meshes,
//! enriched with Phong materials and textures, and drawn through an
//! 8-sample multisampled offscreen target with a toggleable transparency
//! mode.

pub mod app;
pub mod gfx;
pub mod scene;

pub use app::ViewerApp;
pub use scene::{load_model, LoadError};
