//! Scene-document loading.
//!
//! Turns an on-disk hierarchical scene document into a [`LoadedModel`]:
//! parse and resolve the document into an arena graph, flatten every
//! referenced geometry into a single-index vertex/index pair, and decode
//! material textures into CPU-side byte buffers. Nothing in this module
//! touches the GPU; upload happens in [`crate::gfx::Model`].

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod document;
pub mod flatten;
pub mod graph;
pub mod resolve;

pub use flatten::{flatten, FlatMesh};
pub use graph::{MeshInstance, MeshSource, SceneGraph, SceneNode};
pub use resolve::{LoadedModel, ModelPart, ResolvedMaterial, TextureImage};

/// Errors produced while turning a scene document into a renderable model.
///
/// Every loading-stage error aborts the whole load; there is no
/// partial-model fallback or default-material substitution.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The document or one of its referenced files could not be read.
    #[error("cannot read `{path}`")]
    UnreadableSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The document violates the schema: bad JSON, duplicate or dangling
    /// ids, out-of-bounds indices, or a cyclic node hierarchy.
    #[error("malformed scene document: {0}")]
    MalformedDocument(String),

    /// A mesh instance names a material the document does not define.
    #[error("mesh instance references unknown material `{0}`")]
    UnresolvedMaterialReference(String),

    /// The GPU refused an allocation (buffer, texture, or surface).
    #[error("GPU resource allocation failed: {0}")]
    GpuResourceFailure(String),
}

/// Loads a scene document and prepares everything the GPU binder needs.
///
/// Texture paths inside the document are resolved relative to the
/// document's own directory.
pub fn load_model(path: &Path) -> Result<LoadedModel, LoadError> {
    let graph = document::parse(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve::resolve(&graph, base_dir)
}
