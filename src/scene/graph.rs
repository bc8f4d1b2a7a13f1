//! In-memory scene graph.
//!
//! The parser resolves every name in the document into an index into one of
//! the arenas below, so nothing downstream ever looks anything up by id.
//! All values are immutable once the graph is built.

use std::path::PathBuf;

use cgmath::Matrix4;

/// Fully resolved scene: arenas of entities cross-referenced by index.
#[derive(Debug)]
pub struct SceneGraph {
    pub nodes: Vec<SceneNode>,
    /// Indices into `nodes` forming the visual scene.
    pub roots: Vec<u32>,
    pub geometries: Vec<MeshSource>,
    pub materials: Vec<MaterialDef>,
    pub images: Vec<ImageDef>,
}

/// One node of the hierarchy: a local transform, child links, and the mesh
/// instances placed at this node.
#[derive(Debug)]
pub struct SceneNode {
    pub name: String,
    pub transform: Matrix4<f32>,
    pub children: Vec<u32>,
    pub instances: Vec<MeshInstance>,
}

/// A geometry placed in the scene with a bound material.
#[derive(Debug, Clone, Copy)]
pub struct MeshInstance {
    pub geometry: u32,
    pub material: u32,
}

/// Raw geometry as authored: attribute arrays plus independent per-attribute
/// index sets over one triangle corner stream.
///
/// `normal_indices` and `texcoord_indices` are always the same length as
/// `position_indices`; a `None` entry marks a corner without that attribute.
/// The parser guarantees every present index is in bounds and that the
/// corner stream length is a multiple of 3.
#[derive(Debug)]
pub struct MeshSource {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub position_indices: Vec<u32>,
    pub normal_indices: Vec<Option<u32>>,
    pub texcoord_indices: Vec<Option<u32>>,
}

impl MeshSource {
    pub fn triangle_count(&self) -> usize {
        self.position_indices.len() / 3
    }
}

/// Material as authored: classic Phong scalars plus an optional texture
/// image reference.
#[derive(Debug)]
pub struct MaterialDef {
    pub name: String,
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub shininess: f32,
    /// Index into [`SceneGraph::images`].
    pub image: Option<u32>,
}

/// A texture image declared by the document, relative to the document dir
/// unless absolute.
#[derive(Debug)]
pub struct ImageDef {
    pub name: String,
    pub path: PathBuf,
}
