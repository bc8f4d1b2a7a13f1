//! Geometry flattening.
//!
//! The document format indexes positions, normals, and texcoords
//! independently; GPU draw calls need one shared index per vertex. This is
//! the standard unindex-then-reindex transform: each distinct
//! (position, normal, texcoord) index triple becomes one dense vertex slot,
//! shared corners merge and divergent corners split. Corners are visited in
//! source order, so the output is deterministic and triangle winding is
//! preserved.
//!
//! Pure CPU transform, kept free of any graphics context.

use std::collections::HashMap;

use crate::gfx::vertex::Vertex;

use super::graph::MeshSource;

/// Flattened geometry: a deduplicated vertex array and one unified
/// triangle-list index array.
///
/// Invariants: `indices.len() % 3 == 0` and every index is
/// `< vertices.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl FlatMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Flattens independently-indexed source geometry into a single-index mesh.
///
/// A corner without a normal or texcoord index gets the zero vector / zero
/// UV as its attribute.
pub fn flatten(source: &MeshSource) -> FlatMesh {
    let mut slots: HashMap<(u32, Option<u32>, Option<u32>), u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::with_capacity(source.position_indices.len());

    for corner in 0..source.position_indices.len() {
        let key = (
            source.position_indices[corner],
            source.normal_indices[corner],
            source.texcoord_indices[corner],
        );
        let slot = *slots.entry(key).or_insert_with(|| {
            vertices.push(Vertex {
                position: source.positions[key.0 as usize],
                normal: key
                    .1
                    .map(|index| source.normals[index as usize])
                    .unwrap_or([0.0; 3]),
                tex_coords: key
                    .2
                    .map(|index| source.texcoords[index as usize])
                    .unwrap_or([0.0; 2]),
            });
            (vertices.len() - 1) as u32
        });
        indices.push(slot);
    }

    FlatMesh { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two triangles sharing the edge 1-2, fully indexed.
    fn quad_source() -> MeshSource {
        MeshSource {
            name: "quad".to_string(),
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [1.0, 1.0, 0.0],
            ],
            normals: vec![[0.0, 0.0, 1.0]],
            texcoords: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
            position_indices: vec![0, 1, 2, 2, 1, 3],
            normal_indices: vec![Some(0); 6],
            texcoord_indices: vec![Some(0), Some(1), Some(2), Some(2), Some(1), Some(3)],
        }
    }

    fn assert_invariants(mesh: &FlatMesh) {
        assert_eq!(mesh.indices.len() % 3, 0);
        for &index in &mesh.indices {
            assert!((index as usize) < mesh.vertices.len());
        }
    }

    #[test]
    fn merges_corners_with_identical_triples() {
        let mesh = flatten(&quad_source());
        assert_invariants(&mesh);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn splits_corners_with_divergent_attributes() {
        let mut source = quad_source();
        // Same positions on the shared edge, but the second triangle reads
        // different texcoords for them.
        source.texcoord_indices = vec![Some(0), Some(1), Some(2), Some(3), Some(3), Some(3)];
        let mesh = flatten(&source);
        assert_invariants(&mesh);
        assert_eq!(mesh.vertices.len(), 6);
    }

    #[test]
    fn collapses_identical_corners_to_one_vertex() {
        let source = MeshSource {
            name: "degenerate".to_string(),
            positions: vec![[1.0, 2.0, 3.0]],
            normals: vec![[0.0, 1.0, 0.0]],
            texcoords: vec![[0.5, 0.5]],
            position_indices: vec![0; 9],
            normal_indices: vec![Some(0); 9],
            texcoord_indices: vec![Some(0); 9],
        };
        let mesh = flatten(&source);
        assert_invariants(&mesh);
        assert_eq!(mesh.vertices.len(), 1);
        assert_eq!(mesh.indices, vec![0; 9]);
    }

    #[test]
    fn flattening_is_deterministic() {
        let source = quad_source();
        assert_eq!(flatten(&source), flatten(&source));
    }

    #[test]
    fn missing_attributes_become_zero_sentinels() {
        let mut source = quad_source();
        source.normal_indices = vec![None; 6];
        source.texcoord_indices[3] = None;
        let mesh = flatten(&source);
        assert_invariants(&mesh);
        for vertex in &mesh.vertices {
            assert_eq!(vertex.normal, [0.0; 3]);
        }
        let split = mesh.indices[3] as usize;
        assert_eq!(mesh.vertices[split].tex_coords, [0.0; 2]);
    }

    #[test]
    fn corner_order_and_winding_are_preserved() {
        let mut source = quad_source();
        // All corners distinct: slots must be handed out in corner order.
        source.texcoord_indices = (0..6).map(|_| None).collect();
        source.normal_indices = vec![None; 6];
        source.position_indices = vec![0, 1, 2, 3, 2, 1];
        let mesh = flatten(&source);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 2, 1]);
        assert_eq!(mesh.vertices[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices[3].position, [1.0, 1.0, 0.0]);
    }
}
