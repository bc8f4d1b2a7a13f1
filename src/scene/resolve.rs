//! Material resolution and model assembly.
//!
//! Walks the resolved scene graph from its roots, composing world
//! transforms, flattening each referenced geometry exactly once, and
//! decoding texture images into CPU-side RGBA buffers. The result is
//! everything [`crate::gfx::Model`] needs, with no graphics-API call made
//! yet: a load that fails here leaves no GPU resource behind.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use cgmath::{Matrix4, SquareMatrix};

use super::flatten::{flatten, FlatMesh};
use super::graph::{ImageDef, SceneGraph};
use super::LoadError;

/// A decoded texture: tightly packed RGBA8 pixels.
#[derive(Debug, Clone)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Material ready for upload: Phong scalars plus decoded texture bytes.
#[derive(Debug)]
pub struct ResolvedMaterial {
    pub name: String,
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub shininess: f32,
    pub texture: Option<TextureImage>,
}

/// One draw of the model: a flattened mesh placed in the world with a
/// material bound.
#[derive(Debug)]
pub struct ModelPart {
    /// Index into [`LoadedModel::meshes`].
    pub mesh: u32,
    /// Index into [`LoadedModel::materials`].
    pub material: u32,
    pub transform: Matrix4<f32>,
}

/// The CPU side of a model, complete and self-contained. Geometry shared
/// between instances appears once in `meshes` and is referenced by index
/// from multiple parts.
#[derive(Debug)]
pub struct LoadedModel {
    pub meshes: Vec<FlatMesh>,
    pub materials: Vec<ResolvedMaterial>,
    pub parts: Vec<ModelPart>,
}

impl LoadedModel {
    pub fn triangle_count(&self) -> usize {
        self.parts
            .iter()
            .map(|part| self.meshes[part.mesh as usize].triangle_count())
            .sum()
    }
}

/// Resolves a scene graph into a [`LoadedModel`]. `base_dir` anchors
/// relative texture paths (normally the document's directory).
pub fn resolve(graph: &SceneGraph, base_dir: &Path) -> Result<LoadedModel, LoadError> {
    let mut mesh_slots: HashMap<u32, u32> = HashMap::new();
    let mut meshes = Vec::new();
    let mut parts = Vec::new();

    // Depth-first in declaration order; the parser has already ruled out
    // cycles and over-deep nesting.
    let mut stack: Vec<(u32, Matrix4<f32>)> = graph
        .roots
        .iter()
        .rev()
        .map(|&root| (root, Matrix4::identity()))
        .collect();
    while let Some((index, parent)) = stack.pop() {
        let node = &graph.nodes[index as usize];
        let world = parent * node.transform;
        for instance in &node.instances {
            let mesh = *mesh_slots.entry(instance.geometry).or_insert_with(|| {
                meshes.push(flatten(&graph.geometries[instance.geometry as usize]));
                (meshes.len() - 1) as u32
            });
            parts.push(ModelPart {
                mesh,
                material: instance.material,
                transform: world,
            });
        }
        for &child in node.children.iter().rev() {
            stack.push((child, world));
        }
    }

    let mut decoded: HashMap<u32, TextureImage> = HashMap::new();
    let mut materials = Vec::with_capacity(graph.materials.len());
    for definition in &graph.materials {
        let texture = match definition.image {
            Some(image) => {
                if !decoded.contains_key(&image) {
                    let loaded = decode_image(&graph.images[image as usize], base_dir)?;
                    decoded.insert(image, loaded);
                }
                Some(decoded[&image].clone())
            }
            None => None,
        };
        materials.push(ResolvedMaterial {
            name: definition.name.clone(),
            ambient: definition.ambient,
            diffuse: definition.diffuse,
            specular: definition.specular,
            shininess: definition.shininess,
            texture,
        });
    }

    log::info!(
        "resolved {} parts over {} meshes and {} materials",
        parts.len(),
        meshes.len(),
        materials.len()
    );

    Ok(LoadedModel {
        meshes,
        materials,
        parts,
    })
}

fn decode_image(image: &ImageDef, base_dir: &Path) -> Result<TextureImage, LoadError> {
    let path = if image.path.is_absolute() {
        image.path.clone()
    } else {
        base_dir.join(&image.path)
    };
    let bytes = fs::read(&path).map_err(|source| LoadError::UnreadableSource {
        path: path.clone(),
        source,
    })?;
    let decoded = image::load_from_memory(&bytes).map_err(|err| {
        LoadError::MalformedDocument(format!(
            "cannot decode texture `{}`: {err}",
            path.display()
        ))
    })?;
    let rgba = decoded.to_rgba8();
    Ok(TextureImage {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use cgmath::Vector3;

    use crate::scene::graph::{MaterialDef, MeshInstance, MeshSource, SceneNode};

    use super::*;

    fn unit_triangle(name: &str) -> MeshSource {
        MeshSource {
            name: name.to_string(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![],
            texcoords: vec![],
            position_indices: vec![0, 1, 2],
            normal_indices: vec![None; 3],
            texcoord_indices: vec![None; 3],
        }
    }

    fn plain_material(name: &str) -> MaterialDef {
        MaterialDef {
            name: name.to_string(),
            ambient: [0.1; 3],
            diffuse: [0.8; 3],
            specular: [0.0; 3],
            shininess: 8.0,
            image: None,
        }
    }

    fn node(
        name: &str,
        transform: Matrix4<f32>,
        children: Vec<u32>,
        instances: Vec<MeshInstance>,
    ) -> SceneNode {
        SceneNode {
            name: name.to_string(),
            transform,
            children,
            instances,
        }
    }

    #[test]
    fn composes_world_transforms_through_the_hierarchy() {
        let graph = SceneGraph {
            nodes: vec![
                node(
                    "root",
                    Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0)),
                    vec![1],
                    vec![],
                ),
                node(
                    "child",
                    Matrix4::from_translation(Vector3::new(0.0, 2.0, 0.0)),
                    vec![],
                    vec![MeshInstance {
                        geometry: 0,
                        material: 0,
                    }],
                ),
            ],
            roots: vec![0],
            geometries: vec![unit_triangle("tri")],
            materials: vec![plain_material("plain")],
            images: vec![],
        };

        let model = resolve(&graph, Path::new(".")).unwrap();
        assert_eq!(model.parts.len(), 1);
        let transform = model.parts[0].transform;
        assert_eq!(transform.w.x, 1.0);
        assert_eq!(transform.w.y, 2.0);
        assert_eq!(transform.w.z, 0.0);
    }

    #[test]
    fn shared_geometry_is_flattened_once() {
        let instance = MeshInstance {
            geometry: 0,
            material: 0,
        };
        let graph = SceneGraph {
            nodes: vec![
                node("root", Matrix4::identity(), vec![1, 2], vec![]),
                node("left", Matrix4::identity(), vec![], vec![instance]),
                node("right", Matrix4::identity(), vec![], vec![instance]),
            ],
            roots: vec![0],
            geometries: vec![unit_triangle("tri")],
            materials: vec![plain_material("plain")],
            images: vec![],
        };

        let model = resolve(&graph, Path::new(".")).unwrap();
        assert_eq!(model.meshes.len(), 1);
        assert_eq!(model.parts.len(), 2);
        assert_eq!(model.parts[0].mesh, model.parts[1].mesh);
        assert_eq!(model.triangle_count(), 2);
    }

    #[test]
    fn parts_follow_declaration_order() {
        let graph = SceneGraph {
            nodes: vec![
                node("root", Matrix4::identity(), vec![1, 2], vec![]),
                node(
                    "first",
                    Matrix4::identity(),
                    vec![],
                    vec![MeshInstance {
                        geometry: 0,
                        material: 0,
                    }],
                ),
                node(
                    "second",
                    Matrix4::identity(),
                    vec![],
                    vec![MeshInstance {
                        geometry: 1,
                        material: 1,
                    }],
                ),
            ],
            roots: vec![0],
            geometries: vec![unit_triangle("a"), unit_triangle("b")],
            materials: vec![plain_material("first"), plain_material("second")],
            images: vec![],
        };

        let model = resolve(&graph, Path::new(".")).unwrap();
        assert_eq!(model.parts[0].material, 0);
        assert_eq!(model.parts[1].material, 1);
        assert_eq!(model.parts[0].mesh, 0);
        assert_eq!(model.parts[1].mesh, 1);
    }

    #[test]
    fn missing_texture_file_is_unreadable_source() {
        let mut graph = SceneGraph {
            nodes: vec![],
            roots: vec![],
            geometries: vec![],
            materials: vec![plain_material("textured")],
            images: vec![ImageDef {
                name: "img".to_string(),
                path: "does-not-exist.png".into(),
            }],
        };
        graph.materials[0].image = Some(0);

        let err = resolve(&graph, Path::new("/nonexistent-base")).unwrap_err();
        assert!(matches!(err, LoadError::UnreadableSource { .. }));
    }
}
